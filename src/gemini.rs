// Gemini analysis client: result narration and test-value suggestions.
// Strictly optional; every pipeline phase completes without it.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::analysis::sample_rows;
use crate::errors::{TesterError, TesterResult};
use crate::jira::IssueDetails;
use crate::models::{clip, EndpointSpec};
use crate::probe::ProbeResult;

/// Model fallback order, cheapest first.
pub const GEMINI_MODELS: [&str; 3] = [
    "gemini-2.5-flash-lite",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
];

const ATTEMPTS_PER_MODEL: u32 = 3;

/// One suggested probe value for a parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestedCase {
    pub param: String,
    pub value: String,
    #[serde(default)]
    pub reason: String,
}

/// Structured test suggestions drawn from a baseline response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSuggestions {
    #[serde(default)]
    pub filter_tests: Vec<SuggestedCase>,
    #[serde(default)]
    pub sort_tests: Vec<SuggestedCase>,
    #[serde(default)]
    pub edge_case_tests: Vec<SuggestedCase>,
}

impl TestSuggestions {
    pub fn all(&self) -> impl Iterator<Item = &SuggestedCase> {
        self.filter_tests
            .iter()
            .chain(self.sort_tests.iter())
            .chain(self.edge_case_tests.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.filter_tests.is_empty()
            && self.sort_tests.is_empty()
            && self.edge_case_tests.is_empty()
    }
}

/// One catalog index the scoping call recommends testing.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeRecommendation {
    pub index: usize,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeSuggestions {
    #[serde(default)]
    pub recommendations: Vec<ScopeRecommendation>,
}

/// Client for the generateContent API.
pub struct GeminiAnalyzer {
    client: Client,
    api_key: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Send one prompt, walking the model fallback list. Rate limiting
    /// backs off exponentially on the same model; 404 and other errors
    /// move to the next model.
    pub async fn ask(&self, prompt: &str) -> TesterResult<String> {
        let payload = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.3, "maxOutputTokens": 4096},
        });

        for model in GEMINI_MODELS {
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
                model, self.api_key
            );
            let mut attempt = 0;
            while attempt < ATTEMPTS_PER_MODEL {
                debug!(model, attempt, "sending analysis prompt");
                let response = match self
                    .client
                    .post(&url)
                    .json(&payload)
                    .timeout(Duration::from_secs(60))
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) if e.is_timeout() => {
                        warn!(model, "analysis request timed out, retrying");
                        attempt += 1;
                        continue;
                    }
                    Err(e) => return Err(TesterError::AnalysisUnavailable(e.to_string())),
                };

                match response.status().as_u16() {
                    200 => {
                        let data: Value = response
                            .json()
                            .await
                            .map_err(|e| TesterError::AnalysisUnavailable(e.to_string()))?;
                        match data
                            .pointer("/candidates/0/content/parts/0/text")
                            .and_then(Value::as_str)
                        {
                            Some(text) => return Ok(text.to_string()),
                            None => return Err(TesterError::malformed_analysis(&data.to_string())),
                        }
                    }
                    429 => {
                        let wait = 2u64.pow(attempt + 1);
                        warn!(model, wait_s = wait, "rate limited, backing off");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        attempt += 1;
                    }
                    404 => {
                        debug!(model, "model not available, trying next");
                        break;
                    }
                    status => {
                        warn!(model, status, "analysis model error, trying next");
                        break;
                    }
                }
            }
        }
        Err(TesterError::AnalysisUnavailable(
            "all models exhausted, check API key and quota".to_string(),
        ))
    }

    /// Ask for structured output and repair-parse the reply.
    async fn ask_structured<T: DeserializeOwned>(&self, prompt: &str) -> TesterResult<T> {
        let raw = self.ask(prompt).await?;
        let repaired = repair_json(&raw);
        serde_json::from_str(&repaired).map_err(|_| TesterError::malformed_analysis(&raw))
    }

    /// Short narration of one endpoint's baseline outcome.
    pub async fn narrate_endpoint(
        &self,
        endpoint: &EndpointSpec,
        baseline: &ProbeResult,
    ) -> TesterResult<String> {
        let prompt = format!(
            "Analyze this API endpoint: {} {}\n\n\
             Baseline status: {}\nResponse time: {}ms\nJSON response: {}\n\
             Response preview:\n{}\n\n\
             Is it working correctly? Answer briefly.",
            endpoint.method,
            endpoint.path,
            baseline.status_label(),
            baseline.elapsed_ms,
            baseline.is_json,
            clip(&baseline.body_preview, 500),
        );
        self.ask(&prompt).await
    }

    /// One-sentence verdict on whether a response reflects the sent
    /// parameters.
    pub async fn verdict(
        &self,
        endpoint: &EndpointSpec,
        params_sent: &str,
        response_sample: &str,
    ) -> TesterResult<String> {
        let prompt = format!(
            "API endpoint: {} {}\nParameters sent: {}\nResponse sample:\n{}\n\n\
             In ONE sentence, state whether the response correctly reflects the \
             parameters that were sent.",
            endpoint.method,
            endpoint.path,
            params_sent,
            clip(response_sample, 1500),
        );
        self.ask(&prompt).await
    }

    /// Consolidated analysis over one API group's preformatted result
    /// summary.
    pub async fn analyze_group(&self, group: &str, summary: &str) -> TesterResult<String> {
        let prompt = format!(
            "You are an expert API QA engineer. Analyze these test results for \
             the '{}' API group.\n\n{}\n\nProvide:\n\
             1. Overall health assessment of the group\n\
             2. Endpoints with failures or suspicious behavior\n\
             3. Authentication and authorization concerns\n\
             4. Performance outliers\n\
             5. Parameter handling problems (required/optional mismatches, empty values)\n\
             6. Data quality observations from the response previews\n\
             7. Concrete recommended fixes, most urgent first\n\n\
             Keep it concise and actionable.",
            group, summary,
        );
        self.ask(&prompt).await
    }

    /// Suggest filter, sort and edge-case probe values from a baseline
    /// response sample.
    pub async fn suggest_tests(
        &self,
        endpoint: &EndpointSpec,
        baseline: &ProbeResult,
        change_context: Option<&str>,
    ) -> TesterResult<TestSuggestions> {
        let sample_text = match &baseline.json_body {
            Some(body) => {
                let (sample, total) = sample_rows(body, 15);
                format!(
                    "Sample ({} of {} rows):\n{}",
                    match &sample {
                        Value::Array(items) => items.len(),
                        _ => 1,
                    },
                    total,
                    clip(&sample.to_string(), 3000)
                )
            }
            None => "No JSON baseline response available.".to_string(),
        };
        let params_text: Vec<String> = endpoint
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "- {} ({:?}, {}, {})",
                    p.name,
                    p.param_type,
                    if p.required { "required" } else { "optional" },
                    p.description
                )
            })
            .collect();
        let context = change_context
            .map(|text| format!("\nRecent change context:\n{}\n", clip(text, 1000)))
            .unwrap_or_default();

        let prompt = format!(
            "You are an expert API tester. Endpoint: {} {}\n\n\
             Parameters:\n{}\n\n{}{}\n\n\
             Suggest concrete test values for filtering, sorting and edge cases.\n\
             Respond ONLY with JSON in exactly this shape:\n\
             {{\"filter_tests\": [{{\"param\": \"name\", \"value\": \"val\", \"reason\": \"why\"}}],\n \
             \"sort_tests\": [{{\"param\": \"name\", \"value\": \"val\", \"reason\": \"why\"}}],\n \
             \"edge_case_tests\": [{{\"param\": \"name\", \"value\": \"val\", \"reason\": \"why\"}}]}}",
            endpoint.method,
            endpoint.path,
            params_text.join("\n"),
            sample_text,
            context,
        );
        self.ask_structured(&prompt).await
    }

    /// Score catalog endpoints for relevance to a tracked issue.
    pub async fn scope_from_issue(
        &self,
        issue: &IssueDetails,
        endpoints: &[EndpointSpec],
    ) -> TesterResult<ScopeSuggestions> {
        let listing: Vec<String> = endpoints
            .iter()
            .enumerate()
            .map(|(index, e)| format!("{}: {} {} - {}", index, e.method, e.path, e.summary))
            .collect();
        let prompt = format!(
            "A tracked issue reads:\n{}\n\n\
             Available API endpoints:\n{}\n\n\
             Which endpoints should be tested to verify this issue? Respond ONLY \
             with JSON: {{\"recommendations\": [{{\"index\": 0, \"reason\": \"why\"}}]}}",
            clip(&issue.combined_text(), 2000),
            listing.join("\n"),
        );
        self.ask_structured(&prompt).await
    }
}

lazy_static! {
    static ref SINGLE_QUOTED_KEY: Regex = Regex::new(r"'(\w+)'\s*:").unwrap();
    static ref SINGLE_QUOTED_VALUE: Regex = Regex::new(r":\s*'([^']*)'").unwrap();
    static ref SINGLE_QUOTED_AFTER_COMMA: Regex = Regex::new(r",\s*'([^']*)'").unwrap();
    static ref SINGLE_QUOTED_LIST_HEAD: Regex = Regex::new(r"\[\s*'([^']*)'").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([\]}])").unwrap();
}

/// Best-effort recovery of JSON from model chatter. Each rule repairs
/// one known failure shape and nothing else:
///   1. markdown code fences around the payload
///   2. prose before/after the outermost braces
///   3. single-quoted keys and values
///   4. Python-style True/False/None literals
///   5. trailing commas
pub fn repair_json(text: &str) -> String {
    if text.trim().is_empty() {
        return "{}".to_string();
    }
    let mut text = text.trim().to_string();

    if let Some(inner) = text.split("```json").nth(1) {
        text = inner.split("```").next().unwrap_or("").trim().to_string();
    } else if let Some(inner) = text.split("```").nth(1) {
        text = inner.trim().to_string();
    }

    let start = [text.find('{'), text.find('[')]
        .into_iter()
        .flatten()
        .min();
    let end = [text.rfind('}'), text.rfind(']')]
        .into_iter()
        .flatten()
        .max();
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            text = text[start..=end].to_string();
        }
    }

    text = SINGLE_QUOTED_KEY.replace_all(&text, "\"$1\":").to_string();
    text = SINGLE_QUOTED_VALUE.replace_all(&text, ": \"$1\"").to_string();
    text = SINGLE_QUOTED_AFTER_COMMA
        .replace_all(&text, ", \"$1\"")
        .to_string();
    text = SINGLE_QUOTED_LIST_HEAD
        .replace_all(&text, "[\"$1\"")
        .to_string();

    for (from, to) in [
        (": True", ": true"),
        (": False", ": false"),
        (": None", ": null"),
        (", True", ", true"),
        (", False", ", false"),
        (", None", ", null"),
        ("[True", "[true"),
        ("[False", "[false"),
        ("[None", "[null"),
    ] {
        text = text.replace(from, to);
    }

    TRAILING_COMMA.replace_all(&text, "$1").to_string()
}
