// Jira issue client. The engine only ever consumes the flattened
// plain-text view of an issue.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::errors::{TesterError, TesterResult};
use crate::models::clip;

/// Plain-text view of one tracked issue.
#[derive(Debug, Clone, Serialize)]
pub struct IssueDetails {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub description: String,
    pub comments: Vec<String>,
}

impl IssueDetails {
    /// Everything the issue says, joined for prompt building.
    pub fn combined_text(&self) -> String {
        let mut parts = vec![self.summary.clone(), self.description.clone()];
        parts.extend(self.comments.iter().cloned());
        parts.retain(|part| !part.is_empty());
        parts.join("\n")
    }
}

/// Accept raw keys ("PROJ-123"), browse URLs and API URLs alike.
fn extract_issue_key(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(rest) = raw.split("/browse/").nth(1) {
        let key = rest.split(['?', '#']).next().unwrap_or(rest);
        return key.trim_matches('/').to_string();
    }
    if raw.contains("http") && raw.contains('/') {
        return raw
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(raw)
            .to_string();
    }
    raw.to_string()
}

/// Fetch one issue over the v3 REST API with basic auth.
pub async fn fetch_issue(
    client: &Client,
    config: &Config,
    issue_id: &str,
) -> TesterResult<IssueDetails> {
    // Users paste the browse URL as jira_url; the API base is the part
    // before /browse.
    let mut base = config.jira_url.trim().trim_end_matches('/').to_string();
    if let Some(head) = base.split("/browse").next() {
        base = head.to_string();
    }
    if base.is_empty() || config.jira_email.is_empty() || config.jira_api_token.is_empty() {
        return Err(TesterError::IssueTracker(
            "jira_url, jira_email and jira_api_token must all be configured".to_string(),
        ));
    }

    let key = extract_issue_key(issue_id);
    let url = format!("{}/rest/api/3/issue/{}", base, key);
    info!(issue = %key, "fetching issue");

    let response = client
        .get(&url)
        .basic_auth(&config.jira_email, Some(&config.jira_api_token))
        .header("Accept", "application/json")
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| TesterError::IssueTracker(format!("failed to reach Jira: {}", e)))?;

    let status = response.status().as_u16();
    if status != 200 {
        let text = response.text().await.unwrap_or_default();
        return Err(TesterError::IssueTracker(format!(
            "Jira API returned {}: {}",
            status,
            clip(&text, 200)
        )));
    }

    let data: Value = response
        .json()
        .await
        .map_err(|e| TesterError::IssueTracker(format!("invalid Jira response: {}", e)))?;
    let fields = data.get("fields").cloned().unwrap_or(Value::Null);

    let mut comments = Vec::new();
    if let Some(list) = fields.pointer("/comment/comments").and_then(Value::as_array) {
        for comment in list {
            let author = comment
                .pointer("/author/displayName")
                .and_then(Value::as_str)
                .unwrap_or("User");
            let body = rich_text_to_plain(comment.get("body"));
            comments.push(format!("{}: {}", author, body));
        }
    }

    Ok(IssueDetails {
        key: data
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or(&key)
            .to_string(),
        summary: fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        status: fields
            .pointer("/status/name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        description: rich_text_to_plain(fields.get("description")),
        comments,
    })
}

/// Flatten an Atlassian rich-text document to plain text by collecting
/// every `text` node in document order.
pub fn rich_text_to_plain(doc: Option<&Value>) -> String {
    fn walk(node: &Value, parts: &mut Vec<String>) {
        if let Some(text) = node.get("text").and_then(Value::as_str) {
            parts.push(text.to_string());
        }
        if let Some(children) = node.get("content").and_then(Value::as_array) {
            for child in children {
                walk(child, parts);
            }
        }
    }

    let mut parts = Vec::new();
    match doc {
        Some(node @ Value::Object(_)) => walk(node, &mut parts),
        Some(Value::String(text)) => parts.push(text.clone()),
        _ => {}
    }
    parts.join(" ")
}
