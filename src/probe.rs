// Live HTTP probing. One request in, one normalized record out; no
// transport failure ever escapes as an error.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::models::{clip, Method};

/// Normalized outcome of a single probe request. `status` is `None`
/// exactly when `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub is_json: bool,
    pub json_body: Option<Value>,
    pub body_preview: String,
    pub body_full: String,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: BTreeMap<String, String>,
    pub request_body: Option<Value>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn status_is(&self, codes: &[u16]) -> bool {
        matches!(self.status, Some(s) if codes.contains(&s))
    }

    pub fn ok(&self) -> bool {
        self.status == Some(200)
    }

    /// Status for display: the code, or the transport error.
    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => self
                .error
                .clone()
                .unwrap_or_else(|| "ERR".to_string()),
        }
    }

    fn failure(
        method: Method,
        url: &str,
        request_headers: Vec<(String, String)>,
        request_body: Option<Value>,
        elapsed_ms: u64,
        error: String,
    ) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            status: None,
            elapsed_ms,
            is_json: false,
            json_body: None,
            body_preview: String::new(),
            body_full: String::new(),
            request_headers,
            response_headers: BTreeMap::new(),
            request_body,
            error: Some(error),
        }
    }
}

/// One request prepared ahead of a batch run.
#[derive(Debug, Clone)]
pub struct PreparedProbe {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<Value>,
}

/// Issues probe requests against the live target.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    pub client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one request. GET and DELETE never carry a body; POST,
    /// PUT and PATCH always send JSON, an empty object if nothing was
    /// built.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        json_body: Option<&Value>,
    ) -> ProbeResult {
        let mut request = self.client.request(method.to_reqwest(), url).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let mut sent_headers: Vec<(String, String)> = headers.to_vec();
        let sent_body = if method.takes_body() {
            let body = json_body
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            request = request.json(&body);
            sent_headers.push(("Content-Type".to_string(), "application/json".to_string()));
            Some(body)
        } else {
            None
        };

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let error = if e.is_connect() {
                    "Connection refused or DNS failure".to_string()
                } else if e.is_timeout() {
                    format!("Timed out (>{}s)", self.timeout.as_secs())
                } else {
                    e.to_string()
                };
                debug!(url = %url, error = %error, "probe failed");
                return ProbeResult::failure(method, url, sent_headers, sent_body, elapsed_ms, error);
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let text = response.text().await.unwrap_or_default();

        let (is_json, json_value, body_preview, body_full) =
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    let pretty =
                        serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.clone());
                    let mut preview = clip(&pretty, 2000);
                    if pretty.chars().count() > 2000 {
                        preview.push_str("...");
                    }
                    (true, Some(value), preview, pretty)
                }
                Err(_) => (false, None, clip(&text, 1000), text.clone()),
            };

        debug!(url = %url, status, elapsed_ms, "probe complete");
        ProbeResult {
            method: method.to_string(),
            url: url.to_string(),
            status: Some(status),
            elapsed_ms,
            is_json,
            json_body: json_value,
            body_preview,
            body_full,
            request_headers: sent_headers,
            response_headers,
            request_body: sent_body,
            error: None,
        }
    }
}

/// Run a batch with at most `max_in_flight` requests in the air and a
/// spacing delay held per slot. Results come back in input order, one
/// per prepared probe.
pub async fn run_bounded(
    probe: &HttpProbe,
    batch: Vec<PreparedProbe>,
    max_in_flight: usize,
    spacing: Duration,
) -> Vec<ProbeResult> {
    let total = batch.len();
    let fallback: Vec<(Method, String)> = batch
        .iter()
        .map(|job| (job.method, job.url.clone()))
        .collect();

    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks: JoinSet<(usize, ProbeResult)> = JoinSet::new();
    for (index, job) in batch.into_iter().enumerate() {
        let probe = probe.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = probe
                .call(job.method, &job.url, &job.headers, job.json_body.as_ref())
                .await;
            if !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }
            (index, result)
        });
    }

    let mut slots: Vec<Option<ProbeResult>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((index, result)) = joined {
            slots[index] = Some(result);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                let (method, url) = &fallback[index];
                ProbeResult::failure(
                    *method,
                    url,
                    Vec::new(),
                    None,
                    0,
                    "probe task aborted".to_string(),
                )
            })
        })
        .collect()
}
