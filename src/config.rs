// Runtime configuration loaded from config.json

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::errors::{TesterError, TesterResult};

/// Placeholder value shipped in the sample config. Treated as no token.
pub const TOKEN_PLACEHOLDER: &str = "PASTE_YOUR_TOKEN_HERE";

/// One discoverable service behind the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
}

/// Engine configuration. Every field has a workable default so a
/// minimal config.json only needs `swagger_base_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub swagger_base_url: String,
    #[serde(default)]
    pub services: Vec<ServiceTarget>,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_response_time_limit")]
    pub response_time_limit_ms: u64,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default)]
    pub jira_url: String,
    #[serde(default)]
    pub jira_email: String,
    #[serde(default)]
    pub jira_api_token: String,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_probe_spacing_ms")]
    pub probe_spacing_ms: u64,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_type() -> String {
    "Bearer".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_response_time_limit() -> u64 {
    400
}

fn default_max_in_flight() -> usize {
    4
}

fn default_probe_spacing_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            swagger_base_url: String::new(),
            services: Vec::new(),
            auth_token: String::new(),
            auth_header: default_auth_header(),
            auth_type: default_auth_type(),
            timeout_seconds: default_timeout_seconds(),
            response_time_limit_ms: default_response_time_limit(),
            gemini_api_key: String::new(),
            jira_url: String::new(),
            jira_email: String::new(),
            jira_api_token: String::new(),
            max_in_flight: default_max_in_flight(),
            probe_spacing_ms: default_probe_spacing_ms(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> TesterResult<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            TesterError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            TesterError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Services to discover against. Falls back to a single "Default"
    /// service on the base URL when no service list is configured.
    pub fn targets(&self) -> TesterResult<Vec<ServiceTarget>> {
        if !self.services.is_empty() {
            return Ok(self.services.clone());
        }
        if self.swagger_base_url.is_empty() {
            return Err(TesterError::MissingBaseUrl);
        }
        Ok(vec![ServiceTarget {
            name: "Default".to_string(),
            url: self.swagger_base_url.clone(),
        }])
    }

    /// A real token is configured, not the sample placeholder.
    pub fn has_auth_token(&self) -> bool {
        let token = self.auth_token.trim();
        !token.is_empty() && token != TOKEN_PLACEHOLDER
    }
}
