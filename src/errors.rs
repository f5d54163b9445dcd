// Error types for discovery, probing and analysis

use thiserror::Error;

use crate::models::clip;

/// Errors the engine can surface to callers. Probe-level transport
/// failures are not here: those are recorded inside `ProbeResult` so a
/// dead target still produces a full test record.
#[derive(Error, Debug)]
pub enum TesterError {
    /// swagger-config endpoint unreachable or non-200.
    #[error("swagger-config fetch failed for {url}: {reason}")]
    SwaggerConfig { url: String, reason: String },

    /// A group's contract document unreachable or non-200.
    #[error("contract fetch failed for {url}: {reason}")]
    ContractFetch { url: String, reason: String },

    /// An endpoint index or combination window outside the valid range.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The analysis service could not be reached at all.
    #[error("analysis service unavailable: {0}")]
    AnalysisUnavailable(String),

    /// The analysis service replied, but not with usable JSON even
    /// after repair.
    #[error("malformed analysis response: {raw}")]
    MalformedAnalysis { raw: String },

    /// No target to discover against.
    #[error("no base URL configured (set swagger_base_url or services in config.json)")]
    MissingBaseUrl,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("issue tracker error: {0}")]
    IssueTracker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TesterError {
    /// Keep raw analysis replies short enough to log and report.
    pub fn malformed_analysis(raw: &str) -> Self {
        TesterError::MalformedAnalysis {
            raw: clip(raw, 200),
        }
    }
}

/// Result type for engine operations
pub type TesterResult<T> = Result<T, TesterError>;
