// Authorization schemes attached to probe requests

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::config::Config;

/// Header value sent by the invalid-token probe.
pub const INVALID_TOKEN: &str = "Bearer invalid_token_12345";

/// How probe requests authenticate against the target.
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// `{header}: {scheme} {token}`, e.g. `Authorization: Bearer eyJ...`
    Token {
        header: String,
        scheme: String,
        token: String,
    },
    /// HTTP Basic with static credentials.
    Basic { username: String, password: String },
    /// No authorization headers at all.
    Anonymous,
}

impl AuthScheme {
    /// Build a token scheme from config. Users paste tokens with the
    /// scheme already prefixed ("Bearer Bearer ey..."), so a leading
    /// duplicate of the configured scheme is stripped first.
    pub fn from_token(config: &Config, raw: &str) -> AuthScheme {
        let mut token = raw.trim().to_string();
        let prefix = format!("{} ", config.auth_type);
        if token.len() >= prefix.len() {
            if let Some(head) = token.get(..prefix.len()) {
                if head.eq_ignore_ascii_case(&prefix) {
                    token = token[prefix.len()..].trim().to_string();
                }
            }
        }
        if token.is_empty() {
            return AuthScheme::Anonymous;
        }
        AuthScheme::Token {
            header: config.auth_header.clone(),
            scheme: config.auth_type.clone(),
            token,
        }
    }

    pub fn basic(username: &str, password: &str) -> AuthScheme {
        AuthScheme::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Headers this scheme contributes to a request.
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            AuthScheme::Token {
                header,
                scheme,
                token,
            } => vec![(header.clone(), format!("{} {}", scheme, token))],
            AuthScheme::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{}:{}", username, password));
                vec![("Authorization".to_string(), format!("Basic {}", encoded))]
            }
            AuthScheme::Anonymous => Vec::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthScheme::Anonymous)
    }
}

/// Headers for the deliberately-broken-token probe.
pub fn invalid_token_headers(config: &Config) -> Vec<(String, String)> {
    vec![(config.auth_header.clone(), INVALID_TOKEN.to_string())]
}
