// Core data model: endpoint contracts, parameters and concrete values

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP methods the contract parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
}

impl Method {
    /// Parse a method key as it appears in a contract document.
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Some(Method::GET),
            "post" => Some(Method::POST),
            "put" => Some(Method::PUT),
            "delete" => Some(Method::DELETE),
            "patch" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::DELETE => reqwest::Method::DELETE,
            Method::PATCH => reqwest::Method::PATCH,
        }
    }

    /// Whether the probe attaches a JSON body for this method.
    pub fn takes_body(self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
        }
    }
}

/// Where a parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Body,
    Header,
}

impl ParamLocation {
    pub fn parse(s: &str) -> ParamLocation {
        match s {
            "path" => ParamLocation::Path,
            "body" => ParamLocation::Body,
            "header" => ParamLocation::Header,
            _ => ParamLocation::Query,
        }
    }
}

/// Declared parameter type, defaulting to string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl ParamType {
    pub fn parse(s: &str) -> ParamType {
        match s {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            _ => ParamType::String,
        }
    }

    /// Placeholder value used when the contract declares no example.
    pub fn fallback_example(self) -> &'static str {
        match self {
            ParamType::String => "test",
            ParamType::Integer => "1",
            ParamType::Number => "1.0",
            ParamType::Boolean => "true",
            ParamType::Array => "test",
        }
    }
}

impl Default for ParamType {
    fn default() -> Self {
        ParamType::String
    }
}

/// One concrete value for a parameter. `Omit` is the explicit absence
/// marker, distinct from an empty string. `List` models comma-joined
/// multi-select values sent as repeated query pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Omit,
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn text(s: &str) -> ParamValue {
        ParamValue::Text(s.to_string())
    }

    pub fn is_omit(&self) -> bool {
        matches!(self, ParamValue::Omit)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Omit => write!(f, "(omitted)"),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::List(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

/// One parameter of an endpoint, unified across query, path, body and
/// header declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ParamSpec {
    pub fn new(name: &str, location: ParamLocation, required: bool) -> Self {
        Self {
            name: name.to_string(),
            location,
            required,
            param_type: ParamType::String,
            enum_values: Vec::new(),
            default: None,
            example: None,
            description: String::new(),
        }
    }

    /// Declared example, then declared default.
    pub fn declared_value(&self) -> Option<String> {
        self.example.clone().or_else(|| self.default.clone())
    }

    /// A value this parameter can always fall back to.
    pub fn placeholder(&self) -> String {
        self.declared_value()
            .unwrap_or_else(|| self.param_type.fallback_example().to_string())
    }
}

/// Declared response for one status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub description: String,
    pub schema: Option<Value>,
}

/// One operation discovered from the contract document, identified by
/// `(method, path)`. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub group: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    #[serde(default)]
    pub request_body_schema: Option<Value>,
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseSpec>,
}

impl EndpointSpec {
    pub fn new(method: Method, path: &str, group: &str) -> Self {
        Self {
            group: group.to_string(),
            service: None,
            base_url: None,
            method,
            path: path.to_string(),
            tags: Vec::new(),
            summary: String::new(),
            operation_id: String::new(),
            parameters: Vec::new(),
            request_body_schema: None,
            responses: BTreeMap::new(),
        }
    }

    /// Dedup identity across groups.
    pub fn key(&self) -> String {
        format!("{}:{}", self.method, self.path)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn path_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Path)
    }

    pub fn query_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
    }

    /// Parameters the removal and empty-value sweeps may target.
    pub fn removable_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters
            .iter()
            .filter(|p| matches!(p.location, ParamLocation::Query | ParamLocation::Body))
    }

    /// Whether requests to this endpoint carry a JSON body.
    pub fn has_body_input(&self) -> bool {
        self.request_body_schema.is_some()
            || self
                .parameters
                .iter()
                .any(|p| p.location == ParamLocation::Body)
    }
}

/// Scalar JSON fragments rendered the way they appear on the wire.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate to a maximum number of characters, respecting char boundaries.
pub fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}
