// Request construction: endpoint definition plus a value plan in, URL
// and JSON body out. Pure, no I/O.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use url::form_urlencoded;

use crate::models::{EndpointSpec, ParamLocation, ParamSpec, ParamType, ParamValue};

/// Per-parameter instructions for one built request.
#[derive(Debug, Clone, Default)]
pub struct RequestPlan {
    /// Explicit values. `ParamValue::Omit` here means "leave it out".
    pub overrides: BTreeMap<String, ParamValue>,
    /// Parameters dropped from the request entirely.
    pub skip: BTreeSet<String>,
    /// Parameters forced to an empty value (`name=` / `"name": ""`).
    pub force_empty: BTreeSet<String>,
    /// Participation whitelist. Path parameters always participate so
    /// the path stays syntactically valid.
    pub include: Option<BTreeSet<String>>,
}

impl RequestPlan {
    pub fn with_overrides(overrides: BTreeMap<String, ParamValue>) -> Self {
        Self {
            overrides,
            ..Default::default()
        }
    }

    pub fn override_text(mut self, name: &str, value: &str) -> Self {
        self.overrides
            .insert(name.to_string(), ParamValue::text(value));
        self
    }

    pub fn skipping(mut self, name: &str) -> Self {
        self.skip.insert(name.to_string());
        self
    }

    pub fn forcing_empty(mut self, name: &str) -> Self {
        self.force_empty.insert(name.to_string());
        self
    }

    pub fn including<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Resolve what the plan says about one parameter. Skip beats
    /// force-empty beats an explicit override; anything unnamed
    /// inherits from the contract.
    fn action_for(&self, name: &str) -> ParamAction<'_> {
        if self.skip.contains(name) {
            return ParamAction::Skip;
        }
        if self.force_empty.contains(name) {
            return ParamAction::ForceEmpty;
        }
        if let Some(value) = self.overrides.get(name) {
            return ParamAction::Explicit(value);
        }
        ParamAction::Inherit
    }

    fn includes(&self, name: &str) -> bool {
        self.include
            .as_ref()
            .map_or(true, |names| names.contains(name))
    }
}

/// The fully resolved instruction for one parameter. Every parameter
/// lands in exactly one of these buckets.
#[derive(Debug, Clone, Copy)]
enum ParamAction<'a> {
    Skip,
    ForceEmpty,
    Explicit(&'a ParamValue),
    Inherit,
}

/// A request ready for the probe. Equal inputs produce equal output.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub url: String,
    pub json_body: Option<Value>,
}

/// Build the concrete request for an endpoint under a plan.
pub fn build_request(base_url: &str, endpoint: &EndpointSpec, plan: &RequestPlan) -> BuiltRequest {
    let mut path = endpoint.path.clone();
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;
    let mut body = Map::new();

    for param in &endpoint.parameters {
        let name = param.name.as_str();
        match param.location {
            ParamLocation::Path => {
                // Explicit text substitutes; everything else falls back
                // to the placeholder, because a path with a hole in it
                // must never reach the wire.
                let value = match plan.action_for(name) {
                    ParamAction::Explicit(ParamValue::Text(text)) => text.clone(),
                    ParamAction::Explicit(ParamValue::List(items)) => items.join(","),
                    _ => param.placeholder(),
                };
                path = path.replace(&format!("{{{}}}", name), &value);
            }
            ParamLocation::Query => {
                if !plan.includes(name) {
                    continue;
                }
                match plan.action_for(name) {
                    ParamAction::Skip => {}
                    ParamAction::ForceEmpty => {
                        query.append_pair(name, "");
                        has_query = true;
                    }
                    ParamAction::Explicit(value) => match value {
                        ParamValue::Omit => {}
                        ParamValue::Text(text) => {
                            query.append_pair(name, text);
                            has_query = true;
                        }
                        ParamValue::List(items) => {
                            for item in items {
                                query.append_pair(name, item);
                                has_query = true;
                            }
                        }
                    },
                    ParamAction::Inherit => {
                        if param.required {
                            query.append_pair(name, &param.placeholder());
                            has_query = true;
                        } else if let Some(value) = param.declared_value() {
                            query.append_pair(name, &value);
                            has_query = true;
                        }
                    }
                }
            }
            ParamLocation::Body => {
                if !plan.includes(name) {
                    continue;
                }
                match plan.action_for(name) {
                    ParamAction::Skip => {}
                    ParamAction::ForceEmpty => {
                        body.insert(name.to_string(), Value::String(String::new()));
                    }
                    ParamAction::Explicit(value) => match value {
                        ParamValue::Omit => {}
                        ParamValue::Text(text) => {
                            body.insert(name.to_string(), Value::String(text.clone()));
                        }
                        ParamValue::List(items) => {
                            body.insert(
                                name.to_string(),
                                Value::Array(
                                    items.iter().cloned().map(Value::String).collect(),
                                ),
                            );
                        }
                    },
                    ParamAction::Inherit => {
                        if param.required {
                            body.insert(name.to_string(), typed_body_value(param, &param.placeholder()));
                        } else if let Some(value) = param.declared_value() {
                            body.insert(name.to_string(), typed_body_value(param, &value));
                        }
                    }
                }
            }
            ParamLocation::Header => {}
        }
    }

    // A placeholder with no declared parameter goes out literally, the
    // endpoint is still probed.
    if path.contains('{') {
        warn!(%path, "path template names an undeclared parameter");
    }

    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if has_query {
        url.push('?');
        url.push_str(&query.finish());
    }

    let json_body = if endpoint.has_body_input() {
        Some(Value::Object(body))
    } else {
        None
    };

    BuiltRequest { url, json_body }
}

/// Inherited body values follow the declared type; explicit overrides
/// are sent verbatim as strings.
fn typed_body_value(param: &ParamSpec, text: &str) -> Value {
    match param.param_type {
        ParamType::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        ParamType::Number => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        ParamType::Boolean => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        _ => Value::String(text.to_string()),
    }
}
