// Contract parsing: OpenAPI documents in, endpoint definitions out

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{
    value_text, EndpointSpec, Method, ParamLocation, ParamSpec, ParamType, ResponseSpec,
};

/// Parse one OpenAPI document into endpoint definitions.
///
/// Tolerant by design: a malformed path or operation is skipped, never
/// fatal, so one broken group cannot sink discovery.
pub fn parse_endpoints(doc: &Value, group: &str) -> Vec<EndpointSpec> {
    let mut endpoints = Vec::new();
    let paths = match doc.get("paths").and_then(Value::as_object) {
        Some(p) => p,
        None => return endpoints,
    };

    for (path, operations) in paths {
        let operations = match operations.as_object() {
            Some(ops) => ops,
            None => continue,
        };
        for (method_key, details) in operations {
            let method = match Method::parse(method_key) {
                Some(m) => m,
                None => continue,
            };
            let details = match details.as_object() {
                Some(d) => d,
                None => continue,
            };

            let mut endpoint = EndpointSpec::new(method, path, group);
            endpoint.tags = details
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| tags.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default();
            endpoint.summary = details
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            endpoint.operation_id = details
                .get("operationId")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();

            if let Some(raw_params) = details.get("parameters").and_then(Value::as_array) {
                for raw in raw_params {
                    if let Some(param) = parse_parameter(raw) {
                        endpoint.parameters.push(param);
                    }
                }
            }

            endpoint.responses = parse_responses(details.get("responses"));

            if let Some(schema) = details
                .get("requestBody")
                .and_then(|rb| rb.pointer("/content/application~1json/schema"))
            {
                endpoint.request_body_schema = Some(schema.clone());
                flatten_body_schema(schema, &mut endpoint.parameters);
            }

            debug!(
                method = %endpoint.method,
                path = %endpoint.path,
                params = endpoint.parameters.len(),
                "parsed endpoint"
            );
            endpoints.push(endpoint);
        }
    }
    endpoints
}

/// One `parameters` entry into a `ParamSpec`. Unnamed entries are
/// useless downstream and get dropped.
fn parse_parameter(raw: &Value) -> Option<ParamSpec> {
    let name = raw.get("name").and_then(Value::as_str)?;
    let schema = raw.get("schema").cloned().unwrap_or(Value::Null);

    let mut param = ParamSpec::new(
        name,
        ParamLocation::parse(raw.get("in").and_then(Value::as_str).unwrap_or("query")),
        raw.get("required").and_then(Value::as_bool).unwrap_or(false),
    );
    param.description = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    param.param_type =
        ParamType::parse(schema.get("type").and_then(Value::as_str).unwrap_or("string"));
    param.default = schema
        .get("default")
        .filter(|v| !v.is_null())
        .map(value_text);
    param.enum_values = schema
        .get("enum")
        .and_then(Value::as_array)
        .map(|vals| vals.iter().map(value_text).collect())
        .unwrap_or_default();

    // Example resolution: declared example on the parameter, then on
    // the schema, then the default, then the first enum member, then a
    // type-keyed placeholder.
    let example = raw
        .get("example")
        .filter(|v| !v.is_null())
        .or_else(|| schema.get("example").filter(|v| !v.is_null()))
        .map(value_text)
        .or_else(|| param.default.clone())
        .or_else(|| param.enum_values.first().cloned())
        .unwrap_or_else(|| param.param_type.fallback_example().to_string());
    param.example = Some(example);

    Some(param)
}

fn parse_responses(raw: Option<&Value>) -> BTreeMap<String, ResponseSpec> {
    let mut responses = BTreeMap::new();
    let raw = match raw.and_then(Value::as_object) {
        Some(r) => r,
        None => return responses,
    };
    for (code, details) in raw {
        responses.insert(
            code.clone(),
            ResponseSpec {
                description: details
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                schema: details
                    .pointer("/content/application~1json/schema")
                    .cloned(),
            },
        );
    }
    responses
}

/// Flatten top-level request-body properties into body parameters so
/// every later phase sees one uniform parameter list. A property whose
/// name collides with a declared parameter is skipped.
fn flatten_body_schema(schema: &Value, parameters: &mut Vec<ParamSpec>) {
    let properties = match schema.get("properties").and_then(Value::as_object) {
        Some(p) => p,
        None => return,
    };
    let required_fields: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, prop) in properties {
        if parameters.iter().any(|p| &p.name == name) {
            continue;
        }
        let mut param = ParamSpec::new(
            name,
            ParamLocation::Body,
            required_fields.contains(&name.as_str()),
        );
        param.param_type =
            ParamType::parse(prop.get("type").and_then(Value::as_str).unwrap_or("string"));
        param.default = prop
            .get("default")
            .filter(|v| !v.is_null())
            .map(value_text);
        param.enum_values = prop
            .get("enum")
            .and_then(Value::as_array)
            .map(|vals| vals.iter().map(value_text).collect())
            .unwrap_or_default();

        let example = prop
            .get("example")
            .filter(|v| !v.is_null())
            .or_else(|| prop.get("default").filter(|v| !v.is_null()))
            .map(value_text)
            .filter(|text| !text.is_empty());
        param.example =
            Some(example.unwrap_or_else(|| param.param_type.fallback_example().to_string()));
        parameters.push(param);
    }
}
