/// Integration tests for OpenAPI contract parsing
/// Tests endpoint extraction, example resolution, and body flattening
use specter::contract::parse_endpoints;
use specter::discovery::dedup_endpoints;
use specter::models::{EndpointSpec, Method, ParamLocation, ParamType};
use serde_json::json;

#[test]
fn test_parse_basic_contract() {
    let doc = json!({
        "openapi": "3.0.1",
        "paths": {
            "/products": {
                "get": {
                    "tags": ["products"],
                    "summary": "List products",
                    "operationId": "listProducts",
                    "parameters": [
                        {
                            "name": "category",
                            "in": "query",
                            "required": true,
                            "schema": {"type": "string", "example": "books"}
                        },
                        {
                            "name": "limit",
                            "in": "query",
                            "required": false,
                            "schema": {"type": "integer"}
                        }
                    ],
                    "responses": {
                        "200": {"description": "OK"}
                    }
                }
            },
            "/products/{id}": {
                "get": {
                    "summary": "Get product by id",
                    "parameters": [
                        {
                            "name": "id",
                            "in": "path",
                            "required": true,
                            "schema": {"type": "integer"}
                        }
                    ]
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "catalog");
    assert_eq!(endpoints.len(), 2, "Should parse both paths");

    let list = endpoints
        .iter()
        .find(|e| e.path == "/products")
        .expect("Should have GET /products");
    assert_eq!(list.method, Method::GET);
    assert_eq!(list.group, "catalog");
    assert_eq!(list.tags, vec!["products".to_string()]);
    assert_eq!(list.summary, "List products");
    assert_eq!(list.operation_id, "listProducts");
    assert_eq!(list.parameters.len(), 2);
    assert_eq!(list.key(), "GET:/products");

    let category = list.param("category").expect("Should keep category");
    assert!(category.required);
    assert_eq!(category.location, ParamLocation::Query);
    assert_eq!(category.example.as_deref(), Some("books"));

    let by_id = endpoints
        .iter()
        .find(|e| e.path == "/products/{id}")
        .expect("Should have GET /products/{id}");
    let id = by_id.param("id").expect("Should keep id");
    assert_eq!(id.location, ParamLocation::Path);
    assert_eq!(id.param_type, ParamType::Integer);
}

#[test]
fn test_example_resolution_order() {
    // Five parameters, one per rung of the resolution ladder
    let doc = json!({
        "paths": {
            "/search": {
                "get": {
                    "parameters": [
                        {
                            "name": "direct",
                            "in": "query",
                            "example": "from-param",
                            "schema": {"type": "string", "example": "from-schema"}
                        },
                        {
                            "name": "schema_level",
                            "in": "query",
                            "schema": {"type": "string", "example": "from-schema"}
                        },
                        {
                            "name": "defaulted",
                            "in": "query",
                            "schema": {"type": "string", "default": "from-default"}
                        },
                        {
                            "name": "enumerated",
                            "in": "query",
                            "schema": {"type": "string", "enum": ["first", "second"]}
                        },
                        {
                            "name": "bare",
                            "in": "query",
                            "schema": {"type": "integer"}
                        }
                    ]
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "search");
    assert_eq!(endpoints.len(), 1);
    let endpoint = &endpoints[0];

    let example_of = |name: &str| {
        endpoint
            .param(name)
            .and_then(|p| p.example.clone())
            .unwrap_or_default()
    };
    assert_eq!(example_of("direct"), "from-param");
    assert_eq!(example_of("schema_level"), "from-schema");
    assert_eq!(example_of("defaulted"), "from-default");
    assert_eq!(example_of("enumerated"), "first");
    assert_eq!(example_of("bare"), "1", "Integer falls back to the type example");

    let enumerated = endpoint.param("enumerated").unwrap();
    assert_eq!(enumerated.enum_values, vec!["first", "second"]);
}

#[test]
fn test_null_example_falls_through() {
    // An explicit JSON null example must not shadow the default
    let doc = json!({
        "paths": {
            "/things": {
                "get": {
                    "parameters": [
                        {
                            "name": "kind",
                            "in": "query",
                            "example": null,
                            "schema": {"type": "string", "default": "gadget"}
                        }
                    ]
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "things");
    let kind = endpoints[0].param("kind").expect("Should keep kind");
    assert_eq!(kind.example.as_deref(), Some("gadget"));
}

#[test]
fn test_body_schema_flattening() {
    let doc = json!({
        "paths": {
            "/users": {
                "post": {
                    "parameters": [
                        {
                            "name": "email",
                            "in": "query",
                            "required": false,
                            "schema": {"type": "string"}
                        }
                    ],
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": ["name"],
                                    "properties": {
                                        "name": {"type": "string", "example": "alice"},
                                        "age": {"type": "integer"},
                                        "email": {"type": "string", "example": "clash@x.com"},
                                        "priority": {"type": "string", "enum": ["low", "high"]}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "users");
    assert_eq!(endpoints.len(), 1);
    let endpoint = &endpoints[0];

    assert!(endpoint.request_body_schema.is_some(), "Schema should be kept");
    assert!(endpoint.has_body_input());

    let name = endpoint.param("name").expect("Should flatten name");
    assert_eq!(name.location, ParamLocation::Body);
    assert!(name.required, "Required list should mark name");
    assert_eq!(name.example.as_deref(), Some("alice"));

    let age = endpoint.param("age").expect("Should flatten age");
    assert!(!age.required);
    assert_eq!(age.example.as_deref(), Some("1"), "Integer fallback example");

    let priority = endpoint.param("priority").expect("Should flatten priority");
    assert_eq!(
        priority.enum_values,
        vec!["low", "high"],
        "Body properties keep their enum members"
    );
    assert_eq!(
        priority.example.as_deref(),
        Some("test"),
        "Body example chain stays example/default/type fallback"
    );

    // The declared query parameter wins the name collision
    let email = endpoint.param("email").expect("Should keep email");
    assert_eq!(email.location, ParamLocation::Query);
    let email_count = endpoint.parameters.iter().filter(|p| p.name == "email").count();
    assert_eq!(email_count, 1, "Colliding body property must be skipped");
}

#[test]
fn test_unsupported_methods_skipped() {
    let doc = json!({
        "paths": {
            "/mixed": {
                "get": {"summary": "keep"},
                "head": {"summary": "drop"},
                "options": {"summary": "drop"},
                "trace": {"summary": "drop"},
                "delete": {"summary": "keep"}
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "mixed");
    assert_eq!(endpoints.len(), 2, "Only the five supported verbs are parsed");
    assert!(endpoints.iter().any(|e| e.method == Method::GET));
    assert!(endpoints.iter().any(|e| e.method == Method::DELETE));
}

#[test]
fn test_malformed_entries_are_tolerated() {
    let doc = json!({
        "paths": {
            "/broken": "not an object",
            "/ok": {
                "get": {
                    "parameters": [
                        {"in": "query", "schema": {"type": "string"}},
                        {"name": "good", "in": "query", "schema": {"type": "string"}}
                    ]
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "tolerant");
    assert_eq!(endpoints.len(), 1, "Broken path entry is skipped, not fatal");
    // The unnamed parameter entry is dropped
    assert_eq!(endpoints[0].parameters.len(), 1);
    assert_eq!(endpoints[0].parameters[0].name, "good");
}

#[test]
fn test_responses_and_schema_captured() {
    let doc = json!({
        "paths": {
            "/status": {
                "get": {
                    "responses": {
                        "200": {
                            "description": "Service status",
                            "content": {
                                "application/json": {
                                    "schema": {"type": "object"}
                                }
                            }
                        },
                        "500": {"description": "Broken"}
                    }
                }
            }
        }
    });

    let endpoints = parse_endpoints(&doc, "status");
    let responses = &endpoints[0].responses;
    assert_eq!(responses.len(), 2);

    let ok = responses.get("200").expect("Should keep the 200 response");
    assert_eq!(ok.description, "Service status");
    assert!(ok.schema.is_some(), "application/json schema should be captured");
    assert!(responses.get("500").unwrap().schema.is_none());
}

#[test]
fn test_dedup_first_occurrence_wins() {
    let mut first = EndpointSpec::new(Method::GET, "/users", "service-a");
    first.summary = "original".to_string();
    let mut duplicate = EndpointSpec::new(Method::GET, "/users", "service-b");
    duplicate.summary = "shadowed".to_string();
    let different = EndpointSpec::new(Method::POST, "/users", "service-b");

    let unique = dedup_endpoints(vec![first, duplicate, different]);
    assert_eq!(unique.len(), 2, "Duplicate (method, path) should collapse");
    assert_eq!(unique[0].summary, "original", "First occurrence wins");
    assert_eq!(unique[1].method, Method::POST);
}
