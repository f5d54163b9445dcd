/// Live pipeline tests against local canned HTTP responders
/// Covers baseline checks, auth enforcement, fuzz verdicts, and
/// transport failure handling
use specter::analysis::LogicFinding;
use specter::auth::AuthScheme;
use specter::config::Config;
use specter::models::{EndpointSpec, Method, ParamLocation, ParamSpec, ParamType};
use specter::pipeline::{FuzzVerdict, TestOptions, TestPipeline, PATH_FUZZ_VALUES};
use specter::probe::{run_bounded, HttpProbe, PreparedProbe};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

/// Answer every incoming connection with `respond(request_text)` until
/// the test process exits.
fn spawn_server<F>(respond: F) -> String
where
    F: Fn(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("Should bind a local port");
    let addr = listener.local_addr().expect("Should read the local addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(_) => break,
            };
            let request = read_request(&mut stream);
            let _ = stream.write_all(respond(&request).as_bytes());
            let _ = stream.flush();
        }
    });
    format!("http://{}", addr)
}

/// Read one HTTP request: all headers, then a Content-Length body if
/// one was declared.
fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn http_response(status: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}

fn test_config(base: &str) -> Config {
    Config {
        swagger_base_url: base.to_string(),
        timeout_seconds: 2,
        response_time_limit_ms: 5_000,
        probe_spacing_ms: 0,
        ..Config::default()
    }
}

fn items_endpoint() -> EndpointSpec {
    let mut endpoint = EndpointSpec::new(Method::GET, "/items", "store");
    let mut category = ParamSpec::new("category", ParamLocation::Query, true);
    category.example = Some("test".to_string());
    let mut limit = ParamSpec::new("limit", ParamLocation::Query, false);
    limit.param_type = ParamType::Integer;
    limit.example = Some("5".to_string());
    endpoint.parameters = vec![category, limit];
    endpoint
}

fn item_by_id_endpoint() -> EndpointSpec {
    let mut endpoint = EndpointSpec::new(Method::GET, "/items/{id}", "store");
    let mut id = ParamSpec::new("id", ParamLocation::Path, true);
    id.param_type = ParamType::Integer;
    id.example = Some("7".to_string());
    endpoint.parameters = vec![id];
    endpoint
}

#[tokio::test]
async fn test_pipeline_records_healthy_endpoint() {
    let base = spawn_server(|_req| {
        http_response(200, "OK", r#"{"status":"ok","category":"test"}"#)
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let mut opts = TestOptions::default();
    opts.overrides
        .insert("category".to_string(), "test".to_string());

    let record = pipeline
        .run_endpoint(&endpoint, &opts, None)
        .await
        .expect("healthy run should produce a record");

    assert!(!record.halted_unauthorized);
    assert_eq!(record.baseline.status, Some(200));
    assert!(record.baseline.is_json, "Response should parse as JSON");
    assert!(record.baseline_passed(), "All baseline checks should pass");
    assert!(
        record.test_url.ends_with("/items?category=test&limit=5"),
        "Unexpected test URL: {}",
        record.test_url
    );

    // Wrong-method probe flips GET to DELETE; a 200 there is a failure
    assert_eq!(record.negative_results.len(), 1);
    let negative = &record.negative_results[0];
    assert_eq!(negative.method, Method::DELETE);
    assert_eq!(negative.status, Some(200));
    assert!(!negative.passed);

    assert!(record.path_fuzz_results.is_empty(), "No path parameters to fuzz");
    assert!(record.enum_results.is_empty());

    // Minimal sampling probes exactly the baseline combination
    assert_eq!(record.combinatorial.results.len(), 1);
    assert_eq!(record.combinatorial.total_count, 2);
    let attempt = &record.combinatorial.results[0];
    assert_eq!(attempt.combination, "Baseline (+)");
    assert!(attempt.passed);

    // category=test comes back in the body
    assert_eq!(record.logic_findings.len(), 1);
    match &record.logic_findings[0] {
        LogicFinding::Echoed { param, value } => {
            assert_eq!(param, "category");
            assert_eq!(value, "test");
        }
        other => panic!("expected an echo finding, got {:?}", other),
    }

    // Anonymous baseline: the stripped probe sees the same 200
    assert!(record.auth_open(), "Server answers without credentials");
    assert!(!record.auth_enforced());
    assert!(record.special_auth.invalid_token.is_some());
    assert!(record.special_auth.creds_only.is_none());

    // Both query parameters are removable; this server accepts anything
    assert_eq!(record.param_results.len(), 2);
    for requirement in &record.param_results {
        assert!(!requirement.required_by_test);
        assert_eq!(requirement.status_without, Some(200));
    }
    let category = record
        .param_results
        .iter()
        .find(|r| r.param == "category")
        .expect("category requirement result");
    assert!(category.mismatch(), "Spec-required but optional in practice");

    assert_eq!(record.empty_results.len(), 2);
    assert!(record.empty_results.iter().all(|r| r.graceful));

    assert!(record.field_progression.is_empty());
    assert!(record.granular_fuzz.is_empty());
    assert!(record.ai_value_results.is_empty());
    assert!(record.ai_analysis.is_none());
}

#[tokio::test]
async fn test_pipeline_halts_on_unauthorized() {
    let base = spawn_server(|_req| {
        http_response(401, "Unauthorized", r#"{"error":"unauthorized"}"#)
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("unauthorized run still yields a record");

    assert!(record.halted_unauthorized);
    assert_eq!(record.baseline.status, Some(401));
    assert!(!record.baseline_passed());
    assert!(record.auth.is_none(), "Halted runs never reach the auth phase");
    assert!(record.negative_results.is_empty());
    assert!(record.path_fuzz_results.is_empty());
    assert!(record.enum_results.is_empty());
    assert!(record.param_results.is_empty());
    assert!(record.empty_results.is_empty());
    assert!(record.logic_findings.is_empty());
    assert!(record.granular_fuzz.is_empty());
    assert!(record.ai_value_results.is_empty());
    assert!(record.combinatorial.results.is_empty());
    assert_eq!(record.combinatorial.total_count, 0);
    assert!(record.ai_analysis.is_none(), "Analysis was not requested");
}

#[tokio::test]
async fn test_unauthorized_halt_reports_auth_message() {
    let base = spawn_server(|_req| {
        http_response(401, "Unauthorized", r#"{"error":"unauthorized"}"#)
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let mut opts = TestOptions::default();
    opts.run_analysis = true;

    let record = pipeline
        .run_endpoint(&endpoint, &opts, None)
        .await
        .expect("unauthorized run still yields a record");

    assert_eq!(
        record.ai_analysis.as_deref(),
        Some("Authentication failed (401). Please check your token/credentials.")
    );
}

#[tokio::test]
async fn test_pipeline_survives_connection_refused() {
    // Nothing listens on port 1
    let config = test_config("http://127.0.0.1:1");
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("transport failure must not abort the run");

    assert_eq!(record.baseline.status, None);
    assert_eq!(
        record.baseline.error.as_deref(),
        Some("Connection refused or DNS failure")
    );
    assert!(!record.baseline_passed());
    assert!(!record.halted_unauthorized);

    // Every phase still reports in
    assert_eq!(record.negative_results.len(), 1);
    assert_eq!(record.negative_results[0].status, None);
    assert_eq!(record.combinatorial.results.len(), 1);
    assert!(!record.combinatorial.results[0].passed);
    assert_eq!(record.param_results.len(), 2);
    assert!(
        record.param_results.iter().all(|r| r.required_by_test),
        "A removal probe that cannot connect counts as required"
    );
    assert_eq!(record.empty_results.len(), 2);
    assert!(record.empty_results.iter().all(|r| !r.graceful));
    assert!(!record.auth_open());
    assert!(!record.auth_enforced());
}

#[tokio::test]
async fn test_required_param_detected_on_removal() {
    // The service insists on category but tolerates a missing limit
    let base = spawn_server(|request| {
        if request.contains("category=") {
            http_response(200, "OK", r#"{"items":[]}"#)
        } else {
            http_response(400, "Bad Request", r#"{"error":"category is required"}"#)
        }
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("removal run");

    assert_eq!(record.baseline.status, Some(200));

    let category = record
        .param_results
        .iter()
        .find(|r| r.param == "category")
        .expect("category requirement result");
    assert!(category.required_by_test, "Removal hit a 400");
    assert_eq!(category.status_without, Some(400));
    assert!(!category.mismatch(), "Contract and live service agree");

    let limit = record
        .param_results
        .iter()
        .find(|r| r.param == "limit")
        .expect("limit requirement result");
    assert!(!limit.required_by_test, "Removal still answered 200");
    assert_eq!(limit.status_without, Some(200));
}

#[tokio::test]
async fn test_auth_enforcement_detected() {
    let base = spawn_server(|request| {
        if request.to_lowercase().contains("authorization:") {
            http_response(200, "OK", r#"{"ok":true}"#)
        } else {
            http_response(401, "Unauthorized", r#"{"error":"missing token"}"#)
        }
    });
    let config = Config {
        auth_token: "secret123".to_string(),
        ..test_config(&base)
    };
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = items_endpoint();

    let mut opts = TestOptions::default();
    opts.auth = AuthScheme::from_token(&config, &config.auth_token);

    let record = pipeline
        .run_endpoint(&endpoint, &opts, None)
        .await
        .expect("authenticated run");

    assert_eq!(record.baseline.status, Some(200), "Token carries the baseline");
    assert!(!record.halted_unauthorized);
    assert!(record.auth_enforced(), "Stripped probe should hit 401");
    assert!(!record.auth_open());

    let token_only = record
        .special_auth
        .token_only
        .as_ref()
        .expect("token-only result");
    assert_eq!(token_only.status, Some(200));

    // The bogus token has the right shape, so this server takes it
    let invalid = record
        .special_auth
        .invalid_token
        .as_ref()
        .expect("invalid-token result");
    assert_eq!(invalid.status, Some(200));
    assert!(record.special_auth.creds_only.is_none());
}

#[tokio::test]
async fn test_credential_endpoint_auth_split() {
    let base = spawn_server(|request| {
        if request.contains("username") {
            http_response(200, "OK", r#"{"token":"abc123"}"#)
        } else {
            http_response(403, "Forbidden", r#"{"error":"missing credentials"}"#)
        }
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);

    let mut endpoint = EndpointSpec::new(Method::POST, "/login", "auth");
    let mut username = ParamSpec::new("username", ParamLocation::Body, true);
    username.example = Some("alice".to_string());
    let mut password = ParamSpec::new("password", ParamLocation::Body, true);
    password.example = Some("s3cret".to_string());
    endpoint.parameters = vec![username, password];

    let mut opts = TestOptions::default();
    opts.overrides
        .insert("username".to_string(), "alice".to_string());
    opts.overrides
        .insert("password".to_string(), "s3cret".to_string());

    let record = pipeline
        .run_endpoint(&endpoint, &opts, None)
        .await
        .expect("credentialed run");

    assert_eq!(record.baseline.status, Some(200));

    // Credentials stripped from the body, header kept
    let token_only = record
        .special_auth
        .token_only
        .as_ref()
        .expect("token-only probe");
    assert_eq!(token_only.status, Some(403), "Body without credentials is refused");

    // Credentials kept, header dropped: this is the recorded auth verdict
    let creds_only = record
        .special_auth
        .creds_only
        .as_ref()
        .expect("creds-only probe");
    assert_eq!(creds_only.status, Some(200));
    assert!(record.auth_open());
    assert!(record.special_auth.invalid_token.is_none());

    // Removing the username breaks the request, removing the password does not
    let username_req = record
        .param_results
        .iter()
        .find(|r| r.param == "username")
        .expect("username requirement result");
    assert!(username_req.required_by_test);
    assert_eq!(username_req.status_without, Some(403));

    // Neither credential comes back in the token response
    assert_eq!(record.logic_findings.len(), 2);
    assert!(record.logic_findings.iter().all(|f| f.is_warning()));
}

#[tokio::test]
async fn test_path_fuzz_flags_unexpected_200() {
    let base = spawn_server(|_req| http_response(200, "OK", r#"{"id":7}"#));
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = item_by_id_endpoint();

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("fuzz run");

    assert_eq!(record.path_fuzz_results.len(), PATH_FUZZ_VALUES.len());
    assert!(
        record
            .path_fuzz_results
            .iter()
            .all(|f| f.verdict == FuzzVerdict::Warn200),
        "Serving garbage path values with 200 deserves a warning"
    );
    assert!(record.path_fuzz_results.iter().any(|f| f.value == "null"));
}

#[tokio::test]
async fn test_path_fuzz_passes_on_not_found() {
    let base = spawn_server(|request| {
        if request.starts_with("GET /items/7 ") || request.starts_with("DELETE /items/7 ") {
            http_response(200, "OK", r#"{"id":7}"#)
        } else {
            http_response(404, "Not Found", r#"{"error":"no such item"}"#)
        }
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);
    let endpoint = item_by_id_endpoint();

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("fuzz run");

    assert_eq!(record.baseline.status, Some(200));
    assert_eq!(record.path_fuzz_results.len(), PATH_FUZZ_VALUES.len());
    for finding in &record.path_fuzz_results {
        assert_eq!(finding.verdict, FuzzVerdict::Pass, "{} should 404", finding.value);
        assert_eq!(finding.status, Some(404));
    }
}

#[tokio::test]
async fn test_enum_rejection_recorded() {
    let base = spawn_server(|request| {
        if request.contains("order=INVALID_ENUM_VALUE") {
            http_response(400, "Bad Request", r#"{"error":"bad order"}"#)
        } else {
            http_response(200, "OK", r#"{"items":[]}"#)
        }
    });
    let config = test_config(&base);
    let probe = HttpProbe::new(Duration::from_secs(2));
    let pipeline = TestPipeline::new(&probe, &config);

    let mut endpoint = EndpointSpec::new(Method::GET, "/sorted", "store");
    let mut order = ParamSpec::new("order", ParamLocation::Query, true);
    order.enum_values = vec!["asc".to_string(), "desc".to_string()];
    order.example = Some("asc".to_string());
    endpoint.parameters = vec![order];

    let record = pipeline
        .run_endpoint(&endpoint, &TestOptions::default(), None)
        .await
        .expect("enum run");

    assert_eq!(record.baseline.status, Some(200), "Declared member is accepted");
    assert_eq!(record.enum_results.len(), 1);
    let check = &record.enum_results[0];
    assert_eq!(check.param, "order");
    assert_eq!(check.value, "INVALID_ENUM_VALUE");
    assert_eq!(check.status, Some(400));
    assert!(check.passed, "Rejecting an out-of-range value is correct behavior");
}

#[tokio::test]
async fn test_run_bounded_returns_results_in_input_order() {
    let base = spawn_server(|request| {
        let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
        http_response(200, "OK", &format!(r#"{{"path":"{}"}}"#, path))
    });
    let probe = HttpProbe::new(Duration::from_secs(2));

    let jobs: Vec<PreparedProbe> = ["/alpha", "/beta", "/gamma"]
        .iter()
        .map(|path| PreparedProbe {
            method: Method::GET,
            url: format!("{}{}", base, path),
            headers: Vec::new(),
            json_body: None,
        })
        .collect();

    let results = run_bounded(&probe, jobs, 2, Duration::from_millis(0)).await;

    assert_eq!(results.len(), 3);
    for (result, path) in results.iter().zip(["/alpha", "/beta", "/gamma"]) {
        assert_eq!(result.status, Some(200));
        assert!(result.url.ends_with(path), "Results must keep input order");
        let echoed = result
            .json_body
            .as_ref()
            .and_then(|b| b.get("path"))
            .and_then(|p| p.as_str())
            .unwrap_or("");
        assert_eq!(echoed, path);
    }
}

#[tokio::test]
async fn test_probe_timeout_message() {
    let base = spawn_server(|_req| {
        thread::sleep(Duration::from_secs(3));
        http_response(200, "OK", "{}")
    });
    let probe = HttpProbe::new(Duration::from_secs(1));

    let result = probe
        .call(Method::GET, &format!("{}/slow", base), &[], None)
        .await;

    assert_eq!(result.status, None);
    assert_eq!(result.error.as_deref(), Some("Timed out (>1s)"));
}
