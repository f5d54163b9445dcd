// Main CLI entry point for specter
// Uses clap for argument parsing

use clap::{Arg, Command};
use specter::auth::AuthScheme;
use specter::config::Config;
use specter::discovery::EndpointCatalog;
use specter::gemini::GeminiAnalyzer;
use specter::jira;
use specter::models::EndpointSpec;
use specter::pipeline::{TestOptions, TestPipeline, TestRunRecord};
use specter::probe::HttpProbe;
use specter::reporting::{group_summary_text, write_report, RunSummary};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("specter")
        .version("1.0.0")
        .about("Swagger-driven API behavior test engine")
        .after_help("EXAMPLES:\n  specter --config config.json\n  specter --list\n  specter --group catalog --skip-ai\n  specter --tag orders --report orders_report.md\n  specter --jira PROJ-123")
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .num_args(1)
            .default_value("config.json")
            .help("Path to the configuration file"))
        .arg(Arg::new("group")
            .short('g')
            .long("group")
            .num_args(1)
            .help("Only test endpoints whose group name contains this text"))
        .arg(Arg::new("tag")
            .short('t')
            .long("tag")
            .num_args(1)
            .help("Only test endpoints carrying this OpenAPI tag"))
        .arg(Arg::new("list")
            .short('l')
            .long("list")
            .action(clap::ArgAction::SetTrue)
            .help("List discovered endpoints and exit without testing"))
        .arg(Arg::new("jira")
            .long("jira")
            .num_args(1)
            .help("Scope the run to endpoints relevant to a Jira issue key or URL"))
        .arg(Arg::new("skip_ai")
            .long("skip-ai")
            .action(clap::ArgAction::SetTrue)
            .help("Disable AI analysis even when an API key is configured"))
        .arg(Arg::new("ai_values")
            .long("ai-values")
            .action(clap::ArgAction::SetTrue)
            .help("Also execute AI-suggested filter/sort/edge-case probes per endpoint"))
        .arg(Arg::new("skip_params")
            .long("skip-params")
            .action(clap::ArgAction::SetTrue)
            .help("Skip the per-parameter removal and empty-value sweeps"))
        .arg(Arg::new("report")
            .short('r')
            .long("report")
            .num_args(1)
            .default_value("api_report.md")
            .help("Path of the markdown report to write"))
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str()).unwrap_or("config.json");
    let report_path = matches.get_one::<String>("report").map(|s| s.as_str()).unwrap_or("api_report.md");
    let group_filter = matches.get_one::<String>("group").cloned();
    let tag_filter = matches.get_one::<String>("tag").cloned();
    let jira_issue = matches.get_one::<String>("jira").cloned();
    let list_only = matches.get_flag("list");
    let skip_ai = matches.get_flag("skip_ai");
    let ai_values = matches.get_flag("ai_values");
    let skip_params = matches.get_flag("skip_params");

    println!("=== Swagger-Driven API Test Suite ===");

    let config = Config::load(Path::new(config_path)).unwrap_or_else(|e| {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    });

    let auth = if config.has_auth_token() {
        AuthScheme::from_token(&config, &config.auth_token)
    } else {
        println!("Warning: no auth token configured. Probing anonymously.");
        AuthScheme::Anonymous
    };

    let probe = HttpProbe::new(Duration::from_secs(config.timeout_seconds));
    let analyzer = GeminiAnalyzer::new(&config.gemini_api_key);
    let run_ai = !skip_ai && analyzer.configured();
    if !skip_ai && !analyzer.configured() {
        println!("Note: no gemini_api_key configured; AI analysis disabled.");
    }

    println!("Discovering endpoints...");
    let catalog = EndpointCatalog::new();
    let endpoints = match catalog.get_or_discover(&probe.client, &config).await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };
    if endpoints.is_empty() {
        eprintln!("[ERROR] no endpoints discovered; check swagger_base_url and services in {}", config_path);
        std::process::exit(1);
    }
    println!("Discovered {} endpoints.", endpoints.len());

    let mut selected: Vec<&EndpointSpec> = endpoints.iter().collect();

    // A Jira issue scopes the run to the endpoints the analyzer maps it to
    if let Some(issue_ref) = &jira_issue {
        if !analyzer.configured() {
            eprintln!("[ERROR] --jira requires a configured gemini_api_key to map the issue onto endpoints");
            std::process::exit(1);
        }
        let issue = match jira::fetch_issue(&probe.client, &config, issue_ref).await {
            Ok(issue) => issue,
            Err(e) => {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        };
        println!("Scoping run from {}: {}", issue.key, issue.summary);
        match analyzer.scope_from_issue(&issue, endpoints).await {
            Ok(scope) => {
                let mut scoped = Vec::new();
                for rec in &scope.recommendations {
                    if let Some(endpoint) = endpoints.get(rec.index) {
                        println!("  [{}] {} {} - {}", rec.index, endpoint.method, endpoint.path, rec.reason);
                        scoped.push(endpoint);
                    }
                }
                if scoped.is_empty() {
                    println!("No endpoints recommended for the issue; testing the full catalog.");
                } else {
                    selected = scoped;
                }
            }
            Err(e) => {
                println!("Warning: issue scoping failed ({}); testing the full catalog.", e);
            }
        }
    }

    if let Some(group) = &group_filter {
        let needle = group.to_lowercase();
        selected.retain(|e| e.group.to_lowercase().contains(&needle));
        if selected.is_empty() {
            eprintln!("[ERROR] no endpoints match group filter '{}'", group);
            std::process::exit(1);
        }
    }
    if let Some(tag) = &tag_filter {
        let needle = tag.to_lowercase();
        selected.retain(|e| e.tags.iter().any(|t| t.to_lowercase() == needle));
        if selected.is_empty() {
            eprintln!("[ERROR] no endpoints match tag filter '{}'", tag);
            std::process::exit(1);
        }
    }

    if list_only {
        for (index, endpoint) in selected.iter().enumerate() {
            let method = endpoint.method.to_string();
            let summary = if endpoint.summary.is_empty() {
                String::new()
            } else {
                format!(" - {}", endpoint.summary)
            };
            println!(
                "{:>3}. {:<6} {} [{}] ({} params){}",
                index,
                method,
                endpoint.path,
                endpoint.group,
                endpoint.parameters.len(),
                summary
            );
        }
        return;
    }

    let pipeline = TestPipeline::new(&probe, &config);
    let mut records: Vec<TestRunRecord> = Vec::new();

    println!("Testing {} endpoints...", selected.len());
    for (index, endpoint) in selected.iter().enumerate() {
        println!("[{}/{}] {} {}", index + 1, selected.len(), endpoint.method, endpoint.path);
        let opts = TestOptions {
            auth: auth.clone(),
            run_analysis: run_ai,
            run_value_probes: run_ai && ai_values,
            skip_param_checks: skip_params,
            ..TestOptions::default()
        };
        let analyzer_ref = if run_ai { Some(&analyzer) } else { None };
        match pipeline.run_endpoint(endpoint, &opts, analyzer_ref).await {
            Ok(record) => {
                let verdict = if record.halted_unauthorized {
                    "HALTED (401)"
                } else if record.baseline_passed() {
                    "PASS"
                } else {
                    "FAIL"
                };
                println!("  -> {} [{}]", record.baseline.status_label(), verdict);
                records.push(record);
            }
            Err(e) => {
                eprintln!("[ERROR] {} {}: {}", endpoint.method, endpoint.path, e);
            }
        }
        // Stay polite between endpoints
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Group-level AI analysis over the collected records
    let mut group_analyses: BTreeMap<String, String> = BTreeMap::new();
    if run_ai && !records.is_empty() {
        let mut groups: Vec<String> = Vec::new();
        for record in &records {
            if !groups.contains(&record.endpoint.group) {
                groups.push(record.endpoint.group.clone());
            }
        }
        for group in groups {
            let members: Vec<&TestRunRecord> = records
                .iter()
                .filter(|r| r.endpoint.group == group)
                .collect();
            println!("Analyzing group '{}' ({} endpoints)...", group, members.len());
            match analyzer.analyze_group(&group, &group_summary_text(&members)).await {
                Ok(text) => {
                    group_analyses.insert(group, text);
                }
                Err(e) => {
                    println!("Warning: group analysis failed: {}", e);
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    match write_report(report_path, &records, &group_analyses) {
        Ok(path) => println!("Report written to {}", path),
        Err(e) => eprintln!("[ERROR] could not write report: {}", e),
    }

    let summary = RunSummary::from_records(&records);
    println!(
        "Done. {}/{} endpoints passed baseline checks ({:.1}%), auth enforced on {}, open on {}.",
        summary.passed,
        summary.total,
        summary.pass_rate(),
        summary.auth_enforced,
        summary.auth_open
    );
}
