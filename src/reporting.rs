// Report rendering over aggregated endpoint records. Markdown out,
// same shape whether one endpoint ran or a hundred.

use chrono::Local;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use crate::models::clip;
use crate::pipeline::TestRunRecord;
use crate::probe::ProbeResult;

/// Aggregate pass/fail view over one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub auth_enforced: usize,
    pub auth_open: usize,
}

impl RunSummary {
    pub fn from_records(records: &[TestRunRecord]) -> RunSummary {
        let mut summary = RunSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            if record.baseline_passed() {
                summary.passed += 1;
            }
            if record.auth_enforced() {
                summary.auth_enforced += 1;
            }
            if record.auth_open() {
                summary.auth_open += 1;
            }
        }
        summary
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 * 100.0 / self.total as f64
    }
}

fn check_mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

/// Distinct error messages a record's failed probes carried, drawn
/// from the conventional message/error/detail body fields.
pub fn distinct_error_messages(record: &TestRunRecord) -> Vec<String> {
    let mut seen = Vec::new();
    let mut probes: Vec<&ProbeResult> = vec![&record.baseline];
    if let Some(auth) = &record.auth {
        probes.push(auth);
    }
    for probe in [
        &record.special_auth.token_only,
        &record.special_auth.creds_only,
        &record.special_auth.invalid_token,
    ]
    .into_iter()
    .flatten()
    {
        probes.push(probe);
    }
    for fuzz in &record.granular_fuzz {
        probes.push(&fuzz.result);
    }

    for probe in probes {
        if !matches!(probe.status, Some(code) if code >= 400) {
            continue;
        }
        let body = match &probe.json_body {
            Some(body) => body,
            None => continue,
        };
        for field in ["message", "error", "detail"] {
            if let Some(text) = body.get(field).and_then(Value::as_str) {
                let message = format!("{} -> {}", probe.status_label(), text);
                if !seen.contains(&message) {
                    seen.push(message);
                }
            }
        }
    }
    seen
}

/// Compact per-group result summary fed to the analysis service.
pub fn group_summary_text(records: &[&TestRunRecord]) -> String {
    let mut lines = Vec::new();
    for record in records {
        let auth = if record.auth_enforced() {
            "enforced"
        } else if record.auth_open() {
            "OPEN"
        } else {
            "n/a"
        };
        let required: Vec<&str> = record
            .param_results
            .iter()
            .filter(|p| p.required_by_test)
            .map(|p| p.param.as_str())
            .collect();
        let optional: Vec<&str> = record
            .param_results
            .iter()
            .filter(|p| !p.required_by_test)
            .map(|p| p.param.as_str())
            .collect();
        let empty_warns: Vec<&str> = record
            .empty_results
            .iter()
            .filter(|e| !e.graceful)
            .map(|e| e.param.as_str())
            .collect();

        lines.push(format!(
            "- {} {}: baseline {} ({}ms, json={})\n  auth: {}\n  required by test: [{}]\n  optional by test: [{}]\n  empty-value warnings: [{}]\n  preview: {}",
            record.endpoint.method,
            record.endpoint.path,
            record.baseline.status_label(),
            record.baseline.elapsed_ms,
            record.baseline.is_json,
            auth,
            required.join(", "),
            optional.join(", "),
            empty_warns.join(", "),
            clip(&record.baseline.body_preview, 500).replace('\n', " "),
        ));
    }
    lines.join("\n")
}

/// Render the full markdown report.
pub fn render_report(
    records: &[TestRunRecord],
    group_analyses: &BTreeMap<String, String>,
) -> String {
    let mut out = String::new();
    let now = Local::now();
    out.push_str("# Swagger-Driven API Test Report\n\n");
    out.push_str(&format!("Generated: {}\n\n", now.format("%Y-%m-%d %H:%M:%S")));

    let summary = RunSummary::from_records(records);
    out.push_str("## Summary\n\n");
    out.push_str("| # | Method | Path | Status | JSON | Time (ms) | Auth | Result |\n");
    out.push_str("|---|--------|------|--------|------|-----------|------|--------|\n");
    for (index, record) in records.iter().enumerate() {
        let auth = if record.auth_enforced() {
            "Enforced"
        } else if record.auth_open() {
            "OPEN"
        } else {
            "-"
        };
        out.push_str(&format!(
            "| {} | {} | `{}` | {} | {} | {} | {} | {} |\n",
            index + 1,
            record.endpoint.method,
            record.endpoint.path,
            record.baseline.status_label(),
            check_mark(record.baseline.is_json),
            record.baseline.elapsed_ms,
            auth,
            if record.baseline_passed() {
                "✅ PASS"
            } else {
                "❌ FAIL"
            },
        ));
    }
    out.push_str(&format!(
        "\n**Pass Rate:** {}/{} ({:.1}%)  \n**Auth Enforced:** {}  \n**Auth Open:** {}\n\n",
        summary.passed,
        summary.total,
        summary.pass_rate(),
        summary.auth_enforced,
        summary.auth_open,
    ));

    // group sections in first-seen order
    let mut group_order: Vec<&str> = Vec::new();
    for record in records {
        if !group_order.contains(&record.endpoint.group.as_str()) {
            group_order.push(&record.endpoint.group);
        }
    }
    for group in &group_order {
        out.push_str(&format!("## Group: {}\n\n", group));
        for record in records.iter().filter(|r| r.endpoint.group == *group) {
            render_endpoint_section(&mut out, record);
        }
        if let Some(analysis) = group_analyses.get(*group) {
            out.push_str(&format!("## AI Analysis: {}\n\n{}\n\n", group, analysis));
        }
    }

    out.push_str(&format!(
        "---\n*Report generated by Swagger-Driven API Test Suite - {}*\n",
        now.format("%Y-%m-%d %H:%M:%S")
    ));
    out
}

fn render_endpoint_section(out: &mut String, record: &TestRunRecord) {
    out.push_str(&format!(
        "### {} `{}`\n\n",
        record.endpoint.method, record.endpoint.path
    ));
    if !record.endpoint.summary.is_empty() {
        out.push_str(&format!("{}\n\n", record.endpoint.summary));
    }
    out.push_str(&format!("Test URL: `{}`\n\n", record.test_url));

    out.push_str("| Check | Result |\n|-------|--------|\n");
    out.push_str(&format!(
        "| Status 200 | {} ({}) |\n",
        check_mark(record.baseline_checks.status_pass),
        record.baseline.status_label(),
    ));
    out.push_str(&format!(
        "| JSON body | {} |\n",
        check_mark(record.baseline_checks.json_pass)
    ));
    out.push_str(&format!(
        "| Response time | {} ({}ms) |\n",
        check_mark(record.baseline_checks.time_pass),
        record.baseline.elapsed_ms,
    ));
    out.push_str(&format!("| Schema | {} |\n\n", record.baseline_checks.schema));

    if record.halted_unauthorized {
        out.push_str(
            "⚠️ **Halted:** baseline returned 401; remaining phases were skipped.\n\n",
        );
        if let Some(analysis) = &record.ai_analysis {
            out.push_str(&format!("AI Analysis: {}\n\n", analysis));
        }
        return;
    }

    if let Some(auth) = &record.auth {
        let verdict = match auth.status {
            Some(401) | Some(403) => format!("✅ Enforced ({})", auth.status_label()),
            Some(200) => "⚠️ OPEN: served 200 without credentials".to_string(),
            _ => format!("ℹ️ Inconclusive ({})", auth.status_label()),
        };
        out.push_str(&format!("**Auth (no credentials):** {}\n", verdict));
    }
    if let Some(invalid) = &record.special_auth.invalid_token {
        out.push_str(&format!(
            "**Auth (invalid token):** {}\n",
            invalid.status_label()
        ));
    }
    if let Some(token_only) = &record.special_auth.token_only {
        out.push_str(&format!(
            "**Auth (token only):** {}\n",
            token_only.status_label()
        ));
    }
    if let Some(creds_only) = &record.special_auth.creds_only {
        out.push_str(&format!(
            "**Auth (credentials only):** {}\n",
            creds_only.status_label()
        ));
    }
    out.push('\n');

    let errors = distinct_error_messages(record);
    if !errors.is_empty() {
        out.push_str("**Error messages observed:**\n");
        for error in errors {
            out.push_str(&format!("- `{}`\n", error));
        }
        out.push('\n');
    }

    for finding in &record.logic_findings {
        let icon = if finding.is_warning() { "⚠️" } else { "ℹ️" };
        out.push_str(&format!("{} {}\n", icon, finding));
    }
    if !record.logic_findings.is_empty() {
        out.push('\n');
    }

    if !record.path_fuzz_results.is_empty() {
        out.push_str("**Path fuzzing:**\n\n| Param | Value | Status | Result |\n|-------|-------|--------|--------|\n");
        for fuzz in &record.path_fuzz_results {
            out.push_str(&format!(
                "| {} | `{}` | {} | {} |\n",
                fuzz.param,
                fuzz.value,
                fuzz.status.map_or("ERR".to_string(), |s| s.to_string()),
                fuzz.verdict,
            ));
        }
        out.push('\n');
    }

    for check in &record.enum_results {
        out.push_str(&format!(
            "Enum `{}` = `{}`: {} {}\n",
            check.param,
            check.value,
            check.status.map_or("ERR".to_string(), |s| s.to_string()),
            check_mark(check.passed),
        ));
    }
    if !record.enum_results.is_empty() {
        out.push('\n');
    }

    if !record.combinatorial.results.is_empty() {
        out.push_str(&format!(
            "**Combinations:** {} of {} (offset {})\n\n| Combination | Status | Result |\n|-------------|--------|--------|\n",
            record.combinatorial.results.len(),
            record.combinatorial.total_count,
            record.combinatorial.offset,
        ));
        for attempt in &record.combinatorial.results {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                attempt.combination,
                attempt.status.map_or("ERR".to_string(), |s| s.to_string()),
                check_mark(attempt.passed),
            ));
        }
        out.push('\n');
    }

    if !record.negative_results.is_empty() {
        out.push_str("| Test | Status | Result |\n|------|--------|--------|\n");
        for check in &record.negative_results {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                check.test,
                check.status.map_or("ERR".to_string(), |s| s.to_string()),
                check_mark(check.passed),
            ));
        }
        out.push('\n');
    }

    if !record.granular_fuzz.is_empty() {
        out.push_str("**Fuzz probes:**\n\n| Param | Value | Status |\n|-------|-------|--------|\n");
        for fuzz in &record.granular_fuzz {
            out.push_str(&format!(
                "| {} | `{}` | {} |\n",
                fuzz.param,
                fuzz.value,
                fuzz.result.status_label(),
            ));
        }
        out.push('\n');
        for fuzz in &record.granular_fuzz {
            if fuzz.result.body_preview.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "<details><summary>{}=`{}` response</summary>\n\n```\n{}\n```\n</details>\n\n",
                fuzz.param,
                fuzz.value,
                clip(&fuzz.result.body_preview, 1500),
            ));
        }
    }

    if !record.ai_value_results.is_empty() {
        out.push_str("**AI-suggested probes:**\n\n| Param | Value | Status | Verdict |\n|-------|-------|--------|---------|\n");
        for probe in &record.ai_value_results {
            let verdict = probe
                .logic_verdict
                .as_deref()
                .map_or("-".to_string(), |text| clip(text, 200).replace('\n', " "));
            out.push_str(&format!(
                "| {} | `{}` | {} | {} |\n",
                probe.param,
                probe.value,
                probe.status.map_or("ERR".to_string(), |s| s.to_string()),
                verdict,
            ));
        }
        out.push('\n');
    }

    if !record.param_results.is_empty() {
        out.push_str("**Parameter requirements:**\n\n| Param | Spec | Observed | Status w/o |\n|-------|------|----------|------------|\n");
        for param in &record.param_results {
            out.push_str(&format!(
                "| {}{} | {} | {} | {} |\n",
                param.param,
                if param.mismatch() { " ⚠️" } else { "" },
                if param.required_by_spec {
                    "required"
                } else {
                    "optional"
                },
                if param.required_by_test {
                    "required"
                } else {
                    "optional"
                },
                param.status_without.map_or("ERR".to_string(), |s| s.to_string()),
            ));
        }
        out.push('\n');
    }

    for empty in &record.empty_results {
        if !empty.graceful {
            out.push_str(&format!(
                "⚠️ Empty `{}` not handled gracefully (status {})\n",
                empty.param,
                empty.status_empty.map_or("ERR".to_string(), |s| s.to_string()),
            ));
        }
    }
    if record.empty_results.iter().any(|e| !e.graceful) {
        out.push('\n');
    }

    for selector in &record.field_progression {
        out.push_str(&format!(
            "Field selector `{}`: empty -> {} (keys: {})",
            selector.param,
            selector
                .empty_status
                .map_or("ERR".to_string(), |s| s.to_string()),
            selector.empty_keys.join(", "),
        ));
        if let Some(subset) = &selector.subset {
            out.push_str(&format!(
                "; `{}` -> {} (keys: {})",
                subset.value,
                subset.status.map_or("ERR".to_string(), |s| s.to_string()),
                subset.keys.join(", "),
            ));
        }
        out.push('\n');
    }
    if !record.field_progression.is_empty() {
        out.push('\n');
    }

    if let Some(analysis) = &record.ai_analysis {
        out.push_str(&format!("**AI Analysis:** {}\n\n", analysis));
    }

    if !record.baseline.body_preview.is_empty() {
        out.push_str(&format!(
            "<details><summary>Baseline response</summary>\n\n```\n{}\n```\n</details>\n\n",
            record.baseline.body_preview,
        ));
    }
}

/// Render and write the report, returning the path written.
pub fn write_report(
    path: &str,
    records: &[TestRunRecord],
    group_analyses: &BTreeMap<String, String>,
) -> Result<String, std::io::Error> {
    let markdown = render_report(records, group_analyses);
    let mut file = File::create(path)?;
    file.write_all(markdown.as_bytes())?;
    Ok(path.to_string())
}
