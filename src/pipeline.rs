// The per-endpoint test pipeline: baseline, negative method, path
// fuzzing, enum validation, combinatorial sampling, logic heuristics,
// auth enforcement, parameter requirement and empty-value sweeps.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::{self, LogicFinding, SchemaVerdict};
use crate::auth::{invalid_token_headers, AuthScheme};
use crate::combos::{CombinationMode, CombinationSpace};
use crate::config::Config;
use crate::errors::TesterResult;
use crate::gemini::GeminiAnalyzer;
use crate::models::{value_text, EndpointSpec, Method, ParamValue};
use crate::probe::{run_bounded, HttpProbe, PreparedProbe, ProbeResult};
use crate::request::{build_request, RequestPlan};
use crate::values::{build_pools, PoolRequest};

/// Values swept through every path parameter.
pub const PATH_FUZZ_VALUES: [&str; 7] = [
    "null",
    "undefined",
    "NaN",
    "0",
    "-1",
    "999999999",
    "INVALID_PATH",
];

/// The out-of-range candidate for enum-typed parameters.
pub const INVALID_ENUM_VALUE: &str = "INVALID_ENUM_VALUE";

/// Caller-selected knobs for one endpoint run.
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub auth: AuthScheme,
    /// Baseline sample text per parameter.
    pub overrides: BTreeMap<String, String>,
    /// Extra failure-mode values, swept one at a time.
    pub fuzz_overrides: BTreeMap<String, String>,
    /// Participating parameters; `None` means all.
    pub include: Option<BTreeSet<String>>,
    /// Parameters whose samples expand into subset combinations.
    pub multi: BTreeSet<String>,
    /// Parameters excluded from the cross product and swept alone.
    pub isolated: BTreeSet<String>,
    pub comb_mode: CombinationMode,
    pub comb_offset: u64,
    pub comb_limit: u64,
    /// Ask the analysis service to narrate the outcome.
    pub run_analysis: bool,
    /// Execute analyzer-suggested filter/sort/edge probes.
    pub run_value_probes: bool,
    /// Skip the removal and empty-value sweeps.
    pub skip_param_checks: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            auth: AuthScheme::Anonymous,
            overrides: BTreeMap::new(),
            fuzz_overrides: BTreeMap::new(),
            include: None,
            multi: BTreeSet::new(),
            isolated: BTreeSet::new(),
            comb_mode: CombinationMode::Minimal,
            comb_offset: 0,
            comb_limit: 64,
            run_analysis: false,
            run_value_probes: false,
            skip_param_checks: false,
        }
    }
}

impl TestOptions {
    fn pool_request(&self) -> PoolRequest {
        PoolRequest {
            samples: self.overrides.clone(),
            fuzz: self.fuzz_overrides.clone(),
            multi: self.multi.clone(),
            include: self.include.clone(),
        }
    }
}

/// The four baseline checks.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineChecks {
    pub status_pass: bool,
    pub json_pass: bool,
    pub time_pass: bool,
    pub schema: SchemaVerdict,
}

impl BaselineChecks {
    pub fn all_passed(&self) -> bool {
        self.status_pass && self.json_pass && self.time_pass
    }
}

/// Contract-declared versus observed requirement for one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamRequirement {
    pub param: String,
    pub required_by_spec: bool,
    pub required_by_test: bool,
    pub status_without: Option<u16>,
}

impl ParamRequirement {
    /// The contract and the live service disagree.
    pub fn mismatch(&self) -> bool {
        self.required_by_spec != self.required_by_test
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmptyValueFinding {
    pub param: String,
    pub status_empty: Option<u16>,
    pub graceful: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NegativeMethodCheck {
    pub test: String,
    pub method: Method,
    pub status: Option<u16>,
    pub passed: bool,
    pub response_preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FuzzVerdict {
    Pass,
    Warn200,
    Fail,
}

impl std::fmt::Display for FuzzVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuzzVerdict::Pass => write!(f, "PASS"),
            FuzzVerdict::Warn200 => write!(f, "WARN (200 OK?)"),
            FuzzVerdict::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathFuzzFinding {
    pub param: String,
    pub value: String,
    pub status: Option<u16>,
    pub verdict: FuzzVerdict,
    pub response_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumCheck {
    pub param: String,
    pub value: String,
    pub status: Option<u16>,
    pub passed: bool,
    pub response_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsetProbe {
    pub value: String,
    pub status: Option<u16>,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSelectorFinding {
    pub param: String,
    pub empty_status: Option<u16>,
    pub empty_keys: Vec<String>,
    pub subset: Option<SubsetProbe>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinationAttempt {
    pub combination: String,
    pub status: Option<u16>,
    pub passed: bool,
    pub body_preview: String,
    pub request_url: String,
    pub request_body: Option<Value>,
    pub assignment: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinatorialOutcome {
    pub results: Vec<CombinationAttempt>,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl CombinatorialOutcome {
    pub fn empty(offset: u64, limit: u64) -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            offset,
            limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GranularFuzzResult {
    pub param: String,
    pub value: String,
    pub result: ProbeResult,
}

/// One executed analyzer-suggested probe.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedProbeOutcome {
    pub param: String,
    pub value: String,
    pub reason: String,
    pub status: Option<u16>,
    pub body_preview: String,
    /// The analyzer's one-sentence judgement of whether the response
    /// honored the suggested value.
    pub logic_verdict: Option<String>,
}

/// Auth probes beyond the plain no-header check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpecialAuthResults {
    /// Token kept, credential parameters removed.
    pub token_only: Option<ProbeResult>,
    /// Credential parameters kept, token removed.
    pub creds_only: Option<ProbeResult>,
    /// A syntactically valid but bogus bearer token.
    pub invalid_token: Option<ProbeResult>,
}

/// Everything one endpoint run produced. Every phase that ran has its
/// findings here; phases after an unauthorized halt stay empty.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunRecord {
    pub endpoint: EndpointSpec,
    pub test_url: String,
    pub baseline: ProbeResult,
    pub baseline_checks: BaselineChecks,
    pub halted_unauthorized: bool,
    pub auth: Option<ProbeResult>,
    pub special_auth: SpecialAuthResults,
    pub param_results: Vec<ParamRequirement>,
    pub empty_results: Vec<EmptyValueFinding>,
    pub negative_results: Vec<NegativeMethodCheck>,
    pub path_fuzz_results: Vec<PathFuzzFinding>,
    pub enum_results: Vec<EnumCheck>,
    pub combinatorial: CombinatorialOutcome,
    pub logic_findings: Vec<LogicFinding>,
    pub field_progression: Vec<FieldSelectorFinding>,
    pub granular_fuzz: Vec<GranularFuzzResult>,
    pub ai_value_results: Vec<SuggestedProbeOutcome>,
    pub ai_analysis: Option<String>,
}

impl TestRunRecord {
    /// Requests without credentials were turned away.
    pub fn auth_enforced(&self) -> bool {
        self.auth
            .as_ref()
            .map_or(false, |res| res.status_is(&[401, 403]))
    }

    /// Requests without credentials were served.
    pub fn auth_open(&self) -> bool {
        self.auth.as_ref().map_or(false, |res| res.ok())
    }

    pub fn baseline_passed(&self) -> bool {
        self.baseline_checks.all_passed()
    }

    fn halted(
        endpoint: EndpointSpec,
        test_url: String,
        baseline: ProbeResult,
        baseline_checks: BaselineChecks,
        opts: &TestOptions,
    ) -> Self {
        Self {
            endpoint,
            test_url,
            baseline,
            baseline_checks,
            halted_unauthorized: true,
            auth: None,
            special_auth: SpecialAuthResults::default(),
            param_results: Vec::new(),
            empty_results: Vec::new(),
            negative_results: Vec::new(),
            path_fuzz_results: Vec::new(),
            enum_results: Vec::new(),
            combinatorial: CombinatorialOutcome::empty(opts.comb_offset, opts.comb_limit),
            logic_findings: Vec::new(),
            field_progression: Vec::new(),
            granular_fuzz: Vec::new(),
            ai_value_results: Vec::new(),
            ai_analysis: if opts.run_analysis {
                Some(
                    "Authentication failed (401). Please check your token/credentials."
                        .to_string(),
                )
            } else {
                None
            },
        }
    }
}

/// Runs the fixed phase sequence for endpoints against a live target.
pub struct TestPipeline<'a> {
    probe: &'a HttpProbe,
    config: &'a Config,
}

impl<'a> TestPipeline<'a> {
    pub fn new(probe: &'a HttpProbe, config: &'a Config) -> Self {
        Self { probe, config }
    }

    fn spacing(&self) -> Duration {
        Duration::from_millis(self.config.probe_spacing_ms)
    }

    async fn pace(&self) {
        let spacing = self.spacing();
        if !spacing.is_zero() {
            tokio::time::sleep(spacing).await;
        }
    }

    /// Run the full phase sequence for one endpoint.
    ///
    /// The only error out of here is an invalid combination window,
    /// raised before anything touches the network. A 401 baseline
    /// halts after phase 1 and returns a minimal record.
    pub async fn run_endpoint(
        &self,
        endpoint: &EndpointSpec,
        opts: &TestOptions,
        analyzer: Option<&GeminiAnalyzer>,
    ) -> TesterResult<TestRunRecord> {
        let space = if endpoint.parameters.is_empty() {
            None
        } else {
            Some(CombinationSpace::new(
                build_pools(endpoint, &opts.pool_request()),
                opts.include.as_ref(),
                &opts.isolated,
            ))
        };
        if opts.comb_mode == CombinationMode::Full {
            if let Some(space) = &space {
                // Fail fast on a window past the end; no probe has run yet.
                space.window(opts.comb_offset, 0)?;
            }
        }

        let base_url = endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| self.config.swagger_base_url.clone());
        let auth_headers = opts.auth.headers();
        let overrides = lift_overrides(&opts.overrides);

        // baseline probe with full sample values
        let baseline_plan = RequestPlan {
            overrides: overrides.clone(),
            include: opts.include.clone(),
            ..Default::default()
        };
        let built = build_request(&base_url, endpoint, &baseline_plan);
        info!(method = %endpoint.method, path = %endpoint.path, "baseline probe");
        let baseline = self
            .probe
            .call(endpoint.method, &built.url, &auth_headers, built.json_body.as_ref())
            .await;
        let baseline_checks = self.check_baseline(endpoint, &baseline);

        if baseline.status == Some(401) {
            warn!(path = %endpoint.path, "baseline unauthorized, halting endpoint run");
            return Ok(TestRunRecord::halted(
                endpoint.clone(),
                built.url,
                baseline,
                baseline_checks,
                opts,
            ));
        }

        // wrong-method rejection
        let negative_results = self.negative_method(endpoint, &base_url, &auth_headers).await;

        // path fuzzing
        let path_fuzz_results = self
            .path_fuzzing(endpoint, &base_url, &auth_headers, &overrides)
            .await;

        // enum validation
        let enum_results = self
            .enum_validation(endpoint, &base_url, &auth_headers, &overrides)
            .await;

        // combinatorial sampling
        let combinatorial = match &space {
            Some(space) => {
                self.combinatorial(endpoint, &base_url, &auth_headers, opts, space)
                    .await?
            }
            None => CombinatorialOutcome::empty(opts.comb_offset, opts.comb_limit),
        };

        // logic and security heuristics over the baseline
        let sent = sent_values(&opts.overrides, built.json_body.as_ref());
        let logic_findings =
            analysis::run_logic_scan(&sent, baseline.json_body.as_ref(), &baseline.body_full);

        let granular_fuzz = self
            .granular_fuzz(endpoint, &base_url, &auth_headers, opts, &overrides)
            .await;

        // auth enforcement
        let (auth, special_auth) = self
            .auth_checks(endpoint, &base_url, &built.url, &baseline, &auth_headers, &overrides)
            .await;

        // requirement and empty-value sweeps
        let (param_results, empty_results) = if opts.skip_param_checks {
            (Vec::new(), Vec::new())
        } else {
            self.param_checks(endpoint, &base_url, &auth_headers, opts, &overrides)
                .await
        };

        let field_progression = self
            .field_progression(endpoint, &base_url, &auth_headers, opts, &overrides)
            .await;

        let ai_value_results = match analyzer.filter(|a| a.configured()) {
            Some(analyzer) if opts.run_value_probes => {
                self.suggested_value_sweep(endpoint, &base_url, &auth_headers, &baseline, analyzer, &overrides)
                    .await
            }
            _ => Vec::new(),
        };

        let ai_analysis = if opts.run_analysis {
            match analyzer.filter(|a| a.configured()) {
                Some(analyzer) => match analyzer.narrate_endpoint(endpoint, &baseline).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(error = %e, "endpoint narration failed");
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        Ok(TestRunRecord {
            endpoint: endpoint.clone(),
            test_url: built.url,
            baseline,
            baseline_checks,
            halted_unauthorized: false,
            auth,
            special_auth,
            param_results,
            empty_results,
            negative_results,
            path_fuzz_results,
            enum_results,
            combinatorial,
            logic_findings,
            field_progression,
            granular_fuzz,
            ai_value_results,
            ai_analysis,
        })
    }

    fn check_baseline(&self, endpoint: &EndpointSpec, result: &ProbeResult) -> BaselineChecks {
        let status_pass = result.ok();
        let json_pass = result.is_json;
        let time_pass =
            result.error.is_none() && result.elapsed_ms < self.config.response_time_limit_ms;
        let schema = if status_pass && result.is_json {
            match (
                endpoint.responses.get("200").and_then(|r| r.schema.as_ref()),
                result.json_body.as_ref(),
            ) {
                (Some(schema), Some(body)) => analysis::shallow_schema_check(body, schema),
                _ => SchemaVerdict::NotApplicable,
            }
        } else {
            SchemaVerdict::NotApplicable
        };
        BaselineChecks {
            status_pass,
            json_pass,
            time_pass,
            schema,
        }
    }

    /// One request with a deliberately wrong method. GET flips to
    /// DELETE; everything else flips to PATCH.
    async fn negative_method(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
    ) -> Vec<NegativeMethodCheck> {
        let wrong = if endpoint.method == Method::GET {
            Method::DELETE
        } else {
            Method::PATCH
        };
        let built = build_request(base_url, endpoint, &RequestPlan::default());
        let result = self
            .probe
            .call(wrong, &built.url, headers, built.json_body.as_ref())
            .await;
        let passed = result.status_is(&[405, 403, 404, 501]);
        info!(method = %wrong, status = ?result.status, passed, "negative method probe");
        vec![NegativeMethodCheck {
            test: format!("Invalid Method ({})", wrong),
            method: wrong,
            status: result.status,
            passed,
            response_preview: result.body_preview,
        }]
    }

    async fn path_fuzzing(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Vec<PathFuzzFinding> {
        let mut jobs = Vec::new();
        let mut labels = Vec::new();
        for param in endpoint.path_params() {
            for value in PATH_FUZZ_VALUES {
                let mut fuzzed = overrides.clone();
                fuzzed.insert(param.name.clone(), ParamValue::text(value));
                let built = build_request(base_url, endpoint, &RequestPlan::with_overrides(fuzzed));
                jobs.push(PreparedProbe {
                    method: endpoint.method,
                    url: built.url,
                    headers: headers.to_vec(),
                    json_body: built.json_body,
                });
                labels.push((param.name.clone(), value.to_string()));
            }
        }
        if jobs.is_empty() {
            return Vec::new();
        }

        let results = run_bounded(self.probe, jobs, self.config.max_in_flight, self.spacing()).await;
        labels
            .into_iter()
            .zip(results)
            .map(|((param, value), result)| {
                let verdict = if result.status == Some(200) {
                    FuzzVerdict::Warn200
                } else if result.status_is(&[404, 400, 422]) {
                    FuzzVerdict::Pass
                } else {
                    FuzzVerdict::Fail
                };
                PathFuzzFinding {
                    param,
                    value,
                    status: result.status,
                    verdict,
                    response_preview: result.body_preview,
                }
            })
            .collect()
    }

    async fn enum_validation(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Vec<EnumCheck> {
        let mut jobs = Vec::new();
        let mut labels = Vec::new();
        for param in endpoint
            .parameters
            .iter()
            .filter(|p| !p.enum_values.is_empty())
        {
            let mut poisoned = overrides.clone();
            poisoned.insert(param.name.clone(), ParamValue::text(INVALID_ENUM_VALUE));
            let built = build_request(base_url, endpoint, &RequestPlan::with_overrides(poisoned));
            jobs.push(PreparedProbe {
                method: endpoint.method,
                url: built.url,
                headers: headers.to_vec(),
                json_body: built.json_body,
            });
            labels.push(param.name.clone());
        }
        if jobs.is_empty() {
            return Vec::new();
        }

        let results = run_bounded(self.probe, jobs, self.config.max_in_flight, self.spacing()).await;
        labels
            .into_iter()
            .zip(results)
            .map(|(param, result)| EnumCheck {
                param,
                value: INVALID_ENUM_VALUE.to_string(),
                status: result.status,
                passed: result.status_is(&[400, 422]),
                response_preview: result.body_preview,
            })
            .collect()
    }

    /// Probe the selected combination window sequentially; every
    /// outcome is recorded whether it passed or not.
    async fn combinatorial(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        opts: &TestOptions,
        space: &CombinationSpace,
    ) -> TesterResult<CombinatorialOutcome> {
        let total = space.total_count();
        let selected = space.select(opts.comb_mode, opts.comb_offset, opts.comb_limit)?;
        info!(total, window = selected.len(), "combinatorial sampling");

        let mut results = Vec::new();
        for assignment in selected {
            let label = space.label(&assignment);
            let built = build_request(
                base_url,
                endpoint,
                &RequestPlan::with_overrides(assignment.clone()),
            );
            let result = self
                .probe
                .call(endpoint.method, &built.url, headers, built.json_body.as_ref())
                .await;
            let passed = matches!(result.status, Some(s) if (200..300).contains(&s));
            results.push(CombinationAttempt {
                combination: label,
                status: result.status,
                passed,
                body_preview: result.body_preview,
                request_url: built.url,
                request_body: built.json_body,
                assignment,
            });
            self.pace().await;
        }

        Ok(CombinatorialOutcome {
            results,
            total_count: total,
            offset: opts.comb_offset,
            limit: opts.comb_limit,
        })
    }

    /// Auth enforcement. Endpoints that take credentials as parameters
    /// get the token/credentials split instead of the plain stripped
    /// check, since stripping everything would just test a broken
    /// login.
    async fn auth_checks(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        test_url: &str,
        baseline: &ProbeResult,
        headers: &[(String, String)],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> (Option<ProbeResult>, SpecialAuthResults) {
        let has_creds = endpoint
            .parameters
            .iter()
            .any(|p| p.name == "username" || p.name == "password");
        let mut special = SpecialAuthResults::default();

        if has_creds {
            let token_plan = RequestPlan {
                overrides: overrides.clone(),
                skip: ["username", "password"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                ..Default::default()
            };
            let token_built = build_request(base_url, endpoint, &token_plan);
            special.token_only = Some(
                self.probe
                    .call(
                        endpoint.method,
                        &token_built.url,
                        headers,
                        token_built.json_body.as_ref(),
                    )
                    .await,
            );

            let creds_built =
                build_request(base_url, endpoint, &RequestPlan::with_overrides(overrides.clone()));
            let creds_only = self
                .probe
                .call(
                    endpoint.method,
                    &creds_built.url,
                    &[],
                    creds_built.json_body.as_ref(),
                )
                .await;
            info!(status = ?creds_only.status, "credentials-without-token probe");
            special.creds_only = Some(creds_only.clone());
            return (Some(creds_only), special);
        }

        let stripped = self.probe.call(endpoint.method, test_url, &[], None).await;
        match stripped.status {
            Some(401) | Some(403) => info!(status = ?stripped.status, "auth enforced"),
            Some(200) => warn!("endpoint served 200 without a token"),
            other => info!(status = ?other, "auth probe inconclusive"),
        }
        special.token_only = Some(baseline.clone());
        special.invalid_token = Some(
            self.probe
                .call(
                    endpoint.method,
                    test_url,
                    &invalid_token_headers(self.config),
                    None,
                )
                .await,
        );
        (Some(stripped), special)
    }

    /// The removal and empty-value sweeps share a target list: query
    /// and body parameters under the include filter.
    async fn param_checks(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        opts: &TestOptions,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> (Vec<ParamRequirement>, Vec<EmptyValueFinding>) {
        let targets: Vec<_> = endpoint
            .removable_params()
            .filter(|p| {
                opts.include
                    .as_ref()
                    .map_or(true, |names| names.contains(&p.name))
            })
            .collect();
        if targets.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let removal_jobs: Vec<PreparedProbe> = targets
            .iter()
            .map(|param| {
                let plan = RequestPlan {
                    overrides: overrides.clone(),
                    skip: [param.name.clone()].into_iter().collect(),
                    include: opts.include.clone(),
                    ..Default::default()
                };
                let built = build_request(base_url, endpoint, &plan);
                PreparedProbe {
                    method: endpoint.method,
                    url: built.url,
                    headers: headers.to_vec(),
                    json_body: built.json_body,
                }
            })
            .collect();
        let removal =
            run_bounded(self.probe, removal_jobs, self.config.max_in_flight, self.spacing()).await;
        let param_results: Vec<ParamRequirement> = targets
            .iter()
            .zip(removal)
            .map(|(param, result)| {
                // A transport failure without the parameter still means
                // the request did not succeed without it.
                let required_by_test = result.status != Some(200) || result.error.is_some();
                info!(
                    param = %param.name,
                    status = ?result.status,
                    required = required_by_test,
                    "removal probe"
                );
                ParamRequirement {
                    param: param.name.clone(),
                    required_by_spec: param.required,
                    required_by_test,
                    status_without: result.status,
                }
            })
            .collect();

        let empty_jobs: Vec<PreparedProbe> = targets
            .iter()
            .map(|param| {
                let plan = RequestPlan {
                    overrides: overrides.clone(),
                    force_empty: [param.name.clone()].into_iter().collect(),
                    include: opts.include.clone(),
                    ..Default::default()
                };
                let built = build_request(base_url, endpoint, &plan);
                PreparedProbe {
                    method: endpoint.method,
                    url: built.url,
                    headers: headers.to_vec(),
                    json_body: built.json_body,
                }
            })
            .collect();
        let empty =
            run_bounded(self.probe, empty_jobs, self.config.max_in_flight, self.spacing()).await;
        let empty_results = targets
            .iter()
            .zip(empty)
            .map(|(param, result)| EmptyValueFinding {
                param: param.name.clone(),
                status_empty: result.status,
                graceful: result.status_is(&[200, 400, 422]),
            })
            .collect();

        (param_results, empty_results)
    }

    /// Field-selector progression: empty selector, then the first
    /// element of a comma-joined selector, comparing top-level keys.
    async fn field_progression(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        opts: &TestOptions,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Vec<FieldSelectorFinding> {
        let mut findings = Vec::new();
        for param in endpoint
            .parameters
            .iter()
            .filter(|p| analysis::is_field_selector(&p.name))
        {
            let current = opts
                .overrides
                .get(&param.name)
                .cloned()
                .filter(|text| !text.is_empty())
                .or_else(|| param.declared_value());

            let mut emptied = overrides.clone();
            emptied.insert(param.name.clone(), ParamValue::text(""));
            let built = build_request(base_url, endpoint, &RequestPlan::with_overrides(emptied));
            let empty_result = self
                .probe
                .call(endpoint.method, &built.url, headers, built.json_body.as_ref())
                .await;
            self.pace().await;

            let mut subset = None;
            if let Some(current) = &current {
                if current.contains(',') {
                    let first = current
                        .split(',')
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    let mut narrowed = overrides.clone();
                    narrowed.insert(param.name.clone(), ParamValue::Text(first.clone()));
                    let built =
                        build_request(base_url, endpoint, &RequestPlan::with_overrides(narrowed));
                    let result = self
                        .probe
                        .call(endpoint.method, &built.url, headers, built.json_body.as_ref())
                        .await;
                    self.pace().await;
                    subset = Some(SubsetProbe {
                        value: first,
                        status: result.status,
                        keys: response_keys(&result),
                    });
                }
            }

            findings.push(FieldSelectorFinding {
                param: param.name.clone(),
                empty_status: empty_result.status,
                empty_keys: response_keys(&empty_result),
                subset,
            });
        }
        findings
    }

    /// Ask the analyzer for filter/sort/edge-case values, run each
    /// suggestion on top of the user baselines, then have the analyzer
    /// judge whether the response honored it. Suggestion failure means
    /// an empty sweep, never a failed run.
    async fn suggested_value_sweep(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        baseline: &ProbeResult,
        analyzer: &GeminiAnalyzer,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Vec<SuggestedProbeOutcome> {
        let suggestions = match analyzer.suggest_tests(endpoint, baseline, None).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(error = %e, "value suggestions unavailable");
                return Vec::new();
            }
        };
        if suggestions.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for case in suggestions.all() {
            let mut adjusted = overrides.clone();
            adjusted.insert(case.param.clone(), ParamValue::Text(case.value.clone()));
            let built = build_request(base_url, endpoint, &RequestPlan::with_overrides(adjusted));
            let result = self
                .probe
                .call(endpoint.method, &built.url, headers, built.json_body.as_ref())
                .await;
            info!(param = %case.param, value = %case.value, status = ?result.status, "suggested probe");

            let sample = match result.json_body.as_ref() {
                Some(body) => analysis::sample_rows(body, 15).0.to_string(),
                None => result.body_preview.clone(),
            };
            let sent = format!("{}={}", case.param, case.value);
            let logic_verdict = match analyzer.verdict(endpoint, &sent, &sample).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(error = %e, "suggested-probe verdict unavailable");
                    None
                }
            };

            out.push(SuggestedProbeOutcome {
                param: case.param.clone(),
                value: case.value.clone(),
                reason: case.reason.clone(),
                status: result.status,
                body_preview: result.body_preview,
                logic_verdict,
            });
            self.pace().await;
        }
        out
    }

    /// One probe per caller-supplied fuzz value, full result kept.
    async fn granular_fuzz(
        &self,
        endpoint: &EndpointSpec,
        base_url: &str,
        headers: &[(String, String)],
        opts: &TestOptions,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Vec<GranularFuzzResult> {
        let mut out = Vec::new();
        for (param, value) in &opts.fuzz_overrides {
            let mut fuzzed = overrides.clone();
            fuzzed.insert(param.clone(), ParamValue::Text(value.clone()));
            let built = build_request(base_url, endpoint, &RequestPlan::with_overrides(fuzzed));
            let result = self
                .probe
                .call(endpoint.method, &built.url, headers, built.json_body.as_ref())
                .await;
            out.push(GranularFuzzResult {
                param: param.clone(),
                value: value.clone(),
                result,
            });
            self.pace().await;
        }
        out
    }
}

fn lift_overrides(overrides: &BTreeMap<String, String>) -> BTreeMap<String, ParamValue> {
    overrides
        .iter()
        .map(|(name, value)| (name.clone(), ParamValue::Text(value.clone())))
        .collect()
}

/// The name/value pairs a baseline request actually carried: the
/// caller's overrides plus the built JSON body.
fn sent_values(
    overrides: &BTreeMap<String, String>,
    json_body: Option<&Value>,
) -> BTreeMap<String, String> {
    let mut sent = overrides.clone();
    if let Some(Value::Object(map)) = json_body {
        for (name, value) in map {
            sent.insert(name.clone(), value_text(value));
        }
    }
    sent
}

fn response_keys(result: &ProbeResult) -> Vec<String> {
    result
        .json_body
        .as_ref()
        .map(analysis::top_level_keys)
        .unwrap_or_default()
}
