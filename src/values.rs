// Candidate value pools per parameter, baseline always at index zero

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{EndpointSpec, ParamType, ParamValue};

/// Caller inputs controlling pool construction for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct PoolRequest {
    /// Baseline sample text per parameter. Comma-joined text splits
    /// into several samples.
    pub samples: BTreeMap<String, String>,
    /// One extra failure-mode candidate per parameter.
    pub fuzz: BTreeMap<String, String>,
    /// Parameters whose samples expand into subset combinations.
    pub multi: BTreeSet<String>,
    /// Participating parameters; `None` means all of them.
    pub include: Option<BTreeSet<String>>,
}

impl PoolRequest {
    pub fn included(&self, name: &str) -> bool {
        self.include
            .as_ref()
            .map_or(true, |names| names.contains(name))
    }
}

/// Ordered value pools for an endpoint's parameters. The pool order is
/// the endpoint's declaration order, and `pools[name][0]` is that
/// parameter's baseline value.
#[derive(Debug, Clone)]
pub struct ParamPools {
    pub order: Vec<String>,
    pub pools: BTreeMap<String, Vec<ParamValue>>,
    pub baseline: BTreeMap<String, ParamValue>,
}

impl ParamPools {
    pub fn pool(&self, name: &str) -> &[ParamValue] {
        self.pools.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn baseline_of(&self, name: &str) -> ParamValue {
        self.baseline
            .get(name)
            .cloned()
            .unwrap_or(ParamValue::Omit)
    }
}

/// Build the value pool for every parameter of an endpoint.
///
/// Excluded parameters get a degenerate single-value pool: the
/// placeholder when required, `Omit` when optional, so they hold still
/// while included parameters vary.
pub fn build_pools(endpoint: &EndpointSpec, request: &PoolRequest) -> ParamPools {
    let mut order = Vec::new();
    let mut pools = BTreeMap::new();
    let mut baseline = BTreeMap::new();

    for param in &endpoint.parameters {
        let name = param.name.clone();
        order.push(name.clone());

        let pool = if !request.included(&name) {
            if param.required {
                vec![ParamValue::Text(param.placeholder())]
            } else {
                vec![ParamValue::Omit]
            }
        } else {
            let mut samples: Vec<String> = Vec::new();
            if let Some(text) = request.samples.get(&name) {
                if !text.is_empty() {
                    if text.contains(',') {
                        samples.extend(text.split(',').map(|s| s.trim().to_string()));
                    } else {
                        samples.push(text.clone());
                    }
                }
            }
            if let Some(fuzz) = request.fuzz.get(&name) {
                if !fuzz.is_empty() {
                    samples.push(fuzz.clone());
                }
            }
            // Booleans cover both branches even when the user supplied
            // only one of them.
            if param.param_type == ParamType::Boolean {
                if !samples.iter().any(|s| s.eq_ignore_ascii_case("true")) {
                    samples.push("true".to_string());
                }
                if !samples.iter().any(|s| s.eq_ignore_ascii_case("false")) {
                    samples.push("false".to_string());
                }
            }

            let candidates: Vec<ParamValue> = if request.multi.contains(&name) {
                subsets_by_size(&samples)
                    .into_iter()
                    .map(ParamValue::List)
                    .collect()
            } else {
                samples.into_iter().map(ParamValue::Text).collect()
            };

            let mut deduped: Vec<ParamValue> = Vec::new();
            for candidate in candidates {
                if !deduped.contains(&candidate) {
                    deduped.push(candidate);
                }
            }

            if !deduped.is_empty() {
                if !param.required && !deduped.contains(&ParamValue::Omit) {
                    deduped.push(ParamValue::Omit);
                }
                deduped
            } else if param.required {
                vec![ParamValue::Text(param.placeholder()), ParamValue::Omit]
            } else {
                vec![ParamValue::Omit]
            }
        };

        baseline.insert(name.clone(), pool[0].clone());
        pools.insert(name, pool);
    }

    ParamPools {
        order,
        pools,
        baseline,
    }
}

/// Every non-empty subset of `items`, smallest subsets first, input
/// order within each size. This is the expansion for comma-joined
/// multi-select samples.
fn subsets_by_size(items: &[String]) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    for size in 1..=items.len() {
        push_combinations(items, size, &mut out);
    }
    out
}

fn push_combinations(items: &[String], size: usize, out: &mut Vec<Vec<String>>) {
    let n = items.len();
    if size == 0 || size > n {
        return;
    }
    let mut indices: Vec<usize> = (0..size).collect();
    loop {
        out.push(indices.iter().map(|&i| items[i].clone()).collect());
        // advance to the next index combination
        let mut pos = size;
        loop {
            if pos == 0 {
                return;
            }
            pos -= 1;
            if indices[pos] != pos + n - size {
                break;
            }
            if pos == 0 {
                return;
            }
        }
        indices[pos] += 1;
        for later in pos + 1..size {
            indices[later] = indices[later - 1] + 1;
        }
    }
}
