// Combination enumeration: Cartesian product over the main pools plus
// one-at-a-time isolated sweeps, addressed by index so a large space
// never materializes.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{TesterError, TesterResult};
use crate::models::ParamValue;
use crate::values::ParamPools;

/// How much of the combination space one run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMode {
    /// Baseline combination only.
    Minimal,
    /// A window of the full enumeration.
    Full,
}

/// One complete parameter assignment.
pub type Combination = BTreeMap<String, ParamValue>;

/// Deterministic enumeration over an endpoint's value pools.
///
/// Enumeration order: first the Cartesian product of the non-isolated
/// included pools (last parameter varying fastest), then for each
/// isolated parameter its non-baseline values one at a time with every
/// other parameter at baseline.
#[derive(Debug, Clone)]
pub struct CombinationSpace {
    pools: ParamPools,
    included_order: Vec<String>,
    main_order: Vec<String>,
    isolated_order: Vec<String>,
}

impl CombinationSpace {
    pub fn new(
        pools: ParamPools,
        include: Option<&BTreeSet<String>>,
        isolated: &BTreeSet<String>,
    ) -> Self {
        let included_order: Vec<String> = pools
            .order
            .iter()
            .filter(|name| include.map_or(true, |names| names.contains(*name)))
            .cloned()
            .collect();
        let main_order = included_order
            .iter()
            .filter(|name| !isolated.contains(*name))
            .cloned()
            .collect();
        let isolated_order = included_order
            .iter()
            .filter(|name| isolated.contains(*name))
            .cloned()
            .collect();
        Self {
            pools,
            included_order,
            main_order,
            isolated_order,
        }
    }

    /// Size of the main product, saturating at `u64::MAX` for very
    /// wide endpoints. One (the pure baseline) when no main parameters
    /// exist.
    fn main_count(&self) -> u64 {
        self.main_order
            .iter()
            .map(|name| self.pools.pool(name).len() as u64)
            .fold(1, |acc, size| acc.saturating_mul(size))
    }

    fn isolated_sweep(&self, name: &str) -> Vec<ParamValue> {
        let baseline = self.pools.baseline_of(name);
        self.pools
            .pool(name)
            .iter()
            .filter(|value| **value != baseline)
            .cloned()
            .collect()
    }

    /// Total number of combinations without materializing any.
    /// Saturates like `main_count`.
    pub fn total_count(&self) -> u64 {
        let swept = self
            .isolated_order
            .iter()
            .map(|name| self.isolated_sweep(name).len() as u64)
            .fold(0u64, |acc, count| acc.saturating_add(count));
        self.main_count().saturating_add(swept)
    }

    /// The combination at `index` in enumeration order.
    pub fn combination_at(&self, index: u64) -> Option<Combination> {
        let main = self.main_count();
        if index < main {
            let mut assignment = self.pools.baseline.clone();
            let mut remainder = index;
            for name in self.main_order.iter().rev() {
                let pool = self.pools.pool(name);
                let size = pool.len() as u64;
                let pick = (remainder % size) as usize;
                remainder /= size;
                assignment.insert(name.clone(), pool[pick].clone());
            }
            return Some(assignment);
        }

        let mut rest = index - main;
        for name in &self.isolated_order {
            let sweep = self.isolated_sweep(name);
            if rest < sweep.len() as u64 {
                let mut assignment = self.pools.baseline.clone();
                assignment.insert(name.clone(), sweep[rest as usize].clone());
                return Some(assignment);
            }
            rest -= sweep.len() as u64;
        }
        None
    }

    /// The slice `[offset, offset + limit)`. An offset equal to the
    /// total yields an empty window; beyond it is an invalid selection
    /// and fails before anything touches the network.
    pub fn window(&self, offset: u64, limit: u64) -> TesterResult<Vec<Combination>> {
        let total = self.total_count();
        if offset > total {
            return Err(TesterError::InvalidSelection(format!(
                "combination offset {} beyond total {}",
                offset, total
            )));
        }
        let end = offset.saturating_add(limit).min(total);
        let mut out = Vec::new();
        for index in offset..end {
            if let Some(combination) = self.combination_at(index) {
                out.push(combination);
            }
        }
        Ok(out)
    }

    pub fn select(
        &self,
        mode: CombinationMode,
        offset: u64,
        limit: u64,
    ) -> TesterResult<Vec<Combination>> {
        match mode {
            CombinationMode::Minimal => Ok(self.combination_at(0).into_iter().collect()),
            CombinationMode::Full => self.window(offset, limit),
        }
    }

    /// Human label: the non-baseline assignments among the included
    /// parameters, or "Baseline (+)" when everything sits at baseline.
    pub fn label(&self, combination: &Combination) -> String {
        let mut parts = Vec::new();
        for name in &self.included_order {
            if let Some(value) = combination.get(name) {
                if *value != self.pools.baseline_of(name) {
                    parts.push(format!("{}={}", name, value));
                }
            }
        }
        if parts.is_empty() {
            "Baseline (+)".to_string()
        } else {
            parts.join(", ")
        }
    }
}
