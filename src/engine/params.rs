//! Parameter-effectiveness statistics
//!
//! Per module, tracks how much yield (vulnerabilities found, or an
//! explicit reward) each parameter tuple has produced across runs, and
//! ranks tuples by average yield.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamUsage {
    pub params: Vec<String>,
    pub total_yield: f64,
    pub runs: u64,
}

impl ParamUsage {
    pub fn average_yield(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_yield / self.runs as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamStats {
    modules: HashMap<String, Vec<ParamUsage>>,
}

impl ParamStats {
    /// Record one invocation of `module` with `params` and its yield
    pub fn record(&mut self, module: &str, params: &[String], yield_value: f64) {
        let usages = self.modules.entry(module.to_string()).or_default();
        match usages.iter_mut().find(|u| u.params == params) {
            Some(usage) => {
                usage.total_yield += yield_value;
                usage.runs += 1;
            }
            None => usages.push(ParamUsage {
                params: params.to_vec(),
                total_yield: yield_value,
                runs: 1,
            }),
        }
    }

    /// Top parameter tuples for `module` by average yield, descending
    pub fn top_params(&self, module: &str, limit: usize) -> Vec<Vec<String>> {
        let mut usages: Vec<&ParamUsage> = match self.modules.get(module) {
            Some(usages) => usages.iter().collect(),
            None => return Vec::new(),
        };
        usages.sort_by(|a, b| {
            b.average_yield()
                .partial_cmp(&a.average_yield())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.runs.cmp(&a.runs))
        });
        usages
            .into_iter()
            .take(limit)
            .map(|u| u.params.clone())
            .collect()
    }
}
