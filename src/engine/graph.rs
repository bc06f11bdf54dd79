//! Module interaction graph
//!
//! Directed, weighted record of which module historically ran right
//! after which other module. Serialized shape is the bare nested map,
//! `{"ping_sweep": {"sqli_scanner": 3}}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionGraph {
    transitions: HashMap<String, HashMap<String, u64>>,
}

impl InteractionGraph {
    /// Record one observed `prev -> next` transition
    pub fn record(&mut self, prev: &str, next: &str) {
        *self
            .transitions
            .entry(prev.to_string())
            .or_default()
            .entry(next.to_string())
            .or_insert(0) += 1;
    }

    /// Whether any transition data exists for this predecessor
    pub fn has_successors(&self, module: &str) -> bool {
        self.transitions
            .get(module)
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }

    /// Highest-count successors of `module`, count descending with
    /// name ascending as a deterministic tiebreak
    pub fn top_successors(&self, module: &str, limit: usize) -> Vec<String> {
        let mut successors: Vec<(&String, &u64)> = match self.transitions.get(module) {
            Some(map) => map.iter().collect(),
            None => return Vec::new(),
        };
        successors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        successors
            .into_iter()
            .take(limit)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn transition_count(&self, prev: &str, next: &str) -> u64 {
        self.transitions
            .get(prev)
            .and_then(|m| m.get(next))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let mut graph = InteractionGraph::default();
        graph.record("ping_sweep", "sqli_scanner");
        graph.record("ping_sweep", "sqli_scanner");
        graph.record("ping_sweep", "dir_brute");
        assert_eq!(graph.transition_count("ping_sweep", "sqli_scanner"), 2);
        assert_eq!(
            graph.top_successors("ping_sweep", 2),
            vec!["sqli_scanner", "dir_brute"]
        );
    }

    #[test]
    fn test_unknown_predecessor_is_empty() {
        let graph = InteractionGraph::default();
        assert!(!graph.has_successors("nmap"));
        assert!(graph.top_successors("nmap", 3).is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let mut graph = InteractionGraph::default();
        graph.record("a", "b");
        let json = serde_json::to_value(&graph).expect("serialize");
        assert_eq!(json["a"]["b"], 1);
    }
}
