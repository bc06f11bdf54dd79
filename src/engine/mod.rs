//! Recommendation engine
//!
//! Turns accumulated scan history into "what to run next" guidance: an
//! online pipeline classifier (fixed 3 classes), an online module
//! classifier (growing label set, rebuilt from history when the label
//! set grows), a module-interaction transition graph, and per-module
//! parameter-effectiveness statistics. One engine instance is
//! constructed per process and passed by reference into the dispatcher;
//! there is no shared global state.
//!
//! All engine state persists to the data directory after every mutating
//! operation and reloads at process start. Persistence failures are
//! logged and tolerated, the engine keeps operating in memory.

pub mod classifier;
pub mod features;
pub mod graph;
pub mod params;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::record::ScanRecord;
use crate::{EngineError, Result};
use classifier::OnlineClassifier;
use features::{MODULE_DIMS, PIPELINE_DIMS};
use graph::InteractionGraph;
use params::ParamStats;

/// The three pipeline classes
pub const PIPELINE_LABELS: [&str; 3] = ["bug_hunt", "extended_hunt", "repo_hunt"];

const PIPELINE_MODEL_FILE: &str = "pipeline_model.json";
const MODULE_MODEL_FILE: &str = "module_model.json";
const INTERACTIONS_FILE: &str = "module_interactions.json";
const PARAM_STATS_FILE: &str = "param_stats.json";

/// One externally labeled training example (CVE or success datasets)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub vuln_count: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pipeline: String,
    #[serde(default)]
    pub reward: Option<f64>,
}

impl TrainingExample {
    fn features(&self) -> [f64; PIPELINE_DIMS] {
        [
            self.ports.len() as f64,
            f64::from(self.severity.as_deref() == Some("high")),
            self.vuln_count.unwrap_or(0) as f64,
            self.tags.len() as f64,
        ]
    }

    /// Reinforcement weight: explicit reward (zero included, so a
    /// zero-reward example contributes nothing), else vulnerability
    /// count, else a neutral 1.0
    fn weight(&self) -> f64 {
        if let Some(reward) = self.reward {
            return reward.max(0.0);
        }
        self.vuln_count
            .map(|v| v as f64)
            .filter(|w| *w > 0.0)
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModuleModelSnapshot {
    labels: Vec<String>,
    classifier: Option<OnlineClassifier>,
}

pub struct RecommendEngine {
    data_dir: PathBuf,
    pipeline: OnlineClassifier,
    module_labels: Vec<String>,
    module_model: Option<OnlineClassifier>,
    graph: InteractionGraph,
    params: ParamStats,
    threshold: f64,
}

impl RecommendEngine {
    /// Load engine state from the data directory, starting empty where
    /// snapshots are missing or unreadable
    pub fn load<P: AsRef<Path>>(data_dir: P, threshold: f64) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();

        let pipeline = load_snapshot::<OnlineClassifier>(&data_dir, PIPELINE_MODEL_FILE)
            .filter(|m| m.n_classes() == PIPELINE_LABELS.len() && m.n_features() == PIPELINE_DIMS)
            .unwrap_or_else(|| OnlineClassifier::new(PIPELINE_LABELS.len(), PIPELINE_DIMS));

        let (module_labels, module_model) =
            match load_snapshot::<ModuleModelSnapshot>(&data_dir, MODULE_MODEL_FILE) {
                Some(snapshot) => (snapshot.labels, snapshot.classifier),
                None => (Vec::new(), None),
            };

        let graph = load_snapshot::<InteractionGraph>(&data_dir, INTERACTIONS_FILE)
            .unwrap_or_default();
        let params =
            load_snapshot::<ParamStats>(&data_dir, PARAM_STATS_FILE).unwrap_or_default();

        Self {
            data_dir,
            pipeline,
            module_labels,
            module_model,
            graph,
            params,
            threshold,
        }
    }

    /// Current suggestion threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Operator-tunable suggestion threshold, in [0, 1]
    pub fn set_threshold(&mut self, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::Training(format!(
                "threshold {} outside [0, 1]",
                value
            )));
        }
        self.threshold = value;
        Ok(())
    }

    /// Learn from one newly stored result.
    ///
    /// `history` is the full stored sequence with the new record last;
    /// the predecessor for the interaction graph and the refit corpus
    /// for module-label growth both come from it.
    pub fn observe_scan(&mut self, record: &ScanRecord, history: &[ScanRecord]) -> Result<()> {
        if let Some(class) = pipeline_class(&record.module) {
            self.pipeline
                .partial_fit(&features::pipeline_features(record), class, 1.0);
        }

        self.observe_module(record, history);

        // Transitions touching the "unknown" default module would make
        // it a runnable suggestion; skip them like observe_module does.
        if history.len() >= 2 {
            let prev = &history[history.len() - 2].module;
            if prev != "unknown" && record.module != "unknown" {
                self.graph.record(prev, &record.module);
            }
        }
        for pair in record.steps.windows(2) {
            if pair[0].module != "unknown" && pair[1].module != "unknown" {
                self.graph.record(&pair[0].module, &pair[1].module);
            }
        }

        if !record.params.is_empty() {
            let yield_value = record
                .reward
                .unwrap_or_else(|| record.vulnerability_total() as f64);
            self.params.record(&record.module, &record.params, yield_value);
        }

        self.persist();
        Ok(())
    }

    /// Update the module classifier, rebuilding from full history when
    /// a new label grows the output cardinality. The rebuild discards
    /// previously fit decision boundaries; that reset is the price of
    /// the fixed-cardinality online model underneath.
    fn observe_module(&mut self, record: &ScanRecord, history: &[ScanRecord]) {
        if record.module == "unknown" {
            return;
        }

        if !self.module_labels.iter().any(|l| l == &record.module) {
            self.module_labels.push(record.module.clone());
            let mut model = OnlineClassifier::new(self.module_labels.len(), MODULE_DIMS);
            for past in history {
                if let Some(class) = self.module_labels.iter().position(|l| l == &past.module) {
                    model.partial_fit(&features::module_features(past), class, 1.0);
                }
            }
            self.module_model = Some(model);
            return;
        }

        let class = self
            .module_labels
            .iter()
            .position(|l| l == &record.module)
            .unwrap_or(0);
        if let Some(model) = self.module_model.as_mut() {
            model.partial_fit(&features::module_features(record), class, 1.0);
        }
    }

    /// Retrain the pipeline classifier from stored history. Returns how
    /// many results contributed.
    pub fn train_from_history(&mut self, records: &[ScanRecord]) -> usize {
        let mut trained = 0;
        for record in records {
            if let Some(class) = pipeline_class(&record.module) {
                self.pipeline
                    .partial_fit(&features::pipeline_features(record), class, 1.0);
                trained += 1;
            }
        }
        if trained > 0 {
            self.persist();
        }
        trained
    }

    /// Fit the pipeline classifier on an external labeled dataset.
    ///
    /// With `weighted` set, each example's reward (or vulnerability
    /// count) scales its SGD step. Returns the example count and the
    /// Euclidean distance between the pre- and post-training flattened
    /// parameter vectors.
    pub fn train_labeled(&mut self, examples: &[TrainingExample], weighted: bool) -> (usize, f64) {
        let before = self.pipeline.flattened();
        let mut trained = 0;
        for example in examples {
            if let Some(class) = pipeline_class(&example.pipeline) {
                let weight = if weighted { example.weight() } else { 1.0 };
                self.pipeline.partial_fit(&example.features(), class, weight);
                trained += 1;
            }
        }
        let delta = self.pipeline.delta_from(&before);
        if trained > 0 {
            self.persist();
        }
        (trained, delta)
    }

    /// Predicted pipeline for the given aggregate features
    pub fn suggest_pipeline(&self, features: &[f64; PIPELINE_DIMS]) -> String {
        PIPELINE_LABELS[self.pipeline.predict(features)].to_string()
    }

    /// Next-module suggestions.
    ///
    /// When a predecessor is supplied and the graph has data for it,
    /// the highest-count successors win outright. Otherwise classifier
    /// probabilities filtered by the threshold, sorted descending; if
    /// nothing clears the threshold the single best candidate is
    /// returned rather than an empty list.
    pub fn suggest_modules(
        &self,
        after: Option<&str>,
        features: &[f64; MODULE_DIMS],
        limit: usize,
    ) -> Vec<String> {
        if let Some(prev) = after {
            if self.graph.has_successors(prev) {
                return self.graph.top_successors(prev, limit);
            }
        }

        let model = match &self.module_model {
            Some(model) => model,
            None => return Vec::new(),
        };

        let probs = model.predict_proba(features);
        let mut ranked: Vec<(usize, f64)> = probs.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let cleared: Vec<String> = ranked
            .iter()
            .filter(|(_, p)| *p >= self.threshold)
            .take(limit)
            .map(|(i, _)| self.module_labels[*i].clone())
            .collect();

        if cleared.is_empty() {
            ranked
                .first()
                .map(|(i, _)| vec![self.module_labels[*i].clone()])
                .unwrap_or_default()
        } else {
            cleared
        }
    }

    /// Top parameter tuples for a module by average yield
    pub fn suggest_params(&self, module: &str, limit: usize) -> Vec<Vec<String>> {
        self.params.top_params(module, limit)
    }

    /// Write every snapshot to the data directory. Failures are logged,
    /// never propagated: a broken disk must not take down ingestion.
    fn persist(&self) {
        if let Err(e) = fs::create_dir_all(&self.data_dir) {
            log::warn!("engine snapshot dir unavailable: {}", e);
            return;
        }
        save_snapshot(&self.data_dir, PIPELINE_MODEL_FILE, &self.pipeline);
        save_snapshot(
            &self.data_dir,
            MODULE_MODEL_FILE,
            &ModuleModelSnapshot {
                labels: self.module_labels.clone(),
                classifier: self.module_model.clone(),
            },
        );
        save_snapshot(&self.data_dir, INTERACTIONS_FILE, &self.graph);
        save_snapshot(&self.data_dir, PARAM_STATS_FILE, &self.params);
    }
}

fn pipeline_class(label: &str) -> Option<usize> {
    PIPELINE_LABELS.iter().position(|l| *l == label)
}

fn load_snapshot<T: DeserializeOwned>(dir: &Path, file: &str) -> Option<T> {
    let path = dir.join(file);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("snapshot {} unreadable, starting fresh: {}", path.display(), e);
            None
        }
    }
}

fn save_snapshot<T: Serialize>(dir: &Path, file: &str, value: &T) {
    let path = dir.join(file);
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("snapshot {} serialize failed: {}", path.display(), e);
            return;
        }
    };
    if let Err(e) = fs::write(&path, json) {
        log::warn!("snapshot {} write failed: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ScanRecord {
        ScanRecord::from_value(value).expect("record")
    }

    #[test]
    fn test_graph_priority_over_classifier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);

        let first = record(json!({"module": "ping_sweep"}));
        let second = record(json!({"module": "sqli_scanner", "severity": "high"}));
        let history = vec![first.clone()];
        engine.observe_scan(&first, &history).expect("observe");
        let history = vec![first, second.clone()];
        engine.observe_scan(&second, &history).expect("observe");

        let suggested = engine.suggest_modules(Some("ping_sweep"), &[0.0; MODULE_DIMS], 3);
        assert_eq!(suggested[0], "sqli_scanner");
    }

    #[test]
    fn test_fallback_never_empty_once_trained() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 1.0);

        let r = record(json!({"module": "dir_brute", "ports": [80]}));
        engine.observe_scan(&r, std::slice::from_ref(&r)).expect("observe");

        // Threshold of 1.0 clears nothing; fallback returns the single best.
        let suggested = engine.suggest_modules(None, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], 5);
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0], "dir_brute");
    }

    #[test]
    fn test_label_growth_rebuilds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.0);

        let a = record(json!({"module": "a_mod", "ports": [80]}));
        let b = record(json!({"module": "b_mod", "severity": "high"}));
        let history = vec![a.clone()];
        engine.observe_scan(&a, &history).expect("observe");
        assert_eq!(engine.module_labels, vec!["a_mod"]);

        let history = vec![a, b.clone()];
        engine.observe_scan(&b, &history).expect("observe");
        assert_eq!(engine.module_labels, vec!["a_mod", "b_mod"]);
        let model = engine.module_model.as_ref().expect("model");
        assert_eq!(model.n_classes(), 2);
        // Refit consumed the full two-record history.
        assert_eq!(model.updates(), 2);
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut engine = RecommendEngine::load(dir.path(), 0.2);
            let a = record(json!({"module": "ping_sweep"}));
            let b = record(json!({"module": "sqli_scanner"}));
            let h1 = vec![a.clone()];
            engine.observe_scan(&a, &h1).expect("observe");
            let h2 = vec![a, b.clone()];
            engine.observe_scan(&b, &h2).expect("observe");
        }

        let engine = RecommendEngine::load(dir.path(), 0.2);
        assert_eq!(engine.graph.transition_count("ping_sweep", "sqli_scanner"), 1);
        assert_eq!(engine.module_labels.len(), 2);
    }

    #[test]
    fn test_weighted_training_reports_delta() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);

        let examples = vec![TrainingExample {
            ports: vec![80],
            severity: Some("high".to_string()),
            vuln_count: Some(2),
            tags: vec!["web".to_string()],
            pipeline: "extended_hunt".to_string(),
            reward: None,
        }];
        let (trained, delta) = engine.train_labeled(&examples, true);
        assert_eq!(trained, 1);
        assert!(delta > 0.0);
    }

    #[test]
    fn test_explicit_reward_overrides_vuln_yield() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);

        let rewarded = record(json!({
            "module": "sqli_scanner",
            "params": ["--reward-run"],
            "reward": 50.0
        }));
        let vulns = record(json!({
            "module": "sqli_scanner",
            "params": ["--vuln-run"],
            "vulnerabilities": ["x"]
        }));
        let h1 = vec![rewarded.clone()];
        engine.observe_scan(&rewarded, &h1).expect("observe");
        let h2 = vec![rewarded, vulns.clone()];
        engine.observe_scan(&vulns, &h2).expect("observe");

        let top = engine.suggest_params("sqli_scanner", 2);
        assert_eq!(top[0], vec!["--reward-run"]);
        assert_eq!(top[1], vec!["--vuln-run"]);
    }

    #[test]
    fn test_zero_reward_trains_at_zero_weight() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);

        let examples = vec![TrainingExample {
            ports: vec![80],
            severity: Some("high".to_string()),
            vuln_count: Some(3),
            tags: vec!["web".to_string()],
            pipeline: "bug_hunt".to_string(),
            reward: Some(0.0),
        }];
        let (trained, delta) = engine.train_labeled(&examples, true);
        assert_eq!(trained, 1);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn test_unknown_module_kept_out_of_graph() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);

        let anon = record(json!({"target": "x"}));
        let known = record(json!({"module": "ping_sweep"}));
        let h1 = vec![anon.clone()];
        engine.observe_scan(&anon, &h1).expect("observe");
        let h2 = vec![anon.clone(), known.clone()];
        engine.observe_scan(&known, &h2).expect("observe");
        let h3 = vec![anon.clone(), known, anon.clone()];
        engine.observe_scan(&anon, &h3).expect("observe");

        assert!(!engine.graph.has_successors("unknown"));
        assert_eq!(engine.graph.transition_count("ping_sweep", "unknown"), 0);
        assert!(engine
            .suggest_modules(Some("ping_sweep"), &[0.0; MODULE_DIMS], 3)
            .iter()
            .all(|m| m != "unknown"));
    }

    #[test]
    fn test_unlabeled_pipeline_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = RecommendEngine::load(dir.path(), 0.2);
        let records = vec![
            record(json!({"module": "bug_hunt", "ports": [80]})),
            record(json!({"module": "ping_sweep"})),
        ];
        assert_eq!(engine.train_from_history(&records), 1);
    }
}
