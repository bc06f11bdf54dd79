//! Request dispatcher
//!
//! Maps each approved alias to one handler composing the result store
//! and the recommendation engine. Authorization runs before anything
//! else for every request; unknown and unapproved aliases fail with the
//! same generic error so the alias surface cannot be enumerated.
//!
//! `scan` is the only alias that mutates the result store. Secondary
//! features riding on the ingestion path (model training, enrichment)
//! return explicit errors that the dispatcher logs and swallows: a
//! defective model must never fail a scanner's write.

use chrono::Utc;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::auth::AliasRegistry;
use crate::config::EngineConfig;
use crate::engine::{features, RecommendEngine, TrainingExample};
use crate::enrich::{Enricher, UNAVAILABLE};
use crate::record::ScanRecord;
use crate::report::{MarkdownRenderer, ReportRenderer};
use crate::store::ResultStore;
use crate::{EngineError, Result};

/// Sentinel file whose presence tells external job runners to hold off
pub const PAUSE_SENTINEL: &str = "paused";
const NOTES_FILE: &str = "operator_notes.log";
const CHAT_CONTEXT: usize = 5;

pub struct Dispatcher {
    registry: AliasRegistry,
    store: ResultStore,
    engine: RecommendEngine,
    renderer: Box<dyn ReportRenderer>,
    enricher: Option<Box<dyn Enricher>>,
    data_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        let registry = match &config.alias_file {
            Some(path) => AliasRegistry::from_file(path),
            None => AliasRegistry::default_approved(),
        };
        let store = ResultStore::new(
            &config.data_dir,
            config.encrypt_key.as_deref(),
            config.integrity_key.as_deref(),
        );
        let engine = RecommendEngine::load(&config.data_dir, config.suggestion_threshold);

        Self {
            registry,
            store,
            engine,
            renderer: Box::new(MarkdownRenderer),
            enricher: None,
            data_dir: config.data_dir.clone(),
        }
    }

    /// Plug in a text-generation collaborator
    pub fn with_enricher(mut self, enricher: Box<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Swap the report renderer
    pub fn with_renderer(mut self, renderer: Box<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Handle one parsed request, always producing a response object
    pub fn handle(&mut self, request: Value) -> Value {
        let alias = request
            .get("alias")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if !self.registry.is_approved(&alias) {
            return EngineError::NotApproved.to_response();
        }

        let outcome = match alias.as_str() {
            "scan" => self.handle_scan(&request),
            "results" => self.handle_results(&request),
            "search" => self.handle_search(&request),
            "purge" => self.handle_purge(&request),
            "report" => self.handle_report(&request),
            "stats" => self.handle_stats(),
            "train" => self.handle_train(),
            "train_cve" => self.handle_train_labeled(&request, false),
            "train_success" => self.handle_train_labeled(&request, true),
            "modules" => self.handle_modules(&request),
            "params" => self.handle_params(&request),
            "operator" => self.handle_operator(&request),
            "chat" => self.handle_chat(&request),
            "plan" => self.handle_plan(&request),
            "explore" => self.handle_explore(&request),
            // Approved in the whitelist but not served by this build.
            _ => Err(EngineError::NotApproved),
        };

        match outcome {
            Ok(response) => response,
            Err(e) => {
                log::debug!("alias {} failed: {}", alias, e);
                e.to_response()
            }
        }
    }

    fn handle_scan(&mut self, request: &Value) -> Result<Value> {
        let raw = request
            .get("result")
            .cloned()
            .ok_or_else(|| EngineError::Invalid("missing result".to_string()))?;
        let mut record = ScanRecord::from_value(raw)
            .map_err(|e| EngineError::Invalid(format!("invalid result: {}", e)))?;

        record.enrich(Utc::now());
        self.apply_enrichment(&mut record);

        let history = self.store.append(record.clone())?;

        // Best-effort retraining; ingestion already succeeded.
        if let Err(e) = self.engine.observe_scan(&record, &history) {
            log::warn!("model update failed after scan ingest: {}", e);
        }

        Ok(json!({"status": "ok", "stored": history.len()}))
    }

    fn apply_enrichment(&self, record: &mut ScanRecord) {
        let enricher = match &self.enricher {
            Some(enricher) => enricher,
            None => return,
        };
        if let Some(analysis) = enricher.analyze(record) {
            if record.summary.is_none() {
                record.summary = analysis.summary;
            }
            for tag in analysis.tags {
                if !record.has_tag(&tag) {
                    record.tags.push(tag);
                }
            }
        }
    }

    fn handle_results(&self, request: &Value) -> Result<Value> {
        let n = request.get("n").and_then(Value::as_u64).unwrap_or(0) as usize;
        let mut records = self.store.load();
        if n > 0 && records.len() > n {
            records.drain(0..records.len() - n);
        }
        Ok(json!({"status": "ok", "results": records}))
    }

    fn handle_search(&self, request: &Value) -> Result<Value> {
        let tag = request
            .get("tag")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Invalid("missing tag".to_string()))?;
        let limit = request.get("n").and_then(Value::as_u64).unwrap_or(0) as usize;
        let records = self.store.search(tag, limit);
        Ok(json!({"status": "ok", "results": records}))
    }

    fn handle_purge(&self, request: &Value) -> Result<Value> {
        let limit = request.get("limit").and_then(Value::as_i64).unwrap_or(0);
        if limit <= 0 {
            return Err(EngineError::Invalid("invalid limit".to_string()));
        }
        let remaining = self.store.purge(limit as usize)?;
        Ok(json!({"status": "ok", "remaining": remaining}))
    }

    fn handle_report(&self, request: &Value) -> Result<Value> {
        let out_dir = request
            .get("out_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.join("reports"));
        let template = request.get("template").and_then(Value::as_str);

        let records = self.store.load();
        let path = self.renderer.render(&records, &out_dir, template)?;
        Ok(json!({"status": "ok", "path": path.display().to_string()}))
    }

    fn handle_stats(&self) -> Result<Value> {
        let records = self.store.load();
        let mut modules: std::collections::BTreeMap<String, u64> = Default::default();
        let mut tags: std::collections::BTreeMap<String, u64> = Default::default();
        for record in &records {
            *modules.entry(record.module.clone()).or_insert(0) += 1;
            for tag in &record.tags {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        Ok(json!({
            "status": "ok",
            "count": records.len(),
            "modules": modules,
            "tags": tags,
        }))
    }

    fn handle_train(&mut self) -> Result<Value> {
        let records = self.store.load();
        let trained = self.engine.train_from_history(&records);
        Ok(json!({"status": "ok", "trained": trained}))
    }

    fn handle_train_labeled(&mut self, request: &Value, weighted: bool) -> Result<Value> {
        let dataset = request
            .get("dataset")
            .cloned()
            .ok_or_else(|| EngineError::Invalid("missing dataset".to_string()))?;
        let examples: Vec<TrainingExample> = serde_json::from_value(dataset)
            .map_err(|e| EngineError::Training(format!("invalid dataset: {}", e)))?;

        let (trained, delta) = self.engine.train_labeled(&examples, weighted);
        if weighted {
            Ok(json!({"status": "ok", "trained": trained, "delta": delta}))
        } else {
            Ok(json!({"status": "ok", "trained": trained}))
        }
    }

    fn handle_modules(&self, request: &Value) -> Result<Value> {
        let limit = request.get("n").and_then(Value::as_u64).unwrap_or(3) as usize;
        let after = request.get("after").and_then(Value::as_str);

        let records = self.store.load();
        let feats = features::aggregate_module_features(&records);
        let modules = self.engine.suggest_modules(after, &feats, limit);
        let pipeline = self
            .engine
            .suggest_pipeline(&features::aggregate_pipeline_features(&records));
        Ok(json!({"status": "ok", "modules": modules, "pipeline": pipeline}))
    }

    fn handle_params(&self, request: &Value) -> Result<Value> {
        let module = request
            .get("module")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Invalid("missing module".to_string()))?;
        let limit = request.get("n").and_then(Value::as_u64).unwrap_or(3) as usize;
        let params = self.engine.suggest_params(module, limit);
        Ok(json!({"status": "ok", "params": params}))
    }

    fn handle_operator(&mut self, request: &Value) -> Result<Value> {
        let action = request
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Invalid("missing action".to_string()))?;

        match action {
            "tune" => {
                let value = request
                    .get("value")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| EngineError::Invalid("missing value".to_string()))?;
                self.engine.set_threshold(value)?;
                log::info!("operator tuned suggestion threshold to {}", value);
                Ok(json!({"status": "ok", "action": "tune", "threshold": value}))
            }
            "approve" => {
                let note = request.get("note").and_then(Value::as_str).unwrap_or("");
                self.append_note(note)?;
                Ok(json!({"status": "ok", "action": "approve"}))
            }
            "pause" => {
                fs::create_dir_all(&self.data_dir)
                    .and_then(|_| fs::write(self.pause_path(), b""))
                    .map_err(|e| EngineError::Storage(format!("write sentinel: {}", e)))?;
                log::info!("jobs paused");
                Ok(json!({"status": "ok", "action": "pause"}))
            }
            "resume" => {
                match fs::remove_file(self.pause_path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(EngineError::Storage(format!("remove sentinel: {}", e)))
                    }
                }
                log::info!("jobs resumed");
                Ok(json!({"status": "ok", "action": "resume"}))
            }
            other => Err(EngineError::Invalid(format!(
                "unknown operator action: {}",
                other
            ))),
        }
    }

    fn append_note(&self, note: &str) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| EngineError::Storage(format!("create data dir: {}", e)))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(NOTES_FILE))
            .map_err(|e| EngineError::Storage(format!("open notes: {}", e)))?;
        writeln!(file, "{} {}", Utc::now().to_rfc3339(), note)
            .map_err(|e| EngineError::Storage(format!("write note: {}", e)))?;
        Ok(())
    }

    fn pause_path(&self) -> PathBuf {
        self.data_dir.join(PAUSE_SENTINEL)
    }

    fn chat_context(&self) -> Vec<ScanRecord> {
        let mut records = self.store.load();
        if records.len() > CHAT_CONTEXT {
            records.drain(0..records.len() - CHAT_CONTEXT);
        }
        records
    }

    fn handle_chat(&self, request: &Value) -> Result<Value> {
        let question = request.get("question").and_then(Value::as_str).unwrap_or("");
        let answer = self
            .enricher
            .as_ref()
            .and_then(|e| e.answer(question, &self.chat_context()))
            .unwrap_or_else(|| UNAVAILABLE.to_string());
        Ok(json!({"status": "ok", "answer": answer}))
    }

    fn handle_plan(&self, request: &Value) -> Result<Value> {
        let goal = request.get("goal").and_then(Value::as_str).unwrap_or("");
        let plan = self
            .enricher
            .as_ref()
            .and_then(|e| e.plan(goal, &self.chat_context()))
            .unwrap_or_else(|| UNAVAILABLE.to_string());
        Ok(json!({"status": "ok", "plan": plan}))
    }

    fn handle_explore(&self, request: &Value) -> Result<Value> {
        let module = request.get("module").and_then(Value::as_str).unwrap_or("");
        let examples = self
            .enricher
            .as_ref()
            .and_then(|e| e.explore(module))
            .unwrap_or_else(|| UNAVAILABLE.to_string());
        Ok(json!({"status": "ok", "examples": examples}))
    }
}
