//! Scan result data model
//!
//! A `ScanRecord` is the loosely-structured record a scanner adapter
//! hands over: a small fixed schema the engine understands plus an
//! opaque passthrough for everything else. Records nest recursively via
//! `steps`, so a pipeline run carries its per-module sub-results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_module() -> String {
    "unknown".to_string()
}

/// One scan result, as stored and as carried on the wire.
///
/// Unknown fields survive a round-trip untouched; the engine only ever
/// interprets the typed fields below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRecord {
    /// Name of the module that produced this result
    #[serde(default = "default_module")]
    pub module: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// ISO-8601 UTC, assigned on ingestion when the adapter omits it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Value>,

    /// Total vulnerabilities over this record and every nested step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vuln_count: Option<u64>,

    /// Parameters the tool was invoked with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,

    /// Explicit yield for parameter statistics, overriding the
    /// vulnerability count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_funcs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_lines: Option<u64>,

    /// Nested sub-results for multi-stage pipelines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<ScanRecord>,

    /// Scanner-specific fields the engine passes through unexamined
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for ScanRecord {
    fn default() -> Self {
        Self {
            module: default_module(),
            target: None,
            timestamp: None,
            tags: Vec::new(),
            severity: None,
            ports: Vec::new(),
            vulnerabilities: Vec::new(),
            vuln_count: None,
            params: Vec::new(),
            reward: None,
            summary: None,
            code_funcs: None,
            code_lines: None,
            steps: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl ScanRecord {
    /// Parse a record from a raw JSON value
    pub fn from_value(value: Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(crate::EngineError::from)
    }

    /// Normalize a freshly ingested record, recursing into `steps`.
    ///
    /// Assigns the timestamp when missing, deduplicates tags preserving
    /// first-seen order, and recomputes `vuln_count` over the whole
    /// step tree, replacing any stale adapter-supplied count at every
    /// level. Records are immutable after this point except for
    /// retention trimming.
    pub fn enrich(&mut self, now: DateTime<Utc>) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
        let mut seen = std::collections::HashSet::new();
        self.tags.retain(|t| seen.insert(t.clone()));
        for step in &mut self.steps {
            step.enrich(now);
        }
        self.vuln_count = Some(self.count_vulnerabilities());
    }

    /// Count vulnerabilities over this record and every nested step
    pub fn count_vulnerabilities(&self) -> u64 {
        let mut total = self.vulnerabilities.len() as u64;
        for step in &self.steps {
            total += step.count_vulnerabilities();
        }
        total
    }

    /// Total vulnerabilities, preferring the precomputed count
    pub fn vulnerability_total(&self) -> u64 {
        self.vuln_count
            .unwrap_or_else(|| self.count_vulnerabilities())
    }

    /// Port count over this record and every nested step
    pub fn port_total(&self) -> u64 {
        let mut total = self.ports.len() as u64;
        for step in &self.steps {
            total += step.port_total();
        }
        total
    }

    /// High-severity occurrences over this record and every nested step
    pub fn high_severity_total(&self) -> u64 {
        let mut total = u64::from(self.severity.as_deref() == Some("high"));
        for step in &self.steps {
            total += step.high_severity_total();
        }
        total
    }

    /// Tag count over this record and every nested step
    pub fn tag_total(&self) -> u64 {
        let mut total = self.tags.len() as u64;
        for step in &self.steps {
            total += step.tag_total();
        }
        total
    }

    /// Whether `tags` contains the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_passthrough() {
        let record = ScanRecord::from_value(json!({
            "target": "example.com",
            "adapter_raw": {"stdout": "..."}
        }))
        .expect("parse record");
        assert_eq!(record.module, "unknown");
        assert!(record.extra.contains_key("adapter_raw"));

        let back = serde_json::to_value(&record).expect("serialize");
        assert_eq!(back["adapter_raw"]["stdout"], "...");
    }

    #[test]
    fn test_nested_vuln_count() {
        let record = ScanRecord::from_value(json!({
            "vulnerabilities": ["a"],
            "steps": [{"vulnerabilities": ["b", "c"]}]
        }))
        .expect("parse record");
        assert_eq!(record.count_vulnerabilities(), 3);
    }

    #[test]
    fn test_enrich_dedupes_tags_and_stamps() {
        let mut record = ScanRecord::from_value(json!({
            "tags": ["web", "net", "web"],
            "vulnerabilities": ["x"]
        }))
        .expect("parse record");
        record.enrich(Utc::now());
        assert_eq!(record.tags, vec!["web", "net"]);
        assert!(record.timestamp.is_some());
        assert_eq!(record.vuln_count, Some(1));
    }

    #[test]
    fn test_enrich_recurses_into_steps() {
        let mut record = ScanRecord::from_value(json!({
            "steps": [{
                "tags": ["web", "web"],
                "vulnerabilities": ["a", "b"],
                "vuln_count": 99
            }]
        }))
        .expect("parse record");
        record.enrich(Utc::now());
        assert_eq!(record.steps[0].vuln_count, Some(2));
        assert_eq!(record.steps[0].tags, vec!["web"]);
        assert_eq!(record.vuln_count, Some(2));
    }

    #[test]
    fn test_precomputed_count_preferred() {
        let record = ScanRecord::from_value(json!({
            "vulnerabilities": ["a"],
            "vuln_count": 7
        }))
        .expect("parse record");
        assert_eq!(record.vulnerability_total(), 7);
    }
}
