//! Feature extraction from scan records
//!
//! Pipeline features are [port count, high-severity count, vulnerability
//! count, tag count]; module features add the code-size metrics. All
//! counts walk the record and every nested step.

use crate::record::ScanRecord;

pub const PIPELINE_DIMS: usize = 4;
pub const MODULE_DIMS: usize = 6;

/// 4-dim vector for pipeline classification
pub fn pipeline_features(record: &ScanRecord) -> [f64; PIPELINE_DIMS] {
    [
        record.port_total() as f64,
        record.high_severity_total() as f64,
        record.vulnerability_total() as f64,
        record.tag_total() as f64,
    ]
}

/// 6-dim vector for module classification
pub fn module_features(record: &ScanRecord) -> [f64; MODULE_DIMS] {
    let base = pipeline_features(record);
    [
        base[0],
        base[1],
        base[2],
        base[3],
        record.code_funcs.unwrap_or(0) as f64,
        record.code_lines.unwrap_or(0) as f64,
    ]
}

/// Element-wise sum of pipeline features over a result sequence
pub fn aggregate_pipeline_features(records: &[ScanRecord]) -> [f64; PIPELINE_DIMS] {
    let mut total = [0.0; PIPELINE_DIMS];
    for record in records {
        let f = pipeline_features(record);
        for (acc, v) in total.iter_mut().zip(f.iter()) {
            *acc += v;
        }
    }
    total
}

/// Element-wise sum of module features over a result sequence
pub fn aggregate_module_features(records: &[ScanRecord]) -> [f64; MODULE_DIMS] {
    let mut total = [0.0; MODULE_DIMS];
    for record in records {
        let f = module_features(record);
        for (acc, v) in total.iter_mut().zip(f.iter()) {
            *acc += v;
        }
    }
    total
}
