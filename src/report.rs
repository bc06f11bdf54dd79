//! Report rendering seam
//!
//! Rendering is a pure consumer of the stored sequence and lives
//! outside the core; the trait keeps richer renderers pluggable while a
//! small markdown renderer ships as the default.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::record::ScanRecord;
use crate::{EngineError, Result};

pub trait ReportRenderer {
    /// Render the stored results into `out_dir`, returning the path of
    /// the written report
    fn render(
        &self,
        records: &[ScanRecord],
        out_dir: &Path,
        template: Option<&str>,
    ) -> Result<PathBuf>;
}

/// Default renderer: one markdown file per invocation
pub struct MarkdownRenderer;

impl ReportRenderer for MarkdownRenderer {
    fn render(
        &self,
        records: &[ScanRecord],
        out_dir: &Path,
        template: Option<&str>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)
            .map_err(|e| EngineError::Render(format!("create report dir: {}", e)))?;

        let title = template.unwrap_or("Assessment Report");
        let mut body = format!("# {}\n\n", title);
        for record in records {
            let target = record.target.as_deref().unwrap_or("?");
            body.push_str(&format!("## {} - {}\n", record.module, target));
            body.push_str(record.summary.as_deref().unwrap_or("No summary"));
            body.push_str("\n\n");
            if !record.tags.is_empty() {
                body.push_str(&format!("Tags: {}\n\n", record.tags.join(", ")));
            }
        }

        let path = out_dir.join(format!(
            "report_{}.md",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        fs::write(&path, body)
            .map_err(|e| EngineError::Render(format!("write report: {}", e)))?;
        Ok(path)
    }
}
