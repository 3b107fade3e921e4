//! On-disk scenario and report storage.
//!
//! Reports are plain JSON files under a directory, written atomically
//! (temp file + rename) so a crashed run never leaves a half-written
//! report behind. Listing reads newest first.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::validation::report::ValidationReport;

pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn report_path(&self, report_id: &str) -> PathBuf {
        self.root.join(format!("{report_id}.json"))
    }

    /// Persist a report atomically.
    pub fn save(&self, report: &ValidationReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create report dir {}", self.root.display()))?;
        let path = self.report_path(&report.report_id);
        let json =
            serde_json::to_string_pretty(report).context("failed to serialize report")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("failed to write report temp file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move report into place {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, report_id: &str) -> Result<ValidationReport> {
        let path = self.report_path(report_id);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read report {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse report {}", path.display()))
    }

    /// All stored reports, newest first.
    pub fn list(&self) -> Result<Vec<ValidationReport>> {
        let mut reports = Vec::new();
        if !self.root.exists() {
            return Ok(reports);
        }
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to read report dir {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read report {}", path.display()))?;
                let report: ValidationReport = serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse report {}", path.display()))?;
                reports.push(report);
            }
        }
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(reports)
    }
}
