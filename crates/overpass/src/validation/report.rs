//! Report model and deterministic hashing.
//!
//! The report hash covers the canonical projection of a run's outcome:
//! scenario identity, config hash, pass/fail, counts, metrics, and the
//! sorted invariant names. Report ids, timestamps, and runtimes stay out
//! so reruns hash identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use overpass_types::RepairDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Analysis,
    Planning,
    Repair,
    CommitPreview,
    Commit,
    ConflictRecompute,
}

/// Timing and counts for one stage of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub stage: WorkflowStage,
    pub runtime_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub input_count: usize,
    pub output_count: usize,
}

impl StageMetrics {
    pub fn ok(stage: WorkflowStage, runtime_ms: f64, input: usize, output: usize) -> Self {
        Self {
            stage,
            runtime_ms,
            success: true,
            error_message: None,
            input_count: input,
            output_count: output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantType {
    NoTemporalOverlap,
    SlewFeasibility,
    HardLocksUnchanged,
    RepairDiffConsistent,
    ConflictPreviewMatch,
    Deterministic,
}

impl InvariantType {
    pub fn as_str(self) -> &'static str {
        match self {
            InvariantType::NoTemporalOverlap => "no_temporal_overlap",
            InvariantType::SlewFeasibility => "slew_feasibility",
            InvariantType::HardLocksUnchanged => "hard_locks_unchanged",
            InvariantType::RepairDiffConsistent => "repair_diff_consistent",
            InvariantType::ConflictPreviewMatch => "conflict_preview_match",
            InvariantType::Deterministic => "deterministic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantResult {
    pub invariant: InvariantType,
    pub passed: bool,
    pub message: String,
    /// Concrete violations, capped to keep reports readable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<serde_json::Value>,
}

impl InvariantResult {
    pub fn pass(invariant: InvariantType, message: impl Into<String>) -> Self {
        Self {
            invariant,
            passed: true,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn fail(
        invariant: InvariantType,
        message: impl Into<String>,
        mut violations: Vec<serde_json::Value>,
    ) -> Self {
        violations.truncate(10);
        Self {
            invariant,
            passed: false,
            message: message.into(),
            violations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowCounts {
    pub opportunities: usize,
    pub planned: usize,
    pub committed: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_incidence_deg: Option<f64>,
    pub left_swath_count: usize,
    pub right_swath_count: usize,
    pub ascending_count: usize,
    pub descending_count: usize,
    pub opps_using_pitch: usize,
}

/// Complete outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub report_id: String,
    pub scenario_id: String,
    pub scenario_name: String,
    pub timestamp: DateTime<Utc>,
    pub config_hash: String,
    pub passed: bool,
    pub total_invariants: usize,
    pub passed_invariants: usize,
    pub failed_invariants: usize,
    pub stages: Vec<StageMetrics>,
    pub invariants: Vec<InvariantResult>,
    pub counts: WorkflowCounts,
    pub metrics: WorkflowMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_diff: Option<RepairDiff>,
    pub total_runtime_ms: f64,
    pub report_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// 16-hex SHA-256 of the canonical projection. Rounded floats keep
    /// the hash stable against sub-milli numeric jitter in serialization.
    pub fn compute_report_hash(&self) -> String {
        let mut passed: Vec<&str> = self
            .invariants
            .iter()
            .filter(|i| i.passed)
            .map(|i| i.invariant.as_str())
            .collect();
        passed.sort_unstable();
        let mut failed: Vec<&str> = self
            .invariants
            .iter()
            .filter(|i| !i.passed)
            .map(|i| i.invariant.as_str())
            .collect();
        failed.sort_unstable();

        let canonical = serde_json::json!({
            "scenario_id": self.scenario_id,
            "config_hash": self.config_hash,
            "passed": self.passed,
            "counts": {
                "opportunities": self.counts.opportunities,
                "planned": self.counts.planned,
                "committed": self.counts.committed,
                "conflicts": self.counts.conflicts,
            },
            "metrics": {
                "total_value": round3(self.metrics.total_value),
                "mean_incidence_deg": self.metrics.mean_incidence_deg.map(round3),
                "left_swath_count": self.metrics.left_swath_count,
                "right_swath_count": self.metrics.right_swath_count,
                "ascending_count": self.metrics.ascending_count,
                "descending_count": self.metrics.descending_count,
                "opps_using_pitch": self.metrics.opps_using_pitch,
            },
            "invariants_passed": passed,
            "invariants_failed": failed,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Human-readable one-screen summary.
    pub fn summary(&self) -> String {
        let status = if self.passed { "PASSED" } else { "FAILED" };
        let mut lines = vec![
            format!("Validation report: {} [{status}]", self.scenario_name),
            format!(
                "Invariants: {}/{} passed",
                self.passed_invariants, self.total_invariants
            ),
            format!(
                "Counts: {} opportunities, {} planned, {} committed, {} conflicts",
                self.counts.opportunities,
                self.counts.planned,
                self.counts.committed,
                self.counts.conflicts
            ),
            format!("Report hash: {}", self.report_hash),
        ];
        for invariant in self.invariants.iter().filter(|i| !i.passed) {
            lines.push(format!(
                "  failed {}: {}",
                invariant.invariant.as_str(),
                invariant.message
            ));
        }
        for error in &self.errors {
            lines.push(format!("  error: {error}"));
        }
        lines.join("\n")
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ValidationReport {
        ValidationReport {
            report_id: "report_abc".to_string(),
            scenario_id: "scenario_1".to_string(),
            scenario_name: "Two targets".to_string(),
            timestamp: Utc::now(),
            config_hash: "0123456789abcdef".to_string(),
            passed: true,
            total_invariants: 2,
            passed_invariants: 2,
            failed_invariants: 0,
            stages: vec![StageMetrics::ok(WorkflowStage::Analysis, 12.5, 2, 5)],
            invariants: vec![
                InvariantResult::pass(InvariantType::NoTemporalOverlap, "clean"),
                InvariantResult::pass(InvariantType::SlewFeasibility, "clean"),
            ],
            counts: WorkflowCounts {
                opportunities: 5,
                planned: 3,
                committed: 3,
                conflicts: 0,
            },
            metrics: WorkflowMetrics {
                total_value: 2.1,
                mean_incidence_deg: Some(31.25),
                ..WorkflowMetrics::default()
            },
            repair_diff: None,
            total_runtime_ms: 57.0,
            report_hash: String::new(),
            errors: vec![],
        }
    }

    #[test]
    fn hash_ignores_ids_timestamps_and_runtime() {
        let mut a = report();
        let mut b = report();
        b.report_id = "report_other".to_string();
        b.timestamp = b.timestamp + chrono::Duration::hours(5);
        b.total_runtime_ms = 9999.0;
        b.stages[0].runtime_ms = 0.001;
        assert_eq!(a.compute_report_hash(), b.compute_report_hash());
        a.report_hash = a.compute_report_hash();
        assert_eq!(a.report_hash.len(), 16);
    }

    #[test]
    fn hash_tracks_outcome_changes() {
        let a = report();
        let mut b = report();
        b.counts.committed = 2;
        assert_ne!(a.compute_report_hash(), b.compute_report_hash());

        let mut c = report();
        c.invariants[1] = InvariantResult::fail(
            InvariantType::SlewFeasibility,
            "deficit",
            vec![serde_json::json!({"deficit_s": 3.0})],
        );
        assert_ne!(a.compute_report_hash(), c.compute_report_hash());
    }

    #[test]
    fn hash_is_stable_across_invariant_ordering() {
        let a = report();
        let mut b = report();
        b.invariants.reverse();
        assert_eq!(a.compute_report_hash(), b.compute_report_hash());
    }

    #[test]
    fn failure_violations_are_capped() {
        let violations: Vec<serde_json::Value> =
            (0..50).map(|i| serde_json::json!({"n": i})).collect();
        let result =
            InvariantResult::fail(InvariantType::NoTemporalOverlap, "many", violations);
        assert_eq!(result.violations.len(), 10);
    }

    #[test]
    fn summary_mentions_failures() {
        let mut r = report();
        r.passed = false;
        r.invariants[0] = InvariantResult::fail(
            InvariantType::NoTemporalOverlap,
            "two slots overlap",
            vec![],
        );
        let text = r.summary();
        assert!(text.contains("FAILED"));
        assert!(text.contains("no_temporal_overlap"));
    }
}
