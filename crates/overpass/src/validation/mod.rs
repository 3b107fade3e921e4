//! Validation harness.
//!
//! Declarative scenarios drive the whole pipeline end-to-end
//! (Analysis → Planning → [Repair] → Commit-Preview → [Commit] →
//! Conflict-Recompute), with per-stage timing, invariant assertions, and
//! a report whose hash is a pure function of the scenario outcome. Two
//! runs of the same scenario must produce the same `report_hash`; that is
//! itself one of the invariants.

pub mod invariants;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod storage;

pub use report::{
    InvariantResult, InvariantType, StageMetrics, ValidationReport, WorkflowCounts,
    WorkflowMetrics, WorkflowStage,
};
pub use runner::ScenarioRunner;
pub use scenario::{
    ScenarioConfig, ScenarioExpectations, ScenarioSatellite, ScenarioTarget, WorkflowScenario,
};
pub use storage::ReportStore;
