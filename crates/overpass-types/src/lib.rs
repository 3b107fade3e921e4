//! # Types
//!
//! Core domain types for overpass: the vocabulary shared by the visibility
//! engine, scheduler, persistence layer, and validation harness.
//!
//! This module defines the fundamental data structures used throughout
//! overpass:
//! - [`Satellite`] / [`Target`] - Platform truth and per-workspace targets
//! - [`MissionInput`] - Per-run request validated by the config resolver
//! - [`Opportunity`] - A candidate imaging window derived from visibility
//! - [`ScheduledItem`] - An opportunity a scheduling algorithm accepted
//! - [`Plan`] / [`PlanItem`] - A proposed schedule tied to one algorithm run
//! - [`Acquisition`] - A committed observation slot in a workspace timeline
//! - [`Conflict`] / [`CommitAuditRow`] - Detector findings and the audit trail
//! - [`CoreError`] - The tagged error taxonomy the HTTP adapter maps to
//!   status codes
//!
//! ## Serialization
//!
//! All wire-facing types implement `Serialize` and `Deserialize` from
//! `serde`. Enum wire values match the persisted/database spelling
//! (`LEFT`/`RIGHT`/`ANY`, `first_fit`, `temporal_overlap`, ...), so a value
//! written by one subsystem reads back identically in another.
//!
//! ## Identity
//!
//! Entities reference each other by string id only, never by pointer; the
//! scheduler's accepted items point back to opportunities through
//! `opportunity_id` so commit audit can tie every acquisition to its input.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cooperative cancellation token for long-running operations.
///
/// Cloning is cheap and all clones observe the same flag. Workers check
/// [`CancelToken::is_cancelled`] between units of work and return partial
/// results marked as cancelled; nothing blocks on the token itself.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Imaging hardware carried by a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagingModality {
    #[default]
    Optical,
    Sar,
}

/// Mission mode requested by a mission input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MissionMode {
    #[default]
    Optical,
    Sar,
    Communication,
}

/// Which side of the velocity vector a SAR antenna looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LookSide {
    Left,
    Right,
    /// No constraint; matches either side.
    #[default]
    Any,
}

impl LookSide {
    /// Whether a concrete side satisfies this (possibly unconstrained) request.
    pub fn accepts(self, actual: LookSide) -> bool {
        self == LookSide::Any || self == actual
    }
}

/// Orbital pass direction at the observation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassDirection {
    Ascending,
    Descending,
    #[default]
    Any,
}

impl PassDirection {
    pub fn accepts(self, actual: PassDirection) -> bool {
        self == PassDirection::Any || self == actual
    }
}

/// SAR collection geometry family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SarImagingMode {
    Spot,
    #[default]
    Strip,
    Scan,
    Dwell,
}

impl SarImagingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SarImagingMode::Spot => "spot",
            SarImagingMode::Strip => "strip",
            SarImagingMode::Scan => "scan",
            SarImagingMode::Dwell => "dwell",
        }
    }
}

/// How strongly a target or acquisition resists replanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockLevel {
    /// Freely repairable.
    #[default]
    None,
    /// Avoid changes if possible.
    Soft,
    /// Never modify.
    Hard,
}

/// Lifecycle state of a committed acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Committed,
    Executing,
    Complete,
    /// Terminal; also used as the soft-delete state when a repair drops a slot.
    Failed,
}

/// Kinds of conflicts the detector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    TemporalOverlap,
    SlewInfeasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Info,
    Warning,
    Error,
}

/// The four greedy scheduling algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Chronological, accept-if-feasible. Roll axis only.
    #[default]
    FirstFit,
    /// Highest composite value first, insert where feasible. Roll axis only.
    BestFit,
    /// First-fit with the pitch axis available as a fallback.
    RollPitchFirstFit,
    /// Best-fit with the pitch axis available as a fallback.
    RollPitchBestFit,
}

impl AlgorithmKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmKind::FirstFit => "first_fit",
            AlgorithmKind::BestFit => "best_fit",
            AlgorithmKind::RollPitchFirstFit => "roll_pitch_first_fit",
            AlgorithmKind::RollPitchBestFit => "roll_pitch_best_fit",
        }
    }

    /// Whether the algorithm may spend the pitch axis.
    pub fn uses_pitch(self) -> bool {
        matches!(
            self,
            AlgorithmKind::RollPitchFirstFit | AlgorithmKind::RollPitchBestFit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    #[default]
    Normal,
    Repair,
}

/// Spacecraft bus agility block. Admin-managed platform truth; mission
/// input can never mutate these (see the config resolver's governance set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusCapabilities {
    pub max_roll_deg: f64,
    pub max_roll_rate_dps: f64,
    pub max_roll_accel_dps2: f64,
    /// Pitch block is absent on roll-only buses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pitch_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pitch_rate_dps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pitch_accel_dps2: Option<f64>,
    pub settling_time_s: f64,
    /// Roll and pitch slews execute simultaneously when true (the default),
    /// sequentially otherwise.
    #[serde(default = "default_parallel_slew")]
    pub parallel_slew: bool,
}

fn default_parallel_slew() -> bool {
    true
}

impl Default for BusCapabilities {
    fn default() -> Self {
        Self {
            max_roll_deg: 45.0,
            max_roll_rate_dps: 1.0,
            max_roll_accel_dps2: 0.5,
            max_pitch_deg: None,
            max_pitch_rate_dps: None,
            max_pitch_accel_dps2: None,
            settling_time_s: 5.0,
            parallel_slew: true,
        }
    }
}

impl BusCapabilities {
    /// Effective pitch limit; 0.0 when the bus has no pitch axis, in which
    /// case the roll+pitch algorithms degrade cleanly to roll-only.
    pub fn pitch_limit_deg(&self) -> f64 {
        self.max_pitch_deg.unwrap_or(0.0)
    }
}

/// A satellite as loaded from admin configuration.
///
/// Refreshed on TLE update; never mutated by mission input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub id: String,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
    #[serde(default)]
    pub modality: ImagingModality,
    #[serde(default)]
    pub bus: BusCapabilities,
    #[serde(default = "default_fov_half_angle")]
    pub sensor_fov_half_angle_deg: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_fov_half_angle() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A ground target. Coordinates are immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 1 = highest priority, 5 = lowest.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub lock_level: LockLevel,
}

fn default_priority() -> u8 {
    3
}

/// SAR-specific fields of a mission input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SarParams {
    #[serde(default)]
    pub imaging_mode: SarImagingMode,
    #[serde(default)]
    pub look_side: LookSide,
    #[serde(default)]
    pub pass_direction: PassDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidence_min_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidence_max_deg: Option<f64>,
}

/// A per-run mission request, validated by the config resolver before any
/// opportunity generation happens.
///
/// Bus parameters arrive through `bus_overrides` as an explicit map rather
/// than loose top-level keys; the resolver rejects any admin-only key found
/// there unless `allow_bus_override` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub mode: MissionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointing_angle_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sar: Option<SarParams>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bus_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub allow_bus_override: bool,
}

/// One visibility pass of a satellite over a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub start_azimuth_deg: f64,
    pub max_elevation_azimuth_deg: f64,
    pub end_azimuth_deg: f64,
    /// Off-nadir angle to the target at `max_elevation_time`.
    pub incidence_angle_deg: f64,
}

/// SAR geometry attached to a pass that survived the mode envelope filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarPassData {
    pub look_side: LookSide,
    pub pass_direction: PassDirection,
    pub incidence_center_deg: f64,
    pub incidence_near_deg: f64,
    pub incidence_far_deg: f64,
    pub swath_width_km: f64,
    pub scene_length_km: f64,
    pub imaging_mode: SarImagingMode,
    /// Band-model quality in [0, 1].
    pub quality_score: f64,
    /// Four (lat, lon) corners, counterclockwise.
    pub swath_corners: Vec<(f64, f64)>,
}

/// A candidate imaging window. Derived, never user-authored; identity is
/// stable within a run so commit audit can reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub satellite_id: String,
    pub target_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub incidence_angle_deg: f64,
    pub priority: u8,
    /// Composite value in [0, 1] from the multi-criteria scorer.
    pub value: f64,
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub look_side: Option<LookSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_direction: Option<PassDirection>,
    /// Signed roll required to point at the target at the imaging epoch.
    pub roll_angle_deg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_angle_deg: Option<f64>,
}

/// An opportunity accepted into a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub opportunity_id: String,
    pub satellite_id: String,
    pub target_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roll_angle_deg: f64,
    pub pitch_angle_deg: f64,
    /// Maneuver time from the previous item on the same satellite.
    pub maneuver_time_s: f64,
    /// Gap remaining after the maneuver; never below -10 ms.
    pub slack_time_s: f64,
    pub value: f64,
}

/// Why the scheduler passed over an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Overlap,
    SlewInfeasible,
    RollOverLimit,
    PitchOverLimit,
    BlockedInterval,
    UnknownSatellite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub opportunity_id: String,
    pub reason: RejectReason,
}

/// Metrics produced by every scheduling run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub algorithm: String,
    pub evaluated: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub total_value: f64,
    pub mean_value: f64,
    pub mean_incidence_deg: f64,
    pub total_maneuver_time_s: f64,
    pub total_imaging_time_s: f64,
    pub total_slack_time_s: f64,
    /// (maneuver + imaging) / span of the scheduled window.
    pub utilization: f64,
    pub max_roll_deg: f64,
    pub max_pitch_deg: f64,
    pub opps_using_pitch: usize,
    pub runtime_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_degradation: Option<f64>,
    #[serde(default)]
    pub cancelled: bool,
}

/// A proposed schedule. Immutable after commit; committable at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub workspace_id: String,
    pub algorithm: AlgorithmKind,
    /// Resolved-config snapshot in effect when the plan was built.
    pub config_snapshot: serde_json::Value,
    /// 16-hex SHA-256 over the canonical opportunity set + scheduler config.
    pub input_hash: String,
    pub metrics: ScheduleMetrics,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
}

/// One accepted opportunity inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub plan_id: String,
    pub opportunity_id: String,
    pub satellite_id: String,
    pub target_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roll_angle_deg: f64,
    pub pitch_angle_deg: f64,
    pub maneuver_time_s: f64,
    pub slack_time_s: f64,
    pub value: f64,
}

/// A committed observation slot in a workspace timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub id: String,
    pub workspace_id: String,
    /// Originating plan; acquisitions outlive their plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub satellite_id: String,
    pub target_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roll_angle_deg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_angle_deg: Option<f64>,
    pub mode: MissionMode,
    pub state: AcquisitionState,
    pub lock_level: LockLevel,
    /// Where the slot came from ("plan_commit", "repair_commit", "manual").
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A detector finding persisted against a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub workspace_id: String,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub acquisition_ids: Vec<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_action: Option<String>,
}

/// The kept/dropped/added/moved outcome of a repair planning run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepairDiff {
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
    pub added: Vec<String>,
    pub moved: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl RepairDiff {
    /// Changes that count against the repair budget.
    pub fn change_count(&self) -> usize {
        self.dropped.len() + self.added.len() + self.moved.len()
    }
}

/// Immutable audit record written by every commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAuditRow {
    pub id: String,
    pub workspace_id: String,
    pub plan_id: String,
    pub commit_type: CommitType,
    pub config_hash: String,
    pub acquisitions_created: usize,
    pub acquisitions_dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_diff: Option<RepairDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_before: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_after: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts_before: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts_after: Option<usize>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Planning stance toward the committed baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    /// Ignore existing acquisitions; committing implicitly drops them.
    FromScratch,
    /// Existing acquisitions become blocked intervals.
    #[default]
    Incremental,
}

/// Which committed acquisitions block an incremental plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    HardOnly,
    #[default]
    HardAndSoft,
    All,
}

impl LockPolicy {
    /// Whether an acquisition with the given lock level blocks replanning.
    pub fn blocks(self, lock: LockLevel) -> bool {
        match self {
            LockPolicy::HardOnly => lock == LockLevel::Hard,
            LockPolicy::HardAndSoft => matches!(lock, LockLevel::Hard | LockLevel::Soft),
            LockPolicy::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairObjective {
    #[default]
    MaximizeValue,
    MinimizeChanges,
    MaximizeCoverage,
}

/// Lifecycle of a user imaging order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Planned,
    Committed,
    Cancelled,
}

/// A user imaging request, created from an ingest record
/// `{name, latitude, longitude, description?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub status: OrderStatus,
    #[serde(default)]
    pub lock_level: LockLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row for a workspace, without the heavy blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_mode: Option<MissionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window_end: Option<DateTime<Utc>>,
    pub satellites_count: u32,
    pub targets_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<String>,
}

/// Full workspace state, with or without the decompressed CZML payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceData {
    pub summary: WorkspaceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_state: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_state: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders_state: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_state: Option<serde_json::Value>,
    /// Present only when the caller asked for the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub czml: Option<serde_json::Value>,
}

/// The tagged error taxonomy. The HTTP adapter translates these to status
/// codes; the core never uses panics or exceptions for control flow.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("admin-only parameter '{field}' cannot be set per mission ({message})")]
    Governance { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("plan {0} is already committed")]
    PlanAlreadyCommitted(String),

    #[error("repair budget exceeded: {changes} changes requested, {max_changes} allowed")]
    RepairBudgetExceeded { changes: usize, max_changes: usize },

    #[error("hard-locked acquisitions would be modified: {0:?}")]
    HardLockViolated(Vec<String>),

    #[error("ephemeris error: {0}")]
    Ephemeris(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl CoreError {
    /// Status code the HTTP surface maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) | CoreError::Governance { .. } => 400,
            CoreError::NotFound { .. } => 404,
            CoreError::PlanAlreadyCommitted(_)
            | CoreError::RepairBudgetExceeded { .. }
            | CoreError::HardLockViolated(_) => 409,
            CoreError::Ephemeris(_) | CoreError::Persistence(_) => 500,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn lock_level_strategy() -> impl Strategy<Value = LockLevel> {
        prop_oneof![
            Just(LockLevel::None),
            Just(LockLevel::Soft),
            Just(LockLevel::Hard),
        ]
    }

    proptest! {
        /// Opportunity serialization roundtrips for arbitrary geometry.
        #[test]
        fn opportunity_roundtrip(
            roll in -90.0f64..90.0,
            incidence in 0.0f64..90.0,
            value in 0.0f64..1.0,
            priority in 1u8..=5,
            offset_s in 0i64..86_400,
        ) {
            let start: DateTime<Utc> = "2025-01-15T00:00:00Z".parse().unwrap();
            let start = start + chrono::Duration::seconds(offset_s);
            let opp = Opportunity {
                id: "opp_x".to_string(),
                satellite_id: "sat_a".to_string(),
                target_id: "tgt_a".to_string(),
                start_time: start,
                end_time: start + chrono::Duration::seconds(600),
                max_elevation_deg: 50.0,
                incidence_angle_deg: incidence,
                priority,
                value,
                quality_score: 1.0 - value / 2.0,
                look_side: Some(LookSide::Left),
                pass_direction: Some(PassDirection::Descending),
                roll_angle_deg: roll,
                pitch_angle_deg: None,
            };
            let json = serde_json::to_string(&opp).unwrap();
            let parsed: Opportunity = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(opp, parsed);
        }

        /// Lock levels roundtrip and the policy lattice is monotone:
        /// anything HardOnly blocks, the wider policies block too.
        #[test]
        fn lock_policy_lattice(lock in lock_level_strategy()) {
            let json = serde_json::to_string(&lock).unwrap();
            let parsed: LockLevel = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(lock, parsed);

            if LockPolicy::HardOnly.blocks(lock) {
                prop_assert!(LockPolicy::HardAndSoft.blocks(lock));
            }
            if LockPolicy::HardAndSoft.blocks(lock) {
                prop_assert!(LockPolicy::All.blocks(lock));
            }
        }

        /// Schedule metrics roundtrip through JSON without loss.
        #[test]
        fn metrics_roundtrip(
            accepted in 0usize..1000,
            rejected in 0usize..1000,
            total_value in 0.0f64..500.0,
            utilization in 0.0f64..1.0,
        ) {
            let metrics = ScheduleMetrics {
                algorithm: "first_fit".to_string(),
                evaluated: accepted + rejected,
                accepted,
                rejected,
                total_value,
                utilization,
                ..ScheduleMetrics::default()
            };
            let json = serde_json::to_string(&metrics).unwrap();
            let parsed: ScheduleMetrics = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(metrics, parsed);
        }
    }
}
