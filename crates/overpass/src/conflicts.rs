//! Conflict detection over committed timelines.
//!
//! Scans a workspace's acquisitions per satellite for temporal overlaps
//! and slew infeasibilities between consecutive slots. Detection itself
//! is pure (a function of the acquisition list and bus capabilities);
//! persistence goes through the store with an optional clear of previous
//! unresolved findings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use overpass_store::Store;
use overpass_types::{
    Acquisition, BusCapabilities, Conflict, ConflictSeverity, ConflictType, CoreResult,
};

use crate::slew;

/// Detection tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConflictDetectionConfig {
    /// Minimum overlap before a temporal conflict is flagged, seconds.
    pub overlap_threshold_s: f64,
    /// Slew deficit above which the finding is an error, seconds.
    pub error_deficit_s: f64,
    /// Slew deficit above which the finding is a warning, seconds.
    pub warning_deficit_s: f64,
}

impl Default for ConflictDetectionConfig {
    fn default() -> Self {
        Self {
            overlap_threshold_s: 0.0,
            error_deficit_s: 10.0,
            warning_deficit_s: 5.0,
        }
    }
}

/// A finding that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedConflict {
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub acquisition_ids: Vec<String>,
    pub details: serde_json::Value,
}

/// Detect conflicts in a set of acquisitions.
///
/// Failed (soft-deleted) slots are skipped. Findings come out ordered by
/// satellite and time, so detection is deterministic.
pub fn detect_conflicts(
    acquisitions: &[Acquisition],
    fleet: &BTreeMap<String, BusCapabilities>,
    config: &ConflictDetectionConfig,
) -> Vec<DetectedConflict> {
    let mut by_satellite: BTreeMap<&str, Vec<&Acquisition>> = BTreeMap::new();
    for acq in acquisitions {
        if acq.state == overpass_types::AcquisitionState::Failed {
            continue;
        }
        by_satellite
            .entry(acq.satellite_id.as_str())
            .or_default()
            .push(acq);
    }

    let default_bus = BusCapabilities::default();
    let mut conflicts = Vec::new();
    for (satellite_id, mut slots) in by_satellite {
        slots.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
        let bus = fleet.get(satellite_id).unwrap_or(&default_bus);

        for pair in slots.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let overlap_s = (a.end_time - b.start_time).num_milliseconds() as f64 / 1000.0;

            if overlap_s > config.overlap_threshold_s {
                conflicts.push(temporal_overlap(satellite_id, a, b, overlap_s));
                continue;
            }

            let available_s = -overlap_s;
            if available_s <= 0.0 {
                continue;
            }
            let roll_delta = (b.roll_angle_deg - a.roll_angle_deg).abs();
            let pitch_delta =
                (b.pitch_angle_deg.unwrap_or(0.0) - a.pitch_angle_deg.unwrap_or(0.0)).abs();
            let required_s = slew::maneuver_time(roll_delta, pitch_delta, bus);
            let deficit_s = required_s - available_s;
            if deficit_s > 0.0 {
                conflicts.push(slew_infeasible(
                    satellite_id,
                    a,
                    b,
                    roll_delta,
                    pitch_delta,
                    required_s,
                    available_s,
                    deficit_s,
                    config,
                ));
            }
        }
    }
    conflicts
}

fn temporal_overlap(
    satellite_id: &str,
    a: &Acquisition,
    b: &Acquisition,
    overlap_s: f64,
) -> DetectedConflict {
    DetectedConflict {
        kind: ConflictType::TemporalOverlap,
        severity: ConflictSeverity::Error,
        description: format!(
            "Satellite {satellite_id}: acquisitions overlap by {overlap_s:.1}s. \
             {} ends at {}, {} starts at {}",
            a.target_id, a.end_time, b.target_id, b.start_time
        ),
        acquisition_ids: vec![a.id.clone(), b.id.clone()],
        details: serde_json::json!({
            "satellite_id": satellite_id,
            "overlap_seconds": overlap_s,
            "first_target": a.target_id,
            "second_target": b.target_id,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn slew_infeasible(
    satellite_id: &str,
    a: &Acquisition,
    b: &Acquisition,
    roll_delta: f64,
    pitch_delta: f64,
    required_s: f64,
    available_s: f64,
    deficit_s: f64,
    config: &ConflictDetectionConfig,
) -> DetectedConflict {
    let severity = if deficit_s > config.error_deficit_s {
        ConflictSeverity::Error
    } else if deficit_s >= config.warning_deficit_s {
        ConflictSeverity::Warning
    } else {
        ConflictSeverity::Info
    };
    let mut slew_desc = format!("roll {roll_delta:.1}°");
    if pitch_delta > 0.01 {
        slew_desc.push_str(&format!(" + pitch {pitch_delta:.1}°"));
    }
    DetectedConflict {
        kind: ConflictType::SlewInfeasible,
        severity,
        description: format!(
            "Satellite {satellite_id}: insufficient slew time. Need {required_s:.1}s \
             to slew ({slew_desc}) but only {available_s:.1}s available \
             (deficit: {deficit_s:.1}s)"
        ),
        acquisition_ids: vec![a.id.clone(), b.id.clone()],
        details: serde_json::json!({
            "satellite_id": satellite_id,
            "first_target": a.target_id,
            "second_target": b.target_id,
            "roll_delta_deg": roll_delta,
            "pitch_delta_deg": pitch_delta,
            "required_time_s": required_s,
            "available_time_s": available_s,
            "deficit_s": deficit_s,
        }),
    }
}

/// Load a workspace horizon from the store and detect conflicts in it.
pub fn detect_in_horizon(
    store: &Store,
    workspace_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    satellite_id: Option<&str>,
    fleet: &BTreeMap<String, BusCapabilities>,
    config: &ConflictDetectionConfig,
) -> CoreResult<Vec<DetectedConflict>> {
    let acquisitions = store
        .acquisitions_in_horizon(workspace_id, start, end, satellite_id)
        .map_err(overpass_types::CoreError::from)?;
    Ok(detect_conflicts(&acquisitions, fleet, config))
}

/// Persist findings, optionally clearing previous unresolved conflicts
/// first. Returns the created conflict ids.
pub fn persist_conflicts(
    store: &mut Store,
    workspace_id: &str,
    conflicts: &[DetectedConflict],
    clear_existing: bool,
) -> CoreResult<Vec<String>> {
    if clear_existing {
        store
            .clear_unresolved_conflicts(workspace_id)
            .map_err(overpass_types::CoreError::from)?;
    }
    let mut ids = Vec::with_capacity(conflicts.len());
    for conflict in conflicts {
        let row = store
            .create_conflict(
                workspace_id,
                conflict.kind,
                conflict.severity,
                &conflict.description,
                &conflict.acquisition_ids,
                conflict.details.clone(),
            )
            .map_err(overpass_types::CoreError::from)?;
        ids.push(row.id);
    }
    Ok(ids)
}

/// Error-severity persisted conflicts touching any of the given
/// acquisitions; the guardrail consulted before a commit.
pub fn check_commit_conflicts(
    store: &Store,
    workspace_id: &str,
    acquisition_ids: &[String],
) -> CoreResult<Vec<Conflict>> {
    let unresolved = store
        .list_conflicts(workspace_id, true)
        .map_err(overpass_types::CoreError::from)?;
    let id_set: std::collections::BTreeSet<&str> =
        acquisition_ids.iter().map(String::as_str).collect();
    Ok(unresolved
        .into_iter()
        .filter(|c| c.severity == ConflictSeverity::Error)
        .filter(|c| c.acquisition_ids.iter().any(|id| id_set.contains(id.as_str())))
        .collect())
}
