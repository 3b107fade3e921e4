//! Invariant checks over scheduled and committed timelines.
//!
//! Each check returns an [`InvariantResult`] with concrete violations so
//! a failing report names the offending rows instead of just a verdict.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use overpass_types::{Acquisition, BusCapabilities, RepairDiff, ScheduledItem};

use crate::conflicts::DetectedConflict;
use crate::slew;
use crate::validation::report::{InvariantResult, InvariantType};

/// A uniform view over plan items and acquisitions.
#[derive(Debug, Clone)]
pub struct SlotView {
    pub id: String,
    pub satellite_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roll_angle_deg: f64,
    pub pitch_angle_deg: f64,
}

impl From<&ScheduledItem> for SlotView {
    fn from(item: &ScheduledItem) -> Self {
        Self {
            id: item.opportunity_id.clone(),
            satellite_id: item.satellite_id.clone(),
            start_time: item.start_time,
            end_time: item.end_time,
            roll_angle_deg: item.roll_angle_deg,
            pitch_angle_deg: item.pitch_angle_deg,
        }
    }
}

impl From<&Acquisition> for SlotView {
    fn from(acq: &Acquisition) -> Self {
        Self {
            id: acq.id.clone(),
            satellite_id: acq.satellite_id.clone(),
            start_time: acq.start_time,
            end_time: acq.end_time,
            roll_angle_deg: acq.roll_angle_deg,
            pitch_angle_deg: acq.pitch_angle_deg.unwrap_or(0.0),
        }
    }
}

fn per_satellite(slots: &[SlotView]) -> BTreeMap<&str, Vec<&SlotView>> {
    let mut grouped: BTreeMap<&str, Vec<&SlotView>> = BTreeMap::new();
    for slot in slots {
        grouped.entry(slot.satellite_id.as_str()).or_default().push(slot);
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
    }
    grouped
}

/// Invariant 1: no two slots on the same satellite overlap in time.
pub fn check_no_overlap(slots: &[SlotView]) -> InvariantResult {
    let mut violations = Vec::new();
    for (satellite, group) in per_satellite(slots) {
        for pair in group.windows(2) {
            if pair[0].end_time > pair[1].start_time {
                violations.push(serde_json::json!({
                    "satellite_id": satellite,
                    "first": pair[0].id,
                    "second": pair[1].id,
                    "overlap_seconds":
                        (pair[0].end_time - pair[1].start_time).num_milliseconds() as f64
                            / 1000.0,
                }));
            }
        }
    }
    if violations.is_empty() {
        InvariantResult::pass(InvariantType::NoTemporalOverlap, "no overlapping slots")
    } else {
        InvariantResult::fail(
            InvariantType::NoTemporalOverlap,
            format!("{} overlapping pair(s)", violations.len()),
            violations,
        )
    }
}

/// Invariant 2: adjacent slots leave enough gap for the slew.
pub fn check_slew_feasibility(
    slots: &[SlotView],
    fleet: &BTreeMap<String, BusCapabilities>,
) -> InvariantResult {
    let default_bus = BusCapabilities::default();
    let mut violations = Vec::new();
    for (satellite, group) in per_satellite(slots) {
        let bus = fleet.get(satellite).unwrap_or(&default_bus);
        for pair in group.windows(2) {
            let gap_s =
                (pair[1].start_time - pair[0].end_time).num_milliseconds() as f64 / 1000.0;
            if gap_s < 0.0 {
                continue; // overlap is invariant 1's finding
            }
            let required = slew::maneuver_time(
                pair[1].roll_angle_deg - pair[0].roll_angle_deg,
                pair[1].pitch_angle_deg - pair[0].pitch_angle_deg,
                bus,
            );
            if gap_s + slew::EPSILON_S < required {
                violations.push(serde_json::json!({
                    "satellite_id": satellite,
                    "first": pair[0].id,
                    "second": pair[1].id,
                    "available_s": gap_s,
                    "required_s": required,
                }));
            }
        }
    }
    if violations.is_empty() {
        InvariantResult::pass(InvariantType::SlewFeasibility, "all gaps cover their slews")
    } else {
        InvariantResult::fail(
            InvariantType::SlewFeasibility,
            format!("{} infeasible gap(s)", violations.len()),
            violations,
        )
    }
}

/// Invariant 3: every hard-locked acquisition from before the repair is
/// still present afterwards.
pub fn check_hard_locks_unchanged(
    hard_before: &BTreeSet<String>,
    after: &[Acquisition],
) -> InvariantResult {
    let present: BTreeSet<&str> = after
        .iter()
        .filter(|a| a.state != overpass_types::AcquisitionState::Failed)
        .map(|a| a.id.as_str())
        .collect();
    let missing: Vec<serde_json::Value> = hard_before
        .iter()
        .filter(|id| !present.contains(id.as_str()))
        .map(|id| serde_json::json!({"acquisition_id": id}))
        .collect();
    if missing.is_empty() {
        InvariantResult::pass(
            InvariantType::HardLocksUnchanged,
            format!("{} hard lock(s) preserved", hard_before.len()),
        )
    } else {
        InvariantResult::fail(
            InvariantType::HardLocksUnchanged,
            format!("{} hard lock(s) missing after repair", missing.len()),
            missing,
        )
    }
}

/// Invariant 4: the committed row deltas match the repair diff.
pub fn check_repair_diff_consistent(
    diff: &RepairDiff,
    acquisitions_created: usize,
    acquisitions_dropped: usize,
) -> InvariantResult {
    let mut mismatches = Vec::new();
    if diff.dropped.len() != acquisitions_dropped {
        mismatches.push(serde_json::json!({
            "field": "dropped",
            "diff": diff.dropped.len(),
            "database": acquisitions_dropped,
        }));
    }
    // Every plan item becomes an acquisition; the diff's added+kept+moved
    // from candidates is what got planned.
    if diff.added.len() > acquisitions_created {
        mismatches.push(serde_json::json!({
            "field": "added",
            "diff": diff.added.len(),
            "database": acquisitions_created,
        }));
    }
    if mismatches.is_empty() {
        InvariantResult::pass(
            InvariantType::RepairDiffConsistent,
            "diff counts match database changes",
        )
    } else {
        InvariantResult::fail(
            InvariantType::RepairDiffConsistent,
            "diff counts disagree with database changes",
            mismatches,
        )
    }
}

/// Invariant 5: conflict preview equals the post-commit recompute.
///
/// Preview runs over hypothetical slots whose ids do not survive the
/// commit, so signatures key on satellite and targets, not row ids.
pub fn check_conflict_preview_match(
    preview: &[DetectedConflict],
    recomputed: &[DetectedConflict],
) -> InvariantResult {
    let signature = |set: &[DetectedConflict]| -> BTreeSet<String> {
        set.iter()
            .map(|c| {
                format!(
                    "{:?}|{:?}|{}|{}|{}",
                    c.kind,
                    c.severity,
                    c.details["satellite_id"].as_str().unwrap_or(""),
                    c.details["first_target"].as_str().unwrap_or(""),
                    c.details["second_target"].as_str().unwrap_or(""),
                )
            })
            .collect()
    };
    let before = signature(preview);
    let after = signature(recomputed);
    if before == after {
        InvariantResult::pass(
            InvariantType::ConflictPreviewMatch,
            format!("{} conflict(s) in both sets", before.len()),
        )
    } else {
        let only_preview: Vec<serde_json::Value> = before
            .difference(&after)
            .map(|s| serde_json::json!({"only_in_preview": s}))
            .collect();
        let mut only_recomputed: Vec<serde_json::Value> = after
            .difference(&before)
            .map(|s| serde_json::json!({"only_in_recompute": s}))
            .collect();
        let mut violations = only_preview;
        violations.append(&mut only_recomputed);
        InvariantResult::fail(
            InvariantType::ConflictPreviewMatch,
            "preview and recompute disagree",
            violations,
        )
    }
}

/// Invariant 6: same scenario, same report hash.
pub fn check_deterministic(previous_hash: Option<&str>, current_hash: &str) -> InvariantResult {
    match previous_hash {
        None => InvariantResult::pass(
            InvariantType::Deterministic,
            "no previous hash supplied; nothing to compare",
        ),
        Some(previous) if previous == current_hash => InvariantResult::pass(
            InvariantType::Deterministic,
            format!("hash {current_hash} reproduced"),
        ),
        Some(previous) => InvariantResult::fail(
            InvariantType::Deterministic,
            "report hash changed between runs",
            vec![serde_json::json!({
                "previous": previous,
                "current": current_hash,
            })],
        ),
    }
}
