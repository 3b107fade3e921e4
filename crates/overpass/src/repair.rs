//! Incremental planning and repair.
//!
//! Incremental mode treats committed acquisitions as blocked intervals:
//! the scheduler must not overlap them and must remain slew-feasible at
//! both boundaries. Repair compares a committed baseline against a fresh
//! candidate schedule and produces the kept/dropped/added/moved diff,
//! bounded by a change budget and constrained so that hard-locked slots
//! are never touched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{
    Acquisition, AcquisitionState, BusCapabilities, CoreError, CoreResult, LockLevel, LockPolicy,
    Opportunity, PlanningMode, RejectReason, Rejection, RepairDiff, RepairObjective,
    ScheduledItem,
};

use crate::slew;

/// A committed slot the planner must work around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedInterval {
    pub acquisition_id: String,
    pub satellite_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub roll_angle_deg: f64,
    pub pitch_angle_deg: f64,
    pub lock_level: LockLevel,
}

impl BlockedInterval {
    fn from_acquisition(acq: &Acquisition) -> Self {
        Self {
            acquisition_id: acq.id.clone(),
            satellite_id: acq.satellite_id.clone(),
            start_time: acq.start_time,
            end_time: acq.end_time,
            roll_angle_deg: acq.roll_angle_deg,
            pitch_angle_deg: acq.pitch_angle_deg.unwrap_or(0.0),
            lock_level: acq.lock_level,
        }
    }
}

/// Blocking set for one planning run.
///
/// From-scratch planning sees an empty sky: nothing blocks, and every
/// existing acquisition is implicitly up for replacement when the plan
/// commits. Incremental planning blocks on whatever the lock policy
/// selects.
pub fn planning_blocked_intervals(
    mode: PlanningMode,
    baseline: &[Acquisition],
    policy: LockPolicy,
) -> Vec<BlockedInterval> {
    match mode {
        PlanningMode::FromScratch => Vec::new(),
        PlanningMode::Incremental => blocked_intervals(baseline, policy),
    }
}

/// Blocked intervals for a baseline under a lock policy, sorted by
/// satellite and time. Failed slots never block.
pub fn blocked_intervals(baseline: &[Acquisition], policy: LockPolicy) -> Vec<BlockedInterval> {
    let mut blocked: Vec<BlockedInterval> = baseline
        .iter()
        .filter(|acq| acq.state != AcquisitionState::Failed)
        .filter(|acq| policy.blocks(acq.lock_level))
        .map(BlockedInterval::from_acquisition)
        .collect();
    blocked.sort_by(|a, b| {
        (&a.satellite_id, a.start_time, &a.acquisition_id)
            .cmp(&(&b.satellite_id, b.start_time, &b.acquisition_id))
    });
    blocked
}

/// Drop opportunities that collide with blocked intervals or cannot be
/// reached from their blocked neighbors.
///
/// The whole opportunity window is checked, which is conservative: if
/// any slot inside the window would collide, the opportunity is out.
pub fn filter_opportunities_incremental(
    opportunities: &[Opportunity],
    blocked: &[BlockedInterval],
    fleet: &BTreeMap<String, BusCapabilities>,
) -> (Vec<Opportunity>, Vec<Rejection>) {
    let mut by_satellite: BTreeMap<&str, Vec<&BlockedInterval>> = BTreeMap::new();
    for interval in blocked {
        by_satellite
            .entry(interval.satellite_id.as_str())
            .or_default()
            .push(interval);
    }

    let default_bus = BusCapabilities::default();
    let mut kept = Vec::new();
    let mut rejections = Vec::new();

    'next_opp: for opp in opportunities {
        let Some(intervals) = by_satellite.get(opp.satellite_id.as_str()) else {
            kept.push(opp.clone());
            continue;
        };
        let bus = fleet.get(&opp.satellite_id).unwrap_or(&default_bus);

        let mut prev: Option<&BlockedInterval> = None;
        let mut next: Option<&BlockedInterval> = None;
        for interval in intervals {
            if interval.start_time < opp.end_time && interval.end_time > opp.start_time {
                rejections.push(Rejection {
                    opportunity_id: opp.id.clone(),
                    reason: RejectReason::BlockedInterval,
                });
                continue 'next_opp;
            }
            if interval.end_time <= opp.start_time {
                prev = Some(interval);
            }
            if interval.start_time >= opp.end_time && next.is_none() {
                next = Some(interval);
            }
        }

        let roll = opp.roll_angle_deg;
        let pitch = opp.pitch_angle_deg.unwrap_or(0.0);
        if let Some(prev) = prev {
            let gap = (opp.start_time - prev.end_time).num_milliseconds() as f64 / 1000.0;
            let required = slew::maneuver_time(
                roll - prev.roll_angle_deg,
                pitch - prev.pitch_angle_deg,
                bus,
            );
            if gap + slew::EPSILON_S < required {
                rejections.push(Rejection {
                    opportunity_id: opp.id.clone(),
                    reason: RejectReason::SlewInfeasible,
                });
                continue;
            }
        }
        if let Some(next) = next {
            let gap = (next.start_time - opp.end_time).num_milliseconds() as f64 / 1000.0;
            let required = slew::maneuver_time(
                next.roll_angle_deg - roll,
                next.pitch_angle_deg - pitch,
                bus,
            );
            if gap + slew::EPSILON_S < required {
                rejections.push(Rejection {
                    opportunity_id: opp.id.clone(),
                    reason: RejectReason::SlewInfeasible,
                });
                continue;
            }
        }
        kept.push(opp.clone());
    }

    (kept, rejections)
}

/// Compute the repair diff between a committed baseline and a candidate
/// schedule.
///
/// Matching is by opportunity id: a baseline acquisition whose
/// opportunity reappears at the same start time is kept, at a different
/// start time is moved. Under `minimize_changes`, unmatched baseline
/// slots survive unless an admitted addition overlaps them, and
/// additions are admitted (highest value first) only while the change
/// budget allows; the other objectives replace unmatched slots outright.
///
/// Errors: [`CoreError::RepairBudgetExceeded`] when the diff needs more
/// than `max_changes` changes, [`CoreError::HardLockViolated`] if a
/// hard-locked slot would be dropped or moved (unrecoverable; the diff
/// is rejected, not truncated).
pub fn execute_repair_planning(
    baseline: &[Acquisition],
    candidates: &[ScheduledItem],
    objective: RepairObjective,
    max_changes: usize,
) -> CoreResult<RepairDiff> {
    let live: Vec<&Acquisition> = baseline
        .iter()
        .filter(|acq| acq.state != AcquisitionState::Failed)
        .collect();

    let candidate_by_opp: BTreeMap<&str, &ScheduledItem> = candidates
        .iter()
        .map(|item| (item.opportunity_id.as_str(), item))
        .collect();

    let mut diff = RepairDiff::default();
    let mut matched_opportunities: BTreeSet<&str> = BTreeSet::new();
    let mut unmatched: Vec<&Acquisition> = Vec::new();

    for acq in &live {
        let matched = acq
            .opportunity_id
            .as_deref()
            .and_then(|opp_id| candidate_by_opp.get(opp_id).map(|item| (opp_id, *item)));
        match matched {
            Some((opp_id, item)) => {
                matched_opportunities.insert(opp_id);
                if item.start_time == acq.start_time {
                    diff.kept.push(acq.id.clone());
                } else {
                    diff.moved.push(acq.id.clone());
                    diff.reasons.push(format!(
                        "{} moved from {} to {}",
                        acq.id, acq.start_time, item.start_time
                    ));
                }
            }
            None => unmatched.push(acq),
        }
    }

    // Additions, most valuable first.
    let mut additions: Vec<&ScheduledItem> = candidates
        .iter()
        .filter(|item| !matched_opportunities.contains(item.opportunity_id.as_str()))
        .collect();
    additions.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.start_time, &a.opportunity_id).cmp(&(b.start_time, &b.opportunity_id)))
    });
    if objective == RepairObjective::MaximizeCoverage {
        // Prefer targets the baseline does not already cover.
        let covered: BTreeSet<&str> = live.iter().map(|a| a.target_id.as_str()).collect();
        additions.sort_by(|a, b| {
            let a_new = !covered.contains(a.target_id.as_str());
            let b_new = !covered.contains(b.target_id.as_str());
            b_new
                .cmp(&a_new)
                .then_with(|| {
                    b.value
                        .partial_cmp(&a.value)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    (a.start_time, &a.opportunity_id).cmp(&(b.start_time, &b.opportunity_id))
                })
        });
    }

    match objective {
        RepairObjective::MinimizeChanges => {
            // Admit additions only while the budget holds; keep unmatched
            // baseline slots unless an admitted addition overlaps them.
            let mut admitted: Vec<&ScheduledItem> = Vec::new();
            for item in additions {
                let changes_so_far = diff.moved.len() + admitted.len();
                if changes_so_far >= max_changes {
                    diff.reasons.push(format!(
                        "{} not added: change budget reached",
                        item.opportunity_id
                    ));
                    continue;
                }
                admitted.push(item);
            }
            for acq in unmatched {
                let displaced = admitted.iter().find(|item| {
                    item.satellite_id == acq.satellite_id
                        && item.start_time < acq.end_time
                        && item.end_time > acq.start_time
                });
                match displaced {
                    Some(item) => {
                        diff.dropped.push(acq.id.clone());
                        diff.reasons.push(format!(
                            "{} dropped: displaced by {}",
                            acq.id, item.opportunity_id
                        ));
                    }
                    None => diff.kept.push(acq.id.clone()),
                }
            }
            diff.added = admitted
                .into_iter()
                .map(|item| item.opportunity_id.clone())
                .collect();
        }
        RepairObjective::MaximizeValue | RepairObjective::MaximizeCoverage => {
            for acq in unmatched {
                diff.dropped.push(acq.id.clone());
                diff.reasons
                    .push(format!("{} dropped: not in repair schedule", acq.id));
            }
            diff.added = additions
                .into_iter()
                .map(|item| item.opportunity_id.clone())
                .collect();
        }
    }

    // Hard locks must survive untouched, whatever the objective said.
    let hard_ids: Vec<String> = live
        .iter()
        .filter(|acq| acq.lock_level == LockLevel::Hard)
        .map(|acq| acq.id.clone())
        .collect();
    let kept_set: BTreeSet<&str> = diff.kept.iter().map(String::as_str).collect();
    let violated: Vec<String> = hard_ids
        .into_iter()
        .filter(|id| !kept_set.contains(id.as_str()))
        .collect();
    if !violated.is_empty() {
        return Err(CoreError::HardLockViolated(violated));
    }

    let changes = diff.change_count();
    if changes > max_changes {
        return Err(CoreError::RepairBudgetExceeded {
            changes,
            max_changes,
        });
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use overpass_types::MissionMode;

    fn base() -> DateTime<Utc> {
        "2025-01-15T10:00:00Z".parse().unwrap()
    }

    fn acq(id: &str, offset_s: i64, lock: LockLevel, opp: Option<&str>) -> Acquisition {
        let start = base() + Duration::seconds(offset_s);
        Acquisition {
            id: id.to_string(),
            workspace_id: "ws".to_string(),
            plan_id: None,
            satellite_id: "sat_a".to_string(),
            target_id: format!("tgt_{id}"),
            start_time: start,
            end_time: start + Duration::seconds(10),
            roll_angle_deg: 0.0,
            pitch_angle_deg: None,
            mode: MissionMode::Optical,
            state: AcquisitionState::Committed,
            lock_level: lock,
            source: "plan_commit".to_string(),
            opportunity_id: opp.map(str::to_string),
            created_at: base(),
            updated_at: base(),
        }
    }

    fn item(opp: &str, offset_s: i64, value: f64) -> ScheduledItem {
        let start = base() + Duration::seconds(offset_s);
        ScheduledItem {
            opportunity_id: opp.to_string(),
            satellite_id: "sat_a".to_string(),
            target_id: format!("tgt_{opp}"),
            start_time: start,
            end_time: start + Duration::seconds(10),
            roll_angle_deg: 0.0,
            pitch_angle_deg: 0.0,
            maneuver_time_s: 0.0,
            slack_time_s: 0.0,
            value,
        }
    }

    fn opp(id: &str, offset_s: i64, window_s: i64, roll: f64) -> Opportunity {
        let start = base() + Duration::seconds(offset_s);
        Opportunity {
            id: id.to_string(),
            satellite_id: "sat_a".to_string(),
            target_id: format!("tgt_{id}"),
            start_time: start,
            end_time: start + Duration::seconds(window_s),
            max_elevation_deg: 60.0,
            incidence_angle_deg: roll,
            priority: 1,
            value: 0.5,
            quality_score: 0.8,
            look_side: None,
            pass_direction: None,
            roll_angle_deg: roll,
            pitch_angle_deg: None,
        }
    }

    #[test]
    fn lock_policy_selects_blocking_set() {
        let baseline = vec![
            acq("a", 0, LockLevel::None, None),
            acq("b", 100, LockLevel::Soft, None),
            acq("c", 200, LockLevel::Hard, None),
        ];
        assert_eq!(blocked_intervals(&baseline, LockPolicy::HardOnly).len(), 1);
        assert_eq!(blocked_intervals(&baseline, LockPolicy::HardAndSoft).len(), 2);
        assert_eq!(blocked_intervals(&baseline, LockPolicy::All).len(), 3);
    }

    #[test]
    fn failed_acquisitions_never_block() {
        let mut failed = acq("a", 0, LockLevel::Hard, None);
        failed.state = AcquisitionState::Failed;
        assert!(blocked_intervals(&[failed], LockPolicy::All).is_empty());
    }

    #[test]
    fn from_scratch_planning_blocks_nothing() {
        let baseline = vec![
            acq("a", 0, LockLevel::Hard, None),
            acq("b", 100, LockLevel::Soft, None),
        ];
        assert!(planning_blocked_intervals(
            PlanningMode::FromScratch,
            &baseline,
            LockPolicy::All
        )
        .is_empty());
        assert_eq!(
            planning_blocked_intervals(PlanningMode::Incremental, &baseline, LockPolicy::All)
                .len(),
            2
        );
    }

    #[test]
    fn overlapping_opportunity_is_filtered() {
        let baseline = vec![acq("block", 100, LockLevel::Hard, None)];
        let blocked = blocked_intervals(&baseline, LockPolicy::HardOnly);
        let fleet = BTreeMap::new();

        let opps = vec![opp("inside", 95, 20, 0.0), opp("clear", 400, 20, 0.0)];
        let (kept, rejections) = filter_opportunities_incremental(&opps, &blocked, &fleet);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "clear");
        assert_eq!(rejections[0].reason, RejectReason::BlockedInterval);
    }

    #[test]
    fn boundary_slew_infeasibility_is_filtered() {
        // Blocked slot at 30° roll; default bus needs 2+30+5 = 37 s to
        // come back to 0°.
        let mut blocker = acq("block", 0, LockLevel::Hard, None);
        blocker.roll_angle_deg = 30.0;
        let blocked = blocked_intervals(&[blocker], LockPolicy::HardOnly);
        let fleet = BTreeMap::new();

        // Starts 20 s after the blocked slot ends: infeasible.
        let tight = opp("tight", 30, 10, 0.0);
        // Starts 60 s after: fine.
        let roomy = opp("roomy", 70, 10, 0.0);
        let (kept, rejections) =
            filter_opportunities_incremental(&[tight, roomy], &blocked, &fleet);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "roomy");
        assert_eq!(rejections[0].reason, RejectReason::SlewInfeasible);
    }

    #[test]
    fn repair_diff_keeps_drops_and_adds() {
        // Baseline: one hard, two unlocked; candidate keeps the hard slot
        // and one unlocked, drops the other, adds a new one.
        let baseline = vec![
            acq("hard", 0, LockLevel::Hard, Some("opp_hard")),
            acq("free1", 100, LockLevel::None, Some("opp_free1")),
            acq("free2", 200, LockLevel::None, Some("opp_free2")),
        ];
        let candidates = vec![
            item("opp_hard", 0, 0.9),
            item("opp_free1", 100, 0.6),
            item("opp_new", 300, 0.8),
        ];
        let diff = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeValue,
            10,
        )
        .unwrap();

        assert!(diff.kept.contains(&"hard".to_string()));
        assert!(diff.kept.contains(&"free1".to_string()));
        assert_eq!(diff.dropped, vec!["free2".to_string()]);
        assert_eq!(diff.added, vec!["opp_new".to_string()]);
        assert!(diff.moved.is_empty());
        assert_eq!(diff.change_count(), 2);
    }

    #[test]
    fn moved_slot_is_detected_by_start_time() {
        let baseline = vec![acq("a", 100, LockLevel::None, Some("opp_a"))];
        let candidates = vec![item("opp_a", 150, 0.6)];
        let diff =
            execute_repair_planning(&baseline, &candidates, RepairObjective::MaximizeValue, 10)
                .unwrap();
        assert_eq!(diff.moved, vec!["a".to_string()]);
        assert!(diff.kept.is_empty());
    }

    #[test]
    fn budget_exceeded_fails_the_repair() {
        let baseline = vec![
            acq("free1", 100, LockLevel::None, Some("opp_free1")),
            acq("free2", 200, LockLevel::None, Some("opp_free2")),
        ];
        let candidates = vec![item("opp_new1", 300, 0.9), item("opp_new2", 400, 0.8)];
        let err = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeValue,
            3,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::RepairBudgetExceeded { changes: 4, max_changes: 3 }
        ));
    }

    #[test]
    fn dropping_a_hard_lock_is_unrecoverable() {
        let baseline = vec![acq("hard", 0, LockLevel::Hard, Some("opp_hard"))];
        // Candidate schedule no longer contains the hard slot.
        let candidates = vec![item("opp_other", 300, 0.9)];
        let err = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeValue,
            10,
        )
        .unwrap_err();
        match err {
            CoreError::HardLockViolated(ids) => assert_eq!(ids, vec!["hard".to_string()]),
            other => panic!("expected hard lock violation, got {other}"),
        }
    }

    #[test]
    fn minimize_changes_spares_unmatched_baseline() {
        let baseline = vec![
            acq("free1", 100, LockLevel::None, Some("opp_free1")),
            acq("free2", 200, LockLevel::None, Some("opp_free2")),
        ];
        // Candidates drop both baseline opportunities and propose two new
        // ones, one overlapping free1.
        let candidates = vec![item("opp_new1", 95, 0.9), item("opp_new2", 400, 0.3)];
        let diff = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MinimizeChanges,
            3,
        )
        .unwrap();

        // free1 displaced by the overlapping addition; free2 spared.
        assert_eq!(diff.dropped, vec!["free1".to_string()]);
        assert!(diff.kept.contains(&"free2".to_string()));
        assert_eq!(diff.added.len(), 2);
    }

    #[test]
    fn minimize_changes_respects_budget_deterministically() {
        let baseline: Vec<Acquisition> = Vec::new();
        let candidates = vec![
            item("opp_low", 0, 0.2),
            item("opp_high", 100, 0.9),
            item("opp_mid", 200, 0.5),
        ];
        let diff = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MinimizeChanges,
            2,
        )
        .unwrap();
        // Highest value first, budget of two.
        assert_eq!(diff.added, vec!["opp_high".to_string(), "opp_mid".to_string()]);
        assert!(diff.reasons.iter().any(|r| r.contains("opp_low")));
    }

    #[test]
    fn maximize_coverage_prefers_new_targets() {
        let baseline = vec![acq("covered", 0, LockLevel::None, Some("opp_covered"))];
        let mut same_target = item("opp_again", 200, 0.9);
        same_target.target_id = "tgt_covered".to_string();
        let new_target = item("opp_fresh", 300, 0.4);
        let candidates = vec![item("opp_covered", 0, 0.5), same_target, new_target];

        let diff = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeCoverage,
            10,
        )
        .unwrap();
        assert_eq!(diff.added[0], "opp_fresh");
    }

    #[test]
    fn preview_is_idempotent() {
        let baseline = vec![
            acq("hard", 0, LockLevel::Hard, Some("opp_hard")),
            acq("free", 100, LockLevel::None, Some("opp_free")),
        ];
        let candidates = vec![item("opp_hard", 0, 0.9), item("opp_new", 300, 0.7)];
        let a = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeValue,
            10,
        )
        .unwrap();
        let b = execute_repair_planning(
            &baseline,
            &candidates,
            RepairObjective::MaximizeValue,
            10,
        )
        .unwrap();
        assert_eq!(a, b);
    }
}
