//! The scheduling kernel: four greedy algorithms behind one entry point.
//!
//! `first_fit` walks opportunities chronologically and accepts whatever
//! the bus can reach; `best_fit` spends the highest-value opportunities
//! first and inserts them wherever the timeline still has room. The
//! `roll_pitch` variants may buy back an over-limit roll by splitting the
//! boresight angle across both axes. All four share the feasibility
//! kernel and produce the same invariants: no overlap per satellite, all
//! attitudes within bus limits, slack never below -10 ms, and output that
//! is a pure function of the input.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{
    AlgorithmKind, BusCapabilities, CancelToken, Opportunity, RejectReason, Rejection,
    ScheduleMetrics, ScheduledItem,
};

use crate::slew;

/// Progress/diagnostic sink threaded through long-running operations.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// Reporter that drops everything; useful for tests and batch runs.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&mut self, _msg: &str) {}
    fn warn(&mut self, _msg: &str) {}
    fn error(&mut self, _msg: &str) {}
}

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of the scheduled imaging slot, centered in the opportunity
    /// window and clamped to it. Non-positive means the whole window.
    pub imaging_time_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { imaging_time_s: 10.0 }
    }
}

/// Output of one scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub items: Vec<ScheduledItem>,
    pub metrics: ScheduleMetrics,
    pub rejections: Vec<Rejection>,
}

/// Schedule `opportunities` onto the fleet with the selected algorithm.
///
/// `fleet` maps satellite id to its bus capabilities; opportunities for
/// unknown satellites are rejected rather than guessed at. Identical
/// inputs produce identical output (runtime_ms aside).
pub fn schedule(
    opportunities: &[Opportunity],
    fleet: &BTreeMap<String, BusCapabilities>,
    algorithm: AlgorithmKind,
    config: &SchedulerConfig,
    cancel: &CancelToken,
) -> ScheduleOutcome {
    let started = Instant::now();
    let (mut items, rejections, cancelled) = match algorithm {
        AlgorithmKind::FirstFit | AlgorithmKind::RollPitchFirstFit => {
            run_first_fit(opportunities, fleet, algorithm.uses_pitch(), config, cancel)
        }
        AlgorithmKind::BestFit | AlgorithmKind::RollPitchBestFit => {
            run_best_fit(opportunities, fleet, algorithm.uses_pitch(), config, cancel)
        }
    };

    items.sort_by(|a, b| {
        (a.start_time, &a.satellite_id, &a.opportunity_id)
            .cmp(&(b.start_time, &b.satellite_id, &b.opportunity_id))
    });

    let metrics = compute_metrics(
        algorithm,
        opportunities,
        &items,
        &rejections,
        started.elapsed().as_secs_f64() * 1000.0,
        cancelled,
    );
    ScheduleOutcome {
        items,
        metrics,
        rejections,
    }
}

/// Roll/pitch split for one opportunity, or the reason it cannot point.
fn resolve_attitude(
    opp: &Opportunity,
    bus: &BusCapabilities,
    uses_pitch: bool,
) -> Result<(f64, f64), RejectReason> {
    let required = opp.roll_angle_deg;
    if required.abs() <= bus.max_roll_deg + 1e-9 {
        return Ok((required, 0.0));
    }
    if !uses_pitch {
        return Err(RejectReason::RollOverLimit);
    }
    // Split the boresight angle: hold roll at its limit and take the
    // remainder in pitch, via cos(total) = cos(roll)·cos(pitch).
    let total = required.abs().min(89.9).to_radians();
    let roll_limit = bus.max_roll_deg.to_radians();
    let cos_pitch = (total.cos() / roll_limit.cos()).clamp(-1.0, 1.0);
    let pitch_deg = cos_pitch.acos().to_degrees();
    if pitch_deg <= bus.pitch_limit_deg() + 1e-9 {
        Ok((bus.max_roll_deg.copysign(required), pitch_deg))
    } else {
        Err(RejectReason::PitchOverLimit)
    }
}

/// The imaging slot inside an opportunity window.
fn imaging_slot(opp: &Opportunity, config: &SchedulerConfig) -> (DateTime<Utc>, DateTime<Utc>) {
    let window_ms = (opp.end_time - opp.start_time).num_milliseconds();
    let imaging_ms = (config.imaging_time_s * 1000.0) as i64;
    if imaging_ms <= 0 || imaging_ms >= window_ms {
        return (opp.start_time, opp.end_time);
    }
    let center = opp.start_time + Duration::milliseconds(window_ms / 2);
    (
        center - Duration::milliseconds(imaging_ms / 2),
        center + Duration::milliseconds(imaging_ms - imaging_ms / 2),
    )
}

fn gap_seconds(a_end: DateTime<Utc>, b_start: DateTime<Utc>) -> f64 {
    (b_start - a_end).num_milliseconds() as f64 / 1000.0
}

type AlgorithmRun = (Vec<ScheduledItem>, Vec<Rejection>, bool);

fn run_first_fit(
    opportunities: &[Opportunity],
    fleet: &BTreeMap<String, BusCapabilities>,
    uses_pitch: bool,
    config: &SchedulerConfig,
    cancel: &CancelToken,
) -> AlgorithmRun {
    let mut sorted: Vec<&Opportunity> = opportunities.iter().collect();
    sorted.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));

    let mut items: Vec<ScheduledItem> = Vec::new();
    let mut rejections: Vec<Rejection> = Vec::new();
    let mut last_per_sat: BTreeMap<String, ScheduledItem> = BTreeMap::new();
    let mut cancelled = false;

    for opp in sorted {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(bus) = fleet.get(&opp.satellite_id) else {
            rejections.push(reject(opp, RejectReason::UnknownSatellite));
            continue;
        };
        let (roll, pitch) = match resolve_attitude(opp, bus, uses_pitch) {
            Ok(attitude) => attitude,
            Err(reason) => {
                rejections.push(reject(opp, reason));
                continue;
            }
        };
        let (start, end) = imaging_slot(opp, config);

        let (maneuver, slack) = match last_per_sat.get(&opp.satellite_id) {
            None => (slew::maneuver_time(roll, pitch, bus), 0.0),
            Some(last) => {
                if start < last.end_time {
                    rejections.push(reject(opp, RejectReason::Overlap));
                    continue;
                }
                let gap = gap_seconds(last.end_time, start);
                let required = slew::maneuver_time(
                    roll - last.roll_angle_deg,
                    pitch - last.pitch_angle_deg,
                    bus,
                );
                if gap + slew::EPSILON_S < required {
                    rejections.push(reject(opp, RejectReason::SlewInfeasible));
                    continue;
                }
                (required, gap - required)
            }
        };

        let item = ScheduledItem {
            opportunity_id: opp.id.clone(),
            satellite_id: opp.satellite_id.clone(),
            target_id: opp.target_id.clone(),
            start_time: start,
            end_time: end,
            roll_angle_deg: roll,
            pitch_angle_deg: pitch,
            maneuver_time_s: maneuver,
            slack_time_s: slack,
            value: opp.value,
        };
        last_per_sat.insert(opp.satellite_id.clone(), item.clone());
        items.push(item);
    }

    (items, rejections, cancelled)
}

fn run_best_fit(
    opportunities: &[Opportunity],
    fleet: &BTreeMap<String, BusCapabilities>,
    uses_pitch: bool,
    config: &SchedulerConfig,
    cancel: &CancelToken,
) -> AlgorithmRun {
    let mut sorted: Vec<&Opportunity> = opportunities.iter().collect();
    sorted.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)))
    });

    let mut timelines: BTreeMap<String, Vec<ScheduledItem>> = BTreeMap::new();
    let mut rejections: Vec<Rejection> = Vec::new();
    let mut cancelled = false;

    for opp in sorted {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(bus) = fleet.get(&opp.satellite_id) else {
            rejections.push(reject(opp, RejectReason::UnknownSatellite));
            continue;
        };
        let (roll, pitch) = match resolve_attitude(opp, bus, uses_pitch) {
            Ok(attitude) => attitude,
            Err(reason) => {
                rejections.push(reject(opp, reason));
                continue;
            }
        };
        let (start, end) = imaging_slot(opp, config);
        let candidate = ScheduledItem {
            opportunity_id: opp.id.clone(),
            satellite_id: opp.satellite_id.clone(),
            target_id: opp.target_id.clone(),
            start_time: start,
            end_time: end,
            roll_angle_deg: roll,
            pitch_angle_deg: pitch,
            maneuver_time_s: 0.0,
            slack_time_s: 0.0,
            value: opp.value,
        };

        let timeline = timelines.entry(opp.satellite_id.clone()).or_default();
        let idx = timeline.partition_point(|item| item.start_time < candidate.start_time);

        let mut reason = None;
        if idx > 0 {
            let prev = &timeline[idx - 1];
            if prev.end_time > candidate.start_time {
                reason = Some(RejectReason::Overlap);
            } else if !slew::feasible_between(prev, &candidate, bus) {
                reason = Some(RejectReason::SlewInfeasible);
            }
        }
        if reason.is_none() {
            if let Some(next) = timeline.get(idx) {
                if candidate.end_time > next.start_time {
                    reason = Some(RejectReason::Overlap);
                } else if !slew::feasible_between(&candidate, next, bus) {
                    reason = Some(RejectReason::SlewInfeasible);
                }
            }
        }

        match reason {
            Some(reason) => rejections.push(reject(opp, reason)),
            None => timeline.insert(idx, candidate),
        }
    }

    // Maneuver and slack are relative to the final neighbors, so they are
    // recomputed once insertion has settled.
    let mut items = Vec::new();
    for (sat_id, timeline) in &mut timelines {
        let bus = &fleet[sat_id];
        let mut previous: Option<ScheduledItem> = None;
        for item in timeline.iter_mut() {
            match &previous {
                None => {
                    item.maneuver_time_s =
                        slew::maneuver_time(item.roll_angle_deg, item.pitch_angle_deg, bus);
                    item.slack_time_s = 0.0;
                }
                Some(prev) => {
                    let required = slew::maneuver_time(
                        item.roll_angle_deg - prev.roll_angle_deg,
                        item.pitch_angle_deg - prev.pitch_angle_deg,
                        bus,
                    );
                    let gap = gap_seconds(prev.end_time, item.start_time);
                    item.maneuver_time_s = required;
                    item.slack_time_s = gap - required;
                }
            }
            previous = Some(item.clone());
        }
        items.extend(timeline.iter().cloned());
    }

    (items, rejections, cancelled)
}

fn reject(opp: &Opportunity, reason: RejectReason) -> Rejection {
    Rejection {
        opportunity_id: opp.id.clone(),
        reason,
    }
}

fn compute_metrics(
    algorithm: AlgorithmKind,
    opportunities: &[Opportunity],
    items: &[ScheduledItem],
    rejections: &[Rejection],
    runtime_ms: f64,
    cancelled: bool,
) -> ScheduleMetrics {
    let accepted = items.len();
    let total_value: f64 = items.iter().map(|i| i.value).sum();
    let total_maneuver: f64 = items.iter().map(|i| i.maneuver_time_s).sum();
    let total_slack: f64 = items.iter().map(|i| i.slack_time_s).sum();
    let total_imaging: f64 = items
        .iter()
        .map(|i| (i.end_time - i.start_time).num_milliseconds() as f64 / 1000.0)
        .sum();

    let by_id: BTreeMap<&str, &Opportunity> = opportunities
        .iter()
        .map(|o| (o.id.as_str(), o))
        .collect();
    let mean_incidence = if accepted > 0 {
        items
            .iter()
            .filter_map(|i| by_id.get(i.opportunity_id.as_str()))
            .map(|o| o.incidence_angle_deg.abs())
            .sum::<f64>()
            / accepted as f64
    } else {
        0.0
    };

    let span_s = match (
        items.iter().map(|i| i.start_time).min(),
        items.iter().map(|i| i.end_time).max(),
    ) {
        (Some(first), Some(last)) if last > first => {
            (last - first).num_milliseconds() as f64 / 1000.0
        }
        _ => 0.0,
    };
    let utilization = if span_s > 0.0 {
        (total_maneuver + total_imaging) / span_s
    } else {
        0.0
    };

    // How much geometry quality the selection gave up versus the pool it
    // chose from.
    let quality_degradation = if !opportunities.is_empty() && accepted > 0 {
        let mean_all: f64 = opportunities.iter().map(|o| o.quality_score).sum::<f64>()
            / opportunities.len() as f64;
        let mean_accepted: f64 = items
            .iter()
            .filter_map(|i| by_id.get(i.opportunity_id.as_str()))
            .map(|o| o.quality_score)
            .sum::<f64>()
            / accepted as f64;
        Some(mean_all - mean_accepted)
    } else {
        None
    };

    ScheduleMetrics {
        algorithm: algorithm.as_str().to_string(),
        evaluated: opportunities.len(),
        accepted,
        rejected: rejections.len(),
        total_value,
        mean_value: if accepted > 0 {
            total_value / accepted as f64
        } else {
            0.0
        },
        mean_incidence_deg: mean_incidence,
        total_maneuver_time_s: total_maneuver,
        total_imaging_time_s: total_imaging,
        total_slack_time_s: total_slack,
        utilization,
        max_roll_deg: items
            .iter()
            .map(|i| i.roll_angle_deg.abs())
            .fold(0.0, f64::max),
        max_pitch_deg: items
            .iter()
            .map(|i| i.pitch_angle_deg.abs())
            .fold(0.0, f64::max),
        opps_using_pitch: items
            .iter()
            .filter(|i| i.pitch_angle_deg.abs() > 1e-9)
            .count(),
        runtime_ms,
        quality_degradation,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(max_roll: f64, max_pitch: Option<f64>) -> BusCapabilities {
        BusCapabilities {
            max_roll_deg: max_roll,
            max_roll_rate_dps: 1.0,
            max_roll_accel_dps2: 0.5,
            max_pitch_deg: max_pitch,
            max_pitch_rate_dps: max_pitch.map(|_| 1.0),
            max_pitch_accel_dps2: max_pitch.map(|_| 0.5),
            settling_time_s: 5.0,
            parallel_slew: true,
        }
    }

    fn fleet(max_roll: f64, max_pitch: Option<f64>) -> BTreeMap<String, BusCapabilities> {
        let mut fleet = BTreeMap::new();
        fleet.insert("sat_a".to_string(), bus(max_roll, max_pitch));
        fleet
    }

    fn opp(id: &str, offset_min: i64, window_min: i64, roll: f64, value: f64) -> Opportunity {
        let base: DateTime<Utc> = "2025-01-15T10:00:00Z".parse().unwrap();
        let start = base + Duration::minutes(offset_min);
        Opportunity {
            id: id.to_string(),
            satellite_id: "sat_a".to_string(),
            target_id: format!("tgt_{id}"),
            start_time: start,
            end_time: start + Duration::minutes(window_min),
            max_elevation_deg: 60.0,
            incidence_angle_deg: roll,
            priority: 1,
            value,
            quality_score: 0.8,
            look_side: None,
            pass_direction: None,
            roll_angle_deg: roll,
            pitch_angle_deg: None,
        }
    }

    fn run(
        opps: &[Opportunity],
        fleet: &BTreeMap<String, BusCapabilities>,
        algorithm: AlgorithmKind,
    ) -> ScheduleOutcome {
        schedule(
            opps,
            fleet,
            algorithm,
            &SchedulerConfig::default(),
            &CancelToken::new(),
        )
    }

    fn assert_invariants(outcome: &ScheduleOutcome, fleet: &BTreeMap<String, BusCapabilities>) {
        let mut per_sat: BTreeMap<&str, Vec<&ScheduledItem>> = BTreeMap::new();
        for item in &outcome.items {
            per_sat.entry(item.satellite_id.as_str()).or_default().push(item);
        }
        for (sat, items) in per_sat {
            let bus = &fleet[sat];
            for item in &items {
                assert!(item.roll_angle_deg.abs() <= bus.max_roll_deg + 1e-6);
                assert!(item.pitch_angle_deg.abs() <= bus.pitch_limit_deg() + 1e-6);
                assert!(item.slack_time_s >= -slew::EPSILON_S);
            }
            for pair in items.windows(2) {
                assert!(pair[0].end_time <= pair[1].start_time, "overlap on {sat}");
                assert!(pair[0].start_time <= pair[1].start_time);
                assert!(slew::feasible_between(pair[0], pair[1], bus));
            }
        }
    }

    #[test]
    fn first_fit_accepts_feasible_sequence() {
        let fleet = fleet(45.0, None);
        let opps = vec![
            opp("a", 0, 10, 10.0, 0.5),
            opp("b", 30, 10, -10.0, 0.6),
            opp("c", 60, 10, 20.0, 0.7),
        ];
        let outcome = run(&opps, &fleet, AlgorithmKind::FirstFit);
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.metrics.accepted, 3);
        assert_eq!(outcome.metrics.rejected, 0);
        assert_invariants(&outcome, &fleet);
    }

    #[test]
    fn first_fit_rejects_overlapping_slots() {
        let fleet = fleet(45.0, None);
        // Same window: the 10 s imaging slots coincide.
        let opps = vec![opp("a", 0, 10, 10.0, 0.5), opp("b", 0, 10, 12.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::FirstFit);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].opportunity_id, "a");
        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(outcome.rejections[0].reason, RejectReason::Overlap);
    }

    #[test]
    fn best_fit_prefers_value_over_chronology() {
        let fleet = fleet(45.0, None);
        let opps = vec![opp("early", 0, 10, 10.0, 0.2), opp("late", 0, 10, 12.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::BestFit);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].opportunity_id, "late");
    }

    #[test]
    fn best_fit_inserts_between_neighbors_when_feasible() {
        let fleet = fleet(45.0, None);
        let opps = vec![
            opp("a", 0, 10, 5.0, 0.9),
            opp("c", 60, 10, 5.0, 0.8),
            opp("b", 30, 10, 5.0, 0.7),
        ];
        let outcome = run(&opps, &fleet, AlgorithmKind::BestFit);
        assert_eq!(outcome.items.len(), 3);
        assert_invariants(&outcome, &fleet);
        let ids: Vec<&str> = outcome
            .items
            .iter()
            .map(|i| i.opportunity_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn roll_over_limit_rejected_without_pitch() {
        let fleet = fleet(30.0, None);
        let opps = vec![opp("far", 0, 10, 40.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::FirstFit);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.rejections[0].reason, RejectReason::RollOverLimit);
    }

    #[test]
    fn pitch_fallback_accepts_over_limit_roll() {
        let fleet = fleet(30.0, Some(30.0));
        let opps = vec![opp("far", 0, 10, 40.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::RollPitchFirstFit);
        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert!((item.roll_angle_deg - 30.0).abs() < 1e-9);
        assert!(item.pitch_angle_deg > 0.0 && item.pitch_angle_deg <= 30.0);
        assert_eq!(outcome.metrics.opps_using_pitch, 1);
        assert_invariants(&outcome, &fleet);
    }

    #[test]
    fn pitch_fallback_respects_pitch_limit() {
        let fleet = fleet(30.0, Some(5.0));
        let opps = vec![opp("far", 0, 10, 60.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::RollPitchFirstFit);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.rejections[0].reason, RejectReason::PitchOverLimit);
    }

    #[test]
    fn pitchless_bus_degrades_to_roll_only() {
        let fleet = fleet(30.0, None);
        let opps = vec![opp("near", 0, 10, 20.0, 0.5), opp("far", 30, 10, 40.0, 0.9)];
        let outcome = run(&opps, &fleet, AlgorithmKind::RollPitchFirstFit);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].opportunity_id, "near");
        assert_eq!(outcome.rejections[0].reason, RejectReason::PitchOverLimit);
    }

    #[test]
    fn unknown_satellite_is_rejected() {
        let fleet = fleet(45.0, None);
        let mut stray = opp("stray", 0, 10, 5.0, 0.5);
        stray.satellite_id = "sat_ghost".to_string();
        let outcome = run(&[stray], &fleet, AlgorithmKind::FirstFit);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.rejections[0].reason, RejectReason::UnknownSatellite);
    }

    #[test]
    fn no_phantom_shots() {
        let fleet = fleet(45.0, None);
        let opps = vec![
            opp("a", 0, 10, 10.0, 0.5),
            opp("b", 30, 10, -10.0, 0.6),
        ];
        for algorithm in [
            AlgorithmKind::FirstFit,
            AlgorithmKind::BestFit,
            AlgorithmKind::RollPitchFirstFit,
            AlgorithmKind::RollPitchBestFit,
        ] {
            let outcome = run(&opps, &fleet, algorithm);
            for item in &outcome.items {
                assert!(opps.iter().any(|o| o.id == item.opportunity_id));
            }
        }
    }

    #[test]
    fn deterministic_output_across_runs() {
        let fleet = fleet(45.0, Some(20.0));
        let opps: Vec<Opportunity> = (0..20)
            .map(|i| opp(&format!("o{i:02}"), i * 7, 10, (i % 9) as f64 * 6.0 - 24.0, 0.3 + (i % 5) as f64 * 0.1))
            .collect();
        for algorithm in [AlgorithmKind::FirstFit, AlgorithmKind::BestFit] {
            let a = run(&opps, &fleet, algorithm);
            let b = run(&opps, &fleet, algorithm);
            assert_eq!(a.items, b.items);
            assert_eq!(a.rejections, b.rejections);
        }
    }

    #[test]
    fn imaging_slot_is_centered_and_clamped() {
        let config = SchedulerConfig { imaging_time_s: 10.0 };
        let o = opp("a", 0, 10, 0.0, 0.5);
        let (start, end) = imaging_slot(&o, &config);
        assert_eq!((end - start).num_seconds(), 10);
        assert!(start > o.start_time && end < o.end_time);

        let whole = SchedulerConfig { imaging_time_s: 0.0 };
        let (start, end) = imaging_slot(&o, &whole);
        assert_eq!(start, o.start_time);
        assert_eq!(end, o.end_time);

        let oversized = SchedulerConfig { imaging_time_s: 1e6 };
        let (start, end) = imaging_slot(&o, &oversized);
        assert_eq!(start, o.start_time);
        assert_eq!(end, o.end_time);
    }

    #[test]
    fn cancelled_run_is_marked_and_partial() {
        let fleet = fleet(45.0, None);
        let opps = vec![opp("a", 0, 10, 10.0, 0.5)];
        let token = CancelToken::new();
        token.cancel();
        let outcome = schedule(
            &opps,
            &fleet,
            AlgorithmKind::FirstFit,
            &SchedulerConfig::default(),
            &token,
        );
        assert!(outcome.metrics.cancelled);
        assert!(outcome.items.is_empty());
    }

    #[test]
    fn metrics_add_up() {
        let fleet = fleet(45.0, None);
        let opps = vec![
            opp("a", 0, 10, 10.0, 0.5),
            opp("b", 30, 10, -10.0, 0.7),
        ];
        let outcome = run(&opps, &fleet, AlgorithmKind::FirstFit);
        let m = &outcome.metrics;
        assert_eq!(m.evaluated, 2);
        assert_eq!(m.accepted, 2);
        assert!((m.total_value - 1.2).abs() < 1e-9);
        assert!((m.mean_value - 0.6).abs() < 1e-9);
        assert!((m.total_imaging_time_s - 20.0).abs() < 1e-9);
        assert!(m.total_maneuver_time_s > 0.0);
        assert!(m.utilization > 0.0 && m.utilization <= 1.0);
        assert!((m.max_roll_deg - 10.0).abs() < 1e-9);
        assert_eq!(m.opps_using_pitch, 0);
    }
}
