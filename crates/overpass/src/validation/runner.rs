//! Scenario execution.
//!
//! Runs a scenario through Analysis → Planning → [Repair] →
//! Commit-Preview → Commit → Conflict-Recompute, timing each stage and
//! asserting the workflow invariants at the end. Dry runs execute the
//! full pipeline against a private in-memory database, so the caller's
//! store is never touched.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;

use overpass_config::docs::AdminConfig;
use overpass_config::resolver::Resolver;
use overpass_orbit::sar::SarGeometryContext;
use overpass_orbit::visibility::VisibilityConfig;
use overpass_store::schedule::CommitRequest;
use overpass_store::workspace::WorkspaceUpdate;
use overpass_store::Store;
use overpass_types::{
    Acquisition, AcquisitionState, BusCapabilities, CancelToken, CommitType, LockLevel,
    MissionInput, MissionMode, Opportunity, RepairDiff, SarParams, ScheduledItem,
};

use crate::analysis::{self, AnalysisConfig};
use crate::conflicts::{self, ConflictDetectionConfig};
use crate::engine::{self, SchedulerConfig};
use crate::plan;
use crate::repair;
use crate::scoring::{QualityModel, Weights};
use crate::validation::invariants::{self, SlotView};
use crate::validation::report::{
    InvariantResult, StageMetrics, ValidationReport, WorkflowCounts, WorkflowMetrics,
    WorkflowStage,
};
use crate::validation::scenario::WorkflowScenario;

/// Executes scenarios against a loaded admin configuration.
pub struct ScenarioRunner {
    admin: AdminConfig,
    detection: ConflictDetectionConfig,
}

impl ScenarioRunner {
    pub fn new(admin: AdminConfig) -> Self {
        Self {
            admin,
            detection: ConflictDetectionConfig::default(),
        }
    }

    pub fn with_detection(mut self, detection: ConflictDetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    /// Execute a scenario. `previous_hash` arms the determinism
    /// invariant; pass the hash from an earlier run of the same scenario.
    pub fn run_scenario(
        &self,
        store: &mut Store,
        scenario: &WorkflowScenario,
        previous_hash: Option<&str>,
    ) -> Result<ValidationReport> {
        if scenario.config.dry_run {
            let mut sandbox = Store::open_in_memory().context("failed to open dry-run store")?;
            self.run_inner(&mut sandbox, scenario, previous_hash)
        } else {
            self.run_inner(store, scenario, previous_hash)
        }
    }

    fn run_inner(
        &self,
        store: &mut Store,
        scenario: &WorkflowScenario,
        previous_hash: Option<&str>,
    ) -> Result<ValidationReport> {
        let total_start = Instant::now();
        let mut stages: Vec<StageMetrics> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let cancel = CancelToken::new();

        let satellites: Vec<_> = scenario
            .satellites
            .iter()
            .map(|s| s.to_satellite(self.admin.satellite(&s.id).map(|sat| &sat.bus)))
            .collect();
        let targets: Vec<_> = scenario.targets.iter().map(|t| t.to_target()).collect();
        let fleet: BTreeMap<String, BusCapabilities> = satellites
            .iter()
            .map(|s| (s.id.clone(), s.bus.clone()))
            .collect();
        let satellite_ids: Vec<String> = satellites.iter().map(|s| s.id.clone()).collect();

        // Governance gate first; a scenario that fails to resolve fails
        // the run outright.
        let mission_input = mission_input_from(scenario);
        let resolver = Resolver::new(&self.admin);
        let resolve = resolver.resolve(&mission_input, &satellite_ids, true);
        let Some(resolved) = resolve.config else {
            for violation in &resolve.violations {
                errors.push(format!("{}: {}", violation.field, violation.message));
            }
            return Ok(self.failed_report(scenario, errors, total_start, previous_hash));
        };
        let config_hash = resolved.config_hash.clone();

        let workspace_id = store
            .create_workspace(
                &scenario.name,
                WorkspaceUpdate {
                    mission_mode: Some(scenario.config.mission_mode),
                    time_window: Some((scenario.config.start_time, scenario.config.end_time)),
                    satellites_count: Some(satellites.len() as u32),
                    targets_count: Some(targets.len() as u32),
                    ..WorkspaceUpdate::default()
                },
            )
            .map_err(overpass_types::CoreError::from)
            .context("failed to create scenario workspace")?;

        // ---- Analysis -------------------------------------------------
        let stage_start = Instant::now();
        let analysis_cfg = self.analysis_config(scenario, &resolved.effective_incidence);
        let outcome = analysis::generate_opportunities(
            &satellites,
            &targets,
            scenario.config.start_time,
            scenario.config.end_time,
            &analysis_cfg,
            None,
            &cancel,
        )
        .context("visibility analysis failed")?;
        let opportunities = outcome.opportunities;
        stages.push(StageMetrics::ok(
            WorkflowStage::Analysis,
            stage_start.elapsed().as_secs_f64() * 1000.0,
            satellites.len() * targets.len(),
            opportunities.len(),
        ));

        // ---- Planning -------------------------------------------------
        let stage_start = Instant::now();
        let scheduler_cfg = SchedulerConfig {
            imaging_time_s: scenario.config.imaging_time_s,
        };
        let planning = engine::schedule(
            &opportunities,
            &fleet,
            scenario.config.algorithm,
            &scheduler_cfg,
            &cancel,
        );
        stages.push(StageMetrics::ok(
            WorkflowStage::Planning,
            stage_start.elapsed().as_secs_f64() * 1000.0,
            opportunities.len(),
            planning.items.len(),
        ));

        // ---- Repair (optional) ---------------------------------------
        let baseline = store
            .acquisitions_in_horizon(
                &workspace_id,
                scenario.config.start_time,
                scenario.config.end_time,
                None,
            )
            .map_err(overpass_types::CoreError::from)?;
        let hard_before: BTreeSet<String> = baseline
            .iter()
            .filter(|a| a.lock_level == LockLevel::Hard)
            .map(|a| a.id.clone())
            .collect();

        let mut final_items = planning.items.clone();
        let mut final_metrics = planning.metrics.clone();
        let mut repair_diff: Option<RepairDiff> = None;
        if scenario.config.run_repair {
            let stage_start = Instant::now();
            let blocked = repair::planning_blocked_intervals(
                scenario.config.planning_mode,
                &baseline,
                scenario.config.lock_policy,
            );
            let (filtered, _rejected) =
                repair::filter_opportunities_incremental(&opportunities, &blocked, &fleet);
            let replanned = engine::schedule(
                &filtered,
                &fleet,
                scenario.config.algorithm,
                &scheduler_cfg,
                &cancel,
            );
            match repair::execute_repair_planning(
                &baseline,
                &replanned.items,
                scenario.config.repair_objective,
                scenario.config.max_repair_changes,
            ) {
                Ok(diff) => {
                    stages.push(StageMetrics::ok(
                        WorkflowStage::Repair,
                        stage_start.elapsed().as_secs_f64() * 1000.0,
                        filtered.len(),
                        diff.change_count(),
                    ));
                    final_items = replanned.items;
                    final_metrics = replanned.metrics;
                    repair_diff = Some(diff);
                }
                Err(e) => {
                    stages.push(StageMetrics {
                        stage: WorkflowStage::Repair,
                        runtime_ms: stage_start.elapsed().as_secs_f64() * 1000.0,
                        success: false,
                        error_message: Some(e.to_string()),
                        input_count: filtered.len(),
                        output_count: 0,
                    });
                    errors.push(format!("repair failed: {e}"));
                }
            }
        }

        // ---- Commit preview ------------------------------------------
        let stage_start = Instant::now();
        let dropped_ids: BTreeSet<&str> = repair_diff
            .as_ref()
            .map(|d| d.dropped.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let mut hypothetical: Vec<Acquisition> = baseline
            .iter()
            .filter(|a| !dropped_ids.contains(a.id.as_str()))
            .cloned()
            .collect();
        hypothetical.extend(final_items.iter().map(|item| {
            pending_acquisition(item, &workspace_id, scenario.config.mission_mode)
        }));
        let preview_conflicts =
            conflicts::detect_conflicts(&hypothetical, &fleet, &self.detection);
        stages.push(StageMetrics::ok(
            WorkflowStage::CommitPreview,
            stage_start.elapsed().as_secs_f64() * 1000.0,
            hypothetical.len(),
            preview_conflicts.len(),
        ));

        // ---- Commit ---------------------------------------------------
        let stage_start = Instant::now();
        let plan_row = plan::build_plan(
            &workspace_id,
            scenario.config.algorithm,
            &scheduler_cfg,
            &opportunities,
            &final_metrics,
            serde_json::json!({
                "config_hash": config_hash,
                "resolved_at": resolved.resolved_at,
                "effective_incidence": resolved.effective_incidence,
            }),
        );
        store
            .save_plan(&plan_row, &final_items)
            .map_err(overpass_types::CoreError::from)?;
        let lock_levels: BTreeMap<String, LockLevel> = targets
            .iter()
            .map(|t| (t.id.clone(), t.lock_level))
            .collect();
        let commit = store
            .commit_plan(&CommitRequest {
                plan_id: plan_row.id.clone(),
                commit_type: if repair_diff.is_some() {
                    CommitType::Repair
                } else {
                    CommitType::Normal
                },
                config_hash: config_hash.clone(),
                mode: scenario.config.mission_mode,
                drop_acquisition_ids: repair_diff
                    .as_ref()
                    .map(|d| d.dropped.clone())
                    .unwrap_or_default(),
                lock_levels,
                repair_diff: repair_diff.clone(),
                score_before: None,
                score_after: Some(plan::schedule_score(&final_items)),
                conflicts_before: Some(preview_conflicts.len()),
                conflicts_after: None,
                notes: Some(format!("scenario {}", scenario.id)),
            })
            .map_err(overpass_types::CoreError::from)?;
        stages.push(StageMetrics::ok(
            WorkflowStage::Commit,
            stage_start.elapsed().as_secs_f64() * 1000.0,
            final_items.len(),
            commit.acquisition_ids.len(),
        ));

        // ---- Conflict recompute --------------------------------------
        let stage_start = Instant::now();
        let committed = store
            .acquisitions_in_horizon(
                &workspace_id,
                scenario.config.start_time,
                scenario.config.end_time,
                None,
            )
            .map_err(overpass_types::CoreError::from)?;
        let recomputed = conflicts::detect_conflicts(&committed, &fleet, &self.detection);
        conflicts::persist_conflicts(store, &workspace_id, &recomputed, true)?;
        stages.push(StageMetrics::ok(
            WorkflowStage::ConflictRecompute,
            stage_start.elapsed().as_secs_f64() * 1000.0,
            committed.len(),
            recomputed.len(),
        ));

        // ---- Invariants ----------------------------------------------
        let slots: Vec<SlotView> = committed
            .iter()
            .filter(|a| a.state != AcquisitionState::Failed)
            .map(SlotView::from)
            .collect();
        let mut invariant_results = vec![
            invariants::check_no_overlap(&slots),
            invariants::check_slew_feasibility(&slots, &fleet),
            invariants::check_hard_locks_unchanged(&hard_before, &committed),
            match &repair_diff {
                Some(diff) => invariants::check_repair_diff_consistent(
                    diff,
                    commit.audit_row.acquisitions_created,
                    commit.audit_row.acquisitions_dropped,
                ),
                None => InvariantResult::pass(
                    crate::validation::report::InvariantType::RepairDiffConsistent,
                    "no repair stage in this run",
                ),
            },
            invariants::check_conflict_preview_match(&preview_conflicts, &recomputed),
        ];

        // ---- Expectations --------------------------------------------
        check_expectations(
            scenario,
            &opportunities,
            &final_items,
            &final_metrics,
            &mut errors,
        );

        // ---- Report ---------------------------------------------------
        let counts = WorkflowCounts {
            opportunities: opportunities.len(),
            planned: final_items.len(),
            committed: commit.acquisition_ids.len(),
            conflicts: recomputed.len(),
        };
        let metrics = workflow_metrics(&opportunities, &final_items, &final_metrics);

        let mut report = ValidationReport {
            report_id: format!("report_{}", Utc::now().format("%Y%m%dT%H%M%S%3f")),
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            timestamp: Utc::now(),
            config_hash,
            passed: false,
            total_invariants: 0,
            passed_invariants: 0,
            failed_invariants: 0,
            stages,
            invariants: Vec::new(),
            counts,
            metrics,
            repair_diff,
            total_runtime_ms: total_start.elapsed().as_secs_f64() * 1000.0,
            report_hash: String::new(),
            errors,
        };

        // The determinism invariant compares hashes over everything
        // except itself, so it is evaluated on a provisional report.
        report.invariants = invariant_results.clone();
        report.passed =
            report.invariants.iter().all(|i| i.passed) && report.errors.is_empty();
        let provisional_hash = report.compute_report_hash();
        invariant_results.push(invariants::check_deterministic(
            previous_hash,
            &provisional_hash,
        ));

        report.invariants = invariant_results;
        report.total_invariants = report.invariants.len();
        report.passed_invariants = report.invariants.iter().filter(|i| i.passed).count();
        report.failed_invariants = report.total_invariants - report.passed_invariants;
        report.passed = report.failed_invariants == 0 && report.errors.is_empty();
        report.report_hash = provisional_hash;
        Ok(report)
    }

    fn analysis_config(
        &self,
        scenario: &WorkflowScenario,
        effective_incidence: &Option<(f64, f64)>,
    ) -> AnalysisConfig {
        let weights =
            Weights::preset(&scenario.config.weight_preset).unwrap_or(Weights::BALANCED);
        let visibility = VisibilityConfig {
            elevation_mask_deg: scenario.config.elevation_mask_deg,
            ..VisibilityConfig::default()
        };

        if scenario.config.mission_mode == MissionMode::Sar {
            let mode_name = scenario.config.imaging_mode.as_str();
            if let Some(spec) = self.admin.sar_mode(mode_name) {
                let (incidence_min, incidence_max) = effective_incidence.unwrap_or((
                    spec.incidence_angle.recommended_min,
                    spec.incidence_angle.recommended_max,
                ));
                return AnalysisConfig {
                    visibility,
                    weights,
                    quality_model: QualityModel::Band,
                    ideal_incidence_deg: spec.quality.optimal_incidence_deg,
                    band_width_deg: spec.quality.band_width_deg,
                    sar: Some(SarGeometryContext {
                        imaging_mode: scenario.config.imaging_mode,
                        look_side: scenario.config.look_side,
                        pass_direction: scenario.config.pass_direction,
                        incidence_min_deg: incidence_min,
                        incidence_max_deg: incidence_max,
                        optimal_incidence_deg: spec.quality.optimal_incidence_deg,
                        band_width_deg: spec.quality.band_width_deg,
                        swath_half_angle_offset_deg: self
                            .admin
                            .sar_modes
                            .swath_geometry
                            .swath_half_angle_offset_deg,
                        swath_width_km: spec.scene.width_km,
                        scene_length_km: spec.scene.length_km,
                    }),
                };
            }
        }

        AnalysisConfig {
            visibility,
            weights,
            quality_model: QualityModel::Monotonic,
            ..AnalysisConfig::default()
        }
    }

    fn failed_report(
        &self,
        scenario: &WorkflowScenario,
        errors: Vec<String>,
        total_start: Instant,
        previous_hash: Option<&str>,
    ) -> ValidationReport {
        let mut report = ValidationReport {
            report_id: format!("report_{}", Utc::now().format("%Y%m%dT%H%M%S%3f")),
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            timestamp: Utc::now(),
            config_hash: self.admin.config_hash().unwrap_or_default(),
            passed: false,
            total_invariants: 0,
            passed_invariants: 0,
            failed_invariants: 0,
            stages: Vec::new(),
            invariants: Vec::new(),
            counts: WorkflowCounts::default(),
            metrics: WorkflowMetrics::default(),
            repair_diff: None,
            total_runtime_ms: total_start.elapsed().as_secs_f64() * 1000.0,
            report_hash: String::new(),
            errors,
        };
        let hash = report.compute_report_hash();
        report
            .invariants
            .push(invariants::check_deterministic(previous_hash, &hash));
        report.total_invariants = 1;
        report.passed_invariants = report.invariants.iter().filter(|i| i.passed).count();
        report.failed_invariants = report.total_invariants - report.passed_invariants;
        report.report_hash = hash;
        report
    }
}

fn mission_input_from(scenario: &WorkflowScenario) -> MissionInput {
    let sar = (scenario.config.mission_mode == MissionMode::Sar).then(|| SarParams {
        imaging_mode: scenario.config.imaging_mode,
        look_side: scenario.config.look_side,
        pass_direction: scenario.config.pass_direction,
        incidence_min_deg: scenario.config.incidence_min_deg,
        incidence_max_deg: scenario.config.incidence_max_deg,
    });
    MissionInput {
        start_time: scenario.config.start_time,
        end_time: scenario.config.end_time,
        mode: scenario.config.mission_mode,
        pointing_angle_deg: None,
        sar,
        bus_overrides: BTreeMap::new(),
        allow_bus_override: false,
    }
}

/// A not-yet-committed plan item viewed as an acquisition for preview.
fn pending_acquisition(
    item: &ScheduledItem,
    workspace_id: &str,
    mode: MissionMode,
) -> Acquisition {
    Acquisition {
        id: format!("pending_{}", item.opportunity_id),
        workspace_id: workspace_id.to_string(),
        plan_id: None,
        satellite_id: item.satellite_id.clone(),
        target_id: item.target_id.clone(),
        start_time: item.start_time,
        end_time: item.end_time,
        roll_angle_deg: item.roll_angle_deg,
        pitch_angle_deg: Some(item.pitch_angle_deg),
        mode,
        state: AcquisitionState::Committed,
        lock_level: LockLevel::None,
        source: "preview".to_string(),
        opportunity_id: Some(item.opportunity_id.clone()),
        created_at: item.start_time,
        updated_at: item.start_time,
    }
}

fn check_expectations(
    scenario: &WorkflowScenario,
    opportunities: &[Opportunity],
    items: &[ScheduledItem],
    metrics: &overpass_types::ScheduleMetrics,
    errors: &mut Vec<String>,
) {
    let expectations = &scenario.expectations;
    if let Some(min) = expectations.min_accepted {
        if items.len() < min {
            errors.push(format!(
                "expected at least {min} accepted items, got {}",
                items.len()
            ));
        }
    }
    if let Some(side) = expectations.expect_single_look_side {
        let offenders = opportunities
            .iter()
            .filter(|o| o.look_side != Some(side))
            .count();
        if offenders > 0 {
            errors.push(format!(
                "expected every opportunity to look {side:?}, {offenders} did not"
            ));
        }
    }
    if let Some(max_mean) = expectations.max_mean_incidence_deg {
        if metrics.mean_incidence_deg > max_mean {
            errors.push(format!(
                "mean incidence {:.2}° exceeds expected {max_mean}°",
                metrics.mean_incidence_deg
            ));
        }
    }
    if let Some(min_pitch) = expectations.min_opps_using_pitch {
        if metrics.opps_using_pitch < min_pitch {
            errors.push(format!(
                "expected at least {min_pitch} item(s) using pitch, got {}",
                metrics.opps_using_pitch
            ));
        }
    }
    if let Some((min, max)) = expectations.incidence_range {
        let offenders = opportunities
            .iter()
            .filter(|o| o.incidence_angle_deg < min || o.incidence_angle_deg > max)
            .count();
        if offenders > 0 {
            errors.push(format!(
                "{offenders} opportunity(ies) outside incidence range [{min}, {max}]"
            ));
        }
    }
}

fn workflow_metrics(
    opportunities: &[Opportunity],
    items: &[ScheduledItem],
    metrics: &overpass_types::ScheduleMetrics,
) -> WorkflowMetrics {
    use overpass_types::{LookSide, PassDirection};
    WorkflowMetrics {
        total_value: plan::schedule_score(items),
        mean_incidence_deg: if items.is_empty() {
            None
        } else {
            Some(metrics.mean_incidence_deg)
        },
        left_swath_count: opportunities
            .iter()
            .filter(|o| o.look_side == Some(LookSide::Left))
            .count(),
        right_swath_count: opportunities
            .iter()
            .filter(|o| o.look_side == Some(LookSide::Right))
            .count(),
        ascending_count: opportunities
            .iter()
            .filter(|o| o.pass_direction == Some(PassDirection::Ascending))
            .count(),
        descending_count: opportunities
            .iter()
            .filter(|o| o.pass_direction == Some(PassDirection::Descending))
            .count(),
        opps_using_pitch: metrics.opps_using_pitch,
    }
}
