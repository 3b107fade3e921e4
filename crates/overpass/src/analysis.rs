//! Opportunity generation: visibility × geometry × value.
//!
//! Sweeps every (satellite, target) pair in parallel, layers SAR geometry
//! where the mission and the satellite both speak SAR, and prices each
//! surviving pass into an [`Opportunity`]. Opportunity ids are stable
//! within a run (`opp_{sat}_{target}_{index}`) so downstream audit can
//! always trace an acquisition back to its input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use overpass_orbit::pool::{ProgressFn, run_parallel_sweep};
use overpass_orbit::propagator::{OrbitError, Propagator};
use overpass_orbit::sar::{self, SarGeometryContext};
use overpass_orbit::visibility::VisibilityConfig;
use overpass_types::{
    CancelToken, ImagingModality, LookSide, Opportunity, PassWindow, Satellite, Target,
};

use crate::scoring::{self, QualityModel, Weights};

/// Everything opportunity generation needs beyond the fleet and targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub visibility: VisibilityConfig,
    pub weights: Weights,
    pub quality_model: QualityModel,
    pub ideal_incidence_deg: f64,
    pub band_width_deg: f64,
    /// SAR envelope; applied to satellites whose modality is SAR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sar: Option<SarGeometryContext>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            visibility: VisibilityConfig::default(),
            weights: Weights::default(),
            quality_model: QualityModel::Monotonic,
            ideal_incidence_deg: scoring::DEFAULT_IDEAL_INCIDENCE_DEG,
            band_width_deg: scoring::DEFAULT_BAND_WIDTH_DEG,
            sar: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub opportunities: Vec<Opportunity>,
    pub cancelled: bool,
}

/// Generate scored opportunities for the fleet over `[start, end]`.
pub fn generate_opportunities(
    satellites: &[Satellite],
    targets: &[Target],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &AnalysisConfig,
    progress: Option<ProgressFn>,
    cancel: &CancelToken,
) -> Result<AnalysisOutcome, OrbitError> {
    let sweep = run_parallel_sweep(
        satellites,
        targets,
        start,
        end,
        &cfg.visibility,
        progress,
        cancel,
    )?;

    let mut opportunities = Vec::new();
    for satellite in satellites {
        let prop = Propagator::from_tle(
            &satellite.name,
            &satellite.tle_line1,
            &satellite.tle_line2,
        )?;
        let sar_ctx = match (&cfg.sar, satellite.modality) {
            (Some(ctx), ImagingModality::Sar) => Some(ctx),
            _ => None,
        };

        for target in targets {
            let key = (satellite.id.clone(), target.id.clone());
            let Some(windows) = sweep.passes.get(&key) else {
                continue;
            };
            for (index, window) in windows.iter().enumerate() {
                let opportunity = build_opportunity(
                    &prop, satellite, target, window, index, sar_ctx, cfg,
                )?;
                if let Some(opportunity) = opportunity {
                    opportunities.push(opportunity);
                }
            }
        }
    }

    // Chronological order fixes the timing score and the output ordering.
    opportunities.sort_by(|a, b| (a.start_time, &a.id).cmp(&(b.start_time, &b.id)));
    let total = opportunities.len();
    for (index, opp) in opportunities.iter_mut().enumerate() {
        let timing = scoring::timing_score(index, total);
        opp.value = scoring::composite_value(opp.priority, opp.quality_score, timing, &cfg.weights);
    }

    Ok(AnalysisOutcome {
        opportunities,
        cancelled: sweep.cancelled,
    })
}

fn build_opportunity(
    prop: &Propagator,
    satellite: &Satellite,
    target: &Target,
    window: &PassWindow,
    index: usize,
    sar_ctx: Option<&SarGeometryContext>,
    cfg: &AnalysisConfig,
) -> Result<Option<Opportunity>, OrbitError> {
    let id = format!("opp_{}_{}_{index}", satellite.id, target.id);

    let (look_side, pass_direction, incidence, quality) = match sar_ctx {
        Some(ctx) => {
            let Some(data) =
                sar::analyze_pass(prop, window, target.latitude, target.longitude, ctx)?
            else {
                return Ok(None);
            };
            (
                Some(data.look_side),
                Some(data.pass_direction),
                data.incidence_center_deg,
                data.quality_score,
            )
        }
        None => {
            // Look side still decides the sign of the roll command.
            let t = window.max_elevation_time;
            let sat_pos = prop.ecef_at(t)?;
            let sat_vel = prop.velocity_ecef_at(t)?;
            let target_pos = overpass_orbit::geometry::ecef_from_geodetic(
                target.latitude,
                target.longitude,
                0.0,
            );
            let side = sar::compute_look_side(sat_pos, sat_vel, target_pos);
            let direction = sar::compute_pass_direction(sat_vel, sat_pos);
            let quality = scoring::quality_score(
                Some(window.incidence_angle_deg),
                cfg.quality_model,
                cfg.ideal_incidence_deg,
                cfg.band_width_deg,
            );
            (
                Some(side),
                Some(direction),
                window.incidence_angle_deg,
                quality,
            )
        }
    };

    // Roll is the signed incidence: positive to the right of track.
    let roll = match look_side {
        Some(LookSide::Left) => -incidence.abs(),
        _ => incidence.abs(),
    };

    Ok(Some(Opportunity {
        id,
        satellite_id: satellite.id.clone(),
        target_id: target.id.clone(),
        start_time: window.start_time,
        end_time: window.end_time,
        max_elevation_deg: window.max_elevation_deg,
        incidence_angle_deg: incidence,
        priority: target.priority,
        value: 0.0,
        quality_score: quality,
        look_side,
        pass_direction,
        roll_angle_deg: roll,
        pitch_angle_deg: None,
    }))
}
