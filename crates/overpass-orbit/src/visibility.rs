//! Adaptive visibility sweep.
//!
//! Finds the windows where a satellite sits above a target's elevation
//! mask. The sweep samples coarsely (30 s) and refines mask crossings by
//! bisection and the elevation peak by ternary search, both down to 1 s,
//! so short passes are not lost to the coarse grid and long windows stay
//! cheap to scan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{CancelToken, PassWindow};

use crate::geometry::{self, Vec3};
use crate::propagator::{OrbitError, Propagator};

/// Sweep tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Minimum elevation for a pass to be open, degrees.
    pub elevation_mask_deg: f64,
    /// Coarse sampling step, seconds.
    pub coarse_step_s: i64,
    /// Refinement resolution for crossings and peaks, seconds.
    pub refine_tolerance_s: i64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            elevation_mask_deg: 10.0,
            coarse_step_s: 30,
            refine_tolerance_s: 1,
        }
    }
}

/// Result of one sweep; `cancelled` marks a partial scan.
#[derive(Debug, Clone, Default)]
pub struct PassScan {
    pub windows: Vec<PassWindow>,
    pub cancelled: bool,
}

/// Sweep one (satellite, target) pair over `[start, end]`.
///
/// Returns an empty list when the target is never visible; targets the
/// orbit can never reach are not an error.
pub fn find_passes(
    prop: &Propagator,
    target_lat: f64,
    target_lon: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cfg: &VisibilityConfig,
    cancel: &CancelToken,
) -> Result<PassScan, OrbitError> {
    let mut scan = PassScan::default();
    if end <= start {
        return Ok(scan);
    }

    let observer = geometry::ecef_from_geodetic(target_lat, target_lon, 0.0);
    let step = Duration::seconds(cfg.coarse_step_s.max(1));
    let mask = cfg.elevation_mask_deg;

    let mut prev_t = start;
    let start_elev = elevation_at(prop, observer, prev_t)?;
    let mut open_since: Option<DateTime<Utc>> = if start_elev >= mask {
        Some(start)
    } else {
        None
    };

    let mut t = start + step;
    loop {
        if cancel.is_cancelled() {
            scan.cancelled = true;
            return Ok(scan);
        }
        let t_clamped = t.min(end);
        let elev = elevation_at(prop, observer, t_clamped)?;

        match open_since {
            None if elev >= mask => {
                // Rising crossing somewhere in (prev_t, t_clamped].
                let rise = refine_crossing(prop, observer, prev_t, t_clamped, mask, cfg, true)?;
                open_since = Some(rise);
            }
            Some(rise) if elev < mask => {
                let set = refine_crossing(prop, observer, prev_t, t_clamped, mask, cfg, false)?;
                scan.windows
                    .push(build_window(prop, observer, rise, set, cfg)?);
                open_since = None;
            }
            _ => {}
        }

        if t_clamped >= end {
            break;
        }
        prev_t = t_clamped;
        t += step;
    }

    // Pass still open at the end of the horizon closes there.
    if let Some(rise) = open_since {
        scan.windows
            .push(build_window(prop, observer, rise, end, cfg)?);
    }

    Ok(scan)
}

fn elevation_at(
    prop: &Propagator,
    observer: Vec3,
    t: DateTime<Utc>,
) -> Result<f64, OrbitError> {
    let sat = prop.ecef_at(t)?;
    Ok(geometry::elevation_azimuth(observer, sat).0)
}

/// Bisect a mask crossing down to the refine tolerance.
///
/// `rising` selects which side of the crossing the low/high samples sit on.
fn refine_crossing(
    prop: &Propagator,
    observer: Vec3,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    mask: f64,
    cfg: &VisibilityConfig,
    rising: bool,
) -> Result<DateTime<Utc>, OrbitError> {
    let tolerance = Duration::seconds(cfg.refine_tolerance_s.max(1));
    while hi - lo > tolerance {
        let mid = lo + (hi - lo) / 2;
        let above = elevation_at(prop, observer, mid)? >= mask;
        if above == rising {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(if rising { hi } else { lo })
}

/// Locate the elevation peak inside an open pass by ternary search.
fn refine_peak(
    prop: &Propagator,
    observer: Vec3,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    cfg: &VisibilityConfig,
) -> Result<DateTime<Utc>, OrbitError> {
    let tolerance = Duration::seconds(cfg.refine_tolerance_s.max(1));
    while hi - lo > tolerance {
        let third = (hi - lo) / 3;
        let m1 = lo + third;
        let m2 = hi - third;
        if elevation_at(prop, observer, m1)? < elevation_at(prop, observer, m2)? {
            lo = m1;
        } else {
            hi = m2;
        }
    }
    Ok(lo + (hi - lo) / 2)
}

fn build_window(
    prop: &Propagator,
    observer: Vec3,
    rise: DateTime<Utc>,
    set: DateTime<Utc>,
    cfg: &VisibilityConfig,
) -> Result<PassWindow, OrbitError> {
    let peak_t = refine_peak(prop, observer, rise, set, cfg)?;

    let sat_rise = prop.ecef_at(rise)?;
    let sat_peak = prop.ecef_at(peak_t)?;
    let sat_set = prop.ecef_at(set)?;

    let (_, start_az) = geometry::elevation_azimuth(observer, sat_rise);
    let (max_elev, max_az) = geometry::elevation_azimuth(observer, sat_peak);
    let (_, end_az) = geometry::elevation_azimuth(observer, sat_set);

    Ok(PassWindow {
        start_time: rise,
        end_time: set,
        max_elevation_time: peak_t,
        max_elevation_deg: max_elev,
        start_azimuth_deg: start_az,
        max_elevation_azimuth_deg: max_az,
        end_azimuth_deg: end_az,
        incidence_angle_deg: geometry::incidence_angle_deg(sat_peak, observer),
    })
}
