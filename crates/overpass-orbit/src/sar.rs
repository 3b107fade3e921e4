//! SAR geometry analysis.
//!
//! Takes the base visibility passes and decides, at each pass's
//! max-elevation epoch, which side the radar must look, which direction
//! the orbit is moving, what the incidence geometry is, and where the
//! swath footprint lands. Passes that fall outside the requested envelope
//! are filtered out, not errored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{LookSide, PassDirection, PassWindow, SarImagingMode, SarPassData};

use crate::geometry::{self, EARTH_RADIUS_KM, Vec3};
use crate::propagator::{OrbitError, Propagator};

/// Everything the SAR layer needs, resolved from mode spec + mission
/// input by the caller. Keeps this crate independent of the config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarGeometryContext {
    pub imaging_mode: SarImagingMode,
    /// Requested look side; `Any` matches both.
    pub look_side: LookSide,
    /// Requested pass direction; `Any` matches both.
    pub pass_direction: PassDirection,
    pub incidence_min_deg: f64,
    pub incidence_max_deg: f64,
    /// Peak-quality incidence for the mode's band model.
    pub optimal_incidence_deg: f64,
    /// Width of the quality band, degrees.
    pub band_width_deg: f64,
    /// Half-angle between swath center and near/far edges.
    pub swath_half_angle_offset_deg: f64,
    pub swath_width_km: f64,
    pub scene_length_km: f64,
}

impl SarGeometryContext {
    /// Band-model quality in [0, 1], peaked at the mode's optimum.
    pub fn quality(&self, incidence_deg: f64) -> f64 {
        let delta = (incidence_deg - self.optimal_incidence_deg) / self.band_width_deg;
        (-delta * delta).exp().clamp(0.0, 1.0)
    }
}

/// Analyze one base pass; `Ok(None)` means the pass fails the envelope.
pub fn analyze_pass(
    prop: &Propagator,
    pass: &PassWindow,
    target_lat: f64,
    target_lon: f64,
    ctx: &SarGeometryContext,
) -> Result<Option<SarPassData>, OrbitError> {
    let t = pass.max_elevation_time;
    let sat_pos = prop.ecef_at(t)?;
    let sat_vel = prop.velocity_ecef_at(t)?;
    let target_pos = geometry::ecef_from_geodetic(target_lat, target_lon, 0.0);

    let direction = compute_pass_direction(sat_vel, sat_pos);
    if !ctx.pass_direction.accepts(direction) {
        return Ok(None);
    }

    let side = compute_look_side(sat_pos, sat_vel, target_pos);
    if !ctx.look_side.accepts(side) {
        return Ok(None);
    }

    let incidence_center = geometry::incidence_angle_deg(sat_pos, target_pos);
    if incidence_center < ctx.incidence_min_deg || incidence_center > ctx.incidence_max_deg {
        return Ok(None);
    }

    let incidence_near = (incidence_center - ctx.swath_half_angle_offset_deg).max(0.0);
    let incidence_far = (incidence_center + ctx.swath_half_angle_offset_deg).min(90.0);

    let corners = swath_polygon(
        sat_pos,
        sat_vel,
        side,
        ctx.swath_width_km,
        ctx.scene_length_km,
        (ctx.incidence_min_deg + ctx.incidence_max_deg) / 2.0,
    );

    Ok(Some(SarPassData {
        look_side: side,
        pass_direction: direction,
        incidence_center_deg: incidence_center,
        incidence_near_deg: incidence_near,
        incidence_far_deg: incidence_far,
        swath_width_km: ctx.swath_width_km,
        scene_length_km: ctx.scene_length_km,
        imaging_mode: ctx.imaging_mode,
        quality_score: ctx.quality(incidence_center),
        swath_corners: corners,
    }))
}

/// Annotate a run of base passes, dropping the ones the envelope rejects.
pub fn annotate_passes(
    prop: &Propagator,
    passes: &[PassWindow],
    target_lat: f64,
    target_lon: f64,
    ctx: &SarGeometryContext,
) -> Result<Vec<(PassWindow, SarPassData)>, OrbitError> {
    let mut accepted = Vec::new();
    for pass in passes {
        if let Some(data) = analyze_pass(prop, pass, target_lat, target_lon, ctx)? {
            accepted.push((pass.clone(), data));
        }
    }
    Ok(accepted)
}

/// Ascending when the velocity has a northward component in the local
/// ENU frame at the sub-satellite point.
pub fn compute_pass_direction(velocity: Vec3, position: Vec3) -> PassDirection {
    let radial = geometry::unit(position);
    let east = geometry::cross([0.0, 0.0, 1.0], radial);
    if geometry::norm(east) < 1e-10 {
        // Directly over a pole; treat as ascending.
        return PassDirection::Ascending;
    }
    let east = geometry::unit(east);
    let north = geometry::cross(radial, east);
    if geometry::dot(velocity, north) > 0.0 {
        PassDirection::Ascending
    } else {
        PassDirection::Descending
    }
}

/// Look side from the sign of `(v × r_sat→tgt) · r̂_radial`;
/// positive means the target sits on the RIGHT of the ground track.
pub fn compute_look_side(sat_pos: Vec3, sat_vel: Vec3, target_pos: Vec3) -> LookSide {
    let to_target = geometry::sub(target_pos, sat_pos);
    let crossed = geometry::cross(sat_vel, to_target);
    let radial = geometry::unit(sat_pos);
    if geometry::dot(crossed, radial) > 0.0 {
        LookSide::Right
    } else {
        LookSide::Left
    }
}

/// Four (lat, lon) swath corners on the surface, counterclockwise.
///
/// The swath center sits cross-track of nadir at the ground range implied
/// by the mid-envelope incidence; corners extend half a scene along-track
/// and half a swath cross-track, then project radially to the surface.
pub fn swath_polygon(
    sat_pos: Vec3,
    sat_vel: Vec3,
    look_side: LookSide,
    swath_width_km: f64,
    scene_length_km: f64,
    center_incidence_deg: f64,
) -> Vec<(f64, f64)> {
    let radial = geometry::unit(sat_pos);

    let vel_horizontal = geometry::sub(
        sat_vel,
        geometry::scale(radial, geometry::dot(sat_vel, radial)),
    );
    let along_track = geometry::unit(vel_horizontal);

    let mut cross_track = geometry::unit(geometry::cross(radial, along_track));
    if look_side == LookSide::Left {
        cross_track = geometry::scale(cross_track, -1.0);
    }

    let sat_alt_km = geometry::norm(sat_pos) - EARTH_RADIUS_KM;
    let nadir_point = geometry::scale(radial, EARTH_RADIUS_KM);
    let ground_range_km = sat_alt_km * center_incidence_deg.to_radians().tan();
    let swath_center = geometry::add(nadir_point, geometry::scale(cross_track, ground_range_km));

    let half_width = swath_width_km / 2.0;
    let half_length = scene_length_km / 2.0;

    let mut corners = Vec::with_capacity(4);
    for along_sign in [-1.0, 1.0] {
        for cross_sign in [-1.0, 1.0] {
            let corner = geometry::add(
                swath_center,
                geometry::add(
                    geometry::scale(along_track, along_sign * half_length),
                    geometry::scale(cross_track, cross_sign * half_width),
                ),
            );
            let on_surface = geometry::scale(geometry::unit(corner), EARTH_RADIUS_KM);
            let (lat, lon, _) = geometry::geodetic_from_ecef(on_surface);
            corners.push((lat, lon));
        }
    }

    // Reorder corner grid into counterclockwise winding.
    vec![corners[0], corners[1], corners[3], corners[2]]
}
