//! Frame math on the spherical Earth model.
//!
//! The whole planning pipeline works on a spherical Earth of radius
//! 6371 km: visibility, incidence, and swath geometry all share the same
//! model, so angles stay mutually consistent. Positions are `[x, y, z]`
//! ECEF kilometers.

/// Mean Earth radius used throughout the pipeline.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub type Vec3 = [f64; 3];

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(v: Vec3) -> f64 {
    dot(v, v).sqrt()
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn scale(v: Vec3, s: f64) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// Unit vector, or zero when the input is degenerate.
pub fn unit(v: Vec3) -> Vec3 {
    let n = norm(v);
    if n < 1e-12 { [0.0, 0.0, 0.0] } else { scale(v, 1.0 / n) }
}

/// Geodetic (spherical) latitude/longitude/altitude to ECEF kilometers.
pub fn ecef_from_geodetic(lat_deg: f64, lon_deg: f64, alt_km: f64) -> Vec3 {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let r = EARTH_RADIUS_KM + alt_km;
    [
        r * lat.cos() * lon.cos(),
        r * lat.cos() * lon.sin(),
        r * lat.sin(),
    ]
}

/// ECEF kilometers back to (lat_deg, lon_deg, alt_km).
pub fn geodetic_from_ecef(p: Vec3) -> (f64, f64, f64) {
    let r = norm(p);
    let lat = (p[2] / r).asin().to_degrees();
    let lon = p[1].atan2(p[0]).to_degrees();
    (lat, lon, r - EARTH_RADIUS_KM)
}

/// Local east/north/up unit vectors at an ECEF point.
///
/// Near the poles the east direction is undefined; callers there get a
/// zero east vector and must handle it (the visibility sweep never places
/// observers at the exact pole).
pub fn enu_basis(p: Vec3) -> (Vec3, Vec3, Vec3) {
    let up = unit(p);
    let east = unit(cross([0.0, 0.0, 1.0], up));
    let north = cross(up, east);
    (east, north, up)
}

/// Elevation and azimuth of a satellite as seen from a ground point.
///
/// Azimuth is degrees clockwise from north in [0, 360).
pub fn elevation_azimuth(observer: Vec3, satellite: Vec3) -> (f64, f64) {
    let (east, north, up) = enu_basis(observer);
    let los = sub(satellite, observer);
    let range = norm(los);
    let e = dot(los, east);
    let n = dot(los, north);
    let u = dot(los, up);
    let elevation = (u / range).asin().to_degrees();
    let azimuth = e.atan2(n).to_degrees().rem_euclid(360.0);
    (elevation, azimuth)
}

/// Off-nadir angle between the satellite's nadir direction and the line of
/// sight to the target. 0° means the target is directly below.
pub fn incidence_angle_deg(satellite: Vec3, target: Vec3) -> f64 {
    let nadir = unit(scale(satellite, -1.0));
    let los = unit(sub(target, satellite));
    dot(nadir, los).clamp(-1.0, 1.0).acos().to_degrees()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Geodetic → ECEF → geodetic is the identity away from the poles.
        #[test]
        fn geodetic_roundtrip_everywhere(
            lat in -89.0f64..89.0,
            lon in -179.9f64..179.9,
            alt in 0.0f64..2000.0,
        ) {
            let p = ecef_from_geodetic(lat, lon, alt);
            let (lat2, lon2, alt2) = geodetic_from_ecef(p);
            prop_assert!((lat - lat2).abs() < 1e-6);
            prop_assert!((lon - lon2).abs() < 1e-6);
            prop_assert!((alt - alt2).abs() < 1e-6);
        }

        /// Elevation is bounded and azimuth wraps into [0, 360).
        #[test]
        fn elevation_azimuth_bounded(
            obs_lat in -80.0f64..80.0,
            obs_lon in -179.0f64..179.0,
            sat_lat in -80.0f64..80.0,
            sat_lon in -179.0f64..179.0,
            alt in 300.0f64..1200.0,
        ) {
            let observer = ecef_from_geodetic(obs_lat, obs_lon, 0.0);
            let satellite = ecef_from_geodetic(sat_lat, sat_lon, alt);
            let (elevation, azimuth) = elevation_azimuth(observer, satellite);
            prop_assert!((-90.0..=90.0).contains(&elevation));
            prop_assert!((0.0..360.0).contains(&azimuth));
        }

        /// Incidence is a bounded angle and zero only near nadir.
        #[test]
        fn incidence_bounded(
            sat_lat in -80.0f64..80.0,
            sat_lon in -179.0f64..179.0,
            tgt_lat in -80.0f64..80.0,
            tgt_lon in -179.0f64..179.0,
            alt in 300.0f64..1200.0,
        ) {
            let satellite = ecef_from_geodetic(sat_lat, sat_lon, alt);
            let target = ecef_from_geodetic(tgt_lat, tgt_lon, 0.0);
            let incidence = incidence_angle_deg(satellite, target);
            prop_assert!((0.0..=180.0).contains(&incidence));
        }
    }
}
