//! SGP4 propagator adapter.
//!
//! Thin wrapper around the `sgp4` crate that samples geodetic position and
//! ECEF velocity at arbitrary timestamps. The TEME state vector from SGP4
//! is rotated into ECEF through the Greenwich mean sidereal angle; velocity
//! comes from a central finite difference of ECEF positions over ±1 s so
//! that Earth rotation is already folded in, matching the downstream
//! look-side and pass-direction math.

use chrono::{DateTime, Duration, Utc};

use crate::geometry::{self, Vec3};

/// Errors surfaced by the adapter.
#[derive(Debug, thiserror::Error)]
pub enum OrbitError {
    /// The two-line element set failed to parse or initialize.
    #[error("invalid ephemeris for '{name}': {detail}")]
    InvalidEphemeris { name: String, detail: String },

    /// The propagator refused the requested timestamp.
    #[error("timestamp {at} outside usable epoch range for '{name}': {detail}")]
    OutOfEpochRange {
        name: String,
        at: DateTime<Utc>,
        detail: String,
    },
}

/// One satellite's propagator. Not shared across threads; workers build
/// their own from the TLE strings.
#[derive(Debug)]
pub struct Propagator {
    name: String,
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

impl Propagator {
    pub fn from_tle(name: &str, line1: &str, line2: &str) -> Result<Self, OrbitError> {
        let elements =
            sgp4::Elements::from_tle(Some(name.to_string()), line1.as_bytes(), line2.as_bytes())
                .map_err(|e| OrbitError::InvalidEphemeris {
                    name: name.to_string(),
                    detail: e.to_string(),
                })?;
        let constants =
            sgp4::Constants::from_elements(&elements).map_err(|e| OrbitError::InvalidEphemeris {
                name: name.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            elements,
            constants,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// TEME state vector at `t`, kilometers.
    fn teme_position(&self, t: DateTime<Utc>) -> Result<Vec3, OrbitError> {
        let minutes = self
            .elements
            .datetime_to_minutes_since_epoch(&t.naive_utc())
            .map_err(|e| OrbitError::OutOfEpochRange {
                name: self.name.clone(),
                at: t,
                detail: e.to_string(),
            })?;
        let prediction =
            self.constants
                .propagate(minutes)
                .map_err(|e| OrbitError::OutOfEpochRange {
                    name: self.name.clone(),
                    at: t,
                    detail: e.to_string(),
                })?;
        Ok(prediction.position)
    }

    /// ECEF position at `t`, kilometers.
    pub fn ecef_at(&self, t: DateTime<Utc>) -> Result<Vec3, OrbitError> {
        let teme = self.teme_position(t)?;
        Ok(rotate_teme_to_ecef(teme, t))
    }

    /// Geodetic sample `(lat_deg, lon_deg, alt_km)` at `t`.
    ///
    /// Repeated calls with equal inputs return byte-identical tuples.
    pub fn geodetic_at(&self, t: DateTime<Utc>) -> Result<(f64, f64, f64), OrbitError> {
        Ok(geometry::geodetic_from_ecef(self.ecef_at(t)?))
    }

    /// ECEF velocity at `t` in km/s by central finite difference over ±1 s.
    pub fn velocity_ecef_at(&self, t: DateTime<Utc>) -> Result<Vec3, OrbitError> {
        let before = self.ecef_at(t - Duration::seconds(1))?;
        let after = self.ecef_at(t + Duration::seconds(1))?;
        Ok(geometry::scale(geometry::sub(after, before), 0.5))
    }
}

/// Rotate a TEME vector into ECEF by the Greenwich mean sidereal angle.
fn rotate_teme_to_ecef(p: Vec3, t: DateTime<Utc>) -> Vec3 {
    let theta = gmst_deg(t).to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    [
        p[0] * cos_t + p[1] * sin_t,
        -p[0] * sin_t + p[1] * cos_t,
        p[2],
    ]
}

/// Greenwich mean sidereal time, degrees in [0, 360).
///
/// IAU 1982 linearized form; sub-arcsecond terms are irrelevant at the
/// accuracy of the spherical pipeline.
fn gmst_deg(t: DateTime<Utc>) -> f64 {
    // Days since J2000.0 (2000-01-01 12:00 UT, unix 946728000).
    const J2000_UNIX_MS: i64 = 946_728_000_000;
    let days = (t.timestamp_millis() - J2000_UNIX_MS) as f64 / 86_400_000.0;
    (280.460_618_37 + 360.985_647_366_29 * days).rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{EARTH_RADIUS_KM, norm};

    const ISS_LINE1: &str =
        "1 25544U 98067A   24001.00000000  .00002182  00000-0  40864-4 0  9996";
    const ISS_LINE2: &str =
        "2 25544  51.6461 339.7939 0001220  92.8340 267.3124 15.49309239426382";

    fn iss() -> Propagator {
        Propagator::from_tle("ISS (ZARYA)", ISS_LINE1, ISS_LINE2).expect("valid TLE")
    }

    fn epoch() -> DateTime<Utc> {
        "2024-01-01T06:00:00Z".parse().unwrap()
    }

    #[test]
    fn rejects_malformed_tle() {
        let err = Propagator::from_tle("BROKEN", "1 garbage", "2 garbage").unwrap_err();
        assert!(matches!(err, OrbitError::InvalidEphemeris { .. }));
    }

    #[test]
    fn iss_altitude_in_leo_band() {
        let (lat, lon, alt) = iss().geodetic_at(epoch()).unwrap();
        assert!((-90.0..=90.0).contains(&lat));
        assert!((-180.0..=180.0).contains(&lon));
        assert!(
            (300.0..500.0).contains(&alt),
            "ISS altitude {alt} km outside LEO band"
        );
    }

    #[test]
    fn iss_latitude_bounded_by_inclination() {
        let prop = iss();
        let mut t = epoch();
        for _ in 0..180 {
            let (lat, _, _) = prop.geodetic_at(t).unwrap();
            assert!(lat.abs() <= 52.0, "latitude {lat} exceeds inclination");
            t += Duration::seconds(60);
        }
    }

    #[test]
    fn velocity_magnitude_is_orbital() {
        let v = iss().velocity_ecef_at(epoch()).unwrap();
        let speed = norm(v);
        // ECEF speed: inertial ~7.7 km/s minus up to ~0.5 km/s of Earth
        // rotation depending on geometry.
        assert!((6.5..8.5).contains(&speed), "speed {speed} km/s");
    }

    #[test]
    fn position_radius_consistent() {
        let p = iss().ecef_at(epoch()).unwrap();
        let r = norm(p);
        assert!(r > EARTH_RADIUS_KM + 300.0 && r < EARTH_RADIUS_KM + 500.0);
    }

    #[test]
    fn repeated_samples_are_identical() {
        let prop = iss();
        let a = prop.geodetic_at(epoch()).unwrap();
        let b = prop.geodetic_at(epoch()).unwrap();
        assert_eq!(a, b);
        let prop2 = iss();
        let c = prop2.geodetic_at(epoch()).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn gmst_wraps_into_range() {
        let g = gmst_deg(epoch());
        assert!((0.0..360.0).contains(&g));
        // One sidereal day later the angle nearly repeats.
        let later = epoch() + Duration::milliseconds(86_164_091);
        let g2 = gmst_deg(later);
        assert!((g - g2).abs() < 0.01 || (g - g2).abs() > 359.99);
    }
}
