//! Feasibility kernel: maneuver durations and slew feasibility.
//!
//! Each axis follows a minimum-time bang-coast-bang profile under its
//! rate and acceleration limits. Short maneuvers are triangular (never
//! reach the rate limit); long ones accelerate, coast, and decelerate.
//! Settling time applies once per maneuver, after the slower axis when
//! the bus slews both axes in parallel.

use overpass_types::{BusCapabilities, ScheduledItem};

/// Floating tolerance for feasibility comparisons, seconds (10 ms).
pub const EPSILON_S: f64 = 0.010;

/// Minimum time to move one axis through `delta_deg`.
pub fn axis_time(delta_deg: f64, rate_dps: f64, accel_dps2: f64) -> f64 {
    let delta = delta_deg.abs();
    if delta <= 0.0 || rate_dps <= 0.0 || accel_dps2 <= 0.0 {
        return 0.0;
    }
    // Angle swept by a full accelerate-then-decelerate triangle at the
    // rate limit.
    let critical = rate_dps * rate_dps / accel_dps2;
    if delta <= critical {
        2.0 * (delta / accel_dps2).sqrt()
    } else {
        rate_dps / accel_dps2 + delta / rate_dps
    }
}

/// Total maneuver time for a roll/pitch reorientation, including
/// settling. A zero-angle maneuver takes zero time (no settling).
pub fn maneuver_time(delta_roll_deg: f64, delta_pitch_deg: f64, bus: &BusCapabilities) -> f64 {
    let roll = delta_roll_deg.abs();
    let pitch = delta_pitch_deg.abs();
    if roll < 1e-9 && pitch < 1e-9 {
        return 0.0;
    }

    let roll_time = axis_time(roll, bus.max_roll_rate_dps, bus.max_roll_accel_dps2);
    let pitch_time = axis_time(
        pitch,
        bus.max_pitch_rate_dps.unwrap_or(bus.max_roll_rate_dps),
        bus.max_pitch_accel_dps2.unwrap_or(bus.max_roll_accel_dps2),
    );

    let slew = if bus.parallel_slew {
        roll_time.max(pitch_time)
    } else {
        roll_time + pitch_time
    };
    slew + bus.settling_time_s
}

/// Whether the bus can reorient from item `a` to item `b` in the gap
/// between them, within the 10 ms tolerance.
pub fn feasible_between(a: &ScheduledItem, b: &ScheduledItem, bus: &BusCapabilities) -> bool {
    let gap_s = (b.start_time - a.end_time).num_milliseconds() as f64 / 1000.0;
    let required = maneuver_time(
        b.roll_angle_deg - a.roll_angle_deg,
        b.pitch_angle_deg - a.pitch_angle_deg,
        bus,
    );
    gap_s + EPSILON_S >= required
}
