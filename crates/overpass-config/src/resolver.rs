//! Mission input resolution and parameter governance.
//!
//! Platform truth (bus limits, rates, settling, sensor geometry) belongs
//! to the admin documents; mission input may only steer what a mission is
//! allowed to steer. The resolver enforces that ownership split, clamps
//! or rejects out-of-envelope values, and emits the fully-resolved,
//! hashed configuration a planning run executes against.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{ImagingModality, MissionInput, MissionMode};

use crate::docs::AdminConfig;

/// Parameters only the admin surface may change. Mission input carrying
/// any of these is rejected unless `allow_bus_override` is set.
pub const ADMIN_ONLY_PARAMS: [&str; 6] = [
    "max_roll_rate_dps",
    "max_roll_accel_dps2",
    "max_pitch_rate_dps",
    "max_pitch_accel_dps2",
    "settling_time_s",
    "sensor_fov_half_angle_deg",
];

/// Longest allowed planning window.
const MAX_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

/// One finding from resolution. Warnings are non-fatal; errors fail the
/// resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub severity: ViolationSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<f64>,
}

impl Violation {
    fn error(field: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            severity: ViolationSeverity::Error,
            message,
            suggested_value: None,
        }
    }

    fn warning(field: &str, message: String, suggested: Option<f64>) -> Self {
        Self {
            field: field.to_string(),
            severity: ViolationSeverity::Warning,
            message,
            suggested_value: suggested,
        }
    }
}

/// The artifact a planning run executes against: validated input with
/// clamps applied, plus the identity of the platform truth in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub input: MissionInput,
    pub satellite_ids: Vec<String>,
    /// Effective incidence bounds for SAR runs (user override or the
    /// mode's recommended range).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_incidence: Option<(f64, f64)>,
    pub config_hash: String,
    pub resolved_at: DateTime<Utc>,
    /// Non-fatal findings carried into the run for auditability.
    pub warnings: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ResolvedConfig>,
    pub violations: Vec<Violation>,
    pub clamped_values: BTreeMap<String, f64>,
}

/// Governance gate over one loaded [`AdminConfig`] snapshot.
pub struct Resolver<'a> {
    admin: &'a AdminConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(admin: &'a AdminConfig) -> Self {
        Self { admin }
    }

    /// Validate `input` for the given satellites.
    ///
    /// With `clamp_on_warning`, values outside absolute envelopes are
    /// clamped and reported as warnings with a suggested value; otherwise
    /// they are errors. Values inside the absolute envelope but outside
    /// the recommended one always warn without clamping.
    pub fn resolve(
        &self,
        input: &MissionInput,
        satellite_ids: &[String],
        clamp_on_warning: bool,
    ) -> ResolveResult {
        let mut violations: Vec<Violation> = Vec::new();
        let mut clamped: BTreeMap<String, f64> = BTreeMap::new();
        let mut resolved_input = input.clone();

        self.check_bus_overrides(input, &mut violations);
        self.check_time_window(input, &mut violations);

        let mut effective_incidence = None;
        match input.mode {
            MissionMode::Sar => {
                effective_incidence = self.check_sar(
                    &mut resolved_input,
                    satellite_ids,
                    clamp_on_warning,
                    &mut violations,
                    &mut clamped,
                );
            }
            MissionMode::Optical | MissionMode::Communication => {
                self.check_pointing(
                    &mut resolved_input,
                    satellite_ids,
                    clamp_on_warning,
                    &mut violations,
                    &mut clamped,
                );
            }
        }

        let has_errors = violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::Error);
        if has_errors {
            return ResolveResult {
                success: false,
                config: None,
                violations,
                clamped_values: clamped,
            };
        }

        let config_hash = match self.admin.config_hash() {
            Ok(hash) => hash,
            Err(e) => {
                violations.push(Violation::error(
                    "config",
                    format!("failed to hash admin configuration: {e}"),
                ));
                return ResolveResult {
                    success: false,
                    config: None,
                    violations,
                    clamped_values: clamped,
                };
            }
        };

        let warnings = violations.clone();
        ResolveResult {
            success: true,
            config: Some(ResolvedConfig {
                input: resolved_input,
                satellite_ids: satellite_ids.to_vec(),
                effective_incidence,
                config_hash,
                resolved_at: Utc::now(),
                warnings,
            }),
            violations,
            clamped_values: clamped,
        }
    }

    fn check_bus_overrides(&self, input: &MissionInput, violations: &mut Vec<Violation>) {
        for param in ADMIN_ONLY_PARAMS {
            if input.bus_overrides.contains_key(param) && !input.allow_bus_override {
                violations.push(Violation::error(
                    param,
                    format!(
                        "direct override of '{param}' is not allowed; this parameter is \
                         managed in the admin panel (set allow_bus_override=true to force)"
                    ),
                ));
            }
        }
    }

    fn check_time_window(&self, input: &MissionInput, violations: &mut Vec<Violation>) {
        if input.end_time <= input.start_time {
            violations.push(Violation::error(
                "end_time",
                "end time must be after start time".to_string(),
            ));
            return;
        }
        if input.end_time - input.start_time > Duration::days(MAX_WINDOW_DAYS) {
            violations.push(Violation::error(
                "time_window",
                format!("time window cannot exceed {MAX_WINDOW_DAYS} days"),
            ));
        }
    }

    fn check_sar(
        &self,
        input: &mut MissionInput,
        satellite_ids: &[String],
        clamp_on_warning: bool,
        violations: &mut Vec<Violation>,
        clamped: &mut BTreeMap<String, f64>,
    ) -> Option<(f64, f64)> {
        let Some(sar) = input.sar.as_mut() else {
            return None;
        };

        let mode_name = sar.imaging_mode.as_str();
        let Some(spec) = self.admin.sar_modes.modes.get(mode_name) else {
            let valid: Vec<&String> = self.admin.sar_modes.modes.keys().collect();
            violations.push(Violation::error(
                "sar.imaging_mode",
                format!("unsupported SAR mode '{mode_name}'; valid modes: {valid:?}"),
            ));
            return None;
        };
        let envelope = spec.incidence_angle;

        if let Some(user_min) = sar.incidence_min_deg {
            if user_min < envelope.absolute_min {
                if clamp_on_warning {
                    violations.push(Violation::warning(
                        "sar.incidence_min_deg",
                        format!(
                            "incidence min {user_min}° below mode absolute min \
                             {}°; clamped",
                            envelope.absolute_min
                        ),
                        Some(envelope.absolute_min),
                    ));
                    clamped.insert("sar.incidence_min_deg".to_string(), envelope.absolute_min);
                    sar.incidence_min_deg = Some(envelope.absolute_min);
                } else {
                    violations.push(Violation::error(
                        "sar.incidence_min_deg",
                        format!(
                            "incidence min {user_min}° below mode absolute min {}°",
                            envelope.absolute_min
                        ),
                    ));
                }
            } else if user_min < envelope.recommended_min {
                violations.push(Violation::warning(
                    "sar.incidence_min_deg",
                    format!(
                        "incidence min {user_min}° below recommended min {}°; \
                         quality may be degraded",
                        envelope.recommended_min
                    ),
                    None,
                ));
            }
        }

        if let Some(user_max) = sar.incidence_max_deg {
            if user_max > envelope.absolute_max {
                if clamp_on_warning {
                    violations.push(Violation::warning(
                        "sar.incidence_max_deg",
                        format!(
                            "incidence max {user_max}° above mode absolute max \
                             {}°; clamped",
                            envelope.absolute_max
                        ),
                        Some(envelope.absolute_max),
                    ));
                    clamped.insert("sar.incidence_max_deg".to_string(), envelope.absolute_max);
                    sar.incidence_max_deg = Some(envelope.absolute_max);
                } else {
                    violations.push(Violation::error(
                        "sar.incidence_max_deg",
                        format!(
                            "incidence max {user_max}° above mode absolute max {}°",
                            envelope.absolute_max
                        ),
                    ));
                }
            } else if user_max > envelope.recommended_max {
                violations.push(Violation::warning(
                    "sar.incidence_max_deg",
                    format!(
                        "incidence max {user_max}° above recommended max {}°; \
                         quality may be degraded",
                        envelope.recommended_max
                    ),
                    None,
                ));
            }
        }

        let effective_min = sar.incidence_min_deg.unwrap_or(envelope.recommended_min);
        let effective_max = sar.incidence_max_deg.unwrap_or(envelope.recommended_max);
        if effective_min >= effective_max {
            violations.push(Violation::error(
                "sar.incidence_range",
                format!("incidence min ({effective_min}°) must be less than max ({effective_max}°)"),
            ));
        }

        for sat_id in satellite_ids {
            if let Some(sat) = self.admin.satellite(sat_id) {
                if sat.modality != ImagingModality::Sar {
                    violations.push(Violation::warning(
                        "satellites",
                        format!(
                            "satellite '{sat_id}' is not a SAR satellite; SAR parameters \
                             will be ignored for it"
                        ),
                        None,
                    ));
                }
            }
        }

        Some((effective_min, effective_max))
    }

    fn check_pointing(
        &self,
        input: &mut MissionInput,
        satellite_ids: &[String],
        clamp_on_warning: bool,
        violations: &mut Vec<Violation>,
        clamped: &mut BTreeMap<String, f64>,
    ) {
        let Some(pointing) = input.pointing_angle_deg else {
            return;
        };

        let mut effective = pointing;
        for sat_id in satellite_ids {
            let Some(sat) = self.admin.satellite(sat_id) else {
                continue;
            };
            let max_roll = sat.bus.max_roll_deg;
            if pointing > max_roll {
                if clamp_on_warning {
                    violations.push(Violation::warning(
                        "pointing_angle_deg",
                        format!(
                            "pointing angle {pointing}° exceeds satellite '{sat_id}' \
                             max roll {max_roll}°; clamped"
                        ),
                        Some(max_roll),
                    ));
                    effective = effective.min(max_roll);
                } else {
                    violations.push(Violation::error(
                        "pointing_angle_deg",
                        format!(
                            "pointing angle {pointing}° exceeds satellite '{sat_id}' \
                             max roll {max_roll}°"
                        ),
                    ));
                }
            }
        }
        if effective < pointing {
            clamped.insert("pointing_angle_deg".to_string(), effective);
            input.pointing_angle_deg = Some(effective);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_types::{
        BusCapabilities, LookSide, PassDirection, SarImagingMode, SarParams, Satellite,
    };

    fn admin_with_fleet() -> AdminConfig {
        let mut cfg = AdminConfig::builtin();
        cfg.satellites.satellites = vec![
            Satellite {
                id: "sat_opt".to_string(),
                name: "OPT-1".to_string(),
                tle_line1: String::new(),
                tle_line2: String::new(),
                modality: ImagingModality::Optical,
                bus: BusCapabilities {
                    max_roll_deg: 35.0,
                    ..BusCapabilities::default()
                },
                sensor_fov_half_angle_deg: 1.0,
                active: true,
                description: String::new(),
            },
            Satellite {
                id: "sat_sar".to_string(),
                name: "SAR-1".to_string(),
                tle_line1: String::new(),
                tle_line2: String::new(),
                modality: ImagingModality::Sar,
                bus: BusCapabilities::default(),
                sensor_fov_half_angle_deg: 1.0,
                active: true,
                description: String::new(),
            },
        ];
        cfg
    }

    fn base_input(mode: MissionMode) -> MissionInput {
        MissionInput {
            start_time: "2025-01-15T00:00:00Z".parse().unwrap(),
            end_time: "2025-01-15T12:00:00Z".parse().unwrap(),
            mode,
            pointing_angle_deg: None,
            sar: None,
            bus_overrides: BTreeMap::new(),
            allow_bus_override: false,
        }
    }

    fn sar_input(min: Option<f64>, max: Option<f64>) -> MissionInput {
        let mut input = base_input(MissionMode::Sar);
        input.sar = Some(SarParams {
            imaging_mode: SarImagingMode::Strip,
            look_side: LookSide::Left,
            pass_direction: PassDirection::Any,
            incidence_min_deg: min,
            incidence_max_deg: max,
        });
        input
    }

    #[test]
    fn admin_only_override_is_rejected() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let mut input = base_input(MissionMode::Optical);
        input
            .bus_overrides
            .insert("max_roll_rate_dps".to_string(), 2.0);

        let result = resolver.resolve(&input, &["sat_opt".to_string()], true);
        assert!(!result.success);
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(v.field, "max_roll_rate_dps");
        assert_eq!(v.severity, ViolationSeverity::Error);
    }

    #[test]
    fn admin_only_override_allowed_with_flag() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let mut input = base_input(MissionMode::Optical);
        input
            .bus_overrides
            .insert("settling_time_s".to_string(), 2.0);
        input.allow_bus_override = true;

        let result = resolver.resolve(&input, &["sat_opt".to_string()], true);
        assert!(result.success);
    }

    #[test]
    fn inverted_time_window_errors() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let mut input = base_input(MissionMode::Optical);
        input.end_time = input.start_time;

        let result = resolver.resolve(&input, &[], true);
        assert!(!result.success);
        assert!(result.violations.iter().any(|v| v.field == "end_time"));
    }

    #[test]
    fn window_over_thirty_days_errors() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let mut input = base_input(MissionMode::Optical);
        input.end_time = input.start_time + Duration::days(31);

        let result = resolver.resolve(&input, &[], true);
        assert!(!result.success);
        assert!(result.violations.iter().any(|v| v.field == "time_window"));
    }

    #[test]
    fn incidence_above_absolute_max_clamps_with_warning() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = sar_input(Some(20.0), Some(70.0));

        let result = resolver.resolve(&input, &["sat_sar".to_string()], true);
        assert!(result.success);
        assert_eq!(result.clamped_values["sar.incidence_max_deg"], 55.0);
        let warning = result
            .violations
            .iter()
            .find(|v| v.field == "sar.incidence_max_deg")
            .unwrap();
        assert_eq!(warning.severity, ViolationSeverity::Warning);
        assert_eq!(warning.suggested_value, Some(55.0));

        let config = result.config.unwrap();
        assert_eq!(config.input.sar.unwrap().incidence_max_deg, Some(55.0));
        assert_eq!(config.effective_incidence, Some((20.0, 55.0)));
    }

    #[test]
    fn incidence_above_absolute_max_errors_without_clamping() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = sar_input(Some(20.0), Some(70.0));

        let result = resolver.resolve(&input, &["sat_sar".to_string()], false);
        assert!(!result.success);
        assert!(result.clamped_values.is_empty());
    }

    #[test]
    fn incidence_outside_recommended_warns_without_clamping() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        // strip recommended range is [15, 45]; 50 is inside absolute [10, 55].
        let input = sar_input(Some(20.0), Some(50.0));

        let result = resolver.resolve(&input, &["sat_sar".to_string()], true);
        assert!(result.success);
        assert!(result.clamped_values.is_empty());
        assert!(result.violations.iter().any(|v| {
            v.field == "sar.incidence_max_deg" && v.severity == ViolationSeverity::Warning
        }));
    }

    #[test]
    fn inverted_incidence_range_errors_after_clamping() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = sar_input(Some(40.0), Some(20.0));

        let result = resolver.resolve(&input, &["sat_sar".to_string()], true);
        assert!(!result.success);
        assert!(result
            .violations
            .iter()
            .any(|v| v.field == "sar.incidence_range"));
    }

    #[test]
    fn sar_params_on_optical_satellite_warns() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = sar_input(Some(20.0), Some(40.0));

        let result = resolver.resolve(&input, &["sat_opt".to_string()], true);
        assert!(result.success);
        assert!(result.violations.iter().any(|v| {
            v.field == "satellites" && v.severity == ViolationSeverity::Warning
        }));
    }

    #[test]
    fn pointing_angle_clamps_to_tightest_bus() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let mut input = base_input(MissionMode::Optical);
        input.pointing_angle_deg = Some(50.0);

        let result = resolver.resolve(
            &input,
            &["sat_opt".to_string(), "sat_sar".to_string()],
            true,
        );
        assert!(result.success);
        // sat_opt allows 35°, sat_sar 45°; the clamp takes the tightest.
        assert_eq!(result.clamped_values["pointing_angle_deg"], 35.0);
        assert_eq!(
            result.config.unwrap().input.pointing_angle_deg,
            Some(35.0)
        );
    }

    #[test]
    fn defaulted_incidence_uses_recommended_range() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = sar_input(None, None);

        let result = resolver.resolve(&input, &["sat_sar".to_string()], true);
        assert!(result.success);
        assert_eq!(
            result.config.unwrap().effective_incidence,
            Some((15.0, 45.0))
        );
    }

    #[test]
    fn resolved_config_carries_admin_hash() {
        let admin = admin_with_fleet();
        let resolver = Resolver::new(&admin);
        let input = base_input(MissionMode::Optical);

        let result = resolver.resolve(&input, &["sat_opt".to_string()], true);
        let config = result.config.unwrap();
        assert_eq!(config.config_hash, admin.config_hash().unwrap());
    }
}
