//! Declarative workflow scenarios.
//!
//! A scenario document carries everything one end-to-end run needs:
//! satellites with ephemerides, targets, the time window, mission mode
//! parameters, the algorithm, repair toggles, and expectations the report
//! is checked against. Documents load from YAML or JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use overpass_types::{
    AlgorithmKind, BusCapabilities, ImagingModality, LockLevel, LockPolicy, LookSide, MissionMode,
    PassDirection, PlanningMode, RepairObjective, SarImagingMode, Satellite, Target,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSatellite {
    pub id: String,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
    #[serde(default)]
    pub modality: ImagingModality,
    /// Bus override; falls back to the admin document, then defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<BusCapabilities>,
}

impl ScenarioSatellite {
    pub fn to_satellite(&self, fallback_bus: Option<&BusCapabilities>) -> Satellite {
        Satellite {
            id: self.id.clone(),
            name: self.name.clone(),
            tle_line1: self.tle_line1.clone(),
            tle_line2: self.tle_line2.clone(),
            modality: self.modality,
            bus: self
                .bus
                .clone()
                .or_else(|| fallback_bus.cloned())
                .unwrap_or_default(),
            sensor_fov_half_angle_deg: 1.0,
            active: true,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTarget {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub lock_level: LockLevel,
}

fn default_priority() -> u8 {
    1
}

impl ScenarioTarget {
    pub fn to_target(&self) -> Target {
        Target {
            id: self.id.clone(),
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            priority: self.priority,
            lock_level: self.lock_level,
        }
    }
}

/// Assertions the report is checked against beyond the built-in
/// invariants. All optional; absent means unchecked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioExpectations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_accepted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_single_look_side: Option<LookSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_mean_incidence_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_opps_using_pitch: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidence_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub mission_mode: MissionMode,
    #[serde(default)]
    pub imaging_mode: SarImagingMode,
    #[serde(default)]
    pub look_side: LookSide,
    #[serde(default)]
    pub pass_direction: PassDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidence_min_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incidence_max_deg: Option<f64>,
    #[serde(default)]
    pub algorithm: AlgorithmKind,
    #[serde(default = "default_elevation_mask")]
    pub elevation_mask_deg: f64,
    #[serde(default = "default_imaging_time")]
    pub imaging_time_s: f64,
    #[serde(default = "default_weight_preset")]
    pub weight_preset: String,
    #[serde(default)]
    pub run_repair: bool,
    #[serde(default)]
    pub planning_mode: PlanningMode,
    #[serde(default)]
    pub lock_policy: LockPolicy,
    #[serde(default)]
    pub repair_objective: RepairObjective,
    #[serde(default = "default_max_repair_changes")]
    pub max_repair_changes: usize,
    /// Dry runs never touch the caller's database.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_elevation_mask() -> f64 {
    10.0
}

fn default_imaging_time() -> f64 {
    10.0
}

fn default_weight_preset() -> String {
    "balanced".to_string()
}

fn default_max_repair_changes() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowScenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub satellites: Vec<ScenarioSatellite>,
    pub targets: Vec<ScenarioTarget>,
    pub config: ScenarioConfig,
    #[serde(default)]
    pub expectations: ScenarioExpectations,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkflowScenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse scenario YAML")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse scenario JSON")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize scenario")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_YAML: &str = r#"
id: scenario_left_only
name: SAR left-looking strip
description: Strip collection constrained to LEFT looks
satellites:
  - id: sat_sar
    name: SAR-1
    tle_line1: "1 25544U 98067A   24001.00000000  .00002182  00000-0  40864-4 0  9996"
    tle_line2: "2 25544  51.6461 339.7939 0001220  92.8340 267.3124 15.49309239426382"
    modality: sar
targets:
  - id: tgt_a
    name: Alpha
    latitude: 40.0
    longitude: 20.0
    priority: 1
config:
  start_time: 2024-01-01T00:00:00Z
  end_time: 2024-01-01T12:00:00Z
  mission_mode: SAR
  imaging_mode: strip
  look_side: LEFT
  incidence_min_deg: 20.0
  incidence_max_deg: 40.0
  algorithm: first_fit
expectations:
  expect_single_look_side: LEFT
  incidence_range: [20.0, 40.0]
tags: [sar, geometry]
"#;

    #[test]
    fn yaml_roundtrip() {
        let scenario = WorkflowScenario::from_yaml(SCENARIO_YAML).unwrap();
        assert_eq!(scenario.id, "scenario_left_only");
        assert_eq!(scenario.config.mission_mode, MissionMode::Sar);
        assert_eq!(scenario.config.look_side, LookSide::Left);
        assert_eq!(scenario.config.algorithm, AlgorithmKind::FirstFit);
        assert!(scenario.config.dry_run);
        assert_eq!(
            scenario.expectations.expect_single_look_side,
            Some(LookSide::Left)
        );

        let yaml = scenario.to_yaml().unwrap();
        let reparsed = WorkflowScenario::from_yaml(&yaml).unwrap();
        assert_eq!(scenario, reparsed);
    }

    #[test]
    fn defaults_fill_optional_config() {
        let scenario = WorkflowScenario::from_yaml(SCENARIO_YAML).unwrap();
        assert_eq!(scenario.config.elevation_mask_deg, 10.0);
        assert_eq!(scenario.config.imaging_time_s, 10.0);
        assert_eq!(scenario.config.weight_preset, "balanced");
        assert!(!scenario.config.run_repair);
        assert_eq!(scenario.config.max_repair_changes, 10);
        assert_eq!(scenario.config.pass_direction, PassDirection::Any);
    }

    #[test]
    fn satellite_bus_fallback_chain() {
        let scenario_sat = ScenarioSatellite {
            id: "sat".to_string(),
            name: "SAT".to_string(),
            tle_line1: String::new(),
            tle_line2: String::new(),
            modality: ImagingModality::Optical,
            bus: None,
        };
        let admin_bus = BusCapabilities {
            max_roll_deg: 33.0,
            ..BusCapabilities::default()
        };
        assert_eq!(
            scenario_sat.to_satellite(Some(&admin_bus)).bus.max_roll_deg,
            33.0
        );
        assert_eq!(
            scenario_sat.to_satellite(None).bus.max_roll_deg,
            BusCapabilities::default().max_roll_deg
        );

        let with_own = ScenarioSatellite {
            bus: Some(BusCapabilities {
                max_roll_deg: 20.0,
                ..BusCapabilities::default()
            }),
            ..scenario_sat
        };
        assert_eq!(
            with_own.to_satellite(Some(&admin_bus)).bus.max_roll_deg,
            20.0
        );
    }
}
