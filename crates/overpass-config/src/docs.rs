//! Admin document loading and hashing.
//!
//! Each document is a typed serde struct with defaults matching what a
//! fresh deployment ships with. A missing file is not an error: the
//! default document is written to disk and used, so a bare checkout comes
//! up with a working platform configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use overpass_types::Satellite;

pub const SATELLITES_FILE: &str = "satellites.yaml";
pub const SAR_MODES_FILE: &str = "sar_modes.yaml";
pub const GROUND_STATIONS_FILE: &str = "ground_stations.yaml";
pub const MISSION_SETTINGS_FILE: &str = "mission_settings.yaml";
pub const BATCH_POLICIES_FILE: &str = "batch_policies.yaml";

/// All admin files, in hash order.
pub const ADMIN_FILES: [&str; 5] = [
    SATELLITES_FILE,
    SAR_MODES_FILE,
    GROUND_STATIONS_FILE,
    MISSION_SETTINGS_FILE,
    BATCH_POLICIES_FILE,
];

/// `satellites.yaml`: the fleet plus per-modality defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SatellitesDoc {
    #[serde(default)]
    pub satellites: Vec<Satellite>,
    /// Per-modality fallbacks, keyed "optical" / "sar".
    #[serde(default)]
    pub satellite_settings: BTreeMap<String, ModalityDefaults>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityDefaults {
    pub max_spacecraft_roll_deg: f64,
    pub settling_time_s: f64,
    pub default_agility_dps: f64,
}

/// Incidence envelope of one SAR mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncidenceEnvelope {
    pub absolute_min: f64,
    pub absolute_max: f64,
    pub recommended_min: f64,
    pub recommended_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    pub width_km: f64,
    pub length_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySpec {
    pub optimal_incidence_deg: f64,
    pub band_width_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SarModeSpec {
    pub incidence_angle: IncidenceEnvelope,
    pub scene: SceneSpec,
    pub quality: QualitySpec,
}

/// `sar_modes.yaml`: mode envelopes and swath geometry tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarModesDoc {
    pub modes: BTreeMap<String, SarModeSpec>,
    #[serde(default)]
    pub swath_geometry: SwathGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwathGeometry {
    pub swath_half_angle_offset_deg: f64,
}

impl Default for SwathGeometry {
    fn default() -> Self {
        Self {
            swath_half_angle_offset_deg: 2.5,
        }
    }
}

impl Default for SarModesDoc {
    fn default() -> Self {
        let mode = |abs: (f64, f64), rec: (f64, f64), scene: (f64, f64), optimal: f64| {
            SarModeSpec {
                incidence_angle: IncidenceEnvelope {
                    absolute_min: abs.0,
                    absolute_max: abs.1,
                    recommended_min: rec.0,
                    recommended_max: rec.1,
                },
                scene: SceneSpec {
                    width_km: scene.0,
                    length_km: scene.1,
                },
                quality: QualitySpec {
                    optimal_incidence_deg: optimal,
                    band_width_deg: 15.0,
                },
            }
        };
        let mut modes = BTreeMap::new();
        modes.insert("spot".to_string(), mode((10.0, 55.0), (20.0, 45.0), (5.0, 5.0), 35.0));
        modes.insert("strip".to_string(), mode((10.0, 55.0), (15.0, 45.0), (30.0, 50.0), 35.0));
        modes.insert("scan".to_string(), mode((10.0, 55.0), (20.0, 50.0), (100.0, 100.0), 40.0));
        modes.insert("dwell".to_string(), mode((15.0, 50.0), (25.0, 45.0), (5.0, 5.0), 35.0));
        Self {
            modes,
            swath_geometry: SwathGeometry::default(),
        }
    }
}

/// `ground_stations.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStationsDoc {
    #[serde(default)]
    pub ground_stations: Vec<GroundStation>,
    #[serde(default = "default_elevation_mask")]
    pub default_elevation_mask_deg: f64,
}

fn default_elevation_mask() -> f64 {
    10.0
}

impl Default for GroundStationsDoc {
    fn default() -> Self {
        Self {
            ground_stations: vec![GroundStation {
                name: "Default Ground Station".to_string(),
                latitude: 24.44,
                longitude: 54.83,
                altitude_km: 0.05,
                elevation_mask_deg: 10.0,
                active: true,
                description: String::new(),
            }],
            default_elevation_mask_deg: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude_km: f64,
    #[serde(default = "default_elevation_mask")]
    pub elevation_mask_deg: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

/// `mission_settings.yaml`: per-mission-type knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSettingsDoc {
    pub mission_settings: BTreeMap<String, MissionModeSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionModeSettings {
    pub min_duration_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_elevation_mask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pointing_angle: Option<f64>,
    /// Seconds of imaging scheduled around max elevation.
    #[serde(default = "default_imaging_time")]
    pub imaging_time_s: f64,
}

fn default_imaging_time() -> f64 {
    10.0
}

impl Default for MissionSettingsDoc {
    fn default() -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(
            "imaging".to_string(),
            MissionModeSettings {
                min_duration_seconds: 30,
                default_elevation_mask: Some(45.0),
                default_pointing_angle: Some(45.0),
                imaging_time_s: 10.0,
            },
        );
        settings.insert(
            "communication".to_string(),
            MissionModeSettings {
                min_duration_seconds: 60,
                default_elevation_mask: Some(10.0),
                default_pointing_angle: None,
                imaging_time_s: 10.0,
            },
        );
        Self {
            mission_settings: settings,
        }
    }
}

/// `batch_policies.yaml`: how order batches are selected and weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPoliciesDoc {
    pub policies: BTreeMap<String, BatchPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPolicy {
    #[serde(default)]
    pub description: String,
    /// Name of a scoring weight preset ("balanced", "urgent", ...).
    pub weight_preset: String,
    pub max_batch_size: usize,
}

impl Default for BatchPoliciesDoc {
    fn default() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(
            "standard".to_string(),
            BatchPolicy {
                description: "Balanced value/priority batching".to_string(),
                weight_preset: "balanced".to_string(),
                max_batch_size: 50,
            },
        );
        policies.insert(
            "rush".to_string(),
            BatchPolicy {
                description: "Earliest-opportunity batching for urgent orders".to_string(),
                weight_preset: "urgent".to_string(),
                max_batch_size: 20,
            },
        );
        Self { policies }
    }
}

/// The loaded admin configuration: one consistent snapshot of the five
/// documents. Reload is an explicit admin action; readers hold a
/// reference for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub satellites: SatellitesDoc,
    pub sar_modes: SarModesDoc,
    pub ground_stations: GroundStationsDoc,
    pub mission_settings: MissionSettingsDoc,
    pub batch_policies: BatchPoliciesDoc,
    #[serde(skip)]
    config_dir: PathBuf,
}

/// Full snapshot artifact: the normalized document tree plus identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub config_hash: String,
    pub generated_at: DateTime<Utc>,
    pub documents: serde_json::Value,
}

impl AdminConfig {
    /// Load all documents from `config_dir`, writing defaults for any
    /// missing file.
    pub fn load(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("failed to create config dir {}", config_dir.display()))?;
        Ok(Self {
            satellites: load_or_default(config_dir, SATELLITES_FILE)?,
            sar_modes: load_or_default(config_dir, SAR_MODES_FILE)?,
            ground_stations: load_or_default(config_dir, GROUND_STATIONS_FILE)?,
            mission_settings: load_or_default(config_dir, MISSION_SETTINGS_FILE)?,
            batch_policies: load_or_default(config_dir, BATCH_POLICIES_FILE)?,
            config_dir: config_dir.to_path_buf(),
        })
    }

    /// In-memory configuration with built-in defaults; used by tests and
    /// the validation harness when no config directory is wired up.
    pub fn builtin() -> Self {
        Self {
            satellites: SatellitesDoc::default(),
            sar_modes: SarModesDoc::default(),
            ground_stations: GroundStationsDoc::default(),
            mission_settings: MissionSettingsDoc::default(),
            batch_policies: BatchPoliciesDoc::default(),
            config_dir: PathBuf::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Write the current documents back to disk.
    pub fn save(&self) -> Result<()> {
        write_doc(&self.config_dir, SATELLITES_FILE, &self.satellites)?;
        write_doc(&self.config_dir, SAR_MODES_FILE, &self.sar_modes)?;
        write_doc(&self.config_dir, GROUND_STATIONS_FILE, &self.ground_stations)?;
        write_doc(&self.config_dir, MISSION_SETTINGS_FILE, &self.mission_settings)?;
        write_doc(&self.config_dir, BATCH_POLICIES_FILE, &self.batch_policies)?;
        Ok(())
    }

    /// Restore the built-in default documents, overwriting disk state.
    pub fn restore_defaults(config_dir: &Path) -> Result<Self> {
        let mut cfg = Self::builtin();
        cfg.config_dir = config_dir.to_path_buf();
        fs::create_dir_all(config_dir)
            .with_context(|| format!("failed to create config dir {}", config_dir.display()))?;
        cfg.save()?;
        Ok(cfg)
    }

    pub fn satellite(&self, id: &str) -> Option<&Satellite> {
        self.satellites.satellites.iter().find(|s| s.id == id)
    }

    pub fn sar_mode(&self, mode: &str) -> Option<&SarModeSpec> {
        self.sar_modes.modes.get(mode)
    }

    /// Canonical JSON of all documents. serde_json maps are sorted, so
    /// YAML key order cannot leak into the result.
    fn canonical_documents(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "satellites": serde_json::to_value(&self.satellites)?,
            "sar_modes": serde_json::to_value(&self.sar_modes)?,
            "ground_stations": serde_json::to_value(&self.ground_stations)?,
            "mission_settings": serde_json::to_value(&self.mission_settings)?,
            "batch_policies": serde_json::to_value(&self.batch_policies)?,
        }))
    }

    /// First 16 hex chars of SHA-256 over the canonical document tree.
    pub fn config_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(&self.canonical_documents()?)
            .context("failed to serialize canonical config")?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(hex::encode(digest)[..16].to_string())
    }

    pub fn config_snapshot(&self) -> Result<ConfigSnapshot> {
        Ok(ConfigSnapshot {
            config_hash: self.config_hash()?,
            generated_at: Utc::now(),
            documents: self.canonical_documents()?,
        })
    }
}

fn load_or_default<T>(dir: &Path, file: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let path = dir.join(file);
    if !path.exists() {
        let doc = T::default();
        write_doc(dir, file, &doc)?;
        return Ok(doc);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn write_doc<T: Serialize>(dir: &Path, file: &str, doc: &T) -> Result<()> {
    let path = dir.join(file);
    let yaml = serde_yaml::to_string(doc)
        .with_context(|| format!("failed to serialize config doc {file}"))?;
    fs::write(&path, yaml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}
