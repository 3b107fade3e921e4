//! Quality scoring and multi-criteria opportunity value.
//!
//! Incidence angle maps to a quality scalar under one of three models;
//! quality blends with target priority and chronological preference into
//! a composite value in [0, 1]. Weights normalize internally, so presets
//! can be written on any scale.

use serde::{Deserialize, Serialize};

/// How incidence angle translates to imaging quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityModel {
    /// No quality adjustment; every opportunity scores 1.0.
    Off,
    /// Lower incidence is strictly better (optical default).
    #[default]
    Monotonic,
    /// Quality peaks at an ideal incidence (SAR default).
    Band,
}

impl QualityModel {
    /// The model a mode defaults to when none is requested.
    pub fn default_for_mode(sar: bool) -> Self {
        if sar { QualityModel::Band } else { QualityModel::Monotonic }
    }
}

/// Raw multi-criteria weights; any scale, normalized on use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub priority: f64,
    pub geometry: f64,
    pub timing: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self::BALANCED
    }
}

impl Weights {
    pub const BALANCED: Weights = Weights { priority: 40.0, geometry: 40.0, timing: 20.0 };
    pub const PRIORITY_FIRST: Weights = Weights { priority: 70.0, geometry: 20.0, timing: 10.0 };
    pub const QUALITY_FIRST: Weights = Weights { priority: 20.0, geometry: 70.0, timing: 10.0 };
    pub const URGENT: Weights = Weights { priority: 60.0, geometry: 10.0, timing: 30.0 };
    pub const ARCHIVAL: Weights = Weights { priority: 10.0, geometry: 80.0, timing: 10.0 };

    /// Look up a named preset.
    pub fn preset(name: &str) -> Option<Weights> {
        match name {
            "balanced" => Some(Self::BALANCED),
            "priority_first" => Some(Self::PRIORITY_FIRST),
            "quality_first" => Some(Self::QUALITY_FIRST),
            "urgent" => Some(Self::URGENT),
            "archival" => Some(Self::ARCHIVAL),
            _ => None,
        }
    }

    /// Normalized (priority, geometry, timing) summing to 1.0. All-zero
    /// weights fall back to an even split.
    pub fn normalized(&self) -> (f64, f64, f64) {
        let total = self.priority + self.geometry + self.timing;
        if total <= 0.0 {
            let third = 1.0 / 3.0;
            return (third, third, third);
        }
        (
            self.priority / total,
            self.geometry / total,
            self.timing / total,
        )
    }
}

/// Default ideal incidence for the band model, degrees.
pub const DEFAULT_IDEAL_INCIDENCE_DEG: f64 = 35.0;

/// Default band width, degrees.
pub const DEFAULT_BAND_WIDTH_DEG: f64 = 7.5;

/// Quality in [0, 1] for an incidence angle under the selected model.
///
/// A missing incidence angle scores neutral 1.0. Incidence may be signed
/// (left/right of the ground track); the sign carries direction, not
/// quality, so the monotonic model uses the absolute value.
pub fn quality_score(
    incidence_deg: Option<f64>,
    model: QualityModel,
    ideal_deg: f64,
    band_width_deg: f64,
) -> f64 {
    let Some(incidence) = incidence_deg else {
        return 1.0;
    };
    match model {
        QualityModel::Off => 1.0,
        QualityModel::Monotonic => (-0.02 * incidence.abs()).exp().clamp(0.0, 1.0),
        QualityModel::Band => {
            let delta = (incidence - ideal_deg) / band_width_deg;
            (-delta * delta).exp().clamp(0.0, 1.0)
        }
    }
}

/// Composite value `P·priority + G·quality + T·timing` in [0, 1].
///
/// Priority 1..5 normalizes so 1 → 1.0 and 5 → 0.0.
pub fn composite_value(priority: u8, quality: f64, timing: f64, weights: &Weights) -> f64 {
    let norm_priority = ((5.0 - f64::from(priority)) / 4.0).clamp(0.0, 1.0);
    let norm_quality = quality.clamp(0.0, 1.0);
    let norm_timing = timing.clamp(0.0, 1.0);
    let (p, g, t) = weights.normalized();
    p * norm_priority + g * norm_quality + t * norm_timing
}

/// Chronological preference: first opportunity scores 1.0, last 0.0.
pub fn timing_score(index: usize, total: usize) -> f64 {
    if total <= 1 {
        return 1.0;
    }
    1.0 - (index as f64 / (total - 1) as f64)
}
