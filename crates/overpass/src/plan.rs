//! Plan assembly.
//!
//! A plan freezes one scheduling run: the algorithm, the configuration
//! snapshot in effect, the accepted items, and a deterministic hash of
//! the inputs so two runs over the same opportunities are recognizably
//! the same work. Plans become immutable once the store commits them.

use chrono::Utc;
use sha2::{Digest, Sha256};

use overpass_types::{AlgorithmKind, Opportunity, Plan, ScheduleMetrics, ScheduledItem};

use crate::engine::SchedulerConfig;

/// 16-hex SHA-256 over the canonical scheduling input.
///
/// Opportunities are hashed in id order; serde_json's sorted maps keep the
/// serialization canonical regardless of construction order.
pub fn input_hash(
    algorithm: AlgorithmKind,
    config: &SchedulerConfig,
    opportunities: &[Opportunity],
) -> String {
    let mut sorted: Vec<&Opportunity> = opportunities.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let canonical = serde_json::json!({
        "algorithm": algorithm.as_str(),
        "imaging_time_s": config.imaging_time_s,
        "opportunities": sorted,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Assemble a plan record for one scheduling outcome.
///
/// The plan id folds in the workspace and creation instant, so identical
/// inputs re-planned in the same workspace still get distinct rows; the
/// `input_hash` is what identifies equivalent runs.
pub fn build_plan(
    workspace_id: &str,
    algorithm: AlgorithmKind,
    config: &SchedulerConfig,
    opportunities: &[Opportunity],
    metrics: &ScheduleMetrics,
    config_snapshot: serde_json::Value,
) -> Plan {
    let created_at = Utc::now();
    let input_hash = input_hash(algorithm, config, opportunities);
    let id_digest = Sha256::digest(
        format!("{workspace_id}:{input_hash}:{}", created_at.timestamp_nanos_opt().unwrap_or(0))
            .as_bytes(),
    );
    Plan {
        id: format!("plan_{}", &hex::encode(id_digest)[..12]),
        workspace_id: workspace_id.to_string(),
        algorithm,
        config_snapshot,
        input_hash,
        metrics: metrics.clone(),
        created_at,
        committed_at: None,
    }
}

/// Total composite value of a set of scheduled items.
pub fn schedule_score(items: &[ScheduledItem]) -> f64 {
    items.iter().map(|i| i.value).sum()
}
