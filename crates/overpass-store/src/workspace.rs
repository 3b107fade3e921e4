//! Workspace rows and their blob sidecar.
//!
//! The workspace row holds listing metadata and denormalized counts; the
//! heavyweight JSON state blobs and the zlib-compressed CZML payload live
//! in `workspace_blobs` so listings never touch them. Blob JSON is
//! written and read through exactly one chokepoint each.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use overpass_types::{MissionMode, WorkspaceData, WorkspaceSummary};

use crate::schema::WORKSPACE_SCHEMA_VERSION;
use crate::{Store, StoreError, StoreResult, enum_from_sql, enum_to_sql, new_id, opt_ts_from_sql, ts_from_sql, ts_to_sql};

/// Mutable fields for workspace create/update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub mission_mode: Option<MissionMode>,
    pub time_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub satellites_count: Option<u32>,
    pub targets_count: Option<u32>,
    pub last_run_status: Option<String>,
    pub scenario_config: Option<serde_json::Value>,
    pub analysis_state: Option<serde_json::Value>,
    pub planning_state: Option<serde_json::Value>,
    pub orders_state: Option<serde_json::Value>,
    pub ui_state: Option<serde_json::Value>,
    pub czml: Option<serde_json::Value>,
}

/// Portable export document version; equals the workspace schema version.
pub const EXPORT_VERSION: &str = WORKSPACE_SCHEMA_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceExport {
    pub export_version: String,
    pub name: String,
    pub mission_mode: Option<MissionMode>,
    pub time_window_start: Option<DateTime<Utc>>,
    pub time_window_end: Option<DateTime<Utc>>,
    pub satellites_count: u32,
    pub targets_count: u32,
    pub scenario_config: Option<serde_json::Value>,
    pub analysis_state: Option<serde_json::Value>,
    pub planning_state: Option<serde_json::Value>,
    pub orders_state: Option<serde_json::Value>,
    pub ui_state: Option<serde_json::Value>,
    pub czml: Option<serde_json::Value>,
}

impl Store {
    /// Create a workspace (and its empty blob row) in one transaction.
    pub fn create_workspace(&mut self, name: &str, update: WorkspaceUpdate) -> StoreResult<String> {
        let id = new_id("ws");
        let now = ts_to_sql(Utc::now());
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO workspaces
                (id, name, created_at, updated_at, schema_version,
                 satellites_count, targets_count)
             VALUES (?1, ?2, ?3, ?3, ?4, 0, 0)",
            params![id, name, now, WORKSPACE_SCHEMA_VERSION],
        )?;
        tx.execute(
            "INSERT INTO workspace_blobs (workspace_id, updated_at) VALUES (?1, ?2)",
            params![id, now],
        )?;
        apply_update(&tx, &id, &update)?;
        tx.commit()?;
        Ok(id)
    }

    /// Apply partial updates to the row and/or blobs transactionally.
    pub fn update_workspace(&mut self, id: &str, update: WorkspaceUpdate) -> StoreResult<()> {
        let tx = self.conn_mut().transaction()?;
        let exists: Option<String> = tx
            .query_row("SELECT id FROM workspaces WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                kind: "workspace",
                id: id.to_string(),
            });
        }
        apply_update(&tx, id, &update)?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_workspaces(&self) -> StoreResult<Vec<WorkspaceSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, created_at, updated_at, schema_version, mission_mode,
                    time_window_start, time_window_end, satellites_count,
                    targets_count, last_run_status
             FROM workspaces ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], summary_from_row)?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row??);
        }
        Ok(summaries)
    }

    /// Fetch a workspace; `include_czml` controls whether the compressed
    /// payload is decompressed and attached.
    pub fn get_workspace(&self, id: &str, include_czml: bool) -> StoreResult<WorkspaceData> {
        let summary = self
            .conn()
            .query_row(
                "SELECT id, name, created_at, updated_at, schema_version, mission_mode,
                        time_window_start, time_window_end, satellites_count,
                        targets_count, last_run_status
                 FROM workspaces WHERE id = ?1",
                [id],
                summary_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "workspace",
                id: id.to_string(),
            })?;
        let summary = summary?;

        let (scenario, analysis, planning, orders, ui, czml_blob) = self.conn().query_row(
            "SELECT scenario_config, analysis_state, planning_state, orders_state,
                    ui_state, czml_blob
             FROM workspace_blobs WHERE workspace_id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<Vec<u8>>>(5)?,
                ))
            },
        )?;

        let czml = if include_czml {
            czml_blob.map(|blob| decompress_json(&blob)).transpose()?
        } else {
            None
        };

        Ok(WorkspaceData {
            summary,
            scenario_config: parse_blob(scenario)?,
            analysis_state: parse_blob(analysis)?,
            planning_state: parse_blob(planning)?,
            orders_state: parse_blob(orders)?,
            ui_state: parse_blob(ui)?,
            czml,
        })
    }

    /// Delete a workspace; cascades take orders, plans, acquisitions,
    /// conflicts, and audit rows with it.
    pub fn delete_workspace(&mut self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM workspaces WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                kind: "workspace",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Portable JSON export of one workspace's state.
    pub fn export_workspace(&self, id: &str) -> StoreResult<WorkspaceExport> {
        let data = self.get_workspace(id, true)?;
        Ok(WorkspaceExport {
            export_version: EXPORT_VERSION.to_string(),
            name: data.summary.name,
            mission_mode: data.summary.mission_mode,
            time_window_start: data.summary.time_window_start,
            time_window_end: data.summary.time_window_end,
            satellites_count: data.summary.satellites_count,
            targets_count: data.summary.targets_count,
            scenario_config: data.scenario_config,
            analysis_state: data.analysis_state,
            planning_state: data.planning_state,
            orders_state: data.orders_state,
            ui_state: data.ui_state,
            czml: data.czml,
        })
    }

    /// Recreate an exported workspace under a fresh id.
    pub fn import_workspace(&mut self, export: &WorkspaceExport) -> StoreResult<String> {
        if export.export_version != EXPORT_VERSION {
            return Err(StoreError::InvalidValue(format!(
                "unsupported export_version '{}' (expected '{EXPORT_VERSION}')",
                export.export_version
            )));
        }
        let update = WorkspaceUpdate {
            name: None,
            mission_mode: export.mission_mode,
            time_window: match (export.time_window_start, export.time_window_end) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            },
            satellites_count: Some(export.satellites_count),
            targets_count: Some(export.targets_count),
            last_run_status: None,
            scenario_config: export.scenario_config.clone(),
            analysis_state: export.analysis_state.clone(),
            planning_state: export.planning_state.clone(),
            orders_state: export.orders_state.clone(),
            ui_state: export.ui_state.clone(),
            czml: export.czml.clone(),
        };
        self.create_workspace(&export.name, update)
    }
}

type SummaryRow = Result<WorkspaceSummary, StoreError>;

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;
    let schema_version: String = row.get(4)?;
    let mission_mode: Option<String> = row.get(5)?;
    let window_start: Option<String> = row.get(6)?;
    let window_end: Option<String> = row.get(7)?;
    let satellites_count: u32 = row.get(8)?;
    let targets_count: u32 = row.get(9)?;
    let last_run_status: Option<String> = row.get(10)?;

    Ok((|| {
        Ok(WorkspaceSummary {
            id,
            name,
            created_at: ts_from_sql(&created_at)?,
            updated_at: ts_from_sql(&updated_at)?,
            schema_version,
            mission_mode: mission_mode.as_deref().map(enum_from_sql).transpose()?,
            time_window_start: opt_ts_from_sql(window_start)?,
            time_window_end: opt_ts_from_sql(window_end)?,
            satellites_count,
            targets_count,
            last_run_status,
        })
    })())
}

fn apply_update(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
    update: &WorkspaceUpdate,
) -> StoreResult<()> {
    let now = ts_to_sql(Utc::now());

    if let Some(name) = &update.name {
        tx.execute(
            "UPDATE workspaces SET name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, name, now],
        )?;
    }
    if let Some(mode) = update.mission_mode {
        tx.execute(
            "UPDATE workspaces SET mission_mode = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, enum_to_sql(&mode)?, now],
        )?;
    }
    if let Some((start, end)) = update.time_window {
        tx.execute(
            "UPDATE workspaces SET time_window_start = ?2, time_window_end = ?3,
                    updated_at = ?4 WHERE id = ?1",
            params![id, ts_to_sql(start), ts_to_sql(end), now],
        )?;
    }
    if let Some(count) = update.satellites_count {
        tx.execute(
            "UPDATE workspaces SET satellites_count = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, count, now],
        )?;
    }
    if let Some(count) = update.targets_count {
        tx.execute(
            "UPDATE workspaces SET targets_count = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, count, now],
        )?;
    }
    if let Some(status) = &update.last_run_status {
        tx.execute(
            "UPDATE workspaces SET last_run_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, now],
        )?;
    }

    let blob_columns: [(&str, &Option<serde_json::Value>); 5] = [
        ("scenario_config", &update.scenario_config),
        ("analysis_state", &update.analysis_state),
        ("planning_state", &update.planning_state),
        ("orders_state", &update.orders_state),
        ("ui_state", &update.ui_state),
    ];
    for (column, value) in blob_columns {
        if let Some(value) = value {
            let json = serde_json::to_string(value)?;
            tx.execute(
                &format!(
                    "UPDATE workspace_blobs SET {column} = ?2, updated_at = ?3
                     WHERE workspace_id = ?1"
                ),
                params![id, json, now],
            )?;
        }
    }
    if let Some(czml) = &update.czml {
        let blob = compress_json(czml)?;
        tx.execute(
            "UPDATE workspace_blobs SET czml_blob = ?2, updated_at = ?3
             WHERE workspace_id = ?1",
            params![id, blob, now],
        )?;
    }
    Ok(())
}

fn parse_blob(raw: Option<String>) -> StoreResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
        .transpose()
}

fn compress_json(value: &serde_json::Value) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

fn decompress_json(blob: &[u8]) -> StoreResult<serde_json::Value> {
    let mut decoder = ZlibDecoder::new(blob);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
