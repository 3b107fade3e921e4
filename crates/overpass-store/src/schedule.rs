//! Scheduling tables: orders, plans, acquisitions, conflicts, audit log.
//!
//! The commit operation is the heart of this module: one transaction that
//! turns plan items into acquisitions, soft-deletes dropped slots, stamps
//! the plan, and writes the audit row. A plan commits at most once; any
//! failure rolls the whole transaction back.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use overpass_types::{
    Acquisition, AcquisitionState, CommitAuditRow, CommitType, Conflict, ConflictSeverity,
    ConflictType, LockLevel, MissionMode, Order, OrderStatus, Plan, PlanItem, RepairDiff,
    ScheduledItem,
};

use crate::{Store, StoreError, StoreResult, enum_from_sql, enum_to_sql, new_id, opt_ts_from_sql, ts_from_sql, ts_to_sql};

/// Inputs for creating one order row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: String,
    pub priority: u8,
    #[serde(default)]
    pub lock_level: LockLevel,
}

/// Patchable order fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub priority: Option<u8>,
    pub status: Option<OrderStatus>,
    pub lock_level: Option<LockLevel>,
}

/// Everything the commit transaction needs.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub plan_id: String,
    pub commit_type: CommitType,
    pub config_hash: String,
    pub mode: MissionMode,
    /// Acquisitions the commit replaces; marked `failed` and unlocked.
    pub drop_acquisition_ids: Vec<String>,
    /// Lock level per target id for the new acquisitions.
    pub lock_levels: std::collections::BTreeMap<String, LockLevel>,
    pub repair_diff: Option<RepairDiff>,
    pub score_before: Option<f64>,
    pub score_after: Option<f64>,
    pub conflicts_before: Option<usize>,
    pub conflicts_after: Option<usize>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub acquisition_ids: Vec<String>,
    pub audit_row: CommitAuditRow,
}

impl Store {
    // ---- orders -------------------------------------------------------

    pub fn create_order(&mut self, workspace_id: &str, order: &NewOrder) -> StoreResult<Order> {
        let id = new_id("ord");
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO orders
                (id, workspace_id, name, latitude, longitude, description,
                 priority, status, lock_level, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)",
            params![
                id,
                workspace_id,
                order.name,
                order.latitude,
                order.longitude,
                order.description,
                order.priority,
                enum_to_sql(&order.lock_level)?,
                ts_to_sql(now),
            ],
        )?;
        self.get_order(&id)
    }

    pub fn get_order(&self, id: &str) -> StoreResult<Order> {
        self.conn()
            .query_row(
                "SELECT id, workspace_id, name, latitude, longitude, description,
                        priority, status, lock_level, created_at, updated_at
                 FROM orders WHERE id = ?1",
                [id],
                order_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "order",
                id: id.to_string(),
            })?
    }

    pub fn list_orders(&self, workspace_id: &str) -> StoreResult<Vec<Order>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, workspace_id, name, latitude, longitude, description,
                    priority, status, lock_level, created_at, updated_at
             FROM orders WHERE workspace_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([workspace_id], order_from_row)?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row??);
        }
        Ok(orders)
    }

    pub fn patch_order(&mut self, id: &str, patch: &OrderPatch) -> StoreResult<Order> {
        let now = ts_to_sql(Utc::now());
        let tx = self.conn_mut().transaction()?;
        if let Some(priority) = patch.priority {
            tx.execute(
                "UPDATE orders SET priority = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, priority, now],
            )?;
        }
        if let Some(status) = patch.status {
            tx.execute(
                "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, enum_to_sql(&status)?, now],
            )?;
        }
        if let Some(lock) = patch.lock_level {
            tx.execute(
                "UPDATE orders SET lock_level = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, enum_to_sql(&lock)?, now],
            )?;
        }
        tx.commit()?;
        self.get_order(id)
    }

    // ---- plans --------------------------------------------------------

    /// Persist a plan and its items in one transaction.
    pub fn save_plan(&mut self, plan: &Plan, items: &[ScheduledItem]) -> StoreResult<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO plans
                (id, workspace_id, algorithm, config_snapshot, input_hash,
                 metrics, created_at, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                plan.id,
                plan.workspace_id,
                plan.algorithm.as_str(),
                serde_json::to_string(&plan.config_snapshot)?,
                plan.input_hash,
                serde_json::to_string(&plan.metrics)?,
                ts_to_sql(plan.created_at),
                plan.committed_at.map(ts_to_sql),
            ],
        )?;
        for item in items {
            tx.execute(
                "INSERT INTO plan_items
                    (id, plan_id, opportunity_id, satellite_id, target_id,
                     start_time, end_time, roll_angle_deg, pitch_angle_deg,
                     maneuver_time_s, slack_time_s, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    new_id("pit"),
                    plan.id,
                    item.opportunity_id,
                    item.satellite_id,
                    item.target_id,
                    ts_to_sql(item.start_time),
                    ts_to_sql(item.end_time),
                    item.roll_angle_deg,
                    item.pitch_angle_deg,
                    item.maneuver_time_s,
                    item.slack_time_s,
                    item.value,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_plan(&self, id: &str) -> StoreResult<Plan> {
        self.conn()
            .query_row(
                "SELECT id, workspace_id, algorithm, config_snapshot, input_hash,
                        metrics, created_at, committed_at
                 FROM plans WHERE id = ?1",
                [id],
                plan_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "plan",
                id: id.to_string(),
            })?
    }

    pub fn list_plan_items(&self, plan_id: &str) -> StoreResult<Vec<PlanItem>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, plan_id, opportunity_id, satellite_id, target_id,
                    start_time, end_time, roll_angle_deg, pitch_angle_deg,
                    maneuver_time_s, slack_time_s, value
             FROM plan_items WHERE plan_id = ?1 ORDER BY start_time, id",
        )?;
        let rows = stmt.query_map([plan_id], plan_item_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row??);
        }
        Ok(items)
    }

    // ---- acquisitions -------------------------------------------------

    pub fn get_acquisition(&self, id: &str) -> StoreResult<Acquisition> {
        self.conn()
            .query_row(
                &format!("{ACQUISITION_SELECT} WHERE id = ?1"),
                [id],
                acquisition_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "acquisition",
                id: id.to_string(),
            })?
    }

    /// Acquisitions overlapping `[start, end]`, optionally filtered to one
    /// satellite, sorted by start time. Failed slots are excluded.
    pub fn acquisitions_in_horizon(
        &self,
        workspace_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        satellite_id: Option<&str>,
    ) -> StoreResult<Vec<Acquisition>> {
        let mut sql = format!(
            "{ACQUISITION_SELECT}
             WHERE workspace_id = ?1 AND state != 'failed'
               AND start_time < ?3 AND end_time > ?2"
        );
        if satellite_id.is_some() {
            sql.push_str(" AND satellite_id = ?4");
        }
        sql.push_str(" ORDER BY start_time, id");

        let start_sql = ts_to_sql(start);
        let end_sql = ts_to_sql(end);
        let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&workspace_id, &start_sql, &end_sql];
        if let Some(sat) = satellite_id.as_ref() {
            bind.push(sat);
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(&bind[..], acquisition_from_row)?;
        let mut acquisitions = Vec::new();
        for row in rows {
            acquisitions.push(row??);
        }
        Ok(acquisitions)
    }

    pub fn list_acquisitions(&self, workspace_id: &str) -> StoreResult<Vec<Acquisition>> {
        let mut stmt = self.conn().prepare(&format!(
            "{ACQUISITION_SELECT} WHERE workspace_id = ?1 ORDER BY start_time, id"
        ))?;
        let rows = stmt.query_map([workspace_id], acquisition_from_row)?;
        let mut acquisitions = Vec::new();
        for row in rows {
            acquisitions.push(row??);
        }
        Ok(acquisitions)
    }

    pub fn update_acquisition_state(
        &mut self,
        id: &str,
        state: AcquisitionState,
    ) -> StoreResult<()> {
        let updated = self.conn().execute(
            "UPDATE acquisitions SET state = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, enum_to_sql(&state)?, ts_to_sql(Utc::now())],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "acquisition",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn update_acquisition_lock_level(
        &mut self,
        id: &str,
        lock: LockLevel,
    ) -> StoreResult<()> {
        let updated = self.conn().execute(
            "UPDATE acquisitions SET lock_level = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, enum_to_sql(&lock)?, ts_to_sql(Utc::now())],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "acquisition",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Set every non-failed acquisition in a workspace to one lock level.
    pub fn bulk_update_lock_level(
        &mut self,
        workspace_id: &str,
        lock: LockLevel,
    ) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "UPDATE acquisitions SET lock_level = ?2, updated_at = ?3
             WHERE workspace_id = ?1 AND state != 'failed'",
            params![workspace_id, enum_to_sql(&lock)?, ts_to_sql(Utc::now())],
        )?)
    }

    // ---- commit -------------------------------------------------------

    /// Commit a plan: one transaction that (a) rejects double commits,
    /// (b) creates acquisitions from plan items, (c) soft-deletes dropped
    /// acquisitions, (d) stamps the plan, (e) writes the audit row.
    pub fn commit_plan(&mut self, request: &CommitRequest) -> StoreResult<CommitOutcome> {
        let now = Utc::now();
        let now_sql = ts_to_sql(now);
        let tx = self.conn_mut().transaction()?;

        let (workspace_id, committed_at): (String, Option<String>) = tx
            .query_row(
                "SELECT workspace_id, committed_at FROM plans WHERE id = ?1",
                [&request.plan_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "plan",
                id: request.plan_id.clone(),
            })?;
        if committed_at.is_some() {
            return Err(StoreError::AlreadyCommitted(request.plan_id.clone()));
        }

        for drop_id in &request.drop_acquisition_ids {
            let updated = tx.execute(
                "UPDATE acquisitions SET state = 'failed', lock_level = 'none',
                        updated_at = ?2
                 WHERE id = ?1",
                params![drop_id, now_sql],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    kind: "acquisition",
                    id: drop_id.clone(),
                });
            }
        }

        let source = match request.commit_type {
            CommitType::Normal => "plan_commit",
            CommitType::Repair => "repair_commit",
        };
        let mut acquisition_ids = Vec::new();
        {
            let mut select_items = tx.prepare(
                "SELECT opportunity_id, satellite_id, target_id, start_time,
                        end_time, roll_angle_deg, pitch_angle_deg
                 FROM plan_items WHERE plan_id = ?1 ORDER BY start_time, id",
            )?;
            let mut insert_acq = tx.prepare(
                "INSERT INTO acquisitions
                    (id, workspace_id, plan_id, satellite_id, target_id,
                     start_time, end_time, roll_angle_deg, pitch_angle_deg,
                     mode, state, lock_level, source, opportunity_id,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         'committed', ?11, ?12, ?13, ?14, ?14)",
            )?;

            let items = select_items.query_map([&request.plan_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            })?;
            for item in items {
                let (opportunity_id, satellite_id, target_id, start, end, roll, pitch) = item?;
                let lock = request
                    .lock_levels
                    .get(&target_id)
                    .copied()
                    .unwrap_or(LockLevel::None);
                let acq_id = new_id("acq");
                insert_acq.execute(params![
                    acq_id,
                    workspace_id,
                    request.plan_id,
                    satellite_id,
                    target_id,
                    start,
                    end,
                    roll,
                    pitch,
                    enum_to_sql(&request.mode)?,
                    enum_to_sql(&lock)?,
                    source,
                    opportunity_id,
                    now_sql,
                ])?;
                acquisition_ids.push(acq_id);
            }
        }

        tx.execute(
            "UPDATE plans SET committed_at = ?2 WHERE id = ?1",
            params![request.plan_id, now_sql],
        )?;

        let audit_row = CommitAuditRow {
            id: new_id("aud"),
            workspace_id: workspace_id.clone(),
            plan_id: request.plan_id.clone(),
            commit_type: request.commit_type,
            config_hash: request.config_hash.clone(),
            acquisitions_created: acquisition_ids.len(),
            acquisitions_dropped: request.drop_acquisition_ids.len(),
            repair_diff: request.repair_diff.clone(),
            score_before: request.score_before,
            score_after: request.score_after,
            conflicts_before: request.conflicts_before,
            conflicts_after: request.conflicts_after,
            created_at: now,
            notes: request.notes.clone(),
        };
        tx.execute(
            "INSERT INTO commit_audit_log
                (id, workspace_id, plan_id, commit_type, config_hash,
                 acquisitions_created, acquisitions_dropped, repair_diff,
                 score_before, score_after, conflicts_before, conflicts_after,
                 created_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                audit_row.id,
                audit_row.workspace_id,
                audit_row.plan_id,
                enum_to_sql(&audit_row.commit_type)?,
                audit_row.config_hash,
                audit_row.acquisitions_created as i64,
                audit_row.acquisitions_dropped as i64,
                audit_row
                    .repair_diff
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                audit_row.score_before,
                audit_row.score_after,
                audit_row.conflicts_before.map(|c| c as i64),
                audit_row.conflicts_after.map(|c| c as i64),
                now_sql,
                audit_row.notes,
            ],
        )?;

        tx.commit()?;
        Ok(CommitOutcome {
            acquisition_ids,
            audit_row,
        })
    }

    pub fn list_audit_rows(&self, workspace_id: &str) -> StoreResult<Vec<CommitAuditRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, workspace_id, plan_id, commit_type, config_hash,
                    acquisitions_created, acquisitions_dropped, repair_diff,
                    score_before, score_after, conflicts_before, conflicts_after,
                    created_at, notes
             FROM commit_audit_log WHERE workspace_id = ?1
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([workspace_id], audit_from_row)?;
        let mut audit = Vec::new();
        for row in rows {
            audit.push(row??);
        }
        Ok(audit)
    }

    // ---- conflicts ----------------------------------------------------

    pub fn create_conflict(
        &mut self,
        workspace_id: &str,
        kind: ConflictType,
        severity: ConflictSeverity,
        description: &str,
        acquisition_ids: &[String],
        details: serde_json::Value,
    ) -> StoreResult<Conflict> {
        let id = new_id("conf");
        self.conn().execute(
            "INSERT INTO conflicts
                (id, workspace_id, type, severity, description,
                 acquisition_ids, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                workspace_id,
                enum_to_sql(&kind)?,
                enum_to_sql(&severity)?,
                description,
                serde_json::to_string(acquisition_ids)?,
                serde_json::to_string(&details)?,
                ts_to_sql(Utc::now()),
            ],
        )?;
        self.get_conflict(&id)
    }

    pub fn get_conflict(&self, id: &str) -> StoreResult<Conflict> {
        self.conn()
            .query_row(
                &format!("{CONFLICT_SELECT} WHERE id = ?1"),
                [id],
                conflict_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "conflict",
                id: id.to_string(),
            })?
    }

    pub fn list_conflicts(
        &self,
        workspace_id: &str,
        unresolved_only: bool,
    ) -> StoreResult<Vec<Conflict>> {
        let mut sql = format!("{CONFLICT_SELECT} WHERE workspace_id = ?1");
        if unresolved_only {
            sql.push_str(" AND resolved_at IS NULL");
        }
        sql.push_str(" ORDER BY created_at, id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([workspace_id], conflict_from_row)?;
        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row??);
        }
        Ok(conflicts)
    }

    pub fn clear_unresolved_conflicts(&mut self, workspace_id: &str) -> StoreResult<usize> {
        Ok(self.conn().execute(
            "DELETE FROM conflicts WHERE workspace_id = ?1 AND resolved_at IS NULL",
            [workspace_id],
        )?)
    }

    pub fn resolve_conflict(&mut self, id: &str, action: &str) -> StoreResult<()> {
        let updated = self.conn().execute(
            "UPDATE conflicts SET resolved_at = ?2, resolution_action = ?3 WHERE id = ?1",
            params![id, ts_to_sql(Utc::now()), action],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                kind: "conflict",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

const ACQUISITION_SELECT: &str = "SELECT id, workspace_id, plan_id, satellite_id, target_id,
        start_time, end_time, roll_angle_deg, pitch_angle_deg, mode, state,
        lock_level, source, opportunity_id, created_at, updated_at
 FROM acquisitions";

const CONFLICT_SELECT: &str = "SELECT id, workspace_id, type, severity, description,
        acquisition_ids, details, created_at, resolved_at, resolution_action
 FROM conflicts";

type RowResult<T> = Result<T, StoreError>;

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<Order>> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let latitude: f64 = row.get(3)?;
    let longitude: f64 = row.get(4)?;
    let description: String = row.get(5)?;
    let priority: u8 = row.get(6)?;
    let status: String = row.get(7)?;
    let lock_level: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok((|| {
        Ok(Order {
            id,
            workspace_id,
            name,
            latitude,
            longitude,
            description,
            priority,
            status: enum_from_sql(&status)?,
            lock_level: enum_from_sql(&lock_level)?,
            created_at: ts_from_sql(&created_at)?,
            updated_at: ts_from_sql(&updated_at)?,
        })
    })())
}

fn plan_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<Plan>> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let algorithm: String = row.get(2)?;
    let config_snapshot: String = row.get(3)?;
    let input_hash: String = row.get(4)?;
    let metrics: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let committed_at: Option<String> = row.get(7)?;
    Ok((|| {
        Ok(Plan {
            id,
            workspace_id,
            algorithm: enum_from_sql(&algorithm)?,
            config_snapshot: serde_json::from_str(&config_snapshot)?,
            input_hash,
            metrics: serde_json::from_str(&metrics)?,
            created_at: ts_from_sql(&created_at)?,
            committed_at: opt_ts_from_sql(committed_at)?,
        })
    })())
}

fn plan_item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<PlanItem>> {
    let id: String = row.get(0)?;
    let plan_id: String = row.get(1)?;
    let opportunity_id: String = row.get(2)?;
    let satellite_id: String = row.get(3)?;
    let target_id: String = row.get(4)?;
    let start_time: String = row.get(5)?;
    let end_time: String = row.get(6)?;
    let roll: f64 = row.get(7)?;
    let pitch: f64 = row.get(8)?;
    let maneuver: f64 = row.get(9)?;
    let slack: f64 = row.get(10)?;
    let value: f64 = row.get(11)?;
    Ok((|| {
        Ok(PlanItem {
            id,
            plan_id,
            opportunity_id,
            satellite_id,
            target_id,
            start_time: ts_from_sql(&start_time)?,
            end_time: ts_from_sql(&end_time)?,
            roll_angle_deg: roll,
            pitch_angle_deg: pitch,
            maneuver_time_s: maneuver,
            slack_time_s: slack,
            value,
        })
    })())
}

fn acquisition_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<Acquisition>> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let plan_id: Option<String> = row.get(2)?;
    let satellite_id: String = row.get(3)?;
    let target_id: String = row.get(4)?;
    let start_time: String = row.get(5)?;
    let end_time: String = row.get(6)?;
    let roll: f64 = row.get(7)?;
    let pitch: Option<f64> = row.get(8)?;
    let mode: String = row.get(9)?;
    let state: String = row.get(10)?;
    let lock_level: String = row.get(11)?;
    let source: String = row.get(12)?;
    let opportunity_id: Option<String> = row.get(13)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;
    Ok((|| {
        Ok(Acquisition {
            id,
            workspace_id,
            plan_id,
            satellite_id,
            target_id,
            start_time: ts_from_sql(&start_time)?,
            end_time: ts_from_sql(&end_time)?,
            roll_angle_deg: roll,
            pitch_angle_deg: pitch,
            mode: enum_from_sql(&mode)?,
            state: enum_from_sql(&state)?,
            lock_level: enum_from_sql(&lock_level)?,
            source,
            opportunity_id,
            created_at: ts_from_sql(&created_at)?,
            updated_at: ts_from_sql(&updated_at)?,
        })
    })())
}

fn conflict_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<Conflict>> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let description: String = row.get(4)?;
    let acquisition_ids: String = row.get(5)?;
    let details: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let resolved_at: Option<String> = row.get(8)?;
    let resolution_action: Option<String> = row.get(9)?;
    Ok((|| {
        Ok(Conflict {
            id,
            workspace_id,
            kind: enum_from_sql(&kind)?,
            severity: enum_from_sql(&severity)?,
            description,
            acquisition_ids: serde_json::from_str(&acquisition_ids)?,
            details: serde_json::from_str(&details)?,
            created_at: ts_from_sql(&created_at)?,
            resolved_at: opt_ts_from_sql(resolved_at)?,
            resolution_action,
        })
    })())
}

fn audit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult<CommitAuditRow>> {
    let id: String = row.get(0)?;
    let workspace_id: String = row.get(1)?;
    let plan_id: String = row.get(2)?;
    let commit_type: String = row.get(3)?;
    let config_hash: String = row.get(4)?;
    let created_count: i64 = row.get(5)?;
    let dropped_count: i64 = row.get(6)?;
    let repair_diff: Option<String> = row.get(7)?;
    let score_before: Option<f64> = row.get(8)?;
    let score_after: Option<f64> = row.get(9)?;
    let conflicts_before: Option<i64> = row.get(10)?;
    let conflicts_after: Option<i64> = row.get(11)?;
    let created_at: String = row.get(12)?;
    let notes: Option<String> = row.get(13)?;
    Ok((|| {
        Ok(CommitAuditRow {
            id,
            workspace_id,
            plan_id,
            commit_type: enum_from_sql(&commit_type)?,
            config_hash,
            acquisitions_created: created_count as usize,
            acquisitions_dropped: dropped_count as usize,
            repair_diff: repair_diff
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            score_before,
            score_after,
            conflicts_before: conflicts_before.map(|c| c as usize),
            conflicts_after: conflicts_after.map(|c| c as usize),
            created_at: ts_from_sql(&created_at)?,
            notes,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceUpdate;
    use overpass_types::AlgorithmKind;
    use std::collections::BTreeMap;

    fn store_with_workspace() -> (Store, String) {
        let mut store = Store::open_in_memory().unwrap();
        let ws = store
            .create_workspace("Test", WorkspaceUpdate::default())
            .unwrap();
        (store, ws)
    }

    fn item(opp: &str, sat: &str, offset_min: i64) -> ScheduledItem {
        let start: DateTime<Utc> = "2025-01-15T10:00:00Z".parse().unwrap();
        let start = start + chrono::Duration::minutes(offset_min);
        ScheduledItem {
            opportunity_id: opp.to_string(),
            satellite_id: sat.to_string(),
            target_id: format!("tgt_{opp}"),
            start_time: start,
            end_time: start + chrono::Duration::seconds(10),
            roll_angle_deg: 12.0,
            pitch_angle_deg: 0.0,
            maneuver_time_s: 20.0,
            slack_time_s: 5.0,
            value: 0.8,
        }
    }

    fn plan(ws: &str, id: &str) -> Plan {
        Plan {
            id: id.to_string(),
            workspace_id: ws.to_string(),
            algorithm: AlgorithmKind::FirstFit,
            config_snapshot: serde_json::json!({"config_hash": "abc123"}),
            input_hash: "deadbeefdeadbeef".to_string(),
            metrics: Default::default(),
            created_at: Utc::now(),
            committed_at: None,
        }
    }

    fn commit_request(plan_id: &str) -> CommitRequest {
        CommitRequest {
            plan_id: plan_id.to_string(),
            commit_type: CommitType::Normal,
            config_hash: "abc123".to_string(),
            mode: MissionMode::Optical,
            drop_acquisition_ids: vec![],
            lock_levels: BTreeMap::new(),
            repair_diff: None,
            score_before: None,
            score_after: None,
            conflicts_before: None,
            conflicts_after: None,
            notes: None,
        }
    }

    #[test]
    fn order_lifecycle() {
        let (mut store, ws) = store_with_workspace();
        let order = store
            .create_order(
                &ws,
                &NewOrder {
                    name: "Port of Rotterdam".to_string(),
                    latitude: 51.95,
                    longitude: 4.14,
                    description: String::new(),
                    priority: 2,
                    lock_level: LockLevel::None,
                },
            )
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let patched = store
            .patch_order(
                &order.id,
                &OrderPatch {
                    priority: Some(1),
                    status: Some(OrderStatus::Planned),
                    lock_level: Some(LockLevel::Soft),
                },
            )
            .unwrap();
        assert_eq!(patched.priority, 1);
        assert_eq!(patched.status, OrderStatus::Planned);
        assert_eq!(patched.lock_level, LockLevel::Soft);

        assert_eq!(store.list_orders(&ws).unwrap().len(), 1);
    }

    #[test]
    fn plan_save_and_items_roundtrip() {
        let (mut store, ws) = store_with_workspace();
        let plan = plan(&ws, "plan_a1");
        let items = vec![item("opp_1", "sat_a", 0), item("opp_2", "sat_a", 30)];
        store.save_plan(&plan, &items).unwrap();

        let loaded = store.get_plan("plan_a1").unwrap();
        assert_eq!(loaded.workspace_id, ws);
        assert_eq!(loaded.algorithm, AlgorithmKind::FirstFit);
        assert!(loaded.committed_at.is_none());

        let loaded_items = store.list_plan_items("plan_a1").unwrap();
        assert_eq!(loaded_items.len(), 2);
        assert_eq!(loaded_items[0].opportunity_id, "opp_1");
        assert_eq!(loaded_items[1].opportunity_id, "opp_2");
    }

    #[test]
    fn commit_creates_acquisitions_and_audit_row() {
        let (mut store, ws) = store_with_workspace();
        let plan = plan(&ws, "plan_c1");
        store
            .save_plan(&plan, &[item("opp_1", "sat_a", 0), item("opp_2", "sat_a", 30)])
            .unwrap();

        let mut request = commit_request("plan_c1");
        request
            .lock_levels
            .insert("tgt_opp_1".to_string(), LockLevel::Hard);
        let outcome = store.commit_plan(&request).unwrap();
        assert_eq!(outcome.acquisition_ids.len(), 2);

        let acquisitions = store.list_acquisitions(&ws).unwrap();
        assert_eq!(acquisitions.len(), 2);
        let hard = acquisitions
            .iter()
            .find(|a| a.target_id == "tgt_opp_1")
            .unwrap();
        assert_eq!(hard.lock_level, LockLevel::Hard);
        assert_eq!(hard.state, AcquisitionState::Committed);
        assert_eq!(hard.source, "plan_commit");
        assert_eq!(hard.opportunity_id.as_deref(), Some("opp_1"));

        let committed_plan = store.get_plan("plan_c1").unwrap();
        assert!(committed_plan.committed_at.is_some());

        let audit = store.list_audit_rows(&ws).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].acquisitions_created, 2);
        assert_eq!(audit[0].acquisitions_dropped, 0);
        assert_eq!(audit[0].config_hash, "abc123");
    }

    #[test]
    fn double_commit_is_rejected() {
        let (mut store, ws) = store_with_workspace();
        store.save_plan(&plan(&ws, "plan_d1"), &[item("opp_1", "sat_a", 0)]).unwrap();
        store.commit_plan(&commit_request("plan_d1")).unwrap();
        let err = store.commit_plan(&commit_request("plan_d1")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCommitted(_)));

        // No duplicate rows leaked from the failed attempt.
        assert_eq!(store.list_acquisitions(&ws).unwrap().len(), 1);
        assert_eq!(store.list_audit_rows(&ws).unwrap().len(), 1);
    }

    #[test]
    fn commit_drops_replaced_acquisitions() {
        let (mut store, ws) = store_with_workspace();
        store
            .save_plan(&plan(&ws, "plan_e1"), &[item("opp_1", "sat_a", 0)])
            .unwrap();
        let first = store.commit_plan(&commit_request("plan_e1")).unwrap();
        let victim = first.acquisition_ids[0].clone();

        store
            .save_plan(&plan(&ws, "plan_e2"), &[item("opp_2", "sat_a", 60)])
            .unwrap();
        let mut request = commit_request("plan_e2");
        request.commit_type = CommitType::Repair;
        request.drop_acquisition_ids = vec![victim.clone()];
        request.repair_diff = Some(RepairDiff {
            kept: vec![],
            dropped: vec![victim.clone()],
            added: vec!["opp_2".to_string()],
            moved: vec![],
            reasons: vec!["replaced by higher-value opportunity".to_string()],
        });
        let outcome = store.commit_plan(&request).unwrap();
        assert_eq!(outcome.audit_row.acquisitions_dropped, 1);

        let dropped = store.get_acquisition(&victim).unwrap();
        assert_eq!(dropped.state, AcquisitionState::Failed);
        assert_eq!(dropped.lock_level, LockLevel::None);

        let audit = store.list_audit_rows(&ws).unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].commit_type, CommitType::Repair);
        assert_eq!(
            audit[1].repair_diff.as_ref().unwrap().dropped,
            vec![victim]
        );
    }

    #[test]
    fn commit_missing_plan_is_not_found() {
        let (mut store, _ws) = store_with_workspace();
        let err = store.commit_plan(&commit_request("plan_ghost")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "plan", .. }));
    }

    #[test]
    fn horizon_query_filters_failed_and_sorts() {
        let (mut store, ws) = store_with_workspace();
        store
            .save_plan(
                &plan(&ws, "plan_h1"),
                &[item("opp_2", "sat_a", 30), item("opp_1", "sat_a", 0)],
            )
            .unwrap();
        let outcome = store.commit_plan(&commit_request("plan_h1")).unwrap();

        let start: DateTime<Utc> = "2025-01-15T00:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2025-01-16T00:00:00Z".parse().unwrap();
        let in_horizon = store
            .acquisitions_in_horizon(&ws, start, end, None)
            .unwrap();
        assert_eq!(in_horizon.len(), 2);
        assert!(in_horizon[0].start_time <= in_horizon[1].start_time);

        store
            .update_acquisition_state(&outcome.acquisition_ids[0], AcquisitionState::Failed)
            .unwrap();
        let in_horizon = store
            .acquisitions_in_horizon(&ws, start, end, None)
            .unwrap();
        assert_eq!(in_horizon.len(), 1);

        let filtered = store
            .acquisitions_in_horizon(&ws, start, end, Some("sat_other"))
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn lock_level_updates_single_and_bulk() {
        let (mut store, ws) = store_with_workspace();
        store
            .save_plan(
                &plan(&ws, "plan_l1"),
                &[item("opp_1", "sat_a", 0), item("opp_2", "sat_a", 30)],
            )
            .unwrap();
        let outcome = store.commit_plan(&commit_request("plan_l1")).unwrap();

        store
            .update_acquisition_lock_level(&outcome.acquisition_ids[0], LockLevel::Hard)
            .unwrap();
        let acq = store.get_acquisition(&outcome.acquisition_ids[0]).unwrap();
        assert_eq!(acq.lock_level, LockLevel::Hard);

        let updated = store.bulk_update_lock_level(&ws, LockLevel::Soft).unwrap();
        assert_eq!(updated, 2);
        for id in &outcome.acquisition_ids {
            assert_eq!(store.get_acquisition(id).unwrap().lock_level, LockLevel::Soft);
        }

        assert!(store
            .update_acquisition_lock_level("acq_missing", LockLevel::Hard)
            .is_err());
    }

    #[test]
    fn conflict_persist_clear_resolve() {
        let (mut store, ws) = store_with_workspace();
        let conflict = store
            .create_conflict(
                &ws,
                ConflictType::TemporalOverlap,
                ConflictSeverity::Error,
                "overlap of 10s",
                &["acq_1".to_string(), "acq_2".to_string()],
                serde_json::json!({"overlap_seconds": 10.0}),
            )
            .unwrap();
        assert_eq!(conflict.acquisition_ids.len(), 2);

        store.resolve_conflict(&conflict.id, "manual").unwrap();
        let unresolved = store.list_conflicts(&ws, true).unwrap();
        assert!(unresolved.is_empty());
        let all = store.list_conflicts(&ws, false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].resolution_action.as_deref(), Some("manual"));

        store
            .create_conflict(
                &ws,
                ConflictType::SlewInfeasible,
                ConflictSeverity::Warning,
                "slew deficit",
                &["acq_3".to_string()],
                serde_json::Value::Null,
            )
            .unwrap();
        let cleared = store.clear_unresolved_conflicts(&ws).unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(store.list_conflicts(&ws, false).unwrap().len(), 1);
    }

    #[test]
    fn workspace_delete_cascades_schedule_rows() {
        let (mut store, ws) = store_with_workspace();
        store
            .save_plan(&plan(&ws, "plan_x1"), &[item("opp_1", "sat_a", 0)])
            .unwrap();
        store.commit_plan(&commit_request("plan_x1")).unwrap();
        store
            .create_conflict(
                &ws,
                ConflictType::TemporalOverlap,
                ConflictSeverity::Error,
                "x",
                &[],
                serde_json::Value::Null,
            )
            .unwrap();

        store.delete_workspace(&ws).unwrap();
        for table in ["plans", "plan_items", "acquisitions", "conflicts", "commit_audit_log"] {
            let count: i64 = store
                .conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} not cascaded");
        }
    }

    #[test]
    fn audit_rows_are_monotonically_ordered() {
        let (mut store, ws) = store_with_workspace();
        for i in 0..3 {
            let plan_id = format!("plan_m{i}");
            store
                .save_plan(&plan(&ws, &plan_id), &[item(&format!("opp_{i}"), "sat_a", i * 60)])
                .unwrap();
            store.commit_plan(&commit_request(&plan_id)).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(3));
        }
        let audit = store.list_audit_rows(&ws).unwrap();
        assert_eq!(audit.len(), 3);
        for pair in audit.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }
}
