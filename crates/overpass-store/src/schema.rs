//! Relational schema.
//!
//! All tables live in one database file. Foreign keys cascade from
//! workspaces so deleting a workspace removes everything it owns;
//! acquisitions keep a nullable reference to their originating plan and
//! survive plan deletion.

use crate::{Store, StoreResult};

/// Version of the workspace tables.
pub const WORKSPACE_SCHEMA_VERSION: &str = "1.0";

/// Version of the scheduling tables.
pub const SCHEDULE_SCHEMA_VERSION: &str = "2.3";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_info (
    component TEXT PRIMARY KEY,
    version TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    mission_mode TEXT,
    time_window_start TEXT,
    time_window_end TEXT,
    satellites_count INTEGER NOT NULL DEFAULT 0,
    targets_count INTEGER NOT NULL DEFAULT 0,
    last_run_status TEXT
);

CREATE TABLE IF NOT EXISTS workspace_blobs (
    workspace_id TEXT PRIMARY KEY
        REFERENCES workspaces(id) ON DELETE CASCADE,
    scenario_config TEXT,
    analysis_state TEXT,
    planning_state TEXT,
    orders_state TEXT,
    ui_state TEXT,
    czml_blob BLOB,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL
        REFERENCES workspaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 3,
    status TEXT NOT NULL DEFAULT 'pending',
    lock_level TEXT NOT NULL DEFAULT 'none',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL
        REFERENCES workspaces(id) ON DELETE CASCADE,
    algorithm TEXT NOT NULL,
    config_snapshot TEXT NOT NULL,
    input_hash TEXT NOT NULL,
    metrics TEXT NOT NULL,
    created_at TEXT NOT NULL,
    committed_at TEXT
);

CREATE TABLE IF NOT EXISTS plan_items (
    id TEXT PRIMARY KEY,
    plan_id TEXT NOT NULL
        REFERENCES plans(id) ON DELETE CASCADE,
    opportunity_id TEXT NOT NULL,
    satellite_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    roll_angle_deg REAL NOT NULL DEFAULT 0,
    pitch_angle_deg REAL NOT NULL DEFAULT 0,
    maneuver_time_s REAL NOT NULL DEFAULT 0,
    slack_time_s REAL NOT NULL DEFAULT 0,
    value REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS acquisitions (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL
        REFERENCES workspaces(id) ON DELETE CASCADE,
    plan_id TEXT REFERENCES plans(id) ON DELETE SET NULL,
    satellite_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    roll_angle_deg REAL NOT NULL DEFAULT 0,
    pitch_angle_deg REAL,
    mode TEXT NOT NULL DEFAULT 'OPTICAL',
    state TEXT NOT NULL DEFAULT 'committed',
    lock_level TEXT NOT NULL DEFAULT 'none',
    source TEXT NOT NULL DEFAULT 'plan_commit',
    opportunity_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conflicts (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL
        REFERENCES workspaces(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    acquisition_ids TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    resolution_action TEXT
);

CREATE TABLE IF NOT EXISTS commit_audit_log (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL
        REFERENCES workspaces(id) ON DELETE CASCADE,
    plan_id TEXT NOT NULL,
    commit_type TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    acquisitions_created INTEGER NOT NULL DEFAULT 0,
    acquisitions_dropped INTEGER NOT NULL DEFAULT 0,
    repair_diff TEXT,
    score_before REAL,
    score_after REAL,
    conflicts_before INTEGER,
    conflicts_after INTEGER,
    created_at TEXT NOT NULL,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_orders_workspace
    ON orders(workspace_id);
CREATE INDEX IF NOT EXISTS idx_plans_workspace
    ON plans(workspace_id);
CREATE INDEX IF NOT EXISTS idx_plan_items_plan
    ON plan_items(plan_id);
CREATE INDEX IF NOT EXISTS idx_acquisitions_workspace
    ON acquisitions(workspace_id);
CREATE INDEX IF NOT EXISTS idx_acquisitions_satellite
    ON acquisitions(satellite_id);
CREATE INDEX IF NOT EXISTS idx_acquisitions_start_time
    ON acquisitions(start_time);
CREATE INDEX IF NOT EXISTS idx_conflicts_workspace
    ON conflicts(workspace_id);
CREATE INDEX IF NOT EXISTS idx_audit_workspace
    ON commit_audit_log(workspace_id);
";

impl Store {
    pub(crate) fn ensure_schema(&self) -> StoreResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO schema_info (component, version) VALUES
                ('workspace', ?1), ('schedule', ?2)",
            rusqlite::params![WORKSPACE_SCHEMA_VERSION, SCHEDULE_SCHEMA_VERSION],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
    }

    #[test]
    fn all_tables_exist() {
        let store = Store::open_in_memory().unwrap();
        let mut stmt = store
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in [
            "acquisitions",
            "commit_audit_log",
            "conflicts",
            "orders",
            "plan_items",
            "plans",
            "schema_info",
            "workspace_blobs",
            "workspaces",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }
}
