//! Config snapshot store.
//!
//! Point-in-time copies of the admin documents, kept under
//! `config/snapshots/{snapshot_id}/` next to a `metadata.json` describing
//! what was captured. Restoring copies the files back over the live
//! config directory; the caller reloads afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::docs::{ADMIN_FILES, AdminConfig};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub config_hash: String,
    pub files: Vec<String>,
}

/// Snapshot directory manager rooted at `config/snapshots`.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(snapshots_root: &Path) -> Self {
        Self {
            root: snapshots_root.to_path_buf(),
        }
    }

    /// Capture the current on-disk documents of `config` as a new snapshot.
    pub fn create(
        &self,
        config: &AdminConfig,
        description: Option<String>,
    ) -> Result<SnapshotMetadata> {
        let timestamp = Utc::now();
        let id = format!("snapshot_{}", timestamp.format("%Y%m%dT%H%M%S%3f"));
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;

        let mut files = Vec::new();
        for file in ADMIN_FILES {
            let source = config.config_dir().join(file);
            if source.exists() {
                fs::copy(&source, dir.join(file))
                    .with_context(|| format!("failed to copy {file} into snapshot {id}"))?;
                files.push(file.to_string());
            }
        }

        let metadata = SnapshotMetadata {
            id: id.clone(),
            timestamp,
            description,
            config_hash: config.config_hash()?,
            files,
        };
        let json = serde_json::to_string_pretty(&metadata)
            .context("failed to serialize snapshot metadata")?;
        fs::write(dir.join(METADATA_FILE), json)
            .with_context(|| format!("failed to write metadata for snapshot {id}"))?;
        Ok(metadata)
    }

    /// List snapshots, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotMetadata>> {
        let mut snapshots = Vec::new();
        if !self.root.exists() {
            return Ok(snapshots);
        }
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to read snapshots dir {}", self.root.display()))?
        {
            let entry = entry?;
            let metadata_path = entry.path().join(METADATA_FILE);
            if !metadata_path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&metadata_path).with_context(|| {
                format!("failed to read snapshot metadata {}", metadata_path.display())
            })?;
            let metadata: SnapshotMetadata = serde_json::from_str(&content).with_context(|| {
                format!("failed to parse snapshot metadata {}", metadata_path.display())
            })?;
            snapshots.push(metadata);
        }
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Copy a snapshot's files back over the live config directory and
    /// return the reloaded configuration.
    pub fn restore(&self, id: &str, config_dir: &Path) -> Result<AdminConfig> {
        let dir = self.root.join(id);
        if !dir.is_dir() {
            bail!("snapshot not found: {id}");
        }
        let metadata_path = dir.join(METADATA_FILE);
        let content = fs::read_to_string(&metadata_path)
            .with_context(|| format!("failed to read metadata for snapshot {id}"))?;
        let metadata: SnapshotMetadata = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse metadata for snapshot {id}"))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("failed to create config dir {}", config_dir.display()))?;
        for file in &metadata.files {
            fs::copy(dir.join(file), config_dir.join(file))
                .with_context(|| format!("failed to restore {file} from snapshot {id}"))?;
        }
        AdminConfig::load(config_dir)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.root.join(id);
        if !dir.is_dir() {
            bail!("snapshot not found: {id}");
        }
        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to delete snapshot {id}"))?;
        Ok(())
    }
}
