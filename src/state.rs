//! Persistent repository state: one `WorkflowGitConfig` row per
//! `(workflow_id, user_id)` pair, stored as a JSON map with atomic writes.

use crate::errors::{GitSyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";

/// Per-workflow repository record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGitConfig {
    pub workflow_id: String,
    pub user_id: String,
    pub repository_url: Option<String>,
    pub branch: String,
    pub remote_name: String,
    pub credential_id: Option<String>,
    pub local_path: PathBuf,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_commit_hash: Option<String>,
    /// Commits created locally since the last successful push. Accurate only
    /// because commits and pushes are funneled through this subsystem.
    pub unpushed_commits: u32,
    pub connected: bool,
    pub last_error: Option<String>,
}

impl WorkflowGitConfig {
    pub fn new(workflow_id: &str, user_id: &str, local_path: PathBuf) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            user_id: user_id.to_string(),
            repository_url: None,
            branch: DEFAULT_BRANCH.to_string(),
            remote_name: DEFAULT_REMOTE.to_string(),
            credential_id: None,
            local_path,
            last_sync_at: None,
            last_commit_hash: None,
            unpushed_commits: 0,
            connected: false,
            last_error: None,
        }
    }
}

fn row_key(workflow_id: &str, user_id: &str) -> String {
    format!("{user_id}/{workflow_id}")
}

/// File-backed store of repository rows.
pub struct ConfigStore {
    path: PathBuf,
    rows: Mutex<HashMap<String, WorkflowGitConfig>>,
}

impl ConfigStore {
    /// Open the store backed by `<data_dir>/repositories.json`, loading any
    /// existing rows.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("repositories.json");
        let rows = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                GitSyncError::config(format!("Failed to read repository state: {e}"))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                GitSyncError::config(format!("Failed to parse repository state: {e}"))
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn get(&self, workflow_id: &str, user_id: &str) -> Option<WorkflowGitConfig> {
        self.rows
            .lock()
            .unwrap()
            .get(&row_key(workflow_id, user_id))
            .cloned()
    }

    pub fn exists(&self, workflow_id: &str, user_id: &str) -> bool {
        self.rows
            .lock()
            .unwrap()
            .contains_key(&row_key(workflow_id, user_id))
    }

    /// Insert a new row. Fails if a row already exists for the pair.
    pub fn insert(&self, config: WorkflowGitConfig) -> Result<()> {
        let key = row_key(&config.workflow_id, &config.user_id);
        let snapshot = {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&key) {
                return Err(GitSyncError::config(format!(
                    "Repository already initialized for workflow {}",
                    config.workflow_id
                )));
            }
            rows.insert(key, config);
            rows.clone()
        };
        self.persist(&snapshot)
    }

    /// Apply a mutation to an existing row and persist. Fails with `NotFound`
    /// if the row does not exist.
    pub fn update<F>(&self, workflow_id: &str, user_id: &str, mutate: F) -> Result<WorkflowGitConfig>
    where
        F: FnOnce(&mut WorkflowGitConfig),
    {
        let key = row_key(workflow_id, user_id);
        let (updated, snapshot) = {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&key).ok_or_else(|| {
                GitSyncError::not_found(format!(
                    "No repository configured for workflow {workflow_id}"
                ))
            })?;
            mutate(row);
            (row.clone(), rows.clone())
        };
        self.persist(&snapshot)?;
        Ok(updated)
    }

    /// Remove a row. Returns whether anything was removed.
    pub fn remove(&self, workflow_id: &str, user_id: &str) -> Result<bool> {
        let key = row_key(workflow_id, user_id);
        let (removed, snapshot) = {
            let mut rows = self.rows.lock().unwrap();
            let removed = rows.remove(&key).is_some();
            (removed, rows.clone())
        };
        if removed {
            self.persist(&snapshot)?;
        }
        Ok(removed)
    }

    fn persist(&self, rows: &HashMap<String, WorkflowGitConfig>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GitSyncError::config(format!("Failed to create state directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(rows).map_err(|e| {
            GitSyncError::config(format!("Failed to serialize repository state: {e}"))
        })?;

        // Write to temporary file first, then rename for atomic write
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| GitSyncError::config(format!("Failed to write repository state: {e}")))?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            GitSyncError::config(format!("Failed to finalize repository state: {e}"))
        })?;

        Ok(())
    }
}
