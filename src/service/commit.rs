//! Commit engine: serialize the workflow, stage and commit.

use super::GitSyncService;
use crate::errors::{GitSyncError, Result};
use chrono::{DateTime, Utc};
use git2::Oid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub commit_hash: String,
    pub short_hash: String,
    pub message: String,
    pub files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl GitSyncService {
    /// Serialize the workflow to files, stage them and commit.
    ///
    /// The author identity is derived from the user id. The first commit on
    /// a fresh repository (unborn branch) resolves its metadata through the
    /// returned commit id rather than the branch ref.
    pub async fn commit(
        &self,
        workflow_id: &str,
        user_id: &str,
        message: &str,
        workflow: &Value,
        env: Option<&str>,
    ) -> Result<CommitOutcome> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        if message.trim().is_empty() {
            return Err(GitSyncError::validation("Commit message must not be empty"));
        }

        let config = self.require_connected(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;

        let files = self.serializer().workflow_to_files(workflow, env)?;
        let written = repo.write_files(&files)?;
        repo.stage_paths(&written)?;

        let (author, email) = Self::author_identity(user_id);
        let commit_hash = repo.commit_staged(message, &author, &email)?;
        let summary = repo.commit_summary(Oid::from_str(&commit_hash)?)?;

        self.store().update(workflow_id, user_id, |row| {
            row.last_commit_hash = Some(commit_hash.clone());
            row.unpushed_commits += 1;
            row.last_sync_at = Some(Utc::now());
        })?;

        info!("Committed workflow {workflow_id}: {message}");
        Ok(CommitOutcome {
            commit_hash: summary.hash,
            short_hash: summary.short_hash,
            message: message.to_string(),
            files: written,
            timestamp: summary.timestamp,
        })
    }
}
