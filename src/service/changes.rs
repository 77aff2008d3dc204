//! Change detection against the working tree and remote.

use super::GitSyncService;
use crate::errors::Result;
use crate::git::{FileChange, GitRepository};
use serde_json::Value;
use tracing::warn;

impl GitSyncService {
    /// Compute the classified working-tree changes for a workflow.
    ///
    /// When the caller passes the current in-memory workflow, it is
    /// serialized and written first so the diff reflects unsaved edits;
    /// serialization failures fall back to whatever is already on disk.
    pub async fn detect_changes(
        &self,
        workflow_id: &str,
        user_id: &str,
        workflow: Option<&Value>,
        env: Option<&str>,
    ) -> Result<Vec<FileChange>> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;
        self.detect_changes_in_repo(&repo, workflow, env)
    }

    pub(crate) fn detect_changes_in_repo(
        &self,
        repo: &GitRepository,
        workflow: Option<&Value>,
        env: Option<&str>,
    ) -> Result<Vec<FileChange>> {
        if let Some(workflow) = workflow {
            match self.serializer().workflow_to_files(workflow, env) {
                Ok(files) => {
                    if let Err(e) = repo.write_files(&files) {
                        warn!("Could not write serialized workflow, diffing on-disk state: {e}");
                    }
                }
                Err(e) => {
                    warn!("Workflow serialization failed, diffing on-disk state: {e}");
                }
            }
        }

        repo.status_changes(env)
    }

    /// Ahead/behind counts for the configured branch against its remote.
    pub async fn ahead_behind(&self, workflow_id: &str, user_id: &str) -> Result<(usize, usize)> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;
        let ahead = repo.ahead_count(&config.branch, &config.remote_name)?;
        let behind = repo.behind_count(&config.branch, &config.remote_name)?;
        Ok((ahead, behind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ChangeType;
    use crate::service::test_support::test_service;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detect_changes_writes_in_memory_workflow_first() {
        let temp_dir = TempDir::new().unwrap();
        let service = test_service(&temp_dir);
        service.init("wf-1", "user-1").await.unwrap();

        let workflow = json!({"name": "wf", "nodes": []});
        let changes = service
            .detect_changes("wf-1", "user-1", Some(&workflow), None)
            .await
            .unwrap();

        // workflow.json shows as an unstaged addition; README.md is excluded
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "workflow.json");
        assert_eq!(changes[0].change, ChangeType::Added);
        assert!(!changes[0].staged);
    }

    #[tokio::test]
    async fn test_detect_changes_clean_tree_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let service = test_service(&temp_dir);
        service.init("wf-1", "user-1").await.unwrap();

        let changes = service
            .detect_changes("wf-1", "user-1", None, None)
            .await
            .unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_detect_changes_missing_workflow_fails() {
        let temp_dir = TempDir::new().unwrap();
        let service = test_service(&temp_dir);

        assert!(service
            .detect_changes("ghost", "user-1", None, None)
            .await
            .is_err());
    }
}
