//! Branch management and history rollback.

use super::GitSyncService;
use crate::errors::{GitSyncError, Result};
use crate::git::{validate_branch_name, CommitSummary};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDescriptor {
    pub name: String,
    pub current: bool,
    pub remote: bool,
    pub last_commit: Option<CommitSummary>,
}

impl GitSyncService {
    /// List local branches plus remote branches without a local counterpart.
    pub async fn list_branches(
        &self,
        workflow_id: &str,
        user_id: &str,
    ) -> Result<Vec<BranchDescriptor>> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;
        let current = repo.current_branch().unwrap_or_default();

        let locals = repo.list_local_branches()?;
        let mut branches: Vec<BranchDescriptor> = locals
            .iter()
            .map(|name| BranchDescriptor {
                name: name.clone(),
                current: *name == current,
                remote: false,
                last_commit: repo.ref_tip_summary(&format!("refs/heads/{name}")),
            })
            .collect();

        for name in repo.list_remote_branches(&config.remote_name)? {
            if locals.contains(&name) {
                continue;
            }
            let refname = format!("refs/remotes/{}/{name}", config.remote_name);
            branches.push(BranchDescriptor {
                name,
                current: false,
                remote: true,
                last_commit: repo.ref_tip_summary(&refname),
            });
        }

        Ok(branches)
    }

    /// Create a branch at HEAD and switch to it.
    pub async fn create_branch(
        &self,
        workflow_id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<()> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        validate_branch_name(name)?;
        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;

        if repo.branch_exists(name) {
            return Err(GitSyncError::validation(format!(
                "Branch '{name}' already exists"
            )));
        }

        repo.create_branch(name, None)?;
        repo.checkout_branch(name)?;

        self.store().update(workflow_id, user_id, |row| {
            row.branch = name.to_string();
        })?;
        info!("Created and switched to branch '{name}' for workflow {workflow_id}");
        Ok(())
    }

    /// Switch to a local branch, or create a tracking branch when only the
    /// remote has it. Refuses on a dirty working tree.
    pub async fn switch_branch(
        &self,
        workflow_id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<()> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        validate_branch_name(name)?;
        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;

        if repo.is_dirty(None)? {
            return Err(GitSyncError::config(
                "Working tree has uncommitted changes, commit or discard them before switching branches",
            ));
        }

        if repo.branch_exists(name) {
            repo.checkout_branch(name)?;
        } else if repo.remote_branch_exists(&config.remote_name, name) {
            repo.create_tracking_branch(name, &config.remote_name)?;
        } else {
            return Err(GitSyncError::not_found(format!(
                "Branch '{name}' does not exist locally or on '{}'",
                config.remote_name
            )));
        }

        self.store().update(workflow_id, user_id, |row| {
            row.branch = name.to_string();
        })?;
        Ok(())
    }

    /// Create a branch pointing at a historical commit without switching.
    pub async fn create_branch_from_commit(
        &self,
        workflow_id: &str,
        user_id: &str,
        name: &str,
        commit_hash: &str,
    ) -> Result<()> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        validate_branch_name(name)?;
        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;

        if repo.branch_exists(name) {
            return Err(GitSyncError::validation(format!(
                "Branch '{name}' already exists"
            )));
        }
        if !repo.commit_exists(commit_hash) {
            return Err(GitSyncError::not_found(format!(
                "Commit '{commit_hash}' not found"
            )));
        }

        repo.create_branch(name, Some(commit_hash))?;
        info!("Created branch '{name}' at {commit_hash} for workflow {workflow_id}");
        Ok(())
    }

    /// Restore the workflow files of a historical commit as a new commit on
    /// the current branch. History is preserved; nothing is rewound.
    pub async fn revert_to_commit(
        &self,
        workflow_id: &str,
        user_id: &str,
        commit_hash: &str,
        env: Option<&str>,
    ) -> Result<CommitSummary> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_config(workflow_id, user_id)?;
        let repo = self.open_repo(&config)?;

        if repo.is_dirty(env)? {
            return Err(GitSyncError::config(
                "Working tree has uncommitted changes, commit or discard them before reverting",
            ));
        }
        if !repo.commit_exists(commit_hash) {
            return Err(GitSyncError::not_found(format!(
                "Commit '{commit_hash}' not found"
            )));
        }

        // Snapshot the target commit's files via a detached checkout, then
        // come back and replay them on the branch tip.
        let branch = repo.current_branch()?;
        repo.checkout_commit(commit_hash)?;
        let files = repo.read_workdir_files()?;
        repo.checkout_branch(&branch)?;

        let written = repo.write_files(&files)?;
        repo.stage_paths(&written)?;

        let (author, email) = Self::author_identity(user_id);
        let short = &commit_hash[..commit_hash.len().min(8)];
        let new_hash = repo.commit_staged(&format!("Revert to commit {short}"), &author, &email)?;
        let summary = repo.commit_summary(git2::Oid::from_str(&new_hash)?)?;

        self.store().update(workflow_id, user_id, |row| {
            row.last_commit_hash = Some(new_hash.clone());
            row.unpushed_commits += 1;
            row.last_sync_at = Some(chrono::Utc::now());
        })?;

        info!("Reverted workflow {workflow_id} to {commit_hash} as {new_hash}");
        Ok(summary)
    }
}
