//! Repository lifecycle: init, connect, disconnect.
//!
//! State machine: Uninitialized → Initialized → Connected ⇄ Disconnected.
//! Reconnecting reuses the same local directory and, optionally, the same
//! stored credential.

use super::GitSyncService;
use crate::errors::{GitSyncError, Result};
use crate::git::{validate_repository_url, GitRepository, MergeOutcome};
use crate::state::{WorkflowGitConfig, DEFAULT_BRANCH};
use std::path::Path;
use tracing::{info, warn};

/// Parameters for connecting a workflow repository to a remote.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub repository_url: String,
    pub branch: Option<String>,
    pub credential_id: String,
}

impl GitSyncService {
    /// Initialize an empty local repository for a workflow.
    ///
    /// Fails if the workflow already has a repository. The config row is
    /// only written once every filesystem and repository step has succeeded,
    /// so a partial failure leaves no orphaned row.
    pub async fn init(&self, workflow_id: &str, user_id: &str) -> Result<WorkflowGitConfig> {
        let _guard = self.lock_repo(workflow_id, user_id).await;
        self.init_unlocked(workflow_id, user_id)
    }

    fn init_unlocked(&self, workflow_id: &str, user_id: &str) -> Result<WorkflowGitConfig> {
        if self.store().exists(workflow_id, user_id) {
            return Err(GitSyncError::config(format!(
                "Repository already initialized for workflow {workflow_id}"
            )));
        }

        let local_path = self.settings().repos_dir.join(user_id).join(workflow_id);
        // Start from an empty directory, wiping any stray contents.
        if local_path.exists() {
            std::fs::remove_dir_all(&local_path)?;
        }
        std::fs::create_dir_all(&local_path)?;

        GitRepository::init(&local_path, DEFAULT_BRANCH)?;

        let config = WorkflowGitConfig::new(workflow_id, user_id, local_path);
        self.store().insert(config.clone())?;

        info!("Initialized repository for workflow {workflow_id}");
        Ok(config)
    }

    /// Connect a workflow repository to a remote, testing the connection
    /// before persisting anything.
    ///
    /// The pre-flight lists the remote's refs with the resolved credential.
    /// Any pre-flight failure surfaces as an authentication error; wrong
    /// tokens against public repositories only reliably fail on the first
    /// authenticated write, so no finer distinction is attempted here. When
    /// the row was created by this call, a failed pre-flight rolls it back
    /// so repeated failed connects do not accumulate phantom repositories.
    pub async fn connect(
        &self,
        workflow_id: &str,
        user_id: &str,
        options: ConnectOptions,
    ) -> Result<WorkflowGitConfig> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        validate_repository_url(&options.repository_url)?;

        let created_now = !self.store().exists(workflow_id, user_id);
        let config = if created_now {
            self.init_unlocked(workflow_id, user_id)?
        } else {
            self.require_config(workflow_id, user_id)?
        };

        let pre_flight = self
            .test_connection(&config, user_id, &options)
            .await;
        if let Err(e) = pre_flight {
            if created_now {
                self.rollback_fresh_init(workflow_id, user_id, &config.local_path);
            }
            return Err(GitSyncError::auth(format!(
                "Could not connect to {}: {e}",
                options.repository_url
            )));
        }

        let repo = self.open_repo(&config)?;
        repo.set_remote(&config.remote_name, &options.repository_url)?;

        let branch = options
            .branch
            .clone()
            .unwrap_or_else(|| config.branch.clone());
        let updated = self.store().update(workflow_id, user_id, |row| {
            row.repository_url = Some(options.repository_url.clone());
            row.branch = branch.clone();
            row.credential_id = Some(options.credential_id.clone());
            row.connected = true;
            row.last_error = None;
        })?;

        self.reconcile_remote_history(&repo, &updated, user_id).await;

        info!(
            "Connected workflow {workflow_id} to {}",
            options.repository_url
        );
        Ok(updated)
    }

    async fn test_connection(
        &self,
        config: &WorkflowGitConfig,
        user_id: &str,
        options: &ConnectOptions,
    ) -> Result<()> {
        let mut probe = config.clone();
        probe.credential_id = Some(options.credential_id.clone());
        let auth = self.resolve_auth(&probe, user_id).await?;

        let repo = self.open_repo(config)?;
        let refs = repo.list_remote_refs(&options.repository_url, Some(&auth))?;
        if refs == 0 {
            return Err(GitSyncError::auth(format!(
                "No refs found at {}",
                options.repository_url
            )));
        }
        Ok(())
    }

    fn rollback_fresh_init(&self, workflow_id: &str, user_id: &str, local_path: &Path) {
        if let Err(e) = self.store().remove(workflow_id, user_id) {
            warn!("Failed to roll back config row for workflow {workflow_id}: {e}");
        }
        if local_path.exists() {
            if let Err(e) = std::fs::remove_dir_all(local_path) {
                warn!("Failed to remove repository directory {}: {e}", local_path.display());
            }
        }
    }

    /// Best-effort adoption of pre-existing remote history after a connect.
    /// Failures here are logged, never raised: the user resolves them on
    /// first push instead.
    async fn reconcile_remote_history(
        &self,
        repo: &GitRepository,
        config: &WorkflowGitConfig,
        user_id: &str,
    ) {
        let auth = match self.resolve_auth(config, user_id).await {
            Ok(auth) => auth,
            Err(e) => {
                warn!("Skipping remote reconcile, credential unavailable: {e}");
                return;
            }
        };

        if let Err(e) = repo.fetch_branch(&config.remote_name, &config.branch, Some(&auth)) {
            warn!("Could not fetch remote branch '{}': {e}", config.branch);
            return;
        }
        if !repo.remote_branch_exists(&config.remote_name, &config.branch) {
            return;
        }

        if !repo.has_commits() {
            if let Err(e) = repo.fast_set_branch_to_remote(&config.branch, &config.remote_name) {
                warn!("Could not adopt remote history: {e}");
            }
            return;
        }

        let (author, email) = Self::author_identity(user_id);
        match repo.merge_remote_branch(&config.remote_name, &config.branch, &author, &email) {
            Ok(MergeOutcome::Conflicts(paths)) => {
                warn!(
                    "Remote history diverges from local contents ({} conflicting path(s)); resolve on first push",
                    paths.len()
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Could not merge remote history: {e}");
            }
        }
    }

    /// Disconnect a workflow repository from its remote. The local
    /// repository and any stored credential are kept for a later reconnect.
    pub async fn disconnect(&self, workflow_id: &str, user_id: &str) -> Result<WorkflowGitConfig> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_config(workflow_id, user_id)?;

        if config.local_path.exists() {
            match self.open_repo(&config) {
                Ok(repo) => {
                    if let Err(e) = repo.remove_remote(&config.remote_name) {
                        warn!("Could not remove remote '{}': {e}", config.remote_name);
                    }
                }
                Err(e) => warn!("Could not open repository while disconnecting: {e}"),
            }
        }

        let updated = self.store().update(workflow_id, user_id, |row| {
            row.connected = false;
            row.repository_url = None;
            row.last_error = None;
        })?;

        info!("Disconnected workflow {workflow_id}");
        Ok(updated)
    }

    /// Pure read of the repository state. Returns `None` for an unknown
    /// workflow instead of failing.
    pub fn repository_info(&self, workflow_id: &str, user_id: &str) -> Option<WorkflowGitConfig> {
        self.store().get(workflow_id, user_id)
    }
}
