//! The `GitSyncService` facade: repository lifecycle, change detection,
//! commits, push/pull and branch management for workflow repositories.
//!
//! Every operation against a workflow's repository is serialized through a
//! per-`(workflow_id, user_id)` async mutex, so overlapping calls (a commit
//! racing a pull, for instance) queue instead of racing on the filesystem.

pub mod branches;
pub mod changes;
pub mod commit;
pub mod lifecycle;
pub mod sync;

pub use branches::BranchDescriptor;
pub use commit::CommitOutcome;
pub use lifecycle::ConnectOptions;
pub use sync::{MergeStrategy, PullOptions, PullOutcome, PushOptions, PushOutcome, SyncErrorKind};

use crate::credentials::{resolve_remote_credential, AuthScheme, CredentialManager};
use crate::errors::{GitSyncError, Result};
use crate::git::GitRepository;
use crate::settings::GitSyncSettings;
use crate::state::{ConfigStore, WorkflowGitConfig};
use crate::workflow::{CredentialService, JsonWorkflowSerializer, WorkflowSerializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Per-repository lock registry.
#[derive(Default)]
struct RepoLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoLocks {
    async fn acquire(&self, workflow_id: &str, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap();
            locks
                .entry(format!("{user_id}/{workflow_id}"))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Git-backed version control for workflow definitions.
pub struct GitSyncService {
    settings: GitSyncSettings,
    store: ConfigStore,
    credentials: CredentialManager,
    credential_service: Arc<dyn CredentialService>,
    serializer: Arc<dyn WorkflowSerializer>,
    locks: RepoLocks,
}

impl GitSyncService {
    pub fn new(
        settings: GitSyncSettings,
        credential_service: Arc<dyn CredentialService>,
    ) -> Result<Self> {
        Self::with_serializer(settings, credential_service, Arc::new(JsonWorkflowSerializer))
    }

    pub fn with_serializer(
        settings: GitSyncSettings,
        credential_service: Arc<dyn CredentialService>,
        serializer: Arc<dyn WorkflowSerializer>,
    ) -> Result<Self> {
        let store = ConfigStore::open(&settings.data_dir)?;
        let credentials = CredentialManager::new(&settings)?;

        Ok(Self {
            settings,
            store,
            credentials,
            credential_service,
            serializer,
            locks: RepoLocks::default(),
        })
    }

    /// Credential manager (OAuth flows, encryption, stored credentials).
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Spawn the periodic OAuth state sweeper.
    pub fn spawn_state_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.credentials.state_store().spawn_sweeper()
    }

    pub(crate) async fn lock_repo(&self, workflow_id: &str, user_id: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(workflow_id, user_id).await
    }

    /// Fetch the config row, failing with `NotFound` when absent.
    pub(crate) fn require_config(
        &self,
        workflow_id: &str,
        user_id: &str,
    ) -> Result<WorkflowGitConfig> {
        self.store.get(workflow_id, user_id).ok_or_else(|| {
            GitSyncError::not_found(format!(
                "No repository configured for workflow {workflow_id}"
            ))
        })
    }

    /// Fetch the config row and require a connected remote.
    pub(crate) fn require_connected(
        &self,
        workflow_id: &str,
        user_id: &str,
    ) -> Result<WorkflowGitConfig> {
        let config = self.require_config(workflow_id, user_id)?;
        if !config.connected {
            return Err(GitSyncError::config(format!(
                "Workflow {workflow_id} is not connected to a remote repository"
            )));
        }
        Ok(config)
    }

    /// Open the working copy for a config row.
    pub(crate) fn open_repo(&self, config: &WorkflowGitConfig) -> Result<GitRepository> {
        if !config.local_path.exists() {
            return Err(GitSyncError::config(format!(
                "Local repository directory missing: {}",
                config.local_path.display()
            )));
        }
        GitRepository::open(&config.local_path)
    }

    /// Resolve the transport credentials for a connected workflow. Always
    /// re-reads the credential store so a refreshed token is picked up.
    pub(crate) async fn resolve_auth(
        &self,
        config: &WorkflowGitConfig,
        user_id: &str,
    ) -> Result<AuthScheme> {
        let credential_id = config.credential_id.as_deref().ok_or_else(|| {
            GitSyncError::config(format!(
                "No credential configured for workflow {}",
                config.workflow_id
            ))
        })?;

        let resolved = self
            .credential_service
            .get_credential(credential_id, user_id)
            .await?
            .ok_or_else(|| {
                GitSyncError::not_found(format!("Credential {credential_id} not found"))
            })?;

        let (provider, token) = resolve_remote_credential(&resolved)?;
        Ok(AuthScheme::for_token(provider, token.as_str()))
    }

    /// Deterministic commit author identity for a user. A placeholder until
    /// real user profiles are wired in.
    pub(crate) fn author_identity(user_id: &str) -> (String, String) {
        (user_id.to_string(), format!("{user_id}@workflow.local"))
    }

    pub(crate) fn settings(&self) -> &GitSyncSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub(crate) fn serializer(&self) -> &dyn WorkflowSerializer {
        self.serializer.as_ref()
    }
}
