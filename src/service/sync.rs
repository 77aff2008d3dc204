//! Push/pull orchestration with failure classification.
//!
//! Remote failures (push, pull, fetch) are expected, recoverable states:
//! they are classified and returned as structured results with `last_error`
//! persisted, never thrown. Configuration errors (not connected, missing
//! credential, missing directory) do throw, since they indicate caller
//! misuse rather than a transient remote condition.

use super::GitSyncService;
use crate::errors::{GitSyncError, Result};
use crate::git::{CommitSummary, MergeOutcome};
use git2::{ErrorClass, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Classification of a remote operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorKind {
    Conflict,
    Auth,
    Network,
    Other,
}

impl SyncErrorKind {
    /// Classify an error, preferring libgit2's structured class/code over
    /// message contents.
    pub fn classify(error: &GitSyncError) -> Self {
        match error {
            GitSyncError::Git(e) => {
                if e.code() == ErrorCode::NotFastForward {
                    SyncErrorKind::Conflict
                } else if e.code() == ErrorCode::Auth {
                    SyncErrorKind::Auth
                } else if e.class() == ErrorClass::Net {
                    SyncErrorKind::Network
                } else {
                    Self::from_message(e.message())
                }
            }
            GitSyncError::Auth(_) => SyncErrorKind::Auth,
            GitSyncError::Network(_) => SyncErrorKind::Network,
            GitSyncError::Conflict(_) => SyncErrorKind::Conflict,
            other => Self::from_message(&other.to_string()),
        }
    }

    /// Message-substring fallback for transports that only surface strings.
    fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("non-fast-forward")
            || message.contains("rejected")
            || message.contains("fetch first")
        {
            SyncErrorKind::Conflict
        } else if message.contains("401")
            || message.contains("403")
            || message.contains("unauthorized")
            || message.contains("authentication")
            || message.contains("invalid credentials")
        {
            SyncErrorKind::Auth
        } else if message.contains("could not resolve")
            || message.contains("resolve host")
            || message.contains("timed out")
            || message.contains("timeout")
            || message.contains("connection refused")
            || message.contains("unreachable")
            || message.contains("failed to connect")
        {
            SyncErrorKind::Network
        } else {
            SyncErrorKind::Other
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub force: bool,
    pub remote: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOutcome {
    pub success: bool,
    pub pushed: usize,
    pub error: Option<String>,
}

/// Requested pull strategy. `Rebase` is accepted for API compatibility but
/// is executed as a merge; true rebase support is a non-goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Merge,
    Rebase,
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullOutcome {
    pub success: bool,
    pub commits: Vec<CommitSummary>,
    pub workflow: Option<Value>,
    pub conflicts: Option<Vec<String>>,
    pub error: Option<String>,
}

impl PullOutcome {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            commits: Vec::new(),
            workflow: None,
            conflicts: None,
            error: Some(error),
        }
    }
}

fn push_failure_message(kind: SyncErrorKind, error: &GitSyncError) -> String {
    match kind {
        SyncErrorKind::Conflict => format!(
            "Push rejected: the remote has commits that are not present locally, pull first and retry ({error})"
        ),
        SyncErrorKind::Auth => format!(
            "Authentication failed during push, check that your credential is valid and has write access ({error})"
        ),
        SyncErrorKind::Network => format!(
            "Network error during push, your commits are safe locally and can be pushed later ({error})"
        ),
        SyncErrorKind::Other => format!("Push failed: {error}"),
    }
}

fn pull_failure_message(kind: SyncErrorKind, error: &GitSyncError) -> String {
    match kind {
        SyncErrorKind::Conflict => format!("Pull rejected by the remote: {error}"),
        SyncErrorKind::Auth => format!(
            "Authentication failed during pull, check that your credential is valid ({error})"
        ),
        SyncErrorKind::Network => format!(
            "Network error during pull, the local repository is unchanged ({error})"
        ),
        SyncErrorKind::Other => format!("Pull failed: {error}"),
    }
}

impl GitSyncService {
    /// Push local commits to the configured remote.
    ///
    /// With nothing ahead this returns `{success, pushed: 0}` without any
    /// network call.
    pub async fn push(
        &self,
        workflow_id: &str,
        user_id: &str,
        options: PushOptions,
    ) -> Result<PushOutcome> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_connected(workflow_id, user_id)?;
        if config.repository_url.is_none() {
            return Err(GitSyncError::config(format!(
                "No remote URL configured for workflow {workflow_id}"
            )));
        }
        let repo = self.open_repo(&config)?;
        // Resolved fresh on every push: a token refresh may have happened
        // since the last operation.
        let auth = self.resolve_auth(&config, user_id).await?;

        let remote = options.remote.as_deref().unwrap_or(&config.remote_name);
        let branch = options.branch.as_deref().unwrap_or(&config.branch);

        let ahead = repo.ahead_count(branch, remote)?;
        if ahead == 0 {
            return Ok(PushOutcome {
                success: true,
                pushed: 0,
                error: None,
            });
        }

        match repo.push_branch(remote, branch, options.force, Some(&auth)) {
            Ok(()) => {
                self.store().update(workflow_id, user_id, |row| {
                    row.unpushed_commits = 0;
                    row.last_sync_at = Some(chrono::Utc::now());
                    row.last_error = None;
                })?;
                info!("Pushed {ahead} commit(s) for workflow {workflow_id}");
                Ok(PushOutcome {
                    success: true,
                    pushed: ahead,
                    error: None,
                })
            }
            Err(e) => {
                let kind = SyncErrorKind::classify(&e);
                let message = push_failure_message(kind, &e);
                warn!("Push failed ({kind:?}) for workflow {workflow_id}: {e}");
                self.store().update(workflow_id, user_id, |row| {
                    row.last_error = Some(message.clone());
                })?;
                Ok(PushOutcome {
                    success: false,
                    pushed: 0,
                    error: Some(message),
                })
            }
        }
    }

    /// Pull remote commits into the local branch.
    ///
    /// Refuses when the working tree is dirty. Fetch failures come back as
    /// a failed result; merge conflicts are reported with the conflicting
    /// paths. On success the updated workflow is re-read through the
    /// serializer so the caller can hydrate in-memory state.
    pub async fn pull(
        &self,
        workflow_id: &str,
        user_id: &str,
        options: PullOptions,
    ) -> Result<PullOutcome> {
        let _guard = self.lock_repo(workflow_id, user_id).await;

        let config = self.require_connected(workflow_id, user_id)?;
        if config.repository_url.is_none() {
            return Err(GitSyncError::config(format!(
                "No remote URL configured for workflow {workflow_id}"
            )));
        }
        let repo = self.open_repo(&config)?;

        if !repo.status_changes(None)?.is_empty() {
            return Err(GitSyncError::config(
                "Working tree has uncommitted changes, commit or discard them first",
            ));
        }

        let auth = self.resolve_auth(&config, user_id).await?;
        let remote = options
            .remote
            .as_deref()
            .unwrap_or(&config.remote_name)
            .to_string();
        let branch = options
            .branch
            .as_deref()
            .unwrap_or(&config.branch)
            .to_string();

        if let Err(e) = repo.fetch_branch(&remote, &branch, Some(&auth)) {
            let kind = SyncErrorKind::classify(&e);
            let message = pull_failure_message(kind, &e);
            warn!("Fetch failed ({kind:?}) for workflow {workflow_id}: {e}");
            self.store().update(workflow_id, user_id, |row| {
                row.last_error = Some(message.clone());
            })?;
            return Ok(PullOutcome::failure(message));
        }

        let incoming = repo.incoming_commits(&branch, &remote)?;
        if incoming.is_empty() {
            return Ok(PullOutcome {
                success: true,
                commits: Vec::new(),
                workflow: None,
                conflicts: None,
                error: None,
            });
        }

        if options.strategy == MergeStrategy::Rebase {
            warn!("Rebase strategy requested but not supported, performing a merge instead");
        }

        let (author, email) = Self::author_identity(user_id);
        let outcome = match repo.merge_remote_branch(&remote, &branch, &author, &email) {
            Ok(outcome) => outcome,
            Err(e) => {
                let kind = SyncErrorKind::classify(&e);
                let message = pull_failure_message(kind, &e);
                warn!("Merge failed ({kind:?}) for workflow {workflow_id}: {e}");
                self.store().update(workflow_id, user_id, |row| {
                    row.last_error = Some(message.clone());
                })?;
                return Ok(PullOutcome::failure(message));
            }
        };

        if let MergeOutcome::Conflicts(paths) = outcome {
            let conflicts = if paths.is_empty() {
                vec!["merge conflict".to_string()]
            } else {
                paths
            };
            let message = format!(
                "Merge conflict in: {}. Resolve the conflict and commit before pulling again",
                conflicts.join(", ")
            );
            self.store().update(workflow_id, user_id, |row| {
                row.last_error = Some(message.clone());
            })?;
            return Ok(PullOutcome {
                success: false,
                commits: incoming,
                workflow: None,
                conflicts: Some(conflicts),
                error: Some(message),
            });
        }

        let workflow = repo
            .read_workdir_files()
            .ok()
            .and_then(|files| self.serializer().files_to_workflow(&files).ok());

        let head = repo.head_commit_hash().ok();
        self.store().update(workflow_id, user_id, |row| {
            row.last_sync_at = Some(chrono::Utc::now());
            row.last_commit_hash = head.clone();
            row.last_error = None;
        })?;

        info!(
            "Pulled {} commit(s) for workflow {workflow_id}",
            incoming.len()
        );
        Ok(PullOutcome {
            success: true,
            commits: incoming,
            workflow,
            conflicts: None,
            error: None,
        })
    }
}
