pub mod changes;
pub mod repository;

pub use changes::{ChangeType, FileChange, IndexState, Presence, WorkdirState};
pub use repository::{GitRepository, MergeOutcome};

use crate::errors::{GitSyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Commit metadata surfaced to callers (changelogs, branch listings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Validate a remote repository URL.
///
/// Accepted: `https://host/path/repo.git`, `https://host/path/repo` and the
/// SSH form `git@host:path/repo.git`. Protocol-less hosts and empty strings
/// are rejected.
pub fn validate_repository_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(GitSyncError::validation("Repository URL must not be empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(GitSyncError::validation(
            "Repository URL must not contain whitespace",
        ));
    }

    if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':').ok_or_else(|| {
            GitSyncError::validation(format!("Invalid SSH repository URL: {url}"))
        })?;
        if host.is_empty() || path.is_empty() || !path.ends_with(".git") {
            return Err(GitSyncError::validation(format!(
                "Invalid SSH repository URL: {url}"
            )));
        }
        return Ok(());
    }

    if url.starts_with("https://") {
        let parsed = Url::parse(url)?;
        let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
        let has_path = parsed.path().trim_matches('/').contains(|c| c != '/');
        if has_host && has_path {
            return Ok(());
        }
        return Err(GitSyncError::validation(format!(
            "Invalid repository URL: {url}"
        )));
    }

    Err(GitSyncError::validation(format!(
        "Repository URL must use https:// or the git@host:path.git SSH form: {url}"
    )))
}

/// Validate a branch name against Git ref rules.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(GitSyncError::branch(format!(
            "Invalid branch name '{name}': {reason}"
        )))
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return invalid("contains whitespace or a forbidden character");
    }
    if name.starts_with('.') || name.ends_with('.') || name.starts_with('/') || name.ends_with('/')
    {
        return invalid("must not start or end with '.' or '/'");
    }
    if name.contains("..") {
        return invalid("must not contain consecutive dots");
    }
    if name.contains("@{") {
        return invalid("must not contain '@{'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validator_accepts_supported_forms() {
        validate_repository_url("https://github.com/acme/flows.git").unwrap();
        validate_repository_url("https://github.com/acme/flows").unwrap();
        validate_repository_url("git@github.com:acme/flows.git").unwrap();
        validate_repository_url("https://gitlab.example.com/group/sub/repo.git").unwrap();
    }

    #[test]
    fn test_url_validator_rejects_bad_forms() {
        assert!(validate_repository_url("").is_err());
        assert!(validate_repository_url("github.com/acme/flows").is_err());
        assert!(validate_repository_url("http://github.com/acme/flows").is_err());
        assert!(validate_repository_url("git@github.com/acme/flows.git").is_err());
        assert!(validate_repository_url("git@github.com:acme/flows").is_err());
        assert!(validate_repository_url("https://github.com").is_err());
        assert!(validate_repository_url("https://github.com/a b/c.git").is_err());
    }

    #[test]
    fn test_branch_name_validator() {
        validate_branch_name("valid-branch").unwrap();
        validate_branch_name("feat/new-thing").unwrap();
        validate_branch_name("release-1.2.3").unwrap();

        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("feat new").is_err());
        assert!(validate_branch_name("feat/new..thing").is_err());
        assert!(validate_branch_name(".hidden").is_err());
        assert!(validate_branch_name("trailing.").is_err());
        assert!(validate_branch_name("/leading").is_err());
        assert!(validate_branch_name("trailing/").is_err());
        assert!(validate_branch_name("what~ever").is_err());
        assert!(validate_branch_name("star*name").is_err());
        assert!(validate_branch_name("ref@{1}").is_err());
        assert!(validate_branch_name("back\\slash").is_err());
    }
}
