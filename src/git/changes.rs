//! Working-tree change classification.
//!
//! The core is a pure function over per-file presence codes (HEAD, working
//! tree, index); the git2 status scan in `repository.rs` maps libgit2 status
//! flags into these codes so the classification itself stays table-driven
//! and testable.

use crate::workflow::{workflow_file_env, README_FILE};
use serde::{Deserialize, Serialize};

/// Whether a path exists in HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Absent,
    Present,
}

/// Working-tree content relative to HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirState {
    Absent,
    Unchanged,
    Modified,
}

/// Index content relative to HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Unchanged,
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A classified change for one tracked path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(rename = "type")]
    pub change: ChangeType,
    pub staged: bool,
}

/// Classify one path's three-way status. Returns `None` for unchanged paths.
pub fn classify(
    head: Presence,
    workdir: WorkdirState,
    index: IndexState,
) -> Option<(ChangeType, bool)> {
    match head {
        Presence::Absent => match (workdir, index) {
            (WorkdirState::Absent, IndexState::Staged) => Some((ChangeType::Added, true)),
            (WorkdirState::Absent, _) => None,
            (_, IndexState::Staged) => Some((ChangeType::Added, true)),
            (_, _) => Some((ChangeType::Added, false)),
        },
        Presence::Present => match (workdir, index) {
            // Removed from the index: a staged deletion, whatever the
            // working tree holds.
            (_, IndexState::Absent) => Some((ChangeType::Deleted, true)),
            (WorkdirState::Absent, _) => Some((ChangeType::Deleted, false)),
            (WorkdirState::Modified, IndexState::Staged) => Some((ChangeType::Modified, true)),
            (WorkdirState::Modified, IndexState::Unchanged) => {
                Some((ChangeType::Modified, false))
            }
            // Staged change with the working tree back at HEAD content:
            // still a staged modification.
            (WorkdirState::Unchanged, IndexState::Staged) => Some((ChangeType::Modified, true)),
            (WorkdirState::Unchanged, IndexState::Unchanged) => None,
        },
    }
}

/// Map libgit2 status flags into presence codes.
pub fn states_from_status(status: git2::Status) -> (Presence, WorkdirState, IndexState) {
    let head = if status.contains(git2::Status::INDEX_DELETED) {
        // A staged deletion implies the path exists in HEAD, even when an
        // untracked workdir copy reports WT_NEW for the same path.
        Presence::Present
    } else if status.intersects(git2::Status::INDEX_NEW | git2::Status::WT_NEW) {
        Presence::Absent
    } else {
        Presence::Present
    };

    let index = if status.contains(git2::Status::INDEX_DELETED) {
        IndexState::Absent
    } else if status.contains(git2::Status::WT_NEW) {
        IndexState::Absent
    } else if status.intersects(git2::Status::INDEX_NEW | git2::Status::INDEX_MODIFIED) {
        IndexState::Staged
    } else {
        IndexState::Unchanged
    };

    let workdir = if status.contains(git2::Status::WT_DELETED) {
        WorkdirState::Absent
    } else if status.intersects(git2::Status::WT_NEW | git2::Status::WT_MODIFIED) {
        WorkdirState::Modified
    } else if status.intersects(git2::Status::INDEX_NEW | git2::Status::INDEX_MODIFIED) {
        // No working-tree delta against the index, so the workdir carries
        // the staged (non-HEAD) content.
        WorkdirState::Modified
    } else {
        WorkdirState::Unchanged
    };

    (head, workdir, index)
}

/// Paths excluded from change detection: the VCS metadata directory, the
/// generated README, and environment-scoped workflow files for environments
/// other than the active one.
pub fn is_excluded(path: &str, active_env: Option<&str>) -> bool {
    if path == README_FILE || path == ".git" || path.starts_with(".git/") {
        return true;
    }
    if let (Some(file_env), Some(active)) = (workflow_file_env(path), active_env) {
        return file_env != active;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_matrix_rows() {
        // head present, workdir modified, index unchanged -> modified, unstaged
        assert_eq!(
            classify(Presence::Present, WorkdirState::Modified, IndexState::Unchanged),
            Some((ChangeType::Modified, false))
        );
        // head absent, workdir present, index staged -> added, staged
        assert_eq!(
            classify(Presence::Absent, WorkdirState::Modified, IndexState::Staged),
            Some((ChangeType::Added, true))
        );
        // head present, workdir absent, index absent -> deleted, staged
        assert_eq!(
            classify(Presence::Present, WorkdirState::Absent, IndexState::Absent),
            Some((ChangeType::Deleted, true))
        );
        // head absent, workdir present, index absent -> added, unstaged
        assert_eq!(
            classify(Presence::Absent, WorkdirState::Modified, IndexState::Absent),
            Some((ChangeType::Added, false))
        );
        // head present, workdir modified, index staged -> modified, staged
        assert_eq!(
            classify(Presence::Present, WorkdirState::Modified, IndexState::Staged),
            Some((ChangeType::Modified, true))
        );
        // staged but reverted in the working tree -> still modified, staged
        assert_eq!(
            classify(Presence::Present, WorkdirState::Unchanged, IndexState::Staged),
            Some((ChangeType::Modified, true))
        );
        // unchanged everywhere -> no change
        assert_eq!(
            classify(Presence::Present, WorkdirState::Unchanged, IndexState::Unchanged),
            None
        );
        // deleted from the working tree only -> deleted, unstaged
        assert_eq!(
            classify(Presence::Present, WorkdirState::Absent, IndexState::Unchanged),
            Some((ChangeType::Deleted, false))
        );
    }

    #[test]
    fn test_states_from_git2_status() {
        assert_eq!(
            states_from_status(git2::Status::WT_NEW),
            (Presence::Absent, WorkdirState::Modified, IndexState::Absent)
        );
        assert_eq!(
            states_from_status(git2::Status::INDEX_NEW),
            (Presence::Absent, WorkdirState::Modified, IndexState::Staged)
        );
        assert_eq!(
            states_from_status(git2::Status::WT_MODIFIED),
            (
                Presence::Present,
                WorkdirState::Modified,
                IndexState::Unchanged
            )
        );
        assert_eq!(
            states_from_status(git2::Status::INDEX_MODIFIED),
            (Presence::Present, WorkdirState::Modified, IndexState::Staged)
        );
        assert_eq!(
            states_from_status(git2::Status::INDEX_DELETED),
            (Presence::Present, WorkdirState::Unchanged, IndexState::Absent)
        );
        assert_eq!(
            states_from_status(git2::Status::WT_DELETED),
            (Presence::Present, WorkdirState::Absent, IndexState::Unchanged)
        );
    }

    #[test]
    fn test_exclusions() {
        assert!(is_excluded("README.md", None));
        assert!(is_excluded(".git/config", None));
        assert!(!is_excluded("workflow.json", None));
        assert!(!is_excluded("workflow.json", Some("staging")));

        // Sibling environment files are hidden while an environment is active
        assert!(is_excluded("workflow-production.json", Some("staging")));
        assert!(!is_excluded("workflow-staging.json", Some("staging")));
        // With no active environment nothing environment-specific is hidden
        assert!(!is_excluded("workflow-production.json", None));
    }
}
