use crate::credentials::AuthScheme;
use crate::errors::{GitSyncError, Result};
use crate::git::changes::{classify, is_excluded, states_from_status, FileChange};
use crate::git::CommitSummary;
use chrono::{DateTime, Utc};
use git2::{
    build::CheckoutBuilder, BranchType, Direction, FetchOptions, Oid, PushOptions,
    RemoteCallbacks, Repository, RepositoryInitOptions, Signature, StatusOptions,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of merging a remote-tracking branch into the current branch.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    UpToDate,
    FastForward(String),
    Merged(String),
    Conflicts(Vec<String>),
}

/// Wrapper around git2::Repository with safe operations
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Initialize an empty repository with `main` as the initial branch.
    pub fn init(path: &Path, initial_branch: &str) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(initial_branch);
        let repo = Repository::init_opts(path, &opts)
            .map_err(|e| GitSyncError::config(format!("Could not initialize repository: {e}")))?;

        info!("Initialized repository at {}", path.display());
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing repository at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .map_err(|e| GitSyncError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| GitSyncError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current branch name.
    pub fn current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitSyncError::branch(format!("Could not get HEAD: {e}")))?;

        if let Some(name) = head.shorthand() {
            Ok(name.to_string())
        } else {
            let commit = head
                .peel_to_commit()
                .map_err(|e| GitSyncError::branch(format!("Could not get HEAD commit: {e}")))?;
            Ok(format!("HEAD@{}", commit.id()))
        }
    }

    /// Get the HEAD commit hash. Errors on an unborn branch.
    pub fn head_commit_hash(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitSyncError::branch(format!("Could not get HEAD: {e}")))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| GitSyncError::branch(format!("Could not get HEAD commit: {e}")))?;
        Ok(commit.id().to_string())
    }

    /// Whether the current branch has any commits yet.
    pub fn has_commits(&self) -> bool {
        self.repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .is_ok()
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> bool {
        self.repo
            .refname_to_id(&format!("refs/remotes/{remote}/{branch}"))
            .is_ok()
    }

    pub fn commit_exists(&self, commit_hash: &str) -> bool {
        Oid::from_str(commit_hash)
            .ok()
            .and_then(|oid| self.repo.find_commit(oid).ok())
            .is_some()
    }

    /// List all local branch names.
    pub fn list_local_branches(&self) -> Result<Vec<String>> {
        let branches = self.repo.branches(Some(BranchType::Local))?;
        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// List branch names on the given remote (without the remote prefix).
    pub fn list_remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        let prefix = format!("{remote}/");
        let branches = self.repo.branches(Some(BranchType::Remote))?;
        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                if let Some(short) = name.strip_prefix(&prefix) {
                    if short != "HEAD" {
                        names.push(short.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Commit metadata for an arbitrary commit id.
    pub fn commit_summary(&self, oid: Oid) -> Result<CommitSummary> {
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| GitSyncError::not_found(format!("Could not find commit '{oid}': {e}")))?;

        let timestamp = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or_else(Utc::now);
        let hash = oid.to_string();
        let summary = CommitSummary {
            short_hash: hash[..8].to_string(),
            hash,
            message: commit.summary().unwrap_or_default().to_string(),
            author: commit.author().name().unwrap_or_default().to_string(),
            timestamp,
        };
        Ok(summary)
    }

    /// Best-effort tip metadata for a fully qualified ref.
    pub fn ref_tip_summary(&self, refname: &str) -> Option<CommitSummary> {
        let oid = self.repo.refname_to_id(refname).ok()?;
        self.commit_summary(oid).ok()
    }

    /// Scan working-tree status and classify each path, applying the
    /// standard exclusions.
    pub fn status_changes(&self, active_env: Option<&str>) -> Result<Vec<FileChange>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut changes = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            if is_excluded(path, active_env) {
                continue;
            }

            let (head, workdir, index) = states_from_status(entry.status());
            if let Some((change, staged)) = classify(head, workdir, index) {
                changes.push(FileChange {
                    path: path.to_string(),
                    change,
                    staged,
                });
            }
        }

        Ok(changes)
    }

    /// Whether the working tree has uncommitted changes (after exclusions).
    pub fn is_dirty(&self, active_env: Option<&str>) -> Result<bool> {
        Ok(!self.status_changes(active_env)?.is_empty())
    }

    /// Write a file set into the working tree. Returns the written paths.
    pub fn write_files(&self, files: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let target = self.path.join(name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, content)?;
            written.push(name.clone());
        }
        Ok(written)
    }

    /// Read every file in the working tree (excluding VCS metadata).
    pub fn read_workdir_files(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        self.collect_files(&self.path, &mut files)?;
        Ok(files)
    }

    fn collect_files(&self, dir: &Path, files: &mut BTreeMap<String, String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if name == ".git" {
                continue;
            }
            if path.is_dir() {
                self.collect_files(&path, files)?;
            } else if let Ok(content) = std::fs::read_to_string(&path) {
                let relative = path
                    .strip_prefix(&self.path)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                files.insert(relative, content);
            }
        }
        Ok(())
    }

    /// Stage the given paths, handling deletions as removals.
    pub fn stage_paths(&self, paths: &[String]) -> Result<()> {
        let mut index = self.repo.index()?;
        for path in paths {
            let rel = Path::new(path);
            if self.path.join(rel).exists() {
                index.add_path(rel)?;
            } else {
                index.remove_path(rel)?;
            }
        }
        index.write()?;
        debug!("Staged {} path(s)", paths.len());
        Ok(())
    }

    /// Create a commit from the current index. Handles the first commit on an
    /// unborn branch (no parents).
    pub fn commit_staged(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<String> {
        let signature = Signature::now(author_name, author_email)
            .map_err(|e| GitSyncError::config(format!("Invalid author identity: {e}")))?;

        let tree_id = {
            let mut index = self.repo.index()?;
            index.write_tree()?
        };
        let tree = self.repo.find_tree(tree_id)?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let commit_id = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        info!("Created commit: {} - {}", commit_id, message);
        Ok(commit_id.to_string())
    }

    /// Add or repoint a named remote.
    pub fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.repo.find_remote(name).is_ok() {
            self.repo.remote_set_url(name, url)?;
        } else {
            self.repo.remote(name, url)?;
        }
        debug!("Remote '{name}' set to {url}");
        Ok(())
    }

    /// Remove a named remote. Absence is not an error.
    pub fn remove_remote(&self, name: &str) -> Result<()> {
        if self.repo.find_remote(name).is_ok() {
            self.repo.remote_delete(name)?;
            debug!("Removed remote '{name}'");
        }
        Ok(())
    }

    /// Connection pre-flight: list refs advertised by a remote URL. Returns
    /// the number of refs.
    pub fn list_remote_refs(&self, url: &str, auth: Option<&AuthScheme>) -> Result<usize> {
        let mut remote = self.repo.remote_anonymous(url)?;
        let connection = remote.connect_auth(Direction::Fetch, Some(remote_callbacks(auth)), None)?;
        let count = connection.list()?.len();
        drop(connection);
        debug!("Remote {url} advertised {count} ref(s)");
        Ok(count)
    }

    /// Fetch a single branch from the named remote, updating its
    /// remote-tracking ref.
    pub fn fetch_branch(&self, remote: &str, branch: &str, auth: Option<&AuthScheme>) -> Result<()> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
        let mut remote = self.repo.find_remote(remote)?;
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(remote_callbacks(auth));
        remote.fetch(&[&refspec], Some(&mut opts), None)?;
        debug!("Fetched branch '{branch}'");
        Ok(())
    }

    /// Push a branch to the named remote.
    pub fn push_branch(
        &self,
        remote: &str,
        branch: &str,
        force: bool,
        auth: Option<&AuthScheme>,
    ) -> Result<()> {
        let mut remote = self.repo.find_remote(remote)?;

        let mut callbacks = remote_callbacks(auth);
        // Surface per-ref rejections (e.g. non-fast-forward) as errors.
        callbacks.push_update_reference(|refname, status| match status {
            Some(msg) => Err(git2::Error::from_str(&format!(
                "push of {refname} rejected: {msg}"
            ))),
            None => Ok(()),
        });

        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);

        let prefix = if force { "+" } else { "" };
        let refspec = format!("{prefix}refs/heads/{branch}:refs/heads/{branch}");
        remote.push(&[&refspec], Some(&mut opts))?;
        info!("Pushed branch '{branch}'");
        Ok(())
    }

    /// Commit ids reachable from a fully qualified ref, or `None` if the ref
    /// does not exist.
    fn ref_commit_ids(&self, refname: &str) -> Result<Option<HashSet<Oid>>> {
        let oid = match self.repo.refname_to_id(refname) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        let mut walk = self.repo.revwalk()?;
        walk.push(oid)?;
        let mut ids = HashSet::new();
        for id in walk {
            ids.insert(id?);
        }
        Ok(Some(ids))
    }

    /// Count of local commits absent from the remote branch. A missing
    /// remote branch means every local commit is ahead.
    pub fn ahead_count(&self, branch: &str, remote: &str) -> Result<usize> {
        let local = self
            .ref_commit_ids(&format!("refs/heads/{branch}"))?
            .unwrap_or_default();
        let remote = self
            .ref_commit_ids(&format!("refs/remotes/{remote}/{branch}"))?
            .unwrap_or_default();
        Ok(local.difference(&remote).count())
    }

    /// Count of remote commits absent locally. A missing remote branch
    /// yields 0.
    pub fn behind_count(&self, branch: &str, remote: &str) -> Result<usize> {
        let Some(remote_ids) = self.ref_commit_ids(&format!("refs/remotes/{remote}/{branch}"))?
        else {
            return Ok(0);
        };
        let local = self
            .ref_commit_ids(&format!("refs/heads/{branch}"))?
            .unwrap_or_default();
        Ok(remote_ids.difference(&local).count())
    }

    /// Summaries for commits on the remote branch that are absent locally,
    /// newest first.
    pub fn incoming_commits(&self, branch: &str, remote: &str) -> Result<Vec<CommitSummary>> {
        let remote_ref = format!("refs/remotes/{remote}/{branch}");
        let Some(_) = self.ref_commit_ids(&remote_ref)? else {
            return Ok(Vec::new());
        };
        let local = self
            .ref_commit_ids(&format!("refs/heads/{branch}"))?
            .unwrap_or_default();

        let mut walk = self.repo.revwalk()?;
        walk.push(self.repo.refname_to_id(&remote_ref)?)?;

        let mut commits = Vec::new();
        for id in walk {
            let id = id?;
            if !local.contains(&id) {
                commits.push(self.commit_summary(id)?);
            }
        }
        Ok(commits)
    }

    /// Point an empty local branch at the remote tip and check it out.
    pub fn fast_set_branch_to_remote(&self, branch: &str, remote: &str) -> Result<()> {
        let oid = self
            .repo
            .refname_to_id(&format!("refs/remotes/{remote}/{branch}"))?;
        self.repo.reference(
            &format!("refs/heads/{branch}"),
            oid,
            true,
            "set branch to remote tip",
        )?;
        self.repo.set_head(&format!("refs/heads/{branch}"))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        info!("Set branch '{branch}' to remote tip {oid}");
        Ok(())
    }

    /// Merge the remote-tracking branch into the current branch.
    pub fn merge_remote_branch(
        &self,
        remote: &str,
        branch: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<MergeOutcome> {
        let remote_ref = format!("refs/remotes/{remote}/{branch}");
        let oid = self.repo.refname_to_id(&remote_ref)?;
        let annotated = self.repo.find_annotated_commit(oid)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }

        if analysis.is_unborn() || analysis.is_fast_forward() {
            self.fast_set_branch_to_remote(branch, remote)?;
            return Ok(MergeOutcome::FastForward(oid.to_string()));
        }

        self.repo.merge(&[&annotated], None, None)?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    paths.push(String::from_utf8_lossy(&entry.path).to_string());
                }
            }
            // Abort the merge and restore the pre-merge working tree.
            self.repo.cleanup_state()?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            return Ok(MergeOutcome::Conflicts(paths));
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let head_commit = self.repo.head()?.peel_to_commit()?;
        let remote_commit = self.repo.find_commit(oid)?;
        let signature = Signature::now(author_name, author_email)
            .map_err(|e| GitSyncError::config(format!("Invalid author identity: {e}")))?;

        let merge_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge remote-tracking branch '{remote}/{branch}'"),
            &tree,
            &[&head_commit, &remote_commit],
        )?;
        self.repo.cleanup_state()?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;

        info!("Merged '{remote}/{branch}' as {merge_id}");
        Ok(MergeOutcome::Merged(merge_id.to_string()))
    }

    /// Create a branch at HEAD or at a given target commit/ref.
    pub fn create_branch(&self, name: &str, target: Option<&str>) -> Result<()> {
        let target_commit = if let Some(target) = target {
            let obj = self.repo.revparse_single(target).map_err(|e| {
                GitSyncError::branch(format!("Could not find target '{target}': {e}"))
            })?;
            obj.peel_to_commit().map_err(|e| {
                GitSyncError::branch(format!("Target '{target}' is not a commit: {e}"))
            })?
        } else {
            let head = self
                .repo
                .head()
                .map_err(|e| GitSyncError::branch(format!("Could not get HEAD: {e}")))?;
            head.peel_to_commit()
                .map_err(|e| GitSyncError::branch(format!("Could not get HEAD commit: {e}")))?
        };

        self.repo
            .branch(name, &target_commit, false)
            .map_err(|e| GitSyncError::branch(format!("Could not create branch '{name}': {e}")))?;

        info!("Created branch '{name}'");
        Ok(())
    }

    /// Switch to a local branch.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| GitSyncError::branch(format!("Could not find branch '{name}': {e}")))?;

        let tree = branch.get().peel_to_tree().map_err(|e| {
            GitSyncError::branch(format!("Could not get tree for branch '{name}': {e}"))
        })?;

        self.repo
            .checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(|e| GitSyncError::branch(format!("Could not checkout branch '{name}': {e}")))?;

        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .map_err(|e| GitSyncError::branch(format!("Could not update HEAD to '{name}': {e}")))?;

        info!("Switched to branch '{name}'");
        Ok(())
    }

    /// Checkout a specific commit (detached HEAD).
    pub fn checkout_commit(&self, commit_hash: &str) -> Result<()> {
        let oid = Oid::from_str(commit_hash)?;
        let commit = self.repo.find_commit(oid).map_err(|e| {
            GitSyncError::not_found(format!("Could not find commit '{commit_hash}': {e}"))
        })?;

        let tree = commit.tree().map_err(|e| {
            GitSyncError::branch(format!("Could not get tree for commit '{commit_hash}': {e}"))
        })?;

        self.repo
            .checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(|e| {
                GitSyncError::branch(format!("Could not checkout commit '{commit_hash}': {e}"))
            })?;

        self.repo.set_head_detached(oid).map_err(|e| {
            GitSyncError::branch(format!("Could not update HEAD to commit '{commit_hash}': {e}"))
        })?;

        info!("Checked out commit '{commit_hash}' (detached HEAD)");
        Ok(())
    }

    /// Create a local branch tracking the same-named remote branch and
    /// switch to it.
    pub fn create_tracking_branch(&self, name: &str, remote: &str) -> Result<()> {
        let oid = self
            .repo
            .refname_to_id(&format!("refs/remotes/{remote}/{name}"))
            .map_err(|e| {
                GitSyncError::not_found(format!("No remote branch '{remote}/{name}': {e}"))
            })?;
        let commit = self.repo.find_commit(oid)?;

        let mut branch = self.repo.branch(name, &commit, false).map_err(|e| {
            GitSyncError::branch(format!("Could not create tracking branch '{name}': {e}"))
        })?;
        branch.set_upstream(Some(&format!("{remote}/{name}")))?;

        self.checkout_branch(name)?;
        info!("Created tracking branch '{name}' for '{remote}/{name}'");
        Ok(())
    }
}

/// Build remote callbacks carrying the resolved transport credentials.
fn remote_callbacks(auth: Option<&AuthScheme>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(auth) = auth {
        let username = auth.username.clone();
        let secret = auth.secret.clone();
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            git2::Cred::userpass_plaintext(&username, &secret)
        });
    }
    callbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, GitRepository) {
        let temp_dir = TempDir::new().unwrap();
        let repo = GitRepository::init(temp_dir.path(), "main").unwrap();
        (temp_dir, repo)
    }

    fn write_and_commit(repo: &GitRepository, name: &str, content: &str, message: &str) -> String {
        let mut files = BTreeMap::new();
        files.insert(name.to_string(), content.to_string());
        let written = repo.write_files(&files).unwrap();
        repo.stage_paths(&written).unwrap();
        repo.commit_staged(message, "tester", "tester@workflow.local")
            .unwrap()
    }

    /// Point refs/remotes/origin/<branch> at a commit, simulating a fetched
    /// remote-tracking ref without any network.
    fn set_remote_ref(repo: &GitRepository, branch: &str, oid: &str) {
        let oid = Oid::from_str(oid).unwrap();
        repo.repo
            .reference(
                &format!("refs/remotes/origin/{branch}"),
                oid,
                true,
                "test remote ref",
            )
            .unwrap();
    }

    #[test]
    fn test_init_and_first_commit() {
        let (_tmp, repo) = test_repo();
        assert!(!repo.has_commits());

        let hash = write_and_commit(&repo, "workflow.json", "{}", "Initial commit");
        assert!(repo.has_commits());
        assert_eq!(repo.head_commit_hash().unwrap(), hash);
        assert_eq!(repo.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_status_changes_classification() {
        let (_tmp, repo) = test_repo();
        write_and_commit(&repo, "workflow.json", "{\"v\":1}", "Initial commit");

        // Unstaged modification
        let mut files = BTreeMap::new();
        files.insert("workflow.json".to_string(), "{\"v\":2}".to_string());
        repo.write_files(&files).unwrap();

        // Untracked addition
        files.clear();
        files.insert("notes.txt".to_string(), "hello".to_string());
        repo.write_files(&files).unwrap();

        let changes = repo.status_changes(None).unwrap();
        let modified = changes.iter().find(|c| c.path == "workflow.json").unwrap();
        assert_eq!(modified.change, crate::git::ChangeType::Modified);
        assert!(!modified.staged);

        let added = changes.iter().find(|c| c.path == "notes.txt").unwrap();
        assert_eq!(added.change, crate::git::ChangeType::Added);
        assert!(!added.staged);

        // Staging flips the staged flag
        repo.stage_paths(&["workflow.json".to_string(), "notes.txt".to_string()])
            .unwrap();
        let changes = repo.status_changes(None).unwrap();
        assert!(changes.iter().all(|c| c.staged));
    }

    #[test]
    fn test_status_excludes_readme_and_inactive_env_files() {
        let (_tmp, repo) = test_repo();
        write_and_commit(&repo, "workflow.json", "{}", "Initial commit");

        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), "# readme".to_string());
        files.insert("workflow-production.json".to_string(), "{}".to_string());
        files.insert("workflow-staging.json".to_string(), "{}".to_string());
        repo.write_files(&files).unwrap();

        let changes = repo.status_changes(Some("staging")).unwrap();
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert!(!paths.contains(&"README.md"));
        assert!(!paths.contains(&"workflow-production.json"));
        assert!(paths.contains(&"workflow-staging.json"));
    }

    #[test]
    fn test_staged_deletion() {
        let (_tmp, repo) = test_repo();
        write_and_commit(&repo, "workflow.json", "{}", "Initial commit");

        std::fs::remove_file(repo.path().join("workflow.json")).unwrap();
        repo.stage_paths(&["workflow.json".to_string()]).unwrap();

        let changes = repo.status_changes(None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change, crate::git::ChangeType::Deleted);
        assert!(changes[0].staged);
    }

    #[test]
    fn test_ahead_behind_counts() {
        let (_tmp, repo) = test_repo();
        let c1 = write_and_commit(&repo, "workflow.json", "1", "c1");

        // No remote branch yet: everything local is ahead, nothing behind
        assert_eq!(repo.ahead_count("main", "origin").unwrap(), 1);
        assert_eq!(repo.behind_count("main", "origin").unwrap(), 0);

        set_remote_ref(&repo, "main", &c1);
        assert_eq!(repo.ahead_count("main", "origin").unwrap(), 0);
        assert_eq!(repo.behind_count("main", "origin").unwrap(), 0);

        write_and_commit(&repo, "workflow.json", "2", "c2");
        write_and_commit(&repo, "workflow.json", "3", "c3");
        assert_eq!(repo.ahead_count("main", "origin").unwrap(), 2);
        assert_eq!(repo.behind_count("main", "origin").unwrap(), 0);

        // Move the remote ref to the tip and rewind the local view: behind
        let tip = repo.head_commit_hash().unwrap();
        set_remote_ref(&repo, "main", &tip);
        repo.repo
            .reference("refs/heads/main", Oid::from_str(&c1).unwrap(), true, "rewind")
            .unwrap();
        assert_eq!(repo.ahead_count("main", "origin").unwrap(), 0);
        assert_eq!(repo.behind_count("main", "origin").unwrap(), 2);
    }

    #[test]
    fn test_incoming_commits_listing() {
        let (_tmp, repo) = test_repo();
        let c1 = write_and_commit(&repo, "workflow.json", "1", "c1");
        let _c2 = write_and_commit(&repo, "workflow.json", "2", "second change");
        let tip = repo.head_commit_hash().unwrap();

        set_remote_ref(&repo, "main", &tip);
        repo.repo
            .reference("refs/heads/main", Oid::from_str(&c1).unwrap(), true, "rewind")
            .unwrap();

        let incoming = repo.incoming_commits("main", "origin").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].message, "second change");
        assert_eq!(incoming[0].author, "tester");
    }

    #[test]
    fn test_branch_create_checkout_and_list() {
        let (_tmp, repo) = test_repo();
        write_and_commit(&repo, "workflow.json", "{}", "Initial commit");

        repo.create_branch("feature", None).unwrap();
        assert!(repo.branch_exists("feature"));
        assert!(!repo.branch_exists("ghost"));

        repo.checkout_branch("feature").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "feature");

        let branches = repo.list_local_branches().unwrap();
        assert!(branches.contains(&"main".to_string()));
        assert!(branches.contains(&"feature".to_string()));
    }

    #[test]
    fn test_checkout_commit_detached_and_return() {
        let (_tmp, repo) = test_repo();
        let c1 = write_and_commit(&repo, "workflow.json", "old", "c1");
        write_and_commit(&repo, "workflow.json", "new", "c2");

        repo.checkout_commit(&c1).unwrap();
        let content = std::fs::read_to_string(repo.path().join("workflow.json")).unwrap();
        assert_eq!(content, "old");

        repo.checkout_branch("main").unwrap();
        let content = std::fs::read_to_string(repo.path().join("workflow.json")).unwrap();
        assert_eq!(content, "new");
    }

    #[test]
    fn test_merge_fast_forward_from_remote_ref() {
        let (_tmp, repo) = test_repo();
        let c1 = write_and_commit(&repo, "workflow.json", "1", "c1");
        write_and_commit(&repo, "workflow.json", "2", "c2");
        let tip = repo.head_commit_hash().unwrap();

        set_remote_ref(&repo, "main", &tip);
        repo.repo
            .reference("refs/heads/main", Oid::from_str(&c1).unwrap(), true, "rewind")
            .unwrap();
        repo.repo.set_head("refs/heads/main").unwrap();
        repo.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))
            .unwrap();

        let outcome = repo
            .merge_remote_branch("origin", "main", "tester", "tester@workflow.local")
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::FastForward(_)));
        assert_eq!(repo.head_commit_hash().unwrap(), tip);
    }

    #[test]
    fn test_merge_up_to_date() {
        let (_tmp, repo) = test_repo();
        let c1 = write_and_commit(&repo, "workflow.json", "1", "c1");
        set_remote_ref(&repo, "main", &c1);

        let outcome = repo
            .merge_remote_branch("origin", "main", "tester", "tester@workflow.local")
            .unwrap();
        assert!(matches!(outcome, MergeOutcome::UpToDate));
    }

    #[test]
    fn test_remote_management() {
        let (_tmp, repo) = test_repo();
        repo.set_remote("origin", "https://example.com/a/b.git").unwrap();
        repo.set_remote("origin", "https://example.com/a/c.git").unwrap();
        repo.remove_remote("origin").unwrap();
        // Absence is not an error
        repo.remove_remote("origin").unwrap();
    }

    #[test]
    fn test_commit_summary_metadata() {
        let (_tmp, repo) = test_repo();
        let hash = write_and_commit(&repo, "workflow.json", "{}", "Add workflow");

        let summary = repo.commit_summary(Oid::from_str(&hash).unwrap()).unwrap();
        assert_eq!(summary.hash, hash);
        assert_eq!(summary.short_hash.len(), 8);
        assert_eq!(summary.message, "Add workflow");
        assert_eq!(summary.author, "tester");
    }
}
