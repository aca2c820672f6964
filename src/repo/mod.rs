//! Read-only inspection of the local working copy.
//!
//! Every query degrades toward "don't block": an unreadable status is a
//! clean tree, an unknown upstream has zero unpushed commits, and a conflict
//! probe that cannot run finds no conflicts. The one exception is a probe
//! that *detects* a conflict but cannot name the files; it reports
//! [`UNKNOWN_CONFLICT_PATH`] instead of hiding the conflict.

pub mod git;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::testing::GitOperations;

pub use git::GitCli;

/// Remote that tracking branches and the default branch are read from.
pub const REMOTE: &str = "origin";

/// Default branch candidates, probed in order.
pub const DEFAULT_BRANCH_CANDIDATES: &[&str] = &["main", "master"];

/// Default branch assumed when none of the candidates exists on the remote.
pub const FALLBACK_DEFAULT_BRANCH: &str = "main";

/// Reported in place of file names when a conflict is detected but unparseable.
pub const UNKNOWN_CONFLICT_PATH: &str = "(unable to determine specific files)";

/// Snapshot of the working copy taken once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub branch: String,
    /// `git status --porcelain` lines, blank lines removed.
    pub uncommitted_changes: Vec<String>,
    pub unpushed_commit_count: u32,
    pub default_branch: String,
    /// Files that would conflict when merging the default branch; empty when none are known.
    pub conflicting_paths: Vec<String>,
}

impl RepoState {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.uncommitted_changes.is_empty()
    }

    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicting_paths.is_empty()
    }
}

/// Walk up from `start` to the directory containing `.git`.
///
/// Falls back to `start` itself when no repository marker is found.
#[must_use]
pub fn find_repo_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
        .unwrap_or(start)
}

/// Check if `path` is inside a git repository.
#[must_use]
pub fn is_git_repo(path: &Path) -> bool {
    find_repo_root(path).join(".git").exists()
}

/// Extract file paths from `git merge-tree` conflict lines.
///
/// Lines look like `CONFLICT (content): Merge conflict in src/lib.rs`; the
/// path is everything after the first ` in `.
#[must_use]
pub fn parse_conflict_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("CONFLICT"))
        .filter_map(|line| line.split_once(" in "))
        .map(|(_, path)| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect()
}

/// Queries the working copy through a [`GitOperations`] implementation,
/// mapping each failure to its fallback value.
#[derive(Clone)]
pub struct RepoInspector {
    git: Arc<dyn GitOperations>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for RepoInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoInspector")
            .field("git", &"<dyn GitOperations>")
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl RepoInspector {
    #[must_use]
    pub fn new(git: Arc<dyn GitOperations>, fetch_timeout: Duration) -> Self {
        Self { git, fetch_timeout }
    }

    /// Current branch, or an empty string when it cannot be determined.
    ///
    /// A detached HEAD counts as undetermined.
    pub async fn current_branch(&self, root: &Path) -> String {
        match self.git.current_branch(root).await {
            Ok(branch) if branch == "HEAD" => {
                debug!("Detached HEAD in {}", root.display());
                String::new()
            }
            Ok(branch) => branch,
            Err(e) => {
                debug!("Could not read current branch: {e:#}");
                String::new()
            }
        }
    }

    /// First of `main`/`master` present on the remote, else `main`.
    pub async fn default_branch_name(&self, root: &Path) -> String {
        for candidate in DEFAULT_BRANCH_CANDIDATES {
            let remote_ref = format!("{REMOTE}/{candidate}");
            match self.git.ref_exists(root, &remote_ref).await {
                Ok(true) => return (*candidate).to_string(),
                Ok(false) => {}
                Err(e) => debug!("Could not verify {remote_ref}: {e:#}"),
            }
        }
        FALLBACK_DEFAULT_BRANCH.to_string()
    }

    /// Porcelain status lines; empty means clean or unreadable.
    pub async fn uncommitted_changes(&self, root: &Path) -> Vec<String> {
        match self.git.status_porcelain(root).await {
            Ok(status) => status
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!("git status failed, treating tree as clean: {e:#}");
                Vec::new()
            }
        }
    }

    /// Commits on HEAD missing from `origin/<branch>`; 0 when there is no upstream.
    pub async fn unpushed_commit_count(&self, root: &Path, branch: &str) -> u32 {
        let remote_branch = format!("{REMOTE}/{branch}");
        match self.git.ref_exists(root, &remote_branch).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{remote_branch} does not exist; nothing counted as unpushed");
                return 0;
            }
            Err(e) => {
                debug!("Could not verify {remote_branch}: {e:#}");
                return 0;
            }
        }

        self.git
            .count_commits(root, &format!("{remote_branch}..HEAD"))
            .await
            .unwrap_or_else(|e| {
                warn!("Could not count unpushed commits: {e:#}");
                0
            })
    }

    /// Files that would conflict when merging the fetched default branch.
    ///
    /// Empty when on the default branch, already up to date with it, merging
    /// cleanly, or when any step fails.
    pub async fn conflict_probe(&self, root: &Path, branch: &str, default_branch: &str) -> Vec<String> {
        if branch == default_branch {
            return Vec::new();
        }

        if let Err(e) = self
            .git
            .fetch(root, REMOTE, default_branch, self.fetch_timeout)
            .await
        {
            warn!("Skipping conflict check, fetch of {default_branch} failed: {e:#}");
            return Vec::new();
        }

        let upstream = format!("{REMOTE}/{default_branch}");
        match self.git.is_ancestor(root, &upstream, "HEAD").await {
            Ok(true) => {
                debug!("{upstream} already merged into {branch}");
                return Vec::new();
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Skipping conflict check, merge-base failed: {e:#}");
                return Vec::new();
            }
        }

        match self.git.merge_tree(root, "HEAD", &upstream).await {
            Ok(outcome) if outcome.clean => Vec::new(),
            Ok(outcome) => {
                let paths = parse_conflict_paths(&outcome.output);
                if paths.is_empty() {
                    warn!("Merge conflict detected but no file names could be parsed");
                    vec![UNKNOWN_CONFLICT_PATH.to_string()]
                } else {
                    paths
                }
            }
            Err(e) => {
                warn!("Skipping conflict check, merge-tree failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Take the full snapshot for `branch`.
    pub async fn inspect(&self, root: &Path, branch: &str) -> RepoState {
        let default_branch = self.default_branch_name(root).await;
        let conflicting_paths = self.conflict_probe(root, branch, &default_branch).await;
        let uncommitted_changes = self.uncommitted_changes(root).await;
        let unpushed_commit_count = self.unpushed_commit_count(root, branch).await;

        RepoState {
            branch: branch.to_string(),
            uncommitted_changes,
            unpushed_commit_count,
            default_branch,
            conflicting_paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MergeTreeOutcome, MockGitOperations};
    use tempfile::TempDir;

    fn inspector(git: MockGitOperations) -> RepoInspector {
        RepoInspector::new(Arc::new(git), Duration::from_secs(30))
    }

    fn root() -> PathBuf {
        PathBuf::from("/work/widgets")
    }

    // =========================================================================
    // Repository root discovery
    // =========================================================================

    #[test]
    fn test_find_repo_root_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        let nested = temp.path().join("src/deep/er");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_repo_root(&nested);
        assert_eq!(root, temp.path().canonicalize().unwrap());
        assert!(is_git_repo(&nested));
    }

    #[test]
    fn test_find_repo_root_falls_back_to_start() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("plain");
        std::fs::create_dir_all(&dir).unwrap();

        // Only meaningful when the temp dir is not itself inside a repository
        if !is_git_repo(temp.path()) {
            assert_eq!(find_repo_root(&dir), dir.canonicalize().unwrap());
            assert!(!is_git_repo(&dir));
        }
    }

    // =========================================================================
    // Conflict output parsing
    // =========================================================================

    #[test]
    fn test_parse_conflict_paths() {
        let output = "\
4b825dc642cb6eb9a060e54bf8d69288fbee4904
100644 1111111111111111111111111111111111111111 1\tsrc/lib.rs

Auto-merging src/lib.rs
CONFLICT (content): Merge conflict in src/lib.rs
CONFLICT (add/add): Merge conflict in docs/guide.md
";
        let paths = parse_conflict_paths(output);
        assert_eq!(
            paths,
            vec![
                "src/lib.rs".to_string(),
                "docs/guide.md".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_conflict_paths_ignores_non_conflict_lines() {
        assert!(parse_conflict_paths("Auto-merging a.rs\nsome tree id\n").is_empty());
        assert!(parse_conflict_paths("CONFLICT without location\n").is_empty());
    }

    // =========================================================================
    // Branch queries
    // =========================================================================

    #[tokio::test]
    async fn test_current_branch_soft_fails_to_empty() {
        let ok = inspector(MockGitOperations::new().with_branch("feature"));
        assert_eq!(ok.current_branch(&root()).await, "feature");

        let failing = inspector(MockGitOperations::new().with_branch_error("not a repo"));
        assert_eq!(failing.current_branch(&root()).await, "");

        let detached = inspector(MockGitOperations::new().with_branch("HEAD"));
        assert_eq!(detached.current_branch(&root()).await, "");
    }

    #[tokio::test]
    async fn test_default_branch_prefers_main_then_master() {
        let both = inspector(
            MockGitOperations::new()
                .with_ref("origin/main")
                .with_ref("origin/master"),
        );
        assert_eq!(both.default_branch_name(&root()).await, "main");

        let master = inspector(MockGitOperations::new().with_ref("origin/master"));
        assert_eq!(master.default_branch_name(&root()).await, "master");

        let neither = inspector(MockGitOperations::new());
        assert_eq!(neither.default_branch_name(&root()).await, "main");
    }

    // =========================================================================
    // Working tree
    // =========================================================================

    #[tokio::test]
    async fn test_uncommitted_changes_drops_blank_lines() {
        let git = MockGitOperations::new().with_status(" M src/lib.rs\n\n?? notes.txt\n");
        let changes = inspector(git).uncommitted_changes(&root()).await;
        assert_eq!(changes, vec![" M src/lib.rs", "?? notes.txt"]);
    }

    #[tokio::test]
    async fn test_uncommitted_changes_failure_is_clean() {
        let git = MockGitOperations::new().with_status_error("index.lock exists");
        assert!(inspector(git).uncommitted_changes(&root()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unpushed_count_requires_remote_branch() {
        let without_remote = MockGitOperations::new().with_commit_count(4);
        assert_eq!(
            inspector(without_remote)
                .unpushed_commit_count(&root(), "feature")
                .await,
            0
        );

        let with_remote = MockGitOperations::new()
            .with_ref("origin/feature")
            .with_commit_count(4);
        assert_eq!(
            inspector(with_remote)
                .unpushed_commit_count(&root(), "feature")
                .await,
            4
        );
    }

    #[tokio::test]
    async fn test_unpushed_count_failure_is_zero() {
        let git = MockGitOperations::new()
            .with_ref("origin/feature")
            .with_count_error("bad revision");
        assert_eq!(
            inspector(git).unpushed_commit_count(&root(), "feature").await,
            0
        );
    }

    // =========================================================================
    // Conflict probe
    // =========================================================================

    #[tokio::test]
    async fn test_conflict_probe_skips_default_branch() {
        let git = MockGitOperations::new()
            .with_merge_tree(MergeTreeOutcome::conflicted("CONFLICT (content): Merge conflict in a"));
        let probe = inspector(git.clone());
        assert!(probe.conflict_probe(&root(), "main", "main").await.is_empty());
        assert_eq!(git.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_conflict_probe_fetch_failure_is_no_conflict() {
        let git = MockGitOperations::new()
            .with_fetch_error("timed out")
            .with_merge_tree(MergeTreeOutcome::conflicted("CONFLICT (content): Merge conflict in a"));
        assert!(inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_conflict_probe_up_to_date_is_no_conflict() {
        let git = MockGitOperations::new()
            .with_ancestor(true)
            .with_merge_tree(MergeTreeOutcome::conflicted("CONFLICT (content): Merge conflict in a"));
        assert!(inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_conflict_probe_clean_merge() {
        let git = MockGitOperations::new().with_merge_tree(MergeTreeOutcome::clean());
        assert!(inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_conflict_probe_reports_paths() {
        let git = MockGitOperations::new().with_merge_tree(MergeTreeOutcome::conflicted(
            "CONFLICT (content): Merge conflict in src/a.rs\nCONFLICT (add/add): Merge conflict in b.md\n",
        ));
        let paths = inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await;
        assert_eq!(paths, vec!["src/a.rs", "b.md"]);
    }

    #[tokio::test]
    async fn test_conflict_probe_unparseable_conflict_uses_sentinel() {
        let git = MockGitOperations::new()
            .with_merge_tree(MergeTreeOutcome::conflicted("something went sideways"));
        let paths = inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await;
        assert_eq!(paths, vec![UNKNOWN_CONFLICT_PATH]);
    }

    #[tokio::test]
    async fn test_conflict_probe_merge_tree_error_is_no_conflict() {
        let git = MockGitOperations::new().with_merge_tree_error("unknown option --write-tree");
        assert!(inspector(git)
            .conflict_probe(&root(), "feature", "main")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_inspect_builds_full_snapshot() {
        let git = MockGitOperations::new()
            .with_ref("origin/master")
            .with_ref("origin/feature")
            .with_status("?? scratch.txt")
            .with_commit_count(2)
            .with_merge_tree(MergeTreeOutcome::clean());

        let state = inspector(git).inspect(&root(), "feature").await;
        assert_eq!(state.branch, "feature");
        assert_eq!(state.default_branch, "master");
        assert_eq!(state.uncommitted_changes, vec!["?? scratch.txt"]);
        assert_eq!(state.unpushed_commit_count, 2);
        assert!(!state.has_conflicts());
        assert!(!state.is_clean());
    }
}
