//! Trait definitions for testable abstractions.
//!
//! These traits abstract the external collaborators of the review loop so
//! that every soft-fail path can be exercised without a real repository,
//! a running review service, or real wall-clock time.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::session::{PendingResponse, SessionRecord};

/// Result of a dry-run three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTreeOutcome {
    /// `true` when the merge would apply cleanly.
    pub clean: bool,
    /// Raw merge-tree output; conflict lines are parsed from here.
    pub output: String,
}

impl MergeTreeOutcome {
    #[must_use]
    pub fn clean() -> Self {
        Self {
            clean: true,
            output: String::new(),
        }
    }

    #[must_use]
    pub fn conflicted(output: impl Into<String>) -> Self {
        Self {
            clean: false,
            output: output.into(),
        }
    }
}

/// Abstraction for git operations.
///
/// Every method reports failure as an error; deciding what a failure means
/// is the caller's job (see [`crate::repo::RepoInspector`]).
///
/// # Example
///
/// ```rust,ignore
/// use review_loop::testing::GitOperations;
///
/// async fn on_branch(git: &impl GitOperations, root: &Path) -> bool {
///     git.current_branch(root).await.map(|b| !b.is_empty()).unwrap_or(false)
/// }
/// ```
#[async_trait]
pub trait GitOperations: Send + Sync {
    /// Get the current branch name (`HEAD` when detached).
    async fn current_branch(&self, root: &Path) -> Result<String>;

    /// Check whether a ref such as `origin/main` resolves.
    ///
    /// `Ok(false)` means git ran and the ref does not exist.
    async fn ref_exists(&self, root: &Path, reference: &str) -> Result<bool>;

    /// Get `git status --porcelain` output.
    async fn status_porcelain(&self, root: &Path) -> Result<String>;

    /// Count commits in a revision range such as `origin/x..HEAD`.
    async fn count_commits(&self, root: &Path, range: &str) -> Result<u32>;

    /// Fetch a single branch from a remote, giving up after `timeout`.
    async fn fetch(&self, root: &Path, remote: &str, branch: &str, timeout: Duration)
        -> Result<()>;

    /// Check whether `ancestor` is an ancestor of `descendant`.
    async fn is_ancestor(&self, root: &Path, ancestor: &str, descendant: &str) -> Result<bool>;

    /// Simulate merging `theirs` into `ours` without touching the worktree.
    async fn merge_tree(&self, root: &Path, ours: &str, theirs: &str) -> Result<MergeTreeOutcome>;
}

/// Abstraction for the review session service.
///
/// # Example
///
/// ```rust,ignore
/// use review_loop::testing::ReviewService;
///
/// async fn count(service: &impl ReviewService) -> usize {
///     service.list_sessions().await.map(|s| s.len()).unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// `GET /api/sessions`
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// `GET /api/sessions/{id}`
    async fn session_detail(&self, session_id: &str) -> Result<SessionRecord>;

    /// `GET /api/sessions/{id}/pending`
    async fn pending(&self, session_id: &str) -> Result<PendingResponse>;
}

/// Abstraction over wall-clock time for the poll loop.
///
/// Lets tests advance hours of idle time instantly.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}
