//! Mock implementations of testing traits.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests of every soft-fail path.

use super::traits::{Clock, GitOperations, MergeTreeOutcome, ReviewService};
use crate::session::{PendingResponse, SessionRecord};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// Git
// ============================================================================

/// Mock implementation of git operations.
///
/// Clones share their call counters.
///
/// # Example
///
/// ```rust,ignore
/// let git = MockGitOperations::new()
///     .with_branch("feature/login")
///     .with_ref("origin/main")
///     .with_status(" M src/lib.rs");
/// ```
#[derive(Debug, Clone)]
pub struct MockGitOperations {
    branch: std::result::Result<String, String>,
    refs: HashSet<String>,
    status: std::result::Result<String, String>,
    commit_count: std::result::Result<u32, String>,
    fetch_error: Option<String>,
    ancestor: bool,
    merge_tree: std::result::Result<MergeTreeOutcome, String>,
    fetch_calls: Arc<AtomicU32>,
}

impl Default for MockGitOperations {
    fn default() -> Self {
        Self {
            branch: Ok("main".to_string()),
            refs: HashSet::new(),
            status: Ok(String::new()),
            commit_count: Ok(0),
            fetch_error: None,
            ancestor: false,
            merge_tree: Ok(MergeTreeOutcome::clean()),
            fetch_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl MockGitOperations {
    /// Create a new mock with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current branch name.
    #[must_use]
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Ok(branch.to_string());
        self
    }

    /// Make the branch query fail.
    #[must_use]
    pub fn with_branch_error(mut self, error: &str) -> Self {
        self.branch = Err(error.to_string());
        self
    }

    /// Register a ref (e.g. `origin/main`) as existing.
    #[must_use]
    pub fn with_ref(mut self, reference: &str) -> Self {
        self.refs.insert(reference.to_string());
        self
    }

    /// Set the porcelain status output.
    #[must_use]
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Ok(status.to_string());
        self
    }

    /// Make the status query fail.
    #[must_use]
    pub fn with_status_error(mut self, error: &str) -> Self {
        self.status = Err(error.to_string());
        self
    }

    /// Set the commit count returned for any range.
    #[must_use]
    pub fn with_commit_count(mut self, count: u32) -> Self {
        self.commit_count = Ok(count);
        self
    }

    /// Make commit counting fail.
    #[must_use]
    pub fn with_count_error(mut self, error: &str) -> Self {
        self.commit_count = Err(error.to_string());
        self
    }

    /// Make fetch fail.
    #[must_use]
    pub fn with_fetch_error(mut self, error: &str) -> Self {
        self.fetch_error = Some(error.to_string());
        self
    }

    /// Set the answer to every ancestry query.
    #[must_use]
    pub fn with_ancestor(mut self, is_ancestor: bool) -> Self {
        self.ancestor = is_ancestor;
        self
    }

    /// Set the dry-run merge result.
    #[must_use]
    pub fn with_merge_tree(mut self, outcome: MergeTreeOutcome) -> Self {
        self.merge_tree = Ok(outcome);
        self
    }

    /// Make the dry-run merge fail.
    #[must_use]
    pub fn with_merge_tree_error(mut self, error: &str) -> Self {
        self.merge_tree = Err(error.to_string());
        self
    }

    /// Number of fetches issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitOperations for MockGitOperations {
    async fn current_branch(&self, _root: &Path) -> Result<String> {
        self.branch.clone().map_err(|e| anyhow!(e))
    }

    async fn ref_exists(&self, _root: &Path, reference: &str) -> Result<bool> {
        Ok(self.refs.contains(reference))
    }

    async fn status_porcelain(&self, _root: &Path) -> Result<String> {
        self.status.clone().map_err(|e| anyhow!(e))
    }

    async fn count_commits(&self, _root: &Path, _range: &str) -> Result<u32> {
        self.commit_count.clone().map_err(|e| anyhow!(e))
    }

    async fn fetch(
        &self,
        _root: &Path,
        _remote: &str,
        _branch: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fetch_error {
            Some(error) => bail!("{}", error),
            None => Ok(()),
        }
    }

    async fn is_ancestor(&self, _root: &Path, _ancestor: &str, _descendant: &str) -> Result<bool> {
        Ok(self.ancestor)
    }

    async fn merge_tree(&self, _root: &Path, _ours: &str, _theirs: &str) -> Result<MergeTreeOutcome> {
        self.merge_tree.clone().map_err(|e| anyhow!(e))
    }
}

// ============================================================================
// Review service
// ============================================================================

/// Mock implementation of the review service.
///
/// Pending responses and session details are served from queues; the last
/// entry repeats once a queue is drained, so a single entry behaves as a
/// constant answer.
///
/// # Example
///
/// ```rust,ignore
/// let service = MockReviewService::new()
///     .with_sessions(vec![github_session("s-1", "feature", 12, "open")])
///     .with_pending(pending_with_comments(2));
/// ```
#[derive(Debug, Default)]
pub struct MockReviewService {
    sessions: Mutex<Option<std::result::Result<Vec<SessionRecord>, String>>>,
    details: Mutex<VecDeque<std::result::Result<SessionRecord, String>>>,
    pending: Mutex<VecDeque<std::result::Result<PendingResponse, String>>>,
    list_calls: AtomicU32,
    pending_calls: AtomicU32,
    detail_calls: AtomicU32,
}

impl MockReviewService {
    /// Create a new mock with an empty listing and no feedback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session listing.
    #[must_use]
    pub fn with_sessions(self, sessions: Vec<SessionRecord>) -> Self {
        *self.sessions.lock().unwrap() = Some(Ok(sessions));
        self
    }

    /// Make the listing request fail.
    #[must_use]
    pub fn with_list_error(self, error: &str) -> Self {
        *self.sessions.lock().unwrap() = Some(Err(error.to_string()));
        self
    }

    /// Queue a session detail response.
    #[must_use]
    pub fn with_detail(self, detail: SessionRecord) -> Self {
        self.details.lock().unwrap().push_back(Ok(detail));
        self
    }

    /// Queue a session detail carrying only a state string.
    #[must_use]
    pub fn with_state(self, state: &str) -> Self {
        self.with_detail(SessionRecord {
            state: Some(state.to_string()),
            ..Default::default()
        })
    }

    /// Queue a failing session detail request.
    #[must_use]
    pub fn with_detail_error(self, error: &str) -> Self {
        self.details.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    /// Queue a pending feedback response.
    #[must_use]
    pub fn with_pending(self, pending: PendingResponse) -> Self {
        self.pending.lock().unwrap().push_back(Ok(pending));
        self
    }

    /// Queue a failing pending feedback request.
    #[must_use]
    pub fn with_pending_error(self, error: &str) -> Self {
        self.pending.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    /// Number of listing requests so far.
    #[must_use]
    pub fn list_count(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of pending feedback requests so far.
    #[must_use]
    pub fn pending_count(&self) -> u32 {
        self.pending_calls.load(Ordering::SeqCst)
    }

    /// Number of session detail requests so far.
    #[must_use]
    pub fn detail_count(&self) -> u32 {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<std::result::Result<T, String>>>) -> Option<std::result::Result<T, String>> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ReviewService for MockReviewService {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.sessions.lock().unwrap().clone() {
            Some(result) => result.map_err(|e| anyhow!(e)),
            None => Ok(Vec::new()),
        }
    }

    async fn session_detail(&self, session_id: &str) -> Result<SessionRecord> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.details) {
            Some(result) => result.map_err(|e| anyhow!(e)),
            None => bail!("no detail configured for session {session_id}"),
        }
    }

    async fn pending(&self, _session_id: &str) -> Result<PendingResponse> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.pending) {
            Some(result) => result.map_err(|e| anyhow!(e)),
            None => Ok(PendingResponse::default()),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when slept on.
///
/// # Example
///
/// ```rust,ignore
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.sleep(Duration::from_secs(3600)).await;
/// assert_eq!(clock.now() - start, Duration::from_secs(3600));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: AtomicU32,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: AtomicU32::new(0),
        }
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }

    /// Total simulated time elapsed.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    /// Number of sleeps taken so far.
    #[must_use]
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}
