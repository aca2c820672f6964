//! The stop hook's control flow.
//!
//! One invocation runs through these states:
//!
//! ```text
//! Init ──(disabled / not a repo / no branch)──────────────────────▶ Done(Allow)
//!   │
//!   ▼
//! Gating ──(gate blocks)──────────────────────────────▶ Done(Block or Allow)
//!   │                                                    (escalation governor)
//!   ▼
//! Polling ──(feedback or review finished)─────────────▶ Done(Block or Allow)
//!   │  ▲
//!   └──┘ sleep poll interval        (idle ceiling) ───▶ Done(Terminate)
//! ```
//!
//! Every external collaborator is injected through [`DriverDependencies`],
//! so a full invocation can be exercised in tests without git, a network,
//! or wall-clock waits.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LoopConfig;
use crate::decision::{self, BlockReason, Decision, ReasonClass, TickInput};
use crate::escalation::{EscalationGovernor, FileHistoryStore, HistoryStore};
use crate::repo::{self, GitCli, RepoInspector, RepoState};
use crate::session::{self, HttpReviewService, LifecycleState, Session};
use crate::testing::{Clock, GitOperations, ReviewService};

/// Where a driver invocation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Gating,
    Polling,
    Done,
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Dependencies for the driver, injectable for testing.
///
/// # Example
///
/// ```rust,ignore
/// use review_loop::driver::DriverDependencies;
/// use review_loop::escalation::MemoryHistoryStore;
/// use review_loop::testing::{ManualClock, MockGitOperations, MockReviewService};
/// use std::sync::Arc;
///
/// let deps = DriverDependencies {
///     git: Arc::new(MockGitOperations::new().with_branch("feature")),
///     service: Arc::new(MockReviewService::new()),
///     history: Arc::new(MemoryHistoryStore::new()),
///     clock: Arc::new(ManualClock::new()),
/// };
/// ```
pub struct DriverDependencies {
    pub git: Arc<dyn GitOperations>,
    pub service: Arc<dyn ReviewService>,
    pub history: Arc<dyn HistoryStore>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DriverDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDependencies")
            .field("git", &"<dyn GitOperations>")
            .field("service", &"<dyn ReviewService>")
            .field("history", &self.history.location())
            .field("clock", &"<dyn Clock>")
            .finish()
    }
}

impl DriverDependencies {
    /// Create real dependencies for production use.
    ///
    /// # Errors
    ///
    /// Returns an error if the service URL is invalid or the HTTP client
    /// cannot be built.
    pub fn real(config: &LoopConfig) -> crate::Result<Self> {
        Ok(Self {
            git: Arc::new(GitCli::new()),
            service: Arc::new(HttpReviewService::new(
                &config.service_url,
                config.http_timeout(),
            )?),
            history: Arc::new(FileHistoryStore::new(&config.history_file)),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Everything the hook learned about a repository before deciding.
#[derive(Debug, Clone)]
pub struct Survey {
    pub root: PathBuf,
    pub repo: RepoState,
    pub session: Option<Session>,
}

impl Survey {
    #[must_use]
    pub fn repo_path(&self) -> String {
        self.root.display().to_string()
    }
}

/// Runs one stop hook invocation to a [`Decision`].
pub struct PollDriver {
    config: LoopConfig,
    inspector: RepoInspector,
    service: Arc<dyn ReviewService>,
    clock: Arc<dyn Clock>,
    governor: EscalationGovernor,
    state: DriverState,
    idle: Duration,
}

impl std::fmt::Debug for PollDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollDriver")
            .field("config", &self.config)
            .field("inspector", &self.inspector)
            .field("service", &"<dyn ReviewService>")
            .field("clock", &"<dyn Clock>")
            .field("governor", &self.governor)
            .field("state", &self.state)
            .field("idle", &self.idle)
            .finish()
    }
}

impl PollDriver {
    #[must_use]
    pub fn new(config: LoopConfig, deps: DriverDependencies) -> Self {
        let inspector = RepoInspector::new(deps.git, config.fetch_timeout());
        let governor = EscalationGovernor::new(deps.history, config.max_repeated_blocks);
        Self {
            config,
            inspector,
            service: deps.service,
            clock: deps.clock,
            governor,
            state: DriverState::Init,
            idle: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    #[must_use]
    pub fn governor(&self) -> &EscalationGovernor {
        &self.governor
    }

    /// Time spent polling without review activity in the last run.
    #[must_use]
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Repository root and current branch for `cwd`.
    async fn locate(&self, cwd: &Path) -> Option<(PathBuf, String)> {
        if !repo::is_git_repo(cwd) {
            debug!("{} is not inside a git repository", cwd.display());
            return None;
        }
        let root = repo::find_repo_root(cwd);

        let branch = self.inspector.current_branch(&root).await;
        if branch.is_empty() {
            debug!("No current branch in {}", root.display());
            return None;
        }
        Some((root, branch))
    }

    /// Resolve the session for the repository containing `cwd` and inspect it.
    ///
    /// Returns `None` outside a git repository or when the branch cannot be
    /// determined.
    pub async fn survey(&self, cwd: &Path) -> Option<Survey> {
        let (root, branch) = self.locate(cwd).await?;
        let repo_path = root.display().to_string();
        let session = session::resolve_session(self.service.as_ref(), &repo_path, &branch).await;
        let repo = self.inspector.inspect(&root, &branch).await;

        Some(Survey {
            root,
            repo,
            session,
        })
    }

    /// Decide whether the agent working in `cwd` may stop.
    pub async fn run(&mut self, cwd: &Path) -> Decision {
        let decision = self.decide(cwd).await;
        self.state = DriverState::Done;
        decision
    }

    async fn decide(&mut self, cwd: &Path) -> Decision {
        self.state = DriverState::Init;
        self.idle = Duration::ZERO;
        if self.config.disabled {
            info!("Review loop disabled, allowing stop");
            return Decision::Allow;
        }

        let Some((root, branch)) = self.locate(cwd).await else {
            return Decision::Allow;
        };
        let repo_path = root.display().to_string();
        let session = session::resolve_session(self.service.as_ref(), &repo_path, &branch).await;

        self.state = DriverState::Gating;
        if let Some(reason) = decision::session_gate(&branch, session.as_ref(), &repo_path) {
            return self.escalate(reason);
        }
        let Some(session) = session else {
            return Decision::Allow;
        };
        if session.id.is_empty() {
            warn!("Session for '{branch}' has no id, allowing stop");
            return Decision::Allow;
        }

        // Inspection fetches the default branch; only hosted sessions with an id get here
        let repo = self.inspector.inspect(&root, &branch).await;
        if let Some(reason) = decision::worktree_gate(&repo, &session, &repo_path) {
            return self.escalate(reason);
        }

        self.state = DriverState::Polling;
        self.poll(&session, &repo_path).await
    }

    async fn poll(&mut self, session: &Session, repo_path: &str) -> Decision {
        info!(
            "Polling {} every {}s for review activity",
            session.review_label(),
            self.config.poll_interval_secs
        );
        let start = self.clock.now();
        let max_idle = self.config.max_idle();

        loop {
            let feedback = session::pending_feedback(self.service.as_ref(), &session.id).await;
            let actionable =
                feedback.unresolved_comment_count > 0 || !feedback.failing_checks.is_empty();
            let lifecycle = if actionable {
                LifecycleState::Unknown
            } else {
                session::session_lifecycle_state(self.service.as_ref(), &session.id).await
            };

            let input = TickInput {
                session,
                repo_path,
                feedback: &feedback,
                lifecycle,
                idle: self.clock.now().saturating_duration_since(start),
                max_idle,
            };

            match decision::evaluate_tick(&input) {
                Some(Decision::Block(reason)) => {
                    if reason.class == ReasonClass::SessionEnded {
                        info!("{} {}.", session.review_label(), input.lifecycle);
                    }
                    return self.escalate(reason);
                }
                Some(Decision::Terminate) => {
                    self.idle = input.idle;
                    warn!(
                        "No review activity on {} for {}s, giving up",
                        session.review_label(),
                        input.idle.as_secs()
                    );
                    return Decision::Terminate;
                }
                Some(Decision::Allow) => return Decision::Allow,
                None => {
                    debug!("Nothing to act on yet, sleeping");
                    self.clock.sleep(self.config.poll_interval()).await;
                }
            }
        }
    }

    /// Pass a block through the escalation governor.
    fn escalate(&self, reason: BlockReason) -> Decision {
        if self.governor.should_force_allow(&reason.text) {
            info!("Allowing stop after repeated '{}' blocks", reason.class);
            Decision::Allow
        } else {
            info!("Blocking stop: {}", reason.class);
            Decision::Block(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::MemoryHistoryStore;
    use crate::session::{CheckRecord, CiRecord, PendingResponse, SessionRecord};
    use crate::testing::{ManualClock, MockGitOperations, MockReviewService};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        driver: PollDriver,
        git: MockGitOperations,
        service: Arc<MockReviewService>,
        clock: Arc<ManualClock>,
        history: Arc<MemoryHistoryStore>,
        dir: TempDir,
    }

    impl Harness {
        fn repo_path(&self) -> String {
            repo::find_repo_root(self.dir.path()).display().to_string()
        }

        async fn run(&mut self) -> Decision {
            let cwd = self.dir.path().to_path_buf();
            self.driver.run(&cwd).await
        }
    }

    fn git_dir() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    fn hosted_record(repo_path: &str, state: &str) -> SessionRecord {
        SessionRecord {
            id: Some("s-1".to_string()),
            session_type: Some("github".to_string()),
            branch: Some("feature".to_string()),
            project: Some("acme/widgets".to_string()),
            repo_path: Some(repo_path.to_string()),
            github_pr_number: Some(12),
            state: Some(state.to_string()),
        }
    }

    fn harness(
        config: LoopConfig,
        git: MockGitOperations,
        service: impl FnOnce(&str) -> MockReviewService,
    ) -> Harness {
        let dir = git_dir();
        let repo_path = repo::find_repo_root(dir.path()).display().to_string();
        let service = Arc::new(service(&repo_path));
        let clock = Arc::new(ManualClock::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let deps = DriverDependencies {
            git: Arc::new(git.clone()),
            service: service.clone(),
            history: history.clone(),
            clock: clock.clone(),
        };
        Harness {
            driver: PollDriver::new(config, deps),
            git,
            service,
            clock,
            history,
            dir,
        }
    }

    fn feature_branch() -> MockGitOperations {
        MockGitOperations::new().with_branch("feature")
    }

    #[tokio::test]
    async fn test_disabled_allows_without_touching_git() {
        let config = LoopConfig {
            disabled: true,
            ..Default::default()
        };
        let mut h = harness(config, feature_branch(), |_| MockReviewService::new());
        assert_eq!(h.run().await, Decision::Allow);
        assert_eq!(h.service.list_count(), 0);
        assert_eq!(h.driver.state(), DriverState::Done);
    }

    #[tokio::test]
    async fn test_outside_repository_allows() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |_| {
            MockReviewService::new()
        });
        fs::remove_dir(h.dir.path().join(".git")).unwrap();
        assert_eq!(h.run().await, Decision::Allow);
        assert_eq!(h.service.list_count(), 0);
    }

    #[tokio::test]
    async fn test_detached_head_allows() {
        let git = MockGitOperations::new().with_branch("HEAD");
        let mut h = harness(LoopConfig::default(), git, |_| MockReviewService::new());
        assert_eq!(h.run().await, Decision::Allow);
    }

    #[tokio::test]
    async fn test_no_session_blocks() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |_| {
            MockReviewService::new()
        });
        let decision = h.run().await;
        assert_eq!(decision.reason_class(), Some(ReasonClass::NoSession));
        assert_eq!(h.history.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_session_skips_the_default_branch_fetch() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |_| {
            MockReviewService::new()
        });
        assert_eq!(h.run().await.reason_class(), Some(ReasonClass::NoSession));
        assert_eq!(h.git.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_local_session_skips_the_default_branch_fetch() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |path| {
            let mut record = hosted_record(path, "open");
            record.session_type = Some("local".to_string());
            MockReviewService::new().with_sessions(vec![record])
        });
        assert_eq!(h.run().await.reason_class(), Some(ReasonClass::LocalSession));
        assert_eq!(h.git.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_hosted_session_fetches_default_branch() {
        let git = feature_branch().with_status(" M src/lib.rs");
        let mut h = harness(LoopConfig::default(), git, |path| {
            MockReviewService::new().with_sessions(vec![hosted_record(path, "open")])
        });
        assert_eq!(
            h.run().await.reason_class(),
            Some(ReasonClass::UncommittedChanges)
        );
        assert_eq!(h.git.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_changes_block_before_polling() {
        let git = feature_branch().with_status(" M src/lib.rs");
        let mut h = harness(LoopConfig::default(), git, |path| {
            MockReviewService::new().with_sessions(vec![hosted_record(path, "open")])
        });

        let decision = h.run().await;
        assert_eq!(decision.reason_class(), Some(ReasonClass::UncommittedChanges));
        assert_eq!(h.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_comments_block_on_first_tick() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |path| {
            MockReviewService::new()
                .with_sessions(vec![hosted_record(path, "open")])
                .with_pending(PendingResponse {
                    comments: Some(vec![serde_json::json!({}), serde_json::json!({})]),
                    ci: None,
                })
        });

        let Decision::Block(reason) = h.run().await else {
            panic!("expected a block");
        };
        assert_eq!(reason.class, ReasonClass::UnresolvedComments);
        assert!(reason.text.contains("PR #12"));
        assert!(reason.text.contains(&h.repo_path()));
        assert_eq!(h.clock.sleep_count(), 0);
        assert_eq!(h.service.detail_count(), 0);
    }

    #[tokio::test]
    async fn test_ci_failure_arrives_after_quiet_ticks() {
        let failing = PendingResponse {
            comments: None,
            ci: Some(CiRecord {
                state: Some("failure".to_string()),
                checks: Some(vec![CheckRecord {
                    name: Some("tests".to_string()),
                    state: Some("failure".to_string()),
                    url: None,
                }]),
            }),
        };
        let mut h = harness(LoopConfig::default(), feature_branch(), |path| {
            MockReviewService::new()
                .with_sessions(vec![hosted_record(path, "open")])
                .with_state("open")
                .with_pending(PendingResponse::default())
                .with_pending(PendingResponse::default())
                .with_pending(failing)
        });

        let decision = h.run().await;
        assert_eq!(decision.reason_class(), Some(ReasonClass::CiFailures));
        assert_eq!(h.service.pending_count(), 3);
        assert_eq!(h.clock.sleep_count(), 2);
        assert_eq!(h.clock.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_merged_review_ends_session() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |path| {
            MockReviewService::new()
                .with_sessions(vec![hosted_record(path, "open")])
                .with_state("merged")
        });

        let Decision::Block(reason) = h.run().await else {
            panic!("expected a block");
        };
        assert_eq!(reason.class, ReasonClass::SessionEnded);
        assert!(reason.text.contains("kill -INT $PPID"));
    }

    #[tokio::test]
    async fn test_idle_ceiling_terminates() {
        let config = LoopConfig {
            poll_interval_secs: 600,
            max_idle_secs: 3600,
            ..Default::default()
        };
        let mut h = harness(config, feature_branch(), |path| {
            MockReviewService::new()
                .with_sessions(vec![hosted_record(path, "open")])
                .with_state("open")
        });

        assert_eq!(h.run().await, Decision::Terminate);
        assert_eq!(h.clock.sleep_count(), 6);
        assert_eq!(h.driver.idle(), Duration::from_secs(3600));
        assert!(h.history.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_is_reset_between_runs() {
        let config = LoopConfig {
            poll_interval_secs: 600,
            max_idle_secs: 3000,
            ..Default::default()
        };
        let mut h = harness(config, feature_branch(), |path| {
            MockReviewService::new()
                .with_sessions(vec![hosted_record(path, "open")])
                .with_state("open")
        });
        assert_eq!(h.run().await, Decision::Terminate);
        assert_eq!(h.driver.idle(), Duration::from_secs(3000));

        h.driver.config.disabled = true;
        assert_eq!(h.run().await, Decision::Allow);
        assert_eq!(h.driver.idle(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_empty_session_id_allows() {
        let mut h = harness(LoopConfig::default(), feature_branch(), |path| {
            let mut record = hosted_record(path, "open");
            record.id = None;
            MockReviewService::new().with_sessions(vec![record])
        });
        assert_eq!(h.run().await, Decision::Allow);
        assert_eq!(h.service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_session_id_allows_despite_dirty_tree() {
        let git = feature_branch()
            .with_status(" M a.rs")
            .with_commit_count(2)
            .with_ref("origin/feature");
        let mut h = harness(LoopConfig::default(), git, |path| {
            let mut record = hosted_record(path, "open");
            record.id = None;
            MockReviewService::new().with_sessions(vec![record])
        });
        assert_eq!(h.run().await, Decision::Allow);
        assert!(h.history.load().unwrap().is_empty());
        assert_eq!(h.git.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_block_is_eventually_allowed() {
        let git = feature_branch().with_commit_count(2).with_ref("origin/feature");
        let mut h = harness(LoopConfig::default(), git, |path| {
            MockReviewService::new().with_sessions(vec![hosted_record(path, "open")])
        });

        for _ in 0..2 {
            let decision = h.run().await;
            assert_eq!(decision.reason_class(), Some(ReasonClass::UnpushedCommits));
        }
        assert_eq!(h.run().await, Decision::Allow);
        assert!(h.history.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_driver_debug_hides_trait_objects() {
        let h = harness(LoopConfig::default(), feature_branch(), |_| {
            MockReviewService::new()
        });
        let debug = format!("{:?}", h.driver);
        assert!(debug.starts_with("PollDriver"));
        assert!(debug.contains("<dyn ReviewService>"));
        assert!(debug.contains("state: Init"));
    }

    #[tokio::test]
    async fn test_survey_reports_repo_and_session() {
        let h = harness(LoopConfig::default(), feature_branch(), |path| {
            MockReviewService::new().with_sessions(vec![hosted_record(path, "open")])
        });
        let survey = h.driver.survey(h.dir.path()).await.unwrap();
        assert_eq!(survey.repo.branch, "feature");
        assert_eq!(survey.repo.default_branch, "main");
        assert_eq!(survey.repo_path(), h.repo_path());
        assert_eq!(survey.session.unwrap().remote_review_number, Some(12));
    }
}
