//! The decision engine: whether the agent may stop, and if not, why.
//!
//! Concerns are checked in a fixed priority order and the first one that
//! applies wins. Structural git problems come before review feedback, since
//! comments and CI results on a branch that cannot merge or has not been
//! pushed are not worth acting on yet.
//!
//! ```text
//! session_gate()   worktree_gate()   evaluate_tick()
//!   no session       conflicts         unresolved comments
//!   local only       uncommitted       failing CI checks
//!                    unpushed          review merged/closed
//!                                      idle ceiling reached  -> Terminate
//!                                      nothing to do         -> keep polling
//! ```
//!
//! A hosted session without an id passes [`session_gate`] and skips the
//! worktree checks entirely: the agent is allowed to stop.
//!
//! Both functions are pure; all I/O happens in [`crate::driver`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::instructions;
use crate::repo::RepoState;
use crate::session::{Feedback, LifecycleState, Session};

/// The concern behind a block, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonClass {
    NoSession,
    LocalSession,
    MergeConflict,
    UncommittedChanges,
    UnpushedCommits,
    UnresolvedComments,
    CiFailures,
    SessionEnded,
}

impl std::fmt::Display for ReasonClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoSession => "no-session",
            Self::LocalSession => "local-session",
            Self::MergeConflict => "merge-conflict",
            Self::UncommittedChanges => "uncommitted-changes",
            Self::UnpushedCommits => "unpushed-commits",
            Self::UnresolvedComments => "unresolved-comments",
            Self::CiFailures => "ci-failures",
            Self::SessionEnded => "session-ended",
        };
        write!(f, "{name}")
    }
}

/// Why the agent must keep working, and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReason {
    pub class: ReasonClass,
    pub text: String,
}

impl BlockReason {
    #[must_use]
    pub fn new(class: ReasonClass, text: impl Into<String>) -> Self {
        Self {
            class,
            text: text.into(),
        }
    }
}

/// Outcome of a stop hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The agent may stop.
    Allow,
    /// The agent must continue with the given instruction.
    Block(BlockReason),
    /// Polling gave up; the hook process exits non-zero with no payload.
    Terminate,
}

impl Decision {
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    #[must_use]
    pub fn reason_class(&self) -> Option<ReasonClass> {
        match self {
            Self::Block(reason) => Some(reason.class),
            _ => None,
        }
    }
}

/// Check that the branch has a hosted review session.
///
/// Returns `None` when there is a hosted session to work against.
#[must_use]
pub fn session_gate(branch: &str, session: Option<&Session>, repo_path: &str) -> Option<BlockReason> {
    let Some(session) = session else {
        return Some(BlockReason::new(
            ReasonClass::NoSession,
            instructions::create_session(branch),
        ));
    };

    if session.is_local() {
        return Some(BlockReason::new(
            ReasonClass::LocalSession,
            instructions::create_remote_review(branch, &session.id, repo_path),
        ));
    }

    None
}

/// Check that the working copy is merged-up, committed and pushed.
///
/// Returns `None` when polling may start.
#[must_use]
pub fn worktree_gate(repo: &RepoState, session: &Session, repo_path: &str) -> Option<BlockReason> {
    if repo.has_conflicts() {
        return Some(BlockReason::new(
            ReasonClass::MergeConflict,
            instructions::resolve_conflicts(
                &repo.default_branch,
                &repo.conflicting_paths,
                &session.id,
                repo_path,
            ),
        ));
    }

    if !repo.is_clean() {
        return Some(BlockReason::new(
            ReasonClass::UncommittedChanges,
            instructions::triage_changes(&repo.uncommitted_changes),
        ));
    }

    if repo.unpushed_commit_count > 0 {
        return Some(BlockReason::new(
            ReasonClass::UnpushedCommits,
            instructions::push_commits(
                repo.unpushed_commit_count,
                &session.review_label(),
                &session.id,
                repo_path,
            ),
        ));
    }

    None
}

/// Run every one-time structural check against a full snapshot.
///
/// Returns `None` when polling may start or when the session has no id.
#[must_use]
pub fn gate(repo: &RepoState, session: Option<&Session>, repo_path: &str) -> Option<BlockReason> {
    if let Some(reason) = session_gate(&repo.branch, session, repo_path) {
        return Some(reason);
    }
    session
        .filter(|session| !session.id.is_empty())
        .and_then(|session| worktree_gate(repo, session, repo_path))
}

/// Everything one poll tick looks at.
#[derive(Debug, Clone)]
pub struct TickInput<'a> {
    pub session: &'a Session,
    pub repo_path: &'a str,
    pub feedback: &'a Feedback,
    pub lifecycle: LifecycleState,
    /// Time since polling started.
    pub idle: Duration,
    pub max_idle: Duration,
}

/// Evaluate one poll tick: comments, CI, lifecycle, then the idle ceiling.
///
/// Returns `None` when there is nothing to act on yet and polling continues.
#[must_use]
pub fn evaluate_tick(input: &TickInput<'_>) -> Option<Decision> {
    let session = input.session;
    let label = session.review_label();

    if input.feedback.unresolved_comment_count > 0 {
        return Some(Decision::Block(BlockReason::new(
            ReasonClass::UnresolvedComments,
            instructions::address_comments(
                input.feedback.unresolved_comment_count,
                &label,
                &session.id,
                input.repo_path,
            ),
        )));
    }

    if !input.feedback.failing_checks.is_empty() {
        return Some(Decision::Block(BlockReason::new(
            ReasonClass::CiFailures,
            instructions::fix_ci(
                &input.feedback.failing_checks,
                &label,
                &session.id,
                input.repo_path,
            ),
        )));
    }

    if input.lifecycle.is_finished() {
        return Some(Decision::Block(BlockReason::new(
            ReasonClass::SessionEnded,
            instructions::end_session(&label, &input.lifecycle.to_string()),
        )));
    }

    if input.idle >= input.max_idle {
        return Some(Decision::Terminate);
    }

    None
}
