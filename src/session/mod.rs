//! Review sessions as recorded by the review service.
//!
//! The service tracks one session per repository/branch pair. A session is
//! either `local` (diff review only, no hosted PR yet) or hosted on GitHub
//! with a PR number and lifecycle state.
//!
//! # Architecture
//!
//! ```text
//! ReviewService ──list_sessions──> SessionRecord ──into_session──> Session
//!       │                                                      │
//!       │                                             resolver::select_session
//!       │
//!       └──pending / session_detail──> feedback::{pending_feedback, session_lifecycle_state}
//! ```
//!
//! Wire types (`*Record`, `*Response`) mirror the JSON the service returns
//! and tolerate missing fields. Domain types are what the decision engine sees.

pub mod feedback;
pub mod http;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use feedback::{pending_feedback, session_lifecycle_state};
pub use http::HttpReviewService;
pub use resolver::{resolve_session, select_session};

// ============================================================================
// Domain Types
// ============================================================================

/// How a session is backed on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    /// Local diff review, no hosted PR filed yet
    Local,
    /// Backed by a hosted pull request
    RemoteHosted,
}

impl SessionType {
    /// Parse the service's `session-type` value.
    ///
    /// Returns `None` for types this crate does not know how to handle.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "github" => Some(Self::RemoteHosted),
            _ => None,
        }
    }
}

/// Lifecycle of the hosted review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Open,
    Merged,
    Closed,
    #[default]
    Unknown,
}

impl LifecycleState {
    /// Parse a state string case-insensitively. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "open" => Self::Open,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Unknown,
        }
    }

    /// Merged and closed reviews are finished; there is nothing left to poll for.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A review session for one repository/branch pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub session_type: SessionType,
    pub branch: String,
    /// Repository reference as the service recorded it (a name or clone URL).
    pub project: String,
    /// Absolute repository path, when the service recorded one.
    pub repo_path: Option<String>,
    /// Hosted PR number; only ever positive.
    pub remote_review_number: Option<u64>,
    pub lifecycle_state: LifecycleState,
}

impl Session {
    /// Human-facing label for the hosted review: `PR #12`, or `the PR`.
    #[must_use]
    pub fn review_label(&self) -> String {
        match self.remote_review_number {
            Some(number) => format!("PR #{number}"),
            None => "the PR".to_string(),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.session_type == SessionType::Local
    }
}

/// CI aggregate state reported alongside pending feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiState {
    Success,
    Failure,
    Pending,
    Error,
    #[default]
    Unknown,
}

impl CiState {
    /// Parse a CI state string. Anything unrecognized is `Unknown`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "pending" => Self::Pending,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

/// A CI check that finished in `failure` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingCheck {
    pub name: String,
    pub url: Option<String>,
}

/// Outstanding review feedback for a session.
///
/// `Feedback::default()` is the "nothing known" value used when the service
/// cannot be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub unresolved_comment_count: u32,
    pub ci_state: CiState,
    pub failing_checks: Vec<FailingCheck>,
}

// ============================================================================
// Wire Types
// ============================================================================

/// A session as it appears in `GET /api/sessions` and `GET /api/sessions/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "session-type")]
    pub session_type: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default, rename = "repo-path")]
    pub repo_path: Option<String>,
    #[serde(default, rename = "github-pr-number")]
    pub github_pr_number: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
}

impl SessionRecord {
    /// Convert to a domain session.
    ///
    /// Returns `None` when the session type is missing or unknown; such
    /// records can never be selected.
    #[must_use]
    pub fn into_session(self) -> Option<Session> {
        let session_type = SessionType::from_wire(self.session_type.as_deref()?)?;
        Some(Session {
            id: self.id.unwrap_or_default(),
            session_type,
            branch: self.branch.unwrap_or_default(),
            project: self.project.unwrap_or_default(),
            repo_path: self.repo_path,
            remote_review_number: self.github_pr_number.filter(|n| *n > 0),
            lifecycle_state: self
                .state
                .as_deref()
                .map(LifecycleState::parse)
                .unwrap_or_default(),
        })
    }
}

/// Body of `GET /api/sessions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionListing {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

/// A check entry inside the `ci` block of a pending response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// The `ci` block of a pending response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiRecord {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub checks: Option<Vec<CheckRecord>>,
}

/// Body of `GET /api/sessions/{id}/pending`.
///
/// Comments are counted, never inspected, so they stay as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingResponse {
    #[serde(default)]
    pub comments: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub ci: Option<CiRecord>,
}
