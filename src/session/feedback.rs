//! Outstanding feedback and lifecycle state for a resolved session.
//!
//! Both queries soft-fail: an unreachable service reports no feedback and an
//! unknown lifecycle, which never causes a block on its own.

use tracing::{debug, warn};

use super::{CiState, FailingCheck, Feedback, LifecycleState, PendingResponse};
use crate::testing::ReviewService;

/// Check states that count as failing. `pending`, `success` and anything else do not.
const FAILING_CHECK_STATES: &[&str] = &["failure", "error"];

impl From<PendingResponse> for Feedback {
    fn from(pending: PendingResponse) -> Self {
        let unresolved_comment_count = pending
            .comments
            .map_or(0, |comments| u32::try_from(comments.len()).unwrap_or(u32::MAX));

        let ci = pending.ci.unwrap_or_default();
        let ci_state = ci.state.as_deref().map(CiState::parse).unwrap_or_default();
        let failing_checks = ci
            .checks
            .unwrap_or_default()
            .into_iter()
            .filter(|check| {
                check
                    .state
                    .as_deref()
                    .is_some_and(|state| FAILING_CHECK_STATES.contains(&state))
            })
            .map(|check| FailingCheck {
                name: check.name.unwrap_or_else(|| "unknown".to_string()),
                url: check.url,
            })
            .collect();

        Self {
            unresolved_comment_count,
            ci_state,
            failing_checks,
        }
    }
}

/// Unresolved comments and CI results for a session.
pub async fn pending_feedback<S>(service: &S, session_id: &str) -> Feedback
where
    S: ReviewService + ?Sized,
{
    match service.pending(session_id).await {
        Ok(pending) => {
            let feedback = Feedback::from(pending);
            debug!(
                comments = feedback.unresolved_comment_count,
                failing_checks = feedback.failing_checks.len(),
                ci_state = ?feedback.ci_state,
                "Pending feedback"
            );
            feedback
        }
        Err(e) => {
            warn!("Could not fetch pending feedback for {session_id}: {e:#}");
            Feedback::default()
        }
    }
}

/// Lifecycle state of the session's hosted review.
pub async fn session_lifecycle_state<S>(service: &S, session_id: &str) -> LifecycleState
where
    S: ReviewService + ?Sized,
{
    match service.session_detail(session_id).await {
        Ok(detail) => detail
            .state
            .as_deref()
            .map(LifecycleState::parse)
            .unwrap_or_default(),
        Err(e) => {
            warn!("Could not fetch session state for {session_id}: {e:#}");
            LifecycleState::Unknown
        }
    }
}
