//! Maps a repository and branch to the best matching review session.

use std::path::Path;
use tracing::{debug, info, warn};

use super::{Session, SessionType};
use crate::testing::ReviewService;

/// Check whether a session belongs to the repository at `repo_path`.
///
/// The service records repository identity inconsistently depending on how
/// the session was created, so any of these counts as a match:
/// - `repo-path` equals the repository path
/// - `project` contains the repository directory name
/// - `project` ends with `/<name>.git`
#[must_use]
pub fn matches_repository(session: &Session, repo_path: &str) -> bool {
    if session.repo_path.as_deref() == Some(repo_path) {
        return true;
    }

    let name = Path::new(repo_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        return false;
    }

    session.project.contains(&name) || session.project.ends_with(&format!("/{name}.git"))
}

/// Pick the session for `branch` of the repository at `repo_path`.
///
/// Hosted sessions always win over local ones. Among hosted sessions an open
/// review beats any merged or closed one, then the highest PR number wins.
/// Without a hosted match, the first local match in listing order is used.
#[must_use]
pub fn select_session(sessions: &[Session], repo_path: &str, branch: &str) -> Option<Session> {
    let candidates = sessions
        .iter()
        .filter(|s| s.branch == branch && matches_repository(s, repo_path));

    let mut first_local: Option<&Session> = None;
    let mut best_hosted: Option<&Session> = None;

    for session in candidates {
        match session.session_type {
            SessionType::Local => {
                first_local.get_or_insert(session);
            }
            SessionType::RemoteHosted => {
                // Ties keep the earlier session
                if best_hosted.is_none_or(|best| hosted_priority(session) > hosted_priority(best)) {
                    best_hosted = Some(session);
                }
            }
        }
    }

    best_hosted.or(first_local).cloned()
}

fn hosted_priority(session: &Session) -> (bool, u64) {
    (
        session.lifecycle_state == super::LifecycleState::Open,
        session.remote_review_number.unwrap_or(0),
    )
}

/// Fetch the session listing and select the session for `branch`.
///
/// An unreachable service behaves like an empty listing.
pub async fn resolve_session<S>(service: &S, repo_path: &str, branch: &str) -> Option<Session>
where
    S: ReviewService + ?Sized,
{
    let records = match service.list_sessions().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Could not list review sessions: {e:#}");
            Vec::new()
        }
    };

    let sessions: Vec<Session> = records
        .into_iter()
        .filter_map(super::SessionRecord::into_session)
        .collect();
    debug!("{} known sessions", sessions.len());

    let session = select_session(&sessions, repo_path, branch);
    match &session {
        Some(s) if s.session_type == SessionType::RemoteHosted => {
            if let Some(number) = s.remote_review_number {
                info!("Found PR #{number} for branch '{branch}'");
            }
        }
        Some(s) => debug!("Found local session {} for branch '{branch}'", s.id),
        None => info!("No review session found for branch '{branch}'"),
    }
    session
}
