//! Instruction text handed back to the agent when it is not allowed to stop.
//!
//! Every instruction opens with `ACTION REQUIRED:` and is self-contained:
//! the agent sees nothing else from this hook.

use crate::session::FailingCheck;

/// Maximum number of conflicting files listed before summarizing the rest.
pub const MAX_LISTED_CONFLICTS: usize = 10;

/// Appended wherever the agent is told to request a review.
pub const COMMIT_REMINDER: &str = "IMPORTANT: Before requesting review, you must `git add` and \
`git commit` all changes. Commits are automatically pushed to the PR when you use request_review.";

fn request_review_call(session_id: &str, repo_path: &str) -> String {
    format!(r#"request_review(session_id="{session_id}", repo_path="{repo_path}")"#)
}

/// No session exists for the branch yet.
#[must_use]
pub fn create_session(branch: &str) -> String {
    format!(
        "ACTION REQUIRED: Create a review session for branch '{branch}'.\n\
         1. {COMMIT_REMINDER}\n\
         2. Call get_or_create_session to create a review session\n\
         3. Call get_session_diff to review your changes\n\
         4. Run the code-reviewer agent to find issues, then fix them\n\
         5. Call request_review to create a PR and request external review"
    )
}

/// A local session exists but no PR has been filed.
#[must_use]
pub fn create_remote_review(branch: &str, session_id: &str, repo_path: &str) -> String {
    format!(
        "ACTION REQUIRED: Create a PR for branch '{branch}'.\n\
         {COMMIT_REMINDER}\n\
         Then call: {}",
        request_review_call(session_id, repo_path)
    )
}

/// Render the conflicting file list, capped at [`MAX_LISTED_CONFLICTS`].
#[must_use]
pub fn conflict_list(paths: &[String]) -> String {
    let mut list = paths
        .iter()
        .take(MAX_LISTED_CONFLICTS)
        .map(|path| format!("  • {path}"))
        .collect::<Vec<_>>()
        .join("\n");
    if paths.len() > MAX_LISTED_CONFLICTS {
        list.push_str(&format!(
            "\n  ... and {} more",
            paths.len() - MAX_LISTED_CONFLICTS
        ));
    }
    list
}

/// Merging the default branch would conflict.
#[must_use]
pub fn resolve_conflicts(
    default_branch: &str,
    paths: &[String],
    session_id: &str,
    repo_path: &str,
) -> String {
    format!(
        "ACTION REQUIRED: Resolve merge conflicts with {default_branch}.\n\n\
         Conflicting files:\n{}\n\n\
         Steps to resolve:\n\
         1. Run: `git fetch origin {default_branch}`\n\
         2. Run: `git merge origin/{default_branch}`\n\
         3. Resolve conflicts in each file listed above\n\
         4. Run: `git add <resolved-files>` for each resolved file\n\
         5. Run: `git commit` to complete the merge\n\
         6. {COMMIT_REMINDER}\n\
         7. Call: {}",
        conflict_list(paths),
        request_review_call(session_id, repo_path)
    )
}

/// The working tree has uncommitted changes.
#[must_use]
pub fn triage_changes(changes: &[String]) -> String {
    format!(
        "ACTION REQUIRED: Handle {} uncommitted change(s):\n\
         ```\n{}\n```\n\
         For each file, decide:\n\
         • **Commit** if it's intentional work (source code, config, docs)\n\
         • **Add to .gitignore** if it's generated/cache files (__pycache__/, .pyc, \
         .claude/, .lsp/, .clj-kondo/, node_modules/, target/, .DS_Store, etc.)\n\
         • **Discard** with `git checkout -- <file>` if it's accidental\n\n\
         Then run `git add` and `git commit` for files that belong in the PR.",
        changes.len(),
        changes.join("\n")
    )
}

/// Local commits have not been pushed.
#[must_use]
pub fn push_commits(count: u32, review_label: &str, session_id: &str, repo_path: &str) -> String {
    format!(
        "ACTION REQUIRED: Push {count} commit(s) to {review_label} now.\n\
         Call: {}\n\n\
         This will create a new PR if the original was merged/closed.",
        request_review_call(session_id, repo_path)
    )
}

/// Reviewers left comments that are still unresolved.
#[must_use]
pub fn address_comments(count: u32, review_label: &str, session_id: &str, repo_path: &str) -> String {
    format!(
        "ACTION REQUIRED: Address {count} unresolved comment(s) on {review_label}.\n\
         1. Call get_pending_feedback to see the comments\n\
         2. Address each comment by making the necessary code changes\n\
         3. Call: {}\n\
         4. Call resolve_comment for each issue you've addressed\n\
         5. {COMMIT_REMINDER}",
        request_review_call(session_id, repo_path)
    )
}

/// CI checks are failing.
#[must_use]
pub fn fix_ci(
    checks: &[FailingCheck],
    review_label: &str,
    session_id: &str,
    repo_path: &str,
) -> String {
    let failure_list = checks
        .iter()
        .map(|check| {
            format!(
                "  • **{}**: {}",
                check.name,
                check.url.as_deref().unwrap_or("no URL")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "ACTION REQUIRED: Fix {} failing CI check(s) on {review_label}.\n\n\
         {failure_list}\n\n\
         1. Review the CI logs at the URLs above\n\
         2. Fix the failing tests or checks\n\
         3. {COMMIT_REMINDER}\n\
         4. Call: {}",
        checks.len(),
        request_review_call(session_id, repo_path)
    )
}

/// The review was merged or closed; the agent should end its session.
#[must_use]
pub fn end_session(review_label: &str, state: &str) -> String {
    format!(
        "ACTION REQUIRED: End this session - {review_label} has been {state}.\n\n\
         Run: `kill -INT $PPID`"
    )
}
