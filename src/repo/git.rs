//! `git` CLI implementation of [`GitOperations`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::ReviewLoopError;
use crate::testing::{GitOperations, MergeTreeOutcome};

/// Runs the real `git` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(root: &Path, args: &[&str]) -> Result<Output> {
        debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(root)
            // Fail fast instead of waiting on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes -o ConnectTimeout=10")
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))
    }

    fn stdout(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn failure(operation: &str, output: &Output) -> anyhow::Error {
        ReviewLoopError::git(
            operation,
            format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        )
        .into()
    }
}

#[async_trait]
impl GitOperations for GitCli {
    async fn current_branch(&self, root: &Path) -> Result<String> {
        let output = Self::run(root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if !output.status.success() {
            return Err(Self::failure("rev-parse", &output));
        }
        Ok(Self::stdout(&output))
    }

    async fn ref_exists(&self, root: &Path, reference: &str) -> Result<bool> {
        let output = Self::run(root, &["rev-parse", "--verify", "--quiet", reference]).await?;
        Ok(output.status.success())
    }

    async fn status_porcelain(&self, root: &Path) -> Result<String> {
        let output = Self::run(root, &["status", "--porcelain"]).await?;
        if !output.status.success() {
            return Err(Self::failure("status", &output));
        }
        // Leading spaces are significant in porcelain output; only trim line ends
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    async fn count_commits(&self, root: &Path, range: &str) -> Result<u32> {
        let output = Self::run(root, &["rev-list", "--count", range]).await?;
        if !output.status.success() {
            return Err(Self::failure("rev-list", &output));
        }
        Self::stdout(&output)
            .parse()
            .with_context(|| format!("Unexpected rev-list output for {range}"))
    }

    async fn fetch(
        &self,
        root: &Path,
        remote: &str,
        branch: &str,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, Self::run(root, &["fetch", remote, branch])).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(Self::failure("fetch", &output)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReviewLoopError::GitTimeout {
                operation: "fetch".to_string(),
                timeout,
            }
            .into()),
        }
    }

    async fn is_ancestor(&self, root: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = Self::run(root, &["merge-base", "--is-ancestor", ancestor, descendant]).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Self::failure("merge-base", &output)),
        }
    }

    async fn merge_tree(&self, root: &Path, ours: &str, theirs: &str) -> Result<MergeTreeOutcome> {
        // --write-tree needs git 2.38+; older versions exit with a usage error
        let output = Self::run(root, &["merge-tree", "--write-tree", ours, theirs]).await?;
        match output.status.code() {
            Some(0) => Ok(MergeTreeOutcome::clean()),
            Some(1) => Ok(MergeTreeOutcome::conflicted(
                String::from_utf8_lossy(&output.stdout).to_string(),
            )),
            Some(code) => bail!(
                "git merge-tree exited with {code}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            None => bail!("git merge-tree terminated by signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoInspector;
    use std::process::Command as StdCommand;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("Failed to run git");
        assert!(status.status.success(), "git {:?} failed", args);
    }

    fn init_repo() -> TempDir {
        let temp = TempDir::new().unwrap();
        git(temp.path(), &["init", "-b", "main"]);
        git(temp.path(), &["config", "user.email", "test@example.com"]);
        git(temp.path(), &["config", "user.name", "Test User"]);
        git(temp.path(), &["config", "commit.gpgsign", "false"]);
        std::fs::write(temp.path().join("README.md"), "# test\n").unwrap();
        git(temp.path(), &["add", "."]);
        git(temp.path(), &["commit", "-m", "Initial commit"]);
        temp
    }

    #[tokio::test]
    async fn test_current_branch() {
        let repo = init_repo();
        git(repo.path(), &["checkout", "-b", "feature/widgets"]);

        let branch = GitCli::new().current_branch(repo.path()).await.unwrap();
        assert_eq!(branch, "feature/widgets");
    }

    #[tokio::test]
    async fn test_current_branch_outside_repo_fails() {
        let temp = TempDir::new().unwrap();
        assert!(GitCli::new().current_branch(temp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_ref_exists() {
        let repo = init_repo();
        let git_cli = GitCli::new();
        assert!(git_cli.ref_exists(repo.path(), "main").await.unwrap());
        assert!(!git_cli.ref_exists(repo.path(), "origin/main").await.unwrap());
    }

    #[tokio::test]
    async fn test_status_porcelain_keeps_leading_status_columns() {
        let repo = init_repo();
        std::fs::write(repo.path().join("README.md"), "# changed\n").unwrap();
        std::fs::write(repo.path().join("new.txt"), "new\n").unwrap();

        let status = GitCli::new().status_porcelain(repo.path()).await.unwrap();
        let lines: Vec<&str> = status.lines().collect();
        assert!(lines.contains(&" M README.md"));
        assert!(lines.contains(&"?? new.txt"));
    }

    #[tokio::test]
    async fn test_count_commits() {
        let repo = init_repo();
        git(repo.path(), &["checkout", "-b", "feature"]);
        std::fs::write(repo.path().join("a.txt"), "a\n").unwrap();
        git(repo.path(), &["add", "."]);
        git(repo.path(), &["commit", "-m", "a"]);

        let count = GitCli::new()
            .count_commits(repo.path(), "main..HEAD")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_is_ancestor() {
        let repo = init_repo();
        git(repo.path(), &["checkout", "-b", "feature"]);
        std::fs::write(repo.path().join("a.txt"), "a\n").unwrap();
        git(repo.path(), &["add", "."]);
        git(repo.path(), &["commit", "-m", "a"]);

        let git_cli = GitCli::new();
        assert!(git_cli.is_ancestor(repo.path(), "main", "HEAD").await.unwrap());
        assert!(!git_cli.is_ancestor(repo.path(), "HEAD", "main").await.unwrap());
    }

    fn commit_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        git(dir, &["add", name]);
        git(dir, &["commit", "-m", name]);
    }

    #[tokio::test]
    async fn test_merge_tree_reports_conflicting_file() {
        let repo = init_repo();
        git(repo.path(), &["checkout", "-b", "feature"]);
        commit_file(repo.path(), "f", "feature\n");
        git(repo.path(), &["checkout", "main"]);
        commit_file(repo.path(), "f", "main\n");
        git(repo.path(), &["checkout", "feature"]);

        let outcome = GitCli::new()
            .merge_tree(repo.path(), "HEAD", "main")
            .await
            .unwrap();
        assert!(!outcome.clean);
        assert_eq!(crate::repo::parse_conflict_paths(&outcome.output), vec!["f"]);
    }

    #[tokio::test]
    async fn test_merge_tree_clean_merge() {
        let repo = init_repo();
        git(repo.path(), &["checkout", "-b", "feature"]);
        commit_file(repo.path(), "a.txt", "a\n");
        git(repo.path(), &["checkout", "main"]);
        commit_file(repo.path(), "b.txt", "b\n");
        git(repo.path(), &["checkout", "feature"]);

        let outcome = GitCli::new()
            .merge_tree(repo.path(), "HEAD", "main")
            .await
            .unwrap();
        assert!(outcome.clean);
        assert!(crate::repo::parse_conflict_paths(&outcome.output).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_from_local_remote() {
        let upstream = init_repo();
        let repo = init_repo();
        let url = upstream.path().display().to_string();
        git(repo.path(), &["remote", "add", "origin", &url]);

        let git_cli = GitCli::new();
        git_cli
            .fetch(repo.path(), "origin", "main", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(git_cli.ref_exists(repo.path(), "origin/main").await.unwrap());
    }

    #[tokio::test]
    async fn test_inspector_finds_conflict_with_fetched_default_branch() {
        let upstream = init_repo();
        let work = TempDir::new().unwrap();
        let url = upstream.path().display().to_string();
        let dest = work.path().display().to_string();
        git(upstream.path(), &["clone", "-q", &url, &dest]);
        git(work.path(), &["config", "user.email", "test@example.com"]);
        git(work.path(), &["config", "user.name", "Test User"]);
        git(work.path(), &["config", "commit.gpgsign", "false"]);

        git(work.path(), &["checkout", "-b", "feature"]);
        commit_file(work.path(), "README.md", "# feature\n");
        commit_file(upstream.path(), "README.md", "# upstream\n");

        let inspector = RepoInspector::new(Arc::new(GitCli::new()), Duration::from_secs(30));
        let paths = inspector.conflict_probe(work.path(), "feature", "main").await;
        assert_eq!(paths, vec!["README.md"]);
    }

    #[tokio::test]
    async fn test_fetch_without_remote_fails() {
        let repo = init_repo();
        let result = GitCli::new()
            .fetch(repo.path(), "origin", "main", Duration::from_secs(30))
            .await;
        assert!(result.is_err());
    }
}
