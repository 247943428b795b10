use crate::domains::git::{AheadBehind, GitClient, GitClientError, GitStatusSummary, Worktree};
use crate::domains::github::{parse_github_remote, GithubCliError, GithubClient, GithubPullRequest};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const DETACHED_HEAD: &str = "(detached)";
const ORIGIN: &str = "origin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub branch: String,
    pub status: GitStatusSummary,
    pub ahead_behind: Option<AheadBehind>,
}

#[derive(Debug, Clone)]
pub struct WorktreeRefresh {
    pub worktree_id: String,
    /// Branch the worktree was listed with; used until git reports one.
    pub branch: String,
    pub git: Result<GitInfo, Arc<GitClientError>>,
    pub terminal_alive: bool,
}

#[derive(Debug, Clone)]
pub enum PullRequestFetch {
    /// Integration disabled, no GitHub remote, or `gh` unavailable.
    Skipped,
    Fetched(HashMap<String, GithubPullRequest>),
    Failed(GithubCliError),
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub worktrees: Vec<WorktreeRefresh>,
    pub pull_requests: PullRequestFetch,
    pub finished_at: DateTime<Utc>,
}

/// Collects git status for every worktree of a repository concurrently, then
/// fetches pull requests for the resulting branches in one batch.
pub struct WorktreeInfoRefresher {
    git: Arc<dyn GitClient>,
    github: Arc<dyn GithubClient>,
}

impl WorktreeInfoRefresher {
    pub fn new(git: Arc<dyn GitClient>, github: Arc<dyn GithubClient>) -> Self {
        Self { git, github }
    }

    pub async fn refresh(
        &self,
        root: &Path,
        worktrees: &[Worktree],
        github_enabled: bool,
        terminal_alive: impl Fn(&str) -> bool,
    ) -> RefreshOutcome {
        let git_results = join_all(worktrees.iter().map(|worktree| self.git_info(worktree))).await;

        let entries: Vec<WorktreeRefresh> = worktrees
            .iter()
            .zip(git_results)
            .map(|(worktree, git)| WorktreeRefresh {
                worktree_id: worktree.id.clone(),
                branch: worktree.name.clone(),
                git: git.map_err(Arc::new),
                terminal_alive: terminal_alive(&worktree.id),
            })
            .collect();

        let pull_requests = if github_enabled {
            let branches: Vec<String> = entries
                .iter()
                .map(|entry| match &entry.git {
                    Ok(info) => info.branch.clone(),
                    Err(_) => entry.branch.clone(),
                })
                .collect();
            self.pull_requests(root, &branches).await
        } else {
            PullRequestFetch::Skipped
        };

        RefreshOutcome {
            worktrees: entries,
            pull_requests,
            finished_at: Utc::now(),
        }
    }

    async fn git_info(&self, worktree: &Worktree) -> Result<GitInfo, GitClientError> {
        let path = worktree.working_directory.as_path();
        let (status, ahead_behind) = tokio::join!(self.git.status(path), self.git.ahead_behind(path));
        let status = status?;
        let ahead_behind = ahead_behind?;
        let branch = status
            .branch_head
            .clone()
            .filter(|head| head != DETACHED_HEAD)
            .unwrap_or_else(|| worktree.name.clone());
        Ok(GitInfo {
            branch,
            status,
            ahead_behind,
        })
    }

    async fn pull_requests(&self, root: &Path, branches: &[String]) -> PullRequestFetch {
        let url = match self.git.remote_url(root, ORIGIN).await {
            Ok(Some(url)) => url,
            Ok(None) => return PullRequestFetch::Skipped,
            Err(err) => {
                log::debug!("[Reconciliation] No origin remote for {}: {err}", root.display());
                return PullRequestFetch::Skipped;
            }
        };
        let Some(remote) = parse_github_remote(&url) else {
            log::debug!("[Reconciliation] {url} is not a GitHub remote");
            return PullRequestFetch::Skipped;
        };
        if !self.github.is_available().await {
            return PullRequestFetch::Skipped;
        }

        match self
            .github
            .batch_pull_requests(&remote.host, &remote.owner, &remote.repo, branches)
            .await
        {
            Ok(prs) => PullRequestFetch::Fetched(prs),
            Err(err) => PullRequestFetch::Failed(err),
        }
    }
}
