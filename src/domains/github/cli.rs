use super::graphql::{build_batch_query, decode_batch_response};
use super::models::{GithubAuthStatus, GithubPullRequest, GithubWorkflowRun};
use super::GithubCliError;
use crate::domains::settings::PullRequestMergeStrategy;
use crate::infrastructure::process::{display_command, ProcessError, ProcessRunner};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

pub const BATCH_CHUNK_SIZE: usize = 25;
pub const BATCH_MAX_CONCURRENT_REQUESTS: usize = 3;

const LATEST_RUN_FIELDS: &str =
    "databaseId,workflowName,name,displayTitle,status,conclusion,createdAt,updatedAt";

#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn default_branch(&self, repo_root: &Path) -> Result<String, GithubCliError>;
    async fn latest_run(
        &self,
        repo_root: &Path,
        branch: &str,
    ) -> Result<Option<GithubWorkflowRun>, GithubCliError>;
    /// Fetches PRs for every distinct non-empty branch. Fails as a whole if any
    /// chunk request fails.
    async fn batch_pull_requests(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        branches: &[String],
    ) -> Result<HashMap<String, GithubPullRequest>, GithubCliError>;
    async fn merge_pull_request(
        &self,
        repo_root: &Path,
        number: u64,
        strategy: PullRequestMergeStrategy,
    ) -> Result<(), GithubCliError>;
    async fn mark_pull_request_ready(
        &self,
        repo_root: &Path,
        number: u64,
    ) -> Result<(), GithubCliError>;
    async fn rerun_failed_jobs(&self, repo_root: &Path, run_id: u64) -> Result<(), GithubCliError>;
    async fn failed_run_logs(&self, repo_root: &Path, run_id: u64)
        -> Result<String, GithubCliError>;
    async fn run_logs(&self, repo_root: &Path, run_id: u64) -> Result<String, GithubCliError>;
    async fn is_available(&self) -> bool;
    async fn auth_status(&self) -> Result<Option<GithubAuthStatus>, GithubCliError>;
}

/// `gh` wrapper. Every call goes through the login shell so the user's PATH and
/// credential helpers apply.
pub struct GithubCli<R: ProcessRunner> {
    runner: Arc<R>,
    program: String,
}

impl<R: ProcessRunner> GithubCli<R> {
    pub fn new(runner: Arc<R>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn run_gh(&self, args: Vec<String>, repo_root: Option<&Path>) -> Result<String, GithubCliError> {
        // GraphQL batches carry the whole query text; keep them out of the log.
        if !args.iter().any(|arg| arg == "graphql") {
            log::debug!("[GithubCli] {}", display_command(&self.program, &args));
        }

        match self.runner.run_login(&self.program, &args, repo_root).await {
            Ok(output) => Ok(output.stdout),
            Err(err) => Err(map_process_error(err)),
        }
    }

    async fn fetch_chunk(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        index: usize,
        chunk: &[String],
    ) -> Result<(usize, HashMap<String, GithubPullRequest>), GithubCliError> {
        let batch = build_batch_query(chunk);
        let args = vec![
            "api".to_string(),
            "graphql".to_string(),
            "--hostname".to_string(),
            host.to_string(),
            "-f".to_string(),
            format!("query={}", batch.query),
            "-f".to_string(),
            format!("owner={owner}"),
            "-f".to_string(),
            format!("repo={repo}"),
        ];
        let output = self.run_gh(args, None).await?;
        if output.trim().is_empty() {
            return Ok((index, HashMap::new()));
        }
        let prs = decode_batch_response(&output, &batch.aliases, owner, repo)?;
        Ok((index, prs))
    }
}

fn map_process_error(err: ProcessError) -> GithubCliError {
    if err.is_not_found() {
        return GithubCliError::Unavailable;
    }
    if let ProcessError::Failed {
        exit_code: Some(127),
        ..
    } = &err
    {
        return GithubCliError::Unavailable;
    }
    if is_outdated_cli(err.stdout(), err.stderr()) {
        return GithubCliError::Outdated;
    }
    GithubCliError::CommandFailed(err.to_string())
}

/// Older gh releases lack `--json` on several subcommands.
pub fn is_outdated_cli(stdout: &str, stderr: &str) -> bool {
    let combined = format!("{stdout}\n{stderr}").to_lowercase();
    combined.contains("unknown flag: --json")
        || (combined.contains("unknown shorthand flag") && combined.contains("json"))
}

pub fn deduplicate_branches(branches: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    branches
        .iter()
        .filter(|branch| !branch.is_empty() && seen.insert(branch.as_str()))
        .cloned()
        .collect()
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoViewResponse {
    default_branch_ref: NamedRef,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize)]
struct AuthStatusResponse {
    hosts: BTreeMap<String, Vec<AuthAccount>>,
}

#[derive(Deserialize)]
struct AuthAccount {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    login: String,
}

fn decode<T: for<'de> Deserialize<'de>>(output: &str, what: &str) -> Result<T, GithubCliError> {
    serde_json::from_str(output).map_err(|e| GithubCliError::InvalidOutput(format!("{what}: {e}")))
}

#[async_trait]
impl<R: ProcessRunner + 'static> GithubClient for GithubCli<R> {
    async fn default_branch(&self, repo_root: &Path) -> Result<String, GithubCliError> {
        let output = self
            .run_gh(to_args(&["repo", "view", "--json", "defaultBranchRef"]), Some(repo_root))
            .await?;
        let response: RepoViewResponse = decode(&output, "repo view")?;
        Ok(response.default_branch_ref.name)
    }

    async fn latest_run(
        &self,
        repo_root: &Path,
        branch: &str,
    ) -> Result<Option<GithubWorkflowRun>, GithubCliError> {
        let args = to_args(&[
            "run",
            "list",
            "--branch",
            branch,
            "--limit",
            "1",
            "--json",
            LATEST_RUN_FIELDS,
        ]);
        let output = self.run_gh(args, Some(repo_root)).await?;
        if output.trim().is_empty() {
            return Ok(None);
        }
        let runs: Vec<GithubWorkflowRun> = decode(&output, "run list")?;
        Ok(runs.into_iter().next())
    }

    async fn batch_pull_requests(
        &self,
        host: &str,
        owner: &str,
        repo: &str,
        branches: &[String],
    ) -> Result<HashMap<String, GithubPullRequest>, GithubCliError> {
        let branches = deduplicate_branches(branches);
        if branches.is_empty() {
            return Ok(HashMap::new());
        }
        let chunks: Vec<&[String]> = branches.chunks(BATCH_CHUNK_SIZE).collect();
        log::debug!(
            "[GithubCli] Fetching PRs for {} branches of {owner}/{repo} in {} chunks",
            branches.len(),
            chunks.len()
        );

        // Sliding window: keep at most BATCH_MAX_CONCURRENT_REQUESTS chunk requests in
        // flight and start the next chunk as soon as any finishes.
        let mut pending = chunks.iter().copied().enumerate();
        let mut in_flight = FuturesUnordered::new();
        for (index, chunk) in pending.by_ref().take(BATCH_MAX_CONCURRENT_REQUESTS) {
            in_flight.push(self.fetch_chunk(host, owner, repo, index, chunk));
        }

        let mut by_chunk: BTreeMap<usize, HashMap<String, GithubPullRequest>> = BTreeMap::new();
        while let Some(result) = in_flight.next().await {
            let (index, prs) = result?;
            by_chunk.insert(index, prs);
            if let Some((index, chunk)) = pending.next() {
                in_flight.push(self.fetch_chunk(host, owner, repo, index, chunk));
            }
        }

        Ok(by_chunk.into_values().flatten().collect())
    }

    async fn merge_pull_request(
        &self,
        repo_root: &Path,
        number: u64,
        strategy: PullRequestMergeStrategy,
    ) -> Result<(), GithubCliError> {
        let number = number.to_string();
        self.run_gh(
            to_args(&["pr", "merge", &number, strategy.gh_argument()]),
            Some(repo_root),
        )
        .await
        .map(drop)
    }

    async fn mark_pull_request_ready(
        &self,
        repo_root: &Path,
        number: u64,
    ) -> Result<(), GithubCliError> {
        let number = number.to_string();
        self.run_gh(to_args(&["pr", "ready", &number]), Some(repo_root))
            .await
            .map(drop)
    }

    async fn rerun_failed_jobs(&self, repo_root: &Path, run_id: u64) -> Result<(), GithubCliError> {
        let run_id = run_id.to_string();
        self.run_gh(to_args(&["run", "rerun", &run_id, "--failed"]), Some(repo_root))
            .await
            .map(drop)
    }

    async fn failed_run_logs(
        &self,
        repo_root: &Path,
        run_id: u64,
    ) -> Result<String, GithubCliError> {
        let run_id = run_id.to_string();
        self.run_gh(to_args(&["run", "view", &run_id, "--log-failed"]), Some(repo_root))
            .await
    }

    async fn run_logs(&self, repo_root: &Path, run_id: u64) -> Result<String, GithubCliError> {
        let run_id = run_id.to_string();
        self.run_gh(to_args(&["run", "view", &run_id, "--log"]), Some(repo_root))
            .await
    }

    async fn is_available(&self) -> bool {
        self.run_gh(to_args(&["--version"]), None).await.is_ok()
    }

    async fn auth_status(&self) -> Result<Option<GithubAuthStatus>, GithubCliError> {
        let output = self
            .run_gh(to_args(&["auth", "status", "--json", "hosts"]), None)
            .await?;
        let response: AuthStatusResponse = decode(&output, "auth status")?;
        Ok(response.hosts.into_iter().find_map(|(host, accounts)| {
            accounts
                .into_iter()
                .find(|account| account.active)
                .map(|account| GithubAuthStatus {
                    username: account.login,
                    host,
                })
        }))
    }
}
