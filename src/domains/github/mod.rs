pub mod cli;
pub mod graphql;
pub mod models;
pub mod remote;


pub use cli::{GithubCli, GithubClient, BATCH_CHUNK_SIZE, BATCH_MAX_CONCURRENT_REQUESTS};
pub use models::{
    CheckOutcome, CheckSummary, GithubAuthStatus, GithubPullRequest, GithubPullRequestCheck,
    GithubWorkflowRun, PullRequestState,
};
pub use remote::{parse_github_remote, GithubRemote};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GithubCliError {
    #[error("The installed GitHub CLI is too old. Update gh to use GitHub integration.")]
    Outdated,
    #[error("GitHub CLI (gh) is not installed or not on PATH.")]
    Unavailable,
    #[error("{0}")]
    CommandFailed(String),
    #[error("Unexpected GitHub CLI output: {0}")]
    InvalidOutput(String),
}
