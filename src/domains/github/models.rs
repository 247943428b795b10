use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckOutcome {
    Passed,
    Failed,
    Pending,
}

/// One entry of a PR's status-check rollup, either a CheckRun or a StatusContext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubPullRequestCheck {
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub state: Option<String>,
    pub details_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GithubPullRequestCheck {
    pub fn outcome(&self) -> CheckOutcome {
        if let Some(state) = &self.state {
            return match state.as_str() {
                "SUCCESS" => CheckOutcome::Passed,
                "FAILURE" | "ERROR" => CheckOutcome::Failed,
                _ => CheckOutcome::Pending,
            };
        }

        if self.status.as_deref() != Some("COMPLETED") {
            return CheckOutcome::Pending;
        }
        match self.conclusion.as_deref() {
            Some("SUCCESS") | Some("NEUTRAL") | Some("SKIPPED") => CheckOutcome::Passed,
            Some(_) => CheckOutcome::Failed,
            None => CheckOutcome::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
}

impl CheckSummary {
    pub fn from_checks(checks: &[GithubPullRequestCheck]) -> Self {
        checks
            .iter()
            .fold(CheckSummary::default(), |mut summary, check| {
                match check.outcome() {
                    CheckOutcome::Passed => summary.passed += 1,
                    CheckOutcome::Failed => summary.failed += 1,
                    CheckOutcome::Pending => summary.pending += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.pending
    }

    /// Aggregate state: any failure wins, then pending, then success.
    pub fn overall(&self) -> Option<CheckOutcome> {
        if self.total() == 0 {
            None
        } else if self.failed > 0 {
            Some(CheckOutcome::Failed)
        } else if self.pending > 0 {
            Some(CheckOutcome::Pending)
        } else {
            Some(CheckOutcome::Passed)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubPullRequest {
    pub number: u64,
    pub title: String,
    pub state: PullRequestState,
    pub additions: u64,
    pub deletions: u64,
    pub is_draft: bool,
    pub review_decision: Option<String>,
    pub mergeable: Option<String>,
    pub merge_state_status: Option<String>,
    pub url: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub commits_count: u64,
    pub author_login: Option<String>,
    pub checks: Vec<GithubPullRequestCheck>,
}

impl GithubPullRequest {
    pub fn check_summary(&self) -> CheckSummary {
        CheckSummary::from_checks(&self.checks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubWorkflowRun {
    pub database_id: u64,
    #[serde(default)]
    pub workflow_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubAuthStatus {
    pub username: String,
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_run(status: &str, conclusion: Option<&str>) -> GithubPullRequestCheck {
        GithubPullRequestCheck {
            name: "ci".to_string(),
            status: Some(status.to_string()),
            conclusion: conclusion.map(str::to_string),
            state: None,
            details_url: None,
            started_at: None,
            completed_at: None,
        }
    }

    fn status_context(state: &str) -> GithubPullRequestCheck {
        GithubPullRequestCheck {
            name: "ci/legacy".to_string(),
            status: None,
            conclusion: None,
            state: Some(state.to_string()),
            details_url: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn outcomes_follow_check_kind() {
        assert_eq!(check_run("COMPLETED", Some("SUCCESS")).outcome(), CheckOutcome::Passed);
        assert_eq!(check_run("COMPLETED", Some("SKIPPED")).outcome(), CheckOutcome::Passed);
        assert_eq!(check_run("COMPLETED", Some("TIMED_OUT")).outcome(), CheckOutcome::Failed);
        assert_eq!(check_run("IN_PROGRESS", None).outcome(), CheckOutcome::Pending);
        assert_eq!(status_context("ERROR").outcome(), CheckOutcome::Failed);
        assert_eq!(status_context("EXPECTED").outcome(), CheckOutcome::Pending);
    }

    #[test]
    fn summary_counts_and_overall() {
        let checks = vec![
            check_run("COMPLETED", Some("SUCCESS")),
            check_run("QUEUED", None),
            status_context("SUCCESS"),
        ];
        let summary = CheckSummary::from_checks(&checks);
        assert_eq!(
            summary,
            CheckSummary {
                passed: 2,
                failed: 0,
                pending: 1
            }
        );
        assert_eq!(summary.overall(), Some(CheckOutcome::Pending));
        assert_eq!(CheckSummary::default().overall(), None);
    }

    #[test]
    fn workflow_run_treats_empty_conclusion_as_none() {
        let run: GithubWorkflowRun = serde_json::from_str(
            r#"{"databaseId":42,"workflowName":"CI","name":"CI","displayTitle":"Fix","status":"in_progress","conclusion":"","createdAt":"2024-05-01T10:00:00Z","updatedAt":"2024-05-01T10:05:00Z"}"#,
        )
        .unwrap();
        assert_eq!(run.database_id, 42);
        assert_eq!(run.conclusion, None);
        assert!(run.created_at.is_some());
    }
}
