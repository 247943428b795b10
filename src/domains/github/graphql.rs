//! Batched pull-request lookup over GitHub's GraphQL API.

use super::models::{GithubPullRequest, GithubPullRequestCheck, PullRequestState};
use super::GithubCliError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const PULL_REQUESTS_PER_BRANCH: usize = 5;
const CHECKS_PER_PULL_REQUEST: usize = 100;

/// Query text plus the `alias -> branch` mapping needed to decode the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    pub query: String,
    pub aliases: Vec<(String, String)>,
}

pub fn escape_graphql_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

const PULL_REQUEST_FIELDS: &str = "\
      nodes {
        number
        title
        state
        additions
        deletions
        isDraft
        reviewDecision
        mergeable
        mergeStateStatus
        url
        updatedAt
        headRefName
        baseRefName
        commits { totalCount }
        author { login }
        headRepository {
          name
          owner { login }
        }
        statusCheckRollup {
          contexts(first: CHECK_LIMIT) {
            nodes {
              ... on CheckRun {
                name
                status
                conclusion
                startedAt
                completedAt
                detailsUrl
              }
              ... on StatusContext {
                context
                state
                targetUrl
                createdAt
              }
            }
          }
        }
      }";

/// One aliased `pullRequests` selection per branch, aliases `branch<i>` in input order.
pub fn build_batch_query(branches: &[String]) -> BatchQuery {
    let fields = PULL_REQUEST_FIELDS.replace("CHECK_LIMIT", &CHECKS_PER_PULL_REQUEST.to_string());
    let mut aliases = Vec::with_capacity(branches.len());
    let mut selections = Vec::with_capacity(branches.len());

    for (index, branch) in branches.iter().enumerate() {
        let alias = format!("branch{index}");
        selections.push(format!(
            "    {alias}: pullRequests(first: {PULL_REQUESTS_PER_BRANCH}, states: [OPEN, MERGED], headRefName: \"{}\", orderBy: {{field: UPDATED_AT, direction: DESC}}) {{\n{fields}\n    }}",
            escape_graphql_string(branch)
        ));
        aliases.push((alias, branch.clone()));
    }

    let query = format!(
        "query($owner: String!, $repo: String!) {{\n  repository(owner: $owner, name: $repo) {{\n{}\n  }}\n}}",
        selections.join("\n")
    );
    BatchQuery { query, aliases }
}

#[derive(Deserialize)]
struct Response {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

#[derive(Deserialize)]
struct ResponseData {
    repository: Option<HashMap<String, Option<Connection<RawPullRequest>>>>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u64,
}

#[derive(Deserialize)]
struct RawRepository {
    name: String,
    owner: Login,
}

#[derive(Deserialize)]
struct Rollup {
    contexts: Option<Connection<RawCheck>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullRequest {
    number: u64,
    title: String,
    state: PullRequestState,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    is_draft: bool,
    review_decision: Option<String>,
    mergeable: Option<String>,
    merge_state_status: Option<String>,
    url: String,
    updated_at: Option<DateTime<Utc>>,
    head_ref_name: String,
    #[serde(default)]
    base_ref_name: String,
    commits: Option<TotalCount>,
    author: Option<Login>,
    head_repository: Option<RawRepository>,
    status_check_rollup: Option<Rollup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCheck {
    name: Option<String>,
    context: Option<String>,
    status: Option<String>,
    conclusion: Option<String>,
    state: Option<String>,
    details_url: Option<String>,
    target_url: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl RawCheck {
    fn into_check(self) -> Option<GithubPullRequestCheck> {
        let name = self.name.or(self.context)?;
        Some(GithubPullRequestCheck {
            name,
            status: self.status,
            conclusion: self.conclusion,
            state: self.state,
            details_url: self.details_url.or(self.target_url),
            started_at: self.started_at.or(self.created_at),
            completed_at: self.completed_at,
        })
    }
}

impl RawPullRequest {
    /// A fork PR with the same branch name must not be attributed to our branch.
    fn belongs_to(&self, branch: &str, owner: &str, repo: &str) -> bool {
        if self.head_ref_name != branch {
            return false;
        }
        match &self.head_repository {
            Some(head) => {
                head.owner.login.eq_ignore_ascii_case(owner) && head.name.eq_ignore_ascii_case(repo)
            }
            None => true,
        }
    }

    fn into_pull_request(self) -> GithubPullRequest {
        let checks = self
            .status_check_rollup
            .and_then(|rollup| rollup.contexts)
            .map(|contexts| {
                contexts
                    .nodes
                    .into_iter()
                    .flatten()
                    .filter_map(RawCheck::into_check)
                    .collect()
            })
            .unwrap_or_default();

        GithubPullRequest {
            number: self.number,
            title: self.title,
            state: self.state,
            additions: self.additions,
            deletions: self.deletions,
            is_draft: self.is_draft,
            review_decision: self.review_decision,
            mergeable: self.mergeable,
            merge_state_status: self.merge_state_status,
            url: self.url,
            updated_at: self.updated_at,
            head_ref_name: self.head_ref_name,
            base_ref_name: self.base_ref_name,
            commits_count: self.commits.map(|c| c.total_count).unwrap_or_default(),
            author_login: self.author.map(|a| a.login),
            checks,
        }
    }
}

/// Maps each aliased branch to its most recently updated matching PR.
/// Branches without a match are absent from the result.
pub fn decode_batch_response(
    output: &str,
    aliases: &[(String, String)],
    owner: &str,
    repo: &str,
) -> Result<HashMap<String, GithubPullRequest>, GithubCliError> {
    let response: Response = serde_json::from_str(output)
        .map_err(|e| GithubCliError::InvalidOutput(format!("GraphQL response: {e}")))?;

    let Some(mut repository) = response.data.and_then(|data| data.repository) else {
        if let Some(error) = response.errors.first() {
            return Err(GithubCliError::CommandFailed(error.message.clone()));
        }
        return Ok(HashMap::new());
    };

    let mut by_branch = HashMap::new();
    for (alias, branch) in aliases {
        let Some(Some(connection)) = repository.remove(alias) else {
            continue;
        };
        let matching = connection
            .nodes
            .into_iter()
            .flatten()
            .find(|pr| pr.belongs_to(branch, owner, repo));
        if let Some(pr) = matching {
            by_branch.insert(branch.clone(), pr.into_pull_request());
        }
    }
    Ok(by_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::github::models::CheckSummary;
    use serde_json::json;

    fn branches(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn escaping_covers_quotes_backslashes_and_whitespace() {
        assert_eq!(
            escape_graphql_string("a\"b\\c\nd\re\tf"),
            "a\\\"b\\\\c\\nd\\re\\tf"
        );
    }

    #[test]
    fn query_uses_sequential_aliases_and_escaped_names() {
        let batch = build_batch_query(&branches(&["main", "feat/\"quoted\""]));
        assert_eq!(
            batch.aliases,
            vec![
                ("branch0".to_string(), "main".to_string()),
                ("branch1".to_string(), "feat/\"quoted\"".to_string()),
            ]
        );
        assert!(batch.query.contains("branch0: pullRequests(first: 5, states: [OPEN, MERGED], headRefName: \"main\""));
        assert!(batch.query.contains("headRefName: \"feat/\\\"quoted\\\"\""));
        assert!(batch.query.contains("orderBy: {field: UPDATED_AT, direction: DESC}"));
        assert!(batch.query.contains("contexts(first: 100)"));
        assert!(batch.query.starts_with("query($owner: String!, $repo: String!)"));
    }

    fn pr_node(number: u64, head: &str, owner: &str) -> serde_json::Value {
        json!({
            "number": number,
            "title": format!("PR {number}"),
            "state": "OPEN",
            "additions": 10,
            "deletions": 2,
            "isDraft": false,
            "reviewDecision": null,
            "mergeable": "MERGEABLE",
            "mergeStateStatus": "CLEAN",
            "url": format!("https://github.com/{owner}/app/pull/{number}"),
            "updatedAt": "2024-06-01T12:00:00Z",
            "headRefName": head,
            "baseRefName": "main",
            "commits": { "totalCount": 3 },
            "author": { "login": "octocat" },
            "headRepository": { "name": "app", "owner": { "login": owner } },
            "statusCheckRollup": {
                "contexts": {
                    "nodes": [
                        { "name": "build", "status": "COMPLETED", "conclusion": "SUCCESS",
                          "startedAt": null, "completedAt": null, "detailsUrl": null },
                        { "context": "ci/lint", "state": "FAILURE", "targetUrl": "https://ci", "createdAt": null },
                        {}
                    ]
                }
            }
        })
    }

    #[test]
    fn decode_picks_first_matching_node_per_branch() {
        let response = json!({
            "data": { "repository": {
                "branch0": { "nodes": [pr_node(7, "otter", "someone-else"), pr_node(5, "otter", "Acme")] },
                "branch1": { "nodes": [] },
                "branch2": { "nodes": [pr_node(9, "not-heron", "acme")] }
            }}
        });
        let aliases = vec![
            ("branch0".to_string(), "otter".to_string()),
            ("branch1".to_string(), "badger".to_string()),
            ("branch2".to_string(), "heron".to_string()),
        ];

        let decoded =
            decode_batch_response(&response.to_string(), &aliases, "acme", "app").unwrap();

        assert_eq!(decoded.len(), 1);
        let pr = &decoded["otter"];
        assert_eq!(pr.number, 5);
        assert_eq!(pr.commits_count, 3);
        assert_eq!(pr.checks.len(), 2);
        assert_eq!(
            pr.check_summary(),
            CheckSummary {
                passed: 1,
                failed: 1,
                pending: 0
            }
        );
        assert_eq!(pr.checks[1].details_url.as_deref(), Some("https://ci"));
    }

    #[test]
    fn graphql_errors_without_data_fail() {
        let response = json!({ "data": null, "errors": [{ "message": "Could not resolve to a Repository" }] });
        let err = decode_batch_response(&response.to_string(), &[], "acme", "app").unwrap_err();
        assert!(matches!(err, GithubCliError::CommandFailed(msg) if msg.contains("Could not resolve")));
    }

    #[test]
    fn malformed_json_is_invalid_output() {
        let err = decode_batch_response("{not json", &[], "acme", "app").unwrap_err();
        assert!(matches!(err, GithubCliError::InvalidOutput(_)));
    }
}
