use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const AUTOMATIC_OPEN_ACTION_ID: &str = "automatic";

fn default_true() -> bool {
    true
}

fn default_archive_output_max_lines() -> usize {
    200
}

fn default_open_action_id() -> String {
    AUTOMATIC_OPEN_ACTION_ID.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestMergeStrategy {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl PullRequestMergeStrategy {
    /// Flag passed to `gh pr merge`.
    pub fn gh_argument(self) -> &'static str {
        match self {
            PullRequestMergeStrategy::Merge => "--merge",
            PullRequestMergeStrategy::Squash => "--squash",
            PullRequestMergeStrategy::Rebase => "--rebase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_true")]
    pub github_integration_enabled: bool,
    #[serde(default = "default_true")]
    pub delete_branch_on_archive: bool,
    #[serde(default = "default_archive_output_max_lines")]
    pub archive_output_max_lines: usize,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            github_integration_enabled: true,
            delete_branch_on_archive: true,
            archive_output_max_lines: default_archive_output_max_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySettings {
    #[serde(default)]
    pub setup_script: String,
    #[serde(default)]
    pub archive_script: String,
    #[serde(default)]
    pub run_script: String,
    #[serde(rename = "openActionID", default = "default_open_action_id")]
    pub open_action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_base_ref: Option<String>,
    #[serde(default)]
    pub copy_ignored_on_worktree_create: bool,
    #[serde(default)]
    pub copy_untracked_on_worktree_create: bool,
    #[serde(default)]
    pub pull_request_merge_strategy: PullRequestMergeStrategy,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            setup_script: String::new(),
            archive_script: String::new(),
            run_script: String::new(),
            open_action_id: default_open_action_id(),
            worktree_base_ref: None,
            copy_ignored_on_worktree_create: false,
            copy_untracked_on_worktree_create: false,
            pull_request_merge_strategy: PullRequestMergeStrategy::Merge,
        }
    }
}

/// The global settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositorySettings>,
    #[serde(default)]
    pub repository_roots: Vec<String>,
    #[serde(rename = "pinnedWorktreeIDs", default)]
    pub pinned_worktree_ids: Vec<String>,
    #[serde(rename = "lastFocusedWorktreeID", default)]
    pub last_focused_worktree_id: Option<String>,
}
