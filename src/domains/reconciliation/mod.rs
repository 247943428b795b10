//! Per-worktree info snapshots combining git status, pull requests and
//! terminal liveness.

pub mod refresher;


pub use refresher::{
    GitInfo, PullRequestFetch, RefreshOutcome, WorktreeInfoRefresher, WorktreeRefresh,
};

use crate::domains::github::GithubPullRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfoSnapshot {
    pub worktree_id: String,
    pub branch: String,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    pub is_dirty: bool,
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
    pub pull_request: Option<GithubPullRequest>,
    pub terminal_alive: bool,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl WorktreeInfoSnapshot {
    fn empty(worktree_id: &str, branch: &str) -> Self {
        Self {
            worktree_id: worktree_id.to_string(),
            branch: branch.to_string(),
            ahead: None,
            behind: None,
            is_dirty: false,
            staged: 0,
            unstaged: 0,
            untracked: 0,
            pull_request: None,
            terminal_alive: false,
            refreshed_at: None,
        }
    }

    fn apply_git(&mut self, info: &GitInfo) {
        self.branch = info.branch.clone();
        self.ahead = info.ahead_behind.map(|counts| counts.ahead);
        self.behind = info.ahead_behind.map(|counts| counts.behind);
        self.is_dirty = info.status.has_changes();
        self.staged = info.status.staged;
        self.unstaged = info.status.unstaged;
        self.untracked = info.status.untracked;
    }
}

#[derive(Debug, Clone)]
pub enum ReconciliationEvent {
    Refreshed(RefreshOutcome),
    TerminalLiveness { worktree_id: String, alive: bool },
    WorktreeRemoved { worktree_id: String },
}

/// Latest snapshot per worktree id. A failed refresh leaves the previous
/// values in place instead of blanking them.
#[derive(Debug, Default)]
pub struct WorktreeInfoStore {
    snapshots: HashMap<String, WorktreeInfoSnapshot>,
}

impl WorktreeInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, worktree_id: &str) -> Option<&WorktreeInfoSnapshot> {
        self.snapshots.get(worktree_id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn apply(&mut self, event: ReconciliationEvent) {
        match event {
            ReconciliationEvent::Refreshed(outcome) => self.merge(outcome),
            ReconciliationEvent::TerminalLiveness { worktree_id, alive } => {
                if let Some(snapshot) = self.snapshots.get_mut(&worktree_id) {
                    snapshot.terminal_alive = alive;
                }
            }
            ReconciliationEvent::WorktreeRemoved { worktree_id } => {
                self.snapshots.remove(&worktree_id);
            }
        }
    }

    fn merge(&mut self, outcome: RefreshOutcome) {
        for entry in outcome.worktrees {
            let snapshot = self
                .snapshots
                .entry(entry.worktree_id.clone())
                .or_insert_with(|| WorktreeInfoSnapshot::empty(&entry.worktree_id, &entry.branch));

            match &entry.git {
                Ok(info) => snapshot.apply_git(info),
                Err(err) => log::warn!(
                    "[Reconciliation] Keeping previous git info for {}: {err}",
                    entry.worktree_id
                ),
            }

            match &outcome.pull_requests {
                PullRequestFetch::Fetched(by_branch) => {
                    // Only a PR whose head is this worktree's branch belongs to it.
                    snapshot.pull_request = by_branch
                        .get(&snapshot.branch)
                        .filter(|pr| pr.head_ref_name == snapshot.branch)
                        .cloned();
                }
                PullRequestFetch::Skipped => snapshot.pull_request = None,
                PullRequestFetch::Failed(_) => {}
            }

            snapshot.terminal_alive = entry.terminal_alive;
            snapshot.refreshed_at = Some(outcome.finished_at);
        }

        if let PullRequestFetch::Failed(err) = &outcome.pull_requests {
            log::warn!("[Reconciliation] Pull request refresh failed, keeping previous data: {err}");
        }
    }
}
