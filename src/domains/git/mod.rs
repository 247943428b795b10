pub mod client;
pub mod parsing;

pub use client::{GitCli, GitClient};
pub use parsing::{
    is_dirty_status, parse_ahead_behind_counts, parse_default_branch_from_symbolic_ref,
    parse_git_status_v2, parse_merge_tree_conflict, parse_worktree_porcelain, AheadBehind,
    GitStatusSummary, PorcelainWorktree,
};

use crate::infrastructure::process::ProcessError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A checkout of the repository. `id` is the normalized working-directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Worktree {
    pub id: String,
    pub name: String,
    pub detail: String,
    pub working_directory: PathBuf,
    pub repository_root: PathBuf,
    pub created_at: Option<DateTime<Utc>>,
}

impl Worktree {
    pub fn from_porcelain(entry: &PorcelainWorktree, root: &Path) -> Self {
        Self {
            id: worktree_id(&entry.path),
            name: entry.display_name(),
            detail: worktree_detail(&entry.path, root),
            working_directory: entry.path.clone(),
            repository_root: root.to_path_buf(),
            created_at: None,
        }
    }

    pub fn is_main(&self) -> bool {
        self.working_directory == self.repository_root
    }
}

pub fn worktree_id(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if raw.len() > 1 {
        raw.trim_end_matches('/').to_string()
    } else {
        raw.into_owned()
    }
}

/// Path relative to the repository root (`.` for the root itself). Checkouts
/// outside the root are shown with the home directory abbreviated.
pub fn worktree_detail(path: &Path, root: &Path) -> String {
    if let Ok(relative) = path.strip_prefix(root) {
        let relative = relative.to_string_lossy();
        return if relative.is_empty() {
            ".".to_string()
        } else {
            relative.into_owned()
        };
    }

    if let Some(home) = dirs::home_dir() {
        if let Ok(relative) = path.strip_prefix(&home) {
            return format!("~/{}", relative.to_string_lossy());
        }
    }
    path.to_string_lossy().into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum GitClientError {
    #[error("Bundled wt script not found. Reinstall treedeck or set TREEDECK_WT_SCRIPT to create worktrees.")]
    HelperScriptMissing,
    #[error(transparent)]
    Command(#[from] ProcessError),
    #[error("Unexpected output from `{command}`: {output}")]
    InvalidOutput { command: String, output: String },
    #[error("Could not resolve a git repository for {}", .0.display())]
    RootNotFound(PathBuf),
}
