pub mod copy;
pub mod names;
pub mod orchestrator;
pub mod progress;


pub use orchestrator::{CreateWorktreeRequest, RemoveWorktreeRequest, WorktreeOrchestrator};
pub use progress::{ArchiveScriptProgress, WorktreeCreationProgress, WorktreeCreationStage};

use crate::domains::git::GitClientError;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Open a repository to create a worktree.")]
    NoRepositories,
    #[error("All worktree names are already in use. Choose a name manually.")]
    NamesExhausted,
    #[error("A worktree or branch named {0} already exists.")]
    NameTaken(String),
    #[error("{0}")]
    InvalidName(String),
    #[error(transparent)]
    Git(#[from] GitClientError),
    #[error("Failed to copy files into the new worktree: {0}")]
    CopyFailed(#[source] io::Error),
    #[error("Worktree at {} could not be finished or cleaned up ({reason}). Remove it manually.", .path.display())]
    Incomplete { path: PathBuf, reason: String },
    #[error("Archive script failed: {0}")]
    ArchiveScriptFailed(String),
    #[error("{name} has uncommitted changes.")]
    DirtyWorktree { name: String },
    #[error("The main worktree of a repository can't be removed.")]
    MainWorktree,
}
