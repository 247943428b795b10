pub mod engine;
pub mod manager;
pub mod split_tree;
pub mod state;
pub mod tabs;

#[cfg(test)]
mod manager_test;

pub use engine::{PaneId, SurfaceConfig, TabId, TerminalEngine, TerminalEvent};
pub use manager::{TerminalCommand, TerminalOutcome, WorktreeTerminalManager};
pub use split_tree::{SplitAxis, SplitDirection, SplitTree};
pub use state::WorktreeTerminalState;
pub use tabs::{TerminalTab, TerminalTabManager};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerminalError {
    #[error("Terminal engine error: {0}")]
    Engine(String),
    #[error("No terminal session for worktree {0}")]
    UnknownWorktree(String),
    #[error("Unknown terminal tab {0}")]
    UnknownTab(TabId),
    #[error("Unknown terminal pane {0}")]
    UnknownPane(PaneId),
    #[error("No focused terminal pane")]
    NoFocusedPane,
}
