pub mod git;
pub mod github;
pub mod reconciliation;
pub mod settings;
pub mod terminal;
pub mod worktrees;
