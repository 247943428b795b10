use crate::domains::git::Worktree;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertActionRole {
    Destructive,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertAction {
    pub title: String,
    pub role: Option<AlertActionRole>,
}

impl AlertAction {
    fn new(title: &str, role: Option<AlertActionRole>) -> Self {
        Self {
            title: title.to_string(),
            role,
        }
    }
}

/// What the destructive action of an alert does when chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ConfirmAction {
    #[serde(rename_all = "camelCase")]
    ForceRemoveWorktree { worktree_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAlert {
    pub title: String,
    pub message: String,
    pub actions: Vec<AlertAction>,
    pub confirm: Option<ConfirmAction>,
}

impl AppAlert {
    /// A dismissible alert with a single OK button.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            actions: vec![AlertAction::new("OK", None)],
            confirm: None,
        }
    }

    pub fn confirm_dirty_removal(worktree: &Worktree) -> Self {
        Self {
            title: "Worktree has uncommitted changes".to_string(),
            message: format!(
                "Remove {}? This deletes the worktree directory and its branch.",
                worktree.name
            ),
            actions: vec![
                AlertAction::new("Remove anyway", Some(AlertActionRole::Destructive)),
                AlertAction::new("Cancel", Some(AlertActionRole::Cancel)),
            ],
            confirm: Some(ConfirmAction::ForceRemoveWorktree {
                worktree_id: worktree.id.clone(),
            }),
        }
    }
}
