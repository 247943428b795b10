use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorktreeCreationStage {
    LoadingLocalBranches,
    ChoosingWorktreeName,
    CheckingRepositoryMode,
    ResolvingBaseReference,
    CreatingWorktree,
}

/// Snapshot emitted before each creation stage starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeCreationProgress {
    pub stage: WorktreeCreationStage,
    pub worktree_name: Option<String>,
    pub base_ref: Option<String>,
    pub copy_ignored: bool,
    pub copy_untracked: bool,
    pub ignored_files_to_copy_count: Option<usize>,
    pub untracked_files_to_copy_count: Option<usize>,
}

impl WorktreeCreationProgress {
    pub fn new(stage: WorktreeCreationStage) -> Self {
        Self {
            stage,
            worktree_name: None,
            base_ref: None,
            copy_ignored: false,
            copy_untracked: false,
            ignored_files_to_copy_count: None,
            untracked_files_to_copy_count: None,
        }
    }

    pub fn title_text(&self) -> String {
        match self.worktree_name.as_deref() {
            Some(name) if !name.is_empty() => format!("Creating {name}"),
            _ => "Creating worktree".to_string(),
        }
    }

    pub fn detail_text(&self) -> String {
        match self.stage {
            WorktreeCreationStage::LoadingLocalBranches => "Reading local branches".to_string(),
            WorktreeCreationStage::ChoosingWorktreeName => {
                "Choosing available worktree name".to_string()
            }
            WorktreeCreationStage::CheckingRepositoryMode => "Checking repository mode".to_string(),
            WorktreeCreationStage::ResolvingBaseReference => {
                format!("Resolving base reference ({})", self.base_ref_display())
            }
            WorktreeCreationStage::CreatingWorktree => {
                let ignored = if self.copy_ignored {
                    self.ignored_files_to_copy_count.unwrap_or(0)
                } else {
                    0
                };
                let untracked = if self.copy_untracked {
                    self.untracked_files_to_copy_count.unwrap_or(0)
                } else {
                    0
                };
                format!(
                    "Creating from {}. Copying {ignored} ignored files and copying {untracked} untracked files",
                    self.base_ref_branch_display()
                )
            }
        }
    }

    fn base_ref_display(&self) -> &str {
        match self.base_ref.as_deref() {
            Some(base_ref) if !base_ref.is_empty() => base_ref,
            _ => "HEAD",
        }
    }

    fn base_ref_branch_display(&self) -> String {
        let base_ref = self.base_ref_display();
        match base_ref.to_lowercase().as_str() {
            "main" | "origin/main" => "main branch".to_string(),
            "head" => "HEAD".to_string(),
            _ => format!("{base_ref} branch"),
        }
    }
}

/// Live view of a running archive script, keeping only the newest lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveScriptProgress {
    pub title_text: String,
    pub detail_text: String,
    pub command_text: Option<String>,
    pub output_lines: Vec<String>,
}

impl ArchiveScriptProgress {
    pub fn new(title_text: impl Into<String>, detail_text: impl Into<String>) -> Self {
        Self {
            title_text: title_text.into(),
            detail_text: detail_text.into(),
            command_text: None,
            output_lines: Vec::new(),
        }
    }

    pub fn append_output_line(&mut self, line: impl Into<String>, max_lines: usize) {
        let line = line.into();
        self.detail_text = line.clone();
        self.output_lines.push(line);
        if self.output_lines.len() > max_lines {
            let excess = self.output_lines.len() - max_lines;
            self.output_lines.drain(..excess);
        }
    }
}
