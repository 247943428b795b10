//! Control-thread facade over repositories, worktrees, terminal sessions and
//! reconciliation snapshots.

pub mod alerts;


pub use alerts::{AlertAction, AlertActionRole, AppAlert, ConfirmAction};

use crate::domains::git::{GitClient, GitClientError, Worktree};
use crate::domains::github::GithubClient;
use crate::domains::reconciliation::{
    ReconciliationEvent, WorktreeInfoRefresher, WorktreeInfoSnapshot, WorktreeInfoStore,
};
use crate::domains::settings::{
    repository_key, RepositorySettings, RepositorySettingsStore, SettingsError, SettingsStore,
};
use crate::domains::terminal::{
    TerminalCommand, TerminalEngine, TerminalError, TerminalOutcome, WorktreeTerminalManager,
    WorktreeTerminalState,
};
use crate::domains::worktrees::{
    ArchiveScriptProgress, CreateWorktreeRequest, RemoveWorktreeRequest, WorktreeCreationProgress,
    WorktreeError, WorktreeOrchestrator,
};
use crate::infrastructure::config::AppPaths;
use crate::infrastructure::process::ProcessRunner;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Git(#[from] GitClientError),
    #[error(transparent)]
    Worktree(#[from] WorktreeError),
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error("Repository {0} is not open")]
    UnknownRepository(String),
    #[error("Worktree {0} is not known")]
    UnknownWorktree(String),
}

/// A tracked repository. `id` is the normalized root path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
    pub worktrees: Vec<Worktree>,
}

impl Repository {
    fn new(root: PathBuf) -> Self {
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| root.to_string_lossy().into_owned());
        Self {
            id: repository_key(&root),
            name,
            root,
            worktrees: Vec::new(),
        }
    }
}

/// Overrides for a single creation; unset fields come from repository settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewWorktreeOptions {
    pub name: Option<String>,
    pub base_ref: Option<String>,
    pub copy_ignored: Option<bool>,
    pub copy_untracked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// A confirmation alert is now pending.
    NeedsConfirmation,
    /// The failure was turned into an alert.
    Failed,
}

pub struct WorkspaceDependencies {
    pub paths: AppPaths,
    pub runner: Arc<dyn ProcessRunner>,
    pub git: Arc<dyn GitClient>,
    pub github: Arc<dyn GithubClient>,
    pub settings: Arc<SettingsStore>,
    pub repository_settings: Arc<RepositorySettingsStore>,
    pub terminal_engine: Arc<dyn TerminalEngine>,
}

pub struct Workspace {
    git: Arc<dyn GitClient>,
    settings: Arc<SettingsStore>,
    repository_settings: Arc<RepositorySettingsStore>,
    orchestrator: WorktreeOrchestrator,
    refresher: WorktreeInfoRefresher,
    info: WorktreeInfoStore,
    terminals: WorktreeTerminalManager,
    repositories: Vec<Repository>,
    pending_setup_scripts: HashMap<String, String>,
    alert: Option<AppAlert>,
}

impl Workspace {
    pub fn new(deps: WorkspaceDependencies) -> Self {
        Self {
            orchestrator: WorktreeOrchestrator::new(
                Arc::clone(&deps.git),
                deps.runner,
                deps.paths,
            ),
            refresher: WorktreeInfoRefresher::new(Arc::clone(&deps.git), deps.github),
            git: deps.git,
            settings: deps.settings,
            repository_settings: deps.repository_settings,
            info: WorktreeInfoStore::new(),
            terminals: WorktreeTerminalManager::new(deps.terminal_engine),
            repositories: Vec::new(),
            pending_setup_scripts: HashMap::new(),
            alert: None,
        }
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn repository(&self, id: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repository| repository.id == id)
    }

    pub fn worktree(&self, worktree_id: &str) -> Option<&Worktree> {
        self.repositories
            .iter()
            .flat_map(|repository| repository.worktrees.iter())
            .find(|worktree| worktree.id == worktree_id)
    }

    pub fn alert(&self) -> Option<&AppAlert> {
        self.alert.as_ref()
    }

    pub fn dismiss_alert(&mut self) -> Option<AppAlert> {
        self.alert.take()
    }

    pub fn worktree_info(&self, worktree_id: &str) -> Option<&WorktreeInfoSnapshot> {
        self.info.snapshot(worktree_id)
    }

    pub fn terminals(&self) -> &WorktreeTerminalManager {
        &self.terminals
    }

    pub fn pending_setup_script(&self, worktree_id: &str) -> Option<&str> {
        self.pending_setup_scripts.get(worktree_id).map(String::as_str)
    }

    /// Rebuilds the repository list from the persisted roots, in their order.
    pub async fn load(&mut self) {
        let roots = self.settings.snapshot().await.repository_roots;
        self.repositories = roots
            .into_iter()
            .map(|root| Repository::new(PathBuf::from(root)))
            .collect();

        let mut all_loaded = true;
        for index in 0..self.repositories.len() {
            if let Err(err) = self.reload_at(index).await {
                warn!(
                    "[Workspace] Failed to list worktrees of {}: {err}",
                    self.repositories[index].root.display()
                );
                all_loaded = false;
            }
        }
        if all_loaded {
            self.prune_pinned().await;
        }
    }

    /// Resolves `path` to its repository root and starts tracking it.
    pub async fn add_repository(&mut self, path: &Path) -> Result<String, WorkspaceError> {
        let root = self.git.repo_root(path).await?;
        let id = repository_key(&root);
        if self.repository(&id).is_some() {
            debug!("[Workspace] Repository {id} is already open");
            return Ok(id);
        }

        self.repositories.push(Repository::new(root));
        self.persist_roots().await?;
        let index = self.repositories.len() - 1;
        self.reload_at(index).await?;
        info!("[Workspace] Opened repository {id}");
        Ok(id)
    }

    /// Stops tracking a repository. Terminal sessions of its worktrees are
    /// torn down; nothing on disk is touched.
    pub async fn remove_repository(&mut self, id: &str) -> Result<(), WorkspaceError> {
        let index = self.repository_index(id)?;
        let repository = self.repositories.remove(index);
        for worktree in &repository.worktrees {
            self.forget_worktree(&worktree.id);
        }
        self.persist_roots().await?;
        info!("[Workspace] Closed repository {id}");
        Ok(())
    }

    pub async fn reload_worktrees(&mut self, id: &str) -> Result<(), WorkspaceError> {
        let index = self.repository_index(id)?;
        self.reload_at(index).await?;
        self.prune_pinned().await;
        Ok(())
    }

    async fn reload_at(&mut self, index: usize) -> Result<(), WorkspaceError> {
        let root = self.repositories[index].root.clone();
        let worktrees = self.git.worktrees(&root).await?;
        debug!(
            "[Workspace] {} has {} worktrees",
            root.display(),
            worktrees.len()
        );
        self.repositories[index].worktrees = worktrees;
        Ok(())
    }

    fn repository_index(&self, id: &str) -> Result<usize, WorkspaceError> {
        self.repositories
            .iter()
            .position(|repository| repository.id == id)
            .ok_or_else(|| WorkspaceError::UnknownRepository(id.to_string()))
    }

    async fn persist_roots(&self) -> Result<(), WorkspaceError> {
        let roots = self
            .repositories
            .iter()
            .map(|repository| repository.id.clone())
            .collect();
        self.settings.set_repository_roots(roots).await?;
        Ok(())
    }

    async fn prune_pinned(&self) {
        let known: HashSet<&str> = self
            .repositories
            .iter()
            .flat_map(|repository| repository.worktrees.iter())
            .map(|worktree| worktree.id.as_str())
            .collect();
        let result = self
            .settings
            .update(|file| {
                let before = file.pinned_worktree_ids.len();
                file.pinned_worktree_ids.retain(|id| known.contains(id.as_str()));
                before - file.pinned_worktree_ids.len()
            })
            .await;
        match result {
            Ok(0) => {}
            Ok(pruned) => debug!("[Workspace] Pruned {pruned} stale pinned worktrees"),
            Err(err) => warn!("[Workspace] Failed to prune pinned worktrees: {err}"),
        }
    }

    pub async fn pin_worktree(&self, worktree_id: &str) -> Result<(), WorkspaceError> {
        self.settings.pin_worktree(worktree_id).await?;
        Ok(())
    }

    pub async fn unpin_worktree(&self, worktree_id: &str) -> Result<(), WorkspaceError> {
        self.settings.unpin_worktree(worktree_id).await?;
        Ok(())
    }

    pub async fn focus_worktree(&self, worktree_id: &str) -> Result<(), WorkspaceError> {
        self.settings
            .set_last_focused_worktree(Some(worktree_id.to_string()))
            .await?;
        Ok(())
    }

    async fn repository_settings_for(&self, root: &Path) -> RepositorySettings {
        match self.repository_settings.load(root).await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    "[Workspace] Using default settings for {}: {err}",
                    root.display()
                );
                RepositorySettings::default()
            }
        }
    }

    /// Creates a worktree with a random name in the given repository, or the
    /// first one. Failures become an alert and yield `None`.
    pub async fn create_random_worktree(
        &mut self,
        repository_id: Option<&str>,
        report: impl FnMut(WorktreeCreationProgress) + Send,
    ) -> Option<Worktree> {
        self.create_worktree(repository_id, NewWorktreeOptions::default(), report)
            .await
    }

    pub async fn create_worktree(
        &mut self,
        repository_id: Option<&str>,
        options: NewWorktreeOptions,
        report: impl FnMut(WorktreeCreationProgress) + Send,
    ) -> Option<Worktree> {
        match self.try_create_worktree(repository_id, options, report).await {
            Ok(worktree) => Some(worktree),
            Err(err) => {
                warn!("[Workspace] Worktree creation failed: {err}");
                self.alert = Some(AppAlert::error("Unable to create worktree", err.to_string()));
                None
            }
        }
    }

    async fn try_create_worktree(
        &mut self,
        repository_id: Option<&str>,
        options: NewWorktreeOptions,
        report: impl FnMut(WorktreeCreationProgress) + Send,
    ) -> Result<Worktree, WorkspaceError> {
        let index = match repository_id {
            Some(id) => self.repository_index(id)?,
            None if self.repositories.is_empty() => {
                return Err(WorktreeError::NoRepositories.into())
            }
            None => 0,
        };
        let root = self.repositories[index].root.clone();
        let settings = self.repository_settings_for(&root).await;

        let request = CreateWorktreeRequest {
            repository_root: root,
            name: options.name,
            base_ref: options.base_ref,
            configured_base_ref: settings.worktree_base_ref.clone(),
            copy_ignored: options
                .copy_ignored
                .unwrap_or(settings.copy_ignored_on_worktree_create),
            copy_untracked: options
                .copy_untracked
                .unwrap_or(settings.copy_untracked_on_worktree_create),
        };
        let worktree = self.orchestrator.create(&request, report).await?;

        if !settings.setup_script.trim().is_empty() {
            self.pending_setup_scripts
                .insert(worktree.id.clone(), settings.setup_script);
        }
        if let Err(err) = self.reload_at(index).await {
            warn!("[Workspace] Could not reload worktrees after creation: {err}");
        }
        if !self.repositories[index]
            .worktrees
            .iter()
            .any(|existing| existing.id == worktree.id)
        {
            self.repositories[index].worktrees.push(worktree.clone());
        }
        Ok(worktree)
    }

    /// Returns the worktree's terminal state, creating it with one tab on
    /// first use. A pending setup script becomes that tab's initial input.
    pub fn open_terminal(
        &mut self,
        worktree_id: &str,
    ) -> Result<&WorktreeTerminalState, WorkspaceError> {
        let worktree = self
            .worktree(worktree_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::UnknownWorktree(worktree_id.to_string()))?;

        let pending = &mut self.pending_setup_scripts;
        self.terminals
            .state(&worktree, || pending.remove(&worktree.id));
        self.pending_setup_scripts.remove(&worktree.id);

        self.terminals.apply(TerminalCommand::EnsureInitialTab {
            worktree_id: worktree.id.clone(),
            focus: true,
        })?;
        self.sync_liveness(&worktree.id);
        self.terminals
            .state_if_exists(&worktree.id)
            .ok_or_else(|| WorkspaceError::UnknownWorktree(worktree.id.clone()))
    }

    /// Forwards a command to the terminal manager and mirrors the resulting
    /// liveness into the snapshot store.
    pub fn terminal_command(
        &mut self,
        command: TerminalCommand,
    ) -> Result<TerminalOutcome, WorkspaceError> {
        let worktree_id = command_worktree_id(&command).map(str::to_string);
        let outcome = self.terminals.apply(command)?;
        match worktree_id {
            Some(id) => self.sync_liveness(&id),
            None => {
                for id in self.terminals.worktree_ids() {
                    self.sync_liveness(&id);
                }
            }
        }
        Ok(outcome)
    }

    pub fn set_window_occlusion(&mut self, visible: bool, window_is_key: bool) {
        if let Err(err) = self.terminals.apply(TerminalCommand::SetWindowOcclusion {
            visible,
            window_is_key,
        }) {
            warn!("[Workspace] Failed to update terminal occlusion: {err}");
        }
    }

    fn sync_liveness(&mut self, worktree_id: &str) {
        self.info.apply(ReconciliationEvent::TerminalLiveness {
            worktree_id: worktree_id.to_string(),
            alive: self.terminals.is_alive(worktree_id),
        });
    }

    /// Sends the repository's run script to the worktree's focused terminal.
    /// Returns `false` when no run script is configured.
    pub async fn run_script(&mut self, worktree_id: &str) -> Result<bool, WorkspaceError> {
        let root = self
            .worktree(worktree_id)
            .map(|worktree| worktree.repository_root.clone())
            .ok_or_else(|| WorkspaceError::UnknownWorktree(worktree_id.to_string()))?;
        let script = self.repository_settings_for(&root).await.run_script;
        if script.trim().is_empty() {
            return Ok(false);
        }

        self.open_terminal(worktree_id)?;
        let mut text = script;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.terminals.apply(TerminalCommand::SendText {
            worktree_id: worktree_id.to_string(),
            text,
        })?;
        Ok(true)
    }

    /// Refreshes git, pull request and terminal state for every worktree of
    /// the repository. Previous snapshots stay visible until this completes.
    pub async fn refresh_worktree_info(&mut self, repository_id: &str) -> Result<(), WorkspaceError> {
        let index = self.repository_index(repository_id)?;
        let github_enabled = self.settings.global().await.github_integration_enabled;
        let repository = &self.repositories[index];
        let terminals = &self.terminals;
        let outcome = self
            .refresher
            .refresh(&repository.root, &repository.worktrees, github_enabled, |id| {
                terminals.is_alive(id)
            })
            .await;
        self.info.apply(ReconciliationEvent::Refreshed(outcome));
        Ok(())
    }

    /// Removes a clean worktree right away. A dirty one raises a confirmation
    /// alert instead; confirming it forces the removal.
    pub async fn request_remove_worktree(
        &mut self,
        worktree_id: &str,
        on_archive_output: impl FnMut(&ArchiveScriptProgress) + Send,
    ) -> Result<RemovalOutcome, WorkspaceError> {
        let worktree = self
            .worktree(worktree_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::UnknownWorktree(worktree_id.to_string()))?;

        match self.git.is_worktree_dirty(&worktree.working_directory).await {
            Ok(true) => {
                self.alert = Some(AppAlert::confirm_dirty_removal(&worktree));
                return Ok(RemovalOutcome::NeedsConfirmation);
            }
            Ok(false) => {}
            Err(err) => warn!(
                "[Workspace] Could not check {} for changes, removal will re-check: {err}",
                worktree.name
            ),
        }
        Ok(self.remove_worktree(worktree, false, on_archive_output).await)
    }

    /// Runs the pending alert's confirm action, if it has one.
    pub async fn confirm_alert(
        &mut self,
        on_archive_output: impl FnMut(&ArchiveScriptProgress) + Send,
    ) -> Result<Option<RemovalOutcome>, WorkspaceError> {
        let Some(alert) = self.alert.take() else {
            return Ok(None);
        };
        match alert.confirm {
            Some(ConfirmAction::ForceRemoveWorktree { worktree_id }) => {
                let worktree = self
                    .worktree(&worktree_id)
                    .cloned()
                    .ok_or(WorkspaceError::UnknownWorktree(worktree_id))?;
                Ok(Some(
                    self.remove_worktree(worktree, true, on_archive_output).await,
                ))
            }
            None => Ok(None),
        }
    }

    async fn remove_worktree(
        &mut self,
        worktree: Worktree,
        force: bool,
        on_archive_output: impl FnMut(&ArchiveScriptProgress) + Send,
    ) -> RemovalOutcome {
        let settings = self.repository_settings_for(&worktree.repository_root).await;
        let global = self.settings.global().await;
        let request = RemoveWorktreeRequest {
            worktree: worktree.clone(),
            archive_script: Some(settings.archive_script),
            delete_branch: global.delete_branch_on_archive,
            force,
            archive_output_max_lines: global.archive_output_max_lines,
        };

        match self.orchestrator.remove(&request, on_archive_output).await {
            Ok(()) => {}
            Err(WorktreeError::DirtyWorktree { .. }) => {
                self.alert = Some(AppAlert::confirm_dirty_removal(&worktree));
                return RemovalOutcome::NeedsConfirmation;
            }
            Err(err) => {
                warn!("[Workspace] Removing {} failed: {err}", worktree.name);
                self.alert = Some(AppAlert::error("Unable to remove worktree", err.to_string()));
                return RemovalOutcome::Failed;
            }
        }

        self.forget_worktree(&worktree.id);
        if let Err(err) = self.settings.unpin_worktree(&worktree.id).await {
            warn!("[Workspace] Failed to unpin {}: {err}", worktree.id);
        }
        let cleared = self
            .settings
            .update(|file| {
                if file.last_focused_worktree_id.as_deref() == Some(worktree.id.as_str()) {
                    file.last_focused_worktree_id = None;
                }
            })
            .await;
        if let Err(err) = cleared {
            warn!("[Workspace] Failed to clear focused worktree: {err}");
        }

        for repository in &mut self.repositories {
            repository.worktrees.retain(|existing| existing.id != worktree.id);
        }
        if let Ok(index) = self.repository_index(&repository_key(&worktree.repository_root)) {
            if let Err(err) = self.reload_at(index).await {
                warn!("[Workspace] Could not reload worktrees after removal: {err}");
            }
        }
        RemovalOutcome::Removed
    }

    /// Releases terminal surfaces and drops in-memory state for the id.
    fn forget_worktree(&mut self, worktree_id: &str) {
        if self.terminals.session_count(worktree_id) > 0 {
            if let Err(err) = self.terminals.apply(TerminalCommand::RemoveWorktree {
                worktree_id: worktree_id.to_string(),
            }) {
                warn!("[Workspace] Terminal teardown for {worktree_id} failed: {err}");
            }
        }
        self.pending_setup_scripts.remove(worktree_id);
        self.info.apply(ReconciliationEvent::WorktreeRemoved {
            worktree_id: worktree_id.to_string(),
        });
    }

    /// Tears down every terminal session, as on application exit.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.terminals.apply(TerminalCommand::CloseAll) {
            warn!("[Workspace] Closing terminals failed: {err}");
        }
    }
}

fn command_worktree_id(command: &TerminalCommand) -> Option<&str> {
    use TerminalCommand as C;
    match command {
        C::EnsureInitialTab { worktree_id, .. }
        | C::CreateTab { worktree_id, .. }
        | C::SelectTab { worktree_id, .. }
        | C::CloseTab { worktree_id, .. }
        | C::CloseOtherTabs { worktree_id, .. }
        | C::CloseTabsToRight { worktree_id, .. }
        | C::CloseAllTabs { worktree_id }
        | C::Split { worktree_id, .. }
        | C::ClosePane { worktree_id, .. }
        | C::FocusPane { worktree_id, .. }
        | C::EqualizeSplits { worktree_id, .. }
        | C::ResizeSplit { worktree_id, .. }
        | C::BindingAction { worktree_id, .. }
        | C::SendText { worktree_id, .. }
        | C::Event { worktree_id, .. }
        | C::RemoveWorktree { worktree_id } => Some(worktree_id),
        C::SetWindowOcclusion { .. } | C::CloseAll => None,
    }
}
