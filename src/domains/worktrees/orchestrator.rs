use super::copy::copy_relative_files;
use super::names::{next_name, validate_name};
use super::progress::{ArchiveScriptProgress, WorktreeCreationProgress, WorktreeCreationStage};
use super::WorktreeError;
use crate::domains::git::{worktree_detail, worktree_id, GitClient, Worktree};
use crate::infrastructure::config::AppPaths;
use crate::infrastructure::process::ProcessRunner;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

const ARCHIVE_SHELL: &str = "sh";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateWorktreeRequest {
    pub repository_root: PathBuf,
    /// Explicit name; a free animal name is picked when absent.
    pub name: Option<String>,
    /// Explicit base ref, taking precedence over `configured_base_ref`.
    pub base_ref: Option<String>,
    /// Repository default from settings.
    pub configured_base_ref: Option<String>,
    pub copy_ignored: bool,
    pub copy_untracked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveWorktreeRequest {
    pub worktree: Worktree,
    pub archive_script: Option<String>,
    pub delete_branch: bool,
    /// Skips the uncommitted-changes guard.
    pub force: bool,
    pub archive_output_max_lines: usize,
}

/// Drives worktree creation and removal. Creation is serialized per
/// repository. Once a name is chosen, creation also holds the worktree id
/// lock that removal takes, so the two never overlap on one id.
pub struct WorktreeOrchestrator {
    git: Arc<dyn GitClient>,
    runner: Arc<dyn ProcessRunner>,
    paths: AppPaths,
    repository_locks: DashMap<String, Arc<Mutex<()>>>,
    worktree_locks: DashMap<String, Arc<Mutex<()>>>,
}

async fn acquire(locks: &DashMap<String, Arc<Mutex<()>>>, key: &str) -> OwnedMutexGuard<()> {
    let lock = locks
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .value()
        .clone();
    lock.lock_owned().await
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl WorktreeOrchestrator {
    pub fn new(git: Arc<dyn GitClient>, runner: Arc<dyn ProcessRunner>, paths: AppPaths) -> Self {
        Self {
            git,
            runner,
            paths,
            repository_locks: DashMap::new(),
            worktree_locks: DashMap::new(),
        }
    }

    pub fn worktree_path(&self, root: &Path, name: &str) -> PathBuf {
        self.paths.repository_worktrees_dir(root).join(name)
    }

    /// Runs the five creation stages in order, reporting each one before it
    /// starts. Failures after `git worktree add` roll the checkout back.
    pub async fn create(
        &self,
        request: &CreateWorktreeRequest,
        mut report: impl FnMut(WorktreeCreationProgress) + Send,
    ) -> Result<Worktree, WorktreeError> {
        let root = request.repository_root.as_path();
        let _repository_guard = acquire(&self.repository_locks, &worktree_id(root)).await;
        let mut progress = WorktreeCreationProgress {
            copy_ignored: request.copy_ignored,
            copy_untracked: request.copy_untracked,
            ..WorktreeCreationProgress::new(WorktreeCreationStage::LoadingLocalBranches)
        };

        report(progress.clone());
        let mut excluded: HashSet<String> =
            self.git.local_branches(root).await?.into_iter().collect();
        excluded.extend(self.git.worktrees(root).await?.into_iter().map(|w| w.name));

        progress.stage = WorktreeCreationStage::ChoosingWorktreeName;
        report(progress.clone());
        let name = self.choose_name(root, request.name.as_deref(), excluded).await?;
        let path = self.worktree_path(root, &name);
        let _worktree_guard = acquire(&self.worktree_locks, &worktree_id(&path)).await;
        progress.worktree_name = Some(name.clone());

        progress.stage = WorktreeCreationStage::CheckingRepositoryMode;
        report(progress.clone());
        let bare = self.git.is_bare_repository(root).await?;

        let requested_base = non_empty(request.base_ref.as_deref())
            .or_else(|| non_empty(request.configured_base_ref.as_deref()));
        progress.stage = WorktreeCreationStage::ResolvingBaseReference;
        progress.base_ref = requested_base.clone();
        report(progress.clone());
        let base_ref = match requested_base {
            Some(base_ref) => base_ref,
            None => self
                .git
                .automatic_base_ref(root)
                .await?
                .unwrap_or_else(|| "HEAD".to_string()),
        };

        let copy_from_checkout = !bare;
        let ignored = if request.copy_ignored && copy_from_checkout {
            self.git.ignored_files(root).await?
        } else {
            Vec::new()
        };
        let untracked = if request.copy_untracked && copy_from_checkout {
            self.git.untracked_files(root).await?
        } else {
            Vec::new()
        };

        progress.stage = WorktreeCreationStage::CreatingWorktree;
        progress.base_ref = Some(base_ref.clone());
        progress.ignored_files_to_copy_count = Some(ignored.len());
        progress.untracked_files_to_copy_count = Some(untracked.len());
        report(progress);

        self.git.add_worktree(root, &name, &path, &base_ref).await?;

        let mut files = ignored;
        files.extend(untracked);
        if !files.is_empty() {
            if let Err(err) = copy_relative_files(root, &path, &files).await {
                warn!(
                    "[WorktreeOrchestrator] Copy into {} failed: {err}; rolling back",
                    path.display()
                );
                return Err(self.roll_back(root, &path, &name, err).await);
            }
        }

        info!(
            "[WorktreeOrchestrator] Created worktree {name} from {base_ref} at {}",
            path.display()
        );
        Ok(self.created_worktree(root, &path, &name).await)
    }

    async fn choose_name(
        &self,
        root: &Path,
        requested: Option<&str>,
        mut excluded: HashSet<String>,
    ) -> Result<String, WorktreeError> {
        if let Some(requested) = requested {
            validate_name(requested, &excluded)?;
            let name = requested.trim().to_string();
            if tokio::fs::try_exists(self.worktree_path(root, &name))
                .await
                .unwrap_or(false)
            {
                return Err(WorktreeError::NameTaken(name));
            }
            return Ok(name);
        }

        loop {
            let name = next_name(&excluded).ok_or(WorktreeError::NamesExhausted)?;
            let occupied = tokio::fs::try_exists(self.worktree_path(root, &name))
                .await
                .unwrap_or(false);
            if !occupied {
                return Ok(name);
            }
            debug!("[WorktreeOrchestrator] {name} already exists on disk, picking another");
            excluded.insert(name);
        }
    }

    async fn roll_back(
        &self,
        root: &Path,
        path: &Path,
        name: &str,
        cause: std::io::Error,
    ) -> WorktreeError {
        match self.git.remove_worktree(root, path, Some(name)).await {
            Ok(()) => WorktreeError::CopyFailed(cause),
            Err(rollback) => {
                warn!(
                    "[WorktreeOrchestrator] Rollback of {} failed: {rollback}",
                    path.display()
                );
                WorktreeError::Incomplete {
                    path: path.to_path_buf(),
                    reason: format!("{cause}; cleanup failed: {rollback}"),
                }
            }
        }
    }

    async fn created_worktree(&self, root: &Path, path: &Path, name: &str) -> Worktree {
        let id = worktree_id(path);
        let listed = match self.git.worktrees(root).await {
            Ok(worktrees) => worktrees.into_iter().find(|worktree| worktree.id == id),
            Err(err) => {
                warn!("[WorktreeOrchestrator] Could not list worktrees after creating {name}: {err}");
                None
            }
        };
        let mut worktree = listed.unwrap_or_else(|| Worktree {
            id,
            name: name.to_string(),
            detail: worktree_detail(path, root),
            working_directory: path.to_path_buf(),
            repository_root: root.to_path_buf(),
            created_at: None,
        });
        worktree.created_at = Some(Utc::now());
        worktree
    }

    /// Guards against uncommitted changes unless forced, runs the archive
    /// script, then removes the checkout and optionally its branch.
    pub async fn remove(
        &self,
        request: &RemoveWorktreeRequest,
        mut on_archive_output: impl FnMut(&ArchiveScriptProgress) + Send,
    ) -> Result<(), WorktreeError> {
        let worktree = &request.worktree;
        if worktree.is_main() {
            return Err(WorktreeError::MainWorktree);
        }
        let _guard = acquire(&self.worktree_locks, &worktree.id).await;

        if !request.force && self.git.is_worktree_dirty(&worktree.working_directory).await? {
            return Err(WorktreeError::DirtyWorktree {
                name: worktree.name.clone(),
            });
        }

        if let Some(script) = non_empty(request.archive_script.as_deref()) {
            self.run_archive_script(
                worktree,
                &script,
                request.archive_output_max_lines,
                &mut on_archive_output,
            )
            .await?;
        }

        let branch = request.delete_branch.then_some(worktree.name.as_str());
        self.git
            .remove_worktree(&worktree.repository_root, &worktree.working_directory, branch)
            .await?;
        info!("[WorktreeOrchestrator] Removed worktree {}", worktree.name);
        Ok(())
    }

    async fn run_archive_script(
        &self,
        worktree: &Worktree,
        script: &str,
        max_lines: usize,
        on_output: &mut (impl FnMut(&ArchiveScriptProgress) + Send),
    ) -> Result<(), WorktreeError> {
        let mut progress = ArchiveScriptProgress::new(
            format!("Archiving {}", worktree.name),
            "Running archive script",
        );
        progress.command_text = Some(script.to_string());
        on_output(&progress);

        let args = vec!["-c".to_string(), script.to_string()];
        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel();
        let run = self.runner.run_login_streaming(
            ARCHIVE_SHELL,
            &args,
            Some(worktree.working_directory.as_path()),
            lines_tx,
        );
        let consume = async {
            while let Some(line) = lines_rx.recv().await {
                progress.append_output_line(line, max_lines);
                on_output(&progress);
            }
        };
        let (result, ()) = tokio::join!(run, consume);

        result.map(drop).map_err(|err| {
            warn!(
                "[WorktreeOrchestrator] Archive script for {} failed: {err}",
                worktree.name
            );
            WorktreeError::ArchiveScriptFailed(err.to_string())
        })
    }
}
