use super::parsing::{
    is_dirty_status, parse_ahead_behind_counts, parse_default_branch_from_symbolic_ref,
    parse_git_status_v2, parse_merge_tree_conflict, parse_worktree_porcelain, AheadBehind,
    GitStatusSummary,
};
use super::{GitClientError, Worktree};
use crate::infrastructure::process::{display_command, CommandOutput, ProcessError, ProcessRunner};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GIT: &str = "git";

/// Git operations used by the worktree lifecycle and status aggregation.
/// Every call shells out once per git invocation and never retries.
#[async_trait]
pub trait GitClient: Send + Sync {
    async fn repo_root(&self, path: &Path) -> Result<PathBuf, GitClientError>;
    async fn worktrees(&self, root: &Path) -> Result<Vec<Worktree>, GitClientError>;
    async fn local_branches(&self, root: &Path) -> Result<Vec<String>, GitClientError>;
    async fn is_bare_repository(&self, root: &Path) -> Result<bool, GitClientError>;
    /// Upstream default (`origin/<branch>`) when the remote HEAD is known.
    async fn automatic_base_ref(&self, root: &Path) -> Result<Option<String>, GitClientError>;
    async fn default_branch(&self, root: &Path) -> Result<Option<String>, GitClientError>;
    /// Paths relative to `checkout`.
    async fn ignored_files(&self, checkout: &Path) -> Result<Vec<PathBuf>, GitClientError>;
    async fn untracked_files(&self, checkout: &Path) -> Result<Vec<PathBuf>, GitClientError>;
    async fn add_worktree(
        &self,
        root: &Path,
        name: &str,
        path: &Path,
        base_ref: &str,
    ) -> Result<(), GitClientError>;
    async fn remove_worktree(
        &self,
        root: &Path,
        path: &Path,
        branch: Option<&str>,
    ) -> Result<(), GitClientError>;
    async fn is_worktree_dirty(&self, path: &Path) -> Result<bool, GitClientError>;
    async fn status(&self, path: &Path) -> Result<GitStatusSummary, GitClientError>;
    async fn ahead_behind(&self, path: &Path) -> Result<Option<AheadBehind>, GitClientError>;
    async fn merge_tree_has_conflicts(
        &self,
        root: &Path,
        base: &str,
        head: &str,
    ) -> Result<bool, GitClientError>;
    async fn remote_url(&self, root: &Path, remote: &str)
        -> Result<Option<String>, GitClientError>;
}

/// Git client backed by the `git` binary plus the optional `wt` helper script.
pub struct GitCli<R: ProcessRunner> {
    runner: Arc<R>,
    helper_script: Option<PathBuf>,
}

impl<R: ProcessRunner> GitCli<R> {
    pub fn new(runner: Arc<R>, helper_script: Option<PathBuf>) -> Self {
        Self {
            runner,
            helper_script,
        }
    }

    pub fn helper_script(&self) -> Option<&Path> {
        self.helper_script.as_deref()
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, ProcessError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        debug!("[GitCli] {} (cwd={})", display_command(GIT, &args), cwd.display());
        self.runner.run(GIT, &args, Some(cwd)).await
    }

    async fn helper(
        &self,
        script: &Path,
        cwd: &Path,
        args: &[&str],
    ) -> Result<CommandOutput, ProcessError> {
        let program = script.to_string_lossy();
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        debug!("[GitCli] {} (cwd={})", display_command(&program, &args), cwd.display());
        self.runner.run_login(&program, &args, Some(cwd)).await
    }

    async fn repo_root_from_git(&self, path: &Path) -> Result<PathBuf, GitClientError> {
        let output = self
            .git(path, &["rev-parse", "--path-format=absolute", "--git-common-dir"])
            .await?;
        let common_dir = PathBuf::from(output.stdout.trim());
        if common_dir.as_os_str().is_empty() {
            return Err(GitClientError::RootNotFound(path.to_path_buf()));
        }

        // `<root>/.git` and `<root>/.bare` live inside the checkout root; any other
        // common dir is a bare repository that is its own root.
        let inside_root = matches!(
            common_dir.file_name().and_then(|n| n.to_str()),
            Some(".git") | Some(".bare")
        );
        let root = if inside_root {
            common_dir.parent().map(Path::to_path_buf)
        } else {
            Some(common_dir)
        };
        root.ok_or_else(|| GitClientError::RootNotFound(path.to_path_buf()))
    }

    async fn list_files(&self, checkout: &Path, ignored: bool) -> Result<Vec<PathBuf>, GitClientError> {
        let mut args = vec!["ls-files", "-z", "--others"];
        if ignored {
            args.push("--ignored");
        }
        args.push("--exclude-standard");
        let output = self.git(checkout, &args).await?;
        Ok(output
            .stdout
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

fn mentions(err: &ProcessError, needles: &[&str]) -> bool {
    let text = format!("{}\n{}", err.stdout(), err.stderr()).to_ascii_lowercase();
    needles.iter().any(|needle| text.contains(needle))
}

#[async_trait]
impl<R: ProcessRunner + 'static> GitClient for GitCli<R> {
    async fn repo_root(&self, path: &Path) -> Result<PathBuf, GitClientError> {
        if let Some(script) = &self.helper_script {
            match self.helper(script, path, &["root"]).await {
                Ok(output) if !output.stdout.trim().is_empty() => {
                    return Ok(PathBuf::from(output.stdout.trim()));
                }
                Ok(_) => warn!("[GitCli] wt root printed nothing for {}", path.display()),
                Err(err) => warn!("[GitCli] wt root failed for {}: {err}", path.display()),
            }
        }
        self.repo_root_from_git(path).await
    }

    async fn worktrees(&self, root: &Path) -> Result<Vec<Worktree>, GitClientError> {
        let output = match &self.helper_script {
            Some(script) => self.helper(script, root, &["ls", "--porcelain"]).await?,
            None => self.git(root, &["worktree", "list", "--porcelain"]).await?,
        };
        Ok(parse_worktree_porcelain(&output.stdout)
            .iter()
            .map(|entry| Worktree::from_porcelain(entry, root))
            .collect())
    }

    async fn local_branches(&self, root: &Path) -> Result<Vec<String>, GitClientError> {
        let output = self
            .git(root, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn is_bare_repository(&self, root: &Path) -> Result<bool, GitClientError> {
        let output = self.git(root, &["rev-parse", "--is-bare-repository"]).await?;
        match output.stdout.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(GitClientError::InvalidOutput {
                command: "git rev-parse --is-bare-repository".to_string(),
                output: other.to_string(),
            }),
        }
    }

    async fn automatic_base_ref(&self, root: &Path) -> Result<Option<String>, GitClientError> {
        match self
            .git(root, &["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"])
            .await
        {
            Ok(output) => {
                let trimmed = output.stdout.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            // No origin HEAD configured; callers fall back to HEAD.
            Err(ProcessError::Failed { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn default_branch(&self, root: &Path) -> Result<Option<String>, GitClientError> {
        match self
            .git(root, &["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"])
            .await
        {
            Ok(output) => Ok(parse_default_branch_from_symbolic_ref(&output.stdout)),
            Err(ProcessError::Failed { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn ignored_files(&self, checkout: &Path) -> Result<Vec<PathBuf>, GitClientError> {
        self.list_files(checkout, true).await
    }

    async fn untracked_files(&self, checkout: &Path) -> Result<Vec<PathBuf>, GitClientError> {
        self.list_files(checkout, false).await
    }

    async fn add_worktree(
        &self,
        root: &Path,
        name: &str,
        path: &Path,
        base_ref: &str,
    ) -> Result<(), GitClientError> {
        let script = self
            .helper_script
            .as_deref()
            .ok_or(GitClientError::HelperScriptMissing)?;
        let path_arg = path.to_string_lossy();
        self.helper(script, root, &["add", name, &path_arg, base_ref])
            .await?;
        info!("[GitCli] Created worktree {name} at {}", path.display());
        Ok(())
    }

    async fn remove_worktree(
        &self,
        root: &Path,
        path: &Path,
        branch: Option<&str>,
    ) -> Result<(), GitClientError> {
        let path_arg = path.to_string_lossy();
        match self
            .git(root, &["worktree", "remove", "--force", &path_arg])
            .await
        {
            Ok(_) => {}
            Err(err) if mentions(&err, &["is not a working tree"]) => {
                debug!("[GitCli] {} was already gone", path.display());
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(branch) = branch {
            match self.git(root, &["branch", "-D", branch]).await {
                Ok(_) => {}
                Err(err) if mentions(&err, &["not found"]) => {
                    debug!("[GitCli] Branch {branch} was already deleted");
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!("[GitCli] Removed worktree {}", path.display());
        Ok(())
    }

    async fn is_worktree_dirty(&self, path: &Path) -> Result<bool, GitClientError> {
        let output = self.git(path, &["status", "--porcelain=v2"]).await?;
        Ok(is_dirty_status(&output.stdout))
    }

    async fn status(&self, path: &Path) -> Result<GitStatusSummary, GitClientError> {
        let output = self
            .git(path, &["status", "--porcelain=v2", "--branch"])
            .await?;
        Ok(parse_git_status_v2(&output.stdout))
    }

    async fn ahead_behind(&self, path: &Path) -> Result<Option<AheadBehind>, GitClientError> {
        match self
            .git(path, &["rev-list", "--left-right", "--count", "@{upstream}...HEAD"])
            .await
        {
            Ok(output) => Ok(parse_ahead_behind_counts(&output.stdout)),
            Err(err) if mentions(&err, &["no upstream", "unknown revision"]) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn merge_tree_has_conflicts(
        &self,
        root: &Path,
        base: &str,
        head: &str,
    ) -> Result<bool, GitClientError> {
        let merge_base = self.git(root, &["merge-base", base, head]).await?;
        let merge_base = merge_base.stdout.trim().to_string();
        if merge_base.is_empty() {
            return Err(GitClientError::InvalidOutput {
                command: format!("git merge-base {base} {head}"),
                output: String::new(),
            });
        }
        let output = self.git(root, &["merge-tree", &merge_base, base, head]).await?;
        Ok(parse_merge_tree_conflict(&output.stdout))
    }

    async fn remote_url(
        &self,
        root: &Path,
        remote: &str,
    ) -> Result<Option<String>, GitClientError> {
        match self.git(root, &["remote", "get-url", remote]).await {
            Ok(output) => {
                let url = output.stdout.trim();
                Ok((!url.is_empty()).then(|| url.to_string()))
            }
            Err(err) if mentions(&err, &["no such remote"]) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
