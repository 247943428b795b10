use crate::domains::git::{GitCli, GitClient, Worktree};
use crate::domains::github::{parse_github_remote, GithubCli, GithubClient};
use crate::domains::settings::{RepositorySettingsStore, SettingsStore};
use crate::domains::worktrees::{
    CreateWorktreeRequest, RemoveWorktreeRequest, WorktreeError, WorktreeOrchestrator,
};
use crate::infrastructure::config::{
    resolve_github_cli_program, resolve_helper_script, AppPaths, FileRepositoryLocalStorage,
    FileSettingsRepository,
};
use crate::infrastructure::process::{ProcessRunner, SystemProcessRunner};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Treedeck - git worktrees with terminals attached
#[derive(Debug, Parser)]
#[command(
    name = "treedeck",
    about = "Treedeck - git worktrees with terminals attached",
    version = VERSION,
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}

EXAMPLES:
    treedeck worktrees .                      # List worktrees of the current repository
    treedeck create . --name otter --base main
    treedeck remove ~/.treedeck/repos/app/otter --force
    treedeck prs .                            # Pull request status per branch
"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the worktrees of the repository containing PATH
    Worktrees {
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
    },
    /// Create a worktree; the name is picked at random unless given
    Create {
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "base", value_name = "REF")]
        base: Option<String>,
        #[arg(long)]
        copy_ignored: bool,
        #[arg(long)]
        copy_untracked: bool,
    },
    /// Remove a worktree and, when configured, its branch
    Remove {
        #[arg(value_name = "WORKTREE")]
        path: PathBuf,
        /// Remove even with uncommitted changes
        #[arg(long)]
        force: bool,
    },
    /// Show pull request status for every worktree branch
    Prs {
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
    },
}

struct Services {
    git: Arc<dyn GitClient>,
    github: Arc<dyn GithubClient>,
    orchestrator: WorktreeOrchestrator,
    settings: Arc<SettingsStore>,
    repository_settings: RepositorySettingsStore,
}

impl Services {
    fn resolve() -> Self {
        let paths = AppPaths::resolve();
        let runner = Arc::new(SystemProcessRunner);
        let helper = resolve_helper_script(&paths);
        if helper.is_none() {
            log::debug!("No wt helper found; reads fall back to git");
        }
        let git: Arc<dyn GitClient> = Arc::new(GitCli::new(Arc::clone(&runner), helper));
        let github: Arc<dyn GithubClient> =
            Arc::new(GithubCli::new(Arc::clone(&runner), resolve_github_cli_program()));
        let settings = Arc::new(SettingsStore::load(Arc::new(FileSettingsRepository::new(
            paths.settings_file(),
        ))));
        let repository_settings = RepositorySettingsStore::new(
            paths.clone(),
            Arc::new(FileRepositoryLocalStorage),
            Arc::clone(&settings),
        );
        let process: Arc<dyn ProcessRunner> = runner;
        Self {
            orchestrator: WorktreeOrchestrator::new(Arc::clone(&git), process, paths),
            git,
            github,
            settings,
            repository_settings,
        }
    }

    async fn root(&self, path: &Path) -> Result<PathBuf> {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("{} does not exist", path.display()))?;
        Ok(self.git.repo_root(&path).await?)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let services = Services::resolve();
    match cli.command {
        Command::Worktrees { path } => list_worktrees(&services, &path).await,
        Command::Create {
            path,
            name,
            base,
            copy_ignored,
            copy_untracked,
        } => {
            create_worktree(&services, &path, name, base, copy_ignored, copy_untracked).await
        }
        Command::Remove { path, force } => remove_worktree(&services, &path, force).await,
        Command::Prs { path } => pull_requests(&services, &path).await,
    }
}

async fn list_worktrees(services: &Services, path: &Path) -> Result<()> {
    let root = services.root(path).await?;
    for worktree in services.git.worktrees(&root).await? {
        println!("{}\t{}", worktree.name, worktree.working_directory.display());
    }
    Ok(())
}

async fn create_worktree(
    services: &Services,
    path: &Path,
    name: Option<String>,
    base: Option<String>,
    copy_ignored: bool,
    copy_untracked: bool,
) -> Result<()> {
    let root = services.root(path).await?;
    let settings = services.repository_settings.load(&root).await?;
    let request = CreateWorktreeRequest {
        repository_root: root,
        name,
        base_ref: base,
        configured_base_ref: settings.worktree_base_ref,
        copy_ignored: copy_ignored || settings.copy_ignored_on_worktree_create,
        copy_untracked: copy_untracked || settings.copy_untracked_on_worktree_create,
    };

    let worktree = services
        .orchestrator
        .create(&request, |progress| {
            eprintln!("{}: {}", progress.title_text(), progress.detail_text());
        })
        .await?;
    println!("{}", worktree.working_directory.display());
    Ok(())
}

async fn remove_worktree(services: &Services, path: &Path, force: bool) -> Result<()> {
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("{} does not exist", path.display()))?;
    let root = services.git.repo_root(&path).await?;
    let worktree = find_worktree(services, &root, &path).await?;
    let settings = services.repository_settings.load(&root).await?;
    let global = services.settings.global().await;

    let request = RemoveWorktreeRequest {
        worktree,
        archive_script: Some(settings.archive_script),
        delete_branch: global.delete_branch_on_archive,
        force,
        archive_output_max_lines: global.archive_output_max_lines,
    };
    // The first report only announces the script; every later one carries a new line.
    let mut announced = false;
    let result = services
        .orchestrator
        .remove(&request, |progress| {
            if !announced {
                eprintln!("{}", progress.title_text);
                announced = true;
            } else if let Some(line) = progress.output_lines.last() {
                eprintln!("{line}");
            }
        })
        .await;

    match result {
        Ok(()) => Ok(()),
        Err(WorktreeError::DirtyWorktree { name }) => {
            bail!("{name} has uncommitted changes. Re-run with --force to remove it anyway.")
        }
        Err(err) => Err(err.into()),
    }
}

async fn find_worktree(services: &Services, root: &Path, path: &Path) -> Result<Worktree> {
    services
        .git
        .worktrees(root)
        .await?
        .into_iter()
        .find(|worktree| worktree.working_directory == path)
        .ok_or_else(|| anyhow!("{} is not a worktree of {}", path.display(), root.display()))
}

async fn pull_requests(services: &Services, path: &Path) -> Result<()> {
    let root = services.root(path).await?;
    let url = services
        .git
        .remote_url(&root, "origin")
        .await?
        .ok_or_else(|| anyhow!("{} has no origin remote", root.display()))?;
    let remote =
        parse_github_remote(&url).ok_or_else(|| anyhow!("{url} is not a GitHub remote"))?;
    if !services.github.is_available().await {
        bail!("GitHub CLI (gh) is not installed or not on PATH.");
    }

    let worktrees = services.git.worktrees(&root).await?;
    let branches: Vec<String> = worktrees.iter().map(|worktree| worktree.name.clone()).collect();
    let prs = services
        .github
        .batch_pull_requests(&remote.host, &remote.owner, &remote.repo, &branches)
        .await?;

    for branch in &branches {
        match prs.get(branch) {
            Some(pr) => {
                let checks = pr.check_summary();
                println!(
                    "{branch}\t#{}\t{:?}\t{} passed, {} failed, {} pending",
                    pr.number, pr.state, checks.passed, checks.failed, checks.pending
                );
            }
            None => println!("{branch}\t-"),
        }
    }
    Ok(())
}
