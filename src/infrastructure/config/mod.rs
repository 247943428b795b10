pub mod settings;

pub use settings::{FileRepositoryLocalStorage, FileSettingsRepository};

use std::env;
use std::path::{Path, PathBuf};

const HOME_OVERRIDE_VAR: &str = "TREEDECK_HOME";
const WT_SCRIPT_VAR: &str = "TREEDECK_WT_SCRIPT";
const GH_OVERRIDE_VARS: &[&str] = &["GITHUB_CLI_PATH", "GH_BINARY_PATH"];

/// On-disk layout rooted at `~/.treedeck`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base: PathBuf,
}

impl AppPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `TREEDECK_HOME` when set, else `~/.treedeck`.
    pub fn resolve() -> Self {
        if let Some(custom) = env::var_os(HOME_OVERRIDE_VAR).filter(|value| !value.is_empty()) {
            return Self::new(PathBuf::from(custom));
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".treedeck"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base.join("settings.json")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.base.join("repos")
    }

    /// Parent directory for new worktrees of the repository at `root`.
    pub fn repository_worktrees_dir(&self, root: &Path) -> PathBuf {
        self.repos_dir().join(repository_directory_name(root))
    }

    pub fn repository_settings_file(&self, root: &Path) -> PathBuf {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("_");
        self.base.join("repo").join(name).join("treedeck.json")
    }

    pub fn default_helper_script(&self) -> PathBuf {
        self.base.join("bin").join("wt")
    }
}

/// Directory name used under `repos/`. Roots that end in `.git`/`.bare` (or have no
/// usable last component) are flattened into an underscore-joined path instead.
pub fn repository_directory_name(root: &Path) -> String {
    let last = root.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !last.is_empty() && last != ".git" && last != ".bare" {
        return last.to_string();
    }

    let full = root.to_string_lossy();
    let trimmed = full.trim_matches('/');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.replace('/', "_")
    }
}

/// The bundled worktree helper, when one is installed.
pub fn resolve_helper_script(paths: &AppPaths) -> Option<PathBuf> {
    if let Some(custom) = env::var_os(WT_SCRIPT_VAR).filter(|value| !value.is_empty()) {
        let candidate = PathBuf::from(custom);
        if candidate.is_file() {
            return Some(candidate);
        }
        log::warn!(
            "{WT_SCRIPT_VAR} points to {} which does not exist; ignoring",
            candidate.display()
        );
    }

    let bundled = paths.default_helper_script();
    bundled.is_file().then_some(bundled)
}

/// Program used to invoke the GitHub CLI.
pub fn resolve_github_cli_program() -> String {
    for key in GH_OVERRIDE_VARS {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                log::debug!("Using GitHub CLI from {key}: {trimmed}");
                return trimmed.to_string();
            }
        }
    }

    match which::which("gh") {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => "gh".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn directory_name_uses_last_component() {
        assert_eq!(repository_directory_name(Path::new("/work/supaproject")), "supaproject");
    }

    #[test]
    fn directory_name_flattens_bare_layouts() {
        assert_eq!(
            repository_directory_name(Path::new("/work/project/.bare")),
            "work_project_.bare"
        );
        assert_eq!(
            repository_directory_name(Path::new("/work/project/.git")),
            "work_project_.git"
        );
        assert_eq!(repository_directory_name(Path::new("/")), "_");
    }

    #[test]
    fn layout_is_rooted_at_base() {
        let paths = AppPaths::new("/home/me/.treedeck");
        assert_eq!(
            paths.settings_file(),
            PathBuf::from("/home/me/.treedeck/settings.json")
        );
        assert_eq!(
            paths.repository_worktrees_dir(Path::new("/src/app")),
            PathBuf::from("/home/me/.treedeck/repos/app")
        );
        assert_eq!(
            paths.repository_settings_file(Path::new("/src/app")),
            PathBuf::from("/home/me/.treedeck/repo/app/treedeck.json")
        );
    }

    #[test]
    #[serial]
    fn helper_script_honours_env_override() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("wt");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        env::set_var(WT_SCRIPT_VAR, &script);

        let resolved = resolve_helper_script(&AppPaths::new(tmp.path().join("base")));
        env::remove_var(WT_SCRIPT_VAR);

        assert_eq!(resolved, Some(script));
    }

    #[test]
    #[serial]
    fn helper_script_absent_without_bundle() {
        let tmp = TempDir::new().unwrap();
        env::remove_var(WT_SCRIPT_VAR);
        assert_eq!(resolve_helper_script(&AppPaths::new(tmp.path())), None);
    }

    #[test]
    #[serial]
    fn github_cli_override_wins() {
        env::set_var("GITHUB_CLI_PATH", "  /custom/gh  ");
        let program = resolve_github_cli_program();
        env::remove_var("GITHUB_CLI_PATH");
        assert_eq!(program, "/custom/gh");
    }
}
