use std::env;
use std::path::Path;

const FALLBACK_SHELLS: &[&str] = &["/bin/zsh", "/bin/bash", "/usr/bin/bash", "/bin/sh"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellInvocation {
    pub fn to_posix(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellKind {
    BashLike,
    Fish,
    Nu,
    Tcsh,
    PowerShell,
    Unknown,
}

impl ShellKind {
    pub fn classify(shell: &str) -> Self {
        let name = Path::new(shell)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(shell)
            .to_ascii_lowercase();

        match name.as_str() {
            "bash" | "zsh" | "ksh" | "sh" | "dash" | "ash" => ShellKind::BashLike,
            "fish" => ShellKind::Fish,
            "nu" | "nushell" => ShellKind::Nu,
            "tcsh" | "csh" => ShellKind::Tcsh,
            "pwsh" | "powershell" => ShellKind::PowerShell,
            _ => ShellKind::Unknown,
        }
    }

    fn login_flag(self) -> &'static str {
        match self {
            ShellKind::Nu => "--login",
            ShellKind::PowerShell => "-Login",
            _ => "-l",
        }
    }

    fn command_flag(self) -> &'static str {
        match self {
            ShellKind::PowerShell => "-Command",
            _ => "-c",
        }
    }
}

/// The user's login shell: `$SHELL` when it points at something executable,
/// otherwise the first available fallback.
pub fn effective_shell() -> String {
    if let Ok(shell) = env::var("SHELL") {
        if is_usable_shell(&shell) {
            return shell;
        }
        log::warn!("SHELL={shell:?} is unavailable; falling back to defaults");
    }

    FALLBACK_SHELLS
        .iter()
        .find(|candidate| is_usable_shell(candidate))
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| "sh".to_string())
}

fn is_usable_shell(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.contains('/') {
        Path::new(trimmed).is_file()
    } else {
        which::which(trimmed).is_ok()
    }
}

pub fn build_login_shell_invocation(command: &str) -> ShellInvocation {
    build_login_shell_invocation_with_shell(&effective_shell(), &[], command)
}

/// Builds `<shell> <base args> <login flag> <command flag> <command>`, dropping
/// any command already present in `base_args`.
pub fn build_login_shell_invocation_with_shell(
    shell: &str,
    base_args: &[String],
    command: &str,
) -> ShellInvocation {
    let kind = ShellKind::classify(shell);
    let mut args = strip_command_args(base_args, kind.command_flag());

    for flag in [kind.login_flag(), kind.command_flag()] {
        if !has_flag(&args, flag) {
            args.push(flag.to_string());
        }
    }
    args.push(command.to_string());

    ShellInvocation {
        program: shell.to_string(),
        args,
    }
}

fn strip_command_args(base_args: &[String], command_flag: &str) -> Vec<String> {
    let mut kept = Vec::with_capacity(base_args.len());
    let mut iter = base_args.iter();
    while let Some(arg) = iter.next() {
        if arg == command_flag {
            iter.next();
            continue;
        }

        // Clustered short flags such as `-lc` carry the command flag too.
        if command_flag == "-c" && is_short_cluster(arg) && arg.contains('c') {
            let rest: String = arg[1..].chars().filter(|ch| *ch != 'c').collect();
            if !rest.is_empty() {
                kept.push(format!("-{rest}"));
            }
            iter.next();
            continue;
        }

        kept.push(arg.clone());
    }
    kept
}

fn is_short_cluster(arg: &str) -> bool {
    arg.len() > 2
        && arg.starts_with('-')
        && !arg.starts_with("--")
        && arg[1..].chars().all(|ch| ch.is_ascii_alphabetic())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    if flag.len() == 2 && flag.starts_with('-') {
        let short = &flag[1..];
        return args
            .iter()
            .any(|arg| arg == flag || (is_short_cluster(arg) && arg[1..].contains(short)));
    }
    args.iter().any(|arg| arg == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_vec(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bash_like_shells_get_login_and_command_flags() {
        let invocation = build_login_shell_invocation_with_shell("/bin/zsh", &[], "gh --version");
        assert_eq!(invocation.program, "/bin/zsh");
        assert_eq!(invocation.args, to_vec(&["-l", "-c", "gh --version"]));
    }

    #[test]
    fn nu_uses_long_login_flag() {
        let invocation =
            build_login_shell_invocation_with_shell("/opt/homebrew/bin/nu", &[], "gh --version");
        assert_eq!(invocation.args, to_vec(&["--login", "-c", "gh --version"]));
    }

    #[test]
    fn existing_command_is_replaced() {
        let invocation = build_login_shell_invocation_with_shell(
            "/bin/bash",
            &to_vec(&["-i", "-c", "tmux attach"]),
            "git status",
        );
        assert_eq!(invocation.args, to_vec(&["-i", "-l", "-c", "git status"]));
    }

    #[test]
    fn clustered_short_flags_are_split() {
        let invocation = build_login_shell_invocation_with_shell(
            "/bin/zsh",
            &to_vec(&["-lc", "echo old"]),
            "git status",
        );
        assert_eq!(invocation.args, to_vec(&["-l", "-c", "git status"]));
    }

    #[test]
    fn powershell_uses_command_flag() {
        let invocation = build_login_shell_invocation_with_shell(
            "pwsh",
            &to_vec(&["-Login", "-Command", "Write-Host hi"]),
            "gh --version",
        );
        assert_eq!(invocation.args, to_vec(&["-Login", "-Command", "gh --version"]));
    }

    #[test]
    fn posix_rendering_quotes_the_command() {
        let invocation = ShellInvocation {
            program: "/bin/zsh".to_string(),
            args: to_vec(&["-l", "-c", "wt add otter '/tmp/a b'"]),
        };
        assert_eq!(
            invocation.to_posix(),
            "/bin/zsh -l -c 'wt add otter '\\''/tmp/a b'\\'''"
        );
    }

    #[test]
    fn classify_handles_paths_and_case() {
        assert_eq!(ShellKind::classify("/usr/local/bin/FISH"), ShellKind::Fish);
        assert_eq!(ShellKind::classify("tcsh"), ShellKind::Tcsh);
        assert_eq!(ShellKind::classify("/bin/elvish"), ShellKind::Unknown);
    }
}
