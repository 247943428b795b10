use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use super::shell_invocation::build_login_shell_invocation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.unwrap_or_default() == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Command `{command}` failed with status {exit_code:?}: {}", failure_text(.stdout, .stderr))]
    Failed {
        command: String,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },
}

impl ProcessError {
    pub fn stdout(&self) -> &str {
        match self {
            ProcessError::Spawn { .. } => "",
            ProcessError::Failed { stdout, .. } => stdout,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            ProcessError::Spawn { .. } => "",
            ProcessError::Failed { stderr, .. } => stderr,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

fn failure_text<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim()
    } else {
        stderr
    }
}

pub fn display_command(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program);
    parts.extend(args.iter().map(String::as_str));
    shell_words::join(parts)
}

/// Executes external tools. Non-zero exits are reported as [`ProcessError::Failed`]
/// carrying the captured output so callers can inspect it.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError>;

    /// Same as [`ProcessRunner::run`] but sourced through the user's login shell so
    /// PATH customisations (Homebrew, asdf, ...) are visible.
    async fn run_login(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError>;

    /// Login-shell execution that forwards output lines to `lines`.
    ///
    /// The provided method is buffered: it waits for [`ProcessRunner::run_login`]
    /// and only then sends the stdout lines followed by the stderr lines.
    /// Runners that can observe a live process override it to send each line
    /// as it is produced, as [`SystemProcessRunner`] does.
    async fn run_login_streaming(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
        lines: UnboundedSender<String>,
    ) -> Result<CommandOutput, ProcessError> {
        let result = self.run_login(program, args, current_dir).await;
        let (stdout, stderr) = match &result {
            Ok(output) => (output.stdout.as_str(), output.stderr.as_str()),
            Err(err) => (err.stdout(), err.stderr()),
        };
        for line in stdout.lines().chain(stderr.lines()) {
            let _ = lines.send(line.to_string());
        }
        result
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    fn command(program: &str, args: &[String], current_dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = current_dir {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GH_PROMPT_DISABLED", "1")
            .env("NO_COLOR", "1");

        // GUI-launched processes on macOS inherit a minimal PATH; append the usual
        // Homebrew and /usr/local prefixes so git and gh resolve.
        #[cfg(target_os = "macos")]
        {
            use std::env;
            use std::path::PathBuf;

            const EXTRA_PATHS: &[&str] = &[
                "/opt/homebrew/bin",
                "/opt/homebrew/sbin",
                "/usr/local/bin",
                "/usr/local/sbin",
            ];

            let mut path_entries: Vec<PathBuf> = env::var_os("PATH")
                .map(|value| env::split_paths(&value).collect())
                .unwrap_or_default();
            for candidate in EXTRA_PATHS {
                let candidate_path = PathBuf::from(candidate);
                if !path_entries.iter().any(|existing| existing == &candidate_path) {
                    path_entries.push(candidate_path);
                }
            }
            if let Ok(joined) = env::join_paths(path_entries.iter()) {
                cmd.env("PATH", joined);
            }
        }

        cmd
    }

    fn login_command(program: &str, args: &[String]) -> (String, Vec<String>) {
        let invocation = build_login_shell_invocation(&display_command(program, args));
        (invocation.program, invocation.args)
    }

    async fn execute(
        mut cmd: Command,
        display: String,
    ) -> Result<CommandOutput, ProcessError> {
        let output = cmd.output().await.map_err(|source| ProcessError::Spawn {
            command: display.clone(),
            source,
        })?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        finish(display, result)
    }
}

fn finish(display: String, output: CommandOutput) -> Result<CommandOutput, ProcessError> {
    if output.success() {
        Ok(output)
    } else {
        debug!(
            "[Process] `{display}` exited with {:?}: stderr={}",
            output.status,
            output.stderr.trim()
        );
        Err(ProcessError::Failed {
            command: display,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status,
        })
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError> {
        let cmd = Self::command(program, args, current_dir);
        Self::execute(cmd, display_command(program, args)).await
    }

    async fn run_login(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
    ) -> Result<CommandOutput, ProcessError> {
        let (shell, shell_args) = Self::login_command(program, args);
        let cmd = Self::command(&shell, &shell_args, current_dir);
        Self::execute(cmd, display_command(program, args)).await
    }

    async fn run_login_streaming(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<&Path>,
        lines: UnboundedSender<String>,
    ) -> Result<CommandOutput, ProcessError> {
        let display = display_command(program, args);
        let (shell, shell_args) = Self::login_command(program, args);
        let mut cmd = Self::command(&shell, &shell_args, current_dir);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: display.clone(),
            source,
        })?;

        let stdout_task = child.stdout.take().map(|pipe| {
            let lines = lines.clone();
            tokio::spawn(forward_lines(pipe, lines))
        });
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(forward_lines(pipe, lines)));

        let status = child.wait().await.map_err(|source| ProcessError::Spawn {
            command: display.clone(),
            source,
        })?;

        let mut output = CommandOutput {
            status: status.code(),
            ..CommandOutput::default()
        };
        if let Some(task) = stdout_task {
            output.stdout = task.await.unwrap_or_default();
        }
        if let Some(task) = stderr_task {
            output.stderr = task.await.unwrap_or_default();
        }
        finish(display, output)
    }
}

async fn forward_lines<R>(pipe: R, lines: UnboundedSender<String>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut collected = String::new();
    let mut reader = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        collected.push_str(&line);
        collected.push('\n');
        let _ = lines.send(line);
    }
    collected
}
