use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;

use folio_common::types::GitInfo;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitProbeError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

impl Display for GitProbeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProbeError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitProbeError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
        }
    }
}

impl Error for GitProbeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Source of the opaque VCS metadata recorded on snapshots.
pub trait VcsProbe: Send + Sync {
    /// `None` when the workspace is not under version control or the VCS
    /// could not be queried.
    fn probe(&self) -> Option<GitInfo>;
}

/// Probe that never reports VCS state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVcs;

impl VcsProbe for NoVcs {
    fn probe(&self) -> Option<GitInfo> {
        None
    }
}

/// Reads HEAD, the current branch and the dirty flag with plain git commands.
#[derive(Debug, Clone)]
pub struct GitProbe<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
}

impl GitProbe<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor> GitProbe<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor }
    }

    pub fn head(&self) -> Result<String, GitProbeError> {
        self.run(&["rev-parse", "HEAD"]).map(|stdout| stdout.trim().to_string())
    }

    /// Current branch, `None` on a detached HEAD.
    pub fn branch(&self) -> Result<Option<String>, GitProbeError> {
        let stdout = self.run(&["branch", "--show-current"])?;
        let branch = stdout.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    pub fn is_dirty(&self) -> Result<bool, GitProbeError> {
        Ok(!self.run(&["status", "--porcelain"])?.trim().is_empty())
    }

    fn run(&self, args: &[&str]) -> Result<String, GitProbeError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let command = format!("git {}", args.join(" "));
        let result = self.executor.execute("git", &args, &self.repo_path).map_err(|error| {
            GitProbeError::SpawnFailed { command: command.clone(), message: error.to_string() }
        })?;

        if result.success {
            return Ok(result.stdout);
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitProbeError::CommandFailed { command, code: result.code, stderr })
    }
}

impl<E: CommandExecutor> VcsProbe for GitProbe<E> {
    fn probe(&self) -> Option<GitInfo> {
        let head = match self.head() {
            Ok(head) => head,
            Err(error) => {
                debug!(error = %error, "no git metadata for snapshot");
                return None;
            }
        };

        let branch = self.branch().unwrap_or_else(|error| {
            debug!(error = %error, "could not read current branch");
            None
        });
        let dirty = self.is_dirty().unwrap_or_else(|error| {
            debug!(error = %error, "could not read worktree status");
            false
        });

        Some(GitInfo { head: Some(head), branch, dirty })
    }
}
