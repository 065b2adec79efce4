//! Synchronous external command execution

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{SkillvaultError, SkillvaultResult};

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` to completion and capture its output
///
/// A missing executable becomes [`SkillvaultError::ToolUnavailable`]; a
/// non-zero exit becomes [`SkillvaultError::Command`] carrying stderr.
pub fn run<I, S>(program: &str, args: I, cwd: Option<&Path>) -> SkillvaultResult<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(program, cwd = ?cwd, "running external command");

    let output = cmd.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SkillvaultError::ToolUnavailable(program.to_string()),
        _ => SkillvaultError::Command {
            program: program.to_string(),
            message: e.to_string(),
        },
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let detail = stderr.trim();
        let message = if detail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            detail.lines().last().unwrap_or(detail).to_string()
        };
        return Err(SkillvaultError::Command {
            program: program.to_string(),
            message,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Split a configured argv into program and arguments
pub fn split_argv(argv: &[String]) -> SkillvaultResult<(&str, &[String])> {
    match argv.split_first() {
        Some((program, args)) if !program.is_empty() => Ok((program.as_str(), args)),
        _ => Err(SkillvaultError::Config("empty command".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_unavailable() {
        let err = run("skillvault-definitely-not-installed", ["--version"], None).unwrap_err();
        assert!(err.is_tool_unavailable());
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout() {
        let out = run("sh", ["-c", "echo hello"], None).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let err = run("sh", ["-c", "echo boom >&2; exit 3"], None).unwrap_err();
        match err {
            SkillvaultError::Command { program, message } => {
                assert_eq!(program, "sh");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_split_argv() {
        let argv = vec!["npm".to_string(), "update".to_string()];
        let (program, args) = split_argv(&argv).unwrap();
        assert_eq!(program, "npm");
        assert_eq!(args, ["update".to_string()]);
        assert!(split_argv(&[]).is_err());
    }
}
