//! Command-backed core updater and notifier

use super::process::{run, split_argv};
use super::{CoreUpdater, Notifier};
use crate::error::{SkillvaultError, SkillvaultResult};

/// Updates the managed application by running configured commands
#[derive(Debug, Clone, Default)]
pub struct CommandUpdater {
    update_command: Vec<String>,
    version_command: Vec<String>,
}

impl CommandUpdater {
    pub fn new(update_command: Vec<String>, version_command: Vec<String>) -> Self {
        Self {
            update_command,
            version_command,
        }
    }
}

impl CoreUpdater for CommandUpdater {
    fn is_enabled(&self) -> bool {
        !self.update_command.is_empty()
    }

    fn current_version(&self) -> SkillvaultResult<String> {
        if self.version_command.is_empty() {
            return Ok("unknown".to_string());
        }
        let (program, args) = split_argv(&self.version_command)?;
        let out = run(program, args, None)?;
        Ok(parse_version(&out.stdout))
    }

    fn update(&self) -> SkillvaultResult<()> {
        if self.update_command.is_empty() {
            return Err(SkillvaultError::Config(
                "update.core_update_command is not set".into(),
            ));
        }
        let (program, args) = split_argv(&self.update_command)?;
        run(program, args, None).map(|_| ())
    }
}

/// First non-empty line of a `--version` style output
fn parse_version(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Runs a configured command with the summary appended as the last argument
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, summary: &str) -> SkillvaultResult<()> {
        let (program, args) = split_argv(&self.command)?;
        let mut argv: Vec<&str> = args.iter().map(String::as_str).collect();
        argv.push(summary);
        run(program, argv, None).map(|_| ())
    }
}

/// Used when no notification command is configured
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _summary: &str) -> SkillvaultResult<()> {
        Ok(())
    }
}
