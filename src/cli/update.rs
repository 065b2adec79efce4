//! Update CLI command

use std::sync::Arc;

use clap::Args;

use crate::config::{Settings, SkillvaultPaths};
use crate::display::format_update_run;
use crate::error::SkillvaultResult;
use crate::tools::{AssumeAnswer, Confirm, StdinConfirm, Toolbox};
use crate::update::{JsonFileReporter, RunOptions, UpdateOrchestrator};

#[derive(Args)]
pub struct UpdateArgs {
    /// Do not take a backup before updating
    #[arg(long)]
    pub no_backup: bool,

    /// Continue even if the backup fails
    #[arg(short, long)]
    pub force: bool,

    /// Update modules only, leave the core application alone
    #[arg(long)]
    pub skills_only: bool,

    /// Send the run summary through update.notify_command
    #[arg(long)]
    pub notify: bool,

    /// Do not ask for confirmation (for cron and other unattended runs)
    #[arg(short, long)]
    pub yes: bool,
}

impl UpdateArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            backup: !self.no_backup,
            force: self.force,
            skills_only: self.skills_only,
            notify: self.notify,
        }
    }
}

/// Handle `skillvault update`
pub fn handle_update_command(
    paths: &SkillvaultPaths,
    settings: &Settings,
    args: UpdateArgs,
) -> SkillvaultResult<()> {
    if args.notify && settings.update.notify_command.as_ref().map_or(true, Vec::is_empty) {
        tracing::warn!("--notify given but update.notify_command is not configured");
    }

    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(AssumeAnswer(true))
    } else {
        Arc::new(StdinConfirm)
    };
    if !args.yes && !confirm.confirm(&update_prompt(&args))? {
        println!("Update cancelled.");
        return Ok(());
    }

    paths.ensure_directories()?;
    let tools = Toolbox::system(settings, confirm);
    let orchestrator = UpdateOrchestrator::new(
        Arc::new(settings.clone()),
        settings.backup_dir(paths),
        &tools,
        Box::new(JsonFileReporter::new(paths.report_dir())),
    )?;

    let run = orchestrator.run(&args.options());
    println!("{}", format_update_run(&run));
    run.into_result().map(|_| ())
}

fn update_prompt(args: &UpdateArgs) -> String {
    let mut steps = Vec::new();
    if !args.no_backup {
        steps.push("back up");
    }
    if !args.skills_only {
        steps.push("update the core application");
    }
    steps.push("update all modules");
    format!("This will {}. Continue?", steps.join(", then "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> UpdateArgs {
        UpdateArgs {
            no_backup: false,
            force: false,
            skills_only: false,
            notify: false,
            yes: true,
        }
    }

    #[test]
    fn test_options_from_flags() {
        let options = UpdateArgs {
            no_backup: true,
            skills_only: true,
            ..args()
        }
        .options();
        assert!(!options.backup);
        assert!(options.skills_only);
        assert!(!options.force);
    }

    #[test]
    fn test_prompt_lists_steps() {
        assert_eq!(
            update_prompt(&args()),
            "This will back up, then update the core application, then update all modules. Continue?"
        );
        let skills = UpdateArgs {
            no_backup: true,
            skills_only: true,
            ..args()
        };
        assert_eq!(update_prompt(&skills), "This will update all modules. Continue?");
    }
}
