//! Module CLI commands

use std::sync::Arc;

use clap::Subcommand;

use crate::config::{Settings, SkillvaultPaths};
use crate::display::{format_module_list, format_module_outcomes};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::lock::BackupLock;
use crate::tools::{GitCli, VersionControl};
use crate::update::{ModuleOutcome, SkillUpdater};

/// Module subcommands
#[derive(Subcommand)]
pub enum SkillsCommands {
    /// List module repositories with their revision
    List,

    /// Pull one module, or all of them
    Update {
        /// Module directory name
        name: Option<String>,
    },
}

/// Handle a skills command
pub fn handle_skills_command(
    paths: &SkillvaultPaths,
    settings: &Settings,
    cmd: SkillsCommands,
) -> SkillvaultResult<()> {
    let vcs: Arc<dyn VersionControl> = Arc::new(GitCli::new());
    let updater = SkillUpdater::from_settings(settings, vcs);
    let module_dirs = settings.module_dirs();

    match cmd {
        SkillsCommands::List => {
            let states: Vec<_> = updater
                .discover(&module_dirs)?
                .iter()
                .map(|m| updater.state(m))
                .collect();
            println!("{}", format_module_list(&states));
        }

        SkillsCommands::Update { name } => {
            let _lock = BackupLock::acquire(&settings.backup_dir(paths))?;
            let outcomes = match name {
                Some(name) => vec![updater.update(&updater.find(&module_dirs, &name)?)],
                None => updater.update_all(&module_dirs)?,
            };
            println!("{}", format_module_outcomes(&outcomes));
            partial_failure(&outcomes)?;
        }
    }

    Ok(())
}

fn partial_failure(outcomes: &[ModuleOutcome]) -> SkillvaultResult<()> {
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(SkillvaultError::PartialFailure {
            failed,
            total: outcomes.len(),
        })
    }
}
