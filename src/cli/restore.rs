//! Restore CLI command

use std::sync::Arc;

use clap::Args;

use super::backup::open_catalog;
use crate::backup::{RestoreEngine, RestoreRequest};
use crate::config::{Settings, SkillvaultPaths};
use crate::display::{format_inspection, format_restore_report};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::lock::BackupLock;
use crate::tools::{Confirm, StdinConfirm, Toolbox};

#[derive(Args)]
pub struct RestoreArgs {
    /// Backup identifier, file name or path (use 'latest' for most recent)
    pub backup: String,

    /// Restore only this label
    #[arg(short, long)]
    pub label: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub force: bool,

    /// Show what would be restored without changing anything
    #[arg(long, conflicts_with = "force")]
    pub inspect: bool,
}

/// Handle `skillvault restore`
pub fn handle_restore_command(
    paths: &SkillvaultPaths,
    settings: &Settings,
    args: RestoreArgs,
) -> SkillvaultResult<()> {
    let confirm: Arc<dyn Confirm> = Arc::new(StdinConfirm);
    let tools = Toolbox::system(settings, confirm);
    let catalog = open_catalog(paths, settings, &tools);
    let engine = RestoreEngine::new(
        Arc::new(settings.clone()),
        catalog.clone(),
        tools.encryptor.clone(),
        tools.confirm.clone(),
    )?;

    if args.inspect {
        let inspection = engine.inspect(&args.backup, args.label.as_deref())?;
        println!("{}", format_inspection(&inspection));
        return Ok(());
    }

    let _lock = BackupLock::acquire(catalog.backup_dir())?;
    let mut request = RestoreRequest::new(args.backup);
    if let Some(label) = args.label {
        request = request.only_label(label);
    }
    if args.force {
        request = request.forced();
    }

    let report = engine.restore(&request)?;
    println!("{}", format_restore_report(&report));

    if report.is_success() {
        Ok(())
    } else {
        Err(SkillvaultError::FatalAbort(format!(
            "nothing was restored from {}",
            report.archive
        )))
    }
}
