//! Backup CLI commands
//!
//! Implements CLI commands for archive management.

use std::sync::Arc;

use clap::Subcommand;

use crate::backup::{ArchiveBuilder, ArchiveSpec, BackupCatalog, ExcludeSet, RestoreEngine};
use crate::config::{Settings, SkillvaultPaths};
use crate::display::{format_archive_list, format_inspection, format_size, format_trim};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::lock::BackupLock;
use crate::tools::{AssumeAnswer, Toolbox};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Encrypt the archive with gpg
        #[arg(long)]
        encrypt: bool,

        /// gpg recipient (overrides backup.recipient)
        #[arg(long, requires = "encrypt")]
        recipient: Option<String>,

        /// Keep the archive local even when remote sync is enabled
        #[arg(long)]
        no_upload: bool,
    },

    /// List all available backups
    List {
        /// Show creation time and full path for each backup
        #[arg(short, long)]
        long: bool,
    },

    /// Show what a backup contains and where it would be restored
    Info {
        /// Backup identifier, file name or path (use 'latest' for most recent)
        backup: String,
    },

    /// Delete backups beyond the retention count
    Prune {
        /// Number of backups to keep (defaults to backup.count)
        #[arg(long)]
        keep: Option<usize>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Catalog over the configured backup directory, with the remote when enabled
pub(crate) fn open_catalog(paths: &SkillvaultPaths, settings: &Settings, tools: &Toolbox) -> BackupCatalog {
    let catalog = BackupCatalog::new(settings.backup_dir(paths), settings.backup.prefix.clone());
    match &tools.store {
        Some(store) => catalog.with_remote(store.clone()),
        None => catalog,
    }
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &SkillvaultPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> SkillvaultResult<()> {
    let tools = Toolbox::system(settings, Arc::new(AssumeAnswer(false)));
    let catalog = open_catalog(paths, settings, &tools);

    match cmd {
        BackupCommands::Create {
            encrypt,
            recipient,
            no_upload,
        } => {
            let mut settings = settings.clone();
            if encrypt {
                settings.backup.encrypt = true;
            }
            if recipient.is_some() {
                settings.backup.recipient = recipient;
            }
            let spec = ArchiveSpec::from_settings(&settings)?;

            let _lock = BackupLock::acquire(catalog.backup_dir())?;
            let builder = ArchiveBuilder::new(
                catalog.backup_dir().to_path_buf(),
                settings.backup.prefix.clone(),
                ExcludeSet::new(&settings.backup.exclude_patterns)?,
                tools.encryptor.clone(),
            );

            println!("Creating backup...");
            let archive = builder.create(&spec)?;
            println!(
                "Backup created: {} ({})",
                archive.file_name,
                format_size(archive.size_bytes)
            );
            println!("Location: {}", archive.path.display());

            if catalog.has_remote() && !no_upload {
                match catalog.upload(&archive) {
                    Ok(()) => println!("Uploaded to remote."),
                    Err(e) => {
                        tracing::warn!(error = %e, "upload failed");
                        println!("Warning: upload failed: {}", e);
                    }
                }
            }

            let trim = catalog.trim(settings.backup.count)?;
            if !trim.local_deleted.is_empty() || !trim.remote_deleted.is_empty() {
                println!("{}", format_trim(&trim));
            }
        }

        BackupCommands::List { long } => {
            let archives = catalog.list()?;
            println!("{}", format_archive_list(&archives, long));
            if archives.is_empty() {
                println!("Create one with: skillvault backup create");
            }
        }

        BackupCommands::Info { backup } => {
            let engine = RestoreEngine::new(
                Arc::new(settings.clone()),
                catalog,
                tools.encryptor.clone(),
                tools.confirm.clone(),
            )?;
            let inspection = engine.inspect(&backup, None)?;
            println!("{}", format_inspection(&inspection));
        }

        BackupCommands::Prune { keep, force } => {
            let keep = keep.unwrap_or(settings.backup.count);
            if keep == 0 {
                return Err(SkillvaultError::Config("--keep must be at least 1".into()));
            }
            let archives = catalog.list()?;
            let excess = archives.len().saturating_sub(keep);

            if excess == 0 {
                println!("No backups to prune.");
                println!("Keeping up to {}, you have {}.", keep, archives.len());
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Keep newest: {}", keep);
            println!("Current backups: {}", archives.len());
            println!("To be deleted:");
            for archive in &archives[keep..] {
                println!("  {}", archive.file_name);
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  skillvault backup prune --force");
                return Ok(());
            }

            let _lock = BackupLock::acquire(catalog.backup_dir())?;
            let trim = catalog.trim(keep)?;
            println!("{}", format_trim(&trim));
        }
    }

    Ok(())
}
