use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use skillvault::cli::{
    handle_backup_command, handle_restore_command, handle_skills_command, handle_update_command,
    BackupCommands, RestoreArgs, SkillsCommands, UpdateArgs,
};
use skillvault::config::{Settings, SkillvaultPaths};
use skillvault::logging::init_logging;
use skillvault::SkillvaultError;

#[derive(Parser)]
#[command(
    name = "skillvault",
    author = "Kaylee Beyene",
    version,
    about = "Backup, restore and update manager for modular plugin directories",
    long_about = "skillvault keeps timestamped archives of an application's skills, \
                  workspace and configuration, restores them on any machine or user \
                  account, and updates the application and its git-managed modules \
                  with automatic rollback."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Restore a backup into the current environment
    Restore(RestoreArgs),

    /// Back up, update the core application and every module
    Update(UpdateArgs),

    /// Module repository commands
    #[command(subcommand)]
    Skills(SkillsCommands),

    /// Show current configuration and paths
    Config,

    /// Write default settings
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<SkillvaultError>()
                .map_or(1, SkillvaultError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = SkillvaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)
        .with_context(|| format!("loading {}", paths.settings_file().display()))?;

    match cli.command {
        Commands::Backup(cmd) => handle_backup_command(&paths, &settings, cmd)?,
        Commands::Restore(args) => handle_restore_command(&paths, &settings, args)?,
        Commands::Update(args) => handle_update_command(&paths, &settings, args)?,
        Commands::Skills(cmd) => handle_skills_command(&paths, &settings, cmd)?,
        Commands::Init => {
            if paths.is_initialized() {
                println!(
                    "Already initialized: {}",
                    paths.settings_file().display()
                );
                return Ok(());
            }
            println!("Initializing skillvault at: {}", paths.base_dir().display());
            settings.save(&paths)?;
            println!("Settings written to {}", paths.settings_file().display());
            println!();
            println!("Managed application: {}", settings.app_home().display());
            println!("Backups:             {}", settings.backup_dir(&paths).display());
            println!();
            println!("Edit the settings file to configure update commands and remote sync.");
        }
        Commands::Config => {
            println!("skillvault Configuration");
            println!("========================");
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Backup directory: {}", settings.backup_dir(&paths).display());
            println!("Report directory: {}", paths.report_dir().display());
            println!("App home:         {}", settings.app_home().display());
            println!("Config file:      {}", settings.config_file().display());
            println!();
            println!("Labels:");
            for (label, target) in settings.label_targets() {
                let marker = if settings.backup_labels.contains(&label) {
                    "*"
                } else {
                    " "
                };
                println!("  {} {:<12} {}", marker, label, target.display());
            }
            println!();
            println!("Settings:");
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
