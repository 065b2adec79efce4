//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup and update layers.

pub mod backup;
pub mod restore;
pub mod skills;
pub mod update;

pub use backup::{handle_backup_command, BackupCommands};
pub use restore::{handle_restore_command, RestoreArgs};
pub use skills::{handle_skills_command, SkillsCommands};
pub use update::{handle_update_command, UpdateArgs};
