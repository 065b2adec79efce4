//! Configuration module for skillvault
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution for skillvault's own state
//! - Settings describing the managed application, backups and updates

pub mod paths;
pub mod settings;

pub use paths::SkillvaultPaths;
pub use settings::{ModuleExclusions, Settings, BUILTIN_LABELS, CONFIG_LABEL};
