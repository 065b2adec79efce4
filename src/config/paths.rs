//! Path management for skillvault
//!
//! Provides XDG-compliant path resolution for configuration, backups and
//! update reports.
//!
//! ## Path Resolution Order
//!
//! 1. `SKILLVAULT_HOME` environment variable (if set)
//! 2. `$XDG_CONFIG_HOME/skillvault` or `~/.config/skillvault`

use std::path::PathBuf;

use crate::error::SkillvaultError;

/// Manages all paths used by skillvault itself
#[derive(Debug, Clone)]
pub struct SkillvaultPaths {
    /// Base directory for all skillvault state
    base_dir: PathBuf,
}

impl SkillvaultPaths {
    /// Create a new SkillvaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, SkillvaultError> {
        let base_dir = match std::env::var_os("SKILLVAULT_HOME") {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create SkillvaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.config/skillvault/ or equivalent)
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the default backup directory (~/.config/skillvault/backups/)
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the directory update reports are written to
    pub fn report_dir(&self) -> PathBuf {
        self.base_dir.join("reports")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), SkillvaultError> {
        for dir in [self.base_dir.clone(), self.backup_dir(), self.report_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                SkillvaultError::from_write(e, format!("Failed to create {}", dir.display()))
            })?;
        }
        Ok(())
    }

    /// Check if skillvault has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Resolve the default base directory
fn resolve_default_path() -> Result<PathBuf, SkillvaultError> {
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(config_home).join("skillvault"));
    }

    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| SkillvaultError::Config("Could not determine home directory".into()))?;
    Ok(dirs.home_dir().join(".config").join("skillvault"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SkillvaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(paths.report_dir(), temp_dir.path().join("reports"));
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SkillvaultPaths::with_base_dir(temp_dir.path().join("nested"));

        paths.ensure_directories().unwrap();

        assert!(paths.backup_dir().is_dir());
        assert!(paths.report_dir().is_dir());
        assert!(!paths.is_initialized());
    }
}
