//! Per-module updates with rollback

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ModuleExclusions, Settings};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::tools::VersionControl;

/// A version-controlled module directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRepository {
    pub name: String,
    pub path: PathBuf,
    /// Skipped by updates
    pub excluded: bool,
}

/// Result classification for one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Updated,
    NoChange,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutcome {
    pub name: String,
    pub status: ModuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModuleOutcome {
    fn new(name: &str, status: ModuleStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            before: None,
            after: None,
            reason: None,
        }
    }

    fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(name, ModuleStatus::Skipped)
        }
    }

    fn failed(name: &str, before: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            before,
            reason: Some(reason.into()),
            ..Self::new(name, ModuleStatus::Failed)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ModuleStatus::Failed
    }
}

/// Read-only view of a module for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleState {
    pub module: ModuleRepository,
    pub revision: Option<String>,
    pub dirty: Option<bool>,
}

/// Updates modules one at a time, never leaving one half-updated
pub struct SkillUpdater {
    vcs: Arc<dyn VersionControl>,
    excluded: ModuleExclusions,
}

impl SkillUpdater {
    pub fn new(vcs: Arc<dyn VersionControl>, excluded: ModuleExclusions) -> Self {
        Self { vcs, excluded }
    }

    pub fn from_settings(settings: &Settings, vcs: Arc<dyn VersionControl>) -> Self {
        Self::new(vcs, settings.excluded_modules.clone())
    }

    /// Repositories (subdirectories holding `.git`) in each module directory,
    /// sorted by name within a directory
    pub fn discover(&self, module_dirs: &[PathBuf]) -> SkillvaultResult<Vec<ModuleRepository>> {
        let mut modules = Vec::new();
        for dir in module_dirs {
            if !dir.is_dir() {
                tracing::warn!(dir = %dir.display(), "module directory missing, skipping");
                continue;
            }

            let mut found = Vec::new();
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() || !path.join(".git").exists() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                found.push(ModuleRepository {
                    excluded: self.excluded.contains(&name),
                    name,
                    path,
                });
            }
            found.sort_by(|a, b| a.name.cmp(&b.name));
            modules.extend(found);
        }
        Ok(modules)
    }

    /// Find one module by name
    pub fn find(&self, module_dirs: &[PathBuf], name: &str) -> SkillvaultResult<ModuleRepository> {
        self.discover(module_dirs)?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| SkillvaultError::module_not_found(name))
    }

    /// Revision and dirtiness for display; tool errors become `None`
    pub fn state(&self, module: &ModuleRepository) -> ModuleState {
        ModuleState {
            module: module.clone(),
            revision: self.vcs.current_revision(&module.path).ok(),
            dirty: self.vcs.is_dirty(&module.path).ok(),
        }
    }

    /// Update one module
    ///
    /// A dirty working tree is left untouched. A failed pull is rolled back to
    /// the revision recorded before pulling.
    pub fn update(&self, module: &ModuleRepository) -> ModuleOutcome {
        let name = module.name.as_str();
        if module.excluded || self.excluded.contains(name) {
            tracing::info!(module = %name, "module excluded, skipping");
            return ModuleOutcome::skipped(name, "excluded by configuration");
        }

        match self.vcs.is_dirty(&module.path) {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(module = %name, "local changes detected, not updating");
                return ModuleOutcome::failed(name, None, "local changes detected");
            }
            Err(e) => return ModuleOutcome::failed(name, None, format!("status check failed: {}", e)),
        }

        let before = match self.vcs.current_revision(&module.path) {
            Ok(rev) => rev,
            Err(e) => return ModuleOutcome::failed(name, None, format!("cannot read revision: {}", e)),
        };

        if let Err(pull_err) = self.vcs.pull_fast_forward(&module.path) {
            tracing::warn!(module = %name, error = %pull_err, "pull failed, rolling back");
            return match self.vcs.reset_hard(&module.path, &before) {
                Ok(()) => ModuleOutcome::failed(name, Some(before), "pull failed, rolled back"),
                Err(reset_err) => {
                    tracing::error!(
                        module = %name,
                        revision = %before,
                        error = %reset_err,
                        "rollback failed, module needs manual repair"
                    );
                    let reason = format!("pull failed and rollback to {} failed: {}", before, reset_err);
                    ModuleOutcome::failed(name, Some(before), reason)
                }
            };
        }

        match self.vcs.current_revision(&module.path) {
            Ok(after) if after == before => {
                tracing::debug!(module = %name, revision = %before, "already up to date");
                ModuleOutcome {
                    before: Some(before),
                    after: Some(after),
                    ..ModuleOutcome::new(name, ModuleStatus::NoChange)
                }
            }
            Ok(after) => {
                tracing::info!(module = %name, from = %before, to = %after, "module updated");
                ModuleOutcome {
                    before: Some(before),
                    after: Some(after),
                    ..ModuleOutcome::new(name, ModuleStatus::Updated)
                }
            }
            Err(e) => ModuleOutcome::failed(name, Some(before), format!("cannot read revision after pull: {}", e)),
        }
    }

    /// Update every discovered module in order
    pub fn update_all(&self, module_dirs: &[PathBuf]) -> SkillvaultResult<Vec<ModuleOutcome>> {
        Ok(self
            .discover(module_dirs)?
            .iter()
            .map(|m| self.update(m))
            .collect())
    }
}
