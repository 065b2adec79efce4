//! Update run records and where they are delivered

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::skills::{ModuleOutcome, ModuleStatus};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::storage::write_json_atomic;

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotRun,
    Skipped,
    Succeeded,
    Failed,
}

/// Pre-update backup step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    /// `None` when no remote is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for BackupOutcome {
    fn default() -> Self {
        Self {
            status: StepStatus::NotRun,
            archive: None,
            uploaded: None,
            error: None,
        }
    }
}

/// Restore performed after a failed core update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub archive: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restored: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Core application update step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreOutcome {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
}

impl Default for CoreOutcome {
    fn default() -> Self {
        Self {
            status: StepStatus::NotRun,
            before: None,
            after: None,
            error: None,
            rollback: None,
        }
    }
}

/// Everything that happened during one `update` invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
    pub status: RunStatus,
    /// Why the run stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub backup: BackupOutcome,
    pub core: CoreOutcome,
    pub modules: Vec<ModuleOutcome>,
    #[serde(default)]
    pub trimmed: Vec<String>,
}

impl UpdateRun {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Local::now(),
            finished_at: None,
            status: RunStatus::Success,
            abort_reason: None,
            backup: BackupOutcome::default(),
            core: CoreOutcome::default(),
            modules: Vec::new(),
            trimmed: Vec::new(),
        }
    }

    /// Stop the run; the status becomes `Failed`
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(reason = %reason, "update aborted");
        self.abort_reason = Some(reason);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Stamp the finish time and derive the status
    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
        self.status = if self.is_aborted() {
            RunStatus::Failed
        } else if self.modules.iter().any(ModuleOutcome::is_failed) {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };
    }

    fn with_status(&self, status: ModuleStatus) -> Vec<&ModuleOutcome> {
        self.modules.iter().filter(|m| m.status == status).collect()
    }

    pub fn updated(&self) -> Vec<&ModuleOutcome> {
        self.with_status(ModuleStatus::Updated)
    }

    pub fn failed(&self) -> Vec<&ModuleOutcome> {
        self.with_status(ModuleStatus::Failed)
    }

    /// One-line summary for notifications
    pub fn summary(&self) -> String {
        match self.status {
            RunStatus::Failed => format!(
                "skillvault update failed: {}",
                self.abort_reason.as_deref().unwrap_or("unknown error")
            ),
            _ => {
                let mut parts = vec![format!(
                    "{} updated, {} failed, {} modules checked",
                    self.updated().len(),
                    self.failed().len(),
                    self.modules.len()
                )];
                if let (Some(before), Some(after)) = (&self.core.before, &self.core.after) {
                    if before != after {
                        parts.push(format!("core {} -> {}", before, after));
                    }
                }
                if let Some(archive) = &self.backup.archive {
                    parts.push(format!("backup {}", archive));
                }
                format!("skillvault update: {}", parts.join("; "))
            }
        }
    }

    /// Map the final status onto the error classification used for exit codes
    pub fn into_result(self) -> SkillvaultResult<UpdateRun> {
        match self.status {
            RunStatus::Success => Ok(self),
            RunStatus::PartialFailure => Err(SkillvaultError::PartialFailure {
                failed: self.failed().len(),
                total: self.modules.len(),
            }),
            RunStatus::Failed => Err(SkillvaultError::FatalAbort(
                self.abort_reason
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Destination for finished run records
pub trait Reporter {
    fn emit(&self, run: &UpdateRun) -> SkillvaultResult<()>;
}

/// Writes each run to `<dir>/update-<timestamp>-<id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileReporter {
    dir: PathBuf,
}

impl JsonFileReporter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, run: &UpdateRun) -> PathBuf {
        let short_id: String = run.run_id.simple().to_string().chars().take(8).collect();
        self.dir.join(format!(
            "update-{}-{}.json",
            run.started_at.format("%Y-%m-%d-%H%M%S"),
            short_id
        ))
    }
}

impl Reporter for JsonFileReporter {
    fn emit(&self, run: &UpdateRun) -> SkillvaultResult<()> {
        let path = self.path_for(run);
        write_json_atomic(&path, run)?;
        tracing::info!(path = %path.display(), "update report written");
        Ok(())
    }
}
