//! Update workflow
//!
//! `SkillUpdater` pulls module repositories one at a time, rolling each back
//! on failure. `UpdateOrchestrator` wraps it with prechecks, a pre-update
//! backup, the core application update and retention, and records everything
//! in an `UpdateRun` that a `Reporter` persists.

mod orchestrator;
mod report;
mod skills;

pub use orchestrator::{RunOptions, UpdateOrchestrator};
pub use report::{
    BackupOutcome, CoreOutcome, JsonFileReporter, Reporter, RollbackOutcome, RunStatus,
    StepStatus, UpdateRun,
};
pub use skills::{ModuleOutcome, ModuleRepository, ModuleState, ModuleStatus, SkillUpdater};
