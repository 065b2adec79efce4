//! The `update` workflow
//!
//! Steps, in order: disk-space precheck, connectivity check, optional backup,
//! core update, module updates, retention trim, notification, report. A
//! failed core update triggers an automatic restore from the backup taken in
//! the same run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::report::{Reporter, RollbackOutcome, StepStatus, UpdateRun};
use super::skills::SkillUpdater;
use crate::backup::{
    ArchiveBuilder, ArchiveSpec, BackupArchive, BackupCatalog, ExcludeSet, RestoreEngine,
    RestoreRequest,
};
use crate::config::Settings;
use crate::error::SkillvaultResult;
use crate::lock::BackupLock;
use crate::tools::{CoreUpdater, HostProbe, Notifier, Toolbox};

const MIB: u64 = 1024 * 1024;

/// Switches for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Take a backup before changing anything
    pub backup: bool,
    /// Continue when the backup fails
    pub force: bool,
    /// Leave the core application alone
    pub skills_only: bool,
    /// Send the summary through the notifier
    pub notify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            backup: true,
            force: false,
            skills_only: false,
            notify: false,
        }
    }
}

pub struct UpdateOrchestrator {
    settings: Arc<Settings>,
    backup_dir: PathBuf,
    builder: ArchiveBuilder,
    catalog: BackupCatalog,
    restore: RestoreEngine,
    skills: SkillUpdater,
    core: Arc<dyn CoreUpdater>,
    probe: Arc<dyn HostProbe>,
    notifier: Arc<dyn Notifier>,
    reporter: Box<dyn Reporter>,
}

impl UpdateOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        backup_dir: PathBuf,
        tools: &Toolbox,
        reporter: Box<dyn Reporter>,
    ) -> SkillvaultResult<Self> {
        let exclude = ExcludeSet::new(&settings.backup.exclude_patterns)?;
        let mut catalog = BackupCatalog::new(backup_dir.clone(), settings.backup.prefix.clone());
        if let Some(store) = &tools.store {
            catalog = catalog.with_remote(store.clone());
        }
        let builder = ArchiveBuilder::new(
            backup_dir.clone(),
            settings.backup.prefix.clone(),
            exclude,
            tools.encryptor.clone(),
        );
        let restore = RestoreEngine::new(
            settings.clone(),
            catalog.clone(),
            tools.encryptor.clone(),
            tools.confirm.clone(),
        )?;
        let skills = SkillUpdater::from_settings(&settings, tools.vcs.clone());

        Ok(Self {
            settings,
            backup_dir,
            builder,
            catalog,
            restore,
            skills,
            core: tools.core.clone(),
            probe: tools.probe.clone(),
            notifier: tools.notifier.clone(),
            reporter,
        })
    }

    /// Run the workflow; the returned record is final and already reported
    pub fn run(&self, options: &RunOptions) -> UpdateRun {
        let mut run = UpdateRun::start();
        tracing::info!(run_id = %run.run_id, ?options, "update run started");

        match BackupLock::acquire(&self.backup_dir) {
            Ok(_lock) => self.execute(options, &mut run),
            Err(e) => run.abort(e.to_string()),
        }
        run.finish();
        tracing::info!(run_id = %run.run_id, status = ?run.status, "update run finished");

        if options.notify {
            if let Err(e) = self.notifier.notify(&run.summary()) {
                tracing::warn!(error = %e, "notification failed");
            }
        }
        if let Err(e) = self.reporter.emit(&run) {
            tracing::warn!(error = %e, "failed to write update report");
        }
        run
    }

    fn execute(&self, options: &RunOptions, run: &mut UpdateRun) {
        if !self.precheck(run) {
            return;
        }

        let fresh = if options.backup {
            let archive = self.backup_step(options, run);
            if run.is_aborted() {
                return;
            }
            archive
        } else {
            tracing::info!("backup skipped by request");
            run.backup.status = StepStatus::Skipped;
            None
        };

        if options.skills_only || !self.core.is_enabled() {
            run.core.status = StepStatus::Skipped;
        } else if !self.core_step(fresh.as_ref(), run) {
            return;
        }

        match self.skills.update_all(&self.settings.module_dirs()) {
            Ok(outcomes) => run.modules = outcomes,
            Err(e) => {
                run.abort(format!("cannot enumerate modules: {}", e));
                return;
            }
        }

        match self.catalog.trim(self.settings.backup.count) {
            Ok(trim) => run.trimmed = trim.local_deleted,
            Err(e) => tracing::warn!(error = %e, "retention trim failed"),
        }
    }

    /// Disk space and connectivity; false when the run was aborted
    fn precheck(&self, run: &mut UpdateRun) -> bool {
        let required_mb = self.settings.update.min_free_mb;
        match self.probe.free_space(&self.backup_dir) {
            Ok(free) if free < required_mb.saturating_mul(MIB) => {
                run.abort(format!(
                    "insufficient disk space: {} MiB free, {} MiB required",
                    free / MIB,
                    required_mb
                ));
                return false;
            }
            Ok(free) => tracing::debug!(free_mib = free / MIB, "disk space ok"),
            Err(e) => {
                run.abort(format!("cannot determine free disk space: {}", e));
                return false;
            }
        }

        let host = &self.settings.update.connectivity_host;
        let timeout = Duration::from_secs(self.settings.update.connect_timeout_secs);
        if let Err(e) = self.probe.check_connectivity(host, timeout) {
            run.abort(format!("no network connectivity: {}", e));
            return false;
        }
        true
    }

    fn backup_step(&self, options: &RunOptions, run: &mut UpdateRun) -> Option<BackupArchive> {
        let created =
            ArchiveSpec::from_settings(&self.settings).and_then(|spec| self.builder.create(&spec));
        match created {
            Ok(archive) => {
                run.backup.status = StepStatus::Succeeded;
                run.backup.archive = Some(archive.file_name.clone());
                if self.catalog.has_remote() {
                    match self.catalog.upload(&archive) {
                        Ok(()) => run.backup.uploaded = Some(true),
                        Err(e) => {
                            tracing::warn!(error = %e, "remote upload failed, continuing");
                            run.backup.uploaded = Some(false);
                            run.backup.error = Some(format!("upload failed: {}", e));
                        }
                    }
                }
                Some(archive)
            }
            Err(e) => {
                run.backup.status = StepStatus::Failed;
                run.backup.error = Some(e.to_string());
                if options.force {
                    tracing::warn!(error = %e, "backup failed, continuing because of --force");
                } else {
                    run.abort(format!("backup failed: {}", e));
                }
                None
            }
        }
    }

    /// Update the core application; false when the run was aborted
    fn core_step(&self, fresh: Option<&BackupArchive>, run: &mut UpdateRun) -> bool {
        run.core.before = self.core.current_version().ok();
        match self.core.update() {
            Ok(()) => {
                run.core.status = StepStatus::Succeeded;
                run.core.after = self.core.current_version().ok();
                tracing::info!(before = ?run.core.before, after = ?run.core.after, "core updated");
                true
            }
            Err(e) => {
                run.core.status = StepStatus::Failed;
                run.core.error = Some(e.to_string());
                match fresh {
                    Some(archive) => run.core.rollback = Some(self.roll_back(archive)),
                    None => tracing::warn!("core update failed and no backup from this run exists"),
                }
                run.abort(format!("core update failed: {}", e));
                false
            }
        }
    }

    fn roll_back(&self, archive: &BackupArchive) -> RollbackOutcome {
        tracing::warn!(archive = %archive.file_name, "restoring backup after failed core update");
        let request = RestoreRequest::new(archive.file_name.clone()).forced();
        match self.restore.restore(&request) {
            Ok(report) => {
                let succeeded = report.is_success() && report.failed.is_empty();
                let error = (!succeeded).then(|| {
                    report
                        .failed
                        .iter()
                        .map(|f| format!("{}: {}", f.label, f.error))
                        .collect::<Vec<_>>()
                        .join("; ")
                });
                RollbackOutcome {
                    archive: archive.file_name.clone(),
                    succeeded,
                    restored: report.restored,
                    error,
                }
            }
            Err(e) => RollbackOutcome {
                archive: archive.file_name.clone(),
                succeeded: false,
                restored: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}
