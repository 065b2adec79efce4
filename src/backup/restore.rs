//! Archive restoration
//!
//! A restore locates an archive, decrypts and extracts it into a private
//! scratch directory, rehomes embedded paths, builds a plan from the labels
//! found at the archive root, asks for confirmation and applies the plan.
//! Nothing outside the scratch directory is touched before confirmation.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::Serialize;

use super::archive::BackupArchive;
use super::catalog::BackupCatalog;
use super::exclude::ExcludeSet;
use super::sanitize::{PathSanitizer, SanitizeReport};
use super::sync::{sync_tree, SyncMode};
use crate::config::{Settings, CONFIG_LABEL};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::tools::{Confirm, Encryptor};

/// Label reported for flat archives
pub const LEGACY_LABEL: &str = "legacy";

/// Layout of an extracted archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// Flat module directory from older versions
    Legacy,
    /// One top-level directory per label
    Labeled,
}

/// Progress of a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    Idle,
    Located,
    Decrypted,
    Extracted,
    Sanitized,
    PlanBuilt,
    Confirmed,
    Applied,
    Cleaned,
    Aborted,
}

/// What to restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// `latest`, an identifier, a file name or a path
    pub selector: String,
    /// Restore only this label
    pub label: Option<String>,
    /// Skip confirmation
    pub force: bool,
}

impl RestoreRequest {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            label: None,
            force: false,
        }
    }

    pub fn only_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Apply { target: PathBuf, mode: SyncMode },
    /// Not the requested label
    Filtered,
    /// No destination is known for the label
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub label: String,
    pub source: PathBuf,
    #[serde(flatten)]
    pub action: PlanAction,
}

/// Label to destination mapping for one extracted archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorePlan {
    pub format: ArchiveFormat,
    pub entries: Vec<PlanEntry>,
}

impl RestorePlan {
    /// Plan for a labeled tree; `filter` restricts the restore to one label
    pub fn labeled(tree: &Path, labels: &[String], settings: &Settings, filter: Option<&str>) -> Self {
        let entries = labels
            .iter()
            .map(|label| {
                let action = if filter.map_or(false, |f| f != label) {
                    PlanAction::Filtered
                } else {
                    match settings.label_target(label) {
                        Some(target) => PlanAction::Apply {
                            target,
                            mode: if label == CONFIG_LABEL {
                                SyncMode::Additive
                            } else {
                                SyncMode::Mirror
                            },
                        },
                        None => {
                            tracing::warn!(label = %label, "unknown label in archive, skipping");
                            PlanAction::Unknown
                        }
                    }
                };
                PlanEntry {
                    label: label.clone(),
                    source: tree.join(label),
                    action,
                }
            })
            .collect();

        Self {
            format: ArchiveFormat::Labeled,
            entries,
        }
    }

    /// Plan for a flat tree: additive copy into the first module directory
    pub fn legacy(tree: &Path, settings: &Settings) -> Self {
        let target = settings
            .module_dirs()
            .into_iter()
            .next()
            .unwrap_or_else(|| settings.app_home().join("skills"));
        Self {
            format: ArchiveFormat::Legacy,
            entries: vec![PlanEntry {
                label: LEGACY_LABEL.to_string(),
                source: tree.to_path_buf(),
                action: PlanAction::Apply {
                    target,
                    mode: SyncMode::Additive,
                },
            }],
        }
    }

    pub fn has_work(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.action, PlanAction::Apply { .. }))
    }

    fn labels_where(&self, pred: impl Fn(&PlanAction) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| pred(&e.action))
            .map(|e| e.label.clone())
            .collect()
    }

    /// Human-readable summary used as the confirmation prompt
    pub fn describe(&self, archive: &BackupArchive) -> String {
        let mut out = format!("Restore {} ({:?} archive):\n", archive.file_name, self.format);
        for entry in &self.entries {
            let _ = match &entry.action {
                PlanAction::Apply { target, mode } => writeln!(
                    out,
                    "  {:<12} -> {} ({})",
                    entry.label,
                    target.display(),
                    match mode {
                        SyncMode::Mirror => "replace",
                        SyncMode::Additive => "merge",
                    }
                ),
                PlanAction::Filtered => writeln!(out, "  {:<12}    skipped (not requested)", entry.label),
                PlanAction::Unknown => writeln!(out, "  {:<12}    skipped (unknown label)", entry.label),
            };
        }
        out.push_str("Existing files at these destinations will be overwritten. Continue?");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelFailure {
    pub label: String,
    pub error: String,
}

/// Outcome of a restore that got past extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub archive: String,
    pub format: ArchiveFormat,
    pub stage: RestoreStage,
    /// Confirmation was declined; nothing was changed
    pub declined: bool,
    pub restored: Vec<String>,
    pub filtered: Vec<String>,
    pub unknown: Vec<String>,
    pub failed: Vec<LabelFailure>,
    pub sanitize: Option<SanitizeReport>,
}

impl RestoreReport {
    fn from_plan(archive: &BackupArchive, plan: &RestorePlan, sanitize: Option<SanitizeReport>) -> Self {
        Self {
            archive: archive.file_name.clone(),
            format: plan.format,
            stage: RestoreStage::PlanBuilt,
            declined: false,
            restored: Vec::new(),
            filtered: plan.labels_where(|a| matches!(a, PlanAction::Filtered)),
            unknown: plan.labels_where(|a| matches!(a, PlanAction::Unknown)),
            failed: Vec::new(),
            sanitize,
        }
    }

    /// Declining is a successful no-op; otherwise at least one label must land
    pub fn is_success(&self) -> bool {
        self.declined || !self.restored.is_empty()
    }

    /// Unknown labels and labels that failed to apply
    pub fn failure_count(&self) -> usize {
        self.unknown.len() + self.failed.len()
    }
}

/// What an archive contains, without applying it
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInspection {
    pub archive: BackupArchive,
    pub plan: RestorePlan,
    /// Home-path candidates found in the archive
    pub home_candidates: BTreeMap<String, usize>,
}

/// Restores archives into the configured destinations
pub struct RestoreEngine {
    settings: Arc<Settings>,
    catalog: BackupCatalog,
    encryptor: Arc<dyn Encryptor>,
    confirm: Arc<dyn Confirm>,
    exclude: ExcludeSet,
    sanitizer: PathSanitizer,
}

impl RestoreEngine {
    pub fn new(
        settings: Arc<Settings>,
        catalog: BackupCatalog,
        encryptor: Arc<dyn Encryptor>,
        confirm: Arc<dyn Confirm>,
    ) -> SkillvaultResult<Self> {
        let exclude = ExcludeSet::new(&settings.backup.exclude_patterns)?;
        let sanitizer = PathSanitizer::new(&settings.home_dir());
        Ok(Self {
            settings,
            catalog,
            encryptor,
            confirm,
            exclude,
            sanitizer,
        })
    }

    pub fn catalog(&self) -> &BackupCatalog {
        &self.catalog
    }

    /// Run a restore
    ///
    /// Errors are returned only when the restore aborts before anything is
    /// applied (archive missing, decryption or extraction failure). Per-label
    /// problems are recorded in the report.
    pub fn restore(&self, request: &RestoreRequest) -> SkillvaultResult<RestoreReport> {
        let mut stage = RestoreStage::Idle;
        let result = self.run(request, &mut stage);
        if let Err(e) = &result {
            tracing::error!(stage = ?stage, error = %e, "restore aborted");
            advance(&mut stage, RestoreStage::Aborted);
        }
        result
    }

    fn run(&self, request: &RestoreRequest, stage: &mut RestoreStage) -> SkillvaultResult<RestoreReport> {
        let archive = self.catalog.find(&request.selector)?;
        advance(stage, RestoreStage::Located);
        tracing::info!(archive = %archive.file_name, "restoring backup");

        let scratch = tempfile::Builder::new()
            .prefix("skillvault-restore-")
            .tempdir()
            .map_err(|e| SkillvaultError::from_write(e, "scratch directory"))?;
        let tree = self.unpack(&archive, scratch.path(), stage)?;

        let sanitize = match self.sanitizer.sanitize(&tree) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "path rewriting failed, restoring paths unchanged");
                None
            }
        };
        advance(stage, RestoreStage::Sanitized);

        let plan = self.plan(&tree, request.label.as_deref())?;
        advance(stage, RestoreStage::PlanBuilt);
        let mut report = RestoreReport::from_plan(&archive, &plan, sanitize);

        if !plan.has_work() {
            tracing::warn!(archive = %archive.file_name, "nothing in the archive matches the request");
        } else if !request.force && !self.confirm.confirm(&plan.describe(&archive))? {
            tracing::info!("restore declined");
            report.declined = true;
        } else {
            advance(stage, RestoreStage::Confirmed);
            self.apply(&plan, &mut report);
            advance(stage, RestoreStage::Applied);
        }

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "failed to remove restore scratch directory");
        }
        advance(stage, RestoreStage::Cleaned);
        report.stage = *stage;
        Ok(report)
    }

    /// Extract an archive and report its layout without applying anything
    pub fn inspect(&self, selector: &str, label: Option<&str>) -> SkillvaultResult<ArchiveInspection> {
        let mut stage = RestoreStage::Idle;
        let archive = self.catalog.find(selector)?;
        let scratch = tempfile::Builder::new()
            .prefix("skillvault-inspect-")
            .tempdir()
            .map_err(|e| SkillvaultError::from_write(e, "scratch directory"))?;
        let tree = self.unpack(&archive, scratch.path(), &mut stage)?;

        let home_candidates = self.sanitizer.scan(&tree).unwrap_or_default();
        let plan = self.plan(&tree, label)?;
        Ok(ArchiveInspection {
            archive,
            plan,
            home_candidates,
        })
    }

    fn unpack(
        &self,
        archive: &BackupArchive,
        scratch: &Path,
        stage: &mut RestoreStage,
    ) -> SkillvaultResult<PathBuf> {
        let tarball = if archive.encrypted {
            let plain = scratch.join("archive.tar.gz");
            self.encryptor.decrypt(&archive.path, &plain)?;
            advance(stage, RestoreStage::Decrypted);
            plain
        } else {
            archive.path.clone()
        };

        let tree = scratch.join("tree");
        fs::create_dir_all(&tree).map_err(|e| SkillvaultError::from_write(e, tree.display()))?;

        let corrupt = |e: std::io::Error| {
            SkillvaultError::Format(format!("cannot extract {}: {}", archive.file_name, e))
        };
        let file = File::open(&tarball).map_err(corrupt)?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        tar.set_preserve_permissions(true);
        tar.set_overwrite(true);
        tar.unpack(&tree).map_err(corrupt)?;

        if archive.encrypted {
            // plaintext is not needed once extracted
            let _ = fs::remove_file(&tarball);
        }
        advance(stage, RestoreStage::Extracted);
        Ok(tree)
    }

    fn plan(&self, tree: &Path, filter: Option<&str>) -> SkillvaultResult<RestorePlan> {
        let mut labels = Vec::new();
        for entry in fs::read_dir(tree)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                labels.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        labels.sort();

        if labels.is_empty() {
            if let Some(label) = filter {
                tracing::warn!(label = %label, "legacy archive has no labels, restoring everything");
            }
            return Ok(RestorePlan::legacy(tree, &self.settings));
        }
        Ok(RestorePlan::labeled(tree, &labels, &self.settings, filter))
    }

    fn apply(&self, plan: &RestorePlan, report: &mut RestoreReport) {
        for entry in &plan.entries {
            let PlanAction::Apply { target, mode } = &entry.action else {
                continue;
            };
            match sync_tree(&entry.source, target, *mode, &self.exclude) {
                Ok(stats) => {
                    tracing::info!(
                        label = %entry.label,
                        target = %target.display(),
                        copied = stats.copied,
                        removed = stats.removed,
                        "label restored"
                    );
                    report.restored.push(entry.label.clone());
                }
                Err(e) => {
                    tracing::error!(label = %entry.label, error = %e, "label restore failed");
                    report.failed.push(LabelFailure {
                        label: entry.label.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn advance(stage: &mut RestoreStage, next: RestoreStage) {
    tracing::debug!(from = ?*stage, to = ?next, "restore stage");
    *stage = next;
}
