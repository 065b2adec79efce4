//! Backup catalog: listing, lookup, retention and remote copies

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::archive::{parse_archive_name, BackupArchive, TIMESTAMP_FORMAT};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::tools::ObjectStore;

/// Selector meaning "the newest archive"
pub const LATEST: &str = "latest";

/// What a retention pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    pub local_deleted: Vec<String>,
    pub remote_deleted: Vec<String>,
    /// Remote trimming problems; these never fail the pass
    pub remote_error: Option<String>,
}

/// Archives stored in the backup directory and, optionally, a remote copy
#[derive(Clone)]
pub struct BackupCatalog {
    backup_dir: PathBuf,
    prefix: String,
    remote: Option<Arc<dyn ObjectStore>>,
}

impl BackupCatalog {
    pub fn new(backup_dir: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            backup_dir,
            prefix: prefix.into(),
            remote: None,
        }
    }

    /// Mirror archives to `store` on upload and trim
    pub fn with_remote(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.remote = Some(store);
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Archives newest first; files not following the naming convention are ignored
    pub fn list(&self) -> SkillvaultResult<Vec<BackupArchive>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(archive) = BackupArchive::from_path(&self.prefix, &path) {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((archive, modified));
            }
        }

        found.sort_by_key(|(a, modified)| {
            (Reverse(a.created_at), Reverse(*modified), Reverse(a.file_name.clone()))
        });
        Ok(found.into_iter().map(|(a, _)| a).collect())
    }

    /// Newest archive, if any
    pub fn latest(&self) -> SkillvaultResult<Option<BackupArchive>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Resolve `latest`, an identifier, a file name, or a path
    pub fn find(&self, selector: &str) -> SkillvaultResult<BackupArchive> {
        let selector = selector.trim();
        if selector.eq_ignore_ascii_case(LATEST) {
            return self
                .latest()?
                .ok_or_else(|| SkillvaultError::archive_not_found("no backups exist"));
        }

        if selector.contains('/') {
            return archive_at_path(&self.prefix, Path::new(selector))
                .ok_or_else(|| SkillvaultError::archive_not_found(selector));
        }

        self.list()?
            .into_iter()
            .find(|a| {
                a.id == selector
                    || a.file_name == selector
                    || a.file_name
                        .strip_prefix(selector)
                        .map_or(false, |ext| ext.starts_with(".tar.gz"))
            })
            .ok_or_else(|| SkillvaultError::archive_not_found(selector))
    }

    /// Keep the newest `count` archives locally and remotely
    ///
    /// Names sort by their embedded timestamp, so descending name order is
    /// newest first on both sides.
    pub fn trim(&self, count: usize) -> SkillvaultResult<TrimReport> {
        let mut report = TrimReport::default();

        let mut local: Vec<BackupArchive> = self.list()?;
        local.sort_by(|a, b| b.file_name.cmp(&a.file_name));
        for archive in local.into_iter().skip(count) {
            fs::remove_file(&archive.path)
                .map_err(|e| SkillvaultError::from_write(e, archive.path.display()))?;
            tracing::info!(archive = %archive.file_name, "removed old backup");
            report.local_deleted.push(archive.file_name);
        }

        if let Some(remote) = &self.remote {
            if let Err(e) = self.trim_remote(remote.as_ref(), count, &mut report) {
                tracing::warn!(error = %e, "remote trim failed");
                report.remote_error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    fn trim_remote(
        &self,
        remote: &dyn ObjectStore,
        count: usize,
        report: &mut TrimReport,
    ) -> SkillvaultResult<()> {
        let mut names: Vec<String> = remote
            .list_names()?
            .into_iter()
            .filter(|n| parse_archive_name(&self.prefix, n).is_some())
            .collect();
        names.sort_by(|a, b| b.cmp(a));

        for name in names.into_iter().skip(count) {
            remote.delete(&name)?;
            tracing::info!(archive = %name, "removed old remote backup");
            report.remote_deleted.push(name);
        }
        Ok(())
    }

    /// Copy an archive to the remote; errors when no remote is configured
    pub fn upload(&self, archive: &BackupArchive) -> SkillvaultResult<()> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| SkillvaultError::Config("remote storage is not enabled".into()))?;
        remote.copy_in(&archive.path)?;
        tracing::info!(archive = %archive.file_name, "uploaded backup to remote");
        Ok(())
    }
}

/// Metadata for an archive given by path; names outside the convention are
/// accepted with the file's modification time
fn archive_at_path(prefix: &str, path: &Path) -> Option<BackupArchive> {
    if !path.is_file() {
        return None;
    }
    if let Some(archive) = BackupArchive::from_path(prefix, path) {
        return Some(archive);
    }

    let file_name = path.file_name()?.to_str()?.to_string();
    let metadata = fs::metadata(path).ok()?;
    let created_at = metadata
        .modified()
        .map(|t| DateTime::<Local>::from(t).naive_local())
        .ok()?;

    Some(BackupArchive {
        id: created_at.format(TIMESTAMP_FORMAT).to_string(),
        encrypted: file_name.ends_with(".gpg"),
        file_name,
        path: path.to_path_buf(),
        created_at,
        size_bytes: metadata.len(),
    })
}
