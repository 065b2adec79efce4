//! Backup system for skillvault
//!
//! Captures the managed application's label directories and config file in
//! timestamped archives, keeps a bounded number of them, and restores them
//! into the current environment.
//!
//! # Architecture
//!
//! - `ArchiveBuilder`: packs label directories and the config file into a
//!   `tar.gz`, optionally gpg-encrypted
//! - `BackupCatalog`: lists, resolves and trims archives, locally and remotely
//! - `PathSanitizer`: rewrites foreign home directories in extracted trees
//! - `RestoreEngine`: extract, rehome, plan, confirm, apply
//!
//! # Archive Format
//!
//! Archives are named `<prefix>-YYYY-MM-DD-HH:MM:SS.tar.gz[.gpg]`. Each label
//! is stored as a top-level directory (`skills/`, `workspace/`, ...) and the
//! config file under `config/`. Archives without any top-level directory are
//! treated as legacy flat module directories.
//!
//! # Example
//!
//! ```rust,ignore
//! use skillvault::backup::{ArchiveBuilder, ArchiveSpec, BackupCatalog};
//!
//! let archive = builder.create(&ArchiveSpec::from_settings(&settings)?)?;
//! catalog.trim(settings.backup.count)?;
//!
//! let report = restore.restore(&RestoreRequest::new("latest"))?;
//! ```

mod archive;
mod catalog;
mod exclude;
mod restore;
mod sanitize;
mod sync;

pub use archive::{
    archive_file_name, parse_archive_name, ArchiveBuilder, ArchiveSource, ArchiveSpec,
    BackupArchive, TIMESTAMP_FORMAT,
};
pub use catalog::{BackupCatalog, TrimReport, LATEST};
pub use exclude::ExcludeSet;
pub use restore::{
    ArchiveFormat, ArchiveInspection, LabelFailure, PlanAction, PlanEntry, RestoreEngine,
    RestorePlan, RestoreReport, RestoreRequest, RestoreStage, LEGACY_LABEL,
};
pub use sanitize::{PathSanitizer, SanitizeReport};
pub use sync::{sync_tree, SyncMode, SyncStats};
