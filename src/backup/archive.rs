//! Archive creation
//!
//! Packs the configured label directories and the application config file
//! into a single gzip-compressed tarball, optionally encrypted for one
//! recipient. Each source lands under its label in the archive and the config
//! file under `config/`, which is the layout the restore engine recognises as
//! a labeled archive.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::exclude::ExcludeSet;
use crate::config::{Settings, CONFIG_LABEL};
use crate::error::{SkillvaultError, SkillvaultResult};
use crate::tools::Encryptor;

/// Timestamp layout embedded in archive names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

const PLAIN_EXT: &str = ".tar.gz";
const ENCRYPTED_EXT: &str = ".tar.gz.gpg";

/// A stored archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    /// Timestamp identifier, e.g. `2025-03-14-09:26:53`
    pub id: String,
    /// File name in the backup directory
    pub file_name: String,
    /// Full path to the archive
    pub path: PathBuf,
    /// Creation time decoded from the name
    pub created_at: NaiveDateTime,
    /// Whether the archive is gpg-encrypted
    pub encrypted: bool,
    /// Size in bytes
    pub size_bytes: u64,
}

impl BackupArchive {
    /// Build metadata for an existing archive file whose name follows the
    /// `<prefix>-<timestamp>.tar.gz[.gpg]` convention
    pub fn from_path(prefix: &str, path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let (created_at, encrypted) = parse_archive_name(prefix, &file_name)?;
        let size_bytes = fs::metadata(path).ok()?.len();

        Some(Self {
            id: created_at.format(TIMESTAMP_FORMAT).to_string(),
            file_name,
            path: path.to_path_buf(),
            created_at,
            encrypted,
            size_bytes,
        })
    }
}

/// File name for an archive created at `timestamp`
pub fn archive_file_name(prefix: &str, timestamp: NaiveDateTime, encrypted: bool) -> String {
    format!(
        "{}-{}{}",
        prefix,
        timestamp.format(TIMESTAMP_FORMAT),
        if encrypted { ENCRYPTED_EXT } else { PLAIN_EXT }
    )
}

/// Decode `<prefix>-<timestamp>.tar.gz[.gpg]`; anything else is not an archive
pub fn parse_archive_name(prefix: &str, file_name: &str) -> Option<(NaiveDateTime, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('-')?;
    let (stamp, encrypted) = match rest.strip_suffix(ENCRYPTED_EXT) {
        Some(stamp) => (stamp, true),
        None => (rest.strip_suffix(PLAIN_EXT)?, false),
    };
    let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((created_at, encrypted))
}

/// A directory captured under a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub label: String,
    pub path: PathBuf,
}

/// What goes into one archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveSpec {
    pub sources: Vec<ArchiveSource>,
    /// Stored as `config/<file name>`
    pub config_file: Option<PathBuf>,
    /// Encrypt for this recipient
    pub recipient: Option<String>,
}

impl ArchiveSpec {
    /// The configured labels plus the config file, encrypted when enabled
    pub fn from_settings(settings: &Settings) -> SkillvaultResult<Self> {
        let mut sources = Vec::new();
        for label in &settings.backup_labels {
            if label == CONFIG_LABEL {
                continue;
            }
            let path = settings.label_target(label).ok_or_else(|| {
                SkillvaultError::Config(format!("no directory is known for label '{}'", label))
            })?;
            sources.push(ArchiveSource {
                label: label.clone(),
                path,
            });
        }

        let recipient = if settings.backup.encrypt {
            Some(settings.backup.recipient.clone().ok_or_else(|| {
                SkillvaultError::Config("backup.encrypt is set but backup.recipient is not".into())
            })?)
        } else {
            None
        };

        Ok(Self {
            sources,
            config_file: Some(settings.config_file()),
            recipient,
        })
    }
}

/// Writes archives into the backup directory
pub struct ArchiveBuilder {
    backup_dir: PathBuf,
    prefix: String,
    exclude: ExcludeSet,
    encryptor: Arc<dyn Encryptor>,
}

impl ArchiveBuilder {
    pub fn new(
        backup_dir: PathBuf,
        prefix: impl Into<String>,
        exclude: ExcludeSet,
        encryptor: Arc<dyn Encryptor>,
    ) -> Self {
        Self {
            backup_dir,
            prefix: prefix.into(),
            exclude,
            encryptor,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Create an archive stamped with the current local time
    pub fn create(&self, spec: &ArchiveSpec) -> SkillvaultResult<BackupArchive> {
        let now = Local::now().naive_local();
        self.create_at(spec, now)
    }

    /// Create an archive stamped with `timestamp`
    ///
    /// The plaintext tarball is assembled in a scratch directory inside the
    /// backup directory and removed whether or not encryption succeeds, so an
    /// encrypted run never leaves plaintext behind.
    pub fn create_at(
        &self,
        spec: &ArchiveSpec,
        timestamp: NaiveDateTime,
    ) -> SkillvaultResult<BackupArchive> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| SkillvaultError::from_write(e, self.backup_dir.display()))?;

        let encrypted = spec.recipient.is_some();
        let file_name = archive_file_name(&self.prefix, timestamp, encrypted);
        let final_path = self.backup_dir.join(&file_name);
        let taken = [false, true]
            .iter()
            .map(|&enc| self.backup_dir.join(archive_file_name(&self.prefix, timestamp, enc)))
            .find(|p| p.exists());
        if let Some(existing) = taken {
            return Err(SkillvaultError::Conflict(format!(
                "archive {} already exists",
                existing.display()
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix(".skillvault-build-")
            .tempdir_in(&self.backup_dir)
            .map_err(|e| SkillvaultError::from_write(e, "scratch directory"))?;
        let plain = scratch
            .path()
            .join(archive_file_name(&self.prefix, timestamp, false));

        let entries = self.write_tarball(&plain, spec)?;
        if entries == 0 {
            return Err(SkillvaultError::Format(
                "archive creation failed: none of the sources exist".into(),
            ));
        }

        match &spec.recipient {
            Some(recipient) => {
                let cipher = scratch.path().join(&file_name);
                self.encryptor.encrypt(&plain, &cipher, recipient)?;
                fs::remove_file(&plain).map_err(|e| SkillvaultError::from_write(e, plain.display()))?;
                fs::rename(&cipher, &final_path)
                    .map_err(|e| SkillvaultError::from_write(e, final_path.display()))?;
            }
            None => {
                fs::rename(&plain, &final_path)
                    .map_err(|e| SkillvaultError::from_write(e, final_path.display()))?;
            }
        }

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "failed to remove archive scratch directory");
        }

        let archive = BackupArchive::from_path(&self.prefix, &final_path).ok_or_else(|| {
            SkillvaultError::Io(format!("archive {} vanished after creation", file_name))
        })?;
        tracing::info!(
            archive = %archive.file_name,
            size = archive.size_bytes,
            encrypted,
            "backup archive created"
        );
        Ok(archive)
    }

    /// Write the tarball, returning how many entries were captured
    fn write_tarball(&self, dest: &Path, spec: &ArchiveSpec) -> SkillvaultResult<usize> {
        let file = File::create(dest).map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.follow_symlinks(false);

        let mut entries = 0;
        for source in &spec.sources {
            if !source.path.is_dir() {
                tracing::warn!(
                    label = %source.label,
                    path = %source.path.display(),
                    "backup source missing, skipping"
                );
                continue;
            }
            entries += self.append_source(&mut tar, source, dest)?;
        }

        if let Some(config) = &spec.config_file {
            match config.file_name() {
                Some(name) if config.is_file() => {
                    let mut f = File::open(config).map_err(|e| unreadable(config, e))?;
                    tar.append_file(Path::new(CONFIG_LABEL).join(name), &mut f)
                        .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
                    entries += 1;
                }
                _ => tracing::warn!(path = %config.display(), "config file missing, skipping"),
            }
        }

        let encoder = tar
            .into_inner()
            .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
        writer
            .flush()
            .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
        let file = writer
            .into_inner()
            .map_err(|e| SkillvaultError::from_write(e.into_error(), dest.display()))?;
        file.sync_all()
            .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;

        Ok(entries)
    }

    fn append_source<W: Write>(
        &self,
        tar: &mut tar::Builder<W>,
        source: &ArchiveSource,
        dest: &Path,
    ) -> SkillvaultResult<usize> {
        let walker = WalkDir::new(&source.path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.exclude.matches_name(e.file_name()));

        let mut entries = 0;
        for entry in walker {
            let entry = entry.map_err(|e| unreadable(&source.path, e))?;
            let relative = entry
                .path()
                .strip_prefix(&source.path)
                .map_err(|e| unreadable(entry.path(), e))?;
            let name = Path::new(&source.label).join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                tar.append_dir(&name, entry.path())
                    .map_err(|e| unreadable(entry.path(), e))?;
            } else if file_type.is_file() {
                let mut f = File::open(entry.path()).map_err(|e| unreadable(entry.path(), e))?;
                tar.append_file(&name, &mut f)
                    .map_err(|e| SkillvaultError::from_write(e, dest.display()))?;
            } else {
                tar.append_path_with_name(entry.path(), &name)
                    .map_err(|e| unreadable(entry.path(), e))?;
            }
            entries += 1;
        }

        Ok(entries)
    }
}

fn unreadable(what: &Path, err: impl std::fmt::Display) -> SkillvaultError {
    SkillvaultError::Format(format!(
        "archive creation failed: cannot read {}: {}",
        what.display(),
        err
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fakes::FakeEncryptor;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn stamp(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn builder(temp: &TempDir) -> ArchiveBuilder {
        ArchiveBuilder::new(
            temp.path().join("backups"),
            "skillvault",
            ExcludeSet::new(["node_modules", "*.pyc"]).unwrap(),
            Arc::new(FakeEncryptor::default()),
        )
    }

    fn seed_source(temp: &TempDir) -> PathBuf {
        let skills = temp.path().join("skills");
        fs::create_dir_all(skills.join("weather/node_modules/dep")).unwrap();
        fs::create_dir_all(skills.join("weather/src")).unwrap();
        fs::write(skills.join("weather/src/main.py"), "print('hi')\n").unwrap();
        fs::write(skills.join("weather/src/main.pyc"), [0u8, 1, 2]).unwrap();
        fs::write(skills.join("weather/node_modules/dep/index.js"), "x").unwrap();
        skills
    }

    fn entry_names(path: &Path) -> BTreeSet<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_archive_name_roundtrip() {
        let ts = stamp("2025-03-14-09:26:53");
        let name = archive_file_name("skillvault", ts, false);
        assert_eq!(name, "skillvault-2025-03-14-09:26:53.tar.gz");
        assert_eq!(parse_archive_name("skillvault", &name), Some((ts, false)));

        let enc = archive_file_name("skillvault", ts, true);
        assert_eq!(enc, "skillvault-2025-03-14-09:26:53.tar.gz.gpg");
        assert_eq!(parse_archive_name("skillvault", &enc), Some((ts, true)));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(parse_archive_name("skillvault", "notes.txt").is_none());
        assert!(parse_archive_name("skillvault", "other-2025-03-14-09:26:53.tar.gz").is_none());
        assert!(parse_archive_name("skillvault", "skillvault-yesterday.tar.gz").is_none());
        assert!(parse_archive_name("skillvault", ".skillvault.lock").is_none());
    }

    #[test]
    fn test_create_archive_with_labels_and_config() {
        let temp = TempDir::new().unwrap();
        let skills = seed_source(&temp);
        let config = temp.path().join("agent.json");
        fs::write(&config, "{\"model\": \"x\"}").unwrap();

        let spec = ArchiveSpec {
            sources: vec![ArchiveSource {
                label: "skills".into(),
                path: skills,
            }],
            config_file: Some(config),
            recipient: None,
        };
        let archive = builder(&temp)
            .create_at(&spec, stamp("2025-03-14-09:26:53"))
            .unwrap();

        assert_eq!(archive.id, "2025-03-14-09:26:53");
        assert!(!archive.encrypted);
        assert!(archive.size_bytes > 0);

        let names = entry_names(&archive.path);
        assert!(names.contains("skills/weather/src/main.py"));
        assert!(names.contains("config/agent.json"));
        assert!(!names.iter().any(|n| n.contains("node_modules")));
        assert!(!names.iter().any(|n| n.ends_with(".pyc")));
    }

    #[test]
    fn test_missing_sources_are_skipped() {
        let temp = TempDir::new().unwrap();
        let skills = seed_source(&temp);
        let spec = ArchiveSpec {
            sources: vec![
                ArchiveSource {
                    label: "workspace".into(),
                    path: temp.path().join("absent"),
                },
                ArchiveSource {
                    label: "skills".into(),
                    path: skills,
                },
            ],
            config_file: Some(temp.path().join("absent.json")),
            recipient: None,
        };

        let archive = builder(&temp).create(&spec).unwrap();
        let names = entry_names(&archive.path);
        assert!(names.contains("skills"));
        assert!(!names.iter().any(|n| n.starts_with("workspace")));
    }

    #[test]
    fn test_nothing_to_archive_is_format_error() {
        let temp = TempDir::new().unwrap();
        let spec = ArchiveSpec {
            sources: vec![ArchiveSource {
                label: "skills".into(),
                path: temp.path().join("absent"),
            }],
            config_file: None,
            recipient: None,
        };
        let builder = builder(&temp);
        let err = builder.create(&spec).unwrap_err();
        assert!(matches!(err, SkillvaultError::Format(_)));

        // no partial files or scratch dirs left behind
        let leftovers: Vec<_> = fs::read_dir(builder.backup_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_duplicate_identifier_is_conflict() {
        let temp = TempDir::new().unwrap();
        let spec = ArchiveSpec {
            sources: vec![ArchiveSource {
                label: "skills".into(),
                path: seed_source(&temp),
            }],
            ..Default::default()
        };
        let builder = builder(&temp);
        let ts = stamp("2025-03-14-09:26:53");
        builder.create_at(&spec, ts).unwrap();
        let err = builder.create_at(&spec, ts).unwrap_err();
        assert!(matches!(err, SkillvaultError::Conflict(_)));
    }

    #[test]
    fn test_encrypted_archive_leaves_no_plaintext() {
        let temp = TempDir::new().unwrap();
        let spec = ArchiveSpec {
            sources: vec![ArchiveSource {
                label: "skills".into(),
                path: seed_source(&temp),
            }],
            config_file: None,
            recipient: Some("ops@example.com".into()),
        };
        let builder = builder(&temp);
        let archive = builder.create(&spec).unwrap();
        assert!(archive.encrypted);
        assert!(archive.file_name.ends_with(".tar.gz.gpg"));

        let files: Vec<String> = fs::read_dir(builder.backup_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec![archive.file_name.clone()]);
    }

    #[test]
    fn test_failed_encryption_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let spec = ArchiveSpec {
            sources: vec![ArchiveSource {
                label: "skills".into(),
                path: seed_source(&temp),
            }],
            config_file: None,
            recipient: Some("missing".into()),
        };
        let builder = builder(&temp);
        let err = builder.create(&spec).unwrap_err();
        assert!(matches!(err, SkillvaultError::Encryption(_)));
        assert_eq!(fs::read_dir(builder.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_spec_from_settings() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::for_home(temp.path());
        settings.backup_labels = vec!["config".into(), "skills".into()];
        let spec = ArchiveSpec::from_settings(&settings).unwrap();
        assert_eq!(spec.sources.len(), 1);
        assert_eq!(spec.sources[0].label, "skills");
        assert_eq!(spec.config_file, Some(settings.config_file()));
        assert!(spec.recipient.is_none());

        settings.backup.encrypt = true;
        assert!(ArchiveSpec::from_settings(&settings).is_err());
        settings.backup.recipient = Some("ops@example.com".into());
        assert_eq!(
            ArchiveSpec::from_settings(&settings).unwrap().recipient.as_deref(),
            Some("ops@example.com")
        );
    }
}
