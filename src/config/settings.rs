//! User settings for skillvault
//!
//! Settings are read once at startup and handed to every component as an
//! immutable value. Anything that the original configuration expressed as a
//! comma-joined string is parsed into a typed collection here, at the
//! boundary, and nowhere else.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use super::paths::SkillvaultPaths;
use crate::error::SkillvaultError;

/// Labels every restore plan knows about, even without configuration
pub const BUILTIN_LABELS: [&str; 7] = [
    "config",
    "workspace",
    "skills",
    "extensions",
    "prod",
    "dev",
    "default",
];

/// Label reserved for the external configuration file
pub const CONFIG_LABEL: &str = "config";

/// Set of module names that updates must leave alone
///
/// Accepts either a JSON list or the legacy comma-joined string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModuleExclusions(BTreeSet<String>);

impl ModuleExclusions {
    /// Parse a comma-joined list, ignoring blanks and surrounding whitespace
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, module: &str) -> bool {
        self.0.contains(module)
    }

    pub fn insert(&mut self, module: impl Into<String>) {
        self.0.insert(module.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for ModuleExclusions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for ModuleExclusions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Joined(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Joined(s) => Self::parse(&s),
            Raw::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

/// Backup creation and retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Where archives are stored (defaults to the skillvault backup dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Archive filename prefix
    pub prefix: String,
    /// Number of archives to keep in each storage location
    pub count: usize,
    /// Glob patterns excluded from archives (matched per path component)
    pub exclude_patterns: Vec<String>,
    /// Encrypt archives to `recipient`
    pub encrypt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "skillvault".to_string(),
            count: 7,
            exclude_patterns: vec![
                "node_modules".to_string(),
                "__pycache__".to_string(),
                "*.pyc".to_string(),
                ".pytest_cache".to_string(),
            ],
            encrypt: false,
            recipient: None,
        }
    }
}

/// Remote object store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub enabled: bool,
    /// rclone-style destination, e.g. `s3:bucket/skillvault`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Settings for the update run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Command that updates the managed application (empty disables the stage)
    pub core_update_command: Vec<String>,
    /// Command printing the managed application's version
    pub version_command: Vec<String>,
    /// Minimum free space on the backup volume, in MiB
    pub min_free_mb: u64,
    /// `host:port` probed before updating
    pub connectivity_host: String,
    pub connect_timeout_secs: u64,
    /// Command run with the run summary as its last argument
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<Vec<String>>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            core_update_command: Vec::new(),
            version_command: Vec::new(),
            min_free_mb: 500,
            connectivity_host: "github.com:443".to_string(),
            connect_timeout_secs: 5,
            notify_command: None,
        }
    }
}

/// User settings for skillvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Home directory of the current environment (rehoming target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<PathBuf>,

    /// Root of the managed application (default `~/.agent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_home: Option<PathBuf>,

    /// External configuration file captured in every backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,

    /// Directories whose subdirectories are version-controlled modules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub module_dirs: Vec<PathBuf>,

    /// Labels captured by `backup create`
    #[serde(default = "default_backup_labels")]
    pub backup_labels: Vec<String>,

    /// Label -> directory associations overlaid on the built-in defaults
    #[serde(default)]
    pub label_paths: BTreeMap<String, PathBuf>,

    /// Modules skipped by updates
    #[serde(default)]
    pub excluded_modules: ModuleExclusions,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub update: UpdateSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_backup_labels() -> Vec<String> {
    vec![
        "workspace".to_string(),
        "skills".to_string(),
        "extensions".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            home_dir: None,
            app_home: None,
            config_file: None,
            module_dirs: Vec::new(),
            backup_labels: default_backup_labels(),
            label_paths: BTreeMap::new(),
            excluded_modules: ModuleExclusions::default(),
            backup: BackupSettings::default(),
            remote: RemoteSettings::default(),
            update: UpdateSettings::default(),
        }
    }
}

impl Settings {
    /// Settings rooted at `home`, with the managed application in `home/.agent`
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: Some(home.into()),
            ..Self::default()
        }
    }

    /// Home directory of the current environment
    pub fn home_dir(&self) -> PathBuf {
        if let Some(home) = &self.home_dir {
            return home.clone();
        }
        directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    /// Expand a leading `~` against [`Settings::home_dir`]
    pub fn expand(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => self.home_dir().join(rest),
            Err(_) => path.to_path_buf(),
        }
    }

    pub fn app_home(&self) -> PathBuf {
        match &self.app_home {
            Some(p) => self.expand(p),
            None => self.home_dir().join(".agent"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        match &self.config_file {
            Some(p) => self.expand(p),
            None => self.app_home().join("agent.json"),
        }
    }

    /// Module directories; defaults to the `skills` label target
    pub fn module_dirs(&self) -> Vec<PathBuf> {
        if self.module_dirs.is_empty() {
            return vec![self.label_target("skills").unwrap_or_else(|| self.app_home().join("skills"))];
        }
        self.module_dirs.iter().map(|p| self.expand(p)).collect()
    }

    /// Directory a label restores into, or `None` for unknown labels
    pub fn label_target(&self, label: &str) -> Option<PathBuf> {
        if let Some(p) = self.label_paths.get(label) {
            return Some(self.expand(p));
        }
        let app_home = self.app_home();
        match label {
            CONFIG_LABEL => Some(
                self.config_file()
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or(app_home),
            ),
            "workspace" | "skills" | "extensions" => Some(app_home.join(label)),
            "prod" | "dev" | "default" => Some(app_home.join("profiles").join(label)),
            _ => None,
        }
    }

    /// Every known label with its target, built-ins overlaid by configuration
    pub fn label_targets(&self) -> BTreeMap<String, PathBuf> {
        BUILTIN_LABELS
            .iter()
            .map(|l| l.to_string())
            .chain(self.label_paths.keys().cloned())
            .filter_map(|label| self.label_target(&label).map(|p| (label, p)))
            .collect()
    }

    /// Directory archives are stored in
    pub fn backup_dir(&self, paths: &SkillvaultPaths) -> PathBuf {
        match &self.backup.dir {
            Some(dir) => self.expand(dir),
            None => paths.backup_dir(),
        }
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<(), SkillvaultError> {
        if self.backup.count == 0 {
            return Err(SkillvaultError::Config(
                "backup.count must be at least 1".into(),
            ));
        }
        if self.backup.prefix.is_empty() || self.backup.prefix.contains('/') {
            return Err(SkillvaultError::Config(format!(
                "invalid backup.prefix '{}'",
                self.backup.prefix
            )));
        }
        if self.backup.encrypt
            && self
                .backup
                .recipient
                .as_deref()
                .map_or(true, |r| r.trim().is_empty())
        {
            return Err(SkillvaultError::Config(
                "backup.encrypt requires backup.recipient".into(),
            ));
        }
        if self.remote.enabled && self.remote.target.is_none() {
            return Err(SkillvaultError::Config(
                "remote.enabled requires remote.target".into(),
            ));
        }
        for label in self.label_paths.keys() {
            if label.is_empty() || label.contains('/') {
                return Err(SkillvaultError::Config(format!(
                    "invalid label name '{}'",
                    label
                )));
            }
        }
        Ok(())
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &SkillvaultPaths) -> Result<Self, SkillvaultError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                SkillvaultError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                SkillvaultError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &SkillvaultPaths) -> Result<(), SkillvaultError> {
        paths.ensure_directories()?;
        crate::storage::write_json_atomic(paths.settings_file(), self)
    }
}
