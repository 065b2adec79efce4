//! In-memory collaborators for unit tests

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{CoreUpdater, Encryptor, HostProbe, Notifier, ObjectStore, VersionControl};
use crate::error::{SkillvaultError, SkillvaultResult};

/// What a fake pull does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullBehavior {
    /// Fast-forward to the upstream revision
    Advance,
    /// Move the working tree to upstream, leave it half-merged, then fail
    AdvanceThenFail,
    /// Fail without touching anything
    Fail,
}

#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub head: String,
    pub upstream: String,
    pub dirty: bool,
    pub pull: PullBehavior,
}

/// Version control over a map of fake repositories keyed by path
#[derive(Debug, Default)]
pub struct FakeVcs {
    repos: Mutex<HashMap<PathBuf, FakeRepo>>,
    calls: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository; also creates `<path>/.git` so discovery finds it
    pub fn add_repo(&self, path: &Path, head: &str, upstream: &str, pull: PullBehavior) {
        fs::create_dir_all(path.join(".git")).unwrap();
        self.repos.lock().unwrap().insert(
            path.to_path_buf(),
            FakeRepo {
                head: head.to_string(),
                upstream: upstream.to_string(),
                dirty: false,
                pull,
            },
        );
    }

    pub fn set_dirty(&self, path: &Path, dirty: bool) {
        self.repos.lock().unwrap().get_mut(path).unwrap().dirty = dirty;
    }

    pub fn repo(&self, path: &Path) -> FakeRepo {
        self.repos.lock().unwrap()[path].clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(format!("{op} {name}"));
    }

    fn with_repo<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut FakeRepo) -> SkillvaultResult<T>,
    ) -> SkillvaultResult<T> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| SkillvaultError::module_not_found(path.display().to_string()))?;
        f(repo)
    }
}

impl VersionControl for FakeVcs {
    fn is_dirty(&self, repo: &Path) -> SkillvaultResult<bool> {
        self.record("status", repo);
        self.with_repo(repo, |r| Ok(r.dirty))
    }

    fn current_revision(&self, repo: &Path) -> SkillvaultResult<String> {
        self.record("rev-parse", repo);
        self.with_repo(repo, |r| Ok(r.head.clone()))
    }

    fn pull_fast_forward(&self, repo: &Path) -> SkillvaultResult<()> {
        self.record("pull", repo);
        self.with_repo(repo, |r| match r.pull {
            PullBehavior::Advance => {
                r.head = r.upstream.clone();
                Ok(())
            }
            PullBehavior::AdvanceThenFail => {
                r.head = r.upstream.clone();
                r.dirty = true;
                Err(SkillvaultError::Command {
                    program: "git".into(),
                    message: "merge conflict".into(),
                })
            }
            PullBehavior::Fail => Err(SkillvaultError::Command {
                program: "git".into(),
                message: "could not resolve host".into(),
            }),
        })
    }

    fn reset_hard(&self, repo: &Path, revision: &str) -> SkillvaultResult<()> {
        self.record("reset", repo);
        self.with_repo(repo, |r| {
            r.head = revision.to_string();
            r.dirty = false;
            Ok(())
        })
    }
}

const FAKE_HEADER: &[u8] = b"FAKEGPG\n";

/// Reversible "encryption" that prefixes a marker; recipient `missing` fails
#[derive(Debug, Default)]
pub struct FakeEncryptor {
    pub unavailable: bool,
}

impl Encryptor for FakeEncryptor {
    fn encrypt(&self, plain: &Path, cipher: &Path, recipient: &str) -> SkillvaultResult<()> {
        if self.unavailable {
            return Err(SkillvaultError::ToolUnavailable("gpg".into()));
        }
        if recipient == "missing" {
            return Err(SkillvaultError::Encryption(format!(
                "{recipient}: No public key"
            )));
        }
        let mut data = FAKE_HEADER.to_vec();
        data.extend(fs::read(plain)?);
        fs::write(cipher, data)?;
        Ok(())
    }

    fn decrypt(&self, cipher: &Path, plain: &Path) -> SkillvaultResult<()> {
        if self.unavailable {
            return Err(SkillvaultError::ToolUnavailable("gpg".into()));
        }
        let data = fs::read(cipher)?;
        let body = data
            .strip_prefix(FAKE_HEADER)
            .ok_or_else(|| SkillvaultError::Encryption("decryption failed".into()))?;
        fs::write(plain, body)?;
        Ok(())
    }
}

/// Remote store holding only names
#[derive(Debug, Default)]
pub struct FakeStore {
    names: Mutex<BTreeSet<String>>,
}

impl FakeStore {
    pub fn with_names<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().iter().cloned().collect()
    }
}

impl ObjectStore for FakeStore {
    fn copy_in(&self, local: &Path) -> SkillvaultResult<()> {
        let name = local
            .file_name()
            .ok_or_else(|| SkillvaultError::Io("no file name".into()))?
            .to_string_lossy()
            .into_owned();
        self.names.lock().unwrap().insert(name);
        Ok(())
    }

    fn list_names(&self) -> SkillvaultResult<Vec<String>> {
        Ok(self.names())
    }

    fn delete(&self, name: &str) -> SkillvaultResult<()> {
        self.names.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Core updater with a scripted outcome
#[derive(Debug)]
pub struct FakeUpdater {
    pub version: Mutex<String>,
    pub next_version: String,
    pub fail: bool,
    pub enabled: bool,
}

impl FakeUpdater {
    pub fn succeeding(from: &str, to: &str) -> Self {
        Self {
            version: Mutex::new(from.to_string()),
            next_version: to.to_string(),
            fail: false,
            enabled: true,
        }
    }

    pub fn failing(from: &str) -> Self {
        Self {
            fail: true,
            ..Self::succeeding(from, from)
        }
    }
}

impl CoreUpdater for FakeUpdater {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn current_version(&self) -> SkillvaultResult<String> {
        Ok(self.version.lock().unwrap().clone())
    }

    fn update(&self) -> SkillvaultResult<()> {
        if self.fail {
            return Err(SkillvaultError::Command {
                program: "npm".into(),
                message: "E404 package not found".into(),
            });
        }
        *self.version.lock().unwrap() = self.next_version.clone();
        Ok(())
    }
}

/// Host probe with fixed answers
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub free_bytes: u64,
    pub reachable: bool,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            free_bytes: u64::MAX,
            reachable: true,
        }
    }
}

impl HostProbe for FakeProbe {
    fn free_space(&self, _path: &Path) -> SkillvaultResult<u64> {
        Ok(self.free_bytes)
    }

    fn check_connectivity(&self, host: &str, _timeout: Duration) -> SkillvaultResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(SkillvaultError::Io(format!("{host} unreachable")))
        }
    }
}

/// Records every summary it is asked to deliver
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, summary: &str) -> SkillvaultResult<()> {
        self.messages.lock().unwrap().push(summary.to_string());
        Ok(())
    }
}
