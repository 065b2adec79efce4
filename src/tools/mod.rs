//! External collaborators
//!
//! Every external program skillvault drives (git, gpg, rclone, the managed
//! application's own updater) sits behind a small trait. Components take the
//! traits, the binary wires in the process-backed implementations below, and
//! tests substitute in-memory fakes.

pub mod confirm;
pub mod core;
pub mod git;
pub mod gpg;
pub mod host;
pub mod process;
pub mod rclone;

#[cfg(test)]
pub mod fakes;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::SkillvaultResult;

pub use confirm::{AssumeAnswer, Confirm, StdinConfirm};
pub use self::core::{CommandNotifier, CommandUpdater, NoopNotifier};
pub use git::GitCli;
pub use gpg::GpgCli;
pub use host::SystemProbe;
pub use rclone::RcloneStore;

/// Version-control operations on a module working tree
pub trait VersionControl {
    /// Whether tracked files have uncommitted modifications
    fn is_dirty(&self, repo: &Path) -> SkillvaultResult<bool>;

    /// Identifier of the checked-out revision
    fn current_revision(&self, repo: &Path) -> SkillvaultResult<String>;

    /// Fetch and fast-forward to the upstream revision
    fn pull_fast_forward(&self, repo: &Path) -> SkillvaultResult<()>;

    /// Discard everything and check out `revision`
    fn reset_hard(&self, repo: &Path, revision: &str) -> SkillvaultResult<()>;
}

/// Single-recipient file encryption
pub trait Encryptor {
    fn encrypt(&self, plain: &Path, cipher: &Path, recipient: &str) -> SkillvaultResult<()>;

    fn decrypt(&self, cipher: &Path, plain: &Path) -> SkillvaultResult<()>;
}

/// Remote storage for archive copies
pub trait ObjectStore {
    fn copy_in(&self, local: &Path) -> SkillvaultResult<()>;

    fn list_names(&self) -> SkillvaultResult<Vec<String>>;

    fn delete(&self, name: &str) -> SkillvaultResult<()>;
}

/// Updates the managed application itself
pub trait CoreUpdater {
    /// Whether an update command is configured at all
    fn is_enabled(&self) -> bool {
        true
    }

    fn current_version(&self) -> SkillvaultResult<String>;

    fn update(&self) -> SkillvaultResult<()>;
}

/// Delivers a run summary somewhere a human will see it
pub trait Notifier {
    fn notify(&self, summary: &str) -> SkillvaultResult<()>;
}

/// Host checks performed before an update run
pub trait HostProbe {
    /// Bytes available to unprivileged users on the volume holding `path`
    fn free_space(&self, path: &Path) -> SkillvaultResult<u64>;

    fn check_connectivity(&self, host: &str, timeout: Duration) -> SkillvaultResult<()>;
}

/// The full set of collaborators a command needs
#[derive(Clone)]
pub struct Toolbox {
    pub vcs: Arc<dyn VersionControl>,
    pub encryptor: Arc<dyn Encryptor>,
    /// Present when remote sync is enabled
    pub store: Option<Arc<dyn ObjectStore>>,
    pub core: Arc<dyn CoreUpdater>,
    pub probe: Arc<dyn HostProbe>,
    pub notifier: Arc<dyn Notifier>,
    pub confirm: Arc<dyn Confirm>,
}

impl Toolbox {
    /// Process-backed collaborators configured from `settings`
    pub fn system(settings: &Settings, confirm: Arc<dyn Confirm>) -> Self {
        let store: Option<Arc<dyn ObjectStore>> = match (&settings.remote.target, settings.remote.enabled) {
            (Some(target), true) => Some(Arc::new(RcloneStore::new(target.clone()))),
            _ => None,
        };
        let notifier: Arc<dyn Notifier> = match &settings.update.notify_command {
            Some(command) if !command.is_empty() => Arc::new(CommandNotifier::new(command.clone())),
            _ => Arc::new(NoopNotifier),
        };

        Self {
            vcs: Arc::new(GitCli::new()),
            encryptor: Arc::new(GpgCli::new()),
            store,
            core: Arc::new(CommandUpdater::new(
                settings.update.core_update_command.clone(),
                settings.update.version_command.clone(),
            )),
            probe: Arc::new(SystemProbe::new()),
            notifier,
            confirm,
        }
    }
}
