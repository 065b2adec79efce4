//! gpg-backed [`Encryptor`]

use std::ffi::OsStr;
use std::path::Path;

use super::process::run;
use super::Encryptor;
use crate::error::{SkillvaultError, SkillvaultResult};

/// Public-key encryption through the `gpg` executable
#[derive(Debug, Clone)]
pub struct GpgCli {
    program: String,
}

impl GpgCli {
    pub fn new() -> Self {
        Self {
            program: "gpg".to_string(),
        }
    }
}

impl Default for GpgCli {
    fn default() -> Self {
        Self::new()
    }
}

impl Encryptor for GpgCli {
    fn encrypt(&self, plain: &Path, cipher: &Path, recipient: &str) -> SkillvaultResult<()> {
        let args: [&OsStr; 10] = [
            OsStr::new("--batch"),
            OsStr::new("--yes"),
            OsStr::new("--trust-model"),
            OsStr::new("always"),
            OsStr::new("--recipient"),
            OsStr::new(recipient),
            OsStr::new("--output"),
            cipher.as_os_str(),
            OsStr::new("--encrypt"),
            plain.as_os_str(),
        ];
        run(&self.program, args, None)
            .map(|_| ())
            .map_err(into_encryption_error)
    }

    fn decrypt(&self, cipher: &Path, plain: &Path) -> SkillvaultResult<()> {
        let args: [&OsStr; 6] = [
            OsStr::new("--batch"),
            OsStr::new("--yes"),
            OsStr::new("--output"),
            plain.as_os_str(),
            OsStr::new("--decrypt"),
            cipher.as_os_str(),
        ];
        run(&self.program, args, None)
            .map(|_| ())
            .map_err(into_encryption_error)
    }
}

fn into_encryption_error(err: SkillvaultError) -> SkillvaultError {
    match err {
        SkillvaultError::Command { message, .. } => SkillvaultError::Encryption(message),
        other => other,
    }
}
