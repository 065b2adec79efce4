//! rclone-backed [`ObjectStore`]

use std::ffi::OsStr;
use std::path::Path;

use super::process::run;
use super::ObjectStore;
use crate::error::SkillvaultResult;

/// A remote directory addressed the way rclone does (`remote:bucket/path`)
#[derive(Debug, Clone)]
pub struct RcloneStore {
    target: String,
}

impl RcloneStore {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn object_path(&self, name: &str) -> String {
        format!("{}/{}", self.target.trim_end_matches('/'), name)
    }
}

impl ObjectStore for RcloneStore {
    fn copy_in(&self, local: &Path) -> SkillvaultResult<()> {
        let args: [&OsStr; 3] = [
            OsStr::new("copy"),
            local.as_os_str(),
            OsStr::new(&self.target),
        ];
        run("rclone", args, None).map(|_| ())
    }

    fn list_names(&self) -> SkillvaultResult<Vec<String>> {
        let out = run("rclone", ["lsf", "--files-only", self.target.as_str()], None)?;
        Ok(parse_lsf(&out.stdout))
    }

    fn delete(&self, name: &str) -> SkillvaultResult<()> {
        run("rclone", ["deletefile".to_string(), self.object_path(name)], None).map(|_| ())
    }
}

fn parse_lsf(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.ends_with('/'))
        .map(str::to_string)
        .collect()
}
