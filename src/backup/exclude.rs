//! Exclusion filters for archives and mirror syncs

use std::ffi::OsStr;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{SkillvaultError, SkillvaultResult};

/// Glob patterns matched against individual path component names
///
/// `node_modules` excludes every directory of that name at any depth and
/// everything beneath it; `*.pyc` excludes matching files anywhere.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> SkillvaultResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(pattern).map_err(|e| {
                SkillvaultError::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let set = builder
            .build()
            .map_err(|e| SkillvaultError::Config(format!("invalid exclude patterns: {}", e)))?;
        Ok(Self {
            patterns: kept,
            set,
        })
    }

    /// Whether a single file or directory name is excluded
    pub fn matches_name(&self, name: &OsStr) -> bool {
        !self.patterns.is_empty() && self.set.is_match(Path::new(name))
    }
}
