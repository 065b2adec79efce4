//! git-backed [`VersionControl`]

use std::path::Path;

use super::process::run;
use super::VersionControl;
use crate::error::{SkillvaultError, SkillvaultResult};

/// Drives the `git` executable
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }
}

impl VersionControl for GitCli {
    fn is_dirty(&self, repo: &Path) -> SkillvaultResult<bool> {
        // Untracked files survive both pull and reset, so only tracked changes count.
        let out = run(
            "git",
            ["status", "--porcelain", "--untracked-files=no"],
            Some(repo),
        )?;
        Ok(porcelain_is_dirty(&out.stdout))
    }

    fn current_revision(&self, repo: &Path) -> SkillvaultResult<String> {
        let out = run("git", ["rev-parse", "HEAD"], Some(repo))?;
        let rev = out.stdout.trim();
        if rev.is_empty() {
            return Err(SkillvaultError::Format(format!(
                "git returned no revision for {}",
                repo.display()
            )));
        }
        Ok(rev.to_string())
    }

    fn pull_fast_forward(&self, repo: &Path) -> SkillvaultResult<()> {
        run("git", ["pull", "--ff-only", "--quiet"], Some(repo)).map(|_| ())
    }

    fn reset_hard(&self, repo: &Path, revision: &str) -> SkillvaultResult<()> {
        run("git", ["reset", "--hard", "--quiet", revision], Some(repo)).map(|_| ())
    }
}

fn porcelain_is_dirty(status: &str) -> bool {
    status.lines().any(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_porcelain_parsing() {
        assert!(!porcelain_is_dirty(""));
        assert!(!porcelain_is_dirty("\n"));
        assert!(porcelain_is_dirty(" M SKILL.md\n"));
        assert!(porcelain_is_dirty("A  new.txt\nD  old.txt\n"));
    }
}
