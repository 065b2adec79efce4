//! Directory synchronisation used when applying a restore

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use super::exclude::ExcludeSet;
use crate::error::{SkillvaultError, SkillvaultResult};

/// How a restored tree is applied over its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Target ends up identical to the source; excluded entries are left alone
    Mirror,
    /// Copy over the target, deleting nothing
    Additive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub copied: usize,
    pub removed: usize,
}

/// Copy `src` over `dst` according to `mode`
///
/// Entries whose name matches `exclude` are neither copied from `src` nor
/// removed from `dst`.
pub fn sync_tree(
    src: &Path,
    dst: &Path,
    mode: SyncMode,
    exclude: &ExcludeSet,
) -> SkillvaultResult<SyncStats> {
    let mut stats = SyncStats::default();
    fs::create_dir_all(dst).map_err(|e| SkillvaultError::from_write(e, dst.display()))?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !exclude.matches_name(e.file_name()));

    for entry in walker {
        let entry = entry?;
        let relative = relative_to(src, entry.path())?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if is_non_dir(&target) {
                remove_entry(&target)?;
            }
            fs::create_dir_all(&target)
                .map_err(|e| SkillvaultError::from_write(e, target.display()))?;
        } else if file_type.is_file() {
            if target.symlink_metadata().is_ok() && (target.is_dir() || is_symlink(&target)) {
                remove_entry(&target)?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|e| SkillvaultError::from_write(e, target.display()))?;
            stats.copied += 1;
        } else if file_type.is_symlink() {
            if target.symlink_metadata().is_ok() {
                remove_entry(&target)?;
            }
            copy_symlink(entry.path(), &target)?;
            stats.copied += 1;
        }
    }

    if mode == SyncMode::Mirror {
        stats.removed = remove_extraneous(src, dst, exclude)?;
    }

    Ok(stats)
}

/// Delete everything under `dst` with no counterpart under `src`
fn remove_extraneous(src: &Path, dst: &Path, exclude: &ExcludeSet) -> SkillvaultResult<usize> {
    let mut removed = 0;
    let mut walker = WalkDir::new(dst)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !exclude.matches_name(e.file_name()));

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let relative = relative_to(dst, entry.path())?;
        if src.join(relative).symlink_metadata().is_ok() {
            continue;
        }

        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())
                .map_err(|e| SkillvaultError::from_write(e, entry.path().display()))?;
            walker.skip_current_dir();
        } else {
            fs::remove_file(entry.path())
                .map_err(|e| SkillvaultError::from_write(e, entry.path().display()))?;
        }
        removed += 1;
    }
    Ok(removed)
}

fn relative_to<'a>(base: &Path, path: &'a Path) -> SkillvaultResult<&'a Path> {
    path.strip_prefix(base)
        .map_err(|_| SkillvaultError::Io(format!("{} escapes {}", path.display(), base.display())))
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn is_non_dir(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| !m.file_type().is_dir())
        .unwrap_or(false)
}

fn remove_entry(path: &Path) -> SkillvaultResult<()> {
    let result = match path.symlink_metadata() {
        Ok(m) if m.file_type().is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| SkillvaultError::from_write(e, path.display()))
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> SkillvaultResult<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(&link, dst).map_err(|e| SkillvaultError::from_write(e, dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> SkillvaultResult<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| SkillvaultError::from_write(e, dst.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                let body = if e.file_type().is_file() {
                    fs::read_to_string(e.path()).unwrap()
                } else {
                    String::from("<dir>")
                };
                (rel, body)
            })
            .collect()
    }

    fn excludes() -> ExcludeSet {
        ExcludeSet::new(["node_modules"]).unwrap()
    }

    #[test]
    fn test_mirror_makes_exact_copy() {
        let temp = TempDir::new().unwrap();
        let (src, dst) = (temp.path().join("src"), temp.path().join("dst"));
        write(&src, "a/one.txt", "1");
        write(&src, "two.txt", "2");
        write(&dst, "two.txt", "old");
        write(&dst, "stale/three.txt", "3");
        write(&dst, "stale.txt", "x");

        let stats = sync_tree(&src, &dst, SyncMode::Mirror, &excludes()).unwrap();
        assert_eq!(stats.copied, 2);
        assert_eq!(stats.removed, 2);
        assert_eq!(snapshot(&src), snapshot(&dst));
    }

    #[test]
    fn test_mirror_protects_excluded_entries() {
        let temp = TempDir::new().unwrap();
        let (src, dst) = (temp.path().join("src"), temp.path().join("dst"));
        write(&src, "mod/index.js", "new");
        write(&src, "mod/node_modules/dep/a.js", "from archive");
        write(&dst, "mod/node_modules/dep/a.js", "installed");

        sync_tree(&src, &dst, SyncMode::Mirror, &excludes()).unwrap();
        assert_eq!(
            fs::read_to_string(dst.join("mod/node_modules/dep/a.js")).unwrap(),
            "installed"
        );
        assert_eq!(fs::read_to_string(dst.join("mod/index.js")).unwrap(), "new");
    }

    #[test]
    fn test_additive_keeps_existing_files() {
        let temp = TempDir::new().unwrap();
        let (src, dst) = (temp.path().join("src"), temp.path().join("dst"));
        write(&src, "agent.json", "{}");
        write(&dst, "agent.json", "{\"old\": true}");
        write(&dst, "keep.txt", "mine");

        let stats = sync_tree(&src, &dst, SyncMode::Additive, &excludes()).unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(fs::read_to_string(dst.join("agent.json")).unwrap(), "{}");
        assert_eq!(fs::read_to_string(dst.join("keep.txt")).unwrap(), "mine");
    }

    #[test]
    fn test_type_changes_are_replaced() {
        let temp = TempDir::new().unwrap();
        let (src, dst) = (temp.path().join("src"), temp.path().join("dst"));
        write(&src, "thing/inner.txt", "now a dir");
        write(&src, "other", "now a file");
        write(&dst, "thing", "was a file");
        write(&dst, "other/inner.txt", "was a dir");

        sync_tree(&src, &dst, SyncMode::Mirror, &excludes()).unwrap();
        assert_eq!(snapshot(&src), snapshot(&dst));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_copied_as_links() {
        let temp = TempDir::new().unwrap();
        let (src, dst) = (temp.path().join("src"), temp.path().join("dst"));
        write(&src, "real.txt", "data");
        std::os::unix::fs::symlink("real.txt", src.join("alias")).unwrap();

        sync_tree(&src, &dst, SyncMode::Mirror, &excludes()).unwrap();
        assert_eq!(fs::read_link(dst.join("alias")).unwrap(), PathBuf::from("real.txt"));
    }
}
