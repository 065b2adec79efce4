//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't corrupt data on failure.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SkillvaultError;

/// Write JSON to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), SkillvaultError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let mut bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| SkillvaultError::Json(format!("Failed to serialize data: {}", e)))?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)
}

/// Replace a file's contents atomically, keeping its permissions
pub fn write_bytes_atomic<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<(), SkillvaultError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SkillvaultError::from_write(e, format!("Failed to create directory {}", parent.display()))
        })?;
    }

    let permissions = fs::metadata(path).ok().map(|m| m.permissions());
    let temp_path = temp_sibling(path);

    let file = File::create(&temp_path)
        .map_err(|e| SkillvaultError::from_write(e, "Failed to create temp file"))?;

    let mut writer = BufWriter::new(file);
    let written = writer
        .write_all(contents)
        .and_then(|_| writer.flush())
        .and_then(|_| writer.get_ref().sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(SkillvaultError::from_write(e, format!("Failed to write {}", path.display())));
    }

    if let Some(permissions) = permissions {
        let _ = fs::set_permissions(&temp_path, permissions);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        SkillvaultError::from_write(e, "Failed to rename temp file")
    })?;

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
