//! Crash-safe policy file writes.
//!
//! New content goes to a temp file in the target's directory, is fsynced, and
//! is renamed over the target. Readers see either the old file or the new
//! one, never a partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::error::Result;

const TEMP_PREFIX: &str = ".rulegate.";

/// Back up the current file (best effort), then atomically replace it.
pub fn write_with_backup(path: &Path, bytes: &[u8]) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path, Local::now());
        match fs::copy(path, &backup) {
            Ok(_) => info!(path = %path.display(), backup = %backup.display(), "backed up policy file"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to back up policy file, writing anyway"),
        }
    }
    write_atomic(path, |file| file.write_all(bytes))
}

/// `<path>.<YYYYmmdd-HHMMSS>.bak`
pub fn backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.bak", name, at.format("%Y%m%d-%H%M%S")))
}

/// Stage content through `write` into a same-directory temp file, fsync it,
/// then rename it over `path`. On any failure the temp file is removed and
/// `path` is untouched.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))?;

    // Dropping `tmp` on the error paths deletes the temp file.
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create an empty policy file (and its directory) if it does not exist.
/// Returns `true` when the file was created.
pub fn ensure_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::create_dir_all(parent_dir(path))?;
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            info!(path = %path.display(), "created empty policy file");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn writes_new_file_without_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.conf");

        write_with_backup(&path, b"ALLOW prefix=/\n").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"ALLOW prefix=/\n");
        assert_eq!(entries(dir.path()), vec!["cache.conf"]);
    }

    #[test]
    fn replaces_existing_file_and_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bypass.conf");
        fs::write(&path, "/old\n").unwrap();

        write_with_backup(&path, b"/new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "/new\n");
        let backups: Vec<String> = entries(dir.path())
            .into_iter()
            .filter(|n| n.starts_with("bypass.conf.") && n.ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
        let backup = fs::read_to_string(dir.path().join(&backups[0])).unwrap();
        assert_eq!(backup, "/old\n");
    }

    #[test]
    fn failed_write_leaves_target_and_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.conf");
        fs::write(&path, "ALLOW prefix=/\n").unwrap();

        let result = write_atomic(&path, |file| {
            file.write_all(b"DENY pre")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "ALLOW prefix=/\n");
        assert_eq!(entries(dir.path()), vec!["cache.conf"]);
    }

    #[test]
    fn backup_name_carries_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let backup = backup_path(Path::new("/etc/rulegate/cache.conf"), at);
        assert_eq!(backup, PathBuf::from("/etc/rulegate/cache.conf.20240309-140507.bak"));
    }

    #[test]
    fn ensure_file_creates_missing_file_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.conf");

        assert!(ensure_file(&path).unwrap());
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap(), b"");

        fs::write(&path, "ALLOW prefix=/\n").unwrap();
        assert!(!ensure_file(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "ALLOW prefix=/\n");
    }
}
