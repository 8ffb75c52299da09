//! Timestamped backups written before any destructive write.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

/// Backup path for `path` at `stamp`, e.g. `config.jsonc.bak.20261018-093000`
pub fn backup_path(path: &Path, stamp: NaiveDateTime) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("backup"));
    name.push(format!(".bak.{}", stamp.format("%Y%m%d-%H%M%S")));
    path.with_file_name(name)
}

/// Write `contents` to a new backup file next to `path`.
///
/// Existing backups are never overwritten; a numeric suffix is appended when
/// the timestamped name is taken.
pub fn write_backup(path: &Path, contents: &str, stamp: NaiveDateTime) -> io::Result<PathBuf> {
    let base = backup_path(path, stamp);
    let mut candidate = base.clone();
    let mut n = 0u32;

    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())?;
                file.sync_all()?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                let mut name = base.clone().into_os_string();
                name.push(format!(".{}", n));
                candidate = PathBuf::from(name);
            }
            Err(e) => return Err(e),
        }
    }
}
