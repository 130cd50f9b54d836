//! Atomic file operations for card files.
//!
//! Writes go to a uniquely named temp file next to the target, are synced
//! to disk and then renamed over the target, so a reader sees either the old
//! content or the new content and never a partial file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::sync::types::{SyncError, SyncResult};

/// Temp file path used while writing `path`.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file in the same directory
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns [`SyncError::Io`] if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let display = path.display().to_string();
    let io_err = |e| SyncError::io(display.clone(), e);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(io_err(e));
    }
    Ok(())
}

/// Read a whole file as UTF-8 text.
///
/// # Errors
///
/// Returns [`SyncError::NotFound`] if the file does not exist and
/// [`SyncError::Io`] for any other failure.
pub fn read_text(path: &Path) -> SyncResult<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::NotFound(format!("file {}", path.display()))
        } else {
            SyncError::io(path.display().to_string(), e)
        }
    })
}
