//! Crash-safe document persistence.
//!
//! Writes go to a temp file in the destination directory and are renamed into
//! place, so a reader never observes a half-written document. Where rename
//! over an existing file fails (Windows), the previous file is moved aside to
//! `.bak` first and restored if the second rename also fails.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// `fsync` the temp file before renaming it into place.
    pub sync: bool,
    /// Keep the permission bits of the file being replaced.
    pub preserve_permissions: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync: true,
            preserve_permissions: true,
        }
    }
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with_options(path, bytes, WriteOptions::default())
}

/// Restore `path` from `path.bak` left behind by an interrupted write.
pub fn recover_bak_file(path: &Path) {
    let backup = path.with_extension("bak");
    if !path.exists() && backup.exists() {
        match fs::rename(&backup, path) {
            Ok(()) => {
                tracing::warn!(
                    path = %path.display(),
                    "Recovered .bak file from interrupted save"
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to recover .bak file: {e}");
            }
        }
    }
}

pub fn atomic_write_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: WriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let previous_permissions: Option<Permissions> = if options.preserve_permissions {
        fs::metadata(path).ok().map(|m| m.permissions())
    } else {
        None
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if options.sync {
        tmp.as_file().sync_all()?;
    }
    if let Some(perms) = previous_permissions {
        fs::set_permissions(tmp.path(), perms)?;
    }

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup_path = path.with_extension("bak");
        let _ = fs::remove_file(&backup_path);
        fs::rename(path, &backup_path)?;

        if let Err(rename_err) = err.file.persist(path) {
            let _ = fs::rename(&backup_path, path);
            return Err(rename_err.error);
        }
        if let Err(e) = fs::remove_file(&backup_path) {
            tracing::warn!(
                path = %backup_path.display(),
                "Failed to remove .bak after save: {e}"
            );
        }
    }

    if options.sync {
        sync_parent_dir(parent);
    }
    Ok(())
}

fn sync_parent_dir(parent: &Path) {
    #[cfg(unix)]
    if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
        tracing::debug!(path = %parent.display(), "Parent directory sync failed (best-effort): {e}");
    }
    #[cfg(not(unix))]
    let _ = parent;
}
