//! Run lock
//!
//! Two concurrent runs against the same host would race on the identity
//! database and on deployment directories. `apply` holds a [`RunLock`] for
//! its whole duration. The lock is an OS advisory lock on the lock file, so
//! it goes away with the holding process even when that process is killed;
//! a file left behind by a dead run does not block the next one.

use anyhow::{Context, Result, bail};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default lock file location
pub fn default_path() -> PathBuf {
    std::env::temp_dir().join("fcrepo-provision.lock")
}

/// Exclusive lock held for the duration of a run
#[derive(Debug)]
pub struct RunLock {
    /// The lock is released when this handle closes
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock the file, failing if another live run already holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to create lock file {}", path.display()))?;

        let locked = file
            .try_lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        if !locked {
            let holder = std::fs::read_to_string(path).unwrap_or_default();
            bail!(
                "Another run holds {} (pid {})",
                path.display(),
                holder.trim()
            );
        }

        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .with_context(|| format!("Failed to write lock file {}", path.display()))?;
        log::debug!("Acquired run lock {}", path.display());

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        log::debug!("Released run lock {}", self.path.display());
    }
}
