//! Size-based rotating output sink
//!
//! The active file lives at `<path>`. When the next write would push it past the size
//! limit, `<path>.N` is shifted to `<path>.N+1` (newest is `.1`), the active file becomes
//! `<path>.1` and a fresh active file is opened. Each write is one whole line and is
//! never split across files.

use crate::error::Result;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Limits applied to one rotating file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before a write would exceed this many bytes; 0 disables rotation
    pub max_bytes: u64,
    /// Number of rotated files kept; 0 keeps all of them
    pub max_rotations: u32,
}

impl RotationPolicy {
    pub fn disabled() -> Self {
        RotationPolicy {
            max_bytes: 0,
            max_rotations: 0,
        }
    }
}

struct WriterState {
    file: File,
    written: u64,
}

/// Append-only writer with size-bounded rotation. Writes are serialized internally, so
/// one instance can be shared by the stdout and stderr pumps.
pub struct RotatingWriter {
    path: PathBuf,
    policy: RotationPolicy,
    inner: Mutex<WriterState>,
}

/// Path of the `n`th rotated file for `path`
pub fn rotated_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

impl RotatingWriter {
    /// Open (or create) the active file, continuing from its current size
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(RotatingWriter {
            path,
            policy,
            inner: Mutex::new(WriterState { file, written }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `data` as one unit, rotating first if it would not fit
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let len = data.len() as u64;
        if self.policy.max_bytes > 0 && state.written > 0 && state.written + len > self.policy.max_bytes {
            match self.rotate() {
                Ok(file) => {
                    state.file = file;
                    state.written = 0;
                }
                Err(e) => {
                    // keep appending to the oversized file rather than lose output
                    tracing::warn!("Failed to rotate {}: {}", self.path.display(), e);
                }
            }
        }

        state.file.write_all(data)?;
        state.written += len;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.file.flush()?;
        Ok(())
    }

    /// Shift rotated files up by one and reopen a fresh active file.
    /// Called with the state lock held.
    fn rotate(&self) -> Result<File> {
        let max = self.policy.max_rotations;

        // highest existing index, so unlimited history shifts everything
        let mut top = 0u32;
        while rotated_path(&self.path, top + 1).exists() {
            top += 1;
        }

        if max > 0 {
            for n in (max..=top).rev() {
                fs::remove_file(rotated_path(&self.path, n))?;
            }
            top = top.min(max.saturating_sub(1));
        }

        for n in (1..=top).rev() {
            fs::rename(rotated_path(&self.path, n), rotated_path(&self.path, n + 1))?;
        }
        fs::rename(&self.path, rotated_path(&self.path, 1))?;

        tracing::debug!("Rotated {}", self.path.display());
        open_append(&self.path)
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
