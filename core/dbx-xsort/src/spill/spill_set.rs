//! SpillSet — file-system spill area of one sort operator.
//!
//! Files are laid out as `<dir>/<operator_id>/spill<N>[_<extra>]`, with `<dir>`
//! chosen round-robin from [`SpillConfig::directories`]. Without configured
//! directories a private temp directory is used and removed on drop.

use super::channel::{FileSpillSink, FileSpillSource, SpillChannel, SpillSink, SpillSource};
use super::config::SpillConfig;
use crate::error::{DbxResult, FirstError};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tempfile::TempDir;

pub struct SpillSet {
    config: SpillConfig,
    /// `<dir>/<operator_id>` for every spill directory
    roots: Vec<PathBuf>,
    /// Operator directories created so far (removed by `cleanup`)
    created: Mutex<Vec<PathBuf>>,
    next_root: AtomicUsize,
    file_counter: AtomicU64,
    write_bytes: AtomicU64,
    read_bytes: AtomicU64,
    // Dropped last: the operator directories live inside it.
    _temp_dir: Option<TempDir>,
}

impl SpillSet {
    pub fn new(config: SpillConfig) -> DbxResult<Self> {
        config.validate()?;

        let (temp_dir, dirs) = if config.directories.is_empty() {
            let temp = tempfile::Builder::new().prefix("dbx-spill-").tempdir()?;
            let dirs = vec![temp.path().to_path_buf()];
            (Some(temp), dirs)
        } else {
            (None, config.directories.clone())
        };
        let roots = dirs.iter().map(|d| d.join(&config.operator_id)).collect();

        Ok(Self {
            config,
            roots,
            created: Mutex::new(Vec::new()),
            next_root: AtomicUsize::new(0),
            file_counter: AtomicU64::new(0),
            write_bytes: AtomicU64::new(0),
            read_bytes: AtomicU64::new(0),
            _temp_dir: temp_dir,
        })
    }

    /// Spill area in a private temp directory with default settings.
    pub fn temporary() -> DbxResult<Self> {
        Self::new(SpillConfig::default())
    }

    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    /// Names a fresh spill file, creating its operator directory if needed.
    pub fn next_spill_file(&self, extra: Option<&str>) -> DbxResult<PathBuf> {
        let slot = self.next_root.fetch_add(1, Ordering::Relaxed) % self.roots.len();
        let root = &self.roots[slot];
        self.ensure_dir(root)?;

        let n = self.file_counter.fetch_add(1, Ordering::Relaxed);
        let name = match extra {
            Some(extra) => format!("spill{n}_{extra}"),
            None => format!("spill{n}"),
        };
        Ok(root.join(name))
    }

    fn ensure_dir(&self, root: &Path) -> DbxResult<()> {
        let mut created = self.created.lock();
        if !created.iter().any(|d| d == root) {
            fs::create_dir_all(root)?;
            created.push(root.to_path_buf());
        }
        Ok(())
    }

    /// Total bytes written by all closed output streams.
    pub fn write_bytes(&self) -> u64 {
        self.write_bytes.load(Ordering::Relaxed)
    }

    /// Total bytes read by all closed input streams.
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    /// Removes every operator directory created so far.
    pub fn cleanup(&self) -> DbxResult<()> {
        let dirs = std::mem::take(&mut *self.created.lock());
        let mut errors = FirstError::new();
        for dir in dirs {
            let result = match fs::remove_dir_all(&dir) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
            errors.record("remove_spill_dir", result);
        }
        errors.into_result()
    }
}

impl SpillChannel for SpillSet {
    fn open_for_output(&self, path: &Path) -> DbxResult<Box<dyn SpillSink>> {
        let file = File::create(path)?;
        tracing::trace!(target: "spill", path = %path.display(), "opened spill file for output");
        Ok(Box::new(FileSpillSink::new(file, self.config.buffer_size)))
    }

    fn open_for_input(&self, path: &Path) -> DbxResult<Box<dyn SpillSource>> {
        let file = File::open(path)?;
        tracing::trace!(target: "spill", path = %path.display(), "opened spill file for input");
        Ok(Box::new(FileSpillSource::new(file, self.config.buffer_size)))
    }

    fn delete(&self, path: &Path) -> DbxResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(target: "spill", path = %path.display(), "spill file already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn tally_write_bytes(&self, bytes: u64) {
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn tally_read_bytes(&self, bytes: u64) {
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl Drop for SpillSet {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(target: "spill", error = %e, "failed to remove spill directories");
        }
    }
}
