//! Cache entries
//!
//! An [`Item`] lives in memory for the duration of a build: it is either
//! pending (its producer is still running the transformation) or complete.
//! A [`StoredItem`] was read back from the store file and still has to be
//! validated against the live source before it can be reused.

use crate::cache::hash::SourceHash;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};

/// One-shot completion signal
///
/// Counted down once by the producer; any number of threads may wait on it.
/// Counting down a released latch does nothing.
#[derive(Debug, Default)]
pub struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    /// A latch that has not been released yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A latch that never blocks
    pub fn released() -> Self {
        Self {
            released: Mutex::new(true),
            cond: Condvar::new(),
        }
    }

    /// Release all current and future waiters
    pub fn count_down(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        if !*released {
            *released = true;
            self.cond.notify_all();
        }
    }

    /// Block until the latch is released
    pub fn wait(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        while !*released {
            released = self
                .cond
                .wait(released)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Common view over in-memory and stored entries
pub trait CacheEntry {
    /// The library the outputs were produced from
    fn source_file(&self) -> &Path;

    /// Produced files, in production order
    fn output_files(&self) -> Vec<PathBuf>;

    /// Hash recorded when the entry was persisted, if any
    fn source_hash(&self) -> Option<SourceHash>;

    /// True if there is at least one output and every output is a file on disk
    fn are_outputs_present(&self) -> bool {
        outputs_present(&self.output_files())
    }
}

fn outputs_present(outputs: &[PathBuf]) -> bool {
    !outputs.is_empty() && outputs.iter().all(|f| f.is_file())
}

/// Entry produced or promoted during the current process
#[derive(Debug)]
pub struct Item {
    source_file: PathBuf,
    outputs: Mutex<Vec<PathBuf>>,
    latch: Latch,
}

impl Item {
    /// A fresh entry whose producer has yet to run
    pub fn pending(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            outputs: Mutex::new(Vec::new()),
            latch: Latch::new(),
        }
    }

    /// An entry whose outputs are already known; waiting on it never blocks
    pub fn completed(source_file: impl Into<PathBuf>, outputs: Vec<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            outputs: Mutex::new(outputs),
            latch: Latch::released(),
        }
    }

    /// Record the produced files and release waiters
    ///
    /// Only the first completion has any effect.
    pub(crate) fn complete(&self, outputs: Vec<PathBuf>) {
        if self.latch.is_released() {
            return;
        }
        *self.outputs.lock().unwrap_or_else(PoisonError::into_inner) = outputs;
        self.latch.count_down();
    }

    /// Block until the producer has finished, successfully or not
    pub fn wait(&self) {
        self.latch.wait();
    }

    pub fn is_complete(&self) -> bool {
        self.latch.is_released()
    }
}

impl CacheEntry for Item {
    fn source_file(&self) -> &Path {
        &self.source_file
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn source_hash(&self) -> Option<SourceHash> {
        None
    }
}

/// Entry loaded from the store file at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    source_file: PathBuf,
    outputs: Vec<PathBuf>,
    source_hash: SourceHash,
}

impl StoredItem {
    pub fn new(source_file: impl Into<PathBuf>, outputs: Vec<PathBuf>, source_hash: SourceHash) -> Self {
        Self {
            source_file: source_file.into(),
            outputs,
            source_hash,
        }
    }

    /// Turn a validated stored entry into a complete in-memory one
    pub fn promote(&self) -> Item {
        Item::completed(self.source_file.clone(), self.outputs.clone())
    }
}

impl CacheEntry for StoredItem {
    fn source_file(&self) -> &Path {
        &self.source_file
    }

    fn output_files(&self) -> Vec<PathBuf> {
        self.outputs.clone()
    }

    fn source_hash(&self) -> Option<SourceHash> {
        Some(self.source_hash)
    }

    fn are_outputs_present(&self) -> bool {
        outputs_present(&self.outputs)
    }
}
