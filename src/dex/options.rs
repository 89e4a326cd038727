//! Options passed through to dx

use crate::cache::key::Revision;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// dx options that affect a pre-dex run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexOptions {
    /// Pass `--force-jumbo`; part of the cache key
    pub jumbo_mode: bool,

    /// Maximum JVM heap for dx, e.g. "2g"
    pub java_max_heap_size: Option<String>,

    /// dx worker threads (`--num-threads`)
    pub thread_count: Option<u32>,

    /// Pass `--verbose`
    pub verbose: bool,
}

/// The build-tools installation used for dexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildToolInfo {
    revision: Revision,
    dx_path: PathBuf,
}

impl BuildToolInfo {
    pub fn new(revision: Revision, dx_path: impl Into<PathBuf>) -> Self {
        Self {
            revision,
            dx_path: dx_path.into(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn dx_path(&self) -> &Path {
        &self.dx_path
    }
}
