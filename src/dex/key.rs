//! Key for pre-dexed libraries

use crate::cache::key::{Attributes, CacheKey, Key, KeyCodec, Revision};
use std::path::{Path, PathBuf};

/// Store attribute carrying the jumbo-mode flag
pub const ATTR_JUMBO_MODE: &str = "jumboMode";

/// Identity of one pre-dex run: library, build-tools revision, jumbo mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DexKey {
    key: Key,
    jumbo_mode: bool,
}

impl DexKey {
    pub fn new(source_file: impl Into<PathBuf>, revision: Revision, jumbo_mode: bool) -> Self {
        Self {
            key: Key::new(source_file, revision),
            jumbo_mode,
        }
    }

    pub fn jumbo_mode(&self) -> bool {
        self.jumbo_mode
    }

    /// Codec that persists the jumbo flag as the `jumboMode` attribute
    ///
    /// Records written without the attribute read back as non-jumbo; any
    /// value other than `true`/`false` makes the record unusable.
    pub fn codec() -> KeyCodec<DexKey> {
        KeyCodec {
            read: read_key,
            write: write_key,
        }
    }
}

/// Jumbo mode recorded in `attrs`; absent means `false`, junk means `None`
pub fn jumbo_mode_attribute(attrs: &Attributes) -> Option<bool> {
    match attrs.get(ATTR_JUMBO_MODE).map(String::as_str) {
        None | Some("false") => Some(false),
        Some("true") => Some(true),
        Some(_) => None,
    }
}

fn read_key(source: &Path, revision: &Revision, attrs: &Attributes) -> Option<DexKey> {
    let jumbo_mode = jumbo_mode_attribute(attrs)?;
    Some(DexKey::new(source, *revision, jumbo_mode))
}

fn write_key(key: &DexKey, attrs: &mut Attributes) {
    attrs.insert(ATTR_JUMBO_MODE.to_string(), key.jumbo_mode.to_string());
}

impl CacheKey for DexKey {
    fn source_file(&self) -> &Path {
        self.key.source_file()
    }

    fn revision(&self) -> &Revision {
        self.key.revision()
    }
}
