//! Pre-dex cache
//!
//! Wires [`PreProcessCache`] to dexing: the producer for a key runs dx and
//! records its outputs, every other caller copies those outputs into its
//! own output location.

use crate::cache::engine::{CacheStats, PreProcessCache, Producer, Reservation};
use crate::cache::entry::{CacheEntry, Item};
use crate::dex::key::DexKey;
use crate::dex::options::{BuildToolInfo, DexOptions};
use crate::dex::process::DexTransform;
use crate::error::{PredexError, PredexResult};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Cache of pre-dexed libraries shared by all dex tasks of one build
pub struct PreDexCache {
    cache: PreProcessCache<DexKey>,
}

impl PreDexCache {
    pub fn new() -> Self {
        Self {
            cache: PreProcessCache::new(DexKey::codec()),
        }
    }

    /// Load results persisted by an earlier build; only the first call counts
    pub fn load(&self, store: &Path) {
        self.cache.load(store);
    }

    /// Persist to `store` and reset, returning this build's totals
    pub fn clear(&self, store: Option<&Path>) -> PredexResult<CacheStats> {
        self.cache.clear(store)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Dex `input` into `out`, reusing an earlier result when possible
    ///
    /// In multi-dex mode `out` must be an existing directory and every cached
    /// dex file is copied into it under its own name. Otherwise the single
    /// cached file is copied to `out`.
    ///
    /// # Panics
    ///
    /// Panics if `multi_dex` is set and `out` is not a directory.
    pub fn pre_dex_library(
        &self,
        input: &Path,
        out: &Path,
        multi_dex: bool,
        options: &DexOptions,
        tools: &BuildToolInfo,
        dexer: &dyn DexTransform,
    ) -> PredexResult<()> {
        assert!(
            !multi_dex || out.is_dir(),
            "multi-dex output {} must be an existing directory",
            out.display()
        );

        if !dexer.has_classes(input)? {
            debug!("{} has no classes, nothing to pre-dex", input.display());
            return Ok(());
        }

        let key = DexKey::new(input, tools.revision(), options.jumbo_mode);

        match self.cache.reserve(&key) {
            Reservation::New(producer) => {
                self.produce(producer, input, out, multi_dex, options, dexer)
            }
            Reservation::Existing(item) => self.reuse(&item, input, out, multi_dex),
        }
    }

    fn produce(
        &self,
        producer: Producer,
        input: &Path,
        out: &Path,
        multi_dex: bool,
        options: &DexOptions,
        dexer: &dyn DexTransform,
    ) -> PredexResult<()> {
        // Every dex file in the directory is recorded as output, so leftovers
        // from an earlier run must not survive.
        if multi_dex {
            clear_output(out, true);
        }

        match dexer.transform(input, out, multi_dex, options) {
            Ok(files) => {
                debug!("Pre-dexed {} into {:?}", input.display(), files);
                producer.finish(files);
                self.cache.increment_misses();
                Ok(())
            }
            Err(e) => {
                // Partial output must go before waiters are released.
                clear_output(out, multi_dex);
                drop(producer);
                Err(e)
            }
        }
    }

    fn reuse(&self, item: &Item, input: &Path, out: &Path, multi_dex: bool) -> PredexResult<()> {
        item.wait();

        if !item.are_outputs_present() {
            return Err(PredexError::MissingCachedOutput {
                input: input.to_path_buf(),
            });
        }

        let outputs = item.output_files();
        if multi_dex {
            for source in &outputs {
                let Some(name) = source.file_name() else {
                    return Err(PredexError::Internal(format!(
                        "cached dex output {} has no file name",
                        source.display()
                    )));
                };
                copy_output(source, &out.join(name))?;
            }
        } else {
            let Some(source) = outputs.first() else {
                return Err(PredexError::MissingCachedOutput {
                    input: input.to_path_buf(),
                });
            };
            copy_output(source, out)?;
        }

        self.cache.increment_hits();
        Ok(())
    }
}

impl Default for PreDexCache {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_output(source: &Path, dest: &Path) -> PredexResult<()> {
    if source == dest || same_file(source, dest) {
        debug!("Pre-dexed output {} is already in place", dest.display());
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PredexError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::copy(source, dest).map_err(|e| {
        PredexError::io(
            format!("copying {} to {}", source.display(), dest.display()),
            e,
        )
    })?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Remove `out`, or in multi-dex mode everything inside it
fn clear_output(out: &Path, multi_dex: bool) {
    let result = if multi_dex {
        fs::read_dir(out).and_then(|entries| {
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    } else if out.is_dir() {
        fs::remove_dir_all(out)
    } else if out.exists() {
        fs::remove_file(out)
    } else {
        Ok(())
    };

    if let Err(e) = result {
        warn!("Failed to remove dex output {}: {}", out.display(), e);
    }
}
