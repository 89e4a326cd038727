//! Cache engine
//!
//! `PreProcessCache` hands out one reservation per key. The first caller to
//! reserve a key becomes its producer and runs the transformation; later
//! callers get the same [`Item`] and wait on it. Entries persisted by a
//! previous process are promoted only if their outputs still exist and the
//! source library hashes to the recorded value.

use crate::cache::entry::{CacheEntry, Item, StoredItem};
use crate::cache::hash::hash_file;
use crate::cache::key::{Attributes, CacheKey, KeyCodec};
use crate::cache::store::{read_store, write_store, Record};
use crate::error::{PredexError, PredexResult};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Hit and miss totals since the last clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hit(s), {} miss(es)", self.hits, self.misses)
    }
}

/// Outcome of [`PreProcessCache::reserve`]
#[derive(Debug)]
pub enum Reservation {
    /// The caller is the producer for this key
    New(Producer),
    /// Another caller produced (or is producing) this key, or it was
    /// promoted from the store file
    Existing(Arc<Item>),
}

impl Reservation {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }

    pub fn item(&self) -> &Arc<Item> {
        match self {
            Self::New(producer) => &producer.item,
            Self::Existing(item) => item,
        }
    }
}

/// Exclusive right to produce an item
///
/// Dropping a producer without calling [`Producer::finish`] releases all
/// waiters with no outputs, so a failed or panicking transformation never
/// leaves followers blocked.
#[derive(Debug)]
pub struct Producer {
    item: Arc<Item>,
}

impl Producer {
    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Publish the produced files and release waiters
    pub fn finish(self, outputs: Vec<PathBuf>) {
        self.item.complete(outputs);
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.item.complete(Vec::new());
    }
}

struct CacheState<K> {
    loaded: bool,
    items: HashMap<K, Arc<Item>>,
    stored: HashMap<K, StoredItem>,
    hits: u32,
    misses: u32,
}

impl<K> Default for CacheState<K> {
    fn default() -> Self {
        Self {
            loaded: false,
            items: HashMap::new(),
            stored: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

/// Generic pre-processing cache, keyed by a specialization's key type
pub struct PreProcessCache<K: CacheKey> {
    codec: KeyCodec<K>,
    state: Mutex<CacheState<K>>,
}

impl<K: CacheKey> PreProcessCache<K> {
    /// Create an empty cache using `codec` to persist keys
    pub fn new(codec: KeyCodec<K>) -> Self {
        Self {
            codec,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load stored entries from `store`
    ///
    /// Only the first call per cache does anything. An unreadable store is
    /// treated as empty.
    pub fn load(&self, store: &Path) {
        let mut state = self.lock();
        if state.loaded {
            return;
        }

        state.stored = self.read_stored(store);
        state.loaded = true;
    }

    fn read_stored(&self, store: &Path) -> HashMap<K, StoredItem> {
        let records = match read_store(store) {
            Ok(records) => records,
            Err(e) => {
                debug!("Ignoring unreadable pre-dex cache {}: {}", store.display(), e);
                return HashMap::new();
            }
        };

        let mut stored = HashMap::with_capacity(records.len());
        for record in records {
            match (self.codec.read)(&record.source_file, &record.revision, &record.attributes) {
                Some(key) => {
                    stored.insert(key, record.to_stored_item());
                }
                None => {
                    debug!(
                        "Ignoring pre-dex cache {}: unusable item for {}",
                        store.display(),
                        record.source_file.display()
                    );
                    return HashMap::new();
                }
            }
        }

        debug!("Loaded {} pre-dex cache entries from {}", stored.len(), store.display());
        stored
    }

    /// Reserve `key`
    ///
    /// Exactly one caller per key receives [`Reservation::New`]. The map lock
    /// is not held while a stored entry's source is hashed.
    pub fn reserve(&self, key: &K) -> Reservation {
        let stored = {
            let state = self.lock();
            if let Some(item) = state.items.get(key) {
                return Reservation::Existing(Arc::clone(item));
            }
            state.stored.get(key).cloned()
        };

        let had_stored = stored.is_some();
        let promoted = stored
            .filter(|s| Self::is_reusable(key, s))
            .map(|s| Arc::new(s.promote()));

        let mut state = self.lock();
        if let Some(item) = state.items.get(key) {
            return Reservation::Existing(Arc::clone(item));
        }

        if let Some(item) = promoted {
            info!(
                "Cached result for {}: {:?}",
                key.source_file().display(),
                item.output_files()
            );
            state.items.insert(key.clone(), Arc::clone(&item));
            return Reservation::Existing(item);
        }

        if had_stored {
            state.stored.remove(key);
        }

        let item = Arc::new(Item::pending(key.source_file()));
        state.items.insert(key.clone(), Arc::clone(&item));
        Reservation::New(Producer { item })
    }

    fn is_reusable(key: &K, stored: &StoredItem) -> bool {
        if !stored.are_outputs_present() {
            debug!(
                "Stored outputs for {} are gone",
                key.source_file().display()
            );
            return false;
        }

        match hash_file(key.source_file()) {
            Ok(hash) if Some(hash) == stored.source_hash() => true,
            Ok(_) => {
                debug!("{} changed since it was cached", key.source_file().display());
                false
            }
            Err(e) => {
                debug!("Cannot hash {}: {}", key.source_file().display(), e);
                false
            }
        }
    }

    pub fn increment_hits(&self) {
        self.lock().hits += 1;
    }

    pub fn increment_misses(&self) {
        self.lock().misses += 1;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Write every reusable entry to `store`
    pub fn save(&self, store: &Path) -> PredexResult<()> {
        let state = self.lock();
        self.save_locked(&state, store)
    }

    fn save_locked(&self, state: &CacheState<K>, store: &Path) -> PredexResult<()> {
        let records = self.collect_records(state);

        write_store(store, &records).map_err(|e| PredexError::StoreWrite {
            path: store.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!("Saved {} pre-dex cache entries to {}", records.len(), store.display());
        Ok(())
    }

    fn collect_records(&self, state: &CacheState<K>) -> Vec<Record> {
        let live = state
            .items
            .iter()
            .filter_map(|(key, item)| self.record_for(key, &**item));

        // Stored entries are only carried over while their library exists.
        let carried = state
            .stored
            .iter()
            .filter(|(key, _)| !state.items.contains_key(*key))
            .filter(|(_, stored)| stored.source_file().is_file())
            .filter_map(|(key, stored)| self.record_for(key, stored));

        let mut records: Vec<Record> = live.chain(carried).collect();
        records.sort_by(|a, b| {
            a.source_file
                .cmp(&b.source_file)
                .then_with(|| a.revision.to_string().cmp(&b.revision.to_string()))
                .then_with(|| a.attributes.cmp(&b.attributes))
        });
        records
    }

    fn record_for(&self, key: &K, entry: &dyn CacheEntry) -> Option<Record> {
        if !entry.are_outputs_present() {
            return None;
        }

        let sha1 = match entry.source_hash() {
            Some(hash) => hash,
            None => match hash_file(entry.source_file()) {
                Ok(hash) => hash,
                Err(e) => {
                    debug!(
                        "Not persisting {}: {}",
                        entry.source_file().display(),
                        e
                    );
                    return None;
                }
            },
        };

        let mut attributes = Attributes::new();
        (self.codec.write)(key, &mut attributes);

        Some(Record {
            source_file: entry.source_file().to_path_buf(),
            revision: *key.revision(),
            sha1,
            attributes,
            outputs: entry.output_files(),
        })
    }

    /// Persist (if anything was used) and reset the cache
    ///
    /// Returns the totals from before the reset. The cache is reset even if
    /// writing the store fails.
    pub fn clear(&self, store: Option<&Path>) -> PredexResult<CacheStats> {
        let mut state = self.lock();
        let stats = CacheStats {
            hits: state.hits,
            misses: state.misses,
        };

        let mut result = Ok(stats);
        if !state.items.is_empty() {
            if let Some(store) = store {
                result = self.save_locked(&state, store).map(|()| stats);
            }
            info!("PREDEX CACHE HITS:   {}", stats.hits);
            info!("PREDEX CACHE MISSES: {}", stats.misses);
        }

        state.items.clear();
        state.stored.clear();
        state.hits = 0;
        state.misses = 0;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{Key, Revision};
    use crate::cache::store::read_store;
    use std::fs;
    use std::sync::Barrier;
    use std::thread;
    use tempfile::TempDir;

    fn cache() -> PreProcessCache<Key> {
        PreProcessCache::new(Key::codec())
    }

    fn file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn key(source: &Path) -> Key {
        Key::new(source, Revision::new(23, 0, 1))
    }

    fn produce(cache: &PreProcessCache<Key>, key: &Key, outputs: Vec<PathBuf>) {
        match cache.reserve(key) {
            Reservation::New(producer) => producer.finish(outputs),
            Reservation::Existing(_) => panic!("expected a new reservation"),
        }
    }

    #[test]
    fn first_reserve_is_new_then_existing() {
        let cache = cache();
        let k = key(Path::new("/libs/a.jar"));

        let first = cache.reserve(&k);
        assert!(first.is_new());
        let second = cache.reserve(&k);
        assert!(!second.is_new());
        assert!(Arc::ptr_eq(first.item(), second.item()));
    }

    #[test]
    fn concurrent_reserve_has_one_producer() {
        let cache = cache();
        let k = key(Path::new("/libs/a.jar"));
        let barrier = Barrier::new(8);

        let new_count = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.reserve(&k).is_new()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|is_new| *is_new)
                .count()
        });

        assert_eq!(new_count, 1);
    }

    #[test]
    fn followers_observe_producer_outputs() {
        let dir = TempDir::new().unwrap();
        let out = file(&dir, "a.dex", b"dex");
        let cache = cache();
        let k = key(Path::new("/libs/a.jar"));

        let Reservation::New(producer) = cache.reserve(&k) else {
            panic!("expected a new reservation");
        };

        let seen = thread::scope(|s| {
            let followers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let reservation = cache.reserve(&k);
                        assert!(!reservation.is_new());
                        let item = reservation.item();
                        item.wait();
                        (item.are_outputs_present(), item.output_files())
                    })
                })
                .collect();

            producer.finish(vec![out.clone()]);
            followers
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        for (present, outputs) in seen {
            assert!(present);
            assert_eq!(outputs, vec![out.clone()]);
        }
    }

    #[test]
    fn dropped_producer_releases_waiters_without_outputs() {
        let cache = cache();
        let k = key(Path::new("/libs/a.jar"));

        let producer = cache.reserve(&k);
        let follower = cache.reserve(&k);
        drop(producer);

        follower.item().wait();
        assert!(!follower.item().are_outputs_present());
    }

    #[test]
    fn persisted_entries_are_hits_in_new_cache() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("cache").join("predex.xml");
        let jar1 = file(&dir, "a.jar", b"a classes");
        let jar2 = file(&dir, "b.jar", b"b classes");
        let f1 = file(&dir, "a1.dex", b"1");
        let f2 = file(&dir, "a2.dex", b"2");
        let f3 = file(&dir, "b.dex", b"3");

        let first = cache();
        first.load(&store);
        produce(&first, &key(&jar1), vec![f1.clone(), f2.clone()]);
        produce(&first, &key(&jar2), vec![f3.clone()]);
        first.increment_misses();
        first.increment_misses();
        let stats = first.clear(Some(&store)).unwrap();
        assert_eq!(stats, CacheStats { hits: 0, misses: 2 });

        let second = cache();
        second.load(&store);
        for (jar, expected) in [(&jar1, vec![f1, f2]), (&jar2, vec![f3])] {
            let reservation = second.reserve(&key(jar));
            assert!(!reservation.is_new());
            assert!(reservation.item().is_complete());
            assert_eq!(reservation.item().output_files(), expected);
            second.increment_hits();
        }
        assert_eq!(second.stats().hits, 2);
    }

    #[test]
    fn changed_source_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"v1");
        let out = file(&dir, "a.dex", b"dex");

        let first = cache();
        produce(&first, &key(&jar), vec![out]);
        first.clear(Some(&store)).unwrap();

        fs::write(&jar, b"v2").unwrap();

        let second = cache();
        second.load(&store);
        assert!(second.reserve(&key(&jar)).is_new());
        assert!(second.lock().stored.is_empty());
    }

    #[test]
    fn deleted_output_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"v1");
        let out = file(&dir, "a.dex", b"dex");

        let first = cache();
        produce(&first, &key(&jar), vec![out.clone()]);
        first.clear(Some(&store)).unwrap();
        fs::remove_file(&out).unwrap();

        let second = cache();
        second.load(&store);
        assert!(second.reserve(&key(&jar)).is_new());
    }

    #[test]
    fn other_revision_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"v1");
        let out = file(&dir, "a.dex", b"dex");

        let first = cache();
        produce(&first, &key(&jar), vec![out]);
        first.clear(Some(&store)).unwrap();

        let second = cache();
        second.load(&store);
        assert!(second
            .reserve(&Key::new(&jar, Revision::new(24, 0, 0)))
            .is_new());
    }

    #[test]
    fn version_mismatch_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"v1");
        let out = file(&dir, "a.dex", b"dex");

        let first = cache();
        produce(&first, &key(&jar), vec![out]);
        first.clear(Some(&store)).unwrap();

        let text = fs::read_to_string(&store)
            .unwrap()
            .replace("version=\"2\"", "version=\"3\"");
        fs::write(&store, text).unwrap();

        let second = cache();
        second.load(&store);
        assert!(second.lock().stored.is_empty());
        assert!(second.reserve(&key(&jar)).is_new());
    }

    #[test]
    fn corrupt_store_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = file(&dir, "predex.xml", b"<items version=\"2\"><item jar=");

        let cache = cache();
        cache.load(&store);
        assert!(cache.lock().stored.is_empty());
    }

    #[test]
    fn load_happens_once() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"v1");
        let out = file(&dir, "a.dex", b"dex");

        let first = cache();
        produce(&first, &key(&jar), vec![out]);
        first.clear(Some(&store)).unwrap();

        let second = cache();
        second.load(&dir.path().join("missing.xml"));
        second.load(&store);
        assert!(second.lock().stored.is_empty());
    }

    #[test]
    fn save_drops_entries_whose_source_is_gone() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let kept = file(&dir, "a.jar", b"a");
        let gone = file(&dir, "b.jar", b"b");
        let out_a = file(&dir, "a.dex", b"1");
        let out_b = file(&dir, "b.dex", b"2");

        let first = cache();
        produce(&first, &key(&kept), vec![out_a]);
        produce(&first, &key(&gone), vec![out_b]);
        first.clear(Some(&store)).unwrap();

        fs::remove_file(&gone).unwrap();

        let second = cache();
        second.load(&store);
        second.save(&store).unwrap();

        let records = read_store(&store).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_file, kept);
    }

    #[test]
    fn save_skips_items_without_outputs() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");
        let jar = file(&dir, "a.jar", b"a");

        let cache = cache();
        drop(cache.reserve(&key(&jar)));
        cache.save(&store).unwrap();

        assert!(read_store(&store).unwrap().is_empty());
    }

    #[test]
    fn clear_resets_without_load() {
        let cache = cache();
        cache.increment_hits();
        assert_eq!(cache.clear(None).unwrap(), CacheStats { hits: 1, misses: 0 });
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn clear_does_not_write_when_unused() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("predex.xml");

        cache().clear(Some(&store)).unwrap();
        assert!(!store.exists());
    }
}
