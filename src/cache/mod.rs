//! Generic pre-processing cache
//!
//! A pre-processing step turns one source library into one or more output
//! files. The cache makes sure each distinct key is processed at most once
//! per process, and carries results over between processes through an XML
//! store file validated by the source's SHA-1.
//!
//! # Entry lifecycle
//!
//! | State | Where | Description |
//! |-------|-------|-------------|
//! | Stored | store file | Loaded at startup, not yet checked |
//! | Pending | memory | A producer is running, followers wait |
//! | Complete | memory | Outputs recorded (possibly none after a failure) |

pub mod engine;
pub mod entry;
pub mod hash;
pub mod key;
pub mod store;

pub use engine::{CacheStats, PreProcessCache, Producer, Reservation};
pub use entry::{CacheEntry, Item, Latch, StoredItem};
pub use hash::{hash_file, SourceHash};
pub use key::{Attributes, CacheKey, Key, KeyCodec, PreviewType, Revision};
