//! Pre-dexing of libraries
//!
//! [`PreDexCache`] specializes the generic cache with [`DexKey`], which adds
//! the jumbo-mode flag to the key, and copies cached dex output into each
//! caller's output location.

pub mod cache;
pub mod key;
pub mod options;
pub mod process;

pub use cache::PreDexCache;
pub use key::DexKey;
pub use options::{BuildToolInfo, DexOptions};
pub use process::{DexTransform, DxProcess};
