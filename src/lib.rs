//! predex - cache for pre-dexed Android libraries
//!
//! Runs dx at most once per library, build-tools revision and jumbo mode,
//! and reuses the result across concurrent tasks and across builds.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dex;
pub mod error;

pub use error::{PredexError, PredexResult};
