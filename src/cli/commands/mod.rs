//! CLI command implementations

pub mod cache;
pub mod config;
pub mod dex;

pub use cache::execute as cache;
pub use config::execute as config;
pub use dex::execute as dex;
