//! Configuration schema and loading.
//!
//! A thin TOML layer: [`ConfigLoader::load`] returns [`CoreConfig`] whether or
//! not a file is present, so callers never need a separate "no config"
//! branch.

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{CompositorConfig, CoreConfig, LoggingConfig};
