//! # compman-core
//!
//! Ambient infrastructure shared by the `compman` compositing manager:
//! configuration loading, the common error type, and logging setup. Nothing
//! in this crate knows about X11, windows, or rendering — it is the same
//! kind of bedrock layer a desktop-environment "core" crate provides, scoped
//! down to what a single compositing-manager binary actually needs.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CompositorConfig, ConfigLoader, CoreConfig, LoggingConfig};
pub use error::{ConfigError, CoreError};
pub use logging::{init_logging, init_minimal_logging};
