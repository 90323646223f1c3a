//! Error types for plugin discovery and dynamic loading.
//!
//! Every variant here is non-fatal to the compositor as a whole: the
//! caller logs it and skips the offending plugin.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginManagerError {
    #[error("plugin discovery failed in {0}: {1}")]
    Discovery(PathBuf, String),

    #[error("failed to read manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to load library for plugin '{plugin_id}' at {path}: {source}")]
    LibraryLoad {
        plugin_id: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("plugin '{plugin_id}' is missing the required entry symbol '{symbol}'")]
    MissingSymbol { plugin_id: String, symbol: String },
}
