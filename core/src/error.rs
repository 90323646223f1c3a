//! Error types shared by every crate in the workspace.
//!
//! `CoreError` is the umbrella type returned by configuration and logging
//! setup; the compositor crate defines its own richer error enum for
//! runtime (X11, rendering, plugin) failures and converts into/out of this
//! one at the boundary.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("{0}")]
    Generic(String),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<CoreError>,
    },
}

impl CoreError {
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        CoreError::Generic(msg.into())
    }

    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        CoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    FileReadError { path: PathBuf, source: io::Error },

    #[error("failed to parse TOML in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required configuration value: {0}")]
    MissingValue(String),

    #[error("configuration value out of range for {key}: {message}")]
    ValueOutOfRange { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn core_error_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let core_err = CoreError::from(io_err);
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    fn core_error_with_context_preserves_message() {
        let io_err = IoError::new(ErrorKind::PermissionDenied, "permission denied");
        let core_err = CoreError::from(io_err).with_context("while opening config file");
        match core_err {
            CoreError::WithContext { context, .. } => {
                assert_eq!(context, "while opening config file");
            }
            _ => panic!("expected CoreError::WithContext"),
        }
    }

    #[test]
    fn display_messages_are_informative() {
        let err = ConfigError::MissingValue("refresh_rate".into());
        assert!(format!("{err}").contains("refresh_rate"));
    }
}
