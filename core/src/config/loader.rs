//! Loads [`CoreConfig`] from an explicit path or the XDG config directory.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, CoreError};

use super::types::CoreConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `path` if given, otherwise from
    /// `$XDG_CONFIG_HOME/compman/config.toml`. A missing default path is
    /// not an error: it yields [`CoreConfig::default`]. An explicitly
    /// given `path` that doesn't exist is an error.
    pub fn load(path: Option<&Path>) -> Result<CoreConfig, CoreError> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(CoreConfig::default()),
            },
        };

        if !resolved.exists() {
            if path.is_some() {
                return Err(CoreError::Config(ConfigError::FileNotFound(resolved)));
            }
            return Ok(CoreConfig::default());
        }

        let contents = std::fs::read_to_string(&resolved).map_err(|source| {
            CoreError::Config(ConfigError::FileReadError {
                path: resolved.clone(),
                source,
            })
        })?;

        toml::from_str(&contents).map_err(|source| {
            CoreError::Config(ConfigError::ParseError {
                path: resolved,
                source,
            })
        })
    }

    fn default_path() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("org", "compman", "compman")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = ConfigLoader::load(Some(Path::new("/nonexistent/compman.toml")));
        assert!(matches!(
            err,
            Err(CoreError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn absent_default_path_yields_defaults() {
        let config = ConfigLoader::load(None).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn valid_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[compositor]\nfallback_refresh_rate_hz = 144").unwrap();

        let config = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(config.compositor.fallback_refresh_rate_hz, 144);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml {").unwrap();

        let err = ConfigLoader::load(Some(&path));
        assert!(matches!(
            err,
            Err(CoreError::Config(ConfigError::ParseError { .. }))
        ));
    }
}
