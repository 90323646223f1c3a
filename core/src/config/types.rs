//! Schema of the on-disk configuration file.

use serde::Deserialize;
use std::path::PathBuf;

use super::defaults;

/// Root configuration structure, loaded from TOML.
///
/// Mirrors the command-line startup parameters: a verbose flag, an
/// optional config path, an optional backend search directory and an
/// optional plugin search directory. The config file itself only carries
/// the latter three plus logging; `verbose` is a pure CLI flag.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    pub logging: LoggingConfig,
    pub compositor: CompositorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            logging: LoggingConfig::default(),
            compositor: CompositorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: defaults::default_log_level(),
            file_path: defaults::default_log_file_path(),
            format: defaults::default_log_format(),
        }
    }
}

/// Compositor-specific tunables. Everything here is optional in the file;
/// missing fields fall back to the scheduler's hard-coded defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompositorConfig {
    #[serde(default = "defaults::default_backend_dir")]
    pub backend_dir: Option<PathBuf>,
    #[serde(default = "defaults::default_plugin_dir")]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default = "defaults::default_refresh_rate_hz")]
    pub fallback_refresh_rate_hz: u32,
    #[serde(default = "defaults::default_damage_coarsen_threshold")]
    pub damage_coarsen_threshold: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        CompositorConfig {
            backend_dir: defaults::default_backend_dir(),
            plugin_dir: defaults::default_plugin_dir(),
            fallback_refresh_rate_hz: defaults::default_refresh_rate_hz(),
            damage_coarsen_threshold: defaults::default_damage_coarsen_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.compositor.fallback_refresh_rate_hz, 50);
        assert_eq!(config.compositor.damage_coarsen_threshold, 20);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_src = r#"
            [compositor]
            fallback_refresh_rate_hz = 75
        "#;
        let config: CoreConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.compositor.fallback_refresh_rate_hz, 75);
        assert_eq!(config.compositor.damage_coarsen_threshold, 20);
        assert_eq!(config.logging.level, "info");
    }
}
