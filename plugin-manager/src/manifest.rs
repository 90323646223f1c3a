//! `Plugin.toml` schema and parsing.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::PluginManagerError;

/// Contents of a plugin's `Plugin.toml`.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub plugin: PluginDetails,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PluginDetails {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Path to the dynamic library, relative to the plugin's own directory.
    pub entry_point: String,
}

impl PluginManifest {
    pub fn load_from_file(path: &Path) -> Result<Self, PluginManagerError> {
        let content = fs::read_to_string(path).map_err(|source| PluginManagerError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&content, path)
    }

    pub fn load_from_str(content: &str, source_path: &Path) -> Result<Self, PluginManagerError> {
        toml::from_str(content).map_err(|source| PluginManagerError::ManifestParse {
            path: source_path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dummy_path() -> PathBuf {
        PathBuf::from("dummy/Plugin.toml")
    }

    #[test]
    fn parses_minimal_manifest() {
        let toml_src = r#"
            [plugin]
            id = "org.compman.opacity"
            name = "Opacity"
            version = "0.1.0"
            entry_point = "libopacity.so"
        "#;
        let manifest = PluginManifest::load_from_str(toml_src, &dummy_path()).unwrap();
        assert_eq!(manifest.plugin.id, "org.compman.opacity");
        assert_eq!(manifest.plugin.entry_point, "libopacity.so");
    }

    #[test]
    fn rejects_missing_required_field() {
        let toml_src = r#"
            [plugin]
            name = "Opacity"
            version = "0.1.0"
            entry_point = "libopacity.so"
        "#;
        let err = PluginManifest::load_from_str(toml_src, &dummy_path());
        assert!(matches!(err, Err(PluginManagerError::ManifestParse { .. })));
    }

    #[test]
    fn rejects_unknown_field() {
        let toml_src = r#"
            [plugin]
            id = "org.compman.opacity"
            name = "Opacity"
            version = "0.1.0"
            entry_point = "libopacity.so"
            surprise = true
        "#;
        let err = PluginManifest::load_from_str(toml_src, &dummy_path());
        assert!(matches!(err, Err(PluginManagerError::ManifestParse { .. })));
    }
}
