//! Plugin discovery and dynamic loading for `compman`.
//!
//! Scans a directory for `<plugin>/Plugin.toml` manifests, loaded at
//! startup, and opens the dynamic library each one names. The compositor
//! crate owns the actual plugin vtable ABI and the event-dispatch logic;
//! this crate only gets plugins from disk into memory.

pub mod error;
pub mod loader;
pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use error::PluginManagerError;
pub use loader::LoadedLibrary;
pub use manifest::{PluginDetails, PluginManifest};

/// A plugin found on disk: its parsed manifest and the resolved path to its
/// entry-point library.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub manifest_path: PathBuf,
    pub entry_point_path: PathBuf,
}

/// Scans `directory` for one-level-deep plugin subdirectories, each
/// containing a `Plugin.toml`. Invalid manifests are logged and skipped
/// rather than aborting the scan — a single malformed plugin must not
/// prevent the rest from loading.
pub fn discover_plugins_in_directory(directory: &Path) -> Result<Vec<DiscoveredPlugin>, PluginManagerError> {
    if !directory.is_dir() {
        return Err(PluginManagerError::Discovery(
            directory.to_path_buf(),
            "not a directory".to_string(),
        ));
    }

    let mut discovered = Vec::new();

    for entry in fs::read_dir(directory).map_err(|e| {
        PluginManagerError::Discovery(directory.to_path_buf(), e.to_string())
    })? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read plugin directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest_path = path.join("Plugin.toml");
        if !manifest_path.is_file() {
            continue;
        }
        match PluginManifest::load_from_file(&manifest_path) {
            Ok(manifest) => {
                info!(
                    plugin = %manifest.plugin.id,
                    version = %manifest.plugin.version,
                    "discovered plugin"
                );
                let entry_point_path = path.join(&manifest.plugin.entry_point);
                discovered.push(DiscoveredPlugin {
                    manifest,
                    manifest_path,
                    entry_point_path,
                });
            }
            Err(e) => {
                warn!("skipping plugin manifest {}: {e}", manifest_path.display());
            }
        }
    }

    Ok(discovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    fn write_manifest(dir: &Path, id: &str, entry_point: &str) {
        let content = format!(
            r#"[plugin]
id = "{id}"
name = "{id}"
version = "0.1.0"
entry_point = "{entry_point}"
"#
        );
        let mut f = File::create(dir.join("Plugin.toml")).unwrap();
        writeln!(f, "{content}").unwrap();
    }

    #[test]
    fn empty_directory_yields_no_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = discover_plugins_in_directory(dir.path()).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn discovers_one_valid_plugin() {
        let base = tempfile::tempdir().unwrap();
        let plugin_dir = base.path().join("opacity");
        fs::create_dir(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "org.compman.opacity", "libopacity.so");

        let plugins = discover_plugins_in_directory(base.path()).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].manifest.plugin.id, "org.compman.opacity");
        assert_eq!(
            plugins[0].entry_point_path,
            plugin_dir.join("libopacity.so")
        );
    }

    #[test]
    fn invalid_manifest_is_skipped_not_fatal() {
        let base = tempfile::tempdir().unwrap();
        let plugin_dir = base.path().join("broken");
        fs::create_dir(&plugin_dir).unwrap();
        fs::write(plugin_dir.join("Plugin.toml"), "not valid toml {").unwrap();

        let plugins = discover_plugins_in_directory(base.path()).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn non_directory_target_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        let file_path = base.path().join("not_a_dir");
        File::create(&file_path).unwrap();

        let err = discover_plugins_in_directory(&file_path);
        assert!(matches!(err, Err(PluginManagerError::Discovery(_, _))));
    }
}
