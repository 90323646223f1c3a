//! Dynamic library loading for discovered plugins.
//!
//! The manager itself has no opinion on the shape of a plugin's ABI — it
//! just opens the library and resolves a named symbol, handing the raw
//! pointer back to the caller. The compositor crate defines the actual
//! vtable type and the symbol name it expects.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::PluginManagerError;

/// An opened plugin library plus the generation id under which it was
/// mapped, kept alive for as long as any symbol resolved from it is in use.
pub struct LoadedLibrary {
    pub plugin_id: String,
    library: Library,
}

impl LoadedLibrary {
    /// Opens `path` as a dynamic library. `unsafe` because loading and
    /// executing arbitrary code from disk is inherently unsafe; the caller
    /// is trusted to only point this at plugins it intends to run.
    pub unsafe fn open(plugin_id: &str, path: &Path) -> Result<Self, PluginManagerError> {
        let library = Library::new(path).map_err(|source| PluginManagerError::LibraryLoad {
            plugin_id: plugin_id.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        Ok(LoadedLibrary {
            plugin_id: plugin_id.to_string(),
            library,
        })
    }

    /// Resolves a raw `*const T` exported under `symbol` (typically a
    /// `static` holding the plugin's vtable). Returns
    /// [`PluginManagerError::MissingSymbol`] if absent.
    ///
    /// # Safety
    /// `T` must exactly match the type the library actually exported; a
    /// mismatch is undefined behavior. The returned pointer is valid only
    /// while `self` (and thus the underlying `Library`) is kept alive.
    pub unsafe fn resolve<T>(&self, symbol: &str) -> Result<*const T, PluginManagerError> {
        let sym: Symbol<*const T> = self
            .library
            .get(symbol.as_bytes())
            .map_err(|_| PluginManagerError::MissingSymbol {
                plugin_id: self.plugin_id.clone(),
                symbol: symbol.to_string(),
            })?;
        Ok(*sym)
    }
}
