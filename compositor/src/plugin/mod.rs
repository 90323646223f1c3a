//! Plugin runtime: loads effect modules discovered by
//! `compman-plugin-manager` and dispatches event hooks to them through a
//! C-ABI vtable.

use std::ffi::c_char;

use tracing::{debug, info, warn};

use compman_plugin_manager::{DiscoveredPlugin, LoadedLibrary, PluginManagerError};

use crate::error::{CompositorError, Result};

/// Window id as seen across the plugin ABI boundary; matches X11's 32-bit
/// resource id so plugins link against a stable, language-agnostic type.
pub type RawWindowId = u32;

/// The symbol every plugin library must export: a `static` of this exact
/// layout, named `COMPMAN_PLUGIN_VTABLE`.
pub const VTABLE_SYMBOL: &str = "COMPMAN_PLUGIN_VTABLE";

/// Optional function slots a plugin may fill in. Every slot is
/// `Option<extern "C" fn(...)>`; a `None` slot is simply not invoked.
#[repr(C)]
pub struct PluginVTable {
    pub name: Option<unsafe extern "C" fn() -> *const c_char>,
    pub check_requirements: Option<unsafe extern "C" fn() -> bool>,
    pub manage_existing: Option<unsafe extern "C" fn(windows: *const RawWindowId, len: usize)>,
    pub window_get_opacity: Option<unsafe extern "C" fn(window: RawWindowId) -> u16>,
    /// Returns a pointer to a plugin-owned array and writes its length to
    /// `out_len`; a null return or zero length means "no override".
    pub render_windows: Option<unsafe extern "C" fn(out_len: *mut usize) -> *const RawWindowId>,
    pub on_damage: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_key_press: Option<unsafe extern "C" fn(keycode: u8)>,
    pub on_key_release: Option<unsafe extern "C" fn(keycode: u8)>,
    pub on_button_press: Option<unsafe extern "C" fn(button: u8)>,
    pub on_button_release: Option<unsafe extern "C" fn(button: u8)>,
    pub on_configure: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_create: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_destroy: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_map: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_unmap: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_reparent: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_circulate: Option<unsafe extern "C" fn(window: RawWindowId)>,
    pub on_property: Option<unsafe extern "C" fn(window: RawWindowId, atom: u32)>,
}

/// A loaded plugin: its manifest id, the library keeping its code mapped,
/// and the vtable pointer resolved from it.
struct PluginHandle {
    id: String,
    name: String,
    enabled: bool,
    requirements_checked: bool,
    vtable: *const PluginVTable,
    _library: LoadedLibrary,
}

// The handle is only ever touched from the single-threaded main loop;
// `*const PluginVTable` points at `'static` data owned by the mapped
// library, which outlives the handle itself.
unsafe impl Send for PluginHandle {}

impl PluginHandle {
    fn vtable(&self) -> &PluginVTable {
        // SAFETY: resolved from a library kept alive for as long as `self`.
        unsafe { &*self.vtable }
    }
}

/// An ordered sequence of loaded plugins, dispatched in load order.
pub struct PluginRuntime {
    plugins: Vec<PluginHandle>,
}

impl PluginRuntime {
    /// Opens every discovered plugin's library and resolves its vtable
    /// symbol. A plugin that fails to load is logged and skipped; it does
    /// not abort the rest of startup.
    pub fn load(discovered: Vec<DiscoveredPlugin>) -> Self {
        let mut plugins = Vec::with_capacity(discovered.len());
        for plugin in discovered {
            match Self::load_one(&plugin) {
                Ok(handle) => {
                    info!(plugin = %handle.id, "plugin loaded");
                    plugins.push(handle);
                }
                Err(e) => warn!(plugin = %plugin.manifest.plugin.id, error = %e, "failed to load plugin"),
            }
        }
        PluginRuntime { plugins }
    }

    fn load_one(plugin: &DiscoveredPlugin) -> std::result::Result<PluginHandle, PluginManagerError> {
        let id = plugin.manifest.plugin.id.clone();
        // SAFETY: entry_point_path comes from a manifest the operator placed
        // under the configured plugin directory; loading it is the whole
        // point of a plugin runtime.
        let library = unsafe { LoadedLibrary::open(&id, &plugin.entry_point_path)? };
        let vtable = unsafe { library.resolve::<PluginVTable>(VTABLE_SYMBOL)? };
        Ok(PluginHandle {
            id,
            name: plugin.manifest.plugin.name.clone(),
            enabled: false,
            requirements_checked: false,
            vtable,
            _library: library,
        })
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Runs `check_requirements` on every plugin that has not yet passed
    /// it, enabling those that now do. Called once at startup and again
    /// after every property-notify; plugins never become disabled once
    /// enabled.
    pub fn recheck_requirements(&mut self) {
        for plugin in &mut self.plugins {
            if plugin.enabled {
                continue;
            }
            let vtable = plugin.vtable();
            let passes = match vtable.check_requirements {
                Some(check) => unsafe { check() },
                // no requirements slot: treated as always satisfied.
                None => true,
            };
            plugin.requirements_checked = true;
            if passes {
                debug!(plugin = %plugin.id, "plugin requirements satisfied, enabling");
                plugin.enabled = true;
            }
        }
    }

    /// Invokes `manage_existing` on every enabled plugin that has the slot
    /// set, once at startup with the initial window set.
    pub fn manage_existing(&self, windows: &[RawWindowId]) {
        for plugin in self.enabled_plugins() {
            if let Some(manage_existing) = plugin.vtable().manage_existing {
                unsafe { manage_existing(windows.as_ptr(), windows.len()) };
            }
        }
    }

    /// The first enabled plugin's opacity-provider result, if any plugin
    /// has that slot set; only the first plugin with the slot filled is
    /// consulted.
    pub fn window_get_opacity(&self, window: RawWindowId) -> Option<u16> {
        for plugin in self.enabled_plugins() {
            if let Some(get_opacity) = plugin.vtable().window_get_opacity {
                return Some(unsafe { get_opacity(window) });
            }
        }
        None
    }

    /// The first enabled plugin's non-empty window-list override, if any.
    pub fn render_windows(&self) -> Option<Vec<RawWindowId>> {
        for plugin in self.enabled_plugins() {
            if let Some(render_windows) = plugin.vtable().render_windows {
                let mut len: usize = 0;
                let ptr = unsafe { render_windows(&mut len as *mut usize) };
                if ptr.is_null() || len == 0 {
                    continue;
                }
                // SAFETY: the plugin guarantees `ptr` is valid for `len`
                // elements until the next call into the plugin.
                let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
                return Some(slice.to_vec());
            }
        }
        None
    }

    pub fn dispatch_damage(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_damage);
    }
    pub fn dispatch_create(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_create);
    }
    pub fn dispatch_destroy(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_destroy);
    }
    pub fn dispatch_map(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_map);
    }
    pub fn dispatch_unmap(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_unmap);
    }
    pub fn dispatch_configure(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_configure);
    }
    pub fn dispatch_reparent(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_reparent);
    }
    pub fn dispatch_circulate(&self, window: RawWindowId) {
        self.dispatch_window_event(window, |v| v.on_circulate);
    }

    pub fn dispatch_property(&self, window: RawWindowId, atom: u32) {
        for plugin in self.enabled_plugins() {
            if let Some(on_property) = plugin.vtable().on_property {
                unsafe { on_property(window, atom) };
            }
        }
    }

    pub fn dispatch_key_press(&self, keycode: u8) {
        for plugin in self.enabled_plugins() {
            if let Some(f) = plugin.vtable().on_key_press {
                unsafe { f(keycode) };
            }
        }
    }
    pub fn dispatch_key_release(&self, keycode: u8) {
        for plugin in self.enabled_plugins() {
            if let Some(f) = plugin.vtable().on_key_release {
                unsafe { f(keycode) };
            }
        }
    }
    pub fn dispatch_button_press(&self, button: u8) {
        for plugin in self.enabled_plugins() {
            if let Some(f) = plugin.vtable().on_button_press {
                unsafe { f(button) };
            }
        }
    }
    pub fn dispatch_button_release(&self, button: u8) {
        for plugin in self.enabled_plugins() {
            if let Some(f) = plugin.vtable().on_button_release {
                unsafe { f(button) };
            }
        }
    }

    fn dispatch_window_event(&self, window: RawWindowId, slot: impl Fn(&PluginVTable) -> Option<unsafe extern "C" fn(RawWindowId)>) {
        for plugin in self.enabled_plugins() {
            if let Some(f) = slot(plugin.vtable()) {
                unsafe { f(window) };
            }
        }
    }

    fn enabled_plugins(&self) -> impl Iterator<Item = &PluginHandle> {
        self.plugins.iter().filter(|p| p.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_runtime_has_no_plugins() {
        let runtime = PluginRuntime { plugins: Vec::new() };
        assert!(runtime.is_empty());
        assert_eq!(runtime.window_get_opacity(1), None);
        assert_eq!(runtime.render_windows(), None);
    }
}
