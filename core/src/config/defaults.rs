//! Default values used when a configuration file is absent or a field is omitted.

use std::path::PathBuf;

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "text".to_string()
}

pub fn default_log_file_path() -> Option<PathBuf> {
    None
}

pub fn default_backend_dir() -> Option<PathBuf> {
    None
}

pub fn default_plugin_dir() -> Option<PathBuf> {
    None
}

/// Refresh-rate fallback when the display server offers no mode hint; 50 Hz per the
/// scheduler's policy (`1 / refresh_rate`, clamped to >= 10ms).
pub fn default_refresh_rate_hz() -> u32 {
    50
}

/// Coarsening threshold: damage notifications for one window within a single frame
/// beyond this count promote the window's damage to "fully damaged".
pub fn default_damage_coarsen_threshold() -> u32 {
    20
}
