//! Standard locations for client configuration

use std::path::PathBuf;

/// Per-user configuration directory
///
/// Returns: `~/.config/spindle` (platform equivalent elsewhere)
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spindle")
}

/// Returns: `~/.config/spindle/client.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("client.yaml")
}
