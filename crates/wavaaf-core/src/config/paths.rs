//! Standard locations for configuration files

use std::path::PathBuf;

/// Per-user configuration directory
///
/// Returns: `~/.config/wavaaf` (platform equivalent elsewhere)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wavaaf")
}

/// `<config dir>/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
