//! Reading and writing the converter's `config.yaml`

use anyhow::{Context, Result};
use std::path::Path;

use super::AppConfig;

/// Load the converter settings from `path`
///
/// A missing file yields [`AppConfig::default`]. So does an unreadable or
/// invalid one, after a warning. A frame rate that is not one of
/// `RateSpec::LABELS` is replaced by the default rate; everything else in
/// the file is kept.
pub fn load_config(path: &Path) -> AppConfig {
    log::info!("load_config: Reading converter settings from {:?}", path);

    if !path.exists() {
        log::info!("load_config: No config file at {:?}, using built-in settings", path);
        return AppConfig::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: Cannot read {:?}: {}, using built-in settings", path, e);
            return AppConfig::default();
        }
    };
    let mut config: AppConfig = match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("load_config: {:?} is not valid settings YAML: {}, using built-in settings", path, e);
            return AppConfig::default();
        }
    };

    if let Err(e) = config.rate() {
        let fallback = AppConfig::default().frame_rate;
        log::warn!("load_config: {}, falling back to {} fps", e, fallback);
        config.frame_rate = fallback;
    }
    match &config.taxonomy_path {
        Some(table) if !table.exists() => {
            log::warn!("load_config: UCS table {:?} does not exist", table)
        }
        Some(table) => log::debug!("load_config: UCS table {:?}", table),
        None => log::debug!("load_config: Using the built-in UCS table"),
    }

    log::info!(
        "load_config: {} fps, {} essence, {} workers",
        config.frame_rate,
        if config.embed { "embedded" } else { "linked" },
        config.workers()
    );
    config
}

/// Write the converter settings to `path`, creating parent directories
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    log::info!("save_config: Writing converter settings to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings to YAML")?;
    crate::output::write_atomic(path, yaml.as_bytes())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "embed: [not, a, bool").unwrap();
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn test_unknown_frame_rate_falls_back_and_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "frame_rate: \"12\"\nembed: false\ntaxonomy_path: /missing/ucs.csv\n",
        )
        .unwrap();

        let config = load_config(&path);

        assert_eq!(config.frame_rate, AppConfig::default().frame_rate);
        assert!(!config.embed);
        assert_eq!(config.taxonomy_path, Some(PathBuf::from("/missing/ucs.csv")));
        assert!(config.assembly_options().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = AppConfig {
            frame_rate: "29.97".into(),
            embed: false,
            drop_frame: true,
            ..AppConfig::default()
        };
        save_config(&config, &path).unwrap();

        assert_eq!(load_config(&path), config);
    }
}
