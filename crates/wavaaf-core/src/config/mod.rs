//! Converter configuration
//!
//! - Loading and saving `config.yaml`
//! - Standard config paths
//! - [`AppConfig`], the settings of a conversion run
//!
//! ```yaml
//! frame_rate: "29.97"
//! embed: false
//! exact_category_match_only: false
//! parallel_workers: 8
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aaf::{AssemblyOptions, EssenceMode};
use crate::timecode::{RateSpec, TimecodeError};
use crate::ucs::{MatchOptions, LOW_CONFIDENCE_THRESHOLD};

/// File name of the configuration inside [`default_config_dir`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Worker pool bounds
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;

/// Settings for a conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// One of `RateSpec::LABELS`
    pub frame_rate: String,
    /// Copy PCM into the container (true) or link to the source file
    pub embed: bool,
    /// Only accept exact id-prefix matches
    pub exact_category_match_only: bool,
    /// Fuzzy matches scoring below this are discarded
    pub min_category_score: f64,
    /// Primaries scoring below this are reported as low confidence
    pub low_confidence_threshold: f64,
    /// SMPTE drop-frame counting for 29.97 and 59.94
    pub drop_frame: bool,
    /// Worker threads, clamped to 1..=16
    pub parallel_workers: usize,
    /// Descend into subdirectories of the input folder
    pub recursive: bool,
    /// External UCS table (YAML or CSV); the built-in table when unset
    pub taxonomy_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frame_rate: "24".to_string(),
            embed: true,
            exact_category_match_only: false,
            min_category_score: 0.0,
            low_confidence_threshold: LOW_CONFIDENCE_THRESHOLD,
            drop_frame: false,
            parallel_workers: 4,
            recursive: false,
            taxonomy_path: None,
        }
    }
}

impl AppConfig {
    pub fn rate(&self) -> Result<RateSpec, TimecodeError> {
        RateSpec::parse(&self.frame_rate)
    }

    pub fn essence_mode(&self) -> EssenceMode {
        if self.embed {
            EssenceMode::Embed
        } else {
            EssenceMode::Link
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            exact_only: self.exact_category_match_only,
            min_score: self.min_category_score,
        }
    }

    pub fn assembly_options(&self) -> Result<AssemblyOptions, TimecodeError> {
        Ok(AssemblyOptions {
            mode: self.essence_mode(),
            rate: self.rate()?,
            drop_frame: self.drop_frame,
            low_confidence_threshold: self.low_confidence_threshold,
        })
    }

    /// Worker count clamped to the supported range
    pub fn workers(&self) -> usize {
        self.parallel_workers.clamp(MIN_WORKERS, MAX_WORKERS)
    }
}
