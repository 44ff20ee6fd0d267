//! Deterministic mob identifiers
//!
//! Re-converting the same unchanged file yields the same identifiers, so
//! editors relink instead of importing duplicates.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// SMPTE UMID label prefix used for generated mob ids
const UMID_PREFIX: &str = "060a2b34.01010105.01010f20.13000000";

/// What identifies an input file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// Absolute path
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let path = std::fs::canonicalize(path)?;
        let meta = std::fs::metadata(&path)?;
        Ok(Self {
            path,
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn modified_secs(&self) -> u64 {
        self.modified
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// `urn:smpte:umid:` id from path, size, mtime and a role suffix
pub fn deterministic_mob_id(identity: &FileIdentity, suffix: &str) -> String {
    let seed = format!(
        "{}|{}|{}|{}",
        identity.path.display(),
        identity.size,
        identity.modified_secs(),
        suffix
    );
    let digest = Sha256::digest(seed.as_bytes());
    let groups: Vec<String> = digest[..16]
        .chunks(4)
        .map(|chunk| chunk.iter().map(|b| format!("{:02x}", b)).collect())
        .collect();
    format!("urn:smpte:umid:{}.{}", UMID_PREFIX, groups.join("."))
}
