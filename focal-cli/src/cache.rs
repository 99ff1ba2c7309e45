//! Optional sidecar cache that lets unchanged files skip reading and detection.
//!
//! An entry is reused only when the file's size and modification time match
//! and the cache was produced under the same detection fingerprint. The cache
//! never changes what ends up in the manifest.

use std::{
    collections::BTreeMap,
    fs::{self, Metadata},
    path::Path,
    time::UNIX_EPOCH,
};

use anyhow::{Context, Result};
use focal_utils::AppSettings;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::manifest::{AssetPath, ManifestEntry};

/// Size and modification time of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub len: u64,
    pub modified_secs: u64,
    pub modified_nanos: u32,
}

impl FileStamp {
    /// `None` when the platform does not report a usable modification time.
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let modified = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
        Some(Self {
            len: metadata.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedEntry {
    stamp: FileStamp,
    entry: ManifestEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ManifestCache {
    fingerprint: String,
    entries: BTreeMap<AssetPath, CachedEntry>,
}

impl ManifestCache {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache at `path`. Anything unusable yields an empty cache.
    pub fn load_or_empty(path: &Path, fingerprint: &str) -> Self {
        if !path.exists() {
            debug!("No manifest cache at {}", path.display());
            return Self::new(fingerprint);
        }
        match Self::read(path) {
            Ok(cache) if cache.fingerprint == fingerprint => {
                info!(
                    "Loaded manifest cache with {} entr(ies) from {}",
                    cache.entries.len(),
                    path.display()
                );
                cache
            }
            Ok(_) => {
                info!(
                    "Ignoring manifest cache {}: detection settings changed",
                    path.display()
                );
                Self::new(fingerprint)
            }
            Err(err) => {
                warn!("Ignoring unreadable manifest cache: {err:#}");
                Self::new(fingerprint)
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached entry for `key` if the file has not changed since.
    pub fn lookup(&self, key: &AssetPath, stamp: &FileStamp) -> Option<&ManifestEntry> {
        self.entries
            .get(key)
            .filter(|cached| cached.stamp == *stamp)
            .map(|cached| &cached.entry)
    }

    pub fn insert(&mut self, key: AssetPath, stamp: FileStamp, entry: ManifestEntry) {
        self.entries.insert(key, CachedEntry { stamp, entry });
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_string(self).context("failed to serialize manifest cache")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write manifest cache {}", path.display()))
    }
}

/// Identifies everything besides the file itself that shapes an entry.
pub fn settings_fingerprint(settings: &AppSettings) -> String {
    let input = &settings.input;
    let detection = &settings.detection;
    format!(
        "v1|{}|{}x{}|{}|{}|{}|{}",
        settings.model_path().display(),
        input.width,
        input.height,
        input.resize_quality,
        detection.score_threshold,
        detection.nms_threshold,
        detection.top_k
    )
}
