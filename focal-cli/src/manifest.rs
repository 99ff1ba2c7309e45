//! The manifest artifact: asset keys, per-image records, and the JSON writer.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Component, Path},
};

use anyhow::{Context, Result};
use focal_core::FocusPoint;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Root-relative key of one asset, e.g. `/photos/portraits/example.webp`.
///
/// Always starts with `/` and uses `/` between components on every platform.
/// Case is kept as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

impl AssetPath {
    /// Key for `path` relative to `root`. Fails when `path` is not strictly
    /// below `root` or a component is not valid UTF-8, since a lossy key could
    /// collide with another file's.
    pub fn from_root(root: &Path, path: &Path) -> Result<Self> {
        let relative = path.strip_prefix(root).with_context(|| {
            format!("{} is not under {}", path.display(), root.display())
        })?;

        let mut key = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    key.push('/');
                    let part = part.to_str().with_context(|| {
                        format!("non-UTF-8 file name in {}", relative.display())
                    })?;
                    key.push_str(part);
                }
                Component::CurDir => {}
                other => anyhow::bail!(
                    "unexpected path component {other:?} in {}",
                    relative.display()
                ),
            }
        }
        anyhow::ensure!(!key.is_empty(), "{} is the asset root itself", path.display());
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptor of one image as consumed by the site at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusPoint>,
}

/// Every processed asset keyed by its [`AssetPath`].
///
/// Keys serialize in sorted order, so identical inputs give identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<AssetPath, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the record for `key`, returning the previous one.
    pub fn insert(&mut self, key: AssetPath, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(key, entry)
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(&AssetPath(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        json.push('\n');
        Ok(json)
    }

    /// Read a manifest previously written by [`Manifest::write_to`].
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }

    /// Replace the artifact at `path` with this manifest.
    ///
    /// The JSON goes to a hidden sibling file first and is renamed into place,
    /// so readers never see a half-written manifest.
    pub fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        let write_err = |source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        };

        let json = self
            .to_json()
            .map_err(|err| write_err(std::io::Error::other(format!("{err:#}"))))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest.json".to_string());
        let staging = path.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&staging, json).map_err(write_err)?;
        fs::rename(&staging, path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            write_err(source)
        })
    }
}
