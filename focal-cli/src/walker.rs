//! Recursive discovery of image files under the asset root.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::ManifestError;

/// Lazy iterator over image files below an asset root.
///
/// Paths are absolute and yielded in file-name order per directory. A read
/// failure below the root is logged and that branch skipped; a failure on the
/// root itself is yielded as an error.
pub struct AssetWalker {
    root: PathBuf,
    extensions: Vec<String>,
    entries: walkdir::IntoIter,
}

impl AssetWalker {
    /// Open `root` for walking. Fails when the root is missing, not a
    /// directory, or unreadable.
    pub fn new(root: &Path, extensions: &[String]) -> Result<Self, ManifestError> {
        let root = root
            .canonicalize()
            .map_err(|source| ManifestError::file_read(root, source))?;
        fs::read_dir(&root).map_err(|source| ManifestError::file_read(&root, source))?;

        let entries = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Ok(Self {
            root,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            entries,
        })
    }

    /// The canonical asset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl Iterator for AssetWalker {
    type Item = Result<PathBuf, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let path = err.path().unwrap_or(&self.root).to_path_buf();
                    return Some(Err(ManifestError::file_read(path, io::Error::from(err))));
                }
                Err(err) => {
                    let path = err.path().unwrap_or(&self.root).display().to_string();
                    warn!("Skipping unreadable entry {path}: {err}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_allowed(entry.path()) {
                return Some(Ok(entry.into_path()));
            }
            debug!("Skipping non-image file {}", entry.path().display());
        }
    }
}
