//! Failure taxonomy for a manifest run.
//!
//! The stage that raises an error decides its reach: detector construction,
//! the asset root walk, and the manifest write end the run. Errors raised
//! while processing one file are logged and turned into an omission.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    /// The face detection backend could not be constructed.
    #[error("failed to initialize face detection from {path}: {reason}", path = .path.display())]
    FatalInit { path: PathBuf, reason: String },

    /// A directory or file could not be read.
    #[error("failed to read {path}: {source}", path = .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not an image, or its pixel data is truncated or corrupt.
    #[error("failed to decode {path}: {reason}", path = .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Face detection failed or timed out for one image.
    #[error("face detection failed for {path}: {reason}", path = .path.display())]
    Detection { path: PathBuf, reason: String },

    /// The manifest artifact could not be written.
    #[error("failed to write manifest {path}: {source}", path = .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ManifestError {
    pub(crate) fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ManifestError::FileRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        ManifestError::Decode {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn detection(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ManifestError::Detection {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
