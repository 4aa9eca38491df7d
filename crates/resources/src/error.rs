//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The model importer rejected the file.
    #[error("Failed to import model '{path}': {message}")]
    ImportFailed {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Importer diagnostic.
        message: String,
    },

    /// The file extension is not a supported model format.
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(PathBuf),

    /// The model contains no meshes.
    #[error("Model '{0}' contains no meshes")]
    NoMeshes(PathBuf),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

impl From<ResourceError> for stimply_core::Error {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Io(e) => stimply_core::Error::Io(e),
            other => stimply_core::Error::Asset(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_failed_carries_diagnostic() {
        let err = ResourceError::ImportFailed {
            path: PathBuf::from("Models/broken.obj"),
            message: "unexpected token".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Models/broken.obj"));
        assert!(text.contains("unexpected token"));
    }

    #[test]
    fn test_into_core_error_is_asset() {
        let err: stimply_core::Error = ResourceError::NoMeshes(PathBuf::from("empty.obj")).into();
        assert_eq!(err.kind(), "Asset Error");
    }
}
