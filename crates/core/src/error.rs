//! Error types for the engine.

use thiserror::Error;

/// Main error type for the engine.
///
/// Layer-specific errors (Vulkan, assets) are converted into one of these
/// variants at crate boundaries, keeping the message of the source error.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// GPU device, swapchain or pipeline errors
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Model or texture loading errors
    #[error("Asset error: {0}")]
    Asset(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short tag naming the error category, used when presenting fatal errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Window(_) => "Window Error",
            Error::Renderer(_) => "Renderer Error",
            Error::Asset(_) => "Asset Error",
            Error::Io(_) => "IO Error",
            Error::Config(_) => "Config Error",
            Error::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Error::Window("x".into()).kind(), "Window Error");
        assert_eq!(Error::Renderer("x".into()).kind(), "Renderer Error");
        assert_eq!(Error::Asset("x".into()).kind(), "Asset Error");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.kind(), "IO Error");
        assert!(err.to_string().contains("missing"));
    }
}
