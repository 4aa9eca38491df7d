//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No adapter passed the feature filter
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required instance or device extension is unavailable
    #[error("Missing required extension: {0}")]
    MissingExtension(String),

    /// A required instance layer is unavailable
    #[error("Missing required layer: {0}")]
    MissingLayer(String),

    /// The surface does not offer the required color format
    #[error("Surface does not support {0}")]
    UnsupportedSurfaceFormat(String),

    /// No memory type satisfies the filter and property flags
    #[error("No compatible memory type (filter {type_filter:#x}, properties {properties:?})")]
    NoCompatibleMemory {
        type_filter: u32,
        properties: ash::vk::MemoryPropertyFlags,
    },

    /// No depth format supports optimal-tiling depth attachments
    #[error("No supported depth format")]
    NoDepthFormat,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

impl From<RhiError> for stimply_core::Error {
    fn from(err: RhiError) -> Self {
        stimply_core::Error::Renderer(err.to_string())
    }
}
