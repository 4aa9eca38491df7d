//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation and adapter scoring
//! - Logical device, queues and memory allocation
//! - Swapchain, render pass and framebuffers
//! - Command buffer recording and synchronization primitives
//! - Buffers, images, samplers and descriptors
//! - Pipeline creation
//!
//! [`GpuContext`] is the resource-manager seam the scene layer builds on.

mod error;

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use context::GpuContext;
pub use descriptor::{DescriptorLayoutKind, PipelineLayoutKind};
pub use error::{RhiError, RhiResult};
pub use vertex::Vertex;

// Re-export ash types that users might need
pub use ash::vk;
