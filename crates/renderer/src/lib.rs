//! Vulkan renderer for Stimply Engine.
//!
//! This crate connects the RHI to a window:
//! - [`GpuDevice`] implements [`stimply_rhi::GpuContext`] for scenes and meshes
//! - [`FrameSlots`] schedules frames in flight over a [`RenderTarget`]
//! - [`Renderer`] owns initialization, the pipeline, the camera and the lights
//! - [`UiOverlay`] hooks a debug overlay into each frame

pub mod depth_buffer;
pub mod frame;
pub mod gpu_device;
pub mod overlay;
pub mod render_target;
pub mod renderer;

pub use frame::{ActiveFrame, FrameBackend, FrameSlots, PresentOutcome, SlotState};
pub use gpu_device::{DescriptorSets, GpuDevice};
pub use overlay::{DebugOverlay, LightEdit, NoOverlay, OverlayState, UiOverlay};
pub use render_target::RenderTarget;
pub use renderer::Renderer;
