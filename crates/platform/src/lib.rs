//! Platform layer for Stimply Engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit, translating OS messages into bus events
//! - Keyboard state for camera movement
//! - Raw window handles for Vulkan surface creation

mod input;
mod window;

pub use input::InputState;
pub use stimply_core::KeyCode;
pub use window::{Surface, Window, required_extensions};

// Re-export winit types the application loop needs
pub use winit::event::{DeviceEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
