//! Core utilities for Stimply Engine.
//!
//! This crate provides foundational types used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - The event bus shared by the window, renderer and engine
//! - Configuration management

mod config;
mod error;
mod events;
mod logging;
mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use logging::init_logging;
pub use timer::Timer;

/// Key codes carried by keyboard events.
pub use winit::keyboard::KeyCode;
