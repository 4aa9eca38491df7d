//! Stimply Engine - Main Entry Point
//!
//! Loads `./stimply.toml` when present, opens a window and renders the
//! configured model with a fly camera until the window closes or Escape is
//! pressed.

mod controls;
mod engine;

use std::process::{Command, ExitCode};

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use stimply_core::{EngineConfig, Error};

use crate::engine::Engine;

const CONFIG_PATH: &str = "stimply.toml";

struct App {
    config: EngineConfig,
    engine: Option<Engine>,
    fatal: Option<Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Error) {
        self.engine = None;
        self.fatal = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() || self.fatal.is_some() {
            return;
        }
        match Engine::new(event_loop, &self.config) {
            Ok(engine) => {
                info!("Initialization complete, entering main loop");
                self.engine = Some(engine);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                if !engine.dispatch_events() {
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => match engine.frame() {
                Ok(true) => {}
                Ok(false) => event_loop.exit(),
                Err(e) => self.fail(event_loop, e),
            },
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let Some(engine) = self.engine.as_mut() {
            engine.handle_device_event(&event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.as_ref() {
            engine.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Vulkan objects go before the event loop closes the window.
        self.engine = None;
    }
}

/// Runs the configured shader build command, logging rather than failing.
fn run_shader_build(command: &str) {
    info!("Running shader build command: {}", command);
    let status = if cfg!(windows) {
        Command::new("cmd").args(["/C", command]).status()
    } else {
        Command::new("sh").args(["-c", command]).status()
    };
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("Shader build command exited with {}", status),
        Err(e) => warn!("Failed to run shader build command: {}", e),
    }
}

fn report_fatal(err: &Error) {
    error!("{}: {}", err.kind(), err);
    eprintln!("{}: {}", err.kind(), err);
}

fn run() -> Result<Option<Error>> {
    let config = match EngineConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => return Ok(Some(e)),
    };

    if cfg!(debug_assertions)
        && let Some(command) = config.shader_build_command.as_deref()
    {
        run_shader_build(command);
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(app.fatal)
}

fn main() -> Result<ExitCode> {
    stimply_core::init_logging();
    info!("Starting Stimply Engine");

    match run()? {
        Some(err) => {
            report_fatal(&err);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
