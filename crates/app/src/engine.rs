//! Engine composition root.

use stimply_core::{EngineConfig, Event, EventBus, Result, Timer};
use stimply_platform::{ActiveEventLoop, DeviceEvent, Window, WindowEvent};
use stimply_renderer::{DebugOverlay, GpuDevice, Renderer};
use stimply_scene::{Scene, SceneLoadOptions};
use tracing::info;

use crate::controls::Controls;

/// Window, renderer, scene and overlay wired to one event bus.
///
/// Fields drop in declaration order: the scene releases its GPU resources
/// before the renderer tears the device down, and the renderer's surface goes
/// before the window.
pub struct Engine {
    scene: Scene<GpuDevice>,
    overlay: DebugOverlay,
    renderer: Renderer,
    window: Window,
    controls: Controls,
    bus: EventBus,
}

impl Engine {
    pub fn new(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self> {
        let startup = Timer::new();
        let bus = EventBus::new();
        let controls = Controls::new(&bus);

        let window = Window::new(event_loop, config.width, config.height, &config.title, &bus)?;
        let renderer = Renderer::new(&window, config, &bus)?;

        let options = SceneLoadOptions {
            default_texture: config.default_texture.clone(),
            threads: config.loader_threads,
        };
        let scene = Scene::load(renderer.gpu(), &config.model_path, &options)?;

        bus.fire(Event::HideCursor);

        info!(
            "Engine ready in {:.2}s: {} meshes",
            startup.elapsed_secs(),
            scene.mesh_count()
        );

        Ok(Self {
            scene,
            overlay: DebugOverlay::new(),
            renderer,
            window,
            controls,
            bus,
        })
    }

    /// Delivers queued bus events. Returns whether the engine keeps running.
    pub fn dispatch_events(&self) -> bool {
        self.bus.dispatch();
        self.controls.is_running()
    }

    /// Runs one frame. Returns whether the loop should continue.
    pub fn frame(&mut self) -> Result<bool> {
        if !self.dispatch_events() {
            return Ok(false);
        }

        for edit in self.controls.take_light_edits() {
            self.overlay.edit_light(0, edit);
        }

        let dt = self.window.delta_time();
        if self
            .renderer
            .begin_frame(dt, self.window.input(), &mut self.overlay)?
        {
            self.renderer.render_frame(&self.scene, &mut self.overlay)?;
            self.renderer.end_frame(&mut self.overlay)?;
        }
        self.window.begin_frame();

        Ok(self.controls.is_running())
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        self.window.handle_window_event(event);
        if let WindowEvent::Resized(size) = event {
            self.renderer.resize(size.width, size.height);
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        self.window.handle_device_event(event);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}
