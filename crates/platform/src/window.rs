//! Window management using winit.
//!
//! The window owns the OS-side state (size, key state, cursor mode, frame
//! timer) and is the only producer of input events on the bus.

use std::cell::Cell;
use std::ffi::c_char;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::PhysicalKey;
use winit::window::{CursorGrabMode, Window as WinitWindow, WindowAttributes};

use stimply_core::{Error, Event, EventBus, EventKind, KeyCode, Result, Subscription, Timer};

use crate::input::InputState;

/// RAII wrapper for a Vulkan surface.
///
/// This struct owns a `vk::SurfaceKHR` handle and ensures it is properly destroyed
/// when dropped. The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension loader, for capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The surface was created by ash_window::create_surface from the
        // instance the loader was built with. This is the only place it is destroyed.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Application window.
///
/// Translates OS messages into [`Event`]s on the shared bus, tracks key state
/// and applies `HideCursor` / `ShowCursor` requests coming back over the bus.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    bus: EventBus,
    input: InputState,
    timer: Timer,
    cursor_hidden: Rc<Cell<bool>>,
    _cursor_subscription: Subscription,
}

impl Window {
    /// Create a new window with the given dimensions and title.
    pub fn new(
        event_loop: &ActiveEventLoop,
        width: u32,
        height: u32,
        title: &str,
        bus: &EventBus,
    ) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| Error::Window(e.to_string()))?,
        );

        let cursor_hidden = Rc::new(Cell::new(false));
        let cursor_subscription = {
            let window = Arc::clone(&window);
            let hidden = Rc::clone(&cursor_hidden);
            bus.subscribe(
                &[EventKind::HideCursor, EventKind::ShowCursor],
                move |event| {
                    let hide = matches!(event, Event::HideCursor);
                    apply_cursor_mode(&window, hide);
                    hidden.set(hide);
                },
            )
        };

        tracing::info!("Window created: {}x{} \"{}\"", width, height, title);

        Ok(Self {
            window,
            width,
            height,
            bus: bus.clone(),
            input: InputState::new(),
            timer: Timer::new(),
            cursor_hidden,
            _cursor_subscription: cursor_subscription,
        })
    }

    /// Translate a window message into state changes and bus events.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.bus.publish(Event::WindowClose),
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::Focused(false) => {
                for released in self.input.release_all() {
                    self.bus.publish(released);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    let pressed = event.state == ElementState::Pressed;
                    if let Some(translated) = self.input.on_key(code, pressed) {
                        self.bus.publish(translated);
                    }
                }
            }
            _ => {}
        }
    }

    /// Translate raw device input. Only mouse motion is of interest.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.bus.publish(Event::MouseMoved { dx: *dx, dy: *dy });
        }
    }

    /// Call at the start of each frame to clear per-frame input state.
    pub fn begin_frame(&mut self) {
        self.input.begin_frame();
    }

    /// Seconds since the previous call.
    pub fn delta_time(&mut self) -> f32 {
        self.timer.mark()
    }

    /// Current key state.
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Check if a key is currently held.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.input.is_key_pressed(key)
    }

    /// Whether the cursor is hidden and captured.
    pub fn is_cursor_hidden(&self) -> bool {
        self.cursor_hidden.get()
    }

    /// Show or hide the cursor directly, bypassing the bus.
    pub fn set_cursor_visible(&self, visible: bool) {
        apply_cursor_mode(&self.window, !visible);
        self.cursor_hidden.set(!visible);
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current framebuffer size.
    pub fn inner_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the current width of the window.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the current height of the window.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Update the stored dimensions (call this when handling resize events).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Get the aspect ratio of the window.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions the windowing system needs for surface creation.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        required_extensions(display_handle.as_raw())
    }

    /// Create a Vulkan surface for this window.
    ///
    /// Returns a RAII [`Surface`] wrapper that automatically destroys the surface when dropped.
    /// The instance must outlive the returned surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The entry and instance are valid references provided by the caller.
        // The display and window handles come from a live winit window.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Renderer(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

fn apply_cursor_mode(window: &WinitWindow, hidden: bool) {
    window.set_cursor_visible(!hidden);
    let result = if hidden {
        window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
    } else {
        window.set_cursor_grab(CursorGrabMode::None)
    };
    if let Err(e) = result {
        tracing::warn!("Cursor grab not supported: {}", e);
    }
}

/// Get the required Vulkan instance extensions for surface creation on the current platform.
///
/// The returned pointers reference static strings owned by `ash_window` and stay
/// valid for the lifetime of the program.
pub fn required_extensions(
    display_handle: raw_window_handle::RawDisplayHandle,
) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Renderer(format!("Failed to enumerate required extensions: {}", e)))?;

    tracing::debug!(
        "Required Vulkan extensions for surface: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window guarantees these are valid, null-terminated static strings.
            .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}
