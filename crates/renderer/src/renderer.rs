//! Main renderer orchestration.
//!
//! [`Renderer`] brings the device up in a fixed order, owns the presentation
//! chain, installs one graphics pipeline per pipeline layout on the
//! [`GpuDevice`] and records each frame:
//!
//! ```text
//! begin_frame  -> wait slot, acquire, begin render pass, advance camera
//! render_frame -> draw the scene tree (each mesh binds its pipeline), overlay.draw
//! end_frame    -> overlay.end_frame, submit, present
//! ```
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order: render target, the [`GpuDevice`] with
//! its pipelines, the logical device handle, the surface and finally the
//! instance. Scenes hold their own `Arc<GpuDevice>` and must be dropped
//! before the renderer.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use tracing::{debug, info};

use stimply_core::{EngineConfig, Event, EventBus, EventKind, Result, Subscription};
use stimply_platform::{InputState, KeyCode, Surface, Window};
use stimply_rhi::device::Device;
use stimply_rhi::instance::Instance;
use stimply_rhi::physical_device::select_physical_device;
use stimply_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder};
use stimply_rhi::shader::{Shader, ShaderStage};
use stimply_rhi::swapchain::Swapchain;
use stimply_rhi::vk;
use stimply_rhi::{PipelineLayoutKind, RhiResult, Vertex};
use stimply_scene::{CameraInput, FlyCamera, FrameGlobals, PointLight, Scene};

use crate::depth_buffer::select_depth_format;
use crate::frame::FrameSlots;
use crate::gpu_device::GpuDevice;
use crate::overlay::{OverlayState, UiOverlay};
use crate::render_target::{RenderTarget, frame_slot_count};

/// Position of the light the renderer starts with.
pub const INITIAL_LIGHT_POSITION: Vec3 = Vec3::new(0.0, 28.0, 0.0);

/// Camera movement flags from the current key state.
pub fn camera_input(input: &InputState) -> CameraInput {
    CameraInput {
        forward: input.is_key_pressed(KeyCode::KeyW),
        back: input.is_key_pressed(KeyCode::KeyS),
        left: input.is_key_pressed(KeyCode::KeyA),
        right: input.is_key_pressed(KeyCode::KeyD),
        up: input.is_key_pressed(KeyCode::Space),
        down: input.is_key_pressed(KeyCode::ControlLeft)
            || input.is_key_pressed(KeyCode::ControlRight),
        fast: input.is_key_pressed(KeyCode::ShiftLeft)
            || input.is_key_pressed(KeyCode::ShiftRight),
    }
}

/// Subscribes `camera` to mouse motion and cursor capture events.
pub fn subscribe_camera(bus: &EventBus, camera: &Rc<RefCell<FlyCamera>>) -> Subscription {
    let camera = Rc::clone(camera);
    bus.subscribe(
        &[EventKind::MouseMoved, EventKind::HideCursor, EventKind::ShowCursor],
        move |event| {
            let mut camera = camera.borrow_mut();
            match *event {
                Event::MouseMoved { dx, dy } => camera.process_mouse(dx, dy),
                Event::HideCursor => camera.set_captured(true),
                Event::ShowCursor => camera.set_captured(false),
                _ => {}
            }
        },
    )
}

/// Vulkan renderer for one window.
pub struct Renderer {
    _camera_subscription: Subscription,
    target: RenderTarget,
    slots: FrameSlots,
    gpu: Arc<GpuDevice>,
    device: Arc<Device>,
    surface: Surface,
    _instance: Instance,

    camera: Rc<RefCell<FlyCamera>>,
    lights: Vec<PointLight>,
    view: Mat4,
    proj: Mat4,
    frame_dt: f32,
}

impl Renderer {
    /// Initializes Vulkan for `window`.
    ///
    /// # Errors
    ///
    /// Any failure of the initialization sequence, typed by layer.
    pub fn new(window: &Window, config: &EngineConfig, bus: &EventBus) -> Result<Self> {
        let (width, height) = window.inner_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&extensions, config.enable_validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Selected GPU: {} ({})",
            physical_device.device_name(),
            physical_device.device_type_name()
        );
        let device = Device::new(&instance, &physical_device)?;

        let swapchain = Swapchain::new(
            instance.handle(),
            device.clone(),
            surface.handle(),
            surface.loader(),
            width,
            height,
        )?;
        let frame_slots = frame_slot_count(swapchain.image_count());
        let depth_format = select_depth_format(instance.handle(), physical_device.device)?;
        let target = RenderTarget::new(
            device.clone(),
            swapchain,
            depth_format,
            frame_slots,
            (width, height),
        )?;

        let loader_threads = config
            .loader_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1);
        let gpu = Arc::new(GpuDevice::new(device.clone(), frame_slots, loader_threads)?);

        install_pipelines(&gpu, &target, config)?;

        let mut camera = FlyCamera::new(config.aspect_ratio());
        camera.set_aspect(window.aspect_ratio());
        let camera = Rc::new(RefCell::new(camera));
        let camera_subscription = subscribe_camera(bus, &camera);

        let lights =
            vec![PointLight::new(INITIAL_LIGHT_POSITION).with_attenuation(1.0, 0.08, 0.01)];

        info!("Renderer initialized: {} frame slot(s)", frame_slots);

        Ok(Self {
            _camera_subscription: camera_subscription,
            target,
            slots: FrameSlots::new(frame_slots),
            gpu,
            device,
            surface,
            _instance: instance,
            camera,
            lights,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            frame_dt: 0.0,
        })
    }

    /// Starts a frame. Returns false when the frame is skipped (degenerate
    /// surface or out-of-date swapchain).
    pub fn begin_frame(
        &mut self,
        dt: f32,
        input: &InputState,
        overlay: &mut dyn UiOverlay,
    ) -> Result<bool> {
        if self.slots.begin(&mut self.target)?.is_none() {
            return Ok(false);
        }

        {
            let mut camera = self.camera.borrow_mut();
            camera.update(dt, &camera_input(input));
            self.view = camera.view_matrix();
            self.proj = camera.projection_matrix();
        }
        self.frame_dt = dt;

        overlay.new_frame(dt);
        Ok(true)
    }

    /// Records `scene` and the overlay into the current frame.
    pub fn render_frame(
        &mut self,
        scene: &Scene<GpuDevice>,
        overlay: &mut dyn UiOverlay,
    ) -> Result<()> {
        let Some(frame) = self.slots.active() else {
            return Ok(());
        };

        let cmd = self.target.command_buffer(frame.slot);
        let globals = FrameGlobals::new(self.view, self.proj, &self.lights);
        scene.draw(cmd, frame.slot, &globals)?;

        let (pitch, yaw) = {
            let camera = self.camera.borrow();
            (camera.pitch, camera.yaw)
        };
        let mut state = OverlayState {
            lights: &mut self.lights,
            camera_pitch: pitch,
            camera_yaw: yaw,
            dt: self.frame_dt,
        };
        overlay.draw(&mut state);
        Ok(())
    }

    /// Closes, submits and presents the current frame.
    pub fn end_frame(&mut self, overlay: &mut dyn UiOverlay) -> Result<()> {
        if let Some(frame) = self.slots.active() {
            overlay.end_frame(self.target.command_buffer(frame.slot));
        }
        self.slots.end(&mut self.target)?;
        Ok(())
    }

    /// Records the new window size. The swapchain is rebuilt after the next
    /// present, or earlier on an out-of-date report.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug!("Renderer resize to {}x{}", width, height);
        self.target.set_window_size(width, height);
        if width > 0 && height > 0 {
            self.camera
                .borrow_mut()
                .set_aspect(width as f32 / height as f32);
        }
    }

    /// Device handle scenes are built against.
    #[inline]
    pub fn gpu(&self) -> &Arc<GpuDevice> {
        &self.gpu
    }

    #[inline]
    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    #[inline]
    pub fn lights_mut(&mut self) -> &mut Vec<PointLight> {
        &mut self.lights
    }

    #[inline]
    pub fn camera(&self) -> &Rc<RefCell<FlyCamera>> {
        &self.camera
    }

    #[inline]
    pub fn frame_slots(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Destroying renderer...");
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle: {}", e);
        }
    }
}

/// Fragment shader drawn with the pipeline on `kind`.
fn fragment_shader_path(config: &EngineConfig, kind: PipelineLayoutKind) -> &Path {
    match kind {
        PipelineLayoutKind::MvpLightTexture => &config.fragment_shader,
        PipelineLayoutKind::MvpLight => &config.untextured_fragment_shader,
    }
}

/// Builds one pipeline per pipeline layout and hands them to `gpu`.
fn install_pipelines(
    gpu: &GpuDevice,
    target: &RenderTarget,
    config: &EngineConfig,
) -> RhiResult<()> {
    let device = gpu.device().clone();
    let vertex_shader =
        Shader::from_spirv_file(device.clone(), &config.vertex_shader, ShaderStage::Vertex)?;

    for kind in PipelineLayoutKind::ALL {
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            fragment_shader_path(config, kind),
            ShaderStage::Fragment,
        )?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::Clockwise)
            .depth_test(true, true, vk::CompareOp::LESS)
            .render_pass(target.render_pass().handle(), 0)
            .build(device.clone(), gpu.pipeline_layout(kind))?;

        gpu.install_pipeline(kind, pipeline);
        info!("Graphics pipeline created for {:?}", kind);
    }
    Ok(())
}
