//! Uniform buffer layouts shared with the shaders.
//!
//! Both structs are laid out for std140. Each mesh keeps one slot of each per
//! frame in flight, at a stride rounded up to the device's uniform offset
//! alignment.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::light::PointLight;

/// Vertex-stage transforms (set 0, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MvpUniform {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    /// `proj * view * model`, precomputed on the CPU.
    pub mvp: Mat4,
}

impl MvpUniform {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model,
            view,
            proj,
            mvp: proj * view * model,
        }
    }
}

impl Default for MvpUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Fragment-stage point light (set 1, binding 0). 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FragmentUniform {
    pub light_pos: Vec3,
    pub constant: f32,
    pub light_color: Vec3,
    pub linear: f32,
    pub quadratic: f32,
    pub _padding: [f32; 7],
}

const _: () = assert!(std::mem::size_of::<FragmentUniform>() == 64);

impl From<&PointLight> for FragmentUniform {
    fn from(light: &PointLight) -> Self {
        Self {
            light_pos: light.position,
            constant: light.constant,
            light_color: light.color,
            linear: light.linear,
            quadratic: light.quadratic,
            _padding: [0.0; 7],
        }
    }
}

impl Default for FragmentUniform {
    fn default() -> Self {
        Self::from(&PointLight::default())
    }
}

/// Per-frame inputs every mesh reads while drawing.
#[derive(Clone, Copy, Debug)]
pub struct FrameGlobals<'a> {
    pub view: Mat4,
    pub proj: Mat4,
    /// Only the first light is shaded.
    pub lights: &'a [PointLight],
}

impl<'a> FrameGlobals<'a> {
    pub fn new(view: Mat4, proj: Mat4, lights: &'a [PointLight]) -> Self {
        Self { view, proj, lights }
    }

    /// Fragment uniform for the shaded light, or the default light if the
    /// list is empty.
    pub fn fragment_uniform(&self) -> FragmentUniform {
        self.lights
            .first()
            .map(FragmentUniform::from)
            .unwrap_or_default()
    }
}
