//! Scene graph and components.
//!
//! This crate provides scene management:
//! - [`Mesh`] uploads geometry and owns per-frame uniforms
//! - [`Scene`] imports a model, builds its meshes on a worker pool and draws
//!   the node tree
//! - [`FlyCamera`] and [`PointLight`] drive the frame uniforms
//!
//! Everything GPU-facing is generic over [`stimply_rhi::GpuContext`].

mod error;
mod loader;

pub mod camera;
pub mod light;
pub mod mesh;
pub mod scene;
pub mod ubo;

#[cfg(test)]
mod testing;

pub use camera::{CameraInput, FlyCamera, Perspective};
pub use error::{SceneError, SceneResult};
pub use light::PointLight;
pub use loader::{SceneLoadOptions, partition, worker_count};
pub use mesh::{Mesh, MeshData};
pub use scene::{MeshId, Node, Scene};
pub use ubo::{FragmentUniform, FrameGlobals, MvpUniform};
