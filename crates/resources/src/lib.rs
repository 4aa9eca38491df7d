//! Asset loading for Stimply Engine.
//!
//! - [`importer`] reads OBJ and glTF models into [`ImportedModel`]
//! - [`model`] holds the imported data and the left-handed post-processing
//! - [`texture`] decodes images into RGBA8
//! - [`material`] resolves which texture a mesh uses

mod error;

pub mod importer;
pub mod material;
pub mod model;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use importer::{ModelFormat, import_model};
pub use material::{TextureSource, load_diffuse_texture, resolve_diffuse_texture};
pub use model::{ImportedMaterial, ImportedMesh, ImportedModel, ImportedNode};
pub use texture::TextureData;
