//! Diffuse texture resolution.
//!
//! A mesh is textured with, in order of preference:
//!
//! 1. its material's diffuse texture, relative to the model's directory
//! 2. the configured default texture
//!
//! A material texture missing on disk falls through to the default. A
//! missing default becomes a 1x1 white placeholder. A file that exists but
//! does not decode is an error.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ResourceResult;
use crate::model::ImportedMaterial;
use crate::texture::TextureData;

/// Where a mesh's diffuse texture comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureSource {
    Material(PathBuf),
    Default(PathBuf),
}

/// Picks the texture file for a mesh. `None` means the mesh is untextured.
pub fn resolve_diffuse_texture(
    model_dir: &Path,
    material: Option<&ImportedMaterial>,
    default_texture: Option<&Path>,
) -> Option<TextureSource> {
    if let Some(relative) = material.and_then(|m| m.diffuse_texture.as_deref()) {
        // MTL files written on Windows use backslash separators.
        let path = model_dir.join(relative.replace('\\', "/"));
        if path.exists() {
            return Some(TextureSource::Material(path));
        }
        warn!("Diffuse texture {:?} not found, using default", path);
    }
    default_texture.map(|path| TextureSource::Default(path.to_path_buf()))
}

/// Decodes the resolved texture.
pub fn load_diffuse_texture(source: Option<&TextureSource>) -> ResourceResult<Option<TextureData>> {
    match source {
        None => Ok(None),
        Some(TextureSource::Material(path)) => TextureData::load(path).map(Some),
        Some(TextureSource::Default(path)) if !path.exists() => {
            warn!(
                "Default texture {:?} not found, using a white placeholder",
                path
            );
            Ok(Some(TextureData::placeholder()))
        }
        Some(TextureSource::Default(path)) => TextureData::load(path).map(Some),
    }
}
