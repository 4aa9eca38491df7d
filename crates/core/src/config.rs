//! Engine configuration.
//!
//! Every field has a default, so a missing file or a partial TOML document
//! both produce a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Startup configuration for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial window width in pixels.
    pub width: u32,
    /// Initial window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Model loaded into the scene at startup.
    pub model_path: PathBuf,
    /// Texture used by meshes whose material declares no diffuse map.
    /// `None` leaves such meshes untextured.
    pub default_texture: Option<PathBuf>,
    /// SPIR-V vertex shader.
    pub vertex_shader: PathBuf,
    /// SPIR-V fragment shader for textured meshes.
    pub fragment_shader: PathBuf,
    /// SPIR-V fragment shader for meshes without a texture.
    pub untextured_fragment_shader: PathBuf,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub enable_validation: bool,
    /// Command run once before startup in debug builds, e.g. a shader compile script.
    pub shader_build_command: Option<String>,
    /// Scene loader worker count. `None` uses the available parallelism.
    pub loader_threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 1000,
            title: "Stimply Engine".to_string(),
            model_path: PathBuf::from("./Models/Sponza/sponza.obj"),
            default_texture: Some(PathBuf::from("Models/no_texture.png")),
            vertex_shader: PathBuf::from("./Shaders/vertexshader.spv"),
            fragment_shader: PathBuf::from("./Shaders/fragmentshader.spv"),
            untextured_fragment_shader: PathBuf::from("./Shaders/fragmentshader_untextured.spv"),
            enable_validation: cfg!(debug_assertions),
            shader_build_command: None,
            loader_threads: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("Loading configuration from {}", path.display());
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Width over height of the initial window.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}
