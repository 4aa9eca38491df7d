//! Texture decoding into tightly packed RGBA8.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Decoded RGBA8 pixels, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decodes an image file. Any channel layout is expanded to RGBA8.
    ///
    /// # Errors
    ///
    /// [`ResourceError::FileNotFound`] if the file is missing, or the image
    /// decoder's error.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Decoded texture {:?}: {}x{}", path, width, height);
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// 1x1 opaque white, used when the default texture is missing.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        }
    }

    /// Size of the pixel data in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
