//! Depth buffer management.
//!
//! The depth attachment shared by every framebuffer. Its format is chosen once
//! at startup from [`DEPTH_FORMAT_CANDIDATES`] and kept across swapchain
//! recreations; only the image is rebuilt for the new extent.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use stimply_rhi::device::Device;
use stimply_rhi::image::Image;
use stimply_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 2] =
    [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT];

/// Picks the first candidate `supports` accepts.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    supports: impl Fn(vk::Format) -> bool,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| supports(format))
        .ok_or(RhiError::NoDepthFormat)
}

/// Picks the depth format with optimal-tiling depth-attachment support.
///
/// # Errors
///
/// [`RhiError::NoDepthFormat`] if no candidate qualifies.
pub fn select_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        // SAFETY: The physical device belongs to `instance`.
        let properties =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })?;
    info!("Depth format: {:?}", format);
    Ok(format)
}

/// Aspect mask for a depth format: depth, plus stencil when it has one.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Depth image and view sized to the swapchain.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        let image = Image::new(
            device,
            extent.width,
            extent.height,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect(format),
        )?;
        debug!(
            "Created depth buffer: {}x{} {:?}",
            extent.width, extent.height, format
        );
        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
