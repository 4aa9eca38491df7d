//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct provides:
//! - Surface capability querying
//! - The required format check (R8G8B8A8_UNORM / SRGB_NONLINEAR) and present mode selection
//! - Image view creation and management
//! - Recreation on resize
//!
//! A surface whose current extent is 0×0 (minimized window) yields an *empty*
//! swapchain: no handle, no images. That is "not presentable right now", not
//! an error; the renderer skips frames until a later recreation succeeds.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;

/// The only surface format the renderer presents to.
pub const REQUIRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Present modes in order of preference.
pub const PRESENT_MODE_PREFERENCE: [vk::PresentModeKHR; 3] = [
    vk::PresentModeKHR::IMMEDIATE,
    vk::PresentModeKHR::MAILBOX,
    vk::PresentModeKHR::FIFO,
];

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        // SAFETY: The surface and physical device belong to the loader's instance.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Checks if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Whether the surface currently has no drawable area.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        is_degenerate_extent(self.capabilities.current_extent)
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and its image views. Swapchain images belong to
/// the swapchain itself.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Surface extension loader, kept for recreation queries
    surface_loader: ash::khr::surface::Instance,
    /// Target surface
    surface: vk::SurfaceKHR,
    /// Swapchain handle, null while empty
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    /// Swapchain image format
    format: vk::Format,
    /// Swapchain extent (resolution)
    extent: vk::Extent2D,
    /// Present mode
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - The surface does not offer R8G8B8A8_UNORM / SRGB_NONLINEAR
    /// - Swapchain or image view creation fails
    pub fn new(
        instance: &ash::Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device.handle());
        let mut swapchain = Self {
            device,
            swapchain_loader,
            surface_loader: surface_loader.clone(),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: REQUIRED_SURFACE_FORMAT.format,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
        };
        swapchain.create(width, height)?;
        Ok(swapchain)
    }

    fn create(&mut self, width: u32, height: u32) -> Result<(), RhiError> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        if support.is_degenerate() {
            debug!("Surface extent is 0x0, leaving swapchain empty");
            self.extent = vk::Extent2D::default();
            return Ok(());
        }

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = require_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        // Only the graphics queue touches swapchain images.
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        // SAFETY: The surface is live and the create info references only locals.
        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        // SAFETY: `swapchain` was just created.
        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(&self.device, &images, surface_format.format)?;

        self.swapchain = swapchain;
        self.images = images;
        self.image_views = image_views;
        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;

        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Destroys the current swapchain and builds a new one for the given size.
    ///
    /// The caller must have waited for the device to go idle.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<(), RhiError> {
        info!("Recreating swapchain for size: {}x{}", width, height);
        self.destroy();
        self.create(width, height)
    }

    /// Whether there are no images to render to.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.swapchain == vk::SwapchainKHR::null()
    }

    /// Acquires the next swapchain image.
    ///
    /// Returns `(image_index, suboptimal)`. `ERROR_OUT_OF_DATE_KHR` is passed
    /// through for the caller to recreate.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        if self.is_empty() {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        // SAFETY: The swapchain and semaphore are live; the semaphore is unsignaled.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents an image on the graphics queue.
    ///
    /// Returns true if the swapchain is suboptimal and should be recreated.
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        self.device.present(&self.swapchain_loader, &present_info)
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns all image views.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy(&mut self) {
        for &image_view in &self.image_views {
            // SAFETY: The views are not referenced by any in-flight work.
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
        self.images.clear();

        if !self.is_empty() {
            // SAFETY: No acquired image of this swapchain is still pending.
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let had_images = !self.is_empty();
        self.destroy();
        if had_images {
            info!(
                "Swapchain destroyed (was {}x{})",
                self.extent.width, self.extent.height
            );
        }
    }
}

/// Whether an extent has no drawable area.
#[inline]
pub fn is_degenerate_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Returns the required surface format, or an error naming it if absent.
pub fn require_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, RhiError> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == REQUIRED_SURFACE_FORMAT.format
                && f.color_space == REQUIRED_SURFACE_FORMAT.color_space
        })
        .ok_or_else(|| RhiError::UnsupportedSurfaceFormat("R8G8B8A8_UNORM / SRGB_NONLINEAR".to_string()))
}

/// Chooses the first available mode of [`PRESENT_MODE_PREFERENCE`].
///
/// FIFO is guaranteed by Vulkan and is the fallback.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let mode = PRESENT_MODE_PREFERENCE
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO);
    debug!("Selected present mode {:?}", mode);
    mode
}

/// Chooses the swapchain extent.
///
/// Uses the current extent when the surface defines one, otherwise clamps the
/// window size to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum image count, capped by the maximum (0 = no cap).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Creates color image views for swapchain images.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        // SAFETY: `image` belongs to a live swapchain on this device.
        let view = unsafe { device.handle().create_image_view(&create_info, None) };
        match view {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    // SAFETY: Views created above are not yet in use.
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}
