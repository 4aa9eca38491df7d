//! 2D images with a view, allocator-managed memory and a tracked layout.
//!
//! [`Image`] backs both sampled textures and the depth attachment. The
//! current layout is recorded on the struct so barriers know their source
//! layout without the caller carrying it around.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Optimal-tiling 2D image with one mip level and one layer.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
}

impl Image {
    /// Creates a device-local image and its view. The initial layout is
    /// `UNDEFINED`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero or any Vulkan or allocator call fails.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let families = device.concurrent_family_indices();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(device.sharing_mode())
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: The create info is complete and the device is live.
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        // SAFETY: `image` was just created from this device.
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator();
            allocator.allocate(&AllocationCreateDesc {
                name: "image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: Nothing references the image yet.
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            format,
            extent: vk::Extent2D { width, height },
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
        };

        // From here on `Drop` cleans up whatever has been created.
        if let Some(allocation) = this.allocation.as_ref() {
            // SAFETY: The allocation satisfies the image's requirements.
            unsafe {
                this.device.handle().bind_image_memory(
                    this.image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(this.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(this.subresource_range());
        // SAFETY: The image is bound to memory.
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        debug!("Created image {}x{} ({:?})", width, height, format);

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Layout after the last recorded barrier.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Whole-image subresource range for this image's aspect.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1)
    }

    /// Builds the barrier for a transition to `new_layout` and records the
    /// new layout as current. Returns the barrier with its stage masks.
    pub fn transition(
        &mut self,
        new_layout: vk::ImageLayout,
    ) -> (vk::ImageMemoryBarrier<'static>, vk::PipelineStageFlags, vk::PipelineStageFlags) {
        let masks = transition_masks(self.layout, new_layout);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range())
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);
        self.layout = new_layout;
        (barrier, masks.src_stage, masks.dst_stage)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // View first, then memory, then the image handle.
        // SAFETY: The owner guarantees the GPU no longer uses the image.
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }

        // SAFETY: As above.
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
    }
}

/// Access and stage masks of a layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Masks for the transitions the engine performs.
///
/// Unknown pairs fall back to a full `ALL_COMMANDS` barrier.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> TransitionMasks {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        // Uploads may run on a transfer-only queue with no shader stages. The
        // upload fence orders the first sampled read.
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::empty(),
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            }
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            }
        }
        _ => TransitionMasks {
            src_access: vk::AccessFlags::MEMORY_WRITE,
            dst_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            src_stage: vk::PipelineStageFlags::ALL_COMMANDS,
            dst_stage: vk::PipelineStageFlags::ALL_COMMANDS,
        },
    }
}
