//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorLayoutKind`] names the three set layouts the shaders use
//! - [`PipelineLayoutKind`] names the two ways those sets combine
//! - [`DescriptorSetLayout`] and [`DescriptorPool`] wrap the Vulkan objects
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stimply_rhi::device::Device;
//! use stimply_rhi::descriptor::{DescriptorLayoutKind, DescriptorPool, DescriptorSetLayout};
//!
//! # fn example(device: Arc<Device>) -> Result<(), stimply_rhi::RhiError> {
//! let layout = DescriptorSetLayout::for_kind(device.clone(), DescriptorLayoutKind::Mvp)?;
//! let pool = DescriptorPool::per_thread(device.clone())?;
//! let sets = pool.allocate(&[layout.handle(), layout.handle()])?;
//! pool.free(&sets)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Maximum descriptor sets in one per-thread pool.
pub const POOL_MAX_SETS: u32 = 1000;

/// Descriptors of each type in one per-thread pool.
pub const POOL_DESCRIPTORS_PER_TYPE: u32 = 10_000;

/// Descriptor set layouts used by the mesh shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorLayoutKind {
    /// Binding 0: uniform buffer, vertex stage.
    Mvp,
    /// Binding 0: uniform buffer, fragment stage.
    Light,
    /// Binding 0: uniform buffer; binding 1: combined image sampler. Fragment stage.
    LightTexture,
}

impl DescriptorLayoutKind {
    pub const ALL: [DescriptorLayoutKind; 3] = [Self::Mvp, Self::Light, Self::LightTexture];

    /// Layout bindings of this kind.
    pub fn bindings(self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        match self {
            Self::Mvp => vec![DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX,
            )],
            Self::Light => vec![DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::FRAGMENT,
            )],
            Self::LightTexture => vec![
                DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT),
                DescriptorBindingBuilder::combined_image_sampler(
                    1,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
        }
    }

    /// Whether sets of this kind carry a texture binding.
    #[inline]
    pub fn is_textured(self) -> bool {
        self == Self::LightTexture
    }
}

/// Pipeline layouts: set 0 is always [`DescriptorLayoutKind::Mvp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineLayoutKind {
    /// `[Mvp, LightTexture]`
    MvpLightTexture,
    /// `[Mvp, Light]`
    MvpLight,
}

impl PipelineLayoutKind {
    pub const ALL: [PipelineLayoutKind; 2] = [Self::MvpLightTexture, Self::MvpLight];

    /// Set layouts in set-index order.
    pub fn set_layouts(self) -> [DescriptorLayoutKind; 2] {
        match self {
            Self::MvpLightTexture => [DescriptorLayoutKind::Mvp, DescriptorLayoutKind::LightTexture],
            Self::MvpLight => [DescriptorLayoutKind::Mvp, DescriptorLayoutKind::Light],
        }
    }

    /// Pipeline layout matching a mesh's fragment set.
    pub fn for_fragment_layout(fragment: DescriptorLayoutKind) -> Self {
        if fragment.is_textured() {
            Self::MvpLightTexture
        } else {
            Self::MvpLight
        }
    }
}

/// Wrapper for VkDescriptorSetLayout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from explicit bindings.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        // SAFETY: The bindings outlive the call.
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Creates the layout for one of the engine's set kinds.
    pub fn for_kind(device: Arc<Device>, kind: DescriptorLayoutKind) -> RhiResult<Self> {
        Self::new(device, &kind.bindings())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: Pipeline layouts referencing this layout are gone.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Wrapper for VkDescriptorPool with `FREE_DESCRIPTOR_SET`.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        // SAFETY: The pool sizes outlive the call.
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool sized for one loader thread.
    pub fn per_thread(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(device, POOL_MAX_SETS, &per_thread_pool_sizes())
    }

    /// Allocates one set per entry of `layouts`.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        // SAFETY: The layouts are live and the pool is externally synchronized
        // by its owner.
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Returns sets to the pool. The sets must not be in use by the GPU.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        // SAFETY: See the method contract.
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: Destroying the pool frees every set still allocated from it.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Pool sizes for one loader thread: uniform buffers and combined image samplers.
pub fn per_thread_pool_sizes() -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(POOL_DESCRIPTORS_PER_TYPE),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(POOL_DESCRIPTORS_PER_TYPE),
    ]
}

/// Applies descriptor writes.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }
    // SAFETY: Every write references live sets and resources.
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Shorthand constructors for single-descriptor bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}
