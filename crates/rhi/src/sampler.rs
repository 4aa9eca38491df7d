//! Texture sampler.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Owned VkSampler.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, LOD 0..1, white border,
    /// anisotropy off.
    pub fn linear_repeat(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = linear_repeat_info();
        // SAFETY: The device is live.
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created linear/repeat sampler");
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // SAFETY: Descriptor sets referencing the sampler are no longer in use.
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

fn linear_repeat_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(1.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .unnormalized_coordinates(false)
}
