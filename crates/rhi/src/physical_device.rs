//! Physical device (GPU) selection.
//!
//! Selection works in three steps:
//! 1. Adapters missing a required feature get no score and are never chosen
//! 2. Adapters without a graphics+present queue family or the swapchain extension are skipped
//! 3. The rest are ranked by device type plus device-local memory, highest wins
//!
//! The scoring and queue-family ranking are pure functions over Vulkan
//! property structs so they can be tested without a GPU.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Device extensions the logical device cannot be created without.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] =
    [ash::khr::swapchain::NAME, ash::khr::maintenance1::NAME];

/// Score weight of a discrete GPU.
pub const DISCRETE_GPU_WEIGHT: u32 = 4000;
/// Score weight of an integrated GPU.
pub const INTEGRATED_GPU_WEIGHT: u32 = 1000;

/// Queue family indices used by the renderer.
///
/// `graphics_family` supports both graphics and presentation to the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for rendering and presentation.
    pub graphics_family: Option<u32>,
    /// Family used for uploads. May equal `graphics_family`.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Returns the unique queue family indices.
    ///
    /// One queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(transfer) = self.transfer_family
            && !families.contains(&transfer)
        {
            families.push(transfer);
        }
        families
    }

    /// Sharing mode for buffers and images touched by both queues.
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.unique_families().len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        }
    }
}

/// Rank of a queue family as an upload queue. 0 means unusable.
pub fn transfer_rank(flags: vk::QueueFlags) -> u32 {
    if !flags.contains(vk::QueueFlags::TRANSFER) {
        return 0;
    }
    let graphics = flags.contains(vk::QueueFlags::GRAPHICS);
    let compute = flags.contains(vk::QueueFlags::COMPUTE);
    match (graphics, compute) {
        (false, false) => 200,
        (false, true) => 100,
        _ => 50,
    }
}

/// Picks the graphics+present family and the best-ranked transfer family.
///
/// `supports_present` is queried per family index. Ties between transfer
/// families go to the lowest index.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut best_transfer_rank = 0;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && supports_present(i)
        {
            indices.graphics_family = Some(i);
        }

        // Graphics and compute families implicitly support transfer.
        let mut flags = family.queue_flags;
        if flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) {
            flags |= vk::QueueFlags::TRANSFER;
        }
        let rank = transfer_rank(flags);
        if rank > best_transfer_rank {
            best_transfer_rank = rank;
            indices.transfer_family = Some(i);
        }
    }

    indices
}

/// Names of required features the adapter lacks.
pub fn missing_features(features: &vk::PhysicalDeviceFeatures) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if features.fill_mode_non_solid == vk::FALSE {
        missing.push("fillModeNonSolid");
    }
    if features.sampler_anisotropy == vk::FALSE {
        missing.push("samplerAnisotropy");
    }
    if features.sample_rate_shading == vk::FALSE {
        missing.push("sampleRateShading");
    }
    if features.depth_clamp == vk::FALSE {
        missing.push("depthClamp");
    }
    missing
}

/// Feature set enabled on the logical device.
pub fn required_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(true)
        .sampler_anisotropy(true)
        .sample_rate_shading(true)
        .depth_clamp(true)
}

/// Total device-local heap size in bytes.
pub fn device_local_memory(memory: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum()
}

/// Scores an adapter. `None` if any required feature is missing; a
/// qualifying adapter may still score 0.
pub fn score_device(
    device_type: vk::PhysicalDeviceType,
    features: &vk::PhysicalDeviceFeatures,
    memory: &vk::PhysicalDeviceMemoryProperties,
) -> Option<u32> {
    if !missing_features(features).is_empty() {
        return None;
    }

    let type_weight = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DISCRETE_GPU_WEIGHT,
        vk::PhysicalDeviceType::INTEGRATED_GPU => INTEGRATED_GPU_WEIGHT,
        _ => 0,
    };

    let vram_mb = (device_local_memory(memory) / (1024 * 1024)).min(u32::MAX as u64) as u32;
    Some(type_weight.saturating_add(vram_mb))
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
    /// Device extensions that are supported.
    pub extensions: Vec<String>,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Whether the device supports an extension.
    pub fn supports_extension(&self, name: &CStr) -> bool {
        let name = name.to_string_lossy();
        self.extensions.iter().any(|ext| *ext == name)
    }

    /// Selection score, see [`score_device`].
    pub fn score(&self) -> Option<u32> {
        score_device(
            self.properties.device_type,
            &self.features,
            &self.memory_properties,
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the highest-scoring physical device that can render to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if every adapter lacks a required feature, a
/// graphics+present family or the swapchain extension.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    // SAFETY: The instance is live for the duration of the call.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;
    for device in devices {
        let info = query_device(instance, device, surface, surface_loader)?;
        let Some(score) = info.score() else {
            debug!(
                "GPU '{}' rejected: missing features {:?}",
                info.device_name(),
                missing_features(&info.features)
            );
            continue;
        };
        if info.queue_families.graphics_family.is_none() {
            debug!("GPU '{}' rejected: no graphics+present queue family", info.device_name());
            continue;
        }
        if !info.supports_extension(ash::khr::swapchain::NAME) {
            debug!("GPU '{}' rejected: no swapchain support", info.device_name());
            continue;
        }

        debug!(
            "GPU '{}' ({}) - Score: {}",
            info.device_name(),
            info.device_type_name(),
            score
        );
        if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((info, score));
        }
    }

    let (selected, score) = best.ok_or(RhiError::NoSuitableGpu)?;
    info!(
        "Selected GPU: '{}' ({}) - Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        score
    );
    Ok(selected)
}

fn query_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    // SAFETY: `device` was enumerated from this instance.
    let (properties, features, memory_properties, families, extensions) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_features(device),
            instance.get_physical_device_memory_properties(device),
            instance.get_physical_device_queue_family_properties(device),
            instance.enumerate_device_extension_properties(device)?,
        )
    };

    let queue_families = select_queue_families(&families, |i| {
        // SAFETY: `i` is a valid family index of `device`.
        unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        }
    });

    let extensions = extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn memory_with_heap(size: u64) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 1,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory
    }

    #[test]
    fn test_missing_feature_has_no_score() {
        let mut features = required_features();
        features.depth_clamp = vk::FALSE;
        let memory = memory_with_heap(8 * 1024 * 1024 * 1024);
        assert_eq!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU, &features, &memory),
            None
        );
        assert_eq!(missing_features(&features), vec!["depthClamp"]);
    }

    #[test]
    fn test_score_type_weights() {
        let features = required_features();
        let memory = memory_with_heap(1024 * 1024 * 1024);
        assert_eq!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU, &features, &memory),
            Some(4000 + 1024)
        );
        assert_eq!(
            score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, &features, &memory),
            Some(1000 + 1024)
        );
        assert_eq!(
            score_device(vk::PhysicalDeviceType::CPU, &features, &memory),
            Some(1024)
        );
    }

    #[test]
    fn test_qualifying_adapter_without_vram_still_scores() {
        let features = required_features();
        let memory = vk::PhysicalDeviceMemoryProperties::default();
        assert_eq!(
            score_device(vk::PhysicalDeviceType::CPU, &features, &memory),
            Some(0)
        );
        assert_eq!(
            score_device(vk::PhysicalDeviceType::OTHER, &features, &memory),
            Some(0)
        );
    }

    #[test]
    fn test_qualifying_adapter_beats_featureless_one() {
        let full = required_features();
        let partial = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        let big = memory_with_heap(24 * 1024 * 1024 * 1024);
        let small = memory_with_heap(256 * 1024 * 1024);

        let rejected = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, &partial, &big);
        let accepted = score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, &full, &small);
        assert_eq!(rejected, None);
        assert_eq!(accepted, Some(1000 + 256));
    }

    #[test]
    fn test_transfer_rank() {
        assert_eq!(transfer_rank(vk::QueueFlags::TRANSFER), 200);
        assert_eq!(
            transfer_rank(vk::QueueFlags::TRANSFER | vk::QueueFlags::COMPUTE),
            100
        );
        assert_eq!(
            transfer_rank(vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS),
            50
        );
        assert_eq!(transfer_rank(vk::QueueFlags::COMPUTE), 0);
    }

    #[test]
    fn test_select_prefers_dedicated_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = select_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.transfer_family, Some(2));
        assert_eq!(indices.sharing_mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_select_single_family_is_exclusive() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = select_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.transfer_family, Some(0));
        assert_eq!(indices.sharing_mode(), vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn test_select_requires_present_support() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        let indices = select_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_transfer_tie_goes_to_lowest_index() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = select_queue_families(&families, |_| true);
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_device_local_memory_ignores_host_heaps() {
        let mut memory = memory_with_heap(1024);
        memory.memory_heap_count = 2;
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 4096,
            flags: vk::MemoryHeapFlags::empty(),
        };
        assert_eq!(device_local_memory(&memory), 1024);
    }
}
