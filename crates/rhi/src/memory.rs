//! Memory type selection.
//!
//! gpu-allocator picks memory types itself; [`find_memory_type`] is used to
//! validate a request up front so an impossible combination fails with a
//! typed error naming the filter and flags.

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::{RhiError, RhiResult};

/// Index of the first memory type allowed by `type_filter` whose flags contain `properties`.
///
/// Bit *i* of `type_filter` set means memory type *i* is acceptable.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory
        .memory_types
        .iter()
        .take(memory.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            (type_filter & (1 << i)) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
        .ok_or(RhiError::NoCompatibleMemory {
            type_filter,
            properties,
        })
}

/// Allocator location for a set of memory property flags.
///
/// Device-local requests map to `GpuOnly`; everything else is host-visible
/// and persistently mapped (`CpuToGpu`).
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
        && !properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    {
        MemoryLocation::GpuOnly
    } else {
        MemoryLocation::CpuToGpu
    }
}

/// Rounds `size` up to a multiple of `alignment` (a power of two, or 0/1 for none).
pub fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            memory.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        memory
    }

    #[test]
    fn test_find_memory_type_respects_filter_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host,
        ]);

        assert_eq!(find_memory_type(&memory, 0b111, host).unwrap(), 1);
        // Type 1 excluded by the filter
        assert_eq!(find_memory_type(&memory, 0b101, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&memory, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_no_match() {
        let memory = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&memory, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap_err();
        assert!(matches!(err, RhiError::NoCompatibleMemory { type_filter: 1, .. }));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut memory = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        memory.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&memory, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn test_memory_location() {
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(320, 256), 512);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(80, 64), 128);
        assert_eq!(align_up(7, 0), 7);
    }
}
