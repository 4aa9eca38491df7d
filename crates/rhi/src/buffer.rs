//! GPU buffer management.
//!
//! [`Buffer`] wraps a VkBuffer with gpu-allocator managed memory. Host-visible
//! buffers stay persistently mapped for their whole lifetime, so uniform
//! updates are plain memory copies.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{find_memory_type, memory_location};

/// GPU buffer wrapper with managed memory.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// Usage flags the buffer was created with.
    usage: vk::BufferUsageFlags,
    /// Requested memory properties.
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// The sharing mode follows the device: exclusive when graphics and
    /// transfer share a family, concurrent over both otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoCompatibleMemory`] if no memory type satisfies
    /// the request, or the Vulkan/allocator error otherwise.
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let families = device.concurrent_family_indices();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(device.sharing_mode())
            .queue_family_indices(&families);

        // SAFETY: The create info is fully initialized and the device is live.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // SAFETY: `buffer` was just created from this device.
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        if let Err(e) =
            find_memory_type(device.memory_properties(), requirements.memory_type_bits, properties)
        {
            // SAFETY: The buffer has no memory bound and is not in use.
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(e);
        }

        let allocation = {
            let mut allocator = device.allocator();
            allocator.allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location: memory_location(properties),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: As above, nothing references the buffer yet.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        // SAFETY: The allocation satisfies the buffer's requirements.
        let bound = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            if let Err(free_err) = device.allocator().free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", free_err);
            }
            // SAFETY: Binding failed, so nothing references the buffer.
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        debug!("Created buffer: {} bytes, usage {:?}", size, usage);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            properties,
        })
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// The buffer must be host-visible.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer memory is not mapped
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        // SAFETY: The range was bounds-checked above and the mapping lives as
        // long as the allocation.
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the usage flags.
    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory properties requested at creation.
    #[inline]
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        // SAFETY: The owner guarantees the GPU no longer uses the buffer.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}
