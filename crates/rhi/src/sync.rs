//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders work between queue operations
//! - [`Fence`] lets the host wait for GPU work
//! - [`FrameSync`] bundles the objects one frame slot needs
//!
//! All host waits in the engine are unbounded (`u64::MAX`).

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: The device is live.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: The owner guarantees no pending operation references the semaphore.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Frame slots create their fence signaled so the first wait passes; one-shot
/// upload fences start unsignaled.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: The device is live.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled.
    pub fn wait(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: The fence belongs to this device.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, u64::MAX)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: See the method contract.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: The owner waited for any submission signaling this fence.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame slot.
///
/// ```text
/// 1. Wait graphics_fence, then reset it
/// 2. Acquire a swapchain image, signaling image_acquired
/// 3. Submit: wait image_acquired at COLOR_ATTACHMENT_OUTPUT,
///    signal queue_submitted and graphics_fence
/// 4. Present, waiting on queue_submitted
/// ```
pub struct FrameSync {
    /// Signaled when the swapchain image is ready.
    image_acquired: Semaphore,
    /// Signaled when the slot's commands finish executing.
    queue_submitted: Semaphore,
    /// Host-side completion of the slot's submission. Created signaled.
    graphics_fence: Fence,
}

impl FrameSync {
    /// Creates the semaphores and a signaled fence.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            queue_submitted: Semaphore::new(device.clone())?,
            graphics_fence: Fence::new(device, true)?,
        })
    }

    /// Semaphore signaled by image acquisition.
    #[inline]
    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    /// Semaphore signaled by the graphics submission.
    #[inline]
    pub fn queue_submitted(&self) -> &Semaphore {
        &self.queue_submitted
    }

    /// Fence signaled by the graphics submission.
    #[inline]
    pub fn graphics_fence(&self) -> &Fence {
        &self.graphics_fence
    }
}
