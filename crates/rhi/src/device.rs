//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct owns:
//! - The logical device with the required features and extensions enabled
//! - One queue per unique family (graphics+present, transfer)
//! - Memory allocation via gpu-allocator
//!
//! `VkQueue` requires external synchronization, so every submission goes
//! through a per-queue mutex. When the transfer family equals the graphics
//! family both roles share one queue and one mutex.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::{Instance, first_missing};
use crate::physical_device::{
    PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS, required_features,
};

/// Extensions enabled when present, skipped silently otherwise.
const OPTIONAL_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::ext::memory_budget::NAME];

/// Queue role used to pick the queue and its lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    /// Rendering and presentation.
    Graphics,
    /// Staging uploads.
    Transfer,
}

struct QueueSlot {
    family: u32,
    queue: vk::Queue,
    lock: Mutex<()>,
}

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared across threads using `Arc`. The allocator and
/// each queue are guarded by their own `Mutex`.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator. Dropped explicitly before the device.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// One entry per unique queue family.
    queues: Vec<QueueSlot>,
    graphics_slot: usize,
    transfer_slot: usize,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
    /// Cached device limits.
    limits: vk::PhysicalDeviceLimits,
    /// Cached memory types and heaps.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl Device {
    /// Creates the logical device for the selected adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required extension is unsupported ([`RhiError::MissingExtension`])
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(transfer_family)) =
            (queue_families.graphics_family, queue_families.transfer_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let supported: Vec<std::ffi::CString> = physical_device_info
            .extensions
            .iter()
            .filter_map(|s| std::ffi::CString::new(s.as_str()).ok())
            .collect();
        let supported: Vec<&CStr> = supported.iter().map(|s| s.as_c_str()).collect();
        if let Some(missing) = first_missing(&supported, &REQUIRED_DEVICE_EXTENSIONS) {
            return Err(RhiError::MissingExtension(missing));
        }

        let mut extension_names: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();
        for optional in OPTIONAL_DEVICE_EXTENSIONS {
            if supported.contains(&optional) {
                extension_names.push(optional.as_ptr());
            } else {
                debug!("Optional extension {:?} not supported, skipping", optional);
            }
        }

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = required_features();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        // SAFETY: All pointers in `create_info` outlive the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let queues: Vec<QueueSlot> = unique_families
            .iter()
            .map(|&family| QueueSlot {
                family,
                // SAFETY: One queue was requested for every unique family.
                queue: unsafe { device.get_device_queue(family, 0) },
                lock: Mutex::new(()),
            })
            .collect();
        let slot_of = |family: u32| {
            queues
                .iter()
                .position(|slot| slot.family == family)
                .unwrap_or(0)
        };
        let graphics_slot = slot_of(graphics_family);
        let transfer_slot = slot_of(transfer_family);
        debug!(
            "Graphics queue from family {}, transfer queue from family {}",
            graphics_family, transfer_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: Nothing has been created from the device yet.
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
            graphics_slot,
            transfer_slot,
            queue_families,
            limits: physical_device_info.properties.limits,
            memory_properties: physical_device_info.memory_properties,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the queue handle for a role.
    #[inline]
    pub fn queue(&self, kind: QueueKind) -> vk::Queue {
        self.slot(kind).queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Sharing mode for resources used by both the graphics and transfer queues.
    #[inline]
    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.queue_families.sharing_mode()
    }

    /// Family indices to list for `CONCURRENT` sharing. Empty when exclusive.
    pub fn concurrent_family_indices(&self) -> Vec<u32> {
        if self.sharing_mode() == vk::SharingMode::CONCURRENT {
            self.queue_families.unique_families()
        } else {
            Vec::new()
        }
    }

    /// Device limits of the adapter.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Memory types and heaps of the adapter.
    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Locks the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        lock_recovering(&self.allocator)
    }

    /// Waits for the device to become idle.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        // Device-wide idle also waits on every queue; hold all queue locks.
        let _guards: Vec<_> = self
            .queues
            .iter()
            .map(|slot| lock_recovering(&slot.lock))
            .collect();
        // SAFETY: No queue is being submitted to while the guards are held.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to a queue under its lock.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and fully recorded
    /// - The fence (if not null) is unsignaled and not in use
    pub unsafe fn submit(
        &self,
        kind: QueueKind,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        let slot = self.slot(kind);
        let _guard = lock_recovering(&slot.lock);
        unsafe {
            self.device.queue_submit(slot.queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Presents through the graphics queue under its lock.
    ///
    /// Returns `Ok(true)` if the swapchain is suboptimal.
    pub fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        present_info: &vk::PresentInfoKHR,
    ) -> Result<bool, vk::Result> {
        let slot = self.slot(QueueKind::Graphics);
        let _guard = lock_recovering(&slot.lock);
        // SAFETY: The present info references live swapchain and semaphores.
        unsafe { swapchain_loader.queue_present(slot.queue, present_info) }
    }

    fn slot(&self, kind: QueueKind) -> &QueueSlot {
        match kind {
            QueueKind::Graphics => &self.queues[self.graphics_slot],
            QueueKind::Transfer => &self.queues[self.transfer_slot],
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: Every resource created from this device has been dropped by
        // its owner. The allocator frees its memory blocks through the device,
        // so it goes first.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device is Send+Sync, queue handles are only used under their
// mutex, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// Locks `mutex`, taking the data over if a panicking thread poisoned it.
///
/// Every lock guarding device state goes through here.
pub fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
