//! GPU resource-manager seam.
//!
//! [`GpuContext`] is everything a mesh or scene needs from the device:
//! resource creation, one-shot transfers, descriptor management and the
//! draw-time recording calls. The Vulkan implementation lives in the
//! renderer crate; tests substitute counting mocks.
//!
//! Resources are associated types owned by the caller. Dropping one releases
//! it, so a mesh's lifetime bounds every GPU object it created.

use ash::vk;

use crate::descriptor::{DescriptorLayoutKind, PipelineLayoutKind};
use crate::error::RhiResult;

/// Device-level resource manager shared by every loader thread.
///
/// Methods taking a `thread_id` use the per-thread command and descriptor
/// pools; ids must lie in `0..loader_threads()`.
pub trait GpuContext: Send + Sync + 'static {
    type Buffer: Send + Sync;
    type Image: Send + Sync;
    type DescriptorSets: Send + Sync;
    type CommandBuffer: Clone;
    type Fence: Send + Sync;

    /// Number of frames in flight. Per-frame resources hold this many slots.
    fn frame_slots(&self) -> usize;

    /// `minUniformBufferOffsetAlignment` of the device.
    fn uniform_alignment(&self) -> vk::DeviceSize;

    /// Number of per-thread pool sets available to loaders.
    fn loader_threads(&self) -> usize;

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    /// Creates a buffer. Host-visible buffers are persistently mapped.
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self::Buffer>;

    /// Copies `bytes` into a host-visible buffer at `offset`.
    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: vk::DeviceSize,
        bytes: &[u8],
    ) -> RhiResult<()>;

    /// Creates a device-local 2D image with a view.
    fn create_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self::Image>;

    /// Records a layout transition and updates the image's tracked layout.
    fn image_barrier(
        &self,
        cmd: &Self::CommandBuffer,
        image: &mut Self::Image,
        new_layout: vk::ImageLayout,
    );

    fn create_fence(&self, signaled: bool) -> RhiResult<Self::Fence>;

    // ---------------------------------------------------------------------
    // One-shot transfers
    // ---------------------------------------------------------------------

    /// Allocates a command buffer from the thread's transfer pool and begins
    /// it for one submission.
    fn begin_transient_transfer(&self, thread_id: usize) -> RhiResult<Self::CommandBuffer>;

    /// Ends and submits `cmd` to the transfer queue, waits for completion and
    /// frees the buffer.
    ///
    /// With a fence the wait is on the fence, which is reset afterwards so it
    /// can be reused. Without one the device is waited idle.
    fn end_transient_transfer(
        &self,
        cmd: Self::CommandBuffer,
        fence: Option<&Self::Fence>,
        thread_id: usize,
    ) -> RhiResult<()>;

    /// Copies `size` bytes from `src` at `src_offset` to the start of `dst`.
    fn cmd_copy_buffer(
        &self,
        cmd: &Self::CommandBuffer,
        src: &Self::Buffer,
        src_offset: vk::DeviceSize,
        dst: &Self::Buffer,
        size: vk::DeviceSize,
    );

    /// Copies tightly packed texels into the whole image, which must be in
    /// `TRANSFER_DST_OPTIMAL`.
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Image,
    );

    // ---------------------------------------------------------------------
    // Descriptors
    // ---------------------------------------------------------------------

    /// Allocates `count` sets of one layout from the thread's pool. The sets
    /// return to that pool on drop.
    fn create_descriptor_sets(
        &self,
        thread_id: usize,
        kind: DescriptorLayoutKind,
        count: usize,
    ) -> RhiResult<Self::DescriptorSets>;

    /// Points `binding` of set *i* at `buffer[i * stride .. i * stride + range]`.
    fn write_uniform_descriptors(
        &self,
        sets: &Self::DescriptorSets,
        binding: u32,
        buffer: &Self::Buffer,
        stride: vk::DeviceSize,
        range: vk::DeviceSize,
    );

    /// Points `binding` of every set at `image` through the shared sampler.
    fn write_texture_descriptors(&self, sets: &Self::DescriptorSets, binding: u32, image: &Self::Image);

    // ---------------------------------------------------------------------
    // Draw-time recording
    // ---------------------------------------------------------------------

    /// Binds the graphics pipeline built on `layout`.
    fn cmd_bind_pipeline(&self, cmd: &Self::CommandBuffer, layout: PipelineLayoutKind);

    /// Binds a vertex buffer at binding 0 and a `u32` index buffer.
    fn cmd_bind_mesh(&self, cmd: &Self::CommandBuffer, vertices: &Self::Buffer, indices: &Self::Buffer);

    /// Binds set `slot` of each entry of `sets`, in set-index order.
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: &Self::CommandBuffer,
        layout: PipelineLayoutKind,
        sets: &[&Self::DescriptorSets],
        slot: usize,
    );

    fn cmd_draw_indexed(&self, cmd: &Self::CommandBuffer, index_count: u32);

    fn wait_idle(&self) -> RhiResult<()>;
}
