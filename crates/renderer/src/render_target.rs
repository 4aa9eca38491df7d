//! Swapchain-backed render target.
//!
//! [`RenderTarget`] owns the presentation chain (swapchain, render pass, depth
//! buffer, framebuffers) and the per-slot command buffers and sync objects.
//! It implements [`FrameBackend`] so [`FrameSlots`](crate::frame::FrameSlots)
//! can drive it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use stimply_rhi::command::{CommandBuffer, CommandPool};
use stimply_rhi::device::{Device, QueueKind};
use stimply_rhi::render_pass::{Framebuffers, RenderPass, clear_values};
use stimply_rhi::swapchain::Swapchain;
use stimply_rhi::sync::FrameSync;
use stimply_rhi::{RhiError, RhiResult};

use crate::depth_buffer::DepthBuffer;
use crate::frame::{FrameBackend, PresentOutcome, flipped_viewport, full_scissor};

/// Frame slot count when the swapchain starts out empty.
pub const FALLBACK_FRAME_SLOTS: usize = 2;

/// Frame slots for a swapchain with `image_count` images.
pub fn frame_slot_count(image_count: u32) -> usize {
    match image_count {
        0 => FALLBACK_FRAME_SLOTS,
        n => n as usize,
    }
}

pub struct RenderTarget {
    framebuffers: Option<Framebuffers>,
    depth: Option<DepthBuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    sync: Vec<FrameSync>,
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    depth_format: vk::Format,
    window_size: (u32, u32),
    resized: bool,
    device: Arc<Device>,
}

impl RenderTarget {
    /// Builds the chain around an existing swapchain plus `frame_slots` sync
    /// objects and command buffers.
    pub fn new(
        device: Arc<Device>,
        swapchain: Swapchain,
        depth_format: vk::Format,
        frame_slots: usize,
        window_size: (u32, u32),
    ) -> RhiResult<Self> {
        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffers = command_pool
            .allocate_command_buffers(frame_slots as u32)?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();
        let sync = (0..frame_slots)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), depth_format)?;

        let mut target = Self {
            framebuffers: None,
            depth: None,
            render_pass,
            swapchain,
            sync,
            command_buffers,
            command_pool,
            depth_format,
            window_size,
            resized: false,
            device,
        };
        target.build_attachments()?;

        info!("Render target ready with {} frame slot(s)", frame_slots);
        Ok(target)
    }

    fn build_attachments(&mut self) -> RhiResult<()> {
        if self.swapchain.is_empty() {
            debug!("Surface is degenerate; no framebuffers");
            return Ok(());
        }
        let extent = self.swapchain.extent();
        let depth = DepthBuffer::new(self.device.clone(), extent, self.depth_format)?;
        let framebuffers = Framebuffers::new(
            self.device.clone(),
            &self.render_pass,
            self.swapchain.image_views(),
            depth.view(),
            extent,
        )?;
        self.depth = Some(depth);
        self.framebuffers = Some(framebuffers);
        Ok(())
    }

    /// Records the new window size. A changed size marks the swapchain for
    /// recreation after the next present.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        if self.window_size != (width, height) {
            self.resized = true;
        }
        self.window_size = (width, height);
    }

    #[inline]
    pub fn is_resize_pending(&self) -> bool {
        self.resized
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Command buffer of `slot`.
    #[inline]
    pub fn command_buffer(&self, slot: usize) -> &CommandBuffer {
        &self.command_buffers[slot]
    }
}

impl FrameBackend for RenderTarget {
    fn has_framebuffers(&self) -> bool {
        self.framebuffers.is_some()
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn recreate(&mut self) -> RhiResult<()> {
        self.device.wait_idle()?;
        self.resized = false;

        self.framebuffers = None;
        self.depth = None;
        let (width, height) = self.window_size;
        self.swapchain.recreate(width, height)?;
        self.render_pass =
            RenderPass::new(self.device.clone(), self.swapchain.format(), self.depth_format)?;
        self.build_attachments()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.sync[slot].graphics_fence().wait()
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<Option<u32>> {
        let semaphore = self.sync[slot].image_acquired().handle();
        match self.swapchain.acquire_next_image(semaphore) {
            Ok((image_index, _suboptimal)) => Ok(Some(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn begin_recording(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let framebuffer = self
            .framebuffers
            .as_ref()
            .and_then(|fbs| fbs.get(image_index))
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("no framebuffer for image {}", image_index))
            })?;

        self.sync[slot].graphics_fence().reset()?;
        let cmd = &self.command_buffers[slot];
        cmd.reset()?;
        cmd.begin()?;

        let extent = self.swapchain.extent();
        cmd.begin_render_pass(self.render_pass.handle(), framebuffer, extent, &clear_values());
        cmd.set_viewport(&flipped_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));
        Ok(())
    }

    fn submit_and_present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let cmd = &self.command_buffers[slot];
        cmd.end_render_pass();
        cmd.end()?;

        let sync = &self.sync[slot];
        let wait_semaphores = [sync.image_acquired().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.queue_submitted().handle()];
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffer is recorded and the fence was reset in
        // `begin_recording`.
        unsafe {
            self.device.submit(
                QueueKind::Graphics,
                &[submit_info],
                sync.graphics_fence().handle(),
            )?;
        }

        match self
            .swapchain
            .present(image_index, sync.queue_submitted().handle())
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::warn!("Failed to wait for device idle: {}", e);
        }
        let handles: Vec<vk::CommandBuffer> =
            self.command_buffers.iter().map(CommandBuffer::handle).collect();
        self.command_pool.free_command_buffers(&handles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_count() {
        assert_eq!(frame_slot_count(3), 3);
        assert_eq!(frame_slot_count(2), 2);
        assert_eq!(frame_slot_count(0), FALLBACK_FRAME_SLOTS);
    }
}
