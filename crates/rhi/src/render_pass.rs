//! Render pass and swapchain framebuffers.
//!
//! The engine renders in one subpass with a color attachment (the swapchain
//! image) and a depth attachment shared by every framebuffer.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Color the frame is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.7, 0.0, 0.7, 1.0];

/// Depth the frame is cleared to.
pub const CLEAR_DEPTH: f32 = 1.0;

/// Clear values in attachment order: color, depth.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        },
    ]
}

/// Single-subpass render pass over color and depth.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let dependencies = [external_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        // SAFETY: All referenced arrays outlive the call.
        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        // SAFETY: Framebuffers and pipelines using the pass are idle.
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Dependency from outside the pass into subpass 0, covering both the
/// color write and the depth clear.
pub fn external_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// One framebuffer per swapchain image view, each paired with the depth view.
pub struct Framebuffers {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        color_views: &[vk::ImageView],
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let mut this = Self {
            device,
            framebuffers: Vec::with_capacity(color_views.len()),
        };

        for &view in color_views {
            let attachments = [view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            // SAFETY: The views and the render pass are live. Already created
            // framebuffers are destroyed by `Drop` on error.
            let framebuffer = unsafe { this.device.handle().create_framebuffer(&create_info, None)? };
            this.framebuffers.push(framebuffer);
        }

        debug!("Created {} framebuffer(s)", this.framebuffers.len());
        Ok(this)
    }

    #[inline]
    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            // SAFETY: No pending command buffer references the framebuffer.
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
