//! Vulkan implementation of [`GpuContext`].
//!
//! [`GpuDevice`] owns the logical device handle plus everything meshes need
//! to create and bind their resources: the descriptor set layouts, the
//! pipeline layouts with the pipelines built on them, the shared sampler and
//! one descriptor pool and one transient transfer pool per loader thread.
//!
//! Loader thread `i` only ever touches pool `i`. The pools still sit behind
//! a `Mutex` so the API stays safe when callers pass a wrong id; the lock is
//! uncontended in practice.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use ash::vk;
use tracing::{debug, info};

use stimply_rhi::buffer::Buffer;
use stimply_rhi::command::{CommandBuffer, CommandPool};
use stimply_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, buffer_info, image_info, update_descriptor_sets,
};
use stimply_rhi::device::{Device, QueueKind, lock_recovering as lock};
use stimply_rhi::image::Image;
use stimply_rhi::pipeline::{Pipeline, PipelineLayout};
use stimply_rhi::sampler::Sampler;
use stimply_rhi::sync::Fence;
use stimply_rhi::{DescriptorLayoutKind, GpuContext, PipelineLayoutKind, RhiError, RhiResult};

/// Descriptor sets allocated from one loader thread's pool, returned to it
/// on drop.
pub struct DescriptorSets {
    pool: Arc<Mutex<DescriptorPool>>,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorSets {
    #[inline]
    pub fn handles(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Drop for DescriptorSets {
    fn drop(&mut self) {
        let pool = lock(&self.pool);
        if let Err(e) = pool.free(&self.sets) {
            tracing::error!("Failed to free {} descriptor sets: {}", self.sets.len(), e);
        }
    }
}

/// Device-level resource manager shared as `Arc<GpuDevice>`.
pub struct GpuDevice {
    pipelines: RwLock<Vec<(PipelineLayoutKind, Pipeline)>>,
    descriptor_pools: Vec<Arc<Mutex<DescriptorPool>>>,
    transfer_pools: Vec<Mutex<CommandPool>>,
    sampler: Sampler,
    mvp_light_texture_layout: PipelineLayout,
    mvp_light_layout: PipelineLayout,
    mvp_set_layout: DescriptorSetLayout,
    light_set_layout: DescriptorSetLayout,
    light_texture_set_layout: DescriptorSetLayout,
    frame_slots: usize,
    uniform_alignment: vk::DeviceSize,
    device: Arc<Device>,
}

impl GpuDevice {
    /// Creates the layouts, the sampler and `loader_threads` pool pairs.
    ///
    /// # Errors
    ///
    /// Any Vulkan creation failure.
    pub fn new(device: Arc<Device>, frame_slots: usize, loader_threads: usize) -> RhiResult<Self> {
        let loader_threads = loader_threads.max(1);

        let mvp_set_layout = DescriptorSetLayout::for_kind(device.clone(), DescriptorLayoutKind::Mvp)?;
        let light_set_layout =
            DescriptorSetLayout::for_kind(device.clone(), DescriptorLayoutKind::Light)?;
        let light_texture_set_layout =
            DescriptorSetLayout::for_kind(device.clone(), DescriptorLayoutKind::LightTexture)?;

        let mvp_light_texture_layout = PipelineLayout::new(
            device.clone(),
            &[mvp_set_layout.handle(), light_texture_set_layout.handle()],
        )?;
        let mvp_light_layout = PipelineLayout::new(
            device.clone(),
            &[mvp_set_layout.handle(), light_set_layout.handle()],
        )?;

        let sampler = Sampler::linear_repeat(device.clone())?;

        let transfer_family = device
            .queue_families()
            .transfer_family
            .ok_or_else(|| RhiError::InvalidHandle("no transfer queue family".to_string()))?;

        let mut descriptor_pools = Vec::with_capacity(loader_threads);
        let mut transfer_pools = Vec::with_capacity(loader_threads);
        for _ in 0..loader_threads {
            descriptor_pools.push(Arc::new(Mutex::new(DescriptorPool::per_thread(device.clone())?)));
            transfer_pools.push(Mutex::new(CommandPool::new_transient(
                device.clone(),
                transfer_family,
            )?));
        }

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment.max(1);
        info!(
            "GPU device ready: {} frame slots, {} loader pool set(s), uniform alignment {}",
            frame_slots, loader_threads, uniform_alignment
        );

        Ok(Self {
            pipelines: RwLock::default(),
            descriptor_pools,
            transfer_pools,
            sampler,
            mvp_light_texture_layout,
            mvp_light_layout,
            mvp_set_layout,
            light_set_layout,
            light_texture_set_layout,
            frame_slots,
            uniform_alignment,
            device,
        })
    }

    /// Logical device handle.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn descriptor_set_layout(&self, kind: DescriptorLayoutKind) -> &DescriptorSetLayout {
        match kind {
            DescriptorLayoutKind::Mvp => &self.mvp_set_layout,
            DescriptorLayoutKind::Light => &self.light_set_layout,
            DescriptorLayoutKind::LightTexture => &self.light_texture_set_layout,
        }
    }

    pub fn pipeline_layout(&self, kind: PipelineLayoutKind) -> &PipelineLayout {
        match kind {
            PipelineLayoutKind::MvpLightTexture => &self.mvp_light_texture_layout,
            PipelineLayoutKind::MvpLight => &self.mvp_light_layout,
        }
    }

    /// Registers the pipeline meshes on `kind` are drawn with, replacing any
    /// earlier one.
    pub fn install_pipeline(&self, kind: PipelineLayoutKind, pipeline: Pipeline) {
        let mut pipelines = self.pipelines.write().unwrap_or_else(|e| e.into_inner());
        pipelines.retain(|(k, _)| *k != kind);
        pipelines.push((kind, pipeline));
    }

    pub fn has_pipeline(&self, kind: PipelineLayoutKind) -> bool {
        self.pipeline_handle(kind).is_some()
    }

    fn pipeline_handle(&self, kind: PipelineLayoutKind) -> Option<vk::Pipeline> {
        let pipelines = self.pipelines.read().unwrap_or_else(|e| e.into_inner());
        pipelines
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, pipeline)| pipeline.handle())
    }

    fn descriptor_pool(&self, thread_id: usize) -> RhiResult<&Arc<Mutex<DescriptorPool>>> {
        self.descriptor_pools
            .get(thread_id)
            .ok_or_else(|| thread_out_of_range(thread_id, self.descriptor_pools.len()))
    }

    fn transfer_pool(&self, thread_id: usize) -> RhiResult<MutexGuard<'_, CommandPool>> {
        self.transfer_pools
            .get(thread_id)
            .map(lock)
            .ok_or_else(|| thread_out_of_range(thread_id, self.transfer_pools.len()))
    }
}

fn thread_out_of_range(thread_id: usize, count: usize) -> RhiError {
    RhiError::InvalidHandle(format!(
        "loader thread id {} out of range (have {} pool sets)",
        thread_id, count
    ))
}

impl GpuContext for GpuDevice {
    type Buffer = Buffer;
    type Image = Image;
    type DescriptorSets = DescriptorSets;
    type CommandBuffer = CommandBuffer;
    type Fence = Fence;

    fn frame_slots(&self) -> usize {
        self.frame_slots
    }

    fn uniform_alignment(&self) -> vk::DeviceSize {
        self.uniform_alignment
    }

    fn loader_threads(&self) -> usize {
        self.descriptor_pools.len()
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Buffer> {
        Buffer::new(self.device.clone(), size, usage, properties)
    }

    fn write_buffer(&self, buffer: &Buffer, offset: vk::DeviceSize, bytes: &[u8]) -> RhiResult<()> {
        buffer.write_data(offset, bytes)
    }

    fn create_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Image> {
        Image::new(self.device.clone(), width, height, format, usage, aspect)
    }

    fn image_barrier(&self, cmd: &CommandBuffer, image: &mut Image, new_layout: vk::ImageLayout) {
        let (barrier, src_stage, dst_stage) = image.transition(new_layout);
        cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<Fence> {
        Fence::new(self.device.clone(), signaled)
    }

    fn begin_transient_transfer(&self, thread_id: usize) -> RhiResult<CommandBuffer> {
        let pool = self.transfer_pool(thread_id)?;
        let cmd = CommandBuffer::new(self.device.clone(), &pool)?;
        cmd.begin()?;
        Ok(cmd)
    }

    fn end_transient_transfer(
        &self,
        cmd: CommandBuffer,
        fence: Option<&Fence>,
        thread_id: usize,
    ) -> RhiResult<()> {
        let pool = self.transfer_pool(thread_id)?;
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let fence_handle = fence.map_or(vk::Fence::null(), Fence::handle);

        // SAFETY: The command buffer is fully recorded and the fence, if any,
        // is unsignaled: it is reset after every wait below.
        let submitted = unsafe { self.device.submit(QueueKind::Transfer, &[submit_info], fence_handle) };
        let waited = submitted.and_then(|()| match fence {
            Some(fence) => fence.wait().and_then(|()| fence.reset()),
            None => self.device.wait_idle(),
        });

        pool.free_command_buffers(&command_buffers);
        waited
    }

    fn cmd_copy_buffer(
        &self,
        cmd: &CommandBuffer,
        src: &Buffer,
        src_offset: vk::DeviceSize,
        dst: &Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy {
            src_offset,
            dst_offset: 0,
            size,
        };
        cmd.copy_buffer(src.handle(), dst.handle(), &[region]);
    }

    fn cmd_copy_buffer_to_image(&self, cmd: &CommandBuffer, src: &Buffer, dst: &Image) {
        cmd.copy_buffer_to_image(src.handle(), dst.handle(), dst.extent());
    }

    fn create_descriptor_sets(
        &self,
        thread_id: usize,
        kind: DescriptorLayoutKind,
        count: usize,
    ) -> RhiResult<DescriptorSets> {
        let pool = self.descriptor_pool(thread_id)?;
        let layouts = vec![self.descriptor_set_layout(kind).handle(); count];
        let sets = lock(pool).allocate(&layouts)?;
        debug!("Allocated {} {:?} descriptor set(s) on thread {}", count, kind, thread_id);
        Ok(DescriptorSets {
            pool: Arc::clone(pool),
            sets,
        })
    }

    fn write_uniform_descriptors(
        &self,
        sets: &DescriptorSets,
        binding: u32,
        buffer: &Buffer,
        stride: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        let infos: Vec<[vk::DescriptorBufferInfo; 1]> = (0..sets.len())
            .map(|slot| [buffer_info(buffer.handle(), slot as vk::DeviceSize * stride, range)])
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = sets
            .handles()
            .iter()
            .zip(&infos)
            .map(|(&set, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info)
            })
            .collect();
        update_descriptor_sets(&self.device, &writes);
    }

    fn write_texture_descriptors(&self, sets: &DescriptorSets, binding: u32, image: &Image) {
        let info = [image_info(
            self.sampler.handle(),
            image.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let writes: Vec<vk::WriteDescriptorSet> = sets
            .handles()
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&info)
            })
            .collect();
        update_descriptor_sets(&self.device, &writes);
    }

    fn cmd_bind_pipeline(&self, cmd: &CommandBuffer, layout: PipelineLayoutKind) {
        match self.pipeline_handle(layout) {
            Some(pipeline) => cmd.bind_graphics_pipeline(pipeline),
            None => tracing::error!("No pipeline installed for {:?}", layout),
        }
    }

    fn cmd_bind_mesh(&self, cmd: &CommandBuffer, vertices: &Buffer, indices: &Buffer) {
        cmd.bind_vertex_buffer(vertices.handle());
        cmd.bind_index_buffer(indices.handle());
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: &CommandBuffer,
        layout: PipelineLayoutKind,
        sets: &[&DescriptorSets],
        slot: usize,
    ) {
        let handles: Vec<vk::DescriptorSet> = sets
            .iter()
            .filter_map(|s| s.handles().get(slot).copied())
            .collect();
        debug_assert_eq!(handles.len(), sets.len(), "slot {} out of range", slot);
        cmd.bind_descriptor_sets(self.pipeline_layout(layout).handle(), &handles);
    }

    fn cmd_draw_indexed(&self, cmd: &CommandBuffer, index_count: u32) {
        cmd.draw_indexed(index_count);
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}
