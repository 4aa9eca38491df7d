//! Counting [`GpuContext`] used by the unit tests. Nothing touches a GPU;
//! every resource reports its creation and drop to shared counters.

use std::sync::{Arc, Mutex};

use stimply_rhi::{DescriptorLayoutKind, GpuContext, PipelineLayoutKind, RhiResult, vk};

#[derive(Clone, Debug, Default)]
pub struct MockStats {
    pub live_buffers: usize,
    pub live_images: usize,
    pub live_descriptor_sets: usize,
    pub descriptor_kinds: Vec<DescriptorLayoutKind>,
    pub uniform_buffer_sizes: Vec<vk::DeviceSize>,
    pub uniform_write_offsets: Vec<vk::DeviceSize>,
    /// Bytes of every uniform write, parallel to `uniform_write_offsets`.
    pub uniform_write_bytes: Vec<Vec<u8>>,
    pub texture_writes: usize,
    pub transfers: usize,
    pub open_transfers: usize,
    pub transfer_threads: Vec<usize>,
    pub image_layouts: Vec<vk::ImageLayout>,
    pub wait_idles: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    BindPipeline(PipelineLayoutKind),
    BindMesh,
    BindSets {
        layout: PipelineLayoutKind,
        set_count: usize,
        slot: usize,
    },
    DrawIndexed(u32),
}

type Shared = Arc<Mutex<MockStats>>;

pub struct MockBuffer {
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    stats: Shared,
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.stats.lock().unwrap().live_buffers -= 1;
    }
}

pub struct MockImage {
    layout: vk::ImageLayout,
    stats: Shared,
}

impl Drop for MockImage {
    fn drop(&mut self) {
        self.stats.lock().unwrap().live_images -= 1;
    }
}

pub struct MockDescriptorSets {
    count: usize,
    stats: Shared,
}

impl Drop for MockDescriptorSets {
    fn drop(&mut self) {
        self.stats.lock().unwrap().live_descriptor_sets -= self.count;
    }
}

pub struct MockFence;

pub struct MockContext {
    slots: usize,
    alignment: vk::DeviceSize,
    threads: usize,
    stats: Shared,
    recorded: Mutex<Vec<Recorded>>,
}

impl MockContext {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            alignment: 64,
            threads: 4,
            stats: Arc::default(),
            recorded: Mutex::default(),
        }
    }

    pub fn with_uniform_alignment(mut self, alignment: vk::DeviceSize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_loader_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn stats(&self) -> MockStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        let mut stats = self.stats.lock().unwrap();
        stats.uniform_write_offsets.clear();
        stats.uniform_write_bytes.clear();
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn clear_recorded(&self) {
        self.recorded.lock().unwrap().clear();
    }

    fn check_thread(&self, thread_id: usize) {
        assert!(thread_id < self.threads, "thread id {thread_id} out of range");
    }
}

impl GpuContext for MockContext {
    type Buffer = MockBuffer;
    type Image = MockImage;
    type DescriptorSets = MockDescriptorSets;
    type CommandBuffer = ();
    type Fence = MockFence;

    fn frame_slots(&self) -> usize {
        self.slots
    }

    fn uniform_alignment(&self) -> vk::DeviceSize {
        self.alignment
    }

    fn loader_threads(&self) -> usize {
        self.threads
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        _properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<MockBuffer> {
        assert!(size > 0, "zero-sized buffer");
        let mut stats = self.stats.lock().unwrap();
        stats.live_buffers += 1;
        if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            stats.uniform_buffer_sizes.push(size);
        }
        Ok(MockBuffer {
            size,
            usage,
            stats: Arc::clone(&self.stats),
        })
    }

    fn write_buffer(
        &self,
        buffer: &MockBuffer,
        offset: vk::DeviceSize,
        bytes: &[u8],
    ) -> RhiResult<()> {
        assert!(offset + bytes.len() as vk::DeviceSize <= buffer.size, "write out of bounds");
        if buffer.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            let mut stats = self.stats.lock().unwrap();
            stats.uniform_write_offsets.push(offset);
            stats.uniform_write_bytes.push(bytes.to_vec());
        }
        Ok(())
    }

    fn create_image(
        &self,
        width: u32,
        height: u32,
        _format: vk::Format,
        _usage: vk::ImageUsageFlags,
        _aspect: vk::ImageAspectFlags,
    ) -> RhiResult<MockImage> {
        assert!(width > 0 && height > 0);
        self.stats.lock().unwrap().live_images += 1;
        Ok(MockImage {
            layout: vk::ImageLayout::UNDEFINED,
            stats: Arc::clone(&self.stats),
        })
    }

    fn image_barrier(&self, _cmd: &(), image: &mut MockImage, new_layout: vk::ImageLayout) {
        image.layout = new_layout;
        self.stats.lock().unwrap().image_layouts.push(new_layout);
    }

    fn create_fence(&self, _signaled: bool) -> RhiResult<MockFence> {
        Ok(MockFence)
    }

    fn begin_transient_transfer(&self, thread_id: usize) -> RhiResult<()> {
        self.check_thread(thread_id);
        let mut stats = self.stats.lock().unwrap();
        stats.open_transfers += 1;
        stats.transfer_threads.push(thread_id);
        Ok(())
    }

    fn end_transient_transfer(
        &self,
        _cmd: (),
        _fence: Option<&MockFence>,
        thread_id: usize,
    ) -> RhiResult<()> {
        self.check_thread(thread_id);
        let mut stats = self.stats.lock().unwrap();
        stats.open_transfers -= 1;
        stats.transfers += 1;
        Ok(())
    }

    fn cmd_copy_buffer(
        &self,
        _cmd: &(),
        src: &MockBuffer,
        src_offset: vk::DeviceSize,
        dst: &MockBuffer,
        size: vk::DeviceSize,
    ) {
        assert!(src_offset + size <= src.size);
        assert!(size <= dst.size);
    }

    fn cmd_copy_buffer_to_image(&self, _cmd: &(), _src: &MockBuffer, dst: &MockImage) {
        assert_eq!(dst.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    fn create_descriptor_sets(
        &self,
        thread_id: usize,
        kind: DescriptorLayoutKind,
        count: usize,
    ) -> RhiResult<MockDescriptorSets> {
        self.check_thread(thread_id);
        let mut stats = self.stats.lock().unwrap();
        stats.live_descriptor_sets += count;
        stats.descriptor_kinds.push(kind);
        Ok(MockDescriptorSets {
            count,
            stats: Arc::clone(&self.stats),
        })
    }

    fn write_uniform_descriptors(
        &self,
        sets: &MockDescriptorSets,
        _binding: u32,
        buffer: &MockBuffer,
        stride: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        assert!(range <= stride);
        assert!(stride * sets.count as vk::DeviceSize <= buffer.size);
    }

    fn write_texture_descriptors(&self, _sets: &MockDescriptorSets, binding: u32, image: &MockImage) {
        assert_eq!(binding, 1);
        assert_eq!(image.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.stats.lock().unwrap().texture_writes += 1;
    }

    fn cmd_bind_pipeline(&self, _cmd: &(), layout: PipelineLayoutKind) {
        self.recorded
            .lock()
            .unwrap()
            .push(Recorded::BindPipeline(layout));
    }

    fn cmd_bind_mesh(&self, _cmd: &(), _vertices: &MockBuffer, _indices: &MockBuffer) {
        self.recorded.lock().unwrap().push(Recorded::BindMesh);
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: &(),
        layout: PipelineLayoutKind,
        sets: &[&MockDescriptorSets],
        slot: usize,
    ) {
        assert!(sets.iter().all(|s| slot < s.count));
        self.recorded.lock().unwrap().push(Recorded::BindSets {
            layout,
            set_count: sets.len(),
            slot,
        });
    }

    fn cmd_draw_indexed(&self, _cmd: &(), index_count: u32) {
        self.recorded
            .lock()
            .unwrap()
            .push(Recorded::DrawIndexed(index_count));
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.stats.lock().unwrap().wait_idles += 1;
        Ok(())
    }
}
