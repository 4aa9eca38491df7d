//! GPU mesh: geometry buffers, optional texture and per-slot uniforms.

use std::mem::size_of;
use std::sync::Arc;

use bytemuck::{bytes_of, cast_slice};
use glam::Mat4;
use stimply_resources::TextureData;
use stimply_rhi::memory::align_up;
use stimply_rhi::{DescriptorLayoutKind, GpuContext, PipelineLayoutKind, Vertex, vk};
use tracing::warn;

use crate::error::{SceneError, SceneResult};
use crate::ubo::{FragmentUniform, FrameGlobals, MvpUniform};

/// Format every diffuse texture is uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// CPU-side mesh ready for upload.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub texture: Option<TextureData>,
}

/// A drawable mesh.
///
/// Fields drop in declaration order after [`Drop::drop`] has waited for the
/// device: texture, descriptor sets, uniform buffers, index buffer, vertex
/// buffer and finally the context handle.
pub struct Mesh<G: GpuContext> {
    texture: Option<G::Image>,
    mvp_sets: G::DescriptorSets,
    fragment_sets: G::DescriptorSets,
    mvp_uniforms: G::Buffer,
    fragment_uniforms: G::Buffer,
    index_buffer: G::Buffer,
    vertex_buffer: G::Buffer,
    index_count: u32,
    mvp_stride: vk::DeviceSize,
    fragment_stride: vk::DeviceSize,
    descriptor_layout: DescriptorLayoutKind,
    ctx: Arc<G>,
}

impl<G: GpuContext> Mesh<G> {
    /// Uploads `data` using the pools of `thread_id` and prepares one uniform
    /// slot per frame in flight.
    ///
    /// # Errors
    ///
    /// [`SceneError::EmptyMesh`] for a mesh without geometry, otherwise any
    /// GPU failure.
    pub fn new(ctx: &Arc<G>, data: MeshData, thread_id: usize) -> SceneResult<Self> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(SceneError::EmptyMesh(data.name));
        }
        debug_assert!(
            data.indices.len().is_multiple_of(3),
            "mesh indices must form triangles"
        );

        let slots = ctx.frame_slots();
        let descriptor_layout = if data.texture.is_some() {
            DescriptorLayoutKind::LightTexture
        } else {
            DescriptorLayoutKind::Light
        };

        // 1. Descriptor sets
        let mvp_sets = ctx.create_descriptor_sets(thread_id, DescriptorLayoutKind::Mvp, slots)?;
        let fragment_sets = ctx.create_descriptor_sets(thread_id, descriptor_layout, slots)?;

        // 2. Uniform buffers, one aligned slot per frame
        let alignment = ctx.uniform_alignment();
        let mvp_stride = align_up(size_of::<MvpUniform>() as vk::DeviceSize, alignment);
        let fragment_stride =
            align_up(size_of::<FragmentUniform>() as vk::DeviceSize, alignment);
        let host_visible =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mvp_uniforms = ctx.create_buffer(
            mvp_stride * slots as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            host_visible,
        )?;
        let fragment_uniforms = ctx.create_buffer(
            fragment_stride * slots as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            host_visible,
        )?;

        // 3. Geometry through one staging buffer
        let vertex_bytes: &[u8] = cast_slice(&data.vertices);
        let index_bytes: &[u8] = cast_slice(&data.indices);
        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;

        let vertex_buffer = ctx.create_buffer(
            vertex_size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let index_buffer = ctx.create_buffer(
            index_size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let fence = ctx.create_fence(false)?;
        {
            let staging = ctx.create_buffer(
                vertex_size + index_size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                host_visible,
            )?;
            ctx.write_buffer(&staging, 0, vertex_bytes)?;
            ctx.write_buffer(&staging, vertex_size, index_bytes)?;

            let cmd = ctx.begin_transient_transfer(thread_id)?;
            ctx.cmd_copy_buffer(&cmd, &staging, 0, &vertex_buffer, vertex_size);
            ctx.cmd_copy_buffer(&cmd, &staging, vertex_size, &index_buffer, index_size);
            ctx.end_transient_transfer(cmd, Some(&fence), thread_id)?;
        }

        // 4. Texture
        let texture = match &data.texture {
            Some(texture) => Some(upload_texture(ctx, texture, &fence, thread_id)?),
            None => None,
        };

        // 5. Descriptor writes for every slot
        ctx.write_uniform_descriptors(
            &mvp_sets,
            0,
            &mvp_uniforms,
            mvp_stride,
            size_of::<MvpUniform>() as vk::DeviceSize,
        );
        ctx.write_uniform_descriptors(
            &fragment_sets,
            0,
            &fragment_uniforms,
            fragment_stride,
            size_of::<FragmentUniform>() as vk::DeviceSize,
        );
        if let Some(image) = &texture {
            ctx.write_texture_descriptors(&fragment_sets, 1, image);
        }

        Ok(Self {
            texture,
            mvp_sets,
            fragment_sets,
            mvp_uniforms,
            fragment_uniforms,
            index_buffer,
            vertex_buffer,
            index_count: data.indices.len() as u32,
            mvp_stride,
            fragment_stride,
            descriptor_layout,
            ctx: Arc::clone(ctx),
        })
    }

    /// Writes this frame's transforms and light into `slot`.
    pub fn update_descriptor_set(
        &self,
        transform: Mat4,
        slot: usize,
        globals: &FrameGlobals<'_>,
    ) -> SceneResult<()> {
        debug_assert!(slot < self.ctx.frame_slots());
        let slot = slot as vk::DeviceSize;

        let mvp = MvpUniform::new(transform, globals.view, globals.proj);
        self.ctx
            .write_buffer(&self.mvp_uniforms, slot * self.mvp_stride, bytes_of(&mvp))?;

        let fragment = globals.fragment_uniform();
        self.ctx.write_buffer(
            &self.fragment_uniforms,
            slot * self.fragment_stride,
            bytes_of(&fragment),
        )?;
        Ok(())
    }

    /// Updates the slot uniforms and records the draw with the pipeline
    /// matching this mesh's descriptor layout.
    pub fn draw(
        &self,
        cmd: &G::CommandBuffer,
        transform: Mat4,
        slot: usize,
        globals: &FrameGlobals<'_>,
    ) -> SceneResult<()> {
        self.update_descriptor_set(transform, slot, globals)?;
        let layout = self.pipeline_layout();
        self.ctx.cmd_bind_pipeline(cmd, layout);
        self.ctx
            .cmd_bind_mesh(cmd, &self.vertex_buffer, &self.index_buffer);
        self.ctx.cmd_bind_descriptor_sets(
            cmd,
            layout,
            &[&self.mvp_sets, &self.fragment_sets],
            slot,
        );
        self.ctx.cmd_draw_indexed(cmd, self.index_count);
        Ok(())
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Layout of the fragment-stage set.
    #[inline]
    pub fn descriptor_layout(&self) -> DescriptorLayoutKind {
        self.descriptor_layout
    }

    #[inline]
    pub fn pipeline_layout(&self) -> PipelineLayoutKind {
        PipelineLayoutKind::for_fragment_layout(self.descriptor_layout)
    }

    #[inline]
    pub fn is_textured(&self) -> bool {
        self.texture.is_some()
    }
}

impl<G: GpuContext> Drop for Mesh<G> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            warn!("wait_idle failed while dropping a mesh: {}", e);
        }
    }
}

/// Creates a sampled image and fills it from `texture`. Waits on `fence`.
fn upload_texture<G: GpuContext>(
    ctx: &Arc<G>,
    texture: &TextureData,
    fence: &G::Fence,
    thread_id: usize,
) -> SceneResult<G::Image> {
    let mut image = ctx.create_image(
        texture.width,
        texture.height,
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        vk::ImageAspectFlags::COLOR,
    )?;
    let staging = ctx.create_buffer(
        texture.byte_len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    ctx.write_buffer(&staging, 0, &texture.pixels)?;

    let cmd = ctx.begin_transient_transfer(thread_id)?;
    ctx.image_barrier(&cmd, &mut image, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    ctx.cmd_copy_buffer_to_image(&cmd, &staging, &image);
    ctx.image_barrier(&cmd, &mut image, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    ctx.end_transient_transfer(cmd, Some(fence), thread_id)?;

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use crate::testing::{MockContext, Recorded};
    use glam::Vec3;

    fn triangle(texture: Option<TextureData>) -> MeshData {
        MeshData {
            name: "tri".to_string(),
            vertices: vec![
                Vertex::new(Vec3::ZERO, Vec3::Z, glam::Vec2::ZERO),
                Vertex::new(Vec3::X, Vec3::Z, glam::Vec2::X),
                Vertex::new(Vec3::Y, Vec3::Z, glam::Vec2::Y),
            ],
            indices: vec![0, 1, 2],
            texture,
        }
    }

    #[test]
    fn test_untextured_mesh_uses_light_layout() {
        let ctx = Arc::new(MockContext::new(2));
        let mesh = Mesh::new(&ctx, triangle(None), 0).unwrap();

        assert!(!mesh.is_textured());
        assert_eq!(mesh.descriptor_layout(), DescriptorLayoutKind::Light);
        assert_eq!(mesh.pipeline_layout(), PipelineLayoutKind::MvpLight);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(ctx.stats().live_descriptor_sets, 4);
        assert_eq!(ctx.stats().texture_writes, 0);
    }

    #[test]
    fn test_textured_mesh_upload_sequence() {
        let ctx = Arc::new(MockContext::new(2));
        let mesh = Mesh::new(&ctx, triangle(Some(TextureData::placeholder())), 1).unwrap();

        assert!(mesh.is_textured());
        assert_eq!(mesh.pipeline_layout(), PipelineLayoutKind::MvpLightTexture);
        let stats = ctx.stats();
        assert_eq!(stats.texture_writes, 1);
        // Geometry and texture each went through one transient transfer.
        assert_eq!(stats.transfers, 2);
        assert_eq!(stats.open_transfers, 0);
        assert_eq!(
            stats.image_layouts,
            vec![
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            ]
        );
        assert_eq!(stats.transfer_threads, vec![1, 1]);
    }

    #[test]
    fn test_staging_buffers_are_released_after_upload() {
        let ctx = Arc::new(MockContext::new(3));
        let _mesh = Mesh::new(&ctx, triangle(Some(TextureData::placeholder())), 0).unwrap();
        // Two uniform buffers plus vertex and index buffers.
        assert_eq!(ctx.stats().live_buffers, 4);
    }

    #[test]
    fn test_uniform_buffers_hold_one_aligned_slot_per_frame() {
        let ctx = Arc::new(MockContext::new(3).with_uniform_alignment(256));
        let _mesh = Mesh::new(&ctx, triangle(None), 0).unwrap();
        let sizes = ctx.stats().uniform_buffer_sizes;
        assert_eq!(sizes, vec![3 * 256, 3 * 256]);
    }

    #[test]
    fn test_update_writes_slot_offsets() {
        let ctx = Arc::new(MockContext::new(3).with_uniform_alignment(256));
        let mesh = Mesh::new(&ctx, triangle(None), 0).unwrap();
        let lights = [PointLight::default()];
        let globals = FrameGlobals::new(Mat4::IDENTITY, Mat4::IDENTITY, &lights);

        ctx.clear_writes();
        mesh.update_descriptor_set(Mat4::IDENTITY, 2, &globals).unwrap();
        let offsets: Vec<_> = ctx.stats().uniform_write_offsets;
        assert_eq!(offsets, vec![512, 512]);
    }

    #[test]
    fn test_draw_records_bind_and_draw() {
        let ctx = Arc::new(MockContext::new(2));
        let mesh = Mesh::new(&ctx, triangle(None), 0).unwrap();
        let globals = FrameGlobals::new(Mat4::IDENTITY, Mat4::IDENTITY, &[]);

        mesh.draw(&(), Mat4::IDENTITY, 1, &globals).unwrap();
        assert_eq!(
            ctx.recorded(),
            vec![
                Recorded::BindPipeline(PipelineLayoutKind::MvpLight),
                Recorded::BindMesh,
                Recorded::BindSets {
                    layout: PipelineLayoutKind::MvpLight,
                    set_count: 2,
                    slot: 1
                },
                Recorded::DrawIndexed(3),
            ]
        );
    }

    #[test]
    fn test_draw_binds_pipeline_matching_set_layout() {
        let ctx = Arc::new(MockContext::new(2));
        let plain = Mesh::new(&ctx, triangle(None), 0).unwrap();
        let textured = Mesh::new(&ctx, triangle(Some(TextureData::placeholder())), 0).unwrap();
        let globals = FrameGlobals::new(Mat4::IDENTITY, Mat4::IDENTITY, &[]);

        ctx.clear_recorded();
        plain.draw(&(), Mat4::IDENTITY, 0, &globals).unwrap();
        textured.draw(&(), Mat4::IDENTITY, 0, &globals).unwrap();
        plain.draw(&(), Mat4::IDENTITY, 1, &globals).unwrap();

        let recorded = ctx.recorded();
        let mut bound = None;
        let mut binds = 0;
        for entry in &recorded {
            match entry {
                Recorded::BindPipeline(layout) => bound = Some(*layout),
                Recorded::BindSets { layout, .. } => {
                    assert_eq!(bound, Some(*layout));
                    binds += 1;
                }
                _ => {}
            }
        }
        assert_eq!(binds, 3);
        assert_eq!(bound, Some(PipelineLayoutKind::MvpLight));
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let ctx = Arc::new(MockContext::new(2));
        let data = MeshData {
            name: "empty".to_string(),
            ..Default::default()
        };
        let err = Mesh::new(&ctx, data, 0).err().unwrap();
        assert!(matches!(err, SceneError::EmptyMesh(name) if name == "empty"));
        assert_eq!(ctx.stats().live_buffers, 0);
    }

    #[test]
    fn test_drop_releases_everything_and_waits() {
        let ctx = Arc::new(MockContext::new(2));
        let mesh = Mesh::new(&ctx, triangle(Some(TextureData::placeholder())), 0).unwrap();
        drop(mesh);
        let stats = ctx.stats();
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.live_descriptor_sets, 0);
        assert_eq!(stats.live_images, 0);
        assert_eq!(stats.wait_idles, 1);
    }
}
