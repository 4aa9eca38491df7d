//! Vertex layout shared by the importer, the mesh uploader and the pipeline.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Mesh vertex: position, normal and texture coordinate.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tex_coord (8 bytes)
/// - Total size: 32 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec3)
/// - location 1: normal (vec3)
/// - location 2: tex_coord (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space.
    pub position: Vec3,
    /// Surface normal.
    pub normal: Vec3,
    /// Texture coordinates (UV).
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Binding 0, per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertices = [
            Vertex::new(Vec3::X, Vec3::Y, Vec2::new(0.5, 0.25)),
            Vertex::default(),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 64);
        let back: &[Vertex] = bytemuck::cast_slice(bytes);
        assert_eq!(back[0].tex_coord, Vec2::new(0.5, 0.25));
    }
}
