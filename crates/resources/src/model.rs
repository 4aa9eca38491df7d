//! Imported model data and the post-processing steps applied after import.
//!
//! The importer produces right-handed data as stored in the file. Before the
//! model is handed to the scene it is normalized:
//!
//! 1. smooth normals are generated for meshes that have none
//! 2. identical vertices are welded
//! 3. everything is converted to the engine's left-handed frame
//!
//! Left-handed conversion negates Z of positions and normals, flips the V
//! texture coordinate, reverses triangle winding and conjugates node
//! transforms by the Z mirror.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};

/// One triangulated mesh as produced by the importer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Empty, or one per position.
    pub normals: Vec<Vec3>,
    /// Empty, or one per position.
    pub tex_coords: Vec<Vec2>,
    /// Flat index list.
    pub indices: Vec<u32>,
    /// Vertex count of each face. Empty means every face is a triangle.
    pub face_arities: Vec<u32>,
    /// Index into [`ImportedModel::materials`].
    pub material: Option<usize>,
}

impl ImportedMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of faces, counting each arity entry or each index triple.
    pub fn face_count(&self) -> usize {
        if self.face_arities.is_empty() {
            self.indices.len() / 3
        } else {
            self.face_arities.len()
        }
    }

    /// Whether every face has exactly three vertices.
    pub fn is_triangulated(&self) -> bool {
        if self.face_arities.is_empty() {
            self.indices.len().is_multiple_of(3)
        } else {
            self.face_arities.iter().all(|&arity| arity == 3)
        }
    }
}

/// Material properties the engine uses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportedMaterial {
    pub name: String,
    /// Diffuse texture path as written in the file, relative to the model.
    pub diffuse_texture: Option<String>,
}

/// Node of the imported hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedNode {
    pub name: String,
    pub transform: Mat4,
    /// Indices into [`ImportedModel::meshes`].
    pub meshes: Vec<usize>,
    pub children: Vec<ImportedNode>,
}

impl Default for ImportedNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl ImportedNode {
    /// Pre-order walk over this node and its descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ImportedNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    fn walk_mut(&mut self, f: &mut impl FnMut(&mut ImportedNode)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }
}

/// A whole imported file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedModel {
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
    pub root: ImportedNode,
}

impl ImportedModel {
    pub fn total_vertex_count(&self) -> usize {
        self.meshes.iter().map(ImportedMesh::vertex_count).sum()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(ImportedMesh::face_count).sum()
    }

    /// Material of a mesh, if it has one and the index is valid.
    pub fn material_of(&self, mesh: &ImportedMesh) -> Option<&ImportedMaterial> {
        mesh.material.and_then(|index| self.materials.get(index))
    }

    /// Runs normal generation, welding and left-handed conversion.
    pub fn post_process(&mut self) {
        for mesh in &mut self.meshes {
            if mesh.normals.len() != mesh.positions.len() {
                generate_smooth_normals(mesh);
            }
            weld_vertices(mesh);
            convert_to_left_handed(mesh);
        }
        self.root
            .walk_mut(&mut |node| node.transform = mirror_z_transform(node.transform));
    }
}

/// Computes area-weighted smooth normals from triangle faces.
///
/// Vertices not referenced by any face get +Y.
pub fn generate_smooth_normals(mesh: &mut ImportedMesh) {
    let mut normals = vec![Vec3::ZERO; mesh.positions.len()];

    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(&pa), Some(&pb), Some(&pc)) = (
            mesh.positions.get(a),
            mesh.positions.get(b),
            mesh.positions.get(c),
        ) else {
            continue;
        };
        // Unnormalized cross product weights each face by its area.
        let face_normal = (pb - pa).cross(pc - pa);
        normals[a] += face_normal;
        normals[b] += face_normal;
        normals[c] += face_normal;
    }

    for normal in &mut normals {
        *normal = normal.try_normalize().unwrap_or(Vec3::Y);
    }
    mesh.normals = normals;
}

/// Merges vertices whose position, normal and UV are bit-identical and
/// remaps the indices. First occurrence order is kept.
pub fn weld_vertices(mesh: &mut ImportedMesh) {
    let has_normals = mesh.normals.len() == mesh.positions.len();
    let has_uvs = mesh.tex_coords.len() == mesh.positions.len();

    let mut lookup: HashMap<[u32; 8], u32> = HashMap::with_capacity(mesh.positions.len());
    let mut remap = Vec::with_capacity(mesh.positions.len());
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tex_coords = Vec::new();

    for i in 0..mesh.positions.len() {
        let p = mesh.positions[i];
        let n = if has_normals { mesh.normals[i] } else { Vec3::ZERO };
        let t = if has_uvs { mesh.tex_coords[i] } else { Vec2::ZERO };
        let key = [
            p.x.to_bits(),
            p.y.to_bits(),
            p.z.to_bits(),
            n.x.to_bits(),
            n.y.to_bits(),
            n.z.to_bits(),
            t.x.to_bits(),
            t.y.to_bits(),
        ];

        let index = *lookup.entry(key).or_insert_with(|| {
            positions.push(p);
            if has_normals {
                normals.push(n);
            }
            if has_uvs {
                tex_coords.push(t);
            }
            (positions.len() - 1) as u32
        });
        remap.push(index);
    }

    for index in &mut mesh.indices {
        if let Some(&mapped) = remap.get(*index as usize) {
            *index = mapped;
        }
    }
    mesh.positions = positions;
    mesh.normals = normals;
    mesh.tex_coords = tex_coords;
}

/// Converts a right-handed mesh to the left-handed frame.
pub fn convert_to_left_handed(mesh: &mut ImportedMesh) {
    for p in &mut mesh.positions {
        p.z = -p.z;
    }
    for n in &mut mesh.normals {
        n.z = -n.z;
    }
    for uv in &mut mesh.tex_coords {
        uv.y = 1.0 - uv.y;
    }
    for tri in mesh.indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

/// Conjugates a transform by the Z mirror: `S * m * S` with `S = diag(1, 1, -1, 1)`.
pub fn mirror_z_transform(m: Mat4) -> Mat4 {
    let s = Mat4::from_scale(Vec3::new(1.0, 1.0, -1.0));
    s * m * s
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> ImportedMesh {
        ImportedMesh {
            name: "tri".to_string(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: Vec::new(),
            tex_coords: vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
            indices: vec![0, 1, 2],
            face_arities: Vec::new(),
            material: None,
        }
    }

    #[test]
    fn test_generate_smooth_normals_ccw_triangle() {
        let mut mesh = triangle();
        generate_smooth_normals(&mut mesh);
        assert_eq!(mesh.normals.len(), 3);
        for n in &mesh.normals {
            assert_relative_eq!(n.z, 1.0);
        }
    }

    #[test]
    fn test_generate_normals_unreferenced_vertex() {
        let mut mesh = triangle();
        mesh.positions.push(Vec3::splat(5.0));
        mesh.tex_coords.push(Vec2::ZERO);
        generate_smooth_normals(&mut mesh);
        assert_eq!(mesh.normals[3], Vec3::Y);
    }

    #[test]
    fn test_weld_merges_identical_vertices() {
        // Quad as two triangles with duplicated shared corners.
        let mut mesh = ImportedMesh {
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::ZERO,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::Y,
            ],
            indices: vec![0, 1, 2, 3, 4, 5],
            ..Default::default()
        };
        weld_vertices(&mut mesh);
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_weld_keeps_distinct_uvs() {
        let mut mesh = ImportedMesh {
            positions: vec![Vec3::ZERO, Vec3::ZERO],
            tex_coords: vec![Vec2::ZERO, Vec2::ONE],
            indices: vec![0, 1, 0],
            ..Default::default()
        };
        weld_vertices(&mut mesh);
        assert_eq!(mesh.positions.len(), 2);
        assert_eq!(mesh.tex_coords.len(), 2);
    }

    #[test]
    fn test_left_handed_conversion() {
        let mut mesh = triangle();
        mesh.positions[1] = Vec3::new(1.0, 0.0, 2.0);
        mesh.normals = vec![Vec3::Z; 3];
        convert_to_left_handed(&mut mesh);

        assert_eq!(mesh.positions[1], Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(mesh.normals[0], -Vec3::Z);
        assert_eq!(mesh.tex_coords[2], Vec2::new(0.0, 0.0));
        assert_eq!(mesh.tex_coords[0], Vec2::new(0.0, 1.0));
        assert_eq!(mesh.indices, vec![0, 2, 1]);
    }

    #[test]
    fn test_mirror_z_transform() {
        let translated = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let mirrored = mirror_z_transform(translated);
        let p = mirrored.transform_point3(Vec3::ZERO);
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, -3.0);

        // Involution: applying it twice restores the original.
        let back = mirror_z_transform(mirrored);
        assert!(back.abs_diff_eq(translated, 1e-6));
    }

    #[test]
    fn test_post_process_generates_then_converts() {
        let mut model = ImportedModel {
            meshes: vec![triangle()],
            materials: Vec::new(),
            root: ImportedNode {
                meshes: vec![0],
                ..Default::default()
            },
        };
        model.post_process();
        let mesh = &model.meshes[0];
        // +Z normal generated in the file frame becomes -Z.
        assert_relative_eq!(mesh.normals[0].z, -1.0);
        assert_eq!(mesh.indices, vec![0, 2, 1]);
    }

    #[test]
    fn test_face_count_and_triangulation() {
        let mut mesh = triangle();
        assert_eq!(mesh.face_count(), 1);
        assert!(mesh.is_triangulated());
        mesh.face_arities = vec![4];
        assert!(!mesh.is_triangulated());
    }
}
