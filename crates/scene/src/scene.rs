//! Scene graph: a node tree referencing meshes in a flat arena.

use std::path::Path;
use std::sync::Arc;

use glam::Mat4;
use stimply_core::Timer;
use stimply_resources::{ImportedNode, import_model};
use stimply_rhi::GpuContext;
use tracing::info;

use crate::error::SceneResult;
use crate::loader::{SceneLoadOptions, build_meshes};
use crate::mesh::Mesh;
use crate::ubo::FrameGlobals;

/// Index into a scene's mesh arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl MeshId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node of the scene tree. Owns no meshes, only ids.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub local: Mat4,
    pub meshes: Vec<MeshId>,
    pub children: Vec<Node>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: String::new(),
            local: Mat4::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl Node {
    /// Mirrors an imported node and its subtree.
    pub fn from_imported(node: &ImportedNode) -> Self {
        Self {
            name: node.name.clone(),
            local: node.transform,
            meshes: node.meshes.iter().map(|&i| MeshId(i as u32)).collect(),
            children: node.children.iter().map(Node::from_imported).collect(),
        }
    }

    /// Effective transform of this node under `accumulated`.
    #[inline]
    pub fn effective_transform(&self, accumulated: Mat4) -> Mat4 {
        self.local * accumulated
    }

    /// Draws this node's meshes, then its children, pre-order.
    pub fn draw<G: GpuContext>(
        &self,
        meshes: &[Mesh<G>],
        cmd: &G::CommandBuffer,
        accumulated: Mat4,
        slot: usize,
        globals: &FrameGlobals<'_>,
    ) -> SceneResult<()> {
        let mat = self.effective_transform(accumulated);
        for id in &self.meshes {
            if let Some(mesh) = meshes.get(id.index()) {
                mesh.draw(cmd, mat, slot, globals)?;
            }
        }
        for child in &self.children {
            child.draw(meshes, cmd, mat, slot, globals)?;
        }
        Ok(())
    }

    /// Same traversal as [`Node::draw`], yielding each mesh id with its
    /// effective transform.
    pub fn visit(&self, accumulated: Mat4, f: &mut impl FnMut(MeshId, Mat4)) {
        let mat = self.effective_transform(accumulated);
        for &id in &self.meshes {
            f(id, mat);
        }
        for child in &self.children {
            child.visit(mat, f);
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }
}

/// A loaded model ready to draw.
///
/// The root drops before the arena, so no node outlives the meshes it names.
pub struct Scene<G: GpuContext> {
    root: Node,
    meshes: Vec<Mesh<G>>,
    base_transform: Mat4,
}

impl<G: GpuContext> Scene<G> {
    /// Imports the model at `path` and uploads every mesh.
    ///
    /// # Errors
    ///
    /// Import, texture decoding and GPU failures are all fatal.
    pub fn load(ctx: &Arc<G>, path: &Path, options: &SceneLoadOptions) -> SceneResult<Self> {
        let timer = Timer::new();
        let model = import_model(path)?;
        let model_dir = path.parent().unwrap_or(Path::new("."));

        let meshes = build_meshes(ctx, &model, model_dir, options)?;
        let root = Node::from_imported(&model.root);

        info!(
            "Loaded scene {:?}: {} meshes, {} nodes in {:.2}s",
            path,
            meshes.len(),
            root.node_count(),
            timer.peek()
        );

        Ok(Self {
            root,
            meshes,
            base_transform: Mat4::IDENTITY,
        })
    }

    /// Assembles a scene from already built parts.
    pub fn from_parts(root: Node, meshes: Vec<Mesh<G>>) -> Self {
        Self {
            root,
            meshes,
            base_transform: Mat4::IDENTITY,
        }
    }

    /// Records every mesh for frame `slot`.
    pub fn draw(
        &self,
        cmd: &G::CommandBuffer,
        slot: usize,
        globals: &FrameGlobals<'_>,
    ) -> SceneResult<()> {
        self.root
            .draw(&self.meshes, cmd, self.base_transform, slot, globals)
    }

    /// Walks the tree in draw order.
    pub fn visit(&self, mut f: impl FnMut(MeshId, Mat4)) {
        self.root.visit(self.base_transform, &mut f);
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.root
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh<G>] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh<G>> {
        self.meshes.get(id.index())
    }

    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Transform applied above the root.
    pub fn set_base_transform(&mut self, transform: Mat4) {
        self.base_transform = transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use crate::testing::{MockContext, Recorded};
    use crate::ubo::MvpUniform;
    use approx::assert_relative_eq;
    use glam::Vec3;
    use stimply_rhi::{DescriptorLayoutKind, PipelineLayoutKind};

    const TWO_OBJECTS: &str = "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
";

    fn write_model(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.obj");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn untextured() -> SceneLoadOptions {
        SceneLoadOptions {
            default_texture: None,
            threads: Some(2),
        }
    }

    #[test]
    fn test_two_level_transform_is_local_times_parent() {
        let parent = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let local = Mat4::from_scale(Vec3::splat(2.0));
        let root = Node {
            local: parent,
            children: vec![Node {
                local,
                meshes: vec![MeshId(0)],
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut seen = Vec::new();
        root.visit(Mat4::IDENTITY, &mut |id, mat| seen.push((id, mat)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, MeshId(0));
        assert!(seen[0].1.abs_diff_eq(local * parent, 1e-6));
    }

    #[test]
    fn test_drawn_model_matrix_is_local_times_parent() {
        let ctx = Arc::new(MockContext::new(2).with_uniform_alignment(256));
        let mesh = Mesh::new(
            &ctx,
            crate::mesh::MeshData {
                name: "tri".to_string(),
                vertices: vec![
                    stimply_rhi::Vertex::new(Vec3::ZERO, Vec3::Z, glam::Vec2::ZERO),
                    stimply_rhi::Vertex::new(Vec3::X, Vec3::Z, glam::Vec2::X),
                    stimply_rhi::Vertex::new(Vec3::Y, Vec3::Z, glam::Vec2::Y),
                ],
                indices: vec![0, 1, 2],
                texture: None,
            },
            0,
        )
        .unwrap();

        let parent = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let local = Mat4::from_rotation_y(0.5) * Mat4::from_scale(Vec3::splat(2.0));
        let root = Node {
            local: parent,
            children: vec![Node {
                local,
                meshes: vec![MeshId(0)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let scene = Scene::from_parts(root, vec![mesh]);

        ctx.clear_writes();
        let globals = FrameGlobals::new(Mat4::IDENTITY, Mat4::IDENTITY, &[]);
        scene.draw(&(), 1, &globals).unwrap();

        let stats = ctx.stats();
        let mvp_size = std::mem::size_of::<MvpUniform>();
        let (offset, bytes) = stats
            .uniform_write_offsets
            .iter()
            .zip(&stats.uniform_write_bytes)
            .find(|(_, bytes)| bytes.len() == mvp_size)
            .unwrap();
        assert_eq!(*offset, 256);
        let uniform: MvpUniform = bytemuck::pod_read_unaligned(bytes);
        assert!(uniform.model.abs_diff_eq(local * parent, 1e-6));
        assert!(uniform.mvp.abs_diff_eq(local * parent, 1e-6));
    }

    #[test]
    fn test_visit_is_pre_order() {
        let root = Node {
            meshes: vec![MeshId(0)],
            children: vec![
                Node {
                    meshes: vec![MeshId(1)],
                    children: vec![Node {
                        meshes: vec![MeshId(2)],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                Node {
                    meshes: vec![MeshId(3)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut order = Vec::new();
        root.visit(Mat4::IDENTITY, &mut |id, _| order.push(id.0));
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(root.node_count(), 4);
    }

    #[test]
    fn test_from_imported_keeps_hierarchy() {
        let imported = ImportedNode {
            name: "root".to_string(),
            children: vec![ImportedNode {
                name: "child".to_string(),
                transform: Mat4::from_translation(Vec3::X),
                meshes: vec![1, 0],
                ..Default::default()
            }],
            ..Default::default()
        };
        let node = Node::from_imported(&imported);
        assert_eq!(node.children[0].name, "child");
        assert_eq!(node.children[0].meshes, vec![MeshId(1), MeshId(0)]);
        assert_eq!(node.children[0].local, Mat4::from_translation(Vec3::X));
    }

    #[test]
    fn test_load_two_objects_end_to_end() {
        let (_dir, path) = write_model(TWO_OBJECTS);
        let ctx = Arc::new(MockContext::new(2));
        let scene = Scene::load(&ctx, &path, &untextured()).unwrap();

        assert_eq!(scene.mesh_count(), 2);
        assert_eq!(scene.root().children.len(), 2);
        for mesh in scene.meshes() {
            assert_eq!(mesh.descriptor_layout(), DescriptorLayoutKind::Light);
            assert!(!mesh.is_textured());
        }

        let lights = [PointLight::default()];
        let globals = FrameGlobals::new(Mat4::IDENTITY, Mat4::IDENTITY, &lights);
        scene.draw(&(), 0, &globals).unwrap();

        let draws: Vec<_> = ctx
            .recorded()
            .into_iter()
            .filter(|r| matches!(r, Recorded::DrawIndexed(_)))
            .collect();
        assert_eq!(draws, vec![Recorded::DrawIndexed(3), Recorded::DrawIndexed(3)]);
        let pipelines: Vec<_> = ctx
            .recorded()
            .into_iter()
            .filter(|r| matches!(r, Recorded::BindPipeline(_)))
            .collect();
        assert_eq!(
            pipelines,
            vec![Recorded::BindPipeline(PipelineLayoutKind::MvpLight); 2]
        );
        assert!(ctx.recorded().contains(&Recorded::BindSets {
            layout: PipelineLayoutKind::MvpLight,
            set_count: 2,
            slot: 0
        }));
    }

    #[test]
    fn test_resources_scale_with_meshes_and_slots() {
        let (_dir, path) = write_model(TWO_OBJECTS);
        let slots = 3;
        let ctx = Arc::new(MockContext::new(slots).with_uniform_alignment(256));
        let scene = Scene::load(&ctx, &path, &untextured()).unwrap();

        let k = scene.mesh_count();
        let stats = ctx.stats();
        // One Mvp and one fragment set per slot per mesh.
        assert_eq!(stats.live_descriptor_sets, 2 * k * slots);
        assert_eq!(stats.uniform_buffer_sizes.len(), 2 * k);
        assert!(stats.uniform_buffer_sizes.iter().all(|&s| s == 256 * slots as u64));

        drop(scene);
        let stats = ctx.stats();
        assert_eq!(stats.live_descriptor_sets, 0);
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.live_images, 0);
    }

    #[test]
    fn test_import_order_is_stable_across_workers() {
        let mut obj = String::new();
        for i in 0..7 {
            let z = i as f32;
            obj.push_str(&format!(
                "o part{i}\nv 0 0 {z}\nv 1 0 {z}\nv 0 1 {z}\nf {a} {b} {c}\n",
                a = 3 * i + 1,
                b = 3 * i + 2,
                c = 3 * i + 3
            ));
        }
        let (_dir, path) = write_model(&obj);
        let ctx = Arc::new(MockContext::new(2).with_loader_threads(3));
        let options = SceneLoadOptions {
            default_texture: None,
            threads: Some(8),
        };
        let scene = Scene::load(&ctx, &path, &options).unwrap();
        assert_eq!(scene.mesh_count(), 7);

        let mut ids = Vec::new();
        scene.visit(|id, _| ids.push(id.0));
        assert_eq!(ids, (0..7).collect::<Vec<_>>());

        // Every worker used its own thread id, within the device's pool count.
        let threads = ctx.stats().transfer_threads;
        assert!(threads.iter().all(|&t| t < 3));
        for t in 0..3 {
            assert!(threads.contains(&t));
        }
    }

    #[test]
    fn test_missing_default_texture_yields_textured_meshes() {
        let (dir, path) = write_model(TWO_OBJECTS);
        let ctx = Arc::new(MockContext::new(2));
        let options = SceneLoadOptions {
            default_texture: Some(dir.path().join("no_texture.png")),
            threads: Some(1),
        };
        let scene = Scene::load(&ctx, &path, &options).unwrap();
        assert!(scene.meshes().iter().all(Mesh::is_textured));
        assert_eq!(ctx.stats().texture_writes, 2);
    }

    #[test]
    fn test_base_transform_applies_to_root() {
        let (_dir, path) = write_model(TWO_OBJECTS);
        let ctx = Arc::new(MockContext::new(2));
        let mut scene = Scene::load(&ctx, &path, &untextured()).unwrap();
        scene.set_base_transform(Mat4::from_translation(Vec3::Y));

        let mut translations = Vec::new();
        scene.visit(|_, mat| translations.push(mat.w_axis.y));
        assert_eq!(translations.len(), 2);
        for y in translations {
            assert_relative_eq!(y, 1.0);
        }
    }

    #[test]
    fn test_load_missing_file_fails() {
        let ctx = Arc::new(MockContext::new(2));
        let result = Scene::load(&ctx, Path::new("does/not/exist.obj"), &untextured());
        assert!(result.is_err());
        assert_eq!(ctx.stats().live_buffers, 0);
    }
}
