//! Parallel mesh construction.
//!
//! The imported meshes are split into contiguous ranges, one per worker.
//! Worker `i` uses thread id `i`, which selects its own command and
//! descriptor pools on the device. Results are stitched back together in
//! import order so mesh indices match the node tree.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use glam::{Vec2, Vec3};
use stimply_resources::{ImportedModel, load_diffuse_texture, resolve_diffuse_texture};
use stimply_rhi::{GpuContext, Vertex};
use tracing::debug;

use crate::error::{SceneError, SceneResult};
use crate::mesh::{Mesh, MeshData};

/// Options for [`Scene::load`](crate::Scene::load).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneLoadOptions {
    /// Texture for meshes whose material has none. `None` leaves them
    /// untextured.
    pub default_texture: Option<PathBuf>,
    /// Worker count. `None` uses the available parallelism.
    pub threads: Option<usize>,
}

/// Number of workers for `mesh_count` meshes, capped by the pool sets the
/// device provides.
pub fn worker_count(requested: Option<usize>, mesh_count: usize, pool_sets: usize) -> usize {
    let wanted = requested.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    wanted.min(mesh_count).min(pool_sets).max(1)
}

/// Splits `0..count` into `workers` contiguous ranges whose sizes differ by
/// at most one. Earlier ranges take the remainder.
pub fn partition(count: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = count / workers;
    let extra = count % workers;
    let mut start = 0;
    (0..workers)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// CPU-side data for mesh `index`: vertices, flattened indices and the
/// decoded diffuse texture.
pub fn mesh_data(
    model: &ImportedModel,
    index: usize,
    model_dir: &Path,
    default_texture: Option<&Path>,
) -> SceneResult<MeshData> {
    let mesh = &model.meshes[index];
    debug_assert!(mesh.is_triangulated(), "mesh '{}' has non-triangle faces", mesh.name);

    let vertices = (0..mesh.vertex_count())
        .map(|i| {
            Vertex::new(
                mesh.positions[i],
                mesh.normals.get(i).copied().unwrap_or(Vec3::Y),
                mesh.tex_coords.get(i).copied().unwrap_or(Vec2::ZERO),
            )
        })
        .collect();

    let source = resolve_diffuse_texture(model_dir, model.material_of(mesh), default_texture);
    let texture = load_diffuse_texture(source.as_ref())?;

    Ok(MeshData {
        name: mesh.name.clone(),
        vertices,
        indices: mesh.indices.clone(),
        texture,
    })
}

/// Builds every mesh of `model` on a scoped worker pool.
pub fn build_meshes<G: GpuContext>(
    ctx: &Arc<G>,
    model: &ImportedModel,
    model_dir: &Path,
    options: &SceneLoadOptions,
) -> SceneResult<Vec<Mesh<G>>> {
    let count = model.meshes.len();
    let workers = worker_count(options.threads, count, ctx.loader_threads());
    let ranges = partition(count, workers);
    debug!("Building {} meshes on {} worker(s)", count, workers);

    let default_texture = options.default_texture.as_deref();
    let results: Vec<SceneResult<Vec<Mesh<G>>>> = thread::scope(|s| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(thread_id, range)| {
                let handle = s.spawn(move || {
                    range
                        .map(|index| {
                            let data = mesh_data(model, index, model_dir, default_texture)?;
                            Mesh::new(ctx, data, thread_id)
                        })
                        .collect::<SceneResult<Vec<_>>>()
                });
                (thread_id, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(thread_id, handle)| {
                handle
                    .join()
                    .unwrap_or(Err(SceneError::WorkerPanicked(thread_id)))
            })
            .collect()
    });

    let mut meshes = Vec::with_capacity(count);
    for result in results {
        meshes.extend(result?);
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stimply_resources::{ImportedMaterial, ImportedMesh};

    #[test]
    fn test_partition_is_contiguous_and_balanced() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

        let ranges = partition(2, 4);
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);

        assert_eq!(partition(5, 0), vec![0..5]);
    }

    #[test]
    fn test_worker_count_caps() {
        assert_eq!(worker_count(Some(8), 3, 16), 3);
        assert_eq!(worker_count(Some(8), 100, 4), 4);
        assert_eq!(worker_count(Some(2), 100, 4), 2);
        assert_eq!(worker_count(Some(4), 0, 4), 1);
        assert!(worker_count(None, 100, 100) >= 1);
    }

    #[test]
    fn test_mesh_data_interleaves_attributes() {
        let model = ImportedModel {
            meshes: vec![ImportedMesh {
                name: "m".to_string(),
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                normals: vec![Vec3::Z; 3],
                tex_coords: Vec::new(),
                indices: vec![0, 2, 1],
                ..Default::default()
            }],
            ..Default::default()
        };
        let data = mesh_data(&model, 0, Path::new("."), None).unwrap();
        assert_eq!(data.vertices.len(), 3);
        assert_eq!(data.vertices[1].position, Vec3::X);
        assert_eq!(data.vertices[1].normal, Vec3::Z);
        assert_eq!(data.vertices[1].tex_coord, Vec2::ZERO);
        assert_eq!(data.indices, vec![0, 2, 1]);
        assert!(data.texture.is_none());
    }

    #[test]
    fn test_mesh_data_missing_default_texture_uses_placeholder() {
        let model = ImportedModel {
            meshes: vec![ImportedMesh {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                indices: vec![0, 1, 2],
                material: Some(0),
                ..Default::default()
            }],
            materials: vec![ImportedMaterial {
                name: "stone".to_string(),
                diffuse_texture: Some("missing.png".to_string()),
            }],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("no_texture.png");

        let data = mesh_data(&model, 0, dir.path(), Some(&default)).unwrap();
        let texture = data.texture.unwrap();
        assert_eq!((texture.width, texture.height), (1, 1));
    }

    #[test]
    fn test_mesh_data_undecodable_texture_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let model = ImportedModel {
            meshes: vec![ImportedMesh {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                indices: vec![0, 1, 2],
                material: Some(0),
                ..Default::default()
            }],
            materials: vec![ImportedMaterial {
                name: "broken".to_string(),
                diffuse_texture: Some("broken.png".to_string()),
            }],
            ..Default::default()
        };

        let err = mesh_data(&model, 0, dir.path(), None).err().unwrap();
        assert!(matches!(err, SceneError::Resource(_)));
    }
}
