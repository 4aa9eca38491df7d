//! Model import for Wavefront OBJ (`tobj`) and glTF (`gltf`).
//!
//! [`import_model`] picks the format from the file extension, triangulates,
//! and runs [`ImportedModel::post_process`] so callers always receive
//! left-handed, welded meshes with normals.

use std::path::Path;

use glam::{Mat4, Vec2, Vec3};
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::model::{ImportedMaterial, ImportedMesh, ImportedModel, ImportedNode};

/// Supported model formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Obj,
    Gltf,
}

impl ModelFormat {
    /// Format for a path's extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Obj),
            "gltf" | "glb" => Some(Self::Gltf),
            _ => None,
        }
    }
}

/// Imports a model file and normalizes it for the engine.
///
/// # Errors
///
/// - [`ResourceError::FileNotFound`] if the path does not exist
/// - [`ResourceError::UnsupportedFormat`] for unknown extensions
/// - [`ResourceError::ImportFailed`] with the importer's diagnostic
/// - [`ResourceError::NoMeshes`] if nothing drawable was found
pub fn import_model(path: &Path) -> ResourceResult<ImportedModel> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let format = ModelFormat::from_path(path)
        .ok_or_else(|| ResourceError::UnsupportedFormat(path.to_path_buf()))?;

    let mut model = match format {
        ModelFormat::Obj => import_obj(path)?,
        ModelFormat::Gltf => import_gltf(path)?,
    };

    if model.meshes.is_empty() {
        return Err(ResourceError::NoMeshes(path.to_path_buf()));
    }

    model.post_process();

    info!(
        "Imported {:?}: {} mesh(es), {} vertices, {} triangles, {} material(s)",
        path,
        model.meshes.len(),
        model.total_vertex_count(),
        model.total_triangle_count(),
        model.materials.len()
    );

    Ok(model)
}

fn import_failed(path: &Path, message: impl ToString) -> ResourceError {
    ResourceError::ImportFailed {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

// =============================================================================
// OBJ
// =============================================================================

/// Each OBJ object or group becomes one child of an identity root.
fn import_obj(path: &Path) -> ResourceResult<ImportedModel> {
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
    };
    let (models, materials) =
        tobj::load_obj(path, &options).map_err(|e| import_failed(path, e))?;

    let materials = match materials {
        Ok(materials) => materials,
        Err(e) => {
            warn!("Failed to load materials for {:?}: {}", path, e);
            Vec::new()
        }
    };

    let materials: Vec<ImportedMaterial> = materials
        .into_iter()
        .map(|m| ImportedMaterial {
            name: m.name,
            diffuse_texture: m.diffuse_texture.filter(|t| !t.trim().is_empty()),
        })
        .collect();

    let mut root = ImportedNode {
        name: "root".to_string(),
        ..Default::default()
    };
    let mut meshes = Vec::with_capacity(models.len());

    for model in models {
        let mesh = model.mesh;
        if mesh.indices.is_empty() {
            debug!("Skipping empty OBJ object '{}'", model.name);
            continue;
        }

        root.children.push(ImportedNode {
            name: model.name.clone(),
            transform: Mat4::IDENTITY,
            meshes: vec![meshes.len()],
            children: Vec::new(),
        });

        meshes.push(ImportedMesh {
            name: model.name,
            positions: mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2]))
                .collect(),
            normals: mesh
                .normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect(),
            tex_coords: mesh
                .texcoords
                .chunks_exact(2)
                .map(|t| Vec2::new(t[0], t[1]))
                .collect(),
            indices: mesh.indices,
            face_arities: mesh.face_arities,
            material: mesh.material_id,
        });
    }

    Ok(ImportedModel {
        meshes,
        materials,
        root,
    })
}

// =============================================================================
// glTF
// =============================================================================

/// Each triangle primitive becomes one mesh. Node transforms and the
/// hierarchy of the default scene are kept.
fn import_gltf(path: &Path) -> ResourceResult<ImportedModel> {
    let gltf = gltf::Gltf::open(path).map_err(|e| import_failed(path, e))?;
    let base = path.parent();
    let buffers = gltf::import_buffers(&gltf.document, base, gltf.blob.clone())
        .map_err(|e| import_failed(path, e))?;
    let document = &gltf.document;

    let materials: Vec<ImportedMaterial> = document
        .materials()
        .map(|material| ImportedMaterial {
            name: material.name().unwrap_or_default().to_string(),
            diffuse_texture: material
                .pbr_metallic_roughness()
                .base_color_texture()
                .and_then(|info| match info.texture().source().source() {
                    gltf::image::Source::Uri { uri, .. } => Some(uri.to_string()),
                    gltf::image::Source::View { .. } => {
                        warn!("Embedded texture in material {:?} is not supported", material.name());
                        None
                    }
                }),
        })
        .collect();

    // glTF mesh index -> imported mesh indices (one per triangle primitive).
    let mut primitives_of: Vec<Vec<usize>> = Vec::with_capacity(document.meshes().len());
    let mut meshes = Vec::new();

    for mesh in document.meshes() {
        let mut ids = Vec::new();
        for (p, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "Skipping primitive {} of mesh {:?}: mode {:?} is not triangles",
                    p,
                    mesh.name(),
                    primitive.mode()
                );
                continue;
            }

            let reader = primitive.reader(|buffer| {
                buffers.get(buffer.index()).map(|data| data.0.as_slice())
            });
            let Some(positions) = reader.read_positions() else {
                warn!("Skipping primitive {} of mesh {:?}: no positions", p, mesh.name());
                continue;
            };
            let positions: Vec<Vec3> = positions.map(Vec3::from).collect();
            let normals: Vec<Vec3> = reader
                .read_normals()
                .map(|n| n.map(Vec3::from).collect())
                .unwrap_or_default();
            let tex_coords: Vec<Vec2> = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().map(Vec2::from).collect())
                .unwrap_or_default();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            ids.push(meshes.len());
            meshes.push(ImportedMesh {
                name: format!("{}#{}", mesh.name().unwrap_or("mesh"), p),
                positions,
                normals,
                tex_coords,
                indices,
                face_arities: Vec::new(),
                material: primitive.material().index(),
            });
        }
        primitives_of.push(ids);
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| import_failed(path, "file contains no scene"))?;

    let root = ImportedNode {
        name: scene.name().unwrap_or("root").to_string(),
        transform: Mat4::IDENTITY,
        meshes: Vec::new(),
        children: scene
            .nodes()
            .map(|node| gltf_node(&node, &primitives_of))
            .collect(),
    };

    Ok(ImportedModel {
        meshes,
        materials,
        root,
    })
}

fn gltf_node(node: &gltf::Node, primitives_of: &[Vec<usize>]) -> ImportedNode {
    ImportedNode {
        name: node.name().unwrap_or_default().to_string(),
        transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
        meshes: node
            .mesh()
            .and_then(|mesh| primitives_of.get(mesh.index()))
            .cloned()
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| gltf_node(&child, primitives_of))
            .collect(),
    }
}
