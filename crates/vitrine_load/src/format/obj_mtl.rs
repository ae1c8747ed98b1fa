//! Geometry+material-pair adapter: Wavefront OBJ with its MTL sidecar.
//!
//! The material library `<name>.mtl` is fetched and decoded first; the
//! decoded library is then handed to the OBJ decode of `<name>.obj` in place
//! of whatever file its `mtllib` line names.

use std::io::Cursor;
use std::sync::Arc;

use vitrine_core::{Material, Mesh, SceneNode, Vec3};

use super::{off_runtime, DecodeError, DecodeResult, FormatAdapter};
use crate::catalog::{AssetLocation, FormatTag};
use crate::fetch::ResourceFetcher;

/// Decoder for OBJ geometry plus MTL materials.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjMtlAdapter;

impl FormatAdapter for ObjMtlAdapter {
    async fn decode<F: ResourceFetcher>(
        &self,
        fetcher: &F,
        location: &AssetLocation,
    ) -> DecodeResult<SceneNode> {
        let mtl_path = location.file("mtl");
        let mtl_bytes = fetcher.fetch(&mtl_path).await?;
        let (mtl_materials, mtl_index) = off_runtime(move || {
            tobj::load_mtl_buf(&mut Cursor::new(mtl_bytes.as_slice()))
                .map_err(|source| DecodeError::MaterialLibrary { path: mtl_path, source })
        })
        .await?;

        let obj_path = location.primary(FormatTag::Obj);
        let obj_bytes = fetcher.fetch(&obj_path).await?;
        let name = location.name().to_string();

        off_runtime(move || {
            let (models, _) = tobj::load_obj_buf(
                &mut Cursor::new(obj_bytes.as_slice()),
                &tobj::LoadOptions {
                    single_index: true,
                    triangulate: true,
                    ..Default::default()
                },
                |_| Ok((mtl_materials.clone(), mtl_index.clone())),
            )
            .map_err(|source| DecodeError::Obj {
                path: obj_path.clone(),
                source,
            })?;

            let materials: Vec<Arc<Material>> = mtl_materials
                .iter()
                .map(|m| Arc::new(convert_material(m)))
                .collect();
            let default_material = Arc::new(Material::default());
            let mut root = SceneNode::group(name);
            for model in &models {
                let mesh = &model.mesh;
                if mesh.indices.len() < 3 {
                    continue;
                }
                if let Some(&bad) = mesh.indices.iter().find(|&&i| i as usize * 3 >= mesh.positions.len()) {
                    return Err(DecodeError::Malformed(format!(
                        "model {} references vertex {} of {}",
                        model.name,
                        bad,
                        mesh.positions.len() / 3
                    )));
                }

                let mut geometry = Mesh::from_flat(
                    &mesh.positions,
                    mesh.indices.clone(),
                    &mesh.normals,
                    &mesh.texcoords,
                );
                geometry.ensure_normals();

                let material = mesh
                    .material_id
                    .and_then(|id| materials.get(id).cloned())
                    .unwrap_or_else(|| default_material.clone());

                root.add_child(SceneNode::mesh(model.name.clone(), Arc::new(geometry), material));
            }

            if root.mesh_count() == 0 {
                return Err(DecodeError::NoGeometry(obj_path));
            }

            root.enable_shadows();
            Ok(root)
        })
        .await
    }
}

/// Map an MTL entry onto the PBR material. Blinn-Phong shininess becomes an
/// approximate roughness.
fn convert_material(m: &tobj::Material) -> Material {
    let defaults = Material::default();
    Material {
        name: m.name.clone(),
        base_color: m.diffuse.map(Vec3::from).unwrap_or(defaults.base_color),
        metallic: 0.0,
        roughness: m
            .shininess
            .map(|s| (2.0 / (s.max(0.0) + 2.0)).sqrt())
            .unwrap_or(defaults.roughness),
        emissive: Vec3::ZERO,
        opacity: m.dissolve.unwrap_or(1.0).clamp(0.0, 1.0),
        diffuse_texture: m.diffuse_texture.clone(),
    }
}
