//! Bundled-scene adapter: glTF 2.0 (`.glb` binary or `.gltf` JSON).
//!
//! The file's default scene is rebuilt as a `SceneNode` tree under a group
//! named after the asset. Buffers come from the GLB binary chunk, from
//! base64 `data:` URIs, or from files next to the asset fetched through the
//! same fetcher.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gltf::mesh::Mode;
use gltf::Gltf;
use vitrine_core::{Material, Mesh, Quat, SceneNode, Transform, Vec3};

use super::{off_runtime, DecodeError, DecodeResult, FormatAdapter};
use crate::catalog::{AssetLocation, FormatTag};
use crate::fetch::ResourceFetcher;

/// Node hierarchies deeper than this are treated as malformed (cyclic).
const MAX_NODE_DEPTH: usize = 128;

/// Decoder for glTF files, binary or JSON.
#[derive(Debug, Clone, Copy)]
pub struct BundledSceneAdapter {
    format: FormatTag,
}

impl BundledSceneAdapter {
    pub fn new(format: FormatTag) -> Self {
        Self { format }
    }
}

impl FormatAdapter for BundledSceneAdapter {
    async fn decode<F: ResourceFetcher>(
        &self,
        fetcher: &F,
        location: &AssetLocation,
    ) -> DecodeResult<SceneNode> {
        let path = location.primary(self.format);
        let bytes = fetcher.fetch(&path).await?;
        let gltf = off_runtime(move || Ok(Gltf::from_slice(&bytes)?)).await?;
        let buffers = load_buffers(&gltf, fetcher, location).await?;

        let name = location.name().to_string();
        off_runtime(move || {
            let mut root = SceneBuilder::new(&gltf.document, &buffers).build(&name)?;
            if root.mesh_count() == 0 {
                return Err(DecodeError::NoGeometry(path));
            }

            root.enable_shadows();
            Ok(root)
        })
        .await
    }
}

async fn load_buffers<F: ResourceFetcher>(
    gltf: &Gltf,
    fetcher: &F,
    location: &AssetLocation,
) -> DecodeResult<Vec<Vec<u8>>> {
    let mut data = Vec::new();
    for buffer in gltf.buffers() {
        let bytes = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| DecodeError::Malformed("GLB binary chunk is missing".into()))?,
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => decode_data_uri(uri)?,
            gltf::buffer::Source::Uri(uri) => fetcher.fetch(&location.relative(uri)).await?,
        };

        if bytes.len() < buffer.length() {
            return Err(DecodeError::Malformed(format!(
                "buffer {} holds {} bytes, expected {}",
                buffer.index(),
                bytes.len(),
                buffer.length()
            )));
        }
        data.push(bytes);
    }
    Ok(data)
}

/// Decode `data:[<mime>];base64,<payload>`.
fn decode_data_uri(uri: &str) -> DecodeResult<Vec<u8>> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| DecodeError::UnsupportedUri(uri.to_string()))?;

    if !header.ends_with(";base64") {
        return Err(DecodeError::UnsupportedUri(uri.to_string()));
    }
    Ok(STANDARD.decode(payload)?)
}

fn convert_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();

    let diffuse_texture = pbr
        .base_color_texture()
        .and_then(|info| match info.texture().source().source() {
            gltf::image::Source::Uri { uri, .. } => Some(uri.to_string()),
            gltf::image::Source::View { .. } => None,
        });

    Material {
        name: material.name().unwrap_or_default().to_string(),
        base_color: Vec3::new(r, g, b),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: Vec3::from(material.emissive_factor()),
        opacity: a,
        diffuse_texture,
    }
}

/// Walks a glTF document and converts it into a `SceneNode` tree.
struct SceneBuilder<'a> {
    document: &'a gltf::Document,
    buffers: &'a [Vec<u8>],
    materials: Vec<Arc<Material>>,
    default_material: Arc<Material>,
    /// Converted primitives keyed by (mesh index, primitive index)
    meshes: HashMap<(usize, usize), Arc<Mesh>>,
}

impl<'a> SceneBuilder<'a> {
    fn new(document: &'a gltf::Document, buffers: &'a [Vec<u8>]) -> Self {
        Self {
            document,
            buffers,
            materials: document
                .materials()
                .map(|m| Arc::new(convert_material(&m)))
                .collect(),
            default_material: Arc::new(Material::default()),
            meshes: HashMap::new(),
        }
    }

    fn build(mut self, name: &str) -> DecodeResult<SceneNode> {
        let mut root = SceneNode::group(name);
        let document = self.document;

        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    let child = self.convert_node(node, 0)?;
                    root.add_child(child);
                }
            }
            None => {
                // No scene list: show every mesh at the origin
                for mesh in document.meshes() {
                    let mut group = SceneNode::group(mesh.name().unwrap_or_default());
                    self.add_primitives(&mut group, &mesh)?;
                    root.add_child(group);
                }
            }
        }

        Ok(root)
    }

    fn convert_node(&mut self, node: gltf::Node<'_>, depth: usize) -> DecodeResult<SceneNode> {
        if depth > MAX_NODE_DEPTH {
            return Err(DecodeError::Malformed(format!(
                "node hierarchy deeper than {} levels",
                MAX_NODE_DEPTH
            )));
        }

        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            translation: Vec3::from(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from(scale),
        };
        let mut out = SceneNode::group(node.name().unwrap_or_default()).with_transform(transform);

        if let Some(mesh) = node.mesh() {
            self.add_primitives(&mut out, &mesh)?;
        }
        for child in node.children() {
            let converted = self.convert_node(child, depth + 1)?;
            out.add_child(converted);
        }
        Ok(out)
    }

    fn add_primitives(&mut self, parent: &mut SceneNode, mesh: &gltf::Mesh<'_>) -> DecodeResult<()> {
        for primitive in mesh.primitives() {
            let key = (mesh.index(), primitive.index());
            let geometry = match self.meshes.get(&key) {
                Some(existing) => existing.clone(),
                None => match self.convert_primitive(&primitive)? {
                    Some(converted) => {
                        let converted = Arc::new(converted);
                        self.meshes.insert(key, converted.clone());
                        converted
                    }
                    None => continue,
                },
            };

            let material = primitive
                .material()
                .index()
                .and_then(|i| self.materials.get(i).cloned())
                .unwrap_or_else(|| self.default_material.clone());

            let name = format!("{}.{}", mesh.name().unwrap_or("mesh"), primitive.index());
            parent.add_child(SceneNode::mesh(name, geometry, material));
        }
        Ok(())
    }

    fn convert_primitive(&self, primitive: &gltf::Primitive<'_>) -> DecodeResult<Option<Mesh>> {
        if primitive.mode() != Mode::Triangles {
            log::debug!("Skipping non-triangle primitive ({:?})", primitive.mode());
            return Ok(None);
        }

        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

        let positions: Vec<Vec3> = match reader.read_positions() {
            Some(iter) => iter.map(Vec3::from).collect(),
            None => return Ok(None),
        };
        let indices: Vec<u32> = match reader.read_indices() {
            Some(iter) => iter.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(DecodeError::Malformed(format!(
                "index {} out of range for {} vertices",
                bad,
                positions.len()
            )));
        }

        let normals = reader
            .read_normals()
            .map(|iter| iter.map(Vec3::from).collect());

        let mut mesh = Mesh::new(positions, indices, normals);
        mesh.uvs = reader
            .read_tex_coords(0)
            .map(|iter| iter.into_f32().collect());
        mesh.ensure_normals();

        Ok(Some(mesh))
    }
}
