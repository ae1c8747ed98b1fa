//! Format adapters: one decoder per supported storage format.
//!
//! Every adapter implements [`FormatAdapter`]: given a fetcher and the asset's
//! location, it asynchronously produces a ready-to-place [`SceneNode`] or a
//! typed [`DecodeError`]. [`decode`] maps each [`FormatTag`] to its adapter;
//! the match is exhaustive, so a new format is a new tag variant plus a new
//! adapter.
//!
//! | tag            | adapter               | resources                |
//! |----------------|-----------------------|--------------------------|
//! | `glb`, `gltf`  | `BundledSceneAdapter` | `<name>.glb` / `.gltf` (+ external buffers) |
//! | `obj`          | `ObjMtlAdapter`       | `<name>.mtl`, then `<name>.obj` |
//! | `ply`          | `PlyAdapter`          | `<name>.ply`             |

mod gltf_scene;
mod obj_mtl;
mod ply;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vitrine_core::SceneNode;

use crate::catalog::{AssetLocation, FormatTag};
use crate::fetch::{FetchError, ResourceFetcher};

pub use gltf_scene::BundledSceneAdapter;
pub use obj_mtl::ObjMtlAdapter;
pub use ply::{parse_ply, PlyAdapter, PlyError, PlyGeometry};

/// Errors that can occur while decoding one candidate format.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Unsupported glTF buffer URI: {0}")]
    UnsupportedUri(String),

    #[error("Invalid base64 buffer: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Material library error in {}: {source}", path.display())]
    MaterialLibrary {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("OBJ error in {}: {source}", path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("PLY error: {0}")]
    Ply(#[from] PlyError),

    #[error("Malformed asset: {0}")]
    Malformed(String),

    #[error("No geometry found in {}", .0.display())]
    NoGeometry(PathBuf),

    #[error("Decode timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Decoder task failed: {0}")]
    Worker(String),
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// The capability shared by every format decoder.
pub trait FormatAdapter {
    /// Fetch the asset's resources for this format and decode them into a
    /// node whose meshes cast and receive shadows.
    fn decode<F: ResourceFetcher>(
        &self,
        fetcher: &F,
        location: &AssetLocation,
    ) -> impl Future<Output = DecodeResult<SceneNode>> + Send;
}

/// Run a CPU-bound decode step on the blocking pool. Parsing never runs on
/// the async worker, so a timeout around the adapter future can give up on it.
async fn off_runtime<T, D>(step: D) -> DecodeResult<T>
where
    T: Send + 'static,
    D: FnOnce() -> DecodeResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(step)
        .await
        .map_err(|e| DecodeError::Worker(e.to_string()))?
}

/// Decode `location` as `format` using the matching adapter.
pub async fn decode<F: ResourceFetcher>(
    format: FormatTag,
    fetcher: &F,
    location: &AssetLocation,
) -> DecodeResult<SceneNode> {
    match format {
        FormatTag::Glb | FormatTag::Gltf => {
            let adapter = BundledSceneAdapter::new(format);
            adapter.decode(fetcher, location).await
        }
        FormatTag::Obj => ObjMtlAdapter.decode(fetcher, location).await,
        FormatTag::Ply => PlyAdapter.decode(fetcher, location).await,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small, valid resources for every format.

    use std::path::Path;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    use crate::catalog::{AssetLocation, FormatTag};
    use crate::fetch::MemoryFetcher;

    pub const TRIANGLE_PLY: &str = "ply
format ascii 1.0
comment one triangle
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 2
";

    pub const QUAD_OBJ: &str = "mtllib quad.mtl
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
usemtl red
f 1 2 3 4
";

    pub const RED_MTL: &str = "newmtl red
Kd 1.0 0.0 0.0
d 0.5
";

    /// Little-endian positions of one triangle in the XY plane.
    pub fn triangle_positions() -> Vec<u8> {
        let mut bin = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        bin
    }

    /// glTF JSON for one triangle with a named, translated node and a
    /// material. `buffer_uri` of `None` means the GLB binary chunk.
    pub fn triangle_document(buffer_uri: Option<&str>) -> String {
        let len = triangle_positions().len();
        let buffer = match buffer_uri {
            Some(uri) => format!(r#"{{"byteLength": {len}, "uri": "{uri}"}}"#),
            None => format!(r#"{{"byteLength": {len}}}"#),
        };
        format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"name": "Tri", "mesh": 0, "translation": [0.0, 2.0, 0.0]}}],
  "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "material": 0}}]}}],
  "materials": [{{"name": "blue", "pbrMetallicRoughness": {{"baseColorFactor": [0.0, 0.0, 1.0, 1.0], "metallicFactor": 0.0}}}}],
  "buffers": [{buffer}],
  "bufferViews": [{{"buffer": 0, "byteOffset": 0, "byteLength": {len}}}],
  "accessors": [{{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}}]
}}"#
        )
    }

    /// A single-triangle binary glTF.
    pub fn triangle_glb() -> Vec<u8> {
        glb_container(triangle_document(None).as_bytes(), &triangle_positions())
    }

    /// A single-triangle JSON glTF with its buffer inlined as a data URI.
    pub fn triangle_gltf() -> String {
        let uri = format!(
            "data:application/octet-stream;base64,{}",
            STANDARD.encode(triangle_positions())
        );
        triangle_document(Some(&uri))
    }

    /// Wrap a JSON chunk and a binary chunk into a GLB container.
    pub fn glb_container(json: &[u8], bin: &[u8]) -> Vec<u8> {
        let pad = |data: &[u8], fill: u8| {
            let mut out = data.to_vec();
            while out.len() % 4 != 0 {
                out.push(fill);
            }
            out
        };
        let json = pad(json, b' ');
        let bin = pad(bin, 0);
        let total = 12 + 8 + json.len() + 8 + bin.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    /// Register every resource `format` needs for asset `name` under `root`.
    pub fn add_asset(fetcher: &mut MemoryFetcher, root: &Path, name: &str, format: FormatTag) {
        let location = AssetLocation::new(root, name);
        match format {
            FormatTag::Glb => fetcher.insert(location.primary(format), triangle_glb()),
            FormatTag::Gltf => fetcher.insert(location.primary(format), triangle_gltf()),
            FormatTag::Obj => {
                fetcher.insert(location.file("mtl"), RED_MTL);
                fetcher.insert(location.primary(format), QUAD_OBJ);
            }
            FormatTag::Ply => fetcher.insert(location.primary(format), TRIANGLE_PLY),
        }
    }
}
