//! Mesh geometry representation for the Vitrine scene graph.
//!
//! Decoders for every supported format (glTF, OBJ, PLY) produce this one
//! GPU-agnostic type; the render side converts it to vertex buffers.

use glam::Vec3;

use crate::bounds::Bounds;

/// A mesh consisting of vertex positions, optional normals and UVs, and
/// triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - computed on demand)
    pub normals: Option<Vec<Vec3>>,

    /// UV coordinates (optional - one [u, v] per vertex)
    pub uvs: Option<Vec<[f32; 2]>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Bounds,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Bounds::from_points(&positions);
        Self {
            positions,
            normals,
            uvs: None,
            indices,
            bounds,
        }
    }

    /// Build a mesh from flat `[x, y, z, x, y, z, ...]` arrays as produced by
    /// OBJ-style loaders. Empty normal/UV arrays mean "absent".
    pub fn from_flat(positions: &[f32], indices: Vec<u32>, normals: &[f32], uvs: &[f32]) -> Self {
        let to_vec3 = |flat: &[f32]| -> Vec<Vec3> {
            flat.chunks_exact(3)
                .map(|v| Vec3::new(v[0], v[1], v[2]))
                .collect()
        };

        let mut mesh = Self::new(
            to_vec3(positions),
            indices,
            (!normals.is_empty()).then(|| to_vec3(normals)),
        );
        if !uvs.is_empty() {
            mesh.uvs = Some(uvs.chunks_exact(2).map(|t| [t[0], t[1]]).collect());
        }
        mesh
    }

    /// Compute smooth vertex normals by averaging counter-clockwise face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (face[0] as usize, face[1] as usize, face[2] as usize);
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Ensure the mesh has one normal per vertex, computing them if necessary.
    pub fn ensure_normals(&mut self) {
        let vertex_count = self.positions.len();
        let should_compute = match &self.normals {
            None => true,
            Some(normals) => normals.len() != vertex_count,
        };

        if should_compute {
            if let Some(normals) = &self.normals {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    normals.len(),
                    vertex_count
                );
            }
            self.compute_normals();
        }
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.len() < 3
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}
