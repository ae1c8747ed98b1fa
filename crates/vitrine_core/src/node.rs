//! Scene node hierarchy produced by the format decoders.
//!
//! A decoded asset is a tree of `SceneNode`s. Interior nodes carry only a
//! transform; mesh-bearing nodes additionally carry a `MeshInstance` with the
//! shared geometry, its material and the shadow flags read by the renderer.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::bounds::Bounds;
use crate::material::Material;
use crate::mesh::Mesh;

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Geometry placed at a node.
#[derive(Clone, Debug)]
pub struct MeshInstance {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// A node in a decoded asset hierarchy.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<MeshInstance>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Create an empty interior node.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a leaf node carrying geometry. Shadows start disabled.
    pub fn mesh(name: impl Into<String>, mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self {
            name: name.into(),
            mesh: Some(MeshInstance {
                mesh,
                material,
                cast_shadow: false,
                receive_shadow: false,
            }),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Depth-first visit of this node and every descendant.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a SceneNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Depth-first mutable visit of this node and every descendant.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut SceneNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    /// Mark every mesh-bearing node in the subtree as shadow-casting and
    /// shadow-receiving.
    pub fn enable_shadows(&mut self) {
        self.visit_mut(&mut |node| {
            if let Some(instance) = node.mesh.as_mut() {
                instance.cast_shadow = true;
                instance.receive_shadow = true;
            }
        });
    }

    /// Mesh instances in the subtree, depth-first.
    pub fn mesh_instances(&self) -> Vec<&MeshInstance> {
        let mut out = Vec::new();
        self.visit(&mut |node| {
            if let Some(instance) = &node.mesh {
                out.push(instance);
            }
        });
        out
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_instances().len()
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh_instances()
            .iter()
            .map(|instance| instance.mesh.triangle_count())
            .sum()
    }

    /// Bounds of the subtree in the coordinate space of this node's parent.
    pub fn bounds(&self) -> Bounds {
        self.bounds_under(Mat4::IDENTITY)
    }

    fn bounds_under(&self, parent: Mat4) -> Bounds {
        let world = parent * self.transform.to_matrix();
        let mut bounds = match &self.mesh {
            Some(instance) => instance.mesh.bounds.transformed(world),
            None => Bounds::EMPTY,
        };
        for child in &self.children {
            bounds = bounds.union(&child.bounds_under(world));
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Arc<Mesh> {
        Arc::new(Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        ))
    }

    fn tree() -> SceneNode {
        let material = Arc::new(Material::default_grey());
        let mut root = SceneNode::group("root");
        let mut arm = SceneNode::group("arm")
            .with_transform(Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        arm.add_child(SceneNode::mesh("hand", unit_triangle(), material.clone()));
        root.add_child(arm);
        root.add_child(SceneNode::mesh("body", unit_triangle(), material));
        root
    }

    #[test]
    fn test_enable_shadows_reaches_descendants() {
        let mut root = tree();
        assert!(root.mesh_instances().iter().all(|m| !m.cast_shadow));

        root.enable_shadows();

        let meshes = root.mesh_instances();
        assert_eq!(meshes.len(), 2);
        assert!(meshes.iter().all(|m| m.cast_shadow && m.receive_shadow));
    }

    #[test]
    fn test_counts_and_bounds() {
        let root = tree();
        assert_eq!(root.mesh_count(), 2);
        assert_eq!(root.triangle_count(), 2);

        let bounds = root.bounds();
        assert!((bounds.min - Vec3::ZERO).length() < 1e-5);
        assert!((bounds.max - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5);
    }
}
