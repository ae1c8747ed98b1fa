//! The shared scene graph.
//!
//! `Scene` owns the top-level nodes currently on display. Loaders insert into
//! it and remove from it; the render side only reads. It is shared across
//! threads as a `SharedScene` (`Arc<RwLock<Scene>>`).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::bounds::Bounds;
use crate::node::SceneNode;

/// Identifier of a top-level node in a `Scene`. Ids are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// A scene shared between the loaders and the render side.
pub type SharedScene = Arc<RwLock<Scene>>;

/// Aggregate numbers about the scene, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneStats {
    pub nodes: usize,
    pub meshes: usize,
    pub triangles: usize,
    pub bounds: Bounds,
}

/// The displayed scene: an ordered map of top-level nodes.
#[derive(Debug, Default)]
pub struct Scene {
    /// Scene name (for logging)
    pub name: String,

    roots: BTreeMap<NodeId, Arc<SceneNode>>,
    next_id: u64,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an empty scene wrapped for sharing.
    pub fn shared(name: impl Into<String>) -> SharedScene {
        Arc::new(RwLock::new(Self::new(name)))
    }

    /// Add a top-level node and return its id.
    pub fn insert(&mut self, node: Arc<SceneNode>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.roots.insert(id, node);
        id
    }

    /// Remove a top-level node, handing it back to the caller.
    pub fn remove(&mut self, id: NodeId) -> Option<Arc<SceneNode>> {
        self.roots.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Arc<SceneNode>> {
        self.roots.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.roots.contains_key(&id)
    }

    /// Top-level nodes in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = (NodeId, &Arc<SceneNode>)> {
        self.roots.iter().map(|(id, node)| (*id, node))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// World-space bounding box of everything on display.
    pub fn world_bounds(&self) -> Bounds {
        self.roots
            .values()
            .fold(Bounds::EMPTY, |acc, node| acc.union(&node.bounds()))
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            nodes: self.roots.len(),
            meshes: self.roots.values().map(|n| n.mesh_count()).sum(),
            triangles: self.roots.values().map(|n| n.triangle_count()).sum(),
            bounds: self.world_bounds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::mesh::Mesh;
    use crate::node::Transform;
    use glam::Vec3;

    fn placed_triangle(at: Vec3) -> Arc<SceneNode> {
        let mesh = Arc::new(Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        ));
        let node = SceneNode::mesh("tri", mesh, Arc::new(Material::default_grey()))
            .with_transform(Transform::from_translation(at));
        Arc::new(node)
    }

    #[test]
    fn test_insert_remove() {
        let mut scene = Scene::new("test");
        let a = scene.insert(placed_triangle(Vec3::ZERO));
        let b = scene.insert(placed_triangle(Vec3::X));
        assert_ne!(a, b);
        assert_eq!(scene.len(), 2);

        assert!(scene.remove(a).is_some());
        assert!(scene.remove(a).is_none());
        assert!(!scene.contains(a));
        assert!(scene.contains(b));

        // Ids are not reused after removal
        let c = scene.insert(placed_triangle(Vec3::Y));
        assert_ne!(c, a);
    }

    #[test]
    fn test_stats() {
        let mut scene = Scene::new("test");
        assert!(scene.world_bounds().is_empty());

        scene.insert(placed_triangle(Vec3::ZERO));
        scene.insert(placed_triangle(Vec3::new(4.0, 0.0, 0.0)));

        let stats = scene.stats();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.meshes, 2);
        assert_eq!(stats.triangles, 2);
        assert!((stats.bounds.max.x - 5.0).abs() < 1e-5);
    }
}
