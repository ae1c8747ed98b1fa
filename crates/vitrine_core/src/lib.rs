//! Vitrine Core - renderer-agnostic scene graph for the auto-populating viewer.
//!
//! This crate provides:
//!
//! - **Geometry types**: `Mesh`, `Material`, `Bounds`
//! - **Hierarchy types**: `SceneNode`, `MeshInstance`, `Transform`
//! - **Shared scene**: `Scene`, the graph the loaders write into and the
//!   render side reads from
//!
//! # Example
//!
//! ```ignore
//! use vitrine_core::{Material, Mesh, Scene, SceneNode, Vec3};
//!
//! let scene = Scene::shared("gallery");
//! let node = SceneNode::mesh("tri", Arc::new(mesh), Arc::new(Material::default_grey()));
//! let id = scene.write().unwrap().insert(Arc::new(node));
//! ```

pub mod bounds;
pub mod material;
pub mod mesh;
pub mod node;
pub mod scene;

// Re-export glam so downstream crates share one math type set
pub use glam::{Mat4, Quat, Vec3};

// Re-export commonly used types
pub use bounds::Bounds;
pub use material::Material;
pub use mesh::Mesh;
pub use node::{MeshInstance, SceneNode, Transform};
pub use scene::{NodeId, Scene, SceneStats, SharedScene};
