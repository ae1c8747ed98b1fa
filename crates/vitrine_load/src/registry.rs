//! The authoritative set of placed nodes, tagged by generation.
//!
//! `SceneRegistry` is the only writer of the shared [`Scene`]'s top-level
//! nodes. Every mutation goes through one mutex, and the scene's write lock
//! is only ever taken while that mutex is held, so a completion's
//! "check generation, then insert" can never interleave with a refresh's
//! "advance generation, then clear".

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLockWriteGuard};

use vitrine_core::{NodeId, Scene, SceneNode, SharedScene, Vec3};

use crate::catalog::FormatTag;

/// Identifier of one load/refresh cycle. Strictly increasing.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded node waiting to be committed.
#[derive(Debug)]
pub struct PendingNode {
    pub asset: String,
    pub format: FormatTag,
    pub position: Vec3,
    pub generation: Generation,
    pub node: SceneNode,
}

/// A node currently on display.
#[derive(Debug, Clone)]
pub struct PlacedNode {
    pub asset: String,
    pub format: FormatTag,
    pub position: Vec3,
    pub generation: Generation,
    pub node: Arc<SceneNode>,
    pub id: NodeId,
}

/// What happened to a commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Commit {
    Placed(NodeId),
    /// The node belonged to an older cycle and was dropped.
    Stale { current: Generation },
}

#[derive(Debug, Default)]
struct RegistryState {
    generation: Generation,
    nodes: Vec<PlacedNode>,
}

/// Generation-guarded owner of the scene's placed nodes.
#[derive(Debug)]
pub struct SceneRegistry {
    scene: SharedScene,
    state: Mutex<RegistryState>,
}

impl SceneRegistry {
    /// Wrap a shared scene. The registry starts at generation 0, empty.
    pub fn new(scene: SharedScene) -> Self {
        Self {
            scene,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    pub fn generation(&self) -> Generation {
        self.lock_state().generation
    }

    /// Advance to the next generation and clear, as one step.
    pub fn begin_generation(&self) -> Generation {
        let mut state = self.lock_state();
        state.generation = state.generation.next();
        let removed = self.clear_locked(&mut state);
        log::debug!("Generation {} begins, {} nodes removed", state.generation, removed);
        state.generation
    }

    /// Commit a node if it belongs to the current generation; otherwise drop it.
    pub fn add(&self, pending: PendingNode) -> Commit {
        let mut state = self.lock_state();
        if pending.generation != state.generation {
            log::debug!(
                "Discarding stale {} from generation {} (current {})",
                pending.asset,
                pending.generation,
                state.generation
            );
            return Commit::Stale {
                current: state.generation,
            };
        }

        let node = Arc::new(pending.node);
        let id = self.write_scene().insert(node.clone());
        state.nodes.push(PlacedNode {
            asset: pending.asset,
            format: pending.format,
            position: pending.position,
            generation: pending.generation,
            node,
            id,
        });
        Commit::Placed(id)
    }

    /// Remove every placed node from the scene. In-flight loads are untouched;
    /// whether they land afterwards depends only on their generation.
    pub fn clear(&self) -> usize {
        let mut state = self.lock_state();
        self.clear_locked(&mut state)
    }

    pub fn len(&self) -> usize {
        self.lock_state().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().nodes.is_empty()
    }

    /// Snapshot of the placed nodes in commit order.
    pub fn placed(&self) -> Vec<PlacedNode> {
        self.lock_state().nodes.clone()
    }

    fn clear_locked(&self, state: &mut RegistryState) -> usize {
        if state.nodes.is_empty() {
            return 0;
        }
        let mut scene = self.write_scene();
        let removed = state.nodes.len();
        for placed in state.nodes.drain(..) {
            scene.remove(placed.id);
        }
        removed
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_scene(&self) -> RwLockWriteGuard<'_, Scene> {
        self.scene.write().unwrap_or_else(PoisonError::into_inner)
    }
}
