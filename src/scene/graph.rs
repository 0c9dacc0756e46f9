//! Node arena and parent-relative transform hierarchy
//!
//! Nodes live in a flat, append-only arena and are addressed by [`NodeId`].
//! A parent link is a handle into the same arena. Because a node may only be
//! parented to a node that already exists, the hierarchy is acyclic by
//! construction; [`SceneGraph::set_parent`] re-checks that when re-parenting.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use super::transform::Transform;
use crate::renderer::{Material, MeshHandle, ShaderHandle};

/// Stable handle to a node in a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Raw arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Errors raised while building or querying the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("node {0:?} does not exist in this scene")]
    UnknownNode(NodeId),

    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },

    #[error("no node named \"{0}\"")]
    NodeNotFound(String),

    #[error("a node named \"{0}\" already exists")]
    DuplicateName(String),
}

/// Which draw pass a renderable node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderQueue {
    /// Opaque and alpha-tested geometry, drawn in container order
    Lit,
    /// Alpha-blended geometry, sorted back to front every frame
    AlphaBlend,
}

/// Mesh, shader and material of a drawable node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    pub mesh: MeshHandle,
    pub shader: ShaderHandle,
    pub material: Material,
}

impl Renderable {
    pub fn new(mesh: MeshHandle, shader: ShaderHandle, material: Material) -> Self {
        Self {
            mesh,
            shader,
            material,
        }
    }
}

/// A node in the scene: either a drawable entity or a transform-only pivot
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub active: bool,
    /// `None` for pivots
    pub renderable: Option<Renderable>,
    parent: Option<NodeId>,
}

impl SceneNode {
    /// Parent handle, if any
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// True for transform-only nodes
    #[must_use]
    pub const fn is_pivot(&self) -> bool {
        self.renderable.is_none()
    }
}

/// Flat arena of nodes plus the per-pass draw queues
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    names: FxHashMap<String, NodeId>,
    lit: Vec<NodeId>,
    alpha_blend: Vec<NodeId>,
    pivots: Vec<NodeId>,
}

impl SceneGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transform-only pivot node
    ///
    /// # Errors
    ///
    /// Fails if `parent` is not a node of this graph or the name is taken.
    pub fn add_pivot(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError> {
        let id = self.insert(name.into(), transform, parent, None)?;
        self.pivots.push(id);
        Ok(id)
    }

    /// Insert a drawable node and append it to the queue of its pass
    ///
    /// # Errors
    ///
    /// Fails if `parent` is not a node of this graph or the name is taken.
    pub fn add_renderable(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        parent: Option<NodeId>,
        renderable: Renderable,
        queue: RenderQueue,
    ) -> Result<NodeId, SceneError> {
        let id = self.insert(name.into(), transform, parent, Some(renderable))?;
        match queue {
            RenderQueue::Lit => self.lit.push(id),
            RenderQueue::AlphaBlend => self.alpha_blend.push(id),
        }
        Ok(id)
    }

    fn insert(
        &mut self,
        name: String,
        transform: Transform,
        parent: Option<NodeId>,
        renderable: Option<Renderable>,
    ) -> Result<NodeId, SceneError> {
        if let Some(parent) = parent {
            self.check(parent)?;
        }
        if self.names.contains_key(&name) {
            return Err(SceneError::DuplicateName(name));
        }

        let id = NodeId(self.nodes.len() as u32);
        self.names.insert(name.clone(), id);
        self.nodes.push(SceneNode {
            name,
            transform,
            active: true,
            renderable,
            parent,
        });
        Ok(id)
    }

    /// Re-parent a node, rejecting links that would close a loop
    ///
    /// # Errors
    ///
    /// Fails on unknown handles or if `parent` is `node` or one of its
    /// descendants.
    pub fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        self.check(node)?;
        if let Some(parent) = parent {
            self.check(parent)?;
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == node {
                    return Err(SceneError::Cycle {
                        child: node,
                        parent,
                    });
                }
                cursor = self.nodes[current.index()].parent;
            }
        }
        self.nodes[node.index()].parent = parent;
        Ok(())
    }

    /// Validate that a handle belongs to this graph
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownNode`] for foreign handles.
    pub fn check(&self, id: NodeId) -> Result<(), SceneError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(SceneError::UnknownNode(id))
        }
    }

    /// Look a node up by name
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NodeNotFound`] naming the missing node.
    pub fn find(&self, name: &str) -> Result<NodeId, SceneError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))
    }

    /// Borrow a node
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.index()]
    }

    /// Local `T * R * S` matrix of a node
    #[must_use]
    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        self.node(id).transform.matrix()
    }

    /// World matrix: ancestors' locals composed root to leaf
    #[must_use]
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut chain: SmallVec<[NodeId; 4]> = SmallVec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.nodes[current.index()].parent;
        }

        chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |world, &node| world * self.local_matrix(node))
    }

    /// Translation column of the world matrix
    #[must_use]
    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).col(3).truncate()
    }

    /// Opaque and alpha-tested nodes, in insertion order
    #[must_use]
    pub fn lit_queue(&self) -> &[NodeId] {
        &self.lit
    }

    /// Alpha-blended nodes, in insertion order
    #[must_use]
    pub fn alpha_blend_queue(&self) -> &[NodeId] {
        &self.alpha_blend
    }

    /// Transform-only nodes
    #[must_use]
    pub fn pivots(&self) -> &[NodeId] {
        &self.pivots
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no node has been inserted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes with their handles
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{MeshHandle, ShaderHandle};

    fn renderable() -> Renderable {
        Renderable::new(MeshHandle(0), ShaderHandle(0), Material::default())
    }

    #[test]
    fn test_root_world_equals_local() {
        let mut graph = SceneGraph::new();
        let transform = Transform::from_parts(
            Vec3::new(0.1, -1.7, 2.7),
            Vec3::new(10.0, 20.0, 30.0),
            Vec3::splat(2.0),
        );
        let base = graph
            .add_renderable("Base", transform, None, renderable(), RenderQueue::Lit)
            .unwrap();

        assert_eq!(graph.world_matrix(base), graph.local_matrix(base));
    }

    #[test]
    fn test_world_composes_root_to_leaf() {
        let mut graph = SceneGraph::new();
        let base = graph
            .add_renderable(
                "Base",
                Transform::from_position(Vec3::new(0.0, -1.0, 2.0)).with_uniform_scale(2.0),
                None,
                renderable(),
                RenderQueue::Lit,
            )
            .unwrap();
        let pivot = graph
            .add_pivot(
                "Pivot",
                Transform::from_position(Vec3::Y).with_rotation(Vec3::new(0.0, 45.0, 0.0)),
                Some(base),
            )
            .unwrap();
        let gem = graph
            .add_renderable(
                "Gem",
                Transform::from_position(Vec3::new(1.6, 0.0, 0.0)).with_uniform_scale(0.5),
                Some(pivot),
                renderable(),
                RenderQueue::AlphaBlend,
            )
            .unwrap();

        let expected = graph.local_matrix(base) * graph.local_matrix(pivot) * graph.local_matrix(gem);
        assert!(graph.world_matrix(gem).abs_diff_eq(expected, 1e-5));
        assert!(
            graph
                .world_position(gem)
                .abs_diff_eq(expected.col(3).truncate(), 1e-5)
        );
    }

    #[test]
    fn test_queues_track_insertion() {
        let mut graph = SceneGraph::new();
        let a = graph
            .add_renderable("A", Transform::new(), None, renderable(), RenderQueue::Lit)
            .unwrap();
        let b = graph
            .add_renderable("B", Transform::new(), None, renderable(), RenderQueue::AlphaBlend)
            .unwrap();
        let p = graph.add_pivot("P", Transform::new(), None).unwrap();

        assert_eq!(graph.lit_queue(), &[a]);
        assert_eq!(graph.alpha_blend_queue(), &[b]);
        assert_eq!(graph.pivots(), &[p]);
        assert!(graph.node(p).is_pivot());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut graph = SceneGraph::new();
        let result = graph.add_pivot("Orphan", Transform::new(), Some(NodeId(3)));
        assert_eq!(result, Err(SceneError::UnknownNode(NodeId(3))));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_set_parent_rejects_cycle() {
        let mut graph = SceneGraph::new();
        let root = graph.add_pivot("Root", Transform::new(), None).unwrap();
        let child = graph.add_pivot("Child", Transform::new(), Some(root)).unwrap();
        let grandchild = graph.add_pivot("Grandchild", Transform::new(), Some(child)).unwrap();

        assert_eq!(
            graph.set_parent(root, Some(grandchild)),
            Err(SceneError::Cycle {
                child: root,
                parent: grandchild
            })
        );
        assert!(graph.set_parent(root, Some(root)).is_err());
        assert_eq!(graph.node(root).parent(), None);

        // Moving a leaf elsewhere is fine
        assert!(graph.set_parent(grandchild, Some(root)).is_ok());
        assert_eq!(graph.node(grandchild).parent(), Some(root));
    }

    #[test]
    fn test_find_by_name() {
        let mut graph = SceneGraph::new();
        let torch = graph.add_pivot("Torch 1", Transform::new(), None).unwrap();

        assert_eq!(graph.find("Torch 1"), Ok(torch));
        assert_eq!(
            graph.find("Torch 9"),
            Err(SceneError::NodeNotFound("Torch 9".to_string()))
        );
        assert_eq!(
            graph.add_pivot("Torch 1", Transform::new(), None),
            Err(SceneError::DuplicateName("Torch 1".to_string()))
        );
    }
}
