//! Scene module
//!
//! Node arena, parent-relative transforms and draw queues.

mod graph;
mod transform;

pub use graph::{NodeId, RenderQueue, Renderable, SceneError, SceneGraph, SceneNode};
pub use transform::Transform;
