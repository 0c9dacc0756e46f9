//! A small forward-lit 3D scene renderer built on wgpu
//!
//! This crate provides:
//! - A scene graph with parent/child transforms and per-node materials
//! - Directional, point and spot lights with an optional shadow map
//! - A skybox, alpha-blended geometry and a post-processing composite
//! - A winit host that drives a [`core::SceneApp`] and maps keys to actions

pub mod core;
pub mod input;
pub mod renderer;
pub mod scene;
pub mod shrine;

// Re-exports for convenience
pub use glam;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{Engine, EngineConfig, SceneApp, Time};
    pub use crate::input::{Input, InputMapper, SceneAction};
    pub use crate::renderer::{
        Camera, CameraView, CommandList, DrawApi, LightRegistry, Material, RenderContext,
        RenderError, RenderSettings, Renderer, ResourceLoader, Viewport,
    };
    pub use crate::scene::{NodeId, SceneGraph, Transform};
    pub use crate::shrine::Shrine;
    pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
    pub use winit::keyboard::KeyCode;
}
