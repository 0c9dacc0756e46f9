//! Rendering module
//!
//! Scene passes record into a [`DrawApi`]; the wgpu [`Renderer`] replays the
//! recorded [`CommandList`] as shadow, scene and composite render passes.

mod camera;
mod command;
mod context;
mod frame;
mod handles;
mod lights;
mod loader;
mod material;
mod mesh;
mod passes;
mod plan;
mod postprocess;
mod settings;
mod shaders;
mod shadow;
mod skybox;
mod texture;

pub use camera::{Camera, CameraView, FixedCamera};
pub use command::{
    BlendMode, CommandList, CullMode, DepthCompare, DrawApi, FrameUniform, ObjectUniform,
    RasterState, RenderCommand, TEXTURE_UNITS, TargetDesc, TargetKind, TextureSource,
};
pub use context::Renderer;
pub use frame::{FrameResources, RenderContext, RenderError, ShaderSet, Viewport};
pub use handles::{CubemapHandle, MeshHandle, Sentinel, ShaderHandle, TextureHandle};
pub use lights::{
    DebugLightEntry, DirectionalLight, DirectionalLightId, LightHandle, LightMarker,
    LightRegistry, LightUniforms, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS,
    PointLight, PointLightId, SpotLight, SpotLightId,
};
pub use loader::{
    AssetError, ResourceLoader, TextureSet, cubemap_or_black, mesh_or_cube, texture_or_sentinel,
};
#[cfg(test)]
pub(crate) use loader::MockLoader;
pub use material::{Material, MaterialTextures, TextureChannel};
pub use mesh::{Mesh, Vertex};
pub use passes::PassContext;
pub use plan::{DrawOp, FrameOp, FramePlan, Geometry, PipelineKey};
pub use postprocess::{
    PostProcessSettings, PostProcessUniform, SoftwareCompositor, render_composite,
    scanline_pattern,
};
pub use settings::{RenderSettings, TextureToggles};
pub use shaders::ShaderKind;
pub use shadow::{ShadowSettings, ShadowUniform, light_space_matrix};
pub use skybox::Skybox;
pub use texture::{FilterMode, SamplerConfig, WrapMode};
