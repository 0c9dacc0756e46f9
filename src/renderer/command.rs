//! Immediate-mode draw API and the command list that records it
//!
//! Passes never talk to the GPU directly. They issue calls on a [`DrawApi`],
//! which for a real frame is a [`CommandList`] later replayed by the wgpu
//! [`Renderer`](super::Renderer). Tests inspect the recorded list instead.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::frame::Viewport;
use super::handles::{CubemapHandle, MeshHandle, ShaderHandle, TextureHandle};
use super::lights::LightUniforms;
use super::material::Material;
use super::postprocess::PostProcessUniform;
use super::shadow::ShadowUniform;

// ============================================================================
// Targets and raster state
// ============================================================================

/// The three render targets a frame touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Fixed-size depth-only shadow map
    Shadow,
    /// Offscreen colour and depth, sized to the viewport
    Scene,
    /// The window surface
    Screen,
}

/// Target requested by a `begin_pass`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDesc {
    Shadow,
    /// The scene target must match this viewport before the pass begins
    Scene(Viewport),
    Screen,
}

impl TargetDesc {
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Shadow => TargetKind::Shadow,
            Self::Scene(_) => TargetKind::Scene,
            Self::Screen => TargetKind::Screen,
        }
    }
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthCompare {
    #[default]
    Less,
    LessEqual,
    Always,
}

/// Colour blending mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Overwrite the target
    #[default]
    Opaque,
    /// `src_alpha, 1 - src_alpha`
    Alpha,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Back,
    None,
}

/// Fixed-function state baked into a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_write: bool,
    pub depth_compare: DepthCompare,
    pub blend: BlendMode,
    pub cull: CullMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_write: true,
            depth_compare: DepthCompare::Less,
            blend: BlendMode::Opaque,
            cull: CullMode::Back,
        }
    }
}

/// What a texture unit samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// A loaded or sentinel texture
    Asset(TextureHandle),
    /// Colour attachment of the scene target
    SceneColor,
}

impl From<TextureHandle> for TextureSource {
    fn from(handle: TextureHandle) -> Self {
        Self::Asset(handle)
    }
}

/// Number of 2D texture units visible to a shader
pub const TEXTURE_UNITS: usize = 5;

// ============================================================================
// Uniform blocks
// ============================================================================

/// Per-draw camera block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    /// Seconds since startup
    pub time: f32,
}

impl FrameUniform {
    #[must_use]
    pub fn new(projection: Mat4, view: Mat4, camera_position: Vec3, time: f32) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            camera_position: camera_position.into(),
            time,
        }
    }
}

impl Default for FrameUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, 0.0)
    }
}

/// Per-draw model and material block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`
    pub normal_matrix: [[f32; 4]; 4],
    pub tint: [f32; 3],
    pub opacity: f32,
    pub shininess: f32,
    pub alpha_clip: f32,
    pub breathing_speed: f32,
    _padding: f32,
}

impl ObjectUniform {
    /// Pack a world matrix with the material scalars
    #[must_use]
    pub fn new(model: Mat4, material: &Material) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            tint: material.tint.into(),
            opacity: material.opacity,
            shininess: material.shininess,
            alpha_clip: material.alpha_clip,
            breathing_speed: material.breathing_speed,
            _padding: 0.0,
        }
    }

    /// World matrix
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

impl Default for ObjectUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, &Material::default())
    }
}

// ============================================================================
// Draw API
// ============================================================================

/// Low-level immediate-mode drawing interface
///
/// State set through this trait persists until overwritten, except that
/// `begin_pass` rebinds every texture unit to the white sentinel.
pub trait DrawApi {
    /// Start rendering into `target`, clearing colour when given and depth always
    fn begin_pass(&mut self, target: TargetDesc, clear_color: Option<Vec4>);

    fn bind_shader(&mut self, shader: ShaderHandle);

    fn set_frame(&mut self, frame: FrameUniform);

    fn set_object(&mut self, object: ObjectUniform);

    fn set_lights(&mut self, lights: &LightUniforms);

    fn set_shadow(&mut self, shadow: ShadowUniform);

    fn set_post_process(&mut self, post: PostProcessUniform);

    fn bind_texture(&mut self, unit: u32, source: TextureSource);

    fn bind_cubemap(&mut self, cubemap: CubemapHandle);

    fn set_depth_write(&mut self, enabled: bool);

    fn set_depth_compare(&mut self, compare: DepthCompare);

    fn set_blend(&mut self, blend: BlendMode);

    fn set_cull(&mut self, cull: CullMode);

    /// Draw an uploaded mesh with the current state
    fn draw_mesh(&mut self, mesh: MeshHandle);

    /// Draw a single triangle covering the target
    fn draw_fullscreen(&mut self);
}

/// A recorded [`DrawApi`] call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    BeginPass {
        target: TargetDesc,
        clear_color: Option<Vec4>,
    },
    BindShader(ShaderHandle),
    SetFrame(FrameUniform),
    SetObject(ObjectUniform),
    SetLights(Box<LightUniforms>),
    SetShadow(ShadowUniform),
    SetPostProcess(PostProcessUniform),
    BindTexture {
        unit: u32,
        source: TextureSource,
    },
    BindCubemap(CubemapHandle),
    SetDepthWrite(bool),
    SetDepthCompare(DepthCompare),
    SetBlend(BlendMode),
    SetCull(CullMode),
    DrawMesh(MeshHandle),
    DrawFullscreen,
}

/// Commands recorded for one frame
#[derive(Debug, Default, Clone)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in issue order
    #[must_use]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Drop all commands, keeping the allocation
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw calls of either kind
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawMesh(_) | RenderCommand::DrawFullscreen))
            .count()
    }

    /// Meshes drawn, in order
    pub fn drawn_meshes(&self) -> Vec<MeshHandle> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::DrawMesh(mesh) => Some(*mesh),
                _ => None,
            })
            .collect()
    }

    /// Object blocks pushed, in order
    pub fn objects(&self) -> Vec<ObjectUniform> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetObject(object) => Some(*object),
                _ => None,
            })
            .collect()
    }

    /// Targets begun, in order
    pub fn passes(&self) -> Vec<TargetKind> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BeginPass { target, .. } => Some(target.kind()),
                _ => None,
            })
            .collect()
    }
}

impl DrawApi for CommandList {
    fn begin_pass(&mut self, target: TargetDesc, clear_color: Option<Vec4>) {
        self.commands.push(RenderCommand::BeginPass {
            target,
            clear_color,
        });
    }

    fn bind_shader(&mut self, shader: ShaderHandle) {
        self.commands.push(RenderCommand::BindShader(shader));
    }

    fn set_frame(&mut self, frame: FrameUniform) {
        self.commands.push(RenderCommand::SetFrame(frame));
    }

    fn set_object(&mut self, object: ObjectUniform) {
        self.commands.push(RenderCommand::SetObject(object));
    }

    fn set_lights(&mut self, lights: &LightUniforms) {
        self.commands.push(RenderCommand::SetLights(Box::new(*lights)));
    }

    fn set_shadow(&mut self, shadow: ShadowUniform) {
        self.commands.push(RenderCommand::SetShadow(shadow));
    }

    fn set_post_process(&mut self, post: PostProcessUniform) {
        self.commands.push(RenderCommand::SetPostProcess(post));
    }

    fn bind_texture(&mut self, unit: u32, source: TextureSource) {
        self.commands.push(RenderCommand::BindTexture { unit, source });
    }

    fn bind_cubemap(&mut self, cubemap: CubemapHandle) {
        self.commands.push(RenderCommand::BindCubemap(cubemap));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.commands.push(RenderCommand::SetDepthWrite(enabled));
    }

    fn set_depth_compare(&mut self, compare: DepthCompare) {
        self.commands.push(RenderCommand::SetDepthCompare(compare));
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.commands.push(RenderCommand::SetBlend(blend));
    }

    fn set_cull(&mut self, cull: CullMode) {
        self.commands.push(RenderCommand::SetCull(cull));
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.commands.push(RenderCommand::DrawMesh(mesh));
    }

    fn draw_fullscreen(&mut self) {
        self.commands.push(RenderCommand::DrawFullscreen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<LightUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ShadowUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<PostProcessUniform>() % 16, 0);
    }

    #[test]
    fn test_object_uniform_carries_material() {
        let material = Material::default().with_opacity(0.75).with_breathing_speed(15.0);
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let object = ObjectUniform::new(model, &material);

        assert_eq!(object.model_matrix(), model);
        assert!((object.opacity - 0.75).abs() < 0.001);
        assert!((object.breathing_speed - 15.0).abs() < 0.001);
        assert!((object.shininess - 128.0).abs() < 0.001);
    }

    #[test]
    fn test_command_list_records_in_order() {
        let mut cmds = CommandList::new();
        cmds.begin_pass(TargetDesc::Screen, None);
        cmds.bind_shader(ShaderHandle(3));
        cmds.draw_mesh(MeshHandle(1));
        cmds.draw_fullscreen();

        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds.draw_count(), 2);
        assert_eq!(cmds.drawn_meshes(), vec![MeshHandle(1)]);
        assert_eq!(cmds.passes(), vec![TargetKind::Screen]);

        cmds.clear();
        assert!(cmds.is_empty());
    }
}
