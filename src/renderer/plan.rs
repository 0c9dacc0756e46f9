//! Replay of a recorded frame into self-contained draw operations
//!
//! The [`DrawApi`](super::command::DrawApi) is stateful; wgpu wants every
//! draw to name its pipeline, bind groups and offsets. [`FramePlan::build`]
//! walks a [`CommandList`] once, packs every uniform block into one byte arena
//! at dynamic-offset alignment, and emits one [`DrawOp`] per draw call with the
//! state in effect at that point.

use bytemuck::Pod;
use glam::Vec4;

use super::command::{
    BlendMode, CommandList, FrameUniform, ObjectUniform, RasterState, RenderCommand,
    TEXTURE_UNITS, TargetDesc, TargetKind, TextureSource,
};
use super::handles::{CubemapHandle, MeshHandle, ShaderHandle, TextureHandle};
use super::lights::LightUniforms;
use super::postprocess::PostProcessUniform;
use super::shadow::ShadowUniform;

/// Uniform blocks in binding order of bind group 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSlot {
    Frame = 0,
    Object = 1,
    Lights = 2,
    Shadow = 3,
    PostProcess = 4,
}

pub const UNIFORM_SLOTS: usize = 5;

/// Everything that selects a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderHandle,
    pub raster: RasterState,
    pub target: TargetKind,
}

/// What a draw rasterizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Mesh(MeshHandle),
    /// One triangle generated from the vertex index
    Fullscreen,
}

/// A draw with all of its state resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawOp {
    pub pipeline: PipelineKey,
    /// Byte offsets into the uniform arena, indexed by [`UniformSlot`]
    pub offsets: [u32; UNIFORM_SLOTS],
    pub textures: [TextureSource; TEXTURE_UNITS],
    pub cubemap: CubemapHandle,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOp {
    Begin {
        target: TargetDesc,
        clear_color: Option<Vec4>,
    },
    Draw(DrawOp),
}

/// Round `value` up to a multiple of `alignment`
#[must_use]
pub const fn align_to(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Uniform blocks of one frame, packed at dynamic-offset alignment
#[derive(Debug, Clone, Default)]
pub struct UniformArena {
    bytes: Vec<u8>,
    alignment: u64,
}

impl UniformArena {
    #[must_use]
    pub fn new(alignment: u32) -> Self {
        Self {
            bytes: Vec::new(),
            alignment: u64::from(alignment.max(1)),
        }
    }

    /// Append a block and return its offset
    pub fn push<T: Pod>(&mut self, value: &T) -> u32 {
        let offset = align_to(self.bytes.len() as u64, self.alignment);
        self.bytes.resize(offset as usize, 0);
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
        offset as u32
    }

    /// Packed bytes, padded to a multiple of 4
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn finish(&mut self) {
        let padded = align_to(self.bytes.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        self.bytes.resize(padded as usize, 0);
    }
}

/// Resolved operations and uniform data of one frame
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub ops: Vec<FrameOp>,
    pub uniforms: UniformArena,
    /// Draws dropped because no shader was bound or no pass was begun
    pub skipped: usize,
}

struct ReplayState {
    target: Option<TargetKind>,
    shader: Option<ShaderHandle>,
    raster: RasterState,
    offsets: [u32; UNIFORM_SLOTS],
    textures: [TextureSource; TEXTURE_UNITS],
    cubemap: CubemapHandle,
}

impl FramePlan {
    /// Replay `commands`, packing uniforms with `alignment` between blocks
    #[must_use]
    pub fn build(commands: &CommandList, alignment: u32) -> Self {
        let mut uniforms = UniformArena::new(alignment);

        // Defaults first, so every slot has a valid offset before it is set
        let offsets = [
            uniforms.push(&FrameUniform::default()),
            uniforms.push(&ObjectUniform::default()),
            uniforms.push(&LightUniforms::default()),
            uniforms.push(&ShadowUniform::default()),
            uniforms.push(&PostProcessUniform::default()),
        ];

        let mut state = ReplayState {
            target: None,
            shader: None,
            raster: RasterState::default(),
            offsets,
            textures: [TextureSource::Asset(TextureHandle::WHITE); TEXTURE_UNITS],
            cubemap: CubemapHandle::BLACK,
        };
        let mut ops = Vec::new();
        let mut skipped = 0;

        for command in commands.commands() {
            match command {
                RenderCommand::BeginPass {
                    target,
                    clear_color,
                } => {
                    state.target = Some(target.kind());
                    state.textures = [TextureSource::Asset(TextureHandle::WHITE); TEXTURE_UNITS];
                    ops.push(FrameOp::Begin {
                        target: *target,
                        clear_color: *clear_color,
                    });
                }
                RenderCommand::BindShader(shader) => state.shader = Some(*shader),
                RenderCommand::SetFrame(frame) => {
                    state.offsets[UniformSlot::Frame as usize] = uniforms.push(frame);
                }
                RenderCommand::SetObject(object) => {
                    state.offsets[UniformSlot::Object as usize] = uniforms.push(object);
                }
                RenderCommand::SetLights(lights) => {
                    state.offsets[UniformSlot::Lights as usize] = uniforms.push(lights.as_ref());
                }
                RenderCommand::SetShadow(shadow) => {
                    state.offsets[UniformSlot::Shadow as usize] = uniforms.push(shadow);
                }
                RenderCommand::SetPostProcess(post) => {
                    state.offsets[UniformSlot::PostProcess as usize] = uniforms.push(post);
                }
                RenderCommand::BindTexture { unit, source } => {
                    match state.textures.get_mut(*unit as usize) {
                        Some(slot) => *slot = *source,
                        None => log::warn!("texture unit {unit} out of range, ignored"),
                    }
                }
                RenderCommand::BindCubemap(cubemap) => state.cubemap = *cubemap,
                RenderCommand::SetDepthWrite(enabled) => state.raster.depth_write = *enabled,
                RenderCommand::SetDepthCompare(compare) => state.raster.depth_compare = *compare,
                RenderCommand::SetBlend(blend) => state.raster.blend = *blend,
                RenderCommand::SetCull(cull) => state.raster.cull = *cull,
                RenderCommand::DrawMesh(mesh) => {
                    match state.draw(Geometry::Mesh(*mesh)) {
                        Some(op) => ops.push(FrameOp::Draw(op)),
                        None => skipped += 1,
                    }
                }
                RenderCommand::DrawFullscreen => match state.draw(Geometry::Fullscreen) {
                    Some(op) => ops.push(FrameOp::Draw(op)),
                    None => skipped += 1,
                },
            }
        }

        if skipped > 0 {
            log::warn!("{skipped} draw(s) issued without a shader or pass were skipped");
        }

        uniforms.finish();
        Self {
            ops,
            uniforms,
            skipped,
        }
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter_map(|op| match op {
            FrameOp::Draw(draw) => Some(draw),
            FrameOp::Begin { .. } => None,
        })
    }
}

impl ReplayState {
    fn draw(&self, geometry: Geometry) -> Option<DrawOp> {
        let target = self.target?;
        let shader = self.shader?;

        let mut raster = self.raster;
        if target == TargetKind::Shadow {
            // The depth map has no colour attachment to blend into
            raster.blend = BlendMode::Opaque;
        }

        Some(DrawOp {
            pipeline: PipelineKey {
                shader,
                raster,
                target,
            },
            offsets: self.offsets,
            textures: self.textures,
            cubemap: self.cubemap,
            geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::{DepthCompare, DrawApi};
    use crate::renderer::frame::Viewport;

    const ALIGN: u32 = 256;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(300, 256), 512);
        assert_eq!(align_to(7, 1), 7);
    }

    #[test]
    fn test_blocks_are_aligned() {
        let mut arena = UniformArena::new(ALIGN);
        let a = arena.push(&FrameUniform::default());
        let b = arena.push(&ObjectUniform::default());
        let c = arena.push(&LightUniforms::default());
        assert_eq!((a, b, c), (0, 256, 512));
        assert_eq!(arena.bytes().len(), 512 + std::mem::size_of::<LightUniforms>());
    }

    #[test]
    fn test_draw_captures_state() {
        let mut cmds = CommandList::new();
        cmds.begin_pass(TargetDesc::Scene(Viewport::new(8, 8).unwrap()), None);
        cmds.bind_shader(ShaderHandle(2));
        cmds.set_object(ObjectUniform::default());
        cmds.bind_texture(3, TextureSource::Asset(TextureHandle(7)));
        cmds.set_depth_write(false);
        cmds.set_depth_compare(DepthCompare::LessEqual);
        cmds.draw_mesh(MeshHandle(4));

        let plan = FramePlan::build(&cmds, ALIGN);
        let draws: Vec<&DrawOp> = plan.draws().collect();
        assert_eq!(draws.len(), 1);

        let draw = draws[0];
        assert_eq!(draw.pipeline.shader, ShaderHandle(2));
        assert_eq!(draw.pipeline.target, TargetKind::Scene);
        assert!(!draw.pipeline.raster.depth_write);
        assert_eq!(draw.pipeline.raster.depth_compare, DepthCompare::LessEqual);
        assert_eq!(draw.textures[3], TextureSource::Asset(TextureHandle(7)));
        assert_eq!(draw.textures[0], TextureSource::Asset(TextureHandle::WHITE));
        assert_eq!(draw.geometry, Geometry::Mesh(MeshHandle(4)));
        // the object block follows the five defaults
        assert_eq!(draw.offsets[UniformSlot::Object as usize], 5 * ALIGN);
        assert_eq!(draw.offsets[UniformSlot::Frame as usize], 0);
    }

    #[test]
    fn test_begin_pass_resets_textures() {
        let mut cmds = CommandList::new();
        cmds.begin_pass(TargetDesc::Screen, None);
        cmds.bind_shader(ShaderHandle(0));
        cmds.bind_texture(0, TextureSource::SceneColor);
        cmds.draw_fullscreen();
        cmds.begin_pass(TargetDesc::Shadow, None);
        cmds.draw_mesh(MeshHandle(1));

        let plan = FramePlan::build(&cmds, ALIGN);
        let draws: Vec<&DrawOp> = plan.draws().collect();
        assert_eq!(draws[0].textures[0], TextureSource::SceneColor);
        assert_eq!(draws[1].textures[0], TextureSource::Asset(TextureHandle::WHITE));
        assert_eq!(draws[1].pipeline.target, TargetKind::Shadow);
    }

    #[test]
    fn test_draw_without_shader_or_pass_is_skipped() {
        let mut cmds = CommandList::new();
        cmds.bind_shader(ShaderHandle(0));
        cmds.draw_mesh(MeshHandle(1));
        let plan = FramePlan::build(&cmds, ALIGN);
        assert_eq!(plan.skipped, 1);
        assert_eq!(plan.draws().count(), 0);

        let mut cmds = CommandList::new();
        cmds.begin_pass(TargetDesc::Screen, None);
        cmds.draw_fullscreen();
        assert_eq!(FramePlan::build(&cmds, ALIGN).skipped, 1);
    }

    #[test]
    fn test_shadow_target_never_blends() {
        let mut cmds = CommandList::new();
        cmds.begin_pass(TargetDesc::Shadow, None);
        cmds.bind_shader(ShaderHandle(0));
        cmds.set_blend(BlendMode::Alpha);
        cmds.draw_mesh(MeshHandle(0));

        let plan = FramePlan::build(&cmds, ALIGN);
        let draw = plan.draws().next().unwrap();
        assert_eq!(draw.pipeline.raster.blend, BlendMode::Opaque);
    }
}
