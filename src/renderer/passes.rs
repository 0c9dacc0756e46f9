//! Forward lit, alpha-blend and debug-marker passes
//!
//! All three record into a [`DrawApi`]. Light data is pushed once per frame
//! by [`push_lighting`]; after that every node is one self-contained draw.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Quat, Vec3};

use super::camera::CameraView;
use super::command::{BlendMode, CullMode, DrawApi, FrameUniform, ObjectUniform, TextureSource};
use super::handles::{MeshHandle, ShaderHandle, TextureHandle};
use super::lights::LightRegistry;
use super::material::{Material, TextureChannel};
use super::settings::RenderSettings;
use super::shadow::ShadowUniform;
use crate::scene::{NodeId, SceneGraph};

/// World-space size of a light marker
const MARKER_SCALE: f32 = 0.1;

/// Per-frame inputs shared by every pass
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    pub camera: &'a dyn CameraView,
    /// Seconds since startup
    pub time: f32,
    pub settings: &'a RenderSettings,
}

impl PassContext<'_> {
    fn frame_uniform(&self) -> FrameUniform {
        FrameUniform::new(
            self.camera.projection(),
            self.camera.view(),
            self.camera.position(),
            self.time,
        )
    }
}

/// Push all light arrays and the shadow block for this frame
pub fn push_lighting(lights: &LightRegistry, shadow: ShadowUniform, cmds: &mut impl DrawApi) {
    cmds.set_lights(&lights.build_uniforms());
    cmds.set_shadow(shadow);
}

/// Draw every active node of the lit queue in container order
pub fn render_lit_pass(graph: &SceneGraph, ctx: &PassContext<'_>, cmds: &mut impl DrawApi) {
    for &id in graph.lit_queue() {
        draw_node(graph, id, ctx, cmds);
    }
}

/// One node, one draw call
fn draw_node(graph: &SceneGraph, id: NodeId, ctx: &PassContext<'_>, cmds: &mut impl DrawApi) {
    let node = graph.node(id);
    if !node.active {
        return;
    }
    let Some(renderable) = node.renderable.as_ref() else {
        return;
    };

    cmds.bind_shader(renderable.shader);
    cmds.set_frame(ctx.frame_uniform());
    cmds.set_object(ObjectUniform::new(graph.world_matrix(id), &renderable.material));

    for channel in TextureChannel::ALL {
        let texture = ctx.settings.textures.resolve(&renderable.material.textures, channel);
        cmds.bind_texture(channel.unit(), TextureSource::Asset(texture));
    }

    let double_sided = renderable.material.double_sided;
    if double_sided {
        cmds.set_cull(CullMode::None);
    }
    cmds.draw_mesh(renderable.mesh);
    if double_sided {
        cmds.set_cull(CullMode::Back);
    }
}

/// Order nodes farthest-first by squared distance from `eye`
///
/// The sort is stable, so equidistant nodes keep their queue order.
#[must_use]
pub fn sort_back_to_front(graph: &SceneGraph, nodes: &[NodeId], eye: Vec3) -> Vec<NodeId> {
    let mut keyed: Vec<(f32, NodeId)> = nodes
        .iter()
        .map(|&id| (graph.world_position(id).distance_squared(eye), id))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().map(|(_, id)| id).collect()
}

/// Alpha blending with depth writes off, for as long as the guard lives
///
/// Dropping the guard disables blending and re-enables depth writes.
pub struct BlendScope<'a, D: DrawApi> {
    cmds: &'a mut D,
}

impl<'a, D: DrawApi> BlendScope<'a, D> {
    pub fn begin(cmds: &'a mut D) -> Self {
        cmds.set_depth_write(false);
        cmds.set_blend(BlendMode::Alpha);
        Self { cmds }
    }
}

impl<D: DrawApi> Deref for BlendScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &*self.cmds
    }
}

impl<D: DrawApi> DerefMut for BlendScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut *self.cmds
    }
}

impl<D: DrawApi> Drop for BlendScope<'_, D> {
    fn drop(&mut self) {
        self.cmds.set_blend(BlendMode::Opaque);
        self.cmds.set_depth_write(true);
    }
}

/// Draw the alpha-blend queue back to front
pub fn render_transparency_pass<D: DrawApi>(
    graph: &SceneGraph,
    ctx: &PassContext<'_>,
    cmds: &mut D,
) {
    let order = sort_back_to_front(graph, graph.alpha_blend_queue(), ctx.camera.position());

    let mut scope = BlendScope::begin(cmds);
    for id in order {
        draw_node(graph, id, ctx, &mut *scope);
    }
}

/// Small unlit cube at every debug-registered light, tinted by its colour
pub fn render_light_markers(
    lights: &LightRegistry,
    mesh: MeshHandle,
    shader: ShaderHandle,
    ctx: &PassContext<'_>,
    cmds: &mut impl DrawApi,
) {
    let markers = lights.debug_markers();
    if markers.is_empty() {
        return;
    }

    cmds.bind_shader(shader);
    cmds.set_frame(ctx.frame_uniform());
    for channel in TextureChannel::ALL {
        cmds.bind_texture(channel.unit(), TextureSource::Asset(TextureHandle::WHITE));
    }

    for marker in markers {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::splat(MARKER_SCALE),
            Quat::IDENTITY,
            marker.position,
        );
        let material = Material {
            tint: marker.color,
            alpha_clip: 0.0,
            ..Material::default()
        };
        cmds.set_object(ObjectUniform::new(model, &material));
        cmds.draw_mesh(mesh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::camera::FixedCamera;
    use crate::renderer::command::{CommandList, RenderCommand};
    use crate::renderer::lights::PointLight;
    use crate::renderer::material::MaterialTextures;
    use crate::scene::{RenderQueue, Renderable, Transform};

    fn renderable(mesh: u32) -> Renderable {
        Renderable::new(MeshHandle(mesh), ShaderHandle(0), Material::default())
    }

    fn context<'a>(camera: &'a FixedCamera, settings: &'a RenderSettings) -> PassContext<'a> {
        PassContext {
            camera,
            time: 0.0,
            settings,
        }
    }

    #[test]
    fn test_transparency_draws_far_to_near() {
        let mut graph = SceneGraph::new();
        for (mesh, distance) in [(1, 1.0), (5, 5.0), (3, 3.0)] {
            graph
                .add_renderable(
                    format!("Gem {mesh}"),
                    Transform::from_position(Vec3::new(0.0, 0.0, -distance)),
                    None,
                    renderable(mesh),
                    RenderQueue::AlphaBlend,
                )
                .unwrap();
        }

        let camera = FixedCamera::at(Vec3::ZERO);
        let settings = RenderSettings::default();
        let mut cmds = CommandList::new();
        render_transparency_pass(&graph, &context(&camera, &settings), &mut cmds);

        assert_eq!(
            cmds.drawn_meshes(),
            vec![MeshHandle(5), MeshHandle(3), MeshHandle(1)]
        );
        let depths: Vec<f32> = cmds
            .objects()
            .iter()
            .map(|o| -o.model_matrix().col(3).z)
            .collect();
        assert_eq!(depths, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_transparency_state_restored() {
        let mut graph = SceneGraph::new();
        graph
            .add_renderable("Gem", Transform::new(), None, renderable(1), RenderQueue::AlphaBlend)
            .unwrap();

        let camera = FixedCamera::at(Vec3::new(0.0, 0.0, 4.0));
        let settings = RenderSettings::default();
        let mut cmds = CommandList::new();
        render_transparency_pass(&graph, &context(&camera, &settings), &mut cmds);

        let commands = cmds.commands();
        assert_eq!(commands[0], RenderCommand::SetDepthWrite(false));
        assert_eq!(commands[1], RenderCommand::SetBlend(BlendMode::Alpha));
        let tail = &commands[commands.len() - 2..];
        assert_eq!(
            tail,
            &[
                RenderCommand::SetBlend(BlendMode::Opaque),
                RenderCommand::SetDepthWrite(true)
            ]
        );
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let mut graph = SceneGraph::new();
        let a = graph
            .add_renderable("A", Transform::from_position(Vec3::X), None, renderable(1), RenderQueue::AlphaBlend)
            .unwrap();
        let b = graph
            .add_renderable("B", Transform::from_position(Vec3::NEG_X), None, renderable(2), RenderQueue::AlphaBlend)
            .unwrap();

        assert_eq!(sort_back_to_front(&graph, &[a, b], Vec3::ZERO), vec![a, b]);
        assert_eq!(sort_back_to_front(&graph, &[b, a], Vec3::ZERO), vec![b, a]);
    }

    #[test]
    fn test_lit_pass_skips_inactive_and_toggles_culling() {
        let mut graph = SceneGraph::new();
        let vine = Renderable::new(
            MeshHandle(2),
            ShaderHandle(0),
            Material::default().with_double_sided(true),
        );
        graph
            .add_renderable("Vine", Transform::new(), None, vine, RenderQueue::Lit)
            .unwrap();
        let hidden = graph
            .add_renderable("Hidden", Transform::new(), None, renderable(9), RenderQueue::Lit)
            .unwrap();
        graph.node_mut(hidden).active = false;

        let camera = FixedCamera::at(Vec3::Z);
        let settings = RenderSettings::default();
        let mut cmds = CommandList::new();
        render_lit_pass(&graph, &context(&camera, &settings), &mut cmds);

        assert_eq!(cmds.drawn_meshes(), vec![MeshHandle(2)]);
        let commands = cmds.commands();
        let draw = commands
            .iter()
            .position(|c| *c == RenderCommand::DrawMesh(MeshHandle(2)))
            .unwrap();
        assert_eq!(commands[draw - 1], RenderCommand::SetCull(CullMode::None));
        assert_eq!(commands[draw + 1], RenderCommand::SetCull(CullMode::Back));
    }

    #[test]
    fn test_lit_pass_substitutes_disabled_channels() {
        let mut textures = MaterialTextures::default();
        textures.set(TextureChannel::Emissive, TextureHandle(20));
        textures.set(TextureChannel::Diffuse, TextureHandle(21));

        let mut graph = SceneGraph::new();
        let node = Renderable::new(MeshHandle(1), ShaderHandle(0), Material::textured(textures));
        graph
            .add_renderable("Owl", Transform::new(), None, node, RenderQueue::Lit)
            .unwrap();

        let camera = FixedCamera::at(Vec3::Z);
        let mut settings = RenderSettings::default();
        settings.textures.emissive = false;
        settings.textures.diffuse = false;
        let mut cmds = CommandList::new();
        render_lit_pass(&graph, &context(&camera, &settings), &mut cmds);

        let bound: Vec<(u32, TextureSource)> = cmds
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BindTexture { unit, source } => Some((*unit, *source)),
                _ => None,
            })
            .collect();
        assert!(bound.contains(&(0, TextureSource::Asset(TextureHandle::WHITE))));
        assert!(bound.contains(&(3, TextureSource::Asset(TextureHandle::BLACK))));
    }

    #[test]
    fn test_lighting_pushed_once() {
        let mut lights = LightRegistry::new();
        lights.add_point(PointLight::new("Gem", Vec3::ZERO));
        let mut cmds = CommandList::new();
        push_lighting(&lights, ShadowUniform::default(), &mut cmds);

        let light_blocks = cmds
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::SetLights(_)))
            .count();
        assert_eq!(light_blocks, 1);
    }

    #[test]
    fn test_one_marker_per_debug_entry() {
        let mut lights = LightRegistry::new();
        lights.add_point(PointLight::new("A", Vec3::X));
        lights.add_point(PointLight::new("B", Vec3::Y));

        let camera = FixedCamera::at(Vec3::Z);
        let settings = RenderSettings::default();
        let mut cmds = CommandList::new();
        render_light_markers(&lights, MeshHandle(7), ShaderHandle(1), &context(&camera, &settings), &mut cmds);

        assert_eq!(cmds.drawn_meshes(), vec![MeshHandle(7), MeshHandle(7)]);
    }
}
