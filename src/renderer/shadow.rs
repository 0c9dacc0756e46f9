//! Shadow mapping for the primary directional light
//!
//! One orthographic depth render from the first directional light. The
//! resulting light-space matrix is used both to render the depth map and to
//! project fragments into it in the lit pass.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::command::{DrawApi, FrameUniform, ObjectUniform, TargetDesc};
use super::handles::ShaderHandle;
use super::lights::LightRegistry;
use crate::scene::SceneGraph;

/// Shadow map resolution (width and height)
pub const SHADOW_RESOLUTION: u32 = 2048;

/// Depth format of the shadow map
pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Below this, a light direction is treated as parallel to +Y
const PARALLEL_EPSILON: f32 = 1e-4;

/// Shadow configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Sample the shadow map in the lit pass
    pub enabled: bool,
    /// 0 leaves shadowed fragments fully lit, 1 removes all direct light
    pub strength: f32,
    /// Depth bias to prevent shadow acne
    pub bias: f32,
    /// Half-extent of the orthographic frustum
    pub bounds: f32,
    /// Near plane for shadow camera
    pub near: f32,
    /// Far plane for shadow camera
    pub far: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
            bias: 0.0005,
            bounds: 35.0,
            near: 1.0,
            far: 100.0,
        }
    }
}

/// Shadow uniform data for shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowUniform {
    pub light_space: [[f32; 4]; 4],
    /// 1 when shadows are sampled
    pub enabled: u32,
    pub strength: f32,
    pub bias: f32,
    _padding: f32,
}

impl ShadowUniform {
    #[must_use]
    pub fn new(light_space: Mat4, settings: &ShadowSettings) -> Self {
        Self {
            light_space: light_space.to_cols_array_2d(),
            enabled: u32::from(settings.enabled),
            strength: settings.strength,
            bias: settings.bias,
            _padding: 0.0,
        }
    }

    #[must_use]
    pub fn light_space_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_space)
    }
}

impl Default for ShadowUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, &ShadowSettings::default())
    }
}

/// Projection × view from a directional light's point of view
///
/// The light sits at `-direction * (near + far) / 2` looking at the origin.
/// Only the direction's orientation matters: it is normalized first, so the
/// origin always lands on the middle depth plane whatever its length.
#[must_use]
pub fn light_space_matrix(direction: Vec3, settings: &ShadowSettings) -> Mat4 {
    let direction = direction.normalize_or(Vec3::NEG_Y);
    let mid_plane = (settings.near + settings.far) * 0.5;

    let projection = Mat4::orthographic_rh(
        -settings.bounds,
        settings.bounds,
        -settings.bounds,
        settings.bounds,
        settings.near,
        settings.far,
    );

    let up = if direction.cross(Vec3::Y).length_squared() < PARALLEL_EPSILON {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(-direction * mid_plane, Vec3::ZERO, up);

    projection * view
}

/// Render the depth map and return the block the lit pass samples it with
///
/// Without a directional light the pass still clears its target, draws
/// nothing, and the returned block has shadows disabled.
pub fn render_shadow_pass(
    graph: &SceneGraph,
    lights: &LightRegistry,
    settings: &ShadowSettings,
    shader: ShaderHandle,
    cmds: &mut impl DrawApi,
) -> ShadowUniform {
    cmds.begin_pass(TargetDesc::Shadow, None);

    let Some(sun) = lights.primary_directional() else {
        return ShadowUniform::new(
            Mat4::IDENTITY,
            &ShadowSettings {
                enabled: false,
                ..*settings
            },
        );
    };

    let light_space = light_space_matrix(sun.direction, settings);
    let uniform = ShadowUniform::new(light_space, settings);
    if !settings.enabled {
        return uniform;
    }

    cmds.bind_shader(shader);
    cmds.set_frame(FrameUniform::new(light_space, Mat4::IDENTITY, Vec3::ZERO, 0.0));

    for &id in graph.lit_queue() {
        let node = graph.node(id);
        let Some(renderable) = node.renderable.as_ref() else {
            continue;
        };
        if !node.active {
            continue;
        }
        cmds.set_object(ObjectUniform::new(graph.world_matrix(id), &renderable.material));
        cmds.draw_mesh(renderable.mesh);
    }

    uniform
}

/// Depth texture the shadow pass renders into
#[derive(Debug)]
pub struct ShadowMap {
    pub texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    /// Comparison sampler for `textureSampleCompare`
    pub sampler: wgpu::Sampler,
}

impl ShadowMap {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let size = wgpu::Extent3d {
            width: SHADOW_RESOLUTION,
            height: SHADOW_RESOLUTION,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_map_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let depth_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        Self {
            texture,
            depth_view,
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::{CommandList, TargetKind};
    use crate::renderer::lights::DirectionalLight;
    use crate::renderer::{Material, MeshHandle};
    use crate::scene::{RenderQueue, Renderable, Transform};

    fn lit_scene() -> SceneGraph {
        let mut graph = SceneGraph::new();
        let renderable = Renderable::new(MeshHandle(4), ShaderHandle(0), Material::default());
        graph
            .add_renderable("Base", Transform::new(), None, renderable, RenderQueue::Lit)
            .unwrap();
        let gem = Renderable::new(MeshHandle(5), ShaderHandle(0), Material::default());
        graph
            .add_renderable("Gem", Transform::new(), None, gem, RenderQueue::AlphaBlend)
            .unwrap();
        graph
    }

    #[test]
    fn test_light_space_maps_origin_to_mid_depth() {
        let settings = ShadowSettings::default();
        let matrix = light_space_matrix(Vec3::new(-1.0, -2.0, -1.0), &settings);
        let clip = matrix.project_point3(Vec3::ZERO);

        assert!(clip.x.abs() < 0.001);
        assert!(clip.y.abs() < 0.001);
        // (mid - near) / (far - near) with wgpu's [0, 1] depth range
        let expected = (50.5 - 1.0) / (100.0 - 1.0);
        assert!((clip.z - expected).abs() < 0.001);
    }

    #[test]
    fn test_direction_length_is_ignored() {
        let settings = ShadowSettings::default();
        let unit = light_space_matrix(Vec3::new(0.0, -1.0, -1.0).normalize(), &settings);
        let long = light_space_matrix(Vec3::new(0.0, -5.0, -5.0), &settings);
        let short = light_space_matrix(Vec3::new(0.0, -0.1, -0.1), &settings);

        assert!(long.abs_diff_eq(unit, 1e-4));
        assert!(short.abs_diff_eq(unit, 1e-4));
    }

    #[test]
    fn test_vertical_light_does_not_degenerate() {
        let matrix = light_space_matrix(Vec3::NEG_Y, &ShadowSettings::default());
        assert!(!matrix.is_nan());
        assert!(matrix.is_finite());
    }

    #[test]
    fn test_no_directional_light_is_empty_pass() {
        let graph = lit_scene();
        let lights = LightRegistry::new();
        let settings = ShadowSettings {
            enabled: true,
            ..Default::default()
        };
        let mut cmds = CommandList::new();

        let uniform = render_shadow_pass(&graph, &lights, &settings, ShaderHandle(2), &mut cmds);

        assert_eq!(cmds.passes(), vec![TargetKind::Shadow]);
        assert_eq!(cmds.draw_count(), 0);
        assert_eq!(uniform.enabled, 0);
    }

    #[test]
    fn test_shadow_pass_draws_lit_queue_only() {
        let graph = lit_scene();
        let mut lights = LightRegistry::new();
        lights.add_directional(DirectionalLight::new("Sun", Vec3::new(-1.0, -2.0, -1.0)));
        let settings = ShadowSettings {
            enabled: true,
            ..Default::default()
        };
        let mut cmds = CommandList::new();

        let uniform = render_shadow_pass(&graph, &lights, &settings, ShaderHandle(2), &mut cmds);

        assert_eq!(cmds.drawn_meshes(), vec![MeshHandle(4)]);
        assert_eq!(uniform.enabled, 1);
        assert!((uniform.bias - 0.0005).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_shadows_skip_draws() {
        let graph = lit_scene();
        let mut lights = LightRegistry::new();
        lights.add_directional(DirectionalLight::new("Sun", Vec3::NEG_Y));
        let mut cmds = CommandList::new();

        render_shadow_pass(&graph, &lights, &ShadowSettings::default(), ShaderHandle(2), &mut cmds);

        assert_eq!(cmds.passes(), vec![TargetKind::Shadow]);
        assert_eq!(cmds.draw_count(), 0);
    }
}
