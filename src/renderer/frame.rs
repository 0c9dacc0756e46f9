//! Frame orchestration
//!
//! [`RenderContext`] owns everything a frame needs besides the scene itself:
//! shader handles, the viewport, the skybox, and the handful of built-in
//! resources used by the debug and composite passes. `draw` records the shadow
//! pass, the lit pass, the sky, transparency and optional light markers;
//! `post_draw` records the composite onto the screen.

use thiserror::Error;

use super::camera::CameraView;
use super::command::{DrawApi, TargetDesc};
use super::handles::{MeshHandle, ShaderHandle, TextureHandle};
use super::lights::LightRegistry;
use super::loader::{AssetError, ResourceLoader};
use super::passes::{
    PassContext, push_lighting, render_light_markers, render_lit_pass, render_transparency_pass,
};
use super::postprocess::render_composite;
use super::settings::RenderSettings;
use super::shaders::ShaderKind;
use super::shadow::render_shadow_pass;
use super::skybox::Skybox;
use crate::scene::SceneGraph;

/// Errors raised by the render pipeline
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid viewport size {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("shaders have not been loaded")]
    ShadersNotLoaded,
    #[error("frame resources have not been preloaded")]
    NotPreloaded,
    #[error(transparent)]
    Scene(#[from] crate::scene::SceneError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Size of the scene target in pixels, never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    width: u32,
    height: u32,
}

impl Viewport {
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidViewport`] if either side is zero
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidViewport { width, height });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Handles of every program the frame uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderSet {
    pub lit: ShaderHandle,
    pub fire: ShaderHandle,
    pub unlit: ShaderHandle,
    pub shadow: ShaderHandle,
    pub skybox: ShaderHandle,
    pub screen: ShaderHandle,
}

impl ShaderSet {
    /// Compile every program
    ///
    /// # Errors
    ///
    /// Returns the first compile failure
    pub fn load<L: ResourceLoader + ?Sized>(loader: &mut L) -> Result<Self, AssetError> {
        Ok(Self {
            lit: loader.load_shader(ShaderKind::Lit)?,
            fire: loader.load_shader(ShaderKind::Fire)?,
            unlit: loader.load_shader(ShaderKind::Unlit)?,
            shadow: loader.load_shader(ShaderKind::Shadow)?,
            skybox: loader.load_shader(ShaderKind::Skybox)?,
            screen: loader.load_shader(ShaderKind::Screen)?,
        })
    }

    #[must_use]
    pub const fn handles(&self) -> [ShaderHandle; 6] {
        [
            self.lit,
            self.fire,
            self.unlit,
            self.shadow,
            self.skybox,
            self.screen,
        ]
    }
}

/// Built-in resources shared by the frame passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResources {
    pub skybox: Skybox,
    /// Multiplied over the image by the scanline effect
    pub scanline: TextureHandle,
    /// Drawn at each light when debug drawing is on
    pub marker_mesh: MeshHandle,
}

/// Per-scene render state: viewport, shaders and frame resources
#[derive(Debug)]
pub struct RenderContext {
    viewport: Viewport,
    shaders: Option<ShaderSet>,
    resources: FrameResources,
}

impl RenderContext {
    #[must_use]
    pub const fn new(viewport: Viewport, resources: FrameResources) -> Self {
        Self {
            viewport,
            shaders: None,
            resources,
        }
    }

    /// Compile the shaders, or recompile them if already loaded
    ///
    /// A failed recompile is logged and leaves that program as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the first compile of any program fails
    pub fn load_shaders<L: ResourceLoader + ?Sized>(
        &mut self,
        loader: &mut L,
    ) -> Result<(), AssetError> {
        let Some(shaders) = self.shaders else {
            self.shaders = Some(ShaderSet::load(loader)?);
            log::info!("Shaders loaded");
            return Ok(());
        };

        let mut failures = 0;
        for handle in shaders.handles() {
            if let Err(err) = loader.reload_shader(handle) {
                log::error!("{err}; keeping the previous program");
                failures += 1;
            }
        }
        if failures == 0 {
            log::info!("Shaders reloaded");
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RenderError::ShadersNotLoaded`] before the first
    /// [`load_shaders`](Self::load_shaders)
    pub fn shaders(&self) -> Result<&ShaderSet, RenderError> {
        self.shaders.as_ref().ok_or(RenderError::ShadersNotLoaded)
    }

    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub const fn resources(&self) -> &FrameResources {
        &self.resources
    }

    /// Track a new window size; the next frame renders at that size
    ///
    /// # Errors
    ///
    /// Zero-sized requests are rejected and leave the viewport unchanged
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        let viewport = Viewport::new(width, height)?;
        if viewport != self.viewport {
            log::debug!("Scene target resized to {width}x{height}");
            self.viewport = viewport;
        }
        Ok(())
    }

    /// Record the scene into the off-screen target
    ///
    /// # Errors
    ///
    /// Returns an error if shaders have not been loaded
    pub fn draw(
        &self,
        graph: &SceneGraph,
        lights: &LightRegistry,
        camera: &dyn CameraView,
        time: f32,
        settings: &RenderSettings,
        cmds: &mut impl DrawApi,
    ) -> Result<(), RenderError> {
        let shaders = self.shaders()?;
        let ctx = PassContext {
            camera,
            time,
            settings,
        };

        let shadow = render_shadow_pass(graph, lights, &settings.shadow, shaders.shadow, cmds);

        cmds.begin_pass(TargetDesc::Scene(self.viewport), Some(settings.clear_color));
        push_lighting(lights, shadow, cmds);
        render_lit_pass(graph, &ctx, cmds);
        self.resources
            .skybox
            .draw(camera, time, shaders.skybox, cmds);
        render_transparency_pass(graph, &ctx, cmds);

        if settings.debug_lights {
            render_light_markers(
                lights,
                self.resources.marker_mesh,
                shaders.unlit,
                &ctx,
                cmds,
            );
        }
        Ok(())
    }

    /// Record the composite of the scene target onto the screen
    ///
    /// # Errors
    ///
    /// Returns an error if shaders have not been loaded
    pub fn post_draw(
        &self,
        time: f32,
        settings: &RenderSettings,
        cmds: &mut impl DrawApi,
    ) -> Result<(), RenderError> {
        let shaders = self.shaders()?;
        render_composite(
            &settings.post,
            time,
            self.resources.scanline,
            shaders.screen,
            cmds,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::renderer::camera::FixedCamera;
    use crate::renderer::command::{CommandList, RenderCommand, TargetKind, TextureSource};
    use crate::renderer::handles::CubemapHandle;
    use crate::renderer::lights::{DirectionalLight, PointLight};
    use crate::renderer::loader::MockLoader;
    use crate::renderer::material::Material;
    use crate::scene::{RenderQueue, Renderable, Transform};

    fn resources() -> FrameResources {
        FrameResources {
            skybox: Skybox::new(MeshHandle(90), CubemapHandle(1)),
            scanline: TextureHandle(40),
            marker_mesh: MeshHandle(91),
        }
    }

    fn loaded_context(width: u32, height: u32) -> RenderContext {
        let mut context = RenderContext::new(Viewport::new(width, height).unwrap(), resources());
        context.load_shaders(&mut MockLoader::new()).unwrap();
        context
    }

    fn scene() -> (SceneGraph, LightRegistry) {
        let mut graph = SceneGraph::new();
        let renderable = Renderable::new(MeshHandle(1), ShaderHandle(0), Material::default());
        graph
            .add_renderable(
                "Statue",
                Transform::default(),
                None,
                renderable.clone(),
                RenderQueue::Lit,
            )
            .unwrap();
        graph
            .add_renderable(
                "Gem",
                Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
                None,
                renderable,
                RenderQueue::AlphaBlend,
            )
            .unwrap();

        let mut lights = LightRegistry::new();
        lights.add_directional(DirectionalLight::new("Sun", Vec3::new(-1.0, -2.0, -1.0)));
        lights.add_point(PointLight::new("Lamp", Vec3::Y));
        (graph, lights)
    }

    #[test]
    fn test_viewport_rejects_zero() {
        assert!(matches!(
            Viewport::new(0, 600),
            Err(RenderError::InvalidViewport { width: 0, height: 600 })
        ));
        assert!(Viewport::new(800, 0).is_err());
        assert!((Viewport::new(800, 600).unwrap().aspect() - 4.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_draw_before_shaders_is_an_error() {
        let context = RenderContext::new(Viewport::new(800, 600).unwrap(), resources());
        let (graph, lights) = scene();
        let camera = FixedCamera::at(Vec3::new(0.0, 0.0, 5.0));
        let mut cmds = CommandList::new();

        let result = context.draw(
            &graph,
            &lights,
            &camera,
            0.0,
            &RenderSettings::default(),
            &mut cmds,
        );
        assert!(matches!(result, Err(RenderError::ShadersNotLoaded)));
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_frame_pass_order() {
        let context = loaded_context(800, 600);
        let (graph, lights) = scene();
        let camera = FixedCamera::at(Vec3::new(0.0, 0.0, 5.0));
        let settings = RenderSettings {
            debug_lights: true,
            ..RenderSettings::default()
        };
        let mut cmds = CommandList::new();

        context
            .draw(&graph, &lights, &camera, 1.0, &settings, &mut cmds)
            .unwrap();
        context.post_draw(1.0, &settings, &mut cmds).unwrap();

        assert_eq!(
            cmds.passes(),
            vec![TargetKind::Shadow, TargetKind::Scene, TargetKind::Screen]
        );
        // statue, sky, gem, then one marker per light
        assert_eq!(
            cmds.drawn_meshes(),
            vec![
                MeshHandle(1),
                MeshHandle(90),
                MeshHandle(1),
                MeshHandle(91),
                MeshHandle(91)
            ]
        );
        let lights_pushed = cmds
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::SetLights(_)))
            .count();
        assert_eq!(lights_pushed, 1);
        assert_eq!(cmds.commands().last(), Some(&RenderCommand::DrawFullscreen));
    }

    #[test]
    fn test_resize_then_composite() {
        let mut context = loaded_context(800, 600);
        let (graph, lights) = scene();
        let camera = FixedCamera::at(Vec3::new(0.0, 0.0, 5.0));
        let settings = RenderSettings::default();

        context.on_resize(1920, 1080).unwrap();
        assert_eq!(context.viewport(), Viewport::new(1920, 1080).unwrap());

        let mut cmds = CommandList::new();
        context
            .draw(&graph, &lights, &camera, 0.0, &settings, &mut cmds)
            .unwrap();
        context.post_draw(0.0, &settings, &mut cmds).unwrap();

        let scene_target = cmds.commands().iter().find_map(|c| match c {
            RenderCommand::BeginPass {
                target: TargetDesc::Scene(viewport),
                ..
            } => Some(*viewport),
            _ => None,
        });
        assert_eq!(scene_target, Some(Viewport::new(1920, 1080).unwrap()));
        assert!(cmds.commands().contains(&RenderCommand::BindTexture {
            unit: 0,
            source: TextureSource::SceneColor
        }));
        assert_eq!(cmds.commands().last(), Some(&RenderCommand::DrawFullscreen));
    }

    #[test]
    fn test_zero_resize_keeps_viewport() {
        let mut context = loaded_context(800, 600);
        assert!(context.on_resize(0, 1080).is_err());
        assert_eq!(context.viewport(), Viewport::new(800, 600).unwrap());
    }

    #[test]
    fn test_load_shaders_twice_reloads() {
        let mut loader = MockLoader::new();
        let mut context = RenderContext::new(Viewport::new(800, 600).unwrap(), resources());

        context.load_shaders(&mut loader).unwrap();
        let first = *context.shaders().unwrap();
        context.load_shaders(&mut loader).unwrap();

        assert_eq!(*context.shaders().unwrap(), first);
        assert_eq!(loader.shaders.len(), ShaderKind::ALL.len());
        assert_eq!(loader.reloads.len(), ShaderKind::ALL.len());
    }

    #[test]
    fn test_failed_reload_keeps_handles() {
        let mut loader = MockLoader::new();
        let mut context = RenderContext::new(Viewport::new(800, 600).unwrap(), resources());
        context.load_shaders(&mut loader).unwrap();
        let first = *context.shaders().unwrap();

        loader.fail_reload = true;
        assert!(context.load_shaders(&mut loader).is_ok());
        assert_eq!(*context.shaders().unwrap(), first);
    }
}
