//! The shrine diorama
//!
//! A textured base carrying vines, a sleeping figure and four animal
//! figurines, a ring of four gems orbiting a pivot with a coloured light in
//! each, and four torches whose flames each carry a warm point light. A
//! single sun lights and shadows the lot.

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::core::SceneApp;
use crate::input::SceneAction;
use crate::renderer::{
    Camera, CameraView, CommandList, DirectionalLight, FrameResources, LightRegistry, Material,
    MaterialTextures, Mesh, MeshHandle, PointLight, PointLightId, RenderContext, RenderError,
    RenderSettings, ResourceLoader, SamplerConfig, ShaderSet, Skybox, SpotLight, TextureChannel,
    TextureHandle, TextureSet, Viewport, cubemap_or_black, mesh_or_cube, scanline_pattern,
};
use crate::scene::{NodeId, RenderQueue, Renderable, SceneGraph, Transform};

const ALL_CHANNELS: [TextureChannel; 5] = TextureChannel::ALL;
const NO_EMISSIVE: [TextureChannel; 4] = [
    TextureChannel::Diffuse,
    TextureChannel::Specular,
    TextureChannel::Normal,
    TextureChannel::AmbientOcclusion,
];

/// Degrees per second
const PIVOT_SPIN_SPEED: f32 = 50.0;
const GEM_SPIN_SPEED: f32 = 50.0;
const FIRE_SPIN_SPEED: f32 = 500.0;

const GEM_WAVE_AMPLITUDE: f32 = 0.25;
const GEM_WAVE_FREQUENCY: f32 = 3.0;
/// Hue cycles per second
const RAINBOW_SPEED: f32 = 0.5;

/// Height of the scanline pattern generated when its texture is missing
const SCANLINE_FALLBACK_HEIGHT: u32 = 4;

/// `amp * sin(freq * (phase + t))`
fn wave(amplitude: f32, frequency: f32, phase: f32, t: f32) -> f32 {
    amplitude * (frequency * (phase + t)).sin()
}

/// Three sines a third of a turn apart, cycling `speed` times per second
fn rainbow(t: f32, speed: f32, offset: f32) -> Vec3 {
    let phase = (t * speed + offset).rem_euclid(1.0) * TAU;
    Vec3::new(
        0.5 + 0.5 * phase.sin(),
        0.5 + 0.5 * (phase + TAU / 3.0).sin(),
        0.5 + 0.5 * (phase + 2.0 * TAU / 3.0).sin(),
    )
}

struct GemLayout {
    name: &'static str,
    model: &'static str,
    position: Vec3,
    light_color: Vec3,
    /// Sign of the spin on each axis
    spin: Vec3,
    wave_phase: f32,
    hue_offset: f32,
}

const GEMS: [GemLayout; 4] = [
    GemLayout {
        name: "Blue Gem",
        model: "blue",
        position: Vec3::new(1.6, 0.0, 0.0),
        light_color: Vec3::new(0.0, 0.0, 1.0),
        spin: Vec3::new(1.0, 1.0, 1.0),
        wave_phase: std::f32::consts::PI,
        hue_offset: 0.66,
    },
    GemLayout {
        name: "Green Gem",
        model: "green",
        position: Vec3::new(0.0, 0.0, -1.6),
        light_color: Vec3::new(0.0, 1.0, 0.0),
        spin: Vec3::new(-1.0, -1.0, -1.0),
        wave_phase: 0.0,
        hue_offset: 0.33,
    },
    GemLayout {
        name: "Purple Gem",
        model: "purple",
        position: Vec3::new(-1.6, 0.0, 0.0),
        light_color: Vec3::new(1.0, 0.0, 1.0),
        spin: Vec3::new(-1.0, 1.0, -1.0),
        wave_phase: std::f32::consts::PI,
        hue_offset: 0.167,
    },
    GemLayout {
        name: "Red Gem",
        model: "red",
        position: Vec3::new(0.0, 0.0, 1.6),
        light_color: Vec3::new(1.0, 0.0, 0.0),
        spin: Vec3::new(1.0, -1.0, 1.0),
        wave_phase: 0.0,
        hue_offset: 0.0,
    },
];

/// Torch positions and yaw in degrees, relative to the base
const TORCHES: [(Vec3, f32); 4] = [
    (Vec3::new(-1.6, 0.8, 0.6), 0.0),
    (Vec3::new(1.6, 0.8, 0.6), 45.0),
    (Vec3::new(-1.6, 0.8, -2.8), 90.0),
    (Vec3::new(1.6, 0.8, -2.8), 135.0),
];

struct Figurine {
    name: &'static str,
    model: &'static str,
    position: Vec3,
    rotation: Vec3,
    breathing_speed: f32,
}

const FIGURINES: [Figurine; 4] = [
    Figurine {
        name: "Bear",
        model: "bear",
        position: Vec3::new(-0.1, 0.8, 1.5),
        rotation: Vec3::new(-10.0, 180.0, 0.0),
        breathing_speed: 3.0,
    },
    Figurine {
        name: "Cat",
        model: "cat",
        position: Vec3::new(-2.4, 0.8, -0.7),
        rotation: Vec3::new(0.0, 90.0, 0.0),
        breathing_speed: 3.2,
    },
    Figurine {
        name: "Owl",
        model: "owl",
        position: Vec3::new(2.2, 0.8, -0.7),
        rotation: Vec3::new(0.0, -90.0, 0.0),
        breathing_speed: 3.4,
    },
    Figurine {
        name: "Turtle",
        model: "turtle",
        position: Vec3::new(0.0, 0.9, -3.3),
        rotation: Vec3::new(-0.5, 0.0, 0.0),
        breathing_speed: 3.6,
    },
];

/// An animated gem and the light it carries
#[derive(Debug, Clone, Copy)]
struct Gem {
    node: NodeId,
    light: PointLightId,
    spin: Vec3,
    wave_phase: f32,
    hue_offset: f32,
}

/// A flame and its spin direction
#[derive(Debug, Clone, Copy)]
struct Fire {
    node: NodeId,
    direction: f32,
}

/// Handles of everything `update` animates
#[derive(Debug, Default)]
struct Rig {
    pivot: Option<NodeId>,
    gems: Vec<Gem>,
    fires: Vec<Fire>,
}

/// Scene state of the diorama
#[derive(Debug)]
pub struct Shrine {
    asset_dir: PathBuf,
    spotlight: bool,
    graph: SceneGraph,
    lights: LightRegistry,
    context: Option<RenderContext>,
    rig: Rig,
    time: f32,
}

impl Shrine {
    /// Scene reading its models and textures below `asset_dir`
    pub fn new(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            spotlight: false,
            graph: SceneGraph::new(),
            lights: LightRegistry::new(),
            context: None,
            rig: Rig::default(),
            time: 0.0,
        }
    }

    /// Add an overhead spot light
    #[must_use]
    pub fn with_spotlight(mut self, enabled: bool) -> Self {
        self.spotlight = enabled;
        self
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.lights
    }

    fn asset(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.asset_dir.join(relative)
    }

    fn context(&self) -> Result<&RenderContext, RenderError> {
        self.context.as_ref().ok_or(RenderError::NotPreloaded)
    }

    fn model(&self, loader: &mut dyn ResourceLoader, relative: &str) -> MeshHandle {
        mesh_or_cube(loader, &self.asset(relative))
    }

    fn textures(
        &self,
        loader: &mut dyn ResourceLoader,
        stem: &str,
        extension: &str,
        channels: &[TextureChannel],
        sampler: SamplerConfig,
    ) -> MaterialTextures {
        TextureSet::conventional(self.asset(stem), extension, channels).load(loader, sampler)
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    fn build(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
    ) -> Result<(), RenderError> {
        self.lights.add_directional(
            DirectionalLight::new("Sunlight", Vec3::new(-1.0, -2.0, -1.0))
                .with_color(Vec3::ONE)
                .with_intensity(0.5),
        );

        let base = self.spawn_base(loader, shaders)?;
        self.spawn_vines(loader, shaders, base)?;
        self.spawn_figures(loader, shaders, base)?;

        let pivot = self.graph.add_pivot(
            "Pivot Gems",
            Transform::from_position(Vec3::new(0.0, 2.6, -0.7)),
            Some(base),
        )?;
        self.rig.pivot = Some(pivot);
        for layout in &GEMS {
            self.spawn_gem(loader, shaders, pivot, layout)?;
        }

        for (index, &(position, yaw)) in TORCHES.iter().enumerate() {
            self.spawn_torch(loader, shaders, base, index + 1, position, yaw)?;
        }

        if self.spotlight {
            self.lights.add_spot(
                SpotLight::new("Spot Light", Vec3::new(0.0, 7.0, 0.0), Vec3::NEG_Y)
                    .with_range(10.0)
                    .with_angles(20.0, 40.0),
            );
        }

        log::info!(
            "Shrine built: {} nodes, {} lights",
            self.graph.len(),
            self.lights.light_count()
        );
        Ok(())
    }

    fn spawn_base(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
    ) -> Result<NodeId, RenderError> {
        let mesh = self.model(loader, "models/base/base.obj");
        let textures = self.textures(
            loader,
            "textures/base/base",
            "jpg",
            &NO_EMISSIVE,
            SamplerConfig::REPEAT,
        );
        let node = self.graph.add_renderable(
            "Base",
            Transform::from_position(Vec3::new(0.1, -1.7, 2.7)).with_uniform_scale(2.0),
            None,
            Renderable::new(mesh, shaders.lit, Material::textured(textures)),
            RenderQueue::Lit,
        )?;
        Ok(node)
    }

    fn spawn_vines(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
        base: NodeId,
    ) -> Result<(), RenderError> {
        for (name, stem, alpha_clip) in [("Vine1", "vine1", 0.9), ("Vine2", "vine2", 0.8)] {
            let mesh = self.model(loader, &format!("models/base/{stem}.obj"));
            let set = TextureSet::conventional(
                self.asset(format!("textures/base/{stem}")),
                "jpg",
                &[
                    TextureChannel::Specular,
                    TextureChannel::Normal,
                    TextureChannel::AmbientOcclusion,
                ],
            )
            .with(
                TextureChannel::Diffuse,
                self.asset(format!("textures/base/{stem}.png")),
            );
            let material = Material::textured(set.load(loader, SamplerConfig::CLAMP))
                .with_alpha_clip(alpha_clip)
                .with_double_sided(true);

            self.graph.add_renderable(
                name,
                Transform::new(),
                Some(base),
                Renderable::new(mesh, shaders.lit, material),
                RenderQueue::Lit,
            )?;
        }
        Ok(())
    }

    fn spawn_figures(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
        base: NodeId,
    ) -> Result<(), RenderError> {
        let mesh = self.model(loader, "models/tiny/tiny.obj");
        let textures = self.textures(
            loader,
            "textures/tiny/tiny",
            "jpg",
            &ALL_CHANNELS,
            SamplerConfig::REPEAT,
        );
        self.graph.add_renderable(
            "Tiny",
            Transform::from_position(Vec3::new(-0.1, 0.9, -0.7)).with_uniform_scale(0.5),
            Some(base),
            Renderable::new(
                mesh,
                shaders.lit,
                Material::textured(textures).with_breathing_speed(2.0),
            ),
            RenderQueue::Lit,
        )?;

        for figurine in &FIGURINES {
            let mesh = self.model(loader, &format!("models/figurines/{}.obj", figurine.model));
            let textures = self.textures(
                loader,
                &format!("textures/figurines/{0}/{0}", figurine.model),
                "jpg",
                &ALL_CHANNELS,
                SamplerConfig::REPEAT,
            );
            self.graph.add_renderable(
                figurine.name,
                Transform::from_parts(figurine.position, figurine.rotation, Vec3::splat(0.6)),
                Some(base),
                Renderable::new(
                    mesh,
                    shaders.lit,
                    Material::textured(textures).with_breathing_speed(figurine.breathing_speed),
                ),
                RenderQueue::Lit,
            )?;
        }
        Ok(())
    }

    fn spawn_gem(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
        pivot: NodeId,
        layout: &GemLayout,
    ) -> Result<(), RenderError> {
        let mesh = self.model(loader, &format!("models/gems/{}.obj", layout.model));
        let textures = TextureSet::new()
            .with(TextureChannel::Diffuse, self.asset("textures/gems/white.png"))
            .with(TextureChannel::Specular, self.asset("textures/gems/gem_s.jpg"))
            .with(TextureChannel::Normal, self.asset("textures/gems/gem_n.jpg"))
            .with_handle(TextureChannel::Emissive, TextureHandle::WHITE)
            .with(TextureChannel::AmbientOcclusion, self.asset("textures/gems/gem_ao.jpg"))
            .load(loader, SamplerConfig::REPEAT);
        let material = Material::textured(textures)
            .with_double_sided(true)
            .with_opacity(0.75)
            .with_breathing_speed(15.0);

        let node = self.graph.add_renderable(
            layout.name,
            Transform::from_position(layout.position).with_uniform_scale(0.5),
            Some(pivot),
            Renderable::new(mesh, shaders.lit, material),
            RenderQueue::AlphaBlend,
        )?;

        let light = self.lights.add_point(
            PointLight::new(format!("{} Light", layout.name), Vec3::ZERO)
                .with_color(layout.light_color)
                .with_intensity(1.0)
                .with_range(5.0),
        );
        self.lights.attach_point(light, node, &self.graph)?;

        self.rig.gems.push(Gem {
            node,
            light,
            spin: layout.spin,
            wave_phase: layout.wave_phase,
            hue_offset: layout.hue_offset,
        });
        Ok(())
    }

    fn spawn_torch(
        &mut self,
        loader: &mut dyn ResourceLoader,
        shaders: ShaderSet,
        base: NodeId,
        number: usize,
        position: Vec3,
        yaw: f32,
    ) -> Result<(), RenderError> {
        let mesh = self.model(loader, "models/torch/torch.obj");
        let textures = self.textures(
            loader,
            "textures/torch/torch",
            "jpg",
            &NO_EMISSIVE,
            SamplerConfig::REPEAT,
        );
        let torch = self.graph.add_renderable(
            format!("Torch {number}"),
            Transform::from_position(position)
                .with_rotation(Vec3::new(0.0, yaw, 0.0))
                .with_uniform_scale(0.3),
            Some(base),
            Renderable::new(mesh, shaders.lit, Material::textured(textures)),
            RenderQueue::Lit,
        )?;

        let mesh = self.model(loader, "models/torch/fire.obj");
        let textures = TextureSet::new()
            .with(TextureChannel::Diffuse, self.asset("textures/torch/fire.png"))
            .load(loader, SamplerConfig::CLAMP);
        let fire = self.graph.add_renderable(
            format!("Fire {number}"),
            Transform::from_position(Vec3::new(-0.1, 4.2, 0.1)).with_uniform_scale(0.04),
            Some(torch),
            Renderable::new(
                mesh,
                shaders.fire,
                Material::textured(textures)
                    .with_double_sided(true)
                    .with_breathing_speed(10.0),
            ),
            RenderQueue::AlphaBlend,
        )?;

        let light = self.lights.add_point(
            PointLight::new(format!("Fire Light {number}"), Vec3::new(0.0, 20.0, 0.0))
                .with_color(Vec3::new(1.0, 0.5, 0.0))
                .with_intensity(0.5)
                .with_range(30.0),
        );
        self.lights.attach_point(light, fire, &self.graph)?;

        // Neighbouring flames turn in opposite directions
        let direction = if number % 2 == 1 { 1.0 } else { -1.0 };
        self.rig.fires.push(Fire { node: fire, direction });
        Ok(())
    }

    // ========================================================================
    // Animation
    // ========================================================================

    fn animate(&mut self, t: f32) {
        if let Some(pivot) = self.rig.pivot {
            self.graph.node_mut(pivot).transform.rotation.y = t * PIVOT_SPIN_SPEED;
        }

        for gem in &self.rig.gems {
            let color = rainbow(t, RAINBOW_SPEED, gem.hue_offset);

            let node = self.graph.node_mut(gem.node);
            node.transform.rotation = gem.spin * (t * GEM_SPIN_SPEED);
            node.transform.position.y =
                wave(GEM_WAVE_AMPLITUDE, GEM_WAVE_FREQUENCY, gem.wave_phase, t);
            if let Some(renderable) = node.renderable.as_mut() {
                renderable.material.tint = color;
            }

            self.lights.point_mut(gem.light).color = color;
        }

        for fire in &self.rig.fires {
            self.graph.node_mut(fire.node).transform.rotation.y =
                fire.direction * t * FIRE_SPIN_SPEED;
        }
    }
}

impl SceneApp for Shrine {
    fn preload(
        &mut self,
        loader: &mut dyn ResourceLoader,
        viewport: Viewport,
    ) -> Result<(), RenderError> {
        let sky_mesh = loader.upload_mesh(&Mesh::skybox());
        let cubemap = cubemap_or_black(loader, &self.asset("textures/skybox2/forest"), "jpg");

        let scanline_path = self.asset("textures/postprocess/scanline.png");
        let scanline = loader
            .load_texture(&scanline_path, SamplerConfig::REPEAT)
            .unwrap_or_else(|err| {
                log::warn!("{err}; generating a scanline pattern");
                loader.upload_texture(
                    &scanline_pattern(SCANLINE_FALLBACK_HEIGHT),
                    SamplerConfig::REPEAT,
                )
            });

        let marker_mesh = loader.upload_mesh(&Mesh::sphere(1.0, 12, 8));

        self.context = Some(RenderContext::new(
            viewport,
            FrameResources {
                skybox: Skybox::new(sky_mesh, cubemap),
                scanline,
                marker_mesh,
            },
        ));
        Ok(())
    }

    fn load_shaders(&mut self, loader: &mut dyn ResourceLoader) -> Result<(), RenderError> {
        let context = self.context.as_mut().ok_or(RenderError::NotPreloaded)?;
        context.load_shaders(loader)?;
        Ok(())
    }

    fn load(&mut self, loader: &mut dyn ResourceLoader) -> Result<(), RenderError> {
        let shaders = *self.context()?.shaders()?;
        self.build(loader, shaders)?;
        self.update(0.0);
        Ok(())
    }

    fn update(&mut self, time: f32) {
        self.time = time;
        self.animate(time);
        self.lights.resolve_parents(&self.graph);
    }

    fn draw(
        &self,
        camera: &dyn CameraView,
        settings: &RenderSettings,
        cmds: &mut CommandList,
    ) -> Result<(), RenderError> {
        self.context()?
            .draw(&self.graph, &self.lights, camera, self.time, settings, cmds)
    }

    fn post_draw(
        &self,
        _camera: &dyn CameraView,
        settings: &RenderSettings,
        cmds: &mut CommandList,
    ) -> Result<(), RenderError> {
        self.context()?.post_draw(self.time, settings, cmds)
    }

    fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.context
            .as_mut()
            .ok_or(RenderError::NotPreloaded)?
            .on_resize(width, height)
    }

    fn on_key(&mut self, action: SceneAction) {
        if action == SceneAction::ToggleDebugLights {
            log::info!("{} lights registered", self.lights.light_count());
        }
    }

    fn initial_camera(&self) -> Camera {
        Camera::look_at(Vec3::new(0.0, 4.0, 10.0), Vec3::new(0.0, 0.5, 0.0), Vec3::Y)
    }
}
