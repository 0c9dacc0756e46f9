//! Main renderer implementation
//!
//! The [`Renderer`] owns the wgpu device and every GPU resource. Scene code
//! never touches it directly: assets come in through its [`ResourceLoader`]
//! implementation and frames arrive as recorded [`CommandList`]s.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec4;
use image::RgbaImage;
use rustc_hash::{FxHashMap, FxHashSet};
use winit::window::Window;

use super::command::{
    BlendMode, CommandList, CullMode, DepthCompare, FrameUniform, ObjectUniform, TEXTURE_UNITS,
    TargetDesc, TargetKind, TextureSource,
};
use super::frame::{RenderError, Viewport};
use super::handles::{CubemapHandle, MeshHandle, Sentinel, ShaderHandle, TextureHandle};
use super::lights::LightUniforms;
use super::loader::{AssetError, ResourceLoader};
use super::mesh::{GpuMesh, Mesh, Vertex};
use super::plan::{DrawOp, FrameOp, FramePlan, Geometry, PipelineKey, UNIFORM_SLOTS};
use super::postprocess::{DEPTH_FORMAT, PostProcessUniform, RenderTarget, SCENE_COLOR_FORMAT};
use super::shaders::{LayoutKind, ShaderKind};
use super::shadow::{SHADOW_FORMAT, ShadowMap, ShadowUniform};
use super::texture::{self, Cubemap, SamplerConfig, Texture};

/// Sizes of the uniform blocks in bind group 0, in binding order
const UNIFORM_SIZES: [usize; UNIFORM_SLOTS] = [
    std::mem::size_of::<FrameUniform>(),
    std::mem::size_of::<ObjectUniform>(),
    std::mem::size_of::<LightUniforms>(),
    std::mem::size_of::<ShadowUniform>(),
    std::mem::size_of::<PostProcessUniform>(),
];

/// Initial size of the per-frame uniform buffer
const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;

/// Built pipelines, plus keys that failed so they are not retried each frame
#[derive(Debug)]
struct PipelineCache<P> {
    ready: FxHashMap<PipelineKey, P>,
    failed: FxHashSet<PipelineKey>,
}

impl<P> PipelineCache<P> {
    fn new() -> Self {
        Self {
            ready: FxHashMap::default(),
            failed: FxHashSet::default(),
        }
    }

    fn needs_build(&self, key: &PipelineKey) -> bool {
        !self.ready.contains_key(key) && !self.failed.contains(key)
    }

    fn get(&self, key: &PipelineKey) -> Option<&P> {
        self.ready.get(key)
    }

    fn insert(&mut self, key: PipelineKey, pipeline: P) {
        self.failed.remove(&key);
        self.ready.insert(key, pipeline);
    }

    fn mark_failed(&mut self, key: PipelineKey) {
        self.failed.insert(key);
    }

    /// Forget every pipeline built from `shader`; returns how many were built
    fn purge_shader(&mut self, shader: ShaderHandle) -> usize {
        let before = self.ready.len();
        self.ready.retain(|key, _| key.shader != shader);
        self.failed.retain(|key| key.shader != shader);
        before - self.ready.len()
    }
}

/// Scene viewport the plan renders at, if it differs from `current`
fn scene_resize(plan: &FramePlan, current: Viewport) -> Option<Viewport> {
    plan.ops
        .iter()
        .rev()
        .find_map(|op| match op {
            FrameOp::Begin {
                target: TargetDesc::Scene(viewport),
                ..
            } => Some(*viewport),
            _ => None,
        })
        .filter(|&viewport| viewport != current)
}

/// Slot of `handle` among `loaded` textures; unknown handles sample white
const fn texture_slot(handle: TextureHandle, loaded: usize) -> usize {
    if handle.index() < loaded {
        handle.index()
    } else {
        TextureHandle::WHITE.index()
    }
}

/// A compiled shader program
struct ShaderProgram {
    kind: ShaderKind,
    module: wgpu::ShaderModule,
}

/// Bind group and pipeline layouts shared by every pipeline
struct Layouts {
    uniforms: wgpu::BindGroupLayout,
    textures: wgpu::BindGroupLayout,
    shadow: wgpu::BindGroupLayout,
    cubemap: wgpu::BindGroupLayout,
    full: wgpu::PipelineLayout,
    depth_only: wgpu::PipelineLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = UNIFORM_SIZES
            .iter()
            .enumerate()
            .map(|(binding, &size)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(size as u64),
                },
                count: None,
            })
            .collect();
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Bind Group Layout"),
            entries: &uniform_entries,
        });

        let mut texture_entries = Vec::with_capacity(TEXTURE_UNITS * 2);
        for unit in 0..TEXTURE_UNITS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Texture Bind Group Layout"),
            entries: &texture_entries,
        });

        let shadow = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Map Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let cubemap = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cubemap Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let full = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Full Pipeline Layout"),
            bind_group_layouts: &[&uniforms, &textures, &shadow, &cubemap],
            push_constant_ranges: &[],
        });
        let depth_only = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Depth Pipeline Layout"),
            bind_group_layouts: &[&uniforms],
            push_constant_ranges: &[],
        });

        Self {
            uniforms,
            textures,
            shadow,
            cubemap,
            full,
            depth_only,
        }
    }
}

/// The wgpu renderer
pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    shader_dir: Option<PathBuf>,
    layouts: Layouts,
    uniform_alignment: u32,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_group: wgpu::BindGroup,
    shaders: Vec<ShaderProgram>,
    pipelines: PipelineCache<wgpu::RenderPipeline>,
    meshes: Vec<GpuMesh>,
    mesh_cache: FxHashMap<PathBuf, MeshHandle>,
    textures: Vec<Texture>,
    texture_cache: FxHashMap<(PathBuf, SamplerConfig), TextureHandle>,
    texture_groups: FxHashMap<[TextureSource; TEXTURE_UNITS], wgpu::BindGroup>,
    cubemaps: Vec<Cubemap>,
    cubemap_groups: Vec<wgpu::BindGroup>,
    cubemap_cache: FxHashMap<PathBuf, CubemapHandle>,
    scene_target: RenderTarget,
    shadow_map: ShadowMap,
    shadow_group: wgpu::BindGroup,
}

impl Renderer {
    /// Create a new renderer
    ///
    /// # Errors
    ///
    /// Fails if no surface, adapter or device can be created
    pub async fn new(
        window: Arc<Window>,
        vsync: bool,
        shader_dir: Option<PathBuf>,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Diorama Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let layouts = Layouts::new(&device);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        let uniform_buffer = create_uniform_buffer(&device, INITIAL_UNIFORM_CAPACITY);
        let uniform_group = create_uniform_group(&device, &layouts.uniforms, &uniform_buffer);

        // Sentinels occupy the first texture slots, in handle order
        let textures: Vec<Texture> = Sentinel::ALL
            .iter()
            .map(|&sentinel| {
                Texture::from_image(
                    &device,
                    &queue,
                    &texture::sentinel_image(sentinel),
                    SamplerConfig::REPEAT,
                    &format!("{sentinel:?} Sentinel"),
                )
            })
            .collect();

        let black_cube = Cubemap::black(&device, &queue);
        let cubemap_groups = vec![create_cubemap_group(&device, &layouts.cubemap, &black_cube)];

        let viewport = Viewport::new(size.0, size.1)?;
        let scene_target = RenderTarget::new(&device, viewport);
        let shadow_map = ShadowMap::new(&device);
        let shadow_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Map Bind Group"),
            layout: &layouts.shadow,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&shadow_map.sampler),
                },
            ],
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            shader_dir,
            layouts,
            uniform_alignment,
            uniform_buffer,
            uniform_capacity: INITIAL_UNIFORM_CAPACITY,
            uniform_group,
            shaders: Vec::new(),
            pipelines: PipelineCache::new(),
            meshes: Vec::new(),
            mesh_cache: FxHashMap::default(),
            textures,
            texture_cache: FxHashMap::default(),
            texture_groups: FxHashMap::default(),
            cubemaps: vec![black_cube],
            cubemap_groups,
            cubemap_cache: FxHashMap::default(),
            scene_target,
            shadow_map,
            shadow_group,
        })
    }

    /// Resize the window surface; the scene target follows the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            log::debug!("Resized to {}x{}", width, height);
        }
    }

    /// Surface size in pixels
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    #[must_use]
    pub const fn scene_viewport(&self) -> Viewport {
        self.scene_target.viewport()
    }

    /// Execute a recorded frame and present it
    pub fn render(&mut self, commands: &CommandList) {
        let plan = FramePlan::build(commands, self.uniform_alignment);
        self.prepare(&plan);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                log::error!("Surface error: {:?}", e);
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.encode(&plan, &view, &mut encoder);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }

    // ========================================================================
    // Frame preparation
    // ========================================================================

    /// Create everything the plan's draws refer to and upload its uniforms
    fn prepare(&mut self, plan: &FramePlan) {
        if let Some(viewport) = scene_resize(plan, self.scene_target.viewport())
            && self.scene_target.resize(&self.device, viewport)
        {
            // Bind groups holding the old colour view are stale
            self.texture_groups.clear();
            log::debug!("Scene target reallocated at {}x{}", viewport.width(), viewport.height());
        }

        for draw in plan.draws() {
            self.ensure_pipeline(draw.pipeline);
            if draw.pipeline.target != TargetKind::Shadow {
                self.ensure_texture_group(draw.textures);
            }
        }

        self.upload_uniforms(plan.uniforms.bytes());
    }

    fn upload_uniforms(&mut self, bytes: &[u8]) {
        let needed = bytes.len() as u64;
        if needed > self.uniform_capacity {
            let capacity = needed.next_power_of_two();
            self.uniform_buffer = create_uniform_buffer(&self.device, capacity);
            self.uniform_group =
                create_uniform_group(&self.device, &self.layouts.uniforms, &self.uniform_buffer);
            self.uniform_capacity = capacity;
            log::debug!("Uniform arena grown to {capacity} bytes");
        }
        self.queue.write_buffer(&self.uniform_buffer, 0, bytes);
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if !self.pipelines.needs_build(&key) {
            return;
        }
        let Some(program) = self.shaders.get(key.shader.index()) else {
            log::warn!("Draw with unknown shader {:?}", key.shader);
            self.pipelines.mark_failed(key);
            return;
        };
        let name = program.kind.name();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.create_pipeline(program, key);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => {
                log::error!("Pipeline for shader {name} failed: {err}");
                self.pipelines.mark_failed(key);
            }
            None => {
                log::debug!("Created pipeline for shader {name} ({:?})", key.target);
                self.pipelines.insert(key, pipeline);
            }
        }
    }

    fn create_pipeline(&self, program: &ShaderProgram, key: PipelineKey) -> wgpu::RenderPipeline {
        let layout = match program.kind.layout() {
            LayoutKind::Full => &self.layouts.full,
            LayoutKind::DepthOnly => &self.layouts.depth_only,
        };

        let vertex_layout = [Vertex::layout()];
        let vertex_buffers: &[wgpu::VertexBufferLayout<'_>] = if program.kind.uses_vertex_buffer() {
            &vertex_layout
        } else {
            &[]
        };

        let color_format = match key.target {
            TargetKind::Shadow => None,
            TargetKind::Scene => Some(SCENE_COLOR_FORMAT),
            TargetKind::Screen => Some(self.config.format),
        };
        let blend = match key.raster.blend {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        };
        let targets = [color_format.map(|format| wgpu::ColorTargetState {
            format,
            blend: Some(blend),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let fragment = (program.kind.has_fragment() && color_format.is_some()).then(|| {
            wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: Default::default(),
            }
        });

        let depth_format = match key.target {
            TargetKind::Shadow => Some(SHADOW_FORMAT),
            TargetKind::Scene => Some(DEPTH_FORMAT),
            TargetKind::Screen => None,
        };
        let depth_stencil = depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.raster.depth_write,
            depth_compare: compare_function(key.raster.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: if key.target == TargetKind::Shadow {
                wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                }
            } else {
                wgpu::DepthBiasState::default()
            },
        });

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.kind.name()),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment,
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: match key.raster.cull {
                        CullMode::Back => Some(wgpu::Face::Back),
                        CullMode::None => None,
                    },
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
    }

    fn ensure_texture_group(&mut self, sources: [TextureSource; TEXTURE_UNITS]) {
        if self.texture_groups.contains_key(&sources) {
            return;
        }
        let group = self.create_texture_group(&sources);
        self.texture_groups.insert(sources, group);
    }

    fn create_texture_group(&self, sources: &[TextureSource; TEXTURE_UNITS]) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(TEXTURE_UNITS * 2);
        for (unit, &source) in sources.iter().enumerate() {
            let (view, sampler) = self.texture_binding(source);
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Texture Bind Group"),
            layout: &self.layouts.textures,
            entries: &entries,
        })
    }

    fn texture_binding(&self, source: TextureSource) -> (&wgpu::TextureView, &wgpu::Sampler) {
        match source {
            TextureSource::SceneColor => (&self.scene_target.color_view, &self.scene_target.sampler),
            TextureSource::Asset(handle) => {
                let texture = &self.textures[texture_slot(handle, self.textures.len())];
                (&texture.view, &texture.sampler)
            }
        }
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    fn encode(
        &self,
        plan: &FramePlan,
        surface_view: &wgpu::TextureView,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let mut pass: Option<wgpu::RenderPass<'static>> = None;

        for op in &plan.ops {
            match op {
                FrameOp::Begin {
                    target,
                    clear_color,
                } => {
                    drop(pass.take());
                    pass = Some(self.begin_pass(encoder, *target, *clear_color, surface_view));
                }
                FrameOp::Draw(draw) => {
                    if let Some(pass) = pass.as_mut() {
                        self.record_draw(pass, draw);
                    }
                }
            }
        }
    }

    fn begin_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: TargetDesc,
        clear_color: Option<Vec4>,
        surface_view: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'static> {
        let color_ops = wgpu::Operations {
            load: clear_color.map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(to_wgpu_color(c))),
            store: wgpu::StoreOp::Store,
        };
        let depth_ops = Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
        });

        let (label, color_view, depth_view) = match target {
            TargetDesc::Shadow => ("Shadow Pass", None, Some(&self.shadow_map.depth_view)),
            TargetDesc::Scene(_) => (
                "Scene Pass",
                Some(&self.scene_target.color_view),
                Some(&self.scene_target.depth_view),
            ),
            TargetDesc::Screen => ("Composite Pass", Some(surface_view), None),
        };

        let color_attachments = [color_view.map(|view| wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: color_ops,
        })];
        let color_attachments: &[Option<wgpu::RenderPassColorAttachment<'_>>] =
            if color_view.is_some() {
                &color_attachments
            } else {
                &[]
            };

        encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments,
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops,
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime()
    }

    fn record_draw(&self, pass: &mut wgpu::RenderPass<'static>, draw: &DrawOp) {
        let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
            return;
        };
        let Some(program) = self.shaders.get(draw.pipeline.shader.index()) else {
            return;
        };

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_group, &draw.offsets);

        if program.kind.layout() == LayoutKind::Full {
            if draw.pipeline.target == TargetKind::Shadow {
                // Would sample the shadow map while it is the attachment
                return;
            }
            let Some(textures) = self.texture_groups.get(&draw.textures) else {
                return;
            };
            let Some(cubemap) = self
                .cubemap_groups
                .get(draw.cubemap.index())
                .or_else(|| self.cubemap_groups.first())
            else {
                return;
            };
            pass.set_bind_group(1, textures, &[]);
            pass.set_bind_group(2, &self.shadow_group, &[]);
            pass.set_bind_group(3, cubemap, &[]);
        }

        match draw.geometry {
            Geometry::Mesh(handle) => {
                let Some(mesh) = self.meshes.get(handle.index()) else {
                    return;
                };
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
            Geometry::Fullscreen => pass.draw(0..3, 0..1),
        }
    }

    // ========================================================================
    // Shaders
    // ========================================================================

    fn compile(&self, kind: ShaderKind) -> Result<wgpu::ShaderModule, AssetError> {
        let source = kind.source(self.shader_dir.as_deref());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind.name()),
                source: wgpu::ShaderSource::Wgsl(source),
            });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(AssetError::Shader {
                name: kind.name().to_string(),
                message: err.to_string(),
            }),
            None => Ok(module),
        }
    }
}

impl ResourceLoader for Renderer {
    fn load_mesh(&mut self, path: &Path) -> Result<MeshHandle, AssetError> {
        if let Some(&handle) = self.mesh_cache.get(path) {
            return Ok(handle);
        }
        let mesh = Mesh::load(path)?;
        let handle = self.upload_mesh(&mesh);
        self.mesh_cache.insert(path.to_path_buf(), handle);
        Ok(handle)
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> MeshHandle {
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes
            .push(GpuMesh::upload(&self.device, mesh, &format!("Mesh {}", handle.0)));
        handle
    }

    fn load_texture(
        &mut self,
        path: &Path,
        sampler: SamplerConfig,
    ) -> Result<TextureHandle, AssetError> {
        let key = (path.to_path_buf(), sampler);
        if let Some(&handle) = self.texture_cache.get(&key) {
            return Ok(handle);
        }
        let image = texture::load_image(path)?;
        let handle = self.upload_texture(&image, sampler);
        self.texture_cache.insert(key, handle);
        Ok(handle)
    }

    fn upload_texture(&mut self, image: &RgbaImage, sampler: SamplerConfig) -> TextureHandle {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Texture::from_image(
            &self.device,
            &self.queue,
            image,
            sampler,
            &format!("Texture {}", handle.0),
        ));
        handle
    }

    fn load_cubemap(
        &mut self,
        directory: &Path,
        extension: &str,
    ) -> Result<CubemapHandle, AssetError> {
        if let Some(&handle) = self.cubemap_cache.get(directory) {
            return Ok(handle);
        }
        let faces = texture::load_cubemap_faces(directory, extension)?;
        let cubemap = Cubemap::from_faces(
            &self.device,
            &self.queue,
            &faces,
            &directory.display().to_string(),
        );

        let handle = CubemapHandle(self.cubemaps.len() as u32);
        self.cubemap_groups.push(create_cubemap_group(
            &self.device,
            &self.layouts.cubemap,
            &cubemap,
        ));
        self.cubemaps.push(cubemap);
        self.cubemap_cache.insert(directory.to_path_buf(), handle);
        Ok(handle)
    }

    fn load_shader(&mut self, kind: ShaderKind) -> Result<ShaderHandle, AssetError> {
        let module = self.compile(kind)?;
        let handle = ShaderHandle(self.shaders.len() as u32);
        self.shaders.push(ShaderProgram { kind, module });
        Ok(handle)
    }

    fn reload_shader(&mut self, shader: ShaderHandle) -> Result<(), AssetError> {
        let kind = self
            .shaders
            .get(shader.index())
            .map(|program| program.kind)
            .ok_or(AssetError::UnknownShader(shader))?;

        let module = self.compile(kind)?;
        self.shaders[shader.index()].module = module;
        let evicted = self.pipelines.purge_shader(shader);
        log::debug!("Reloaded shader {} ({evicted} pipelines rebuilt on demand)", kind.name());
        Ok(())
    }
}

fn create_uniform_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Uniform Arena"),
        size: capacity,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_uniform_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry<'_>> = UNIFORM_SIZES
        .iter()
        .enumerate()
        .map(|(binding, &size)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(size as u64),
            }),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Uniform Bind Group"),
        layout,
        entries: &entries,
    })
}

fn create_cubemap_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    cubemap: &Cubemap,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Cubemap Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&cubemap.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&cubemap.sampler),
            },
        ],
    })
}

const fn compare_function(compare: DepthCompare) -> wgpu::CompareFunction {
    match compare {
        DepthCompare::Less => wgpu::CompareFunction::Less,
        DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthCompare::Always => wgpu::CompareFunction::Always,
    }
}

fn to_wgpu_color(color: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.x),
        g: f64::from(color.y),
        b: f64::from(color.z),
        a: f64::from(color.w),
    }
}
