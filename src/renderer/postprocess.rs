//! Post-processing effects
//!
//! The scene is rendered into an offscreen [`RenderTarget`] and then composited
//! to the screen by a full-screen pass. The chain runs in a fixed order, each
//! stage individually toggleable:
//!
//! 1. lens spherize (distorts the sampling coordinate)
//! 2. grayscale
//! 3. scrolling scanlines
//! 4. radial vignette
//!
//! With the master toggle off the composite is an exact copy of the scene.
//! [`SoftwareCompositor`] runs the same chain on the CPU.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::command::{DrawApi, TargetDesc, TextureSource};
use super::frame::Viewport;
use super::handles::{ShaderHandle, TextureHandle};

/// Colour format of the offscreen scene target
pub const SCENE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// Depth format shared by the scene and shadow targets
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// Post-processing configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    /// Master toggle; off means passthrough
    pub enabled: bool,
    pub spherize: bool,
    pub spherize_strength: f32,
    /// Scale applied to centred coordinates before distortion
    pub zoom_scale: f32,
    pub grayscale: bool,
    pub scanlines: bool,
    /// Scanline texture repeats across the screen height
    pub scanline_tiling: u32,
    /// Scanline scroll speed in screens per second
    pub scanline_scroll: f32,
    pub vignette: bool,
    pub vignette_strength: f32,
    pub vignette_color: Vec3,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            spherize: true,
            spherize_strength: 2.0,
            zoom_scale: 0.75,
            grayscale: true,
            scanlines: true,
            scanline_tiling: 2,
            scanline_scroll: 0.1,
            vignette: true,
            vignette_strength: 15.0,
            vignette_color: Vec3::ZERO,
        }
    }
}

/// GPU-compatible post-process uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PostProcessUniform {
    pub vignette_color: [f32; 3],
    pub time: f32,
    pub enabled: u32,
    pub spherize: u32,
    pub grayscale: u32,
    pub scanlines: u32,
    pub vignette: u32,
    pub scanline_tiling: u32,
    pub spherize_strength: f32,
    pub zoom_scale: f32,
    pub scanline_scroll: f32,
    pub vignette_strength: f32,
    _padding: [f32; 2],
}

impl PostProcessUniform {
    /// Create from settings
    #[must_use]
    pub fn new(settings: &PostProcessSettings, time: f32) -> Self {
        Self {
            vignette_color: settings.vignette_color.into(),
            time,
            enabled: u32::from(settings.enabled),
            spherize: u32::from(settings.spherize),
            grayscale: u32::from(settings.grayscale),
            scanlines: u32::from(settings.scanlines),
            vignette: u32::from(settings.vignette),
            scanline_tiling: settings.scanline_tiling,
            spherize_strength: settings.spherize_strength,
            zoom_scale: settings.zoom_scale,
            scanline_scroll: settings.scanline_scroll,
            vignette_strength: settings.vignette_strength,
            _padding: [0.0; 2],
        }
    }
}

impl Default for PostProcessUniform {
    fn default() -> Self {
        Self::new(&PostProcessSettings::default(), 0.0)
    }
}

/// Record the composite of the scene target onto the screen
pub fn render_composite(
    settings: &PostProcessSettings,
    time: f32,
    scanline: TextureHandle,
    shader: ShaderHandle,
    cmds: &mut impl DrawApi,
) {
    cmds.begin_pass(TargetDesc::Screen, Some(Vec4::new(0.0, 0.0, 0.0, 1.0)));
    cmds.bind_shader(shader);
    cmds.set_post_process(PostProcessUniform::new(settings, time));
    cmds.bind_texture(0, TextureSource::SceneColor);
    cmds.bind_texture(1, TextureSource::Asset(scanline));
    cmds.draw_fullscreen();
}

// ============================================================================
// Effect math, shared by the CPU compositor and mirrored in screen.wgsl
// ============================================================================

/// Barrel-distort a texture coordinate
///
/// Returns `None` when the distorted coordinate falls outside the image.
#[must_use]
pub fn spherize_uv(uv: Vec2, strength: f32, zoom: f32) -> Option<Vec2> {
    let mut centered = (uv - 0.5) * 2.0 * zoom;
    centered *= 1.0 + strength * 0.1 * centered.dot(centered);
    let distorted = centered * 0.5 + 0.5;
    let inside = (0.0..=1.0).contains(&distorted.x) && (0.0..=1.0).contains(&distorted.y);
    inside.then_some(distorted)
}

#[must_use]
pub fn grayscale(rgb: Vec3) -> Vec3 {
    Vec3::splat(rgb.dot(LUMA))
}

/// Vignette visibility: 1 in the middle, falling to 0 at the edges
#[must_use]
pub fn vignette_factor(uv: Vec2, strength: f32) -> f32 {
    let q = uv * (Vec2::ONE - Vec2::new(uv.y, uv.x));
    (q.x * q.y * strength).max(0.0).powf(0.25).clamp(0.0, 1.0)
}

/// Scanline texture coordinate for a screen coordinate
#[must_use]
pub fn scanline_uv(uv: Vec2, tiling: u32, scroll: f32, time: f32) -> Vec2 {
    Vec2::new(uv.x, uv.y * tiling as f32 + time * scroll)
}

/// Procedural scanline texture: alternating bright and dim rows
#[must_use]
pub fn scanline_pattern(height: u32) -> RgbaImage {
    let height = height.max(2);
    RgbaImage::from_fn(1, height, |_, y| {
        let level = if y % 2 == 0 { 255 } else { 160 };
        Rgba([level, level, level, 255])
    })
}

/// CPU rendition of the composite pass
///
/// Texels are decoded from sRGB before the effects run and re-encoded after,
/// matching the `Rgba8UnormSrgb` scene target the shader samples. Sampling is
/// nearest.
#[derive(Debug, Clone)]
pub struct SoftwareCompositor {
    scanline: RgbaImage,
}

impl SoftwareCompositor {
    #[must_use]
    pub fn new(scanline: RgbaImage) -> Self {
        Self { scanline }
    }

    /// Composite `scene` with `settings` at time `time`
    #[must_use]
    pub fn composite(
        &self,
        scene: &RgbaImage,
        settings: &PostProcessSettings,
        time: f32,
    ) -> RgbaImage {
        if !settings.enabled || scene.width() == 0 || scene.height() == 0 {
            return scene.clone();
        }

        let (width, height) = scene.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            let uv = Vec2::new(
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            );
            self.shade(scene, settings, time, uv)
        })
    }

    fn shade(
        &self,
        scene: &RgbaImage,
        settings: &PostProcessSettings,
        time: f32,
        uv: Vec2,
    ) -> Rgba<u8> {
        let sample_uv = if settings.spherize {
            match spherize_uv(uv, settings.spherize_strength, settings.zoom_scale) {
                Some(distorted) => distorted,
                None => return Rgba([0, 0, 0, 255]),
            }
        } else {
            uv
        };

        let texel = sample_clamped(scene, sample_uv);
        let mut rgb = decode(texel);

        if settings.grayscale {
            rgb = grayscale(rgb);
        }

        if settings.scanlines {
            let coords = scanline_uv(
                uv,
                settings.scanline_tiling,
                settings.scanline_scroll,
                time,
            );
            rgb *= decode(sample_repeat(&self.scanline, coords));
        }

        if settings.vignette {
            let visibility = vignette_factor(uv, settings.vignette_strength);
            rgb = settings.vignette_color.lerp(rgb, visibility);
        }

        let out = encode(rgb);
        Rgba([out[0], out[1], out[2], texel[3]])
    }
}

impl Default for SoftwareCompositor {
    fn default() -> Self {
        Self::new(scanline_pattern(4))
    }
}

/// sRGB transfer function, encoded to linear
#[must_use]
pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer function, linear to encoded
#[must_use]
pub fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn decode(texel: Rgba<u8>) -> Vec3 {
    Vec3::new(
        srgb_to_linear(texel[0] as f32 / 255.0),
        srgb_to_linear(texel[1] as f32 / 255.0),
        srgb_to_linear(texel[2] as f32 / 255.0),
    )
}

fn encode(rgb: Vec3) -> [u8; 3] {
    rgb.clamp(Vec3::ZERO, Vec3::ONE)
        .to_array()
        .map(|c| (linear_to_srgb(c) * 255.0).round() as u8)
}

fn sample_clamped(image: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let x = ((uv.x * image.width() as f32) as u32).min(image.width() - 1);
    let y = ((uv.y * image.height() as f32) as u32).min(image.height() - 1);
    *image.get_pixel(x, y)
}

fn sample_repeat(image: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let wrapped = uv - uv.floor();
    sample_clamped(image, wrapped)
}

// ============================================================================
// GPU render target
// ============================================================================

/// Offscreen colour and depth target for the scene
pub struct RenderTarget {
    /// Colour texture
    pub color_texture: wgpu::Texture,
    /// Colour texture view
    pub color_view: wgpu::TextureView,
    /// Depth texture
    pub depth_texture: wgpu::Texture,
    /// Depth texture view
    pub depth_view: wgpu::TextureView,
    /// Sampler used by the composite pass
    pub sampler: wgpu::Sampler,
    viewport: Viewport,
}

impl RenderTarget {
    /// Create a new render target
    #[must_use]
    pub fn new(device: &wgpu::Device, viewport: Viewport) -> Self {
        let size = wgpu::Extent3d {
            width: viewport.width(),
            height: viewport.height(),
            depth_or_array_layers: 1,
        };

        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene_color_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCENE_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene_depth_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("scene_color_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        log::debug!("Allocated scene target {}x{}", viewport.width(), viewport.height());

        Self {
            color_texture,
            color_view,
            depth_texture,
            depth_view,
            sampler,
            viewport,
        }
    }

    /// Current size
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Reallocate at `viewport` if the size differs; returns true if it did
    pub fn resize(&mut self, device: &wgpu::Device, viewport: Viewport) -> bool {
        if self.viewport == viewport {
            return false;
        }
        *self = Self::new(device, viewport);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::command::{CommandList, RenderCommand, TargetKind};

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 200])
        })
    }

    #[test]
    fn test_disabled_composite_is_byte_identical() {
        let scene = gradient(64, 48);
        let compositor = SoftwareCompositor::default();
        let settings = PostProcessSettings {
            enabled: false,
            ..Default::default()
        };

        let output = compositor.composite(&scene, &settings, 12.5);
        assert_eq!(output.as_raw(), scene.as_raw());
    }

    #[test]
    fn test_enabled_with_no_effects_is_identity() {
        let scene = gradient(32, 32);
        let compositor = SoftwareCompositor::default();
        let settings = PostProcessSettings {
            enabled: true,
            spherize: false,
            grayscale: false,
            scanlines: false,
            vignette: false,
            ..Default::default()
        };

        let output = compositor.composite(&scene, &settings, 0.0);
        assert_eq!(output.as_raw(), scene.as_raw());
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let scene = gradient(16, 16);
        let compositor = SoftwareCompositor::default();
        let settings = PostProcessSettings {
            enabled: true,
            spherize: false,
            grayscale: true,
            scanlines: false,
            vignette: false,
            ..Default::default()
        };

        let output = compositor.composite(&scene, &settings, 0.0);
        for pixel in output.pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_grayscale_weights_linear_values() {
        let scene = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        let compositor = SoftwareCompositor::default();
        let settings = PostProcessSettings {
            enabled: true,
            spherize: false,
            grayscale: true,
            scanlines: false,
            vignette: false,
            ..Default::default()
        };

        let output = compositor.composite(&scene, &settings, 0.0);
        let pixel = output.get_pixel(0, 0);

        let decoded = |c: f32| ((c / 255.0 + 0.055) / 1.055).powf(2.4);
        let luma = 0.299 * decoded(200.0) + 0.587 * decoded(100.0) + 0.114 * decoded(50.0);
        let expected = ((1.055 * luma.powf(1.0 / 2.4) - 0.055) * 255.0).round();

        assert!((pixel[0] as f32 - expected).abs() <= 1.0);
        assert_eq!(pixel[0], pixel[2]);
        assert_eq!(pixel[3], 255);
        // Weighting the encoded bytes directly would give 124
        assert!(pixel[0] > 130);
    }

    #[test]
    fn test_srgb_transfer_round_trips_bytes() {
        for byte in 0..=255u8 {
            let linear = srgb_to_linear(byte as f32 / 255.0);
            assert_eq!((linear_to_srgb(linear) * 255.0).round() as u8, byte);
        }
    }

    #[test]
    fn test_vignette_darkens_corners() {
        let centre = vignette_factor(Vec2::splat(0.5), 15.0);
        let corner = vignette_factor(Vec2::new(0.01, 0.01), 15.0);
        assert!(centre > 0.95);
        assert!(corner < 0.25);
    }

    #[test]
    fn test_spherize_keeps_centre_and_drops_outside() {
        let centre = spherize_uv(Vec2::splat(0.5), 2.0, 0.75).unwrap();
        assert!(centre.abs_diff_eq(Vec2::splat(0.5), 1e-6));
        assert!(spherize_uv(Vec2::new(0.0, 0.0), 2.0, 1.5).is_none());
    }

    #[test]
    fn test_scanlines_scroll_with_time() {
        let a = scanline_uv(Vec2::new(0.2, 0.5), 2, 0.1, 0.0);
        let b = scanline_uv(Vec2::new(0.2, 0.5), 2, 0.1, 10.0);
        assert!((a.y - 1.0).abs() < 0.001);
        assert!((b.y - a.y - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_uniform_packs_flags() {
        let settings = PostProcessSettings {
            enabled: true,
            grayscale: false,
            ..Default::default()
        };
        let uniform = PostProcessUniform::new(&settings, 3.0);
        assert_eq!(uniform.enabled, 1);
        assert_eq!(uniform.grayscale, 0);
        assert_eq!(uniform.scanline_tiling, 2);
        assert_eq!(std::mem::size_of::<PostProcessUniform>(), 64);
    }

    #[test]
    fn test_composite_samples_scene_target() {
        let mut cmds = CommandList::new();
        render_composite(
            &PostProcessSettings::default(),
            1.0,
            TextureHandle::WHITE,
            ShaderHandle(4),
            &mut cmds,
        );

        assert_eq!(cmds.passes(), vec![TargetKind::Screen]);
        assert!(cmds.commands().contains(&RenderCommand::BindTexture {
            unit: 0,
            source: TextureSource::SceneColor
        }));
        assert_eq!(cmds.commands().last(), Some(&RenderCommand::DrawFullscreen));
    }
}
