//! Texture loading and GPU management
//!
//! Images are decoded into `RgbaImage`s on the CPU first, so sentinel
//! textures, disk assets and procedural patterns all share one upload path.

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use super::handles::Sentinel;
use super::loader::AssetError;

/// Pixel format of every sampled colour texture
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Cubemap face file stems in layer order (+X, -X, +Y, -Y, +Z, -Z)
pub const CUBEMAP_FACES: [&str; 6] = ["right", "left", "top", "bottom", "front", "back"];

/// Edge length of the checker sentinel in texels
const CHECKER_SIZE: u32 = 8;

/// Texture coordinate behaviour outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    Repeat,
    Clamp,
}

/// Minification and magnification filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// Sampler state a texture is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub wrap: WrapMode,
    pub filter: FilterMode,
}

impl SamplerConfig {
    pub const REPEAT: Self = Self::new(WrapMode::Repeat, FilterMode::Linear);
    pub const CLAMP: Self = Self::new(WrapMode::Clamp, FilterMode::Linear);
    pub const REPEAT_PIXELATED: Self = Self::new(WrapMode::Repeat, FilterMode::Nearest);
    pub const CLAMP_PIXELATED: Self = Self::new(WrapMode::Clamp, FilterMode::Nearest);

    #[must_use]
    pub const fn new(wrap: WrapMode, filter: FilterMode) -> Self {
        Self { wrap, filter }
    }

    fn address_mode(self) -> wgpu::AddressMode {
        match self.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        }
    }

    fn filter_mode(self) -> wgpu::FilterMode {
        match self.filter {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        }
    }

    /// Create the matching wgpu sampler
    pub fn create_sampler(self, device: &wgpu::Device) -> wgpu::Sampler {
        let address_mode = self.address_mode();
        let filter = self.filter_mode();
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Texture Sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::REPEAT
    }
}

/// Pixels of a built-in placeholder texture
#[must_use]
pub fn sentinel_image(sentinel: Sentinel) -> RgbaImage {
    match sentinel {
        Sentinel::White => RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255])),
        Sentinel::Black => RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])),
        Sentinel::Checker => RgbaImage::from_fn(CHECKER_SIZE, CHECKER_SIZE, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }),
    }
}

/// Decode an image file into RGBA8
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded
pub fn load_image(path: &Path) -> Result<RgbaImage, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgba8())
}

/// Path of one cubemap face, e.g. `skybox/right.jpg`
#[must_use]
pub fn cubemap_face_path(directory: &Path, face: &str, extension: &str) -> PathBuf {
    directory.join(format!("{face}.{extension}"))
}

/// Load the six faces of a cubemap from `directory`
///
/// # Errors
///
/// Returns an error if a face is missing, or the faces are not square and of
/// equal size
pub fn load_cubemap_faces(directory: &Path, extension: &str) -> Result<[RgbaImage; 6], AssetError> {
    let mut faces: Vec<RgbaImage> = Vec::with_capacity(CUBEMAP_FACES.len());
    for face in CUBEMAP_FACES {
        faces.push(load_image(&cubemap_face_path(directory, face, extension))?);
    }

    let size = faces[0].dimensions();
    if size.0 != size.1 || faces.iter().any(|face| face.dimensions() != size) {
        return Err(AssetError::CubemapMismatch {
            path: directory.to_path_buf(),
        });
    }

    faces.try_into().map_err(|_| AssetError::CubemapMismatch {
        path: directory.to_path_buf(),
    })
}

/// A GPU texture with its view and sampler
#[derive(Debug)]
pub struct Texture {
    /// The GPU texture
    pub texture: wgpu::Texture,
    /// Texture view for binding
    pub view: wgpu::TextureView,
    /// Sampler for texture filtering
    pub sampler: wgpu::Sampler,
    /// Texture dimensions
    pub size: wgpu::Extent3d,
}

impl Texture {
    /// Upload an RGBA image
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &RgbaImage,
        sampler: SamplerConfig,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: image.width().max(1),
            height: image.height().max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: sampler.create_sampler(device),
            size,
        }
    }

    /// Get texture width
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.size.width
    }

    /// Get texture height
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.size.height
    }
}

/// A six-layer cube texture
#[derive(Debug)]
pub struct Cubemap {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Cubemap {
    /// Upload six square faces of equal size
    pub fn from_faces(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        faces: &[RgbaImage; 6],
        label: &str,
    ) -> Self {
        let edge = faces[0].width().max(1);
        let size = wgpu::Extent3d {
            width: edge,
            height: edge,
            depth_or_array_layers: 6,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in faces.iter().enumerate() {
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                face.as_raw(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * edge),
                    rows_per_image: Some(edge),
                },
                wgpu::Extent3d {
                    width: edge,
                    height: edge,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler: SamplerConfig::CLAMP.create_sampler(device),
        }
    }

    /// Single-texel black cube, bound when no environment is loaded
    pub fn black(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let face = sentinel_image(Sentinel::Black);
        let faces = [
            face.clone(),
            face.clone(),
            face.clone(),
            face.clone(),
            face.clone(),
            face,
        ];
        Self::from_faces(device, queue, &faces, "Black Cubemap")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_pixels() {
        assert_eq!(sentinel_image(Sentinel::White).get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(sentinel_image(Sentinel::Black).get_pixel(0, 0), &Rgba([0, 0, 0, 255]));

        let checker = sentinel_image(Sentinel::Checker);
        assert_eq!(checker.dimensions(), (CHECKER_SIZE, CHECKER_SIZE));
        assert_ne!(checker.get_pixel(0, 0), checker.get_pixel(1, 0));
        assert_eq!(checker.get_pixel(0, 0), checker.get_pixel(1, 1));
    }

    #[test]
    fn test_cubemap_face_paths() {
        let path = cubemap_face_path(Path::new("assets/skybox"), CUBEMAP_FACES[2], "jpg");
        assert_eq!(path, Path::new("assets/skybox/top.jpg"));
    }

    #[test]
    fn test_missing_image_reports_path() {
        let err = load_image(Path::new("no/such/texture.png")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
        assert!(err.to_string().contains("no/such/texture.png"));
    }

    #[test]
    fn test_sampler_presets() {
        assert_eq!(SamplerConfig::default(), SamplerConfig::REPEAT);
        assert_eq!(SamplerConfig::CLAMP.wrap, WrapMode::Clamp);
        assert_eq!(SamplerConfig::REPEAT_PIXELATED.filter, FilterMode::Nearest);
    }
}
