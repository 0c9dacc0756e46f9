//! Resource loading seam
//!
//! Scene code talks to [`ResourceLoader`] only. The wgpu [`Renderer`]
//! implements it for real; tests use an in-memory loader. Failures surface as
//! [`AssetError`], and the `*_or_*` helpers turn them into sentinels.
//!
//! [`Renderer`]: super::Renderer

use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use super::handles::{CubemapHandle, MeshHandle, ShaderHandle, TextureHandle};
use super::material::{MaterialTextures, TextureChannel};
use super::mesh::Mesh;
use super::shaders::ShaderKind;
use super::texture::SamplerConfig;

/// Errors raised while loading assets
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to import glTF {}: {source}", .path.display())]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("failed to import OBJ {}: {source}", .path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("{} is not an .obj, .gltf or .glb mesh", .path.display())]
    UnsupportedMesh { path: PathBuf },
    #[error("{} contains no triangle mesh", .path.display())]
    EmptyMesh { path: PathBuf },
    #[error("cubemap faces under {} are not equal squares", .path.display())]
    CubemapMismatch { path: PathBuf },
    #[error("shader {name} failed to compile: {message}")]
    Shader { name: String, message: String },
    #[error("unknown shader handle {0:?}")]
    UnknownShader(ShaderHandle),
}

/// Loads assets and hands out handles to them
///
/// Loading the same path twice returns the same handle.
pub trait ResourceLoader {
    /// Import an OBJ or glTF file
    fn load_mesh(&mut self, path: &Path) -> Result<MeshHandle, AssetError>;

    /// Upload procedural geometry
    fn upload_mesh(&mut self, mesh: &Mesh) -> MeshHandle;

    fn load_texture(
        &mut self,
        path: &Path,
        sampler: SamplerConfig,
    ) -> Result<TextureHandle, AssetError>;

    /// Upload procedural pixels
    fn upload_texture(&mut self, image: &RgbaImage, sampler: SamplerConfig) -> TextureHandle;

    /// Load `right`, `left`, `top`, `bottom`, `front` and `back` faces from
    /// `directory`
    fn load_cubemap(
        &mut self,
        directory: &Path,
        extension: &str,
    ) -> Result<CubemapHandle, AssetError>;

    fn load_shader(&mut self, kind: ShaderKind) -> Result<ShaderHandle, AssetError>;

    /// Recompile a shader from its current source
    ///
    /// On failure the previously compiled program stays in use.
    fn reload_shader(&mut self, shader: ShaderHandle) -> Result<(), AssetError>;
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Load a texture, or the channel's placeholder if that fails
pub fn texture_or_sentinel<L: ResourceLoader + ?Sized>(
    loader: &mut L,
    path: &Path,
    sampler: SamplerConfig,
    channel: TextureChannel,
) -> TextureHandle {
    loader.load_texture(path, sampler).unwrap_or_else(|err| {
        let sentinel = channel.default_sentinel();
        log::warn!("{err}; using {sentinel:?} texture for {channel:?}");
        sentinel.handle()
    })
}

/// Load a mesh, or a unit cube if that fails
pub fn mesh_or_cube<L: ResourceLoader + ?Sized>(loader: &mut L, path: &Path) -> MeshHandle {
    match loader.load_mesh(path) {
        Ok(mesh) => mesh,
        Err(err) => {
            log::warn!("{err}; using a unit cube");
            loader.upload_mesh(&Mesh::cube())
        }
    }
}

/// Load a cubemap, or the black cube if that fails
pub fn cubemap_or_black<L: ResourceLoader + ?Sized>(
    loader: &mut L,
    directory: &Path,
    extension: &str,
) -> CubemapHandle {
    loader.load_cubemap(directory, extension).unwrap_or_else(|err| {
        log::warn!("{err}; using a black environment");
        CubemapHandle::BLACK
    })
}

/// Texture files of one material, any of which may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSet {
    paths: [Option<PathBuf>; 5],
    overrides: [Option<TextureHandle>; 5],
}

impl TextureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files named `{stem}.{ext}`, `{stem}_s.{ext}`, `{stem}_n.{ext}`,
    /// `{stem}_e.{ext}` and `{stem}_ao.{ext}` for the listed channels
    #[must_use]
    pub fn conventional(stem: impl AsRef<Path>, extension: &str, channels: &[TextureChannel]) -> Self {
        let stem = stem.as_ref();
        let mut set = Self::new();
        for &channel in channels {
            let suffix = match channel {
                TextureChannel::Diffuse => "",
                TextureChannel::Specular => "_s",
                TextureChannel::Normal => "_n",
                TextureChannel::Emissive => "_e",
                TextureChannel::AmbientOcclusion => "_ao",
            };
            let mut file = stem.as_os_str().to_owned();
            file.push(format!("{suffix}.{extension}"));
            set.paths[channel.unit() as usize] = Some(PathBuf::from(file));
        }
        set
    }

    /// Use `path` for `channel`
    #[must_use]
    pub fn with(mut self, channel: TextureChannel, path: impl Into<PathBuf>) -> Self {
        self.paths[channel.unit() as usize] = Some(path.into());
        self
    }

    /// Use an already loaded texture for `channel`
    #[must_use]
    pub fn with_handle(mut self, channel: TextureChannel, texture: TextureHandle) -> Self {
        self.overrides[channel.unit() as usize] = Some(texture);
        self
    }

    #[must_use]
    pub fn path(&self, channel: TextureChannel) -> Option<&Path> {
        self.paths[channel.unit() as usize].as_deref()
    }

    /// Load every listed file; unlisted channels get their placeholder
    pub fn load<L: ResourceLoader + ?Sized>(
        &self,
        loader: &mut L,
        sampler: SamplerConfig,
    ) -> MaterialTextures {
        let mut textures = MaterialTextures::default();
        for channel in TextureChannel::ALL {
            let unit = channel.unit() as usize;
            if let Some(texture) = self.overrides[unit] {
                textures.set(channel, texture);
            } else if let Some(path) = &self.paths[unit] {
                textures.set(channel, texture_or_sentinel(loader, path, sampler, channel));
            }
        }
        textures
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub(crate) use mock::MockLoader;

#[cfg(test)]
mod mock {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::renderer::handles::Sentinel;

    /// In-memory loader; any path containing `missing` fails to load
    #[derive(Debug, Default)]
    pub(crate) struct MockLoader {
        pub meshes: Vec<String>,
        pub textures: Vec<String>,
        pub cubemaps: Vec<String>,
        pub shaders: Vec<ShaderKind>,
        pub reloads: Vec<ShaderHandle>,
        pub fail_reload: bool,
        mesh_cache: FxHashMap<PathBuf, MeshHandle>,
        texture_cache: FxHashMap<PathBuf, TextureHandle>,
    }

    impl MockLoader {
        pub fn new() -> Self {
            Self::default()
        }

        fn fails(path: &Path) -> bool {
            path.to_string_lossy().contains("missing")
        }
    }

    impl ResourceLoader for MockLoader {
        fn load_mesh(&mut self, path: &Path) -> Result<MeshHandle, AssetError> {
            if Self::fails(path) {
                return Err(AssetError::EmptyMesh {
                    path: path.to_path_buf(),
                });
            }
            if let Some(&handle) = self.mesh_cache.get(path) {
                return Ok(handle);
            }
            let handle = MeshHandle(self.meshes.len() as u32);
            self.meshes.push(path.display().to_string());
            self.mesh_cache.insert(path.to_path_buf(), handle);
            Ok(handle)
        }

        fn upload_mesh(&mut self, mesh: &Mesh) -> MeshHandle {
            let handle = MeshHandle(self.meshes.len() as u32);
            self.meshes
                .push(format!("<procedural {} triangles>", mesh.triangle_count()));
            handle
        }

        fn load_texture(
            &mut self,
            path: &Path,
            _sampler: SamplerConfig,
        ) -> Result<TextureHandle, AssetError> {
            if Self::fails(path) {
                return Err(AssetError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            if let Some(&handle) = self.texture_cache.get(path) {
                return Ok(handle);
            }
            let handle = TextureHandle((Sentinel::ALL.len() + self.textures.len()) as u32);
            self.textures.push(path.display().to_string());
            self.texture_cache.insert(path.to_path_buf(), handle);
            Ok(handle)
        }

        fn upload_texture(&mut self, image: &RgbaImage, _sampler: SamplerConfig) -> TextureHandle {
            let handle = TextureHandle((Sentinel::ALL.len() + self.textures.len()) as u32);
            self.textures
                .push(format!("<procedural {}x{}>", image.width(), image.height()));
            handle
        }

        fn load_cubemap(
            &mut self,
            directory: &Path,
            _extension: &str,
        ) -> Result<CubemapHandle, AssetError> {
            if Self::fails(directory) {
                return Err(AssetError::CubemapMismatch {
                    path: directory.to_path_buf(),
                });
            }
            self.cubemaps.push(directory.display().to_string());
            Ok(CubemapHandle(self.cubemaps.len() as u32))
        }

        fn load_shader(&mut self, kind: ShaderKind) -> Result<ShaderHandle, AssetError> {
            self.shaders.push(kind);
            Ok(ShaderHandle(self.shaders.len() as u32 - 1))
        }

        fn reload_shader(&mut self, shader: ShaderHandle) -> Result<(), AssetError> {
            if shader.index() >= self.shaders.len() {
                return Err(AssetError::UnknownShader(shader));
            }
            if self.fail_reload {
                return Err(AssetError::Shader {
                    name: self.shaders[shader.index()].name().to_string(),
                    message: "syntax error".to_string(),
                });
            }
            self.reloads.push(shader);
            Ok(())
        }
    }
}
