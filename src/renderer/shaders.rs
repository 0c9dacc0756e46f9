//! Shader programs and where their sources come from
//!
//! Every program is embedded in the binary. When a shader directory is
//! configured, a file of the same name there takes precedence, which is what
//! makes F1 reloading useful during development.

use std::borrow::Cow;
use std::path::Path;

/// The programs the pipeline knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Blinn-Phong with shadows, normal maps and breathing
    Lit,
    /// Vertex-animated flame, alpha blended
    Fire,
    /// Flat tinted colour
    Unlit,
    /// Depth only
    Shadow,
    Skybox,
    /// Full-screen post-process composite
    Screen,
}

/// Bind group layout set a program is compiled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    /// Uniforms, material textures, shadow map and cubemap
    Full,
    /// Uniforms only
    DepthOnly,
}

impl ShaderKind {
    pub const ALL: [Self; 6] = [
        Self::Lit,
        Self::Fire,
        Self::Unlit,
        Self::Shadow,
        Self::Skybox,
        Self::Screen,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lit => "lit",
            Self::Fire => "fire",
            Self::Unlit => "unlit",
            Self::Shadow => "shadow",
            Self::Skybox => "skybox",
            Self::Screen => "screen",
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.wgsl", self.name())
    }

    /// Source compiled into the binary
    #[must_use]
    pub const fn embedded_source(self) -> &'static str {
        match self {
            Self::Lit => include_str!("lit.wgsl"),
            Self::Fire => include_str!("fire.wgsl"),
            Self::Unlit => include_str!("unlit.wgsl"),
            Self::Shadow => include_str!("shadow.wgsl"),
            Self::Skybox => include_str!("skybox.wgsl"),
            Self::Screen => include_str!("screen.wgsl"),
        }
    }

    /// Source from `directory` if a readable file exists there, else embedded
    #[must_use]
    pub fn source(self, directory: Option<&Path>) -> Cow<'static, str> {
        let Some(directory) = directory else {
            return Cow::Borrowed(self.embedded_source());
        };

        let path = directory.join(self.file_name());
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                log::debug!("Read shader {} from {}", self.name(), path.display());
                Cow::Owned(source)
            }
            Err(err) => {
                if path.exists() {
                    log::warn!("Could not read {}: {err}, using embedded source", path.display());
                }
                Cow::Borrowed(self.embedded_source())
            }
        }
    }

    #[must_use]
    pub const fn layout(self) -> LayoutKind {
        match self {
            Self::Shadow => LayoutKind::DepthOnly,
            _ => LayoutKind::Full,
        }
    }

    /// Whether the program has a fragment stage
    #[must_use]
    pub const fn has_fragment(self) -> bool {
        !matches!(self, Self::Shadow)
    }

    /// Whether the program reads mesh vertices; the screen pass generates its own
    #[must_use]
    pub const fn uses_vertex_buffer(self) -> bool {
        !matches!(self, Self::Screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_program_has_entry_points() {
        for kind in ShaderKind::ALL {
            let source = kind.embedded_source();
            assert!(source.contains("fn vs_main"), "{} lacks vs_main", kind.name());
            assert_eq!(
                source.contains("fn fs_main"),
                kind.has_fragment(),
                "{} fragment stage mismatch",
                kind.name()
            );
        }
    }

    #[test]
    fn test_missing_directory_falls_back_to_embedded() {
        let source = ShaderKind::Lit.source(Some(Path::new("no/such/shader/dir")));
        assert!(matches!(source, Cow::Borrowed(_)));
        assert_eq!(source, ShaderKind::Lit.embedded_source());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ShaderKind::Skybox.file_name(), "skybox.wgsl");
        assert_eq!(ShaderKind::Shadow.layout(), LayoutKind::DepthOnly);
        assert_eq!(ShaderKind::Screen.layout(), LayoutKind::Full);
    }
}
