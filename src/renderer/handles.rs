//! Opaque handles to GPU resources
//!
//! Handles are plain indices into the loader's resource tables. They are
//! `Copy`, shared by every node that references the same resource, and stay
//! valid for the lifetime of the process.

use serde::{Deserialize, Serialize};

/// Handle to an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u32);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub(crate) u32);

/// Handle to a 2D texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u32);

/// Handle to a cubemap texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CubemapHandle(pub(crate) u32);

macro_rules! handle_index {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                /// Raw table index
                #[must_use]
                pub const fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

handle_index!(MeshHandle, ShaderHandle, TextureHandle, CubemapHandle);

/// Built-in placeholder textures
///
/// Every loader reserves the first three texture slots for these, so a
/// sentinel handle is valid before any asset has been loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentinel {
    /// Opaque white, neutral for multiplicative channels
    White,
    /// Opaque black, neutral for additive channels
    Black,
    /// Magenta/black checkerboard, marks a missing diffuse map
    Checker,
}

impl Sentinel {
    /// All sentinels in slot order
    pub const ALL: [Self; 3] = [Self::White, Self::Black, Self::Checker];

    /// The reserved handle of this sentinel
    #[must_use]
    pub const fn handle(self) -> TextureHandle {
        match self {
            Self::White => TextureHandle(0),
            Self::Black => TextureHandle(1),
            Self::Checker => TextureHandle(2),
        }
    }
}

impl TextureHandle {
    /// Reserved white texture
    pub const WHITE: Self = Sentinel::White.handle();
    /// Reserved black texture
    pub const BLACK: Self = Sentinel::Black.handle();
    /// Reserved checker texture
    pub const CHECKER: Self = Sentinel::Checker.handle();
}

impl CubemapHandle {
    /// Reserved black cube, valid before any environment is loaded
    pub const BLACK: Self = Self(0);
}
