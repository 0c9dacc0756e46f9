//! Material system for scene nodes

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::handles::{Sentinel, TextureHandle};

/// Fixed texture unit assignment for the lit shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureChannel {
    Diffuse,
    Specular,
    Normal,
    Emissive,
    AmbientOcclusion,
}

impl TextureChannel {
    /// Channels in texture-unit order
    pub const ALL: [Self; 5] = [
        Self::Diffuse,
        Self::Specular,
        Self::Normal,
        Self::Emissive,
        Self::AmbientOcclusion,
    ];

    /// Texture unit the channel is bound to
    #[must_use]
    pub const fn unit(self) -> u32 {
        match self {
            Self::Diffuse => 0,
            Self::Specular => 1,
            Self::Normal => 2,
            Self::Emissive => 3,
            Self::AmbientOcclusion => 4,
        }
    }

    /// Placeholder used when an asset is missing
    #[must_use]
    pub const fn default_sentinel(self) -> Sentinel {
        match self {
            Self::Diffuse => Sentinel::Checker,
            Self::Specular | Self::Normal | Self::AmbientOcclusion => Sentinel::White,
            Self::Emissive => Sentinel::Black,
        }
    }

    /// Neutral texture used when the channel is switched off globally
    #[must_use]
    pub const fn disabled_sentinel(self) -> Sentinel {
        match self {
            Self::Emissive => Sentinel::Black,
            _ => Sentinel::White,
        }
    }
}

/// The five material textures of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialTextures {
    pub diffuse: TextureHandle,
    pub specular: TextureHandle,
    pub normal: TextureHandle,
    pub emissive: TextureHandle,
    pub ambient_occlusion: TextureHandle,
}

impl MaterialTextures {
    /// Texture assigned to a channel
    #[must_use]
    pub const fn get(&self, channel: TextureChannel) -> TextureHandle {
        match channel {
            TextureChannel::Diffuse => self.diffuse,
            TextureChannel::Specular => self.specular,
            TextureChannel::Normal => self.normal,
            TextureChannel::Emissive => self.emissive,
            TextureChannel::AmbientOcclusion => self.ambient_occlusion,
        }
    }

    /// Assign a texture to a channel
    pub fn set(&mut self, channel: TextureChannel, texture: TextureHandle) {
        let slot = match channel {
            TextureChannel::Diffuse => &mut self.diffuse,
            TextureChannel::Specular => &mut self.specular,
            TextureChannel::Normal => &mut self.normal,
            TextureChannel::Emissive => &mut self.emissive,
            TextureChannel::AmbientOcclusion => &mut self.ambient_occlusion,
        };
        *slot = texture;
    }
}

impl Default for MaterialTextures {
    fn default() -> Self {
        Self {
            diffuse: TextureChannel::Diffuse.default_sentinel().handle(),
            specular: TextureChannel::Specular.default_sentinel().handle(),
            normal: TextureChannel::Normal.default_sentinel().handle(),
            emissive: TextureChannel::Emissive.default_sentinel().handle(),
            ambient_occlusion: TextureChannel::AmbientOcclusion.default_sentinel().handle(),
        }
    }
}

/// Surface parameters pushed to the shader with every draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub textures: MaterialTextures,
    /// Specular exponent
    pub shininess: f32,
    /// Fragments with diffuse alpha below this are discarded
    pub alpha_clip: f32,
    /// Disable back-face culling for this node
    pub double_sided: bool,
    /// Vertex pulse frequency, 0 disables
    pub breathing_speed: f32,
    pub tint: Vec3,
    /// Only meaningful in the alpha-blend queue
    pub opacity: f32,
}

impl Material {
    /// Default material with the given textures
    pub fn textured(textures: MaterialTextures) -> Self {
        Self {
            textures,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_alpha_clip(mut self, alpha_clip: f32) -> Self {
        self.alpha_clip = alpha_clip;
        self
    }

    #[must_use]
    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    #[must_use]
    pub fn with_breathing_speed(mut self, speed: f32) -> Self {
        self.breathing_speed = speed;
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            textures: MaterialTextures::default(),
            shininess: 128.0,
            alpha_clip: 0.1,
            double_sided: false,
            breathing_speed: 0.0,
            tint: Vec3::ONE,
            opacity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_textures_are_sentinels() {
        let textures = MaterialTextures::default();
        assert_eq!(textures.diffuse, TextureHandle::CHECKER);
        assert_eq!(textures.specular, TextureHandle::WHITE);
        assert_eq!(textures.normal, TextureHandle::WHITE);
        assert_eq!(textures.emissive, TextureHandle::BLACK);
        assert_eq!(textures.ambient_occlusion, TextureHandle::WHITE);
    }

    #[test]
    fn test_channel_units_are_distinct() {
        let mut units: Vec<u32> = TextureChannel::ALL.iter().map(|c| c.unit()).collect();
        units.dedup();
        assert_eq!(units, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_set_and_get_channel() {
        let mut textures = MaterialTextures::default();
        textures.set(TextureChannel::Emissive, TextureHandle(7));
        assert_eq!(textures.get(TextureChannel::Emissive), TextureHandle(7));
    }
}
