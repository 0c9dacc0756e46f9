//! Per-frame render configuration
//!
//! Everything a frame can toggle lives in [`RenderSettings`], which is passed
//! by reference into `draw` and `post_draw`. Nothing in the pipeline keeps
//! its own copy of these flags.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use super::handles::TextureHandle;
use super::material::{MaterialTextures, TextureChannel};
use super::postprocess::PostProcessSettings;
use super::shadow::ShadowSettings;

/// Global enable flags for the five material channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureToggles {
    pub diffuse: bool,
    pub specular: bool,
    pub normal: bool,
    pub emissive: bool,
    pub ambient_occlusion: bool,
}

impl TextureToggles {
    #[must_use]
    pub const fn is_enabled(&self, channel: TextureChannel) -> bool {
        match channel {
            TextureChannel::Diffuse => self.diffuse,
            TextureChannel::Specular => self.specular,
            TextureChannel::Normal => self.normal,
            TextureChannel::Emissive => self.emissive,
            TextureChannel::AmbientOcclusion => self.ambient_occlusion,
        }
    }

    /// Flip one channel
    pub fn toggle(&mut self, channel: TextureChannel) {
        let flag = match channel {
            TextureChannel::Diffuse => &mut self.diffuse,
            TextureChannel::Specular => &mut self.specular,
            TextureChannel::Normal => &mut self.normal,
            TextureChannel::Emissive => &mut self.emissive,
            TextureChannel::AmbientOcclusion => &mut self.ambient_occlusion,
        };
        *flag = !*flag;
    }

    /// Texture to bind for `channel`: the node's own, or the neutral sentinel
    /// if the channel is switched off
    #[must_use]
    pub const fn resolve(&self, textures: &MaterialTextures, channel: TextureChannel) -> TextureHandle {
        if self.is_enabled(channel) {
            textures.get(channel)
        } else {
            channel.disabled_sentinel().handle()
        }
    }
}

impl Default for TextureToggles {
    fn default() -> Self {
        Self {
            diffuse: true,
            specular: true,
            normal: true,
            emissive: true,
            ambient_occlusion: true,
        }
    }
}

/// All runtime toggles of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub textures: TextureToggles,
    pub shadow: ShadowSettings,
    pub post: PostProcessSettings,
    /// Draw a marker at every registered light
    pub debug_lights: bool,
    /// Clear colour of the scene target, visible where the sky is missing
    pub clear_color: Vec4,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            textures: TextureToggles::default(),
            shadow: ShadowSettings::default(),
            post: PostProcessSettings::default(),
            debug_lights: false,
            clear_color: Vec4::new(0.1, 0.1, 0.1, 1.0),
        }
    }
}
