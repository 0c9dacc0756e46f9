//! Key bindings for the viewer
//!
//! Physical keys map to [`SceneAction`]s, so the event loop never matches on
//! key codes directly and bindings can be changed at runtime.
//!
//! # Example
//!
//! ```ignore
//! let mapper = InputMapper::with_defaults();
//! if let Some(action) = mapper.get_action(KeyCode::KeyP) {
//!     action.apply(&mut settings);
//! }
//! ```

use rustc_hash::FxHashMap;
use winit::keyboard::KeyCode;

use crate::renderer::{RenderSettings, TextureChannel};

// ============================================================================
// Scene Actions
// ============================================================================

/// What a key press asks the viewer to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneAction {
    // -------------------------------------------------------------------------
    // Render toggles
    // -------------------------------------------------------------------------
    /// Post-process master switch
    TogglePostProcess,
    ToggleGrayscale,
    ToggleVignette,
    ToggleScanlines,
    ToggleSpherize,
    ToggleShadows,
    /// Light marker drawing
    ToggleDebugLights,
    /// Enable or disable one material channel everywhere
    ToggleTexture(TextureChannel),

    // -------------------------------------------------------------------------
    // Camera
    // -------------------------------------------------------------------------
    OrbitLeft,
    OrbitRight,
    OrbitUp,
    OrbitDown,

    // -------------------------------------------------------------------------
    // Application
    // -------------------------------------------------------------------------
    /// Recompile every shader from disk
    ReloadShaders,
    Quit,
}

impl SceneAction {
    /// Flip the setting this action controls
    ///
    /// Returns `false` for actions that are not settings toggles.
    pub fn apply(self, settings: &mut RenderSettings) -> bool {
        let post = &mut settings.post;
        match self {
            Self::TogglePostProcess => post.enabled = !post.enabled,
            Self::ToggleGrayscale => post.grayscale = !post.grayscale,
            Self::ToggleVignette => post.vignette = !post.vignette,
            Self::ToggleScanlines => post.scanlines = !post.scanlines,
            Self::ToggleSpherize => post.spherize = !post.spherize,
            Self::ToggleShadows => settings.shadow.enabled = !settings.shadow.enabled,
            Self::ToggleDebugLights => settings.debug_lights = !settings.debug_lights,
            Self::ToggleTexture(channel) => settings.textures.toggle(channel),
            Self::OrbitLeft
            | Self::OrbitRight
            | Self::OrbitUp
            | Self::OrbitDown
            | Self::ReloadShaders
            | Self::Quit => return false,
        }
        true
    }

    /// Held-key camera actions, as (yaw, pitch) direction
    #[must_use]
    pub const fn orbit_direction(self) -> Option<(f32, f32)> {
        match self {
            Self::OrbitLeft => Some((-1.0, 0.0)),
            Self::OrbitRight => Some((1.0, 0.0)),
            Self::OrbitUp => Some((0.0, 1.0)),
            Self::OrbitDown => Some((0.0, -1.0)),
            _ => None,
        }
    }
}

// ============================================================================
// Input Mapper
// ============================================================================

/// Maps physical keys to scene actions
#[derive(Debug, Clone)]
pub struct InputMapper {
    key_bindings: FxHashMap<KeyCode, SceneAction>,
    /// Reverse lookup, for listing bindings
    action_keys: FxHashMap<SceneAction, Vec<KeyCode>>,
}

impl InputMapper {
    /// Create an empty input mapper.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key_bindings: FxHashMap::default(),
            action_keys: FxHashMap::default(),
        }
    }

    /// Create an input mapper with the viewer's standard keys.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut mapper = Self::new();

        // Post-processing
        mapper.bind(KeyCode::KeyP, SceneAction::TogglePostProcess);
        mapper.bind(KeyCode::KeyG, SceneAction::ToggleGrayscale);
        mapper.bind(KeyCode::KeyV, SceneAction::ToggleVignette);
        mapper.bind(KeyCode::KeyS, SceneAction::ToggleScanlines);
        mapper.bind(KeyCode::KeyZ, SceneAction::ToggleSpherize);

        // Lighting
        mapper.bind(KeyCode::KeyH, SceneAction::ToggleShadows);
        mapper.bind(KeyCode::KeyL, SceneAction::ToggleDebugLights);

        // Material channels
        let digits = [
            KeyCode::Digit1,
            KeyCode::Digit2,
            KeyCode::Digit3,
            KeyCode::Digit4,
            KeyCode::Digit5,
        ];
        for (key, channel) in digits.into_iter().zip(TextureChannel::ALL) {
            mapper.bind(key, SceneAction::ToggleTexture(channel));
        }

        // Camera
        mapper.bind(KeyCode::ArrowLeft, SceneAction::OrbitLeft);
        mapper.bind(KeyCode::ArrowRight, SceneAction::OrbitRight);
        mapper.bind(KeyCode::ArrowUp, SceneAction::OrbitUp);
        mapper.bind(KeyCode::ArrowDown, SceneAction::OrbitDown);

        mapper.bind(KeyCode::F1, SceneAction::ReloadShaders);
        mapper.bind(KeyCode::Escape, SceneAction::Quit);

        mapper
    }

    /// Bind a key to an action.
    ///
    /// If the key was previously bound, the old binding is replaced.
    pub fn bind(&mut self, key: KeyCode, action: SceneAction) {
        if let Some(old_action) = self.key_bindings.get(&key)
            && let Some(keys) = self.action_keys.get_mut(old_action)
        {
            keys.retain(|k| *k != key);
        }

        self.key_bindings.insert(key, action);
        self.action_keys.entry(action).or_default().push(key);
    }

    /// Unbind a key.
    pub fn unbind(&mut self, key: KeyCode) {
        if let Some(action) = self.key_bindings.remove(&key)
            && let Some(keys) = self.action_keys.get_mut(&action)
        {
            keys.retain(|k| *k != key);
        }
    }

    #[must_use]
    pub fn get_action(&self, key: KeyCode) -> Option<SceneAction> {
        self.key_bindings.get(&key).copied()
    }

    /// Get all keys bound to an action.
    #[must_use]
    pub fn get_keys(&self, action: SceneAction) -> &[KeyCode] {
        self.action_keys
            .get(&action)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over all bindings.
    pub fn iter(&self) -> impl Iterator<Item = (KeyCode, SceneAction)> + '_ {
        self.key_bindings.iter().map(|(&k, &a)| (k, a))
    }
}

impl Default for InputMapper {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
