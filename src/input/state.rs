//! Keyboard and scroll state

use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::event::ElementState;
use winit::keyboard::KeyCode;

/// Input state manager
#[derive(Debug, Default)]
pub struct Input {
    /// Currently pressed keys
    pressed_keys: FxHashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: FxHashSet<KeyCode>,
    /// Keys that were just released this frame
    just_released_keys: FxHashSet<KeyCode>,
    /// Scroll wheel delta this frame
    scroll_delta: Vec2,
}

impl Input {
    /// Create a new input manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the end of each frame to clear per-frame state
    pub fn update(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.scroll_delta = Vec2::ZERO;
    }

    /// Process a keyboard event
    ///
    /// Returns `true` on the first press of a key; OS key repeat is ignored.
    pub fn process_keyboard(&mut self, key_code: KeyCode, state: ElementState) -> bool {
        match state {
            ElementState::Pressed => {
                let first = self.pressed_keys.insert(key_code);
                if first {
                    self.just_pressed_keys.insert(key_code);
                }
                first
            }
            ElementState::Released => {
                self.pressed_keys.remove(&key_code);
                self.just_released_keys.insert(key_code);
                false
            }
        }
    }

    /// Process scroll wheel
    pub fn process_scroll(&mut self, delta: Vec2) {
        self.scroll_delta += delta;
    }

    /// Check if a key is currently pressed
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Check if a key was just pressed this frame
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Check if a key was just released this frame
    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    /// Iterate over held keys
    pub fn pressed_keys(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.pressed_keys.iter().copied()
    }

    /// Get scroll wheel delta this frame
    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_repeat() {
        let mut input = Input::new();

        assert!(input.process_keyboard(KeyCode::KeyP, ElementState::Pressed));
        assert!(!input.process_keyboard(KeyCode::KeyP, ElementState::Pressed));
        assert!(input.is_key_pressed(KeyCode::KeyP));
        assert!(input.is_key_just_pressed(KeyCode::KeyP));

        input.update();
        assert!(input.is_key_pressed(KeyCode::KeyP));
        assert!(!input.is_key_just_pressed(KeyCode::KeyP));
    }

    #[test]
    fn test_release() {
        let mut input = Input::new();
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Pressed);
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Released);

        assert!(!input.is_key_pressed(KeyCode::ArrowLeft));
        assert!(input.is_key_just_released(KeyCode::ArrowLeft));
        assert_eq!(input.pressed_keys().count(), 0);
    }

    #[test]
    fn test_scroll_accumulates_until_update() {
        let mut input = Input::new();
        input.process_scroll(Vec2::new(0.0, 1.0));
        input.process_scroll(Vec2::new(0.0, 2.0));
        assert_eq!(input.scroll_delta(), Vec2::new(0.0, 3.0));

        input.update();
        assert_eq!(input.scroll_delta(), Vec2::ZERO);
    }
}
