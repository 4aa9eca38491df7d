//! Keyboard state tracking.

use std::collections::HashSet;

use stimply_core::{Event, KeyCode};

/// Tracks which keys are currently held.
///
/// The window feeds every key transition in; the renderer polls
/// [`is_key_pressed`](Self::is_key_pressed) once per frame to move the camera.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that went down since the last `begin_frame`
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    /// Record a key transition. Returns the bus event to publish, or `None`
    /// for auto-repeat presses and releases of keys that were never down.
    pub fn on_key(&mut self, key: KeyCode, pressed: bool) -> Option<Event> {
        if pressed {
            if self.pressed_keys.insert(key) {
                self.just_pressed_keys.insert(key);
                return Some(Event::KeyPressed(key));
            }
            None
        } else if self.pressed_keys.remove(&key) {
            Some(Event::KeyReleased(key))
        } else {
            None
        }
    }

    /// Release every key, e.g. when the window loses focus.
    pub fn release_all(&mut self) -> Vec<Event> {
        self.just_pressed_keys.clear();
        self.pressed_keys
            .drain()
            .map(Event::KeyReleased)
            .collect()
    }

    /// Check if a key is currently pressed.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Check if a key was pressed this frame.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }
}
