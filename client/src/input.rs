//! Keyboard sampling with edge-detected toggle keys

use crate::network::ControlEvent;
use crate::prediction::KeyState;
use macroquad::prelude::*;

/// Reads movement keys and turns debug key presses into control events
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_key_1: bool,
    prev_key_2: bool,
    prev_key_3: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_key_1: false,
            prev_key_2: false,
            prev_key_3: false,
        }
    }

    /// Samples the keyboard for this frame.
    ///
    /// Returns the held movement keys and the control events triggered by
    /// keys pressed since the previous frame.
    pub fn update(&mut self) -> (KeyState, Vec<ControlEvent>) {
        // Arrow keys or W/S
        let keys = KeyState {
            up: is_key_down(KeyCode::Up) || is_key_down(KeyCode::W),
            down: is_key_down(KeyCode::Down) || is_key_down(KeyCode::S),
        };

        let key_1 = is_key_down(KeyCode::Key1);
        let key_2 = is_key_down(KeyCode::Key2);
        let key_3 = is_key_down(KeyCode::Key3);

        let events = self.edges(key_1, key_2, key_3, is_key_pressed(KeyCode::Escape));

        (keys, events)
    }

    fn edges(&mut self, key_1: bool, key_2: bool, key_3: bool, quit: bool) -> Vec<ControlEvent> {
        let mut events = Vec::new();

        // Detect key press events (current && !previous)
        if key_1 && !self.prev_key_1 {
            events.push(ControlEvent::TogglePrediction);
        }
        if key_2 && !self.prev_key_2 {
            events.push(ControlEvent::ToggleReconciliation);
        }
        if key_3 && !self.prev_key_3 {
            events.push(ControlEvent::ToggleInterpolation);
        }
        if quit {
            events.push(ControlEvent::Quit);
        }

        self.prev_key_1 = key_1;
        self.prev_key_2 = key_2;
        self.prev_key_3 = key_3;

        events
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
