//! Keyboard sampling with edge detection for the rating keys

use crate::peer::FrameInput;
use macroquad::prelude::*;
use shared::MoveAxis;

pub struct InputManager {
    // Previous frame key states for edge detection
    prev_key_o: bool,
    prev_key_p: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_key_o: false,
            prev_key_p: false,
        }
    }

    /// Samples the keyboard for this frame
    pub fn update(&mut self) -> FrameInput {
        // Movement keys (WASD and arrows)
        let up = is_key_down(KeyCode::W) || is_key_down(KeyCode::Up);
        let down = is_key_down(KeyCode::S) || is_key_down(KeyCode::Down);
        let right = is_key_down(KeyCode::D) || is_key_down(KeyCode::Right);
        let left = is_key_down(KeyCode::A) || is_key_down(KeyCode::Left);

        let key_o = is_key_down(KeyCode::O);
        let key_p = is_key_down(KeyCode::P);

        let input = FrameInput {
            axis: MoveAxis {
                vertical: axis_value(up, down),
                horizontal: axis_value(right, left),
            },
            rate_up: key_o && !self.prev_key_o,
            rate_down: key_p && !self.prev_key_p,
            quit: is_key_pressed(KeyCode::Escape) || is_quit_requested(),
        };

        self.prev_key_o = key_o;
        self.prev_key_p = key_p;

        input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

fn axis_value(positive: bool, negative: bool) -> f32 {
    match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert!(!input_manager.prev_key_o);
        assert!(!input_manager.prev_key_p);
    }

    #[test]
    fn test_axis_value() {
        assert_eq!(axis_value(true, false), 1.0);
        assert_eq!(axis_value(false, true), -1.0);
        assert_eq!(axis_value(true, true), 0.0);
        assert_eq!(axis_value(false, false), 0.0);
    }
}
