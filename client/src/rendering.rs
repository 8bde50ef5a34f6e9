use crate::entity::PlayerEntity;
use crate::peer::Peer;
use macroquad::prelude::*;
use shared::Transform;

/// Pixels per world unit
const PIXELS_PER_UNIT: f32 = 40.0;
const PLAYER_SIZE: f32 = 24.0;

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, peer: &Peer) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        // The view tracks the local camera, which rides the local entity
        let center = peer
            .local_entity()
            .map(|entity| entity.transform)
            .unwrap_or_default();

        self.draw_grid(&center);

        for entity in peer.entities().filter(|e| e.components.visual) {
            let color = if entity.is_local() {
                GREEN
            } else {
                Color::from_rgba(255, 68, 68, 255)
            };
            self.draw_player(entity, &center, color);
        }

        self.draw_ui(peer);
    }

    fn draw_grid(&mut self, center: &Transform) {
        let color = Color::from_rgba(51, 51, 51, 255);
        let offset_x = (-center.x * PIXELS_PER_UNIT).rem_euclid(PIXELS_PER_UNIT);
        let offset_y = (center.z * PIXELS_PER_UNIT).rem_euclid(PIXELS_PER_UNIT);

        let mut x = offset_x;
        while x < self.width {
            draw_line(x, 0.0, x, self.height, 1.0, color);
            x += PIXELS_PER_UNIT;
        }
        let mut y = offset_y;
        while y < self.height {
            draw_line(0.0, y, self.width, y, 1.0, color);
            y += PIXELS_PER_UNIT;
        }
    }

    fn draw_player(&mut self, entity: &PlayerEntity, center: &Transform, color: Color) {
        let (x, y) = world_to_screen(&entity.transform, center, self.width, self.height);
        let half = PLAYER_SIZE / 2.0;

        draw_rectangle(x - half, y - half, PLAYER_SIZE, PLAYER_SIZE, color);
        draw_rectangle_lines(x - half, y - half, PLAYER_SIZE, PLAYER_SIZE, 2.0, WHITE);

        let (fx, fz) = entity.transform.forward();
        draw_line(x, y, x + fx * PLAYER_SIZE, y - fz * PLAYER_SIZE, 2.0, YELLOW);

        draw_text(entity.name(), x - half, y - half - 6.0, 16.0, WHITE);
    }

    fn draw_ui(&mut self, peer: &Peer) {
        draw_text(peer.replica().label().text(), 10.0, 30.0, 32.0, WHITE);

        let connection_color = if peer.is_connected() { GREEN } else { RED };
        draw_rectangle(10.0, 42.0, 8.0, 8.0, connection_color);
        let role = match peer.local_role() {
            Some(role) => role.label(),
            None if peer.is_connected() => "Waiting for spawn",
            None => "Disconnected",
        };
        draw_text(role, 24.0, 50.0, 16.0, WHITE);

        let count = peer.entities().count();
        let player_text = match peer.replica().active_player() {
            Some(entity_id) => format!("{} players, watching Player {}", count, entity_id),
            None => format!("{} players, no active player", count),
        };
        draw_text(&player_text, 10.0, 68.0, 16.0, WHITE);

        for (i, message) in peer.messages().enumerate() {
            draw_text(
                message,
                10.0,
                self.height - 10.0 - (i as f32) * 18.0,
                16.0,
                Color::from_rgba(0, 170, 255, 255),
            );
        }
    }
}

/// Projects a world position onto the screen, `center` at the middle and +z up
pub fn world_to_screen(
    transform: &Transform,
    center: &Transform,
    width: f32,
    height: f32,
) -> (f32, f32) {
    let x = width / 2.0 + (transform.x - center.x) * PIXELS_PER_UNIT;
    let y = height / 2.0 - (transform.z - center.z) * PIXELS_PER_UNIT;
    (x, y)
}
