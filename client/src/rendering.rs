use crate::network::Frame;
use macroquad::prelude::*;
use shared::{GameState, Phase, Side, BALL_RADIUS, FIELD_HEIGHT, FIELD_WIDTH, PADDLE_INSET};

const SCORE_FONT_SIZE: f32 = 50.0;

/// Left edge of a side's paddle in field coordinates.
pub fn paddle_x(side: Side, paddle_width: f32) -> f32 {
    match side {
        Side::Left => PADDLE_INSET,
        Side::Right => FIELD_WIDTH - PADDLE_INSET - paddle_width,
    }
}

/// Number of lit ping bars out of ten, one per 20ms of round trip.
pub fn ping_bars(rtt_ms: f64) -> i32 {
    ((rtt_ms.max(0.0) / 20.0) as i32).min(10)
}

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

    /// Field-to-window scale, preserving the field's aspect ratio.
    fn scale(&self) -> f32 {
        (self.width / FIELD_WIDTH).min(self.height / FIELD_HEIGHT)
    }

    pub fn render(&mut self, frame: &Frame) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        let scale = self.scale();
        draw_rectangle_lines(0.0, 0.0, FIELD_WIDTH * scale, FIELD_HEIGHT * scale, 4.0, WHITE);

        match &frame.snapshot {
            None => self.draw_centered_text("Connecting...", scale),
            Some(snapshot) if snapshot.state.phase == Phase::Waiting => {
                self.draw_centered_text("Waiting for players...", scale)
            }
            Some(snapshot) => self.draw_game(&snapshot.state, frame.local_side, scale),
        }

        self.draw_ui(frame);
    }

    fn draw_centered_text(&mut self, text: &str, scale: f32) {
        let font_size = SCORE_FONT_SIZE * scale;
        let dimensions = measure_text(text, None, font_size as u16, 1.0);
        draw_text(
            text,
            (FIELD_WIDTH * scale - dimensions.width) / 2.0,
            FIELD_HEIGHT * scale / 2.0,
            font_size,
            WHITE,
        );
    }

    fn draw_game(&mut self, state: &GameState, local_side: Option<Side>, scale: f32) {
        // Dotted center line
        let mut y = 0.0;
        while y < FIELD_HEIGHT {
            draw_rectangle(
                (FIELD_WIDTH / 2.0 - 5.0) * scale,
                y * scale,
                10.0 * scale,
                20.0 * scale,
                Color::from_rgba(68, 68, 68, 255),
            );
            y += 30.0;
        }

        let font_size = SCORE_FONT_SIZE * scale;
        draw_text(
            &format!("{:02}", state.score.left),
            (FIELD_WIDTH / 2.0 - 60.0) * scale,
            40.0 * scale,
            font_size,
            WHITE,
        );
        draw_text(
            &format!("{:02}", state.score.right),
            (FIELD_WIDTH / 2.0 + 25.0) * scale,
            40.0 * scale,
            font_size,
            WHITE,
        );

        for side in Side::ALL {
            let paddle = state.paddles.get(side);
            let color = if Some(side) == local_side { GREEN } else { WHITE };
            draw_rectangle(
                paddle_x(side, paddle.width) * scale,
                paddle.y * scale,
                paddle.width * scale,
                paddle.height * scale,
                color,
            );
        }

        draw_circle(
            (state.ball.x + BALL_RADIUS) * scale,
            (state.ball.y + BALL_RADIUS) * scale,
            BALL_RADIUS * scale,
            WHITE,
        );
    }

    fn draw_ui(&mut self, frame: &Frame) {
        let y_start = self.height - 80.0;
        let indicator_size = 12.0;
        let spacing = 25.0;

        let features = [
            ("P", frame.settings.prediction),
            ("R", frame.settings.reconciliation),
            ("I", frame.settings.interpolation),
        ];

        for (i, (label, enabled)) in features.iter().enumerate() {
            let x = 10.0 + (i as f32) * spacing;
            let color = if *enabled { GREEN } else { RED };

            draw_rectangle(x, y_start, indicator_size, indicator_size, color);
            draw_rectangle_lines(x, y_start, indicator_size, indicator_size, 1.0, WHITE);

            draw_text(label, x + 3.0, y_start + indicator_size + 12.0, 12.0, WHITE);
        }

        let connection_color = if frame.local_id.is_some() { GREEN } else { RED };
        draw_rectangle(10.0, y_start + 35.0, 8.0, 8.0, connection_color);
        draw_text(
            &format!("ROOM {}", frame.room_id),
            20.0,
            y_start + 35.0 + 8.0,
            12.0,
            WHITE,
        );

        let ping_y = y_start + 50.0;
        let rtt = frame.rtt_ms.unwrap_or(0.0);
        let lit = ping_bars(rtt);

        for i in 0..10i32 {
            let bar_color = if i < lit {
                if rtt < 50.0 {
                    GREEN
                } else if rtt < 100.0 {
                    YELLOW
                } else {
                    RED
                }
            } else {
                Color::from_rgba(51, 51, 51, 255)
            };

            draw_rectangle(10.0 + (i as f32) * 3.0, ping_y, 2.0, 8.0, bar_color);
        }

        let ping_text = match frame.rtt_ms {
            Some(rtt) => format!("{:.0}ms", rtt),
            None => "--ms".to_string(),
        };
        draw_text(&ping_text, 45.0, ping_y + 8.0, 12.0, WHITE);

        let names: Vec<&str> = frame.users.iter().map(|u| u.username.as_str()).collect();
        let player_text = format!(
            "{} | {} pending inputs",
            names.join(" vs "),
            frame.pending_inputs
        );
        draw_text(&player_text, 10.0, ping_y + 23.0, 12.0, WHITE);
    }
}
