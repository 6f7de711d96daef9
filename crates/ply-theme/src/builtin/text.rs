//! The `text` built-in theme: no pixel rendering at all, just a pulsing
//! glyph and plain prompts written straight to the console (spec §4.7).
//!
//! Grounded on `original_source/src/splash-plugins/text/plugin.c`: the
//! source clears the screen, hides the cursor, and writes raw bytes to
//! the tty for everything, including `CLEAR_LINE_SEQUENCE`/`BACKSPACE`
//! escape constants and masking password keystrokes behind a bullet
//! glyph. This theme keeps both constants and the bullet-masking idea,
//! redrawing the whole prompt line on every `display_*` call instead of
//! echoing keystroke-by-keystroke (the orchestrator hands this theme a
//! fully-formed `n_bullets`/`entry_text` instead of raw keystrokes).

use std::f64::consts::PI;

use ply_device::Seat;
use ply_terminal::Terminal;

use crate::plugin::{Mode, ThemePlugin};

const CLEAR_LINE_SEQUENCE: &[u8] = b"\x1b[2K\r\n";
const BULLET: &str = "\u{2022}";
const PULSE_GLYPH: &str = "*";
const PULSE_PERIOD_SECONDS: f64 = 3.0;
const GRAYSCALE_BASE: u8 = 232;
const GRAYSCALE_STEPS: u8 = 23;

pub struct TextTheme {
    terminal: Option<Terminal>,
    last_pulse_color: Option<u8>,
}

impl TextTheme {
    pub fn new() -> Self {
        Self {
            terminal: None,
            last_pulse_color: None,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Some(term) = self.terminal.as_mut() {
            if let Err(e) = term.write_bytes(bytes) {
                tracing::warn!("text theme write failed: {e}");
            }
        }
    }
}

impl Default for TextTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl ThemePlugin for TextTheme {
    fn attach_to_seat(&mut self, seat: &mut Seat) {
        self.terminal = seat.terminal.take();
        self.write(CLEAR_LINE_SEQUENCE);
        if let Some(term) = self.terminal.as_mut() {
            let _ = term.hide_cursor();
        }
    }

    fn detach_from_seat(&mut self, seat: &mut Seat) {
        if let Some(mut term) = self.terminal.take() {
            let _ = term.show_cursor();
            seat.terminal = Some(term);
        }
    }

    fn show(&mut self, _mode: Mode) -> bool {
        self.terminal.is_some()
    }

    fn hide(&mut self) {
        self.write(CLEAR_LINE_SEQUENCE);
    }

    fn update_status(&mut self, _status: &str) {}

    fn on_boot_progress(&mut self, elapsed_seconds: f64, _fraction_done: f64) {
        let phase = 0.5 * (elapsed_seconds * 2.0 * PI / PULSE_PERIOD_SECONDS).sin() + 0.5;
        let level = (phase * GRAYSCALE_STEPS as f64).round() as u8;
        let color = GRAYSCALE_BASE + level.min(GRAYSCALE_STEPS);
        if self.last_pulse_color == Some(color) {
            return;
        }
        self.last_pulse_color = Some(color);
        if let Some(term) = self.terminal.as_mut() {
            let _ = term.move_cursor(0, 0);
            let _ = term.set_foreground_color(color);
        }
        self.write(PULSE_GLYPH.as_bytes());
    }

    fn display_normal(&mut self) {
        self.write(CLEAR_LINE_SEQUENCE);
    }

    fn display_message(&mut self, message: &str) {
        self.write(CLEAR_LINE_SEQUENCE);
        self.write(message.as_bytes());
    }

    fn display_password(&mut self, prompt: &str, n_bullets: usize) {
        self.write(CLEAR_LINE_SEQUENCE);
        self.write(prompt.as_bytes());
        self.write(b" ");
        for _ in 0..n_bullets {
            self.write(BULLET.as_bytes());
        }
    }

    fn display_question(&mut self, prompt: &str, entry_text: &str) {
        self.write(CLEAR_LINE_SEQUENCE);
        self.write(prompt.as_bytes());
        self.write(b" ");
        self.write(entry_text.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_color_is_stable_at_identical_elapsed_time() {
        let mut theme = TextTheme::new();
        theme.on_boot_progress(1.0, 0.0);
        let first = theme.last_pulse_color;
        theme.on_boot_progress(1.0, 0.0);
        assert_eq!(theme.last_pulse_color, first);
    }

    #[test]
    fn pulse_color_stays_within_the_grayscale_ramp() {
        let mut theme = TextTheme::new();
        for i in 0..60 {
            theme.on_boot_progress(i as f64 * 0.1, 0.0);
            if let Some(color) = theme.last_pulse_color {
                assert!(color >= GRAYSCALE_BASE && color <= GRAYSCALE_BASE + GRAYSCALE_STEPS);
            }
        }
    }
}
