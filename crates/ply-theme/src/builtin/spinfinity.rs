//! The `spinfinity` built-in theme: a looping throbber animation, one PNG
//! frame per tick picked by a sine sweep through the frame sequence.
//!
//! Grounded on `original_source/src/splash-plugins/spinfinity/throbber.c`:
//! `throbber_add_frames` loads every `<prefix>*.png` file under a
//! directory sorted by name, and `animate_at_time` picks
//! `frame_number = (.5 * sin(time) + .5) * number_of_frames`, filling the
//! frame's area with `(0.0, 0.43, 0.71, 1.0)` before compositing the next
//! frame so old frame edges don't bleed through on a transparent PNG.

use std::path::Path;

use ply_core::{Error, Rect, Result};
use ply_device::Seat;
use ply_display::FrameBuffer;
use ply_pixel::{Color, PixelBuffer};

use crate::plugin::{Mode, ThemePlugin};

const BACKGROUND: Color = Color::new(0.0, 0.43, 0.71, 1.0);

pub struct SpinfinityTheme {
    renderer: Option<FrameBuffer>,
    frames: Vec<PixelBuffer>,
    area: Rect,
    current_frame: Option<usize>,
}

impl SpinfinityTheme {
    /// Load every `<frame_prefix>*.png` under `theme_dir`, sorted by file
    /// name (the source sorts with `versionsort`; plain lexicographic
    /// order agrees with it for the zero-padded names themes ship).
    pub fn load(theme_dir: &Path, frame_prefix: &str) -> Result<Self> {
        let mut names: Vec<String> = std::fs::read_dir(theme_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(frame_prefix) && name.ends_with(".png"))
            .collect();
        names.sort();

        if names.is_empty() {
            return Err(Error::theme(format!(
                "{}: no {frame_prefix}*.png frames found",
                theme_dir.display()
            )));
        }

        let mut frames = Vec::with_capacity(names.len());
        for name in names {
            frames.push(PixelBuffer::load_from_path(&theme_dir.join(name))?);
        }

        Ok(Self {
            renderer: None,
            frames,
            area: Rect::empty(),
            current_frame: None,
        })
    }

    fn frame_number_at(&self, time: f64) -> usize {
        let sweep = 0.5 * time.sin() + 0.5;
        let n = (sweep * self.frames.len() as f64) as usize;
        n.min(self.frames.len() - 1)
    }

    fn draw_frame(&mut self, index: usize) {
        let Some(renderer) = self.renderer.as_mut() else { return };
        renderer.pause();
        renderer.fill_with_color(self.area, BACKGROUND);
        renderer.shadow_mut().fill_with_image(self.area.x, self.area.y, &self.frames[index]);
        renderer.mark_dirty(self.area);
        if let Err(e) = renderer.unpause() {
            tracing::warn!("spinfinity flush failed: {e}");
        }
    }
}

impl ThemePlugin for SpinfinityTheme {
    fn attach_to_seat(&mut self, seat: &mut Seat) {
        self.renderer = seat.renderer.take();
    }

    fn detach_from_seat(&mut self, seat: &mut Seat) {
        seat.renderer = self.renderer.take();
    }

    fn show(&mut self, _mode: Mode) -> bool {
        let Some(renderer) = self.renderer.as_ref() else { return false };
        if self.frames.is_empty() {
            return false;
        }
        let bounds = renderer.area();
        let (fw, fh) = (self.frames[0].width(), self.frames[0].height());
        self.area = Rect::new(
            bounds.x + (bounds.width as i32 - fw as i32) / 2,
            bounds.y + (bounds.height as i32 - fh as i32) / 2,
            fw,
            fh,
        );
        self.current_frame = None;
        self.on_boot_progress(0.0, 0.0);
        true
    }

    fn hide(&mut self) {
        self.current_frame = None;
    }

    fn update_status(&mut self, _status: &str) {}

    fn on_boot_progress(&mut self, elapsed_seconds: f64, _fraction_done: f64) {
        if self.frames.is_empty() || self.renderer.is_none() {
            return;
        }
        let frame = self.frame_number_at(elapsed_seconds);
        if self.current_frame == Some(frame) {
            return;
        }
        self.current_frame = Some(frame);
        self.draw_frame(frame);
    }

    fn display_normal(&mut self) {}

    fn display_message(&mut self, _message: &str) {}

    fn display_password(&mut self, _prompt: &str, _n_bullets: usize) {}

    fn display_question(&mut self, _prompt: &str, _entry_text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frame(dir: &Path, name: &str) {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn loads_frames_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "throbber-002.png");
        write_frame(dir.path(), "throbber-001.png");
        write_frame(dir.path(), "throbber-000.png");
        write_frame(dir.path(), "unrelated.png");

        let theme = SpinfinityTheme::load(dir.path(), "throbber-").unwrap();
        assert_eq!(theme.frames.len(), 3);
    }

    #[test]
    fn missing_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SpinfinityTheme::load(dir.path(), "throbber-").is_err());
    }

    #[test]
    fn frame_number_at_zero_time_is_half_of_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            write_frame(dir.path(), &format!("throbber-{i:03}.png"));
        }
        let theme = SpinfinityTheme::load(dir.path(), "throbber-").unwrap();
        assert_eq!(theme.frame_number_at(0.0), 2);
    }
}
