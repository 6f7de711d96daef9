//! The `fade-in` built-in theme: a centered logo that fades in and out on
//! a slow sine pulse, a scattered field of twinkling stars seeded one per
//! status update, and an image-based password prompt.
//!
//! Grounded on `original_source/src/splash-plugins/fade-in/plugin.c`:
//! `animate_at_time`'s two pulse formulas (`.5*sin(t/5*2pi)+.8` for the
//! logo, `.5*sin((now-star.start)/star.speed*2pi)+.5` per star, both
//! clamped to `[0,1]`), `add_star`'s rejection-sampling placement (reject
//! any candidate overlapping the logo's bounding box or an existing
//! star's), and `draw_password_entry`'s lock+entry+bullet-row layout. The
//! deep-blue backdrop color (`0.1, 0.1, .7, 1.0`) is kept as the
//! background fill the source uses throughout.

use ply_core::Rect;
use ply_device::Seat;
use ply_display::FrameBuffer;
use ply_pixel::{Color, PixelBuffer};
use rand::Rng;

use crate::plugin::{Mode, ThemePlugin};

const BACKGROUND: Color = Color::new(0.1, 0.1, 0.7, 1.0);
const LOGO_PULSE_PERIOD_SECONDS: f64 = 5.0;

struct Star {
    x: i32,
    y: i32,
    start_time: f64,
    speed: f64,
}

struct PasswordEntry {
    x: i32,
    y: i32,
    n_bullets: usize,
}

pub struct FadeTheme {
    renderer: Option<FrameBuffer>,
    logo: PixelBuffer,
    star: PixelBuffer,
    lock: PixelBuffer,
    bullet: PixelBuffer,
    entry: PixelBuffer,
    stars: Vec<Star>,
    logo_area: Rect,
    password: Option<PasswordEntry>,
    last_logo_opacity: Option<f64>,
}

impl FadeTheme {
    /// Load the five fixed-name image assets a fade-in theme directory
    /// carries (`logo.png`, `star.png`, `lock.png`, `bullet.png`,
    /// `entry.png`), matching the source's `fedora-logo.png`/`star.png`/
    /// `lock.png`/`bullet.png`/`entry.png` set under a different prefix
    /// since this repo doesn't ship Fedora's artwork.
    pub fn load(theme_dir: &std::path::Path) -> ply_core::Result<Self> {
        Ok(Self {
            renderer: None,
            logo: PixelBuffer::load_from_path(&theme_dir.join("logo.png"))?,
            star: PixelBuffer::load_from_path(&theme_dir.join("star.png"))?,
            lock: PixelBuffer::load_from_path(&theme_dir.join("lock.png"))?,
            bullet: PixelBuffer::load_from_path(&theme_dir.join("bullet.png"))?,
            entry: PixelBuffer::load_from_path(&theme_dir.join("entry.png"))?,
            stars: Vec::new(),
            logo_area: Rect::empty(),
            password: None,
            last_logo_opacity: None,
        })
    }

    fn screen_area(&self) -> Rect {
        self.renderer.as_ref().map(FrameBuffer::area).unwrap_or(Rect::empty())
    }

    fn compute_logo_area(&self) -> Rect {
        let bounds = self.screen_area();
        Rect::new(
            bounds.x + (bounds.width as i32 - self.logo.width() as i32) / 2,
            bounds.y + (bounds.height as i32 - self.logo.height() as i32) / 2,
            self.logo.width(),
            self.logo.height(),
        )
    }

    /// Rejection-sample a star position that overlaps neither the logo's
    /// bounding box nor any existing star's, per `add_star`.
    fn add_star(&mut self) {
        let bounds = self.screen_area();
        if bounds.is_empty() {
            return;
        }
        let (sw, sh) = (self.star.width() as i32, self.star.height() as i32);
        let mut rng = rand::rng();

        for _ in 0..200 {
            let x = rng.random_range(0..bounds.width.max(1) as i32);
            let y = rng.random_range(0..bounds.height.max(1) as i32);
            let candidate = Rect::new(x, y, sw.max(0) as u32, sh.max(0) as u32);
            if candidate.intersects(&self.logo_area) {
                continue;
            }
            if self.stars.iter().any(|s| candidate.intersects(&Rect::new(s.x, s.y, sw.max(0) as u32, sh.max(0) as u32))) {
                continue;
            }
            self.stars.push(Star {
                x,
                y,
                start_time: 0.0,
                speed: rng.random_range(1..=50) as f64,
            });
            return;
        }
    }

    fn draw_stars(&mut self, now: f64) {
        let Some(renderer) = self.renderer.as_mut() else { return };
        let (sw, sh) = (self.star.width(), self.star.height());
        for star in &self.stars {
            let area = Rect::new(star.x, star.y, sw, sh);
            let opacity = (0.5 * (((now - star.start_time) / star.speed) * std::f64::consts::TAU).sin() + 0.5)
                .clamp(0.0, 1.0);
            renderer.fill_with_color(area, BACKGROUND);
            renderer.shadow_mut().fill_with_argb32_data(area, 0, 0, sw, self.star.pixels(), opacity as f32);
            renderer.mark_dirty(area);
        }
    }

    fn draw_logo(&mut self, now: f64) {
        let opacity = (0.5 * ((now / LOGO_PULSE_PERIOD_SECONDS) * std::f64::consts::TAU).sin() + 0.8).clamp(0.0, 1.0);
        if self.last_logo_opacity == Some(opacity) {
            return;
        }
        self.last_logo_opacity = Some(opacity);
        let Some(renderer) = self.renderer.as_mut() else { return };
        let (lw, _) = (self.logo.width(), self.logo.height());
        renderer.fill_with_color(self.logo_area, BACKGROUND);
        renderer.shadow_mut().fill_with_argb32_data(self.logo_area, 0, 0, lw, self.logo.pixels(), opacity as f32);
        renderer.mark_dirty(self.logo_area);
    }

    fn draw_password_entry(&mut self) {
        let Some(entry) = &self.password else { return };
        let Some(renderer) = self.renderer.as_mut() else { return };
        renderer.pause();

        let entry_area = Rect::new(entry.x, entry.y, self.entry.width(), self.entry.height());
        renderer.fill_with_color(entry_area, BACKGROUND);
        renderer.shadow_mut().fill_with_image(entry_area.x, entry_area.y, &self.entry);
        renderer.mark_dirty(entry_area);

        let lock_x = entry.x - self.lock.width() as i32;
        let lock_y = entry.y + entry_area.height as i32 / 2 - self.lock.height() as i32 / 2;
        let lock_area = Rect::new(lock_x, lock_y, self.lock.width(), self.lock.height());
        renderer.fill_with_color(lock_area, BACKGROUND);
        renderer.shadow_mut().fill_with_image(lock_area.x, lock_area.y, &self.lock);
        renderer.mark_dirty(lock_area);

        for i in 0..entry.n_bullets {
            let bx = entry.x + (i as i32 + 1) * self.bullet.width() as i32;
            let by = entry.y + entry_area.height as i32 / 2 - self.bullet.height() as i32 / 2;
            let bullet_area = Rect::new(bx, by, self.bullet.width(), self.bullet.height());
            renderer.shadow_mut().fill_with_image(bullet_area.x, bullet_area.y, &self.bullet);
            renderer.mark_dirty(bullet_area);
        }

        if let Err(e) = renderer.unpause() {
            tracing::warn!("fade-in password entry flush failed: {e}");
        }
    }
}

impl ThemePlugin for FadeTheme {
    fn attach_to_seat(&mut self, seat: &mut Seat) {
        self.renderer = seat.renderer.take();
    }

    fn detach_from_seat(&mut self, seat: &mut Seat) {
        seat.renderer = self.renderer.take();
    }

    fn show(&mut self, _mode: Mode) -> bool {
        if self.renderer.is_none() {
            return false;
        }
        self.logo_area = self.compute_logo_area();
        let area = self.screen_area();
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.fill_with_color(area, BACKGROUND);
        }
        self.last_logo_opacity = None;
        true
    }

    fn hide(&mut self) {
        // Source fades to black over several frames; a single opaque fill
        // captures the endpoint without needing its own timer.
        if let Some(renderer) = self.renderer.as_mut() {
            let area = renderer.area();
            renderer.fill_with_hex_color(area, 0x000000);
            let _ = renderer.flush();
        }
        self.stars.clear();
        self.password = None;
    }

    fn update_status(&mut self, _status: &str) {
        self.add_star();
    }

    fn on_boot_progress(&mut self, elapsed_seconds: f64, _fraction_done: f64) {
        if self.password.is_some() {
            return;
        }
        self.draw_stars(elapsed_seconds);
        self.draw_logo(elapsed_seconds);
    }

    fn display_normal(&mut self) {
        self.password = None;
    }

    fn display_message(&mut self, _message: &str) {}

    fn display_password(&mut self, _prompt: &str, n_bullets: usize) {
        let bounds = self.screen_area();
        if self.password.is_none() {
            let x = bounds.width as i32 / 2 - (self.lock.width() as i32 + self.entry.width() as i32) / 2
                + self.lock.width() as i32;
            let y = bounds.height as i32 / 2 - self.entry.height() as i32 / 2;
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.fill_with_color(bounds, BACKGROUND);
            }
            self.password = Some(PasswordEntry { x, y, n_bullets });
        } else if let Some(entry) = self.password.as_mut() {
            entry.n_bullets = n_bullets;
        }
        self.draw_password_entry();
    }

    fn display_question(&mut self, prompt: &str, entry_text: &str) {
        self.display_password(prompt, entry_text.chars().count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &std::path::Path, name: &str, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        img.save(dir.join(name)).unwrap();
    }

    fn load_theme() -> (tempfile::TempDir, FadeTheme) {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "logo.png", 8, 8);
        write_png(dir.path(), "star.png", 2, 2);
        write_png(dir.path(), "lock.png", 2, 4);
        write_png(dir.path(), "bullet.png", 2, 2);
        write_png(dir.path(), "entry.png", 10, 4);
        let theme = FadeTheme::load(dir.path()).unwrap();
        (dir, theme)
    }

    #[test]
    fn loads_all_five_assets() {
        let (_dir, theme) = load_theme();
        assert_eq!(theme.logo.width(), 8);
        assert_eq!(theme.entry.width(), 10);
    }

    #[test]
    fn missing_asset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FadeTheme::load(dir.path()).is_err());
    }

    #[test]
    fn logo_opacity_pulse_stays_within_unit_range() {
        let (_dir, mut theme) = load_theme();
        for i in 0..50 {
            let t = i as f64 * 0.3;
            let opacity = (0.5 * ((t / LOGO_PULSE_PERIOD_SECONDS) * std::f64::consts::TAU).sin() + 0.8).clamp(0.0, 1.0);
            assert!((0.0..=1.0).contains(&opacity));
        }
        theme.on_boot_progress(0.0, 0.0); // no renderer attached; must not panic
    }

    #[test]
    fn display_password_then_question_tracks_bullet_count() {
        let (_dir, mut theme) = load_theme();
        theme.display_password("Password:", 0);
        assert_eq!(theme.password.as_ref().unwrap().n_bullets, 0);
        theme.display_password("Password:", 3);
        assert_eq!(theme.password.as_ref().unwrap().n_bullets, 3);
        theme.display_question("Continue?", "ye");
        assert_eq!(theme.password.as_ref().unwrap().n_bullets, 2);
    }

    #[test]
    fn display_normal_clears_password_state() {
        let (_dir, mut theme) = load_theme();
        theme.display_password("Password:", 1);
        assert!(theme.password.is_some());
        theme.display_normal();
        assert!(theme.password.is_none());
    }
}
