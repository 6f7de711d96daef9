//! The `script` built-in theme: runs a `.script` file through `ply-script`
//! and composites whatever sprites the script defines, per spec §4.8.
//!
//! Grounded on `original_source/src/plugins/splash/script/
//! script-lib-sprite.c`'s `script_lib_sprite_refresh`/`draw_area`: sprites
//! are stable-sorted by `z`, removed sprites invalidate their old bounding
//! box, changed sprites invalidate both old and new boxes, and every
//! invalidated region is repainted from the background color (or
//! top/bottom gradient) before compositing each intersecting sprite back
//! to front in z order at its own opacity. There is no separate
//! `plugin.c` for this theme in the source tree — `script.c`'s own
//! `create`/`on_boot_progress`/`on_refresh` wiring is what this module
//! reproduces, minus the loop/display plumbing that now lives in
//! `ply-event-loop`/`ply-display`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ply_core::{Error, Rect, Result};
use ply_device::Seat;
use ply_display::FrameBuffer;
use ply_pixel::{Color, PixelBuffer};
use ply_script::host::{ImageHandle, ImageSize, SpriteHandle};
use ply_script::{Evaluator, ScriptHost};

use crate::plugin::{Mode, ThemePlugin};

struct SpriteState {
    image: Option<usize>,
    x: f64,
    y: f64,
    z: f64,
    opacity: f64,
    old_area: Rect,
    old_opacity: f64,
    refresh_me: bool,
    remove_me: bool,
}

impl SpriteState {
    fn new() -> Self {
        Self {
            image: None,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            opacity: 1.0,
            old_area: Rect::empty(),
            old_opacity: 1.0,
            refresh_me: false,
            remove_me: false,
        }
    }
}

/// The `ScriptHost` implementation backing a script-driven theme's
/// `Image`/`Sprite`/`Window` native functions. Shared with the theme
/// through an `Rc<RefCell<..>>` so both the evaluator (via `Box<dyn
/// ScriptHost>`) and `ScriptTheme::on_boot_progress` can reach the same
/// sprite list without the evaluator borrowing the renderer directly.
struct ScriptThemeHost {
    logo_path: Option<PathBuf>,
    theme_dir: PathBuf,
    images: Vec<PixelBuffer>,
    /// Keyed by a monotonic id rather than stored in z-order: unlike the
    /// image table, `refresh_sprites` reorders and removes entries every
    /// frame, so a script's captured `SpriteHandle` must stay valid across
    /// those operations instead of aliasing whatever now sits at that
    /// position.
    sprites: HashMap<SpriteHandle, SpriteState>,
    next_sprite_id: SpriteHandle,
    window_size: ImageSize,
    background_start: Color,
    background_end: Color,
}

impl ScriptThemeHost {
    fn new(theme_dir: PathBuf, logo_path: Option<PathBuf>) -> Self {
        Self {
            logo_path,
            theme_dir,
            images: Vec::new(),
            sprites: HashMap::new(),
            next_sprite_id: 0,
            window_size: ImageSize { width: 0, height: 0 },
            background_start: Color::new(0.0, 0.0, 0.0, 1.0),
            background_end: Color::new(0.0, 0.0, 0.0, 1.0),
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        if path == "special://logo" {
            if let Some(logo) = &self.logo_path {
                return logo.clone();
            }
        }
        self.theme_dir.join(path)
    }

    fn sprite_area(&self, sprite: &SpriteState) -> Rect {
        let Some(image) = sprite.image.and_then(|i| self.images.get(i)) else {
            return Rect::empty();
        };
        Rect::new(sprite.x.round() as i32, sprite.y.round() as i32, image.width(), image.height())
    }
}

impl ScriptHost for ScriptThemeHost {
    fn image_new(&mut self, path: &str) -> Option<ImageHandle> {
        let resolved = self.resolve_path(path);
        match PixelBuffer::load_from_path(&resolved) {
            Ok(buf) => {
                self.images.push(buf);
                Some((self.images.len() - 1) as ImageHandle)
            }
            Err(e) => {
                tracing::warn!("script theme: failed to load {}: {e}", resolved.display());
                None
            }
        }
    }

    fn image_size(&self, image: ImageHandle) -> Option<ImageSize> {
        let buf = self.images.get(image as usize)?;
        Some(ImageSize { width: buf.width(), height: buf.height() })
    }

    fn image_rotate(&mut self, image: ImageHandle, angle_radians: f64) -> Option<ImageHandle> {
        let rotated = self.images.get(image as usize)?.rotate(angle_radians);
        self.images.push(rotated);
        Some((self.images.len() - 1) as ImageHandle)
    }

    fn image_scale(&mut self, image: ImageHandle, width: u32, height: u32) -> Option<ImageHandle> {
        let scaled = self.images.get(image as usize)?.scale(width, height);
        self.images.push(scaled);
        Some((self.images.len() - 1) as ImageHandle)
    }

    fn sprite_new(&mut self) -> SpriteHandle {
        let id = self.next_sprite_id;
        self.next_sprite_id += 1;
        self.sprites.insert(id, SpriteState::new());
        id
    }

    fn sprite_set_image(&mut self, sprite: SpriteHandle, image: Option<ImageHandle>) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.image = image.map(|i| i as usize);
            s.refresh_me = true;
        }
    }

    fn sprite_set_x(&mut self, sprite: SpriteHandle, x: f64) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.x = x;
        }
    }

    fn sprite_set_y(&mut self, sprite: SpriteHandle, y: f64) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.y = y;
        }
    }

    fn sprite_set_z(&mut self, sprite: SpriteHandle, z: f64) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.z = z;
        }
    }

    fn sprite_set_opacity(&mut self, sprite: SpriteHandle, opacity: f64) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    fn sprite_remove(&mut self, sprite: SpriteHandle) {
        if let Some(s) = self.sprites.get_mut(&sprite) {
            s.remove_me = true;
        }
    }

    fn window_size(&self) -> ImageSize {
        self.window_size
    }

    fn window_set_background_top_color(&mut self, color: Color) {
        self.background_start = color;
    }

    fn window_set_background_bottom_color(&mut self, color: Color) {
        self.background_end = color;
    }
}

/// Paint one invalidated rectangle: background fill, then every sprite
/// whose area intersects it, back to front in (already sorted) z order.
/// Mirrors `script_lib_sprite_draw_area`.
fn paint_region(renderer: &mut FrameBuffer, host: &ScriptThemeHost, region: Rect) {
    let region = region.clip(&renderer.area());
    if region.is_empty() {
        return;
    }
    let top = host.background_start;
    let bottom = host.background_end;
    if top == bottom {
        renderer.fill_with_color(region, top);
    } else {
        let to_bytes = |c: Color| {
            (
                (c.r.clamp(0.0, 1.0) * 255.0).round() as u8,
                (c.g.clamp(0.0, 1.0) * 255.0).round() as u8,
                (c.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            )
        };
        renderer.shadow_mut().fill_with_gradient(region, to_bytes(top), to_bytes(bottom));
    }

    let mut ordered: Vec<&SpriteState> = host.sprites.values().collect();
    ordered.sort_by(|a, b| a.z.total_cmp(&b.z));

    for sprite in ordered {
        if sprite.remove_me || sprite.opacity < 0.011 {
            continue;
        }
        let Some(image) = sprite.image.and_then(|i| host.images.get(i)) else { continue };
        let area = host.sprite_area(sprite);
        let clipped = area.clip(&region);
        if clipped.is_empty() {
            continue;
        }
        renderer.shadow_mut().fill_with_argb32_data(
            clipped,
            clipped.x - area.x,
            clipped.y - area.y,
            image.width(),
            image.pixels(),
            sprite.opacity as f32,
        );
    }
    renderer.mark_dirty(region);
}

/// Drop removed sprites while invalidating their old area, invalidate
/// old+new areas of anything that moved or changed, then repaint every
/// invalidated region. Sprites are keyed by a stable id rather than
/// reindexed, so a handle captured by a script before this runs still
/// names the same sprite afterward. Mirrors `script_lib_sprite_refresh`;
/// z-order itself is resolved at paint time, in `paint_region`.
fn refresh_sprites(renderer: &mut FrameBuffer, host: &mut ScriptThemeHost) {
    let mut damaged: Vec<Rect> = Vec::new();

    let remove_ids: Vec<SpriteHandle> = host
        .sprites
        .iter()
        .filter(|(_, s)| s.remove_me)
        .map(|(id, _)| *id)
        .collect();
    for id in remove_ids {
        if let Some(s) = host.sprites.remove(&id) {
            if !s.old_area.is_empty() {
                damaged.push(s.old_area);
            }
        }
    }

    for sprite in host.sprites.values_mut() {
        if sprite.image.is_none() {
            continue;
        }
        let area = Rect::new(
            sprite.x.round() as i32,
            sprite.y.round() as i32,
            host.images[sprite.image.unwrap()].width(),
            host.images[sprite.image.unwrap()].height(),
        );
        let moved = area != sprite.old_area;
        let faded = (sprite.old_opacity - sprite.opacity).abs() > 0.01;
        if moved || faded || sprite.refresh_me {
            damaged.push(area);
            if !sprite.old_area.is_empty() {
                damaged.push(sprite.old_area);
            }
            sprite.old_area = area;
            sprite.old_opacity = sprite.opacity;
            sprite.refresh_me = false;
        }
    }

    for region in damaged {
        paint_region(renderer, host, region);
    }
}

pub struct ScriptTheme {
    renderer: Option<FrameBuffer>,
    evaluator: Option<Evaluator>,
    host: Rc<RefCell<ScriptThemeHost>>,
}

impl ScriptTheme {
    /// Load and run `<theme_dir>/<script_name>` (typically the theme's
    /// `.plymouth`-declared `ScriptFile=`), installing a fresh sprite/
    /// image host before the top level runs so `Sprite._New`/`ImageNew`
    /// calls made at load time land in the right tables.
    pub fn load(theme_dir: &Path, script_name: &str, logo_path: Option<PathBuf>) -> Result<Self> {
        let source = std::fs::read_to_string(theme_dir.join(script_name))?;
        let host = Rc::new(RefCell::new(ScriptThemeHost::new(theme_dir.to_path_buf(), logo_path)));
        let evaluator = ply_script::load(&source, Box::new(ProxyHost(host.clone())))
            .map_err(|e| Error::theme(format!("{}: {e}", theme_dir.display())))?;
        Ok(Self { renderer: None, evaluator: Some(evaluator), host })
    }

    fn call_hook(&mut self, name: &str, args: &[ply_script::ObjRef]) {
        if let Some(eval) = self.evaluator.as_mut() {
            if let Err(e) = eval.call_global_function(name, args) {
                tracing::warn!("script theme hook {name} failed: {e}");
            }
        }
    }
}

/// A `ScriptHost` that forwards every call through the shared `Rc<RefCell<>>`
/// so the evaluator (which owns a `Box<dyn ScriptHost>`) and
/// `refresh_sprites` (called directly from `on_boot_progress`) operate on
/// the same sprite/image tables.
struct ProxyHost(Rc<RefCell<ScriptThemeHost>>);

impl ScriptHost for ProxyHost {
    fn image_new(&mut self, path: &str) -> Option<ImageHandle> {
        self.0.borrow_mut().image_new(path)
    }

    fn image_size(&self, image: ImageHandle) -> Option<ImageSize> {
        self.0.borrow().image_size(image)
    }

    fn image_rotate(&mut self, image: ImageHandle, angle_radians: f64) -> Option<ImageHandle> {
        self.0.borrow_mut().image_rotate(image, angle_radians)
    }

    fn image_scale(&mut self, image: ImageHandle, width: u32, height: u32) -> Option<ImageHandle> {
        self.0.borrow_mut().image_scale(image, width, height)
    }

    fn sprite_new(&mut self) -> SpriteHandle {
        self.0.borrow_mut().sprite_new()
    }

    fn sprite_set_image(&mut self, sprite: SpriteHandle, image: Option<ImageHandle>) {
        self.0.borrow_mut().sprite_set_image(sprite, image)
    }

    fn sprite_set_x(&mut self, sprite: SpriteHandle, x: f64) {
        self.0.borrow_mut().sprite_set_x(sprite, x)
    }

    fn sprite_set_y(&mut self, sprite: SpriteHandle, y: f64) {
        self.0.borrow_mut().sprite_set_y(sprite, y)
    }

    fn sprite_set_z(&mut self, sprite: SpriteHandle, z: f64) {
        self.0.borrow_mut().sprite_set_z(sprite, z)
    }

    fn sprite_set_opacity(&mut self, sprite: SpriteHandle, opacity: f64) {
        self.0.borrow_mut().sprite_set_opacity(sprite, opacity)
    }

    fn sprite_remove(&mut self, sprite: SpriteHandle) {
        self.0.borrow_mut().sprite_remove(sprite)
    }

    fn window_size(&self) -> ImageSize {
        self.0.borrow().window_size()
    }

    fn window_set_background_top_color(&mut self, color: Color) {
        self.0.borrow_mut().window_set_background_top_color(color)
    }

    fn window_set_background_bottom_color(&mut self, color: Color) {
        self.0.borrow_mut().window_set_background_bottom_color(color)
    }
}

impl ThemePlugin for ScriptTheme {
    fn attach_to_seat(&mut self, seat: &mut Seat) {
        self.renderer = seat.renderer.take();
        if let Some(renderer) = &self.renderer {
            let area = renderer.area();
            self.host.borrow_mut().window_size = ImageSize { width: area.width, height: area.height };
        }
    }

    fn detach_from_seat(&mut self, seat: &mut Seat) {
        seat.renderer = self.renderer.take();
    }

    fn show(&mut self, _mode: Mode) -> bool {
        let Some(renderer) = self.renderer.as_mut() else { return false };
        let area = renderer.area();
        let mut host = self.host.borrow_mut();
        paint_region(renderer, &host, area);
        host.sprites.values_mut().for_each(|s| s.old_area = Rect::empty());
        true
    }

    fn hide(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            let area = renderer.area();
            renderer.fill_with_hex_color(area, 0x000000);
            let _ = renderer.flush();
        }
    }

    fn update_status(&mut self, status: &str) {
        let arg = ply_script::object::new_str(status);
        self.call_hook("update_status", &[arg]);
    }

    fn on_boot_progress(&mut self, elapsed_seconds: f64, fraction_done: f64) {
        let args = [ply_script::object::new_float(elapsed_seconds), ply_script::object::new_float(fraction_done)];
        self.call_hook("on_boot_progress", &args);
        if let Some(renderer) = self.renderer.as_mut() {
            refresh_sprites(renderer, &mut self.host.borrow_mut());
        }
    }

    fn display_normal(&mut self) {
        self.call_hook("display_normal", &[]);
    }

    fn display_message(&mut self, message: &str) {
        let arg = ply_script::object::new_str(message);
        self.call_hook("display_message", &[arg]);
    }

    fn display_password(&mut self, prompt: &str, n_bullets: usize) {
        let args = [ply_script::object::new_str(prompt), ply_script::object::new_int(n_bullets as i64)];
        self.call_hook("display_password", &args);
    }

    fn display_question(&mut self, prompt: &str, entry_text: &str) {
        let args = [ply_script::object::new_str(prompt), ply_script::object::new_str(entry_text)];
        self.call_hook("display_question", &args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ply_display::{PixelFormat, RendererBackend};

    struct FakeBackend {
        width: u32,
        height: u32,
    }

    impl RendererBackend for FakeBackend {
        fn device_path(&self) -> &Path {
            Path::new("/dev/fake0")
        }
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn line_length(&self) -> u32 {
            self.width * 4
        }
        fn pixel_format(&self) -> PixelFormat {
            PixelFormat::XRGB8888
        }
        fn write_rect(&mut self, _rect: Rect, _shadow: &PixelBuffer) -> Result<()> {
            Ok(())
        }
    }

    fn fake_fb(w: u32, h: u32) -> FrameBuffer {
        FrameBuffer::new(Box::new(FakeBackend { width: w, height: h }))
    }

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([200, 0, 0, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn loads_and_runs_top_level_script() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "sprite.png", 4, 4);
        std::fs::write(
            dir.path().join("splash.script"),
            "image = ImageNew(\"sprite.png\"); sprite = Sprite._New(); sprite.SetImage(image);",
        )
        .unwrap();
        let theme = ScriptTheme::load(dir.path(), "splash.script", None).unwrap();
        assert_eq!(theme.host.borrow().images.len(), 1);
        assert_eq!(theme.host.borrow().sprites.len(), 1);
    }

    #[test]
    fn missing_script_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ScriptTheme::load(dir.path(), "missing.script", None).is_err());
    }

    #[test]
    fn refresh_moves_sprite_damage_from_old_to_new_area() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = ScriptThemeHost::new(dir.path().to_path_buf(), None);
        host.images.push(PixelBuffer::new(2, 2));
        let handle = host.sprite_new();
        host.sprite_set_image(handle, Some(0));
        host.sprite_set_x(handle, 0.0);
        host.sprite_set_y(handle, 0.0);

        let mut fb = fake_fb(16, 16);
        refresh_sprites(&mut fb, &mut host);
        assert_eq!(host.sprites[&handle].old_area, Rect::new(0, 0, 2, 2));

        host.sprite_set_x(handle, 10.0);
        refresh_sprites(&mut fb, &mut host);
        assert_eq!(host.sprites[&handle].old_area, Rect::new(10, 0, 2, 2));
    }

    #[test]
    fn removed_sprite_is_dropped_on_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = ScriptThemeHost::new(dir.path().to_path_buf(), None);
        host.images.push(PixelBuffer::new(2, 2));
        let handle = host.sprite_new();
        host.sprite_set_image(handle, Some(0));

        let mut fb = fake_fb(8, 8);
        refresh_sprites(&mut fb, &mut host);
        assert_eq!(host.sprites.len(), 1);

        host.sprite_remove(handle);
        refresh_sprites(&mut fb, &mut host);
        assert!(host.sprites.is_empty());
    }

    /// Two sprites at different z, refreshed once (so the old implementation's
    /// z-sort would have reordered their backing storage), then a `SetX` on
    /// the lower-z sprite by its original handle must still move *that*
    /// sprite and not the other one.
    #[test]
    fn handle_still_addresses_same_sprite_after_refresh_reorders_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = ScriptThemeHost::new(dir.path().to_path_buf(), None);
        host.images.push(PixelBuffer::new(2, 2));

        let back = host.sprite_new();
        host.sprite_set_image(back, Some(0));
        host.sprite_set_z(back, 10.0);
        host.sprite_set_x(back, 0.0);
        host.sprite_set_y(back, 0.0);

        let front = host.sprite_new();
        host.sprite_set_image(front, Some(0));
        host.sprite_set_z(front, 1.0);
        host.sprite_set_x(front, 5.0);
        host.sprite_set_y(front, 5.0);

        let mut fb = fake_fb(32, 32);
        refresh_sprites(&mut fb, &mut host);
        assert_eq!(host.sprites[&back].old_area, Rect::new(0, 0, 2, 2));
        assert_eq!(host.sprites[&front].old_area, Rect::new(5, 5, 2, 2));

        host.sprite_set_x(front, 20.0);
        refresh_sprites(&mut fb, &mut host);

        assert_eq!(host.sprites[&front].old_area, Rect::new(20, 5, 2, 2), "moving `front` must not move `back`");
        assert_eq!(host.sprites[&back].old_area, Rect::new(0, 0, 2, 2), "`back` must be untouched by `front`'s move");
        assert_eq!(host.sprites[&back].x, 0.0);
        assert_eq!(host.sprites[&front].x, 20.0);
    }
}
