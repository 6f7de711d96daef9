//! Frame buffer / renderer (spec §4.3): an opened graphics device backed
//! by either the Linux framebuffer or a DRM dumb buffer, flushed from an
//! in-memory [`PixelBuffer`] shadow.

pub mod drm_backend;
pub mod fbdev;
pub mod format;

use std::path::Path;

use ply_core::{Rect, Result};
use ply_pixel::PixelBuffer;

pub use format::PixelFormat;

/// Capability table a backend must provide; `ply-display`'s `FrameBuffer`
/// drives whichever one device discovery selected, per spec.md §9's
/// "polymorphism without inheritance" note.
pub trait RendererBackend {
    fn device_path(&self) -> &Path;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn line_length(&self) -> u32;
    fn pixel_format(&self) -> PixelFormat;
    /// Write every shadow pixel within `rect` to the mapped device memory.
    fn write_rect(&mut self, rect: Rect, shadow: &PixelBuffer) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
}

/// An opened graphics device with a shadow [`PixelBuffer`], dirty-rect
/// tracking, and a pause flag, per spec.md §3's `FrameBuffer` data model.
pub struct FrameBuffer {
    backend: Box<dyn RendererBackend>,
    area: Rect,
    area_to_flush: Rect,
    paused: bool,
    shadow: PixelBuffer,
    state: State,
}

impl FrameBuffer {
    /// Wrap an already-opened backend. Allocates and zeroes a shadow sized
    /// `width x height x 4`, as spec.md §4.3's open sequence requires.
    pub fn new(backend: Box<dyn RendererBackend>) -> Self {
        let area = Rect::new(0, 0, backend.width(), backend.height());
        let shadow = PixelBuffer::new(backend.width(), backend.height());
        Self {
            backend,
            area,
            area_to_flush: Rect::empty(),
            paused: false,
            shadow,
            state: State::Open,
        }
    }

    pub fn open_fbdev(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(fbdev::FbdevBackend::open(path)?)))
    }

    pub fn open_drm(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(drm_backend::DrmBackend::open(path)?)))
    }

    pub fn device_path(&self) -> &Path {
        self.backend.device_path()
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn area_to_flush(&self) -> Rect {
        debug_assert!(self.area_to_flush.clip(&self.area) == self.area_to_flush);
        self.area_to_flush
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn shadow(&self) -> &PixelBuffer {
        &self.shadow
    }

    pub fn shadow_mut(&mut self) -> &mut PixelBuffer {
        &mut self.shadow
    }

    /// Record that `rect` was modified. Callers announce the modified
    /// area after drawing into the shadow buffer directly, or use the
    /// `fill_*`/`draw_rect` helpers below which do this automatically.
    pub fn mark_dirty(&mut self, rect: Rect) {
        self.area_to_flush = self.area_to_flush.union(&rect.clip(&self.area));
    }

    pub fn fill_with_color(&mut self, area: Rect, color: ply_pixel::Color) {
        self.shadow.fill_with_color(area, color);
        self.mark_dirty(area);
    }

    pub fn fill_with_hex_color(&mut self, area: Rect, hex: u32) {
        self.shadow.fill_with_hex_color(area, hex);
        self.mark_dirty(area);
    }

    /// Pause flushing; dirty regions keep accumulating while paused.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume flushing and immediately issue one flush, per spec.md §4.3
    /// ("unpausing issues one flush").
    pub fn unpause(&mut self) -> Result<()> {
        self.paused = false;
        self.flush()
    }

    /// Convert every shadow pixel within the dirty rectangle to the
    /// device's native layout and write it, then reset the dirty
    /// rectangle to empty. A no-op while paused.
    pub fn flush(&mut self) -> Result<()> {
        if self.paused || self.area_to_flush.is_empty() {
            return Ok(());
        }
        self.backend.write_rect(self.area_to_flush, &self.shadow)?;
        self.area_to_flush = Rect::empty();
        Ok(())
    }

    /// Unmap and release the backend, forgetting geometry. Subsequent use
    /// of this value is a compile error since it is consumed.
    pub fn close(self) {
        debug_assert_eq!(self.state, State::Open);
        drop(self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ply_pixel::Color;

    struct FakeBackend {
        width: u32,
        height: u32,
        written: Vec<Rect>,
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
        fn write_rect(&mut self, rect: Rect, _shadow: &PixelBuffer) -> Result<()> {
            self.written.push(rect);
            Ok(())
        }
    }

    fn fake_fb(w: u32, h: u32) -> FrameBuffer {
        FrameBuffer::new(Box::new(FakeBackend {
            width: w,
            height: h,
            written: Vec::new(),
        }))
    }

    #[test]
    fn dirty_rect_accumulates_as_true_union() {
        let mut fb = fake_fb(16, 16);
        fb.fill_with_hex_color(Rect::new(0, 0, 2, 2), 0xff0000);
        fb.fill_with_hex_color(Rect::new(10, 10, 2, 2), 0x00ff00);
        let dirty = fb.area_to_flush();
        assert_eq!(dirty, Rect::new(0, 0, 12, 12));
    }

    #[test]
    fn flush_resets_dirty_rect_to_empty() {
        let mut fb = fake_fb(8, 8);
        fb.fill_with_hex_color(Rect::new(0, 0, 4, 4), 0xffffff);
        assert!(!fb.area_to_flush().is_empty());
        fb.flush().unwrap();
        assert!(fb.area_to_flush().is_empty());
    }

    #[test]
    fn paused_flush_is_a_noop_and_accumulates() {
        let mut fb = fake_fb(8, 8);
        fb.pause();
        fb.fill_with_hex_color(Rect::new(0, 0, 2, 2), 0xff0000);
        fb.flush().unwrap();
        assert!(!fb.area_to_flush().is_empty(), "dirty rect must survive a paused flush");
        fb.fill_with_hex_color(Rect::new(4, 4, 2, 2), 0x00ff00);
        assert_eq!(fb.area_to_flush(), Rect::new(0, 0, 6, 6));
    }

    #[test]
    fn unpause_issues_one_flush() {
        let mut fb = fake_fb(8, 8);
        fb.pause();
        fb.fill_with_hex_color(Rect::new(0, 0, 2, 2), 0xff0000);
        fb.unpause().unwrap();
        assert!(fb.area_to_flush().is_empty());
        assert!(!fb.is_paused());
    }

    #[test]
    fn fill_with_color_updates_shadow_and_marks_dirty() {
        let mut fb = fake_fb(4, 4);
        fb.fill_with_color(Rect::new(0, 0, 1, 1), Color::new(1.0, 0.0, 0.0, 1.0));
        let (a, r, _, _) = ply_pixel::unpack(fb.shadow().get(0, 0).unwrap());
        assert_eq!(a, 0xff);
        assert_eq!(r, 0xff);
        assert_eq!(fb.area_to_flush(), Rect::new(0, 0, 1, 1));
    }
}
