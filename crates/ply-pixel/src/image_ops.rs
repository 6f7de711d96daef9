//! Image loading, scaling and rotation (SPEC_FULL.md §4.2 expansion),
//! grounded on `script-lib-image.c`'s `ImageScale`/`ImageRotate` native
//! functions. PNG decoding goes through the `image` crate rather than the
//! original's hand-rolled libpng wrapper; the scale/rotate math below is
//! reimplemented directly since there is no crate equivalent of
//! `ply_image_resize`/`ply_image_rotate`.

use std::path::Path;

use ply_core::{Error, Result};

use crate::{pack, PixelBuffer};

impl PixelBuffer {
    /// Decode a PNG (or any format the `image` crate supports) into a new
    /// premultiplied-alpha buffer.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .map_err(|e| Error::theme(format!("failed to decode image {}: {e}", path.display())))?
            .into_rgba8();
        let (width, height) = img.dimensions();
        let mut buf = PixelBuffer::new(width, height);
        for (x, y, px) in img.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let pr = premultiply(r, a);
            let pg = premultiply(g, a);
            let pb = premultiply(b, a);
            buf.set_raw(x as i32, y as i32, pack(a, pr, pg, pb));
        }
        Ok(buf)
    }

    /// Blit this image, unscaled, into `dst` at `(dst_x, dst_y)` (spec
    /// §4.2's `fill_with_image`, expressed in terms of the existing
    /// `fill_with_argb32_data` compositor).
    pub fn fill_with_image(&mut self, dst_x: i32, dst_y: i32, src: &PixelBuffer) {
        let area = ply_core::Rect::new(dst_x, dst_y, src.width(), src.height());
        self.fill_with_argb32_data(area, 0, 0, src.width(), src.pixels(), 1.0);
    }

    /// Nearest-neighbour resize to `(new_width, new_height)`, matching
    /// `ImageScale`'s integer-dimension contract. Returns a new buffer; the
    /// receiver is left unchanged.
    pub fn scale(&self, new_width: u32, new_height: u32) -> PixelBuffer {
        let mut out = PixelBuffer::new(new_width, new_height);
        if new_width == 0 || new_height == 0 || self.width() == 0 || self.height() == 0 {
            return out;
        }
        let x_ratio = self.width() as f64 / new_width as f64;
        let y_ratio = self.height() as f64 / new_height as f64;
        for y in 0..new_height {
            let src_y = ((y as f64 + 0.5) * y_ratio).floor() as i32;
            for x in 0..new_width {
                let src_x = ((x as f64 + 0.5) * x_ratio).floor() as i32;
                let px = self.get(src_x, src_y).unwrap_or(0);
                out.set_raw(x as i32, y as i32, px);
            }
        }
        out
    }

    /// Rotate by `angle` radians about the image's own center, matching
    /// `ImageRotate`'s inverse-mapping approach: each destination pixel
    /// samples the corresponding source location via the inverse rotation,
    /// nearest-neighbour, leaving out-of-bounds samples transparent. The
    /// output canvas is large enough to contain the full rotated image.
    pub fn rotate(&self, angle: f64) -> PixelBuffer {
        let w = self.width() as f64;
        let h = self.height() as f64;
        let cos_a = angle.cos();
        let sin_a = angle.sin();

        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for (cx, cy) in corners {
            let rx = cx * cos_a - cy * sin_a;
            let ry = cx * sin_a + cy * cos_a;
            min_x = min_x.min(rx);
            max_x = max_x.max(rx);
            min_y = min_y.min(ry);
            max_y = max_y.max(ry);
        }
        let out_w = (max_x - min_x).ceil().max(1.0) as u32;
        let out_h = (max_y - min_y).ceil().max(1.0) as u32;
        let mut out = PixelBuffer::new(out_w, out_h);

        let src_cx = w / 2.0;
        let src_cy = h / 2.0;
        let dst_cx = out_w as f64 / 2.0;
        let dst_cy = out_h as f64 / 2.0;

        for y in 0..out_h {
            for x in 0..out_w {
                let dx = x as f64 - dst_cx;
                let dy = y as f64 - dst_cy;
                // inverse rotation: map destination pixel back into source space
                let sx = dx * cos_a + dy * sin_a + src_cx;
                let sy = -dx * sin_a + dy * cos_a + src_cy;
                if let Some(px) = self.get(sx.floor() as i32, sy.floor() as i32) {
                    out.set_raw(x as i32, y as i32, px);
                }
            }
        }
        out
    }
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let v = channel as u32 * alpha as u32;
    let v = v + 0x80;
    (((v + (v >> 8)) >> 8) & 0xff) as u8
}

impl PixelBuffer {
    /// Internal helper: write without going through the public blend path,
    /// used when building a buffer pixel-by-pixel from a decoded/resampled
    /// source where no compositing onto existing content is wanted.
    pub(crate) fn set_raw(&mut self, x: i32, y: i32, value: u32) {
        if let Some(slot) = self.index_of(x, y) {
            self.raw_pixels_mut()[slot] = value;
        }
    }
}
