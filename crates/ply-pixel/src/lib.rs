#![forbid(unsafe_code)]

//! In-memory ARGB32 shadow surface with alpha compositing (spec §4.2).
//!
//! Every stored pixel uses premultiplied alpha: the identity
//! `(alpha == 0xff) => RGB are the exact display values` holds, and every
//! blend assumes its inputs are premultiplied. Pixels are packed as
//! `0xAARRGGBB` in a flat `Vec<u32>`, the same "raster + dirty union +
//! flush" shape `ftui-render`'s cell buffer uses for text, generalized
//! here to raw pixels.

pub mod image_ops;

use ply_core::Rect;

/// A straight-alpha color in `[0.0, 1.0]` per channel, as themes specify
/// fill colors (spec §4.2: `fill_with_color(area, rgba)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    /// Build from a `0xRRGGBB` hex literal, fully opaque.
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;
        Self::new(r, g, b, 1.0)
    }

    /// Premultiply and pack into `0xAARRGGBB`.
    fn to_premultiplied_argb32(self) -> u32 {
        let a = clamp_unit(self.a);
        let r = to_u8(clamp_unit(self.r) * a);
        let g = to_u8(clamp_unit(self.g) * a);
        let b = to_u8(clamp_unit(self.b) * a);
        pack(to_u8(a), r, g, b)
    }
}

fn clamp_unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

pub(crate) fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

pub fn unpack(px: u32) -> (u8, u8, u8, u8) {
    (
        ((px >> 24) & 0xff) as u8,
        ((px >> 16) & 0xff) as u8,
        ((px >> 8) & 0xff) as u8,
        (px & 0xff) as u8,
    )
}

/// Fast divide-by-255 approximation used by every blend in this module, as
/// specified in spec §4.2: `(v + (v >> 8) + 0x80) >> 8`. Matches exact
/// division within the ±1 tolerance spec §8 allows.
fn div255(v: u32) -> u8 {
    let v = v + 0x80;
    (((v + (v >> 8)) >> 8) & 0xff) as u8
}

/// OVER-compositing of a premultiplied source pixel onto a premultiplied
/// destination pixel, with an additional scalar opacity applied to the
/// source (used by `fill_with_argb32_data`).
fn blend_over(dst: u32, src: u32, opacity_pct: u8) -> u32 {
    let (mut sa, mut sr, mut sg, mut sb) = unpack(src);
    if opacity_pct != 255 {
        sa = div255(sa as u32 * opacity_pct as u32);
        sr = div255(sr as u32 * opacity_pct as u32);
        sg = div255(sg as u32 * opacity_pct as u32);
        sb = div255(sb as u32 * opacity_pct as u32);
    }
    let (da, dr, dg, db) = unpack(dst);
    let inv_sa = 255u32 - sa as u32;
    let out_a = sa as u32 + div255(da as u32 * inv_sa) as u32;
    let out_r = sr as u32 + div255(dr as u32 * inv_sa) as u32;
    let out_g = sg as u32 + div255(dg as u32 * inv_sa) as u32;
    let out_b = sb as u32 + div255(db as u32 * inv_sa) as u32;
    pack(
        out_a.min(255) as u8,
        out_r.min(255) as u8,
        out_g.min(255) as u8,
        out_b.min(255) as u8,
    )
}

/// A rectangular ARGB32 raster. Row stride is `width * 4` bytes, i.e. one
/// `u32` per pixel, contiguous, no padding.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u32; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn row_stride_bytes(&self) -> u32 {
        self.width * 4
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    fn set(&mut self, x: i32, y: i32, value: u32) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        self.pixels[y as usize * self.width as usize + x as usize] = value;
    }

    pub(crate) fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub(crate) fn raw_pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Premultiply `rgba`, convert to packed ARGB32, and OVER-blend into
    /// every pixel in `area` (clipped to the buffer bounds).
    pub fn fill_with_color(&mut self, area: Rect, color: Color) {
        let area = area.clip(&self.bounds());
        if area.is_empty() {
            return;
        }
        let src = color.to_premultiplied_argb32();
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let dst = self.get(x, y).unwrap_or(0);
                self.set(x, y, blend_over(dst, src, 255));
            }
        }
    }

    /// Opaque fill from a `0xRRGGBB` literal.
    pub fn fill_with_hex_color(&mut self, area: Rect, hex: u32) {
        self.fill_with_color(area, Color::from_hex(hex));
    }

    /// Vertical linear-gradient fill between two opaque RGB colors.
    pub fn fill_with_gradient(&mut self, area: Rect, top_rgb: (u8, u8, u8), bottom_rgb: (u8, u8, u8)) {
        let area = area.clip(&self.bounds());
        if area.is_empty() {
            return;
        }
        let height = area.height.max(1) as f32;
        for (row, y) in (area.y..area.bottom()).enumerate() {
            let t = if area.height <= 1 {
                0.0
            } else {
                row as f32 / (height - 1.0).max(1.0)
            };
            let r = lerp(top_rgb.0, bottom_rgb.0, t);
            let g = lerp(top_rgb.1, bottom_rgb.1, t);
            let b = lerp(top_rgb.2, bottom_rgb.2, t);
            let packed = pack(0xff, r, g, b);
            for x in area.x..area.right() {
                self.set(x, y, packed);
            }
        }
    }

    /// Alpha-composite a premultiplied ARGB32 source raster (row-major,
    /// `src_stride` pixels per row, starting at `(src_x, src_y)` within
    /// the source) into `dst_area`, scaled by `opacity` (`0.0..=1.0`).
    /// Bounds-clipped to both the destination buffer and `dst_area`.
    pub fn fill_with_argb32_data(
        &mut self,
        dst_area: Rect,
        src_x: i32,
        src_y: i32,
        src_stride: u32,
        src_data: &[u32],
        opacity: f32,
    ) {
        let area = dst_area.clip(&self.bounds());
        if area.is_empty() || src_stride == 0 {
            return;
        }
        let opacity_pct = to_u8(clamp_unit(opacity));

        for (row, y) in (area.y..area.bottom()).enumerate() {
            let sy = src_y + row as i32;
            if sy < 0 {
                continue;
            }
            for (col, x) in (area.x..area.right()).enumerate() {
                let sx = src_x + col as i32;
                if sx < 0 {
                    continue;
                }
                let src_idx = sy as usize * src_stride as usize + sx as usize;
                let Some(&src_px) = src_data.get(src_idx) else {
                    continue;
                };
                let dst = self.get(x, y).unwrap_or(0);
                self.set(x, y, blend_over(dst, src_px, opacity_pct));
            }
        }
    }
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t.clamp(0.0, 1.0)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_fill_is_exact() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.fill_with_hex_color(Rect::new(0, 0, 4, 4), 0x336699);
        let (a, r, g, b) = unpack(buf.get(0, 0).unwrap());
        assert_eq!(a, 0xff);
        assert_eq!(r, 0x33);
        assert_eq!(g, 0x66);
        assert_eq!(b, 0x99);
    }

    #[test]
    fn half_alpha_red_over_black_matches_scenario_4() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.fill_with_color(Rect::new(0, 0, 2, 2), Color::new(0.5, 0.0, 0.0, 1.0));
        let (a, r, g, b) = unpack(buf.get(0, 0).unwrap());
        assert_eq!(a, 0xff);
        assert!((r as i32 - 0x80).abs() <= 1, "r={r:#x}");
        assert_eq!(g, 0);
        assert_eq!(b, 0);
        // outside the fill area, untouched
        assert_eq!(buf.get(2, 2).unwrap(), 0);
    }

    #[test]
    fn premultiplied_identity_holds_for_opaque_colors() {
        let c = Color::new(0.2, 0.4, 0.6, 1.0);
        let packed = c.to_premultiplied_argb32();
        let (a, r, g, b) = unpack(packed);
        assert_eq!(a, 0xff);
        assert_eq!(r, to_u8(0.2));
        assert_eq!(g, to_u8(0.4));
        assert_eq!(b, to_u8(0.6));
    }

    #[test]
    fn gradient_interpolates_top_to_bottom() {
        let mut buf = PixelBuffer::new(2, 3);
        buf.fill_with_gradient(Rect::new(0, 0, 2, 3), (0, 0, 0), (255, 255, 255));
        let (_, r_top, _, _) = unpack(buf.get(0, 0).unwrap());
        let (_, r_bottom, _, _) = unpack(buf.get(0, 2).unwrap());
        assert_eq!(r_top, 0);
        assert_eq!(r_bottom, 255);
    }

    #[test]
    fn fill_with_argb32_data_is_clipped_to_dst_bounds() {
        let mut buf = PixelBuffer::new(2, 2);
        let src = vec![pack(0xff, 0xff, 0, 0); 16];
        buf.fill_with_argb32_data(Rect::new(-1, -1, 4, 4), 0, 0, 4, &src, 1.0);
        // only the in-bounds portion should have been written
        let (a, r, _, _) = unpack(buf.get(0, 0).unwrap());
        assert_eq!(a, 0xff);
        assert_eq!(r, 0xff);
    }

    #[test]
    fn blend_dirty_rect_is_subset_of_union() {
        let mut buf = PixelBuffer::new(8, 8);
        let mut dirty = Rect::empty();
        let a = Rect::new(0, 0, 2, 2);
        let b = Rect::new(5, 5, 2, 2);
        buf.fill_with_hex_color(a, 0xff0000);
        dirty = dirty.union(&a);
        buf.fill_with_hex_color(b, 0x00ff00);
        dirty = dirty.union(&b);
        // every modified pixel lies within the unioned dirty rect
        for y in 0..8 {
            for x in 0..8 {
                if buf.get(x, y).unwrap() != 0 {
                    assert!(dirty.contains_point(x, y));
                }
            }
        }
    }
}
