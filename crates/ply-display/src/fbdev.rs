//! Linux framebuffer (`/dev/fbN`) backend: geometry queried via
//! `FBIOGET_VSCREENINFO`/`FBIOGET_FSCREENINFO`, memory mapped read/write
//! with `memmap2`, matching spec.md §4.3's "probe the device; read pixel
//! layout and geometry; map the device memory read/write, shared" open
//! sequence.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use ply_core::{Error, Rect, Result};
use ply_pixel::PixelBuffer;

use crate::format::PixelFormat;
use crate::RendererBackend;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// Mirrors `struct fb_var_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

/// Mirrors `struct fb_fix_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: u64,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: u64,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

impl Default for FbFixScreeninfo {
    fn default() -> Self {
        // SAFETY: all-zero is a valid bit pattern for every field above
        // (fixed-size integers and byte arrays, no padding invariants).
        unsafe { std::mem::zeroed() }
    }
}

const FBIOGET_VSCREENINFO: u8 = 0x00;
const FBIOGET_FSCREENINFO: u8 = 0x02;
const FB_IOCTL_MAGIC: u8 = 0x46; // b'F'

nix::ioctl_read!(fb_get_var_screeninfo, FB_IOCTL_MAGIC, FBIOGET_VSCREENINFO, FbVarScreeninfo);
nix::ioctl_read!(fb_get_fix_screeninfo, FB_IOCTL_MAGIC, FBIOGET_FSCREENINFO, FbFixScreeninfo);

pub struct FbdevBackend {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    width: u32,
    height: u32,
    line_length: u32,
    format: PixelFormat,
}

impl FbdevBackend {
    /// Open and probe `/dev/fbN`. Per spec.md §4.3 point 2, a failing
    /// geometry query must not leave the device half-open: the file is
    /// dropped before returning the error.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::device(format!("open {} failed: {e}", path.display())))?;
        let fd = file.as_raw_fd();

        let var = query_var_screeninfo(fd, path)?;
        let fix = query_fix_screeninfo(fd, path)?;

        let format = pixel_format_from_var(&var);
        let map_len = fix.line_length as usize * var.yres as usize;

        // SAFETY: `file` stays open for the mmap's lifetime (owned by the
        // same struct); the kernel framebuffer driver backs this region
        // for exactly `map_len` bytes as reported by the fix-info ioctl.
        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| Error::device(format!("mmap {} failed: {e}", path.display())))
        }?;
        if mmap.len() < map_len {
            return Err(Error::device(format!(
                "{}: mapping shorter ({} bytes) than reported framebuffer size ({map_len} bytes)",
                path.display(),
                mmap.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            width: var.xres,
            height: var.yres,
            line_length: fix.line_length,
            format,
        })
    }
}

fn query_var_screeninfo(fd: i32, path: &Path) -> Result<FbVarScreeninfo> {
    let mut var = FbVarScreeninfo::default();
    // SAFETY: `var` is a plain-old-data struct matching the kernel ABI;
    // the ioctl writes exactly `size_of::<FbVarScreeninfo>()` bytes.
    unsafe { fb_get_var_screeninfo(fd, &mut var) }
        .map_err(|e| Error::device(format!("FBIOGET_VSCREENINFO on {} failed: {e}", path.display())))?;
    Ok(var)
}

fn query_fix_screeninfo(fd: i32, path: &Path) -> Result<FbFixScreeninfo> {
    let mut fix = FbFixScreeninfo::default();
    // SAFETY: see query_var_screeninfo.
    unsafe { fb_get_fix_screeninfo(fd, &mut fix) }
        .map_err(|e| Error::device(format!("FBIOGET_FSCREENINFO on {} failed: {e}", path.display())))?;
    Ok(fix)
}

fn pixel_format_from_var(var: &FbVarScreeninfo) -> PixelFormat {
    use crate::format::ChannelLayout;
    PixelFormat {
        red: ChannelLayout::new(var.red.offset as u8, var.red.length as u8),
        green: ChannelLayout::new(var.green.offset as u8, var.green.length as u8),
        blue: ChannelLayout::new(var.blue.offset as u8, var.blue.length as u8),
        alpha: ChannelLayout::new(var.transp.offset as u8, var.transp.length as u8),
        bytes_per_pixel: (var.bits_per_pixel / 8) as u8,
    }
}

impl RendererBackend for FbdevBackend {
    fn device_path(&self) -> &Path {
        &self.path
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn line_length(&self) -> u32 {
        self.line_length
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn write_rect(&mut self, rect: Rect, shadow: &PixelBuffer) -> Result<()> {
        let fmt = self.format;
        let bpp = fmt.bytes_per_pixel as usize;
        let stride = self.line_length as usize;
        for y in rect.y..rect.bottom() {
            if y < 0 || y as u32 >= self.height {
                continue;
            }
            let row_start = y as usize * stride;
            for x in rect.x..rect.right() {
                if x < 0 || x as u32 >= self.width {
                    continue;
                }
                let px = shadow.get(x, y).unwrap_or(0);
                let byte_off = row_start + x as usize * bpp;
                if byte_off + bpp > self.mmap.len() {
                    continue;
                }
                fmt.pack_into(px, &mut self.mmap[byte_off..byte_off + bpp]);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FbdevBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FbdevBackend")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("line_length", &self.line_length)
            .finish()
    }
}
