//! Linux console ioctl wrappers: `KDSETMODE`, `VT_ACTIVATE`,
//! `VT_WAITACTIVE`, `PIO_CMAP`/`GIO_CMAP`, matching the calls
//! `ply-window.c` makes directly with `ioctl(2)`.

use std::os::fd::RawFd;

use crate::Mode;

const KD_TEXT: i32 = 0x00;
const KD_GRAPHICS: i32 = 0x01;

// Raw request numbers from linux/kd.h and linux/vt.h — these ioctls
// predate the magic+nr convention `_IO()` macros use, so nix's `_bad!`
// variants (literal request number) apply rather than `ioctl_read!`.
const KDSETMODE: u64 = 0x4B3A;
const VT_ACTIVATE: u64 = 0x5606;
const VT_WAITACTIVE: u64 = 0x5607;
const PIO_CMAP: u64 = 0x4B71;
const GIO_CMAP: u64 = 0x4B70;

/// 16-entry VGA palette, 3 bytes (R, G, B) each, matching `PIO_CMAP`'s
/// 48-byte buffer contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette([u8; 48]);

impl ColorPalette {
    pub fn entries(&self) -> impl Iterator<Item = (u8, u8, u8)> + '_ {
        self.0.chunks_exact(3).map(|c| (c[0], c[1], c[2]))
    }
}

nix::ioctl_write_int_bad!(kd_set_mode, KDSETMODE);
nix::ioctl_write_int_bad!(vt_activate_raw, VT_ACTIVATE);
nix::ioctl_write_int_bad!(vt_wait_active_raw, VT_WAITACTIVE);
nix::ioctl_write_ptr_bad!(pio_cmap, PIO_CMAP, [u8; 48]);
nix::ioctl_read_bad!(gio_cmap, GIO_CMAP, [u8; 48]);

pub fn set_kd_mode(fd: RawFd, mode: Mode) -> nix::Result<()> {
    let value = match mode {
        Mode::Text => KD_TEXT,
        Mode::Graphics => KD_GRAPHICS,
    };
    // SAFETY: `fd` is a valid, open console fd owned by the caller for
    // the duration of this call.
    unsafe { kd_set_mode(fd, value as _) }?;
    Ok(())
}

pub fn vt_activate(fd: RawFd, vt_number: i32) -> nix::Result<()> {
    // SAFETY: see set_kd_mode.
    unsafe { vt_activate_raw(fd, vt_number as _) }?;
    Ok(())
}

pub fn vt_wait_active(fd: RawFd, vt_number: i32) -> nix::Result<()> {
    // SAFETY: see set_kd_mode.
    unsafe { vt_wait_active_raw(fd, vt_number as _) }?;
    Ok(())
}

pub fn get_color_palette(fd: RawFd) -> nix::Result<ColorPalette> {
    let mut buf = [0u8; 48];
    // SAFETY: `buf` is exactly the 48-byte buffer `GIO_CMAP` expects.
    unsafe { gio_cmap(fd, &mut buf) }?;
    Ok(ColorPalette(buf))
}

pub fn set_color_palette(fd: RawFd, palette: &ColorPalette) -> nix::Result<()> {
    // SAFETY: see get_color_palette.
    unsafe { pio_cmap(fd, &palette.0) }?;
    Ok(())
}
