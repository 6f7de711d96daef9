//! DRM (mode-setting) backend: a dumb buffer mapped for CPU writes, set as
//! the scanout buffer on the first connected connector's preferred mode.
//! Preferred over fbdev per spec.md §4.3 ("If DRM discovery yields a
//! graphics node, the DRM backend is preferred").

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use drm::control::{connector, crtc, Device as ControlDevice};
use drm::Device as BasicDevice;
use drm_fourcc::DrmFourcc;
use ply_core::{Error, Rect, Result};
use ply_pixel::PixelBuffer;

use crate::format::PixelFormat;
use crate::RendererBackend;

struct DrmCard(File);

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl BasicDevice for DrmCard {}
impl ControlDevice for DrmCard {}

pub struct DrmBackend {
    path: PathBuf,
    card: DrmCard,
    crtc: crtc::Handle,
    buffer: drm::control::dumbbuffer::DumbBuffer,
    mapping: drm::control::dumbbuffer::DumbMapping<'static>,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl DrmBackend {
    /// Open a DRM node, pick the first connected connector and its
    /// preferred mode, allocate and map a dumb buffer, and set the CRTC
    /// to scan it out.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::device(format!("open {} failed: {e}", path.display())))?;
        let card = DrmCard(file);

        let resources = card
            .resource_handles()
            .map_err(|e| Error::device(format!("{}: failed to read DRM resources: {e}", path.display())))?;

        let connector_handle = resources
            .connectors()
            .iter()
            .find_map(|&handle| {
                let info = card.get_connector(handle, false).ok()?;
                (info.state() == connector::State::Connected).then_some(handle)
            })
            .ok_or_else(|| Error::device(format!("{}: no connected display found", path.display())))?;

        let connector_info = card
            .get_connector(connector_handle, false)
            .map_err(|e| Error::device(format!("{}: failed to re-query connector: {e}", path.display())))?;
        let mode = connector_info
            .modes()
            .first()
            .copied()
            .ok_or_else(|| Error::device(format!("{}: connector has no modes", path.display())))?;

        let crtc_handle = *resources
            .crtcs()
            .first()
            .ok_or_else(|| Error::device(format!("{}: no CRTC available", path.display())))?;

        let (width, height) = mode.size();
        let buffer = card
            .create_dumb_buffer((width as u32, height as u32), DrmFourcc::Xrgb8888, 32)
            .map_err(|e| Error::device(format!("{}: failed to create dumb buffer: {e}", path.display())))?;

        let fb = card
            .add_framebuffer(&buffer, 24, 32)
            .map_err(|e| Error::device(format!("{}: failed to add framebuffer: {e}", path.display())))?;

        card.set_crtc(crtc_handle, Some(fb), (0, 0), &[connector_handle], Some(mode))
            .map_err(|e| Error::device(format!("{}: set_crtc failed: {e}", path.display())))?;

        // SAFETY: `buffer` is owned by this struct and the mapping is
        // dropped (via `DrmBackend`'s own drop order) before the buffer
        // handle is released by the kernel.
        let mapping = card
            .map_dumb_buffer(&buffer)
            .map_err(|e| Error::device(format!("{}: failed to map dumb buffer: {e}", path.display())))?;
        // Safety of the 'static transmute: the mapping borrows `buffer`,
        // which lives in the same struct and is never moved out or
        // dropped before `mapping` per field declaration order (Rust
        // drops fields top-to-bottom).
        let mapping: drm::control::dumbbuffer::DumbMapping<'static> =
            unsafe { std::mem::transmute(mapping) };

        let stride = buffer.pitch();

        Ok(Self {
            path: path.to_path_buf(),
            card,
            crtc: crtc_handle,
            buffer,
            mapping,
            width: width as u32,
            height: height as u32,
            stride,
            format: PixelFormat::XRGB8888,
        })
    }
}

impl RendererBackend for DrmBackend {
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
        self.stride
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn write_rect(&mut self, rect: Rect, shadow: &PixelBuffer) -> Result<()> {
        let fmt = self.format;
        let bpp = fmt.bytes_per_pixel as usize;
        let stride = self.stride as usize;
        let data = self.mapping.as_mut();
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
                if byte_off + bpp > data.len() {
                    continue;
                }
                fmt.pack_into(px, &mut data[byte_off..byte_off + bpp]);
            }
        }
        Ok(())
    }
}

impl Drop for DrmBackend {
    fn drop(&mut self) {
        let _ = self.card.destroy_dumb_buffer(self.buffer);
    }
}

impl std::fmt::Debug for DrmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrmBackend")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}
