//! Device manager and seat assembly (spec §4.5): enumerate the graphics
//! bus at startup, bind terminals and renderers into seats, watch for
//! hotplug add/remove, and fall back through the serial-console ->
//! graphics-bus -> single-fallback-seat chain spec.md §4.5 specifies.

mod udev_backend;

use std::path::{Path, PathBuf};

use ply_core::Result;
use ply_display::FrameBuffer;
use ply_terminal::Terminal;

pub use udev_backend::{DiscoveredDevice, HotplugMonitor, UdevBackend};

const FALLBACK_CONSOLE_PATH: &str = "/sys/class/tty/console/active";
const DEFAULT_TERMINAL: &str = "/dev/tty1";

/// A terminal plus whatever renderer the device manager attached to it.
/// `renderer` is `None` for serial-console seats created by fallback
/// priority 1 (spec.md §4.5: "one seat per named tty with no renderer").
pub struct Seat {
    pub name: String,
    pub terminal: Option<Terminal>,
    pub renderer: Option<FrameBuffer>,
    device_path: Option<PathBuf>,
}

impl Seat {
    fn with_renderer(name: impl Into<String>, device_path: PathBuf, renderer: FrameBuffer) -> Self {
        Self {
            name: name.into(),
            terminal: None,
            renderer: Some(renderer),
            device_path: Some(device_path),
        }
    }

    fn terminal_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terminal: None,
            renderer: None,
            device_path: None,
        }
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn renders_device(&self, path: &Path) -> bool {
        self.device_path.as_deref() == Some(path)
    }
}

/// Callbacks registered via `watch_seats`, per spec.md §4.5's
/// `watch_seats(on_added, on_removed)`.
pub struct SeatWatchers {
    pub on_added: Box<dyn FnMut(&Seat)>,
    pub on_removed: Box<dyn FnMut(&str)>,
}

pub struct DeviceManager {
    seats: Vec<Seat>,
    watchers: Option<SeatWatchers>,
    ignore_serial_consoles: bool,
    ignore_udev: bool,
}

impl DeviceManager {
    pub fn new(ignore_serial_consoles: bool, ignore_udev: bool) -> Self {
        Self {
            seats: Vec::new(),
            watchers: None,
            ignore_serial_consoles,
            ignore_udev,
        }
    }

    /// Register the single set of add/removed callbacks. Per spec.md
    /// §4.5 this is one-time registration — a second call replaces the
    /// first rather than stacking handlers.
    pub fn watch_seats(&mut self, watchers: SeatWatchers) {
        self.watchers = Some(watchers);
    }

    pub fn has_open_seats(&self) -> bool {
        self.seats.iter().any(Seat::has_renderer)
    }

    pub fn get_seats(&self) -> &[Seat] {
        &self.seats
    }

    /// Mutable access, needed by the orchestrator to call
    /// `ThemePlugin::attach_to_seat`/`detach_from_seat`, both of which take
    /// `&mut Seat` to swap its renderer out and back in.
    pub fn get_seats_mut(&mut self) -> &mut [Seat] {
        &mut self.seats
    }

    pub fn seat_named_mut(&mut self, name: &str) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.name == name)
    }

    /// Bind to exactly one named tty, bypassing the fallback chain
    /// entirely (spec.md §6's `--tty <name>` override: "test override").
    pub fn discover_named_tty(&mut self, tty_name: &str) {
        self.add_seat(Seat::terminal_only(tty_name));
    }

    /// Run the initial-scan fallback chain from spec.md §4.5.
    pub fn discover_initial_seats(&mut self) -> Result<()> {
        if !self.ignore_serial_consoles {
            if let Some(ttys) = read_serial_consoles(Path::new(FALLBACK_CONSOLE_PATH))? {
                if ttys.len() > 1 {
                    for tty in ttys {
                        self.add_seat(Seat::terminal_only(tty));
                    }
                    return Ok(());
                }
            }
        }

        if !self.ignore_udev {
            let devices = UdevBackend::new()?.enumerate_graphics_devices()?;
            if !devices.is_empty() {
                for device in devices {
                    if let Some(seat) = self.seat_from_device(device) {
                        self.add_seat(seat);
                    }
                }
                if !self.seats.is_empty() {
                    return Ok(());
                }
            }
        }

        // Fallback priority 3: a single seat on the default terminal,
        // renderer chosen by whichever backend opens successfully
        // ("auto" in spec.md §4.5's terms).
        let renderer = FrameBuffer::open_fbdev(Path::new("/dev/fb0")).ok();
        let seat = match renderer {
            Some(fb) => Seat::with_renderer(DEFAULT_TERMINAL, PathBuf::from("/dev/fb0"), fb),
            None => Seat::terminal_only(DEFAULT_TERMINAL),
        };
        self.add_seat(seat);
        Ok(())
    }

    fn seat_from_device(&self, device: DiscoveredDevice) -> Option<Seat> {
        let renderer = if let Some(drm_path) = &device.drm_node {
            FrameBuffer::open_drm(drm_path).ok()
        } else {
            FrameBuffer::open_fbdev(&device.path).ok()
        }?;
        Some(Seat::with_renderer(device.path.display().to_string(), device.path.clone(), renderer))
    }

    fn add_seat(&mut self, mut seat: Seat) {
        if seat.terminal.is_none() {
            if let Some(path) = console_tty_path(&seat.name) {
                match Terminal::open(&path) {
                    Ok(terminal) => seat.terminal = Some(terminal),
                    Err(e) => tracing::warn!("failed to open console tty {}: {e}", path.display()),
                }
            }
        }
        if let Some(watchers) = &mut self.watchers {
            (watchers.on_added)(&seat);
        }
        self.seats.push(seat);
    }

    /// Run the same per-device procedure the initial scan uses for one
    /// hotplug-added device path (spec.md §4.5: "On add, run the same
    /// per-device procedure as on initial scan").
    pub fn add_device(&mut self, path: &Path) -> Result<()> {
        let device = DiscoveredDevice {
            path: path.to_path_buf(),
            is_primary_console: false,
            drm_node: None,
        };
        if let Some(seat) = self.seat_from_device(device) {
            self.add_seat(seat);
        }
        Ok(())
    }

    /// Handle a removed device path: drop its seat, notifying
    /// `on_removed` before the seat itself is released, per spec.md
    /// §4.5 ("notifying the orchestrator's seat-removed handler first").
    pub fn remove_device(&mut self, device_path: &Path) {
        let Some(index) = self.seats.iter().position(|s| s.renders_device(device_path)) else {
            return;
        };
        if let Some(watchers) = &mut self.watchers {
            (watchers.on_removed)(&self.seats[index].name);
        }
        self.seats.remove(index);
    }
}

/// A seat's name is either already a `/dev/ttyN` path (the single-fallback
/// seat) or a bare tty name from `/sys/class/tty/console/active` (`tty0`,
/// `ttyS0`) or a graphics-bus device path with no associated console.
/// Only the first two resolve to a controlling terminal to read keystrokes
/// and drive raw/VT mode from.
fn console_tty_path(seat_name: &str) -> Option<PathBuf> {
    if seat_name.starts_with("/dev/tty") {
        return Some(PathBuf::from(seat_name));
    }
    if seat_name.starts_with("tty") {
        return Some(PathBuf::from("/dev").join(seat_name));
    }
    None
}

fn read_serial_consoles(path: &Path) -> Result<Option<Vec<String>>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents.split_whitespace().map(str::to_string).collect())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ply_core::Error::device(format!("failed to read {}: {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ply_display::{PixelFormat, RendererBackend};

    struct NullBackend {
        width: u32,
        height: u32,
    }

    impl RendererBackend for NullBackend {
        fn device_path(&self) -> &Path {
            Path::new("/dev/fb0")
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
        fn write_rect(&mut self, _rect: ply_core::Rect, _shadow: &ply_pixel::PixelBuffer) -> Result<()> {
            Ok(())
        }
    }

    fn fake_renderer() -> FrameBuffer {
        FrameBuffer::new(Box::new(NullBackend { width: 4, height: 4 }))
    }

    #[test]
    fn seat_with_renderer_reports_has_renderer() {
        let seat = Seat::with_renderer("seat0", PathBuf::from("/dev/fb0"), fake_renderer());
        assert!(seat.has_renderer());
        assert!(seat.renders_device(Path::new("/dev/fb0")));
        assert!(!seat.renders_device(Path::new("/dev/fb1")));
    }

    #[test]
    fn terminal_only_seat_has_no_renderer() {
        let seat = Seat::terminal_only("ttyS0");
        assert!(!seat.has_renderer());
    }

    #[test]
    fn remove_device_notifies_before_removing() {
        let mut mgr = DeviceManager::new(true, true);
        mgr.add_seat(Seat::with_renderer("seat0", PathBuf::from("/dev/fb0"), fake_renderer()));

        let notified = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let notified_clone = notified.clone();
        mgr.watch_seats(SeatWatchers {
            on_added: Box::new(|_| {}),
            on_removed: Box::new(move |name| notified_clone.borrow_mut().push(name.to_string())),
        });

        mgr.remove_device(Path::new("/dev/fb0"));
        assert_eq!(notified.borrow().as_slice(), ["seat0"]);
        assert!(mgr.get_seats().is_empty());
    }

    #[test]
    fn reads_and_splits_whitespace_separated_tty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active");
        std::fs::write(&path, "tty0 ttyS0\n").unwrap();
        let ttys = read_serial_consoles(&path).unwrap().unwrap();
        assert_eq!(ttys, vec!["tty0".to_string(), "ttyS0".to_string()]);
    }

    #[test]
    fn missing_console_active_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert!(read_serial_consoles(&path).unwrap().is_none());
    }
}
