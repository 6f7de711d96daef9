//! udev enumeration and hotplug monitoring (SPEC_FULL.md §4.5 expansion),
//! binding the graphics/DRM subsystem to the spec's "bus parent /
//! primary console attribute / companion DRM node" language.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use ply_core::{Error, Result};
use ply_event_loop::EventLoop;

/// One seat-tagged graphics device found on initial scan or via hotplug.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub path: PathBuf,
    pub is_primary_console: bool,
    pub drm_node: Option<PathBuf>,
}

pub struct UdevBackend {
    enumerator: udev::Enumerator,
}

impl UdevBackend {
    pub fn new() -> Result<Self> {
        let enumerator = udev::Enumerator::new().map_err(|e| Error::device(format!("udev enumerator: {e}")))?;
        Ok(Self { enumerator })
    }

    /// Enumerate graphics-bus devices, filtering the pseudo `fbcon` node
    /// and anything without a seat tag, per spec.md §4.5.
    pub fn enumerate_graphics_devices(mut self) -> Result<Vec<DiscoveredDevice>> {
        self.enumerator
            .match_subsystem("graphics")
            .map_err(|e| Error::device(format!("udev match_subsystem: {e}")))?;

        let mut devices = Vec::new();
        let scan = self
            .enumerator
            .scan_devices()
            .map_err(|e| Error::device(format!("udev scan_devices: {e}")))?;

        for device in scan {
            let Some(sysname) = device.sysname().to_str() else {
                continue;
            };
            if sysname == "fbcon" {
                continue;
            }
            if device.property_value("ID_SEAT").is_none() {
                continue;
            }

            let path = device.devnode().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(sysname));
            let is_primary_console = device
                .parent()
                .and_then(|parent| parent.attribute_value("primary_console"))
                .map(|v| v == "1")
                .unwrap_or(false);
            let drm_node = device
                .parent()
                .and_then(|parent| find_drm_sibling(&parent));

            devices.push(DiscoveredDevice {
                path,
                is_primary_console,
                drm_node,
            });
        }

        Ok(devices)
    }
}

fn find_drm_sibling(bus_parent: &udev::Device) -> Option<PathBuf> {
    let mut enumerator = udev::Enumerator::new().ok()?;
    enumerator.match_subsystem("drm").ok()?;
    enumerator.match_parent(bus_parent).ok()?;
    enumerator
        .scan_devices()
        .ok()?
        .find_map(|d| d.devnode().map(Path::to_path_buf))
}

/// A live hotplug subscription, filtered to the graphics subsystem and
/// seat tag per spec.md §4.5. Wraps the monitor's fd in the event loop's
/// fd-watch so `poll_events` drains whatever arrived.
pub struct HotplugMonitor {
    socket: udev::MonitorSocket,
}

impl HotplugMonitor {
    pub fn start() -> Result<Self> {
        let socket = udev::MonitorBuilder::new()
            .map_err(|e| Error::device(format!("udev monitor builder: {e}")))?
            .match_subsystem("graphics")
            .map_err(|e| Error::device(format!("udev monitor match_subsystem: {e}")))?
            .listen()
            .map_err(|e| Error::device(format!("udev monitor listen: {e}")))?;
        Ok(Self { socket })
    }

    /// Register this monitor's fd with the event loop; `on_event` is
    /// called with the device path and whether it is an add (`true`) or
    /// remove (`false`) event. Returns the watch so the caller can cancel
    /// it (e.g. when `--ignore-udev` is toggled at runtime).
    pub fn watch(
        self,
        event_loop: &Rc<EventLoop>,
        mut on_event: impl FnMut(PathBuf, bool) + 'static,
    ) -> ply_event_loop::WatchId {
        use std::os::fd::AsRawFd;
        let fd = self.socket.as_raw_fd();
        let mut socket = self.socket;
        event_loop.watch_fd(fd, ply_event_loop::Interest::POLLIN, move |_readiness| {
            for event in socket.iter() {
                let path = event.devnode().map(Path::to_path_buf).unwrap_or_default();
                let is_add = event.event_type() == udev::EventType::Add;
                on_event(path, is_add);
            }
        })
    }
}
