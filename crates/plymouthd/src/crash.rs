//! Crash handling (spec §7, §9): "signal handler dumps the in-memory
//! debug ring buffer to disk, restores the console's terminal attributes
//! and KD_TEXT mode, unlinks the PID file, then re-raises with the
//! default handler." Kept separate from `tracing`-based logging per
//! SPEC_FULL §6: this buffer must stay writable from inside a signal
//! handler, where allocating loggers and locked subscribers are not
//! safe to touch.

use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::pidfile;

const FATAL_SIGNALS: [i32; 4] = [
    signal_hook::consts::SIGSEGV,
    signal_hook::consts::SIGABRT,
    signal_hook::consts::SIGBUS,
    signal_hook::consts::SIGILL,
];

const MAX_LINES: usize = 500;

/// Bounded in-memory record of recent noteworthy events, captured outside
/// `tracing` so a crash handler can read it with nothing more exotic than
/// a best-effort mutex `try_lock`.
#[derive(Clone, Default)]
pub struct DebugRingBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl DebugRingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() >= MAX_LINES {
                lines.remove(0);
            }
            lines.push(line.into());
        }
    }

    /// Non-blocking: a handler running on the signal stack must never
    /// wait on a lock the interrupted thread might already hold.
    fn try_snapshot(&self) -> Option<String> {
        self.lines.try_lock().ok().map(|lines| lines.join("\n"))
    }
}

struct CrashState {
    console_fd: AtomicI32,
    pid_file_path: Option<PathBuf>,
    debug_dump_path: Option<PathBuf>,
    debug_buffer: DebugRingBuffer,
}

fn dump(signal: i32, state: &CrashState) {
    if let (Some(path), Some(contents)) = (&state.debug_dump_path, state.debug_buffer.try_snapshot()) {
        let _ = std::fs::write(path, contents);
    }

    let fd = state.console_fd.load(Ordering::Relaxed);
    if fd >= 0 {
        ply_terminal::restore_console_text_mode(fd);
    }

    if let Some(path) = &state.pid_file_path {
        pidfile::unlink_best_effort(path);
    }

    let _ = signal_hook::low_level::emulate_default_handler(signal);
}

/// Handle shared with the rest of the daemon so the active console fd can
/// be kept current as seats come and go; the handler always restores
/// whichever console was most recently known, not the first one opened.
#[derive(Clone)]
pub struct CrashHandle {
    state: Arc<CrashState>,
}

impl CrashHandle {
    pub fn set_console_fd(&self, fd: RawFd) {
        self.state.console_fd.store(fd, Ordering::Relaxed);
    }

    pub fn clear_console_fd(&self) {
        self.state.console_fd.store(-1, Ordering::Relaxed);
    }
}

/// Install handlers for the signals spec §7 treats as a crash
/// (abort/segv and the other common fatal signals a corrupted process or
/// a misbehaving dynamic theme plugin can raise).
pub fn install(
    pid_file_path: Option<PathBuf>,
    debug_dump_path: Option<PathBuf>,
    debug_buffer: DebugRingBuffer,
) -> std::io::Result<CrashHandle> {
    let state = Arc::new(CrashState {
        console_fd: AtomicI32::new(-1),
        pid_file_path,
        debug_dump_path,
        debug_buffer,
    });

    for &signal in &FATAL_SIGNALS {
        let state = state.clone();
        // SAFETY: `dump` only calls functions documented as safe to run
        // from a signal handler in this codebase (raw ioctl/unlink calls
        // with no heap allocation on the hot path, plus a non-blocking
        // mutex try_lock); it performs no unwinding and does not call
        // back into libc in ways that could deadlock against the
        // interrupted thread beyond that try_lock.
        unsafe {
            signal_hook::low_level::register(signal, move || dump(signal, &state)).map_err(std::io::Error::other)?;
        }
    }

    Ok(CrashHandle { state })
}

/// Install a panic hook that records the panic message into the ring
/// buffer before running the default hook, so a panic that escalates to
/// `abort()` (double panic, `panic=abort` builds) leaves a trace the
/// crash handler above can still find.
pub fn install_panic_hook(debug_buffer: DebugRingBuffer) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        debug_buffer.push(format!("panic: {info}"));
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_drops_oldest_once_full() {
        let buffer = DebugRingBuffer::new();
        for i in 0..MAX_LINES + 10 {
            buffer.push(format!("line {i}"));
        }
        let snapshot = buffer.try_snapshot().unwrap();
        assert!(!snapshot.contains("line 0"));
        assert!(snapshot.contains(&format!("line {}", MAX_LINES + 9)));
    }

    #[test]
    fn panic_hook_records_message_without_suppressing_default_hook() {
        let buffer = DebugRingBuffer::new();
        install_panic_hook(buffer.clone());
        let result = std::panic::catch_unwind(|| panic!("boom"));
        assert!(result.is_err());
        let snapshot = buffer.try_snapshot().unwrap();
        assert!(snapshot.contains("boom"));
    }
}
