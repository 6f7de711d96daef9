//! Process entry point: parses the CLI (spec §6), reads and merges the
//! kernel command line, daemonizes unless told not to, wires logging and
//! the crash handler, then builds and runs the orchestrator until `quit`
//! is requested over the control socket or a termination signal arrives.
//!
//! Grounded on `doctor_frankentui/src/main.rs`'s thin `main()` +
//! `run()`-returns-`Result` + `exit_code()`-on-error shape; unlike that
//! CLI tool this binary blocks in an event loop instead of returning
//! after one command, so `run` hands back the loop's exit code on
//! success instead of `()`.

mod cli;
mod crash;
mod pidfile;

use std::path::PathBuf;

use clap::Parser;

use ply_boot_server::BootServer;
use ply_core::cmdline::{DebugSink, KernelCmdline};
use ply_core::logging::{self, LogSink};
use ply_core::{Error, Result};
use ply_device::{DeviceManager, HotplugMonitor};
use ply_event_loop::EventLoop;
use ply_orchestrator::{build_theme, resolve_theme, Orchestrator};
use ply_theme::{TextTheme, ThemePlugin};

use cli::{Cli, Mode};
use crash::DebugRingBuffer;

const PROC_CMDLINE: &str = "/proc/cmdline";
const BOOT_DURATION_CACHE: &str = "/var/lib/plymouth/boot-duration";
const SHUTDOWN_DURATION_CACHE: &str = "/var/lib/plymouth/shutdown-duration";

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("plymouthd: {e}");
            std::process::exit(e.exit_code().code());
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    if !cli.no_daemon && !cli.attach_to_session {
        // Fork into the background before opening any fds the child
        // must inherit (control socket, terminal, framebuffer mmaps).
        nix::unistd::daemon(true, true).map_err(|e| Error::device(format!("daemon() failed: {e}")))?;
    }

    let kernel_cmdline_text = match &cli.kernel_command_line {
        Some(text) => text.clone(),
        None => std::fs::read_to_string(PROC_CMDLINE).unwrap_or_default(),
    };
    let kcmdline = KernelCmdline::parse(&kernel_cmdline_text);

    let debug_buffer = DebugRingBuffer::new();
    crash::install_panic_hook(debug_buffer.clone());

    let sink = select_log_sink(&cli, &kcmdline);
    let _logging_guard = match &sink {
        Sink::Quiet => logging::init(LogSink::Quiet),
        Sink::Stderr => logging::init(LogSink::Stderr),
        Sink::File(path) => logging::init(LogSink::File(path)),
    };

    tracing::info!("plymouthd starting, mode={:?}", cli.mode);

    let _pid_file = match &cli.pid_file {
        Some(path) => Some(pidfile::PidFile::create(path)?),
        None => None,
    };

    let debug_dump_path = cli
        .pid_file
        .as_ref()
        .and_then(|p| p.parent())
        .map(|dir| dir.join("plymouthd.debug"))
        .or_else(|| Some(PathBuf::from("/var/run/plymouth/plymouthd.debug")));
    let _crash_handle = crash::install(cli.pid_file.clone(), debug_dump_path, debug_buffer)?;

    let event_loop = EventLoop::new()?;

    let boot_server = BootServer::bind_and_listen()?;

    let theme_info = resolve_theme(kcmdline.splash_theme.as_deref())?;
    tracing::info!("selected theme: {}", theme_info.name);
    let theme = build_theme(&theme_info, None)?;
    let details_theme: Box<dyn ThemePlugin> = Box::new(TextTheme::new());

    let device_manager = DeviceManager::new(kcmdline.ignore_serial_consoles, kcmdline.ignore_udev);

    let mode: ply_theme::Mode = cli.mode.into();
    let show_delay_seconds = kcmdline.splash_delay.unwrap_or(0.0).max(0.0);
    let skip_splash = kcmdline.should_skip_splash();
    let cache_path = Some(PathBuf::from(match cli.mode {
        Mode::Shutdown => SHUTDOWN_DURATION_CACHE,
        Mode::Boot | Mode::Updates => BOOT_DURATION_CACHE,
    }));

    let orchestrator = Orchestrator::new(
        event_loop.clone(),
        mode,
        device_manager,
        theme,
        details_theme,
        boot_server,
        cache_path,
        show_delay_seconds,
        skip_splash,
        cli.tty.clone(),
    );
    orchestrator.start();

    if !kcmdline.ignore_udev {
        match HotplugMonitor::start() {
            Ok(monitor) => {
                let orch = orchestrator.clone();
                monitor.watch(&event_loop, move |path, is_add| orch.handle_hotplug_event(&path, is_add));
            }
            Err(e) => tracing::warn!("hotplug monitor unavailable, hotplug seats won't be noticed: {e}"),
        }
    }

    let term_orchestrator = orchestrator.clone();
    event_loop
        .watch_signal(signal_hook::consts::SIGTERM, move || term_orchestrator.quit(false))
        .map_err(Error::Io)?;
    let int_orchestrator = orchestrator.clone();
    event_loop
        .watch_signal(signal_hook::consts::SIGINT, move || int_orchestrator.quit(false))
        .map_err(Error::Io)?;

    let code = event_loop.run();
    tracing::info!("plymouthd exiting with code {code}");
    Ok(code)
}

enum Sink {
    Quiet,
    Stderr,
    File(PathBuf),
}

/// Merge the CLI and kernel-command-line debug settings (spec §6):
/// `plymouth.nolog` wins outright, an explicit CLI flag beats the kernel
/// command line, and `plymouth.debug`'s file/stream forms both land on a
/// file sink (a live stream consumer isn't part of this spec's scope).
fn select_log_sink(cli: &Cli, kcmdline: &KernelCmdline) -> Sink {
    if kcmdline.nolog {
        return Sink::Quiet;
    }
    if let Some(path) = &cli.debug_file {
        return Sink::File(path.clone());
    }
    if cli.debug {
        return Sink::Stderr;
    }
    match &kcmdline.debug {
        Some(DebugSink::Default) => Sink::Stderr,
        Some(DebugSink::File(path)) | Some(DebugSink::Stream(path)) => Sink::File(PathBuf::from(path)),
        None => Sink::Quiet,
    }
}
