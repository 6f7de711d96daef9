//! Command-line surface (spec §6), a `clap::Parser` derive mirroring
//! `doctor_frankentui::cli::Cli`'s shape: one struct, one `run`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Boot,
    Shutdown,
    Updates,
}

impl From<Mode> for ply_theme::Mode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Boot => ply_theme::Mode::BootUp,
            Mode::Shutdown => ply_theme::Mode::Shutdown,
            Mode::Updates => ply_theme::Mode::Updates,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "plymouthd", about = "Boot/shutdown splash daemon", version)]
pub struct Cli {
    /// Stay attached to the invoking session instead of detaching into the
    /// background (used by session managers that already supervise us).
    #[arg(long)]
    pub attach_to_session: bool,

    /// Don't fork into the background at all; run in the foreground.
    #[arg(long)]
    pub no_daemon: bool,

    /// Enable verbose logging to stderr.
    #[arg(long)]
    pub debug: bool,

    /// Enable verbose logging to a file instead of stderr.
    #[arg(long)]
    pub debug_file: Option<PathBuf>,

    /// Which splash phase this invocation is for.
    #[arg(long, value_enum, default_value_t = Mode::Boot)]
    pub mode: Mode,

    /// Where to write the PID file; omit to skip PID-file management.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Override `/proc/cmdline`, for tests.
    #[arg(long)]
    pub kernel_command_line: Option<String>,

    /// Bind to a single named tty instead of running device discovery.
    #[arg(long)]
    pub tty: Option<String>,
}
