//! `ThemePlugin`: the boundary between the orchestrator and a splash theme,
//! whether built in or loaded from a `.plymouth` module (spec §4.6-§4.7).
//!
//! Grounded on `original_source/src/ply-boot-splash-plugin.h`'s vtable:
//! `create`/`destroy` become ordinary Rust construction and `Drop`, and
//! every other entry point keeps its name and argument shape so the
//! mapping back to the C interface stays obvious.

use ply_device::Seat;

/// Which of the three boot phases a splash is running for (spec §4.6:
/// `PLY_BOOT_SPLASH_MODE_{BOOT_UP,SHUTDOWN,UPDATES}`). Themes may render
/// the same way for all three, but script themes branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    BootUp,
    Shutdown,
    Updates,
}

/// The common behavior every splash theme implements: fade-in, spinfinity,
/// text, script, and any `.plymouth`-discovered dynamic plugin.
///
/// Lifecycle: a theme is constructed already attached to nothing; the
/// orchestrator calls `attach_to_seat` once a seat is ready, then `show`
/// to start rendering. `hide`/`detach_from_seat` run in reverse order when
/// the orchestrator tears the splash down. Dropping the theme value plays
/// the role `destroy` plays in the source.
pub trait ThemePlugin {
    /// Bind the theme to a seat's terminal and renderer. Since no other
    /// method receives `Seat` again, an implementation that draws takes
    /// `seat.renderer` with `Option::take`, holding the `FrameBuffer` for
    /// as long as it is attached, and gives it back in `detach_from_seat`.
    fn attach_to_seat(&mut self, seat: &mut Seat);

    /// Release whatever `attach_to_seat` set up, returning any renderer it
    /// took back to `seat.renderer`. Called before the seat itself is torn
    /// down.
    fn detach_from_seat(&mut self, seat: &mut Seat);

    /// Start rendering for `mode`. Returns `false` if the theme can't run
    /// on the attached seat (no renderer, say), mirroring the source's
    /// `show_splash_screen` boolean return used to trigger a fallback.
    fn show(&mut self, mode: Mode) -> bool;

    /// Stop rendering and release any animation timers. Safe to call even
    /// if `show` was never called or already failed.
    fn hide(&mut self);

    /// A status line changed (spec §4.6, `update_status`): most themes
    /// ignore this, fade-in uses it to spawn a new background star.
    fn update_status(&mut self, status: &str);

    /// Raw bytes written to the console by something still running in
    /// text mode, forwarded in case a theme echoes kernel/init output.
    fn on_boot_output(&mut self, _bytes: &[u8]) {}

    /// Animation tick driven by the orchestrator's progress estimator,
    /// called at up to 30Hz (spec §4.9). `fraction_done` is in `[0, 1]`.
    fn on_boot_progress(&mut self, elapsed_seconds: f64, fraction_done: f64);

    /// The root filesystem finished its switch-root; themes that draw
    /// differently before/after this point (none of the built-ins do)
    /// get a chance to react.
    fn on_root_mounted(&mut self) {}

    /// Plain idle splash, no message or prompt visible.
    fn display_normal(&mut self);

    /// A one-line informational message (spec §4.6, `ply_boot_splash_add_text`
    /// equivalent); themes without a message area may no-op.
    fn display_message(&mut self, message: &str);

    /// A masked password prompt: `n_bullets` already-typed characters,
    /// rendered as bullet glyphs rather than echoing the real keystrokes.
    fn display_password(&mut self, prompt: &str, n_bullets: usize);

    /// A plaintext question prompt with the answer entered so far visible.
    fn display_question(&mut self, prompt: &str, entry_text: &str);

    /// The splash has gone idle waiting for a timeout; `trigger` must be
    /// invoked (from wherever the theme's own timer fires) once the idle
    /// condition clears, mirroring `ply_boot_splash_plugin_interface_t`'s
    /// `become_idle` callback-based handoff.
    fn become_idle(&mut self, trigger: Box<dyn FnOnce()>) {
        trigger();
    }
}
