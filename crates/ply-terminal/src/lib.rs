//! Per-terminal control (spec §4.4): raw/cooked mode, VT mode switching,
//! palette save/restore, cursor movement, and UTF-8 input decoding with a
//! keystroke dispatch table.

mod ioctl;

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::sys::termios::{self, SetArg, Termios};
use ply_core::{Error, Result};

pub use ioctl::ColorPalette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Graphics,
}

/// One decoded keystroke action, dispatched from accumulated UTF-8 input
/// per spec.md §4.4's key table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    RestorePalette,
    ToggleForceTextMode,
    ClearLine,
    ToggleVerboseTracing,
    Cancel,
    Escape,
    Backspace,
    Enter(String),
    Keystroke(char),
}

pub struct Terminal {
    fd: OwnedFd,
    vt_number: Option<i32>,
    mode: Mode,
    force_text_mode: bool,
    original_term_attributes: Option<Termios>,
    original_palette: Option<ColorPalette>,
    unbuffered: bool,
    input_buffer: Vec<u8>,
    line_buffer: String,
    fg_color: Option<u8>,
    bg_color: Option<u8>,
}

impl Terminal {
    /// Open a tty device by path (e.g. `/dev/tty1`), matching spec.md
    /// §4.5's "device fds opened directly by path, not inherited stdio".
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::device(format!("open {} failed: {e}", path.display())))?;
        Ok(Self::from_fd(std::os::fd::OwnedFd::from(file)))
    }

    fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd,
            vt_number: None,
            mode: Mode::Text,
            force_text_mode: false,
            original_term_attributes: None,
            original_palette: None,
            unbuffered: false,
            input_buffer: Vec::new(),
            line_buffer: String::new(),
            fg_color: None,
            bg_color: None,
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch between text and graphics console mode via `KDSETMODE`.
    /// `force_text_mode` (toggled by Ctrl-T) pins the mode to text
    /// regardless of what the caller asks for.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let effective = if self.force_text_mode { Mode::Text } else { mode };
        ioctl::set_kd_mode(self.raw_fd(), effective)
            .map_err(|e| Error::device(format!("KDSETMODE failed: {e}")))?;
        self.mode = effective;
        Ok(())
    }

    fn reapply_mode(&mut self) -> Result<()> {
        let current = self.mode;
        self.set_mode(current)
    }

    /// Enter unbuffered, non-canonical, no-echo input, saving the
    /// original termios for `set_buffered_input` to restore.
    pub fn set_unbuffered_input(&mut self) -> Result<()> {
        let original = termios::tcgetattr(&self.fd)
            .map_err(|e| Error::device(format!("tcgetattr failed: {e}")))?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&self.fd, SetArg::TCSAFLUSH, &raw)
            .map_err(|e| Error::device(format!("tcsetattr failed: {e}")))?;
        self.original_term_attributes = Some(original);
        self.unbuffered = true;
        Ok(())
    }

    /// Restore the termios saved by `set_unbuffered_input`.
    pub fn set_buffered_input(&mut self) -> Result<()> {
        if let Some(original) = self.original_term_attributes.take() {
            termios::tcsetattr(&self.fd, SetArg::TCSAFLUSH, &original)
                .map_err(|e| Error::device(format!("tcsetattr restore failed: {e}")))?;
        }
        self.unbuffered = false;
        Ok(())
    }

    pub fn is_unbuffered(&self) -> bool {
        self.unbuffered
    }

    pub fn hide_cursor(&mut self) -> Result<()> {
        self.write_escape(b"\x1b[?25l")
    }

    pub fn show_cursor(&mut self) -> Result<()> {
        self.write_escape(b"\x1b[?25h")
    }

    pub fn clear_screen(&mut self) -> Result<()> {
        self.write_escape(b"\x1b[2J\x1b[H")
    }

    pub fn move_cursor(&mut self, column: u32, row: u32) -> Result<()> {
        let seq = format!("\x1b[{};{}H", row + 1, column + 1);
        self.write_escape(seq.as_bytes())
    }

    pub fn set_foreground_color(&mut self, color: u8) -> Result<()> {
        self.fg_color = Some(color);
        self.write_escape(format!("\x1b[38;5;{color}m").as_bytes())
    }

    pub fn set_background_color(&mut self, color: u8) -> Result<()> {
        self.bg_color = Some(color);
        self.write_escape(format!("\x1b[48;5;{color}m").as_bytes())
    }

    /// Write literal bytes to the tty, the same `write(STDOUT_FILENO, ...)`
    /// call the text splash plugin uses for glyphs and prompt strings
    /// rather than control sequences.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_escape(bytes)
    }

    fn write_escape(&mut self, bytes: &[u8]) -> Result<()> {
        use std::io::Write;
        let dup = self.fd.try_clone().map_err(|e| Error::device(format!("dup tty fd failed: {e}")))?;
        let mut file = std::fs::File::from(dup);
        file.write_all(bytes).map_err(Error::Io)
    }

    /// Save the current VGA palette, so `Ctrl-P`/`close` can restore it.
    pub fn save_color_palette(&mut self) -> Result<()> {
        let palette = ioctl::get_color_palette(self.raw_fd())
            .map_err(|e| Error::device(format!("GIO_CMAP failed: {e}")))?;
        self.original_palette = Some(palette);
        Ok(())
    }

    pub fn set_color_palette(&mut self, palette: ColorPalette) -> Result<()> {
        ioctl::set_color_palette(self.raw_fd(), &palette)
            .map_err(|e| Error::device(format!("PIO_CMAP failed: {e}")))
    }

    /// Restore the palette saved by `save_color_palette`, per Ctrl-P and
    /// the close sequence.
    pub fn restore_color_palette(&mut self) -> Result<()> {
        if let Some(palette) = self.original_palette.clone() {
            self.set_color_palette(palette)?;
        }
        Ok(())
    }

    /// Switch to the given VT and block until the switch completes.
    pub fn activate_vt(&mut self, vt_number: i32) -> Result<()> {
        ioctl::vt_activate(self.raw_fd(), vt_number)
            .map_err(|e| Error::device(format!("VT_ACTIVATE failed: {e}")))?;
        ioctl::vt_wait_active(self.raw_fd(), vt_number)
            .map_err(|e| Error::device(format!("VT_WAITACTIVE failed: {e}")))?;
        self.vt_number = Some(vt_number);
        Ok(())
    }

    /// Restore buffered input, original mode/palette, then drop the fd.
    /// Each restore step is best-effort: a failure here must not prevent
    /// the others from running, since the terminal is being torn down
    /// regardless.
    pub fn close(mut self) -> Result<()> {
        if let Err(e) = self.set_buffered_input() {
            tracing::warn!("failed to restore buffered input on close: {e}");
        }
        if let Err(e) = self.restore_color_palette() {
            tracing::warn!("failed to restore color palette on close: {e}");
        }
        if let Err(e) = self.set_mode(Mode::Text) {
            tracing::warn!("failed to restore text mode on close: {e}");
        }
        Ok(())
    }

    /// Feed raw bytes read from the tty, decode complete UTF-8 characters,
    /// and dispatch each to a `KeyAction` per spec.md §4.4's table.
    pub fn feed_input(&mut self, bytes: &[u8]) -> Vec<KeyAction> {
        self.input_buffer.extend_from_slice(bytes);
        let mut actions = Vec::new();

        loop {
            match std::str::from_utf8(&self.input_buffer) {
                Ok(valid) => {
                    for ch in valid.chars() {
                        actions.push(self.dispatch_char(ch));
                    }
                    self.input_buffer.clear();
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    if valid_len == 0 {
                        // Possibly a partial multi-byte sequence at the
                        // front; wait for more bytes unless it can never
                        // become valid.
                        if e.error_len().is_some() {
                            self.input_buffer.remove(0);
                            continue;
                        }
                        break;
                    }
                    let valid = std::str::from_utf8(&self.input_buffer[..valid_len]).unwrap();
                    for ch in valid.chars() {
                        actions.push(self.dispatch_char(ch));
                    }
                    self.input_buffer.drain(..valid_len);
                    if e.error_len().is_none() {
                        break; // remaining bytes are an incomplete sequence
                    }
                }
            }
        }

        actions
    }

    fn dispatch_char(&mut self, ch: char) -> KeyAction {
        const CTRL_C: char = '\u{03}';
        const CTRL_D: char = '\u{04}';
        const CTRL_P: char = '\u{10}';
        const CTRL_T: char = '\u{14}';
        const CTRL_U: char = '\u{15}';
        const CTRL_V: char = '\u{16}';
        const CTRL_W: char = '\u{17}';
        const ESC: char = '\u{1b}';
        const BACKSPACE: char = '\u{7f}';
        const RETURN: char = '\r';

        match ch {
            CTRL_P => KeyAction::RestorePalette,
            CTRL_T => {
                self.force_text_mode = !self.force_text_mode;
                let _ = self.reapply_mode();
                KeyAction::ToggleForceTextMode
            }
            CTRL_U | CTRL_W => {
                self.line_buffer.clear();
                KeyAction::ClearLine
            }
            CTRL_V => KeyAction::ToggleVerboseTracing,
            CTRL_C | CTRL_D => KeyAction::Cancel,
            ESC => KeyAction::Escape,
            BACKSPACE => {
                self.line_buffer.pop();
                KeyAction::Backspace
            }
            RETURN => {
                let line = std::mem::take(&mut self.line_buffer);
                KeyAction::Enter(line)
            }
            other => {
                self.line_buffer.push(other);
                KeyAction::Keystroke(other)
            }
        }
    }
}

/// Best-effort console restoration by raw fd, for the crash handler
/// (spec §7: "restores the console's terminal attributes and KD_TEXT
/// mode"), which cannot hold a live `Terminal` borrow across a signal
/// handler boundary. Ignores failures: a crash path has nothing better to
/// fall back to.
pub fn restore_console_text_mode(fd: RawFd) {
    let _ = ioctl::set_kd_mode(fd, Mode::Text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_terminal() -> Terminal {
        // Tests exercise the pure decode/dispatch logic only, never the
        // ioctl/termios paths, so any valid owned fd stands in for an
        // opened tty device — a pipe's read end avoids touching stdio.
        let (read_end, _write_end) = nix::unistd::pipe().expect("pipe");
        Terminal::from_fd(read_end)
    }

    #[test]
    fn enter_returns_accumulated_line_and_clears_buffer() {
        let mut t = fresh_terminal();
        let actions = t.feed_input(b"hi\r");
        assert_eq!(
            actions,
            vec![KeyAction::Keystroke('h'), KeyAction::Keystroke('i'), KeyAction::Enter("hi".to_string())]
        );
        assert!(t.line_buffer.is_empty());
    }

    #[test]
    fn backspace_removes_last_char_from_line_buffer() {
        let mut t = fresh_terminal();
        t.feed_input(b"ab");
        t.feed_input(&[0x7f]);
        assert_eq!(t.line_buffer, "a");
    }

    #[test]
    fn ctrl_u_clears_line_buffer() {
        let mut t = fresh_terminal();
        t.feed_input(b"hello");
        let actions = t.feed_input(&[0x15]);
        assert_eq!(actions, vec![KeyAction::ClearLine]);
        assert!(t.line_buffer.is_empty());
    }

    #[test]
    fn ctrl_c_and_ctrl_d_dispatch_cancel() {
        let mut t = fresh_terminal();
        assert_eq!(t.feed_input(&[0x03]), vec![KeyAction::Cancel]);
        assert_eq!(t.feed_input(&[0x04]), vec![KeyAction::Cancel]);
    }

    #[test]
    fn multibyte_utf8_character_decodes_as_one_keystroke() {
        let mut t = fresh_terminal();
        let bytes = "é".as_bytes();
        let actions = t.feed_input(bytes);
        assert_eq!(actions, vec![KeyAction::Keystroke('é')]);
    }

    #[test]
    fn split_multibyte_sequence_across_two_feeds_decodes_correctly() {
        let mut t = fresh_terminal();
        let bytes = "é".as_bytes();
        assert!(t.feed_input(&bytes[..1]).is_empty());
        let actions = t.feed_input(&bytes[1..]);
        assert_eq!(actions, vec![KeyAction::Keystroke('é')]);
    }
}
