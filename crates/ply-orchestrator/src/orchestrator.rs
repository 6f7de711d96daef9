//! The splash daemon's central state machine (spec §4.9): seat lifecycle,
//! theme selection, boot-server command dispatch, password prompts, and
//! the escape-key splash/details toggle.
//!
//! Grounded on `ftui-runtime/src/program.rs`'s `Program`: that type owns
//! all frame-loop state behind one `Rc<RefCell<...>>` and dispatches into
//! it from a single driving loop; `Orchestrator` plays the same role here,
//! generalized from one render tick to seat-add, boot-server-command, and
//! terminal-keystroke callbacks, and mirrors `BootServer`'s own
//! `Rc<RefCell<Inner>>` + `clone_handle` split so those callbacks can
//! re-borrow the state they dispatch into.
//!
//! Reentrancy note: `ThemePlugin::become_idle`'s default implementation
//! fires its trigger synchronously, and `DeviceManager`'s seat watchers
//! fire synchronously from inside `discover_initial_seats`/`add_device`/
//! `remove_device`. Both would re-borrow `Inner` from inside an existing
//! borrow if handled naively, so `quit` defers its teardown by one event
//! loop turn (a zero-duration timeout) and seat hotplug buffers added/
//! removed names into a queue outside `Inner` that is drained only after
//! the device-manager call that filled it has returned.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use ply_boot_protocol::{Command, Response};
use ply_boot_server::{BootServer, ConnectionId};
use ply_device::{DeviceManager, SeatWatchers};
use ply_event_loop::{EventLoop, TimeoutId, WatchId};
use ply_progress::{Progress, SystemClock};
use ply_terminal::KeyAction;
use ply_theme::{Mode, ThemePlugin};

const ANIMATION_TICK: Duration = Duration::from_millis(33); // ~30Hz, spec §4.9/§5

/// Coarse daemon state (spec §4.9): `starting -> waiting_for_seats ->
/// splash_active <-> details_active -> hiding -> quitting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Starting,
    WaitingForSeats,
    SplashActive,
    DetailsActive,
    Hiding,
    Quitting,
}

/// A boot-server `ask-password` request waiting on keystrokes (spec.md
/// §4.9: "ask-password: enqueue an entry trigger"). `n_bullets` is
/// maintained here because `ply_terminal::Terminal` doesn't expose its
/// internal line length, only the accumulated line at `Enter`.
struct PendingPassword {
    connection: ConnectionId,
    n_bullets: usize,
}

enum SeatEvent {
    Added(String),
    Removed(String),
}

type ThemeHandle = Rc<RefCell<Box<dyn ThemePlugin>>>;

struct Inner {
    event_loop: Rc<EventLoop>,
    state: State,
    mode: Mode,
    device_manager: DeviceManager,
    theme: ThemeHandle,
    details_theme: ThemeHandle,
    active_seat: Option<String>,
    /// Set once a `show-splash` arrives before any seat exists; consumed
    /// by `drain_seat_events` the moment the first seat shows up.
    pending_show: bool,
    progress: Progress<SystemClock>,
    boot_server: BootServer,
    splash_delay: Option<TimeoutId>,
    tick_timeout: Option<TimeoutId>,
    password: Option<PendingPassword>,
    watched_keystroke: Option<(Vec<char>, Box<dyn FnMut(char)>)>,
    quit_retain_splash: bool,
    cache_path: Option<PathBuf>,
    show_delay_seconds: f64,
    skip_splash: bool,
    /// `--tty <name>` (spec.md §6): bind to exactly this tty instead of
    /// running the spec.md §4.5 discovery fallback chain.
    tty_override: Option<String>,
    /// Per-seat terminal input watch, registered when a seat with a
    /// controlling terminal appears and cancelled when that seat goes
    /// away (spec.md §4.5's hotplug remove, or normal teardown).
    terminal_watches: HashMap<String, WatchId>,
}

/// Shared handle to the orchestrator. Every event-loop callback the
/// orchestrator registers holds a clone and re-borrows `inner` as needed,
/// the same pattern `BootServer` uses for its connection callbacks.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Rc<RefCell<Inner>>,
    seat_events: Rc<RefCell<Vec<SeatEvent>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_loop: Rc<EventLoop>,
        mode: Mode,
        device_manager: DeviceManager,
        theme: Box<dyn ThemePlugin>,
        details_theme: Box<dyn ThemePlugin>,
        boot_server: BootServer,
        cache_path: Option<PathBuf>,
        show_delay_seconds: f64,
        skip_splash: bool,
        tty_override: Option<String>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                event_loop,
                state: State::Starting,
                mode,
                device_manager,
                theme: Rc::new(RefCell::new(theme)),
                details_theme: Rc::new(RefCell::new(details_theme)),
                active_seat: None,
                pending_show: false,
                progress: Progress::new(),
                boot_server,
                splash_delay: None,
                tick_timeout: None,
                password: None,
                watched_keystroke: None,
                quit_retain_splash: false,
                cache_path,
                show_delay_seconds,
                skip_splash,
                tty_override,
                terminal_watches: HashMap::new(),
            })),
            seat_events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn clone_handle(&self) -> Orchestrator {
        Orchestrator {
            inner: self.inner.clone(),
            seat_events: self.seat_events.clone(),
        }
    }

    pub fn state(&self) -> State {
        self.inner.borrow().state
    }

    /// Wire seat hotplug and boot-server command dispatch, run the
    /// initial seat scan, and start the 30Hz animation tick. Called once
    /// at daemon start.
    pub fn start(&self) {
        self.attach_seat_watchers();
        self.attach_boot_server();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state == State::Starting {
                inner.state = State::WaitingForSeats;
            }
        }
        self.schedule_tick();
    }

    fn attach_seat_watchers(&self) {
        let added_queue = self.seat_events.clone();
        let removed_queue = self.seat_events.clone();
        {
            let mut inner = self.inner.borrow_mut();
            inner.device_manager.watch_seats(SeatWatchers {
                on_added: Box::new(move |seat| added_queue.borrow_mut().push(SeatEvent::Added(seat.name.clone()))),
                on_removed: Box::new(move |name| removed_queue.borrow_mut().push(SeatEvent::Removed(name.to_string()))),
            });
            match inner.tty_override.clone() {
                Some(tty) => inner.device_manager.discover_named_tty(&tty),
                None => {
                    if let Err(e) = inner.device_manager.discover_initial_seats() {
                        tracing::warn!("initial seat discovery failed: {e}");
                    }
                }
            }
        }
        self.drain_seat_events();
    }

    /// Process every `SeatEvent` queued by a device-manager call that has
    /// already returned. Must never be called while `self.inner` (or
    /// `self.seat_events`) is already borrowed by the caller.
    fn drain_seat_events(&self) {
        let events = std::mem::take(&mut *self.seat_events.borrow_mut());
        for event in events {
            match event {
                SeatEvent::Added(name) => self.on_seat_added(&name),
                SeatEvent::Removed(name) => self.on_seat_removed(&name),
            }
        }
    }

    fn on_seat_added(&self, name: &str) {
        tracing::info!("seat added: {name}");
        self.watch_seat_terminal(name);
        let should_show_splash = {
            let inner = self.inner.borrow();
            inner.pending_show && inner.active_seat.is_none()
        };
        if should_show_splash {
            self.inner.borrow_mut().pending_show = false;
            self.activate_splash(name);
        }
    }

    fn on_seat_removed(&self, name: &str) {
        tracing::info!("seat removed: {name}");
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.terminal_watches.remove(name) {
            inner.event_loop.cancel_fd(id);
        }
        if inner.active_seat.as_deref() == Some(name) {
            inner.active_seat = None;
            if inner.device_manager.get_seats().is_empty() {
                inner.state = State::WaitingForSeats;
            }
        }
    }

    /// Put a newly added seat's terminal into unbuffered (raw) input mode
    /// and register its fd with the event loop so keystrokes reach
    /// [`Self::on_key_action`] (spec.md §4.4).
    fn watch_seat_terminal(&self, name: &str) {
        let fd = {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(name) else { return };
            let Some(terminal) = seat.terminal.as_mut() else { return };
            if let Err(e) = terminal.set_unbuffered_input() {
                tracing::warn!("failed to set {name} unbuffered: {e}");
            }
            terminal.raw_fd()
        };

        let orch = self.clone_handle();
        let seat_name = name.to_string();
        let event_loop = self.inner.borrow().event_loop.clone();
        let id = event_loop.watch_fd(fd, ply_event_loop::Interest::POLLIN, move |_readiness| {
            orch.read_seat_terminal(&seat_name);
        });
        self.inner.borrow_mut().terminal_watches.insert(name.to_string(), id);
    }

    /// Drain whatever bytes are currently available on `seat_name`'s
    /// terminal fd and feed them through the keystroke decoder.
    fn read_seat_terminal(&self, seat_name: &str) {
        let fd = {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(seat_name) else { return };
            let Some(terminal) = seat.terminal.as_ref() else { return };
            terminal.raw_fd()
        };

        let mut buf = [0u8; 256];
        loop {
            // SAFETY: `fd` is the seat's terminal fd, owned by the
            // `Terminal` still held in `device_manager` for the
            // duration of this call.
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            match nix::unistd::read(&borrowed, &mut buf) {
                Ok(0) => break,
                Ok(n) => self.on_key_action(seat_name, &buf[..n]),
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(e) => {
                    tracing::warn!("read from {seat_name} failed: {e}");
                    break;
                }
            }
        }
    }

    /// Feed one hotplug event from the device bus (spec.md §4.5's "On
    /// add, run the same per-device procedure as on initial scan. On
    /// remove, locate the seat ... and free it"). Called by the daemon's
    /// main loop wiring once a [`ply_device::UdevBackend`] hotplug
    /// monitor is attached to the event loop.
    pub fn handle_hotplug_event(&self, path: &Path, is_add: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            let result = if is_add {
                inner.device_manager.add_device(path)
            } else {
                inner.device_manager.remove_device(path);
                Ok(())
            };
            if let Err(e) = result {
                tracing::warn!("hotplug event for {} failed: {e}", path.display());
            }
        }
        self.drain_seat_events();
    }

    fn attach_boot_server(&self) {
        let orch = self.clone_handle();
        let event_loop = self.inner.borrow().event_loop.clone();
        let boot_server = self.inner.borrow().boot_server.clone();
        boot_server.attach(&event_loop, move |server, id, command| {
            orch.handle_command(server, id, command);
        });
    }

    /// Dispatch one decoded control-socket command (spec.md §4.6/§4.9).
    /// Every command ACKs immediately except `ask-password`, whose ACK
    /// *is* the eventual answer/no-answer frame.
    fn handle_command(&self, server: &BootServer, id: ConnectionId, command: Command) {
        match command {
            Command::Ping => server.respond(id, &Response::Ack),
            Command::UpdateStatus(status) => {
                let theme = {
                    let mut inner = self.inner.borrow_mut();
                    inner.progress.status_update(&status);
                    self.active_theme_handle(&inner)
                };
                theme.borrow_mut().update_status(&status);
                server.respond(id, &Response::Ack);
            }
            Command::SystemInitialized => {
                tracing::info!("system initialized");
                server.respond(id, &Response::Ack);
            }
            Command::Error => {
                tracing::warn!("boot-server reported an error condition");
                server.respond(id, &Response::Ack);
            }
            Command::ShowSplash => {
                self.show_splash();
                server.respond(id, &Response::Ack);
            }
            Command::HideSplash => {
                self.hide_splash();
                server.respond(id, &Response::Ack);
            }
            Command::Quit => {
                server.respond(id, &Response::Ack);
                self.quit(false);
            }
            Command::NewRoot(path) => {
                self.on_new_root(&path);
                server.respond(id, &Response::Ack);
            }
            Command::AskPassword => self.ask_password(id),
        }
    }

    /// Whichever theme (splash or details) currently owns the seat,
    /// falling back to the splash theme if nothing is attached yet.
    fn active_theme_handle(&self, inner: &Inner) -> ThemeHandle {
        if inner.state == State::DetailsActive {
            inner.details_theme.clone()
        } else {
            inner.theme.clone()
        }
    }

    fn show_splash(&self) {
        let skip = self.inner.borrow().skip_splash;
        if skip {
            tracing::info!("skipping splash for this boot per kernel command line");
            self.dump_details();
            return;
        }

        let delay = self.inner.borrow().show_delay_seconds;
        if delay > 0.0 {
            self.schedule_splash_delay(delay);
        } else {
            self.show_splash_now();
        }
    }

    fn show_splash_now(&self) {
        let seat_name = {
            let inner = self.inner.borrow();
            inner.device_manager.get_seats().iter().map(|s| s.name.clone()).next()
        };
        match seat_name {
            Some(name) => self.activate_splash(&name),
            None => self.inner.borrow_mut().pending_show = true,
        }
    }

    fn schedule_splash_delay(&self, seconds: f64) {
        let orch = self.clone_handle();
        let event_loop = self.inner.borrow().event_loop.clone();
        let id = event_loop.watch_timeout(Duration::from_secs_f64(seconds.max(0.0)), move || {
            orch.inner.borrow_mut().splash_delay = None;
            orch.show_splash_now();
        });
        self.inner.borrow_mut().splash_delay = Some(id);
    }

    /// Cancel an in-flight splash delay immediately, per spec.md §4.9:
    /// "if the delay is in flight and a password prompt arrives, cancel
    /// the delay immediately."
    fn cancel_splash_delay(&self) {
        let id = self.inner.borrow_mut().splash_delay.take();
        if let Some(id) = id {
            self.inner.borrow().event_loop.cancel_timeout(id);
            self.show_splash_now();
        }
    }

    fn activate_splash(&self, seat_name: &str) {
        let theme = self.inner.borrow().theme.clone();
        let shown = {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(seat_name) else { return };
            theme.borrow_mut().attach_to_seat(seat);
            let mode = inner.mode;
            drop(inner);
            theme.borrow_mut().show(mode)
        };
        let mut inner = self.inner.borrow_mut();
        if shown {
            inner.active_seat = Some(seat_name.to_string());
            inner.state = State::SplashActive;
        } else {
            tracing::warn!("theme failed to show on seat {seat_name}");
        }
    }

    fn dump_details(&self) {
        let seat_name = {
            let inner = self.inner.borrow();
            inner.device_manager.get_seats().iter().map(|s| s.name.clone()).next()
        };
        let Some(name) = seat_name else {
            self.inner.borrow_mut().state = State::Hiding;
            return;
        };
        let details = self.inner.borrow().details_theme.clone();
        {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(&name) else { return };
            details.borrow_mut().attach_to_seat(seat);
        }
        let mode = self.inner.borrow().mode;
        details.borrow_mut().show(mode);
        let mut inner = self.inner.borrow_mut();
        inner.active_seat = Some(name);
        inner.state = State::Hiding;
    }

    fn hide_splash(&self) {
        let theme = {
            let inner = self.inner.borrow();
            self.active_theme_handle(&inner)
        };
        theme.borrow_mut().hide();
        let mut inner = self.inner.borrow_mut();
        inner.state = State::Hiding;
    }

    fn on_new_root(&self, path: &str) {
        let theme = self.inner.borrow().theme.clone();
        theme.borrow_mut().on_root_mounted();
        let cache_path = self.inner.borrow().cache_path.clone();
        if let Some(cache_path) = cache_path {
            let mut inner = self.inner.borrow_mut();
            if let Err(e) = inner.progress.load_cache(&cache_path) {
                tracing::debug!("no progress cache to load from {}: {e}", cache_path.display());
            }
        }
        tracing::info!("root mounted at {path}");
    }

    fn ask_password(&self, id: ConnectionId) {
        self.cancel_splash_delay();

        let cached = {
            let inner = self.inner.borrow();
            inner.boot_server.cached_answer()
        };
        if let Some(payload) = cached {
            let inner = self.inner.borrow();
            inner.boot_server.respond(id, &Response::Answer(payload));
            return;
        }

        if self.inner.borrow().active_seat.is_none() {
            self.show_splash_now();
        }

        let theme = {
            let mut inner = self.inner.borrow_mut();
            inner.progress.pause();
            inner.password = Some(PendingPassword { connection: id, n_bullets: 0 });
            self.active_theme_handle(&inner)
        };
        theme.borrow_mut().display_password("Password:", 0);
    }

    /// Register a keystroke watch (spec.md §4.9's `watch-keystroke(keys,
    /// trigger)`): the next keystroke matching one of `keys`'s characters
    /// fires `trigger` with that character and clears the watch.
    pub fn watch_keystroke(&self, keys: &str, trigger: Box<dyn FnMut(char)>) {
        self.inner.borrow_mut().watched_keystroke = Some((keys.chars().collect(), trigger));
    }

    /// Feed raw bytes read from `seat_name`'s terminal fd, decoding and
    /// dispatching every resulting `KeyAction`.
    pub fn on_key_action(&self, seat_name: &str, bytes: &[u8]) {
        let actions = {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(seat_name) else { return };
            let Some(terminal) = seat.terminal.as_mut() else { return };
            terminal.feed_input(bytes)
        };
        for action in actions {
            self.dispatch_key_action(seat_name, action);
        }
    }

    fn dispatch_key_action(&self, seat_name: &str, action: KeyAction) {
        match action {
            KeyAction::Escape => self.toggle_details(),
            KeyAction::Keystroke(ch) => {
                if self.fire_watched_keystroke(ch) {
                    return;
                }
                if self.inner.borrow().password.is_some() {
                    self.inner.borrow_mut().password.as_mut().unwrap().n_bullets += 1;
                    self.redraw_password_prompt();
                }
            }
            KeyAction::Backspace => {
                if self.inner.borrow().password.is_some() {
                    let mut inner = self.inner.borrow_mut();
                    let pending = inner.password.as_mut().unwrap();
                    pending.n_bullets = pending.n_bullets.saturating_sub(1);
                    drop(inner);
                    self.redraw_password_prompt();
                }
            }
            KeyAction::ClearLine => {
                if self.inner.borrow().password.is_some() {
                    self.inner.borrow_mut().password.as_mut().unwrap().n_bullets = 0;
                    self.redraw_password_prompt();
                }
            }
            KeyAction::Enter(line) => self.submit_password(line),
            KeyAction::Cancel => self.cancel_password(),
            KeyAction::RestorePalette => {
                let mut inner = self.inner.borrow_mut();
                if let Some(seat) = inner.device_manager.seat_named_mut(seat_name) {
                    if let Some(terminal) = seat.terminal.as_mut() {
                        let _ = terminal.restore_color_palette();
                    }
                }
            }
            KeyAction::ToggleForceTextMode => tracing::debug!("force-text-mode toggled on {seat_name}"),
            KeyAction::ToggleVerboseTracing => tracing::debug!("verbose tracing toggled on {seat_name}"),
        }
    }

    fn fire_watched_keystroke(&self, ch: char) -> bool {
        let matched = {
            let inner = self.inner.borrow();
            inner.watched_keystroke.as_ref().is_some_and(|(keys, _)| keys.contains(&ch))
        };
        if !matched {
            return false;
        }
        let mut watch = self.inner.borrow_mut().watched_keystroke.take();
        if let Some((_, trigger)) = watch.as_mut() {
            trigger(ch);
        }
        true
    }

    fn redraw_password_prompt(&self) {
        let (theme, n_bullets) = {
            let inner = self.inner.borrow();
            let Some(pending) = inner.password.as_ref() else { return };
            (self.active_theme_handle(&inner), pending.n_bullets)
        };
        theme.borrow_mut().display_password("Password:", n_bullets);
    }

    fn submit_password(&self, line: String) {
        let (connection, theme) = {
            let mut inner = self.inner.borrow_mut();
            let Some(pending) = inner.password.take() else { return };
            inner.progress.unpause();
            (pending.connection, self.active_theme_handle(&inner))
        };
        let boot_server = self.inner.borrow().boot_server.clone();
        boot_server.answer_password(connection, Some(line.into_bytes()));
        theme.borrow_mut().display_normal();
    }

    fn cancel_password(&self) {
        let connection = {
            let mut inner = self.inner.borrow_mut();
            let Some(pending) = inner.password.take() else { return };
            inner.progress.unpause();
            pending.connection
        };
        let boot_server = self.inner.borrow().boot_server.clone();
        boot_server.answer_password(connection, None);
    }

    fn toggle_details(&self) {
        let Some(seat_name) = self.inner.borrow().active_seat.clone() else { return };
        let state = self.inner.borrow().state;
        let (from, to, entering_details) = match state {
            State::SplashActive => (self.inner.borrow().theme.clone(), self.inner.borrow().details_theme.clone(), true),
            State::DetailsActive => (self.inner.borrow().details_theme.clone(), self.inner.borrow().theme.clone(), false),
            _ => return,
        };
        {
            let mut inner = self.inner.borrow_mut();
            let Some(seat) = inner.device_manager.seat_named_mut(&seat_name) else { return };
            from.borrow_mut().detach_from_seat(seat);
            to.borrow_mut().attach_to_seat(seat);
        }
        let mode = self.inner.borrow().mode;
        to.borrow_mut().show(mode);
        self.inner.borrow_mut().state = if entering_details { State::DetailsActive } else { State::SplashActive };
    }

    fn schedule_tick(&self) {
        let orch = self.clone_handle();
        let event_loop = self.inner.borrow().event_loop.clone();
        let id = event_loop.watch_timeout(ANIMATION_TICK, move || orch.on_tick());
        self.inner.borrow_mut().tick_timeout = Some(id);
    }

    fn on_tick(&self) {
        let (elapsed, fraction) = {
            let mut inner = self.inner.borrow_mut();
            let elapsed = inner.progress.elapsed_seconds();
            let fraction = inner.progress.percentage();
            (elapsed, fraction)
        };
        let state = self.inner.borrow().state;
        if matches!(state, State::SplashActive | State::Hiding) {
            let theme = self.inner.borrow().theme.clone();
            theme.borrow_mut().on_boot_progress(elapsed, fraction);
        }
        if state == State::DetailsActive {
            let details = self.inner.borrow().details_theme.clone();
            details.borrow_mut().on_boot_progress(elapsed, fraction);
        }
        self.drain_seat_events();
        if self.inner.borrow().state != State::Quitting {
            self.schedule_tick();
        }
    }

    /// Become idle on the current theme, then tear down (spec.md §4.9:
    /// "quit(retain_splash): becomes idle on the current theme, then
    /// tears down"). Teardown is deferred by one event loop turn so that
    /// a theme whose `become_idle` uses the trait's synchronous default
    /// doesn't re-enter `Inner` from inside this call.
    pub fn quit(&self, retain_splash: bool) {
        let theme = {
            let mut inner = self.inner.borrow_mut();
            let theme = self.active_theme_handle(&inner);
            inner.state = State::Quitting;
            inner.quit_retain_splash = retain_splash;
            if let Some(id) = inner.tick_timeout.take() {
                inner.event_loop.cancel_timeout(id);
            }
            if let Some(id) = inner.splash_delay.take() {
                inner.event_loop.cancel_timeout(id);
            }
            theme
        };

        let event_loop = self.inner.borrow().event_loop.clone();
        let orch = self.clone_handle();
        theme.borrow_mut().become_idle(Box::new(move || {
            let orch = orch.clone_handle();
            event_loop.watch_timeout(Duration::ZERO, move || orch.finish_quit());
        }));
    }

    fn finish_quit(&self) {
        let retain_splash = self.inner.borrow().quit_retain_splash;

        if let Some(pending) = self.inner.borrow_mut().password.take() {
            let boot_server = self.inner.borrow().boot_server.clone();
            boot_server.answer_password(pending.connection, None);
        }

        if !retain_splash {
            let theme = self.inner.borrow().theme.clone();
            let details = self.inner.borrow().details_theme.clone();
            theme.borrow_mut().hide();
            details.borrow_mut().hide();
            let mut inner = self.inner.borrow_mut();
            let seat_names: Vec<String> = inner.device_manager.get_seats().iter().map(|s| s.name.clone()).collect();
            for name in seat_names {
                if let Some(seat) = inner.device_manager.seat_named_mut(&name) {
                    theme.borrow_mut().detach_from_seat(seat);
                    details.borrow_mut().detach_from_seat(seat);
                    if let Some(terminal) = seat.terminal.as_mut() {
                        let _ = terminal.set_mode(ply_terminal::Mode::Text);
                    }
                }
            }
        }

        let cache_path = self.inner.borrow().cache_path.clone();
        if let Some(cache_path) = cache_path {
            let inner = self.inner.borrow();
            if let Err(e) = inner.progress.save_cache(&cache_path) {
                tracing::warn!("failed to save progress cache to {}: {e}", cache_path.display());
            }
        }

        self.inner.borrow().event_loop.request_exit(0);
    }
}
