//! Single-threaded reactor (spec §4.1): fd readiness, timeouts, signals,
//! and exit hooks, generalized from `ftui-pty`'s single-fd
//! `nix::poll::{poll, PollFd, PollFlags}` read loop into a multiplexing
//! reactor that the rest of the daemon registers callbacks against.
//!
//! Signals are bridged into loop-thread callbacks via a self-pipe (spec
//! §9): `signal_hook::flag::register` sets an `Arc<AtomicBool>` from the
//! signal handler (async-signal-safe), and `signal_hook::low_level::pipe`
//! wakes the poll so the loop notices promptly instead of waiting out a
//! full timeout.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::unistd::{pipe, read};

pub use nix::poll::PollFlags as Interest;

/// Index into `Inner::fd_watches` at the time of registration. Each kind of
/// id indexes its own Vec, minted from that Vec's length rather than a
/// shared counter, since entries are only ever appended (never reordered
/// or removed from the middle) — the index stays valid for the watch's
/// whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(usize);

/// Index into `Inner::timeouts` at the time of registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(usize);

/// Index into `Inner::signals` at the time of registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(usize);

/// Readiness reported to an fd callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
}

struct FdWatch {
    fd: RawFd,
    interest: PollFlags,
    callback: Option<Box<dyn FnMut(Readiness)>>,
    removed: bool,
}

struct TimeoutWatch {
    deadline: Instant,
    callback: Option<Box<dyn FnOnce()>>,
    removed: bool,
}

struct SignalWatch {
    flag: Arc<AtomicBool>,
    callback: Option<Box<dyn FnMut()>>,
    removed: bool,
}

struct Inner {
    fd_watches: Vec<FdWatch>,
    timeouts: Vec<TimeoutWatch>,
    signals: Vec<SignalWatch>,
    exit_hooks: Vec<Box<dyn FnMut(i32)>>,
    exit_requested: Option<i32>,
    registered_signal_hooks: HashMap<i32, signal_hook::SigId>,
    // kept alive for the lifetime of the loop so the signal handler's
    // write end stays valid.
    #[allow(dead_code)]
    wake_write: OwnedFd,
    wake_read: OwnedFd,
}

/// The event loop. Not `Send`/`Sync`: everything runs on one thread, per
/// spec §5.
pub struct EventLoop {
    inner: RefCell<Inner>,
}

impl EventLoop {
    pub fn new() -> std::io::Result<Rc<Self>> {
        let (wake_read, wake_write) = pipe()?;
        nix::fcntl::fcntl(
            &wake_read,
            nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK),
        )
        .map_err(std::io::Error::from)?;

        Ok(Rc::new(Self {
            inner: RefCell::new(Inner {
                fd_watches: Vec::new(),
                timeouts: Vec::new(),
                signals: Vec::new(),
                exit_hooks: Vec::new(),
                exit_requested: None,
                registered_signal_hooks: HashMap::new(),
                wake_write,
                wake_read,
            }),
        }))
    }

    /// Register a callback for readiness on `fd`. `interest` selects
    /// readable/writable; hangup is always reported when detected.
    pub fn watch_fd(
        &self,
        fd: RawFd,
        interest: Interest,
        callback: impl FnMut(Readiness) + 'static,
    ) -> WatchId {
        let mut inner = self.inner.borrow_mut();
        let id = WatchId(inner.fd_watches.len());
        inner.fd_watches.push(FdWatch {
            fd,
            interest,
            callback: Some(Box::new(callback)),
            removed: false,
        });
        id
    }

    /// Schedule a one-shot callback after `duration`.
    pub fn watch_timeout(&self, duration: Duration, callback: impl FnOnce() + 'static) -> TimeoutId {
        let mut inner = self.inner.borrow_mut();
        let id = TimeoutId(inner.timeouts.len());
        inner.timeouts.push(TimeoutWatch {
            deadline: Instant::now() + duration,
            callback: Some(Box::new(callback)),
            removed: false,
        });
        id
    }

    /// Register a callback for an asynchronous signal, delivered from the
    /// loop's own thread (never from the signal handler itself).
    pub fn watch_signal(
        &self,
        signal: i32,
        callback: impl FnMut() + 'static,
    ) -> std::io::Result<SignalId> {
        let flag = Arc::new(AtomicBool::new(false));

        let owned_wake_fd = {
            let inner = self.inner.borrow();
            nix::unistd::dup(&inner.wake_write).map_err(std::io::Error::from)?
        };
        let hook_id = signal_hook::low_level::pipe::register(signal, owned_wake_fd)
            .map_err(std::io::Error::other)?;
        signal_hook::flag::register(signal, Arc::clone(&flag)).map_err(std::io::Error::other)?;

        let mut inner = self.inner.borrow_mut();
        let id = SignalId(inner.signals.len());
        inner.registered_signal_hooks.insert(signal, hook_id);
        inner.signals.push(SignalWatch {
            flag,
            callback: Some(Box::new(callback)),
            removed: false,
        });
        Ok(id)
    }

    /// Register a callback invoked, in registration order, when `exit` is
    /// requested but before `run` returns.
    pub fn watch_exit(&self, callback: impl FnMut(i32) + 'static) {
        self.inner.borrow_mut().exit_hooks.push(Box::new(callback));
    }

    /// Cancel a watch registered with [`watch_fd`]. Safe to call from
    /// within a callback dispatched by this loop (the in-flight dispatch
    /// finishes, but the watch will not fire again).
    pub fn cancel_fd(&self, id: WatchId) {
        if let Some(w) = self.inner.borrow_mut().fd_watches.get_mut(id.0) {
            w.removed = true;
            w.callback = None;
        }
    }

    pub fn cancel_timeout(&self, id: TimeoutId) {
        if let Some(w) = self.inner.borrow_mut().timeouts.get_mut(id.0) {
            w.removed = true;
            w.callback = None;
        }
    }

    pub fn cancel_signal(&self, id: SignalId) {
        if let Some(w) = self.inner.borrow_mut().signals.get_mut(id.0) {
            w.removed = true;
            w.callback = None;
        }
    }

    /// Request that `run` return `code` once the current dispatch round
    /// completes; exit hooks fire first, in registration order.
    pub fn request_exit(&self, code: i32) {
        self.inner.borrow_mut().exit_requested = Some(code);
    }

    /// Block processing events until `request_exit` is called; returns the
    /// requested code.
    pub fn run(&self) -> i32 {
        loop {
            if let Some(code) = self.inner.borrow().exit_requested {
                self.run_exit_hooks(code);
                return code;
            }

            self.poll_once();
            self.fire_due_timeouts();

            if let Some(code) = self.inner.borrow().exit_requested {
                self.run_exit_hooks(code);
                return code;
            }
        }
    }

    fn run_exit_hooks(&self, code: i32) {
        let hooks = std::mem::take(&mut self.inner.borrow_mut().exit_hooks);
        let mut hooks = hooks;
        for hook in hooks.iter_mut() {
            hook(code);
        }
    }

    fn next_timeout(&self) -> PollTimeout {
        let inner = self.inner.borrow();
        let deadline = inner
            .timeouts
            .iter()
            .filter(|t| !t.removed)
            .map(|t| t.deadline)
            .min();
        match deadline {
            None => PollTimeout::from(1000u16),
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    PollTimeout::ZERO
                } else {
                    let millis = (deadline - now).as_millis().min(u16::MAX as u128) as u16;
                    PollTimeout::from(millis)
                }
            }
        }
    }

    fn poll_once(&self) {
        let timeout = self.next_timeout();
        let wake_fd = self.inner.borrow().wake_read.as_raw_fd();

        let mut poll_fds: Vec<PollFd> = Vec::new();
        // `poll_fds` skips removed watches, so its positions don't line up
        // with `fd_watches` indices once anything has been cancelled — this
        // records which real index each `poll_fds` slot came from.
        let mut poll_fd_indices: Vec<usize> = Vec::new();
        {
            let inner = self.inner.borrow();
            for (index, watch) in inner.fd_watches.iter().enumerate() {
                if !watch.removed {
                    // SAFETY: `watch.fd` is owned by the caller that
                    // registered it and stays valid for at least this
                    // poll call; the borrow does not outlive `poll_fds`.
                    poll_fds.push(PollFd::new(
                        unsafe { std::os::fd::BorrowedFd::borrow_raw(watch.fd) },
                        watch.interest,
                    ));
                    poll_fd_indices.push(index);
                }
            }
            // SAFETY: `wake_fd` is the read end of `inner.wake_read`,
            // owned by `self` for the loop's whole lifetime.
            poll_fds.push(PollFd::new(
                unsafe { std::os::fd::BorrowedFd::borrow_raw(wake_fd) },
                PollFlags::POLLIN,
            ));
        }

        let ready = nix::poll::poll(&mut poll_fds, timeout);
        let ready = match ready {
            Ok(n) => n,
            Err(_) => return,
        };
        if ready == 0 {
            return;
        }

        let wake_idx = poll_fds.len() - 1;
        let wake_revents = poll_fds[wake_idx].revents().unwrap_or_else(PollFlags::empty);
        if wake_revents.contains(PollFlags::POLLIN) {
            self.drain_wake_pipe(wake_fd);
            self.dispatch_signals();
        }

        for (slot, pfd) in poll_fds.iter().enumerate().take(wake_idx) {
            let revents = pfd.revents().unwrap_or_else(PollFlags::empty);
            if revents.is_empty() {
                continue;
            }
            let readiness = Readiness {
                readable: revents.contains(PollFlags::POLLIN),
                writable: revents.contains(PollFlags::POLLOUT),
                hangup: revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR),
            };
            self.dispatch_fd(poll_fd_indices[slot], readiness);
        }

        self.sweep_removed();
    }

    fn drain_wake_pipe(&self, fd: RawFd) {
        let mut buf = [0u8; 256];
        loop {
            match read(fd, &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    fn dispatch_fd(&self, idx: usize, readiness: Readiness) {
        let cb = {
            let mut inner = self.inner.borrow_mut();
            let Some(watch) = inner.fd_watches.get_mut(idx) else {
                return;
            };
            if watch.removed {
                return;
            }
            watch.callback.take()
        };
        if let Some(mut cb) = cb {
            cb(readiness);
            let mut inner = self.inner.borrow_mut();
            if let Some(watch) = inner.fd_watches.get_mut(idx) {
                if !watch.removed {
                    watch.callback = Some(cb);
                }
            }
        }
    }

    fn dispatch_signals(&self) {
        let len = self.inner.borrow().signals.len();
        for idx in 0..len {
            let fired = {
                let inner = self.inner.borrow();
                let Some(watch) = inner.signals.get(idx) else {
                    continue;
                };
                !watch.removed && watch.flag.swap(false, Ordering::SeqCst)
            };
            if !fired {
                continue;
            }
            let cb = {
                let mut inner = self.inner.borrow_mut();
                inner.signals.get_mut(idx).and_then(|w| w.callback.take())
            };
            if let Some(mut cb) = cb {
                cb();
                let mut inner = self.inner.borrow_mut();
                if let Some(watch) = inner.signals.get_mut(idx) {
                    if !watch.removed {
                        watch.callback = Some(cb);
                    }
                }
            }
        }
    }

    fn fire_due_timeouts(&self) {
        let now = Instant::now();
        loop {
            let idx = {
                let inner = self.inner.borrow();
                inner
                    .timeouts
                    .iter()
                    .position(|t| !t.removed && t.callback.is_some() && t.deadline <= now)
            };
            let Some(idx) = idx else { break };
            let cb = {
                let mut inner = self.inner.borrow_mut();
                inner.timeouts[idx].removed = true;
                inner.timeouts[idx].callback.take()
            };
            if let Some(cb) = cb {
                cb();
            }
        }
    }

    /// Drop trailing dead timeout entries. `WatchId`/`TimeoutId` are
    /// positional, so only entries with no surviving index reference
    /// (i.e. the tail) can be compacted; live or mid-list watches stay in
    /// place for the lifetime of the loop.
    fn sweep_removed(&self) {
        let mut inner = self.inner.borrow_mut();
        while matches!(inner.timeouts.last(), Some(t) if t.removed) {
            inner.timeouts.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn timeout_fires_once_after_duration() {
        let ev = EventLoop::new().unwrap();
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let ev2 = Rc::clone(&ev);
        ev.watch_timeout(Duration::from_millis(10), move || {
            f.set(f.get() + 1);
            ev2.request_exit(0);
        });
        let code = ev.run();
        assert_eq!(code, 0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn exit_hooks_run_in_registration_order() {
        let ev = EventLoop::new().unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        ev.watch_exit(move |_| o1.borrow_mut().push(1));
        ev.watch_exit(move |_| o2.borrow_mut().push(2));
        ev.request_exit(7);
        let code = ev.run();
        assert_eq!(code, 7);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn cancelled_timeout_never_fires() {
        let ev = EventLoop::new().unwrap();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        let id = ev.watch_timeout(Duration::from_millis(5), move || f.set(true));
        ev.cancel_timeout(id);
        let ev2 = Rc::clone(&ev);
        ev.watch_timeout(Duration::from_millis(20), move || ev2.request_exit(0));
        ev.run();
        assert!(!fired.get());
    }

    #[test]
    fn fd_watch_sees_pipe_data() {
        let ev = EventLoop::new().unwrap();
        let (r, w) = pipe().unwrap();
        let got = Rc::new(Cell::new(false));
        let got2 = Rc::clone(&got);
        let ev2 = Rc::clone(&ev);
        ev.watch_fd(r.as_raw_fd(), Interest::POLLIN, move |readiness| {
            if readiness.readable {
                got2.set(true);
                ev2.request_exit(0);
            }
        });
        nix::unistd::write(&w, b"x").unwrap();
        let code = ev.run();
        assert_eq!(code, 0);
        assert!(got.get());
        drop(r);
        drop(w);
    }

    /// A `WatchId` and a `TimeoutId` minted back to back used to collide
    /// (both came from one shared counter) even though they index separate
    /// Vecs; cancelling the timeout must never cancel the unrelated fd
    /// watch that happens to share the same raw id value.
    #[test]
    fn watch_and_timeout_ids_index_independently() {
        let ev = EventLoop::new().unwrap();
        let (r, w) = pipe().unwrap();
        let fd_fired = Rc::new(Cell::new(false));
        let fd_fired2 = Rc::clone(&fd_fired);
        let watch_id = ev.watch_fd(r.as_raw_fd(), Interest::POLLIN, move |_| fd_fired2.set(true));

        let timeout_fired = Rc::new(Cell::new(false));
        let timeout_fired2 = Rc::clone(&timeout_fired);
        let timeout_id = ev.watch_timeout(Duration::from_millis(5), move || timeout_fired2.set(true));
        assert_eq!(watch_id.0, timeout_id.0, "ids should coincide across kinds for this test to prove anything");

        ev.cancel_timeout(timeout_id);

        let ev2 = Rc::clone(&ev);
        ev.watch_timeout(Duration::from_millis(20), move || ev2.request_exit(0));
        nix::unistd::write(&w, b"x").unwrap();
        ev.run();

        assert!(fd_fired.get(), "fd watch must still fire after an unrelated timeout with the same id was cancelled");
        assert!(!timeout_fired.get());
        drop(r);
        drop(w);
    }

    /// Exercises the `poll_fds` / `fd_watches` index desync: with two fd
    /// watches registered and the first one cancelled before polling, the
    /// second watch's callback must still be the one that fires.
    #[test]
    fn cancelling_earlier_fd_watch_does_not_misdispatch_later_one() {
        let ev = EventLoop::new().unwrap();
        let (r1, w1) = pipe().unwrap();
        let (r2, w2) = pipe().unwrap();

        let first_fired = Rc::new(Cell::new(false));
        let first_fired2 = Rc::clone(&first_fired);
        let first = ev.watch_fd(r1.as_raw_fd(), Interest::POLLIN, move |_| first_fired2.set(true));
        ev.cancel_fd(first);

        let second_fired = Rc::new(Cell::new(false));
        let second_fired2 = Rc::clone(&second_fired);
        let ev2 = Rc::clone(&ev);
        ev.watch_fd(r2.as_raw_fd(), Interest::POLLIN, move |readiness| {
            if readiness.readable {
                second_fired2.set(true);
                ev2.request_exit(0);
            }
        });

        nix::unistd::write(&w1, b"x").unwrap();
        nix::unistd::write(&w2, b"x").unwrap();
        let code = ev.run();

        assert_eq!(code, 0);
        assert!(!first_fired.get(), "cancelled watch must not fire");
        assert!(second_fired.get(), "surviving watch must still be dispatched to its own callback");
        drop(r1);
        drop(w1);
        drop(r2);
        drop(w2);
    }
}
