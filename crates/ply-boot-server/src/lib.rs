//! Control-socket listener (spec §4.6): an abstract-namespace Unix socket
//! accepting connections that speak `ply-boot-protocol`'s request/response
//! framing, with per-request `SO_PEERCRED` credential checking and an
//! asynchronous ask-password flow.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;

use nix::sys::socket::{
    accept, bind, getsockopt, listen, socket, sockopt::PeerCredentials, AddressFamily, Backlog, SockFlag, SockType,
    UnixAddr,
};
use nix::unistd::{read, write};
use ply_boot_protocol::{AnswerCache, Command, Response, SOCKET_PATH};
use ply_core::{Error, Result};
use ply_event_loop::{EventLoop, Interest};

pub type ConnectionId = u64;

struct Connection {
    fd: OwnedFd,
    read_buf: Vec<u8>,
    awaiting_password: bool,
}

struct Inner {
    listener: OwnedFd,
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
    answer_cache: AnswerCache,
}

/// Accepts connections and dispatches decoded commands to a caller-supplied
/// handler. Shares the `Rc<RefCell<Inner>>` split `ply-event-loop` uses, so
/// the fd-watch callbacks registered below can re-borrow the server to
/// accept new connections or write responses.
#[derive(Clone)]
pub struct BootServer {
    inner: Rc<RefCell<Inner>>,
}

impl BootServer {
    /// Bind the abstract-namespace socket `\0/ply-boot-protocol` and start
    /// listening, per spec.md §4.6.
    pub fn bind_and_listen() -> Result<Self> {
        let fd = socket(AddressFamily::Unix, SockType::Stream, SockFlag::SOCK_NONBLOCK, None)
            .map_err(|e| Error::protocol(format!("socket() failed: {e}")))?;
        let addr = UnixAddr::new_abstract(&SOCKET_PATH.as_bytes()[1..])
            .map_err(|e| Error::protocol(format!("invalid abstract socket address: {e}")))?;
        bind(fd.as_raw_fd(), &addr).map_err(|e| Error::protocol(format!("bind() failed: {e}")))?;
        listen(&fd, Backlog::new(16).unwrap()).map_err(|e| Error::protocol(format!("listen() failed: {e}")))?;

        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                listener: fd,
                connections: HashMap::new(),
                next_id: 0,
                answer_cache: AnswerCache::default(),
            })),
        })
    }

    pub fn listener_fd(&self) -> RawFd {
        self.inner.borrow().listener.as_raw_fd()
    }

    /// Register the listener fd with the event loop; `on_command` is
    /// called once per fully-decoded request that passes the root-only
    /// credential check (non-root requests receive `NAK` automatically
    /// and never reach the handler, per spec.md §4.6).
    pub fn attach(
        &self,
        event_loop: &Rc<EventLoop>,
        on_command: impl FnMut(&BootServer, ConnectionId, Command) + 'static,
    ) {
        let server = self.clone_handle();
        let on_command = Rc::new(RefCell::new(on_command));
        let listener_fd = self.listener_fd();

        event_loop.watch_fd(listener_fd, Interest::POLLIN, {
            let server = server.clone_handle();
            let event_loop = event_loop.clone();
            let on_command = on_command.clone();
            move |_readiness| {
                server.accept_all(&event_loop, &on_command);
            }
        });
    }

    fn clone_handle(&self) -> BootServer {
        BootServer { inner: self.inner.clone() }
    }

    fn accept_all(&self, event_loop: &Rc<EventLoop>, on_command: &Rc<RefCell<impl FnMut(&BootServer, ConnectionId, Command) + 'static>>) {
        loop {
            let listener_raw = self.inner.borrow().listener.as_raw_fd();
            let accepted = accept(listener_raw);
            let client_fd = match accepted {
                Ok(raw) => {
                    // SAFETY: `accept` returns a fresh, uniquely-owned fd.
                    unsafe { OwnedFd::from_raw_fd(raw) }
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(e) => {
                    tracing::warn!("accept() failed: {e}");
                    break;
                }
            };

            let id = {
                let mut inner = self.inner.borrow_mut();
                let id = inner.next_id;
                inner.next_id += 1;
                inner.connections.insert(
                    id,
                    Connection {
                        fd: client_fd,
                        read_buf: Vec::new(),
                        awaiting_password: false,
                    },
                );
                id
            };

            let conn_fd = {
                let inner = self.inner.borrow();
                inner.connections[&id].fd.as_raw_fd()
            };

            let server = self.clone_handle();
            let on_command = on_command.clone();
            event_loop.watch_fd(conn_fd, Interest::POLLIN, move |_readiness| {
                server.on_connection_readable(id, &on_command);
            });
        }
    }

    fn on_connection_readable(&self, id: ConnectionId, on_command: &Rc<RefCell<impl FnMut(&BootServer, ConnectionId, Command) + 'static>>) {
        let mut buf = [0u8; 512];
        let conn_fd = {
            let inner = self.inner.borrow();
            match inner.connections.get(&id) {
                Some(c) => c.fd.as_raw_fd(),
                None => return,
            }
        };

        let n = match read(unsafe { std::os::fd::BorrowedFd::borrow_raw(conn_fd) }, &mut buf) {
            Ok(0) => {
                self.inner.borrow_mut().connections.remove(&id);
                return;
            }
            Ok(n) => n,
            Err(nix::errno::Errno::EAGAIN) => return,
            Err(_) => {
                self.inner.borrow_mut().connections.remove(&id);
                return;
            }
        };

        {
            let mut inner = self.inner.borrow_mut();
            if let Some(conn) = inner.connections.get_mut(&id) {
                conn.read_buf.extend_from_slice(&buf[..n]);
            }
        }

        if !self.connection_is_root(id) {
            tracing::warn!("request on connection {id} came from a non-root peer");
            self.respond(id, &Response::Nak);
            self.inner.borrow_mut().connections.entry(id).and_modify(|c| c.read_buf.clear());
            return;
        }

        loop {
            let frame = {
                let inner = self.inner.borrow();
                let Some(conn) = inner.connections.get(&id) else { return };
                Command::decode(&conn.read_buf)
            };

            match frame {
                Ok(Some((command, consumed))) => {
                    if let Some(conn) = self.inner.borrow_mut().connections.get_mut(&id) {
                        conn.read_buf.drain(..consumed);
                    }
                    (on_command.borrow_mut())(self, id, command);
                }
                Ok(None) => break, // frame incomplete; wait for more bytes
                Err(e) => {
                    tracing::warn!("malformed request on connection {id}: {e}; closing connection");
                    self.inner.borrow_mut().connections.remove(&id);
                    break;
                }
            }
        }
    }

    fn connection_is_root(&self, id: ConnectionId) -> bool {
        let inner = self.inner.borrow();
        let Some(conn) = inner.connections.get(&id) else { return false };
        match getsockopt(&conn.fd, PeerCredentials) {
            Ok(creds) => creds.uid() == 0,
            Err(_) => false,
        }
    }

    /// Write a response frame to the given connection.
    pub fn respond(&self, id: ConnectionId, response: &Response) {
        let inner = self.inner.borrow();
        let Some(conn) = inner.connections.get(&id) else { return };
        let encoded = response.encode();
        if let Err(e) = write(&conn.fd, &encoded) {
            tracing::warn!("failed to write response to connection {id}: {e}");
        }
    }

    /// Called once the orchestrator has an answer for a pending
    /// ask-password request (or `None` if the splash cannot prompt, per
    /// the source's "punt to client" behavior). Caches the answer so a
    /// repeat query can be served without re-prompting.
    pub fn answer_password(&self, id: ConnectionId, password: Option<Vec<u8>>) {
        match password {
            None => self.respond(id, &Response::NoAnswer),
            Some(bytes) => {
                self.inner.borrow_mut().answer_cache.push(bytes.clone());
                self.respond(id, &Response::Answer(bytes));
            }
        }
        if let Some(conn) = self.inner.borrow_mut().connections.get_mut(&id) {
            conn.awaiting_password = false;
        }
    }

    /// The cached NUL-joined answer payload for repeat `ask-password`
    /// queries, or `None` if nothing has been cached yet.
    pub fn cached_answer(&self) -> Option<Vec<u8>> {
        let inner = self.inner.borrow();
        (!inner.answer_cache.is_empty()).then(|| inner.answer_cache.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_cache_is_empty_initially() {
        let inner = Inner {
            listener: {
                let (r, _w) = nix::unistd::pipe().unwrap();
                r
            },
            connections: HashMap::new(),
            next_id: 0,
            answer_cache: AnswerCache::default(),
        };
        let server = BootServer { inner: Rc::new(RefCell::new(inner)) };
        assert_eq!(server.cached_answer(), None);
    }
}
