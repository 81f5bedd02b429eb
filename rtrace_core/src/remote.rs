//! UDP side channel.
//!
//! Mirrors every traced record as a `'T'` datagram and answers list and
//! toggle commands from an external tool. Both directions are best effort:
//! sends are never retried and malformed datagrams get no reply.

use crate::error::TraceResult;
use crate::registry::Registry;
use parking_lot::Mutex;
use rtrace_common::config::RemoteConfig;
use rtrace_common::consts::DATAGRAM_CAPACITY;
use rtrace_common::protocol::{Command, Datagram, Response, encode_trace};
use rtrace_common::record::RecordHeader;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Receive timeout; bounds how long shutdown waits for the worker
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Shared {
    shutdown: AtomicBool,
    /// Sender of the most recent well-formed command
    peer: Mutex<Option<SocketAddr>>,
}

/// Bound UDP socket plus the worker thread serving commands.
///
/// Dropping the channel stops the worker.
pub struct RemoteChannel {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    mirror: Option<SocketAddr>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteChannel {
    /// Bind `config.bind` and start serving commands for `registry`
    pub fn open(config: &RemoteConfig, registry: Weak<Registry>) -> TraceResult<Self> {
        let socket = UdpSocket::bind(config.bind)?;
        let local_addr = socket.local_addr()?;

        let worker_socket = socket.try_clone()?;
        worker_socket.set_read_timeout(Some(POLL_INTERVAL))?;

        let shared = Arc::new(Shared {
            shutdown: AtomicBool::new(false),
            peer: Mutex::new(None),
        });

        let worker = thread::Builder::new().name("rtrace-remote".to_string()).spawn({
            let shared = Arc::clone(&shared);
            move || serve(&worker_socket, &registry, &shared)
        })?;

        info!(%local_addr, mirror = ?config.mirror, "remote channel open");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            mirror: config.mirror,
            shared,
            worker: Some(worker),
        })
    }

    /// Bound local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender of the most recent well-formed command
    pub fn last_peer(&self) -> Option<SocketAddr> {
        *self.shared.peer.lock()
    }

    /// Where mirrored lines go: the configured mirror, else the last peer
    pub fn mirror_target(&self) -> Option<SocketAddr> {
        self.mirror.or_else(|| self.last_peer())
    }

    /// Send one record as a `'T'` datagram, truncated to fit
    pub fn mirror(&self, header: &RecordHeader<'_>, payload: &[u8]) {
        if let Some(mirror) = self.prepare(header, payload) {
            mirror.send();
        }
    }

    /// Encode one record for sending later; `None` without a target
    pub fn prepare(&self, header: &RecordHeader<'_>, payload: &[u8]) -> Option<Mirror> {
        let target = self.mirror_target()?;
        Some(Mirror {
            socket: Arc::clone(&self.socket),
            target,
            datagram: encode_trace(header, payload),
        })
    }
}

/// Encoded `'T'` datagram bound for the mirror target
pub struct Mirror {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    datagram: Datagram,
}

impl Mirror {
    /// Destination address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Encoded datagram
    pub fn datagram(&self) -> &[u8] {
        &self.datagram
    }

    /// Send once; failures are only logged
    pub fn send(self) {
        if let Err(e) = self.socket.send_to(&self.datagram, self.target) {
            trace!(dest = %self.target, error = %e, "mirror send failed");
        }
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            // The worker may hold the last registry reference
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        debug!(local_addr = %self.local_addr, "remote channel closed");
    }
}

fn serve(socket: &UdpSocket, registry: &Weak<Registry>, shared: &Shared) {
    let mut buf = [0u8; DATAGRAM_CAPACITY];

    while !shared.shutdown.load(Ordering::Acquire) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                debug!(error = %e, "remote receive failed");
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };

        let Some(command) = Command::decode(&buf[..len]) else {
            trace!(%peer, len, "ignoring malformed datagram");
            continue;
        };

        *shared.peer.lock() = Some(peer);

        let Some(registry) = registry.upgrade() else {
            break;
        };
        handle_command(socket, &registry, command, peer);
    }

    debug!("remote channel worker stopped");
}

fn handle_command(socket: &UdpSocket, registry: &Registry, command: Command, peer: SocketAddr) {
    match command {
        Command::List { id } => {
            let categories = registry.categories();
            debug!(%peer, id, count = categories.len(), "listing categories");
            for info in categories {
                let datagram =
                    Response::encode_category(id, info.enabled, &info.category, &info.module);
                send(socket, &datagram, peer);
            }
        }
        Command::Toggle {
            id,
            enable,
            module,
            category,
        } => {
            let modified = registry.set_categories(enable, &module, &category);
            let modified = u32::try_from(modified).unwrap_or(u32::MAX);
            send(socket, &Response::encode_toggled(id, modified), peer);
        }
    }
}

fn send(socket: &UdpSocket, datagram: &[u8], peer: SocketAddr) {
    if let Err(e) = socket.send_to(datagram, peer) {
        trace!(%peer, error = %e, "response send failed");
    }
}
