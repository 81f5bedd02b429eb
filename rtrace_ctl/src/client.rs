//! UDP client for a process's remote channel

use rtrace_common::consts::DATAGRAM_CAPACITY;
use rtrace_common::protocol::{Command, Response};
use serde::Serialize;
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace};

/// One category reported by a list command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listed {
    /// Module name (possibly truncated by the server)
    pub module: String,
    /// Category name (possibly truncated by the server)
    pub category: String,
    /// Enabled state
    pub enabled: bool,
}

/// Sends commands and collects responses until a quiet period passes
pub struct RemoteClient {
    socket: UdpSocket,
    remote: SocketAddr,
    next_id: u32,
}

impl RemoteClient {
    /// Bind an ephemeral socket of the remote's address family
    pub fn connect(remote: SocketAddr, quiet: Duration) -> io::Result<Self> {
        let local = match remote {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(quiet))?;

        Ok(Self {
            socket,
            remote,
            next_id: std::process::id(),
        })
    }

    fn send(&mut self, command: &Command) -> io::Result<()> {
        self.socket.send_to(&command.encode(), self.remote)?;
        debug!(remote = %self.remote, id = command.id(), "command sent");
        Ok(())
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Responses to `id` received before the socket goes quiet
    fn collect(&self, id: u32, limit: Option<usize>) -> io::Result<Vec<Response>> {
        let mut buf = [0u8; DATAGRAM_CAPACITY];
        let mut responses = Vec::new();

        while limit.is_none_or(|limit| responses.len() < limit) {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) => return Err(e),
            };
            match Response::decode(&buf[..len]) {
                Some(response) if response.id() == id => responses.push(response),
                _ => trace!(%from, len, "ignoring unrelated datagram"),
            }
        }
        Ok(responses)
    }

    /// All categories of the remote process
    pub fn list(&mut self) -> io::Result<Vec<Listed>> {
        let id = self.allocate_id();
        self.send(&Command::List { id })?;

        let listed = self
            .collect(id, None)?
            .into_iter()
            .filter_map(|response| match response {
                Response::Category {
                    enabled,
                    category,
                    module,
                    ..
                } => Some(Listed {
                    module,
                    category,
                    enabled,
                }),
                Response::Toggled { .. } => None,
            })
            .collect();
        Ok(listed)
    }

    /// Bulk toggle; `None` when the remote never answered
    pub fn toggle(&mut self, enable: bool, module: &str, category: &str) -> io::Result<Option<u32>> {
        let id = self.allocate_id();
        self.send(&Command::Toggle {
            id,
            enable,
            module: module.to_string(),
            category: category.to_string(),
        })?;

        let modified = self
            .collect(id, Some(1))?
            .into_iter()
            .find_map(|response| match response {
                Response::Toggled { modified, .. } => Some(modified),
                Response::Category { .. } => None,
            });
        Ok(modified)
    }
}
