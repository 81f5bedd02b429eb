//! Remote channel command / response tests over loopback UDP

use rtrace_common::config::RemoteConfig;
use rtrace_common::consts::DATAGRAM_CAPACITY;
use rtrace_common::protocol::{Command, Response, TAG_RESPONSE, TraceLine};
use rtrace_common::record::RecordHeader;
use rtrace_core::{CategoryHandle, Registry, RemoteChannel};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn client(timeout: Duration) -> UdpSocket {
    let socket = UdpSocket::bind(loopback()).unwrap();
    socket.set_read_timeout(Some(timeout)).unwrap();
    socket
}

fn open(registry: &Arc<Registry>, mirror: Option<SocketAddr>) -> SocketAddr {
    registry
        .open_remote(&RemoteConfig {
            bind: loopback(),
            mirror,
        })
        .unwrap()
}

/// Receive until the read timeout expires
fn drain(socket: &UdpSocket) -> Vec<Vec<u8>> {
    let mut buf = [0u8; DATAGRAM_CAPACITY];
    let mut out = Vec::new();
    while let Ok((len, _)) = socket.recv_from(&mut buf) {
        out.push(buf[..len].to_vec());
    }
    out
}

#[test]
fn test_short_command_gets_no_response() {
    let registry = Registry::new();
    let _audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let server = open(&registry, None);

    let socket = client(Duration::from_millis(300));
    socket.send_to(&[b'C', 0, 0], server).unwrap();
    assert!(drain(&socket).is_empty());

    // Channel keeps serving after a malformed datagram
    socket
        .send_to(&Command::List { id: 1 }.encode(), server)
        .unwrap();
    assert_eq!(drain(&socket).len(), 1);
}

#[test]
fn test_unknown_tag_and_subcommand_ignored() {
    let registry = Registry::new();
    let _audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let server = open(&registry, None);

    let socket = client(Duration::from_millis(300));
    socket.send_to(b"Xabcdef", server).unwrap();
    socket.send_to(&[b'C', 0, 0, 0, 9, 7], server).unwrap();
    // Toggle without its flag and patterns
    socket.send_to(&[b'C', 0, 0, 0, 9, 1], server).unwrap();
    assert!(drain(&socket).is_empty());
}

#[test]
fn test_list_returns_one_response_per_category() {
    let registry = Registry::new();
    let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let _video = CategoryHandle::with_registry(&registry, "Player", "Video");
    let _socket = CategoryHandle::with_registry(&registry, "Network", "Socket");
    audio.enable(true);
    let server = open(&registry, None);

    let socket = client(Duration::from_millis(300));
    socket
        .send_to(&Command::List { id: 0xfeed }.encode(), server)
        .unwrap();

    let responses = drain(&socket);
    assert_eq!(responses.len(), 3);

    let mut seen = HashMap::new();
    for datagram in &responses {
        assert_eq!(datagram[0], TAG_RESPONSE);
        match Response::decode(datagram).unwrap() {
            Response::Category {
                id,
                enabled,
                category,
                module,
            } => {
                assert_eq!(id, 0xfeed);
                seen.insert((module, category), enabled);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    assert!(seen[&("Player".to_string(), "Audio".to_string())]);
    assert!(!seen[&("Player".to_string(), "Video".to_string())]);
    assert!(!seen[&("Network".to_string(), "Socket".to_string())]);
}

#[test]
fn test_toggle_reports_modified_count() {
    let registry = Registry::new();
    let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let video = CategoryHandle::with_registry(&registry, "Player", "Video");
    let net = CategoryHandle::with_registry(&registry, "Network", "Socket");
    let server = open(&registry, None);

    let socket = client(Duration::from_millis(300));
    let toggle = Command::Toggle {
        id: 7,
        enable: true,
        module: "Player".to_string(),
        category: String::new(),
    };
    socket.send_to(&toggle.encode(), server).unwrap();

    let responses = drain(&socket);
    assert_eq!(responses.len(), 1);
    assert_eq!(
        Response::decode(&responses[0]),
        Some(Response::Toggled { id: 7, modified: 2 })
    );
    assert!(audio.is_enabled());
    assert!(video.is_enabled());
    assert!(!net.is_enabled());

    // Same command again changes nothing
    socket.send_to(&toggle.encode(), server).unwrap();
    assert_eq!(
        Response::decode(&drain(&socket)[0]),
        Some(Response::Toggled { id: 7, modified: 0 })
    );
}

#[test]
fn test_trace_mirrored_to_configured_address() {
    let mirror = client(Duration::from_secs(2));
    let registry = Registry::new();
    open(&registry, Some(mirror.local_addr().unwrap()));

    let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    audio.trace("player.rs", 99, "player::audio", b"mirrored");

    let mut buf = [0u8; DATAGRAM_CAPACITY];
    let (len, _) = mirror.recv_from(&mut buf).unwrap();
    let line = TraceLine::decode(&buf[..len]).unwrap();
    assert_eq!(line.line, 99);
    assert_eq!(line.file, "player.rs");
    assert_eq!(line.module, "Player");
    assert_eq!(line.category, "Audio");
    assert_eq!(line.class, "player::audio");
    assert_eq!(line.payload, b"mirrored");
}

#[test]
fn test_trace_mirrored_to_last_commander() {
    let registry = Registry::new();
    let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let server = open(&registry, None);

    // Nobody to mirror to yet
    audio.trace("player.rs", 1, "player", b"lost");

    let socket = client(Duration::from_millis(300));
    socket
        .send_to(&Command::List { id: 3 }.encode(), server)
        .unwrap();
    assert_eq!(drain(&socket).len(), 1);

    audio.trace("player.rs", 2, "player", b"found");
    let datagrams = drain(&socket);
    assert_eq!(datagrams.len(), 1);
    let line = TraceLine::decode(&datagrams[0]).unwrap();
    assert_eq!(line.payload, b"found");
}

#[test]
fn test_oversized_payload_truncated_in_mirror() {
    let mirror = client(Duration::from_secs(2));
    let registry = Registry::new();
    open(&registry, Some(mirror.local_addr().unwrap()));

    let audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    audio.trace("player.rs", 1, "player", &[b'z'; 4000]);

    let mut buf = [0u8; 4096];
    let (len, _) = mirror.recv_from(&mut buf).unwrap();
    assert_eq!(len, DATAGRAM_CAPACITY);
    let line = TraceLine::decode(&buf[..len]).unwrap();
    assert_eq!(line.category, "Audio");
    assert!(line.payload.iter().all(|&b| b == b'z'));
}

#[test]
fn test_close_remote_stops_answering() {
    let registry = Registry::new();
    let _audio = CategoryHandle::with_registry(&registry, "Player", "Audio");
    let server = open(&registry, None);
    assert_eq!(registry.remote_addr(), Some(server));

    registry.close_remote();
    assert!(registry.remote_addr().is_none());

    let socket = client(Duration::from_millis(300));
    let _ = socket.send_to(&Command::List { id: 1 }.encode(), server);
    assert!(drain(&socket).is_empty());
}

#[test]
fn test_prepared_mirror_is_sent_later() {
    let registry = Registry::new();
    let header = RecordHeader {
        timestamp: 7,
        line: 3,
        file: "net.rs",
        module: "Network",
        category: "Socket",
        class: "net",
    };

    let silent = RemoteChannel::open(
        &RemoteConfig {
            bind: loopback(),
            mirror: None,
        },
        Arc::downgrade(&registry),
    )
    .unwrap();
    assert!(silent.prepare(&header, b"x").is_none());

    let listener = client(Duration::from_millis(500));
    let target = listener.local_addr().unwrap();
    let channel = RemoteChannel::open(
        &RemoteConfig {
            bind: loopback(),
            mirror: Some(target),
        },
        Arc::downgrade(&registry),
    )
    .unwrap();

    let mirror = channel.prepare(&header, b"closed").unwrap();
    assert_eq!(mirror.target(), target);
    let line = TraceLine::decode(mirror.datagram()).unwrap();
    assert_eq!(line.payload, b"closed");

    drop(channel);
    mirror.send();
    let received = drain(&listener);
    assert_eq!(received.len(), 1);
    assert_eq!(TraceLine::decode(&received[0]).unwrap().module, "Network");
}
