//! Ring records, mirrored datagrams and config files agree with each other

use rtrace_common::config::{ConfigLoader, TraceConfig};
use rtrace_common::consts::DATAGRAM_CAPACITY;
use rtrace_common::protocol::{TRACE_MIN_LEN, TraceLine, encode_trace};
use rtrace_common::record::{RecordHeader, RecordView};
use std::fs;
use tempfile::TempDir;

fn header() -> RecordHeader<'static> {
    RecordHeader {
        timestamp: 123_456_789,
        line: 31,
        file: "pipeline.rs",
        module: "Player",
        category: "Video",
        class: "player::pipeline",
    }
}

#[test]
fn test_record_and_mirror_carry_same_fields() {
    let h = header();
    let payload = b"frame dropped";

    let mut record = Vec::new();
    h.encode((h.encoded_len() + payload.len()) as u16, &mut record);
    record.extend_from_slice(payload);
    let view = RecordView::parse(&record).unwrap();

    let datagram = encode_trace(&h, payload);
    let line = TraceLine::decode(&datagram).unwrap();

    assert_eq!(view.timestamp, line.timestamp);
    assert_eq!(view.line, line.line);
    assert_eq!(view.file, line.file);
    assert_eq!(view.module, line.module);
    assert_eq!(view.category, line.category);
    assert_eq!(view.class, line.class);
    assert_eq!(view.payload, line.payload);
}

#[test]
fn test_mirror_keeps_header_when_strings_are_huge() {
    let long = "f".repeat(2 * DATAGRAM_CAPACITY);
    let h = RecordHeader {
        file: &long,
        ..header()
    };
    let datagram = encode_trace(&h, b"payload");
    assert_eq!(datagram.len(), DATAGRAM_CAPACITY);

    let line = TraceLine::decode(&datagram).unwrap();
    assert_eq!(line.file.len(), DATAGRAM_CAPACITY - TRACE_MIN_LEN);
    assert!(line.module.is_empty());
    assert!(line.payload.is_empty());
}

#[test]
fn test_load_trace_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rtrace.toml");
    fs::write(
        &path,
        r#"
[shared]
log_level = "debug"
service_name = "player"

[store]
path = "/run/rtrace"
prefix = "player"
capacity = 4096

[remote]
bind = "0.0.0.0:6000"

[defaults]
categories = "/etc/rtrace/categories.json"
"#,
    )
    .unwrap();

    let config = TraceConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(
        config.store.file_for(4242),
        std::path::PathBuf::from("/run/rtrace/player.4242")
    );
    let remote = config.remote.unwrap();
    assert_eq!(remote.bind.port(), 6000);
    assert!(remote.mirror.is_none());
}

#[test]
fn test_invalid_capacity_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rtrace.toml");
    fs::write(
        &path,
        "[shared]\nservice_name = \"player\"\n\n[store]\ncapacity = 4\n",
    )
    .unwrap();

    let config = TraceConfig::load(&path).unwrap();
    assert!(config.validate().is_err());
}
