//! Text rendering of records, mirrored lines and stores

use rtrace_common::protocol::TraceLine;
use rtrace_common::record::RecordView;
use rtrace_shm::StoreInfo;

/// Monotonic nanoseconds as `seconds.nanos`
pub fn timestamp(ns: u64) -> String {
    format!("{}.{:09}", ns / 1_000_000_000, ns % 1_000_000_000)
}

/// One ring record
pub fn record(r: &RecordView<'_>) -> String {
    format!(
        "[{}] {}/{} {}:{} {}: {}",
        timestamp(r.timestamp),
        r.module,
        r.category,
        r.file,
        r.line,
        r.class,
        r.message()
    )
}

/// One mirrored `'T'` datagram
pub fn trace_line(t: &TraceLine<'_>) -> String {
    format!(
        "[{}] {}/{} {}:{} {}: {}",
        timestamp(t.timestamp),
        t.module,
        t.category,
        t.file,
        t.line,
        t.class,
        String::from_utf8_lossy(t.payload)
    )
}

/// One discovered store
pub fn store(s: &StoreInfo) -> String {
    format!(
        "{:>8}  {:<5}  {:>7}/{:<9} evicted {:<8} {}",
        s.pid,
        if s.writer_alive { "alive" } else { "dead" },
        s.used,
        s.capacity,
        s.evicted,
        s.path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrace_common::record::RecordHeader;

    #[test]
    fn test_timestamp_pads_nanos() {
        assert_eq!(timestamp(1_000_000_042), "1.000000042");
        assert_eq!(timestamp(0), "0.000000000");
    }

    #[test]
    fn test_record_line() {
        let header = RecordHeader {
            timestamp: 2_500_000_000,
            line: 12,
            file: "player.rs",
            module: "Player",
            category: "Audio",
            class: "player::audio",
        };
        let mut bytes = Vec::new();
        header.encode((header.encoded_len() + 3) as u16, &mut bytes);
        bytes.extend_from_slice(b"eof");

        let view = RecordView::parse(&bytes).unwrap();
        assert_eq!(
            record(&view),
            "[2.500000000] Player/Audio player.rs:12 player::audio: eof"
        );
    }
}
