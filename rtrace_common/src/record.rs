//! Trace record layout inside the ring store.
//!
//! Every record is self-framing: it starts with its own total length so a
//! reader (or the store's eviction scan) can step from one record start to
//! the next without any other bookkeeping.
//!
//! ```text
//! u16 LE  total_len      // whole record, prefix included
//! u64 LE  timestamp      // CLOCK_MONOTONIC nanoseconds
//! u32 LE  line
//! file\0 module\0 category\0 class\0
//! payload[total_len - header_len]
//! ```

use std::borrow::Cow;

use static_assertions::const_assert_eq;
use thiserror::Error;

/// Size of the leading length prefix.
pub const LEN_PREFIX: usize = core::mem::size_of::<u16>();

/// Size of the fixed-width part of the header (length, timestamp, line).
pub const FIXED_HEADER_LEN: usize = LEN_PREFIX + 8 + 4;

/// Smallest well-formed record: fixed fields plus four empty strings.
pub const MIN_RECORD_LEN: usize = FIXED_HEADER_LEN + 4;

const_assert_eq!(FIXED_HEADER_LEN, 14);

/// Errors produced when decoding a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Fewer bytes than the smallest possible record.
    #[error("record truncated: {available} bytes")]
    Truncated {
        /// Bytes available to the decoder.
        available: usize,
    },

    /// Length prefix disagrees with the available bytes.
    #[error("record length {declared} invalid for {available} available bytes")]
    BadLength {
        /// Length from the prefix.
        declared: usize,
        /// Bytes available to the decoder.
        available: usize,
    },

    /// One of the four strings is not NUL-terminated within the record.
    #[error("record string field not NUL-terminated")]
    MissingTerminator,
}

/// Returns the bytes of `s` up to (not including) the first NUL.
///
/// Strings with interior NULs would otherwise split into extra fields.
#[inline]
pub fn nul_free(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Header fields of a record about to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader<'a> {
    /// Monotonic timestamp in nanoseconds.
    pub timestamp: u64,
    /// Source line of the emitting call site.
    pub line: u32,
    /// Source file of the emitting call site.
    pub file: &'a str,
    /// Module the category belongs to.
    pub module: &'a str,
    /// Category name.
    pub category: &'a str,
    /// Emitting class (Rust: module path of the call site).
    pub class: &'a str,
}

impl RecordHeader<'_> {
    /// Encoded header length, terminators included.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN
            + nul_free(self.file).len()
            + nul_free(self.module).len()
            + nul_free(self.category).len()
            + nul_free(self.class).len()
            + 4
    }

    /// Appends the header to `out` with `total_len` as the length prefix.
    pub fn encode(&self, total_len: u16, out: &mut Vec<u8>) {
        out.extend_from_slice(&total_len.to_le_bytes());
        self.encode_body(out);
    }

    /// Appends everything after the length prefix.
    ///
    /// The ring store writes the prefix itself when it grants space.
    pub fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.line.to_le_bytes());
        for field in [self.file, self.module, self.category, self.class] {
            out.extend_from_slice(nul_free(field));
            out.push(0);
        }
    }
}

/// Reads the length prefix at the start of `bytes`.
#[inline]
pub fn peek_len(bytes: &[u8]) -> Option<usize> {
    match bytes {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi]) as usize),
        _ => None,
    }
}

/// A decoded record borrowed from a ring snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView<'a> {
    /// Total record length from the prefix.
    pub total_len: usize,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp: u64,
    /// Source line.
    pub line: u32,
    /// Source file.
    pub file: Cow<'a, str>,
    /// Module name.
    pub module: Cow<'a, str>,
    /// Category name.
    pub category: Cow<'a, str>,
    /// Emitting class name.
    pub class: Cow<'a, str>,
    /// Payload bytes (possibly truncated by the writer).
    pub payload: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// Decodes the record at the start of `bytes`.
    ///
    /// Trailing bytes after the record are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, RecordError> {
        if bytes.len() < MIN_RECORD_LEN {
            return Err(RecordError::Truncated {
                available: bytes.len(),
            });
        }

        let total_len = peek_len(bytes).unwrap_or(0);
        if total_len < MIN_RECORD_LEN || total_len > bytes.len() {
            return Err(RecordError::BadLength {
                declared: total_len,
                available: bytes.len(),
            });
        }

        let record = &bytes[..total_len];
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&record[2..10]);
        let mut line = [0u8; 4];
        line.copy_from_slice(&record[10..14]);

        let rest = &record[FIXED_HEADER_LEN..];
        let (file, rest) = split_cstr(rest).ok_or(RecordError::MissingTerminator)?;
        let (module, rest) = split_cstr(rest).ok_or(RecordError::MissingTerminator)?;
        let (category, rest) = split_cstr(rest).ok_or(RecordError::MissingTerminator)?;
        let (class, payload) = split_cstr(rest).ok_or(RecordError::MissingTerminator)?;

        Ok(Self {
            total_len,
            timestamp: u64::from_le_bytes(timestamp),
            line: u32::from_le_bytes(line),
            file,
            module,
            category,
            class,
            payload,
        })
    }

    /// Payload rendered as text, replacing invalid UTF-8.
    pub fn message(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.payload)
    }
}

/// Splits a NUL-terminated string off the front of `bytes`.
pub fn split_cstr(bytes: &[u8]) -> Option<(Cow<'_, str>, &[u8])> {
    let end = bytes.iter().position(|&b| b == 0)?;
    Some((String::from_utf8_lossy(&bytes[..end]), &bytes[end + 1..]))
}
