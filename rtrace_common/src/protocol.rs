//! Remote channel datagram protocol.
//!
//! The first byte of every datagram is a tag:
//!
//! ```text
//! 'T' u64 BE timestamp, u32 BE line, file\0 module\0 category\0 class\0 payload
//! 'C' u32 BE id, u8 sub                               (sub 0 = list)
//! 'C' u32 BE id, u8 sub, u8 enable, module\0 category\0 (sub 1 = toggle)
//! 'R' u32 BE id, u8 0, u8 enabled, category\0 module\0  (one per category)
//! 'R' u32 BE id, u8 1, u32 BE modified                  (toggle result)
//! ```
//!
//! Every datagram fits in [`DATAGRAM_CAPACITY`] bytes. Strings that do not
//! fit are cut short and still NUL-terminated; payload is cut after that.
//! Decoders return `None` for anything malformed, and the caller drops it.

use std::borrow::Cow;

use crate::consts::DATAGRAM_CAPACITY;
use crate::record::{RecordHeader, nul_free, split_cstr};

/// Tag of a mirrored trace line.
pub const TAG_TRACE: u8 = b'T';
/// Tag of a command sent by the external tool.
pub const TAG_COMMAND: u8 = b'C';
/// Tag of a response sent by the remote channel.
pub const TAG_RESPONSE: u8 = b'R';

/// Tag + correlation id + subcommand.
pub const COMMAND_MIN_LEN: usize = 1 + 4 + 1;
/// Command header + enable flag + two empty strings.
pub const TOGGLE_MIN_LEN: usize = COMMAND_MIN_LEN + 1 + 2;
/// Tag + timestamp + line + four empty strings.
pub const TRACE_MIN_LEN: usize = 1 + 8 + 4 + 4;
/// Command header + enabled flag + two empty strings.
pub const CATEGORY_RESPONSE_MIN_LEN: usize = COMMAND_MIN_LEN + 1 + 2;
/// Command header + modified count.
pub const TOGGLE_RESPONSE_LEN: usize = COMMAND_MIN_LEN + 4;

/// A datagram buffer of fixed capacity.
pub type Datagram = heapless::Vec<u8, DATAGRAM_CAPACITY>;

/// Command subcodes carried after the correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Subcommand {
    /// Enumerate registered categories.
    List = 0,
    /// Bulk enable/disable by pattern.
    Toggle = 1,
}

impl Subcommand {
    /// Convert from raw `u8` value. Returns `None` for unknown values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::List),
            1 => Some(Self::Toggle),
            _ => None,
        }
    }
}

/// Builds a datagram, truncating silently once capacity is reached.
#[derive(Debug, Clone)]
pub struct DatagramWriter {
    buf: Datagram,
}

impl DatagramWriter {
    /// Starts a datagram with `tag` as its first byte.
    pub fn new(tag: u8) -> Self {
        let mut buf = Datagram::new();
        let _ = buf.push(tag);
        Self { buf }
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        DATAGRAM_CAPACITY - self.buf.len()
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        let _ = self.buf.push(value);
        self
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian `u64`.
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends as much of `bytes` as fits.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        let take = bytes.len().min(self.remaining());
        let _ = self.buf.extend_from_slice(&bytes[..take]);
        self
    }

    /// Appends `s` plus a terminating NUL, cutting `s` so the NUL always fits.
    ///
    /// Writes nothing when the buffer is already full.
    pub fn put_cstr(&mut self, s: &str) -> &mut Self {
        self.put_cstr_within(s, 0)
    }

    /// Like [`put_cstr`](Self::put_cstr) but leaves `reserve` bytes free for
    /// the terminators of strings that follow.
    pub fn put_cstr_within(&mut self, s: &str, reserve: usize) -> &mut Self {
        let room = self.remaining();
        if room <= reserve {
            return self;
        }
        let bytes = nul_free(s);
        let take = bytes.len().min(room - reserve - 1);
        let _ = self.buf.extend_from_slice(&bytes[..take]);
        let _ = self.buf.push(0);
        self
    }

    /// Returns the finished datagram.
    pub fn finish(self) -> Datagram {
        self.buf
    }
}

/// A command received from (or sent by) the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List all registered categories.
    List {
        /// Correlation id echoed in every response.
        id: u32,
    },
    /// Enable or disable every category matching both patterns.
    Toggle {
        /// Correlation id echoed in the response.
        id: u32,
        /// New enabled state.
        enable: bool,
        /// Module pattern, empty matches any.
        module: String,
        /// Category pattern, empty matches any.
        category: String,
    },
}

impl Command {
    /// Correlation id of the command.
    pub fn id(&self) -> u32 {
        match self {
            Self::List { id } | Self::Toggle { id, .. } => *id,
        }
    }

    /// Encodes the command.
    pub fn encode(&self) -> Datagram {
        let mut w = DatagramWriter::new(TAG_COMMAND);
        match self {
            Self::List { id } => {
                w.put_u32(*id).put_u8(Subcommand::List as u8);
            }
            Self::Toggle {
                id,
                enable,
                module,
                category,
            } => {
                w.put_u32(*id)
                    .put_u8(Subcommand::Toggle as u8)
                    .put_u8(u8::from(*enable))
                    .put_cstr_within(module, 1)
                    .put_cstr(category);
            }
        }
        w.finish()
    }

    /// Decodes a command datagram. Malformed input yields `None`.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < COMMAND_MIN_LEN || datagram[0] != TAG_COMMAND {
            return None;
        }
        let id = read_u32(&datagram[1..5]);
        match Subcommand::from_u8(datagram[5])? {
            Subcommand::List => Some(Self::List { id }),
            Subcommand::Toggle => {
                if datagram.len() < TOGGLE_MIN_LEN {
                    return None;
                }
                let enable = datagram[6] != 0;
                let (module, rest) = split_cstr(&datagram[7..])?;
                let (category, _) = split_cstr(rest)?;
                Some(Self::Toggle {
                    id,
                    enable,
                    module: module.into_owned(),
                    category: category.into_owned(),
                })
            }
        }
    }
}

/// A response produced by the remote channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// One registered category (reply to [`Command::List`]).
    Category {
        /// Correlation id of the list command.
        id: u32,
        /// Current enabled state.
        enabled: bool,
        /// Category name, possibly truncated.
        category: String,
        /// Module name, possibly truncated.
        module: String,
    },
    /// Result of a [`Command::Toggle`].
    Toggled {
        /// Correlation id of the toggle command.
        id: u32,
        /// Number of categories whose state changed.
        modified: u32,
    },
}

impl Response {
    /// Correlation id of the response.
    pub fn id(&self) -> u32 {
        match self {
            Self::Category { id, .. } | Self::Toggled { id, .. } => *id,
        }
    }

    /// Encodes a category listing entry without building an owned response.
    pub fn encode_category(id: u32, enabled: bool, category: &str, module: &str) -> Datagram {
        let mut w = DatagramWriter::new(TAG_RESPONSE);
        w.put_u32(id)
            .put_u8(Subcommand::List as u8)
            .put_u8(u8::from(enabled))
            .put_cstr_within(category, 1)
            .put_cstr(module);
        w.finish()
    }

    /// Encodes a toggle result.
    pub fn encode_toggled(id: u32, modified: u32) -> Datagram {
        let mut w = DatagramWriter::new(TAG_RESPONSE);
        w.put_u32(id)
            .put_u8(Subcommand::Toggle as u8)
            .put_u32(modified);
        w.finish()
    }

    /// Encodes the response.
    pub fn encode(&self) -> Datagram {
        match self {
            Self::Category {
                id,
                enabled,
                category,
                module,
            } => Self::encode_category(*id, *enabled, category, module),
            Self::Toggled { id, modified } => Self::encode_toggled(*id, *modified),
        }
    }

    /// Decodes a response datagram. Malformed input yields `None`.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < COMMAND_MIN_LEN || datagram[0] != TAG_RESPONSE {
            return None;
        }
        let id = read_u32(&datagram[1..5]);
        match Subcommand::from_u8(datagram[5])? {
            Subcommand::List => {
                if datagram.len() < CATEGORY_RESPONSE_MIN_LEN {
                    return None;
                }
                let enabled = datagram[6] != 0;
                let (category, rest) = split_cstr(&datagram[7..])?;
                let (module, _) = split_cstr(rest)?;
                Some(Self::Category {
                    id,
                    enabled,
                    category: category.into_owned(),
                    module: module.into_owned(),
                })
            }
            Subcommand::Toggle => {
                if datagram.len() < TOGGLE_RESPONSE_LEN {
                    return None;
                }
                Some(Self::Toggled {
                    id,
                    modified: read_u32(&datagram[6..10]),
                })
            }
        }
    }
}

/// Encodes a mirrored trace line.
pub fn encode_trace(header: &RecordHeader<'_>, payload: &[u8]) -> Datagram {
    let mut w = DatagramWriter::new(TAG_TRACE);
    w.put_u64(header.timestamp)
        .put_u32(header.line)
        .put_cstr_within(header.file, 3)
        .put_cstr_within(header.module, 2)
        .put_cstr_within(header.category, 1)
        .put_cstr(header.class)
        .put_bytes(payload);
    w.finish()
}

/// A mirrored trace line decoded by the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine<'a> {
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
    /// Payload bytes.
    pub payload: &'a [u8],
}

impl<'a> TraceLine<'a> {
    /// Decodes a `'T'` datagram. Malformed input yields `None`.
    pub fn decode(datagram: &'a [u8]) -> Option<Self> {
        if datagram.len() < TRACE_MIN_LEN || datagram[0] != TAG_TRACE {
            return None;
        }
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&datagram[1..9]);
        let line = read_u32(&datagram[9..13]);

        let (file, rest) = split_cstr(&datagram[13..])?;
        let (module, rest) = split_cstr(rest)?;
        let (category, rest) = split_cstr(rest)?;
        let (class, payload) = split_cstr(rest)?;

        Some(Self {
            timestamp: u64::from_be_bytes(timestamp),
            line,
            file,
            module,
            category,
            class,
            payload,
        })
    }
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(raw)
}
