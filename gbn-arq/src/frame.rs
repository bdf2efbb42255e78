//! What travels across a channel: one batch out, one verdict back.
//!
//! [`Transmission`] and [`Verdict`] are transport-agnostic.  The rest of this
//! module is the byte layout used by the TCP binding for text streams
//! (`T = char`); no I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Round Counter                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Attempt Id                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |         Payload Length        |  UTF-8 batch  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               +
//! |                              ...                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The reply is a single newline-terminated token: `RR\n` or `REJ\n`.

use std::fmt;
use std::str::FromStr;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// This batch reaches the end of the stream.
    pub const FINAL: u8 = 0b0000_0001;
}

/// Byte length of the fixed-size header on the wire.
/// counter(4) + attempt(4) + flags(1) + payload_len(2)
pub const HEADER_LEN: usize = 11;

const OFF_COUNTER: usize = 0;
const OFF_ATTEMPT: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_PAYLOAD_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Transmission / Verdict
// ---------------------------------------------------------------------------

/// One round's batch as handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission<T> {
    /// The sender's 1-based round counter.
    pub counter: u32,
    /// Unique per send; a retry of the same round gets a fresh id.
    pub attempt: u32,
    /// `true` when this batch reaches the end of the stream.
    pub is_final: bool,
    pub batch: Vec<T>,
}

/// The receiver's answer for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Receive-ready: the batch was appended (or was already held).
    Accepted,
    /// The batch was refused; the sender must resend it.
    Rejected,
}

impl Verdict {
    /// Token written on the wire and in round logs.
    pub fn token(self) -> &'static str {
        match self {
            Verdict::Accepted => "RR",
            Verdict::Rejected => "REJ",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Verdict {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_end_matches(&['\r', '\n'][..]) {
            "RR" => Ok(Verdict::Accepted),
            "REJ" => Ok(Verdict::Rejected),
            other => Err(FrameError::UnknownVerdict(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Fixed-size frame header, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub counter: u32,
    pub attempt: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Length of the UTF-8 payload in bytes.
    pub payload_len: u16,
}

impl Header {
    pub fn is_final(&self) -> bool {
        self.flags & flags::FINAL != 0
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        let be32 = |off: usize| {
            u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
        };
        Self {
            counter: be32(OFF_COUNTER),
            attempt: be32(OFF_ATTEMPT),
            flags: buf[OFF_FLAGS],
            payload_len: u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]),
        }
    }
}

// ---------------------------------------------------------------------------
// Text codec
// ---------------------------------------------------------------------------

/// Serialise a text batch into header + UTF-8 payload.
pub fn encode(tx: &Transmission<char>) -> Result<Vec<u8>, FrameError> {
    let payload: String = tx.batch.iter().collect();
    let payload_len =
        u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;

    let mut buf = vec![0u8; HEADER_LEN + payload.len()];
    buf[OFF_COUNTER..OFF_COUNTER + 4].copy_from_slice(&tx.counter.to_be_bytes());
    buf[OFF_ATTEMPT..OFF_ATTEMPT + 4].copy_from_slice(&tx.attempt.to_be_bytes());
    buf[OFF_FLAGS] = if tx.is_final { flags::FINAL } else { 0 };
    buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2].copy_from_slice(&payload_len.to_be_bytes());
    buf[HEADER_LEN..].copy_from_slice(payload.as_bytes());
    Ok(buf)
}

/// Rebuild a [`Transmission`] from a decoded header and its payload bytes.
pub fn decode_payload(header: Header, payload: &[u8]) -> Result<Transmission<char>, FrameError> {
    if payload.len() != header.payload_len as usize {
        return Err(FrameError::LengthMismatch);
    }
    let text = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
    Ok(Transmission {
        counter: header.counter,
        attempt: header.attempt,
        is_final: header.is_final(),
        batch: text.chars().collect(),
    })
}

/// Parse a complete frame held in one buffer.
pub fn decode(buf: &[u8]) -> Result<Transmission<char>, FrameError> {
    let head: &[u8; HEADER_LEN] = buf
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(FrameError::BufferTooShort)?;
    decode_payload(Header::decode(head), &buf[HEADER_LEN..])
}

/// Errors that can arise when encoding or parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the fixed header size.
    BufferTooShort,
    /// `payload_len` field does not match the payload bytes.
    LengthMismatch,
    /// Payload bytes are not valid UTF-8.
    InvalidUtf8,
    /// Encoded batch does not fit the 16-bit length field.
    PayloadTooLarge(usize),
    /// Reply was neither `RR` nor `REJ`.
    UnknownVerdict(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BufferTooShort => write!(f, "buffer too short to contain a header"),
            FrameError::LengthMismatch => {
                write!(f, "payload_len field does not match remaining bytes")
            }
            FrameError::InvalidUtf8 => write!(f, "payload is not valid UTF-8"),
            FrameError::PayloadTooLarge(n) => {
                write!(f, "payload of {n} bytes exceeds the 16-bit length field")
            }
            FrameError::UnknownVerdict(t) => write!(f, "unknown verdict token {t:?}"),
        }
    }
}

impl std::error::Error for FrameError {}
