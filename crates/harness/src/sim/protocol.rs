//! Memory-access channel wire format.
//!
//! Every request starts with a fixed 24-byte little-endian header; the first
//! `u64` selects the opcode:
//!
//! * `READ`  (0) — `[op:u64][addr:u64][len:u64]`; the peer answers with
//!   exactly `len` raw bytes on the response pipe.
//! * `WRITE` (1) — `[op:u64][addr:u64][len:u64]`, followed immediately by
//!   `len` payload bytes on the request pipe; no response.
//! * `POLL`  (2) — `[op:u64][addr:u64][mask:u32][expected:u32]`; the peer
//!   answers with the final masked word (4 bytes, little-endian) once it
//!   observes `(value_at(addr) & mask) == expected`.
//!
//! The format is unversioned and carries no magic number; both ends are
//! built from this crate and deployed together.

use crate::error::ChannelError;

/// Size of every request header in bytes.
pub const HEADER_LEN: usize = 24;

/// Size of a poll response in bytes.
pub const POLL_RESPONSE_LEN: usize = 4;

/// Opcode word for a memory read.
pub const OP_READ: u64 = 0;
/// Opcode word for a memory write.
pub const OP_WRITE: u64 = 1;
/// Opcode word for a conditional poll.
pub const OP_POLL: u64 = 2;

/// One decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Read `len` bytes starting at `addr`.
    Read {
        /// Start address in the simulation's address space.
        addr: u64,
        /// Number of bytes to return.
        len: u64,
    },
    /// Write `len` payload bytes starting at `addr`.
    Write {
        /// Start address in the simulation's address space.
        addr: u64,
        /// Number of payload bytes that follow the header.
        len: u64,
    },
    /// Block until the masked word at `addr` matches `expected`.
    Poll {
        /// Address of the watched 32-bit word.
        addr: u64,
        /// Bits of the word that participate in the comparison.
        mask: u32,
        /// Value the masked word must reach.
        expected: u32,
    },
}

impl Request {
    /// Encodes the request into its wire header.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        match *self {
            Self::Read { addr, len } => {
                buf[0..8].copy_from_slice(&OP_READ.to_le_bytes());
                buf[8..16].copy_from_slice(&addr.to_le_bytes());
                buf[16..24].copy_from_slice(&len.to_le_bytes());
            }
            Self::Write { addr, len } => {
                buf[0..8].copy_from_slice(&OP_WRITE.to_le_bytes());
                buf[8..16].copy_from_slice(&addr.to_le_bytes());
                buf[16..24].copy_from_slice(&len.to_le_bytes());
            }
            Self::Poll {
                addr,
                mask,
                expected,
            } => {
                buf[0..8].copy_from_slice(&OP_POLL.to_le_bytes());
                buf[8..16].copy_from_slice(&addr.to_le_bytes());
                buf[16..20].copy_from_slice(&mask.to_le_bytes());
                buf[20..24].copy_from_slice(&expected.to_le_bytes());
            }
        }
        buf
    }

    /// Decodes a wire header.
    pub fn decode(header: &[u8; HEADER_LEN]) -> Result<Self, ChannelError> {
        let op = word(header, 0);
        let addr = word(header, 8);
        match op {
            OP_READ => Ok(Self::Read {
                addr,
                len: word(header, 16),
            }),
            OP_WRITE => Ok(Self::Write {
                addr,
                len: word(header, 16),
            }),
            OP_POLL => Ok(Self::Poll {
                addr,
                mask: half(header, 16),
                expected: half(header, 20),
            }),
            other => Err(ChannelError::Protocol(format!("unknown opcode {other}"))),
        }
    }
}

fn word(buf: &[u8; HEADER_LEN], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn half(buf: &[u8; HEADER_LEN], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}
