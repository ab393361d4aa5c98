//! Wire-level helpers for the TouchController proxy protocol
//!
//! All multi-byte fields on the wire are big-endian, regardless of host
//! architecture. The conversion functions return values whose in-memory
//! byte order already matches the wire, so callers serialize them with
//! `to_ne_bytes()`.
//!
//! The transfer helpers are the only code in this crate that performs
//! stream I/O. They guarantee all-or-nothing transfers, so a frame can
//! never be split by a short write or an interrupted call.

use std::io::{self, Read, Write};

/// Result of a [`read_fully`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The buffer was filled completely.
    Filled,
    /// The peer closed the stream before any byte was read.
    Eof,
}

/// Reinterprets the IEEE-754 bit pattern of `f` as a `u32` in wire byte
/// order.
///
/// Exact inverse of [`wire_to_float`]: NaN payload bits and negative zero
/// survive the round trip unchanged.
pub fn float_to_wire(f: f32) -> u32 {
    f.to_bits().to_be()
}

/// Converts a wire-order `u32` back to the float it encodes.
pub fn wire_to_float(u: u32) -> f32 {
    f32::from_bits(u32::from_be(u))
}

/// Converts a signed 32-bit value to wire byte order, preserving the
/// two's-complement bit pattern.
pub fn int_to_wire(v: i32) -> u32 {
    (v as u32).to_be()
}

/// Inverse of [`int_to_wire`].
pub fn wire_to_int(u: u32) -> i32 {
    u32::from_be(u) as i32
}

/// Writes all of `buf` to `w`, looping on short writes and retrying when
/// the underlying call is interrupted by a signal.
///
/// Never returns `Ok` having written only part of the buffer.
pub fn write_fully<W: Write>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match w.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting bytes mid-frame",
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fills `buf` completely from `r`, retrying interrupted calls.
///
/// Returns [`ReadOutcome::Eof`] if the stream ended before the first byte
/// was read (a graceful disconnect between frames). EOF after at least one
/// byte means a truncated frame and is reported as
/// [`io::ErrorKind::UnexpectedEof`].
pub fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::Eof),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended mid-frame",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(ReadOutcome::Filled)
}
