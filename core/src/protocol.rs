//! Event messages and framing for the TouchController proxy protocol
//!
//! A frame is one opcode byte followed by the payload fields of that
//! event, each field converted to wire byte order independently. The
//! protocol is strictly one-directional (launcher -> mod); there is no
//! response framing.
//!
//! Opcode assignment is a contract shared with the TouchController mod
//! and must not change:
//!
//! | Opcode | Event         | Payload                          | Frame |
//! |--------|---------------|----------------------------------|-------|
//! | 0      | AddPointer    | i32 index, f32 x, f32 y          | 13 B  |
//! | 1      | RemovePointer | i32 index                        | 5 B   |
//! | 2      | ClearPointer  | (none)                           | 1 B   |
//! | 3      | MoveView      | u8 screen_based, f32 pitch, f32 yaw | 10 B |

use std::io::{self, Read};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::{Deserialize, Serialize};

use crate::wire::{self, ReadOutcome};

/// Frame opcodes, shared with the game-side mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    AddPointer = 0,
    RemovePointer = 1,
    ClearPointer = 2,
    MoveView = 3,
}

/// One touch or camera event, as forwarded to the mod.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TouchEvent {
    /// A pointer went down or moved to a new position.
    AddPointer { index: i32, x: f32, y: f32 },
    /// A pointer was lifted.
    RemovePointer { index: i32 },
    /// All pointers were lifted.
    ClearPointer,
    /// Relative camera rotation.
    MoveView {
        screen_based: bool,
        delta_pitch: f32,
        delta_yaw: f32,
    },
}

impl TouchEvent {
    /// Returns the opcode for this event.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::AddPointer { .. } => Opcode::AddPointer,
            Self::RemovePointer { .. } => Opcode::RemovePointer,
            Self::ClearPointer => Opcode::ClearPointer,
            Self::MoveView { .. } => Opcode::MoveView,
        }
    }

    /// Serializes the event into a complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(13);
        frame.push(self.opcode() as u8);
        match *self {
            Self::AddPointer { index, x, y } => {
                push_i32(&mut frame, index);
                push_f32(&mut frame, x);
                push_f32(&mut frame, y);
            }
            Self::RemovePointer { index } => push_i32(&mut frame, index),
            Self::ClearPointer => (),
            Self::MoveView {
                screen_based,
                delta_pitch,
                delta_yaw,
            } => {
                frame.push(u8::from(screen_based));
                push_f32(&mut frame, delta_pitch);
                push_f32(&mut frame, delta_yaw);
            }
        }
        frame
    }

    /// Reads and decodes one frame.
    ///
    /// Returns `None` when the stream ends cleanly at a frame boundary.
    /// An unknown opcode or a stream ending mid-frame is an error.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let mut op = [0_u8; 1];
        if wire::read_fully(r, &mut op)? == ReadOutcome::Eof {
            return Ok(None);
        }
        let opcode = Opcode::from_u8(op[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown opcode {:#04x}", op[0]),
            )
        })?;

        let event = match opcode {
            Opcode::AddPointer => Self::AddPointer {
                index: read_i32(r)?,
                x: read_f32(r)?,
                y: read_f32(r)?,
            },
            Opcode::RemovePointer => Self::RemovePointer {
                index: read_i32(r)?,
            },
            Opcode::ClearPointer => Self::ClearPointer,
            Opcode::MoveView => Self::MoveView {
                screen_based: read_u8(r)? != 0,
                delta_pitch: read_f32(r)?,
                delta_yaw: read_f32(r)?,
            },
        };
        Ok(Some(event))
    }
}

fn push_i32(frame: &mut Vec<u8>, v: i32) {
    // Already wire order, so native bytes go out as-is
    frame.extend_from_slice(&wire::int_to_wire(v).to_ne_bytes());
}

fn push_f32(frame: &mut Vec<u8>, f: f32) {
    frame.extend_from_slice(&wire::float_to_wire(f).to_ne_bytes());
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0_u8; 1];
    read_field(r, &mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0_u8; 4];
    read_field(r, &mut buf)?;
    Ok(wire::wire_to_int(u32::from_ne_bytes(buf)))
}

fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut buf = [0_u8; 4];
    read_field(r, &mut buf)?;
    Ok(wire::wire_to_float(u32::from_ne_bytes(buf)))
}

/// Like [`wire::read_fully`], but EOF inside a payload is always a
/// truncated frame.
fn read_field<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    match wire::read_fully(r, buf)? {
        ReadOutcome::Filled => Ok(()),
        ReadOutcome::Eof => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended mid-frame",
        )),
    }
}
