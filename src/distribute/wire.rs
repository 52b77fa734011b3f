//! Framed messages exchanged between the owner and its worker processes.
//!
//! Layout: one tag byte, then a tag-specific little-endian payload.
//!
//! | tag | message      | payload                          |
//! |-----|--------------|----------------------------------|
//! | 1   | `Dimensions` | `u32` width, `u32` height        |
//! | 2   | `Buffer`     | `u64` length, then `length` bytes |
//! | 3   | `Ack`        | `u32` rank                       |
//! | 4   | `Go`         | none                             |

use std::io::{Read, Write};

use crate::buffer::Dimensions;
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

const TAG_DIMENSIONS: u8 = 1;
const TAG_BUFFER: u8 = 2;
const TAG_ACK: u8 = 3;
const TAG_GO: u8 = 4;

/// Control messages. Buffers travel separately so receivers can read straight into their own
/// storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Dimensions(Dimensions),
    Ack(WorkerId),
    Go,
}

pub fn write_control(w: &mut impl Write, msg: Control) -> CrossfadeResult<()> {
    let res = match msg {
        Control::Dimensions(d) => w
            .write_all(&[TAG_DIMENSIONS])
            .and_then(|_| w.write_all(&d.width.to_le_bytes()))
            .and_then(|_| w.write_all(&d.height.to_le_bytes())),
        Control::Ack(rank) => w
            .write_all(&[TAG_ACK])
            .and_then(|_| w.write_all(&(rank.0 as u32).to_le_bytes())),
        Control::Go => w.write_all(&[TAG_GO]),
    };
    res.and_then(|_| w.flush())
        .map_err(|e| CrossfadeError::distribution(format!("failed to send {msg:?}: {e}")))
}

pub fn read_control(r: &mut impl Read) -> CrossfadeResult<Control> {
    let tag = read_tag(r)?;
    match tag {
        TAG_DIMENSIONS => {
            let width = read_u32(r)?;
            let height = read_u32(r)?;
            Ok(Control::Dimensions(
                Dimensions::new(width, height)
                    .map_err(|e| CrossfadeError::distribution(e.to_string()))?,
            ))
        }
        TAG_ACK => Ok(Control::Ack(WorkerId(read_u32(r)? as usize))),
        TAG_GO => Ok(Control::Go),
        TAG_BUFFER => Err(CrossfadeError::distribution(
            "expected a control message, got a buffer",
        )),
        other => Err(CrossfadeError::distribution(format!(
            "unknown message tag {other}"
        ))),
    }
}

pub fn write_buffer(w: &mut impl Write, bytes: &[u8]) -> CrossfadeResult<()> {
    w.write_all(&[TAG_BUFFER])
        .and_then(|_| w.write_all(&(bytes.len() as u64).to_le_bytes()))
        .and_then(|_| w.write_all(bytes))
        .and_then(|_| w.flush())
        .map_err(|e| CrossfadeError::distribution(format!("failed to send buffer: {e}")))
}

/// Read a buffer message into `dst`, whose length the receiver has already fixed from the
/// announced dimensions.
pub fn read_buffer_into(r: &mut impl Read, dst: &mut [u8]) -> CrossfadeResult<()> {
    let tag = read_tag(r)?;
    if tag != TAG_BUFFER {
        return Err(CrossfadeError::distribution(format!(
            "expected a buffer message, got tag {tag}"
        )));
    }
    let len = read_u64(r)?;
    if len != dst.len() as u64 {
        return Err(CrossfadeError::distribution(format!(
            "buffer size mismatch: announced {} bytes, received {len}",
            dst.len()
        )));
    }
    r.read_exact(dst)
        .map_err(|e| CrossfadeError::distribution(format!("truncated buffer: {e}")))
}

fn read_tag(r: &mut impl Read) -> CrossfadeResult<u8> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)
        .map_err(|e| CrossfadeError::distribution(format!("peer closed the stream: {e}")))?;
    Ok(tag[0])
}

fn read_u32(r: &mut impl Read) -> CrossfadeResult<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)
        .map_err(|e| CrossfadeError::distribution(format!("truncated message: {e}")))?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read) -> CrossfadeResult<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)
        .map_err(|e| CrossfadeError::distribution(format!("truncated message: {e}")))?;
    Ok(u64::from_le_bytes(b))
}
