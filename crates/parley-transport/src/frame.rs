//! Wire framing.
//!
//! Each unit on the stream is a 4-byte big-endian word whose upper 16
//! bits are a fixed marker and whose lower 16 bits give the payload
//! length, followed by that many payload bytes. A partially received
//! frame blocks until the stream satisfies it.

use std::io::{Read, Write};

use crate::error::TransportError;

/// Upper 16 bits of every frame's length word.
pub const FRAME_MARKER: u32 = 0xffff_0000;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = 0xffff;

/// Send one frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::Protocol(format!(
            "payload of {} bytes exceeds frame limit",
            payload.len()
        )));
    }
    let word = FRAME_MARKER | payload.len() as u32;
    writer.write_all(&word.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Receive one frame, blocking until it is complete.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut word_bytes = [0u8; 4];
    reader.read_exact(&mut word_bytes)?;
    let word = u32::from_be_bytes(word_bytes);
    if word & FRAME_MARKER != FRAME_MARKER {
        return Err(TransportError::Protocol("bad frame marker".into()));
    }
    let length = (word & 0xffff) as usize;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
