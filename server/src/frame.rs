//! Response framing: `[payload size: u32 LE][id: u32 LE][payload]`.
//!
//! Frames are self-identifying, so responses for different requests can
//! share one output stream in any order.

use std::io::{self, Read, Write};

/// Bytes before the payload: size then id.
pub const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub id: u32,
    pub payload: Vec<u8>,
}

/// Write one frame and flush so a reader can consume it right away.
pub fn write_frame(mut w: impl Write, id: u32, payload: &[u8]) -> io::Result<()> {
    let size = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a frame", payload.len()),
        )
    })?;

    let mut header = [0u8; FRAME_HEADER_LEN];
    header[..4].copy_from_slice(&size.to_le_bytes());
    header[4..].copy_from_slice(&id.to_le_bytes());

    w.write_all(&header)?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` on end of input at a frame boundary; a frame
/// cut short is an `UnexpectedEof` error.
pub fn read_frame(mut r: impl Read) -> io::Result<Option<ResponseFrame>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match r.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated frame header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let id = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let mut payload = vec![0u8; size];
    r.read_exact(&mut payload)?;
    Ok(Some(ResponseFrame { id, payload }))
}
