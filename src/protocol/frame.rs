//! Marker-delimited framing on top of byte stuffing.

use std::io::{BufRead, ErrorKind, Read, Write};

use tracing::{trace, warn};

use super::stuffing::{decode, encode_into};
use super::{END_MARKER, MAX_FRAME_SCAN, MAX_PACKAGE_LEN, START_MARKER};
use crate::error::{hex_tail, FrameError};

/// Number of trailing bytes quoted in framing errors.
const CONTEXT_BYTES: usize = 16;

/// Consecutive empty reads tolerated once a frame has started.
const MID_FRAME_IDLE_READS: usize = 2;

/// Build the complete on-wire frame for `payload`.
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + payload.len() / 16 + 2);
    frame.push(START_MARKER);
    encode_into(payload, &mut frame);
    frame.push(END_MARKER);
    frame
}

/// Write one frame as a single unit and flush it.
pub fn send_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let frame = build_frame(payload);
    trace!("sending frame: {}", hex_tail(&frame, frame.len()));
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read the next frame with the default scan limit.
pub fn receive_frame<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    receive_frame_limited(reader, MAX_FRAME_SCAN)
}

/// Read the next frame, giving up on a marker after `max_size` bytes.
///
/// Anything before the start marker is discarded. Returns
/// [`FrameError::Idle`] when the channel produced no bytes at all.
pub fn receive_frame_limited<R: BufRead>(
    reader: &mut R,
    max_size: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut skipped = Vec::new();
    match scan_until(reader, START_MARKER, max_size, &mut skipped)? {
        Scan::Found => {}
        Scan::Idle if skipped.is_empty() => return Err(FrameError::Idle),
        Scan::Idle | Scan::Limit => {
            return Err(FrameError::NoStartMarker {
                read: skipped.len(),
                tail: hex_tail(&skipped, CONTEXT_BYTES),
            })
        }
    }
    if !skipped.is_empty() {
        warn!(
            "discarded {} bytes before start marker: {}",
            skipped.len(),
            hex_tail(&skipped, CONTEXT_BYTES)
        );
    }

    // A slow link may pause mid-frame, even right after the start marker
    let mut body = Vec::new();
    let mut quiet_reads = 0;
    loop {
        let before = body.len();
        let remaining = max_size.saturating_sub(body.len());
        match scan_until(reader, END_MARKER, remaining, &mut body)? {
            Scan::Found => break,
            Scan::Idle if body.len() < max_size => {
                quiet_reads = if body.len() > before { 0 } else { quiet_reads + 1 };
                if quiet_reads < MID_FRAME_IDLE_READS {
                    continue;
                }
            }
            Scan::Idle | Scan::Limit => {}
        }
        return Err(FrameError::NoEndMarker {
            read: body.len(),
            tail: hex_tail(&body, CONTEXT_BYTES),
        });
    }

    // A start marker inside the body means the previous frame lost its end marker
    if let Some(pos) = body.iter().rposition(|&b| b == START_MARKER) {
        warn!("dropping {} bytes of an unterminated frame", pos);
        body.drain(..=pos);
    }

    let payload = decode(&body)?;
    if payload.len() > MAX_PACKAGE_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PACKAGE_LEN,
        });
    }
    trace!("received frame payload: {}", hex_tail(&payload, payload.len()));
    Ok(payload)
}

enum Scan {
    Found,
    Limit,
    Idle,
}

/// Append bytes to `buf` up to `marker` (which is consumed but not kept).
fn scan_until<R: BufRead>(
    reader: &mut R,
    marker: u8,
    limit: usize,
    buf: &mut Vec<u8>,
) -> Result<Scan, FrameError> {
    let start = buf.len();
    let result = reader.by_ref().take(limit as u64).read_until(marker, buf);
    match result {
        Ok(_) if buf.len() > start && buf.last() == Some(&marker) => {
            buf.pop();
            Ok(Scan::Found)
        }
        Ok(n) if n >= limit => Ok(Scan::Limit),
        // EOF
        Ok(_) => Ok(Scan::Idle),
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(Scan::Idle),
        Err(e) => Err(e.into()),
    }
}
