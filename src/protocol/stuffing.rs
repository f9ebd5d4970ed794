//! Byte stuffing: keeps the marker values out of frame interiors.

use super::SPECIAL_BYTE;
use crate::error::FrameError;

/// Escape every byte `>= SPECIAL_BYTE` as `[SPECIAL_BYTE, x - SPECIAL_BYTE]`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 16);
    encode_into(payload, &mut out);
    out
}

/// Same as [`encode`], appending to an existing buffer.
pub fn encode_into(payload: &[u8], out: &mut Vec<u8>) {
    for &x in payload {
        if x >= SPECIAL_BYTE {
            out.push(SPECIAL_BYTE);
            out.push(x - SPECIAL_BYTE);
        } else {
            out.push(x);
        }
    }
}

/// Reverse [`encode`].
///
/// The byte following an escape is added to `SPECIAL_BYTE` with wrapping
/// arithmetic, so a garbled escape still yields a byte rather than a panic.
pub fn decode(bytes: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().enumerate();
    while let Some((offset, &x)) = iter.next() {
        if x == SPECIAL_BYTE {
            let (_, &d) = iter.next().ok_or(FrameError::TruncatedEscape { offset })?;
            out.push(SPECIAL_BYTE.wrapping_add(d));
        } else {
            out.push(x);
        }
    }
    Ok(out)
}
