//! Self-delimiting variable-length integer encoding.
//!
//! Every length prefix in the wire format uses this codec: block lengths,
//! list element counts, and per-element lengths. The number of leading zeros
//! in the first byte gives the number of continuation bytes, so the total
//! byte count is recoverable from the first byte alone. Decoding rejects
//! non-minimal encodings.

use crate::error::{Error, Result};

/// Longest possible encoding: a full u64 takes a prefix byte plus 8 bytes.
pub const MAX_LEN: usize = 9;

/// Number of bytes needed to encode `n`. Monotonic non-decreasing in `n`.
pub fn determine_length(n: u64) -> usize {
    match n {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        0x1000_0000..=0x07_FFFF_FFFF => 5,
        0x08_0000_0000..=0x03FF_FFFF_FFFF => 6,
        0x0400_0000_0000..=0x0001_FFFF_FFFF_FFFF => 7,
        0x0002_0000_0000_0000..=0x00FF_FFFF_FFFF_FFFF => 8,
        _ => 9,
    }
}

/// Append the encoding of `n` onto a byte vector.
pub fn write(buf: &mut Vec<u8>, n: u64) {
    let len = determine_length(n);
    if len == MAX_LEN {
        buf.push(0x00);
        buf.extend_from_slice(&n.to_be_bytes());
        return;
    }
    // The prefix byte carries a single marker bit followed by the most
    // significant value bits; continuation bytes are big-endian.
    let marker = 0x80u8 >> (len - 1);
    buf.push(marker | (n >> (8 * (len - 1))) as u8);
    for i in (0..len - 1).rev() {
        buf.push((n >> (8 * i)) as u8);
    }
}

/// Number of bytes the varint starting at `buf[0]` occupies, judged from the
/// first byte alone. Fails if the buffer is empty.
pub fn decode_length(buf: &[u8]) -> Result<usize> {
    let first = *buf.first().ok_or(Error::LengthTooShort {
        step: "decode varint length",
        actual: 0,
        expected: 1,
    })?;
    Ok(first.leading_zeros() as usize + 1)
}

/// Decode the varint at the start of `buf`, returning the value and the
/// number of bytes consumed. Fails on short buffers and on non-minimal
/// encodings.
pub fn decode_value(buf: &[u8]) -> Result<(u64, usize)> {
    let len = decode_length(buf)?;
    if buf.len() < len {
        return Err(Error::LengthTooShort {
            step: "decode varint value",
            actual: buf.len(),
            expected: len,
        });
    }
    let n = if len == MAX_LEN {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[1..9]);
        u64::from_be_bytes(raw)
    } else {
        let marker = 0x80u8 >> (len - 1);
        let mut n = (buf[0] & (marker - 1)) as u64;
        for &b in &buf[1..len] {
            n = (n << 8) | b as u64;
        }
        n
    };
    if determine_length(n) != len {
        return Err(Error::BadEncode(format!(
            "Varint {} encoded in {} bytes. This is not the shortest encoding.",
            n, len
        )));
    }
    Ok((n, len))
}
