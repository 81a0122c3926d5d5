// LEB128 varints: unsigned for frame numbers, zig-zag signed for demo payloads.
// Output buffers are sized from `uvarint_len`, never from a fixed 8-byte guess.

use bytes::BufMut;

/// Longest encoding of a u64: ceil(64 / 7) bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `put_uvarint` writes for `value`.
pub fn uvarint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

pub fn varint_len(value: i64) -> usize {
    uvarint_len(zigzag(value))
}

pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decodes a varint from the front of `data`.
/// Returns the value and the number of bytes consumed, or `None` when the
/// input is empty, truncated, or overflows 64 bits.
pub fn get_uvarint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return None;
        }
        // The tenth byte may only carry the single remaining bit.
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return None;
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte < 0x80 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

pub fn put_varint(buf: &mut impl BufMut, value: i64) {
    put_uvarint(buf, zigzag(value));
}

pub fn get_varint(data: &[u8]) -> Option<(i64, usize)> {
    let (raw, n) = get_uvarint(data)?;
    Some((unzigzag(raw), n))
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(raw: u64) -> i64 {
    ((raw >> 1) as i64) ^ -((raw & 1) as i64)
}
