//! Compressed integer encoding used inside records.
//!
//! Each octet carries 7 data bits plus a continuation bit (MSB); the least
//! significant group comes first. After eight groups the ninth octet holds
//! the remaining 8 bits verbatim, so any `u64` fits in at most 9 bytes.
//! Signed values are stored as their two's-complement `u64`.
//!
//! The padded form always spends 4 bytes (continuation forced on the first
//! three) so it can be overwritten in place once the real value is known.

use crate::{Error, Result};

/// Maximale kodierte Länge eines komprimierten `u64`.
pub const MAX_LEN: usize = 9;

/// Breite der gepaddeten Form in Bytes.
pub const PADDED_LEN: usize = 4;

/// Größter Wert, den die gepaddete Form darstellen kann (28 Datenbits).
pub const PADDED_MAX: u64 = (1 << 28) - 1;

/// Kodiert `value` in `buf` und liefert die Anzahl belegter Bytes.
#[inline]
pub fn encode(value: u64, buf: &mut [u8; MAX_LEN]) -> usize {
    if value < 0x80 {
        // Fast-Path: Single-Byte (häufigster Fall, Typ-IDs und kleine Größen)
        buf[0] = value as u8;
        return 1;
    }
    let mut v = value;
    for (i, slot) in buf.iter_mut().take(MAX_LEN - 1).enumerate() {
        if v < 0x80 {
            *slot = v as u8;
            return i + 1;
        }
        *slot = (v as u8 & 0x7F) | 0x80;
        v >>= 7;
    }
    // 9. Byte: volle 8 Bits
    buf[MAX_LEN - 1] = v as u8;
    MAX_LEN
}

/// Kodiert einen vorzeichenbehafteten Wert (Zweierkomplement).
#[inline]
pub fn encode_signed(value: i64, buf: &mut [u8; MAX_LEN]) -> usize {
    encode(value as u64, buf)
}

/// Hängt die komprimierte Form von `value` an `out` an.
pub fn push(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; MAX_LEN];
    let n = encode(value, &mut buf);
    out.extend_from_slice(&buf[..n]);
}

/// Anzahl Bytes, die `value` komprimiert belegt.
pub fn encoded_len(value: u64) -> usize {
    let mut buf = [0u8; MAX_LEN];
    encode(value, &mut buf)
}

/// Encodes `value` in the fixed 4-byte padded form.
pub fn encode_padded(value: u64) -> Result<[u8; PADDED_LEN]> {
    if value > PADDED_MAX {
        return Err(Error::PaddedValueTooLarge(value));
    }
    Ok([
        (value as u8 & 0x7F) | 0x80,
        ((value >> 7) as u8 & 0x7F) | 0x80,
        ((value >> 14) as u8 & 0x7F) | 0x80,
        (value >> 21) as u8 & 0x7F,
    ])
}

/// Decodes a compressed `u64`, pulling bytes from `next`.
///
/// Redundant continuation groups (as produced by the padded form) are
/// accepted; they simply contribute zero bits.
#[inline]
pub fn decode<E>(mut next: impl FnMut() -> core::result::Result<u8, E>) -> core::result::Result<u64, E> {
    let mut result = 0u64;
    for i in 0..(MAX_LEN - 1) {
        let byte = next()?;
        result |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    let last = next()?;
    Ok(result | (u64::from(last) << 56))
}

/// Decodes a compressed `u64` from the start of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` when
/// `data` ends in the middle of the value.
pub fn decode_slice(data: &[u8]) -> Option<(u64, usize)> {
    let mut pos = 0usize;
    let value = decode(|| {
        let byte = data.get(pos).copied().ok_or(())?;
        pos += 1;
        Ok::<u8, ()>(byte)
    })
    .ok()?;
    Some((value, pos))
}

/// Verengt einen dekodierten Wert auf `u32`.
pub fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::IntegerOverflow)
}
