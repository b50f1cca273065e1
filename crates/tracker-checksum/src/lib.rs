//! Checksums used by the tracker wire protocols.
//!
//! - [`crc16`]: CRC-16/IBM (reflected polynomial `0xA001`, init `0x0000`), the
//!   trailer checksum of Binary-AVL data frames.
//! - [`crc32_ieee`]: CRC-32/IEEE, used by the Gryphon-Pro frame check.
//!
//! Both functions are total: they are defined for every byte slice, including
//! the empty one, and never fail.

#![deny(static_mut_refs)]

/// Reflected form of the IBM polynomial `x^16 + x^15 + x^2 + 1`.
pub const CRC16_IBM_POLY: u16 = 0xA001;

/// Compute the CRC-16/IBM checksum of `data`.
///
/// ```
/// assert_eq!(tracklink_checksum::crc16(b"123456789"), 0xBB3D);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_IBM_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Compute the CRC-32/IEEE checksum of `data`.
///
/// ```
/// assert_eq!(tracklink_checksum::crc32_ieee(b"123456789"), 0xCBF4_3926);
/// ```
pub fn crc32_ieee(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
