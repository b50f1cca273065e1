//! Fuzzes the checksum routines over arbitrary input.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_checksums
#![no_main]
use libfuzzer_sys::fuzz_target;
use tracklink_checksum::{crc16, crc32_ieee};

fuzz_target!(|data: &[u8]| {
    let _ = crc16(data);
    let _ = crc32_ieee(data);
});
