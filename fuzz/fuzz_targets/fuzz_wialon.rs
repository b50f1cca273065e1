//! Fuzzes both Wialon dialects: raw input, then the same bytes as an IPS
//! frame.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_wialon
#![no_main]
use libfuzzer_sys::fuzz_target;
use tracklink_core::{DecoderConfig, ProtocolDecoder};
use tracklink_protocols::WialonDecoder;
use tracklink_protocols::wialon::parse_ips_record;

fuzz_target!(|data: &[u8]| {
    let mut decoder = WialonDecoder::new(DecoderConfig::default());
    let _ = decoder.decode(data);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_ips_record(text);
        let _ = decoder.decode(format!("#D#{text}\r\n").as_bytes());
    }
});
