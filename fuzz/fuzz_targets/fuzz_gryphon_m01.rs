//! Fuzzes the Gryphon-M01 form decoder and its sub-record parser.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_gryphon_m01
#![no_main]
use libfuzzer_sys::fuzz_target;
use tracklink_core::{DecoderConfig, ProtocolDecoder};
use tracklink_protocols::GryphonM01Decoder;
use tracklink_protocols::gryphon_m01::parse_sub_record;

fuzz_target!(|data: &[u8]| {
    let mut decoder = GryphonM01Decoder::new(DecoderConfig::default());
    let _ = decoder.decode(data);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_sub_record(text);
    }
});
