//! Fuzzes the binary AVL codec 8 decoder, before and after the handshake.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_avl_codec8
#![no_main]
use libfuzzer_sys::fuzz_target;
use tracklink_core::{DecoderConfig, ProtocolDecoder};
use tracklink_protocols::AvlDecoder;

fuzz_target!(|data: &[u8]| {
    let mut decoder = AvlDecoder::codec8(DecoderConfig::default());
    let _ = decoder.decode(data);
    let _ = decoder.decode(&[0x00, 0x04, b'F', b'U', b'Z', b'Z']);
    let _ = decoder.decode(data);
});
