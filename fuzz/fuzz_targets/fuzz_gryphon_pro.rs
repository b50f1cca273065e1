//! Fuzzes the Gryphon-Pro decoder. The first byte picks the frame tag so the
//! GPS and event bodies are reached without guessing the tag.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_gryphon_pro
#![no_main]
use libfuzzer_sys::fuzz_target;
use tracklink_core::{DecoderConfig, ProtocolDecoder};
use tracklink_protocols::GryphonProDecoder;
use tracklink_protocols::gryphon_pro::{TAG_EVENTS, TAG_GPS, TAG_NAME};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let tag = match selector % 4 {
        0 => TAG_NAME,
        1 => TAG_GPS,
        2 => TAG_EVENTS,
        _ => {
            let mut decoder = GryphonProDecoder::new(DecoderConfig::default());
            let _ = decoder.decode(body);
            return;
        }
    };
    let mut frame = tag.to_vec();
    frame.extend_from_slice(body);

    let mut decoder = GryphonProDecoder::new(DecoderConfig::default());
    let _ = decoder.decode(&frame);
});
