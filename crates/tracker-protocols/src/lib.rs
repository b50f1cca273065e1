//! Wire protocol decoders for tracklink.
//!
//! Each decoder owns the [`DeviceSession`](tracklink_core::DeviceSession) of
//! one connection and turns raw frames into
//! [`DecodeOutcome`](tracklink_core::DecodeOutcome)s. Decoders never panic on
//! malformed input; every slice access is bounds-checked.
//!
//! ## Modules
//! - `avl` - binary AVL, codec 8 and codec 8 extended
//! - `gryphon_pro` - Gryphon-Pro binary frames with CRC-32
//! - `gryphon_m01` - Gryphon-M01 HTTP-style forms
//! - `wialon` - Wialon IPS text and Retranslator hex frames
//! - `coords`, `text`, `time` - field helpers shared by the decoders

#![deny(static_mut_refs)]

pub mod avl;
pub mod coords;
pub mod gryphon_m01;
pub mod gryphon_pro;
pub mod text;
pub mod time;
pub mod wialon;

pub use avl::AvlDecoder;
pub use gryphon_m01::GryphonM01Decoder;
pub use gryphon_pro::GryphonProDecoder;
pub use wialon::WialonDecoder;

use tracklink_core::{DecoderConfig, ProtocolDecoder, ProtocolKind};

/// Build a fresh decoder for one connection on a port bound to `kind`.
pub fn decoder_for(kind: ProtocolKind, config: DecoderConfig) -> Box<dyn ProtocolDecoder> {
    match kind {
        ProtocolKind::Codec8 => Box::new(AvlDecoder::codec8(config)),
        ProtocolKind::Codec8Extended => Box::new(AvlDecoder::codec8_extended(config)),
        ProtocolKind::GryphonPro => Box::new(GryphonProDecoder::new(config)),
        ProtocolKind::GryphonM01 => Box::new(GryphonM01Decoder::new(config)),
        ProtocolKind::Wialon => Box::new(WialonDecoder::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_matching_kind() {
        for kind in ProtocolKind::ALL {
            let decoder = decoder_for(kind, DecoderConfig::default());
            assert_eq!(decoder.kind(), kind);
            assert_eq!(decoder.session().protocol(), kind);
            assert!(decoder.device_name().is_none());
        }
    }

    #[test]
    fn test_bad_frame_markers() {
        let marker = |kind| decoder_for(kind, DecoderConfig::default()).bad_frame_ack();
        assert_eq!(marker(ProtocolKind::Codec8), vec![0x00]);
        assert_eq!(marker(ProtocolKind::Codec8Extended), vec![0x00]);
        assert_eq!(marker(ProtocolKind::GryphonPro), vec![0xAA, 0x14, 0xFF, 0x15]);
        assert_eq!(marker(ProtocolKind::GryphonM01), b"ok;".to_vec());
        assert_eq!(marker(ProtocolKind::Wialon), vec![0x00]);
    }
}
