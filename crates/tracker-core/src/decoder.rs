//! The capability every wire protocol implements.

use crate::outcome::DecodeOutcome;
use crate::session::{DeviceSession, ProtocolKind};
use crate::validator::{DEFAULT_MIN_SATELLITES, RecordValidator};

/// Settings shared by all decoders, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub min_satellites: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_satellites: DEFAULT_MIN_SATELLITES,
        }
    }
}

impl DecoderConfig {
    pub fn validator(&self) -> RecordValidator {
        RecordValidator::new(self.min_satellites)
    }
}

/// One decoder instance is bound to one connection and owns its session.
///
/// `decode` is synchronous, CPU-only and must not panic on any input. After
/// each call, [`ProtocolDecoder::ack`] holds the bytes to write back.
pub trait ProtocolDecoder: Send {
    fn kind(&self) -> ProtocolKind;
    fn session(&self) -> &DeviceSession;
    fn decode(&mut self, frame: &[u8]) -> DecodeOutcome;
    fn handshake_ack(&self) -> Vec<u8>;
    fn bad_frame_ack(&self) -> Vec<u8>;

    fn ack(&self) -> &[u8] {
        &self.session().ack
    }

    fn device_name(&self) -> Option<&str> {
        self.session().name()
    }
}
