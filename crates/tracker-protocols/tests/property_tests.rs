//! Property-based tests for frame rejection and panic freedom.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tracklink_checksum::crc16;
use tracklink_core::{DecodeOutcome, DecoderConfig, ProtocolDecoder, ProtocolKind};
use tracklink_protocols::{AvlDecoder, decoder_for};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// One codec 8 record with no IO elements.
fn record_bytes(millis: u64, sats: u8) -> Vec<u8> {
    let mut out = millis.to_be_bytes().to_vec();
    out.push(0); // priority
    out.extend_from_slice(&[0; 8]); // lng, lat
    out.extend_from_slice(&[0; 4]); // altitude, angle
    out.push(sats);
    out.extend_from_slice(&[0, 0]); // speed
    out.extend_from_slice(&[0, 4, 0, 0, 0, 0]); // event id, class count, four empty classes
    out
}

fn codec8_payload(records: &[(u64, u8)]) -> Vec<u8> {
    let count = u8::try_from(records.len()).unwrap_or(u8::MAX);
    let mut payload = vec![0x08, count];
    for &(millis, sats) in records {
        payload.extend(record_bytes(millis, sats));
    }
    payload.push(count);
    payload
}

fn frame_with_length(payload: &[u8], declared: u32) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 0];
    out.extend_from_slice(&declared.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&crc16(payload).to_be_bytes());
    out
}

fn named_decoder() -> AvlDecoder {
    let mut decoder = AvlDecoder::codec8(DecoderConfig { min_satellites: 0 });
    decoder.decode_at(&[0x00, 0x04, b'T', b'E', b'S', b'T'], now());
    decoder
}

fn records_strategy() -> impl Strategy<Value = Vec<(u64, u8)>> {
    prop::collection::vec((1_600_000_000_000u64..1_700_000_000_000, any::<u8>()), 1..8)
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// A well-formed frame is accepted and acked with its record count.
    #[test]
    fn prop_well_formed_frame_is_acked(records in records_strategy()) {
        let payload = codec8_payload(&records);
        let declared = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        let mut decoder = named_decoder();

        let outcome = decoder.decode_at(&frame_with_length(&payload, declared), now());

        let batch = outcome.batch().cloned().unwrap_or_default();
        prop_assert_eq!(batch.len(), records.len());
        let count = u32::try_from(records.len()).unwrap_or(0);
        prop_assert_eq!(decoder.session().ack.clone(), count.to_be_bytes().to_vec());
    }

    /// Any declared length other than the payload length rejects the frame.
    #[test]
    fn prop_declared_length_mismatch_rejected(
        records in records_strategy(),
        delta in prop_oneof![-40i64..0, 1i64..40],
    ) {
        let payload = codec8_payload(&records);
        let declared = i64::try_from(payload.len()).unwrap_or(0) + delta;
        prop_assume!(declared >= 0);
        let mut decoder = named_decoder();

        let outcome = decoder.decode_at(
            &frame_with_length(&payload, u32::try_from(declared).unwrap_or(0)),
            now(),
        );

        prop_assert!(outcome.is_framing_error());
        prop_assert_eq!(decoder.session().ack.clone(), vec![0x00]);
    }

    /// Flipping any bit of the payload fails the CRC check.
    #[test]
    fn prop_payload_bit_flip_rejected(
        records in records_strategy(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let payload = codec8_payload(&records);
        let declared = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        let mut frame = frame_with_length(&payload, declared);
        let offset = 8 + index.index(payload.len());
        if let Some(byte) = frame.get_mut(offset) {
            *byte ^= 1 << bit;
        }
        let mut decoder = named_decoder();

        let outcome = decoder.decode_at(&frame, now());

        prop_assert!(
            matches!(
                outcome,
                DecodeOutcome::FramingError {
                    reason: tracklink_core::FramingError::CrcMismatch { .. }
                }
            ),
            "unexpected outcome {:?}",
            outcome
        );
    }

    /// No decoder panics on arbitrary input, before or after a handshake.
    #[test]
    fn prop_arbitrary_bytes_never_panic(
        first in prop::collection::vec(any::<u8>(), 0..256),
        second in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        for kind in ProtocolKind::ALL {
            let mut decoder = decoder_for(kind, DecoderConfig::default());
            let _ = decoder.decode(&first);
            let _ = decoder.decode(&second);
        }
    }

    /// Arbitrary text never panics the text protocols.
    #[test]
    fn prop_arbitrary_text_never_panics(text in "[#A-Za-z0-9;&=_,.\\r\\n]{0,200}") {
        for kind in [ProtocolKind::GryphonM01, ProtocolKind::Wialon] {
            let mut decoder = decoder_for(kind, DecoderConfig::default());
            let _ = decoder.decode(text.as_bytes());
        }
    }
}
