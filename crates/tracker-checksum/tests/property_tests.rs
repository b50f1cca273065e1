use proptest::prelude::*;
use tracklink_checksum::{crc16, crc32_ieee};

// Codec8 payload from the device-family documentation, codec id through the
// trailing record count. The frame carries 0x0000C7CF after it.
const CODEC8_PAYLOAD_HEX: &str = "08010000016B40D8EA30010000000000000000000000000000000105021503010101425E0F01F10000601A014E000000000000000001";

fn decode_hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| s.get(i..i + 2))
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

#[test]
fn crc16_matches_documented_codec8_frame() {
    let payload = decode_hex(CODEC8_PAYLOAD_HEX);
    assert_eq!(payload.len(), 0x36);
    assert_eq!(crc16(&payload), 0xC7CF);
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// The checksum is a pure function of its input.
    #[test]
    fn prop_crc16_deterministic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(crc16(&data), crc16(&data));
    }

    /// Flipping any single bit of the payload changes the CRC16.
    #[test]
    fn prop_crc16_detects_single_bit_flip(
        data in proptest::collection::vec(any::<u8>(), 1..256),
        pos in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut corrupted = data.clone();
        let idx = pos.index(corrupted.len());
        if let Some(byte) = corrupted.get_mut(idx) {
            *byte ^= 1 << bit;
        }
        prop_assert_ne!(crc16(&data), crc16(&corrupted));
    }

    /// Flipping any single bit of the window changes the CRC32.
    #[test]
    fn prop_crc32_detects_single_bit_flip(
        data in proptest::collection::vec(any::<u8>(), 1..64),
        pos in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut corrupted = data.clone();
        let idx = pos.index(corrupted.len());
        if let Some(byte) = corrupted.get_mut(idx) {
            *byte ^= 1 << bit;
        }
        prop_assert_ne!(crc32_ieee(&data), crc32_ieee(&corrupted));
    }
}
