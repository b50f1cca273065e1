//! Property-based tests for the record validator and session classification.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tracklink_core::{
    DeviceSession, GpsRecord, ProtocolKind, RecordBatch, RecordDraft, RecordRejection,
    RecordValidator, ValidationError,
};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn record_strategy() -> impl Strategy<Value = GpsRecord> {
    (
        0i64..86_400 * 30,
        -90.0f64..90.0,
        -180.0f64..180.0,
        -500i64..9_000,
        0i64..360,
        0i64..250,
        0u32..40,
    )
        .prop_map(|(offset, lat, lng, alt, heading, speed, sats)| GpsRecord {
            timestamp: base_time() + Duration::seconds(offset),
            latitude: lat,
            longitude: lng,
            altitude: alt,
            heading,
            speed,
            satellites: sats,
            ..GpsRecord::default()
        })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// An earlier timestamp after an accepted record is always NonMonotonicTime,
    /// whatever the other fields hold.
    #[test]
    fn prop_earlier_record_is_non_monotonic(
        first in record_strategy(),
        mut second in record_strategy(),
        back in 1i64..86_400,
    ) {
        second.timestamp = first.timestamp - Duration::seconds(back);
        let now = first.timestamp;
        let result = RecordValidator::new(0).validate_at(&second, Some(&first), now);
        let is_non_monotonic = matches!(result, Err(ValidationError::NonMonotonicTime { .. }));
        prop_assert!(is_non_monotonic);
    }

    /// Below the minimum, a record with an otherwise good timestamp is rejected
    /// for its satellite count.
    #[test]
    fn prop_low_satellites_rejected(record in record_strategy(), minimum in 1u32..50) {
        let now = record.timestamp;
        let result = RecordValidator::new(minimum).validate_at(&record, None, now);
        if record.satellites < minimum {
            let is_insufficient = matches!(
                result,
                Err(ValidationError::InsufficientSatellites { .. })
            );
            prop_assert!(is_insufficient);
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// Every admitted record lands in exactly one list.
    #[test]
    fn prop_every_record_has_one_fate(records in prop::collection::vec(record_strategy(), 0..20)) {
        let mut session = DeviceSession::new(ProtocolKind::GryphonM01);
        let mut batch = RecordBatch::default();
        let validator = RecordValidator::default();
        let now = base_time() + Duration::days(31);
        let count = records.len();
        for record in records {
            session.admit(RecordDraft::from(record), &validator, now, &mut batch);
        }
        prop_assert_eq!(batch.validated.len() + batch.invalid.len(), count);
        for pair in batch.validated.windows(2) {
            if let [a, b] = pair {
                prop_assert!(a.timestamp <= b.timestamp);
            }
        }
    }
}

#[test]
fn test_invalid_reason_survives_round_trip_to_string() {
    let reason = RecordRejection::from(ValidationError::InsufficientSatellites {
        actual: 3,
        minimum: 4,
    });
    assert_eq!(reason.to_string(), "fewer than 4 satellites (3)");
}
