//! Temporal and quality rules applied to every decoded record.

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;
use crate::record::GpsRecord;

pub const DEFAULT_MIN_SATELLITES: u32 = 4;

/// How far ahead of "now" a timestamp may be.
pub const FUTURE_TOLERANCE_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordValidator {
    pub min_satellites: u32,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SATELLITES)
    }
}

impl RecordValidator {
    pub fn new(min_satellites: u32) -> Self {
        Self { min_satellites }
    }

    pub fn validate(
        &self,
        candidate: &GpsRecord,
        previous: Option<&GpsRecord>,
    ) -> Result<(), ValidationError> {
        self.validate_at(candidate, previous, Utc::now())
    }

    /// Checks run in order and the first failure is reported: monotonic time
    /// against `previous`, then the future limit, then the satellite minimum.
    pub fn validate_at(
        &self,
        candidate: &GpsRecord,
        previous: Option<&GpsRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if let Some(previous) = previous
            && candidate.timestamp < previous.timestamp
        {
            return Err(ValidationError::NonMonotonicTime {
                candidate: candidate.timestamp,
                previous: previous.timestamp,
            });
        }

        let limit = now + Duration::days(FUTURE_TOLERANCE_DAYS);
        if candidate.timestamp > limit {
            return Err(ValidationError::FutureTime {
                candidate: candidate.timestamp,
                limit,
            });
        }

        if candidate.satellites < self.min_satellites {
            return Err(ValidationError::InsufficientSatellites {
                actual: candidate.satellites,
                minimum: self.min_satellites,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn record(timestamp: DateTime<Utc>, satellites: u32) -> GpsRecord {
        GpsRecord {
            timestamp,
            satellites,
            ..GpsRecord::default()
        }
    }

    #[test]
    fn test_accepts_ordered_record() -> TestResult {
        let now = Utc::now();
        let validator = RecordValidator::default();
        let previous = record(now - Duration::hours(1), 7);
        validator.validate_at(&record(now, 7), Some(&previous), now)?;
        validator.validate_at(&record(now, 7), None, now)?;
        Ok(())
    }

    #[test]
    fn test_equal_timestamps_are_monotonic() -> TestResult {
        let now = Utc::now();
        let previous = record(now, 5);
        RecordValidator::default().validate_at(&record(now, 5), Some(&previous), now)?;
        Ok(())
    }

    #[test]
    fn test_future_limit_is_one_day() {
        let now = Utc::now();
        let validator = RecordValidator::default();
        assert!(
            validator
                .validate_at(&record(now + Duration::hours(23), 5), None, now)
                .is_ok()
        );
        assert!(matches!(
            validator.validate_at(&record(now + Duration::hours(25), 5), None, now),
            Err(ValidationError::FutureTime { .. })
        ));
    }

    #[test]
    fn test_first_failing_check_wins() {
        let now = Utc::now();
        let previous = record(now, 9);
        let candidate = record(now - Duration::minutes(1), 0);
        assert!(matches!(
            RecordValidator::default().validate_at(&candidate, Some(&previous), now),
            Err(ValidationError::NonMonotonicTime { .. })
        ));
    }

    #[test]
    fn test_minimum_is_configurable() -> TestResult {
        let now = Utc::now();
        RecordValidator::new(0).validate_at(&record(now, 0), None, now)?;
        assert!(RecordValidator::new(3).validate_at(&record(now, 2), None, now).is_err());
        Ok(())
    }
}
