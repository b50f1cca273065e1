//! The result of decoding one frame.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{FramingError, RecordRejection};
use crate::record::GpsRecord;

/// Calendar-day grouping key for validated records, displayed `YYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayBucket(NaiveDate);

impl DayBucket {
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DayBucket {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%y%m%d"))
    }
}

/// A decoded record routed to the error sink, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRecord {
    pub record: GpsRecord,
    pub reason: RecordRejection,
}

/// Records produced by one data frame, each with exactly one fate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub validated: Vec<GpsRecord>,
    pub invalid: Vec<InvalidRecord>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.validated.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validated records grouped by day, each group in decode order.
    pub fn by_day(&self) -> BTreeMap<DayBucket, Vec<GpsRecord>> {
        let mut days: BTreeMap<DayBucket, Vec<GpsRecord>> = BTreeMap::new();
        for record in &self.validated {
            days.entry(DayBucket::of(record.timestamp))
                .or_default()
                .push(record.clone());
        }
        days
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The device announced its name; no record.
    Handshake { name: String },
    Records(RecordBatch),
    /// Event log lines, kept apart from positional records.
    Events { lines: Vec<String> },
    FramingError { reason: FramingError },
}

impl DecodeOutcome {
    pub fn empty() -> Self {
        DecodeOutcome::Records(RecordBatch::default())
    }

    pub fn is_framing_error(&self) -> bool {
        matches!(self, DecodeOutcome::FramingError { .. })
    }

    pub fn batch(&self) -> Option<&RecordBatch> {
        match self {
            DecodeOutcome::Records(batch) => Some(batch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn at(y: i32, m: u32, d: u32, h: u32) -> Result<GpsRecord, Box<dyn std::error::Error>> {
        Ok(GpsRecord {
            timestamp: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().ok_or("bad time")?,
            ..GpsRecord::default()
        })
    }

    #[test]
    fn test_day_bucket_display() -> TestResult {
        let bucket = DayBucket::of(at(2019, 6, 10, 10)?.timestamp);
        assert_eq!(bucket.to_string(), "190610");
        Ok(())
    }

    #[test]
    fn test_by_day_groups_in_order() -> TestResult {
        let batch = RecordBatch {
            validated: vec![at(2019, 6, 11, 1)?, at(2019, 6, 10, 22)?, at(2019, 6, 11, 2)?],
            invalid: Vec::new(),
        };
        let days = batch.by_day();
        let keys: Vec<String> = days.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["190610", "190611"]);
        let second = days.values().nth(1).ok_or("missing day")?;
        let hours: Vec<String> = second
            .iter()
            .map(|r| r.timestamp.format("%H").to_string())
            .collect();
        assert_eq!(hours, vec!["01", "02"]);
        Ok(())
    }

    #[test]
    fn test_empty_outcome() {
        let outcome = DecodeOutcome::empty();
        assert!(!outcome.is_framing_error());
        assert!(outcome.batch().is_some_and(RecordBatch::is_empty));
    }
}
