//! Error taxonomy shared by every decoder.
//!
//! - [`FramingError`]: the frame as a whole is rejected; no records, bad-frame ack.
//! - [`FieldError`]: one field could not be decoded; the field keeps its default
//!   and decoding continues.
//! - [`ValidationError`]: the record decoded but breaks a temporal or quality rule.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Whole-frame rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("declared length {declared} does not match received length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("bad header {0}")]
    BadHeader(String),

    #[error("crc mismatch: frame carries {carried:#x}, payload computes {computed:#x}")]
    CrcMismatch { carried: u32, computed: u32 },

    #[error("unknown codec id {0:#04x}")]
    UnknownCodec(u8),

    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("record count mismatch: header says {header}, trailer says {trailer}")]
    CountMismatch { header: u8, trailer: u8 },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl FramingError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        FramingError::Malformed(reason.into())
    }
}

/// A field failure while reading the frame structure itself (lengths,
/// counts, tags) rejects the whole frame.
impl From<FieldError> for FramingError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::Truncated {
                needed, available, ..
            } => FramingError::Truncated { needed, available },
            other => FramingError::Malformed(other.to_string()),
        }
    }
}

/// Local, non-fatal failure to decode a single field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("error parse {field}: need {needed} bytes, have {available}")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("error parse {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("error parse {field}: {width} bytes do not fit in 64 bits")]
    TooWide { field: &'static str, width: usize },
}

impl FieldError {
    pub fn malformed(field: &'static str, reason: impl ToString) -> Self {
        FieldError::Malformed {
            field,
            reason: reason.to_string(),
        }
    }
}

/// A decoded record that breaks a temporal or quality rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("timestamp {candidate} is earlier than previous {previous}")]
    NonMonotonicTime {
        candidate: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("timestamp {candidate} is later than {limit}")]
    FutureTime {
        candidate: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    #[error("fewer than {minimum} satellites ({actual})")]
    InsufficientSatellites { actual: u32, minimum: u32 },
}

/// Why a record was routed to the error sink instead of the data sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordRejection {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_display() {
        let err = FramingError::LengthMismatch {
            declared: 4,
            actual: 6,
        };
        assert_eq!(
            err.to_string(),
            "declared length 4 does not match received length 6"
        );
        assert_eq!(
            FramingError::UnknownCodec(0x0c).to_string(),
            "unknown codec id 0x0c"
        );
    }

    #[test]
    fn test_field_error_display_names_field() {
        let err = FieldError::Truncated {
            field: "altitude",
            needed: 2,
            available: 1,
        };
        assert_eq!(err.to_string(), "error parse altitude: need 2 bytes, have 1");
    }

    #[test]
    fn test_structural_field_error_becomes_framing_error() {
        let err: FramingError = FieldError::Truncated {
            field: "record count",
            needed: 1,
            available: 0,
        }
        .into();
        assert_eq!(
            err,
            FramingError::Truncated {
                needed: 1,
                available: 0
            }
        );
    }

    #[test]
    fn test_rejection_is_transparent() {
        let rejection: RecordRejection = ValidationError::InsufficientSatellites {
            actual: 2,
            minimum: 4,
        }
        .into();
        assert_eq!(rejection.to_string(), "fewer than 4 satellites (2)");
    }
}
