//! Per-connection device state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FramingError, RecordRejection};
use crate::outcome::{DecodeOutcome, InvalidRecord, RecordBatch};
use crate::record::{GpsRecord, RecordDraft};
use crate::validator::RecordValidator;

/// Status string for a session that has exchanged frames but produced no
/// record yet.
pub const NO_DATA: &str = "no data";

/// Wire protocol bound to a listener port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Binary AVL, codec id `0x08` only.
    Codec8,
    /// Binary AVL, codec ids `0x08` and `0x8E`.
    Codec8Extended,
    GryphonPro,
    GryphonM01,
    Wialon,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 5] = [
        ProtocolKind::Codec8,
        ProtocolKind::Codec8Extended,
        ProtocolKind::GryphonPro,
        ProtocolKind::GryphonM01,
        ProtocolKind::Wialon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Codec8 => "codec8",
            ProtocolKind::Codec8Extended => "codec8_extended",
            ProtocolKind::GryphonPro => "gryphon_pro",
            ProtocolKind::GryphonM01 => "gryphon_m01",
            ProtocolKind::Wialon => "wialon",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown protocol '{0}'")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolKind {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}

/// One device's live state for the lifetime of a connection.
///
/// The name is assigned once; the last validated record is the baseline for
/// the monotonic-time rule.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    name: Option<String>,
    protocol: ProtocolKind,
    last_record: Option<GpsRecord>,
    pub last_connect: Option<DateTime<Utc>>,
    pub last_info: String,
    pub last_error: String,
    /// Bytes to write back for the current exchange.
    pub ack: Vec<u8>,
}

impl DeviceSession {
    pub fn new(protocol: ProtocolKind) -> Self {
        Self {
            name: None,
            protocol,
            last_record: None,
            last_connect: None,
            last_info: String::new(),
            last_error: String::new(),
            ack: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn last_record(&self) -> Option<&GpsRecord> {
        self.last_record.as_ref()
    }

    /// Set the device name. Returns `false` and leaves the name untouched if
    /// one was already assigned or `name` is empty.
    pub fn assign_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.name.is_some() || name.is_empty() {
            return false;
        }
        self.name = Some(name);
        true
    }

    /// Start handling a new frame received at `now`.
    pub fn begin_exchange(&mut self, now: DateTime<Utc>) {
        self.last_connect = Some(now);
        self.last_error = NO_DATA.to_string();
        self.ack.clear();
    }

    /// Classify a decoded record into `batch`.
    ///
    /// A record with a field error is invalid with that error as its reason;
    /// otherwise it goes through `validator`. Only validated records move the
    /// monotonic baseline.
    pub fn admit(
        &mut self,
        draft: RecordDraft,
        validator: &RecordValidator,
        now: DateTime<Utc>,
        batch: &mut RecordBatch,
    ) {
        let RecordDraft { record, error } = draft;
        self.last_info = record.dated_line().trim_end().to_string();

        let verdict: Result<(), RecordRejection> = match error {
            Some(err) => Err(err.into()),
            None => validator
                .validate_at(&record, self.last_record.as_ref(), now)
                .map_err(RecordRejection::from),
        };

        match verdict {
            Ok(()) => {
                self.last_error.clear();
                self.last_record = Some(record.clone());
                batch.validated.push(record);
            }
            Err(reason) => {
                self.last_error = reason.to_string();
                batch.invalid.push(InvalidRecord { record, reason });
            }
        }
    }

    /// Record a whole-frame rejection and arm the bad-frame ack.
    pub fn reject(&mut self, reason: FramingError, bad_frame_ack: Vec<u8>) -> DecodeOutcome {
        self.last_error = reason.to_string();
        self.ack = bad_frame_ack;
        DecodeOutcome::FramingError { reason }
    }
}
