//! Core domain types for the tracklink ingestion engine.
//!
//! Every wire protocol decoder normalizes its frames into the types defined
//! here, so the validator, the registry and the persistence boundary stay
//! independent of any one byte format.
//!
//! ## Modules
//! - `record` - [`GpsRecord`], extensions and the persisted text line
//! - `session` - [`DeviceSession`] and the [`ProtocolKind`] tag
//! - `outcome` - [`DecodeOutcome`] and per-day grouping of validated records
//! - `validator` - temporal and quality rules ([`RecordValidator`])
//! - `registry` - the shared [`SessionRegistry`]
//! - `reader` - bounds-checked big-endian cursor over untrusted bytes
//! - `decoder` - the [`ProtocolDecoder`] capability implemented per protocol
//! - `sink` - the persistence collaborator contract
//! - `error` - framing, field and validation error taxonomy

#![deny(static_mut_refs)]

pub mod decoder;
pub mod error;
pub mod outcome;
pub mod reader;
pub mod record;
pub mod registry;
pub mod session;
pub mod sink;
pub mod validator;

pub use decoder::{DecoderConfig, ProtocolDecoder};
pub use error::{FieldError, FramingError, RecordRejection, ValidationError};
pub use outcome::{DayBucket, DecodeOutcome, InvalidRecord, RecordBatch};
pub use reader::ByteReader;
pub use record::{Extension, FuelLevels, GpsRecord, RecordDraft};
pub use registry::{SessionRegistry, SessionSnapshot};
pub use session::{DeviceSession, NO_DATA, ProtocolKind, UnknownProtocol};
pub use sink::{PersistenceSink, route_outcome};
pub use validator::{DEFAULT_MIN_SATELLITES, RecordValidator};
