//! Binary AVL decoder (codec 8 and codec 8 extended).
//!
//! A connection starts with a handshake carrying the device name
//! (`u16` length + ASCII). Every later frame is
//! `00000000 | u32 length | payload | crc`, where the CRC-16/IBM trailer is
//! two bytes or four bytes with two leading zeros. The payload is
//! `codec id | N | N records | N`.
//!
//! Codec 8 uses one-byte IO ids and counters; codec 8 extended widens both to
//! two bytes and adds a variable-length IO class.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use tracklink_checksum::crc16;
use tracklink_core::reader::be_uint;
use tracklink_core::{
    ByteReader, DecodeOutcome, DecoderConfig, DeviceSession, FieldError, FramingError,
    GpsRecord, ProtocolDecoder, ProtocolKind, RecordBatch, RecordDraft, RecordValidator,
};

pub const CODEC_8: u8 = 0x08;
pub const CODEC_8_EXTENDED: u8 = 0x8E;

pub const HANDSHAKE_ACK: u8 = 0x01;
pub const BAD_FRAME_ACK: u8 = 0x00;

const PREAMBLE_LEN: usize = 4;
const CRC_FIELD_LEN: usize = 4;
const FIXED_IO_WIDTHS: [usize; 4] = [1, 2, 4, 8];

/// IO ids with first-class meaning.
pub mod io {
    pub const ENGINE_TEMPERATURE: u16 = 9;
    pub const ACCESSORY_VOLTAGE: u16 = 66;
    pub const BATTERY_VOLTAGE: u16 = 67;
    pub const FUEL_LEVEL_A: u16 = 100;
    pub const ODOMETER: u16 = 153;
    pub const FUEL_LEVEL_B: u16 = 158;
    pub const TACHOMETER: u16 = 159;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Base,
    Extended,
}

impl Codec {
    /// Width of IO ids, the event id and every IO counter.
    fn field_width(self) -> usize {
        match self {
            Codec::Base => 1,
            Codec::Extended => 2,
        }
    }
}

pub struct AvlDecoder {
    session: DeviceSession,
    validator: RecordValidator,
}

impl AvlDecoder {
    /// Accepts codec `0x08` frames only.
    pub fn codec8(config: DecoderConfig) -> Self {
        Self::with_kind(ProtocolKind::Codec8, config)
    }

    /// Accepts codec `0x08` and `0x8E` frames.
    pub fn codec8_extended(config: DecoderConfig) -> Self {
        Self::with_kind(ProtocolKind::Codec8Extended, config)
    }

    fn with_kind(kind: ProtocolKind, config: DecoderConfig) -> Self {
        Self {
            session: DeviceSession::new(kind),
            validator: config.validator(),
        }
    }

    /// Decode `frame` with `now` as the reference for the future-time rule.
    pub fn decode_at(&mut self, frame: &[u8], now: DateTime<Utc>) -> DecodeOutcome {
        self.session.begin_exchange(now);

        let result = if self.session.name().is_none() {
            self.handshake(frame)
        } else {
            self.data(frame, now)
        };

        result.unwrap_or_else(|reason| {
            debug!(
                device = self.session.name().unwrap_or("-"),
                protocol = %self.session.protocol(),
                %reason,
                "rejecting AVL frame"
            );
            let bad = self.bad_frame_ack();
            self.session.reject(reason, bad)
        })
    }

    fn handshake(&mut self, frame: &[u8]) -> Result<DecodeOutcome, FramingError> {
        let mut reader = ByteReader::new(frame);
        let declared = usize::from(reader.read_u16("name length")?);
        let actual = reader.remaining();
        if declared != actual {
            return Err(FramingError::LengthMismatch { declared, actual });
        }

        let name = std::str::from_utf8(reader.rest())
            .map_err(|e| FramingError::malformed(format!("device name is not text: {e}")))?;
        if name.is_empty() {
            return Err(FramingError::malformed("empty device name"));
        }

        self.session.assign_name(name);
        self.session.last_error.clear();
        self.session.ack = self.handshake_ack();
        Ok(DecodeOutcome::Handshake {
            name: name.to_string(),
        })
    }

    fn data(&mut self, frame: &[u8], now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        let mut reader = ByteReader::new(frame);
        let preamble = reader.take("preamble", PREAMBLE_LEN)?;
        if preamble.iter().any(|&b| b != 0) {
            return Err(FramingError::BadHeader(hex::encode(preamble)));
        }

        let declared = reader.read_u32("data length")?;
        let declared = usize::try_from(declared)
            .map_err(|e| FramingError::malformed(format!("data length: {e}")))?;
        let rest = reader.rest();
        let mismatch = FramingError::LengthMismatch {
            declared,
            actual: rest.len().saturating_sub(CRC_FIELD_LEN),
        };
        let (payload, trailer) = rest.split_at_checked(declared).ok_or_else(|| mismatch.clone())?;
        if trailer.len() != 2 && trailer.len() != CRC_FIELD_LEN {
            return Err(mismatch);
        }

        let carried = be_uint("crc", trailer).map_err(|e| FramingError::malformed(e.to_string()))?;
        let computed = crc16(payload);
        if carried != u64::from(computed) {
            return Err(FramingError::CrcMismatch {
                carried: u32::try_from(carried).unwrap_or(u32::MAX),
                computed: u32::from(computed),
            });
        }

        let mut body = ByteReader::new(payload);
        let codec = match body.read_u8("codec id")? {
            CODEC_8 => Codec::Base,
            CODEC_8_EXTENDED if self.session.protocol() == ProtocolKind::Codec8Extended => {
                Codec::Extended
            }
            other => return Err(FramingError::UnknownCodec(other)),
        };
        let count = body.read_u8("record count")?;

        let mut drafts = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let mut draft = RecordDraft::new();
            if let Err(err) = read_record(&mut body, codec, &mut draft) {
                draft.note(err);
                // Nothing after a short read is aligned; fail the remaining records too.
                body.skip("records", body.remaining())?;
            }
            drafts.push(draft);
        }

        match body.rest() {
            [] => {}
            [trailer] if *trailer == count => {}
            [trailer] => {
                return Err(FramingError::CountMismatch {
                    header: count,
                    trailer: *trailer,
                });
            }
            extra => return Err(FramingError::TrailingBytes(extra.len())),
        }

        let mut batch = RecordBatch::default();
        for draft in drafts {
            self.session.admit(draft, &self.validator, now, &mut batch);
        }

        if !batch.invalid.is_empty() {
            warn!(
                device = self.session.name().unwrap_or("-"),
                invalid = batch.invalid.len(),
                total = batch.len(),
                "AVL frame carried invalid records"
            );
        }
        self.session.ack = u32::from(count).to_be_bytes().to_vec();
        Ok(DecodeOutcome::Records(batch))
    }
}

impl ProtocolDecoder for AvlDecoder {
    fn kind(&self) -> ProtocolKind {
        self.session.protocol()
    }

    fn session(&self) -> &DeviceSession {
        &self.session
    }

    fn decode(&mut self, frame: &[u8]) -> DecodeOutcome {
        self.decode_at(frame, Utc::now())
    }

    fn handshake_ack(&self) -> Vec<u8> {
        vec![HANDSHAKE_ACK]
    }

    fn bad_frame_ack(&self) -> Vec<u8> {
        vec![BAD_FRAME_ACK]
    }
}

fn read_id(body: &mut ByteReader<'_>, codec: Codec) -> Result<u16, FieldError> {
    match codec {
        Codec::Base => body.read_u8("io id").map(u16::from),
        Codec::Extended => body.read_u16("io id"),
    }
}

/// Read one AVL record. Values that decode but make no sense are noted on
/// the draft; a short read is returned as the error.
fn read_record(
    body: &mut ByteReader<'_>,
    codec: Codec,
    draft: &mut RecordDraft,
) -> Result<(), FieldError> {
    let millis = body.read_u64("timestamp")?;
    let timestamp = draft.take(crate::time::unix_millis("timestamp", millis).map(Some));
    if let Some(timestamp) = timestamp {
        draft.record.timestamp = timestamp;
    }
    body.skip("priority", 1)?;

    let record = &mut draft.record;
    record.longitude = f64::from(body.read_i32("lng")?) / 1e7;
    record.latitude = f64::from(body.read_i32("lat")?) / 1e7;
    record.altitude = i64::from(body.read_i16("altitude")?);
    record.heading = i64::from(body.read_u16("angle")?);
    record.satellites = u32::from(body.read_u8("satellites")?);
    record.speed = i64::from(body.read_u16("speed")?);
    body.skip("event io id", codec.field_width())?;

    read_io_section(body, codec, draft)
}

/// The section opens with the number of width classes that follow, in the
/// order 1, 2, 4, 8 bytes and then the variable class (codec 8 extended).
/// Classes past the last one the codec defines are ignored.
fn read_io_section(
    body: &mut ByteReader<'_>,
    codec: Codec,
    draft: &mut RecordDraft,
) -> Result<(), FieldError> {
    let counter = codec.field_width();
    let classes = body.read_uint("io class count", counter)?;
    let classes = usize::try_from(classes).unwrap_or(usize::MAX);

    for &width in FIXED_IO_WIDTHS.iter().take(classes) {
        let count = body.read_uint("io element count", counter)?;
        for _ in 0..count {
            let id = read_id(body, codec)?;
            let value = body.read_uint("io value", width)?;
            apply_fixed_io(codec, width, id, value, &mut draft.record);
        }
    }

    if codec == Codec::Extended && classes > FIXED_IO_WIDTHS.len() {
        let count = body.read_u16("io nx count")?;
        for _ in 0..count {
            let id = body.read_u16("io id")?;
            let len = usize::from(body.read_u16("io nx length")?);
            let bytes = body.take("io nx value", len)?;
            let value = match be_uint("io nx value", bytes) {
                Ok(value) => value.to_string(),
                Err(_) => hex::encode(bytes),
            };
            draft.record.push_extension(format!("id {id}"), value);
        }
    }
    Ok(())
}

fn apply_fixed_io(codec: Codec, width: usize, id: u16, value: u64, record: &mut GpsRecord) {
    let scaled = value as f64;
    let signed = i64::try_from(value).unwrap_or(i64::MAX);

    match (width, id) {
        (2, io::ACCESSORY_VOLTAGE) => record.accessory_voltage = scaled / 1000.0,
        (2, io::BATTERY_VOLTAGE) => record.battery_voltage = scaled / 1000.0,
        (2, io::ENGINE_TEMPERATURE) if codec == Codec::Base => {
            record.temperature = Some(scaled / 9.6 - 273.0);
        }
        (2, io::FUEL_LEVEL_A) => record.fuel_mut().sensor_a = signed,
        (2, io::FUEL_LEVEL_B) => record.fuel_mut().sensor_b = (scaled * 0.1) as i64,
        (2, io::TACHOMETER) => record.push_extension("Tahometer", format!("{:.0}", scaled * 0.25)),
        (4, io::ODOMETER) => record.push_extension("Odometer", format!("{:.0}", scaled * 0.005)),
        _ => record.push_extension(format!("id {id}"), value),
    }
}
