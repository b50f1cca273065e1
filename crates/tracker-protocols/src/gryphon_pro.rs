//! Gryphon-Pro binary decoder.
//!
//! Frame: `tag(4) | body | crc32(4)`. The CRC-32 covers the first 32 bytes of
//! the frame; a mismatch is logged and flagged on the session but the frame
//! is still processed, which is what deployed units rely on.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use tracklink_checksum::crc32_ieee;
use tracklink_core::reader::be_uint;
use tracklink_core::{
    ByteReader, DecodeOutcome, DecoderConfig, DeviceSession, FieldError, FramingError,
    GpsRecord, ProtocolDecoder, ProtocolKind, RecordBatch, RecordDraft, RecordValidator,
};

use crate::time::{gryphon_pro_correction, unix_seconds};

pub const TAG_NAME: [u8; 4] = [0xAA, 0x00, 0x14, 0xAA];
pub const TAG_GPS: [u8; 4] = [0xAA, 0x00, 0x14, 0xBB];
pub const TAG_EVENTS: [u8; 4] = [0xAA, 0x00, 0x14, 0xCC];

pub const DATA_ACK: [u8; 4] = [0xAA, 0x14, 0xFF, 0x16];
pub const BAD_FRAME_ACK: [u8; 4] = [0xAA, 0x14, 0xFF, 0x15];

/// Status reported after an event frame.
pub const EVENTS_STATUS: &str = "GPS Signal OFF";

const TAG_LEN: usize = 4;
const CRC_LEN: usize = 4;
const CRC_WINDOW: usize = 32;
const NAME_FIELD: std::ops::Range<usize> = 4..22;
const NAME_CHAR_OFFSET: u8 = 48;

pub struct GryphonProDecoder {
    session: DeviceSession,
    validator: RecordValidator,
}

impl GryphonProDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            session: DeviceSession::new(ProtocolKind::GryphonPro),
            validator: config.validator(),
        }
    }

    pub fn decode_at(&mut self, frame: &[u8], now: DateTime<Utc>) -> DecodeOutcome {
        self.session.begin_exchange(now);
        self.session.ack = DATA_ACK.to_vec();

        match self.dispatch(frame, now) {
            Ok(outcome) => outcome,
            Err(reason) => {
                debug!(
                    device = self.session.name().unwrap_or("-"),
                    %reason,
                    "rejecting Gryphon-Pro frame"
                );
                let bad = self.bad_frame_ack();
                self.session.reject(reason, bad)
            }
        }
    }

    fn dispatch(&mut self, frame: &[u8], now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        let body_end = frame.len().checked_sub(CRC_LEN).filter(|&end| end >= TAG_LEN).ok_or(
            FramingError::Truncated {
                needed: TAG_LEN + CRC_LEN,
                available: frame.len(),
            },
        )?;
        self.check_crc(frame);

        let (tag, rest) = frame.split_at_checked(TAG_LEN).ok_or(FramingError::Truncated {
            needed: TAG_LEN,
            available: frame.len(),
        })?;
        let body = rest.get(..body_end - TAG_LEN).unwrap_or_default();

        match <[u8; 4]>::try_from(tag) {
            Ok(TAG_NAME) => self.announce(frame),
            Ok(TAG_GPS) => self.gps(body, now),
            Ok(TAG_EVENTS) => self.events(body),
            _ => {
                debug!(tag = %hex::encode(tag), "ignoring Gryphon-Pro frame type");
                Ok(DecodeOutcome::empty())
            }
        }
    }

    fn check_crc(&mut self, frame: &[u8]) {
        let flag = match (frame.get(..CRC_WINDOW), frame.last_chunk::<CRC_LEN>()) {
            (Some(window), Some(trailer)) => {
                let carried = u32::from_be_bytes(*trailer);
                let computed = crc32_ieee(window);
                (carried != computed).then(|| {
                    format!("crc32 mismatch: frame carries {carried:#x}, computed {computed:#x}")
                })
            }
            _ => Some(format!(
                "frame of {} bytes is shorter than the {CRC_WINDOW}-byte crc window",
                frame.len()
            )),
        };
        if let Some(flag) = flag {
            warn!(device = self.session.name().unwrap_or("-"), "{flag}");
            self.session.last_error = flag;
        }
    }

    fn announce(&mut self, frame: &[u8]) -> Result<DecodeOutcome, FramingError> {
        let field = frame.get(NAME_FIELD).ok_or(FramingError::Truncated {
            needed: NAME_FIELD.end,
            available: frame.len(),
        })?;
        let name = decode_name(field);
        if name.is_empty() {
            return Err(FramingError::malformed("empty device name"));
        }

        if !self.session.assign_name(name.as_str()) {
            warn!(
                device = self.session.name().unwrap_or("-"),
                announced = %name,
                "ignoring rename on a named connection"
            );
        }
        self.session.ack = self.handshake_ack();
        Ok(DecodeOutcome::Handshake {
            name: self.session.name().unwrap_or(name.as_str()).to_string(),
        })
    }

    fn gps(&mut self, body: &[u8], now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        let mut reader = ByteReader::new(body);
        let count = reader.read_u8("record count")?;

        let mut drafts = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let mut draft = RecordDraft::new();
            if let Err(err) = read_gps_record(&mut reader, &mut draft) {
                draft.note(err);
                reader.skip("records", reader.remaining())?;
            }
            drafts.push(draft);
        }
        if !reader.is_empty() {
            return Err(FramingError::TrailingBytes(reader.remaining()));
        }

        let mut batch = RecordBatch::default();
        for draft in drafts {
            self.session.admit(draft, &self.validator, now, &mut batch);
        }
        Ok(DecodeOutcome::Records(batch))
    }

    fn events(&mut self, body: &[u8]) -> Result<DecodeOutcome, FramingError> {
        let mut reader = ByteReader::new(body);
        let count = reader.read_u8("event count")?;
        let mut lines = Vec::with_capacity(usize::from(count));

        for _ in 0..count {
            let id = reader.read_u8("event id")?;
            let secs = reader.read_u32("event time")?;
            let len = reader.read_u8("event length")?;
            let bytes = reader.take("event value", usize::from(len))?;

            let timestamp = gryphon_pro_correction(unix_seconds("event time", i64::from(secs))?);
            let value = be_uint("event value", bytes).unwrap_or_else(|err| {
                debug!(%err, "event value does not fit, using 0");
                0
            });
            lines.push(format!(
                "{};{}",
                timestamp.format("%d.%m.%Y %H:%M:%S"),
                event_text(id, len, value)
            ));
        }
        if !reader.is_empty() {
            return Err(FramingError::TrailingBytes(reader.remaining()));
        }

        self.session.last_error = EVENTS_STATUS.to_string();
        Ok(DecodeOutcome::Events { lines })
    }
}

impl ProtocolDecoder for GryphonProDecoder {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::GryphonPro
    }

    fn session(&self) -> &DeviceSession {
        &self.session
    }

    fn decode(&mut self, frame: &[u8]) -> DecodeOutcome {
        self.decode_at(frame, Utc::now())
    }

    fn handshake_ack(&self) -> Vec<u8> {
        self.session
            .name()
            .map(|name| name.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn bad_frame_ack(&self) -> Vec<u8> {
        BAD_FRAME_ACK.to_vec()
    }
}

/// Leading zero bytes are padding; every byte from the first non-zero one on
/// is shifted by 48 into a character.
fn decode_name(field: &[u8]) -> String {
    field
        .iter()
        .skip_while(|&&b| b == 0)
        .map(|&b| char::from(b.wrapping_add(NAME_CHAR_OFFSET)))
        .collect()
}

fn read_gps_record(reader: &mut ByteReader<'_>, draft: &mut RecordDraft) -> Result<(), FieldError> {
    let secs = reader.read_u32("time")?;
    if let Some(timestamp) = draft.take(unix_seconds("time", i64::from(secs)).map(Some)) {
        draft.record.timestamp = gryphon_pro_correction(timestamp);
    }

    let record = &mut draft.record;
    record.latitude = f64::from(reader.read_i32("lat")?) / 1e7;
    record.longitude = f64::from(reader.read_i32("lng")?) / 1e7;
    record.altitude = i64::from(reader.read_i16("altitude")?);
    record.heading = (f64::from(reader.read_u8("angle")?) * 1.41) as i64;
    record.speed = i64::from(reader.read_u8("speed")?);
    record.satellites = u32::from(reader.read_u8("satellites")?);
    let gsm = reader.read_u8("gsm")?;
    record.push_extension("GSM", gsm);

    let state = reader.read_u8("state")?;
    match battery_flag(state) {
        Ok(flag) => draft.record.push_extension("BatV", flag),
        Err(err) => draft.note(err),
    }

    let fields = reader.read_u8("sub-field count")?;
    for _ in 0..fields {
        let id = reader.read_u8("sub-field id")?;
        let len = reader.read_u8("sub-field length")?;
        let bytes = reader.take("sub-field value", usize::from(len))?;
        let value = draft.take(be_uint("sub-field value", bytes));
        apply_subfield(id, len, value, &mut draft.record);
    }
    Ok(())
}

/// The battery flag is read from the unpadded binary rendering of the state
/// byte: a `1` at index 5 means external power is off.
fn battery_flag(state: u8) -> Result<u8, FieldError> {
    let bits = format!("{state:b}");
    match bits.chars().nth(5) {
        Some('1') => Ok(0),
        Some(_) => Ok(1),
        None => Err(FieldError::malformed(
            "state",
            format!("bit string '{bits}' is too short"),
        )),
    }
}

mod subfield {
    pub const ACCESSORY_VOLTAGE: u8 = 2;
    pub const IGNITION_START: u8 = 3;
    pub const GPS: u8 = 32;
    pub const FUEL_LEVEL_A: u8 = 75;
    pub const FUEL_LEVEL_B: u8 = 76;
    pub const ANALOG_1: u8 = 101;
    pub const TEMPERATURE: u8 = 102;
    pub const ANALOG_3: u8 = 103;
    pub const ANALOG_4: u8 = 104;
    pub const IGNITION: u8 = 125;
}

/// Key and value text for sub-fields that become extensions.
fn generic_subfield(id: u8, value: u64) -> (String, u64) {
    let key = match id {
        subfield::GPS => "GPS",
        subfield::IGNITION => return ("Zajig".into(), value.min(1)),
        subfield::IGNITION_START => return ("Zapusk".into(), value.min(1)),
        subfield::FUEL_LEVEL_A => "Dut1",
        subfield::FUEL_LEVEL_B => "Dut2",
        subfield::ANALOG_1 => "An1",
        subfield::ANALOG_3 => "An3",
        subfield::ANALOG_4 => "An4",
        other => return (format!("id{other}"), value),
    };
    (key.into(), value)
}

fn celsius(kelvin: u64) -> i64 {
    i64::try_from(kelvin).unwrap_or(i64::MAX).saturating_sub(273)
}

fn apply_subfield(id: u8, len: u8, value: u64, record: &mut GpsRecord) {
    let signed = i64::try_from(value).unwrap_or(i64::MAX);
    match id {
        subfield::ACCESSORY_VOLTAGE => {
            if len == 4 {
                record.accessory_voltage = value as f64 / 100.0;
            }
        }
        subfield::FUEL_LEVEL_A => record.fuel_mut().sensor_a = signed,
        subfield::FUEL_LEVEL_B => record.fuel_mut().sensor_b = signed,
        subfield::TEMPERATURE => record.temperature = Some(celsius(value) as f64),
        _ => {
            let (key, value) = generic_subfield(id, value);
            record.push_extension(key, value);
        }
    }
}

fn event_text(id: u8, len: u8, value: u64) -> String {
    match id {
        subfield::ACCESSORY_VOLTAGE if len == 4 => format!("AccV={:.2};", value as f64 / 100.0),
        subfield::ACCESSORY_VOLTAGE => String::new(),
        subfield::TEMPERATURE => format!("TempC={};", celsius(value)),
        _ => {
            let (key, value) = generic_subfield(id, value);
            format!("{key}={value};")
        }
    }
}
