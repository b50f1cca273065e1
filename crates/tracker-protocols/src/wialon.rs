//! Wialon decoder covering the IPS text protocol and the hex-encoded
//! Retranslator protocol. A frame starting with `#` is IPS.
//!
//! IPS lines look like `#L#name;password\r\n` or
//! `#D#DDMMYY;HHMMSS;lat;N;lng;E;speed;course;alt;sats;...\r\n`.
//!
//! Retranslator frames are hex text split on the `0BBB` block marker. The
//! first segment carries the packet size, the device name, the record time
//! and optionally the packet flags; every following segment is a typed,
//! named data block whose declared size must match its body.

use chrono::{DateTime, Utc};
use tracing::debug;
use tracklink_core::{
    DecodeOutcome, DecoderConfig, DeviceSession, FieldError, FramingError, GpsRecord,
    ProtocolDecoder, ProtocolKind, RecordBatch, RecordDraft, RecordValidator,
};

use crate::coords::parse_degrees_minutes;
use crate::text::parse_field;
use crate::time::{parse_ddmmyy_hhmmss, unix_seconds};

pub const BAD_FRAME_ACK: u8 = 0x00;

pub const IPS_MARKER: u8 = b'#';
pub const BLOCK_MARKER: &str = "0BBB";
pub const POSITION_BLOCK: &str = "posinfo";

const IPS_MIN_TOKENS: usize = 3;
const IPS_MIN_RECORD_FIELDS: usize = 10;

/// Hex digits of the packet size that opens a Retranslator frame.
const PACKET_SIZE_DIGITS: usize = 8;
const TIME_DIGITS: usize = 8;
const FLAGS_DIGITS: usize = 8;
const BLOCK_SIZE_DIGITS: usize = 8;
const DOUBLE_DIGITS: usize = 16;

/// Retranslator block value types.
pub mod block_type {
    pub const INTEGER: u8 = 3;
    pub const DOUBLE: u8 = 4;
}

pub struct WialonDecoder {
    session: DeviceSession,
    validator: RecordValidator,
}

impl WialonDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            session: DeviceSession::new(ProtocolKind::Wialon),
            validator: config.validator(),
        }
    }

    pub fn decode_at(&mut self, frame: &[u8], now: DateTime<Utc>) -> DecodeOutcome {
        self.session.begin_exchange(now);

        let result = std::str::from_utf8(frame)
            .map_err(|e| FramingError::malformed(format!("frame is not text: {e}")))
            .and_then(|text| {
                if frame.first() == Some(&IPS_MARKER) {
                    self.ips(text, now)
                } else {
                    self.retranslator(text, now)
                }
            });

        result.unwrap_or_else(|reason| {
            debug!(
                device = self.session.name().unwrap_or("-"),
                %reason,
                "rejecting Wialon frame"
            );
            let bad = self.bad_frame_ack();
            self.session.reject(reason, bad)
        })
    }

    fn ips(&mut self, text: &str, now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        if !text.contains("\r\n") {
            return Err(FramingError::malformed("IPS frame has no CRLF line end"));
        }

        let mut login = None;
        let mut drafts = Vec::new();
        for line in text.split("\r\n").filter(|line| !line.is_empty()) {
            let tokens: Vec<&str> = line.split('#').collect();
            let [_, kind, body, ..] = tokens.as_slice() else {
                return Err(FramingError::malformed(format!(
                    "IPS line '{line}' has {} tokens, need {IPS_MIN_TOKENS}",
                    tokens.len()
                )));
            };
            match *kind {
                "L" => {
                    let name = body.split(';').next().unwrap_or_default();
                    login = Some(name.to_string());
                }
                "D" | "SD" => drafts.push(parse_ips_record(body)?),
                other => debug!(kind = other, "ignoring IPS packet type"),
            }
        }

        if let Some(name) = &login {
            self.session.assign_name(name.as_str());
        }
        if drafts.is_empty() {
            return Ok(match login {
                Some(_) => {
                    self.session.last_error.clear();
                    DecodeOutcome::Handshake {
                        name: self.session.name().unwrap_or_default().to_string(),
                    }
                }
                None => DecodeOutcome::empty(),
            });
        }

        let mut batch = RecordBatch::default();
        for draft in drafts {
            self.session.admit(draft, &self.validator, now, &mut batch);
        }
        Ok(DecodeOutcome::Records(batch))
    }

    fn retranslator(&mut self, text: &str, now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        let text = text.trim();
        let mut segments = text.split(BLOCK_MARKER);
        let header = segments.next().unwrap_or_default();
        let mut blocks = segments.peekable();
        if blocks.peek().is_none() {
            return Err(FramingError::malformed(format!(
                "Retranslator frame has no '{BLOCK_MARKER}' block"
            )));
        }

        let mut cursor = HexCursor::new(header);
        cursor.skip("packet size", PACKET_SIZE_DIGITS)?;
        let name = cursor.read_name("device name")?;
        let secs = cursor.read_uint("time", TIME_DIGITS)?;
        match cursor.remaining() {
            0 => {}
            FLAGS_DIGITS => cursor.skip("flags", FLAGS_DIGITS)?,
            extra => {
                return Err(FramingError::malformed(format!(
                    "{extra} unexpected hex digits after the Retranslator header"
                )));
            }
        }

        let mut draft = RecordDraft::new();
        if let Some(ts) = draft.take(
            i64::try_from(secs)
                .map_err(|e| FieldError::malformed("time", e))
                .and_then(|secs| unix_seconds("time", secs))
                .map(Some),
        ) {
            draft.record.timestamp = ts;
        }

        for block in blocks {
            read_block(block, &mut draft)?;
        }

        if !name.is_empty() {
            self.session.assign_name(name);
        }
        let mut batch = RecordBatch::default();
        self.session.admit(draft, &self.validator, now, &mut batch);
        Ok(DecodeOutcome::Records(batch))
    }
}

impl ProtocolDecoder for WialonDecoder {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Wialon
    }

    fn session(&self) -> &DeviceSession {
        &self.session
    }

    fn decode(&mut self, frame: &[u8]) -> DecodeOutcome {
        self.decode_at(frame, Utc::now())
    }

    /// IPS and Retranslator define no acknowledgement.
    fn handshake_ack(&self) -> Vec<u8> {
        Vec::new()
    }

    fn bad_frame_ack(&self) -> Vec<u8> {
        vec![BAD_FRAME_ACK]
    }
}

/// Parse the `;`-separated body of an IPS `D`/`SD` packet.
pub fn parse_ips_record(body: &str) -> Result<RecordDraft, FramingError> {
    let fields: Vec<&str> = body.split(';').collect();
    let [date, time, lat, lat_hemi, lng, lng_hemi, speed, course, alt, sats, ..] =
        fields.as_slice()
    else {
        return Err(FramingError::malformed(format!(
            "IPS record has {} fields, need {IPS_MIN_RECORD_FIELDS}",
            fields.len()
        )));
    };

    let timestamp = parse_ddmmyy_hhmmss(date, time)?;
    let mut draft = RecordDraft::from(GpsRecord {
        timestamp,
        ..GpsRecord::default()
    });

    let latitude = draft.take(parse_degrees_minutes("lat", lat));
    draft.record.latitude = if lat_hemi.trim() == "S" { -latitude } else { latitude };
    let longitude = draft.take(parse_degrees_minutes("lng", lng));
    draft.record.longitude = if lng_hemi.trim() == "W" { -longitude } else { longitude };
    draft.record.speed = draft.take(parse_field("speed", speed));
    draft.record.heading = draft.take(parse_field("angle", course));
    draft.record.altitude = draft.take(parse_field("altitude", alt));
    draft.record.satellites = draft.take(parse_field("satellites", sats));
    Ok(draft)
}

/// Cursor over a string of hex digits. Offsets count digits, not bytes.
struct HexCursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> HexCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.text.len().saturating_sub(self.pos)
    }

    fn take(&mut self, field: &'static str, digits: usize) -> Result<&'a str, FieldError> {
        let truncated = FieldError::Truncated {
            field,
            needed: digits,
            available: self.remaining(),
        };
        let end = self.pos.checked_add(digits).ok_or_else(|| truncated.clone())?;
        let slice = self.text.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, field: &'static str, digits: usize) -> Result<(), FieldError> {
        self.take(field, digits).map(|_| ())
    }

    fn rest(&mut self) -> &'a str {
        let rest = self.text.get(self.pos..).unwrap_or_default();
        self.pos = self.text.len();
        rest
    }

    fn read_uint(&mut self, field: &'static str, digits: usize) -> Result<u64, FieldError> {
        let text = self.take(field, digits)?;
        parse_hex(field, text)
    }

    fn read_bytes(&mut self, field: &'static str, digits: usize) -> Result<Vec<u8>, FieldError> {
        let text = self.take(field, digits)?;
        hex::decode(text).map_err(|e| FieldError::malformed(field, e))
    }

    fn read_f64_le(&mut self, field: &'static str) -> Result<f64, FieldError> {
        let bytes = self.read_bytes(field, DOUBLE_DIGITS)?;
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                FieldError::malformed(field, format!("expected 8 bytes, got {}", bytes.len()))
            })?;
        Ok(f64::from_le_bytes(array))
    }

    /// Read hex-pair characters up to a `00` pair on an even offset, and
    /// consume the terminator.
    fn read_name(&mut self, field: &'static str) -> Result<String, FieldError> {
        let mut bytes = Vec::new();
        loop {
            let pair = self.take(field, 2)?;
            let byte = u8::try_from(parse_hex(field, pair)?)
                .map_err(|e| FieldError::malformed(field, e))?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        String::from_utf8(bytes).map_err(|e| FieldError::malformed(field, e))
    }
}

/// Digits only: `from_str_radix` alone would also take a leading sign.
fn parse_hex(field: &'static str, text: &str) -> Result<u64, FieldError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FieldError::malformed(field, format!("'{text}' is not hex")));
    }
    u64::from_str_radix(text, 16).map_err(|e| FieldError::malformed(field, format!("'{text}': {e}")))
}

/// Decode one Retranslator block into `draft`. A malformed block header
/// rejects the frame; a malformed value is a field error.
fn read_block(block: &str, draft: &mut RecordDraft) -> Result<(), FramingError> {
    let mut cursor = HexCursor::new(block);
    let declared = cursor.read_uint("block size", BLOCK_SIZE_DIGITS)?;
    let declared = usize::try_from(declared)
        .map_err(|e| FramingError::malformed(format!("block size: {e}")))?;
    let digits = cursor.remaining();
    if !digits.is_multiple_of(2) || digits / 2 != declared {
        return Err(FramingError::LengthMismatch {
            declared,
            actual: digits.div_ceil(2),
        });
    }
    cursor.skip("block hide flag", 2)?;
    let kind = cursor.read_uint("block type", 2)?;
    let name = cursor.read_name("block name")?;

    if name == POSITION_BLOCK {
        if let Err(err) = read_position(&mut cursor, &mut draft.record) {
            draft.note(err);
        }
        return Ok(());
    }

    let value = cursor.rest();
    match u8::try_from(kind) {
        Ok(block_type::INTEGER) => match parse_field::<i64>("block value", value) {
            Ok(number) => draft.record.push_extension(name, number),
            Err(err) => draft.note(err),
        },
        Ok(block_type::DOUBLE) => {
            let mut value = HexCursor::new(value);
            match value.read_f64_le("block value") {
                Ok(_) if value.remaining() > 0 => draft.note(FieldError::malformed(
                    "block value",
                    format!("{} hex digits after the double", value.remaining()),
                )),
                Ok(number) => draft.record.push_extension(name, format!("{number:.2}")),
                Err(err) => draft.note(err),
            }
        }
        _ => debug!(block = %name, kind, "ignoring Retranslator block type"),
    }
    Ok(())
}

fn read_position(cursor: &mut HexCursor<'_>, record: &mut GpsRecord) -> Result<(), FieldError> {
    record.longitude = cursor.read_f64_le("lng")?;
    record.latitude = cursor.read_f64_le("lat")?;
    record.altitude = cursor.read_f64_le("altitude")? as i64;
    record.speed = i64::try_from(cursor.read_uint("speed", 4)?).unwrap_or(i64::MAX);
    record.heading = i64::try_from(cursor.read_uint("angle", 4)?).unwrap_or(i64::MAX);
    let sats = parse_hex("satellites", cursor.rest())?;
    record.satellites = u32::try_from(sats).unwrap_or(u32::MAX);
    Ok(())
}
