//! Gryphon-M01 decoder.
//!
//! The device sends an HTTP-style form: a request line followed by
//! `&key=value` tokens. `a` names the device and the optional `d` carries
//! `_`-joined sub-records of at least ten comma-separated fields:
//!
//! ```text
//! DDMMYY,HHMMSS,lat(DDMM.mmmm),lng(DDMM.mmmm),AccV*100,knots,inputs,alt,course,sats[,..]
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use tracklink_core::{
    DecodeOutcome, DecoderConfig, DeviceSession, FieldError, FramingError, ProtocolDecoder,
    ProtocolKind, RecordBatch, RecordDraft, RecordValidator,
};

use crate::coords::parse_degrees_minutes;
use crate::text::{parse_field, parse_rounded};
use crate::time::{m01_correction, parse_ddmmyy_hhmmss};

/// Sent for every frame, good or bad.
pub const ACK: &[u8] = b"ok;";

pub const MIN_SUB_RECORD_FIELDS: usize = 10;

const KNOTS_TO_KMH: f64 = 1.852;

/// Digital input bits, most significant first.
const INPUTS: [(u8, &str); 4] = [
    (0b1000, "Zajig"),
    (0b0100, "Acsel"),
    (0b0010, "Datchik2"),
    (0b0001, "Datchik1"),
];

pub struct GryphonM01Decoder {
    session: DeviceSession,
    validator: RecordValidator,
}

impl GryphonM01Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            session: DeviceSession::new(ProtocolKind::GryphonM01),
            validator: config.validator(),
        }
    }

    pub fn decode_at(&mut self, frame: &[u8], now: DateTime<Utc>) -> DecodeOutcome {
        self.session.begin_exchange(now);
        self.session.ack = ACK.to_vec();

        match self.parse(frame, now) {
            Ok(outcome) => outcome,
            Err(reason) => {
                debug!(
                    device = self.session.name().unwrap_or("-"),
                    %reason,
                    "rejecting Gryphon-M01 frame"
                );
                let bad = self.bad_frame_ack();
                self.session.reject(reason, bad)
            }
        }
    }

    fn parse(&mut self, frame: &[u8], now: DateTime<Utc>) -> Result<DecodeOutcome, FramingError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| FramingError::malformed(format!("frame is not text: {e}")))?;
        let form = parse_form(text)?;

        let name = form
            .get("a")
            .copied()
            .filter(|name| !name.is_empty())
            .ok_or(FramingError::MissingField("a"))?;
        if !self.session.assign_name(name) && self.session.name() != Some(name) {
            warn!(
                device = self.session.name().unwrap_or("-"),
                announced = name,
                "ignoring rename on a named connection"
            );
        }

        let Some(data) = form.get("d") else {
            self.session.last_error.clear();
            return Ok(DecodeOutcome::Handshake {
                name: self.session.name().unwrap_or(name).to_string(),
            });
        };

        let drafts = data
            .split('_')
            .map(parse_sub_record)
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = RecordBatch::default();
        for draft in drafts {
            self.session.admit(draft, &self.validator, now, &mut batch);
        }
        Ok(DecodeOutcome::Records(batch))
    }
}

impl ProtocolDecoder for GryphonM01Decoder {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::GryphonM01
    }

    fn session(&self) -> &DeviceSession {
        &self.session
    }

    fn decode(&mut self, frame: &[u8]) -> DecodeOutcome {
        self.decode_at(frame, Utc::now())
    }

    fn handshake_ack(&self) -> Vec<u8> {
        ACK.to_vec()
    }

    fn bad_frame_ack(&self) -> Vec<u8> {
        ACK.to_vec()
    }
}

/// Split the form into key/value pairs, dropping the request line. Later
/// duplicates win.
fn parse_form(text: &str) -> Result<HashMap<&str, &str>, FramingError> {
    text.trim()
        .split('&')
        .skip(1)
        .map(|token| {
            token
                .split_once('=')
                .ok_or_else(|| FramingError::malformed(format!("form token '{token}' has no '='")))
        })
        .collect()
}

/// Decode one sub-record. Too few fields rejects the frame; any other
/// problem is a field error on the record.
pub fn parse_sub_record(text: &str) -> Result<RecordDraft, FramingError> {
    let fields: Vec<&str> = text.split(',').collect();
    let [date, time, lat, lng, acc_v, knots, inputs, alt, course, sats, ..] = fields.as_slice()
    else {
        return Err(FramingError::malformed(format!(
            "sub-record has {} fields, need {MIN_SUB_RECORD_FIELDS}",
            fields.len()
        )));
    };

    let mut draft = RecordDraft::new();
    if let Some(ts) = draft.take(parse_ddmmyy_hhmmss(date, time).map(Some)) {
        draft.record.timestamp = m01_correction(ts);
    }
    draft.record.latitude = draft.take(parse_degrees_minutes("lat", lat));
    draft.record.longitude = draft.take(parse_degrees_minutes("lng", lng));
    draft.record.accessory_voltage = draft.take(parse_field::<f64>("AccV", acc_v)) / 100.0;
    let knots: f64 = draft.take(parse_field("speed", knots));
    draft.record.speed = (knots * KNOTS_TO_KMH).round() as i64;

    let mask = draft.take(parse_inputs(inputs));
    for (bit, key) in INPUTS {
        draft.record.push_extension(key, u8::from(mask & bit != 0));
    }

    draft.record.altitude = draft.take(parse_rounded("altitude", alt));
    draft.record.heading = draft.take(parse_rounded("angle", course));
    draft.record.satellites = draft.take(parse_field("satellites", sats));
    Ok(draft)
}

fn parse_inputs(text: &str) -> Result<u8, FieldError> {
    let mask: u8 = parse_field("inputs", text)?;
    if mask > 0b1111 {
        return Err(FieldError::malformed(
            "inputs",
            format!("{mask} does not fit in four bits"),
        ));
    }
    Ok(mask)
}
