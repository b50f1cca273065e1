//! The normalized positional sample every decoder produces.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// A free-form `key=value` sensor reading with no first-class field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub key: String,
    pub value: String,
}

impl Extension {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={};", self.key, self.value)
    }
}

/// Two auxiliary fuel/level sensor readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelLevels {
    pub sensor_a: i64,
    pub sensor_b: i64,
}

/// One positional sample.
///
/// `Display` renders the persisted CRLF-terminated text line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsRecord {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub altitude: i64,
    /// Degrees from north.
    pub heading: i64,
    /// km/h.
    pub speed: i64,
    pub satellites: u32,
    pub accessory_voltage: f64,
    pub battery_voltage: f64,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    pub fuel: Option<FuelLevels>,
    /// Insertion order is output order.
    pub extensions: Vec<Extension>,
}

/// Timestamp given to a record whose time field could not be decoded.
pub fn epoch_placeholder() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl Default for GpsRecord {
    fn default() -> Self {
        Self {
            timestamp: epoch_placeholder(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0,
            heading: 0,
            speed: 0,
            satellites: 0,
            accessory_voltage: 0.0,
            battery_voltage: 0.0,
            temperature: None,
            fuel: None,
            extensions: Vec::new(),
        }
    }
}

impl GpsRecord {
    pub fn push_extension(&mut self, key: impl Into<String>, value: impl ToString) {
        self.extensions.push(Extension::new(key, value));
    }

    pub fn fuel_mut(&mut self) -> &mut FuelLevels {
        self.fuel.get_or_insert_with(FuelLevels::default)
    }

    /// The persisted line, prefixed with the record's `dd.mm.yy` date.
    pub fn dated_line(&self) -> String {
        format!("{} {}", self.timestamp.format("%d.%m.%y"), self)
    }
}

impl fmt::Display for GpsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{:.6};{:.6};Altitude={};Angle={};SatCount={};Speed={};AccV={:.2};BatV={:.2};",
            self.timestamp.format("%H%M%S"),
            self.latitude,
            self.longitude,
            self.altitude,
            self.heading,
            self.satellites,
            self.speed,
            self.accessory_voltage,
            self.battery_voltage,
        )?;
        if let Some(temp) = self.temperature {
            write!(f, "TempC={temp:.1};")?;
        }
        if let Some(fuel) = self.fuel {
            write!(
                f,
                "Dut1={};Dut2={};Dut3=0;Dut4=0;",
                fuel.sensor_a, fuel.sensor_b
            )?;
        }
        for ext in &self.extensions {
            write!(f, "{ext}")?;
        }
        f.write_str("\r\n")
    }
}

/// A record under construction plus the first field error met while
/// decoding it.
///
/// Field failures leave the field at its default and decoding continues; only
/// the first failure is kept as the record's error.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub record: GpsRecord,
    pub error: Option<FieldError>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, err: FieldError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Unwrap a field result, noting the error and falling back to the
    /// type's default.
    pub fn take<T: Default>(&mut self, result: Result<T, FieldError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.note(err);
                T::default()
            }
        }
    }
}

impl From<GpsRecord> for RecordDraft {
    fn from(record: GpsRecord) -> Self {
        Self {
            record,
            error: None,
        }
    }
}
