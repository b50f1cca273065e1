//! Degrees-and-minutes coordinate conversion shared by the text protocols.

use tracklink_core::FieldError;

/// Round `value` to `places` decimal places.
pub fn to_fixed(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Convert an NMEA-style `DDMM.mmmm` value to decimal degrees, rounded to
/// seven places.
///
/// ```
/// let lat = tracklink_protocols::coords::degrees_minutes(5026.5015);
/// assert!((lat - 50.441_691_7).abs() < 1e-9);
/// ```
pub fn degrees_minutes(raw: f64) -> f64 {
    let scaled = raw / 100.0;
    let degrees = scaled.trunc();
    let minutes = (scaled - degrees) * 100.0 / 60.0;
    to_fixed(degrees + minutes, 7)
}

/// Parse a textual `DDMM.mmmm` field.
pub fn parse_degrees_minutes(field: &'static str, text: &str) -> Result<f64, FieldError> {
    let raw: f64 = text
        .trim()
        .parse()
        .map_err(|e| FieldError::malformed(field, e))?;
    if !raw.is_finite() {
        return Err(FieldError::malformed(field, format!("'{text}' is not finite")));
    }
    Ok(degrees_minutes(raw))
}
