//! Field parsing for the text protocols.

use std::fmt::Display;
use std::str::FromStr;

use tracklink_core::FieldError;

/// Parse a trimmed text field, naming it in the error.
pub fn parse_field<T>(field: &'static str, text: &str) -> Result<T, FieldError>
where
    T: FromStr,
    T::Err: Display,
{
    text.trim()
        .parse()
        .map_err(|e| FieldError::malformed(field, format!("'{text}': {e}")))
}

/// Parse a decimal field and round it to the nearest integer.
pub fn parse_rounded(field: &'static str, text: &str) -> Result<i64, FieldError> {
    let value: f64 = parse_field(field, text)?;
    if !value.is_finite() {
        return Err(FieldError::malformed(field, format!("'{text}' is not finite")));
    }
    Ok(value.round() as i64)
}
