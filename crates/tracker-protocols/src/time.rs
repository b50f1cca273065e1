//! Timestamp helpers, including the legacy date corrections some Gryphon
//! firmware needs.
//!
//! The corrections below are unverified vendor behavior and are kept exactly
//! as deployed devices expect them.

use chrono::{DateTime, Datelike, Days, Months, NaiveDateTime, Utc};
use tracklink_core::FieldError;

/// Days added by both Gryphon legacy corrections.
pub const LEGACY_DAY_SHIFT: u64 = 7168;

/// Gryphon-M01 dates from years before this one get [`LEGACY_DAY_SHIFT`].
pub const M01_CORRECTION_BEFORE_YEAR: i32 = 2015;

/// Seconds since the Unix epoch, UTC.
pub fn unix_seconds(field: &'static str, secs: i64) -> Result<DateTime<Utc>, FieldError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| FieldError::malformed(field, format!("{secs} is out of range")))
}

/// Milliseconds since the Unix epoch, truncated to whole seconds.
pub fn unix_millis(field: &'static str, millis: u64) -> Result<DateTime<Utc>, FieldError> {
    let secs = i64::try_from(millis / 1000).map_err(|e| FieldError::malformed(field, e))?;
    unix_seconds(field, secs)
}

/// Gryphon-Pro rule: every timestamp loses 100 years and gains 7168 days.
///
/// The deployed rule tests "before 2010 or before 2099", which holds for any
/// date the 32-bit field can carry, so it is applied unconditionally.
pub fn gryphon_pro_correction(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.checked_sub_months(Months::new(100 * 12))
        .and_then(|t| t.checked_add_days(Days::new(LEGACY_DAY_SHIFT)))
        .unwrap_or(ts)
}

/// Gryphon-M01 rule: dates before 2015 gain 7168 days.
pub fn m01_correction(ts: DateTime<Utc>) -> DateTime<Utc> {
    if ts.year() < M01_CORRECTION_BEFORE_YEAR {
        ts.checked_add_days(Days::new(LEGACY_DAY_SHIFT)).unwrap_or(ts)
    } else {
        ts
    }
}

/// Parse `DDMMYY` and `HHMMSS` fields as UTC.
pub fn parse_ddmmyy_hhmmss(date: &str, time: &str) -> Result<DateTime<Utc>, FieldError> {
    let joined = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&joined, "%d%m%y %H%M%S")
        .map(|dt| dt.and_utc())
        .map_err(|e| FieldError::malformed("time", format!("'{joined}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_parse_date_time() -> TestResult {
        let ts = parse_ddmmyy_hhmmss("260711", "114432")?;
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2011-07-26 11:44:32");
        Ok(())
    }

    #[test]
    fn test_m01_correction_only_before_2015() -> TestResult {
        let old = parse_ddmmyy_hhmmss("260711", "114432")?;
        assert_eq!(m01_correction(old) - old, chrono::Duration::days(7168));
        let recent = parse_ddmmyy_hhmmss("010124", "000000")?;
        assert_eq!(m01_correction(recent), recent);
        Ok(())
    }

    #[test]
    fn test_gryphon_pro_correction_is_unconditional() -> TestResult {
        let ts = Utc
            .with_ymd_and_hms(2105, 3, 1, 0, 0, 0)
            .single()
            .ok_or("bad time")?;
        let corrected = gryphon_pro_correction(ts);
        assert_eq!(corrected.format("%Y-%m-%d").to_string(), "2024-10-15");
        Ok(())
    }

    #[test]
    fn test_unix_millis_truncates() -> TestResult {
        let ts = unix_millis("timestamp", 0x0000_016B_40D8_EA30)?;
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2019-06-10 10:04:46");
        Ok(())
    }
}
