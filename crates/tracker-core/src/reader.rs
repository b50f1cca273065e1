//! Bounds-checked cursor over untrusted frame bytes.
//!
//! Every read checks the remaining length first and reports a [`FieldError`]
//! naming the field instead of panicking. A failed read does not advance the
//! cursor past the end of the buffer, so later reads fail the same way.

use crate::error::FieldError;

/// Big-endian cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or(&[])
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], FieldError> {
        let end = self.pos.checked_add(len).ok_or(FieldError::Truncated {
            field,
            needed: len,
            available: self.remaining(),
        })?;
        let bytes = self.data.get(self.pos..end).ok_or(FieldError::Truncated {
            field,
            needed: len,
            available: self.remaining(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, field: &'static str, len: usize) -> Result<(), FieldError> {
        self.take(field, len).map(|_| ())
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FieldError> {
        let bytes = self.take(field, N)?;
        bytes.try_into().map_err(|_| FieldError::Truncated {
            field,
            needed: N,
            available: bytes.len(),
        })
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, FieldError> {
        self.array::<1>(field).map(|[b]| b)
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, FieldError> {
        self.array(field).map(u16::from_be_bytes)
    }

    pub fn read_i16(&mut self, field: &'static str) -> Result<i16, FieldError> {
        self.array(field).map(i16::from_be_bytes)
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, FieldError> {
        self.array(field).map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, FieldError> {
        self.array(field).map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, FieldError> {
        self.array(field).map(u64::from_be_bytes)
    }

    /// Read an unsigned big-endian integer of `width` bytes (at most 8).
    pub fn read_uint(&mut self, field: &'static str, width: usize) -> Result<u64, FieldError> {
        let bytes = self.take(field, width)?;
        be_uint(field, bytes)
    }
}

/// Interpret up to eight bytes as an unsigned big-endian integer.
///
/// An empty slice reads as zero.
pub fn be_uint(field: &'static str, bytes: &[u8]) -> Result<u64, FieldError> {
    if bytes.len() > 8 {
        return Err(FieldError::TooWide {
            field,
            width: bytes.len(),
        });
    }
    Ok(bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_reads_big_endian() -> TestResult {
        let data = [0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFE, 0x2A];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16("len")?, 4);
        assert_eq!(reader.read_i32("lng")?, -2);
        assert_eq!(reader.read_u8("sat")?, 42);
        assert!(reader.is_empty());
        Ok(())
    }

    #[test]
    fn test_truncated_read_reports_field() -> TestResult {
        let data = [0x01];
        let mut reader = ByteReader::new(&data);
        let err = reader.read_u16("speed").err().ok_or("expected error")?;
        assert_eq!(
            err,
            FieldError::Truncated {
                field: "speed",
                needed: 2,
                available: 1
            }
        );
        assert_eq!(reader.position(), 0);
        Ok(())
    }

    #[test]
    fn test_take_huge_length_does_not_overflow() -> TestResult {
        let data = [0u8; 4];
        let mut reader = ByteReader::new(&data);
        reader.skip("pad", 1)?;
        assert!(reader.take("value", usize::MAX).is_err());
        assert_eq!(reader.remaining(), 3);
        Ok(())
    }

    #[test]
    fn test_read_uint_widths() -> TestResult {
        let data = [0x00, 0x00, 0x60, 0x1A, 0x01];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_uint("io", 4)?, 0x601A);
        assert_eq!(reader.read_uint("io", 0)?, 0);
        assert_eq!(reader.read_uint("io", 1)?, 1);
        Ok(())
    }

    #[test]
    fn test_be_uint_rejects_wide_values() -> TestResult {
        assert!(matches!(
            be_uint("value", &[0u8; 9]),
            Err(FieldError::TooWide { width: 9, .. })
        ));
        Ok(())
    }
}
