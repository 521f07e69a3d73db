use std::io::Read;

use rust_decimal::Decimal;

use crate::native::NativeError;
use crate::types::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;

// SQLite has no incremental bind, so streamed LOBs are read up front.
const MAX_PREALLOC: u64 = 1 << 20;

fn capacity(length: Option<u64>) -> usize {
    length
        .map(|len| len.min(MAX_PREALLOC))
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or(0)
}

/// Decimal as text so the scale survives (`5.30` stays `5.30`).
#[must_use]
pub fn decimal_text(value: &Decimal) -> String {
    value.to_string()
}

/// Timestamp as `YYYY-MM-DD HH:MM:SS.mmm`, which SQLite's date functions understand.
#[must_use]
pub fn timestamp_text(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Drain a character stream.
///
/// # Errors
/// Returns a read failure or invalid UTF-8.
pub fn read_text(reader: &mut dyn Read, length: Option<u64>) -> Result<String, NativeError> {
    let mut text = String::with_capacity(capacity(length));
    reader.read_to_string(&mut text)?;
    Ok(text)
}

/// Drain a binary stream.
///
/// # Errors
/// Returns a read failure.
pub fn read_bytes(reader: &mut dyn Read, length: Option<u64>) -> Result<Vec<u8>, NativeError> {
    let mut bytes = Vec::with_capacity(capacity(length));
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use std::str::FromStr;

    #[test]
    fn decimal_keeps_scale() {
        let value = Decimal::from_str("5.30").unwrap();
        assert_eq!(decimal_text(&value), "5.30");
    }

    #[test]
    fn timestamp_has_millis() {
        let at = NaiveDate::from_ymd_opt(2023, 7, 4)
            .and_then(|d| d.and_hms_milli_opt(9, 5, 1, 20))
            .unwrap();
        assert_eq!(timestamp_text(at), "2023-07-04 09:05:01.020");
    }

    #[test]
    fn streams_are_drained_with_or_without_length() {
        let mut known = Cursor::new("hello".as_bytes());
        assert_eq!(read_text(&mut known, Some(5)).unwrap(), "hello");
        let mut unknown = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(read_bytes(&mut unknown, None).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn huge_length_hint_is_capped() {
        assert_eq!(capacity(Some(u64::MAX)), 1 << 20);
        assert_eq!(capacity(None), 0);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut bad = Cursor::new(vec![0xffu8, 0xfe]);
        assert!(read_text(&mut bad, None).is_err());
    }
}
