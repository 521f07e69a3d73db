use chrono::{NaiveDateTime, Timelike};
use rust_decimal::Decimal;

/// Drop sub-millisecond precision. Truncates, never rounds.
#[must_use]
pub fn truncate_to_millis(value: NaiveDateTime) -> NaiveDateTime {
    let nanos = value.nanosecond();
    // nanosecond() may exceed 1e9 during a leap second; keep that marker intact
    let truncated = nanos - nanos % 1_000_000;
    value.with_nanosecond(truncated).unwrap_or(value)
}

/// Strip trailing zero scale: `5.30` becomes `5.3`, `500` stays `500`.
#[must_use]
pub fn normalize_decimal(value: Decimal) -> Decimal {
    value.normalize()
}

/// Text layout used when a timestamp travels as a string.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Parse the textual timestamp layouts databases commonly return.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = text.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn decimal_trailing_zeros_are_stripped() {
        let d = Decimal::from_str("5.30").unwrap();
        assert_eq!(normalize_decimal(d).to_string(), "5.3");
        let d = Decimal::from_str("5").unwrap();
        assert_eq!(normalize_decimal(d).to_string(), "5");
        let d = Decimal::from_str("500").unwrap();
        assert_eq!(normalize_decimal(d).to_string(), "500");
        assert_eq!(normalize_decimal(d).scale(), 0);
    }

    #[test]
    fn timestamps_truncate_rather_than_round() {
        let ts = parse_timestamp("2023-05-06 07:08:09.999999").unwrap();
        let truncated = truncate_to_millis(ts);
        assert_eq!(truncated.format(TIMESTAMP_FORMAT).to_string(), "2023-05-06 07:08:09.999");
    }

    #[test]
    fn parses_common_layouts() {
        assert!(parse_timestamp("2023-05-06 07:08:09").is_some());
        assert!(parse_timestamp("2023-05-06T07:08:09.120").is_some());
        assert!(parse_timestamp("2023-05-06").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
