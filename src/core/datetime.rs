// src/core/datetime.rs

use anyhow::{Result, anyhow};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};

/// Parses the compact Grid Engine `date_time` syntax used by `-a` and `-dl`:
/// `[[CC]YY]MMDDhhmm[.SS]`. An 8-digit value assumes the current year; a
/// 10-digit value takes its century from the current year.
pub fn parse_qsub_datetime(value: &str) -> Result<NaiveDateTime> {
    parse_with_year(value, Local::now().year())
}

fn parse_with_year(value: &str, current_year: i32) -> Result<NaiveDateTime> {
    let invalid = || anyhow!("invalid datetime format: \"{}\"", value);

    let (digits, seconds) = match value.split_once('.') {
        Some((digits, raw)) => {
            if raw.len() != 2 {
                return Err(invalid());
            }
            (digits, parse_component(raw).ok_or_else(invalid)?)
        }
        None => (value, 0),
    };

    let (year, rest) = match digits.len() {
        8 => (current_year, digits),
        10 => {
            let century = current_year / 100;
            let two = parse_component(digits.get(..2).ok_or_else(invalid)?).ok_or_else(invalid)?;
            (century * 100 + i32::try_from(two).map_err(|_| invalid())?, &digits[2..])
        }
        12 => {
            let four =
                parse_component(digits.get(..4).ok_or_else(invalid)?).ok_or_else(invalid)?;
            (i32::try_from(four).map_err(|_| invalid())?, &digits[4..])
        }
        _ => return Err(invalid()),
    };

    let field = |start: usize| -> Result<u32> {
        rest.get(start..start + 2)
            .and_then(parse_component)
            .ok_or_else(invalid)
    };
    let (month, day, hour, minute) = (field(0)?, field(2)?, field(4)?, field(6)?);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, seconds))
        .ok_or_else(invalid)
}

fn parse_component(raw: &str) -> Option<u32> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}

/// Renders a parsed datetime the way Slurm's `--begin`/`--deadline` expect.
pub fn to_iso8601(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_digits_assume_current_year() {
        let dt = parse_with_year("06151230", 2026).unwrap();
        assert_eq!(to_iso8601(&dt), "2026-06-15T12:30:00");
    }

    #[test]
    fn test_ten_digits_take_century_from_current_year() {
        let dt = parse_with_year("3106151230", 2026).unwrap();
        assert_eq!(to_iso8601(&dt), "2031-06-15T12:30:00");
    }

    #[test]
    fn test_twelve_digits_are_literal() {
        let dt = parse_with_year("203106151230", 2026).unwrap();
        assert_eq!(to_iso8601(&dt), "2031-06-15T12:30:00");
    }

    #[test]
    fn test_optional_seconds_suffix() {
        let dt = parse_with_year("06151230.45", 2026).unwrap();
        assert_eq!(to_iso8601(&dt), "2026-06-15T12:30:45");
    }

    #[test]
    fn test_invalid_lengths_fail() {
        for value in ["0615123", "061512301", "20310615123000", ""] {
            assert!(parse_with_year(value, 2026).is_err(), "{value}");
        }
    }

    #[test]
    fn test_non_digit_input_fails() {
        assert!(parse_with_year("06xx1230", 2026).is_err());
        assert!(parse_with_year("06151230.x5", 2026).is_err());
    }

    #[test]
    fn test_out_of_range_fields_fail() {
        assert!(parse_with_year("13401230", 2026).is_err());
        assert!(parse_with_year("06152470", 2026).is_err());
    }
}
