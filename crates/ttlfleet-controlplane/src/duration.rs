//! Duration syntax for TTLs: `2h`, `45m`, `1h30m`, `1.5h`, `90s`
//!
//! A sequence of decimal numbers, each with an optional fraction and a
//! mandatory unit (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`). A bare `0` is
//! accepted. Signed values are rejected.

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("signed durations are not accepted")]
    Signed,

    #[error("expected a number at '{0}'")]
    ExpectedNumber(String),

    #[error("missing unit after '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("duration out of range")]
    Overflow,
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}

/// Parse a duration string
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s.starts_with('+') || s.starts_with('-') {
        return Err(DurationError::Signed);
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(DurationError::ExpectedNumber(rest.to_string()));
        }
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(number.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit(unit.to_string()))?;
        rest = &rest[unit_len..];

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| DurationError::Overflow)?
        };

        let mut nanos = whole.checked_mul(scale).ok_or(DurationError::Overflow)?;

        // Fraction digits beyond nanosecond precision are dropped
        let frac = &frac[..frac.len().min(18)];
        if !frac.is_empty() {
            let digits: u128 = frac.parse().map_err(|_| DurationError::Overflow)?;
            let divisor = 10u128.pow(frac.len() as u32);
            nanos = nanos
                .checked_add(digits * scale / divisor)
                .ok_or(DurationError::Overflow)?;
        }

        total = total.checked_add(nanos).ok_or(DurationError::Overflow)?;
    }

    let secs = u64::try_from(total / NANOS_PER_SECOND).map_err(|_| DurationError::Overflow)?;
    let subsec = (total % NANOS_PER_SECOND) as u32;
    Ok(Duration::new(secs, subsec))
}

/// Render a duration as `1h30m0s`, dropping sub-second precision
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45m").unwrap(), Duration::from_secs(2700));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_compound_and_fraction() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(
            parse_duration("1h0m0.5s").unwrap(),
            Duration::from_millis(3_600_500)
        );
    }

    #[test]
    fn test_rejected_inputs() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(parse_duration("-1h"), Err(DurationError::Signed));
        assert_eq!(
            parse_duration("12"),
            Err(DurationError::MissingUnit("12".to_string()))
        );
        assert_eq!(
            parse_duration("3d"),
            Err(DurationError::UnknownUnit("d".to_string()))
        );
        assert!(matches!(
            parse_duration("h"),
            Err(DurationError::ExpectedNumber(_))
        ));
        assert!(matches!(
            parse_duration("1..5h"),
            Err(DurationError::ExpectedNumber(_))
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(12 * 3600)), "12h0m0s");
        assert_eq!(format_duration(Duration::from_secs(2700)), "45m0s");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
    }
}
