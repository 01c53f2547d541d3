use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Why a single import row was rejected. The batch carries on without it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("amount is missing")]
    MissingAmount,
    #[error("could not parse amount '{0}'")]
    BadAmount(String),
    #[error("date is missing")]
    MissingDate,
    #[error("could not parse date '{0}'")]
    BadDate(String),
    #[error("could not determine the account")]
    NoAccount,
    #[error("could not determine the project")]
    NoProject,
    #[error("could not determine the category")]
    NoCategory,
    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

const DATE_TIME_PATTERNS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_PATTERNS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d"];

const ISO_PATTERNS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an amount the way bank exports write them: "1 234,56", "-12'000.5".
pub fn parse_amount(raw: &str) -> Result<f64, RowError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(RowError::MissingAmount);
    }
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RowError::BadAmount(text.to_string())),
    }
}

/// Day-first and ISO dates, with or without time. An explicit UTC offset is
/// dropped and the wall-clock time kept.
pub fn parse_date(raw: &str) -> Result<NaiveDateTime, RowError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(RowError::MissingDate);
    }
    for pattern in DATE_TIME_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(dt);
        }
    }
    for pattern in DATE_PATTERNS {
        if let Ok(d) = NaiveDate::parse_from_str(text, pattern) {
            return Ok(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    for pattern in ISO_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_local());
    }
    Err(RowError::BadDate(text.to_string()))
}

/// "Доход, Поступление" -> ["доход", "поступление"]
pub fn split_markers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1 234,56"), Ok(1234.56));
        assert_eq!(parse_amount("-12'000.5"), Ok(-12000.5));
        assert_eq!(parse_amount("\u{a0}-300\u{a0}000,00 "), Ok(-300000.0));
        assert_eq!(parse_amount("42"), Ok(42.0));
    }

    #[test]
    fn test_parse_amount_errors() {
        assert_eq!(parse_amount("   "), Err(RowError::MissingAmount));
        assert_eq!(parse_amount("abc"), Err(RowError::BadAmount("abc".into())));
        assert!(parse_amount("inf").is_err());
    }

    #[test]
    fn test_parse_date_day_first() {
        assert_eq!(parse_date("05.01.2024 14:22:10"), Ok(dt(2024, 1, 5, 14, 22, 10)));
        assert_eq!(parse_date("05.01.2024 14:22"), Ok(dt(2024, 1, 5, 14, 22, 0)));
        assert_eq!(parse_date("05.01.2024"), Ok(dt(2024, 1, 5, 0, 0, 0)));
    }

    #[test]
    fn test_parse_date_iso_variants() {
        assert_eq!(parse_date("2024-01-05"), Ok(dt(2024, 1, 5, 0, 0, 0)));
        assert_eq!(parse_date("2024-01-05 08:30"), Ok(dt(2024, 1, 5, 8, 30, 0)));
        assert_eq!(parse_date("2024-01-05T08:30:15"), Ok(dt(2024, 1, 5, 8, 30, 15)));
        assert_eq!(parse_date("2024-01-05T08:30:15.000"), Ok(dt(2024, 1, 5, 8, 30, 15)));
        assert_eq!(parse_date("2024-01-05T08:30:15+03:00"), Ok(dt(2024, 1, 5, 8, 30, 15)));
    }

    #[test]
    fn test_parse_date_errors() {
        assert_eq!(parse_date(""), Err(RowError::MissingDate));
        assert_eq!(parse_date("31.02.2024"), Err(RowError::BadDate("31.02.2024".into())));
    }

    #[test]
    fn test_split_markers() {
        assert_eq!(split_markers(" Доход, ,ПОСТУПЛЕНИЕ "), vec!["доход", "поступление"]);
        assert!(split_markers("").is_empty());
    }
}
