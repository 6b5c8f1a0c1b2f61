//! Lenient parsers for bank extract values, shared by validation and normalization so
//! that a value accepted by one is always convertible by the other.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;
use std::str::FromStr;

/// Date layouts seen in bank extracts, tried in order.
pub const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y"];

/// Parse an amount such as `1 250,50`, `1.250.000,75` or `-12.5`.
///
/// Spaces are dropped and a comma is read as the decimal separator; when several dots
/// remain, all but the last are thousands separators.
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let mut s: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }
    s = s.replace(',', ".");
    if s.matches('.').count() > 1 {
        if let Some(last_dot) = s.rfind('.') {
            let (head, tail) = s.split_at(last_dot);
            s = format!("{}{}", head.replace('.', ""), tail);
        }
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }
    BigDecimal::from_str(&s).ok()
}

/// Parse a rate into a fraction: `5%` and `500bps` both give `0.05`; bare numbers are
/// taken as fractions already.
pub fn parse_rate(raw: &str) -> Option<BigDecimal> {
    let s = raw.trim().to_lowercase();
    if let Some(bps) = s.strip_suffix("bps") {
        return parse_decimal(bps).map(|v| v / BigDecimal::from(10_000));
    }
    if let Some(percent) = s.strip_suffix('%') {
        return parse_decimal(percent).map(|v| v / BigDecimal::from(100));
    }
    parse_decimal(&s)
}

/// Parse a whole number. A decimal spelling with a zero fraction (`12.0`) is accepted.
pub fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let value = parse_decimal(s)?;
    if value.is_integer() {
        value.to_i64()
    } else {
        None
    }
}

/// Parse a calendar date in any of the supported layouts, including compact `YYYYMMDD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
