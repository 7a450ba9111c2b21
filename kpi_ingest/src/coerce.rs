//! Cell coercion into canonical dates and numbers.
//!
//! Both [`parse_date_value`] and [`parse_numeric_value`] are total: every
//! input maps to `Some(..)` or `None`, nothing panics and nothing is logged.
//! Callers treat `None` as ordinary data ("not parseable"), not as a fault.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::cell::CellValue;

/// Day zero of the 1900 spreadsheet date system (serial 1 = 1900-01-01,
/// accounting for the phantom 1900-02-29).
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial number of 9999-12-31.
const MAX_SERIAL: f64 = 2_958_465.0;

/// Parse a date-like cell.
///
/// Accepted shapes:
/// - numeric cells: spreadsheet serial dates (fractional part ignored)
/// - `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` (first of month)
/// - `MM/DD/YYYY`, `M/D/YYYY`, `MM-DD-YYYY`, two-digit years (`1/5/24`)
/// - RFC 3339 / ISO datetimes, `YYYY-MM-DD HH:MM:SS`
/// - month names: `Jan 2024`, `January 2024`, `Jan-24`, `15 Jan 2024`
/// - five-digit numeric strings (serials exported as text)
///
/// Returns `None` for anything else, including blanks, booleans and
/// out-of-range calendar values such as `2024-02-30`.
pub fn parse_date_value(raw: &CellValue) -> Option<NaiveDate> {
    match raw {
        CellValue::Number(n) => from_serial(*n),
        CellValue::Text(s) => parse_date_str(s),
        CellValue::Empty | CellValue::Bool(_) | CellValue::Other(_) => None,
    }
}

/// Parse a numeric cell.
///
/// Text is trimmed; `$`, `,`, `%` and inner whitespace are stripped before
/// parsing, and an accounting negative `(1,234)` becomes `-1234`. The
/// remaining text must be a plain decimal literal: `"12abc"`, `"inf"` and
/// `"NaN"` are rejected, as are non-finite numeric cells.
pub fn parse_numeric_value(raw: &CellValue) -> Option<f64> {
    match raw {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => parse_numeric_str(s),
        CellValue::Number(_) | CellValue::Empty | CellValue::Bool(_) | CellValue::Other(_) => None,
    }
}

/// First day of the month containing `date` (the canonical monthly period key).
pub fn month_key(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn from_serial(n: f64) -> Option<NaiveDate> {
    if !n.is_finite() || !(1.0..=MAX_SERIAL).contains(&n) {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(n.trunc() as i64))
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if s.len() == 5 && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<f64>().ok().and_then(from_serial);
    }

    if let Some(d) = parse_numeric_date(s) {
        return Some(d);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    parse_month_name_date(s)
}

/// All-digit forms separated by `-`, `/` or `.`.
fn parse_numeric_date(s: &str) -> Option<NaiveDate> {
    let sep = s.chars().find(|c| matches!(c, '-' | '/' | '.'))?;
    let parts: Vec<&str> = s.split(sep).collect();
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    match parts.as_slice() {
        // YYYY-MM-DD
        [y, m, d] if y.len() == 4 => ymd(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?),
        // MM/DD/YYYY or MM/DD/YY
        [m, d, y] if m.len() <= 2 && d.len() <= 2 => {
            ymd(expand_year(y)?, m.parse().ok()?, d.parse().ok()?)
        }
        // YYYY-MM
        [y, m] if y.len() == 4 && m.len() <= 2 => ymd(y.parse().ok()?, m.parse().ok()?, 1),
        // MM/YYYY
        [m, y] if m.len() <= 2 && y.len() == 4 => ymd(y.parse().ok()?, m.parse().ok()?, 1),
        _ => None,
    }
}

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=9999;

/// `Jan 2024`, `January-2024`, `Jun-24`, `15 Jan 2024`, `Jan 15, 2024`.
/// Month-only forms land on the first.
fn parse_month_name_date(s: &str) -> Option<NaiveDate> {
    let tokens: Vec<&str> = s
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | ',' | '/' | '.'))
        .filter(|t| !t.is_empty())
        .collect();

    let (day, month, year) = match tokens.as_slice() {
        [m, y] => (1, month_number(m)?, *y),
        [d, m, y] if is_day(d) => (d.parse().ok()?, month_number(m)?, *y),
        [m, d, y] if is_day(d) => (d.parse().ok()?, month_number(m)?, *y),
        _ => return None,
    };
    if !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = expand_year(year).filter(|y| YEAR_RANGE.contains(y))?;
    ymd(year, month, day)
}

fn month_number(token: &str) -> Option<u32> {
    let t = token.to_ascii_lowercase();
    if t.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| *name == t || (t.len() == 3 && name.starts_with(&t)))
        .map(|i| i as u32 + 1)
}

fn is_day(token: &str) -> bool {
    (1..=2).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit())
}

fn expand_year(y: &str) -> Option<i32> {
    let n: i32 = y.parse().ok()?;
    match y.len() {
        4 => Some(n),
        2 if n < 70 => Some(2000 + n),
        2 => Some(1900 + n),
        _ => None,
    }
}

fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let t = s.trim();
    let (negated, body) = match t.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, t),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty()
        || !cleaned
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        || !cleaned.bytes().any(|b| b.is_ascii_digit())
    {
        return None;
    }

    let v: f64 = cleaned.parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(if negated { -v } else { v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    #[test]
    fn iso_and_us_dates() {
        assert_eq!(parse_date_value(&text("2024-01-01")), d(2024, 1, 1));
        assert_eq!(parse_date_value(&text(" 2024-03-15 ")), d(2024, 3, 15));
        assert_eq!(parse_date_value(&text("03/15/2024")), d(2024, 3, 15));
        assert_eq!(parse_date_value(&text("3/5/2024")), d(2024, 3, 5));
        assert_eq!(parse_date_value(&text("3/5/24")), d(2024, 3, 5));
        assert_eq!(parse_date_value(&text("12-31-2023")), d(2023, 12, 31));
        assert_eq!(parse_date_value(&text("2024/07/04")), d(2024, 7, 4));
    }

    #[test]
    fn month_only_forms_land_on_the_first() {
        assert_eq!(parse_date_value(&text("2024-06")), d(2024, 6, 1));
        assert_eq!(parse_date_value(&text("06/2024")), d(2024, 6, 1));
        assert_eq!(parse_date_value(&text("Jun 2024")), d(2024, 6, 1));
        assert_eq!(parse_date_value(&text("June 2024")), d(2024, 6, 1));
        assert_eq!(parse_date_value(&text("Jun-24")), d(2024, 6, 1));
        assert_eq!(parse_date_value(&text("Jan-2024")), d(2024, 1, 1));
        assert_eq!(parse_date_value(&text("January-2024")), d(2024, 1, 1));
        assert_eq!(parse_date_value(&text("Jan 24")), d(2024, 1, 1));
        assert_eq!(parse_date_value(&text("sep 2023")), d(2023, 9, 1));
    }

    #[test]
    fn month_names_with_a_day() {
        assert_eq!(parse_date_value(&text("15 Jan 2024")), d(2024, 1, 15));
        assert_eq!(parse_date_value(&text("15-Jan-24")), d(2024, 1, 15));
        assert_eq!(parse_date_value(&text("January 15, 2024")), d(2024, 1, 15));
    }

    #[test]
    fn month_names_never_yield_implausible_years() {
        for s in ["Jun-0024", "Jan 1850", "Ju 2024", "Janu 2024", "Jan 2024 x", "31 Feb 2024"] {
            assert_eq!(parse_date_value(&text(s)), None, "input {s:?}");
        }
        for s in ["Jun-24", "Jan-2024", "Jan 24", "Dec 99"] {
            let parsed = parse_date_value(&text(s)).expect(s);
            assert!(YEAR_RANGE.contains(&parsed.year()), "{s:?} -> {parsed}");
        }
    }

    #[test]
    fn datetimes_keep_the_written_calendar_day() {
        assert_eq!(
            parse_date_value(&text("2024-01-31T23:00:00-05:00")),
            d(2024, 1, 31)
        );
        assert_eq!(parse_date_value(&text("2024-02-01T00:00:00Z")), d(2024, 2, 1));
        assert_eq!(parse_date_value(&text("2024-02-01 08:30:00")), d(2024, 2, 1));
    }

    #[test]
    fn spreadsheet_serials() {
        // 45292 is 2024-01-01 in the 1900 date system.
        assert_eq!(parse_date_value(&CellValue::Number(45292.0)), d(2024, 1, 1));
        assert_eq!(parse_date_value(&CellValue::Number(45292.75)), d(2024, 1, 1));
        assert_eq!(parse_date_value(&text("45292")), d(2024, 1, 1));
        assert_eq!(parse_date_value(&CellValue::Number(0.0)), None);
        assert_eq!(parse_date_value(&CellValue::Number(-3.0)), None);
        assert_eq!(parse_date_value(&CellValue::Number(f64::NAN)), None);
    }

    #[test]
    fn unparseable_dates_are_none() {
        for s in ["", "   ", "abc", "2024-02-30", "13/01/2024", "2024-13", "1/2/3/4", "--"] {
            assert_eq!(parse_date_value(&text(s)), None, "input {s:?}");
        }
        assert_eq!(parse_date_value(&CellValue::Empty), None);
        assert_eq!(parse_date_value(&CellValue::Bool(true)), None);
        assert_eq!(
            parse_date_value(&CellValue::Other(serde_json::json!({}))),
            None
        );
    }

    #[test]
    fn numbers_with_decoration() {
        assert_eq!(parse_numeric_value(&text("485,000")), Some(485_000.0));
        assert_eq!(parse_numeric_value(&text("$1,234.50")), Some(1234.5));
        assert_eq!(parse_numeric_value(&text("94.5%")), Some(94.5));
        assert_eq!(parse_numeric_value(&text(" -12 ")), Some(-12.0));
        assert_eq!(parse_numeric_value(&text("(1,234)")), Some(-1234.0));
        assert_eq!(parse_numeric_value(&text("$ 2 500")), Some(2500.0));
        assert_eq!(parse_numeric_value(&CellValue::Number(1.25)), Some(1.25));
    }

    #[test]
    fn non_numeric_is_none() {
        for s in ["", " ", "abc", "bad", "12abc", "inf", "NaN", "$", "%", ",", "-", "1.2.3"] {
            assert_eq!(parse_numeric_value(&text(s)), None, "input {s:?}");
        }
        assert_eq!(parse_numeric_value(&CellValue::Empty), None);
        assert_eq!(parse_numeric_value(&CellValue::Bool(false)), None);
        assert_eq!(parse_numeric_value(&CellValue::Number(f64::INFINITY)), None);
        assert_eq!(
            parse_numeric_value(&CellValue::Other(serde_json::json!({}))),
            None
        );
    }

    #[test]
    fn month_key_truncates_to_first() {
        assert_eq!(month_key(d(2024, 2, 29).unwrap()), d(2024, 2, 1).unwrap());
    }

    proptest! {
        #[test]
        fn coercion_is_total_on_text(s in ".*") {
            let cell = CellValue::Text(s);
            let _ = parse_date_value(&cell);
            let _ = parse_numeric_value(&cell);
        }

        #[test]
        fn coercion_is_total_on_numbers(n in proptest::num::f64::ANY) {
            let cell = CellValue::Number(n);
            let _ = parse_date_value(&cell);
            if let Some(v) = parse_numeric_value(&cell) {
                prop_assert!(v.is_finite());
            }
        }

        #[test]
        fn plain_integers_round_trip_through_text(n in -1_000_000_000i64..1_000_000_000i64) {
            prop_assert_eq!(parse_numeric_value(&CellValue::Text(n.to_string())), Some(n as f64));
        }
    }
}
