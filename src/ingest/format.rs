//! Delimiter inference, date-format translation and field parsing for quote files.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::config::MAX_DECIMALS;
use crate::{Error, Result};

// ============================================================
// DELIMITER
// ============================================================

/// Field separators a quote file may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    Comma,
    Semicolon,
    Space,
    Tab,
}

impl Delimiter {
    /// Candidates in the order they are tried
    pub const CANDIDATES: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Semicolon,
        Delimiter::Space,
        Delimiter::Tab,
    ];

    #[inline]
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
            Delimiter::Space => ' ',
            Delimiter::Tab => '\t',
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self.as_char() as u8
    }

    /// Separators found in `line`. Runs of spaces count once.
    fn count_in(self, line: &str) -> usize {
        match self {
            Delimiter::Space => line
                .trim()
                .split(' ')
                .filter(|piece| !piece.is_empty())
                .count()
                .saturating_sub(1),
            other => line.matches(other.as_char()).count(),
        }
    }
}

/// Pick the delimiter that splits `line` into the most fields.
///
/// Space only wins when no other candidate reaches the same count. A tie
/// between two non-space candidates, or a line none of them splits, is an
/// error.
pub fn infer_delimiter(line: &str) -> Result<Delimiter> {
    let counts: Vec<(Delimiter, usize)> = Delimiter::CANDIDATES
        .iter()
        .map(|&d| (d, d.count_in(line)))
        .collect();

    let best = counts.iter().map(|&(_, n)| n).max().unwrap_or(0);
    if best == 0 {
        return Err(Error::DelimiterNotFound);
    }

    let winners: Vec<Delimiter> = counts
        .iter()
        .filter(|&&(d, n)| n == best && d != Delimiter::Space)
        .map(|&(d, _)| d)
        .collect();

    match winners.as_slice() {
        [] => Ok(Delimiter::Space),
        [single] => Ok(*single),
        _ => Err(Error::DelimiterNotFound),
    }
}

// ============================================================
// DATE FORMAT
// ============================================================

/// A user date pattern (`yyyy-MM-dd`, `dd.MM.yyyy HH:mm`, ...) and its chrono
/// equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    chrono: String,
    has_time: bool,
}

impl DateFormat {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim().to_string();
        let has_time = pattern.contains(['H', 'h']);
        let chrono = translate(&pattern);
        Self {
            pattern,
            chrono,
            has_time,
        }
    }

    /// The pattern as the user wrote it
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The chrono `strftime` string
    pub fn chrono(&self) -> &str {
        &self.chrono
    }

    pub fn has_time(&self) -> bool {
        self.has_time
    }

    /// Same pattern with an `HH:mm` suffix when it has no time part
    pub fn with_time(&self) -> Self {
        if self.has_time {
            self.clone()
        } else {
            Self::new(&format!("{} HH:mm", self.pattern))
        }
    }

    /// Same pattern cut before its first time letter
    pub fn without_time(&self) -> Self {
        match self.pattern.find(['H', 'h']) {
            Some(pos) => {
                let date_part = self.pattern[..pos].trim_end_matches(|c: char| !c.is_alphanumeric());
                Self::new(date_part)
            },
            None => self.clone(),
        }
    }

    fn parse_with(&self, chrono: &str, text: &str) -> Option<NaiveDateTime> {
        if self.has_time {
            NaiveDateTime::parse_from_str(text, chrono).ok()
        } else {
            NaiveDate::parse_from_str(text, chrono)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        }
    }
}

/// Translate day/month/year letter codes into chrono specifiers
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let specifier = match (c, run) {
            ('y', n) if n >= 3 => Some("%Y"),
            ('y', _) => Some("%y"),
            ('M', 1 | 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1 | 2) => Some("%d"),
            ('d', 3) => Some("%a"),
            ('d', _) => Some("%A"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('t', _) => Some("%p"),
            _ => None,
        };
        match specifier {
            Some(specifier) => out.push_str(specifier),
            None if c == '%' => out.extend(std::iter::repeat("%%").take(run)),
            None => out.extend(std::iter::repeat(c).take(run)),
        }
        i += run;
    }
    out
}

/// Replace the date separators of a chrono format with `sep`
fn reseparate(chrono: &str, sep: char) -> String {
    let mut out = String::with_capacity(chrono.len());
    let mut after_percent = false;
    for c in chrono.chars() {
        if after_percent {
            out.push(c);
            after_percent = false;
        } else if c == '%' {
            out.push(c);
            after_percent = true;
        } else if matches!(c, '-' | '/' | '.') {
            out.push(sep);
        } else {
            out.push(c);
        }
    }
    out
}

const GENERIC_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const GENERIC_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d %Y",
    "%b %d, %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H%M%S", "%H%M"];

/// Date parser with the fallback chain used on every row: the configured
/// format, the same format with the separators the field actually uses,
/// then a locale-free list of common layouts.
#[derive(Debug, Clone)]
pub struct DateParser {
    format: DateFormat,
}

impl DateParser {
    pub fn new(format: DateFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &DateFormat {
        &self.format
    }

    /// Parse a date field, with an optional separate time field
    pub fn parse(&self, date: &str, time: Option<&str>) -> Option<NaiveDateTime> {
        let date = date.trim().trim_matches('"');
        if date.is_empty() {
            return None;
        }

        let parsed = match time {
            Some(time) => {
                let day = self.parse_field(&self.format.without_time(), date)?;
                let time = parse_time(time)?;
                day.date().and_time(time)
            },
            None => self.parse_field(&self.format, date)?,
        };
        Some(parsed)
    }

    fn parse_field(&self, format: &DateFormat, text: &str) -> Option<NaiveDateTime> {
        if let Some(parsed) = format.parse_with(format.chrono(), text) {
            return Some(parsed);
        }

        if let Some(sep) = text.chars().find(|c| matches!(c, '-' | '/' | '.')) {
            let relaxed = reseparate(format.chrono(), sep);
            if let Some(parsed) = format.parse_with(&relaxed, text) {
                return Some(parsed);
            }
        }

        generic_parse(text)
    }
}

fn generic_parse(text: &str) -> Option<NaiveDateTime> {
    GENERIC_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            GENERIC_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim().trim_matches('"');
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
}

// ============================================================
// NUMBERS
// ============================================================

/// Parse a numeric field, returning the value and its fractional digit count
/// (capped at 15).
///
/// With `decimal_comma`, a field holding a comma and no dot uses the comma as
/// decimal separator; otherwise commas are treated as thousands separators.
pub fn parse_number(field: &str, decimal_comma: bool) -> Option<(f64, u32)> {
    let text = field.trim().trim_matches('"');
    if text.is_empty() {
        return None;
    }

    let normalized = if text.contains(',') {
        if decimal_comma && !text.contains('.') {
            text.replace(',', ".")
        } else {
            text.replace(',', "")
        }
    } else {
        text.to_string()
    };

    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let decimals = normalized
        .split_once('.')
        .map(|(_, frac)| frac.chars().take_while(char::is_ascii_digit).count() as u32)
        .unwrap_or(0)
        .min(MAX_DECIMALS);

    Some((value, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_infer_comma() {
        assert_eq!(infer_delimiter("2020-01-01,10,12,9,11,1000").unwrap(), Delimiter::Comma);
    }

    #[test]
    fn test_infer_semicolon_over_decimal_commas() {
        assert_eq!(
            infer_delimiter("2020-01-01;10,5;12;9;11,5").unwrap(),
            Delimiter::Semicolon
        );
    }

    #[test]
    fn test_infer_space_and_tab() {
        assert_eq!(infer_delimiter("2020-01-01  10 12  9 11").unwrap(), Delimiter::Space);
        assert_eq!(infer_delimiter("2020-01-01\t10\t12\t9\t11").unwrap(), Delimiter::Tab);
    }

    #[test]
    fn test_infer_fails_on_tie_or_nothing() {
        assert!(matches!(infer_delimiter("a,b;c"), Err(Error::DelimiterNotFound)));
        assert!(matches!(infer_delimiter("20200101"), Err(Error::DelimiterNotFound)));
    }

    #[test]
    fn test_translate_patterns() {
        assert_eq!(DateFormat::new("yyyy-MM-dd").chrono(), "%Y-%m-%d");
        assert_eq!(DateFormat::new("M/d/yy").chrono(), "%m/%d/%y");
        assert_eq!(DateFormat::new("dd-MMM-yyyy").chrono(), "%d-%b-%Y");
        assert_eq!(DateFormat::new("yyyy-MM-dd HH:mm").chrono(), "%Y-%m-%d %H:%M");
        assert_eq!(DateFormat::new("hh:mm tt").chrono(), "%I:%M %p");
    }

    #[test]
    fn test_time_component_toggle() {
        let f = DateFormat::new("yyyy-MM-dd");
        assert!(!f.has_time());
        assert_eq!(f.with_time().pattern(), "yyyy-MM-dd HH:mm");
        assert_eq!(f.with_time().without_time().pattern(), "yyyy-MM-dd");
        assert_eq!(DateFormat::new("dd.MM.yyyy HH:mm:ss").without_time().pattern(), "dd.MM.yyyy");
    }

    #[test]
    fn test_parse_configured_format() {
        let parser = DateParser::new(DateFormat::new("dd.MM.yyyy"));
        assert_eq!(parser.parse("05.02.2020", None), Some(dt(2020, 2, 5, 0, 0)));
    }

    #[test]
    fn test_parse_with_other_separators() {
        let parser = DateParser::new(DateFormat::new("dd-MM-yyyy"));
        // generic layouts read slashes month-first, which rejects month 13
        assert_eq!(parser.parse("13/02/2020", None), Some(dt(2020, 2, 13, 0, 0)));
    }

    #[test]
    fn test_parse_generic_fallback() {
        let parser = DateParser::new(DateFormat::new("dd.MM.yyyy"));
        assert_eq!(parser.parse("2020-02-05", None), Some(dt(2020, 2, 5, 0, 0)));
        assert_eq!(parser.parse("20200205", None), Some(dt(2020, 2, 5, 0, 0)));
        assert_eq!(parser.parse("not a date", None), None);
        assert_eq!(parser.parse("", None), None);
    }

    #[test]
    fn test_parse_intraday_and_time_column() {
        let parser = DateParser::new(DateFormat::new("yyyy-MM-dd HH:mm"));
        assert_eq!(parser.parse("2020-02-05 09:30", None), Some(dt(2020, 2, 5, 9, 30)));
        assert_eq!(parser.parse("2020-02-05", Some("0945")), Some(dt(2020, 2, 5, 9, 45)));
        assert_eq!(parser.parse("2020-02-05", Some("nope")), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12.345", false), Some((12.345, 3)));
        assert_eq!(parse_number(" 7 ", false), Some((7.0, 0)));
        assert_eq!(parse_number("1,234.5", false), Some((1234.5, 1)));
        assert_eq!(parse_number("12,5", true), Some((12.5, 1)));
        assert_eq!(parse_number("\"3.25\"", false), Some((3.25, 2)));
        assert_eq!(parse_number("abc", false), None);
        assert_eq!(parse_number("", false), None);
        assert_eq!(parse_number("NaN", false), None);
    }

    #[test]
    fn test_decimals_capped() {
        let (_, decimals) = parse_number("1.12345678901234567890", false).unwrap();
        assert_eq!(decimals, 15);
    }
}
