//! Free-text spreadsheet cell parsing: delays, order numbers, header columns.
//!
//! Sheets are edited by hand, so every reader here is best-effort and never
//! fails: anything unreadable becomes `0` or the column's default position.

use regex::Regex;
use std::sync::LazyLock;

static ORDER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"số.*gửi|order|step").expect("static regex"));
static DELAY_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"thời gian|delay|hour").expect("static regex"));
static MESSAGE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"nội dung|message|content").expect("static regex"));

/// Column positions of the three fields a template row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub order: usize,
    pub delay: usize,
    pub message: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self { order: 0, delay: 1, message: 3 }
    }
}

/// Locate columns by fuzzy header name. Falls back per column.
pub fn detect_columns(header: &[String]) -> ColumnMap {
    let headers: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let find = |pattern: &Regex, fallback: usize| {
        headers
            .iter()
            .position(|h| pattern.is_match(h))
            .unwrap_or(fallback)
    };
    let defaults = ColumnMap::default();
    ColumnMap {
        order: find(&ORDER_HEADER, defaults.order),
        delay: find(&DELAY_HEADER, defaults.delay),
        message: find(&MESSAGE_HEADER, defaults.message),
    }
}

/// Read a delay cell as hours.
///
/// `"2"` → 2.0, `"1,5h"` → 1.5, `"90m"` → 1.5 (a cell mentioning `m` but no
/// `h` is minutes), anything unreadable → 0.
pub fn parse_delay_to_hours(text: Option<&str>) -> f64 {
    let Some(raw) = text else { return 0.0 };
    if raw.is_empty() {
        return 0.0;
    }
    let normalized = raw.replacen(',', ".", 1).trim().to_lowercase();
    let numeric: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let Some(value) = parse_float_prefix(&numeric) else {
        return 0.0;
    };
    if normalized.contains('m') && !normalized.contains('h') {
        value / 60.0
    } else {
        value
    }
}

/// Read an order cell. Unreadable → 0.
pub fn parse_order(text: Option<&str>) -> i64 {
    let trimmed = text.unwrap_or("").trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return v;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .unwrap_or(0)
}

/// Longest prefix of `s` that reads as a finite float (`"1.5.2"` → 1.5).
fn parse_float_prefix(s: &str) -> Option<f64> {
    (1..=s.len())
        .rev()
        .filter(|&end| s.is_char_boundary(end))
        .find_map(|end| s[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
