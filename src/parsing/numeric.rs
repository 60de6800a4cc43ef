use crate::matrix::Cell;
use once_cell::sync::Lazy;
use regex::Regex;

/// Currency units recognized in table headers and inline cell suffixes,
/// longest first so that "천원" wins over "원".
const UNITS: [(&str, f64); 10] = [
    ("억원", 100_000_000.0),
    ("천만원", 10_000_000.0),
    ("백만원", 1_000_000.0),
    ("십만원", 100_000.0),
    ("만원", 10_000.0),
    ("천원", 1_000.0),
    ("백원", 100.0),
    ("십원", 10.0),
    ("원", 1.0),
    ("USD", 1.0),
];

static RE_NEGATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((-?[\d.]+)\)|\(-\)([\d.]+)").unwrap());
static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ㄱ-힣a-zA-Z]").unwrap());
static RE_UNIT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(단위\s*?:\s*(.*?)\)").unwrap());
static RE_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]|\(.*?\)|<.*?>").unwrap());

/// Resolves a currency-unit string ("천원", "백만원", "USD", ...) to its
/// multiplier. Whitespace inside the unit text is ignored.
pub fn unit_multiplier(unit: &str) -> Option<f64> {
    let stripped: String = unit.chars().filter(|c| !c.is_whitespace()).collect();
    UNITS
        .iter()
        .find(|(name, _)| stripped == *name)
        .map(|(_, mult)| *mult)
}

/// Finds the first (longest-match) currency unit embedded anywhere in `text`.
pub fn find_unit(text: &str) -> Option<(&'static str, f64)> {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    UNITS
        .iter()
        .find(|(name, _)| stripped.contains(name))
        .map(|(name, mult)| (*name, *mult))
}

/// Extracts the unit from a "(단위: ...)" marker, returning its name and
/// multiplier.
pub fn unit_from_marker(text: &str) -> Option<(&'static str, f64)> {
    let captured = RE_UNIT_MARKER.captures(text)?;
    find_unit(captured.get(1)?.as_str())
}

/// Display currency for a unit string, used in materialized table titles.
pub fn currency_of(unit: &str) -> Option<&'static str> {
    if unit.contains('원') {
        Some("KRW")
    } else if unit.contains("USD") {
        Some("USD")
    } else {
        None
    }
}

/// Parses a displayed table cell into a normalized numeric cell.
///
/// Thousands separators and whitespace are stripped; `(1,234)` and `(-)1234`
/// denote negation. The result is multiplied by the table-level unit so stored
/// values are always in the smallest reporting unit. A unit suffix embedded in
/// the cell itself ("1,234천원") overrides the table unit for that cell.
/// Unparseable text yields the no-data sentinel, never a silent zero.
pub fn parse_cell(text: &str, table_unit: f64) -> Cell {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Cell::Empty;
    }

    if RE_NON_NUMERIC.is_match(&cleaned) {
        // Inline unit override: the embedded unit replaces the table unit.
        let multiplier = match find_unit(&cleaned) {
            Some((_, inline_unit)) => inline_unit,
            None => table_unit,
        };
        let numeric = RE_NON_NUMERIC.replace_all(&cleaned, "");
        return match parse_signed(&numeric) {
            Some(value) => Cell::Number(value * multiplier),
            None => Cell::Empty,
        };
    }

    match parse_signed(&cleaned) {
        Some(value) => Cell::Number(value * table_unit),
        None => Cell::Empty,
    }
}

/// Parses a plain or parenthesized-negative number.
fn parse_signed(text: &str) -> Option<f64> {
    if let Some(captured) = RE_NEGATIVE.captures(text) {
        let digits = captured.get(1).or_else(|| captured.get(2))?.as_str();
        return digits.parse::<f64>().ok().map(|v| -v.abs());
    }
    text.parse::<f64>().ok()
}

/// Strips leading outline numbering, bracketed footnote markers, and every
/// non-letter character from an account title, producing the canonical form
/// used for label-based row matching.
///
/// `"1. 유동자산 [주석 3]"` and `"유동자산"` canonicalize identically.
pub fn canonical_title(title: &str) -> String {
    let parts: Vec<&str> = title.split('.').collect();
    let joined;
    let body = if parts.len() > 1 {
        joined = parts[1..].join("");
        joined.as_str()
    } else {
        parts[0]
    };
    let without_brackets = RE_BRACKETS.replace_all(body, "");
    without_brackets
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || ('가'..='힣').contains(c))
        .collect()
}
