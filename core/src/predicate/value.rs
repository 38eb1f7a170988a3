//! Runtime values and JavaScript-style coercions

use crate::data::{Cell, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::borrow::Cow;

/// A value produced while evaluating a predicate against one row
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Cow<'a, str>),
    Array(Vec<Value<'a>>),
    Regex { regex: &'a Regex, global: bool },
    /// Milliseconds since the Unix epoch, NaN for an invalid date
    Date(f64),
    Row(&'a Row),
}

impl<'a> Value<'a> {
    pub fn from_cell(cell: &'a Cell) -> Self {
        match cell {
            Cell::Text(s) => Value::Str(Cow::Borrowed(s)),
            Cell::Number(n) => Value::Number(*n),
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Empty => Value::Str(Cow::Borrowed("")),
        }
    }

    pub fn str<S: Into<String>>(s: S) -> Self {
        Value::Str(Cow::Owned(s.into()))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Null | Value::Array(_) | Value::Regex { .. } | Value::Date(_) | Value::Row(_) => {
                "object"
            }
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Regex { .. } | Value::Date(_) | Value::Row(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Date(ms) => *ms,
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            Value::Regex { .. } | Value::Row(_) => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> Cow<'_, str> {
        match self {
            Value::Undefined => Cow::Borrowed("undefined"),
            Value::Null => Cow::Borrowed("null"),
            Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Number(n) => Cow::Owned(format_number(*n)),
            Value::Str(s) => Cow::Borrowed(s.as_ref()),
            Value::Array(items) => Cow::Owned(join_array(items, ",")),
            Value::Regex { regex, global } => {
                Cow::Owned(format!("/{}/{}", regex.as_str(), if *global { "g" } else { "" }))
            }
            Value::Date(ms) => Cow::Owned(format_date(*ms)),
            Value::Row(_) => Cow::Borrowed("[object Object]"),
        }
    }

    /// Object-to-primitive conversion used by `+`, `==` and relational operators
    pub fn to_primitive(&self) -> Value<'a> {
        match self {
            Value::Array(_) | Value::Regex { .. } | Value::Row(_) | Value::Date(_) => {
                Value::str(self.to_js_string().into_owned())
            }
            other => other.clone(),
        }
    }

    fn is_object(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Regex { .. } | Value::Date(_) | Value::Row(_)
        )
    }
}

pub fn join_array(items: &[Value<'_>], separator: &str) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.to_js_string().into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// `===`
pub fn strict_equals(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Row(a), Value::Row(b)) => std::ptr::eq(*a, *b),
        _ => false,
    }
}

/// Equality used by `Array.prototype.includes`: like `===` but NaN equals NaN
pub fn same_value_zero(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => strict_equals(left, right),
    }
}

/// `==`
pub fn loose_equals(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (a, b) if a.is_nullish() || b.is_nullish() => false,
        (Value::Number(a), Value::Str(b)) => *a == string_to_number(b),
        (Value::Str(a), Value::Number(b)) => string_to_number(a) == *b,
        (Value::Bool(a), other) => loose_equals(&Value::Number(bool_number(*a)), other),
        (other, Value::Bool(b)) => loose_equals(other, &Value::Number(bool_number(*b))),
        (a, b) if a.is_object() && !b.is_object() => loose_equals(&a.to_primitive(), b),
        (a, b) if !a.is_object() && b.is_object() => loose_equals(a, &b.to_primitive()),
        (a, b) => strict_equals(a, b),
    }
}

fn bool_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Abstract relational comparison; `None` when either side is NaN
pub fn compare(left: &Value<'_>, right: &Value<'_>) -> Option<std::cmp::Ordering> {
    let left = relational_primitive(left);
    let right = relational_primitive(right);
    if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
        return Some(a.as_ref().cmp(b.as_ref()));
    }
    left.to_number().partial_cmp(&right.to_number())
}

/// Dates compare by their timestamp, other objects by their string form
fn relational_primitive<'v>(value: &Value<'v>) -> Value<'v> {
    match value {
        Value::Date(ms) => Value::Number(*ms),
        other => other.to_primitive(),
    }
}

/// `Number(text)`: whole-string conversion, empty or blank text is 0
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust accepts "inf" and "nan" spellings that JavaScript does not
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// `parseFloat(text)`: longest numeric prefix after leading whitespace
pub fn parse_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut has_digits = i > digits_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let fraction_start = i + 1;
        let mut j = fraction_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if has_digits || j > fraction_start {
            has_digits = true;
            i = j;
        }
    }
    if !has_digits {
        return f64::NAN;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exponent_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exponent_start {
            i = j;
        }
    }

    s[..i].parse::<f64>().unwrap_or(f64::NAN)
}

/// `parseInt(text, radix)`
pub fn parse_int(s: &str, radix: Option<u32>) -> f64 {
    let mut s = s.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = radix.unwrap_or(0);
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0_f64, |acc, d| acc * radix as f64 + d as f64);
    sign * value
}

/// JavaScript `Number.prototype.toString()` formatting
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{n:.0}");
    }
    format!("{n}")
}

/// Parse the date formats that show up in spreadsheets; NaN when unparseable
pub fn parse_date(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return f64::NAN;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis() as f64;
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return dt.and_utc().timestamp_millis() as f64;
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return dt.and_utc().timestamp_millis() as f64;
            }
        }
    }
    f64::NAN
}

pub fn date_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
}

fn format_date(ms: f64) -> String {
    match date_from_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => "Invalid Date".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_prefixes() {
        assert_eq!(parse_float("120"), 120.0);
        assert_eq!(parse_float("  3.5kg"), 3.5);
        assert_eq!(parse_float("-.5"), -0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("2e"), 2.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("$100").is_nan());
        assert!(parse_float("").is_nan());
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("-7.9", None), -7.0);
        assert_eq!(parse_int("0x1f", None), 31.0);
        assert_eq!(parse_int("101", Some(2)), 5.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number(" 12 "), 12.0);
        assert!(string_to_number("12abc").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
    }

    #[test]
    fn test_equality() {
        let one = Value::Number(1.0);
        let text_one = Value::str("1");
        assert!(loose_equals(&one, &text_one));
        assert!(!strict_equals(&one, &text_one));
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(&Value::Bool(true), &text_one));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(same_value_zero(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_compare_strings_and_numbers() {
        use std::cmp::Ordering;
        assert_eq!(compare(&Value::str("b"), &Value::str("a")), Some(Ordering::Greater));
        assert_eq!(compare(&Value::str("10"), &Value::Number(9.0)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::str("x"), &Value::Number(9.0)), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(120.0), "120");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_parse_date() {
        let may = parse_date("2024-05-17");
        let dt = date_from_millis(may).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-05-17");
        assert!(!parse_date("05/17/2024").is_nan());
        assert!(!parse_date("2024-05-17T10:00:00Z").is_nan());
        assert!(parse_date("someday").is_nan());
    }
}
