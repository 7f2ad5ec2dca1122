//! Typed field values and the text coercion rules that produce them

use crate::units::{Quantity, Unit};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A coerced field value
///
/// Serializes untagged, so integers and floats stay distinguishable
/// (`1` vs `1.0`) and strings keep their quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// `None` in the report, or an element without text
    Null,
    /// `True` / `False`
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value (quoted literal or uncoercible text)
    String(String),
    /// Number with an attached physical unit
    Quantity(Quantity),
}

/// A single typed parser tried by [`Value::coerce`]
type LiteralParser = fn(&str) -> Option<Value>;

/// Parsers in priority order; the first success wins.
const LITERAL_PARSERS: &[LiteralParser] = &[
    parse_null,
    parse_bool,
    parse_integer,
    parse_float,
    parse_quoted,
];

impl Value {
    /// Coerce raw element text into its most specific type
    ///
    /// Never fails: text that is not a recognised literal comes back
    /// unchanged as [`Value::String`].
    pub fn coerce(text: &str) -> Self {
        let trimmed = text.trim();
        LITERAL_PARSERS
            .iter()
            .find_map(|parse| parse(trimmed))
            .unwrap_or_else(|| Value::String(text.to_string()))
    }

    /// Coerce optional element text; a missing text node is `Null`
    pub fn coerce_opt(text: Option<&str>) -> Self {
        text.map(Self::coerce).unwrap_or(Value::Null)
    }

    /// Check if the value is a bare number (a candidate for unit attachment)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Attach a unit to a bare number; other values pass through unchanged
    pub fn with_unit(self, unit: Unit) -> Self {
        match self {
            Value::Integer(i) => Value::Quantity(Quantity::new(i as f64, unit)),
            Value::Float(f) => Value::Quantity(Quantity::new(f, unit)),
            other => other,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Quantity(q) => Some(q.value),
            _ => None,
        }
    }

    /// Append a type-tagged encoding of the value to `key`
    ///
    /// Values encode alike exactly when they are the same value: `1` and `1.0`
    /// differ, infinities stay apart from `Null`, and `-0.0` encodes as `0.0`.
    pub(crate) fn write_key(&self, key: &mut String) {
        let _ = match self {
            Value::Null => write!(key, "N"),
            Value::Bool(b) => write!(key, "B{}", b),
            Value::Integer(i) => write!(key, "I{}", i),
            Value::Float(f) => write!(key, "F{:?}", unsigned_zero(*f)),
            Value::String(s) => write!(key, "S{:?}", s),
            Value::Quantity(q) => {
                write!(key, "Q{:?} {:?}", unsigned_zero(q.value), q.unit.to_string())
            }
        };
    }

    /// Convert to a display string (empty for null)
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Integer(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" so floats never print as integers
            Value::Float(fl) => write!(f, "{:?}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Quantity(q) => write!(f, "{}", q),
        }
    }
}

fn unsigned_zero(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else {
        f
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Quantity> for Value {
    fn from(q: Quantity) -> Self {
        Value::Quantity(q)
    }
}

fn parse_null(s: &str) -> Option<Value> {
    (s == "None").then_some(Value::Null)
}

fn parse_bool(s: &str) -> Option<Value> {
    match s {
        "True" => Some(Value::Bool(true)),
        "False" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn parse_integer(s: &str) -> Option<Value> {
    let (sign, body) = split_sign(s);

    let (radix, digits) = match body.get(..2) {
        Some("0x" | "0X") => (16, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        Some("0o" | "0O") => (8, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        Some("0b" | "0B") => (2, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        _ => (10, body),
    };

    let digits = remove_digit_separators(digits)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    // Decimal literals with leading zeros ("007") are not integers
    if radix == 10 && digits.len() > 1 && digits.starts_with('0') && digits.bytes().any(|b| b != b'0')
    {
        return None;
    }

    i64::from_str_radix(&format!("{}{}", sign, digits), radix)
        .ok()
        .map(Value::Integer)
}

fn parse_float(s: &str) -> Option<Value> {
    let (sign, body) = split_sign(s);
    let body = remove_digit_separators(body)?;

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body.as_str(), None),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !frac_part.is_none_or(all_digits) {
        return None;
    }
    if int_part.is_empty() && frac_part.is_none_or(str::is_empty) {
        return None;
    }

    match exponent {
        Some(exp) => {
            let exp_digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if exp_digits.is_empty() || !all_digits(exp_digits) {
                return None;
            }
        }
        // Without a '.' or exponent this is an integer literal, not a float
        None if frac_part.is_none() => return None,
        None => {}
    }

    format!("{}{}", sign, body).parse::<f64>().ok().map(Value::Float)
}

fn parse_quoted(s: &str) -> Option<Value> {
    let quote = s.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = s.strip_prefix(quote)?.strip_suffix(quote)?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'x' => out.push(hex_escape(&mut chars, 2)?),
                'u' => out.push(hex_escape(&mut chars, 4)?),
                other => {
                    // Unknown escapes are kept verbatim
                    out.push('\\');
                    out.push(other);
                }
            },
            '\n' => return None,
            c if c == quote => return None,
            c => out.push(c),
        }
    }

    Some(Value::String(out))
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let code: String = chars.by_ref().take(len).collect();
    if code.len() != len {
        return None;
    }
    u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
}

fn split_sign(s: &str) -> (&'static str, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        ("-", rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        ("", rest)
    } else {
        ("", s)
    }
}

/// Strip `_` separators, which are only legal between two alphanumerics
fn remove_digit_separators(s: &str) -> Option<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());

    for (i, &c) in chars.iter().enumerate() {
        if c != '_' {
            out.push(c);
            continue;
        }
        let before = i.checked_sub(1).map(|j| chars[j]);
        let after = chars.get(i + 1).copied();
        match (before, after) {
            (Some(x), Some(y)) if x.is_ascii_alphanumeric() && y.is_ascii_alphanumeric() => {}
            _ => return None,
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integer() {
        assert_eq!(Value::coerce("1"), Value::Integer(1));
        assert_eq!(Value::coerce("-123"), Value::Integer(-123));
        assert_eq!(Value::coerce("+7"), Value::Integer(7));
        assert_eq!(Value::coerce("0"), Value::Integer(0));
        assert_eq!(Value::coerce("1_000"), Value::Integer(1000));
        assert_eq!(Value::coerce("0x1F"), Value::Integer(31));
        assert_eq!(Value::coerce("-0b101"), Value::Integer(-5));
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(Value::coerce("1.5"), Value::Float(1.5));
        assert_eq!(Value::coerce("258.2"), Value::Float(258.2));
        assert_eq!(Value::coerce("-2.5"), Value::Float(-2.5));
        assert_eq!(Value::coerce(".5"), Value::Float(0.5));
        assert_eq!(Value::coerce("1."), Value::Float(1.0));
        assert_eq!(Value::coerce("1e3"), Value::Float(1000.0));
        assert_eq!(Value::coerce("-2.5E-3"), Value::Float(-0.0025));
        assert_eq!(Value::coerce("0.0"), Value::Float(0.0));
    }

    #[test]
    fn test_coerce_quoted_string() {
        assert_eq!(
            Value::coerce("'Single mid span'"),
            Value::String("Single mid span".to_string())
        );
        assert_eq!(Value::coerce("\"TERM\""), Value::String("TERM".to_string()));
        assert_eq!(Value::coerce(r"'it\'s'"), Value::String("it's".to_string()));
        assert_eq!(Value::coerce("''"), Value::String(String::new()));
    }

    #[test]
    fn test_coerce_literals() {
        assert_eq!(Value::coerce("None"), Value::Null);
        assert_eq!(Value::coerce("True"), Value::Bool(true));
        assert_eq!(Value::coerce("False"), Value::Bool(false));
        assert_eq!(Value::coerce("  42  "), Value::Integer(42));
    }

    #[test]
    fn test_coerce_fallback_keeps_original_text() {
        assert_eq!(Value::coerce("TERM"), Value::String("TERM".to_string()));
        assert_eq!(Value::coerce("none"), Value::String("none".to_string()));
        assert_eq!(Value::coerce("inf"), Value::String("inf".to_string()));
        assert_eq!(Value::coerce("nan"), Value::String("nan".to_string()));
        assert_eq!(Value::coerce("007"), Value::String("007".to_string()));
        assert_eq!(Value::coerce("1__0"), Value::String("1__0".to_string()));
        assert_eq!(Value::coerce("'open"), Value::String("'open".to_string()));
        assert_eq!(Value::coerce("'a'b'"), Value::String("'a'b'".to_string()));
        assert_eq!(Value::coerce("[1, 2]"), Value::String("[1, 2]".to_string()));
        assert_eq!(Value::coerce(" "), Value::String(" ".to_string()));
        assert_eq!(Value::coerce(""), Value::String(String::new()));
    }

    #[test]
    fn test_coerce_integer_overflow_falls_back() {
        let big = "123456789012345678901234567890";
        assert_eq!(Value::coerce(big), Value::String(big.to_string()));
    }

    #[test]
    fn test_coerce_opt_missing_text_is_null() {
        assert_eq!(Value::coerce_opt(None), Value::Null);
        assert_eq!(Value::coerce_opt(Some("3")), Value::Integer(3));
    }

    #[test]
    fn test_with_unit_only_wraps_numbers() {
        let ft = crate::units::resolve_unit("ft").unwrap();
        let q = Value::Float(258.2).with_unit(ft.clone());
        assert_eq!(q, Value::Quantity(Quantity::new(258.2, ft.clone())));
        assert_eq!(Value::Integer(3).with_unit(ft.clone()).as_f64(), Some(3.0));
        assert_eq!(Value::from("TERM").with_unit(ft.clone()), Value::from("TERM"));
        assert_eq!(Value::Null.with_unit(ft), Value::Null);
    }

    #[test]
    fn test_display_keeps_float_marker() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Integer(1).to_string(), "1");
        assert_eq!(Value::Null.to_string_value(), "");
    }

    #[test]
    fn test_serialization_distinguishes_types() {
        let int = serde_json::to_string(&Value::Integer(1)).unwrap();
        let float = serde_json::to_string(&Value::Float(1.0)).unwrap();
        let string = serde_json::to_string(&Value::String("1".to_string())).unwrap();
        assert_ne!(int, float);
        assert_ne!(int, string);
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
    }
}
