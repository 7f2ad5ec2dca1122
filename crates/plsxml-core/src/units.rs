//! Physical units for report fields
//!
//! Report fields may carry a `units` attribute such as `ft`, `lbs/ft` or
//! `degrees Fahrenheit`. The string is normalized through a fixed
//! substitution table, then parsed against a registry of named units
//! (SI, imperial, and the PLS-CADD spellings `Sec`, `lbs`, `kips`, `plf`,
//! `psi`, `psf`, `pcf`, `ksi`).

use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use thiserror::Error;

/// Number of base dimensions tracked per unit
const BASE_DIMENSIONS: usize = 6;

/// Exponents of length, mass, time, temperature, angle, current
pub type Dimensions = [i8; BASE_DIMENSIONS];

const DIMENSIONLESS: Dimensions = [0, 0, 0, 0, 0, 0];
const LENGTH: Dimensions = [1, 0, 0, 0, 0, 0];
const MASS: Dimensions = [0, 1, 0, 0, 0, 0];
const TIME: Dimensions = [0, 0, 1, 0, 0, 0];
const TEMPERATURE: Dimensions = [0, 0, 0, 1, 0, 0];
const ANGLE: Dimensions = [0, 0, 0, 0, 1, 0];
const CURRENT: Dimensions = [0, 0, 0, 0, 0, 1];
const FREQUENCY: Dimensions = [0, 0, -1, 0, 0, 0];
const SPEED: Dimensions = [1, 0, -1, 0, 0, 0];
const FORCE: Dimensions = [1, 1, -2, 0, 0, 0];
const PRESSURE: Dimensions = [-1, 1, -2, 0, 0, 0];
const WEIGHT_DENSITY: Dimensions = [-2, 1, -2, 0, 0, 0];
const LINE_LOAD: Dimensions = [0, 1, -2, 0, 0, 0];
const POWER: Dimensions = [2, 1, -3, 0, 0, 0];
const VOLTAGE: Dimensions = [2, 1, -3, 0, 0, -1];
const RESISTANCE: Dimensions = [2, 1, -3, 0, 0, -2];

const INCH: f64 = 0.0254;
const FOOT: f64 = 0.3048;
const POUND_FORCE: f64 = 4.4482216152605;

/// A named unit in the registry; the first name is the canonical symbol
struct UnitDef {
    names: &'static [&'static str],
    scale: f64,
    dims: Dimensions,
}

const fn def(names: &'static [&'static str], scale: f64, dims: Dimensions) -> UnitDef {
    UnitDef { names, scale, dims }
}

/// Scales are relative to SI base units (m, kg, s, K, rad, A)
static REGISTRY: &[UnitDef] = &[
    def(&["m", "meter", "meters", "metre", "metres"], 1.0, LENGTH),
    def(&["mm", "millimeter", "millimeters"], 1e-3, LENGTH),
    def(&["cm", "centimeter", "centimeters"], 1e-2, LENGTH),
    def(&["km", "kilometer", "kilometers"], 1e3, LENGTH),
    def(&["in", "inch", "inches"], INCH, LENGTH),
    def(&["ft", "foot", "feet"], FOOT, LENGTH),
    def(&["yd", "yard", "yards"], 0.9144, LENGTH),
    def(&["mi", "mile", "miles"], 1609.344, LENGTH),
    def(&["kg", "kilogram", "kilograms"], 1.0, MASS),
    def(&["g", "gram", "grams"], 1e-3, MASS),
    def(&["lb", "lbm", "pound", "pounds"], 0.45359237, MASS),
    def(&["slug", "slugs"], 14.593902937206364, MASS),
    def(&["s", "Sec", "sec", "second", "seconds"], 1.0, TIME),
    def(&["min", "minute", "minutes"], 60.0, TIME),
    def(&["h", "hr", "hour", "hours"], 3600.0, TIME),
    def(&["Hz", "hertz"], 1.0, FREQUENCY),
    def(&["mph"], 0.44704, SPEED),
    def(&["K", "kelvin"], 1.0, TEMPERATURE),
    def(&["deg_C", "degC", "Celsius"], 1.0, TEMPERATURE),
    def(&["deg_F", "degF", "Fahrenheit"], 5.0 / 9.0, TEMPERATURE),
    def(&["rad", "radian", "radians"], 1.0, ANGLE),
    def(&["deg", "degree", "degrees"], PI / 180.0, ANGLE),
    def(&["N", "newton", "newtons"], 1.0, FORCE),
    def(&["kN"], 1e3, FORCE),
    def(&["lbf", "lbs"], POUND_FORCE, FORCE),
    def(&["kip", "kips"], 1000.0 * POUND_FORCE, FORCE),
    def(&["Pa", "pascal"], 1.0, PRESSURE),
    def(&["kPa"], 1e3, PRESSURE),
    def(&["MPa"], 1e6, PRESSURE),
    def(&["GPa"], 1e9, PRESSURE),
    def(&["psi"], POUND_FORCE / (INCH * INCH), PRESSURE),
    def(&["psf"], POUND_FORCE / (FOOT * FOOT), PRESSURE),
    def(&["ksi"], 1000.0 * POUND_FORCE / (INCH * INCH), PRESSURE),
    def(&["pcf"], POUND_FORCE / (FOOT * FOOT * FOOT), WEIGHT_DENSITY),
    def(&["plf"], POUND_FORCE / FOOT, LINE_LOAD),
    def(&["A", "amp", "amps", "ampere", "amperes"], 1.0, CURRENT),
    def(&["V", "volt", "volts"], 1.0, VOLTAGE),
    def(&["kV"], 1e3, VOLTAGE),
    def(&["ohm", "Ohm", "ohms"], 1.0, RESISTANCE),
    def(&["W", "watt", "watts"], 1.0, POWER),
    def(&["kW"], 1e3, POWER),
    def(&["MW"], 1e6, POWER),
    def(&["%", "percent"], 0.01, DIMENSIONLESS),
];

/// Textual rewrites applied before parsing, in order
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("-", " "),
    ("degrees Fahrenheit", "deg_F"),
    ("degrees Celsius", "deg_C"),
    ("deg F", "deg_F"),
    ("deg C", "deg_C"),
];

/// Errors from resolving a unit string
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    /// A name in the unit string is not in the registry
    #[error("unknown unit '{name}' in '{unit}'")]
    Unknown { unit: String, name: String },

    /// The unit string does not follow the unit grammar
    #[error("invalid unit '{unit}': {message}")]
    Syntax { unit: String, message: String },

    /// Conversion between units of different dimensions
    #[error("cannot convert '{from}' to '{to}'")]
    Incompatible { from: String, to: String },
}

/// A resolved unit: a numeric factor times a product of named units
///
/// Two spellings that resolve to the same named units compare equal
/// (`ft` and `feet`, `lbs/ft` and `lbf / ft`).
#[derive(Debug, Clone)]
pub struct Unit {
    factor: f64,
    terms: BTreeMap<&'static str, i32>,
    scale: f64,
    dims: Dimensions,
}

impl Unit {
    /// The dimensionless unit with factor 1
    pub fn dimensionless() -> Self {
        Self::scalar(1.0)
    }

    fn scalar(factor: f64) -> Self {
        Self {
            factor,
            terms: BTreeMap::new(),
            scale: factor,
            dims: DIMENSIONLESS,
        }
    }

    fn named(def: &'static UnitDef) -> Self {
        Self {
            factor: 1.0,
            terms: BTreeMap::from([(def.names[0], 1)]),
            scale: def.scale,
            dims: def.dims,
        }
    }

    /// Parse a unit expression (no substitutions applied)
    pub fn parse(s: &str) -> Result<Self, UnitError> {
        let tokens = tokenize(s)?;
        if tokens.is_empty() {
            return Err(UnitError::Syntax {
                unit: s.to_string(),
                message: "empty unit".to_string(),
            });
        }

        let mut parser = ExprParser {
            source: s,
            tokens,
            pos: 0,
        };
        let unit = parser.product()?;
        match parser.peek() {
            None => Ok(unit),
            Some(token) => Err(parser.syntax(format!("unexpected {}", token.describe()))),
        }
    }

    /// Multiplier that converts a value in this unit to SI base units
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Base dimension exponents
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Whether values in both units can be converted into each other
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dims == other.dims
    }

    /// Check if the unit has no dimensions and no scaling
    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty() && self.factor == 1.0
    }

    /// Product of two units; `None` when an exponent overflows
    fn mul(mut self, other: Unit) -> Option<Self> {
        for (name, power) in other.terms {
            let entry = self.terms.entry(name).or_insert(0);
            *entry = entry.checked_add(power)?;
            if *entry == 0 {
                self.terms.remove(name);
            }
        }
        self.factor *= other.factor;
        self.scale *= other.scale;
        for (d, o) in self.dims.iter_mut().zip(other.dims) {
            *d = d.checked_add(o)?;
        }
        Some(self)
    }

    /// Integer power of a unit; `None` when an exponent overflows
    fn powi(mut self, n: i32) -> Option<Self> {
        for power in self.terms.values_mut() {
            *power = power.checked_mul(n)?;
        }
        self.terms.retain(|_, power| *power != 0);
        self.factor = self.factor.powi(n);
        self.scale = self.scale.powi(n);
        for d in self.dims.iter_mut() {
            *d = i8::try_from(i32::from(*d).checked_mul(n)?).ok()?;
        }
        Some(self)
    }
}

// Scale and dimensions follow from the terms, and products like `ft/ft`
// do not always cancel to an exact 1.0 scale.
impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.factor == other.factor && self.terms == other.terms
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_term = |name: &str, power: i32| {
            if power == 1 {
                name.to_string()
            } else {
                format!("{}^{}", name, power)
            }
        };

        let mut numerator: Vec<String> = Vec::new();
        if self.factor != 1.0 {
            numerator.push(self.factor.to_string());
        }
        numerator.extend(
            self.terms
                .iter()
                .filter(|(_, p)| **p > 0)
                .map(|(name, p)| fmt_term(name, *p)),
        );
        if numerator.is_empty() {
            numerator.push("1".to_string());
        }

        write!(f, "{}", numerator.join(" "))?;
        for (name, power) in self.terms.iter().filter(|(_, p)| **p < 0) {
            write!(f, " / {}", fmt_term(name, -power))?;
        }
        Ok(())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        resolve_unit(&s).map_err(serde::de::Error::custom)
    }
}

/// A number with a unit attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Create a new quantity
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// The value expressed in SI base units
    pub fn si_value(&self) -> f64 {
        self.value * self.unit.scale
    }

    /// Convert to another unit of the same dimensions
    ///
    /// Conversion is by scale only; temperatures are treated as intervals.
    pub fn to(&self, target: &Unit) -> Result<Quantity, UnitError> {
        if !self.unit.is_compatible(target) {
            return Err(UnitError::Incompatible {
                from: self.unit.to_string(),
                to: target.to_string(),
            });
        }
        Ok(Quantity::new(self.si_value() / target.scale, target.clone()))
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.unit.is_dimensionless() {
            write!(f, "{:?}", self.value)
        } else {
            write!(f, "{:?} {}", self.value, self.unit)
        }
    }
}

/// Apply the substitution table to a raw unit string
pub fn normalize_unit_str(s: &str) -> String {
    SUBSTITUTIONS
        .iter()
        .fold(s.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Normalize and parse a unit string from a report
pub fn resolve_unit(s: &str) -> Result<Unit, UnitError> {
    Unit::parse(&normalize_unit_str(s)).map_err(|e| match e {
        // Report the string as written, not the normalized form
        UnitError::Unknown { name, .. } => UnitError::Unknown {
            unit: s.to_string(),
            name,
        },
        UnitError::Syntax { message, .. } => UnitError::Syntax {
            unit: s.to_string(),
            message,
        },
        other => other,
    })
}

/// Attach the unit named by `unit_str` to a bare number
///
/// Values other than integers and floats come back unchanged and the unit
/// string is not examined.
pub fn attach_units(value: Value, unit_str: &str) -> Result<Value, UnitError> {
    if !value.is_number() {
        return Ok(value);
    }
    Ok(value.with_unit(resolve_unit(unit_str)?))
}

fn lookup(name: &str) -> Option<&'static UnitDef> {
    REGISTRY.iter().find(|def| def.names.contains(&name))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Unit name with an optional glued exponent (`ft2`)
    Name(String, Option<i32>),
    Number(f64),
    Star,
    Pow,
    Slash,
    Open,
    Close,
    Minus,
    Plus,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Name(name, _) => format!("'{}'", name),
            Token::Number(n) => format!("number {}", n),
            Token::Star => "'*'".to_string(),
            Token::Pow => "'^'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Plus => "'+'".to_string(),
        }
    }
}

fn tokenize(s: &str) -> Result<Vec<Token>, UnitError> {
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let take_while = |start: usize, pred: &dyn Fn(char) -> bool| {
        let mut end = start;
        while end < chars.len() && pred(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect::<String>(), end)
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Star);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (text, end) = take_while(i, &|c| c.is_ascii_digit() || c == '.');
                let number = text.parse::<f64>().map_err(|_| UnitError::Syntax {
                    unit: s.to_string(),
                    message: format!("invalid number '{}'", text),
                })?;
                tokens.push(Token::Number(number));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' || c == '%' => {
                let (name, end) = take_while(i, &|c| c.is_alphabetic() || c == '_' || c == '%');
                let (digits, end) = take_while(end, &|c| c.is_ascii_digit());
                let power = if digits.is_empty() {
                    None
                } else {
                    Some(digits.parse::<i32>().map_err(|_| UnitError::Syntax {
                        unit: s.to_string(),
                        message: format!("invalid exponent '{}'", digits),
                    })?)
                };
                tokens.push(Token::Name(name, power));
                i = end;
            }
            other => {
                return Err(UnitError::Syntax {
                    unit: s.to_string(),
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent over the token list
///
/// ```text
/// product  := factor (('*' | <space>) factor | '/' factor)*
/// factor   := atom (('^' | '**') exponent)?
/// atom     := name | number | '(' product ')'
/// exponent := ('+' | '-')? number | '(' exponent ')'
/// ```
struct ExprParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn syntax(&self, message: String) -> UnitError {
        UnitError::Syntax {
            unit: self.source.to_string(),
            message,
        }
    }

    fn checked(&self, unit: Option<Unit>) -> Result<Unit, UnitError> {
        unit.ok_or_else(|| self.syntax("exponent out of range".to_string()))
    }

    fn product(&mut self) -> Result<Unit, UnitError> {
        let mut unit = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    unit = self.checked(unit.mul(rhs))?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    let inverse = self.checked(rhs.powi(-1))?;
                    unit = self.checked(unit.mul(inverse))?;
                }
                Some(Token::Name(..) | Token::Number(_) | Token::Open) => {
                    let rhs = self.factor()?;
                    unit = self.checked(unit.mul(rhs))?;
                }
                _ => return Ok(unit),
            }
        }
    }

    fn factor(&mut self) -> Result<Unit, UnitError> {
        let atom = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let power = self.exponent()?;
            return self.checked(atom.powi(power));
        }
        Ok(atom)
    }

    fn atom(&mut self) -> Result<Unit, UnitError> {
        match self.next() {
            Some(Token::Name(name, power)) => {
                let def = lookup(&name).ok_or_else(|| UnitError::Unknown {
                    unit: self.source.to_string(),
                    name: name.clone(),
                })?;
                self.checked(Unit::named(def).powi(power.unwrap_or(1)))
            }
            Some(Token::Number(n)) => Ok(Unit::scalar(n)),
            Some(Token::Open) => {
                let inner = self.product()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.syntax("unbalanced parentheses".to_string())),
                }
            }
            Some(other) => Err(self.syntax(format!("unexpected {}", other.describe()))),
            None => Err(self.syntax("unexpected end of unit".to_string())),
        }
    }

    fn exponent(&mut self) -> Result<i32, UnitError> {
        match self.next() {
            Some(Token::Open) => {
                let power = self.exponent()?;
                match self.next() {
                    Some(Token::Close) => Ok(power),
                    _ => Err(self.syntax("unbalanced parentheses".to_string())),
                }
            }
            Some(Token::Minus) => self.exponent().map(|p| -p),
            Some(Token::Plus) => self.exponent(),
            Some(Token::Number(n)) if n.fract() == 0.0 && n.abs() <= i8::MAX as f64 => Ok(n as i32),
            _ => Err(self.syntax("exponent must be an integer".to_string())),
        }
    }
}
