//! Field value types

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The value held by a worksheet field
///
/// The [`Display`](fmt::Display) form is canonical and is what the store
/// persists; [`Value::parse`] accepts exactly that form.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// No value. Distinct from zero and from empty text.
    #[default]
    Undefined,

    /// Text value
    Text(String),

    /// Decimal number; its scale is part of the value
    Number(Decimal),

    /// Boolean value
    Bool(bool),

    /// Ordered sequence of values
    Slice(Vec<Value>),

    /// Identity of another worksheet
    Ref(Uuid),
}

impl Value {
    /// Create a new text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    /// Create a number from a mantissa and a scale, e.g. `(1250, 2)` is `12.50`
    pub fn number(mantissa: i64, scale: u32) -> Self {
        Value::Number(Decimal::new(mantissa, scale))
    }

    /// Check if the value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the value as text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the value as a slice
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Slice(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get the referenced worksheet id
    pub fn as_ref_id(&self) -> Option<Uuid> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the kind name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Slice(_) => "slice",
            Value::Ref(_) => "ref",
        }
    }

    /// Parse the canonical text form of a value
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = ValueParser::new(text);
        let value = parser.parse_value()?;

        parser.skip_whitespace();
        if !parser.is_at_end() {
            return Err(Error::invalid(format!(
                "unexpected characters after value: '{}'",
                &parser.input[parser.pos..]
            )));
        }

        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Text(s) => write_quoted(f, s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Slice(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Ref(id) => write!(f, "*{}", id.hyphenated()),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

impl FromStr for Value {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Value::parse(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Ref(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Slice(items)
    }
}

/// Recursive descent parser for the canonical value form
struct ValueParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ValueParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_value(&mut self) -> Result<Value> {
        self.skip_whitespace();

        match self.peek_char() {
            None => Err(Error::invalid("empty input")),
            Some('"') => self.parse_text(),
            Some('[') => self.parse_slice(),
            Some('*') => self.parse_ref(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => self.parse_word(),
            Some(c) => Err(Error::invalid(format!("unexpected character '{}'", c))),
        }
    }

    fn parse_text(&mut self) -> Result<Value> {
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(Error::invalid("unterminated text")),
                Some('"') => {
                    self.advance();
                    return Ok(Value::Text(s));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek_char() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some(c) => {
                            return Err(Error::invalid(format!("unknown escape '\\{}'", c)))
                        }
                        None => return Err(Error::invalid("unterminated escape")),
                    };
                    s.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn parse_slice(&mut self) -> Result<Value> {
        self.advance(); // Skip '['

        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek_char() == Some(']') {
            self.advance();
            return Ok(Value::Slice(items));
        }

        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek_char() {
                Some(',') => self.advance(),
                Some(']') => {
                    self.advance();
                    return Ok(Value::Slice(items));
                }
                _ => return Err(Error::invalid("expected ',' or ']' in slice")),
            }
        }
    }

    fn parse_ref(&mut self) -> Result<Value> {
        self.advance(); // Skip '*'

        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_hexdigit() || c == '-')
        {
            self.advance();
        }

        let id = &self.input[start..self.pos];
        Uuid::parse_str(id)
            .map(Value::Ref)
            .map_err(|e| Error::invalid(format!("bad worksheet reference '{}': {}", id, e)))
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.advance();
        }
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[start..self.pos];
        Decimal::from_str_exact(text)
            .map(Value::Number)
            .map_err(|e| Error::invalid(format!("bad number '{}': {}", text, e)))
    }

    fn parse_word(&mut self) -> Result<Value> {
        let start = self.pos;
        while self.peek_char().map_or(false, |c| c.is_ascii_alphabetic()) {
            self.advance();
        }

        match &self.input[start..self.pos] {
            "undefined" => Ok(Value::Undefined),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(Error::invalid(format!("unknown literal '{}'", other))),
        }
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}
