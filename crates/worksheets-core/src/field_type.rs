//! Declared field types

use crate::error::{Error, Result};
use crate::value::Value;
use crate::MAX_SCALE;
use std::fmt;

/// The declared type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldType {
    /// `text`
    Text,
    /// `bool`
    Bool,
    /// `number(scale)`: decimal with exactly `scale` fractional digits
    Number { scale: u32 },
    /// `[]<element>`
    Slice(Box<FieldType>),
    /// Reference to a worksheet of the named definition
    Ref(String),
}

impl FieldType {
    /// Create a number type, checking the scale bound
    pub fn number(scale: u32) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(Error::invalid(format!(
                "number scale {} exceeds maximum of {}",
                scale, MAX_SCALE
            )));
        }
        Ok(FieldType::Number { scale })
    }

    /// Create a slice type of the given element type
    pub fn slice_of(element: FieldType) -> Self {
        FieldType::Slice(Box::new(element))
    }

    /// Element type if this is a slice type
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            FieldType::Slice(element) => Some(element),
            _ => None,
        }
    }

    /// Definition name if this is (or is a slice of) a reference type
    pub fn referenced_definition(&self) -> Option<&str> {
        match self {
            FieldType::Ref(name) => Some(name),
            FieldType::Slice(element) => element.referenced_definition(),
            _ => None,
        }
    }

    /// Check that `value` fits this type and normalize it.
    ///
    /// Undefined fits every type. Numbers are rescaled to the declared
    /// scale; a number carrying more fractional digits than declared is
    /// rejected rather than silently rounded.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Undefined) => Ok(Value::Undefined),
            (FieldType::Text, value @ Value::Text(_)) => Ok(value),
            (FieldType::Bool, value @ Value::Bool(_)) => Ok(value),
            (FieldType::Number { scale }, Value::Number(mut n)) => {
                if n.scale() > *scale {
                    return Err(Error::TypeMismatch {
                        expected: self.to_string(),
                        actual: format!("number({})", n.scale()),
                    });
                }
                n.rescale(*scale);
                Ok(Value::Number(n))
            }
            (FieldType::Slice(element), Value::Slice(items)) => items
                .into_iter()
                .map(|item| element.coerce(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Slice),
            (FieldType::Ref(_), value @ Value::Ref(_)) => Ok(value),
            (_, value) => Err(Error::TypeMismatch {
                expected: self.to_string(),
                actual: value.kind().to_string(),
            }),
        }
    }

    /// Parse a persisted value and coerce it to this type
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        self.coerce(Value::parse(text)?)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Number { scale } => write!(f, "number({})", scale),
            FieldType::Slice(element) => write!(f, "[]{}", element),
            FieldType::Ref(name) => write!(f, "{}", name),
        }
    }
}
