//! Built-in functions

use crate::error::{EvalResult, EvaluationError};
use rust_decimal::Decimal;
use std::fmt;
use worksheets_core::Value;

/// Built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `len(slice | text)`: number of elements or characters
    Len,
    /// `sum(slice)`: sum of a slice of numbers
    Sum,
    /// `if(cond, then, else)`: only the chosen branch is evaluated
    If,
}

impl Function {
    /// Look up a function by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Function::Len),
            "sum" => Some(Function::Sum),
            "if" => Some(Function::If),
            _ => None,
        }
    }

    /// Function name
    pub fn name(self) -> &'static str {
        match self {
            Function::Len => "len",
            Function::Sum => "sum",
            Function::If => "if",
        }
    }

    /// Number of arguments
    pub fn arity(self) -> usize {
        match self {
            Function::Len | Function::Sum => 1,
            Function::If => 3,
        }
    }

    pub(crate) fn check_arity(self, actual: usize) -> EvalResult<()> {
        if actual != self.arity() {
            return Err(EvaluationError::ArgumentCount {
                function: self.name(),
                expected: self.arity(),
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LEN
pub(crate) fn fn_len(arg: &Value) -> EvalResult<Value> {
    match arg {
        Value::Undefined => Ok(Value::Undefined),
        Value::Slice(items) => Ok(Value::from(items.len() as i64)),
        Value::Text(s) => Ok(Value::from(s.chars().count() as i64)),
        other => Err(EvaluationError::mismatch(format!(
            "len expects a slice or text, got {}",
            other.kind()
        ))),
    }
}

/// SUM
pub(crate) fn fn_sum(arg: &Value) -> EvalResult<Value> {
    let items = match arg {
        Value::Undefined => return Ok(Value::Undefined),
        Value::Slice(items) => items,
        other => {
            return Err(EvaluationError::mismatch(format!(
                "sum expects a slice, got {}",
                other.kind()
            )))
        }
    };

    let mut total = Decimal::ZERO;
    for item in items {
        match item {
            Value::Undefined => return Ok(Value::Undefined),
            Value::Number(n) => {
                total = total.checked_add(*n).ok_or(EvaluationError::Overflow)?;
            }
            other => {
                return Err(EvaluationError::mismatch(format!(
                    "sum expects numbers, got {}",
                    other.kind()
                )))
            }
        }
    }
    Ok(Value::Number(total))
}
