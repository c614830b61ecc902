//! Formula error types

use thiserror::Error;
use worksheets_core::Uuid;

/// Result type for formula parsing
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Result type for formula evaluation
pub type EvalResult<T> = std::result::Result<T, EvaluationError>;

/// Errors that can occur while parsing formula text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Errors that can occur while evaluating a formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Operand kinds incompatible with the operator
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Division operator with a zero divisor
    #[error("Division by zero")]
    DivisionByZero,

    /// Arithmetic result outside the decimal range
    #[error("Arithmetic overflow")]
    Overflow,

    /// Selector names a field that does not exist on the resolved worksheet
    #[error("Undefined reference: no field '{0}'")]
    UndefinedReference(String),

    /// Selector traverses a reference field whose value is undefined
    #[error("Null reference: '{0}' is undefined")]
    NullReference(String),

    /// Reference to a worksheet that is not available to the evaluation
    #[error("Dangling reference: worksheet {0} is not linked")]
    DanglingReference(Uuid),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The external marker has no formula to evaluate
    #[error("External field has no formula")]
    ExternalField,
}

impl EvaluationError {
    pub(crate) fn mismatch<S: Into<String>>(msg: S) -> Self {
        EvaluationError::TypeMismatch(msg.into())
    }
}
