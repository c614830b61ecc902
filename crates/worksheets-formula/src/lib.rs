//! # worksheets-formula
//!
//! Formula parser and evaluator for worksheets.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Formula evaluation (AST → value) against any [`EvaluationContext`]
//! - A handful of built-in functions (`len`, `sum`, `if`)
//! - Dependency tracking and deterministic recompute ordering
//!
//! ## Example
//!
//! ```rust
//! use worksheets_core::{Uuid, Value};
//! use worksheets_formula::{evaluate, parse_formula, EvaluationContext};
//! use std::collections::HashMap;
//!
//! struct Fields(HashMap<String, Value>);
//!
//! impl EvaluationContext for Fields {
//!     fn field_value(&self, name: &str) -> Option<&Value> {
//!         self.0.get(name)
//!     }
//!
//!     fn resolve(&self, _id: Uuid) -> Option<&dyn EvaluationContext> {
//!         None
//!     }
//! }
//!
//! let ctx = Fields(HashMap::from([("price".to_string(), Value::number(1999, 2))]));
//! let ast = parse_formula("price * 3").unwrap();
//! assert_eq!(evaluate(&ast, &ctx).unwrap(), Value::number(5997, 2));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOperator, Expr, Rounding, RoundingMode, UnaryOperator};
pub use dependency::DependencyGraph;
pub use error::{EvalResult, EvaluationError, FormulaError, FormulaResult};
pub use evaluator::{evaluate, EvaluationContext};
pub use functions::Function;
pub use parser::parse_formula;
