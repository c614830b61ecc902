//! # worksheets-core
//!
//! Core data types for the worksheets engine.
//!
//! This crate provides the fundamental types shared by the formula
//! evaluator and the worksheet store:
//! - [`Value`] - Field values (text, numbers, booleans, slices, references)
//! - [`FieldType`] - Declared field types and value coercion
//! - [`FieldIndex`] - Stable field identities, including the reserved ones
//!
//! ## Example
//!
//! ```rust
//! use worksheets_core::{FieldType, Value};
//!
//! let value: Value = "12.5".parse().unwrap();
//! let stored = FieldType::Number { scale: 2 }.coerce(value).unwrap();
//! assert_eq!(stored.to_string(), "12.50");
//! ```

pub mod error;
pub mod field_type;
pub mod index;
pub mod value;

pub use error::{Error, Result};
pub use field_type::FieldType;
pub use index::FieldIndex;
pub use value::Value;

// Re-exported so dependents agree on the decimal and identity types
pub use rust_decimal::{Decimal, RoundingStrategy};
pub use uuid::Uuid;

/// Largest scale a number field may declare
pub const MAX_SCALE: u32 = 28;
