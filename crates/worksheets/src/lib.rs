//! # worksheets
//!
//! Typed, versioned worksheets with formula-computed fields and a
//! point-in-time SQLite store.
//!
//! ## Features
//!
//! - Definitions of named, indexed, typed fields, from code or source text
//! - Computed fields recomputed in dependency order on every change
//! - Constraints checked transactionally; failed mutations roll back
//! - Append-only value history: load any past version of a worksheet
//! - Optimistic concurrency on save
//!
//! ## Example
//!
//! ```rust
//! use worksheets::prelude::*;
//!
//! let registry = Registry::from_source(
//!     r#"
//!     worksheet order {
//!       1:price number(2)
//!       2:qty   number(0)
//!       3:total number(2) computed_by { return price * qty }
//!     }
//!     "#,
//! )
//! .unwrap();
//!
//! let mut order = registry.new_worksheet("order").unwrap();
//! order.set("price", Value::number(1250, 2)).unwrap();
//! order.set("qty", 3).unwrap();
//! assert_eq!(order.get("total").unwrap().to_string(), "37.50");
//!
//! let mut conn = rusqlite::Connection::open_in_memory().unwrap();
//! schema::init(&conn).unwrap();
//! let mut tx = conn.transaction().unwrap();
//!
//! let mut session = Session::open(&registry, &mut tx);
//! session.save(&mut order).unwrap();
//! order.set("qty", 4).unwrap();
//! session.save(&mut order).unwrap();
//!
//! let first = session.load_at("order", order.id(), 1).unwrap();
//! assert_eq!(first.get("total").unwrap().to_string(), "37.50");
//! ```

pub mod definition;
pub mod error;
pub mod parser;
pub mod prelude;
pub mod registry;
pub mod store;
pub mod worksheet;

pub use definition::{Definition, Field};
pub use error::{
    DefinitionError, DefinitionResult, Error, MutationError, MutationResult, Result,
    StorageError, StorageResult,
};
pub use parser::parse_definitions;
pub use registry::{Registry, RegistryBuilder};
pub use store::{
    schema, Session, StoreOptions, TransactionScope, ValueRecord, WorksheetRecord, OPEN_VERSION,
};
pub use worksheet::Worksheet;

// Re-export value and formula types
pub use worksheets_core::{Decimal, FieldIndex, FieldType, Uuid, Value};
pub use worksheets_formula::{parse_formula, EvaluationError, Expr, FormulaError, RoundingMode};
