//! Prelude module - common imports for worksheets users
//!
//! ```rust
//! use worksheets::prelude::*;
//! ```

pub use crate::{
    // Definitions
    Definition,
    DefinitionError,
    Field,
    FieldType,
    // Values
    Decimal,
    Uuid,
    Value,
    // Worksheets
    MutationError,
    Registry,
    Worksheet,
    // Storage
    schema,
    Session,
    StorageError,
    StoreOptions,
};

pub use worksheets_formula::parse_formula;
