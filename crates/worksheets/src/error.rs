//! Error types for worksheets
//!
//! Errors are grouped by the stage that raises them: building definitions,
//! mutating a worksheet, and saving or loading through the store.

use thiserror::Error;
use uuid::Uuid;
use worksheets_formula::{EvaluationError, FormulaError};

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for definition building
pub type DefinitionResult<T> = std::result::Result<T, DefinitionError>;

/// Result type for worksheet mutations
pub type MutationResult<T> = std::result::Result<T, MutationError>;

/// Result type for store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised while building definitions; fatal to the definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Field declared with index 0
    #[error("Field '{field}' of '{definition}' has index 0")]
    ZeroIndex { definition: String, field: String },

    /// Field declared with one of the built-in negative indices
    #[error("Field '{field}' of '{definition}' uses reserved index {index}")]
    ReservedIndex {
        definition: String,
        field: String,
        index: i32,
    },

    /// Index already used in the definition
    #[error("Index {index} already used in '{definition}'")]
    DuplicateIndex { definition: String, index: i32 },

    /// Name already used in the definition
    #[error("Field name '{name}' already used in '{definition}'")]
    DuplicateName { definition: String, name: String },

    /// Declared default does not fit the field's type
    #[error("Default of '{definition}.{field}' is invalid: {reason}")]
    InvalidDefault {
        definition: String,
        field: String,
        reason: String,
    },

    /// Computed fields read each other in a cycle
    #[error("Cyclic dependency in '{definition}' between {fields:?}")]
    CyclicDependency {
        definition: String,
        fields: Vec<String>,
    },

    /// No definition registered under this name
    #[error("Unknown definition: {0}")]
    UnknownDefinition(String),

    /// Two definitions registered under one name
    #[error("Definition already registered: {0}")]
    DuplicateDefinition(String),

    /// A formula reads a field the definition does not declare
    #[error("Formula of '{definition}.{field}' reads unknown field '{selector}'")]
    UnknownSelectorField {
        definition: String,
        field: String,
        selector: String,
    },

    /// Definition source could not be parsed
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Errors raised by `set`, `append` and `del`; the worksheet is left as it
/// was before the call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// No field with this name
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Field is computed and cannot be set directly
    #[error("Field '{0}' is computed")]
    ComputedField(String),

    /// Field is one of the built-in id/version fields
    #[error("Field '{0}' is reserved")]
    ReservedField(String),

    /// Value does not fit the field's type
    #[error("Type mismatch on '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },

    /// A constraint evaluated to false
    #[error("Constraint on '{0}' violated")]
    ConstraintViolation(String),

    /// Slice position out of bounds
    #[error("Index {index} out of bounds for '{field}' (len: {len})")]
    Index {
        field: String,
        index: usize,
        len: usize,
    },

    /// A formula failed to evaluate
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Errors raised by the versioned store
#[derive(Debug, Error)]
pub enum StorageError {
    /// No worksheet with this id and definition name
    #[error("Worksheet {id} of '{definition}' not found")]
    NotFound { definition: String, id: Uuid },

    /// Stored version moved past the version the worksheet was loaded at
    #[error("Worksheet {id} was modified concurrently (loaded at {expected}, stored {actual})")]
    ConcurrentModification {
        id: Uuid,
        expected: i32,
        actual: i32,
    },

    /// Requested version is outside the worksheet's history
    #[error("Version {requested} of worksheet {id} out of range (latest: {latest})")]
    VersionOutOfRange {
        id: Uuid,
        requested: i32,
        latest: i32,
    },

    /// Worksheet id is stored under another definition
    #[error("Worksheet {id} belongs to '{stored}', not '{actual}'")]
    DefinitionMismatch {
        id: Uuid,
        stored: String,
        actual: String,
    },

    /// A persisted value does not parse as its field's type
    #[error("Corrupt value for worksheet {id}, field {index}: {reason}")]
    CorruptValue { id: Uuid, index: i32, reason: String },

    /// Definition lookup failed
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Failure bubbled from the transactional collaborator
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Any error raised by this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Formula(#[from] FormulaError),
}
