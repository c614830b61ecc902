//! Field indices

use std::fmt;

/// Stable identity of a field within its definition.
///
/// Declared fields use positive indices. Two negative indices are reserved
/// for the fields every worksheet carries: its identity and its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldIndex(i32);

impl FieldIndex {
    /// Index of the reserved identity field
    pub const ID: FieldIndex = FieldIndex(-2);

    /// Index of the reserved version field
    pub const VERSION: FieldIndex = FieldIndex(-1);

    /// Name of the reserved identity field
    pub const ID_NAME: &'static str = "id";

    /// Name of the reserved version field
    pub const VERSION_NAME: &'static str = "version";

    /// Wrap a raw index
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    /// The raw index as persisted
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether this is one of the built-in indices
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::ID.0 || self.0 == Self::VERSION.0
    }
}

impl From<i32> for FieldIndex {
    fn from(index: i32) -> Self {
        Self(index)
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
