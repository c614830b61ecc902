//! End-to-end tests for worksheets.
//!
//! Each test builds its definitions from source, works on worksheets in
//! memory and persists them to an in-memory SQLite database.

mod common;
mod definitions;
mod propagation;
mod store;

pub use common::*;
