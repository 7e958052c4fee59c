//! Row structs for the draft tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! a conversion into the shared `thrift_core` type.

pub mod draft;
pub mod lock;
