//! Domain building blocks for the draft catalog backend.
//!
//! This crate has no internal dependencies: naming rules, sequence
//! allocation, lock leases, retry policy and the store traits live here so
//! the persistence, pipeline and HTTP layers all agree on them.

pub mod draft;
pub mod error;
pub mod locking;
pub mod naming;
pub mod retry;
pub mod sequence;
pub mod store;
pub mod types;
