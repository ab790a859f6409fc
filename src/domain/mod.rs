//! Domain layer types and invariants.

pub mod categories;
pub mod error;
pub mod posts;
pub mod query;
