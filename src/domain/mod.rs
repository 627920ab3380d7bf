//! Domain layer types and invariants.

pub mod customer;
pub mod entities;
pub mod error;
pub mod types;
