//! Row structs for the tables the propagation engine touches.
//!
//! Each submodule contains a `FromRow` entity struct matching a query's
//! projection, plus any insert DTOs for that table.

pub mod frame;
pub mod mask;
pub mod project;
