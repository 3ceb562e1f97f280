//! Deterministic, pure logic of the call pipeline.
//!
//! Core modules are free of I/O. They turn declarations into schemas and
//! prompts, and raw completions into decoded values, so every step is testable
//! without a provider.

pub mod budget;
pub mod decode;
pub mod function;
pub mod invariants;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod type_expr;
pub mod types;
pub mod value;
