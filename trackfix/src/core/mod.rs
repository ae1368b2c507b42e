//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod failure;
pub mod feedback;
pub mod geometry;
pub mod report;
pub mod stop;
pub mod types;
pub mod validator;
