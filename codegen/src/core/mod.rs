//! Deterministic, pure logic shared by the code generation loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod chunker;
pub mod decision;
pub mod file_map;
pub mod fingerprint;
pub mod types;
