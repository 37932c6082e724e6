//! JSON helpers shared by the storage and HTTP adapters.
//!
//! Persisted files are written with:
//! - 2-space indentation
//! - Trailing newline
//! - UTF-8 encoding without BOM

mod json;

pub use json::*;
