//! Seletivo session client.
//!
//! Wires the session core to its adapters for the `seletivo` binary and
//! for end-to-end tests.

pub mod context;
pub mod navigator;

pub use context::{GetOutcome, SessionContext};
pub use navigator::CliNavigator;
