//! CLI command implementations.

pub mod check;

pub use check::{CheckCommand, CheckReport};
