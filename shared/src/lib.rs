//! Shared types for the faultwatch harness
//!
//! Contains the types that cross crate boundaries: fault records, monitor
//! events, component labels, the shared error type and logging helpers.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
