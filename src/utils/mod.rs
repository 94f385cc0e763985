//! The `utils` module provides shared definitions used across `chanrelay`:
//! the error types and the tracing setup.

pub mod error;
pub mod logging;

pub use error::{InboundFault, RelayError, classify_inbound};
