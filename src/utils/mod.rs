//! The `utils` module provides shared building blocks used across the
//! `ssehub` crate: the crate-wide error type and the tracing setup.

pub mod error;
pub mod logging;

pub use error::HubError;
