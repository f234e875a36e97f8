//! The `transport` module exposes the broker over HTTP.
//!
//! It defines the stream encoding used towards subscribers and the axum
//! router that accepts published messages and serves event streams.

pub mod codec;
pub mod http;

pub use http::{AppState, router, serve};
