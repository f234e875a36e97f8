//! # ssehub
//!
//! `ssehub` is a minimal, in-memory publish/subscribe hub built with Rust.
//! One endpoint accepts messages over HTTP and every connected subscriber
//! receives each message published after it connected, as a live stream.
//!
//! ## Core Modules
//!
//! - `broker`: owns the subscriber set and fans messages out, with every
//!   membership change and publish serialized through one command loop.
//! - `session`: bridges one subscriber connection to the broker.
//! - `transport`: the HTTP surface and the stream encoding.
//! - `config`: loading and merging of server configuration.
//! - `utils`: shared error type and logging setup.

pub mod broker;
pub mod config;
pub mod session;
pub mod transport;
pub mod utils;
