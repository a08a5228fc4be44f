//! muxrpc Client
//!
//! This crate provides the connection-multiplexing [`Client`]: any number
//! of concurrent callers share one connection, each in-flight call is
//! keyed by a sequence number in a pending table, and a single background
//! receive loop matches responses back to their callers regardless of
//! arrival order.

pub mod client;

pub use client::{Call, Client};
