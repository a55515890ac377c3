//! `exchange-core`: the matching engine, order book, expiry horizon, VWAP
//! and book-snapshot views, and event dispatch for a single-node,
//! in-memory miniature stock exchange.
//!
//! This crate is the correctness-critical core described in the
//! specification; it has no knowledge of HTTP, process lifecycle, or
//! configuration loading — those live in the `exchange-service` binary
//! that wraps it.

pub mod book;
pub mod domain;
pub mod engine;
pub mod ids;
pub mod money;
pub mod service;
pub mod store;
