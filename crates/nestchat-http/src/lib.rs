//! `nestchat-http` crate (library surface).
//!
//! The primary entrypoint for end users is the `nestchat` binary (HTTP service + CLI).
//! This library module exists so the route handlers and diagnostics can be exercised
//! by integration tests without going through the binary.

pub mod app;
pub mod diag;
