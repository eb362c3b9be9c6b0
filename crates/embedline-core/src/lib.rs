//! # embedline-core
//!
//! Foundation shared by the embedline crates.
//!
//! - [`logging::init_subscriber`] installs the stderr `tracing` subscriber
//! - [`logging::capture_logs`] captures diagnostics in tests
//!
//! ## Crate Position
//!
//! Standalone (no embedline crate dependencies).
//! Depended on by: embedline-embeddings.

#![deny(unsafe_code)]

pub mod logging;
