//! Core types, configuration, and models for the Outlook JSON-RPC bridge.
//!
//! This crate has no knowledge of JSON-RPC framing, pooling, or Outlook
//! automation — it only defines the data the rest of the workspace agrees
//! on: the public `Error` type, the wire-facing data model, server
//! configuration, a small lock-ordering discipline, and process-wide
//! metrics counters.

pub mod config;
pub mod error;
pub mod lock_order;
pub mod metrics;
pub mod models;

pub use error::{Error, Result};
pub use lock_order::{LockLevel, OrderedMutex, OrderedRwLock};
