//! High-level store API.
//!
//! This module provides the user-facing entry point: open a
//! [`DocumentStore`] and hand out sessions from it.

mod api;

pub use api::{DocumentStore, StoreConfig};
