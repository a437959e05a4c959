//! Cache inspection MCP tools.
//!
//! This module provides read-only views of the worker's cache storage.

pub mod keys;
pub mod lookup;

pub use keys::{CacheKeysParams, keys_impl};
pub use lookup::{CacheMatchParams, match_impl};
