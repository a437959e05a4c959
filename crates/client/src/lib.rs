//! Network side of shell-cache.
//!
//! This crate provides the `Fetcher` abstraction the worker strategies call
//! when they need the network, a reqwest-backed implementation, and URL
//! resolution against the worker origin.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Fetcher, response_type_for};
pub use fetch::url::{UrlError, is_same_origin, resolve};
