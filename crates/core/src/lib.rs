//! Core types and shared functionality for shell-cache.
//!
//! This crate provides:
//! - Request/response types shared by the worker and the network layer
//! - Cache bucket storage with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheDb, CacheStorage, MemoryStorage};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Destination, Request, RequestMode, Response, ResponseType};
