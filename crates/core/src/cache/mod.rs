//! Cache bucket storage.
//!
//! A bucket is a named map from request (method + URL) to a captured
//! response. The worker talks to storage through the [`CacheStorage`] trait
//! so the strategies can run against:
//!
//! - [`CacheDb`]: persistent SQLite storage via tokio-rusqlite, with WAL mode
//!   and versioned schema migrations
//! - [`MemoryStorage`]: an in-process map for ephemeral hosts and tests

pub mod buckets;
pub mod connection;
pub mod hash;
pub mod memory;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use memory::MemoryStorage;

use crate::http::{Request, Response};

/// Bucketed request/response storage.
///
/// Writes are upserts: the last write for a key wins.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if it does not exist.
    async fn open(&self, bucket: &str) -> Result<(), Error>;

    /// Names of all existing buckets, sorted.
    async fn bucket_names(&self) -> Result<Vec<String>, Error>;

    /// Delete a bucket and all of its entries.
    ///
    /// Returns false if the bucket did not exist.
    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error>;

    /// Look up the stored response for a request.
    async fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>, Error>;

    /// Store a response for a request, creating the bucket if needed.
    async fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<(), Error>;

    /// Store every pair or none of them.
    async fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<(), Error>;

    /// URLs of the requests stored in a bucket, sorted.
    async fn keys(&self, bucket: &str) -> Result<Vec<String>, Error>;
}
