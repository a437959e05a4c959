//! SQLite-backed bucket operations.
//!
//! Entries are keyed by `(bucket, key_hash)` where `key_hash` comes from
//! [`compute_cache_key`]. Writes use UPSERT semantics and `put_all` runs in a
//! single transaction.

use super::CacheStorage;
use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response, ResponseType};
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A response flattened into its stored columns.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    response_url: String,
    status: i64,
    response_type: String,
    content_type: Option<String>,
    headers_json: String,
    body: Vec<u8>,
    cached_at: String,
}

impl EntryRow {
    fn new(request: &Request, response: &Response) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;

        Ok(Self {
            key_hash: compute_cache_key(&request.method, request.url.as_str()),
            method: request.method.to_ascii_uppercase(),
            url: request.url.to_string(),
            response_url: response.url.to_string(),
            status: i64::from(response.status),
            response_type: response.response_type.as_str().to_string(),
            content_type: response.content_type.clone(),
            headers_json,
            body: response.body.to_vec(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn into_response(self) -> Result<Response, Error> {
        let url = Url::parse(&self.response_url).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let status = u16::try_from(self.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let response_type: ResponseType = self.response_type.parse()?;
        let headers: Vec<(String, String)> =
            serde_json::from_str(&self.headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

        Ok(Response {
            url,
            status,
            response_type,
            content_type: self.content_type,
            headers,
            body: Bytes::from(self.body),
        })
    }
}

fn ensure_bucket(conn: &rusqlite::Connection, bucket: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
        params![bucket, chrono::Utc::now().to_rfc3339()],
    )
}

fn upsert_entry(conn: &rusqlite::Connection, bucket: &str, row: &EntryRow) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO entries (
            bucket, key_hash, method, url, response_url, status,
            response_type, content_type, headers_json, body, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(bucket, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            response_url = excluded.response_url,
            status = excluded.status,
            response_type = excluded.response_type,
            content_type = excluded.content_type,
            headers_json = excluded.headers_json,
            body = excluded.body,
            cached_at = excluded.cached_at",
        params![
            bucket,
            &row.key_hash,
            &row.method,
            &row.url,
            &row.response_url,
            row.status,
            &row.response_type,
            &row.content_type,
            &row.headers_json,
            &row.body,
            &row.cached_at,
        ],
    )
}

#[async_trait::async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, bucket: &str) -> Result<(), Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_bucket(conn, &bucket)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE bucket = ?1", params![&bucket])?;
                let deleted = tx.execute("DELETE FROM buckets WHERE name = ?1", params![&bucket])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>, Error> {
        let bucket = bucket.to_string();
        let key_hash = compute_cache_key(&request.method, request.url.as_str());
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT
                    key_hash, method, url, response_url, status,
                    response_type, content_type, headers_json, body, cached_at
                FROM entries WHERE bucket = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![bucket, key_hash], |row| {
                    Ok(EntryRow {
                        key_hash: row.get(0)?,
                        method: row.get(1)?,
                        url: row.get(2)?,
                        response_url: row.get(3)?,
                        status: row.get(4)?,
                        response_type: row.get(5)?,
                        content_type: row.get(6)?,
                        headers_json: row.get(7)?,
                        body: row.get(8)?,
                        cached_at: row.get(9)?,
                    })
                });

                match result {
                    Ok(row) => row.into_response().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let row = EntryRow::new(request, response)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_bucket(&tx, &bucket)?;
                upsert_entry(&tx, &bucket, &row)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_bucket(&tx, &bucket)?;
                for row in &rows {
                    upsert_entry(&tx, &bucket, row)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE bucket = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![bucket], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}
