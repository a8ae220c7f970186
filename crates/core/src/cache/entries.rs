//! Cache namespace and entry operations.
//!
//! A namespace is one deploy's response cache (e.g. `iep-hero-v1`). Entries
//! inside it are keyed by request identity and are always written as a whole.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::{decode_headers, encode_headers, now_timestamp};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheEntry {
    pub namespace: String,
    pub cache_key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Subset of response headers worth replaying from cache.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        namespace: &str, method: &str, url: &str, status: u16, headers: BTreeMap<String, String>, body: Vec<u8>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            cache_key: compute_cache_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            headers,
            body,
            stored_at: now_timestamp(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// A cache namespace with its entry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NamespaceInfo {
    pub name: String,
    pub entry_count: u64,
    pub created_at: String,
}

const ENTRY_COLUMNS: &str = "namespace, cache_key, method, url, status, headers_json, body, stored_at";

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let headers_json: String = row.get(5)?;
    Ok(CacheEntry {
        namespace: row.get(0)?,
        cache_key: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        status: row.get::<_, i64>(4)? as u16,
        headers: decode_headers(5, &headers_json)?,
        body: row.get(6)?,
        stored_at: row.get(7)?,
    })
}

impl CacheDb {
    /// Create a namespace if it does not exist yet.
    pub async fn open_namespace(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let created_at = now_timestamp();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?1, ?2)",
                    params![name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a namespace exists.
    pub async fn has_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_namespaces WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace an entry.
    ///
    /// The namespace is created on demand. The namespace row and the entry are
    /// written in one transaction, so readers see either the previous entry or
    /// the new one.
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        let headers_json = encode_headers(&entry.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?1, ?2)",
                    params![&entry.namespace, &entry.stored_at],
                )?;
                tx.execute(
                    "INSERT INTO cache_entries (
                        namespace, cache_key, method, url, status, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(namespace, cache_key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &entry.namespace,
                        &entry.cache_key,
                        &entry.method,
                        &entry.url,
                        entry.status as i64,
                        headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by namespace and cache key.
    ///
    /// Returns None if the key doesn't exist in the namespace.
    pub async fn match_entry(&self, namespace: &str, cache_key: &str) -> Result<Option<CacheEntry>, Error> {
        let namespace = namespace.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let sql = format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE namespace = ?1 AND cache_key = ?2");
                let mut stmt = conn.prepare(&sql)?;

                match stmt.query_row(params![namespace, cache_key], map_entry) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// List every namespace with its entry count, oldest first.
    pub async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<NamespaceInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT n.name, COUNT(e.cache_key), n.created_at
                     FROM cache_namespaces n
                     LEFT JOIN cache_entries e ON e.namespace = n.name
                     GROUP BY n.name, n.created_at
                     ORDER BY n.created_at ASC, n.name ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(NamespaceInfo {
                        name: row.get(0)?,
                        entry_count: row.get::<_, i64>(1)? as u64,
                        created_at: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a namespace and all of its entries.
    ///
    /// Returns false if the namespace did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_namespaces WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every namespace except `keep`, returning the deleted names.
    pub async fn delete_namespaces_except(&self, keep: &str) -> Result<Vec<String>, Error> {
        let keep = keep.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let stale = {
                    let mut stmt = tx.prepare("SELECT name FROM cache_namespaces WHERE name != ?1 ORDER BY name")?;
                    let rows = stmt.query_map(params![keep], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM cache_namespaces WHERE name != ?1", params![keep])?;
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a namespace.
    pub async fn count_entries(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries whose URL contains `pattern`, across all namespaces.
    ///
    /// Returns the number of deleted entries.
    /// `pattern` is matched literally; `%` and `_` have no special meaning.
    pub async fn purge_entries_by_url(&self, pattern: &str) -> Result<u64, Error> {
        let pattern = pattern.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE instr(url, ?1) > 0", params![pattern])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge the oldest entries of a namespace until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_entries(&self, namespace: &str, max_entries: usize) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                    params![&namespace],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE rowid IN (
                        SELECT rowid FROM cache_entries WHERE namespace = ?1
                        ORDER BY stored_at ASC, rowid ASC LIMIT ?2
                    )",
                    params![&namespace, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
