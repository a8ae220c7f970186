//! Store handle.
//!
//! One SQLite connection owned by tokio-rusqlite's background thread. WAL
//! journaling lets the host read a cached page while a detached write for
//! another request is in flight.

use std::path::Path;

use tokio_rusqlite::Connection;

use super::migrations;
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;
     PRAGMA foreign_keys=ON;";

/// Handle to the store backing every cache namespace and deferred queue.
///
/// Cloning is cheap and every clone talks to the same connection thread.
/// All writes funnel through that thread, so two writers racing on one key
/// resolve as "latest write wins".
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open (or create) the store at `path`, creating missing parent
    /// directories, then migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::InvalidInput(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        tracing::debug!(path = %path.display(), "opened cache store");
        Self::prepare(conn).await
    }

    /// A private in-memory store; no two calls share data.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn).await
    }

    async fn prepare(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;
        migrations::run(&conn).await?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_rusqlite::rusqlite::types::Value;

    async fn pragma(db: &CacheDb, name: &'static str) -> String {
        let value = db
            .conn
            .call(move |conn| conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get::<_, Value>(0)))
            .await
            .unwrap();
        match value {
            Value::Integer(i) => i.to_string(),
            Value::Text(s) => s,
            other => format!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(pragma(&db, "foreign_keys").await, "1");
        assert_eq!(pragma(&db, "busy_timeout").await, "5000");
    }

    #[tokio::test]
    async fn test_in_memory_instances_are_isolated() {
        let a = CacheDb::open_in_memory().await.unwrap();
        let b = CacheDb::open_in_memory().await.unwrap();
        a.open_namespace("iep-hero-v1").await.unwrap();

        assert_eq!(a.list_namespaces().await.unwrap().len(), 1);
        assert!(b.list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("hero-sw-test-{}", std::process::id()));
        let path = dir.join("nested").join("cache.sqlite");

        let db = CacheDb::open(&path).await.unwrap();
        db.open_namespace("iep-hero-v1").await.unwrap();
        assert_eq!(pragma(&db, "journal_mode").await, "wal");
        drop(db);

        let reopened = CacheDb::open(&path).await.unwrap();
        assert!(reopened.has_namespace("iep-hero-v1").await.unwrap());

        let _ = std::fs::remove_dir_all(dir);
    }
}
