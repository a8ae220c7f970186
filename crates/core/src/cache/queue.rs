//! Deferred action queue and background-sync registrations.
//!
//! Mutations that failed while offline are parked here under a queue
//! namespace until a reconciliation pass replays them. Enqueueing and
//! registering the tag for sync happen in one transaction.

use super::connection::CacheDb;
use super::{decode_headers, encode_headers, now_timestamp};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Replay parameters of a deferred request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PendingRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

/// A deferred mutation awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PendingAction {
    pub id: i64,
    pub tag: String,
    pub namespace: String,
    pub request: PendingRequest,
    pub enqueued_at: String,
}

const ACTION_COLUMNS: &str = "id, tag, namespace, method, url, headers_json, body, enqueued_at";

fn map_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingAction> {
    let headers_json: String = row.get(5)?;
    Ok(PendingAction {
        id: row.get(0)?,
        tag: row.get(1)?,
        namespace: row.get(2)?,
        request: PendingRequest {
            method: row.get(3)?,
            url: row.get(4)?,
            headers: decode_headers(5, &headers_json)?,
            body: row.get(6)?,
        },
        enqueued_at: row.get(7)?,
    })
}

impl CacheDb {
    /// Park a request in a queue namespace and register its tag for sync.
    pub async fn enqueue_action(
        &self, tag: &str, namespace: &str, request: &PendingRequest,
    ) -> Result<PendingAction, Error> {
        let tag = tag.to_string();
        let namespace = namespace.to_string();
        let request = request.clone();
        let headers_json = encode_headers(&request.headers)?;
        let enqueued_at = now_timestamp();

        self.conn
            .call(move |conn| -> Result<PendingAction, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO pending_actions (tag, namespace, method, url, headers_json, body, enqueued_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        &tag,
                        &namespace,
                        &request.method,
                        &request.url,
                        headers_json,
                        &request.body,
                        &enqueued_at,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO sync_registrations (tag, registered_at) VALUES (?1, ?2)
                     ON CONFLICT(tag) DO NOTHING",
                    params![&tag, &enqueued_at],
                )?;
                tx.commit()?;

                Ok(PendingAction { id, tag, namespace, request, enqueued_at })
            })
            .await
            .map_err(Error::from)
    }

    /// All actions in a queue namespace, in enqueue order.
    pub async fn pending_actions(&self, namespace: &str) -> Result<Vec<PendingAction>, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<PendingAction>, Error> {
                let sql = format!("SELECT {ACTION_COLUMNS} FROM pending_actions WHERE namespace = ?1 ORDER BY id ASC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![namespace], map_action)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a single action by id.
    pub async fn get_action(&self, id: i64) -> Result<Option<PendingAction>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<PendingAction>, Error> {
                let sql = format!("SELECT {ACTION_COLUMNS} FROM pending_actions WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                match stmt.query_row(params![id], map_action) {
                    Ok(action) => Ok(Some(action)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an action after a successful replay.
    ///
    /// Returns false if it was already gone, which is not an error: a replay
    /// whose acknowledgment was lost may be attempted again.
    pub async fn remove_action(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM pending_actions WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of actions waiting in a queue namespace.
    pub async fn count_pending(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM pending_actions WHERE namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop every action in a queue namespace.
    ///
    /// Returns the number of deleted actions.
    pub async fn clear_queue(&self, namespace: &str) -> Result<u64, Error> {
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM pending_actions WHERE namespace = ?1", params![namespace])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Tags with a live sync registration.
    pub async fn registered_tags(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT tag FROM sync_registrations ORDER BY registered_at ASC, tag ASC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop a tag's registration if its queue is empty.
    ///
    /// The emptiness check and the delete are one statement, so an action
    /// enqueued concurrently keeps its registration.
    pub async fn unregister_tag_if_drained(&self, tag: &str, namespace: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        let namespace = namespace.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM sync_registrations WHERE tag = ?1
                     AND NOT EXISTS (SELECT 1 FROM pending_actions WHERE namespace = ?2)",
                    params![tag, namespace],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
