//! Worker lifecycle state machine.
//!
//! A worker version moves through
//! `uninitialized -> installing -> waiting -> active -> superseded`.
//! The state is persisted per cache version, so a restart of the same deploy
//! resumes where it left off instead of activating twice.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use crate::Error;
use crate::cache::{CacheDb, now_timestamp};

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Installing,
    Waiting,
    Active,
    Superseded,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
        }
    }

    /// State entered when an install starts.
    ///
    /// An interrupted install (still `installing` after a restart) may start
    /// over. Re-installing an active version refreshes its precache and keeps
    /// it active. A superseded version deployed again (a rollback) installs
    /// from scratch.
    pub fn begin_install(self) -> Result<WorkerState, Error> {
        match self {
            WorkerState::Uninitialized
            | WorkerState::Installing
            | WorkerState::Waiting
            | WorkerState::Superseded => Ok(WorkerState::Installing),
            WorkerState::Active => Ok(WorkerState::Active),
        }
    }

    /// State entered when an install completes.
    pub fn finish_install(self) -> Result<WorkerState, Error> {
        match self {
            WorkerState::Installing => Ok(WorkerState::Waiting),
            WorkerState::Active => Ok(WorkerState::Active),
            other => Err(Error::Lifecycle(format!("cannot finish install while {other}"))),
        }
    }

    /// State entered on activation. Only a waiting worker may activate.
    pub fn activate(self) -> Result<WorkerState, Error> {
        match self {
            WorkerState::Waiting => Ok(WorkerState::Active),
            other => Err(Error::Lifecycle(format!("cannot activate while {other}"))),
        }
    }

    pub fn serves_fetches(&self) -> bool {
        matches!(self, WorkerState::Active)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(WorkerState::Uninitialized),
            "installing" => Ok(WorkerState::Installing),
            "waiting" => Ok(WorkerState::Waiting),
            "active" => Ok(WorkerState::Active),
            "superseded" => Ok(WorkerState::Superseded),
            other => Err(Error::Corrupt(format!("unknown worker state {other:?}"))),
        }
    }
}

impl CacheDb {
    /// Persisted state of a version; `uninitialized` if never recorded.
    pub async fn worker_state(&self, version: &str) -> Result<WorkerState, Error> {
        let version = version.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                match conn.query_row("SELECT state FROM worker_state WHERE version = ?1", params![version], |row| {
                    row.get::<_, String>(0)
                }) {
                    Ok(state) => Ok(Some(state)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map_or(Ok(WorkerState::Uninitialized), |s| s.parse())
    }

    pub async fn set_worker_state(&self, version: &str, state: WorkerState) -> Result<(), Error> {
        let version = version.to_string();
        let updated_at = now_timestamp();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO worker_state (version, state, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(version) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                    params![version, state.as_str(), updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Mark every other version superseded, returning how many changed.
    pub async fn supersede_other_versions(&self, current: &str) -> Result<u64, Error> {
        let current = current.to_string();
        let updated_at = now_timestamp();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "UPDATE worker_state SET state = ?1, updated_at = ?2 WHERE version != ?3 AND state != ?1",
                    params![WorkerState::Superseded.as_str(), updated_at, current],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
