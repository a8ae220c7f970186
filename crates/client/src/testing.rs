//! In-process transport double for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use hero_core::CacheDb;

use crate::fetch::{NetworkError, Request, Response, Transport};

/// Answers from a routing table; unrouted requests get 404.
pub(crate) struct ScriptedTransport {
    online: AtomicBool,
    routes: Mutex<HashMap<(String, String), (u16, String)>>,
    unreachable: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String, Option<Bytes>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn route(&self, method: &str, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), url.to_string()), (status, body.to_string()));
    }

    /// Make a single URL fail at the network level.
    pub(crate) fn unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// (method, url, body) of every request that reached the transport.
    pub(crate) fn calls(&self) -> Vec<(String, String, Option<Bytes>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
        let method = request.method.to_string();
        let url = request.url.to_string();
        self.calls
            .lock()
            .unwrap()
            .push((method.clone(), url.clone(), request.body.clone()));

        if !self.online.load(Ordering::SeqCst) {
            return Err(NetworkError::Connect("offline".into()));
        }
        if self.unreachable.lock().unwrap().contains(&url) {
            return Err(NetworkError::Timeout);
        }

        let routed = self.routes.lock().unwrap().get(&(method, url)).cloned();
        let (status, body) = routed.unwrap_or((404, "not found".to_string()));
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        Ok(Response { status, headers, body: Bytes::from(body) })
    }
}

/// File-backed store that a second connection can damage mid-test.
pub(crate) struct FileStore {
    pub(crate) db: CacheDb,
    path: PathBuf,
}

impl FileStore {
    pub(crate) async fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("hero-client-{}-{name}.sqlite", std::process::id()));
        remove_files(&path);
        let db = CacheDb::open(&path).await.unwrap();
        Self { db, path }
    }

    /// Drop `cache_entries` so every entry read and write fails.
    pub(crate) async fn drop_entries_table(&self) {
        let conn = tokio_rusqlite::Connection::open(&self.path).await.unwrap();
        conn.call(|conn| conn.execute_batch("DROP TABLE cache_entries"))
            .await
            .unwrap();
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        remove_files(&self.path);
    }
}

fn remove_files(path: &std::path::Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(file));
    }
}
