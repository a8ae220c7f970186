//! Deferred action queue and sync reconciler.
//!
//! Each background-sync tag owns a queue namespace and a replay handler.
//! A reconciliation pass replays every queued action of one tag once:
//! success removes it, failure leaves it for the next pass. Delivery is
//! at-least-once; a replay whose removal finds the action already gone is
//! counted, not treated as an error. Backoff belongs to whoever schedules
//! the passes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use hero_core::{CacheDb, Error, PendingAction, PendingRequest, SyncQueueConfig};

use crate::fetch::{NetworkError, Request, Transport};

/// Why a replay did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("server answered {0}")]
    Rejected(u16),

    #[error("stored request is invalid: {0}")]
    Invalid(String),
}

/// Replays one deferred action.
#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn replay(&self, action: &PendingAction) -> Result<(), ReplayError>;
}

/// Sends the stored request again, unchanged. Any 2xx counts as delivered.
pub struct TransportReplay {
    transport: Arc<dyn Transport>,
}

impl TransportReplay {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

/// Rebuild the outgoing request from stored replay parameters.
pub fn request_from_pending(pending: &PendingRequest) -> Result<Request, ReplayError> {
    let method = Method::from_bytes(pending.method.as_bytes()).map_err(|e| ReplayError::Invalid(e.to_string()))?;
    let url = Url::parse(&pending.url).map_err(|e| ReplayError::Invalid(e.to_string()))?;

    let mut request = Request::new(method, url);
    request.headers = pending.headers.clone();
    request.body = pending.body.clone().map(Bytes::from);
    Ok(request)
}

#[async_trait]
impl ReplayHandler for TransportReplay {
    async fn replay(&self, action: &PendingAction) -> Result<(), ReplayError> {
        let request = request_from_pending(&action.request)?;
        let response = self.transport.send(&request).await?;
        if response.is_success() { Ok(()) } else { Err(ReplayError::Rejected(response.status)) }
    }
}

/// Outcome of one reconciliation pass over one tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tag: String,
    pub namespace: String,
    /// Actions replayed and removed.
    pub replayed: Vec<i64>,
    /// Actions whose replay failed; still queued.
    pub retained: Vec<i64>,
    /// Actions replayed but already removed by a concurrent pass.
    pub already_removed: Vec<i64>,
}

struct SyncQueue {
    namespace: String,
    handler: Arc<dyn ReplayHandler>,
    // held for a whole pass so overlapping passes do not replay the same rows
    pass: Mutex<()>,
}

/// Drains deferred action queues.
pub struct SyncReconciler {
    db: CacheDb,
    queues: HashMap<String, SyncQueue>,
}

impl SyncReconciler {
    pub fn new(db: CacheDb) -> Self {
        Self { db, queues: HashMap::new() }
    }

    /// One queue per configured tag, all replayed through `handler`.
    pub fn with_queues(db: CacheDb, queues: &[SyncQueueConfig], handler: Arc<dyn ReplayHandler>) -> Self {
        let mut reconciler = Self::new(db);
        for queue in queues {
            reconciler.register(&queue.tag, &queue.namespace, handler.clone());
        }
        reconciler
    }

    /// Bind `tag` to a queue namespace and its replay handler.
    pub fn register(&mut self, tag: &str, namespace: &str, handler: Arc<dyn ReplayHandler>) {
        self.queues
            .insert(tag.to_string(), SyncQueue { namespace: namespace.to_string(), handler, pass: Mutex::new(()) });
    }

    pub fn namespace_for(&self, tag: &str) -> Option<&str> {
        self.queues.get(tag).map(|q| q.namespace.as_str())
    }

    /// Configured tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.queues.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Park a request under `tag` and register the tag for sync.
    pub async fn enqueue(&self, tag: &str, request: &PendingRequest) -> Result<PendingAction, Error> {
        let namespace = self
            .namespace_for(tag)
            .ok_or_else(|| Error::UnknownSyncTag(tag.to_string()))?;
        let action = self.db.enqueue_action(tag, namespace, request).await?;
        tracing::info!(tag, id = action.id, "deferred {} {}", action.request.method, action.request.url);
        Ok(action)
    }

    /// Replay every action queued under `tag` once.
    ///
    /// Replay failures are logged and the action kept; only store errors
    /// are returned.
    pub async fn reconcile(&self, tag: &str) -> Result<SyncReport, Error> {
        let queue = self
            .queues
            .get(tag)
            .ok_or_else(|| Error::UnknownSyncTag(tag.to_string()))?;
        let _pass = queue.pass.lock().await;

        let mut report = SyncReport { tag: tag.to_string(), namespace: queue.namespace.clone(), ..Default::default() };

        for action in self.db.pending_actions(&queue.namespace).await? {
            match queue.handler.replay(&action).await {
                Ok(()) => match self.db.remove_action(action.id).await {
                    Ok(true) => report.replayed.push(action.id),
                    Ok(false) => report.already_removed.push(action.id),
                    Err(e) => {
                        tracing::warn!(error = %e, tag, id = action.id, "replayed but could not dequeue");
                        report.retained.push(action.id);
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, tag, id = action.id, "replay failed, keeping action queued");
                    report.retained.push(action.id);
                }
            }
        }

        if self.db.unregister_tag_if_drained(tag, &queue.namespace).await? {
            tracing::debug!(tag, "queue drained, sync registration cleared");
        }

        tracing::info!(
            tag,
            replayed = report.replayed.len(),
            retained = report.retained.len(),
            "reconciliation pass finished"
        );

        Ok(report)
    }

    /// Reconcile every tag with a live sync registration, independently.
    ///
    /// A tag that fails is logged and skipped; registrations for tags that
    /// are no longer configured are left alone.
    pub async fn reconcile_registered(&self) -> Result<Vec<SyncReport>, Error> {
        let mut reports = Vec::new();
        for tag in self.db.registered_tags().await? {
            if !self.queues.contains_key(&tag) {
                tracing::warn!(tag, "sync registered for a tag with no configured queue");
                continue;
            }
            match self.reconcile(&tag).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!(error = %e, tag, "reconciliation pass failed"),
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TAG: &str = "sync-goal-updates";
    const NAMESPACE: &str = "pending-goal-updates";

    fn goal_update(id: u32) -> PendingRequest {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        PendingRequest {
            method: "PATCH".to_string(),
            url: format!("https://app.test/api/goals/{id}"),
            headers,
            body: Some(format!(r#"{{"progress":{id}0}}"#).into_bytes()),
        }
    }

    async fn setup() -> (SyncReconciler, Arc<ScriptedTransport>, CacheDb) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let queues = vec![
            SyncQueueConfig { tag: TAG.into(), namespace: NAMESPACE.into() },
            SyncQueueConfig { tag: "sync-memory-questions".into(), namespace: "pending-memory-questions".into() },
        ];
        let reconciler = SyncReconciler::with_queues(db.clone(), &queues, Arc::new(TransportReplay::new(transport.clone())));
        (reconciler, transport, db)
    }

    #[tokio::test]
    async fn test_enqueue_unknown_tag() {
        let (reconciler, _transport, _db) = setup().await;
        let result = reconciler.enqueue("sync-nothing", &goal_update(1)).await;
        assert!(matches!(result, Err(Error::UnknownSyncTag(_))));
    }

    #[tokio::test]
    async fn test_drain_removes_only_successes() {
        let (reconciler, transport, db) = setup().await;
        let ok = reconciler.enqueue(TAG, &goal_update(1)).await.unwrap();
        let down = reconciler.enqueue(TAG, &goal_update(2)).await.unwrap();
        let rejected = reconciler.enqueue(TAG, &goal_update(3)).await.unwrap();

        transport.route("PATCH", "https://app.test/api/goals/1", 200, "{}");
        transport.unreachable("https://app.test/api/goals/2");
        transport.route("PATCH", "https://app.test/api/goals/3", 500, "oops");

        let report = reconciler.reconcile(TAG).await.unwrap();
        assert_eq!(report.replayed, vec![ok.id]);
        assert_eq!(report.retained, vec![down.id, rejected.id]);

        let left = db.pending_actions(NAMESPACE).await.unwrap();
        assert_eq!(left, vec![down.clone(), rejected.clone()]);
        assert_eq!(left[0].request, goal_update(2));
        assert_eq!(db.registered_tags().await.unwrap(), vec![TAG.to_string()]);
    }

    #[tokio::test]
    async fn test_replay_sends_stored_request() {
        let (reconciler, transport, _db) = setup().await;
        reconciler.enqueue(TAG, &goal_update(4)).await.unwrap();
        transport.route("PATCH", "https://app.test/api/goals/4", 204, "");

        reconciler.reconcile(TAG).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "PATCH");
        assert_eq!(calls[0].2.as_deref(), Some(&br#"{"progress":40}"#[..]));
    }

    #[tokio::test]
    async fn test_drained_queue_clears_registration() {
        let (reconciler, transport, db) = setup().await;
        reconciler.enqueue(TAG, &goal_update(1)).await.unwrap();
        transport.route("PATCH", "https://app.test/api/goals/1", 200, "{}");

        let report = reconciler.reconcile(TAG).await.unwrap();
        assert_eq!(report.replayed.len(), 1);
        assert!(db.registered_tags().await.unwrap().is_empty());
        assert_eq!(db.count_pending(NAMESPACE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tags_reconcile_independently() {
        let (reconciler, transport, db) = setup().await;
        reconciler.enqueue(TAG, &goal_update(1)).await.unwrap();
        let question = PendingRequest {
            method: "POST".into(),
            url: "https://app.test/api/memory-questions".into(),
            headers: BTreeMap::new(),
            body: Some(b"{}".to_vec()),
        };
        reconciler.enqueue("sync-memory-questions", &question).await.unwrap();
        transport.route("PATCH", "https://app.test/api/goals/1", 200, "{}");

        let report = reconciler.reconcile(TAG).await.unwrap();
        assert_eq!(report.replayed.len(), 1);
        assert_eq!(db.count_pending("pending-memory-questions").await.unwrap(), 1);

        let reports = reconciler.reconcile_registered().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tag, "sync-memory-questions");
        assert_eq!(reports[0].retained.len(), 1);
    }

    /// Succeeds on the server, then removes the action itself before the
    /// reconciler does, as a concurrent pass would.
    struct AckLost {
        db: CacheDb,
        seen: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl ReplayHandler for AckLost {
        async fn replay(&self, action: &PendingAction) -> Result<(), ReplayError> {
            self.seen.lock().unwrap().push(action.id);
            self.db.remove_action(action.id).await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_replay_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handler = Arc::new(AckLost { db: db.clone(), seen: StdMutex::new(Vec::new()) });
        let mut reconciler = SyncReconciler::new(db.clone());
        reconciler.register(TAG, NAMESPACE, handler.clone());

        let action = reconciler.enqueue(TAG, &goal_update(1)).await.unwrap();
        let report = reconciler.reconcile(TAG).await.unwrap();

        assert!(report.replayed.is_empty());
        assert_eq!(report.already_removed, vec![action.id]);
        assert!(report.retained.is_empty());
        assert_eq!(db.count_pending(NAMESPACE).await.unwrap(), 0);

        let again = reconciler.reconcile(TAG).await.unwrap();
        assert_eq!(again, SyncReport { tag: TAG.into(), namespace: NAMESPACE.into(), ..Default::default() });
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }

    /// Delivers every action, slowly enough for passes to overlap.
    struct SlowDelivery {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl ReplayHandler for SlowDelivery {
        async fn replay(&self, _action: &PendingAction) -> Result<(), ReplayError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overlapping_passes_replay_each_action_once() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handler = Arc::new(SlowDelivery { sent: AtomicUsize::new(0) });
        let mut reconciler = SyncReconciler::new(db.clone());
        reconciler.register(TAG, NAMESPACE, handler.clone());
        for id in 1..=3 {
            reconciler.enqueue(TAG, &goal_update(id)).await.unwrap();
        }

        let (first, second) = tokio::join!(reconciler.reconcile(TAG), reconciler.reconcile(TAG));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(handler.sent.load(Ordering::SeqCst), 3);
        assert_eq!(first.replayed.len() + second.replayed.len(), 3);
        assert!(first.already_removed.is_empty() && second.already_removed.is_empty());
        assert_eq!(db.count_pending(NAMESPACE).await.unwrap(), 0);
    }

    #[test]
    fn test_request_from_pending_invalid() {
        let mut pending = goal_update(1);
        pending.url = "not a url".into();
        assert!(matches!(request_from_pending(&pending), Err(ReplayError::Invalid(_))));
    }
}
