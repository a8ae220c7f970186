//! Periodic sync scheduler.
//!
//! Stands in for the platform's background-sync trigger: every
//! `sync_interval_secs` it reconciles each tag that still has a sync
//! registration. Work left behind is simply retried on the next tick.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use hero_client::{OfflineWorker, SyncReport};

/// Run one reconciliation pass over every registered tag.
pub async fn tick(worker: &OfflineWorker) -> Vec<SyncReport> {
    match worker.sync_registered().await {
        Ok(reports) => reports,
        Err(e) => {
            tracing::warn!(error = %e, "scheduled sync failed");
            Vec::new()
        }
    }
}

pub fn spawn(worker: Arc<OfflineWorker>) -> JoinHandle<()> {
    let period = worker.config().sync_interval();
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let reports = tick(&worker).await;
            if !reports.is_empty() {
                tracing::debug!(passes = reports.len(), "scheduled sync finished");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{ReplayTransport, worker_with};
    use hero_core::PendingRequest;

    fn pending(path: &str) -> PendingRequest {
        PendingRequest {
            method: "POST".into(),
            url: format!("https://app.test{path}"),
            headers: Default::default(),
            body: Some(b"{}".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_tick_drains_registered_tags() {
        let transport = Arc::new(ReplayTransport::new(true));
        let worker = worker_with(transport.clone()).await;
        worker.enqueue("sync-memory-questions", &pending("/api/memory-questions")).await.unwrap();
        worker.enqueue("sync-goal-updates", &pending("/api/goals/3")).await.unwrap();

        let reports = tick(&worker).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.replayed.len() == 1 && r.retained.is_empty()));
        assert!(worker.db().registered_tags().await.unwrap().is_empty());

        // nothing registered, nothing replayed
        assert!(tick(&worker).await.is_empty());
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test]
    async fn test_tick_keeps_work_while_offline() {
        let transport = Arc::new(ReplayTransport::new(false));
        let worker = worker_with(transport).await;
        worker.enqueue("sync-goal-updates", &pending("/api/goals/3")).await.unwrap();

        let reports = tick(&worker).await;
        assert_eq!(reports[0].retained.len(), 1);
        assert_eq!(worker.db().registered_tags().await.unwrap(), vec!["sync-goal-updates".to_string()]);
    }
}
