//! Background usage writer.
//!
//! Status transitions hand usage writes to a queue instead of writing them
//! inline, so a slow or failing usage store never blocks or rolls back a
//! transition. One worker task drains the queue in order. Delivery is
//! at-least-once: a retryable failure is retried with linear backoff up to
//! `max_attempts`, then dropped with an error log. Started events carry a
//! pre-built record, so a retried append is deduplicated by record id.

use crate::config::UsageWorkerConfig;
use crate::error::Result;
use crate::machine::MachineKey;
use crate::usage::UsageRecord;
use crate::usage_log::UsageLog;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum UsageEvent {
    Started(UsageRecord),
    Stopped {
        key: MachineKey,
        stopped_at: DateTime<Utc>,
    },
}

impl UsageEvent {
    pub fn key(&self) -> MachineKey {
        match self {
            UsageEvent::Started(record) => record.key(),
            UsageEvent::Stopped { key, .. } => *key,
        }
    }
}

enum Message {
    Event(UsageEvent),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Sending half of the usage queue. Cheap to clone.
#[derive(Clone)]
pub struct UsageDispatcher {
    tx: mpsc::UnboundedSender<Message>,
}

impl UsageDispatcher {
    /// Queue an event without waiting for it to be written.
    pub fn dispatch(&self, event: UsageEvent) {
        let key = event.key();
        if self.tx.send(Message::Event(event)).is_err() {
            warn!(machine = %key, "usage worker is gone, dropping usage event");
        }
    }

    /// Wait until everything queued before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Ask the worker to stop once the events queued so far are written.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Close);
    }
}

pub fn spawn_usage_worker(
    log: Arc<UsageLog>,
    config: UsageWorkerConfig,
) -> (UsageDispatcher, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(log, config, rx));
    (UsageDispatcher { tx }, handle)
}

async fn run(
    log: Arc<UsageLog>,
    config: UsageWorkerConfig,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    info!(max_attempts = config.max_attempts, "usage worker started");

    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(event) => deliver(&log, &config, event).await,
            Message::Flush(done) => {
                let _ = done.send(());
            }
            Message::Close => break,
        }
    }

    info!("usage worker stopped");
}

async fn deliver(log: &UsageLog, config: &UsageWorkerConfig, event: UsageEvent) {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match apply(log, &event).await {
            Ok(()) => return,
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(machine = %event.key(), attempt, error = %err, "usage write failed, retrying");
                tokio::time::sleep(config.backoff(attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                error!(machine = %event.key(), attempt, error = %err, "usage write dropped");
                return;
            }
        }
    }
}

async fn apply(log: &UsageLog, event: &UsageEvent) -> Result<()> {
    match event {
        UsageEvent::Started(record) => log.append_open(record).await,
        UsageEvent::Stopped { key, stopped_at } => {
            let outcome = log.record_stop(*key, *stopped_at).await?;
            debug!(machine = %key, finalized = outcome.record().is_some(), "usage stop handled");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LaundryError;
    use crate::filter::{Page, PageRequest, UsageFilter};
    use crate::machine::{Machine, MachineType};
    use crate::store::{MemoryStore, UsageStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Fails the first `failures` appends, then behaves.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl UsageStore for FlakyStore {
        async fn append_usage(&self, record: &UsageRecord) -> Result<bool> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(LaundryError::BackendUnavailable("flaky".into()));
            }
            self.inner.append_usage(record).await
        }

        async fn latest_open_usage(&self, key: MachineKey) -> Result<Option<UsageRecord>> {
            self.inner.latest_open_usage(key).await
        }

        async fn close_usage(
            &self,
            id: Uuid,
            stopped_at: DateTime<Utc>,
        ) -> Result<Option<UsageRecord>> {
            self.inner.close_usage(id, stopped_at).await
        }

        async fn find_usage(
            &self,
            filter: &UsageFilter,
            page: PageRequest,
        ) -> Result<Page<UsageRecord>> {
            self.inner.find_usage(filter, page).await
        }
    }

    fn fast_retries(max_attempts: u32) -> UsageWorkerConfig {
        UsageWorkerConfig {
            max_attempts,
            retry_backoff_ms: 1,
        }
    }

    fn started(at: DateTime<Utc>) -> UsageEvent {
        let m = Machine::new(14, 0, MachineType::Washer, Duration::from_secs(1800));
        UsageEvent::Started(UsageRecord::open(&m, at))
    }

    #[tokio::test]
    async fn test_events_are_written_in_order() {
        let log = Arc::new(UsageLog::new(Arc::new(MemoryStore::new())));
        let (usage, handle) = spawn_usage_worker(log.clone(), fast_retries(3));
        let start = Utc::now();

        usage.dispatch(started(start));
        usage.dispatch(UsageEvent::Stopped {
            key: MachineKey::new(14, 0),
            stopped_at: start + chrono::Duration::minutes(30),
        });
        usage.shutdown();
        handle.await.unwrap();

        let page = log.find(&UsageFilter::at(14, 0), PageRequest::default()).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(page.items[0].stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(2),
        });
        let log = Arc::new(UsageLog::new(store.clone()));
        let (usage, _handle) = spawn_usage_worker(log.clone(), fast_retries(3));

        usage.dispatch(started(Utc::now()));
        usage.flush().await;

        assert_eq!(store.inner.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_the_event() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(10),
        });
        let log = Arc::new(UsageLog::new(store.clone()));
        let (usage, _handle) = spawn_usage_worker(log, fast_retries(2));

        usage.dispatch(started(Utc::now()));
        usage.flush().await;

        assert_eq!(store.inner.usage_count(), 0);
        assert_eq!(store.failures.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_does_not_panic() {
        let log = Arc::new(UsageLog::new(Arc::new(MemoryStore::new())));
        let (usage, handle) = spawn_usage_worker(log, fast_retries(1));

        usage.shutdown();
        handle.await.unwrap();

        usage.dispatch(started(Utc::now()));
        usage.flush().await;
    }
}
