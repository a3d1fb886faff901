//! Outbox of search-index mirror writes and the relay that applies them
//!
//! Item mutations append a [`MirrorEvent`] instead of calling the search
//! engine inline. [`IndexMirrorRelay`] drains the outbox in id order, applies
//! each event to the index and retries failures with exponential backoff.
//! Events of the same item are applied in order: while an earlier event of
//! an item waits for a retry, later events of that item wait too.

use chrono::{DateTime, TimeDelta, Utc};
use core_config::{ConfigError, FromEnv, env_parse};
use database::common::{RetryConfig, backoff_delay};
use domain_search::{
    ITEMS_INDEX, SearchIndex, add_document_to_index, delete_document_from_index,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ItemError, ItemResult};
use crate::models::{Item, ItemSearchDocument};
use crate::repository::{ItemRepository, OutboxRepository};

/// Mirror operation carried by an outbox event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorOp {
    /// Add or replace the index document with this snapshot
    Upsert { document: serde_json::Value },
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MirrorEventStatus {
    Pending,
    Done,
    /// Gave up after the last attempt
    Failed,
}

/// One pending mirror write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEvent {
    /// Time-ordered (v7); the relay applies events in id order
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub item_id: Uuid,
    pub op: MirrorOp,
    pub status: MirrorEventStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Not retried before this instant
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MirrorEvent {
    fn new(item_id: Uuid, op: MirrorOp) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            item_id,
            op,
            status: MirrorEventStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now,
            created_at: now,
            processed_at: None,
        }
    }

    /// Snapshot the item as its index document
    pub fn upsert(item: &Item) -> ItemResult<Self> {
        let document = ItemSearchDocument::from(item)
            .to_value()
            .map_err(|e| ItemError::Internal(e.to_string()))?;
        Ok(Self::new(item.id, MirrorOp::Upsert { document }))
    }

    pub fn delete(item_id: Uuid) -> Self {
        Self::new(item_id, MirrorOp::Delete)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }
}

/// Relay tuning
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Events fetched per drain
    pub batch_size: usize,
    /// Pause between drains
    pub poll_interval: Duration,
    /// Attempts before an event is marked failed
    pub max_attempts: u32,
    /// Backoff between attempts of one event
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(1000),
            max_attempts: 5,
            retry: RetryConfig::new()
                .with_initial_delay(1000)
                .with_max_delay(60_000),
        }
    }
}

impl RelayConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Environment variables:
/// - `OUTBOX_BATCH_SIZE` (default: 100)
/// - `OUTBOX_POLL_INTERVAL_MS` (default: 1000)
/// - `OUTBOX_MAX_ATTEMPTS` (default: 5)
/// - `OUTBOX_INITIAL_BACKOFF_MS` (default: 1000)
/// - `OUTBOX_MAX_BACKOFF_MS` (default: 60000)
impl FromEnv for RelayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let batch_size: usize = env_parse("OUTBOX_BATCH_SIZE", 100)?;
        let max_attempts: u32 = env_parse("OUTBOX_MAX_ATTEMPTS", 5)?;
        let initial_backoff_ms: u64 = env_parse("OUTBOX_INITIAL_BACKOFF_MS", 1000)?;
        let max_backoff_ms: u64 = env_parse("OUTBOX_MAX_BACKOFF_MS", 60_000)?;

        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTBOX_BATCH_SIZE".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTBOX_MAX_ATTEMPTS".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        if initial_backoff_ms > max_backoff_ms {
            return Err(ConfigError::InvalidValue {
                key: "OUTBOX_INITIAL_BACKOFF_MS".to_string(),
                details: format!("must not exceed OUTBOX_MAX_BACKOFF_MS ({max_backoff_ms})"),
            });
        }

        Ok(Self {
            batch_size,
            poll_interval: Duration::from_millis(env_parse("OUTBOX_POLL_INTERVAL_MS", 1000)?),
            max_attempts,
            retry: RetryConfig::new()
                .with_initial_delay(initial_backoff_ms)
                .with_max_delay(max_backoff_ms),
        })
    }
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub retried: usize,
    pub failed: usize,
    /// Not due yet, or queued behind an earlier event of the same item
    pub deferred: usize,
}

impl DrainReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    fn attempted(&self) -> usize {
        self.applied + self.retried + self.failed
    }
}

/// Applies outbox events to the search index
pub struct IndexMirrorRelay<O: OutboxRepository, R: ItemRepository> {
    outbox: Arc<O>,
    items: Arc<R>,
    index: Arc<dyn SearchIndex>,
    config: RelayConfig,
}

impl<O: OutboxRepository, R: ItemRepository> IndexMirrorRelay<O, R> {
    pub fn new(
        outbox: Arc<O>,
        items: Arc<R>,
        index: Arc<dyn SearchIndex>,
        config: RelayConfig,
    ) -> Self {
        Self {
            outbox,
            items,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Apply up to one batch of pending events
    ///
    /// Pages through the log past deferred events, so an item waiting on
    /// backoff does not hold back due events of other items.
    #[instrument(skip(self))]
    pub async fn drain_once(&self) -> ItemResult<DrainReport> {
        let now = Utc::now();
        let limit = self.config.batch_size;
        let mut after = None;
        let mut blocked: HashSet<Uuid> = HashSet::new();
        let mut report = DrainReport::default();

        loop {
            let events = self.outbox.pending(after, limit).await?;
            let exhausted = events.is_empty() || events.len() < limit;
            after = events.last().map(|event| event.id);

            for event in events {
                self.process(event, now, &mut blocked, &mut report).await?;
            }

            if exhausted || report.attempted() >= limit {
                break;
            }
        }

        Ok(report)
    }

    async fn process(
        &self,
        event: MirrorEvent,
        now: DateTime<Utc>,
        blocked: &mut HashSet<Uuid>,
        report: &mut DrainReport,
    ) -> ItemResult<()> {
        if blocked.contains(&event.item_id) || !event.is_due(now) {
            blocked.insert(event.item_id);
            report.deferred += 1;
            return Ok(());
        }

        match self.apply(&event).await {
            Ok(()) => {
                self.outbox.mark_done(event.id, Utc::now()).await?;
                report.applied += 1;
            }
            Err(e) => {
                let attempts = event.attempts + 1;
                let message = e.to_string();

                if attempts >= self.config.max_attempts {
                    error!(
                        event_id = %event.id,
                        item_id = %event.item_id,
                        attempts,
                        error = %message,
                        "Mirror event failed permanently"
                    );
                    self.outbox.mark_failed(event.id, attempts, message).await?;
                    report.failed += 1;
                } else {
                    let delay = backoff_delay(&self.config.retry, attempts);
                    let available_at = now
                        + TimeDelta::from_std(delay)
                            .map_err(|e| ItemError::Internal(e.to_string()))?;
                    warn!(
                        event_id = %event.id,
                        item_id = %event.item_id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Mirror event failed, scheduling retry"
                    );
                    self.outbox
                        .schedule_retry(event.id, attempts, available_at, message)
                        .await?;
                    blocked.insert(event.item_id);
                    report.retried += 1;
                }
            }
        }

        Ok(())
    }

    async fn apply(&self, event: &MirrorEvent) -> ItemResult<()> {
        match &event.op {
            MirrorOp::Upsert { document } => {
                add_document_to_index(self.index.as_ref(), document.clone(), ITEMS_INDEX).await?
            }
            MirrorOp::Delete => {
                delete_document_from_index(
                    self.index.as_ref(),
                    ITEMS_INDEX,
                    &event.item_id.to_string(),
                )
                .await?
            }
        }
        debug!(event_id = %event.id, item_id = %event.item_id, "Mirror event applied");
        Ok(())
    }

    /// Drain the outbox until the shutdown flag flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ItemResult<()> {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "Starting index mirror relay"
        );

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping relay");
                break;
            }

            match self.drain_once().await {
                Ok(report) if !report.is_idle() => info!(
                    applied = report.applied,
                    retried = report.retried,
                    failed = report.failed,
                    deferred = report.deferred,
                    "Outbox drained"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Error draining outbox"),
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Received shutdown signal, stopping relay");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Index mirror relay stopped");
        Ok(())
    }

    /// Push every stored item into the index; returns the number of items
    #[instrument(skip(self))]
    pub async fn reindex_all(&self) -> ItemResult<usize> {
        let items = self.items.find_all().await?;

        for chunk in items.chunks(self.config.batch_size.max(1)) {
            let documents = chunk
                .iter()
                .map(|item| ItemSearchDocument::from(item).to_value())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ItemError::Internal(e.to_string()))?;
            self.index.add_documents(ITEMS_INDEX, documents).await?;
        }

        info!(count = items.len(), "Reindexed all items");
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOutboxRepository;
    use crate::models::{CreateItem, ItemStatus};
    use crate::repository::{MockItemRepository, MockOutboxRepository};
    use domain_search::{InMemorySearchIndex, IndexOperation};
    use mockall::predicate::{always, eq};

    fn sample_item(title: &str) -> Item {
        Item::new(CreateItem {
            user: Uuid::now_v7(),
            category: Uuid::now_v7(),
            title: title.to_string(),
            description: String::new(),
            price: None,
            location: None,
            status: ItemStatus::Available,
            attributes: serde_json::Value::Null,
            images: vec![],
        })
    }

    fn relay_config(max_attempts: u32) -> RelayConfig {
        RelayConfig::default().with_max_attempts(max_attempts).with_retry(
            RetryConfig::new()
                .with_initial_delay(1000)
                .with_max_delay(5000)
                .without_jitter(),
        )
    }

    fn relay_with(
        outbox: MockOutboxRepository,
        index: &InMemorySearchIndex,
        config: RelayConfig,
    ) -> IndexMirrorRelay<MockOutboxRepository, MockItemRepository> {
        IndexMirrorRelay::new(
            Arc::new(outbox),
            Arc::new(MockItemRepository::new()),
            Arc::new(index.clone()),
            config,
        )
    }

    #[test]
    fn test_event_serialization() {
        let event = MirrorEvent::delete(Uuid::now_v7());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["op"], serde_json::json!({ "kind": "delete" }));
        assert_eq!(json["status"], "pending");
        assert_eq!(json["_id"], event.id.to_string());
    }

    #[tokio::test]
    async fn test_drain_applies_due_events_and_marks_done() {
        let item = sample_item("Road bike");
        let event = MirrorEvent::upsert(&item).unwrap();
        let event_id = event.id;

        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_pending()
            .returning(move |_, _| Ok(vec![event.clone()]));
        outbox
            .expect_mark_done()
            .with(eq(event_id), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let index = InMemorySearchIndex::new();
        let report = relay_with(outbox, &index, relay_config(3)).drain_once().await.unwrap();

        assert_eq!(report.applied, 1);
        assert!(index.document(ITEMS_INDEX, &item.id.to_string()).await.is_some());
    }

    #[tokio::test]
    async fn test_failure_schedules_retry_and_blocks_later_events_of_item() {
        let item = sample_item("Road bike");
        let first = MirrorEvent::upsert(&item).unwrap();
        let second = MirrorEvent::delete(item.id);
        let first_id = first.id;

        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_pending()
            .returning(move |_, _| Ok(vec![first.clone(), second.clone()]));
        outbox
            .expect_schedule_retry()
            .withf(move |id, attempts, available_at, _| {
                *id == first_id && *attempts == 1 && *available_at > Utc::now()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        outbox.expect_mark_done().never();

        let index = InMemorySearchIndex::new();
        index.set_failing(true);
        let report = relay_with(outbox, &index, relay_config(3)).drain_once().await.unwrap();

        assert_eq!(
            report,
            DrainReport {
                retried: 1,
                deferred: 1,
                ..DrainReport::default()
            }
        );
    }

    #[tokio::test]
    async fn test_not_due_event_defers_item() {
        let item = sample_item("Road bike");
        let mut waiting = MirrorEvent::upsert(&item).unwrap();
        waiting.available_at = Utc::now() + TimeDelta::minutes(5);
        let later = MirrorEvent::delete(item.id);

        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_pending()
            .returning(move |_, _| Ok(vec![waiting.clone(), later.clone()]));
        outbox.expect_mark_done().never();

        let index = InMemorySearchIndex::new();
        let report = relay_with(outbox, &index, relay_config(3)).drain_once().await.unwrap();

        assert_eq!(report.deferred, 2);
        assert!(index.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_item_does_not_hold_back_other_items() {
        let outbox = Arc::new(InMemoryOutboxRepository::new());
        let waiting = sample_item("Desk lamp");
        for _ in 0..3 {
            let mut event = MirrorEvent::upsert(&waiting).unwrap();
            event.available_at = Utc::now() + TimeDelta::minutes(5);
            outbox.append(event).await.unwrap();
        }
        let due = sample_item("Road bike");
        outbox.append(MirrorEvent::upsert(&due).unwrap()).await.unwrap();

        let index = InMemorySearchIndex::new();
        let relay = IndexMirrorRelay::new(
            outbox.clone(),
            Arc::new(MockItemRepository::new()),
            Arc::new(index.clone()),
            relay_config(3).with_batch_size(2),
        );
        let report = relay.drain_once().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.deferred, 3);
        assert!(index.document(ITEMS_INDEX, &due.id.to_string()).await.is_some());
        assert!(index.document(ITEMS_INDEX, &waiting.id.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_stops_after_one_batch_of_attempts() {
        let outbox = Arc::new(InMemoryOutboxRepository::new());
        for title in ["a", "b", "c"] {
            outbox
                .append(MirrorEvent::upsert(&sample_item(title)).unwrap())
                .await
                .unwrap();
        }

        let index = InMemorySearchIndex::new();
        let relay = IndexMirrorRelay::new(
            outbox.clone(),
            Arc::new(MockItemRepository::new()),
            Arc::new(index.clone()),
            relay_config(3).with_batch_size(2),
        );

        assert_eq!(relay.drain_once().await.unwrap().applied, 2);
        assert_eq!(relay.drain_once().await.unwrap().applied, 1);
        assert_eq!(index.document_count(ITEMS_INDEX).await, 3);
    }

    #[tokio::test]
    async fn test_last_attempt_marks_failed() {
        let mut event = MirrorEvent::delete(Uuid::now_v7());
        event.attempts = 2;
        let event_id = event.id;

        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_pending()
            .returning(move |_, _| Ok(vec![event.clone()]));
        outbox
            .expect_mark_failed()
            .with(eq(event_id), eq(3), always())
            .times(1)
            .returning(|_, _, _| Ok(()));
        outbox.expect_schedule_retry().never();

        let index = InMemorySearchIndex::new();
        index.set_failing(true);
        let report = relay_with(outbox, &index, relay_config(3)).drain_once().await.unwrap();

        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_reindex_all_pushes_items_in_batches() {
        let items = vec![sample_item("a"), sample_item("b"), sample_item("c")];
        let mut repo = MockItemRepository::new();
        let returned = items.clone();
        repo.expect_find_all()
            .times(1)
            .returning(move || Ok(returned.clone()));

        let index = InMemorySearchIndex::new();
        let relay = IndexMirrorRelay::new(
            Arc::new(MockOutboxRepository::new()),
            Arc::new(repo),
            Arc::new(index.clone()),
            relay_config(3).with_batch_size(2),
        );

        assert_eq!(relay.reindex_all().await.unwrap(), 3);
        assert_eq!(index.document_count(ITEMS_INDEX).await, 3);
        let adds = index
            .operations()
            .await
            .into_iter()
            .filter(|op| matches!(op, IndexOperation::Add { .. }))
            .count();
        assert_eq!(adds, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut outbox = MockOutboxRepository::new();
        outbox.expect_pending().returning(|_, _| Ok(vec![]));

        let index = InMemorySearchIndex::new();
        let relay = relay_with(
            outbox,
            &index,
            relay_config(3).with_poll_interval(Duration::from_millis(10)),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { relay.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("OUTBOX_BATCH_SIZE", Some("25")),
                ("OUTBOX_POLL_INTERVAL_MS", Some("250")),
                ("OUTBOX_MAX_ATTEMPTS", None),
                ("OUTBOX_INITIAL_BACKOFF_MS", None),
                ("OUTBOX_MAX_BACKOFF_MS", None),
            ],
            || {
                let config = RelayConfig::from_env().unwrap();
                assert_eq!(config.batch_size, 25);
                assert_eq!(config.poll_interval, Duration::from_millis(250));
                assert_eq!(config.max_attempts, 5);
            },
        );
    }

    #[test]
    fn test_config_rejects_zero_attempts() {
        temp_env::with_var("OUTBOX_MAX_ATTEMPTS", Some("0"), || {
            assert!(matches!(
                RelayConfig::from_env(),
                Err(ConfigError::InvalidValue { .. })
            ));
        });
    }
}
