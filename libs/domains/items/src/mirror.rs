//! Propagation of item mutations into the search index

use async_trait::async_trait;
use domain_search::{ITEMS_INDEX, SearchIndex, add_document_to_index, delete_document_from_index};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::{ItemError, ItemResult};
use crate::models::{Item, ItemSearchDocument};
use crate::outbox::MirrorEvent;
use crate::repository::OutboxRepository;

/// Receives every successful item mutation, after the store write
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexMirror: Send + Sync {
    /// The item was created or updated
    async fn upsert(&self, item: &Item) -> ItemResult<()>;

    /// The item was deleted
    async fn remove(&self, item_id: Uuid) -> ItemResult<()>;
}

/// Writes straight to the search index
///
/// Index failures are returned to the caller, so the surrounding operation
/// fails even though the store write already happened.
#[derive(Clone)]
pub struct DirectMirror {
    index: Arc<dyn SearchIndex>,
}

impl DirectMirror {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl IndexMirror for DirectMirror {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn upsert(&self, item: &Item) -> ItemResult<()> {
        let document = ItemSearchDocument::from(item)
            .to_value()
            .map_err(|e| ItemError::Internal(e.to_string()))?;
        add_document_to_index(self.index.as_ref(), document, ITEMS_INDEX).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, item_id: Uuid) -> ItemResult<()> {
        delete_document_from_index(self.index.as_ref(), ITEMS_INDEX, &item_id.to_string())
            .await?;
        Ok(())
    }
}

/// Records mirror writes in the outbox for the relay to apply
///
/// Never fails the surrounding operation: an outbox write error is logged
/// and swallowed.
pub struct OutboxMirror<O: OutboxRepository> {
    outbox: Arc<O>,
}

impl<O: OutboxRepository> OutboxMirror<O> {
    pub fn new(outbox: Arc<O>) -> Self {
        Self { outbox }
    }

    async fn record(&self, event: MirrorEvent) {
        let (event_id, item_id) = (event.id, event.item_id);
        match self.outbox.append(event).await {
            Ok(()) => debug!(%event_id, %item_id, "Mirror event recorded"),
            Err(e) => error!(
                %event_id,
                %item_id,
                error = %e,
                "Failed to record mirror event; index will be stale until the next reindex"
            ),
        }
    }
}

#[async_trait]
impl<O: OutboxRepository> IndexMirror for OutboxMirror<O> {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn upsert(&self, item: &Item) -> ItemResult<()> {
        match MirrorEvent::upsert(item) {
            Ok(event) => self.record(event).await,
            Err(e) => error!(error = %e, "Failed to build mirror event"),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, item_id: Uuid) -> ItemResult<()> {
        self.record(MirrorEvent::delete(item_id)).await;
        Ok(())
    }
}

impl<O: OutboxRepository> Clone for OutboxMirror<O> {
    fn clone(&self) -> Self {
        Self {
            outbox: Arc::clone(&self.outbox),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateItem, ItemStatus};
    use crate::outbox::MirrorOp;
    use crate::repository::MockOutboxRepository;
    use domain_search::{InMemorySearchIndex, IndexOperation};

    fn sample_item() -> Item {
        Item::new(CreateItem {
            user: Uuid::now_v7(),
            category: Uuid::now_v7(),
            title: "Road bike".to_string(),
            description: String::new(),
            price: Some(120.0),
            location: None,
            status: ItemStatus::Available,
            attributes: serde_json::Value::Null,
            images: vec![],
        })
    }

    #[tokio::test]
    async fn test_direct_mirror_writes_document_keyed_by_item_id() {
        let index = InMemorySearchIndex::new();
        let mirror = DirectMirror::new(Arc::new(index.clone()));
        let item = sample_item();

        mirror.upsert(&item).await.unwrap();

        let stored = index.document(ITEMS_INDEX, &item.id.to_string()).await.unwrap();
        assert_eq!(stored["title"], "Road bike");

        mirror.remove(item.id).await.unwrap();
        assert!(index.document(ITEMS_INDEX, &item.id.to_string()).await.is_none());
        assert_eq!(index.operations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_direct_mirror_propagates_index_failures() {
        let index = InMemorySearchIndex::new();
        index.set_failing(true);
        let mirror = DirectMirror::new(Arc::new(index.clone()));

        let err = mirror.upsert(&sample_item()).await.unwrap_err();
        assert!(matches!(err, ItemError::Search(_)));
        assert_eq!(index.operations().await, Vec::<IndexOperation>::new());
    }

    #[tokio::test]
    async fn test_outbox_mirror_appends_events() {
        let item = sample_item();
        let item_id = item.id;

        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_append()
            .withf(move |event| {
                event.item_id == item_id && matches!(event.op, MirrorOp::Upsert { .. })
            })
            .times(1)
            .returning(|_| Ok(()));
        outbox
            .expect_append()
            .withf(move |event| event.item_id == item_id && event.op == MirrorOp::Delete)
            .times(1)
            .returning(|_| Ok(()));

        let mirror = OutboxMirror::new(Arc::new(outbox));
        mirror.upsert(&item).await.unwrap();
        mirror.remove(item_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_outbox_mirror_swallows_append_failures() {
        let mut outbox = MockOutboxRepository::new();
        outbox
            .expect_append()
            .times(1)
            .returning(|_| Err(ItemError::Database("connection reset".to_string())));

        let mirror = OutboxMirror::new(Arc::new(outbox));
        assert!(mirror.remove(Uuid::now_v7()).await.is_ok());
    }
}
