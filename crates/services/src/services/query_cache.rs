//! Server-response cache with named invalidation keys.
//!
//! Reads go through [`QueryCache::entity`] / [`QueryCache::entity_list`],
//! which load on a miss and share a single in-flight load between concurrent
//! callers. Mutations invalidate a key; the next read pulls fresh data.

use std::{future::Future, sync::Arc, time::Duration};

use models::entity::{EntityRecord, EntitySummary};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use super::wiki_api::WikiApiError;

const MAX_ENTRIES: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Entity { wiki_id: Uuid, entity_id: Uuid },
    EntityList { wiki_id: Uuid },
}

#[derive(Clone)]
pub struct QueryCache {
    entities: Cache<(Uuid, Uuid), Arc<EntityRecord>>,
    lists: Cache<Uuid, Arc<Vec<EntitySummary>>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entities: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            lists: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn entity<F>(
        &self,
        wiki_id: Uuid,
        entity_id: Uuid,
        fetch: F,
    ) -> Result<Arc<EntityRecord>, WikiApiError>
    where
        F: Future<Output = Result<EntityRecord, WikiApiError>>,
    {
        self.entities
            .try_get_with((wiki_id, entity_id), async { fetch.await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn entity_list<F>(
        &self,
        wiki_id: Uuid,
        fetch: F,
    ) -> Result<Arc<Vec<EntitySummary>>, WikiApiError>
    where
        F: Future<Output = Result<Vec<EntitySummary>, WikiApiError>>,
    {
        self.lists
            .try_get_with(wiki_id, async { fetch.await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn invalidate(&self, key: CacheKey) {
        debug!(?key, "Invalidating cache key");
        match key {
            CacheKey::Entity { wiki_id, entity_id } => {
                self.entities.invalidate(&(wiki_id, entity_id)).await
            }
            CacheKey::EntityList { wiki_id } => self.lists.invalidate(&wiki_id).await,
        }
    }

    pub async fn contains(&self, key: CacheKey) -> bool {
        match key {
            CacheKey::Entity { wiki_id, entity_id } => {
                self.entities.get(&(wiki_id, entity_id)).await.is_some()
            }
            CacheKey::EntityList { wiki_id } => self.lists.get(&wiki_id).await.is_some(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
