use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    cached,
    db::store::{CorpusSnapshot, RecipeCorpus},
    error::AppResult,
    models::{Recipe, RecipeId, RecipeSummary},
};

use super::{Cache, CacheKey};

/// Corpus decorator that serves snapshots and lookups from Redis
///
/// Snapshot keys embed the corpus version, so a changed corpus is never served stale.
/// Single-recipe and search entries expire after the TTL.
pub struct CachedCorpus {
    inner: Arc<dyn RecipeCorpus>,
    cache: Cache,
    ttl: u64,
}

impl CachedCorpus {
    pub fn new(inner: Arc<dyn RecipeCorpus>, cache: Cache, ttl: u64) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl RecipeCorpus for CachedCorpus {
    async fn version(&self) -> AppResult<u64> {
        self.inner.version().await
    }

    async fn snapshot(&self) -> AppResult<CorpusSnapshot> {
        let version = self.inner.version().await?;
        cached!(self.cache, CacheKey::Corpus(version), self.ttl, self.inner.snapshot())
    }

    async fn get(&self, id: RecipeId) -> AppResult<Option<Recipe>> {
        cached!(self.cache, CacheKey::Recipe(id), self.ttl, self.inner.get(id))
    }

    async fn search(&self, query: &str) -> AppResult<Vec<RecipeSummary>> {
        cached!(
            self.cache,
            CacheKey::RecipeSearch(query.to_string()),
            self.ttl,
            self.inner.search(query)
        )
    }
}
