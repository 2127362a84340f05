//! Cached resolver: in-memory cache wrapper for any `ModelLimitResolver`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::resolver::ModelLimitResolver;
use crate::spec::ModelSpec;

/// Wraps any resolver with an in-memory cache.
pub struct CachedResolver<R> {
    inner: R,
    cache: Arc<RwLock<HashMap<String, ModelSpec>>>,
}

impl<R> CachedResolver<R>
where
    R: ModelLimitResolver,
{
    /// Create a new cached resolver.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Refresh cache with new specs. Merges into existing cache.
    pub async fn refresh(&self, specs: HashMap<String, ModelSpec>) {
        let mut cache = self.cache.write().await;
        for (k, v) in specs {
            cache.insert(k, v);
        }
    }

    /// Clear the cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Get reference to inner resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R> ModelLimitResolver for CachedResolver<R>
where
    R: ModelLimitResolver + Send + Sync,
{
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec> {
        let key = format!("{}/{}", provider_id, model_id);
        {
            let cache = self.cache.read().await;
            if let Some(spec) = cache.get(&key).cloned() {
                return Some(spec);
            }
        }
        let spec = self.inner.resolve(provider_id, model_id).await?;
        {
            let mut cache = self.cache.write().await;
            cache.insert(key, spec.clone());
        }
        Some(spec)
    }
}
