//! Cross-session namespaced key/value store plus the in-memory
//! implementation. Namespace/search/filter shapes follow a `Store` trait
//! inferred from its in-memory implementation's usage patterns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// A hierarchical namespace path, e.g. `["user", "alice", "facts"]`.
pub type Namespace = Vec<String>;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Item {
    pub fn with_timestamps(
        namespace: Namespace,
        key: String,
        value: Value,
        created_at: SystemTime,
        updated_at: SystemTime,
    ) -> Self {
        Self {
            namespace,
            key,
            value,
            created_at,
            updated_at,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchItem {
    pub item: Item,
    /// Similarity score when the search was vector-backed; `None` for a plain
    /// filter/substring match.
    pub score: Option<f32>,
}

impl SearchItem {
    pub fn from_item(item: Item) -> Self {
        Self { item, score: None }
    }
}

#[derive(Clone, Debug)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
}

#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub filter: Option<HashMap<String, FilterOp>>,
    pub offset: usize,
    pub limit: usize,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self {
            limit: usize::MAX,
            ..Default::default()
        }
    }
}

/// Cross-session namespaced store. One store instance backs
/// every thread and every user in a deployment; namespace segments are the
/// isolation boundary, not separate store instances.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, namespace: &Namespace, key: &str, value: &Value) -> Result<(), StoreError>;
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>, StoreError>;
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError>;
    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;
    async fn search(
        &self,
        namespace_prefix: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredItem {
    value: Value,
    namespace: Namespace,
    key: String,
    created_at: SystemTime,
    updated_at: SystemTime,
}

impl StoredItem {
    fn new(namespace: Namespace, key: String, value: Value) -> Self {
        let now = SystemTime::now();
        Self {
            value,
            namespace,
            key,
            created_at: now,
            updated_at: now,
        }
    }

    fn update(&mut self, value: Value) {
        self.value = value;
        self.updated_at = SystemTime::now();
    }

    fn to_item(&self) -> Item {
        Item::with_timestamps(
            self.namespace.clone(),
            self.key.clone(),
            self.value.clone(),
            self.created_at,
            self.updated_at,
        )
    }
}

fn map_key(namespace: &Namespace, key: &str) -> String {
    format!("{}\0{}", namespace.join("\0"), key)
}

fn namespace_prefix(namespace: &Namespace) -> String {
    if namespace.is_empty() {
        String::new()
    } else {
        format!("{}\0", namespace.join("\0"))
    }
}

/// Process-local `Store`, backed by a lock-guarded hash map.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, StoredItem>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, namespace: &Namespace, key: &str, value: &Value) -> Result<(), StoreError> {
        let k = map_key(namespace, key);
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get_mut(&k) {
            existing.update(value.clone());
        } else {
            guard.insert(k, StoredItem::new(namespace.clone(), key.to_string(), value.clone()));
        }
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>, StoreError> {
        let k = map_key(namespace, key);
        Ok(self.inner.read().await.get(&k).map(|s| s.value.clone()))
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError> {
        let k = map_key(namespace, key);
        self.inner.write().await.remove(&k);
        Ok(())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let prefix = namespace_prefix(namespace);
        let guard = self.inner.read().await;
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, item)| item.key.clone())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn search(
        &self,
        namespace_prefix_path: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError> {
        let prefix = namespace_prefix(namespace_prefix_path);
        let guard = self.inner.read().await;
        let mut hits: Vec<SearchItem> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, stored)| SearchItem::from_item(stored.to_item()))
            .collect();

        if let Some(q) = options.query.as_ref().filter(|q| !q.is_empty()) {
            let q_lower = q.to_lowercase();
            hits.retain(|h| {
                h.item.key.contains(q.as_str())
                    || h.item.value.to_string().to_lowercase().contains(&q_lower)
            });
        }

        if options.offset > 0 {
            if options.offset >= hits.len() {
                hits.clear();
            } else {
                hits = hits.into_iter().skip(options.offset).collect();
            }
        }
        hits.truncate(options.limit);
        Ok(hits)
    }
}
