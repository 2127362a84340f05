//! Semantic fact store. Concrete vector-backed implementations are out of
//! scope here; this is built from the same `Store`-namespacing idiom,
//! specialized to facts plus a similarity-based write path.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::Fact;

/// Cosine similarity of two equal-length embeddings; `0.0` if either is zero
/// or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Cosine similarity above which a new fact is merged into an existing
    /// one rather than inserted separately. Default `0.85`.
    pub similarity_threshold: f32,
    /// Confidence increment applied to the merged-into fact on a repeat
    /// observation, capped at `1.0`.
    /// Default `0.1`.
    pub confidence_step: f32,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            confidence_step: 0.1,
        }
    }
}

/// What happened when recording an observed fact: a brand new fact was
/// stored, or an existing fact's confidence was reinforced.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted(Fact),
    Reinforced(Fact),
}

/// Per-user semantic memory of durable facts. Keyed by a
/// caller-supplied user id so one process can hold many users' fact sets.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    facts: Arc<RwLock<std::collections::HashMap<String, Vec<Fact>>>>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            facts: Arc::new(RwLock::new(std::collections::HashMap::new())),
        }
    }

    /// Records an observed fact for `user_id`. If an existing fact's
    /// embedding is within the similarity threshold, that fact's confidence
    /// is stepped up instead of inserting a duplicate.
    pub async fn record(
        &self,
        user_id: &str,
        text: impl Into<String>,
        category: impl Into<String>,
        embedding: Vec<f32>,
    ) -> RecordOutcome {
        let text = text.into();
        let mut guard = self.facts.write().await;
        let bucket = guard.entry(user_id.to_string()).or_default();

        if let Some(existing) = bucket
            .iter_mut()
            .find(|f| cosine_similarity(&f.embedding, &embedding) >= self.config.similarity_threshold)
        {
            existing.text = text;
            existing.confidence = (existing.confidence + self.config.confidence_step).min(1.0);
            existing.updated_at = unix_now();
            return RecordOutcome::Reinforced(existing.clone());
        }

        let fact = Fact::new(text, category, embedding);
        bucket.push(fact.clone());
        RecordOutcome::Inserted(fact)
    }

    /// Top-k facts for `user_id` by similarity to `query_embedding`.
    pub async fn query(&self, user_id: &str, query_embedding: &[f32], top_k: usize) -> Vec<Fact> {
        let guard = self.facts.read().await;
        let Some(bucket) = guard.get(user_id) else {
            return Vec::new();
        };
        let mut scored: Vec<(f32, Fact)> = bucket
            .iter()
            .map(|f| (cosine_similarity(&f.embedding, query_embedding), f.clone()))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, f)| f).collect()
    }

    pub async fn forget(&self, user_id: &str, fact_id: &str) {
        let mut guard = self.facts.write().await;
        if let Some(bucket) = guard.get_mut(user_id) {
            bucket.retain(|f| f.id != fact_id);
        }
    }

    /// Ages every fact for every user: confidence decays 5% once idle more
    /// than 7 days, and facts below confidence 0.3 that have been idle more
    /// than 30 days are purged outright.
    pub async fn decay_old_facts(&self) {
        const IDLE_DECAY_SECS: i64 = 7 * 86_400;
        const IDLE_PURGE_SECS: i64 = 30 * 86_400;
        let now = unix_now();
        let mut guard = self.facts.write().await;
        for bucket in guard.values_mut() {
            for fact in bucket.iter_mut() {
                if now - fact.updated_at > IDLE_DECAY_SECS {
                    fact.confidence = (fact.confidence * 0.95).max(0.0);
                }
            }
            bucket.retain(|f| !(f.confidence < 0.3 && now - f.updated_at > IDLE_PURGE_SECS));
        }
    }

    /// Renders the top-10 facts for `user_id` by similarity to
    /// `query_embedding` as a markdown bullet list ready to splice into a
    /// system prompt. Empty string if the user has no matching facts.
    pub async fn build_context(&self, user_id: &str, query_embedding: &[f32]) -> String {
        let facts = self.query(user_id, query_embedding, 10).await;
        if facts.is_empty() {
            return String::new();
        }
        let mut out = String::from("## What we know about this user\n");
        for fact in &facts {
            out.push_str(&format!("- {} ({})\n", fact.text, fact.category));
        }
        out
    }

    /// Deletes every fact for `user_id` whose text contains `substring`, for
    /// superseding a stale statement with a fresh `record` call.
    pub async fn delete_matching_facts(&self, user_id: &str, substring: &str) {
        let mut guard = self.facts.write().await;
        if let Some(bucket) = guard.get_mut(user_id) {
            bucket.retain(|f| !f.text.contains(substring));
        }
    }
}

fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_a_near_duplicate_reinforces_confidence_instead_of_inserting() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        let first = store.record("u1", "likes dark mode", "preference", vec![1.0, 0.0]).await;
        assert!(matches!(first, RecordOutcome::Inserted(_)));

        let second = store
            .record("u1", "prefers dark mode", "preference", vec![0.99, 0.01])
            .await;
        match second {
            RecordOutcome::Reinforced(f) => assert!((f.confidence - 1.1_f32.min(1.0)).abs() < 1e-6),
            RecordOutcome::Inserted(_) => panic!("expected reinforcement, got new insert"),
        }

        let facts = store.query("u1", &[1.0, 0.0], 10).await;
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn dissimilar_facts_are_kept_separate() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.record("u1", "likes rust", "preference", vec![1.0, 0.0]).await;
        store.record("u1", "lives in tokyo", "location", vec![0.0, 1.0]).await;
        let facts = store.query("u1", &[1.0, 0.0], 10).await;
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].category, "preference");
    }

    #[tokio::test]
    async fn decay_old_facts_is_a_no_op_on_fresh_facts() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.record("u1", "likes rust", "preference", vec![1.0, 0.0]).await;
        store.decay_old_facts().await;
        let facts = store.query("u1", &[1.0, 0.0], 10).await;
        assert_eq!(facts.len(), 1);
        assert!((facts[0].confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn decay_old_facts_purges_low_confidence_stale_entries() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.record("u1", "likes rust", "preference", vec![1.0, 0.0]).await;
        {
            let mut guard = store.facts.write().await;
            let fact = &mut guard.get_mut("u1").unwrap()[0];
            fact.confidence = 0.1;
            fact.updated_at = unix_now() - 31 * 86_400;
        }
        store.decay_old_facts().await;
        let facts = store.query("u1", &[1.0, 0.0], 10).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn build_context_renders_markdown_bullets() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.record("u1", "likes rust", "preference", vec![1.0, 0.0]).await;
        let ctx = store.build_context("u1", &[1.0, 0.0]).await;
        assert!(ctx.contains("## What we know about this user"));
        assert!(ctx.contains("likes rust (preference)"));
    }

    #[tokio::test]
    async fn build_context_is_empty_for_unknown_user() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        let ctx = store.build_context("ghost", &[1.0, 0.0]).await;
        assert_eq!(ctx, "");
    }

    #[tokio::test]
    async fn delete_matching_facts_removes_by_substring() {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store.record("u1", "lives in tokyo", "location", vec![0.0, 1.0]).await;
        store.record("u1", "likes rust", "preference", vec![1.0, 0.0]).await;
        store.delete_matching_facts("u1", "tokyo").await;
        let facts = store.query("u1", &[1.0, 0.0], 10).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, "preference");
    }
}
