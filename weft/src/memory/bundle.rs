//! Per-turn memory composition. Assembles the message list a `ChatRequest`
//! will carry: recent thread history, semantic recall from `Store`, relevant
//! `Fact`s, then compresses if the result is over budget. The
//! kept-recent-messages plus max-context-tokens knobs make this a plain
//! composition step any agent can call before building a `ChatRequest`.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::memory::fact_store::MemoryStore;
use crate::memory::store::{Namespace, SearchOptions, Store};
use crate::provider::Provider;
use crate::types::{ChatRequest, Fact, Message};

#[derive(Clone, Debug)]
pub struct MemoryBundleConfig {
    /// How many of the most recent thread messages are always included verbatim.
    pub keep_recent: usize,
    /// How many semantically-retrieved prior messages to splice in alongside
    /// the recent window.
    pub semantic_recall_k: usize,
    /// How many facts to retrieve per turn.
    pub fact_recall_k: usize,
    /// Rough token budget; beyond this the bundle is compacted (oldest
    /// non-recent messages summarized away) before being returned.
    pub max_context_tokens: u32,
}

impl Default for MemoryBundleConfig {
    fn default() -> Self {
        Self {
            keep_recent: 20,
            semantic_recall_k: 5,
            fact_recall_k: 5,
            max_context_tokens: 128_000,
        }
    }
}

/// The assembled context for one turn: the message list ready
/// to go into `ChatRequest.messages`, plus the facts that were recalled (for
/// processors/prompt templating to use separately from raw message content).
pub struct ComposedContext {
    pub messages: Vec<Message>,
    pub facts: Vec<Fact>,
}

/// Rough token estimate: ~4 characters per token, avoiding an actual
/// tokenizer dependency at this layer.
fn estimate_tokens(messages: &[Message]) -> u32 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (chars / 4) as u32
}

/// Composes per-turn memory context: embed the input, fetch
/// recent + semantically recalled messages, query facts, compress if over
/// budget, then hand the result to the caller's processor chain.
pub struct MemoryBundle {
    pub store: Arc<dyn Store>,
    pub facts: Arc<MemoryStore>,
    pub provider: Arc<dyn Provider>,
    pub config: MemoryBundleConfig,
}

impl MemoryBundle {
    pub fn new(
        store: Arc<dyn Store>,
        facts: Arc<MemoryStore>,
        provider: Arc<dyn Provider>,
        config: MemoryBundleConfig,
    ) -> Self {
        Self {
            store,
            facts,
            provider,
            config,
        }
    }

    fn thread_namespace(thread_id: &str) -> Namespace {
        vec!["thread".to_string(), thread_id.to_string(), "messages".to_string()]
    }

    fn user_namespace(user_id: &str) -> Namespace {
        vec!["user".to_string(), user_id.to_string(), "facts".to_string()]
    }

    /// Stores `message` into the thread's conversation store,
    /// keyed by message id so later semantic search can find it.
    pub async fn append(&self, thread_id: &str, message: &Message) -> Result<()> {
        let ns = Self::thread_namespace(thread_id);
        let value = serde_json::to_value(message).map_err(|e| AgentError::ProcessorRejected {
            stage: "memory_append",
            message: e.to_string(),
        })?;
        self.store
            .put(&ns, &message.id, &value)
            .await
            .map_err(|e| AgentError::ProcessorRejected {
                stage: "memory_append",
                message: e.to_string(),
            })
    }

    /// Composes the five-step per-turn context:
    /// 1. embed the input text
    /// 2. fetch recent thread messages
    /// 3. semantically recall additional prior messages
    /// 4. query relevant facts for `user_id`
    /// 5. compress if the combined result is over budget
    pub async fn compose(
        &self,
        thread_id: &str,
        user_id: &str,
        recent: Vec<Message>,
        input_text: &str,
    ) -> Result<ComposedContext> {
        let embeddings = self
            .provider
            .embed(&[input_text.to_string()])
            .await
            .map_err(AgentError::Provider)?;
        let query_embedding = embeddings.into_iter().next().unwrap_or_default();

        let recent_window: Vec<Message> = recent
            .iter()
            .rev()
            .take(self.config.keep_recent)
            .rev()
            .cloned()
            .collect();

        let recent_ids: std::collections::HashSet<&str> =
            recent_window.iter().map(|m| m.id.as_str()).collect();

        let ns = Self::thread_namespace(thread_id);
        let mut options = SearchOptions::new();
        options.query = Some(input_text.to_string());
        options.limit = self.config.semantic_recall_k;
        let recalled = self
            .store
            .search(&ns, options)
            .await
            .map_err(|e| AgentError::ProcessorRejected {
                stage: "memory_recall",
                message: e.to_string(),
            })?;

        let mut recalled_messages: Vec<Message> = recalled
            .into_iter()
            .filter_map(|hit| serde_json::from_value::<Message>(hit.item.value).ok())
            .filter(|m| !recent_ids.contains(m.id.as_str()))
            .collect();
        recalled_messages.sort_by_key(|m| m.created_at);

        let facts = self
            .facts
            .query(user_id, &query_embedding, self.config.fact_recall_k)
            .await;

        let mut combined = recalled_messages;
        combined.extend(recent_window);

        let messages = self.compress_if_needed(combined).await?;

        let _ = Self::user_namespace(user_id); // reserved for future fact-store-as-Store unification
        Ok(ComposedContext { messages, facts })
    }

    /// Compacts `messages` if they exceed `max_context_tokens`: the oldest
    /// messages beyond `keep_recent` are handed to the provider for
    /// summarization, and the summary replaces them as a single assistant
    /// message ahead of the kept recent window.
    async fn compress_if_needed(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        if estimate_tokens(&messages) <= self.config.max_context_tokens
            || messages.len() <= self.config.keep_recent
        {
            return Ok(messages);
        }
        let drop_count = messages.len() - self.config.keep_recent;
        let (dropped, kept) = messages.split_at(drop_count);

        let Some(thread_id) = kept.first().map(|m| m.thread_id.clone()) else {
            return Ok(kept.to_vec());
        };

        let prompt = build_summary_prompt(dropped);
        let request = ChatRequest {
            messages: vec![Message::user(&thread_id, prompt)],
            response_schema: None,
            params: Default::default(),
            tools: Vec::new(),
        };
        let cancel = tokio_util::sync::CancellationToken::new();
        let response = self.provider.chat(&request, &cancel).await.map_err(AgentError::Provider)?;

        let mut result = Vec::with_capacity(kept.len() + 1);
        result.push(Message::assistant(
            &thread_id,
            format!("[Summary of {drop_count} earlier messages]: {}", response.content),
        ));
        result.extend(kept.iter().cloned());
        Ok(result)
    }
}

/// Builds the user-turn prompt asking the provider to summarize a run of
/// dropped messages into a short recap.
fn build_summary_prompt(messages: &[Message]) -> String {
    let mut prompt = String::from(
        "Summarize the following conversation messages concisely, preserving any facts, \
         decisions, or commitments a later turn would need:\n\n",
    );
    for message in messages {
        prompt.push_str(&format!("{:?}: {}\n", message.role, message.content));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::memory::fact_store::MemoryStoreConfig;
    use crate::memory::store::InMemoryStore;
    use crate::types::ChatRequest;
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn chat(
            &self,
            _req: &ChatRequest,
            _cancel: &tokio_util::sync::CancellationToken,
        ) -> std::result::Result<crate::types::ChatResponse, ProviderError> {
            Ok(crate::types::ChatResponse {
                content: "summary of earlier messages".into(),
                ..Default::default()
            })
        }
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn bundle() -> MemoryBundle {
        MemoryBundle::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryStore::new(MemoryStoreConfig::default())),
            Arc::new(StubProvider),
            MemoryBundleConfig {
                keep_recent: 2,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn compose_returns_recent_messages_when_under_budget() {
        let b = bundle();
        let recent = vec![
            Message::user("t1", "hello"),
            Message::assistant("t1", "hi there"),
        ];
        let ctx = b.compose("t1", "u1", recent.clone(), "hello").await.unwrap();
        assert_eq!(ctx.messages.len(), 2);
        assert!(ctx.facts.is_empty());
    }

    #[tokio::test]
    async fn compress_if_needed_summarizes_when_over_token_budget() {
        let b = MemoryBundle::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryStore::new(MemoryStoreConfig::default())),
            Arc::new(StubProvider),
            MemoryBundleConfig {
                keep_recent: 2,
                max_context_tokens: 1,
                ..Default::default()
            },
        );
        let messages: Vec<Message> = (0..5).map(|i| Message::user("t1", format!("msg {i}"))).collect();
        let result = b.compress_if_needed(messages).await.unwrap();
        assert_eq!(result.len(), 3); // 1 summary message + keep_recent(2)
        assert!(result[0].content.contains("summary of earlier messages"));
    }

    #[tokio::test]
    async fn compress_if_needed_is_a_no_op_under_budget() {
        let b = bundle();
        let messages: Vec<Message> = (0..5).map(|i| Message::user("t1", format!("msg {i}"))).collect();
        let result = b.compress_if_needed(messages.clone()).await.unwrap();
        assert_eq!(result.len(), messages.len());
    }
}
