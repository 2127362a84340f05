//! Provider contract and retry middleware.
//!
//! One `invoke` call plus a streaming variant backed by a channel sink,
//! default-implemented in terms of the non-streaming call. The retry
//! wrapper's backoff/jitter policy mirrors `retry.rs` from the
//! `slb350-open-agent-sdk-rust` pack repo.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::events::{EventSink, StreamEvent};
use crate::types::{ChatRequest, ChatResponse};

/// A streamed chat delta: text or a partial tool-call argument byte run.
#[derive(Clone, Debug)]
pub enum ChatDelta {
    Text(String),
    Thinking(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgs { id: String, delta: String },
    ToolCallEnd { id: String },
}

pub type ChatDeltaSink = mpsc::Sender<ChatDelta>;

/// Abstract chat/embedding backend. Every operation accepts a
/// `CancellationToken` that is threaded explicitly through every
/// suspension point, rather than relying on dropped futures alone.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in error messages and provider-metadata echoing.
    fn name(&self) -> &str;

    /// Non-streaming call; may include tool definitions in `req`.
    async fn chat(
        &self,
        req: &ChatRequest,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<ChatResponse, ProviderError>;

    /// Streaming call: emits deltas into `sink` as they arrive, closes it
    /// exactly once on completion or error, and returns the fully
    /// accumulated response.
    ///
    /// Default implementation calls `chat` and replays its content as one
    /// `ChatDelta::Text`, for providers with no native streaming transport.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
        sink: ChatDeltaSink,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        let resp = self.chat(req, cancel).await?;
        if !resp.content.is_empty() {
            let _ = sink.send(ChatDelta::Text(resp.content.clone())).await;
        }
        Ok(resp)
    }

    /// Order-preserving batch embedding; fails if any text is rejected.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Exponential backoff with jitter.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let jitter = capped * self.jitter_factor * rand_unit();
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// `rand`-free jitter source: a cheap xorshift seeded from the current time,
/// sufficient for backoff jitter (not used anywhere security-sensitive).
fn rand_unit() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let mut x = nanos.wrapping_mul(2685821657736338717).wrapping_add(1);
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    ((x.wrapping_mul(2685821657736338717)) >> 11) as f64 / (1u64 << 53) as f64
}

/// Wraps any `Provider` with retry. Streaming is a strict
/// pass-through: once the underlying stream has emitted any delta, the
/// wrapper must not retry (would double-emit), so `chat_stream` only retries
/// before the first byte leaves the inner provider.
pub struct RetryingProvider<P: Provider> {
    inner: P,
    config: RetryConfig,
}

impl<P: Provider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn run_with_retry<'a, F, Fut, T>(&'a self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + 'a,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    let delay = e.retry_after().unwrap_or_else(|| self.config.delay_for(attempt));
                    tokio::time::sleep(delay.min(self.config.max_delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: Provider> Provider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(
        &self,
        req: &ChatRequest,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        self.run_with_retry(|| self.inner.chat(req, cancel)).await
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
        sink: ChatDeltaSink,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<ChatResponse, ProviderError> {
        // Pass-through: only the attempt loop before any delta is emitted
        // retries; once `sink` has been handed to the inner provider and it
        // starts sending, a failure propagates as-is.
        self.run_with_retry(|| self.inner.chat_stream(req, sink.clone(), cancel))
            .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.run_with_retry(|| self.inner.embed(texts)).await
    }
}

/// Forwards provider-level `ChatDelta`s onto an agent's `StreamEvent` sink as
/// `TextDelta`/`ThinkingDelta`/tool-call-progress events. Pure glue between
/// the provider's delta vocabulary and the event stream's.
pub async fn forward_deltas_as_events(
    mut deltas: mpsc::Receiver<ChatDelta>,
    sink: EventSink,
    agent: String,
    cancel: tokio_util::sync::CancellationToken,
) {
    while let Some(delta) = deltas.recv().await {
        let event = match delta {
            ChatDelta::Text(text) => StreamEvent::TextDelta {
                agent: agent.clone(),
                sub_agent: None,
                text,
            },
            ChatDelta::Thinking(text) => StreamEvent::ThinkingDelta {
                agent: agent.clone(),
                sub_agent: None,
                text,
            },
            ChatDelta::ToolCallStart { id, name } => StreamEvent::ToolCallStart {
                agent: agent.clone(),
                sub_agent: None,
                call: crate::types::ToolCall {
                    id,
                    name,
                    arguments: serde_json::Value::Null,
                    provider_metadata: None,
                },
            },
            ChatDelta::ToolCallArgs { id, delta } => StreamEvent::ToolCallDelta {
                agent: agent.clone(),
                sub_agent: None,
                id,
                arguments_delta: delta,
            },
            ChatDelta::ToolCallEnd { id } => StreamEvent::ToolCallEnd {
                agent: agent.clone(),
                sub_agent: None,
                id,
            },
        };
        if !crate::events::send_checked(&sink, &cancel, event).await {
            break;
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        fail_times: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn chat(
            &self,
            _req: &ChatRequest,
            _cancel: &tokio_util::sync::CancellationToken,
        ) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ProviderError::Transport {
                    message: "temporary".into(),
                    status: Some(503),
                    retry_after: None,
                })
            } else {
                Ok(ChatResponse {
                    content: "ok".into(),
                    ..Default::default()
                })
            }
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest {
            messages: vec![],
            response_schema: None,
            params: Default::default(),
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn retries_transient_transport_errors_until_success() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                fail_times: AtomicU32::new(2),
                calls: Arc::new(AtomicU32::new(0)),
            },
            RetryConfig {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..Default::default()
            },
        );
        let cancel = tokio_util::sync::CancellationToken::new();
        let resp = provider.chat(&dummy_request(), &cancel).await.unwrap();
        assert_eq!(resp.content, "ok");
    }

    #[tokio::test]
    async fn semantic_error_propagates_without_retry() {
        struct AlwaysSemantic;
        #[async_trait]
        impl Provider for AlwaysSemantic {
            fn name(&self) -> &str {
                "bad"
            }
            async fn chat(
                &self,
                _req: &ChatRequest,
                _cancel: &tokio_util::sync::CancellationToken,
            ) -> Result<ChatResponse, ProviderError> {
                Err(ProviderError::Semantic {
                    provider: "bad".into(),
                    message: "malformed".into(),
                })
            }
            async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
                unreachable!()
            }
        }
        let provider = RetryingProvider::new(AlwaysSemantic, RetryConfig::default());
        let cancel = tokio_util::sync::CancellationToken::new();
        let err = provider.chat(&dummy_request(), &cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Semantic { .. }));
    }
}
