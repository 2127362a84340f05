//! The resolver seam every model-limit source implements. Not present as a
//! standalone file in the retrieval pack (only its call sites in `cached`,
//! `local_file` and `models_dev` were) — authored fresh from those call
//! sites and from `mod.rs`'s usage example.

use async_trait::async_trait;

use crate::spec::ModelSpec;

/// Resolves a `(provider_id, model_id)` pair to its token limits.
/// Implementations may hit the network, read a local file, or wrap another
/// resolver with a cache; `None` means "no limits known", not an error.
#[async_trait]
pub trait ModelLimitResolver: Send + Sync {
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec>;
}
