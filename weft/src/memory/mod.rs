//! Cross-session memory: a namespaced `Store`, a semantic `MemoryStore` of
//! user facts, and the `MemoryBundle` that composes both into per-turn
//! context. Durable backends (a SQLite-backed store, a vector store, an
//! embedding provider, checkpointing for time-travel) are out of scope
//! here — only the store *contract* and an in-memory reference
//! implementation matter.

mod bundle;
mod fact_store;
mod store;

pub use bundle::{ComposedContext, MemoryBundle, MemoryBundleConfig};
pub use fact_store::{MemoryStore, MemoryStoreConfig, RecordOutcome};
pub use store::{FilterOp, InMemoryStore, Item, Namespace, SearchItem, SearchOptions, Store, StoreError};
