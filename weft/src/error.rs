//! Error taxonomy for the weft runtime.
//!
//! One enum per subsystem (store, compilation, tool source, provider,
//! agent). Tool failures are deliberately *not* an error type here: they are
//! carried as data in `ToolResult.error`, so the loop never has to unwind
//! for a misbehaving tool.

use thiserror::Error;

/// Errors from a `Provider` call. `Transport` is retried by the retry
/// middleware; `Semantic` is not.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("provider transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
        retry_after: Option<std::time::Duration>,
    },

    #[error("provider semantic error ({provider}): {message}")]
    Semantic { provider: String, message: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { status, .. } => match status {
                Some(429) => true,
                Some(s) if (500..600).contains(s) => true,
                None => true, // network/DNS class, no status yet
                _ => false,
            },
            ProviderError::Semantic { .. } => false,
        }
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ProviderError::Transport { retry_after, .. } => *retry_after,
            ProviderError::Semantic { .. } => None,
        }
    }
}

/// Workflow configuration errors: a missing required
/// option on a step is a typed, synchronous failure at run construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step {0:?} declares no predecessors and is not reachable from the entry set")]
    Unreachable(String),

    #[error("ForEach step {0:?} is missing IterOver(key)")]
    MissingIterOver(String),

    #[error("DoUntil step {0:?} is missing Until(predicate)")]
    MissingUntilPredicate(String),

    #[error("DoWhile step {0:?} is missing While(predicate)")]
    MissingWhilePredicate(String),

    #[error("step {0:?} is not registered in the context map and has no AgentStep/ToolStep source")]
    UnresolvedInput(String),

    #[error("cyclic dependency detected involving step {0:?}")]
    Cycle(String),

    #[error("duplicate step name {0:?}")]
    DuplicateStep(String),

    #[error("DoUntil/DoWhile step {0:?} is missing MaxIter(n)")]
    MissingMaxIter(String),

    #[error("step {0:?} exceeded its MaxIter cap of {1} iterations without satisfying its predicate")]
    MaxIterExceeded(String, usize),
}

/// Faults raised by the agent loop itself — protocol violations, not tool
/// failures. A subagent panic is caught and converted into one of these.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("subagent {name:?} panicked: {message}")]
    SubagentPanic { name: String, message: String },

    #[error("processor {stage} rejected the turn: {message}")]
    ProcessorRejected { stage: &'static str, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("suspend-snapshot cap exceeded ({count}/{max})")]
    SuspendCapExceeded { count: usize, max: usize },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_5xx_is_retryable() {
        let e = ProviderError::Transport {
            message: "boom".into(),
            status: Some(503),
            retry_after: None,
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn transport_4xx_other_than_429_is_not_retryable() {
        let e = ProviderError::Transport {
            message: "bad request".into(),
            status: Some(400),
            retry_after: None,
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn semantic_errors_are_never_retryable() {
        let e = ProviderError::Semantic {
            provider: "stub".into(),
            message: "malformed json".into(),
        };
        assert!(!e.is_retryable());
    }
}
