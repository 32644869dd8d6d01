//! Error taxonomy for the orchestration core.
//!
//! Only `Configuration` escapes the constructor. Transient strategy failures
//! stay `anyhow::Error` at the scheduler boundary and are converted into
//! recorded execution outcomes, never propagated.

use thiserror::Error;

/// Errors surfaced by the orchestrator and its components.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid static configuration detected at construction. Fatal.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A control-plane call referenced a strategy that is not registered.
    #[error("strategy not found: {0}")]
    UnknownStrategy(String),

    /// Performance or market data older than the freshness threshold.
    /// Non-fatal: the allocator falls back to the previous allocation.
    #[error("stale data: {0}")]
    StaleData(String),

    /// An allocation would have exceeded total capital after clamping.
    /// Capped internally and logged; must never be externally observable.
    #[error("capital invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
