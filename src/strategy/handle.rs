//! Strategy adapter seam.
//!
//! Every concrete strategy (arbitrage scanner, liquidity-range manager,
//! statistical correlation trader, ...) plugs into the orchestrator through
//! `StrategyHandle`. The orchestrator never sees strategy internals, only
//! lifecycle calls and execution outcomes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

/// Outcome of one execution attempt.
///
/// "No opportunity found" is a normal outcome (`opportunity_found: false`),
/// never an error. Errors are reserved for genuine failures: network loss,
/// reverted transactions, venue rejections.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Whether the attempt completed successfully
    pub success: bool,
    /// Realized profit (negative for a loss), in capital units
    pub profit: Decimal,
    /// Wall-clock duration of the attempt
    pub execution_time_ms: u64,
    /// Whether the scan surfaced an actionable opportunity
    pub opportunity_found: bool,
}

impl ExecutionResult {
    /// A completed attempt that found and took an opportunity.
    pub fn filled(profit: Decimal, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            profit,
            execution_time_ms,
            opportunity_found: true,
        }
    }

    /// A completed attempt that found nothing to do.
    pub fn no_opportunity(execution_time_ms: u64) -> Self {
        Self {
            success: true,
            profit: Decimal::ZERO,
            execution_time_ms,
            opportunity_found: false,
        }
    }
}

/// Point-in-time view of a strategy's own counters.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatsSnapshot {
    pub name: String,
    pub running: bool,
    pub total_scans: u64,
}

/// Lifecycle and execution contract for one trading strategy.
#[async_trait]
pub trait StrategyHandle: Send + Sync {
    /// Unique name; must match the id in the static `StrategyConfig` table.
    fn name(&self) -> &str;

    /// Bring the strategy up (subscriptions, warm caches).
    async fn start(&self) -> anyhow::Result<()>;

    /// Tear the strategy down. Must be safe to call when not started.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Scan for opportunities and execute against the capital allocated at
    /// dispatch time. Returns `Err` only for genuine failures.
    async fn execute(&self) -> anyhow::Result<ExecutionResult>;

    /// Strategy-side counters for monitoring.
    fn stats(&self) -> StrategyStatsSnapshot;
}
