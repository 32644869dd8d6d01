//! Scripted mock strategies for paper trading and tests.

use crate::strategy::handle::{ExecutionResult, StrategyHandle, StrategyStatsSnapshot};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted execution attempt should produce.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Successful fill with the given profit
    Profit(Decimal),
    /// Completed scan, nothing actionable
    NoOpportunity,
    /// Failed attempt (network loss, revert, ...)
    Fail(String),
    /// Panicking strategy, for boundary-isolation tests
    Panic,
}

/// A strategy handle that replays a scripted sequence of outcomes.
///
/// The script loops once exhausted; an empty script yields `NoOpportunity`
/// forever. An optional per-execution delay simulates slow venues.
pub struct MockStrategy {
    name: String,
    script: Mutex<Vec<MockOutcome>>,
    cursor: AtomicU64,
    running: AtomicBool,
    executions: AtomicU64,
    delay: Option<Duration>,
    fail_start: bool,
}

impl MockStrategy {
    pub fn new(name: impl Into<String>, script: Vec<MockOutcome>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script),
            cursor: AtomicU64::new(0),
            running: AtomicBool::new(false),
            executions: AtomicU64::new(0),
            delay: None,
            fail_start: false,
        }
    }

    /// Simulate execution latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `start()` fail, for startup-resilience tests.
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Number of execute() calls observed so far.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        let script = self.script.lock().expect("mock script lock poisoned");
        if script.is_empty() {
            return MockOutcome::NoOpportunity;
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) as usize % script.len();
        script[idx].clone()
    }
}

#[async_trait]
impl StrategyHandle for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.fail_start {
            anyhow::bail!("scripted start failure");
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self) -> anyhow::Result<ExecutionResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let elapsed_ms = self.delay.map(|d| d.as_millis() as u64).unwrap_or(5);

        match self.next_outcome() {
            MockOutcome::Profit(profit) => Ok(ExecutionResult::filled(profit, elapsed_ms)),
            MockOutcome::NoOpportunity => Ok(ExecutionResult::no_opportunity(elapsed_ms)),
            MockOutcome::Fail(reason) => Err(anyhow::anyhow!(reason)),
            MockOutcome::Panic => panic!("scripted strategy panic"),
        }
    }

    fn stats(&self) -> StrategyStatsSnapshot {
        StrategyStatsSnapshot {
            name: self.name.clone(),
            running: self.running.load(Ordering::SeqCst),
            total_scans: self.executions.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_script_replays_in_order_and_loops() {
        let strategy = MockStrategy::new(
            "dex-arb",
            vec![MockOutcome::Profit(dec!(12)), MockOutcome::NoOpportunity],
        );

        let first = strategy.execute().await.unwrap();
        assert!(first.opportunity_found);
        assert_eq!(first.profit, dec!(12));

        let second = strategy.execute().await.unwrap();
        assert!(!second.opportunity_found);

        // Loops back to the start
        let third = strategy.execute().await.unwrap();
        assert_eq!(third.profit, dec!(12));
        assert_eq!(strategy.execution_count(), 3);
    }

    #[tokio::test]
    async fn test_lifecycle_flags() {
        let strategy = MockStrategy::new("liquidity-range", vec![]);
        assert!(!strategy.stats().running);

        strategy.start().await.unwrap();
        assert!(strategy.stats().running);

        strategy.stop().await.unwrap();
        assert!(!strategy.stats().running);
    }

    #[tokio::test]
    async fn test_failure_is_an_err() {
        let strategy = MockStrategy::new(
            "stat-corr",
            vec![MockOutcome::Fail("no liquidity".to_string())],
        );
        assert!(strategy.execute().await.is_err());
    }
}
