//! Execution scheduling.
//!
//! A timer-driven loop considers strategies in descending priority order and
//! dispatches each eligible one as an independent task. The loop never waits
//! on one strategy to consider the next; a failing or panicking execution is
//! recorded as a failed attempt at this boundary and aborts nothing else.

use crate::config::{SchedulerConfig, StrategyConfig};
use crate::strategy::handle::StrategyHandle;
use crate::strategy::performance::{ExecutionRecord, PerformanceTracker, SkipReason};
use chrono::Utc;
use futures_util::FutureExt;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Dispatches eligible strategies on a periodic tick.
pub struct ExecutionScheduler {
    config: SchedulerConfig,
    registry: Arc<RwLock<HashMap<String, StrategyConfig>>>,
    tracker: Arc<Mutex<PerformanceTracker>>,
    handles: HashMap<String, Arc<dyn StrategyHandle>>,
    in_flight: Arc<AtomicUsize>,
}

impl ExecutionScheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<RwLock<HashMap<String, StrategyConfig>>>,
        tracker: Arc<Mutex<PerformanceTracker>>,
        handles: HashMap<String, Arc<dyn StrategyHandle>>,
    ) -> Self {
        Self {
            config,
            registry,
            tracker,
            handles,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of executions currently in flight across all strategies.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the scheduling loop until the shutdown signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.tick_interval_secs,
            "Execution scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Execution scheduler stopped");
    }

    /// Consider every registered strategy once, in descending priority order
    /// (id as tiebreak), dispatching eligible ones as independent tasks.
    pub fn tick(&self) {
        let mut configs: Vec<StrategyConfig> = self
            .registry
            .read()
            .expect("strategy registry lock poisoned")
            .values()
            .cloned()
            .collect();
        configs.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        for cfg in configs {
            let Some(handle) = self.handles.get(&cfg.id).cloned() else {
                warn!(strategy = %cfg.id, "No handle registered for configured strategy");
                continue;
            };

            // Gate checks and slot reservation are atomic under the tracker
            // lock; the allocation snapshot taken here is what this
            // execution runs against, later rebalances notwithstanding.
            let allocation = {
                let mut tracker = self.tracker.lock().expect("performance tracker lock poisoned");
                match tracker.begin_execution(&cfg, Utc::now()) {
                    Ok(allocation) => allocation,
                    Err(reason) => {
                        if reason != SkipReason::Cooldown {
                            debug!(strategy = %cfg.id, ?reason, "Skipping strategy this tick");
                        }
                        continue;
                    }
                }
            };

            self.dispatch(handle, cfg.id.clone(), cfg.cooldown_ms, allocation);
        }
    }

    fn dispatch(
        &self,
        handle: Arc<dyn StrategyHandle>,
        name: String,
        cooldown_ms: u64,
        allocation: Decimal,
    ) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let tracker = Arc::clone(&self.tracker);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            {
                let mut tracker = tracker.lock().expect("performance tracker lock poisoned");
                tracker.mark_executing(&name);
            }
            debug!(strategy = %name, %allocation, "Dispatching execution");

            let started = std::time::Instant::now();
            let outcome = AssertUnwindSafe(handle.execute()).catch_unwind().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let record = match outcome {
                Ok(Ok(result)) => {
                    debug!(
                        strategy = %name,
                        success = result.success,
                        profit = %result.profit,
                        opportunity = result.opportunity_found,
                        "Execution completed"
                    );
                    ExecutionRecord {
                        success: result.success,
                        profit: result.profit,
                        execution_time_ms: result.execution_time_ms,
                        errored: false,
                    }
                }
                Ok(Err(e)) => {
                    warn!(strategy = %name, error = %e, "Execution failed");
                    ExecutionRecord {
                        success: false,
                        profit: Decimal::ZERO,
                        execution_time_ms: elapsed_ms,
                        errored: true,
                    }
                }
                Err(_) => {
                    error!(strategy = %name, "Execution panicked, recording failed attempt");
                    ExecutionRecord {
                        success: false,
                        profit: Decimal::ZERO,
                        execution_time_ms: elapsed_ms,
                        errored: true,
                    }
                }
            };

            tracker
                .lock()
                .expect("performance tracker lock poisoned")
                .finish_execution(&name, &record, cooldown_ms);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Wait, bounded by the configured grace period, for in-flight
    /// executions to report completion. Never force-aborts them.
    pub async fn drain(&self) -> bool {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.shutdown_grace_secs);
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight(),
                    "Shutdown grace period expired with executions still in flight"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}
