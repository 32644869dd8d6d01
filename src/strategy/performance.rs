//! Per-strategy performance tracking and scoring.
//!
//! Converts raw execution outcomes into the normalized performance (0-100)
//! and risk (0-1) scores the allocator weighs. Pure in-memory mutation; each
//! strategy's record is touched only by its own completion path and by the
//! rebalance tick.

use crate::config::StrategyConfig;
use crate::utils::decimal::{clamp_range, mean_abs_deviation, safe_div};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Neutral score assigned before a strategy has a meaningful sample.
pub const NEUTRAL_SCORE: Decimal = dec!(50);

/// Bounded window of recent per-trade profits used for consistency scoring.
const RECENT_WINDOW: usize = 20;

/// Losing streaks beyond this stop raising the risk score further.
const MAX_STREAK_PENALTY_STEPS: u32 = 5;

/// Scheduler-visible lifecycle of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Idle,
    Scheduled,
    Executing,
    Cooldown,
}

/// Normalized outcome of one execution attempt as the tracker records it.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub success: bool,
    pub profit: Decimal,
    pub execution_time_ms: u64,
    /// The attempt errored or timed out rather than completing
    pub errored: bool,
}

/// Why the scheduler skipped a strategy this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Cooldown,
    ConcurrencyLimit,
    NoCapital,
}

/// Live performance record for one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyPerformance {
    pub name: String,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub errored_attempts: u64,
    pub total_profit: Decimal,
    /// successful_trades / total_trades
    pub win_rate: Decimal,
    /// Normalized 0-100; starts neutral at 50
    pub performance_score: Decimal,
    /// Normalized 0-1; refreshed at every rebalance tick
    pub risk_score: Decimal,
    pub capital_allocated: Decimal,
    pub active_trades: u32,
    pub last_execution: Option<DateTime<Utc>>,
    pub state: ExecutionState,
    /// End of the current cooldown window, set while `state` is `Cooldown`
    pub cooldown_until: Option<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub total_execution_ms: u64,
    #[serde(skip)]
    recent_profits: VecDeque<Decimal>,
}

impl StrategyPerformance {
    fn new(name: &str, base_risk: Decimal) -> Self {
        Self {
            name: name.to_string(),
            total_trades: 0,
            successful_trades: 0,
            errored_attempts: 0,
            total_profit: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            performance_score: NEUTRAL_SCORE,
            risk_score: base_risk,
            capital_allocated: Decimal::ZERO,
            active_trades: 0,
            last_execution: None,
            state: ExecutionState::Idle,
            cooldown_until: None,
            consecutive_losses: 0,
            total_execution_ms: 0,
            recent_profits: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }

    /// The lifecycle state as of `now`. `Cooldown` lapses back to `Idle`
    /// once the window ends; stored state is only updated on the next
    /// dispatch, so reads resolve the lapse themselves.
    pub fn state_at(&self, now: DateTime<Utc>) -> ExecutionState {
        match (self.state, self.cooldown_until) {
            (ExecutionState::Cooldown, Some(until)) if now >= until => ExecutionState::Idle,
            (state, _) => state,
        }
    }

    /// Average wall-clock time per attempt in milliseconds.
    pub fn avg_execution_ms(&self) -> Decimal {
        safe_div(
            Decimal::from(self.total_execution_ms),
            Decimal::from(self.total_trades),
        )
    }
}

/// Tracks performance records for all registered strategies.
pub struct PerformanceTracker {
    records: HashMap<String, StrategyPerformance>,
    min_sample_size: u64,
    // When the last execution outcome landed. Score refreshes do not count:
    // freshness measures new information, not recomputation of old data.
    last_outcome_at: Option<DateTime<Utc>>,
}

impl PerformanceTracker {
    /// Seed one neutral record per configured strategy.
    pub fn new(configs: &[StrategyConfig], min_sample_size: u64) -> Self {
        let records = configs
            .iter()
            .map(|cfg| {
                (
                    cfg.id.clone(),
                    StrategyPerformance::new(&cfg.id, cfg.risk_tolerance.base_risk()),
                )
            })
            .collect();

        Self {
            records,
            min_sample_size,
            last_outcome_at: None,
        }
    }

    /// Atomically check dispatch gates and reserve an execution slot.
    ///
    /// On success the record moves to `Executing`, `active_trades` is
    /// incremented and `last_execution` stamped at dispatch time, so the
    /// cooldown window opens when the attempt starts, not when it finishes.
    /// Returns the allocation snapshot the execution runs against.
    pub fn begin_execution(
        &mut self,
        cfg: &StrategyConfig,
        now: DateTime<Utc>,
    ) -> Result<Decimal, SkipReason> {
        let record = match self.records.get_mut(&cfg.id) {
            Some(r) => r,
            None => return Err(SkipReason::Disabled),
        };
        record.state = record.state_at(now);
        if record.state == ExecutionState::Idle {
            record.cooldown_until = None;
        }

        if !cfg.enabled {
            return Err(SkipReason::Disabled);
        }
        if let Some(last) = record.last_execution {
            let elapsed_ms = (now - last).num_milliseconds();
            if elapsed_ms >= 0 && (elapsed_ms as u64) < cfg.cooldown_ms {
                return Err(SkipReason::Cooldown);
            }
        }
        if record.active_trades >= cfg.max_concurrent_trades {
            return Err(SkipReason::ConcurrencyLimit);
        }
        if record.capital_allocated == Decimal::ZERO {
            return Err(SkipReason::NoCapital);
        }

        record.active_trades += 1;
        record.last_execution = Some(now);
        record.state = ExecutionState::Scheduled;
        Ok(record.capital_allocated)
    }

    /// Transition a reserved slot to `Executing` when its task starts.
    pub fn mark_executing(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            if record.active_trades > 0 {
                record.state = ExecutionState::Executing;
            }
        }
    }

    /// Record the outcome of a dispatched attempt and release its slot.
    pub fn finish_execution(&mut self, name: &str, outcome: &ExecutionRecord, cooldown_ms: u64) {
        let min_sample = self.min_sample_size;
        let Some(record) = self.records.get_mut(name) else {
            return;
        };

        record.total_trades += 1;
        record.total_execution_ms += outcome.execution_time_ms;
        if outcome.errored {
            record.errored_attempts += 1;
        }
        if outcome.success {
            record.successful_trades += 1;
        }
        record.total_profit += outcome.profit;
        record.win_rate = safe_div(
            Decimal::from(record.successful_trades),
            Decimal::from(record.total_trades),
        );

        if outcome.profit < Decimal::ZERO || outcome.errored {
            record.consecutive_losses += 1;
        } else if outcome.profit > Decimal::ZERO {
            record.consecutive_losses = 0;
        }

        if record.recent_profits.len() == RECENT_WINDOW {
            record.recent_profits.pop_front();
        }
        record.recent_profits.push_back(outcome.profit);

        record.active_trades = record.active_trades.saturating_sub(1);
        record.cooldown_until = None;
        record.state = if record.active_trades > 0 {
            ExecutionState::Executing
        } else if cooldown_ms > 0 {
            // Same window the dispatch gate enforces: it opened at dispatch,
            // not at completion.
            record.cooldown_until = record
                .last_execution
                .map(|at| at + chrono::Duration::milliseconds(cooldown_ms as i64));
            ExecutionState::Cooldown
        } else {
            ExecutionState::Idle
        };

        record.performance_score = compute_performance_score(record, min_sample);
        self.last_outcome_at = Some(Utc::now());

        debug!(
            strategy = %name,
            total_trades = self.records[name].total_trades,
            win_rate = %self.records[name].win_rate,
            score = %self.records[name].performance_score,
            "Execution recorded"
        );
    }

    /// Refresh risk scores against current configs. Called at every
    /// rebalance tick so risk reflects the latest streaks and dispersion.
    pub fn refresh_risk_scores(&mut self, configs: &HashMap<String, StrategyConfig>) {
        for (name, record) in self.records.iter_mut() {
            if let Some(cfg) = configs.get(name) {
                record.risk_score = compute_risk_score(cfg, record);
            }
        }
    }

    /// Publish the allocation for one strategy.
    pub fn set_allocation(&mut self, name: &str, amount: Decimal) {
        if let Some(record) = self.records.get_mut(name) {
            record.capital_allocated = amount;
        }
    }

    /// Seconds since the last execution outcome was recorded. `None` until
    /// the first outcome: a tracker with no history yet is not stale, it is
    /// merely neutral.
    pub fn outcome_age_secs(&self) -> Option<i64> {
        self.last_outcome_at
            .map(|at| (Utc::now() - at).num_seconds())
    }

    #[cfg(test)]
    pub fn backdate_last_outcome(&mut self, at: DateTime<Utc>) {
        self.last_outcome_at = Some(at);
    }

    pub fn get(&self, name: &str) -> Option<&StrategyPerformance> {
        self.records.get(name)
    }

    /// Immutable-at-read-time copies of every record, with lapsed cooldowns
    /// resolved to `Idle`.
    pub fn snapshot(&self) -> Vec<StrategyPerformance> {
        let now = Utc::now();
        let mut records: Vec<_> = self.records.values().cloned().collect();
        for record in &mut records {
            record.state = record.state_at(now);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }
}

/// Weighted blend of win rate, normalized profit contribution and execution
/// reliability, clamped to [0, 100]. Small samples stay anchored near the
/// neutral 50 and approach the computed value with a damped linear weight.
pub fn compute_performance_score(perf: &StrategyPerformance, min_sample_size: u64) -> Decimal {
    if perf.total_trades == 0 {
        return NEUTRAL_SCORE;
    }

    let completed = perf.total_trades - perf.errored_attempts;
    let reliability = safe_div(Decimal::from(completed), Decimal::from(perf.total_trades));
    let avg_profit = safe_div(perf.total_profit, Decimal::from(perf.total_trades));

    // Squash average per-trade profit into the 0-100 band around neutral.
    // Coefficients are tuning knobs; only relative ordering is contractual.
    let profit_component = clamp_range(
        NEUTRAL_SCORE + avg_profit * dec!(5),
        Decimal::ZERO,
        dec!(100),
    );

    let raw = perf.win_rate * dec!(100) * dec!(0.4)
        + profit_component * dec!(0.4)
        + reliability * dec!(100) * dec!(0.2);
    let raw = clamp_range(raw, Decimal::ZERO, dec!(100));

    if perf.total_trades < min_sample_size {
        let sample_weight = safe_div(
            Decimal::from(perf.total_trades),
            Decimal::from(min_sample_size),
        );
        NEUTRAL_SCORE + (raw - NEUTRAL_SCORE) * sample_weight * dec!(0.5)
    } else {
        raw
    }
}

/// Base risk from the configured tolerance, raised by losing streaks and
/// lowered by return consistency, clamped to [0, 1] and hard-capped by the
/// tolerance tier's ceiling.
pub fn compute_risk_score(cfg: &StrategyConfig, perf: &StrategyPerformance) -> Decimal {
    let base = cfg.risk_tolerance.base_risk();

    let streak_steps = perf.consecutive_losses.min(MAX_STREAK_PENALTY_STEPS);
    let streak_penalty = Decimal::from(streak_steps) * dec!(0.05);

    let profits: Vec<Decimal> = perf.recent_profits.iter().copied().collect();
    let consistency_credit = if profits.len() >= 3 {
        let mad = mean_abs_deviation(&profits);
        let magnitude = safe_div(
            profits.iter().map(|p| p.abs()).sum::<Decimal>(),
            Decimal::from(profits.len()),
        )
        .max(Decimal::ONE);
        let dispersion = clamp_range(mad / magnitude, Decimal::ZERO, Decimal::ONE);
        (Decimal::ONE - dispersion) * dec!(0.1)
    } else {
        Decimal::ZERO
    };

    let score = clamp_range(
        base + streak_penalty - consistency_credit,
        Decimal::ZERO,
        Decimal::ONE,
    );
    score.min(cfg.risk_tolerance.risk_ceiling())
}
