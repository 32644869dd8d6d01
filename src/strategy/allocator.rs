//! Capital allocation across competing strategies.
//!
//! Runs on its own rebalance tick. Weights configured priority against
//! measured performance and risk, hard-filters by market suitability, then
//! clamps per-strategy caps with a bounded redistribution fixed point so the
//! pool invariant `sum(allocated) <= total_capital` holds on every tick.

use crate::config::{CapitalConfig, StrategyConfig};
use crate::market::{gating, MarketConditions};
use crate::strategy::performance::PerformanceTracker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, warn};

/// Published result of one rebalance tick.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    /// Target capital per configured strategy; excluded strategies carry 0
    pub allocations: BTreeMap<String, Decimal>,
    pub total_allocated: Decimal,
    /// True when the plan was produced under stale or missing inputs
    pub degraded: bool,
    pub computed_at: DateTime<Utc>,
}

impl AllocationPlan {
    fn empty(degraded: bool) -> Self {
        Self {
            allocations: BTreeMap::new(),
            total_allocated: Decimal::ZERO,
            degraded,
            computed_at: Utc::now(),
        }
    }

    pub fn allocation_for(&self, name: &str) -> Decimal {
        self.allocations.get(name).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Computes target capital per strategy on each rebalance tick.
pub struct CapitalAllocator {
    config: CapitalConfig,
    last_plan: Option<AllocationPlan>,
}

impl CapitalAllocator {
    pub fn new(config: CapitalConfig) -> Self {
        Self {
            config,
            last_plan: None,
        }
    }

    pub fn last_plan(&self) -> Option<&AllocationPlan> {
        self.last_plan.as_ref()
    }

    /// Compute the allocation plan for the current tick.
    ///
    /// Deterministic for fixed inputs and idempotent on unchanged inputs.
    /// If market or performance data is older than the freshness threshold
    /// the previous plan is returned unchanged, flagged degraded, instead of
    /// computing from stale inputs.
    pub fn rebalance(
        &mut self,
        configs: &HashMap<String, StrategyConfig>,
        tracker: &PerformanceTracker,
        market: Option<&MarketConditions>,
        market_stale: bool,
        total_capital: Decimal,
    ) -> AllocationPlan {
        let perf_stale = tracker
            .outcome_age_secs()
            .is_some_and(|age| age > self.config.max_data_age_secs as i64);
        if market_stale || market.is_none() || perf_stale {
            warn!(
                market_stale,
                market_missing = market.is_none(),
                perf_stale,
                "Degraded mode: keeping previous allocation instead of computing from stale inputs"
            );
            let mut plan = match &self.last_plan {
                Some(prev) => AllocationPlan {
                    degraded: true,
                    computed_at: Utc::now(),
                    ..prev.clone()
                },
                None => AllocationPlan::empty(true),
            };
            // The pool may have shrunk since the retained plan was computed;
            // the sum invariant holds on every published plan, degraded ones
            // included.
            if plan.total_allocated > total_capital {
                error!(
                    total_allocated = %plan.total_allocated,
                    %total_capital,
                    "Retained plan exceeds current capital, scaling down"
                );
                let scale = total_capital / plan.total_allocated;
                for amount in plan.allocations.values_mut() {
                    *amount *= scale;
                }
                plan.total_allocated = plan.allocations.values().copied().sum();
            }
            self.last_plan = Some(plan.clone());
            return plan;
        }
        let market = market.expect("checked above");

        // Step 1: eligibility. Enabled and not excluded by the market gate.
        // Sorted map keeps weight iteration deterministic across ticks.
        let mut weights: BTreeMap<&str, Decimal> = BTreeMap::new();
        for (id, cfg) in configs {
            if !cfg.enabled || !gating::is_suitable(cfg.risk_tolerance, market) {
                continue;
            }
            let Some(perf) = tracker.get(id) else { continue };

            // Step 2: priority scaled by performance, discounted by risk,
            // floored so no eligible strategy ever starves completely.
            let score_factor = dec!(0.5) + dec!(0.5) * perf.performance_score / dec!(100);
            let risk_factor = Decimal::ONE - perf.risk_score * self.config.risk_aversion_factor;
            let weight = Decimal::from(cfg.priority) * score_factor * risk_factor;
            weights.insert(id.as_str(), weight.max(self.config.min_weight));
        }

        let mut plan = AllocationPlan::empty(false);
        // Every configured strategy appears in the plan; ineligible ones at 0
        // so their prior capital is released for redistribution.
        for id in configs.keys() {
            plan.allocations.insert(id.clone(), Decimal::ZERO);
        }

        if weights.is_empty() {
            debug!("No eligible strategies this tick");
            self.last_plan = Some(plan.clone());
            return plan;
        }

        // Step 3: normalize and scale to the pool.
        let weight_sum: Decimal = weights.values().copied().sum();
        let mut amounts: Vec<(String, Decimal, Decimal, Decimal)> = weights
            .iter()
            .map(|(id, w)| {
                let cfg = &configs[*id];
                let cap = cfg.max_capital_allocation_pct / dec!(100) * total_capital;
                let raw = total_capital * *w / weight_sum;
                (id.to_string(), *w, cap, raw)
            })
            .collect();

        // Step 4: clamp to per-strategy caps, redistributing trimmed capital
        // among strategies still under their cap. Bounded fixed point:
        // iteration cap plus an epsilon convergence check guarantee
        // termination with sum(allocated) <= total_capital.
        let epsilon = self.config.convergence_epsilon;
        for iteration in 0..self.config.max_redistribution_iters {
            let mut overflow = Decimal::ZERO;
            for (_, _, cap, amount) in amounts.iter_mut() {
                if *amount > *cap {
                    overflow += *amount - *cap;
                    *amount = *cap;
                }
            }
            if overflow <= epsilon {
                break;
            }

            let open_weight: Decimal = amounts
                .iter()
                .filter(|(_, _, cap, amount)| *amount < *cap - epsilon)
                .map(|(_, w, _, _)| *w)
                .sum();
            if open_weight == Decimal::ZERO {
                // Everyone at cap: trimmed capital stays unallocated.
                debug!(%overflow, iteration, "All strategies capped, leaving remainder unallocated");
                break;
            }
            for (_, w, cap, amount) in amounts.iter_mut() {
                if *amount < *cap - epsilon {
                    *amount += overflow * *w / open_weight;
                }
            }
        }
        // The loop may exit on the iteration cap mid-redistribution.
        for (_, _, cap, amount) in amounts.iter_mut() {
            *amount = (*amount).min(*cap);
        }

        let mut total_allocated: Decimal = amounts.iter().map(|(_, _, _, a)| *a).sum();

        // Sum invariant is asserted before publishing; a violation is capped
        // here and logged, never externally observable.
        if total_allocated > total_capital {
            error!(
                %total_allocated,
                %total_capital,
                "Capital invariant violated after redistribution, scaling down"
            );
            let scale = total_capital / total_allocated;
            for (_, _, _, amount) in amounts.iter_mut() {
                *amount *= scale;
            }
            total_allocated = amounts.iter().map(|(_, _, _, a)| *a).sum();
        }

        for (id, _, _, amount) in amounts {
            plan.allocations.insert(id, amount);
        }
        plan.total_allocated = total_allocated;

        debug!(
            eligible = weights.len(),
            %total_allocated,
            %total_capital,
            "Rebalance complete"
        );

        self.last_plan = Some(plan.clone());
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskTolerance;
    use crate::market::Volatility;

    fn capital_config() -> CapitalConfig {
        CapitalConfig::default()
    }

    fn strategy(id: &str, priority: u8) -> StrategyConfig {
        let mut cfg = StrategyConfig::new(id);
        cfg.priority = priority;
        cfg
    }

    fn configs(list: Vec<StrategyConfig>) -> HashMap<String, StrategyConfig> {
        list.into_iter().map(|c| (c.id.clone(), c)).collect()
    }

    fn tracker_for(configs: &HashMap<String, StrategyConfig>) -> PerformanceTracker {
        let list: Vec<_> = configs.values().cloned().collect();
        PerformanceTracker::new(&list, 5)
    }

    fn market() -> MarketConditions {
        MarketConditions::default()
    }

    #[test]
    fn test_higher_priority_gets_at_least_as_much() {
        // Equal neutral performance, priorities 9 and 6
        let cfgs = configs(vec![strategy("high", 9), strategy("low", 6)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(plan.allocation_for("high") >= plan.allocation_for("low"));
        assert!(plan.allocation_for("low") > Decimal::ZERO);
    }

    #[test]
    fn test_sum_never_exceeds_total_capital() {
        let cfgs = configs(vec![
            strategy("a", 10),
            strategy("b", 7),
            strategy("c", 3),
            strategy("d", 1),
        ]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        let sum: Decimal = plan.allocations.values().copied().sum();
        assert!(sum <= dec!(10000));
        assert_eq!(plan.total_allocated, sum);
    }

    #[test]
    fn test_per_strategy_cap_enforced_and_redistributed() {
        let mut dominant = strategy("dominant", 10);
        dominant.max_capital_allocation_pct = dec!(20);
        let cfgs = configs(vec![dominant, strategy("other", 1)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));

        // Cap: 20% of 10000
        assert!(plan.allocation_for("dominant") <= dec!(2000));
        // Trimmed capital flows to the uncapped strategy
        assert!(plan.allocation_for("other") > dec!(1000));
        let sum: Decimal = plan.allocations.values().copied().sum();
        assert!(sum <= dec!(10000));
    }

    #[test]
    fn test_all_capped_leaves_remainder_unallocated() {
        let mut a = strategy("a", 5);
        a.max_capital_allocation_pct = dec!(10);
        let mut b = strategy("b", 5);
        b.max_capital_allocation_pct = dec!(10);
        let cfgs = configs(vec![a, b]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert_eq!(plan.allocation_for("a"), dec!(1000));
        assert_eq!(plan.allocation_for("b"), dec!(1000));
        assert_eq!(plan.total_allocated, dec!(2000));
    }

    #[test]
    fn test_disabled_strategy_allocated_zero() {
        let mut disabled = strategy("disabled", 10);
        disabled.enabled = false;
        let cfgs = configs(vec![disabled, strategy("enabled", 5)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert_eq!(plan.allocation_for("disabled"), Decimal::ZERO);
        assert!(plan.allocation_for("enabled") > Decimal::ZERO);
    }

    #[test]
    fn test_market_gate_excludes_low_tolerance_in_extreme_volatility() {
        let mut cautious = strategy("cautious", 10);
        cautious.risk_tolerance = RiskTolerance::Low;
        let mut bold = strategy("bold", 2);
        bold.risk_tolerance = RiskTolerance::High;
        let cfgs = configs(vec![cautious, bold]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let stormy = MarketConditions {
            volatility: Volatility::Extreme,
            ..Default::default()
        };
        let plan = allocator.rebalance(&cfgs, &tracker, Some(&stormy), false, dec!(10000));
        assert_eq!(plan.allocation_for("cautious"), Decimal::ZERO);
        assert!(plan.allocation_for("bold") > Decimal::ZERO);
    }

    #[test]
    fn test_stale_market_keeps_previous_plan() {
        let cfgs = configs(vec![strategy("a", 5)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let fresh = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(!fresh.degraded);
        let allocated = fresh.allocation_for("a");
        assert!(allocated > Decimal::ZERO);

        let degraded = allocator.rebalance(&cfgs, &tracker, Some(&market()), true, dec!(10000));
        assert!(degraded.degraded);
        assert_eq!(degraded.allocation_for("a"), allocated);
    }

    #[test]
    fn test_degraded_plan_rescaled_when_capital_shrinks() {
        let cfgs = configs(vec![strategy("a", 8), strategy("b", 4)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let fresh = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(fresh.total_allocated > dec!(2000));

        // Pool shrank while market data went stale: the retained plan is
        // republished, but re-capped against the new pool size.
        let degraded = allocator.rebalance(&cfgs, &tracker, Some(&market()), true, dec!(2000));
        assert!(degraded.degraded);
        let sum: Decimal = degraded.allocations.values().copied().sum();
        assert!(sum <= dec!(2000));
        assert_eq!(degraded.total_allocated, sum);
        // Scaling preserves the retained plan's ordering
        assert!(degraded.allocation_for("a") >= degraded.allocation_for("b"));
        assert!(degraded.allocation_for("b") > Decimal::ZERO);
    }

    #[test]
    fn test_stale_outcomes_keep_previous_plan() {
        let cfgs = configs(vec![strategy("a", 5)]);
        let mut tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let fresh = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(!fresh.degraded);

        tracker.finish_execution(
            "a",
            &crate::strategy::performance::ExecutionRecord {
                success: true,
                profit: dec!(5),
                execution_time_ms: 10,
                errored: false,
            },
            0,
        );
        tracker.backdate_last_outcome(Utc::now() - chrono::Duration::hours(1));

        let degraded = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(degraded.degraded);
        assert_eq!(degraded.allocation_for("a"), fresh.allocation_for("a"));
    }

    #[test]
    fn test_missing_market_without_history_allocates_nothing() {
        let cfgs = configs(vec![strategy("a", 5)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, None, false, dec!(10000));
        assert!(plan.degraded);
        assert_eq!(plan.total_allocated, Decimal::ZERO);
    }

    #[test]
    fn test_rebalance_is_idempotent_on_unchanged_inputs() {
        let cfgs = configs(vec![strategy("a", 8), strategy("b", 3)]);
        let tracker = tracker_for(&cfgs);
        let mut allocator = CapitalAllocator::new(capital_config());

        let first = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        let second = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert_eq!(first.allocations, second.allocations);
    }

    #[test]
    fn test_eligible_strategy_never_starves() {
        // A terrible record and elevated risk still leave a nonzero weight
        let cfgs = configs(vec![strategy("weak", 1), strategy("strong", 10)]);
        let mut tracker = tracker_for(&cfgs);
        for _ in 0..10 {
            tracker.finish_execution(
                "weak",
                &crate::strategy::performance::ExecutionRecord {
                    success: false,
                    profit: dec!(-100),
                    execution_time_ms: 10,
                    errored: true,
                },
                0,
            );
        }
        let mut allocator = CapitalAllocator::new(capital_config());

        let plan = allocator.rebalance(&cfgs, &tracker, Some(&market()), false, dec!(10000));
        assert!(plan.allocation_for("weak") > Decimal::ZERO);
    }
}
