//! Configuration management for the orchestrator.
//!
//! Loads settings from environment variables and config files. The static
//! strategy table is validated at construction; any violation fails fast.

use crate::error::OrchestratorError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk tolerance tier configured per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl RiskTolerance {
    /// Base risk score for the tier.
    pub fn base_risk(&self) -> Decimal {
        match self {
            RiskTolerance::Low => Decimal::new(2, 1),    // 0.2
            RiskTolerance::Medium => Decimal::new(5, 1), // 0.5
            RiskTolerance::High => Decimal::new(8, 1),   // 0.8
        }
    }

    /// Hard ceiling on the risk score for the tier. A `low` strategy can
    /// never be scored above 0.5 no matter how volatile its returns.
    pub fn risk_ceiling(&self) -> Decimal {
        match self {
            RiskTolerance::Low => Decimal::new(5, 1),    // 0.5
            RiskTolerance::Medium => Decimal::new(8, 1), // 0.8
            RiskTolerance::High => Decimal::ONE,
        }
    }
}

/// Static per-strategy configuration. Mutable at runtime only through the
/// orchestrator control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Unique strategy identifier (matches the handle's name)
    pub id: String,
    /// Whether the strategy participates in allocation and scheduling
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Allocation priority, clamped to [1, 10]
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Risk tolerance tier
    #[serde(default = "default_risk_tolerance")]
    pub risk_tolerance: RiskTolerance,
    /// Maximum share of total capital this strategy may hold, in percent (0, 100]
    #[serde(default = "default_max_capital_pct")]
    pub max_capital_allocation_pct: Decimal,
    /// Maximum simultaneous in-flight executions (>= 1)
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: u32,
    /// Minimum elapsed time between consecutive dispatches, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl StrategyConfig {
    /// Build a config with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: default_enabled(),
            priority: default_priority(),
            risk_tolerance: default_risk_tolerance(),
            max_capital_allocation_pct: default_max_capital_pct(),
            max_concurrent_trades: default_max_concurrent_trades(),
            cooldown_ms: default_cooldown_ms(),
        }
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.id.is_empty() {
            return Err(OrchestratorError::Configuration(
                "strategy id must not be empty".to_string(),
            ));
        }
        if self.priority < 1 || self.priority > 10 {
            return Err(OrchestratorError::Configuration(format!(
                "{}: priority must be in [1, 10], got {}",
                self.id, self.priority
            )));
        }
        if self.max_capital_allocation_pct <= Decimal::ZERO
            || self.max_capital_allocation_pct > Decimal::ONE_HUNDRED
        {
            return Err(OrchestratorError::Configuration(format!(
                "{}: max_capital_allocation_pct must be in (0, 100], got {}",
                self.id, self.max_capital_allocation_pct
            )));
        }
        if self.max_concurrent_trades < 1 {
            return Err(OrchestratorError::Configuration(format!(
                "{}: max_concurrent_trades must be >= 1",
                self.id
            )));
        }
        Ok(())
    }
}

/// Capital pool and rebalancing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Total capital managed across all strategies
    #[serde(default = "default_total_capital")]
    pub total_capital: Decimal,
    /// Floor enforced by `set_total_capital`
    #[serde(default = "default_min_total_capital")]
    pub min_total_capital: Decimal,
    /// Risk aversion factor applied in the weight formula (0.0-1.0)
    #[serde(default = "default_risk_aversion_factor")]
    pub risk_aversion_factor: Decimal,
    /// Floor for eligible strategy weights, prevents permanent starvation
    #[serde(default = "default_min_weight")]
    pub min_weight: Decimal,
    /// Seconds between rebalance ticks
    #[serde(default = "default_rebalance_interval_secs")]
    pub rebalance_interval_secs: u64,
    /// Iteration cap for the clamp-and-redistribute fixed point
    #[serde(default = "default_max_redistribution_iters")]
    pub max_redistribution_iters: u32,
    /// Convergence epsilon for redistribution, in capital units
    #[serde(default = "default_convergence_epsilon")]
    pub convergence_epsilon: Decimal,
    /// Maximum age of performance/market inputs before the allocator
    /// falls back to the previous plan, in seconds
    #[serde(default = "default_max_data_age_secs")]
    pub max_data_age_secs: u64,
}

/// Execution scheduler parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Bound on how long `stop()` waits for in-flight executions
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Minimum sample size before performance scores leave the neutral band
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
}

/// Market condition monitoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Seconds between market condition refreshes
    #[serde(default = "default_market_refresh_secs")]
    pub refresh_interval_secs: u64,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Static strategy table
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// Capital pool settings
    #[serde(default)]
    pub capital: CapitalConfig,
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Market monitoring settings
    #[serde(default)]
    pub market: MarketConfig,
}

// Default value functions

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u8 {
    5
}

fn default_risk_tolerance() -> RiskTolerance {
    RiskTolerance::Medium
}

fn default_max_capital_pct() -> Decimal {
    Decimal::new(30, 0) // 30%
}

fn default_max_concurrent_trades() -> u32 {
    1
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_total_capital() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_min_total_capital() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_risk_aversion_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_min_weight() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_rebalance_interval_secs() -> u64 {
    300
}

fn default_max_redistribution_iters() -> u32 {
    10
}

fn default_convergence_epsilon() -> Decimal {
    Decimal::new(1, 2) // 0.01 capital units
}

fn default_max_data_age_secs() -> u64 {
    900
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_min_sample_size() -> u64 {
    5
}

fn default_market_refresh_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("ORCH"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration values. Any violation is a fatal
    /// `OrchestratorError::Configuration`.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let mut seen = std::collections::HashSet::new();
        for strategy in &self.strategies {
            strategy.validate()?;
            if !seen.insert(strategy.id.as_str()) {
                return Err(OrchestratorError::Configuration(format!(
                    "duplicate strategy id: {}",
                    strategy.id
                )));
            }
        }

        if self.capital.total_capital < self.capital.min_total_capital {
            return Err(OrchestratorError::Configuration(format!(
                "total_capital {} below minimum {}",
                self.capital.total_capital, self.capital.min_total_capital
            )));
        }
        if self.capital.risk_aversion_factor < Decimal::ZERO
            || self.capital.risk_aversion_factor > Decimal::ONE
        {
            return Err(OrchestratorError::Configuration(
                "risk_aversion_factor must be in [0, 1]".to_string(),
            ));
        }
        if self.capital.max_redistribution_iters == 0 {
            return Err(OrchestratorError::Configuration(
                "max_redistribution_iters must be >= 1".to_string(),
            ));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(OrchestratorError::Configuration(
                "tick_interval_secs must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            capital: CapitalConfig::default(),
            scheduler: SchedulerConfig::default(),
            market: MarketConfig::default(),
        }
    }
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            min_total_capital: default_min_total_capital(),
            risk_aversion_factor: default_risk_aversion_factor(),
            min_weight: default_min_weight(),
            rebalance_interval_secs: default_rebalance_interval_secs(),
            max_redistribution_iters: default_max_redistribution_iters(),
            convergence_epsilon: default_convergence_epsilon(),
            max_data_age_secs: default_max_data_age_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            min_sample_size: default_min_sample_size(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_market_refresh_secs(),
        }
    }
}
