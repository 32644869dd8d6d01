//! Market regime monitoring and suitability gating.
//!
//! - Condition snapshots sampled from an injected `MarketAnalysis` collaborator
//! - A static suitability table mapping risk tolerance to tradeable regimes

mod conditions;
pub mod gating;
mod monitor;

pub use conditions::{Liquidity, MarketConditions, RiskLevel, Sentiment, Trend, Volatility};
pub use monitor::{MarketAnalysis, MarketConditionMonitor};

#[cfg(test)]
pub use monitor::MockMarketAnalysis;
