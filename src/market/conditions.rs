//! Market condition snapshot types.
//!
//! A `MarketConditions` value is an immutable snapshot replaced wholesale on
//! each refresh, never mutated in place.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional market trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

/// Realized volatility regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Moderate,
    High,
    Extreme,
}

/// On-chain liquidity depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Deep,
    Adequate,
    Thin,
}

/// Aggregate market sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Overall market risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

/// Immutable market regime snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub trend: Trend,
    pub volatility: Volatility,
    pub liquidity: Liquidity,
    /// 24h traded volume in quote units
    pub volume: Decimal,
    pub sentiment: Sentiment,
    pub risk_level: RiskLevel,
}

impl MarketConditions {
    /// Whether the overall regime permits trading at all.
    pub fn is_favorable(&self) -> bool {
        self.risk_level != RiskLevel::Extreme && self.liquidity != Liquidity::Thin
    }
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            trend: Trend::Sideways,
            volatility: Volatility::Moderate,
            liquidity: Liquidity::Adequate,
            volume: Decimal::ZERO,
            sentiment: Sentiment::Neutral,
            risk_level: RiskLevel::Medium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_favorable() {
        assert!(MarketConditions::default().is_favorable());
    }

    #[test]
    fn test_extreme_risk_is_unfavorable() {
        let conditions = MarketConditions {
            risk_level: RiskLevel::Extreme,
            ..Default::default()
        };
        assert!(!conditions.is_favorable());

        let conditions = MarketConditions {
            liquidity: Liquidity::Thin,
            ..Default::default()
        };
        assert!(!conditions.is_favorable());
    }
}
