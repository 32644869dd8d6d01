//! Market condition gating.
//!
//! A static suitability table keyed by strategy risk tolerance and market
//! regime. This is a hard pre-filter applied before allocation weighting,
//! not a soft penalty: an excluded strategy is allocated nothing for the
//! tick regardless of its score.

use crate::config::RiskTolerance;
use crate::market::conditions::{Liquidity, MarketConditions, RiskLevel, Trend, Volatility};

/// Whether a strategy with the given risk tolerance may trade under the
/// given market regime.
pub fn is_suitable(tolerance: RiskTolerance, conditions: &MarketConditions) -> bool {
    if !trend_permits(tolerance, conditions.trend) {
        return false;
    }
    match tolerance {
        // Low-tolerance strategies sit out anything rough: extreme
        // volatility excludes them outright, as do thin books and
        // extreme overall risk.
        RiskTolerance::Low => {
            !matches!(conditions.volatility, Volatility::High | Volatility::Extreme)
                && conditions.liquidity != Liquidity::Thin
                && conditions.risk_level != RiskLevel::Extreme
        }
        RiskTolerance::Medium => {
            conditions.volatility != Volatility::Extreme
                && !(conditions.risk_level == RiskLevel::Extreme
                    && conditions.liquidity == Liquidity::Thin)
        }
        // High-tolerance strategies trade through volatility; only the
        // combination of an extreme regime and a thin book excludes them.
        RiskTolerance::High => {
            !(conditions.volatility == Volatility::Extreme
                && conditions.liquidity == Liquidity::Thin)
        }
    }
}

/// Trend filter hook for strategies that only run directionally. Currently
/// every tolerance tier trades all trends; kept separate so the table stays
/// the single place regime rules live.
pub fn trend_permits(_tolerance: RiskTolerance, _trend: Trend) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(volatility: Volatility, liquidity: Liquidity, risk: RiskLevel) -> MarketConditions {
        MarketConditions {
            volatility,
            liquidity,
            risk_level: risk,
            ..Default::default()
        }
    }

    #[test]
    fn test_low_tolerance_excluded_in_extreme_volatility() {
        let c = conditions(Volatility::Extreme, Liquidity::Deep, RiskLevel::Medium);
        assert!(!is_suitable(RiskTolerance::Low, &c));
    }

    #[test]
    fn test_low_tolerance_excluded_in_high_volatility() {
        let c = conditions(Volatility::High, Liquidity::Deep, RiskLevel::Low);
        assert!(!is_suitable(RiskTolerance::Low, &c));
    }

    #[test]
    fn test_low_tolerance_included_in_calm_markets() {
        let c = conditions(Volatility::Low, Liquidity::Deep, RiskLevel::Low);
        assert!(is_suitable(RiskTolerance::Low, &c));
    }

    #[test]
    fn test_medium_tolerance_survives_high_volatility() {
        let c = conditions(Volatility::High, Liquidity::Adequate, RiskLevel::High);
        assert!(is_suitable(RiskTolerance::Medium, &c));
    }

    #[test]
    fn test_medium_tolerance_excluded_in_extreme_volatility() {
        let c = conditions(Volatility::Extreme, Liquidity::Deep, RiskLevel::High);
        assert!(!is_suitable(RiskTolerance::Medium, &c));
    }

    #[test]
    fn test_high_tolerance_trades_through_extremes() {
        let c = conditions(Volatility::Extreme, Liquidity::Adequate, RiskLevel::Extreme);
        assert!(is_suitable(RiskTolerance::High, &c));
    }

    #[test]
    fn test_high_tolerance_excluded_only_on_extreme_and_thin() {
        let c = conditions(Volatility::Extreme, Liquidity::Thin, RiskLevel::Extreme);
        assert!(!is_suitable(RiskTolerance::High, &c));
    }
}
