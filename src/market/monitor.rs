//! Market condition monitoring.
//!
//! Wraps an injected `MarketAnalysis` collaborator and caches the latest
//! regime snapshot. A failed refresh keeps the previous snapshot; consumers
//! decide via `is_stale` whether the cached data is still usable.

use crate::market::conditions::MarketConditions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tracing::{debug, warn};

/// External market analysis collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketAnalysis: Send + Sync {
    /// Sample current trend/volatility/liquidity/sentiment.
    async fn analyze_market(&self) -> anyhow::Result<MarketConditions>;
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    conditions: MarketConditions,
    fetched_at: DateTime<Utc>,
}

/// Caches the latest market snapshot from the analysis collaborator.
pub struct MarketConditionMonitor {
    analysis: std::sync::Arc<dyn MarketAnalysis>,
    // Brief sync lock; never held across an await.
    snapshot: RwLock<Option<Snapshot>>,
}

impl MarketConditionMonitor {
    pub fn new(analysis: std::sync::Arc<dyn MarketAnalysis>) -> Self {
        Self {
            analysis,
            snapshot: RwLock::new(None),
        }
    }

    /// Fetch a fresh snapshot. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Option<MarketConditions> {
        match self.analysis.analyze_market().await {
            Ok(conditions) => {
                debug!(
                    volatility = ?conditions.volatility,
                    liquidity = ?conditions.liquidity,
                    risk_level = ?conditions.risk_level,
                    favorable = conditions.is_favorable(),
                    "Market conditions refreshed"
                );
                let mut guard = self.snapshot.write().expect("market snapshot lock poisoned");
                *guard = Some(Snapshot {
                    conditions,
                    fetched_at: Utc::now(),
                });
                Some(conditions)
            }
            Err(e) => {
                warn!(error = %e, "Market refresh failed, keeping previous snapshot");
                None
            }
        }
    }

    /// Latest cached snapshot, if any refresh has succeeded.
    pub fn current(&self) -> Option<MarketConditions> {
        self.snapshot
            .read()
            .expect("market snapshot lock poisoned")
            .map(|s| s.conditions)
    }

    /// Age of the cached snapshot in seconds.
    pub fn age_secs(&self) -> Option<i64> {
        self.snapshot
            .read()
            .expect("market snapshot lock poisoned")
            .map(|s| (Utc::now() - s.fetched_at).num_seconds())
    }

    /// True when no snapshot exists or it is older than `max_age_secs`.
    pub fn is_stale(&self, max_age_secs: u64) -> bool {
        match self.age_secs() {
            Some(age) => age > max_age_secs as i64,
            None => true,
        }
    }
}
