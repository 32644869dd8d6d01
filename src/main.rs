//! Strategy Orchestrator - Main Entry Point
//!
//! Paper-trading mode: runs the orchestration core against scripted mock
//! strategies and a simulated market feed.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strategy_orchestrator::config::{Config, RiskTolerance, StrategyConfig};
use strategy_orchestrator::market::{
    Liquidity, MarketAnalysis, MarketConditions, RiskLevel, Sentiment, Trend, Volatility,
};
use strategy_orchestrator::strategy::mock::{MockOutcome, MockStrategy};
use strategy_orchestrator::strategy::{Orchestrator, StrategyHandle};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Strategy Orchestrator CLI
#[derive(Parser)]
#[command(name = "strategy-orchestrator")]
#[command(version, about = "Multi-strategy capital orchestration, paper trading mode")]
struct Cli {
    /// Stop automatically after this many seconds (default: run until Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Seconds between status log lines
    #[arg(long, default_value = "30")]
    status_interval_secs: u64,

    /// Emit logs as JSON instead of human-readable lines
    #[arg(long)]
    json_logs: bool,
}

/// Scripted market feed cycling through a few distinct regimes so the
/// suitability gate and the allocator have something to react to.
struct SimulatedMarketFeed {
    regimes: Vec<MarketConditions>,
    cursor: AtomicU64,
}

impl SimulatedMarketFeed {
    fn new() -> Self {
        let calm = MarketConditions {
            trend: Trend::Sideways,
            volatility: Volatility::Low,
            liquidity: Liquidity::Deep,
            volume: dec!(5_000_000),
            sentiment: Sentiment::Neutral,
            risk_level: RiskLevel::Low,
        };
        let trending = MarketConditions {
            trend: Trend::Bullish,
            volatility: Volatility::Moderate,
            liquidity: Liquidity::Adequate,
            volume: dec!(12_000_000),
            sentiment: Sentiment::Positive,
            risk_level: RiskLevel::Medium,
        };
        let stormy = MarketConditions {
            trend: Trend::Bearish,
            volatility: Volatility::Extreme,
            liquidity: Liquidity::Thin,
            volume: dec!(30_000_000),
            sentiment: Sentiment::Negative,
            risk_level: RiskLevel::Extreme,
        };

        Self {
            // Mostly calm, occasionally trending, rarely stormy
            regimes: vec![calm, calm, trending, calm, trending, stormy],
            cursor: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MarketAnalysis for SimulatedMarketFeed {
    async fn analyze_market(&self) -> Result<MarketConditions> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) as usize % self.regimes.len();
        Ok(self.regimes[idx])
    }
}

/// Paper-trading strategy roster: one conservative scanner, one steady
/// liquidity manager, one aggressive statistical trader.
fn paper_strategies() -> (Vec<StrategyConfig>, Vec<Arc<dyn StrategyHandle>>) {
    let mut dex_arb = StrategyConfig::new("dex-arb");
    dex_arb.priority = 8;
    dex_arb.risk_tolerance = RiskTolerance::Medium;
    dex_arb.cooldown_ms = 5_000;

    let mut liquidity_range = StrategyConfig::new("liquidity-range");
    liquidity_range.priority = 6;
    liquidity_range.risk_tolerance = RiskTolerance::Low;
    liquidity_range.max_capital_allocation_pct = dec!(40);
    liquidity_range.cooldown_ms = 15_000;

    let mut stat_corr = StrategyConfig::new("stat-corr");
    stat_corr.priority = 4;
    stat_corr.risk_tolerance = RiskTolerance::High;
    stat_corr.max_capital_allocation_pct = dec!(20);
    stat_corr.cooldown_ms = 10_000;

    let handles: Vec<Arc<dyn StrategyHandle>> = vec![
        Arc::new(
            MockStrategy::new(
                "dex-arb",
                vec![
                    MockOutcome::Profit(dec!(12.50)),
                    MockOutcome::NoOpportunity,
                    MockOutcome::NoOpportunity,
                    MockOutcome::Profit(dec!(8.75)),
                    MockOutcome::Fail("route expired before fill".to_string()),
                ],
            )
            .with_delay(Duration::from_millis(120)),
        ),
        Arc::new(
            MockStrategy::new(
                "liquidity-range",
                vec![
                    MockOutcome::Profit(dec!(3.20)),
                    MockOutcome::Profit(dec!(2.90)),
                    MockOutcome::NoOpportunity,
                ],
            )
            .with_delay(Duration::from_millis(250)),
        ),
        Arc::new(
            MockStrategy::new(
                "stat-corr",
                vec![
                    MockOutcome::Profit(dec!(45)),
                    MockOutcome::Profit(dec!(-30)),
                    MockOutcome::NoOpportunity,
                    MockOutcome::Profit(dec!(-12)),
                    MockOutcome::Profit(dec!(60)),
                ],
            )
            .with_delay(Duration::from_millis(400)),
        ),
    ];

    (vec![dex_arb, liquidity_range, stat_corr], handles)
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("strategy_orchestrator=debug".parse()?)
        .add_directive(Level::INFO.into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    Ok(())
}

fn log_stats(orchestrator: &Orchestrator) {
    let stats = orchestrator.get_stats();
    info!(
        total_capital = %stats.total_capital,
        allocated = %stats.allocated_capital,
        available = %stats.available_capital,
        total_profit = %stats.total_profit,
        trades = stats.total_trades,
        active = stats.active_trades,
        win_rate = %stats.overall_win_rate,
        best = stats.best_performing_strategy.as_deref().unwrap_or("-"),
        worst = stats.worst_performing_strategy.as_deref().unwrap_or("-"),
        degraded = stats.degraded,
        "Pool status"
    );

    for perf in orchestrator.get_strategy_performance() {
        info!(
            strategy = %perf.name,
            score = %perf.performance_score,
            risk = %perf.risk_score,
            allocated = %perf.capital_allocated,
            trades = perf.total_trades,
            profit = %perf.total_profit,
            state = ?perf.state,
            "Strategy status"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    info!(
        "Strategy Orchestrator v{}, paper trading mode",
        env!("CARGO_PKG_VERSION")
    );

    let mut config = Config::load()?;
    let (strategy_table, handles) = paper_strategies();
    if config.strategies.is_empty() {
        config.strategies = strategy_table;
    }

    let analysis = Arc::new(SimulatedMarketFeed::new());
    let orchestrator = Orchestrator::new(config, handles, analysis)?;
    orchestrator.start().await;

    let deadline = cli
        .duration_secs
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut status_ticker =
        tokio::time::interval(Duration::from_secs(cli.status_interval_secs.max(1)));
    status_ticker.tick().await; // first tick fires immediately

    loop {
        let sleep_until = async {
            match deadline {
                Some(t) => tokio::time::sleep_until(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = status_ticker.tick() => log_stats(&orchestrator),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = sleep_until => {
                info!("Configured run duration elapsed");
                break;
            }
        }
    }

    orchestrator.stop().await;
    log_stats(&orchestrator);
    info!("Goodbye");
    Ok(())
}
