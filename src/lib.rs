//! # Strategy Orchestrator
//!
//! Capital orchestration layer for a multi-strategy automated trading
//! engine. Strategies plug in behind a common handle trait; the orchestrator
//! tracks their performance, splits one bounded capital pool between them
//! and schedules their executions against current market conditions.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `market`: Market condition monitoring and suitability gating
//! - `strategy`: Performance tracking, capital allocation, scheduling and
//!   the orchestrator facade
//! - `error`: Error taxonomy shared across the core
//! - `utils`: Shared decimal arithmetic helpers

pub mod config;
pub mod error;
pub mod market;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::OrchestratorError;
pub use strategy::{Orchestrator, OrchestratorStats};
