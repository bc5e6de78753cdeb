//! Evaluation rules, calculators and the per-account orchestrator.

pub mod account;
pub mod config_validation;
pub mod drawdown;
pub mod error;
pub mod evaluation;
pub mod numeric;
pub mod payout;
pub mod phase;
pub mod progression;
pub mod risk_metrics;
pub mod score;
pub mod trade;
