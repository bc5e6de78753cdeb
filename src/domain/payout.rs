//! Payout eligibility for funded phases and settlement of approved payouts.

use chrono::{DateTime, Utc};

use super::account::PayoutConfig;
use super::error::PropEvalError;
use super::numeric::{finite_or, non_negative_or, percent_of};
use super::phase::{Phase, PhaseId, PhaseType};

pub const BLOCKER_NOT_FUNDED: &str = "Account must be in funded phase";
pub const BLOCKER_ACTIVE_BREACH: &str = "Active rule violations prevent payout";
pub const BLOCKER_MIN_PROFIT: &str = "Minimum profit requirement not met";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutEligibilityInput {
    pub days_since_funded: i64,
    pub days_since_last_payout: i64,
    pub net_profit_since_last_payout: f64,
    pub has_active_breach: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutEligibility {
    pub is_eligible: bool,
    /// Every reason the payout is blocked, not just the first.
    pub blockers: Vec<String>,
    pub max_payout_amount: f64,
    pub days_until_eligible: i64,
}

impl PayoutEligibility {
    pub fn not_funded() -> Self {
        PayoutEligibility {
            is_eligible: false,
            blockers: vec![BLOCKER_NOT_FUNDED.to_string()],
            max_payout_amount: 0.0,
            days_until_eligible: 0,
        }
    }
}

pub fn calculate_payout_eligibility(
    config: &PayoutConfig,
    phase: &Phase,
    input: &PayoutEligibilityInput,
) -> PayoutEligibility {
    if phase.phase_type != PhaseType::Funded {
        return PayoutEligibility::not_funded();
    }

    let mut blockers = Vec::new();
    let days_since_funded = input.days_since_funded.max(0);
    let days_since_last_payout = input.days_since_last_payout.max(0);
    let net_profit = finite_or(input.net_profit_since_last_payout, 0.0);

    if input.has_active_breach {
        blockers.push(BLOCKER_ACTIVE_BREACH.to_string());
    }

    let wait_funded = (config.min_days_to_first_payout - days_since_funded).max(0);
    if days_since_funded < config.min_days_to_first_payout {
        blockers.push(format!("Must wait {wait_funded} more days since funded"));
    }

    let wait_cycle = (config.payout_cycle_days - days_since_last_payout).max(0);
    if days_since_last_payout < config.payout_cycle_days {
        blockers.push(format!("Must wait {wait_cycle} more days since last payout"));
    }

    if config
        .payout_eligibility_min_profit
        .is_some_and(|min_profit| net_profit < min_profit)
    {
        blockers.push(BLOCKER_MIN_PROFIT.to_string());
    }

    let is_eligible = blockers.is_empty();
    let split = non_negative_or(config.profit_split_percent, 0.0).min(100.0);
    let max_payout_amount = if is_eligible {
        percent_of(net_profit.max(0.0), split)
    } else {
        0.0
    };

    PayoutEligibility {
        is_eligible,
        blockers,
        max_payout_amount,
        days_until_eligible: wait_funded.max(wait_cycle),
    }
}

/// A payout that has been paid out of a funded phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRecord {
    pub account_id: String,
    pub phase_id: PhaseId,
    /// Trader's share actually paid.
    pub amount: f64,
    /// Profit withdrawn from the account to fund `amount`.
    pub gross_amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub paid_at: DateTime<Utc>,
}

/// Applies an approved payout of `amount` against the funded `phase`.
///
/// The returned record's `balance_after` is the balance the next payout
/// cycle starts from.
pub fn settle_payout(
    config: &PayoutConfig,
    phase: &Phase,
    balance_before: f64,
    amount: f64,
    eligibility: &PayoutEligibility,
    paid_at: DateTime<Utc>,
) -> Result<PayoutRecord, PropEvalError> {
    if !eligibility.is_eligible {
        return Err(PropEvalError::PayoutRefused {
            reason: eligibility.blockers.join("; "),
        });
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PropEvalError::PayoutRefused {
            reason: format!("payout amount must be positive, got {amount}"),
        });
    }
    if amount > eligibility.max_payout_amount {
        return Err(PropEvalError::PayoutRefused {
            reason: format!(
                "requested {amount:.2} exceeds maximum {:.2}",
                eligibility.max_payout_amount
            ),
        });
    }

    let split = non_negative_or(config.profit_split_percent, 0.0).min(100.0);
    let gross_amount = if split > 0.0 {
        amount * 100.0 / split
    } else {
        amount
    };

    let balance_after = if config.reset_on_payout {
        config
            .funded_reset_balance
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(phase.starting_balance)
    } else if config.reduce_balance_by_payout {
        balance_before - gross_amount
    } else {
        balance_before
    };

    Ok(PayoutRecord {
        account_id: phase.account_id.clone(),
        phase_id: phase.id,
        amount,
        gross_amount,
        balance_before,
        balance_after,
        paid_at,
    })
}
