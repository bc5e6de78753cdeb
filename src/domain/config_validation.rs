//! Account configuration loading and validation.
//!
//! Semantic checks accumulate every violation so a settings form can show
//! them all at once; only unparseable values abort loading.

use chrono::Utc;

use crate::domain::account::{
    Account, AccountStatus, DrawdownConfig, DrawdownType, EvaluationType, MaxDrawdownMode,
    PayoutConfig,
};
use crate::domain::drawdown::BreachPriority;
use crate::domain::error::PropEvalError;
use crate::ports::config_port::ConfigPort;

/// Every configuration problem with `account`, in field order.
pub fn validate_account_config(account: &Account) -> Vec<String> {
    let mut errors = Vec::new();

    if account.account_number.trim().is_empty() {
        errors.push("Account number is required".to_string());
    }
    if !account.starting_balance.is_finite() || account.starting_balance <= 0.0 {
        errors.push("Starting balance must be greater than 0".to_string());
    }

    validate_drawdown(&account.drawdown, account.starting_balance, &mut errors);
    validate_payout(&account.payout, &mut errors);

    errors
}

fn validate_drawdown(dd: &DrawdownConfig, starting_balance: f64, errors: &mut Vec<String>) {
    for (label, amount) in [("Daily", dd.daily_amount), ("Max", dd.max_amount)] {
        if !amount.is_finite() || amount <= 0.0 {
            errors.push(format!("{label} drawdown amount must be greater than 0"));
            continue;
        }
        match dd.kind {
            DrawdownType::Percent if amount > 100.0 => {
                errors.push(format!("{label} drawdown percent cannot exceed 100%"));
            }
            DrawdownType::Absolute if starting_balance > 0.0 && amount > starting_balance => {
                errors.push(format!(
                    "{label} drawdown amount cannot exceed starting balance"
                ));
            }
            _ => {}
        }
    }
}

fn validate_payout(payout: &PayoutConfig, errors: &mut Vec<String>) {
    if !payout.profit_split_percent.is_finite()
        || payout.profit_split_percent < 0.0
        || payout.profit_split_percent > 100.0
    {
        errors.push("Profit split must be between 0 and 100".to_string());
    }
    if payout.payout_cycle_days < 0 {
        errors.push("Payout cycle days cannot be negative".to_string());
    }
    if payout.min_days_to_first_payout < 0 {
        errors.push("Minimum days to first payout cannot be negative".to_string());
    }
    if payout
        .payout_eligibility_min_profit
        .is_some_and(|p| !p.is_finite() || p < 0.0)
    {
        errors.push("Minimum payout profit cannot be negative".to_string());
    }
    if payout
        .funded_reset_balance
        .is_some_and(|b| !b.is_finite() || b <= 0.0)
    {
        errors.push("Funded reset balance must be greater than 0".to_string());
    }
}

fn parse_enum<T>(
    config: &dyn ConfigPort,
    key: &str,
    default: T,
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Result<T, PropEvalError> {
    match config.get_string("account", key) {
        None => Ok(default),
        Some(raw) => parse(&raw).ok_or_else(|| PropEvalError::ConfigInvalid {
            section: "account".to_string(),
            key: key.to_string(),
            reason: format!("expected {expected}, got '{raw}'"),
        }),
    }
}

/// Builds an account from the `[account]` section.
///
/// Missing keys take defaults; semantic checks are left to
/// [`validate_account_config`].
pub fn build_account(config: &dyn ConfigPort) -> Result<Account, PropEvalError> {
    let id = config.require_string("account", "id")?;

    let drawdown_defaults = DrawdownConfig::default();
    let payout_defaults = PayoutConfig::default();

    Ok(Account {
        id,
        user_id: config.get_string("account", "user_id").unwrap_or_default(),
        account_number: config
            .get_string("account", "account_number")
            .unwrap_or_default(),
        starting_balance: config.get_double("account", "starting_balance", 0.0),
        drawdown: DrawdownConfig {
            kind: parse_enum(
                config,
                "drawdown_type",
                drawdown_defaults.kind,
                DrawdownType::parse,
                "percent or absolute",
            )?,
            daily_amount: config.get_double(
                "account",
                "daily_drawdown_amount",
                drawdown_defaults.daily_amount,
            ),
            max_amount: config.get_double(
                "account",
                "max_drawdown_amount",
                drawdown_defaults.max_amount,
            ),
            max_mode: parse_enum(
                config,
                "max_drawdown_mode",
                drawdown_defaults.max_mode,
                MaxDrawdownMode::parse,
                "static or trailing",
            )?,
        },
        evaluation_type: parse_enum(
            config,
            "evaluation_type",
            EvaluationType::TwoStep,
            EvaluationType::parse,
            "one_step or two_step",
        )?,
        payout: PayoutConfig {
            profit_split_percent: config.get_double(
                "account",
                "profit_split_percent",
                payout_defaults.profit_split_percent,
            ),
            payout_cycle_days: config.get_int(
                "account",
                "payout_cycle_days",
                payout_defaults.payout_cycle_days,
            ),
            min_days_to_first_payout: config.get_int(
                "account",
                "min_days_to_first_payout",
                payout_defaults.min_days_to_first_payout,
            ),
            payout_eligibility_min_profit: config.get_optional_double("account", "payout_min_profit"),
            reset_on_payout: config.get_bool(
                "account",
                "reset_on_payout",
                payout_defaults.reset_on_payout,
            ),
            reduce_balance_by_payout: config.get_bool(
                "account",
                "reduce_balance_by_payout",
                payout_defaults.reduce_balance_by_payout,
            ),
            funded_reset_balance: config.get_optional_double("account", "funded_reset_balance"),
        },
        status: AccountStatus::Active,
        previous_account_id: None,
        created_at: Utc::now(),
    })
}

/// Explicit `[account] profit_target`, if configured.
pub fn configured_profit_target(config: &dyn ConfigPort) -> Option<f64> {
    config.get_optional_double("account", "profit_target")
}

pub fn breach_priority(config: &dyn ConfigPort) -> Result<BreachPriority, PropEvalError> {
    match config.get_string("evaluation", "breach_priority") {
        None => Ok(BreachPriority::default()),
        Some(raw) => BreachPriority::parse(&raw).ok_or_else(|| PropEvalError::ConfigInvalid {
            section: "evaluation".to_string(),
            key: "breach_priority".to_string(),
            reason: format!("expected max_first or daily_first, got '{raw}'"),
        }),
    }
}
