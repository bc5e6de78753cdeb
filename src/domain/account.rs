//! Funded-program accounts, their risk/payout configuration and lifecycle state.

use chrono::{DateTime, Utc};

use super::error::PropEvalError;
use super::numeric::percent_of;
use super::phase::{Phase, PhaseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawdownType {
    Percent,
    Absolute,
}

impl DrawdownType {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawdownType::Percent => "percent",
            DrawdownType::Absolute => "absolute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "percent" | "percentage" => Some(DrawdownType::Percent),
            "absolute" | "fixed" => Some(DrawdownType::Absolute),
            _ => None,
        }
    }
}

/// How the max-drawdown floor behaves over a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxDrawdownMode {
    /// Floor fixed at `starting_balance - max_limit` for the phase lifetime.
    Static,
    /// Floor follows the equity high-water mark and never falls.
    Trailing,
}

impl MaxDrawdownMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MaxDrawdownMode::Static => "static",
            MaxDrawdownMode::Trailing => "trailing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "static" => Some(MaxDrawdownMode::Static),
            "trailing" => Some(MaxDrawdownMode::Trailing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownConfig {
    pub kind: DrawdownType,
    pub daily_amount: f64,
    pub max_amount: f64,
    pub max_mode: MaxDrawdownMode,
}

impl DrawdownConfig {
    /// Daily loss allowance for a day that opened at `daily_start_balance`.
    pub fn daily_limit(&self, daily_start_balance: f64) -> f64 {
        match self.kind {
            DrawdownType::Percent => percent_of(daily_start_balance, self.daily_amount),
            DrawdownType::Absolute => self.daily_amount,
        }
    }

    /// Lifetime loss allowance for an account that started at `starting_balance`.
    pub fn max_limit(&self, starting_balance: f64) -> f64 {
        match self.kind {
            DrawdownType::Percent => percent_of(starting_balance, self.max_amount),
            DrawdownType::Absolute => self.max_amount,
        }
    }
}

impl Default for DrawdownConfig {
    fn default() -> Self {
        Self {
            kind: DrawdownType::Percent,
            daily_amount: 5.0,
            max_amount: 10.0,
            max_mode: MaxDrawdownMode::Static,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationType {
    OneStep,
    TwoStep,
}

impl EvaluationType {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationType::OneStep => "one_step",
            EvaluationType::TwoStep => "two_step",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "one_step" | "1-step" | "one-step" => Some(EvaluationType::OneStep),
            "two_step" | "2-step" | "two-step" => Some(EvaluationType::TwoStep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutConfig {
    pub profit_split_percent: f64,
    pub payout_cycle_days: i64,
    pub min_days_to_first_payout: i64,
    pub payout_eligibility_min_profit: Option<f64>,
    pub reset_on_payout: bool,
    pub reduce_balance_by_payout: bool,
    pub funded_reset_balance: Option<f64>,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            profit_split_percent: 80.0,
            payout_cycle_days: 14,
            min_days_to_first_payout: 4,
            payout_eligibility_min_profit: None,
            reset_on_payout: false,
            reduce_balance_by_payout: true,
            funded_reset_balance: None,
        }
    }
}

/// Persisted account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    /// Phase 1 of a two-step evaluation passed; a phase-2 account must be provisioned.
    Passed,
    Failed,
    Funded,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Passed => "passed",
            AccountStatus::Failed => "failed",
            AccountStatus::Funded => "funded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "passed" => Some(AccountStatus::Passed),
            "failed" => Some(AccountStatus::Failed),
            "funded" => Some(AccountStatus::Funded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub account_number: String,
    pub starting_balance: f64,
    pub drawdown: DrawdownConfig,
    pub evaluation_type: EvaluationType,
    pub payout: PayoutConfig,
    pub status: AccountStatus,
    /// Phase-1 account this phase-2 account was provisioned from.
    pub previous_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: &str, account_number: &str, starting_balance: f64) -> Self {
        Account {
            id: id.to_string(),
            user_id: String::new(),
            account_number: account_number.to_string(),
            starting_balance,
            drawdown: DrawdownConfig::default(),
            evaluation_type: EvaluationType::TwoStep,
            payout: PayoutConfig::default(),
            status: AccountStatus::Active,
            previous_account_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Account lifecycle as a single tagged union.
///
/// Combines the persisted [`AccountStatus`] with the type of the active phase
/// so callers match one enum instead of comparing two status fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    ActivePhase1,
    ActivePhase2,
    PassedAwaitingPhase2,
    Funded,
    Failed,
}

impl AccountState {
    pub fn resolve(account: &Account, active_phase: Option<&Phase>) -> Result<Self, PropEvalError> {
        match account.status {
            AccountStatus::Failed => Ok(AccountState::Failed),
            AccountStatus::Funded => Ok(AccountState::Funded),
            AccountStatus::Passed => Ok(AccountState::PassedAwaitingPhase2),
            AccountStatus::Active => match active_phase.map(|p| p.phase_type) {
                Some(PhaseType::Phase1) => Ok(AccountState::ActivePhase1),
                Some(PhaseType::Phase2) => Ok(AccountState::ActivePhase2),
                Some(PhaseType::Funded) => Err(PropEvalError::InvalidTransition {
                    reason: format!(
                        "account {} is active but its open phase is funded",
                        account.id
                    ),
                }),
                None => Err(PropEvalError::NoActivePhase {
                    account_id: account.id.clone(),
                }),
            },
        }
    }

    pub fn status(self) -> AccountStatus {
        match self {
            AccountState::ActivePhase1 | AccountState::ActivePhase2 => AccountStatus::Active,
            AccountState::PassedAwaitingPhase2 => AccountStatus::Passed,
            AccountState::Funded => AccountStatus::Funded,
            AccountState::Failed => AccountStatus::Failed,
        }
    }

    /// True when evaluation has nothing left to decide for this account.
    pub fn is_terminal(self) -> bool {
        match self {
            AccountState::ActivePhase1 | AccountState::ActivePhase2 => false,
            AccountState::PassedAwaitingPhase2 | AccountState::Funded | AccountState::Failed => {
                true
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountState::ActivePhase1 => "active_phase_1",
            AccountState::ActivePhase2 => "active_phase_2",
            AccountState::PassedAwaitingPhase2 => "needs_phase2_account",
            AccountState::Funded => "funded",
            AccountState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
