//! Daily and maximum drawdown allowance and breach detection.
//!
//! Two regimes govern the max-drawdown floor:
//! - static: `starting_balance - max_limit`, fixed for the phase lifetime
//! - trailing: `highest_equity - max_limit`, rising with every new equity high

use super::account::{Account, MaxDrawdownMode};
use super::numeric::non_negative_or;
use super::phase::FailureReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachType {
    DailyDrawdown,
    MaxDrawdown,
}

impl BreachType {
    pub fn as_str(self) -> &'static str {
        match self {
            BreachType::DailyDrawdown => "daily_drawdown",
            BreachType::MaxDrawdown => "max_drawdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily_drawdown" => Some(BreachType::DailyDrawdown),
            "max_drawdown" => Some(BreachType::MaxDrawdown),
            _ => None,
        }
    }
}

/// Which breach is reported when daily and max limits break in the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreachPriority {
    #[default]
    MaxFirst,
    DailyFirst,
}

impl BreachPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "max_first" => Some(BreachPriority::MaxFirst),
            "daily_first" => Some(BreachPriority::DailyFirst),
            _ => None,
        }
    }

    /// Picks the reported breach out of the two candidates.
    pub fn select(
        self,
        daily: Option<FailureReason>,
        max: Option<FailureReason>,
    ) -> Option<FailureReason> {
        match self {
            BreachPriority::MaxFirst => max.or(daily),
            BreachPriority::DailyFirst => daily.or(max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownInput {
    pub current_equity: f64,
    pub daily_start_balance: f64,
    pub highest_equity_since_phase_start: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownResult {
    pub daily_limit: f64,
    pub max_limit: f64,
    pub daily_loss: f64,
    pub max_loss: f64,
    /// Negative once breached; the magnitude is the overshoot.
    pub daily_drawdown_remaining: f64,
    pub max_drawdown_remaining: f64,
    /// Equity level below which the max-drawdown rule is broken.
    pub max_drawdown_floor: f64,
    pub is_breached: bool,
    pub breach_type: Option<BreachType>,
    pub breach_amount: f64,
    pub breach_threshold: f64,
}

impl DrawdownResult {
    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.breach_type.map(|breach_type| FailureReason {
            breach_type,
            amount: self.breach_amount,
            threshold: self.breach_threshold,
        })
    }
}

pub fn calculate_drawdown(
    account: &Account,
    input: &DrawdownInput,
    priority: BreachPriority,
) -> DrawdownResult {
    let starting_balance = non_negative_or(account.starting_balance, 0.0);
    let current_equity = non_negative_or(input.current_equity, starting_balance);
    let daily_start_balance = non_negative_or(input.daily_start_balance, starting_balance);
    let highest_equity = non_negative_or(input.highest_equity_since_phase_start, starting_balance)
        .max(starting_balance)
        .max(current_equity);

    let daily_limit = non_negative_or(account.drawdown.daily_limit(daily_start_balance), 0.0);
    let max_limit = non_negative_or(account.drawdown.max_limit(starting_balance), 0.0);

    let daily_loss = (daily_start_balance - current_equity).max(0.0);
    let (max_drawdown_floor, max_loss) = match account.drawdown.max_mode {
        MaxDrawdownMode::Static => (
            starting_balance - max_limit,
            (starting_balance - current_equity).max(0.0),
        ),
        MaxDrawdownMode::Trailing => (
            highest_equity - max_limit,
            (highest_equity - current_equity).max(0.0),
        ),
    };

    let daily = (daily_loss > daily_limit).then_some(FailureReason {
        breach_type: BreachType::DailyDrawdown,
        amount: daily_loss,
        threshold: daily_limit,
    });
    let max = (max_loss > max_limit).then_some(FailureReason {
        breach_type: BreachType::MaxDrawdown,
        amount: max_loss,
        threshold: max_limit,
    });
    let breach = priority.select(daily, max);

    DrawdownResult {
        daily_limit,
        max_limit,
        daily_loss,
        max_loss,
        daily_drawdown_remaining: daily_limit - daily_loss,
        max_drawdown_remaining: max_limit - max_loss,
        max_drawdown_floor,
        is_breached: breach.is_some(),
        breach_type: breach.map(|b| b.breach_type),
        breach_amount: breach.map_or(0.0, |b| b.amount),
        breach_threshold: breach.map_or(0.0, |b| b.threshold),
    }
}

/// Running equity peak for a phase. Only ever rises.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighWaterMark {
    peak: f64,
}

impl HighWaterMark {
    pub fn new(start: f64) -> Self {
        HighWaterMark { peak: start }
    }

    /// Records an equity observation and returns the (possibly new) peak.
    pub fn observe(&mut self, equity: f64) -> f64 {
        if equity.is_finite() && equity > self.peak {
            self.peak = equity;
        }
        self.peak
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Trailing max-drawdown floor for the current peak.
    pub fn floor(&self, max_limit: f64) -> f64 {
        self.peak - max_limit
    }
}
