//! Round-trip trades as delivered by the aggregation layer.

use chrono::{DateTime, NaiveDate, Utc};

use super::phase::PhaseId;

/// P&L magnitude below which a trade counts as break-even.
pub const BREAK_EVEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: String,
    pub account_id: String,
    pub phase_id: Option<PhaseId>,
    pub pnl: f64,
    /// Signed commission; costs are negative.
    pub commission: f64,
    pub entry_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

impl Trade {
    /// Realised P&L after commission. Non-finite parts count as zero.
    pub fn net_pnl(&self) -> f64 {
        let pnl = if self.pnl.is_finite() { self.pnl } else { 0.0 };
        let commission = if self.commission.is_finite() {
            self.commission
        } else {
            0.0
        };
        pnl + commission
    }

    pub fn close_date(&self) -> NaiveDate {
        self.close_time.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    BreakEven,
}

pub fn outcome(net_pnl: f64) -> Outcome {
    if net_pnl > BREAK_EVEN_EPSILON {
        Outcome::Win
    } else if net_pnl < -BREAK_EVEN_EPSILON {
        Outcome::Loss
    } else {
        Outcome::BreakEven
    }
}

/// Sorts trades by close time, then entry time, in place.
pub fn sort_chronologically(trades: &mut [Trade]) {
    trades.sort_by(|a, b| {
        a.close_time
            .cmp(&b.close_time)
            .then_with(|| a.entry_time.cmp(&b.entry_time))
    });
}

/// Net P&L per UTC calendar day, in date order.
///
/// Expects trades already sorted by close time.
pub fn daily_net_pnl(trades: &[Trade]) -> Vec<(NaiveDate, f64)> {
    let mut days: Vec<(NaiveDate, f64)> = Vec::new();
    for trade in trades {
        let day = trade.close_date();
        match days.last_mut() {
            Some((d, total)) if *d == day => *total += trade.net_pnl(),
            _ => days.push((day, trade.net_pnl())),
        }
    }
    days
}
