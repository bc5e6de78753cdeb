//! Trade risk statistics: win rate, average win/loss, profit factor, streaks.
//!
//! Break-even trades are counted but excluded from both the numerator and the
//! denominator of the win rate.

use super::trade::{Outcome, Trade, outcome};

/// Reported profit factor when there are wins but no losses.
pub const MAX_PROFIT_FACTOR: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskMetrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub break_even: usize,
    /// Fraction of decided (non break-even) trades that won, in `[0, 1]`.
    pub win_rate: f64,
    pub avg_win: f64,
    /// Mean absolute size of losing trades.
    pub avg_loss: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_pnl: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    /// Positive for a run of wins, negative for a run of losses, zero after a break-even.
    pub current_streak: i64,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
}

impl RiskMetrics {
    pub fn avg_win_loss_ratio(&self) -> f64 {
        if self.avg_loss > 0.0 {
            self.avg_win / self.avg_loss
        } else if self.avg_win > 0.0 {
            MAX_PROFIT_FACTOR
        } else {
            0.0
        }
    }
}

/// Computes metrics over `trades`, which must be in chronological order for
/// the streak figures to be meaningful.
pub fn calculate_risk_metrics(trades: &[Trade]) -> RiskMetrics {
    let mut m = RiskMetrics {
        total_trades: trades.len(),
        ..RiskMetrics::default()
    };
    let mut win_run = 0usize;
    let mut loss_run = 0usize;

    for trade in trades {
        let pnl = trade.net_pnl();
        m.net_pnl += pnl;
        match outcome(pnl) {
            Outcome::Win => {
                m.wins += 1;
                m.gross_profit += pnl;
                m.largest_win = m.largest_win.max(pnl);
                win_run += 1;
                loss_run = 0;
                m.current_streak = m.current_streak.max(0) + 1;
            }
            Outcome::Loss => {
                m.losses += 1;
                m.gross_loss += pnl.abs();
                m.largest_loss = m.largest_loss.max(pnl.abs());
                loss_run += 1;
                win_run = 0;
                m.current_streak = m.current_streak.min(0) - 1;
            }
            Outcome::BreakEven => {
                m.break_even += 1;
                win_run = 0;
                loss_run = 0;
                m.current_streak = 0;
            }
        }
        m.longest_win_streak = m.longest_win_streak.max(win_run);
        m.longest_loss_streak = m.longest_loss_streak.max(loss_run);
    }

    let tradable = m.wins + m.losses;
    if tradable > 0 {
        m.win_rate = m.wins as f64 / tradable as f64;
    }
    if m.wins > 0 {
        m.avg_win = m.gross_profit / m.wins as f64;
    }
    if m.losses > 0 {
        m.avg_loss = m.gross_loss / m.losses as f64;
    }

    m.profit_factor = if m.gross_loss > 0.0 {
        m.gross_profit / m.gross_loss
    } else if m.gross_profit > 0.0 {
        MAX_PROFIT_FACTOR
    } else {
        0.0
    };

    m.expectancy = if tradable > 0 {
        m.win_rate * m.avg_win - (1.0 - m.win_rate) * m.avg_loss
    } else {
        0.0
    };

    m
}
