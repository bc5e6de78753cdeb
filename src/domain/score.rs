//! Six-factor weighted performance score.
//!
//! Each sub-metric is mapped into `[0, 100]` by a piecewise-linear
//! [`ScoreCurve`]; the overall score is the rounded weighted sum.

use super::numeric::{clamp_finite, finite_or};
use super::risk_metrics::{MAX_PROFIT_FACTOR, calculate_risk_metrics};
use super::trade::{Trade, daily_net_pnl};

/// Behaviour of a curve left of its first breakpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LowerTail {
    /// `score = x * slope`.
    Linear { slope: f64 },
    Zero,
}

/// Breakpoint table `(threshold, score)`, thresholds strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCurve {
    pub points: &'static [(f64, f64)],
    pub tail: LowerTail,
}

impl ScoreCurve {
    fn tail_score(&self, x: f64) -> f64 {
        match self.tail {
            LowerTail::Linear { slope } => x * slope,
            LowerTail::Zero => 0.0,
        }
    }

    /// Interpolated score for `x`, clamped to `[0, 100]`.
    ///
    /// The first breakpoint's score is raised to the tail value at that
    /// threshold, so the curve has no downward step where the tail ends.
    pub fn score(&self, x: f64) -> f64 {
        if !x.is_finite() || self.points.is_empty() {
            return 0.0;
        }
        let (first_x, first_y) = self.points[0];
        if x < first_x {
            return clamp_finite(self.tail_score(x), 0.0, 100.0);
        }
        let mut prev = (first_x, first_y.max(self.tail_score(first_x)));
        for &(px, py) in &self.points[1..] {
            if x < px {
                let t = (x - prev.0) / (px - prev.0);
                return clamp_finite(prev.1 + t * (py - prev.1), 0.0, 100.0);
            }
            prev = (px, py);
        }
        clamp_finite(prev.1, 0.0, 100.0)
    }
}

pub const AVG_WIN_LOSS_CURVE: ScoreCurve = ScoreCurve {
    points: &[
        (0.8, 0.0),
        (1.0, 30.0),
        (1.2, 45.0),
        (1.5, 60.0),
        (1.8, 75.0),
        (2.0, 85.0),
        (2.5, 95.0),
        (3.0, 100.0),
    ],
    tail: LowerTail::Linear { slope: 15.0 },
};

pub const WIN_PERCENTAGE_CURVE: ScoreCurve = ScoreCurve {
    points: &[
        (20.0, 15.0),
        (30.0, 30.0),
        (40.0, 50.0),
        (50.0, 70.0),
        (60.0, 90.0),
        (70.0, 100.0),
    ],
    tail: LowerTail::Linear { slope: 15.0 / 20.0 },
};

pub const PROFIT_FACTOR_CURVE: ScoreCurve = ScoreCurve {
    points: &[
        (0.9, 0.0),
        (1.0, 30.0),
        (1.1, 40.0),
        (1.2, 50.0),
        (1.3, 60.0),
        (1.5, 70.0),
        (1.8, 78.0),
        (2.0, 85.0),
        (2.5, 95.0),
        (3.0, 100.0),
    ],
    tail: LowerTail::Linear { slope: 15.0 },
};

pub const RECOVERY_FACTOR_CURVE: ScoreCurve = ScoreCurve {
    points: &[
        (0.0, 0.0),
        (0.5, 20.0),
        (1.0, 40.0),
        (1.5, 60.0),
        (2.0, 70.0),
        (2.5, 78.0),
        (3.0, 85.0),
        (4.0, 95.0),
        (5.0, 100.0),
    ],
    tail: LowerTail::Zero,
};

pub const WEIGHT_RECOVERY_FACTOR: f64 = 0.10;
pub const WEIGHT_WIN_PERCENTAGE: f64 = 0.15;
pub const WEIGHT_AVG_WIN_LOSS: f64 = 0.20;
pub const WEIGHT_PROFIT_FACTOR: f64 = 0.25;
pub const WEIGHT_MAX_DRAWDOWN: f64 = 0.20;
pub const WEIGHT_CONSISTENCY: f64 = 0.10;

pub fn avg_win_loss_score(ratio: f64) -> f64 {
    AVG_WIN_LOSS_CURVE.score(ratio)
}

pub fn trade_win_percentage_score(pct: f64) -> f64 {
    WIN_PERCENTAGE_CURVE.score(pct)
}

pub fn profit_factor_score(profit_factor: f64) -> f64 {
    PROFIT_FACTOR_CURVE.score(profit_factor)
}

pub fn max_drawdown_score(pct_of_peak: f64) -> f64 {
    if !pct_of_peak.is_finite() {
        return 0.0;
    }
    (100.0 - pct_of_peak).clamp(0.0, 100.0)
}

/// Scores `net_profit / |max_drawdown|`.
pub fn recovery_factor_score(net_profit: f64, max_drawdown: f64) -> f64 {
    let net_profit = finite_or(net_profit, 0.0);
    let drawdown = finite_or(max_drawdown, 0.0).abs();
    if drawdown == 0.0 {
        return if net_profit > 0.0 {
            RECOVERY_FACTOR_CURVE.score(MAX_PROFIT_FACTOR)
        } else {
            0.0
        };
    }
    let factor = net_profit / drawdown;
    if factor <= 0.0 {
        return 0.0;
    }
    RECOVERY_FACTOR_CURVE.score(factor)
}

pub fn consistency_score(avg_daily_pnl: f64, std_dev_daily_pnl: f64, total_pnl: f64) -> f64 {
    if !avg_daily_pnl.is_finite() || !std_dev_daily_pnl.is_finite() || !total_pnl.is_finite() {
        return 0.0;
    }
    if avg_daily_pnl < 0.0 || total_pnl == 0.0 {
        return 0.0;
    }
    clamp_finite(100.0 - std_dev_daily_pnl / total_pnl * 100.0, 0.0, 100.0)
}

/// Raw inputs for [`calculate_zella_score`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreInputs {
    pub avg_win_loss_ratio: f64,
    /// Win rate in percent, `[0, 100]`.
    pub win_percentage: f64,
    /// Largest peak-to-trough drop as a percent of the peak it fell from.
    pub max_drawdown_pct_of_peak: f64,
    pub profit_factor: f64,
    pub net_profit: f64,
    /// Largest peak-to-trough drop of the cumulative P&L curve, in currency.
    pub max_drawdown: f64,
    pub avg_daily_pnl: f64,
    pub std_dev_daily_pnl: f64,
    pub total_pnl: f64,
}

impl ScoreInputs {
    /// Derives all inputs from round-trip trades ordered by close time.
    pub fn from_trades(trades: &[Trade]) -> Self {
        let metrics = calculate_risk_metrics(trades);

        let mut cumulative = 0.0_f64;
        let mut peak = 0.0_f64;
        let mut max_drawdown = 0.0_f64;
        let mut max_drawdown_pct = 0.0_f64;
        for trade in trades {
            cumulative += trade.net_pnl();
            peak = peak.max(cumulative);
            let drop = peak - cumulative;
            if drop > max_drawdown {
                max_drawdown = drop;
                max_drawdown_pct = if peak > 0.0 { drop / peak * 100.0 } else { 100.0 };
            }
        }

        let daily: Vec<f64> = daily_net_pnl(trades).into_iter().map(|(_, p)| p).collect();
        let (avg_daily_pnl, std_dev_daily_pnl) = mean_and_std_dev(&daily);

        ScoreInputs {
            avg_win_loss_ratio: metrics.avg_win_loss_ratio(),
            win_percentage: metrics.win_rate * 100.0,
            max_drawdown_pct_of_peak: max_drawdown_pct,
            profit_factor: metrics.profit_factor,
            net_profit: metrics.net_pnl,
            max_drawdown,
            avg_daily_pnl,
            std_dev_daily_pnl,
            total_pnl: cumulative,
        }
    }
}

fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceScore {
    pub avg_win_loss: f64,
    pub trade_win_percentage: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub recovery_factor: f64,
    pub consistency: f64,
    /// Weighted composite, rounded, in `[0, 100]`.
    pub overall: f64,
}

pub fn calculate_zella_score(inputs: &ScoreInputs) -> PerformanceScore {
    let avg_win_loss = avg_win_loss_score(inputs.avg_win_loss_ratio);
    let trade_win_percentage = trade_win_percentage_score(inputs.win_percentage);
    let max_drawdown = max_drawdown_score(inputs.max_drawdown_pct_of_peak);
    let profit_factor = profit_factor_score(inputs.profit_factor);
    let recovery_factor = recovery_factor_score(inputs.net_profit, inputs.max_drawdown);
    let consistency = consistency_score(
        inputs.avg_daily_pnl,
        inputs.std_dev_daily_pnl,
        inputs.total_pnl,
    );

    let weighted = recovery_factor * WEIGHT_RECOVERY_FACTOR
        + trade_win_percentage * WEIGHT_WIN_PERCENTAGE
        + avg_win_loss * WEIGHT_AVG_WIN_LOSS
        + profit_factor * WEIGHT_PROFIT_FACTOR
        + max_drawdown * WEIGHT_MAX_DRAWDOWN
        + consistency * WEIGHT_CONSISTENCY;

    PerformanceScore {
        avg_win_loss,
        trade_win_percentage,
        max_drawdown,
        profit_factor,
        recovery_factor,
        consistency,
        overall: clamp_finite(weighted.round(), 0.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn weights_sum_to_one() {
        let total = WEIGHT_RECOVERY_FACTOR
            + WEIGHT_WIN_PERCENTAGE
            + WEIGHT_AVG_WIN_LOSS
            + WEIGHT_PROFIT_FACTOR
            + WEIGHT_MAX_DRAWDOWN
            + WEIGHT_CONSISTENCY;
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn avg_win_loss_breakpoints() {
        assert_abs_diff_eq!(avg_win_loss_score(1.0), 30.0);
        assert_abs_diff_eq!(avg_win_loss_score(1.1), 37.5, epsilon = 1e-9);
        assert_abs_diff_eq!(avg_win_loss_score(2.0), 85.0);
        assert_abs_diff_eq!(avg_win_loss_score(7.0), 100.0);
        assert_abs_diff_eq!(avg_win_loss_score(0.5), 7.5, epsilon = 1e-9);
        // lifted start of the first segment
        assert_abs_diff_eq!(avg_win_loss_score(0.8), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn win_percentage_breakpoints() {
        assert_abs_diff_eq!(trade_win_percentage_score(10.0), 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(trade_win_percentage_score(20.0), 15.0);
        assert_abs_diff_eq!(trade_win_percentage_score(45.0), 60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(trade_win_percentage_score(70.0), 100.0);
        assert_abs_diff_eq!(trade_win_percentage_score(95.0), 100.0);
    }

    #[test]
    fn profit_factor_breakpoints() {
        assert_abs_diff_eq!(profit_factor_score(0.5), 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(profit_factor_score(1.5), 70.0);
        assert_abs_diff_eq!(profit_factor_score(2.2), 89.0, epsilon = 1e-9);
        assert_abs_diff_eq!(profit_factor_score(MAX_PROFIT_FACTOR), 100.0);
        assert_eq!(profit_factor_score(f64::NAN), 0.0);
    }

    #[test]
    fn max_drawdown_score_is_complement() {
        assert_eq!(max_drawdown_score(12.5), 87.5);
        assert_eq!(max_drawdown_score(140.0), 0.0);
        assert_eq!(max_drawdown_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn recovery_factor_edges() {
        assert_abs_diff_eq!(recovery_factor_score(2_000.0, 1_000.0), 70.0);
        assert_abs_diff_eq!(recovery_factor_score(2_000.0, -1_000.0), 70.0);
        assert_eq!(recovery_factor_score(-500.0, 1_000.0), 0.0);
        assert_eq!(recovery_factor_score(500.0, 0.0), 100.0);
        assert_eq!(recovery_factor_score(0.0, 0.0), 0.0);
        assert_eq!(recovery_factor_score(f64::NAN, 10.0), 0.0);
    }

    #[test]
    fn consistency_rules() {
        assert_eq!(consistency_score(-1.0, 10.0, 100.0), 0.0);
        assert_eq!(consistency_score(10.0, 10.0, 0.0), 0.0);
        assert_abs_diff_eq!(consistency_score(100.0, 50.0, 500.0), 90.0, epsilon = 1e-9);
        assert_eq!(consistency_score(10.0, 900.0, 100.0), 0.0);
    }

    #[test]
    fn overall_is_weighted_and_rounded() {
        let inputs = ScoreInputs {
            avg_win_loss_ratio: 2.0,
            win_percentage: 50.0,
            max_drawdown_pct_of_peak: 10.0,
            profit_factor: 2.0,
            net_profit: 2_000.0,
            max_drawdown: 1_000.0,
            avg_daily_pnl: 100.0,
            std_dev_daily_pnl: 50.0,
            total_pnl: 500.0,
        };
        let s = calculate_zella_score(&inputs);
        // 70*.10 + 70*.15 + 85*.20 + 85*.25 + 90*.20 + 90*.10 = 82.75
        assert_eq!(s.overall, 83.0);
    }

    #[test]
    fn inputs_from_trades() {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 15, 0, 0).unwrap();
        let trades: Vec<Trade> = [300.0, -200.0, 100.0, -50.0]
            .iter()
            .enumerate()
            .map(|(i, &pnl)| Trade {
                id: format!("T{i}"),
                account_id: "ACC".into(),
                phase_id: Some(1),
                pnl,
                commission: 0.0,
                entry_time: start + Duration::days(i as i64),
                close_time: start + Duration::days(i as i64) + Duration::hours(1),
            })
            .collect();
        let inputs = ScoreInputs::from_trades(&trades);
        assert_abs_diff_eq!(inputs.max_drawdown, 200.0);
        assert_abs_diff_eq!(inputs.max_drawdown_pct_of_peak, 200.0 / 300.0 * 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(inputs.total_pnl, 150.0);
        assert_abs_diff_eq!(inputs.win_percentage, 50.0);
        assert_abs_diff_eq!(inputs.avg_daily_pnl, 37.5);
        assert_abs_diff_eq!(inputs.profit_factor, 400.0 / 250.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_trades_score_in_range() {
        let s = calculate_zella_score(&ScoreInputs::from_trades(&[]));
        assert!((0.0..=100.0).contains(&s.overall));
        // only the drawdown sub-score contributes with no trades
        assert_eq!(s.overall, 20.0);
    }
}
