//! Per-account evaluation cycle, phase-2 provisioning and funded payouts.
//!
//! [`Evaluator`] is the only side-effecting entry point of the domain. One
//! evaluation:
//!
//! 1. loads the account, its active phase and the phase's trades
//! 2. replays the trades chronologically in a single pass, tracking the
//!    running balance, the high-water mark and per-day net P&L
//! 3. fails the phase on a max-drawdown or daily-drawdown breach
//! 4. otherwise passes it when the profit target is reached
//! 5. otherwise persists the refreshed running metrics
//!
//! Evaluations of the same account are serialised by an in-process lock and
//! by the store's status-guarded commit. Failed, funded and
//! passed-awaiting-phase-2 accounts are never re-evaluated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::account::{Account, AccountState, AccountStatus, EvaluationType, MaxDrawdownMode};
use super::drawdown::{BreachPriority, BreachType, HighWaterMark};
use super::error::PropEvalError;
use super::payout::{
    PayoutEligibility, PayoutEligibilityInput, PayoutRecord, calculate_payout_eligibility,
    settle_payout,
};
use super::phase::{FailureReason, NewPhase, Phase, PhaseMetrics, PhaseStatus, PhaseType};
use super::progression::{PhaseDecision, decide, get_default_profit_target};
use super::risk_metrics::{RiskMetrics, calculate_risk_metrics};
use super::score::{PerformanceScore, ScoreInputs, calculate_zella_score};
use super::trade::{Trade, sort_chronologically};
use crate::ports::account_store::{AccountStore, EvaluationCommit};

/// Result of replaying a phase's trades from its starting balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replay {
    pub final_balance: f64,
    pub highest_balance: f64,
    /// Worst loss against the max-drawdown base seen at any point.
    pub max_loss: f64,
    pub max_breach: Option<FailureReason>,
    /// First calendar day whose net loss exceeded that day's limit.
    pub daily_breach: Option<FailureReason>,
    pub daily_breach_date: Option<NaiveDate>,
}

/// Replays `trades` (sorted by close time) from `base_balance`.
///
/// `prior_high` carries a previously persisted high-water mark so a trailing
/// floor never drops below where it already stood.
pub fn replay_trades(
    account: &Account,
    base_balance: f64,
    prior_high: f64,
    trades: &[Trade],
) -> Replay {
    let max_limit = account.drawdown.max_limit(base_balance);
    let mut hwm = HighWaterMark::new(base_balance);
    hwm.observe(prior_high);

    let mut balance = base_balance;
    let mut max_loss = 0.0_f64;
    let mut daily_breach = None;
    let mut daily_breach_date = None;

    let mut day: Option<(NaiveDate, f64, f64)> = None; // (date, start balance, net pnl)
    let mut close_day = |(date, start, pnl): (NaiveDate, f64, f64)| {
        let loss = (-pnl).max(0.0);
        let limit = account.drawdown.daily_limit(start);
        if loss > limit && daily_breach.is_none() {
            daily_breach = Some(FailureReason {
                breach_type: BreachType::DailyDrawdown,
                amount: loss,
                threshold: limit,
            });
            daily_breach_date = Some(date);
        }
    };

    for trade in trades {
        let date = trade.close_date();
        let net = trade.net_pnl();
        match day {
            Some((d, _, ref mut pnl)) if d == date => *pnl += net,
            _ => {
                if let Some(finished) = day.take() {
                    close_day(finished);
                }
                day = Some((date, balance, net));
            }
        }

        balance += net;
        let peak = hwm.observe(balance);
        let loss = match account.drawdown.max_mode {
            MaxDrawdownMode::Static => base_balance - balance,
            MaxDrawdownMode::Trailing => peak - balance,
        };
        max_loss = max_loss.max(loss);
    }
    if let Some(finished) = day.take() {
        close_day(finished);
    }

    let max_breach = (max_loss > max_limit).then_some(FailureReason {
        breach_type: BreachType::MaxDrawdown,
        amount: max_loss,
        threshold: max_limit,
    });

    Replay {
        final_balance: balance,
        highest_balance: hwm.peak(),
        max_loss,
        max_breach,
        daily_breach,
        daily_breach_date,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub account_id: String,
    pub state: AccountState,
    /// True when this call persisted a terminal transition.
    pub transitioned: bool,
    pub failure_reason: Option<FailureReason>,
    pub metrics: Option<PhaseMetrics>,
}

impl EvaluationOutcome {
    pub fn status(&self) -> AccountStatus {
        self.state.status()
    }
}

/// Caller input for provisioning a phase-2 account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Phase2Request {
    pub new_account_id: String,
    /// Defaults to the phase-1 account number.
    pub account_number: Option<String>,
    /// Defaults to 5% of the phase-1 starting balance.
    pub profit_target: Option<f64>,
}

/// Evaluation core bound to one persistence port.
pub struct Evaluator<S> {
    store: S,
    priority: BreachPriority,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: AccountStore> Evaluator<S> {
    pub fn new(store: S) -> Self {
        Evaluator {
            store,
            priority: BreachPriority::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_priority(mut self, priority: BreachPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock_registry(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>>, PropEvalError> {
        self.locks.lock().map_err(|_| PropEvalError::Database {
            reason: "account lock registry poisoned".to_string(),
        })
    }

    /// Runs `f` while holding the account's lock. The registry entry is
    /// dropped once no other caller holds or waits on it.
    fn with_account_lock<T>(
        &self,
        account_id: &str,
        f: impl FnOnce() -> Result<T, PropEvalError>,
    ) -> Result<T, PropEvalError> {
        let lock = self
            .lock_registry()?
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(PropEvalError::Database {
                reason: format!("evaluation lock for {account_id} poisoned"),
            }),
        };

        let mut locks = self.lock_registry()?;
        // One reference in the registry plus ours means nobody else is queued.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(account_id);
        }
        result
    }

    fn load_account(&self, account_id: &str) -> Result<Account, PropEvalError> {
        self.store
            .load_account(account_id)?
            .ok_or_else(|| PropEvalError::AccountNotFound {
                account_id: account_id.to_string(),
            })
    }

    fn sorted_trades(&self, phase: &Phase) -> Result<Vec<Trade>, PropEvalError> {
        let mut trades = self.store.load_phase_trades(phase.id)?;
        sort_chronologically(&mut trades);
        Ok(trades)
    }

    pub fn evaluate_account(&self, account_id: &str) -> Result<EvaluationOutcome, PropEvalError> {
        self.evaluate_account_at(account_id, Utc::now())
    }

    pub fn evaluate_account_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, PropEvalError> {
        self.with_account_lock(account_id, || self.evaluate_locked(account_id, now))
    }

    fn evaluate_locked(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, PropEvalError> {
        let account = self.load_account(account_id)?;
        let active_phase = self.store.load_active_phase(account_id)?;
        let state = AccountState::resolve(&account, active_phase.as_ref())?;
        if state.is_terminal() {
            debug!(account_id, state = %state, "account is terminal, nothing to evaluate");
            return Ok(EvaluationOutcome {
                account_id: account_id.to_string(),
                state,
                transitioned: false,
                failure_reason: None,
                metrics: None,
            });
        }
        let Some(phase) = active_phase else {
            return Err(PropEvalError::NoActivePhase {
                account_id: account_id.to_string(),
            });
        };

        let trades = self.sorted_trades(&phase)?;
        let replay = replay_trades(
            &account,
            phase.starting_balance,
            phase.metrics.highest_equity_since_phase_start,
            &trades,
        );
        let metrics = PhaseMetrics {
            current_balance: replay.final_balance,
            current_equity: replay.final_balance,
            highest_equity_since_phase_start: replay.highest_balance,
            net_profit_since_phase_start: replay.final_balance - phase.starting_balance,
        };
        let breach = self.priority.select(replay.daily_breach, replay.max_breach);

        let refreshed = Phase {
            metrics,
            ..phase.clone()
        };
        let decision = decide(&account, &refreshed, breach);

        let open_phase = match decision {
            PhaseDecision::Pass {
                next: PhaseType::Funded,
            } => Some(NewPhase {
                phase_type: PhaseType::Funded,
                profit_target: None,
                starting_balance: account
                    .payout
                    .funded_reset_balance
                    .filter(|b| b.is_finite() && *b > 0.0)
                    .unwrap_or(metrics.current_balance),
                phase_start_at: now,
            }),
            _ => None,
        };
        let commit = EvaluationCommit {
            account_id: account_id.to_string(),
            phase_id: phase.id,
            account_status: decision.account_status(),
            phase_status: decision.phase_status(),
            phase_end_at: (decision.phase_status() != PhaseStatus::Active).then_some(now),
            failure_reason: match decision {
                PhaseDecision::Fail(reason) => Some(reason),
                _ => None,
            },
            metrics,
            open_phase,
        };

        if !self.store.commit_evaluation(&commit)? {
            warn!(
                account_id,
                phase_id = phase.id,
                "phase changed under evaluation, keeping stored result"
            );
            let account = self.load_account(account_id)?;
            let current = self.store.load_active_phase(account_id)?;
            return Ok(EvaluationOutcome {
                account_id: account_id.to_string(),
                state: AccountState::resolve(&account, current.as_ref())?,
                transitioned: false,
                failure_reason: None,
                metrics: None,
            });
        }

        match decision {
            PhaseDecision::Fail(reason) => info!(
                account_id,
                phase_id = phase.id,
                breach_type = reason.breach_type.as_str(),
                amount = reason.amount,
                threshold = reason.threshold,
                "phase failed"
            ),
            PhaseDecision::Pass { next } => info!(
                account_id,
                phase_id = phase.id,
                next = next.as_str(),
                net_profit = metrics.net_profit_since_phase_start,
                "phase passed"
            ),
            PhaseDecision::Continue => debug!(
                account_id,
                phase_id = phase.id,
                balance = metrics.current_balance,
                "phase still active"
            ),
        }

        Ok(EvaluationOutcome {
            account_id: account_id.to_string(),
            state: decision.next_state(state),
            transitioned: decision != PhaseDecision::Continue,
            failure_reason: commit.failure_reason,
            metrics: Some(metrics),
        })
    }

    /// Opens a phase-2 account for a two-step account whose phase 1 passed.
    pub fn provision_phase2(
        &self,
        phase1_account_id: &str,
        request: &Phase2Request,
        now: DateTime<Utc>,
    ) -> Result<(Account, Phase), PropEvalError> {
        self.with_account_lock(phase1_account_id, || {
            self.provision_phase2_locked(phase1_account_id, request, now)
        })
    }

    fn provision_phase2_locked(
        &self,
        phase1_account_id: &str,
        request: &Phase2Request,
        now: DateTime<Utc>,
    ) -> Result<(Account, Phase), PropEvalError> {
        let source = self.load_account(phase1_account_id)?;
        if source.status != AccountStatus::Passed
            || source.evaluation_type != EvaluationType::TwoStep
        {
            return Err(PropEvalError::InvalidTransition {
                reason: format!(
                    "account {phase1_account_id} is {}, not awaiting a phase-2 account",
                    source.status.as_str()
                ),
            });
        }
        if request.new_account_id.trim().is_empty() || request.new_account_id == source.id {
            return Err(PropEvalError::InvalidTransition {
                reason: "phase-2 account needs a new, distinct identifier".to_string(),
            });
        }

        let passed = self
            .store
            .load_phases(phase1_account_id)?
            .into_iter()
            .rev()
            .find(|p| p.phase_type == PhaseType::Phase1 && p.status == PhaseStatus::Passed)
            .ok_or_else(|| PropEvalError::InvalidTransition {
                reason: format!("account {phase1_account_id} has no passed phase 1"),
            })?;
        let ending_balance = passed.metrics.current_balance;

        let account = Account {
            id: request.new_account_id.clone(),
            account_number: request
                .account_number
                .clone()
                .unwrap_or_else(|| source.account_number.clone()),
            starting_balance: ending_balance,
            status: AccountStatus::Active,
            previous_account_id: Some(source.id.clone()),
            created_at: now,
            ..source.clone()
        };
        let profit_target = request.profit_target.or_else(|| {
            get_default_profit_target(
                PhaseType::Phase2,
                source.starting_balance,
                EvaluationType::TwoStep,
            )
        });
        let phase = self.store.create_account(
            &account,
            &NewPhase {
                phase_type: PhaseType::Phase2,
                profit_target,
                starting_balance: ending_balance,
                phase_start_at: now,
            },
        )?;

        info!(
            from = phase1_account_id,
            account_id = account.id.as_str(),
            starting_balance = ending_balance,
            profit_target,
            "phase-2 account provisioned"
        );
        Ok((account, phase))
    }

    /// Replays the funded phase since the last payout.
    fn funded_cycle(
        &self,
        account: &Account,
        phase: &Phase,
        now: DateTime<Utc>,
    ) -> Result<(Replay, f64, PayoutEligibilityInput), PropEvalError> {
        let last = self.store.last_payout(&account.id)?;
        let base = last.as_ref().map_or(phase.starting_balance, |p| p.balance_after);
        let trades: Vec<Trade> = self
            .sorted_trades(phase)?
            .into_iter()
            .filter(|t| last.as_ref().is_none_or(|p| t.close_time > p.paid_at))
            .collect();
        let replay = replay_trades(account, base, base, &trades);

        let days_since_funded = (now - phase.phase_start_at).num_days();
        let days_since_last_payout = last
            .as_ref()
            .map_or(days_since_funded, |p| (now - p.paid_at).num_days());
        let input = PayoutEligibilityInput {
            days_since_funded,
            days_since_last_payout,
            net_profit_since_last_payout: replay.final_balance - base,
            has_active_breach: replay.max_breach.is_some() || replay.daily_breach.is_some(),
        };
        Ok((replay, base, input))
    }

    pub fn payout_eligibility(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PayoutEligibility, PropEvalError> {
        let account = self.load_account(account_id)?;
        let Some(phase) = self.store.load_active_phase(account_id)? else {
            return Ok(PayoutEligibility::not_funded());
        };
        if phase.phase_type != PhaseType::Funded {
            return Ok(calculate_payout_eligibility(
                &account.payout,
                &phase,
                &PayoutEligibilityInput {
                    days_since_funded: 0,
                    days_since_last_payout: 0,
                    net_profit_since_last_payout: 0.0,
                    has_active_breach: false,
                },
            ));
        }
        let (_, _, input) = self.funded_cycle(&account, &phase, now)?;
        Ok(calculate_payout_eligibility(&account.payout, &phase, &input))
    }

    /// Pays `amount` to the trader if the funded account is eligible.
    pub fn request_payout(
        &self,
        account_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<PayoutRecord, PropEvalError> {
        self.with_account_lock(account_id, || {
            self.request_payout_locked(account_id, amount, now)
        })
    }

    fn request_payout_locked(
        &self,
        account_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<PayoutRecord, PropEvalError> {
        let account = self.load_account(account_id)?;
        let phase = self
            .store
            .load_active_phase(account_id)?
            .filter(|p| p.phase_type == PhaseType::Funded)
            .ok_or_else(|| PropEvalError::PayoutRefused {
                reason: PayoutEligibility::not_funded().blockers.join("; "),
            })?;

        let (replay, _, input) = self.funded_cycle(&account, &phase, now)?;
        let eligibility = calculate_payout_eligibility(&account.payout, &phase, &input);
        let record = settle_payout(
            &account.payout,
            &phase,
            replay.final_balance,
            amount,
            &eligibility,
            now,
        )?;

        let metrics = PhaseMetrics {
            current_balance: record.balance_after,
            current_equity: record.balance_after,
            highest_equity_since_phase_start: record.balance_after,
            net_profit_since_phase_start: record.balance_after - phase.starting_balance,
        };
        self.store.record_payout(&record, &metrics)?;

        info!(
            account_id,
            phase_id = phase.id,
            amount = record.amount,
            gross_amount = record.gross_amount,
            balance_after = record.balance_after,
            "payout recorded"
        );
        Ok(record)
    }

    /// Risk statistics and performance score over the active phase's trades.
    pub fn account_report(
        &self,
        account_id: &str,
    ) -> Result<(RiskMetrics, PerformanceScore), PropEvalError> {
        let phase = self.store.load_active_phase(account_id)?.ok_or_else(|| {
            PropEvalError::NoActivePhase {
                account_id: account_id.to_string(),
            }
        })?;
        let trades = self.sorted_trades(&phase)?;
        Ok((
            calculate_risk_metrics(&trades),
            calculate_zella_score(&ScoreInputs::from_trades(&trades)),
        ))
    }
}
