//! Persistence port for accounts, phases, trades and payouts.

use chrono::{DateTime, Utc};

use crate::domain::account::{Account, AccountStatus};
use crate::domain::error::PropEvalError;
use crate::domain::payout::PayoutRecord;
use crate::domain::phase::{FailureReason, NewPhase, Phase, PhaseId, PhaseMetrics, PhaseStatus};
use crate::domain::trade::Trade;

/// Everything one evaluation cycle writes back for an account.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationCommit {
    pub account_id: String,
    pub phase_id: PhaseId,
    pub account_status: AccountStatus,
    pub phase_status: PhaseStatus,
    pub phase_end_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    pub metrics: PhaseMetrics,
    /// Phase opened on the same account by this cycle (the funded phase).
    pub open_phase: Option<NewPhase>,
}

pub trait AccountStore {
    fn load_account(&self, account_id: &str) -> Result<Option<Account>, PropEvalError>;

    fn load_active_phase(&self, account_id: &str) -> Result<Option<Phase>, PropEvalError>;

    /// All phases of an account, oldest first.
    fn load_phases(&self, account_id: &str) -> Result<Vec<Phase>, PropEvalError>;

    fn load_phase_trades(&self, phase_id: PhaseId) -> Result<Vec<Trade>, PropEvalError>;

    /// Applies `commit` as one atomic write.
    ///
    /// The write is guarded on the phase still being active and the account
    /// still being `active`; returns `Ok(false)` without writing anything when
    /// another evaluation got there first.
    fn commit_evaluation(&self, commit: &EvaluationCommit) -> Result<bool, PropEvalError>;

    /// Inserts a new account together with its first active phase.
    fn create_account(&self, account: &Account, phase: &NewPhase) -> Result<Phase, PropEvalError>;

    fn last_payout(&self, account_id: &str) -> Result<Option<PayoutRecord>, PropEvalError>;

    /// Stores `payout` and the funded phase's post-payout metrics atomically.
    fn record_payout(
        &self,
        payout: &PayoutRecord,
        metrics: &PhaseMetrics,
    ) -> Result<(), PropEvalError>;
}
