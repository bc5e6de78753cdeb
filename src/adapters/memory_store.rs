//! In-memory account store.
//!
//! All tables sit behind one mutex, so every port call is atomic with respect
//! to every other.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::account::{Account, AccountStatus};
use crate::domain::error::PropEvalError;
use crate::domain::payout::PayoutRecord;
use crate::domain::phase::{NewPhase, Phase, PhaseId, PhaseMetrics, PhaseStatus};
use crate::domain::trade::Trade;
use crate::ports::account_store::{AccountStore, EvaluationCommit};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    phases: Vec<Phase>,
    trades: Vec<Trade>,
    payouts: Vec<PayoutRecord>,
    next_phase_id: PhaseId,
}

impl Tables {
    fn insert_phase(&mut self, account_id: &str, phase: &NewPhase) -> Phase {
        self.next_phase_id += 1;
        let phase = phase.clone().into_phase(self.next_phase_id, account_id);
        self.phases.push(phase.clone());
        phase
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, PropEvalError> {
        self.tables.lock().map_err(|_| PropEvalError::Database {
            reason: "memory store lock poisoned".to_string(),
        })
    }

    /// Adds trades not yet known for their account and returns how many were
    /// new. Existing trades keep their phase link.
    pub fn insert_trades(&self, trades: &[Trade]) -> Result<usize, PropEvalError> {
        let mut tables = self.lock()?;
        let mut inserted = 0;
        for trade in trades {
            let known = tables
                .trades
                .iter()
                .any(|t| t.account_id == trade.account_id && t.id == trade.id);
            if !known {
                tables.trades.push(trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub fn payouts(&self, account_id: &str) -> Result<Vec<PayoutRecord>, PropEvalError> {
        Ok(self
            .lock()?
            .payouts
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }
}

impl AccountStore for MemoryStore {
    fn load_account(&self, account_id: &str) -> Result<Option<Account>, PropEvalError> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    fn load_active_phase(&self, account_id: &str) -> Result<Option<Phase>, PropEvalError> {
        Ok(self
            .lock()?
            .phases
            .iter()
            .find(|p| p.account_id == account_id && p.is_active())
            .cloned())
    }

    fn load_phases(&self, account_id: &str) -> Result<Vec<Phase>, PropEvalError> {
        Ok(self
            .lock()?
            .phases
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }

    fn load_phase_trades(&self, phase_id: PhaseId) -> Result<Vec<Trade>, PropEvalError> {
        Ok(self
            .lock()?
            .trades
            .iter()
            .filter(|t| t.phase_id == Some(phase_id))
            .cloned()
            .collect())
    }

    fn commit_evaluation(&self, commit: &EvaluationCommit) -> Result<bool, PropEvalError> {
        let mut tables = self.lock()?;

        let account_active = tables
            .accounts
            .get(&commit.account_id)
            .is_some_and(|a| a.status == AccountStatus::Active);
        let Some(idx) = tables
            .phases
            .iter()
            .position(|p| p.id == commit.phase_id && p.account_id == commit.account_id)
        else {
            return Ok(false);
        };
        if !account_active || tables.phases[idx].status != PhaseStatus::Active {
            return Ok(false);
        }

        let phase = &mut tables.phases[idx];
        phase.status = commit.phase_status;
        phase.phase_end_at = commit.phase_end_at;
        phase.failure_reason = commit.failure_reason;
        phase.metrics = commit.metrics;

        if let Some(account) = tables.accounts.get_mut(&commit.account_id) {
            account.status = commit.account_status;
        }
        if let Some(new_phase) = &commit.open_phase {
            tables.insert_phase(&commit.account_id, new_phase);
        }
        Ok(true)
    }

    fn create_account(&self, account: &Account, phase: &NewPhase) -> Result<Phase, PropEvalError> {
        let mut tables = self.lock()?;
        if tables.accounts.contains_key(&account.id) {
            return Err(PropEvalError::AccountExists {
                account_id: account.id.clone(),
            });
        }
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(tables.insert_phase(&account.id, phase))
    }

    fn last_payout(&self, account_id: &str) -> Result<Option<PayoutRecord>, PropEvalError> {
        Ok(self
            .lock()?
            .payouts
            .iter()
            .filter(|p| p.account_id == account_id)
            .max_by_key(|p| p.paid_at)
            .cloned())
    }

    fn record_payout(
        &self,
        payout: &PayoutRecord,
        metrics: &PhaseMetrics,
    ) -> Result<(), PropEvalError> {
        let mut tables = self.lock()?;
        let phase = tables
            .phases
            .iter_mut()
            .find(|p| p.id == payout.phase_id)
            .ok_or_else(|| PropEvalError::NoActivePhase {
                account_id: payout.account_id.clone(),
            })?;
        phase.metrics = *metrics;
        tables.payouts.push(payout.clone());
        Ok(())
    }
}
