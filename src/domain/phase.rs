//! Evaluation phases and their running metrics.

use chrono::{DateTime, Utc};

use super::drawdown::BreachType;

pub type PhaseId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseType {
    Phase1,
    Phase2,
    Funded,
}

impl PhaseType {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseType::Phase1 => "phase_1",
            PhaseType::Phase2 => "phase_2",
            PhaseType::Funded => "funded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phase_1" => Some(PhaseType::Phase1),
            "phase_2" => Some(PhaseType::Phase2),
            "funded" => Some(PhaseType::Funded),
            _ => None,
        }
    }
}

/// One-way phase status: `Active` may become `Passed` or `Failed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Active,
    Passed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Active => "active",
            PhaseStatus::Passed => "passed",
            PhaseStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PhaseStatus::Active),
            "passed" => Some(PhaseStatus::Passed),
            "failed" => Some(PhaseStatus::Failed),
            _ => None,
        }
    }
}

/// Structured record of why a phase failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureReason {
    pub breach_type: BreachType,
    /// Loss that was measured.
    pub amount: f64,
    /// Limit the loss exceeded.
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMetrics {
    pub current_balance: f64,
    pub current_equity: f64,
    pub highest_equity_since_phase_start: f64,
    pub net_profit_since_phase_start: f64,
}

impl PhaseMetrics {
    pub fn starting_at(balance: f64) -> Self {
        PhaseMetrics {
            current_balance: balance,
            current_equity: balance,
            highest_equity_since_phase_start: balance,
            net_profit_since_phase_start: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub id: PhaseId,
    pub account_id: String,
    pub phase_type: PhaseType,
    pub status: PhaseStatus,
    pub profit_target: Option<f64>,
    pub starting_balance: f64,
    pub metrics: PhaseMetrics,
    pub phase_start_at: DateTime<Utc>,
    pub phase_end_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
}

impl Phase {
    pub fn open(
        id: PhaseId,
        account_id: &str,
        phase_type: PhaseType,
        profit_target: Option<f64>,
        starting_balance: f64,
        phase_start_at: DateTime<Utc>,
    ) -> Self {
        Phase {
            id,
            account_id: account_id.to_string(),
            phase_type,
            status: PhaseStatus::Active,
            profit_target,
            starting_balance,
            metrics: PhaseMetrics::starting_at(starting_balance),
            phase_start_at,
            phase_end_at: None,
            failure_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PhaseStatus::Active
    }
}

/// A phase about to be created; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhase {
    pub phase_type: PhaseType,
    pub profit_target: Option<f64>,
    pub starting_balance: f64,
    pub phase_start_at: DateTime<Utc>,
}

impl NewPhase {
    pub fn into_phase(self, id: PhaseId, account_id: &str) -> Phase {
        Phase::open(
            id,
            account_id,
            self.phase_type,
            self.profit_target,
            self.starting_balance,
            self.phase_start_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_phase_starts_flat() {
        let phase = Phase::open(7, "ACC", PhaseType::Phase1, Some(4_000.0), 50_000.0, Utc::now());
        assert!(phase.is_active());
        assert_eq!(phase.metrics.current_balance, 50_000.0);
        assert_eq!(phase.metrics.highest_equity_since_phase_start, 50_000.0);
        assert_eq!(phase.metrics.net_profit_since_phase_start, 0.0);
        assert!(phase.phase_end_at.is_none());
        assert!(phase.failure_reason.is_none());
    }

    #[test]
    fn phase_type_names() {
        for t in [PhaseType::Phase1, PhaseType::Phase2, PhaseType::Funded] {
            assert_eq!(PhaseType::parse(t.as_str()), Some(t));
        }
        assert_eq!(PhaseStatus::parse("passed"), Some(PhaseStatus::Passed));
        assert_eq!(PhaseStatus::parse("open"), None);
    }
}
