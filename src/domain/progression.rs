//! Phase state machine: breach, profit-target achievement and topology.
//!
//! A phase moves one way only: `active -> passed` or `active -> failed`.
//! Which phase follows a pass depends on the evaluation type:
//!
//! | evaluation | passing phase | next      | account status |
//! |------------|---------------|-----------|----------------|
//! | one_step   | phase_1       | funded    | funded         |
//! | two_step   | phase_1       | phase_2   | passed         |
//! | two_step   | phase_2       | funded    | funded         |

use super::account::{Account, AccountState, AccountStatus, EvaluationType};
use super::error::PropEvalError;
use super::numeric::{finite_or, percent_of};
use super::phase::{FailureReason, Phase, PhaseStatus, PhaseType};

pub const PHASE_1_TARGET_PERCENT: f64 = 8.0;
pub const PHASE_2_TARGET_PERCENT: f64 = 5.0;

/// Default profit target for a phase, or `None` for phases without one.
pub fn get_default_profit_target(
    phase_type: PhaseType,
    starting_balance: f64,
    evaluation_type: EvaluationType,
) -> Option<f64> {
    match (phase_type, evaluation_type) {
        (PhaseType::Phase1, _) => Some(percent_of(starting_balance, PHASE_1_TARGET_PERCENT)),
        (PhaseType::Phase2, EvaluationType::TwoStep) => {
            Some(percent_of(starting_balance, PHASE_2_TARGET_PERCENT))
        }
        (PhaseType::Phase2, EvaluationType::OneStep) | (PhaseType::Funded, _) => None,
    }
}

/// Phase that follows a pass of `phase_type`, if any.
pub fn next_phase_type(evaluation_type: EvaluationType, phase_type: PhaseType) -> Option<PhaseType> {
    match (evaluation_type, phase_type) {
        (EvaluationType::OneStep, PhaseType::Phase1) => Some(PhaseType::Funded),
        (EvaluationType::TwoStep, PhaseType::Phase1) => Some(PhaseType::Phase2),
        (EvaluationType::TwoStep, PhaseType::Phase2) => Some(PhaseType::Funded),
        (EvaluationType::OneStep, PhaseType::Phase2) | (_, PhaseType::Funded) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseProgress {
    /// Percent of the profit target reached; never negative.
    pub profit_progress: f64,
    pub can_progress: bool,
    pub next_phase_type: Option<PhaseType>,
}

pub fn calculate_phase_progress(account: &Account, phase: &Phase) -> PhaseProgress {
    let net_profit = finite_or(phase.metrics.net_profit_since_phase_start, 0.0).max(0.0);
    let profit_progress = phase
        .profit_target
        .filter(|t| t.is_finite() && *t > 0.0)
        .map_or(0.0, |target| net_profit / target * 100.0);
    let next_phase_type = next_phase_type(account.evaluation_type, phase.phase_type);

    PhaseProgress {
        profit_progress,
        can_progress: profit_progress >= 100.0 && next_phase_type.is_some(),
        next_phase_type,
    }
}

/// Checks a requested manual transition out of `from_phase`.
pub fn validate_phase_transition(
    account: &Account,
    from_phase: &Phase,
    to_phase_type: PhaseType,
    net_profit: f64,
) -> Result<(), PropEvalError> {
    let invalid = |reason: String| Err(PropEvalError::InvalidTransition { reason });

    if from_phase.status != PhaseStatus::Active {
        return invalid(format!(
            "phase {} is already {}",
            from_phase.id,
            from_phase.status.as_str()
        ));
    }
    if account.evaluation_type == EvaluationType::OneStep && to_phase_type == PhaseType::Phase2 {
        return invalid("one-step accounts move directly to funded".to_string());
    }
    let expected = next_phase_type(account.evaluation_type, from_phase.phase_type);
    if expected != Some(to_phase_type) {
        return invalid(format!(
            "{} cannot advance to {}",
            from_phase.phase_type.as_str(),
            to_phase_type.as_str()
        ));
    }
    let Some(target) = from_phase.profit_target else {
        return invalid(format!("phase {} has no profit target", from_phase.id));
    };
    let net_profit = finite_or(net_profit, 0.0);
    if net_profit < target {
        return invalid(format!(
            "profit target not met: {net_profit:.2} of {target:.2}"
        ));
    }
    Ok(())
}

/// Result of one evaluation cycle for an active phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseDecision {
    Fail(FailureReason),
    Pass { next: PhaseType },
    Continue,
}

impl PhaseDecision {
    pub fn phase_status(&self) -> PhaseStatus {
        match self {
            PhaseDecision::Fail(_) => PhaseStatus::Failed,
            PhaseDecision::Pass { .. } => PhaseStatus::Passed,
            PhaseDecision::Continue => PhaseStatus::Active,
        }
    }

    pub fn account_status(&self) -> AccountStatus {
        match self {
            PhaseDecision::Fail(_) => AccountStatus::Failed,
            PhaseDecision::Pass {
                next: PhaseType::Phase2,
            } => AccountStatus::Passed,
            PhaseDecision::Pass { .. } => AccountStatus::Funded,
            PhaseDecision::Continue => AccountStatus::Active,
        }
    }

    /// Account state after applying this decision to `current`.
    pub fn next_state(&self, current: AccountState) -> AccountState {
        match self {
            PhaseDecision::Fail(_) => AccountState::Failed,
            PhaseDecision::Pass {
                next: PhaseType::Phase2,
            } => AccountState::PassedAwaitingPhase2,
            PhaseDecision::Pass { .. } => AccountState::Funded,
            PhaseDecision::Continue => current,
        }
    }
}

/// Decides the outcome for `phase`, whose metrics are already refreshed.
///
/// A breach always wins over a reached profit target.
pub fn decide(account: &Account, phase: &Phase, breach: Option<FailureReason>) -> PhaseDecision {
    if let Some(reason) = breach {
        return PhaseDecision::Fail(reason);
    }
    let progress = calculate_phase_progress(account, phase);
    match progress.next_phase_type {
        Some(next) if progress.can_progress => PhaseDecision::Pass { next },
        _ => PhaseDecision::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::drawdown::BreachType;
    use chrono::Utc;

    fn account(evaluation_type: EvaluationType) -> Account {
        let mut account = Account::new("ACC", "1001", 50_000.0);
        account.evaluation_type = evaluation_type;
        account
    }

    fn phase(phase_type: PhaseType, target: Option<f64>, net_profit: f64) -> Phase {
        let mut phase = Phase::open(1, "ACC", phase_type, target, 50_000.0, Utc::now());
        phase.metrics.net_profit_since_phase_start = net_profit;
        phase
    }

    #[test]
    fn two_step_phase1_progresses_to_phase2() {
        let p = calculate_phase_progress(
            &account(EvaluationType::TwoStep),
            &phase(PhaseType::Phase1, Some(4_000.0), 4_000.0),
        );
        assert!(p.can_progress);
        assert_eq!(p.next_phase_type, Some(PhaseType::Phase2));
        assert!((p.profit_progress - 100.0).abs() < 1e-9);
    }

    #[test]
    fn one_step_phase1_progresses_to_funded() {
        let p = calculate_phase_progress(
            &account(EvaluationType::OneStep),
            &phase(PhaseType::Phase1, Some(4_000.0), 4_000.0),
        );
        assert!(p.can_progress);
        assert_eq!(p.next_phase_type, Some(PhaseType::Funded));
    }

    #[test]
    fn negative_or_corrupt_profit_clamps_to_zero() {
        let acc = account(EvaluationType::TwoStep);
        for bad in [-1_500.0, f64::NAN, f64::NEG_INFINITY] {
            let p = calculate_phase_progress(&acc, &phase(PhaseType::Phase1, Some(4_000.0), bad));
            assert_eq!(p.profit_progress, 0.0);
            assert!(!p.can_progress);
        }
    }

    #[test]
    fn funded_phase_never_progresses() {
        let p = calculate_phase_progress(
            &account(EvaluationType::TwoStep),
            &phase(PhaseType::Funded, None, 99_999.0),
        );
        assert_eq!(p.profit_progress, 0.0);
        assert!(!p.can_progress);
        assert_eq!(p.next_phase_type, None);
    }

    #[test]
    fn default_targets() {
        assert_eq!(
            get_default_profit_target(PhaseType::Phase1, 100_000.0, EvaluationType::TwoStep),
            Some(8_000.0)
        );
        assert_eq!(
            get_default_profit_target(PhaseType::Phase2, 100_000.0, EvaluationType::TwoStep),
            Some(5_000.0)
        );
        assert_eq!(
            get_default_profit_target(PhaseType::Funded, 100_000.0, EvaluationType::TwoStep),
            None
        );
    }

    #[test]
    fn transition_rejected_when_target_unmet() {
        let err = validate_phase_transition(
            &account(EvaluationType::TwoStep),
            &phase(PhaseType::Phase1, Some(4_000.0), 3_999.0),
            PhaseType::Phase2,
            3_999.0,
        )
        .unwrap_err();
        assert!(matches!(err, PropEvalError::InvalidTransition { reason } if reason.contains("not met")));
    }

    #[test]
    fn one_step_cannot_request_phase2() {
        let err = validate_phase_transition(
            &account(EvaluationType::OneStep),
            &phase(PhaseType::Phase1, Some(4_000.0), 5_000.0),
            PhaseType::Phase2,
            5_000.0,
        )
        .unwrap_err();
        assert!(matches!(err, PropEvalError::InvalidTransition { reason } if reason.contains("directly to funded")));
    }

    #[test]
    fn valid_transition_passes() {
        assert!(
            validate_phase_transition(
                &account(EvaluationType::TwoStep),
                &phase(PhaseType::Phase2, Some(2_500.0), 2_600.0),
                PhaseType::Funded,
                2_600.0,
            )
            .is_ok()
        );
    }

    #[test]
    fn breach_beats_reached_target() {
        let reason = FailureReason {
            breach_type: BreachType::DailyDrawdown,
            amount: 3_000.0,
            threshold: 2_500.0,
        };
        let d = decide(
            &account(EvaluationType::OneStep),
            &phase(PhaseType::Phase1, Some(4_000.0), 4_500.0),
            Some(reason),
        );
        assert_eq!(d, PhaseDecision::Fail(reason));
        assert_eq!(d.account_status(), AccountStatus::Failed);
        assert_eq!(d.phase_status(), PhaseStatus::Failed);
    }

    #[test]
    fn decision_maps_to_account_state() {
        let acc = account(EvaluationType::TwoStep);
        let d = decide(&acc, &phase(PhaseType::Phase1, Some(4_000.0), 4_000.0), None);
        assert_eq!(d, PhaseDecision::Pass { next: PhaseType::Phase2 });
        assert_eq!(d.account_status(), AccountStatus::Passed);
        assert_eq!(
            d.next_state(AccountState::ActivePhase1),
            AccountState::PassedAwaitingPhase2
        );

        let d = decide(&acc, &phase(PhaseType::Phase2, Some(2_500.0), 100.0), None);
        assert_eq!(d, PhaseDecision::Continue);
        assert_eq!(d.next_state(AccountState::ActivePhase2), AccountState::ActivePhase2);
    }
}
