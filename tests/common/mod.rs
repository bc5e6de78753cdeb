#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use propeval::adapters::memory_store::MemoryStore;
use propeval::domain::account::{
    Account, DrawdownConfig, DrawdownType, EvaluationType, MaxDrawdownMode,
};
use propeval::domain::evaluation::Evaluator;
use propeval::domain::phase::{NewPhase, Phase, PhaseId, PhaseType};
use propeval::domain::trade::Trade;
use propeval::ports::account_store::AccountStore;

/// Monday 2025-12-01 09:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap()
}

/// Account with absolute drawdown limits and the given evaluation type.
pub fn make_account(
    id: &str,
    balance: f64,
    evaluation_type: EvaluationType,
    daily: f64,
    max: f64,
    mode: MaxDrawdownMode,
) -> Account {
    let mut account = Account::new(id, &format!("N-{id}"), balance);
    account.evaluation_type = evaluation_type;
    account.drawdown = DrawdownConfig {
        kind: DrawdownType::Absolute,
        daily_amount: daily,
        max_amount: max,
        max_mode: mode,
    };
    account.created_at = t0();
    account
}

/// 50k two-step account: 2,500 daily / 5,000 static max.
pub fn standard_account(id: &str) -> Account {
    make_account(
        id,
        50_000.0,
        EvaluationType::TwoStep,
        2_500.0,
        5_000.0,
        MaxDrawdownMode::Static,
    )
}

pub fn new_phase(phase_type: PhaseType, target: Option<f64>, balance: f64) -> NewPhase {
    NewPhase {
        phase_type,
        profit_target: target,
        starting_balance: balance,
        phase_start_at: t0(),
    }
}

/// Trade closing `day` days and `minute` minutes after [`t0`].
pub fn make_trade(account_id: &str, phase_id: PhaseId, id: &str, day: i64, minute: i64, pnl: f64) -> Trade {
    let close = t0() + Duration::days(day) + Duration::minutes(minute);
    Trade {
        id: id.to_string(),
        account_id: account_id.to_string(),
        phase_id: Some(phase_id),
        pnl,
        commission: 0.0,
        entry_time: close - Duration::minutes(5),
        close_time: close,
    }
}

/// One trade per `(day, pnl)` entry, minutes spaced so same-day order holds.
pub fn day_trades(account_id: &str, phase_id: PhaseId, pnls: &[(i64, f64)]) -> Vec<Trade> {
    pnls.iter()
        .enumerate()
        .map(|(i, &(day, pnl))| {
            make_trade(account_id, phase_id, &format!("{account_id}-T{i}"), day, i as i64, pnl)
        })
        .collect()
}

/// Evaluator over a fresh in-memory store holding `account` with an open
/// phase 1 at the account's starting balance.
pub fn seeded(account: &Account, target: Option<f64>) -> (Evaluator<MemoryStore>, Phase) {
    let store = MemoryStore::new();
    let phase = store
        .create_account(account, &new_phase(PhaseType::Phase1, target, account.starting_balance))
        .unwrap();
    (Evaluator::new(store), phase)
}
