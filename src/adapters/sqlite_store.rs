//! SQLite account store.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text so they order
//! lexicographically. Every multi-row write runs in one immediate
//! transaction.

use crate::domain::account::{
    Account, AccountStatus, DrawdownConfig, DrawdownType, EvaluationType, MaxDrawdownMode,
    PayoutConfig,
};
use crate::domain::drawdown::BreachType;
use crate::domain::error::PropEvalError;
use crate::domain::payout::PayoutRecord;
use crate::domain::phase::{
    FailureReason, NewPhase, Phase, PhaseId, PhaseMetrics, PhaseStatus, PhaseType,
};
use crate::domain::trade::Trade;
use crate::ports::account_store::{AccountStore, EvaluationCommit};
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, Transaction, TransactionBehavior, params};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_number TEXT NOT NULL,
    starting_balance REAL NOT NULL,
    evaluation_type TEXT NOT NULL,
    drawdown_type TEXT NOT NULL,
    daily_drawdown_amount REAL NOT NULL,
    max_drawdown_amount REAL NOT NULL,
    max_drawdown_mode TEXT NOT NULL,
    profit_split_percent REAL NOT NULL,
    payout_cycle_days INTEGER NOT NULL,
    min_days_to_first_payout INTEGER NOT NULL,
    payout_min_profit REAL,
    reset_on_payout INTEGER NOT NULL,
    reduce_balance_by_payout INTEGER NOT NULL,
    funded_reset_balance REAL,
    status TEXT NOT NULL,
    previous_account_id TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS phases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    phase_type TEXT NOT NULL,
    status TEXT NOT NULL,
    profit_target REAL,
    starting_balance REAL NOT NULL,
    current_balance REAL NOT NULL,
    current_equity REAL NOT NULL,
    highest_equity REAL NOT NULL,
    net_profit REAL NOT NULL,
    phase_start_at TEXT NOT NULL,
    phase_end_at TEXT,
    breach_type TEXT,
    breach_amount REAL,
    breach_threshold REAL
);
CREATE INDEX IF NOT EXISTS idx_phases_account ON phases(account_id, status);
CREATE TABLE IF NOT EXISTS trades (
    id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    phase_id INTEGER REFERENCES phases(id),
    pnl REAL NOT NULL,
    commission REAL NOT NULL,
    entry_time TEXT NOT NULL,
    close_time TEXT NOT NULL,
    PRIMARY KEY (account_id, id)
);
CREATE INDEX IF NOT EXISTS idx_trades_phase ON trades(phase_id, close_time);
CREATE TABLE IF NOT EXISTS payouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    phase_id INTEGER NOT NULL REFERENCES phases(id),
    amount REAL NOT NULL,
    gross_amount REAL NOT NULL,
    balance_before REAL NOT NULL,
    balance_after REAL NOT NULL,
    paid_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_payouts_account ON payouts(account_id, paid_at);";

const ACCOUNT_COLUMNS: &str = "id, user_id, account_number, starting_balance, evaluation_type,
    drawdown_type, daily_drawdown_amount, max_drawdown_amount, max_drawdown_mode,
    profit_split_percent, payout_cycle_days, min_days_to_first_payout, payout_min_profit,
    reset_on_payout, reduce_balance_by_payout, funded_reset_balance, status,
    previous_account_id, created_at";

const PHASE_COLUMNS: &str = "id, account_id, phase_type, status, profit_target, starting_balance,
    current_balance, current_equity, highest_equity, net_profit, phase_start_at, phase_end_at,
    breach_type, breach_amount, breach_threshold";

fn pool_err(e: r2d2::Error) -> PropEvalError {
    PropEvalError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> PropEvalError {
    PropEvalError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn bad_column(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("invalid {what} '{value}'").into(),
    )
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_enum<T>(
    row: &Row<'_>,
    idx: usize,
    what: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| bad_column(idx, what, &raw))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_number: row.get(2)?,
        starting_balance: row.get(3)?,
        evaluation_type: get_enum(row, 4, "evaluation type", EvaluationType::parse)?,
        drawdown: DrawdownConfig {
            kind: get_enum(row, 5, "drawdown type", DrawdownType::parse)?,
            daily_amount: row.get(6)?,
            max_amount: row.get(7)?,
            max_mode: get_enum(row, 8, "max drawdown mode", MaxDrawdownMode::parse)?,
        },
        payout: PayoutConfig {
            profit_split_percent: row.get(9)?,
            payout_cycle_days: row.get(10)?,
            min_days_to_first_payout: row.get(11)?,
            payout_eligibility_min_profit: row.get(12)?,
            reset_on_payout: row.get(13)?,
            reduce_balance_by_payout: row.get(14)?,
            funded_reset_balance: row.get(15)?,
        },
        status: get_enum(row, 16, "account status", AccountStatus::parse)?,
        previous_account_id: row.get(17)?,
        created_at: get_time(row, 18)?,
    })
}

fn phase_from_row(row: &Row<'_>) -> rusqlite::Result<Phase> {
    let phase_end_at = match row.get::<_, Option<String>>(11)? {
        Some(_) => Some(get_time(row, 11)?),
        None => None,
    };
    let failure_reason = match row.get::<_, Option<String>>(12)? {
        Some(raw) => Some(FailureReason {
            breach_type: BreachType::parse(&raw)
                .ok_or_else(|| bad_column(12, "breach type", &raw))?,
            amount: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
            threshold: row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
        }),
        None => None,
    };
    Ok(Phase {
        id: row.get(0)?,
        account_id: row.get(1)?,
        phase_type: get_enum(row, 2, "phase type", PhaseType::parse)?,
        status: get_enum(row, 3, "phase status", PhaseStatus::parse)?,
        profit_target: row.get(4)?,
        starting_balance: row.get(5)?,
        metrics: PhaseMetrics {
            current_balance: row.get(6)?,
            current_equity: row.get(7)?,
            highest_equity_since_phase_start: row.get(8)?,
            net_profit_since_phase_start: row.get(9)?,
        },
        phase_start_at: get_time(row, 10)?,
        phase_end_at,
        failure_reason,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        account_id: row.get(1)?,
        phase_id: row.get(2)?,
        pnl: row.get(3)?,
        commission: row.get(4)?,
        entry_time: get_time(row, 5)?,
        close_time: get_time(row, 6)?,
    })
}

fn payout_from_row(row: &Row<'_>) -> rusqlite::Result<PayoutRecord> {
    Ok(PayoutRecord {
        account_id: row.get(0)?,
        phase_id: row.get(1)?,
        amount: row.get(2)?,
        gross_amount: row.get(3)?,
        balance_before: row.get(4)?,
        balance_after: row.get(5)?,
        paid_at: get_time(row, 6)?,
    })
}

fn insert_phase(
    tx: &Transaction<'_>,
    account_id: &str,
    phase: &NewPhase,
) -> Result<Phase, PropEvalError> {
    let opened = phase.clone().into_phase(0, account_id);
    tx.execute(
        "INSERT INTO phases (account_id, phase_type, status, profit_target, starting_balance,
             current_balance, current_equity, highest_equity, net_profit, phase_start_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            account_id,
            opened.phase_type.as_str(),
            opened.status.as_str(),
            opened.profit_target,
            opened.starting_balance,
            opened.metrics.current_balance,
            opened.metrics.current_equity,
            opened.metrics.highest_equity_since_phase_start,
            opened.metrics.net_profit_since_phase_start,
            timestamp(&opened.phase_start_at),
        ],
    )
    .map_err(query_err)?;
    Ok(Phase {
        id: tx.last_insert_rowid(),
        ..opened
    })
}

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PropEvalError> {
        let db_path = config.require_string("sqlite", "path")?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.busy_timeout(std::time::Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, PropEvalError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PropEvalError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), PropEvalError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Inserts trades keyed by account and trade id, returning how many were
    /// new. A trade already on file is left untouched, phase link included.
    pub fn insert_trades(&self, trades: &[Trade]) -> Result<usize, PropEvalError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut inserted = 0;
        for trade in trades {
            inserted += tx.execute(
                "INSERT INTO trades (id, account_id, phase_id, pnl, commission,
                     entry_time, close_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (account_id, id) DO NOTHING",
                params![
                    trade.id,
                    trade.account_id,
                    trade.phase_id,
                    trade.pnl,
                    trade.commission,
                    timestamp(&trade.entry_time),
                    timestamp(&trade.close_time),
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    /// Ids of every account with the given status.
    pub fn account_ids_with_status(
        &self,
        status: AccountStatus,
    ) -> Result<Vec<String>, PropEvalError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM accounts WHERE status = ?1 ORDER BY id")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![status.as_str()], |row| row.get(0))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }
}

impl AccountStore for SqliteStore {
    fn load_account(&self, account_id: &str) -> Result<Option<Account>, PropEvalError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![account_id],
            account_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn load_active_phase(&self, account_id: &str) -> Result<Option<Phase>, PropEvalError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {PHASE_COLUMNS} FROM phases
                 WHERE account_id = ?1 AND status = 'active'
                 ORDER BY id DESC LIMIT 1"
            ),
            params![account_id],
            phase_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn load_phases(&self, account_id: &str) -> Result<Vec<Phase>, PropEvalError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PHASE_COLUMNS} FROM phases WHERE account_id = ?1 ORDER BY id ASC"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![account_id], phase_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn load_phase_trades(&self, phase_id: PhaseId) -> Result<Vec<Trade>, PropEvalError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, phase_id, pnl, commission, entry_time, close_time
                 FROM trades WHERE phase_id = ?1 ORDER BY close_time ASC, id ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![phase_id], trade_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn commit_evaluation(&self, commit: &EvaluationCommit) -> Result<bool, PropEvalError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let accounts = tx
            .execute(
                "UPDATE accounts SET status = ?1 WHERE id = ?2 AND status = 'active'",
                params![commit.account_status.as_str(), commit.account_id],
            )
            .map_err(query_err)?;
        let reason = commit.failure_reason;
        let phases = tx
            .execute(
                "UPDATE phases SET status = ?1, phase_end_at = ?2,
                     breach_type = ?3, breach_amount = ?4, breach_threshold = ?5,
                     current_balance = ?6, current_equity = ?7, highest_equity = ?8,
                     net_profit = ?9
                 WHERE id = ?10 AND account_id = ?11 AND status = 'active'",
                params![
                    commit.phase_status.as_str(),
                    commit.phase_end_at.as_ref().map(timestamp),
                    reason.map(|r| r.breach_type.as_str()),
                    reason.map(|r| r.amount),
                    reason.map(|r| r.threshold),
                    commit.metrics.current_balance,
                    commit.metrics.current_equity,
                    commit.metrics.highest_equity_since_phase_start,
                    commit.metrics.net_profit_since_phase_start,
                    commit.phase_id,
                    commit.account_id,
                ],
            )
            .map_err(query_err)?;

        if accounts == 0 || phases == 0 {
            // dropping the transaction rolls back the partial update
            return Ok(false);
        }

        if let Some(new_phase) = &commit.open_phase {
            insert_phase(&tx, &commit.account_id, new_phase)?;
        }
        tx.commit().map_err(query_err)?;
        Ok(true)
    }

    fn create_account(&self, account: &Account, phase: &NewPhase) -> Result<Phase, PropEvalError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM accounts WHERE id = ?1",
                params![account.id],
                |_| Ok(()),
            )
            .optional()
            .map_err(query_err)?
            .is_some();
        if exists {
            return Err(PropEvalError::AccountExists {
                account_id: account.id.clone(),
            });
        }

        tx.execute(
            &format!(
                "INSERT INTO accounts ({ACCOUNT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19)"
            ),
            params![
                account.id,
                account.user_id,
                account.account_number,
                account.starting_balance,
                account.evaluation_type.as_str(),
                account.drawdown.kind.as_str(),
                account.drawdown.daily_amount,
                account.drawdown.max_amount,
                account.drawdown.max_mode.as_str(),
                account.payout.profit_split_percent,
                account.payout.payout_cycle_days,
                account.payout.min_days_to_first_payout,
                account.payout.payout_eligibility_min_profit,
                account.payout.reset_on_payout,
                account.payout.reduce_balance_by_payout,
                account.payout.funded_reset_balance,
                account.status.as_str(),
                account.previous_account_id,
                timestamp(&account.created_at),
            ],
        )
        .map_err(query_err)?;

        let phase = insert_phase(&tx, &account.id, phase)?;
        tx.commit().map_err(query_err)?;
        Ok(phase)
    }

    fn last_payout(&self, account_id: &str) -> Result<Option<PayoutRecord>, PropEvalError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT account_id, phase_id, amount, gross_amount, balance_before, balance_after,
                 paid_at
             FROM payouts WHERE account_id = ?1
             ORDER BY paid_at DESC, id DESC LIMIT 1",
            params![account_id],
            payout_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn record_payout(
        &self,
        payout: &PayoutRecord,
        metrics: &PhaseMetrics,
    ) -> Result<(), PropEvalError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let updated = tx
            .execute(
                "UPDATE phases SET current_balance = ?1, current_equity = ?2,
                     highest_equity = ?3, net_profit = ?4
                 WHERE id = ?5 AND account_id = ?6",
                params![
                    metrics.current_balance,
                    metrics.current_equity,
                    metrics.highest_equity_since_phase_start,
                    metrics.net_profit_since_phase_start,
                    payout.phase_id,
                    payout.account_id,
                ],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(PropEvalError::NoActivePhase {
                account_id: payout.account_id.clone(),
            });
        }

        tx.execute(
            "INSERT INTO payouts (account_id, phase_id, amount, gross_amount, balance_before,
                 balance_after, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payout.account_id,
                payout.phase_id,
                payout.amount,
                payout.gross_amount,
                payout.balance_before,
                payout.balance_after,
                timestamp(&payout.paid_at),
            ],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)
    }
}
