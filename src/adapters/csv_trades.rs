//! Round-trip trade import from CSV.
//!
//! Expected header: `id,pnl,commission,entry_time,close_time`. Times are
//! RFC 3339 or `YYYY-MM-DD HH:MM:SS` (read as UTC). An empty commission
//! counts as zero.

use crate::domain::error::PropEvalError;
use crate::domain::phase::PhaseId;
use crate::domain::trade::Trade;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::Path;

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Parses trades and tags each with `account_id` and `phase_id`.
pub fn parse_trades(
    content: &str,
    account_id: &str,
    phase_id: Option<PhaseId>,
) -> Result<Vec<Trade>, PropEvalError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut trades = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let record_no = idx as u64 + 1;
        let fail = |reason: String| PropEvalError::TradeImport {
            record: record_no,
            reason,
        };
        let record = result.map_err(|e| fail(format!("CSV parse error: {e}")))?;
        let field = |i: usize, name: &str| {
            record
                .get(i)
                .ok_or_else(|| fail(format!("missing {name} column")))
        };

        let id = field(0, "id")?;
        if id.is_empty() {
            return Err(fail("empty trade id".into()));
        }
        let pnl: f64 = field(1, "pnl")?
            .parse()
            .map_err(|e| fail(format!("invalid pnl value: {e}")))?;
        let commission: f64 = match field(2, "commission")? {
            "" => 0.0,
            raw => raw
                .parse()
                .map_err(|e| fail(format!("invalid commission value: {e}")))?,
        };
        let entry_raw = field(3, "entry_time")?;
        let entry_time =
            parse_time(entry_raw).ok_or_else(|| fail(format!("invalid entry_time '{entry_raw}'")))?;
        let close_raw = field(4, "close_time")?;
        let close_time =
            parse_time(close_raw).ok_or_else(|| fail(format!("invalid close_time '{close_raw}'")))?;

        trades.push(Trade {
            id: id.to_string(),
            account_id: account_id.to_string(),
            phase_id,
            pnl,
            commission,
            entry_time,
            close_time,
        });
    }

    Ok(trades)
}

pub fn read_trades<P: AsRef<Path>>(
    path: P,
    account_id: &str,
    phase_id: Option<PhaseId>,
) -> Result<Vec<Trade>, PropEvalError> {
    let content = fs::read_to_string(path)?;
    parse_trades(&content, account_id, phase_id)
}
