//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::account::Account;
use crate::domain::config_validation::{build_account, validate_account_config};
use crate::domain::error::PropEvalError;
use crate::domain::risk_metrics::RiskMetrics;
use crate::domain::score::PerformanceScore;

#[derive(Parser, Debug)]
#[command(name = "propeval", about = "Prop-firm account evaluation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one account, or every active account
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, required_unless_present = "all")]
        account: Option<String>,
        #[arg(long, conflicts_with = "account")]
        all: bool,
    },
    /// Validate the [account] section of a config file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the [account] from the config file with its first phase
    Seed {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import round-trip trades from CSV into the account's active phase
    ImportTrades {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        account: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Open the phase-2 account for a passed phase-1 account
    ProvisionPhase2 {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        new_id: String,
        #[arg(long)]
        account_number: Option<String>,
        #[arg(long)]
        profit_target: Option<f64>,
    },
    /// Show payout eligibility, or request a payout with --amount
    Payout {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        amount: Option<f64>,
    },
    /// Show risk metrics and performance score for the active phase
    Score {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        account: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Validate { config } => run_validate(&config),
        #[cfg(feature = "sqlite")]
        command => store_commands::run(command),
        #[cfg(not(feature = "sqlite"))]
        _ => {
            eprintln!("error: sqlite feature is required for this command");
            return ExitCode::from(1);
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, PropEvalError> {
    let config = FileConfigAdapter::from_file(path)?;
    debug!(source = config.source(), "config loaded");
    Ok(config)
}

/// Builds the `[account]` section and rejects it when any check fails.
pub fn load_account(config: &FileConfigAdapter) -> Result<Account, PropEvalError> {
    let account = build_account(config)?;
    let errors = validate_account_config(&account);
    if errors.is_empty() {
        return Ok(account);
    }
    Err(PropEvalError::ConfigInvalid {
        section: "account".into(),
        key: account.id,
        reason: errors.join("; "),
    })
}

fn run_validate(config_path: &PathBuf) -> Result<(), PropEvalError> {
    eprintln!("Validating account config: {}", config_path.display());
    let config = load_config(config_path)?;
    let account = load_account(&config)?;

    eprintln!("\nAccount {} ({})", account.id, account.account_number);
    eprintln!("  starting balance: {:.2}", account.starting_balance);
    eprintln!("  evaluation:       {}", account.evaluation_type.as_str());
    eprintln!(
        "  drawdown:         {} daily {} / max {} ({})",
        account.drawdown.kind.as_str(),
        account.drawdown.daily_amount,
        account.drawdown.max_amount,
        account.drawdown.max_mode.as_str()
    );
    eprintln!(
        "  payout:           {}% split, {} day cycle",
        account.payout.profit_split_percent, account.payout.payout_cycle_days
    );
    eprintln!("\nAccount configuration is valid.");
    Ok(())
}

pub fn format_report(metrics: &RiskMetrics, score: &PerformanceScore) -> String {
    let mut out = String::new();
    out.push_str(&format!("trades:           {}\n", metrics.total_trades));
    out.push_str(&format!(
        "win rate:         {:.2}%\n",
        metrics.win_rate * 100.0
    ));
    out.push_str(&format!("avg win:          {:.2}\n", metrics.avg_win));
    out.push_str(&format!("avg loss:         {:.2}\n", metrics.avg_loss));
    out.push_str(&format!("profit factor:    {:.2}\n", metrics.profit_factor));
    out.push_str(&format!("net pnl:          {:.2}\n", metrics.net_pnl));
    out.push_str(&format!("expectancy:       {:.2}\n", metrics.expectancy));
    out.push_str(&format!("current streak:   {}\n", metrics.current_streak));
    out.push_str(&format!("score:            {:.2}\n", score.overall));
    out
}

#[cfg(feature = "sqlite")]
mod store_commands {
    use super::*;
    use chrono::Utc;
    use tracing::warn;

    use crate::adapters::csv_trades::read_trades;
    use crate::adapters::sqlite_store::SqliteStore;
    use crate::domain::account::AccountStatus;
    use crate::domain::config_validation::{breach_priority, configured_profit_target};
    use crate::domain::evaluation::{Evaluator, Phase2Request};
    use crate::domain::phase::{NewPhase, PhaseType};
    use crate::domain::progression::get_default_profit_target;
    use crate::ports::account_store::AccountStore;

    fn open_evaluator(config: &FileConfigAdapter) -> Result<Evaluator<SqliteStore>, PropEvalError> {
        let store = SqliteStore::from_config(config)?;
        Ok(Evaluator::new(store).with_priority(breach_priority(config)?))
    }

    pub(super) fn run(command: Command) -> Result<(), PropEvalError> {
        match command {
            Command::Validate { config } => run_validate(&config),
            Command::Evaluate {
                config,
                account,
                all,
            } => run_evaluate(&config, account.as_deref(), all),
            Command::InitDb { config } => run_init_db(&config),
            Command::Seed { config } => run_seed(&config),
            Command::ImportTrades {
                config,
                account,
                file,
            } => run_import_trades(&config, &account, &file),
            Command::ProvisionPhase2 {
                config,
                account,
                new_id,
                account_number,
                profit_target,
            } => run_provision_phase2(
                &config,
                &account,
                Phase2Request {
                    new_account_id: new_id,
                    account_number,
                    profit_target,
                },
            ),
            Command::Payout {
                config,
                account,
                amount,
            } => run_payout(&config, &account, amount),
            Command::Score { config, account } => run_score(&config, &account),
        }
    }

    fn run_evaluate(
        config_path: &PathBuf,
        account: Option<&str>,
        all: bool,
    ) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let evaluator = open_evaluator(&config)?;

        let ids = match account {
            Some(id) if !all => vec![id.to_string()],
            _ => evaluator
                .store()
                .account_ids_with_status(AccountStatus::Active)?,
        };
        if ids.is_empty() {
            eprintln!("No active accounts to evaluate");
            return Ok(());
        }

        let mut last_error = None;
        for id in &ids {
            match evaluator.evaluate_account(id) {
                Ok(outcome) => match outcome.failure_reason {
                    Some(reason) => println!(
                        "{id}\t{}\t{} {:.2} > {:.2}",
                        outcome.state,
                        reason.breach_type.as_str(),
                        reason.amount,
                        reason.threshold
                    ),
                    None => println!("{id}\t{}", outcome.state),
                },
                Err(e) if ids.len() > 1 => {
                    warn!(account_id = id.as_str(), error = %e, "evaluation failed");
                    eprintln!("warning: skipping {id} ({e})");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    fn run_init_db(config_path: &PathBuf) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        SqliteStore::from_config(&config)?.initialize_schema()?;
        eprintln!("Database schema initialized");
        Ok(())
    }

    fn run_seed(config_path: &PathBuf) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let account = load_account(&config)?;
        let store = SqliteStore::from_config(&config)?;

        let configured = configured_profit_target(&config);
        if configured.is_some_and(|t| !t.is_finite() || t <= 0.0) {
            return Err(PropEvalError::ConfigInvalid {
                section: "account".into(),
                key: "profit_target".into(),
                reason: "must be a positive number".into(),
            });
        }
        let profit_target = configured.or_else(|| {
            get_default_profit_target(
                PhaseType::Phase1,
                account.starting_balance,
                account.evaluation_type,
            )
        });
        let phase = store.create_account(
            &account,
            &NewPhase {
                phase_type: PhaseType::Phase1,
                profit_target,
                starting_balance: account.starting_balance,
                phase_start_at: Utc::now(),
            },
        )?;

        println!("{}\tphase {}\t{}", account.id, phase.id, phase.phase_type.as_str());
        Ok(())
    }

    fn run_import_trades(
        config_path: &PathBuf,
        account_id: &str,
        file: &PathBuf,
    ) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let store = SqliteStore::from_config(&config)?;
        let phase = store
            .load_active_phase(account_id)?
            .ok_or_else(|| PropEvalError::NoActivePhase {
                account_id: account_id.to_string(),
            })?;

        eprintln!("Reading trades from {}", file.display());
        let trades = read_trades(file, account_id, Some(phase.id))?;
        let inserted = store.insert_trades(&trades)?;
        eprintln!(
            "{inserted} new trades linked to phase {} ({}), {} already on file",
            phase.id,
            phase.phase_type.as_str(),
            trades.len() - inserted
        );
        Ok(())
    }

    fn run_provision_phase2(
        config_path: &PathBuf,
        account_id: &str,
        request: Phase2Request,
    ) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let evaluator = open_evaluator(&config)?;
        let (account, phase) = evaluator.provision_phase2(account_id, &request, Utc::now())?;
        println!(
            "{}\tphase {}\tstarting balance {:.2}\ttarget {}",
            account.id,
            phase.id,
            phase.starting_balance,
            phase
                .profit_target
                .map_or_else(|| "-".to_string(), |t| format!("{t:.2}"))
        );
        Ok(())
    }

    fn run_payout(
        config_path: &PathBuf,
        account_id: &str,
        amount: Option<f64>,
    ) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let evaluator = open_evaluator(&config)?;
        let now = Utc::now();

        let Some(amount) = amount else {
            let eligibility = evaluator.payout_eligibility(account_id, now)?;
            if eligibility.is_eligible {
                println!("eligible\tmax {:.2}", eligibility.max_payout_amount);
            } else {
                println!(
                    "not eligible\t{} day(s) remaining",
                    eligibility.days_until_eligible
                );
                for blocker in &eligibility.blockers {
                    println!("  - {blocker}");
                }
            }
            return Ok(());
        };

        let record = evaluator.request_payout(account_id, amount, now)?;
        println!(
            "paid {:.2}\tgross {:.2}\tbalance {:.2} -> {:.2}",
            record.amount, record.gross_amount, record.balance_before, record.balance_after
        );
        Ok(())
    }

    fn run_score(config_path: &PathBuf, account_id: &str) -> Result<(), PropEvalError> {
        let config = load_config(config_path)?;
        let evaluator = open_evaluator(&config)?;
        let (metrics, score) = evaluator.account_report(account_id)?;
        print!("{}", format_report(&metrics, &score));
        Ok(())
    }
}
