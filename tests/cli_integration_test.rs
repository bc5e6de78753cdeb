//! CLI integration tests: INI loading and the sqlite-backed commands run
//! against real files on disk.

#![cfg(feature = "sqlite")]

use propeval::adapters::file_config_adapter::FileConfigAdapter;
use propeval::adapters::sqlite_store::SqliteStore;
use propeval::cli::{self, Cli, Command};
use propeval::domain::account::{AccountStatus, EvaluationType};
use propeval::domain::error::PropEvalError;
use propeval::domain::phase::PhaseType;
use propeval::domain::risk_metrics::RiskMetrics;
use propeval::domain::score::{ScoreInputs, calculate_zella_score};
use propeval::ports::account_store::AccountStore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn account_ini(db: &Path, id: &str, evaluation_type: &str) -> String {
    format!(
        r#"
[sqlite]
path = {}
pool_size = 2

[evaluation]
breach_priority = max_first

[account]
id = {id}
user_id = trader-1
account_number = 5500{id}
starting_balance = 50000
evaluation_type = {evaluation_type}
drawdown_type = absolute
daily_drawdown_amount = 2500
max_drawdown_amount = 5000
max_drawdown_mode = static
profit_split_percent = 80
payout_cycle_days = 14
min_days_to_first_payout = 4
profit_target = 4000
"#,
        db.display()
    )
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("propeval.db")
    }

    fn config(&self, id: &str, evaluation_type: &str) -> PathBuf {
        let path = self.dir.path().join(format!("{id}.ini"));
        fs::write(&path, account_ini(&self.db(), id, evaluation_type)).unwrap();
        path
    }

    fn trades(&self, name: &str, rows: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut content = String::from("id,pnl,commission,entry_time,close_time\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn store(&self, config: &Path) -> SqliteStore {
        let adapter = FileConfigAdapter::from_file(config).unwrap();
        SqliteStore::from_config(&adapter).unwrap()
    }
}

fn run(command: Command) {
    let _ = cli::run(Cli { command });
}

mod config_loading {
    use super::*;

    #[test]
    fn load_account_accepts_valid_section() {
        let ini = write_temp_ini(&account_ini(Path::new("/tmp/unused.db"), "A", "two_step"));
        let config = cli::load_config(&ini.path().to_path_buf()).unwrap();
        let account = cli::load_account(&config).unwrap();
        assert_eq!(account.id, "A");
        assert_eq!(account.user_id, "trader-1");
        assert_eq!(account.evaluation_type, EvaluationType::TwoStep);
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[test]
    fn load_account_reports_every_violation() {
        let ini = write_temp_ini(
            "[account]\nid = A\nstarting_balance = -5\nprofit_split_percent = 150\n",
        );
        let config = cli::load_config(&ini.path().to_path_buf()).unwrap();
        let err = cli::load_account(&config).unwrap_err();
        match err {
            PropEvalError::ConfigInvalid { reason, .. } => {
                assert!(reason.contains("Account number is required"));
                assert!(reason.contains("Starting balance must be greater than 0"));
                assert!(reason.contains("Profit split must be between 0 and 100"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_config_missing_file_is_parse_error() {
        let err = cli::load_config(&PathBuf::from("/nonexistent/propeval.ini")).unwrap_err();
        assert!(matches!(err, PropEvalError::ConfigParse { .. }));
    }

    #[test]
    fn store_requires_sqlite_path() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\npool_size = 2\n").unwrap();
        let err = SqliteStore::from_config(&adapter).err().unwrap();
        assert!(matches!(err, PropEvalError::ConfigMissing { key, .. } if key == "path"));
    }
}

mod commands {
    use super::*;

    #[test]
    fn seed_import_evaluate_one_step_to_funded() {
        let ws = Workspace::new();
        let config = ws.config("A", "one_step");
        run(Command::InitDb {
            config: config.clone(),
        });
        run(Command::Seed {
            config: config.clone(),
        });

        let store = ws.store(&config);
        let phase = store.load_active_phase("A").unwrap().unwrap();
        assert_eq!(phase.phase_type, PhaseType::Phase1);
        assert_eq!(phase.profit_target, Some(4_000.0));

        let trades = ws.trades(
            "a.csv",
            &[
                "T1,2500,-5,2025-12-01T14:00:00Z,2025-12-01T14:30:00Z",
                "T2,1800,-5,2025-12-02T14:00:00Z,2025-12-02T15:00:00Z",
            ],
        );
        run(Command::ImportTrades {
            config: config.clone(),
            account: "A".into(),
            file: trades,
        });
        assert_eq!(store.load_phase_trades(phase.id).unwrap().len(), 2);

        run(Command::Evaluate {
            config: config.clone(),
            account: Some("A".into()),
            all: false,
        });

        let account = store.load_account("A").unwrap().unwrap();
        assert_eq!(account.status, AccountStatus::Funded);
        let funded = store.load_active_phase("A").unwrap().unwrap();
        assert_eq!(funded.phase_type, PhaseType::Funded);
        assert_eq!(funded.starting_balance, 54_290.0);
    }

    #[test]
    fn evaluate_all_covers_every_active_account() {
        let ws = Workspace::new();
        let config_a = ws.config("A", "two_step");
        let config_b = ws.config("B", "two_step");
        run(Command::InitDb {
            config: config_a.clone(),
        });
        run(Command::Seed {
            config: config_a.clone(),
        });
        run(Command::Seed {
            config: config_b.clone(),
        });

        let losing = ws.trades("b.csv", &["L1,-3000,0,2025-12-01 10:00:00,2025-12-01 11:00:00"]);
        run(Command::ImportTrades {
            config: config_b.clone(),
            account: "B".into(),
            file: losing,
        });

        run(Command::Evaluate {
            config: config_a.clone(),
            account: None,
            all: true,
        });

        let store = ws.store(&config_a);
        assert_eq!(
            store.load_account("A").unwrap().unwrap().status,
            AccountStatus::Active
        );
        assert_eq!(
            store.load_account("B").unwrap().unwrap().status,
            AccountStatus::Failed
        );
        assert_eq!(
            store.account_ids_with_status(AccountStatus::Active).unwrap(),
            vec!["A".to_string()]
        );
    }

    #[test]
    fn seeding_twice_keeps_one_account() {
        let ws = Workspace::new();
        let config = ws.config("A", "two_step");
        run(Command::InitDb {
            config: config.clone(),
        });
        run(Command::Seed {
            config: config.clone(),
        });
        run(Command::Seed {
            config: config.clone(),
        });

        let store = ws.store(&config);
        assert_eq!(store.load_phases("A").unwrap().len(), 1);
    }

    #[test]
    fn shared_trade_ids_stay_with_their_account() {
        let ws = Workspace::new();
        let config_a = ws.config("A", "two_step");
        let config_b = ws.config("B", "two_step");
        run(Command::InitDb {
            config: config_a.clone(),
        });
        run(Command::Seed {
            config: config_a.clone(),
        });
        run(Command::Seed {
            config: config_b.clone(),
        });

        let a_trades = ws.trades("a.csv", &["1,4500,0,2025-12-01T14:00:00Z,2025-12-01T15:00:00Z"]);
        run(Command::ImportTrades {
            config: config_a.clone(),
            account: "A".into(),
            file: a_trades,
        });
        run(Command::Evaluate {
            config: config_a.clone(),
            account: Some("A".into()),
            all: false,
        });

        let b_trades = ws.trades("b.csv", &["1,-100,0,2025-12-02T14:00:00Z,2025-12-02T15:00:00Z"]);
        run(Command::ImportTrades {
            config: config_b.clone(),
            account: "B".into(),
            file: b_trades,
        });

        let store = ws.store(&config_a);
        let a_phase = &store.load_phases("A").unwrap()[0];
        let b_phase = store.load_active_phase("B").unwrap().unwrap();
        let a_history = store.load_phase_trades(a_phase.id).unwrap();
        assert_eq!(a_history.len(), 1);
        assert_eq!(a_history[0].pnl, 4_500.0);
        assert_eq!(store.load_phase_trades(b_phase.id).unwrap().len(), 1);
    }

    #[test]
    fn reimport_after_funding_leaves_passed_phase_intact() {
        let ws = Workspace::new();
        let config = ws.config("A", "one_step");
        run(Command::InitDb {
            config: config.clone(),
        });
        run(Command::Seed {
            config: config.clone(),
        });
        let export = ws.trades("a.csv", &["1,4500,0,2025-12-01T14:00:00Z,2025-12-01T15:00:00Z"]);
        run(Command::ImportTrades {
            config: config.clone(),
            account: "A".into(),
            file: export.clone(),
        });
        run(Command::Evaluate {
            config: config.clone(),
            account: Some("A".into()),
            all: false,
        });
        run(Command::ImportTrades {
            config: config.clone(),
            account: "A".into(),
            file: export,
        });

        let store = ws.store(&config);
        let phases = store.load_phases("A").unwrap();
        assert_eq!(phases.len(), 2);
        let (passed, funded) = (&phases[0], &phases[1]);
        assert_eq!(funded.phase_type, PhaseType::Funded);
        assert_eq!(store.load_phase_trades(passed.id).unwrap().len(), 1);
        assert!(store.load_phase_trades(funded.id).unwrap().is_empty());
    }

    #[test]
    fn provision_phase2_after_pass() {
        let ws = Workspace::new();
        let config = ws.config("A", "two_step");
        run(Command::InitDb {
            config: config.clone(),
        });
        run(Command::Seed {
            config: config.clone(),
        });
        let trades = ws.trades("a.csv", &["W1,4500,0,2025-12-01T14:00:00Z,2025-12-01T15:00:00Z"]);
        run(Command::ImportTrades {
            config: config.clone(),
            account: "A".into(),
            file: trades,
        });
        run(Command::Evaluate {
            config: config.clone(),
            account: Some("A".into()),
            all: false,
        });
        run(Command::ProvisionPhase2 {
            config: config.clone(),
            account: "A".into(),
            new_id: "A-P2".into(),
            account_number: None,
            profit_target: None,
        });

        let store = ws.store(&config);
        assert_eq!(
            store.load_account("A").unwrap().unwrap().status,
            AccountStatus::Passed
        );
        let p2 = store.load_account("A-P2").unwrap().unwrap();
        assert_eq!(p2.previous_account_id.as_deref(), Some("A"));
        assert_eq!(p2.starting_balance, 54_500.0);
        let phase = store.load_active_phase("A-P2").unwrap().unwrap();
        assert_eq!(phase.phase_type, PhaseType::Phase2);
        assert_eq!(phase.profit_target, Some(2_500.0));
    }
}

mod report {
    use super::*;

    #[test]
    fn report_lists_headline_figures() {
        let metrics = RiskMetrics {
            total_trades: 4,
            win_rate: 0.5,
            profit_factor: 2.2,
            ..RiskMetrics::default()
        };
        let score = calculate_zella_score(&ScoreInputs::default());
        let text = cli::format_report(&metrics, &score);
        assert!(text.contains("trades:           4"));
        assert!(text.contains("win rate:         50.00%"));
        assert!(text.contains("profit factor:    2.20"));
        assert!(text.lines().last().unwrap().starts_with("score:"));
    }
}
