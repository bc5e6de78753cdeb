use clap::Parser;
use propeval::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    init_tracing();
    run(Cli::parse())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
