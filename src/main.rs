#![allow(missing_docs)]

//! mysql-manager entry point.
//!
//! Parses flags, sets up logging, opens one connection and hands the
//! requested actions to the dispatcher. Exits 1 when no action was
//! requested and 0 otherwise; action failures are only logged.

use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use mysql_manager::cli::Cli;
use mysql_manager::config::{resolve_settings, ConnectionConfig};
use mysql_manager::db::mysql::MySqlDatabase;
use mysql_manager::dispatch;
use mysql_manager::logging;
use mysql_manager::shutdown::Shutdown;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let plan = cli.action_plan();
    if plan.is_empty() {
        println!("No action specified");
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    }

    let settings = match resolve_settings(cli.settings.as_deref()).and_then(|mut settings| {
        cli.apply_overrides(&mut settings);
        settings.validate()?;
        Ok(settings)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("mysql-manager: {e:#}");
            return ExitCode::from(1);
        }
    };

    let _logging_guard = match logging::init(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("mysql-manager: {e:#}");
            return ExitCode::from(1);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), dry_run = cli.dry_run, "mysql-manager starting");

    let mut db = match connect(&settings).await {
        Ok(db) => db,
        Err(e) => {
            error!(fatal = true, error = ?e, "{e:#}");
            return ExitCode::from(1);
        }
    };

    let shutdown = Shutdown::listen_for_ctrl_c();
    let report = dispatch::run(&mut db, &plan, cli.dry_run, &shutdown).await;
    info!(
        actions = report.outcomes.len(),
        interrupted = report.interrupted,
        "mysql-manager finished"
    );

    ExitCode::SUCCESS
}

async fn connect(settings: &mysql_manager::config::Settings) -> anyhow::Result<MySqlDatabase> {
    let config = ConnectionConfig::from_dsn(
        &settings.database.dsn,
        settings.database.username.as_deref(),
        settings.database.password.as_deref(),
    )?;
    MySqlDatabase::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))
}
