//! Command-line surface.
//!
//! Flags are namespaced per action (`--kill:user`, `--db:dsn`, ...). Each
//! action's flags are folded into one immutable option struct; nothing
//! else reads the parsed arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::dispatch::ActionPlan;
use crate::kill::KillCriteria;
use crate::pattern::Pattern;
use crate::reconcile::{ReconcileOptions, DEFAULT_CONFIG_PATH, DEFAULT_GROUPS};
use crate::replication::{ErrorClock, RecoveryOptions};

/// Perform routine maintenance on a live MySQL server.
#[derive(Debug, Parser)]
#[command(name = "mysql-manager", version, about)]
pub struct Cli {
    /// Kill queries based on the --kill:* criteria.
    #[arg(long = "kill")]
    pub kill: bool,

    /// Kill queries that have been running for more than TIME seconds.
    #[arg(long = "kill:max-query-time", value_name = "TIME", default_value_t = -1, allow_negative_numbers = true)]
    pub kill_max_query_time: i64,

    /// Kill queries matching USER (repeatable; /regex/ or exact).
    #[arg(long = "kill:user", value_name = "USER")]
    pub kill_user: Vec<Pattern>,

    /// Kill queries matching HOST (repeatable; /regex/ or exact).
    #[arg(long = "kill:host", value_name = "HOST")]
    pub kill_host: Vec<Pattern>,

    /// Kill queries matching SQL (repeatable; /regex/ or exact).
    #[arg(long = "kill:query", value_name = "SQL")]
    pub kill_query: Vec<Pattern>,

    /// Kill queries matching COMMAND (repeatable; /regex/ or exact).
    #[arg(long = "kill:command", value_name = "COMMAND")]
    pub kill_command: Vec<Pattern>,

    /// Kill queries matching STATE (repeatable; /regex/ or exact).
    #[arg(long = "kill:state", value_name = "STATE")]
    pub kill_state: Vec<Pattern>,

    /// Kill queries matching DB (repeatable; /regex/ or exact).
    #[arg(long = "kill:db", value_name = "DB")]
    pub kill_db: Vec<Pattern>,

    /// Skip replication errors until a stop condition is met.
    #[arg(long = "skip-replication-errors")]
    pub skip_replication_errors: bool,

    /// Stop after encountering NUMBER errors (-1: unlimited).
    #[arg(long = "skip-replication-errors:max-errors", value_name = "NUMBER", default_value_t = -1, allow_negative_numbers = true)]
    pub max_errors: i64,

    /// Stop once SECONDS have passed since the last error (-1: unlimited).
    #[arg(long = "skip-replication-errors:max-error-duration", value_name = "SECONDS", default_value_t = -1, allow_negative_numbers = true)]
    pub max_error_duration: i64,

    /// Stop once replication has been healthy for SECONDS (-1: never).
    #[arg(long = "skip-replication-errors:min-healthy-duration", value_name = "SECONDS", default_value_t = -1, allow_negative_numbers = true)]
    pub min_healthy_duration: i64,

    /// Log replication status at most every SECONDS.
    #[arg(long = "skip-replication-errors:log-frequency", value_name = "SECONDS", default_value_t = 10)]
    pub log_frequency: u64,

    /// Measure --skip-replication-errors:max-error-duration from start-up
    /// until the first error, instead of treating it as zero.
    #[arg(long = "skip-replication-errors:error-duration-from-start")]
    pub error_duration_from_start: bool,

    /// Issue SET GLOBAL for each server variable in the option file.
    #[arg(long = "reload-my-cnf")]
    pub reload_my_cnf: bool,

    /// Option file to reload.
    #[arg(long = "reload-my-cnf:config", value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub reload_config: PathBuf,

    /// Additional option-file GROUP to reload (repeatable).
    #[arg(long = "reload-my-cnf:groups", value_name = "GROUP")]
    pub reload_groups: Vec<String>,

    /// DSN to connect to (mysql:// URL or DBI:Mysql:db:host[:port]).
    #[arg(long = "db:dsn", value_name = "DSN")]
    pub db_dsn: Option<String>,

    /// Username for the connection.
    #[arg(long = "db:username", value_name = "USERNAME")]
    pub db_username: Option<String>,

    /// Password for the connection.
    #[arg(long = "db:password", value_name = "PASSWORD")]
    pub db_password: Option<String>,

    /// Logging level (trace, debug, info, warn, error, fatal).
    #[arg(long = "log:level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write logs to FILE.YYYY-MM-DD (rotated daily) instead of stderr.
    #[arg(long = "log:file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Append to --log:file itself instead of rotating daily.
    #[arg(long = "log:no-rotate")]
    pub log_no_rotate: bool,

    /// Keep DAYS rotated log files.
    #[arg(long = "log:age", value_name = "DAYS")]
    pub log_age: Option<usize>,

    /// Do not run statements which change the state of the server.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Settings file (TOML) with connection and logging defaults.
    #[arg(long = "settings", value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

impl Cli {
    /// Kill criteria, when `--kill` was given.
    pub fn kill_criteria(&self) -> Option<KillCriteria> {
        self.kill.then(|| KillCriteria {
            max_query_time: self.kill_max_query_time,
            user: self.kill_user.clone(),
            host: self.kill_host.clone(),
            query: self.kill_query.clone(),
            command: self.kill_command.clone(),
            state: self.kill_state.clone(),
            db: self.kill_db.clone(),
        })
    }

    /// Recovery limits, when `--skip-replication-errors` was given.
    pub fn recovery_options(&self) -> Option<RecoveryOptions> {
        self.skip_replication_errors.then(|| RecoveryOptions {
            max_errors: self.max_errors,
            max_error_duration: self.max_error_duration,
            min_healthy_duration: self.min_healthy_duration,
            log_frequency: self.log_frequency,
            error_clock: if self.error_duration_from_start {
                ErrorClock::FromLoopStart
            } else {
                ErrorClock::FromFirstError
            },
        })
    }

    /// Reconciliation options, when `--reload-my-cnf` was given. Extra
    /// groups are appended to the server's default groups.
    pub fn reconcile_options(&self) -> Option<ReconcileOptions> {
        self.reload_my_cnf.then(|| {
            let mut groups: Vec<String> = DEFAULT_GROUPS.iter().map(|g| (*g).to_owned()).collect();
            for group in &self.reload_groups {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
            ReconcileOptions {
                config: self.reload_config.clone(),
                groups,
            }
        })
    }

    /// All requested actions.
    pub fn action_plan(&self) -> ActionPlan {
        ActionPlan::new(
            self.kill_criteria(),
            self.recovery_options(),
            self.reconcile_options(),
        )
    }

    /// Layer command-line overrides onto loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(dsn) = &self.db_dsn {
            dsn.clone_into(&mut settings.database.dsn);
        }
        if let Some(username) = &self.db_username {
            settings.database.username = Some(username.clone());
        }
        if let Some(password) = &self.db_password {
            settings.database.password = Some(password.clone());
        }
        if let Some(level) = &self.log_level {
            level.clone_into(&mut settings.logging.level);
        }
        if let Some(file) = &self.log_file {
            settings.logging.file = Some(file.clone());
        }
        if let Some(age) = self.log_age {
            settings.logging.age = age;
        }
        if self.log_no_rotate {
            settings.logging.rotate = false;
        }
    }
}
