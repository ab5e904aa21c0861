//! Replication error recovery.
//!
//! Polls `SHOW SLAVE STATUS` and reacts to each sample:
//!
//! - **broken** (lag is `NULL`): skip the offending event and restart the
//!   replica threads;
//! - **lagging**: report progress and a linear time-to-catch-up estimate,
//!   then wait [`LAG_POLL_INTERVAL`] before the next sample;
//! - **caught up**: once replication has stayed caught up for the health
//!   window, stop.
//!
//! The error budget and the error-duration budget are checked before every
//! sample.

pub mod session;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::db::{Database, DbError};
use crate::error::ManagerError;
use crate::shutdown::Shutdown;

pub use session::{
    CatchUpEstimate, ErrorClock, RecoverySession, ReplicationSample, ReplicationState,
};

/// Pause between samples while the replica is lagging.
pub const LAG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Replica status statement.
pub const STATUS_STATEMENT: &str = "SHOW SLAVE STATUS";

/// Statement skipping the event that stopped the SQL thread.
pub const SKIP_STATEMENT: &str = "SET GLOBAL SQL_SLAVE_SKIP_COUNTER = 1";

/// Statement restarting the replica threads.
pub const START_STATEMENT: &str = "START SLAVE";

/// Limits for one recovery run. Negative values disable a limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Stop after skipping this many errors.
    pub max_errors: i64,
    /// Stop once this many seconds have passed since the last error.
    pub max_error_duration: i64,
    /// Stop once replication has stayed caught up this many seconds.
    pub min_healthy_duration: i64,
    /// Minimum seconds between status lines.
    pub log_frequency: u64,
    /// Baseline for the error-duration budget before any error.
    pub error_clock: ErrorClock,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_errors: -1,
            max_error_duration: -1,
            min_healthy_duration: -1,
            log_frequency: 10,
            error_clock: ErrorClock::default(),
        }
    }
}

impl RecoveryOptions {
    /// Error budget, if configured.
    pub fn error_budget(&self) -> Option<u64> {
        u64::try_from(self.max_errors).ok()
    }

    /// Error-duration budget, if configured.
    pub fn error_duration_limit(&self) -> Option<Duration> {
        u64::try_from(self.max_error_duration)
            .ok()
            .map(Duration::from_secs)
    }

    /// Health window, if configured.
    pub fn health_window(&self) -> Option<Duration> {
        u64::try_from(self.min_healthy_duration)
            .ok()
            .map(Duration::from_secs)
    }

    fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_frequency)
    }
}

/// Why the recovery loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Replication stayed caught up for the health window.
    Healthy,
    /// The error budget was used up.
    ErrorBudgetExhausted,
    /// Too long since the last error.
    ErrorDurationExceeded,
    /// The operator stopped the loop.
    Interrupted,
    /// A statement failed; the loop gave up.
    DriverError(DbError),
}

/// Summary of one recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Why the loop stopped.
    pub outcome: RecoveryOutcome,
    /// Errors skipped.
    pub errors: u64,
    /// Status samples taken.
    pub samples: u64,
    /// Wall-clock duration of the loop.
    pub elapsed: Duration,
}

/// Watch replication, skipping errors until one of the configured limits
/// stops the loop.
///
/// A failing statement ends the loop with [`RecoveryOutcome::DriverError`]
/// after logging the driver's code and message; an operator interrupt ends
/// it with [`RecoveryOutcome::Interrupted`]. In dry-run mode no skip or
/// restart is sent, but every decision is logged.
///
/// # Errors
///
/// Returns [`ManagerError::NotReplica`] if the server reports no replica
/// status at all.
pub async fn recover_replication(
    db: &mut dyn Database,
    options: &RecoveryOptions,
    dry_run: bool,
    shutdown: &Shutdown,
) -> Result<RecoveryReport, ManagerError> {
    let mut shutdown = shutdown.clone();
    let mut session = RecoverySession::new(Instant::now());
    let mut samples: u64 = 0;

    let outcome = loop {
        if shutdown.is_triggered() {
            info!("Aborted by user");
            break RecoveryOutcome::Interrupted;
        }

        let now = Instant::now();
        if let Some(budget) = options.error_budget() {
            if session.errors() >= budget {
                info!(errors = session.errors(), "error budget exhausted");
                break RecoveryOutcome::ErrorBudgetExhausted;
            }
        }
        if let Some(limit) = options.error_duration_limit() {
            let since = session.since_last_error(now, options.error_clock);
            if since >= limit {
                info!(
                    seconds = since.as_secs_f64(),
                    "error duration window exceeded"
                );
                break RecoveryOutcome::ErrorDurationExceeded;
            }
        }

        let rows = match db.query(STATUS_STATEMENT).await {
            Ok(rows) => rows,
            Err(e) => break driver_failure(e),
        };
        samples = samples.saturating_add(1);
        let Some(row) = rows.first() else {
            return Err(ManagerError::NotReplica);
        };
        let sample = ReplicationSample::from_row(row);
        let now = Instant::now();

        match sample.state() {
            ReplicationState::Broken => {
                info!("replication broken");
                info!("last error: {}", sample.last_error);
                if !dry_run {
                    if let Err(e) = restart_past_error(db).await {
                        break driver_failure(e);
                    }
                }
                session.record_error(now);
            }
            ReplicationState::CaughtUp => {
                let healthy_for = session.record_caught_up(now);
                if session.take_log_slot(now, options.log_interval()) {
                    info!("fully caught up with master");
                }
                if options
                    .health_window()
                    .is_some_and(|window| healthy_for >= window)
                {
                    info!("satisfied health duration window");
                    break RecoveryOutcome::Healthy;
                }
            }
            ReplicationState::Lagging(seconds_behind) => {
                let estimate = session.record_lag(now, seconds_behind);
                if session.take_log_slot(now, options.log_interval()) {
                    let since = session.since_last_error(now, options.error_clock);
                    info!(
                        "{:?} seconds behind master; {:?} seconds caught up; {:.2} seconds/second; {} left; {} errors; last error {:.2} seconds ago",
                        estimate.seconds_behind,
                        estimate.caught_up,
                        estimate.rate,
                        estimate.time_left(),
                        session.errors(),
                        since.as_secs_f64(),
                    );
                }

                tokio::select! {
                    () = tokio::time::sleep(LAG_POLL_INTERVAL) => {}
                    () = shutdown.triggered() => {
                        info!("Aborted by user");
                        break RecoveryOutcome::Interrupted;
                    }
                }
            }
        }
    };

    let report = RecoveryReport {
        outcome,
        errors: session.errors(),
        samples,
        elapsed: session.elapsed(Instant::now()),
    };
    debug!(
        outcome = ?report.outcome,
        errors = report.errors,
        samples = report.samples,
        "replication recovery finished"
    );
    Ok(report)
}

/// Skip the failing event and restart the replica threads.
async fn restart_past_error(db: &mut dyn Database) -> Result<(), DbError> {
    db.execute(SKIP_STATEMENT).await?;
    db.execute(START_STATEMENT).await
}

fn driver_failure(e: DbError) -> RecoveryOutcome {
    error!(code = %e.code_or_unknown(), "Error code: {}: {}", e.code_or_unknown(), e.message);
    RecoveryOutcome::DriverError(e)
}
