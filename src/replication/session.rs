//! Per-run state of the replication recovery loop.
//!
//! [`RecoverySession`] is the only mutable state in the recovery loop. It
//! tracks the error budget, the health window and the catch-up rate; the
//! loop itself only classifies samples and talks to the server.

use std::time::Duration;

use tokio::time::Instant;

use crate::db::Row;

/// Columns holding the replica lag, newest name last.
const LAG_COLUMNS: [&str; 2] = ["Seconds_Behind_Master", "Seconds_Behind_Source"];

/// Columns holding the error that stopped the SQL thread.
const ERROR_COLUMNS: [&str; 2] = ["Last_Error", "Last_SQL_Error"];

/// Classification of one status sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplicationState {
    /// Lag is `NULL`: a replication thread stopped on an error.
    Broken,
    /// Zero lag.
    CaughtUp,
    /// Positive lag, in seconds.
    Lagging(f64),
}

/// One `SHOW SLAVE STATUS` observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationSample {
    /// Seconds behind the source; `None` when replication is broken.
    pub seconds_behind: Option<f64>,
    /// Last error text with control characters removed.
    pub last_error: String,
}

impl ReplicationSample {
    /// Read a sample from a status row.
    ///
    /// A lag that is `NULL` or not a number is treated as broken.
    pub fn from_row(row: &Row) -> Self {
        let seconds_behind = row
            .get_any(&LAG_COLUMNS)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        let last_error = row
            .get_any(&ERROR_COLUMNS)
            .map(strip_control)
            .unwrap_or_default();
        Self {
            seconds_behind,
            last_error,
        }
    }

    /// Classify this sample.
    pub fn state(&self) -> ReplicationState {
        match self.seconds_behind {
            None => ReplicationState::Broken,
            Some(lag) if lag <= 0.0 => ReplicationState::CaughtUp,
            Some(lag) => ReplicationState::Lagging(lag),
        }
    }
}

/// Remove line breaks and other control characters.
pub fn strip_control(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

/// Linear catch-up projection for one lagging sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchUpEstimate {
    /// Current lag in seconds.
    pub seconds_behind: f64,
    /// Lag recovered since the streak's peak.
    pub caught_up: f64,
    /// Seconds of lag recovered per wall-clock second.
    pub rate: f64,
    /// Projected seconds until the lag reaches zero; 0 when not closing.
    pub seconds_left: f64,
}

impl CatchUpEstimate {
    /// Project from the streak's peak lag, the current lag and the time
    /// since the loop started.
    pub fn compute(max_seconds_behind: f64, seconds_behind: f64, elapsed: Duration) -> Self {
        let caught_up = max_seconds_behind - seconds_behind;
        let elapsed = elapsed.as_secs_f64();
        let rate = if elapsed == 0.0 { 1.0 } else { caught_up / elapsed };
        let seconds_left = if rate > 0.0 { seconds_behind / rate } else { 0.0 };
        Self {
            seconds_behind,
            caught_up,
            rate,
            seconds_left,
        }
    }

    /// Remaining time in the largest sensible unit.
    pub fn time_left(&self) -> String {
        format_time_left(self.seconds_left)
    }
}

/// Render seconds as hours above an hour, minutes above a minute, else
/// seconds.
pub fn format_time_left(seconds: f64) -> String {
    if seconds > 3600.0 {
        format!("{:.2} hours", seconds / 3600.0)
    } else if seconds > 60.0 {
        format!("{:.2} mins", seconds / 60.0)
    } else {
        format!("{seconds:.2} secs")
    }
}

/// Where "time since last error" starts before any error has happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorClock {
    /// Zero until the first error.
    #[default]
    FromFirstError,
    /// Counted from loop start until the first error.
    FromLoopStart,
}

/// Mutable accumulator for one recovery run.
#[derive(Debug, Clone)]
pub struct RecoverySession {
    started: Instant,
    errors: u64,
    last_error: Option<Instant>,
    recovered_at: Option<Instant>,
    max_seconds_behind: f64,
    last_log: Option<Instant>,
}

impl RecoverySession {
    /// Start a session at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            errors: 0,
            last_error: None,
            recovered_at: None,
            max_seconds_behind: 0.0,
            last_log: None,
        }
    }

    /// Errors skipped so far.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Peak lag of the current lagging streak.
    pub fn max_seconds_behind(&self) -> f64 {
        self.max_seconds_behind
    }

    /// When the current caught-up streak began.
    pub fn recovered_at(&self) -> Option<Instant> {
        self.recovered_at
    }

    /// Time since the session started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Time since the last skipped error.
    pub fn since_last_error(&self, now: Instant, clock: ErrorClock) -> Duration {
        match (self.last_error, clock) {
            (Some(at), _) => now.saturating_duration_since(at),
            (None, ErrorClock::FromFirstError) => Duration::ZERO,
            (None, ErrorClock::FromLoopStart) => self.elapsed(now),
        }
    }

    /// A broken sample was handled. Resets the lag baseline.
    pub fn record_error(&mut self, now: Instant) {
        self.errors = self.errors.saturating_add(1);
        self.max_seconds_behind = 0.0;
        self.last_error = Some(now);
    }

    /// A caught-up sample. Returns how long replication has been caught up.
    pub fn record_caught_up(&mut self, now: Instant) -> Duration {
        let since = *self.recovered_at.get_or_insert(now);
        now.saturating_duration_since(since)
    }

    /// A lagging sample. Ends any caught-up streak.
    pub fn record_lag(&mut self, now: Instant, seconds_behind: f64) -> CatchUpEstimate {
        self.recovered_at = None;
        self.max_seconds_behind = self.max_seconds_behind.max(seconds_behind);
        CatchUpEstimate::compute(self.max_seconds_behind, seconds_behind, self.elapsed(now))
    }

    /// Whether a status line may be logged now; claims the slot if so.
    pub fn take_log_slot(&mut self, now: Instant, frequency: Duration) -> bool {
        let due = self
            .last_log
            .is_none_or(|last| now.saturating_duration_since(last) > frequency);
        if due {
            self.last_log = Some(now);
        }
        due
    }
}
