//! Match-and-kill over the server's process list.
//!
//! A single `SHOW FULL PROCESSLIST` snapshot is evaluated against the
//! configured criteria. Each field with patterns contributes one verdict;
//! a session is killed only when at least one field was evaluated and none
//! of them rejected it. Replication threads are never touched.

use tracing::{debug, info, warn};

use crate::db::{Database, Row};
use crate::error::ManagerError;
use crate::pattern::Pattern;
use crate::shutdown::Shutdown;

/// Command reported by a replication source's dump thread.
pub const BINLOG_DUMP_COMMAND: &str = "Binlog Dump";

/// User reported for the replica's own I/O and SQL threads.
pub const SYSTEM_USER: &str = "system user";

/// Process-list column a criterion can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessField {
    /// Account name (`User`).
    User,
    /// Client host and port (`Host`).
    Host,
    /// Statement text (`Info`).
    Query,
    /// Thread command (`Command`).
    Command,
    /// Thread state (`State`).
    State,
    /// Default database (`db`).
    Db,
}

impl ProcessField {
    /// Every field, in evaluation order.
    pub const ALL: [Self; 6] = [
        Self::User,
        Self::Host,
        Self::Query,
        Self::Command,
        Self::State,
        Self::Db,
    ];

    /// Column name in `SHOW FULL PROCESSLIST` output.
    pub fn column(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Host => "Host",
            Self::Query => "Info",
            Self::Command => "Command",
            Self::State => "State",
            Self::Db => "db",
        }
    }
}

/// Snapshot of one server session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRow {
    /// Connection identifier passed to `KILL`.
    pub id: u64,
    /// Account name.
    pub user: Option<String>,
    /// Client host.
    pub host: Option<String>,
    /// Default database.
    pub db: Option<String>,
    /// Thread command.
    pub command: Option<String>,
    /// Thread state.
    pub state: Option<String>,
    /// Seconds spent in the current state.
    pub time: i64,
    /// Statement text.
    pub info: Option<String>,
    /// Rows sent, when the server reports it.
    pub rows_sent: Option<String>,
    /// Rows examined, when the server reports it.
    pub rows_examined: Option<String>,
    /// Rows read, when the server reports it.
    pub rows_read: Option<String>,
}

impl ProcessRow {
    /// Read a process-list row. Returns `None` when `Id` is missing or not
    /// numeric.
    pub fn from_row(row: &Row) -> Option<Self> {
        let id = row.get("Id")?.trim().parse().ok()?;
        let owned = |name: &str| row.get(name).map(str::to_owned);
        Some(Self {
            id,
            user: owned(ProcessField::User.column()),
            host: owned(ProcessField::Host.column()),
            db: owned(ProcessField::Db.column()),
            command: owned(ProcessField::Command.column()),
            state: owned(ProcessField::State.column()),
            time: row
                .get("Time")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0),
            info: owned(ProcessField::Query.column()),
            rows_sent: owned("Rows_sent"),
            rows_examined: owned("Rows_examined"),
            rows_read: owned("Rows_read"),
        })
    }

    /// Value of a matchable field.
    pub fn field(&self, field: ProcessField) -> Option<&str> {
        match field {
            ProcessField::User => self.user.as_deref(),
            ProcessField::Host => self.host.as_deref(),
            ProcessField::Query => self.info.as_deref(),
            ProcessField::Command => self.command.as_deref(),
            ProcessField::State => self.state.as_deref(),
            ProcessField::Db => self.db.as_deref(),
        }
    }

    /// Replication infrastructure sessions that must never be killed.
    pub fn is_protected(&self) -> bool {
        self.command.as_deref() == Some(BINLOG_DUMP_COMMAND)
            || self.user.as_deref() == Some(SYSTEM_USER)
    }

    fn describe(&self) -> String {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        format!(
            "id:{} db:{} user:{} command:{} state:{} time:{} host:{} query:{} rows_sent:{} rows_examined:{} rows_read:{}",
            self.id,
            text(&self.db),
            text(&self.user),
            text(&self.command),
            text(&self.state),
            self.time,
            text(&self.host),
            text(&self.info),
            text(&self.rows_sent),
            text(&self.rows_examined),
            text(&self.rows_read),
        )
    }
}

/// Outcome of evaluating one criterion against one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldVerdict {
    /// No threshold or pattern configured; not part of the conjunction.
    NotConfigured,
    /// Configured and satisfied.
    Matched,
    /// Configured and not satisfied.
    NotMatched,
}

/// Aggregate decision for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Replication thread, skipped before any criterion runs.
    Protected,
    /// Nothing was configured, so nothing can select the row.
    NoCriteria,
    /// At least one configured criterion failed.
    Rejected,
    /// Every configured criterion matched.
    Selected,
}

/// Which sessions to kill.
///
/// Patterns within a field are alternatives; configured fields must all
/// match.
#[derive(Debug, Clone)]
pub struct KillCriteria {
    /// Kill sessions running strictly longer than this many seconds.
    /// Negative disables the threshold.
    pub max_query_time: i64,
    /// Patterns for the `User` column.
    pub user: Vec<Pattern>,
    /// Patterns for the `Host` column.
    pub host: Vec<Pattern>,
    /// Patterns for the statement text.
    pub query: Vec<Pattern>,
    /// Patterns for the `Command` column.
    pub command: Vec<Pattern>,
    /// Patterns for the `State` column.
    pub state: Vec<Pattern>,
    /// Patterns for the `db` column.
    pub db: Vec<Pattern>,
}

impl Default for KillCriteria {
    fn default() -> Self {
        Self {
            max_query_time: -1,
            user: Vec::new(),
            host: Vec::new(),
            query: Vec::new(),
            command: Vec::new(),
            state: Vec::new(),
            db: Vec::new(),
        }
    }
}

impl KillCriteria {
    /// Patterns configured for `field`.
    pub fn patterns(&self, field: ProcessField) -> &[Pattern] {
        match field {
            ProcessField::User => &self.user,
            ProcessField::Host => &self.host,
            ProcessField::Query => &self.query,
            ProcessField::Command => &self.command,
            ProcessField::State => &self.state,
            ProcessField::Db => &self.db,
        }
    }

    /// Whether any criterion is configured at all.
    pub fn is_empty(&self) -> bool {
        self.max_query_time < 0
            && ProcessField::ALL
                .iter()
                .all(|f| self.patterns(*f).is_empty())
    }

    /// Verdict of the elapsed-time threshold.
    pub fn time_verdict(&self, row: &ProcessRow) -> FieldVerdict {
        if self.max_query_time < 0 {
            FieldVerdict::NotConfigured
        } else if row.time > self.max_query_time {
            FieldVerdict::Matched
        } else {
            FieldVerdict::NotMatched
        }
    }

    /// Verdict of the patterns configured for one field.
    pub fn field_verdict(&self, field: ProcessField, row: &ProcessRow) -> FieldVerdict {
        let patterns = self.patterns(field);
        if patterns.is_empty() {
            return FieldVerdict::NotConfigured;
        }
        let matched = row
            .field(field)
            .is_some_and(|value| patterns.iter().any(|p| p.is_match(value)));
        if matched {
            FieldVerdict::Matched
        } else {
            FieldVerdict::NotMatched
        }
    }

    /// Decide whether `row` should be killed.
    pub fn evaluate(&self, row: &ProcessRow) -> Selection {
        if row.is_protected() {
            return Selection::Protected;
        }

        let verdicts = std::iter::once(self.time_verdict(row)).chain(
            ProcessField::ALL
                .iter()
                .map(|field| self.field_verdict(*field, row)),
        );

        let mut evaluated = false;
        for verdict in verdicts {
            match verdict {
                FieldVerdict::NotConfigured => {}
                FieldVerdict::Matched => evaluated = true,
                FieldVerdict::NotMatched => return Selection::Rejected,
            }
        }

        if evaluated {
            Selection::Selected
        } else {
            Selection::NoCriteria
        }
    }
}

/// Summary of one kill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    /// Rows in the snapshot.
    pub examined: usize,
    /// Replication threads skipped.
    pub protected: usize,
    /// Rows selected by the criteria.
    pub selected: usize,
    /// `KILL` statements that succeeded.
    pub killed: usize,
    /// `KILL` statements that failed.
    pub failed: usize,
    /// Ids of the selected sessions, in snapshot order.
    pub selected_ids: Vec<u64>,
}

/// Kill every session in the current process list matching `criteria`.
///
/// The manager's own connection is never selected. In dry-run mode the
/// selection is logged exactly as it would be, but no `KILL` is sent.
///
/// # Errors
///
/// Returns [`ManagerError::Database`] if the process list cannot be read
/// and [`ManagerError::Interrupted`] if the operator stops the run. A
/// failing `KILL` is logged and does not abort the pass.
pub async fn kill_matching(
    db: &mut dyn Database,
    criteria: &KillCriteria,
    dry_run: bool,
    shutdown: &Shutdown,
) -> Result<KillReport, ManagerError> {
    let own_id = own_connection_id(db).await?;
    let rows = db.query("SHOW FULL PROCESSLIST").await?;

    let mut report = KillReport {
        examined: rows.len(),
        ..KillReport::default()
    };

    for raw in &rows {
        let Some(row) = ProcessRow::from_row(raw) else {
            warn!("process list row without a usable Id, skipping");
            continue;
        };
        if Some(row.id) == own_id {
            continue;
        }

        match criteria.evaluate(&row) {
            Selection::Protected => {
                report.protected = report.protected.saturating_add(1);
                continue;
            }
            Selection::NoCriteria | Selection::Rejected => continue,
            Selection::Selected => {}
        }

        if shutdown.is_triggered() {
            return Err(ManagerError::Interrupted);
        }

        report.selected = report.selected.saturating_add(1);
        report.selected_ids.push(row.id);
        info!(id = row.id, dry_run, "Killing {}", row.describe());

        if dry_run {
            continue;
        }
        match db.execute(&format!("KILL {}", row.id)).await {
            Ok(()) => report.killed = report.killed.saturating_add(1),
            Err(e) => {
                report.failed = report.failed.saturating_add(1);
                warn!(id = row.id, code = %e.code_or_unknown(), "{}", e.message);
            }
        }
    }

    debug!(
        examined = report.examined,
        selected = report.selected,
        killed = report.killed,
        failed = report.failed,
        "kill pass complete"
    );
    Ok(report)
}

/// Id of the connection issuing the statements, if the server reports it.
async fn own_connection_id(db: &mut dyn Database) -> Result<Option<u64>, ManagerError> {
    let rows = db.query("SELECT CONNECTION_ID() AS id").await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("id"))
        .and_then(|id| id.trim().parse().ok()))
}
