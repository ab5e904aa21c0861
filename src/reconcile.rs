//! Push option-file settings into the running server.
//!
//! Each option in an allowed group is turned into a `SET GLOBAL` only when
//! the server already has a variable of that name, so client-only and
//! startup-only options are skipped rather than rejected by the server.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::ManagerError;
use crate::mycnf::OptionFile;
use crate::shutdown::Shutdown;

/// Option file read when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/my.cnf";

/// Groups read by the server itself.
pub const DEFAULT_GROUPS: [&str; 6] = [
    "mysqld",
    "mysqld_safe",
    "mysql.server",
    "mysql_server",
    "server",
    "mysql",
];

/// What to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Option file to read.
    pub config: PathBuf,
    /// Groups whose options are applied.
    pub groups: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            groups: DEFAULT_GROUPS.iter().map(|g| (*g).to_owned()).collect(),
        }
    }
}

/// A coerced option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    /// Plain or `K`/`M`/`G`-suffixed digits.
    Integer(u64),
    /// Anything else.
    Text(String),
}

impl VariableValue {
    /// Coerce an option-file value.
    ///
    /// `"128"` becomes 128 and `"512K"`, `"2M"`, `"1G"` are scaled by
    /// powers of 1024. Suffixes are upper-case only. Values that do not fit
    /// in 64 bits stay text.
    pub fn coerce(raw: &str) -> Self {
        let (digits, multiplier) = match raw.as_bytes().last() {
            Some(b'K') => (&raw[..raw.len().saturating_sub(1)], 1u64 << 10),
            Some(b'M') => (&raw[..raw.len().saturating_sub(1)], 1u64 << 20),
            Some(b'G') => (&raw[..raw.len().saturating_sub(1)], 1u64 << 30),
            _ => (raw, 1),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Text(raw.to_owned());
        }
        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .map_or_else(|| Self::Text(raw.to_owned()), Self::Integer)
    }

    /// SQL literal: integers bare, text single-quoted.
    pub fn sql_literal(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Text(s) => {
                let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One runtime update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetGlobal {
    /// Server variable name.
    pub name: String,
    /// Value to assign.
    pub value: VariableValue,
}

impl SetGlobal {
    /// The statement sent to the server.
    pub fn statement(&self) -> String {
        format!("SET GLOBAL {} = {}", self.name, self.value.sql_literal())
    }
}

/// Updates derived from an option file, plus what was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Updates in option-file order.
    pub actions: Vec<SetGlobal>,
    /// Non-empty options with no matching server variable.
    pub unknown: Vec<String>,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Updates planned.
    pub planned: usize,
    /// Updates the server accepted (or would have, in dry-run).
    pub applied: usize,
    /// Updates the server rejected.
    pub failed: usize,
    /// Options skipped because the server has no such variable.
    pub unknown: usize,
}

/// Option-file keys may use `-` where server variables use `_`.
pub fn normalize_name(key: &str) -> String {
    key.replace('-', "_")
}

/// Work out which updates an option file implies for a server exposing
/// `live` variables.
pub fn plan(file: &OptionFile, groups: &[String], live: &HashSet<String>) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    for group in file.groups() {
        if !groups.iter().any(|g| *g == group.name) {
            continue;
        }
        debug!("loading values from [{}]", group.name);
        for (key, raw) in &group.entries {
            if raw.is_empty() {
                continue;
            }
            let name = normalize_name(key);
            if !live.contains(&name) {
                plan.unknown.push(key.clone());
                continue;
            }
            plan.actions.push(SetGlobal {
                name,
                value: VariableValue::coerce(raw),
            });
        }
    }
    plan
}

/// Apply the allowed groups of `options.config` to the running server.
///
/// # Errors
///
/// Returns [`ManagerError::ConfigNotFound`] when the option file is missing,
/// [`ManagerError::OptionFile`] when it is malformed,
/// [`ManagerError::Database`] when the variable list cannot be read, and
/// [`ManagerError::Interrupted`] if the operator stops the run. A rejected
/// `SET GLOBAL` is logged and the run continues.
pub async fn reconcile(
    db: &mut dyn Database,
    options: &ReconcileOptions,
    dry_run: bool,
    shutdown: &Shutdown,
) -> Result<ReconcileReport, ManagerError> {
    let file = OptionFile::load(&options.config)?;

    let live: HashSet<String> = db
        .query("SHOW VARIABLES")
        .await?
        .iter()
        .filter_map(|row| row.get("Variable_name").map(str::to_owned))
        .collect();

    let plan = plan(&file, &options.groups, &live);
    let mut report = ReconcileReport {
        planned: plan.actions.len(),
        unknown: plan.unknown.len(),
        ..ReconcileReport::default()
    };

    for action in &plan.actions {
        if shutdown.is_triggered() {
            return Err(ManagerError::Interrupted);
        }
        let sql = action.statement();
        if !dry_run {
            if let Err(e) = db.execute(&sql).await {
                report.failed = report.failed.saturating_add(1);
                debug!("{sql}");
                warn!(variable = %action.name, code = %e.code_or_unknown(), "{}", e.message);
                continue;
            }
        }
        report.applied = report.applied.saturating_add(1);
        info!(dry_run, "set {}={}", action.name, action.value);
    }

    Ok(report)
}
