//! Runs the requested actions in a fixed order and contains their failures.
//!
//! Order is kill, skip-replication-errors, reload-my-cnf regardless of how
//! the actions were requested. A failing action is logged and the next one
//! still runs; an operator interrupt stops the whole run.

use tracing::{debug, error, info};

use crate::db::Database;
use crate::error::ManagerError;
use crate::kill::{self, KillCriteria, KillReport};
use crate::reconcile::{self, ReconcileOptions, ReconcileReport};
use crate::replication::{self, RecoveryOptions, RecoveryOutcome, RecoveryReport};
use crate::shutdown::Shutdown;

/// One maintenance action with its options.
#[derive(Debug, Clone)]
pub enum Action {
    /// Kill matching queries.
    Kill(KillCriteria),
    /// Skip replication errors until healthy or out of budget.
    RecoverReplication(RecoveryOptions),
    /// Apply option-file settings with `SET GLOBAL`.
    Reconcile(ReconcileOptions),
}

impl Action {
    /// Name used in logs, matching the command-line flag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kill(_) => "kill",
            Self::RecoverReplication(_) => "skip-replication-errors",
            Self::Reconcile(_) => "reload-my-cnf",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Kill(_) => 0,
            Self::RecoverReplication(_) => 1,
            Self::Reconcile(_) => 2,
        }
    }
}

/// The enabled actions, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    actions: Vec<Action>,
}

impl ActionPlan {
    /// Build a plan from per-action enable switches; `None` disables.
    pub fn new(
        kill: Option<KillCriteria>,
        recovery: Option<RecoveryOptions>,
        reconcile: Option<ReconcileOptions>,
    ) -> Self {
        let mut plan = Self::default();
        plan.actions.extend(kill.map(Action::Kill));
        plan.actions
            .extend(recovery.map(Action::RecoverReplication));
        plan.actions.extend(reconcile.map(Action::Reconcile));
        plan
    }

    /// Add an action, keeping the fixed order. A second action of the same
    /// kind replaces the first.
    pub fn push(&mut self, action: Action) {
        self.actions.retain(|a| a.rank() != action.rank());
        self.actions.push(action);
        self.actions.sort_by_key(Action::rank);
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// What an action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReport {
    /// Result of a kill pass.
    Kill(KillReport),
    /// Result of a replication recovery run.
    Recovery(RecoveryReport),
    /// Result of a reconciliation run.
    Reconcile(ReconcileReport),
}

/// How an action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Ran to completion.
    Completed(ActionReport),
    /// A file it needed was missing.
    NotFound(String),
    /// The operator stopped it.
    Interrupted,
    /// Any other failure.
    Failed(String),
}

/// Per-action outcomes of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// `(action name, outcome)` in execution order.
    pub outcomes: Vec<(&'static str, ActionOutcome)>,
    /// Whether the run stopped early on an interrupt.
    pub interrupted: bool,
}

/// Run every action in `plan`. Never fails; problems are logged.
pub async fn run(
    db: &mut dyn Database,
    plan: &ActionPlan,
    dry_run: bool,
    shutdown: &Shutdown,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for action in plan.actions() {
        if shutdown.is_triggered() {
            info!("Exiting");
            report.interrupted = true;
            break;
        }

        let name = action.name();
        debug!(action = name, "about to run action");
        let outcome = match run_action(db, action, dry_run, shutdown).await {
            Ok(action_report) => {
                summarize(name, &action_report);
                ActionOutcome::Completed(action_report)
            }
            Err(e) if e.is_not_found() => {
                error!(fatal = true, action = name, "{e}");
                ActionOutcome::NotFound(e.to_string())
            }
            Err(ManagerError::Interrupted) => ActionOutcome::Interrupted,
            Err(e) => {
                error!(fatal = true, action = name, error = ?e, "{e}");
                ActionOutcome::Failed(e.to_string())
            }
        };

        let stop = shutdown.is_triggered()
            || matches!(
                outcome,
                ActionOutcome::Interrupted
                    | ActionOutcome::Completed(ActionReport::Recovery(RecoveryReport {
                        outcome: RecoveryOutcome::Interrupted,
                        ..
                    }))
            );
        report.outcomes.push((name, outcome));
        if stop {
            info!("Exiting");
            report.interrupted = true;
            break;
        }
    }

    report
}

async fn run_action(
    db: &mut dyn Database,
    action: &Action,
    dry_run: bool,
    shutdown: &Shutdown,
) -> Result<ActionReport, ManagerError> {
    match action {
        Action::Kill(criteria) => kill::kill_matching(db, criteria, dry_run, shutdown)
            .await
            .map(ActionReport::Kill),
        Action::RecoverReplication(options) => {
            replication::recover_replication(db, options, dry_run, shutdown)
                .await
                .map(ActionReport::Recovery)
        }
        Action::Reconcile(options) => reconcile::reconcile(db, options, dry_run, shutdown)
            .await
            .map(ActionReport::Reconcile),
    }
}

fn summarize(name: &str, report: &ActionReport) {
    match report {
        ActionReport::Kill(r) => info!(
            action = name,
            examined = r.examined,
            selected = r.selected,
            killed = r.killed,
            failed = r.failed,
            "action complete"
        ),
        ActionReport::Recovery(r) => info!(
            action = name,
            outcome = ?r.outcome,
            errors = r.errors,
            samples = r.samples,
            elapsed_secs = r.elapsed.as_secs_f64(),
            "action complete"
        ),
        ActionReport::Reconcile(r) => info!(
            action = name,
            planned = r.planned,
            applied = r.applied,
            failed = r.failed,
            unknown = r.unknown,
            "action complete"
        ),
    }
}
