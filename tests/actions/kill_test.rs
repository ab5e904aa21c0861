//! Tests for `src/kill.rs`: selection rules and the kill pass.

use mysql_manager::db::{DbError, Row};
use mysql_manager::error::ManagerError;
use mysql_manager::kill::{kill_matching, KillCriteria, ProcessRow, Selection};
use mysql_manager::pattern::Pattern;
use mysql_manager::shutdown::Shutdown;

use crate::fake_db::{connection_id, process, FakeDb};
use crate::log_capture::CapturedLogs;

const CONNECTION_ID: &str = "SELECT CONNECTION_ID() AS id";
const PROCESSLIST: &str = "SHOW FULL PROCESSLIST";

fn patterns(sources: &[&str]) -> Vec<Pattern> {
    sources
        .iter()
        .map(|s| Pattern::compile(s).expect("pattern should compile"))
        .collect()
}

fn row(raw: &Row) -> ProcessRow {
    ProcessRow::from_row(raw).expect("row should have an id")
}

#[test]
fn binlog_dump_is_never_selected() {
    let criteria = KillCriteria {
        max_query_time: 0,
        ..KillCriteria::default()
    };
    let dump = row(&process(4, "repl", "Binlog Dump", 86_400, None));
    assert_eq!(criteria.evaluate(&dump), Selection::Protected);
}

#[test]
fn system_user_is_never_selected() {
    let criteria = KillCriteria {
        user: patterns(&["/.*/"]),
        ..KillCriteria::default()
    };
    let sql_thread = row(&process(2, "system user", "Connect", 10, None));
    assert_eq!(criteria.evaluate(&sql_thread), Selection::Protected);
}

#[test]
fn no_criteria_selects_nothing() {
    let criteria = KillCriteria::default();
    assert!(criteria.is_empty());
    let busy = row(&process(10, "app", "Query", 9_999, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&busy), Selection::NoCriteria);
}

#[test]
fn time_threshold_is_strict() {
    let criteria = KillCriteria {
        max_query_time: 30,
        ..KillCriteria::default()
    };
    let at_limit = row(&process(10, "app", "Query", 30, Some("SELECT 1")));
    let over = row(&process(11, "app", "Query", 31, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&at_limit), Selection::Rejected);
    assert_eq!(criteria.evaluate(&over), Selection::Selected);
}

#[test]
fn configured_fields_must_all_match() {
    let criteria = KillCriteria {
        max_query_time: 60,
        user: patterns(&["reporting"]),
        ..KillCriteria::default()
    };
    let slow_other_user = row(&process(10, "app", "Query", 120, Some("SELECT 1")));
    let fast_reporting = row(&process(11, "reporting", "Query", 5, Some("SELECT 1")));
    let slow_reporting = row(&process(12, "reporting", "Query", 120, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&slow_other_user), Selection::Rejected);
    assert_eq!(criteria.evaluate(&fast_reporting), Selection::Rejected);
    assert_eq!(criteria.evaluate(&slow_reporting), Selection::Selected);
}

#[test]
fn patterns_within_a_field_are_alternatives() {
    let criteria = KillCriteria {
        user: patterns(&["batch", "/^etl_/"]),
        ..KillCriteria::default()
    };
    let batch = row(&process(10, "batch", "Query", 1, None));
    let etl = row(&process(11, "etl_nightly", "Query", 1, None));
    let app = row(&process(12, "app", "Query", 1, None));
    assert_eq!(criteria.evaluate(&batch), Selection::Selected);
    assert_eq!(criteria.evaluate(&etl), Selection::Selected);
    assert_eq!(criteria.evaluate(&app), Selection::Rejected);
}

#[test]
fn plain_pattern_is_exact_not_substring() {
    let criteria = KillCriteria {
        user: patterns(&["app"]),
        ..KillCriteria::default()
    };
    let longer = row(&process(10, "app_ro", "Query", 1, None));
    assert_eq!(criteria.evaluate(&longer), Selection::Rejected);
}

#[test]
fn null_column_never_matches() {
    let criteria = KillCriteria {
        query: patterns(&["/.*/"]),
        ..KillCriteria::default()
    };
    let idle = row(&process(10, "app", "Sleep", 500, None));
    assert_eq!(criteria.evaluate(&idle), Selection::Rejected);
}

#[test]
fn db_criterion_reads_db_column() {
    let criteria = KillCriteria {
        db: patterns(&["app"]),
        ..KillCriteria::default()
    };
    let session = row(&process(10, "app", "Query", 1, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&session), Selection::Selected);
}

#[test]
fn query_criterion_matches_statement_text() {
    let criteria = KillCriteria {
        query: patterns(&["/FROM big/"]),
        ..KillCriteria::default()
    };
    let scan = row(&process(10, "app", "Query", 1, Some("SELECT * FROM big")));
    let point = row(&process(11, "app", "Query", 1, Some("SELECT * FROM small")));
    assert_eq!(criteria.evaluate(&scan), Selection::Selected);
    assert_eq!(criteria.evaluate(&point), Selection::Rejected);
}

#[test]
fn query_criterion_ignores_other_columns() {
    let criteria = KillCriteria {
        query: patterns(&["/FROM big/"]),
        ..KillCriteria::default()
    };
    let raw = Row::from_pairs([
        ("Id", Some("10")),
        ("User", Some("SELECT * FROM big")),
        ("Host", Some("SELECT * FROM big")),
        ("db", Some("SELECT * FROM big")),
        ("Command", Some("Query")),
        ("Time", Some("1")),
        ("State", Some("SELECT * FROM big")),
        ("Info", Some("UPDATE t SET x = 1")),
    ]);
    assert_eq!(criteria.evaluate(&row(&raw)), Selection::Rejected);
}

#[test]
fn host_criterion_matches_client_address() {
    let criteria = KillCriteria {
        host: patterns(&["/^10\\.0\\.0\\./"]),
        ..KillCriteria::default()
    };
    let session = row(&process(10, "app", "Query", 1, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&session), Selection::Selected);

    let elsewhere = KillCriteria {
        host: patterns(&["/^192\\.168\\./"]),
        ..KillCriteria::default()
    };
    assert_eq!(elsewhere.evaluate(&session), Selection::Rejected);
}

#[test]
fn command_criterion_matches_thread_command() {
    let criteria = KillCriteria {
        command: patterns(&["Sleep"]),
        ..KillCriteria::default()
    };
    let idle = row(&process(10, "app", "Sleep", 600, None));
    let busy = row(&process(11, "app", "Query", 600, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&idle), Selection::Selected);
    assert_eq!(criteria.evaluate(&busy), Selection::Rejected);
}

#[test]
fn state_criterion_matches_thread_state() {
    let criteria = KillCriteria {
        state: patterns(&["executing"]),
        ..KillCriteria::default()
    };
    let session = row(&process(10, "app", "Query", 1, Some("SELECT 1")));
    assert_eq!(criteria.evaluate(&session), Selection::Selected);

    let locked = KillCriteria {
        state: patterns(&["/lock/"]),
        ..KillCriteria::default()
    };
    assert_eq!(locked.evaluate(&session), Selection::Rejected);
}

#[tokio::test]
async fn kill_line_is_logged_in_live_and_dry_runs() {
    for dry_run in [false, true] {
        let (logs, _guard) = CapturedLogs::install();
        let mut db = FakeDb::new()
            .respond(CONNECTION_ID, connection_id(99))
            .respond(
                PROCESSLIST,
                vec![process(10, "app", "Query", 120, Some("SELECT SLEEP(1000)"))],
            );
        let criteria = KillCriteria {
            max_query_time: 60,
            ..KillCriteria::default()
        };

        kill_matching(&mut db, &criteria, dry_run, &Shutdown::never())
            .await
            .expect("kill pass should succeed");

        logs.assert_logged(
            "Killing id:10 db:app user:app command:Query state:executing time:120 \
             host:10.0.0.7:51234 query:SELECT SLEEP(1000)",
        );
    }
}

#[tokio::test]
async fn kills_selected_sessions_and_skips_protected() {
    let mut db = FakeDb::new()
        .respond(CONNECTION_ID, connection_id(99))
        .respond(
            PROCESSLIST,
            vec![
                process(1, "system user", "Connect", 5_000, None),
                process(2, "repl", "Binlog Dump", 5_000, None),
                process(10, "app", "Query", 120, Some("SELECT SLEEP(1000)")),
                process(11, "app", "Query", 3, Some("SELECT 1")),
            ],
        );
    let criteria = KillCriteria {
        max_query_time: 60,
        ..KillCriteria::default()
    };

    let report = kill_matching(&mut db, &criteria, false, &Shutdown::never())
        .await
        .expect("kill pass should succeed");

    assert_eq!(report.examined, 4);
    assert_eq!(report.protected, 2);
    assert_eq!(report.selected_ids, vec![10]);
    assert_eq!(report.killed, 1);
    assert_eq!(db.executed, vec!["KILL 10".to_owned()]);
}

#[tokio::test]
async fn own_connection_is_skipped() {
    let mut db = FakeDb::new()
        .respond(CONNECTION_ID, connection_id(42))
        .respond(
            PROCESSLIST,
            vec![
                process(42, "root", "Query", 0, Some("SHOW FULL PROCESSLIST")),
                process(43, "root", "Query", 0, Some("SELECT 1")),
            ],
        );
    let criteria = KillCriteria {
        user: patterns(&["root"]),
        ..KillCriteria::default()
    };

    let report = kill_matching(&mut db, &criteria, false, &Shutdown::never())
        .await
        .expect("kill pass should succeed");

    assert_eq!(report.selected_ids, vec![43]);
    assert_eq!(db.executed, vec!["KILL 43".to_owned()]);
}

#[tokio::test]
async fn dry_run_selects_but_does_not_kill() {
    let mut db = FakeDb::new()
        .respond(CONNECTION_ID, connection_id(99))
        .respond(
            PROCESSLIST,
            vec![
                process(10, "app", "Query", 120, Some("SELECT 1")),
                process(11, "app", "Query", 300, Some("SELECT 2")),
            ],
        );
    let criteria = KillCriteria {
        max_query_time: 60,
        ..KillCriteria::default()
    };

    let report = kill_matching(&mut db, &criteria, true, &Shutdown::never())
        .await
        .expect("dry run should succeed");

    assert_eq!(report.selected_ids, vec![10, 11]);
    assert_eq!(report.killed, 0);
    assert!(db.executed.is_empty(), "dry run must not send KILL");
}

#[tokio::test]
async fn failed_kill_does_not_stop_the_pass() {
    let mut db = FakeDb::new()
        .respond(CONNECTION_ID, connection_id(99))
        .respond(
            PROCESSLIST,
            vec![
                process(10, "app", "Query", 120, None),
                process(11, "app", "Query", 120, None),
            ],
        )
        .fail_execute("KILL 10", DbError::with_code("1094", "Unknown thread id: 10"));
    let criteria = KillCriteria {
        max_query_time: 60,
        ..KillCriteria::default()
    };

    let report = kill_matching(&mut db, &criteria, false, &Shutdown::never())
        .await
        .expect("kill pass should succeed");

    assert_eq!(report.failed, 1);
    assert_eq!(report.killed, 1);
    assert_eq!(db.executed, vec!["KILL 10".to_owned(), "KILL 11".to_owned()]);
}

#[tokio::test]
async fn interrupt_stops_before_killing() {
    let mut db = FakeDb::new()
        .respond(CONNECTION_ID, connection_id(99))
        .respond(PROCESSLIST, vec![process(10, "app", "Query", 120, None)]);
    let criteria = KillCriteria {
        max_query_time: 60,
        ..KillCriteria::default()
    };
    let (trigger, shutdown) = Shutdown::channel();
    trigger.trigger();

    let err = kill_matching(&mut db, &criteria, false, &shutdown)
        .await
        .expect_err("interrupted pass should fail");

    assert!(matches!(err, ManagerError::Interrupted));
    assert!(db.executed.is_empty());
}

#[tokio::test]
async fn processlist_failure_is_an_error() {
    let mut db = FakeDb::new().respond(CONNECTION_ID, connection_id(99));
    let criteria = KillCriteria {
        max_query_time: 60,
        ..KillCriteria::default()
    };

    let err = kill_matching(&mut db, &criteria, false, &Shutdown::never())
        .await
        .expect_err("missing process list should fail");
    assert!(matches!(err, ManagerError::Database(_)));
}
