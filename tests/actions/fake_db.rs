//! Scripted in-memory [`Database`] used by the action tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use mysql_manager::db::{Database, DbError, Row};

/// Answers queries from a script and records every statement it sees.
#[derive(Debug, Default)]
pub struct FakeDb {
    /// Every statement, in the order it was sent.
    pub statements: Vec<String>,
    /// Statements sent through `execute`.
    pub executed: Vec<String>,
    queued: HashMap<String, VecDeque<Result<Vec<Row>, DbError>>>,
    fixed: HashMap<String, Vec<Row>>,
    failing: HashMap<String, DbError>,
    latency: Option<Duration>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `rows` every time.
    pub fn respond(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.fixed.insert(sql.to_owned(), rows);
        self
    }

    /// Answer successive `sql` queries with `responses`, one per call.
    pub fn script(mut self, sql: &str, responses: Vec<Result<Vec<Row>, DbError>>) -> Self {
        self.queued
            .entry(sql.to_owned())
            .or_default()
            .extend(responses);
        self
    }

    /// Make `execute(sql)` fail with `error`.
    pub fn fail_execute(mut self, sql: &str, error: DbError) -> Self {
        self.failing.insert(sql.to_owned(), error);
        self
    }

    /// Advance the paused clock by `latency` on every query, like a server
    /// round trip. Only for `start_paused` tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl Database for FakeDb {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        self.statements.push(sql.to_owned());
        if let Some(latency) = self.latency {
            tokio::time::advance(latency).await;
        }
        if let Some(next) = self.queued.get_mut(sql).and_then(VecDeque::pop_front) {
            return next;
        }
        self.fixed
            .get(sql)
            .cloned()
            .ok_or_else(|| DbError::with_code("HY000", format!("no scripted response for {sql}")))
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.statements.push(sql.to_owned());
        self.executed.push(sql.to_owned());
        match self.failing.get(sql) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// One `SHOW FULL PROCESSLIST` row.
pub fn process(id: u64, user: &str, command: &str, time: i64, info: Option<&str>) -> Row {
    Row::from_pairs([
        ("Id", Some(id.to_string())),
        ("User", Some(user.to_owned())),
        ("Host", Some("10.0.0.7:51234".to_owned())),
        ("db", Some("app".to_owned())),
        ("Command", Some(command.to_owned())),
        ("Time", Some(time.to_string())),
        ("State", Some("executing".to_owned())),
        ("Info", info.map(str::to_owned)),
    ])
}

/// `SELECT CONNECTION_ID()` answer.
pub fn connection_id(id: u64) -> Vec<Row> {
    vec![Row::from_pairs([("id", Some(id.to_string()))])]
}

/// One `SHOW SLAVE STATUS` response; `None` lag means broken.
pub fn slave_status(lag: Option<&str>, last_error: &str) -> Result<Vec<Row>, DbError> {
    Ok(vec![Row::from_pairs([
        ("Seconds_Behind_Master", lag.map(str::to_owned)),
        ("Last_Error", Some(last_error.to_owned())),
    ])])
}

/// `SHOW VARIABLES` rows for the given names.
pub fn variables(names: &[&str]) -> Vec<Row> {
    names
        .iter()
        .map(|name| {
            Row::from_pairs([
                ("Variable_name", Some((*name).to_owned())),
                ("Value", Some(String::new())),
            ])
        })
        .collect()
}
