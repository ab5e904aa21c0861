//! [`Database`] implementation over a single `sqlx` MySQL connection.
//!
//! Administrative statements (`KILL`, `START SLAVE`, `SHOW ...`) are not all
//! preparable, so everything goes through [`sqlx::raw_sql`] and the text
//! protocol. Every column is read back as text.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Executor as _, Row as _};
use tracing::debug;

use super::{Database, DbError, Row};
use crate::config::ConnectionConfig;

/// One shared connection, reused for every statement in a run.
pub struct MySqlDatabase {
    conn: MySqlConnection,
}

impl MySqlDatabase {
    /// Open the connection described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError`] if the server is unreachable or rejects the
    /// credentials.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        if let Some(socket) = &config.socket {
            options = options.socket(socket);
        }

        let conn = options.connect().await?;
        debug!(host = %config.host, port = config.port, user = %config.username, "connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        let rows = self.conn.fetch_all(sqlx::raw_sql(sql)).await?;
        rows.iter().map(text_row).collect()
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute(sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

/// Decode every column of a text-protocol row as (lossy) UTF-8.
fn text_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut out = Row::default();
    for column in row.columns() {
        let raw: Option<Vec<u8>> = row.try_get_unchecked(column.ordinal())?;
        out.push(
            column.name(),
            raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        );
    }
    Ok(out)
}
