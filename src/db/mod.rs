//! Database collaborator used by every action.
//!
//! Actions only need two things from the server: run a statement and read
//! its rows as name/value pairs, or run a statement for its side effect.
//! [`Database`] captures exactly that so the decision logic can be driven
//! by a real connection ([`mysql::MySqlDatabase`]) or a scripted fake.

pub mod mysql;

use async_trait::async_trait;

/// One result row as an ordered column-name to text mapping.
///
/// Values are kept in their textual form; `None` is SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }

    /// Append a column.
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.push((name.into(), value));
    }

    /// Value of `name`, or `None` when the column is absent or `NULL`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// First non-null value among several candidate column names.
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }
}

/// A statement failed on the server or in the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DbError {
    /// Server error number (e.g. `1094`), when the server reported one.
    pub code: Option<String>,
    /// Driver or server message.
    pub message: String,
}

impl DbError {
    /// Build an error carrying a server error number.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error code for display, `unknown` when the driver gave none.
    pub fn code_or_unknown(&self) -> &str {
        self.code.as_deref().unwrap_or("unknown")
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number().to_string())
                    .or_else(|| db_err.code().map(|c| c.into_owned()));
                Self {
                    code,
                    message: db_err.message().to_owned(),
                }
            }
            _ => Self {
                code: None,
                message: err.to_string(),
            },
        }
    }
}

/// Minimal statement interface over a single server connection.
#[async_trait]
pub trait Database: Send {
    /// Run a statement and collect all of its rows at once.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DbError>;

    /// Run a statement for its side effect.
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;
}
