//! mysql-manager: operator automation for a live MySQL server.
//!
//! Three independent maintenance actions run in a fixed order over one
//! shared connection:
//!
//! - [`kill`]: terminate sessions matching operator criteria;
//! - [`replication`]: skip replication errors until the replica is healthy;
//! - [`reconcile`]: push option-file values into running server variables.
//!
//! [`dispatch`] sequences them and contains their failures. All database
//! access goes through the [`db::Database`] trait.
//!
//! See `DESIGN.md` for how the pieces fit together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mycnf;
pub mod pattern;
pub mod shutdown;

pub mod kill;
pub mod reconcile;
pub mod replication;
