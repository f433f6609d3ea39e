//! Test doubles for the database boundary.
//!
//! [`FakeMySql`] is used ONLY by tests. It keeps an in-memory model of a
//! schema and interprets exactly the statement shapes `pkr_db::sql` emits,
//! with the MySQL behaviours the reconciler depends on:
//!
//! - `ADD PRIMARY KEY` is refused on duplicate or NULL key values.
//! - DDL (`ALTER`, `CREATE`, `TRUNCATE`) commits implicitly.
//! - `ROLLBACK` undoes DML since the last commit.
//!
//! Every statement is logged in order so tests can assert sequencing.

mod fake_mysql;

pub use fake_mysql::{FakeColumn, FakeMySql, FakeTable, LoggedStatement};
