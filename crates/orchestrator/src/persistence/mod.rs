//! A `SqlitePool` plus row-level CRUD helpers.
//!
//! Grounded on `sqlx::sqlite::SqlitePoolOptions` usage in the pack (e.g.
//! `zerox80-speicherwald`'s `main.rs`) for pool setup. Each mutation writes
//! through to SQLite as its own short-lived statement — there is no
//! transaction spanning the in-memory state store and the database.

mod db;
mod repo;

pub use db::connect;
pub use repo::{PersistenceError, Repo};
