//! Prospect storage crate - SQLite persistence for conversation state.
//!
//! Provides a WAL-mode SQLite database with migrations and the `StateStore`
//! trait the conversation state manager writes through, with SQLite and
//! in-memory implementations.

pub mod db;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use store::{MemoryStateStore, SqliteStateStore, StateStore};
