//! SQLite backend for the fulfillment engine.
//!
//! Writes that touch stock always open their transaction with a write statement against the row they are about to
//! change. SQLite then holds the database write lock for the rest of the transaction, so the stock checks that follow
//! always see the latest committed counts.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
