//! Job queue side-channel.

pub mod sqlite;

pub use sqlite::SqliteJobQueue;
