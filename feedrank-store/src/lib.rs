//! `FeedStore` implementations: an in-memory store for tests and demos, and a
//! SQLite store.

mod memory;
mod sqlite;


pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
