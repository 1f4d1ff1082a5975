//! Store backend implementations.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoreStats};
pub use sqlite::SqliteStore;
