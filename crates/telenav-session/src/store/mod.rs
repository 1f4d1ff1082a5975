//! Persistence for the navigation tree and the four state scopes.
//!
//! Key components:
//!
//! - [`StateStore`] - Core trait every backend implements
//! - [`MemoryStore`] - In-process maps (tests, ephemeral bots)
//! - [`SqliteStore`] - rusqlite-backed store with cascading deletes
//!
//! ## Design Decisions
//!
//! - **Synchronous, `&self`**: backends synchronize internally so one store
//!   can sit behind an `Arc` shared by every user session.
//! - **Upsert by message**: saving a block for a (user, message) pair that
//!   already has one updates it in place and keeps its id.
//! - **Cascades**: deleting a block drops its pages, their local state and
//!   the block's shared state; deleting a page drops its local state.

pub mod backends;
mod error;
mod ops;

pub use backends::{MemoryStore, SqliteStore, StoreStats};
pub use error::{StoreError, StoreResult};
pub use ops::StateStore;
