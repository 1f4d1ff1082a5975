//! Navigation entities for telenav.
//!
//! This crate is the data model the session engine works on: typed ids,
//! blocks, pages, command definitions, state items and input messages. It has
//! **no internal telenav dependencies**, so backends and drivers can share it
//! without pulling in the engine.
//!
//! # Entity Overview
//!
//! ```text
//! User (UserId)
//!     └── owns Block (BlockId) ← one live chat message (MessageId)
//!             └── ordered Pages (PageId) ← last page is "current"
//!                     └── grid of CommandDef ← one button each
//!
//! State scopes:
//!     Local  → one Page
//!     Shared → one Block's message
//!     User   → one user
//!     Global → everybody
//! ```
//!
//! # Key Types
//!
//! |--------------------|------------------------------------------------|
//! | Type               | Purpose                                        |
//! |--------------------|------------------------------------------------|
//! | [`Block`]          | A chat message that carries navigation         |
//! | [`Page`]           | One screen rendered under a block              |
//! | [`CommandDef`]     | A persisted button                             |
//! | [`SubCommand`]     | A button as handlers describe it               |
//! | [`StateDef`]       | Ordered set of state items with unique keys    |
//! | [`StateScope`]     | Where a state set is persisted                 |
//! | [`InputMessage`]   | Text or inline query coming from a user        |
//! |--------------------|------------------------------------------------|

pub mod ids;
pub mod block;
pub mod command;
pub mod state;
pub mod input;

// Re-export primary types at crate root for convenience.
pub use ids::{BlockId, MessageId, PageId, UserId};
pub use block::{Block, EntityError, MessageType, Page};
pub use command::{
    CommandBehaviour, CommandDef, HandlerTag, SubCommand, SystemCommand, title_id_of,
};
pub use state::{StateDef, StateItem, StateKey, StateKind, StateScope, StateValue, merge};
pub use input::InputMessage;

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
