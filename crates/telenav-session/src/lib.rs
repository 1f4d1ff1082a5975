//! # telenav-session
//!
//! Navigation engine for chat bots with button menus.
//!
//! Every bot message that carries buttons is a *block*; every screen shown
//! under it is a *page*. When a user types or taps, the engine finds the
//! block and its current page, matches the input against the page's
//! buttons and runs the right command with four state scopes bound:
//! - Local: one page
//! - Shared: one block's message
//! - User: one user
//! - Global: everybody
//!
//! Anything that cannot be routed goes to the root command. One user's
//! turns are serialized by a per-user lock held from resolution until the
//! call's state is flushed.

pub mod call;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod localize;
pub mod resolver;
pub mod sender;
pub mod session;
pub mod state;
pub mod store;

pub use call::CommandCall;
pub use command::{
    Command, CommandDescriptor, CommandInterceptor, CommandRegistry, HandlerArgs, ParamSlot,
    RegisteredCommand, ServiceRegistry, StateCell,
};
pub use config::{ConfigError, StoreConfig, TelenavConfig};
pub use context::{CommandContext, LAST_BLOCKS_LIMIT, PageSpec};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{SessionError, SessionResult};
pub use localize::{Localizer, StaticLocalizer};
pub use resolver::CallContextResolver;
pub use sender::{Button, MemorySender, MessageSender, OutgoingMessage, SentEvent};
pub use session::{ReadGuard, SessionRegistry, TurnGuard, UserSession};
pub use state::{EmptyProvider, OverlayProvider, ScopedProvider, StateProvider, States, TempProvider};
pub use store::{MemoryStore, SqliteStore, StateStore, StoreError, StoreResult, StoreStats};
