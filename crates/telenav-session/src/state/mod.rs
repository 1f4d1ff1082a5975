//! Scoped state providers and the per-call facade.
//!
//! - [`ScopedProvider`] - lazy-load-once cache over one persisted scope
//! - [`OverlayProvider`] - higher-priority overrides on top of a provider
//! - [`TempProvider`] - read-only snapshot, never flushed
//! - [`EmptyProvider`] - guard that rejects every access
//! - [`States`] - the four scopes of one resolved call

mod facade;
mod layered;
mod scoped;

use std::fmt;

use serde_json::Value;
use telenav_types::{StateItem, StateKey};

use crate::error::SessionResult;

pub use facade::States;
pub use layered::{EmptyProvider, OverlayProvider, TempProvider};
pub use scoped::ScopedProvider;

/// Read/write access to one state scope.
///
/// Providers are shared between calls (`Arc`), so all methods take `&self`
/// and implementations guard their cache internally.
pub trait StateProvider: Send + Sync + fmt::Debug {
    /// Current value for `key`, if any.
    fn get(&self, key: &StateKey) -> SessionResult<Option<Value>>;

    /// Set (`Some`) or delete (`None`) a value; returns the previous one.
    ///
    /// Writes stay in memory until [`flush`](Self::flush).
    fn set(&self, key: &StateKey, value: Option<Value>) -> SessionResult<Option<Value>>;

    /// Every visible item, in insertion order.
    fn get_all(&self) -> SessionResult<Vec<StateItem>>;

    /// Write every item; incoming values replace existing ones.
    fn merge_all(&self, items: &[StateItem]) -> SessionResult<()>;

    /// Persist the cache. No-op for providers that cannot flush.
    fn flush(&self) -> SessionResult<()>;

    fn can_flush(&self) -> bool;
}
