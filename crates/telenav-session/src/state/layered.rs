//! Decorating providers: overrides, read-only snapshots and the empty guard.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use telenav_types::{StateDef, StateItem, StateKey, merge};

use super::StateProvider;
use crate::error::{SessionError, SessionResult};

fn to_map(def: Option<&StateDef>) -> IndexMap<StateKey, Value> {
    def.map(|d| {
        d.items()
            .iter()
            .map(|i| (i.key.clone(), i.value.clone()))
            .collect()
    })
    .unwrap_or_default()
}

fn to_items(map: &IndexMap<StateKey, Value>) -> Vec<StateItem> {
    map.iter()
        .map(|(k, v)| StateItem::new(k.clone(), v.clone()))
        .collect()
}

// ============================================================================
// OverlayProvider
// ============================================================================

/// Overrides seeded from a button's attached state, layered over a
/// persisted provider.
///
/// Reads see an override first. Writing a key drops its override and goes
/// to the inner provider, so the handler's own write wins from then on.
#[derive(Debug)]
pub struct OverlayProvider {
    overrides: Mutex<IndexMap<StateKey, Value>>,
    inner: Arc<dyn StateProvider>,
}

impl OverlayProvider {
    pub fn new(overrides: Option<&StateDef>, inner: Arc<dyn StateProvider>) -> Self {
        Self {
            overrides: Mutex::new(to_map(overrides)),
            inner,
        }
    }
}

impl StateProvider for OverlayProvider {
    fn get(&self, key: &StateKey) -> SessionResult<Option<Value>> {
        if let Some(value) = self.overrides.lock().get(key) {
            return Ok(Some(value.clone()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &StateKey, value: Option<Value>) -> SessionResult<Option<Value>> {
        let overridden = self.overrides.lock().shift_remove(key);
        let previous = self.inner.set(key, value)?;
        Ok(overridden.or(previous))
    }

    fn get_all(&self) -> SessionResult<Vec<StateItem>> {
        let overrides = StateDef::from_items(to_items(&self.overrides.lock()));
        let inner = StateDef::from_items(self.inner.get_all()?);
        Ok(merge(&overrides, &inner).into_items())
    }

    fn merge_all(&self, items: &[StateItem]) -> SessionResult<()> {
        {
            let mut overrides = self.overrides.lock();
            for item in items {
                overrides.shift_remove(&item.key);
            }
        }
        self.inner.merge_all(items)
    }

    fn flush(&self) -> SessionResult<()> {
        self.inner.flush()
    }

    fn can_flush(&self) -> bool {
        self.inner.can_flush()
    }
}

// ============================================================================
// TempProvider
// ============================================================================

/// Read-only snapshot of a button's attached state, never persisted.
///
/// Backs the local scope of calls that run without a page of their own, and
/// the local and shared scopes of root calls. Writes are precondition
/// failures.
#[derive(Debug, Default)]
pub struct TempProvider {
    items: IndexMap<StateKey, Value>,
}

impl TempProvider {
    pub fn new(seed: Option<&StateDef>) -> Self {
        Self { items: to_map(seed) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn reject<T>(op: &str) -> SessionResult<T> {
        Err(SessionError::precondition(format!(
            "{op} on temp state provider"
        )))
    }
}

impl StateProvider for TempProvider {
    fn get(&self, key: &StateKey) -> SessionResult<Option<Value>> {
        Ok(self.items.get(key).cloned())
    }

    fn set(&self, _key: &StateKey, _value: Option<Value>) -> SessionResult<Option<Value>> {
        Self::reject("set")
    }

    fn get_all(&self) -> SessionResult<Vec<StateItem>> {
        Ok(to_items(&self.items))
    }

    fn merge_all(&self, _items: &[StateItem]) -> SessionResult<()> {
        Self::reject("merge_all")
    }

    fn flush(&self) -> SessionResult<()> {
        Ok(())
    }

    fn can_flush(&self) -> bool {
        false
    }
}

// ============================================================================
// EmptyProvider
// ============================================================================

/// Provider for a scope that does not exist in the current call.
///
/// Every access is a precondition failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProvider;

impl EmptyProvider {
    fn reject<T>(op: &str) -> SessionResult<T> {
        Err(SessionError::precondition(format!(
            "{op} on empty state provider"
        )))
    }
}

impl StateProvider for EmptyProvider {
    fn get(&self, _key: &StateKey) -> SessionResult<Option<Value>> {
        Self::reject("get")
    }

    fn set(&self, _key: &StateKey, _value: Option<Value>) -> SessionResult<Option<Value>> {
        Self::reject("set")
    }

    fn get_all(&self) -> SessionResult<Vec<StateItem>> {
        Self::reject("get_all")
    }

    fn merge_all(&self, _items: &[StateItem]) -> SessionResult<()> {
        Self::reject("merge_all")
    }

    fn flush(&self) -> SessionResult<()> {
        Self::reject("flush")
    }

    fn can_flush(&self) -> bool {
        false
    }
}
