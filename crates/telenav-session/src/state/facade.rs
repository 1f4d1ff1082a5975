//! The four state scopes of one resolved call.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use telenav_types::{StateItem, StateKey, StateKind, StateValue};
use tracing::{trace, warn};

use super::{EmptyProvider, StateProvider};
use crate::error::SessionResult;

/// Local, shared, user and global providers bound for one call.
#[derive(Clone)]
pub struct States {
    local: Arc<dyn StateProvider>,
    shared: Arc<dyn StateProvider>,
    user: Arc<dyn StateProvider>,
    global: Arc<dyn StateProvider>,
}

impl fmt::Debug for States {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("States")
            .field("local", &self.local)
            .field("shared", &self.shared)
            .field("user", &self.user)
            .field("global", &self.global)
            .finish()
    }
}

impl States {
    pub fn new(
        local: Arc<dyn StateProvider>,
        shared: Arc<dyn StateProvider>,
        user: Arc<dyn StateProvider>,
        global: Arc<dyn StateProvider>,
    ) -> Self {
        Self {
            local,
            shared,
            user,
            global,
        }
    }

    /// All four scopes rejecting access. Used by calls that never touch state.
    pub fn empty() -> Self {
        let empty: Arc<dyn StateProvider> = Arc::new(EmptyProvider);
        Self::new(empty.clone(), empty.clone(), empty.clone(), empty)
    }

    pub fn provider(&self, kind: StateKind) -> &Arc<dyn StateProvider> {
        match kind {
            StateKind::Local => &self.local,
            StateKind::Shared => &self.shared,
            StateKind::User => &self.user,
            StateKind::Global => &self.global,
        }
    }

    pub fn get(&self, kind: StateKind, key: &StateKey) -> SessionResult<Option<Value>> {
        self.provider(kind).get(key)
    }

    pub fn set(
        &self,
        kind: StateKind,
        key: &StateKey,
        value: Option<Value>,
    ) -> SessionResult<Option<Value>> {
        self.provider(kind).set(key, value)
    }

    pub fn has_value(&self, kind: StateKind, key: &StateKey) -> SessionResult<bool> {
        Ok(self.get(kind, key)?.is_some())
    }

    pub fn get_all(&self, kind: StateKind) -> SessionResult<Vec<StateItem>> {
        self.provider(kind).get_all()
    }

    /// Typed read of `T` under an optional name.
    pub fn get_value<T: StateValue>(&self, kind: StateKind, name: Option<&str>) -> SessionResult<Option<T>> {
        match self.get(kind, &StateKey::of::<T>(name))? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Typed write of `T`; `None` deletes.
    pub fn set_value<T: StateValue>(
        &self,
        kind: StateKind,
        name: Option<&str>,
        value: Option<&T>,
    ) -> SessionResult<()> {
        let value = value.map(serde_json::to_value).transpose()?;
        self.set(kind, &StateKey::of::<T>(name), value)?;
        Ok(())
    }

    /// Flush every provider that can flush.
    ///
    /// All providers are attempted; the first failure is returned.
    pub fn flush(&self) -> SessionResult<()> {
        let mut first_err = None;
        for kind in StateKind::ALL {
            let provider = self.provider(kind);
            if !provider.can_flush() {
                trace!(%kind, "skipping flush");
                continue;
            }
            if let Err(e) = provider.flush() {
                warn!(%kind, "state flush failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Trace-level dump of every readable scope.
    pub fn trace_dump(&self, label: &str) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        for kind in StateKind::ALL {
            match self.get_all(kind) {
                Ok(items) => {
                    let rendered: Vec<String> =
                        items.iter().map(|i| format!("{}={}", i.key, i.value)).collect();
                    trace!(%kind, "{label}: [{}]", rendered.join(", "));
                }
                Err(_) => trace!(%kind, "{label}: <unavailable>"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ScopedProvider, TempProvider};
    use crate::store::MemoryStore;
    use telenav_types::{MessageId, PageId, StateScope, UserId};

    fn persisted(store: &Arc<MemoryStore>, scope: StateScope) -> Arc<dyn StateProvider> {
        Arc::new(ScopedProvider::new(scope, store.clone()))
    }

    #[test]
    fn test_flush_skips_temp() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new(1);
        let states = States::new(
            Arc::new(TempProvider::empty()),
            persisted(&store, StateScope::Shared { user, message: MessageId::new(5) }),
            persisted(&store, StateScope::User(user)),
            persisted(&store, StateScope::Global),
        );

        states.flush().unwrap();
        assert_eq!(store.stats().state_writes, 3);
    }

    #[test]
    fn test_typed_access_by_kind() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new(1);
        let states = States::new(
            persisted(&store, StateScope::Local(PageId::new(1))),
            Arc::new(TempProvider::empty()),
            persisted(&store, StateScope::User(user)),
            persisted(&store, StateScope::Global),
        );

        states.set_value(StateKind::User, Some("lang"), Some(&"en".to_string())).unwrap();
        assert!(states.has_value(StateKind::User, &StateKey::named::<String>("lang")).unwrap());
        assert!(!states.has_value(StateKind::Global, &StateKey::named::<String>("lang")).unwrap());
        assert_eq!(
            states.get_value::<String>(StateKind::User, Some("lang")).unwrap().as_deref(),
            Some("en")
        );

        states.set_value::<String>(StateKind::User, Some("lang"), None).unwrap();
        assert_eq!(states.get_value::<String>(StateKind::User, Some("lang")).unwrap(), None);
    }

    #[test]
    fn test_empty_states_flush_nothing() {
        let states = States::empty();
        assert!(states.flush().is_ok());
        assert!(states.get(StateKind::Local, &StateKey::of::<bool>(None)).is_err());
    }
}
