//! Lazily created per-user sessions.

use std::sync::Arc;

use dashmap::DashMap;
use telenav_types::{StateScope, UserId};
use tracing::debug;

use super::UserSession;
use crate::localize::Localizer;
use crate::state::{ScopedProvider, StateProvider};
use crate::store::StateStore;

/// Owns every [`UserSession`] and the single global state provider they
/// share.
pub struct SessionRegistry {
    store: Arc<dyn StateStore>,
    localizer: Arc<dyn Localizer>,
    global: Arc<dyn StateProvider>,
    sessions: DashMap<UserId, Arc<UserSession>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn StateStore>, localizer: Arc<dyn Localizer>) -> Self {
        let global = Arc::new(ScopedProvider::new(StateScope::Global, store.clone()));
        Self {
            store,
            localizer,
            global,
            sessions: DashMap::new(),
        }
    }

    /// Session for `user_id`, created on first use.
    pub fn session(&self, user_id: UserId) -> Arc<UserSession> {
        self.sessions
            .entry(user_id)
            .or_insert_with(|| {
                debug!(user = %user_id, "new session");
                Arc::new(UserSession::new(
                    user_id,
                    self.store.clone(),
                    self.localizer.clone(),
                    self.global.clone(),
                ))
            })
            .clone()
    }

    /// Existing session, without creating one.
    pub fn get(&self, user_id: UserId) -> Option<Arc<UserSession>> {
        self.sessions.get(&user_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn localizer(&self) -> &Arc<dyn Localizer> {
        &self.localizer
    }

    pub fn global(&self) -> &Arc<dyn StateProvider> {
        &self.global
    }
}
