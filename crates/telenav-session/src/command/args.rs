//! The view a handler gets of its declared parameters.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use telenav_types::{InputMessage, MessageId, StateKey, StateKind, StateValue};

use super::{CommandDescriptor, ServiceRegistry};
use crate::context::CommandContext;
use crate::error::{SessionError, SessionResult};
use crate::state::States;

/// Arguments of one handler invocation.
///
/// State and service lookups are checked against the command's descriptor,
/// so a handler can only reach the slots it declared.
pub struct HandlerArgs<'a> {
    descriptor: &'a CommandDescriptor,
    input: &'a InputMessage,
    states: &'a States,
    context: &'a CommandContext,
    services: &'a ServiceRegistry,
}

impl<'a> HandlerArgs<'a> {
    pub(crate) fn new(
        descriptor: &'a CommandDescriptor,
        input: &'a InputMessage,
        states: &'a States,
        context: &'a CommandContext,
        services: &'a ServiceRegistry,
    ) -> Self {
        Self {
            descriptor,
            input,
            states,
            context,
            services,
        }
    }

    /// Query text; `_REFRESH` when the page is being re-rendered.
    pub fn query(&self) -> &'a str {
        &self.input.query
    }

    /// Message the current block is bound to (`NONE` for the root call).
    pub fn message_id(&self) -> MessageId {
        self.context.message_id()
    }

    pub fn input(&self) -> &'a InputMessage {
        self.input
    }

    pub fn context(&self) -> &'a CommandContext {
        self.context
    }

    /// Every scope, bypassing declarations. Meant for diagnostics.
    pub fn states(&self) -> &'a States {
        self.states
    }

    /// Typed cell for a declared state slot.
    pub fn state<T: StateValue>(&self, kind: StateKind, name: Option<&str>) -> SessionResult<StateCell<'a, T>> {
        let key = StateKey::of::<T>(name);
        if !self.descriptor.declares_state(kind, &key) {
            return Err(SessionError::UndeclaredState {
                tag: self.descriptor.tag.clone(),
                kind,
                key,
            });
        }
        Ok(StateCell {
            states: self.states,
            kind,
            key,
            _value: PhantomData,
        })
    }

    /// A declared service.
    pub fn service<T: Send + Sync + 'static>(&self) -> SessionResult<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        if !self.descriptor.declares_service(TypeId::of::<T>()) {
            return Err(SessionError::config(format!(
                "command {} did not declare service {type_name}",
                self.descriptor.tag
            )));
        }
        self.services
            .get::<T>()
            .ok_or_else(|| SessionError::config(format!("service {type_name} is not registered")))
    }
}

/// Typed access to one state slot.
pub struct StateCell<'a, T> {
    states: &'a States,
    kind: StateKind,
    key: StateKey,
    _value: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for StateCell<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish()
    }
}

impl<T: StateValue> StateCell<'_, T> {
    pub fn get(&self) -> SessionResult<Option<T>> {
        match self.states.get(self.kind, &self.key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Current value or `default`.
    pub fn get_or(&self, default: T) -> SessionResult<T> {
        Ok(self.get()?.unwrap_or(default))
    }

    /// Set (`Some`) or delete (`None`). Persisted when the call flushes.
    pub fn set(&self, value: Option<T>) -> SessionResult<()> {
        let value = value.as_ref().map(serde_json::to_value).transpose()?;
        self.states.set(self.kind, &self.key, value)?;
        Ok(())
    }

    pub fn is_present(&self) -> SessionResult<bool> {
        self.states.has_value(self.kind, &self.key)
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }
}
