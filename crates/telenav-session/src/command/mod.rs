//! Command registry and handler-facing types.
//!
//! Commands are stateless handlers registered under a stable [`HandlerTag`].
//! Each one describes itself with a [`CommandDescriptor`]: which message
//! types it accepts and which parameter slots (query, message id, state,
//! services) it reads. The registry validates descriptors up front so a
//! misdeclared handler fails at startup, not on a user's tap. Whether a
//! declared entry point has a body is only known when it is called: the
//! default bodies fail with a handler error.

mod args;
mod services;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use telenav_types::{HandlerTag, InputMessage, MessageType, StateKey, StateKind, StateValue};

use crate::error::{SessionError, SessionResult};

pub use args::{HandlerArgs, StateCell};
pub use services::ServiceRegistry;

// ============================================================================
// Descriptor
// ============================================================================

/// One input a handler reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSlot {
    /// The (possibly refresh-rewritten) query text.
    Query,
    /// Id of the message the current block is bound to.
    MessageId,
    /// A typed value in one state scope.
    State { kind: StateKind, key: StateKey },
    /// A shared service from the [`ServiceRegistry`].
    Service {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// The call's [`CommandContext`](crate::CommandContext).
    Context,
}

/// Static description of a command, built once at registration.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub tag: HandlerTag,
    pub text: bool,
    pub inline: bool,
    pub params: Vec<ParamSlot>,
}

impl CommandDescriptor {
    pub fn new(tag: impl Into<HandlerTag>) -> Self {
        Self {
            tag: tag.into(),
            text: false,
            inline: false,
            params: Vec::new(),
        }
    }

    /// Accept text input (`Command::on_text`).
    pub fn text(mut self) -> Self {
        self.text = true;
        self
    }

    /// Accept inline callbacks (`Command::on_inline`).
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn query(mut self) -> Self {
        self.params.push(ParamSlot::Query);
        self
    }

    pub fn message_id(mut self) -> Self {
        self.params.push(ParamSlot::MessageId);
        self
    }

    pub fn context(mut self) -> Self {
        self.params.push(ParamSlot::Context);
        self
    }

    /// Declare a typed state slot.
    pub fn state<T: StateValue>(mut self, kind: StateKind, name: Option<&str>) -> Self {
        self.params.push(ParamSlot::State {
            kind,
            key: StateKey::of::<T>(name),
        });
        self
    }

    /// Declare a service dependency.
    pub fn service<T: Send + Sync + 'static>(mut self) -> Self {
        self.params.push(ParamSlot::Service {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        });
        self
    }

    pub fn can_handle(&self, message_type: MessageType) -> bool {
        match message_type {
            MessageType::Text => self.text,
            MessageType::Inline => self.inline,
        }
    }

    /// True if `key` was declared under `kind`.
    pub fn declares_state(&self, kind: StateKind, key: &StateKey) -> bool {
        self.params.iter().any(|p| {
            matches!(p, ParamSlot::State { kind: k, key: declared } if *k == kind && declared == key)
        })
    }

    pub fn declares_service(&self, type_id: TypeId) -> bool {
        self.params
            .iter()
            .any(|p| matches!(p, ParamSlot::Service { type_id: t, .. } if *t == type_id))
    }

    fn validate(&self) -> SessionResult<()> {
        if self.tag.is_blank() {
            return Err(SessionError::config("command tag must not be blank"));
        }
        if !self.text && !self.inline {
            return Err(SessionError::config(format!(
                "command {} declares no entry point",
                self.tag
            )));
        }
        let mut seen: HashMap<&StateKey, StateKind> = HashMap::new();
        for param in &self.params {
            if let ParamSlot::State { kind, key } = param {
                if let Some(other) = seen.insert(key, *kind) {
                    if other != *kind {
                        return Err(SessionError::config(format!(
                            "command {}: state {key} declared as both {other} and {kind}",
                            self.tag
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Command
// ============================================================================

/// A stateless command handler.
///
/// Entry points not declared in the descriptor are never called. A declared
/// entry point left at its default body fails when called.
pub trait Command: Send + Sync {
    fn descriptor(&self) -> CommandDescriptor;

    /// Handle text input. Returning `false` hands the input to the root
    /// command.
    fn on_text(&self, args: &HandlerArgs<'_>) -> anyhow::Result<bool> {
        anyhow::bail!("{} has no text handler (query {:?})", self.descriptor().tag, args.query())
    }

    /// Handle an inline callback.
    fn on_inline(&self, args: &HandlerArgs<'_>) -> anyhow::Result<()> {
        anyhow::bail!("{} has no inline handler (query {:?})", self.descriptor().tag, args.query())
    }
}

/// Observer notified after every successful handler run.
///
/// Errors are logged by the caller and never fail the call.
pub trait CommandInterceptor: Send + Sync {
    fn executed(&self, tag: &HandlerTag, input: &InputMessage) -> anyhow::Result<()>;
}

// ============================================================================
// Registry
// ============================================================================

/// A command with the descriptor captured at registration.
#[derive(Clone)]
pub struct RegisteredCommand {
    pub descriptor: Arc<CommandDescriptor>,
    pub command: Arc<dyn Command>,
}

impl RegisteredCommand {
    pub fn tag(&self) -> &HandlerTag {
        &self.descriptor.tag
    }

    pub fn can_handle(&self, message_type: MessageType) -> bool {
        self.descriptor.can_handle(message_type)
    }
}

impl std::fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry of commands by tag.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<HandlerTag, RegisteredCommand>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its descriptor's tag.
    pub fn register(&mut self, command: Arc<dyn Command>) -> SessionResult<()> {
        let descriptor = command.descriptor();
        descriptor.validate()?;
        if self.commands.contains_key(&descriptor.tag) {
            return Err(SessionError::config(format!(
                "command {} registered twice",
                descriptor.tag
            )));
        }
        self.commands.insert(
            descriptor.tag.clone(),
            RegisteredCommand {
                descriptor: Arc::new(descriptor),
                command,
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, command: impl Command + 'static) -> SessionResult<Self> {
        self.register(Arc::new(command))?;
        Ok(self)
    }

    pub fn get(&self, tag: &HandlerTag) -> Option<&RegisteredCommand> {
        self.commands.get(tag)
    }

    /// Command by tag or `UnknownCommand`.
    pub fn require(&self, tag: &HandlerTag) -> SessionResult<&RegisteredCommand> {
        self.get(tag)
            .ok_or_else(|| SessionError::UnknownCommand(tag.clone()))
    }

    pub fn contains(&self, tag: &HandlerTag) -> bool {
        self.commands.contains_key(tag)
    }

    /// All registered tags, sorted.
    pub fn tags(&self) -> Vec<&HandlerTag> {
        let mut tags: Vec<_> = self.commands.keys().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Check that every declared service is available.
    pub fn validate_services(&self, services: &ServiceRegistry) -> SessionResult<()> {
        for registered in self.commands.values() {
            for param in &registered.descriptor.params {
                if let ParamSlot::Service { type_id, type_name } = param {
                    if !services.contains_type(*type_id) {
                        return Err(SessionError::config(format!(
                            "command {} needs service {type_name}, which is not registered",
                            registered.tag()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
