//! Entry point: wiring plus `dispatch(input)`.

use std::sync::Arc;

use telenav_types::{HandlerTag, InputMessage, UserId};
use tracing::debug;

use crate::call::CommandCall;
use crate::command::{Command, CommandInterceptor, CommandRegistry, ServiceRegistry};
use crate::config::{ConfigError, TelenavConfig};
use crate::error::{SessionError, SessionResult};
use crate::localize::{Localizer, StaticLocalizer};
use crate::resolver::CallContextResolver;
use crate::sender::MessageSender;
use crate::session::{SessionRegistry, UserSession};
use crate::store::{MemoryStore, StateStore};

/// Everything a call needs, shared by all calls.
pub(crate) struct Runtime {
    pub(crate) commands: CommandRegistry,
    pub(crate) services: ServiceRegistry,
    pub(crate) sender: Arc<dyn MessageSender>,
    pub(crate) interceptors: Vec<Arc<dyn CommandInterceptor>>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) root: HandlerTag,
}

/// Resolves and executes input messages.
pub struct Dispatcher {
    runtime: Arc<Runtime>,
    resolver: CallContextResolver,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("root", &self.runtime.root)
            .field("commands", &self.runtime.commands)
            .field("services", &self.runtime.services)
            .field("sessions", &self.runtime.sessions)
            .finish()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Resolve and execute one input. `Ok(false)` means nothing handled it.
    pub fn dispatch(&self, input: &InputMessage) -> SessionResult<bool> {
        debug!(
            user = %input.user_id,
            message_type = %input.message_type,
            query = %input.query,
            "dispatch"
        );
        self.resolve(input)?.execute()
    }

    /// Resolve without executing. The call holds the user's turn until it
    /// is executed or dropped.
    pub fn resolve(&self, input: &InputMessage) -> SessionResult<CommandCall> {
        self.resolver.resolve(input)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.runtime.sessions
    }

    pub fn session(&self, user_id: UserId) -> Arc<UserSession> {
        self.runtime.sessions.session(user_id)
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.runtime.commands
    }

    pub fn root(&self) -> &HandlerTag {
        &self.runtime.root
    }
}

/// Builder for [`Dispatcher`].
///
/// The store defaults to a [`MemoryStore`] and the localizer to English
/// system titles. A sender and a root command are required.
#[derive(Default)]
pub struct DispatcherBuilder {
    commands: Vec<Arc<dyn Command>>,
    services: ServiceRegistry,
    store: Option<Arc<dyn StateStore>>,
    localizer: Option<Arc<dyn Localizer>>,
    sender: Option<Arc<dyn MessageSender>>,
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    root: Option<HandlerTag>,
}

impl DispatcherBuilder {
    /// Apply a loaded config: root command, store and titles.
    pub fn with_config(self, config: &TelenavConfig) -> Result<Self, ConfigError> {
        let store = config.open_store()?;
        Ok(self
            .with_store(store)
            .with_localizer(Arc::new(config.localizer()))
            .with_root(config.root_command.as_str()))
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_command(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    pub fn with_shared_command(mut self, command: Arc<dyn Command>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_service<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(service);
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_root(mut self, tag: impl Into<HandlerTag>) -> Self {
        self.root = Some(tag.into());
        self
    }

    /// Register commands, check their services and the root command.
    pub fn build(self) -> SessionResult<Dispatcher> {
        let mut commands = CommandRegistry::new();
        for command in self.commands {
            commands.register(command)?;
        }
        commands.validate_services(&self.services)?;

        let root = self
            .root
            .ok_or_else(|| SessionError::config("no root command set"))?;
        let sender = self
            .sender
            .ok_or_else(|| SessionError::config("no message sender set"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let localizer = self
            .localizer
            .unwrap_or_else(|| Arc::new(StaticLocalizer::with_system_defaults()));

        let runtime = Arc::new(Runtime {
            commands,
            services: self.services,
            sender,
            interceptors: self.interceptors,
            sessions: SessionRegistry::new(store, localizer),
            root,
        });
        let resolver = CallContextResolver::new(runtime.clone())?;
        debug!(root = %runtime.root, commands = runtime.commands.len(), "dispatcher ready");
        Ok(Dispatcher { runtime, resolver })
    }
}
