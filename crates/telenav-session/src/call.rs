//! A resolved call: handler, states, context and the root fallback.

use telenav_types::{InputMessage, MessageType};
use tracing::{debug, error, warn};

use crate::command::{HandlerArgs, RegisteredCommand};
use crate::context::CommandContext;
use crate::error::{SessionError, SessionResult};
use crate::session::TurnGuard;
use crate::state::States;

/// Supplier of the fallback call, evaluated only when needed.
pub type DefaultCall = Box<dyn FnOnce() -> SessionResult<CommandCall>>;

enum Target {
    /// No-op button: succeeds without running anything.
    Nothing,
    Handler {
        registered: RegisteredCommand,
        states: States,
        context: CommandContext,
    },
}

/// One executable call.
///
/// A call produced by the resolver carries the user's turn guard; the turn
/// ends when [`execute`](Self::execute) returns or the call is dropped.
pub struct CommandCall {
    target: Target,
    input: InputMessage,
    default: Option<DefaultCall>,
    turn: Option<TurnGuard>,
}

impl std::fmt::Debug for CommandCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("CommandCall");
        match &self.target {
            Target::Nothing => d.field("target", &"nothing"),
            Target::Handler { registered, context, .. } => d
                .field("target", registered.tag())
                .field("block_id", &context.block_id())
                .field("page_id", &context.page_id()),
        };
        d.field("input", &self.input)
            .field("has_default", &self.default.is_some())
            .field("holds_turn", &self.turn.is_some())
            .finish()
    }
}

impl CommandCall {
    pub(crate) fn handler(
        registered: RegisteredCommand,
        states: States,
        context: CommandContext,
        input: InputMessage,
    ) -> Self {
        Self {
            target: Target::Handler {
                registered,
                states,
                context,
            },
            input,
            default: None,
            turn: None,
        }
    }

    pub(crate) fn nothing(input: InputMessage) -> Self {
        Self {
            target: Target::Nothing,
            input,
            default: None,
            turn: None,
        }
    }

    pub(crate) fn with_default(mut self, default: DefaultCall) -> Self {
        self.default = Some(default);
        self
    }

    pub(crate) fn with_turn(mut self, turn: TurnGuard) -> Self {
        self.turn = Some(turn);
        self
    }

    /// The (possibly refresh-rewritten) input the handler will see.
    pub fn input(&self) -> &InputMessage {
        &self.input
    }

    /// Context of the call; `None` for a no-op call.
    pub fn context(&self) -> Option<&CommandContext> {
        match &self.target {
            Target::Handler { context, .. } => Some(context),
            Target::Nothing => None,
        }
    }

    pub fn states(&self) -> Option<&States> {
        match &self.target {
            Target::Handler { states, .. } => Some(states),
            Target::Nothing => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self.target, Target::Nothing)
    }

    /// Run the handler and flush its states.
    ///
    /// States are flushed whether or not the handler succeeded. A text
    /// handler returning `false` hands over to the default call.
    pub fn execute(self) -> SessionResult<bool> {
        let CommandCall {
            target,
            input,
            default,
            turn: _turn,
        } = self;

        let (registered, states, context) = match target {
            Target::Nothing => {
                debug!(query = %input.query, "no-op call");
                return Ok(true);
            }
            Target::Handler {
                registered,
                states,
                context,
            } => (registered, states, context),
        };
        let tag = registered.tag().clone();

        if !registered.can_handle(input.message_type) {
            if input.message_type == MessageType::Text {
                if let Some(default) = default {
                    warn!(command = %tag, query = %input.query, "command cannot handle text input, running default");
                    return default()?.execute();
                }
            }
            return Err(SessionError::Unsupported {
                tag,
                message_type: input.message_type,
            });
        }

        states.trace_dump(&format!(
            "{tag} [{}:{}] block {} page {}",
            input.message_type,
            input.query,
            context.block_id(),
            context.page_id()
        ));

        let runtime = context.runtime().clone();
        let args = HandlerArgs::new(
            &registered.descriptor,
            &input,
            &states,
            &context,
            &runtime.services,
        );
        let outcome = match input.message_type {
            MessageType::Text => registered.command.on_text(&args),
            MessageType::Inline => registered.command.on_inline(&args).map(|()| true),
        };

        debug!(command = %tag, "flushing states");
        let flushed = states.flush();
        let handled = outcome.map_err(|e| SessionError::handler(tag.clone(), e))?;
        flushed?;

        for interceptor in &runtime.interceptors {
            if let Err(e) = interceptor.executed(&tag, &input) {
                error!(command = %tag, "interceptor failed: {e:#}");
            }
        }

        if !handled {
            if let Some(default) = default {
                warn!(command = %tag, query = %input.query, "command did not handle input, running default");
                return default()?.execute();
            }
        }
        Ok(handled)
    }
}
