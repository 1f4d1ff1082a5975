//! Turns an input message into a bound [`CommandCall`].
//!
//! Resolution runs under the user's turn lock:
//!
//! ```text
//! input ──► current block ──► last page ──► matched button ──► behaviour ──► call
//!               │ none            │ none          │ none
//!               ▼                 ▼               ▼
//!             root              root       page's own handler
//! ```

use std::sync::Arc;

use telenav_types::{
    Block, BlockId, CommandBehaviour, CommandDef, HandlerTag, InputMessage, MessageType, Page, PageId,
    StateDef, SystemCommand,
};
use tracing::{debug, warn};

use crate::call::CommandCall;
use crate::context::CommandContext;
use crate::dispatcher::Runtime;
use crate::error::{SessionError, SessionResult};
use crate::session::UserSession;

/// Routes input to commands using the user's persisted page tree.
#[derive(Clone)]
pub struct CallContextResolver {
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for CallContextResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContextResolver")
            .field("root", &self.runtime.root)
            .finish_non_exhaustive()
    }
}

impl CallContextResolver {
    /// Fails unless the root command is registered and accepts text input.
    pub(crate) fn new(runtime: Arc<Runtime>) -> SessionResult<Self> {
        let root = runtime
            .commands
            .get(&runtime.root)
            .ok_or_else(|| SessionError::config(format!("root command {} is not registered", runtime.root)))?;
        if !root.can_handle(MessageType::Text) {
            return Err(SessionError::config(format!(
                "root command {} must handle text input",
                runtime.root
            )));
        }
        Ok(Self { runtime })
    }

    /// Resolve `input`. The returned call holds the user's turn.
    pub fn resolve(&self, input: &InputMessage) -> SessionResult<CommandCall> {
        let session = self.runtime.sessions.session(input.user_id);
        let turn = session.lock_turn();
        let call = self.resolve_locked(&session, input)?;
        Ok(call.with_turn(turn))
    }

    fn resolve_locked(&self, session: &Arc<UserSession>, input: &InputMessage) -> SessionResult<CommandCall> {
        let block = match (input.message_type, input.message_id) {
            (MessageType::Text, _) => session.last_block()?,
            (MessageType::Inline, Some(message_id)) => session.block_by_message_id(message_id)?,
            (MessageType::Inline, None) => None,
        };
        let Some(block) = block else {
            warn!(user = %input.user_id, query = %input.query, "block not found for input");
            return self.root_call(session, input);
        };
        let Some(page) = session.last_page(block.id)? else {
            warn!(user = %input.user_id, block = %block.id, "block has no pages");
            return self.root_call(session, input);
        };

        match self.find_command_def(&block, &page, input) {
            Some(def) => self.call_by_def(session, input, &block, &page, def),
            None => self.call_by_behaviour(
                session,
                input,
                &block,
                &page.handler,
                input.clone(),
                page.id,
                CommandBehaviour::ParentPageState,
                None,
            ),
        }
    }

    /// Button pressed or typed on `page`, or a system command.
    ///
    /// Only input of the block's own type can match.
    fn find_command_def(&self, block: &Block, page: &Page, input: &InputMessage) -> Option<CommandDef> {
        if block.message_type != input.message_type {
            return None;
        }
        let def = page
            .find_command(block.message_type, &input.query)
            .cloned()
            .or_else(|| self.parse_system_command(block.message_type, &input.query));
        debug!(query = %input.query, matched = ?def.as_ref().map(|d| &d.title_id), "matched button");
        def
    }

    fn parse_system_command(&self, message_type: MessageType, query: &str) -> Option<CommandDef> {
        let localizer = self.runtime.sessions.localizer();
        let cmd = match message_type {
            MessageType::Inline => SystemCommand::parse(query),
            MessageType::Text => SystemCommand::all().find(|c| localizer.title(c.id()) == query),
        }?;
        Some(CommandDef::system(cmd, localizer.title(cmd.id())))
    }

    fn call_by_def(
        &self,
        session: &Arc<UserSession>,
        input: &InputMessage,
        block: &Block,
        page: &Page,
        def: CommandDef,
    ) -> SessionResult<CommandCall> {
        let parent = CommandBehaviour::ParentPageState;

        if def.is_back_command() {
            let pages = session.pages(block.id)?;
            if let [.., previous, _] = pages.as_slice() {
                debug!(block = %block.id, from = %page.id, to = %previous.id, "going back");
                session.remove_page(page.id)?;
                return self.call_by_behaviour(
                    session,
                    input,
                    block,
                    &previous.handler,
                    input.to_refresh(),
                    previous.id,
                    parent,
                    None,
                );
            }
            return self.call_by_behaviour(
                session,
                input,
                block,
                &page.handler,
                input.to_refresh(),
                page.id,
                parent,
                None,
            );
        }

        if def.is_refresh_command() {
            return self.call_by_behaviour(
                session,
                input,
                block,
                &page.handler,
                input.to_refresh(),
                page.id,
                parent,
                None,
            );
        }

        if def.is_nothing_command() {
            return Ok(CommandCall::nothing(input.clone()));
        }

        let CommandDef {
            handler,
            behaviour,
            state,
            ..
        } = def;
        match handler.filter(|h| !h.is_blank()) {
            Some(handler) => self.call_by_behaviour(
                session,
                input,
                block,
                &handler,
                input.to_refresh(),
                page.id,
                behaviour.unwrap_or(parent),
                state,
            ),
            None => self.call_by_behaviour(
                session,
                input,
                block,
                &page.handler,
                input.clone(),
                page.id,
                parent,
                state,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn call_by_behaviour(
        &self,
        session: &Arc<UserSession>,
        origin: &InputMessage,
        block: &Block,
        tag: &HandlerTag,
        input: InputMessage,
        page_id: PageId,
        behaviour: CommandBehaviour,
        state: Option<StateDef>,
    ) -> SessionResult<CommandCall> {
        let Some(registered) = self.runtime.commands.get(tag).cloned() else {
            warn!(command = %tag, block = %block.id, "persisted handler is not registered, using root");
            return self.root_call(session, origin);
        };

        let (states, page_id) = match behaviour {
            CommandBehaviour::SeparatePage => {
                let page = session.save_page(block.id, tag, Vec::new(), PageId::NONE)?;
                if let Some(state) = &state {
                    session.merge_local_state(page.id, state)?;
                }
                (session.states_for_page(block.message_id, page.id), page.id)
            }
            CommandBehaviour::ParentPage => (
                session.states_with(block.message_id, state.as_ref(), PageId::NONE),
                page_id,
            ),
            CommandBehaviour::ParentPageState => (
                session.states_with(block.message_id, state.as_ref(), page_id),
                page_id,
            ),
        };
        debug!(
            command = %tag,
            block = %block.id,
            page = %page_id,
            %behaviour,
            query = %input.query,
            "resolved call"
        );

        let context = CommandContext::new(
            self.runtime.clone(),
            session.clone(),
            tag.clone(),
            block.id,
            page_id,
            block.message_id,
            input.clone(),
        );
        let resolver = self.clone();
        let fallback_session = session.clone();
        let fallback_input = origin.clone();
        Ok(CommandCall::handler(registered, states, context, input)
            .with_default(Box::new(move || resolver.root_call(&fallback_session, &fallback_input))))
    }

    /// Root command outside any block. Never has a default of its own.
    fn root_call(&self, session: &Arc<UserSession>, input: &InputMessage) -> SessionResult<CommandCall> {
        let registered = self.runtime.commands.require(&self.runtime.root)?.clone();
        debug!(command = %registered.tag(), query = %input.query, "root call");
        let context = CommandContext::new(
            self.runtime.clone(),
            session.clone(),
            registered.tag().clone(),
            BlockId::NONE,
            PageId::NONE,
            input.message_id_or_none(),
            input.clone(),
        );
        Ok(CommandCall::handler(
            registered,
            session.root_states(),
            context,
            input.clone(),
        ))
    }
}
