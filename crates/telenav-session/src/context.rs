//! Per-call handler context: identity of the call plus page-tree operations.
//!
//! A [`CommandContext`] is what a handler uses to render. It knows which
//! block and page the call was resolved to and wraps the session's page
//! operations with message delivery, so "send the message, bind a block to
//! it, save the page" happens in one place.

use std::sync::Arc;

use telenav_types::{
    Block, BlockId, HandlerTag, InputMessage, MessageId, MessageType, Page, PageId, StateDef,
    StateItem, SubCommand, UserId,
};
use tracing::{debug, warn};

use crate::call::CommandCall;
use crate::dispatcher::Runtime;
use crate::error::{SessionError, SessionResult};
use crate::sender::OutgoingMessage;
use crate::session::UserSession;

/// How many blocks [`CommandContext::last_blocks`] returns per call.
pub const LAST_BLOCKS_LIMIT: usize = 10;

// ============================================================================
// PageSpec
// ============================================================================

/// A page to render: message text, buttons, and where it goes.
///
/// `block_id` and `id` default to `NONE`, meaning "the current block" and
/// "the current (or last) page" depending on the operation.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub message: String,
    pub message_type: MessageType,
    /// Handler persisted for the page; the calling command when `None`.
    pub handler: Option<HandlerTag>,
    pub sub_commands: Vec<Vec<SubCommand>>,
    /// Merged into the page's local state after saving.
    pub state: Option<StateDef>,
    pub block_id: BlockId,
    pub id: PageId,
}

impl PageSpec {
    pub fn new(message_type: MessageType, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            message_type,
            handler: None,
            sub_commands: Vec::new(),
            state: None,
            block_id: BlockId::NONE,
            id: PageId::NONE,
        }
    }

    pub fn inline(message: impl Into<String>) -> Self {
        Self::new(MessageType::Inline, message)
    }

    pub fn text(message: impl Into<String>) -> Self {
        Self::new(MessageType::Text, message)
    }

    pub fn with_handler(mut self, handler: impl Into<HandlerTag>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_sub_commands(mut self, rows: Vec<Vec<SubCommand>>) -> Self {
        self.sub_commands = rows;
        self
    }

    /// Append one row of buttons.
    pub fn with_row(mut self, row: impl IntoIterator<Item = SubCommand>) -> Self {
        self.sub_commands.push(row.into_iter().collect());
        self
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.state = Some(state);
        self
    }

    pub fn in_block(mut self, block_id: BlockId) -> Self {
        self.block_id = block_id;
        self
    }

    pub fn with_id(mut self, id: PageId) -> Self {
        self.id = id;
        self
    }
}

// ============================================================================
// CommandContext
// ============================================================================

/// Context of one resolved call.
///
/// Id arguments of the page operations accept `NONE` to mean the call's own
/// block or page.
#[derive(Clone)]
pub struct CommandContext {
    runtime: Arc<Runtime>,
    session: Arc<UserSession>,
    tag: HandlerTag,
    block_id: BlockId,
    page_id: PageId,
    message_id: MessageId,
    input: InputMessage,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("tag", &self.tag)
            .field("block_id", &self.block_id)
            .field("page_id", &self.page_id)
            .field("message_id", &self.message_id)
            .field("input", &self.input)
            .finish()
    }
}

impl CommandContext {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        session: Arc<UserSession>,
        tag: HandlerTag,
        block_id: BlockId,
        page_id: PageId,
        message_id: MessageId,
        input: InputMessage,
    ) -> Self {
        Self {
            runtime,
            session,
            tag,
            block_id,
            page_id,
            message_id,
            input,
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Message the current block is bound to.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Message the input came from (`NONE` for text).
    pub fn input_message_id(&self) -> MessageId {
        self.input.message_id_or_none()
    }

    pub fn input(&self) -> &InputMessage {
        &self.input
    }

    /// Tag of the command being executed.
    pub fn current_command(&self) -> &HandlerTag {
        &self.tag
    }

    pub fn user_id(&self) -> UserId {
        self.input.user_id
    }

    pub fn chat_id(&self) -> i64 {
        self.input.chat_id
    }

    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn or_current_page(&self, page_id: PageId) -> PageId {
        if page_id.is_assigned() { page_id } else { self.page_id }
    }

    fn or_current_block(&self, block_id: BlockId) -> BlockId {
        if block_id.is_assigned() { block_id } else { self.block_id }
    }

    // =========================================================================
    // Page tree
    // =========================================================================

    /// Send a new message and bind a fresh block with one page to it.
    pub fn create_page(&self, spec: PageSpec) -> SessionResult<PageId> {
        self.validate_page_handler(&spec)?;

        let message = self.render(&spec)?;
        let message_id = self.send(&message)?;
        let block = self.session.save_block(message_id, spec.message_type)?;
        let page_id = self.save_spec(&block, spec, PageId::NONE)?;

        debug!(block = %block.id, page = %page_id, message = %message_id, "created page");
        Ok(page_id)
    }

    /// Append a page to `spec.block_id`, the current block, or a new block
    /// when the call has none.
    pub fn add_page(&self, spec: PageSpec) -> SessionResult<PageId> {
        self.validate_page_handler(&spec)?;

        let block_id = self.or_current_block(spec.block_id);
        if block_id.is_none() {
            return self.create_page(spec);
        }
        let block = self.deliver_into(block_id, &spec, "add")?;
        let page_id = self.save_spec(&block, spec, PageId::NONE)?;

        debug!(block = %block.id, page = %page_id, "added page");
        Ok(page_id)
    }

    /// Replace a page in place.
    ///
    /// Target: `spec.id` (its block found when `spec.block_id` is `NONE`),
    /// else the current page of the current block, else a new block. A
    /// `NONE` page id inside an explicit block means its last page.
    pub fn update_page(&self, spec: PageSpec) -> SessionResult<PageId> {
        self.validate_page_handler(&spec)?;

        let (block_id, page_id) = if spec.block_id.is_assigned() {
            (spec.block_id, spec.id)
        } else if spec.id.is_assigned() {
            let block_id = self
                .session
                .find_block_id_by_page_id(spec.id)?
                .ok_or_else(|| SessionError::precondition(format!("block not found by page: {}", spec.id)))?;
            (block_id, spec.id)
        } else if self.block_id.is_none() {
            return self.create_page(spec);
        } else {
            (self.block_id, self.page_id)
        };

        let block = self.deliver_into(block_id, &spec, "update")?;
        let page_id = if page_id.is_assigned() {
            page_id
        } else {
            self.session
                .last_page(block.id)?
                .map(|p| p.id)
                .ok_or_else(|| SessionError::precondition(format!("block {} has no pages", block.id)))?
        };
        let saved = self.save_spec(&block, spec, page_id)?;

        debug!(block = %block.id, page = %saved, "updated page");
        Ok(saved)
    }

    /// Re-run a page's handler with a refresh query, in the same turn.
    ///
    /// Only inline pages can be refreshed; anything else is logged and
    /// skipped. `state` overrides the page's local state for that run.
    pub fn refresh_page(&self, page_id: PageId, state: Option<&StateDef>) -> SessionResult<()> {
        let page_id = self.or_current_page(page_id);
        let Some(page) = self.session.find_page(page_id)? else {
            warn!(page = %page_id, "refresh: page not found");
            return Ok(());
        };
        let block = self.session.require_block(page.block_id)?;
        if block.message_type != MessageType::Inline {
            warn!(
                page = %page_id,
                message_type = %block.message_type,
                "refresh: only inline pages can be refreshed"
            );
            return Ok(());
        }

        let registered = self.runtime.commands.require(&page.handler)?.clone();
        let states = self.session.states_with(block.message_id, state, page_id);
        let mut input = self.input.to_refresh();
        input.message_type = MessageType::Inline;
        input.message_id = Some(block.message_id);

        let context = self.derive(registered.tag().clone(), block.id, page_id, block.message_id, input.clone());
        CommandCall::handler(registered, states, context, input).execute()?;
        Ok(())
    }

    /// Remove a page. The previous page of an inline block is re-rendered;
    /// removing the only page deletes the block and its message.
    pub fn delete_page(&self, page_id: PageId) -> SessionResult<()> {
        let page_id = self.or_current_page(page_id);
        let Some(block) = self.session.find_block_by_page(page_id)? else {
            warn!(page = %page_id, "delete: page not found");
            return Ok(());
        };

        let pages = self.session.pages(block.id)?;
        if pages.len() > 1 {
            self.session.remove_page(page_id)?;
            if block.message_type == MessageType::Inline {
                if let Some(last) = pages.iter().rev().find(|p| p.id != page_id) {
                    self.refresh_page(last.id, None)?;
                }
            }
        } else {
            self.session.delete_block(block.id)?;
            self.unsend(block.message_id)?;
        }
        Ok(())
    }

    /// Delete a block with all its pages and its message.
    pub fn delete_block(&self, block_id: BlockId) -> SessionResult<()> {
        let block_id = self.or_current_block(block_id);
        match self.session.find_block(block_id)? {
            Some(block) => {
                self.session.delete_block(block.id)?;
                self.unsend(block.message_id)
            }
            None => {
                warn!(block = %block_id, "delete: block not found");
                Ok(())
            }
        }
    }

    /// Delete a message and the block bound to it, if any.
    pub fn delete_message(&self, message_id: MessageId) -> SessionResult<()> {
        if let Some(block) = self.session.block_by_message_id(message_id)? {
            self.session.delete_block(block.id)?;
        }
        self.unsend(message_id)
    }

    /// True when the page is the last (shown) page of its block.
    pub fn page_visible(&self, page_id: PageId) -> SessionResult<bool> {
        let page_id = self.or_current_page(page_id);
        if page_id.is_none() {
            return Ok(false);
        }
        let Some(block) = self.session.find_block_by_page(page_id)? else {
            return Ok(false);
        };
        Ok(self.session.last_page(block.id)?.is_some_and(|p| p.id == page_id))
    }

    pub fn page_exists(&self, page_id: PageId) -> SessionResult<bool> {
        self.session.page_exists(self.or_current_page(page_id))
    }

    pub fn block_exists(&self, block_id: BlockId) -> SessionResult<bool> {
        self.session.block_exists(self.or_current_block(block_id))
    }

    /// Newest-first blocks of the user, [`LAST_BLOCKS_LIMIT`] at a time.
    pub fn last_blocks(&self, offset: usize) -> SessionResult<Vec<Block>> {
        self.session.last_blocks(offset, LAST_BLOCKS_LIMIT)
    }

    pub fn last_block(&self) -> SessionResult<Option<Block>> {
        self.session.last_block()
    }

    pub fn block_pages(&self, block_id: BlockId) -> SessionResult<Vec<Page>> {
        self.session.pages(self.or_current_block(block_id))
    }

    pub fn page_state(&self, page_id: PageId) -> SessionResult<Vec<StateItem>> {
        self.session.page_state(self.or_current_page(page_id))
    }

    pub fn block_state(&self, block_id: BlockId) -> SessionResult<Vec<StateItem>> {
        self.session.block_state(self.or_current_block(block_id))
    }

    /// Copy the current block under another message, e.g. after re-posting
    /// it at the bottom of the chat. Returns the copy's last page.
    pub fn promote_block(&self, new_message_id: MessageId) -> SessionResult<Page> {
        if self.block_id.is_none() {
            return Err(SessionError::precondition("no current block to promote"));
        }
        self.session.clone_from_block(self.block_id, new_message_id)
    }

    // =========================================================================
    // Nested calls and plain messages
    // =========================================================================

    /// Run another command on text input, outside any block.
    pub fn execute_text_command(&self, tag: &HandlerTag, text: &str) -> SessionResult<bool> {
        let registered = self.runtime.commands.require(tag)?.clone();
        let mut input = self.input.with_query(text);
        input.message_type = MessageType::Text;
        input.message_id = None;

        let context = self.derive(tag.clone(), BlockId::NONE, PageId::NONE, MessageId::NONE, input.clone());
        CommandCall::handler(registered, self.session.root_states(), context, input).execute()
    }

    /// Run another command on an inline query against the input's message.
    pub fn execute_inline_command(&self, tag: &HandlerTag, query: &str) -> SessionResult<bool> {
        let Some(message_id) = self.input.message_id else {
            return Err(SessionError::precondition(
                "inline command needs an inline message",
            ));
        };
        let registered = self.runtime.commands.require(tag)?.clone();
        let mut input = self.input.with_query(query);
        input.message_type = MessageType::Inline;
        input.message_id = Some(message_id);

        let context = self.derive(tag.clone(), BlockId::NONE, PageId::NONE, MessageId::NONE, input.clone());
        CommandCall::handler(registered, self.session.root_states(), context, input).execute()
    }

    /// Send a plain text message that is not bound to any block.
    pub fn send_message(&self, text: impl Into<String>) -> SessionResult<MessageId> {
        self.send(&OutgoingMessage::new(MessageType::Text, text))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn derive(
        &self,
        tag: HandlerTag,
        block_id: BlockId,
        page_id: PageId,
        message_id: MessageId,
        input: InputMessage,
    ) -> Self {
        Self::new(
            self.runtime.clone(),
            self.session.clone(),
            tag,
            block_id,
            page_id,
            message_id,
            input,
        )
    }

    fn render(&self, spec: &PageSpec) -> SessionResult<OutgoingMessage> {
        let buttons = self.session.to_command_defs(spec.sub_commands.clone())?;
        Ok(OutgoingMessage::new(spec.message_type, spec.message.clone()).with_keyboard(&buttons))
    }

    fn send(&self, message: &OutgoingMessage) -> SessionResult<MessageId> {
        self.runtime
            .sender
            .send(self.input.chat_id, message)
            .map_err(SessionError::Delivery)
    }

    fn unsend(&self, message_id: MessageId) -> SessionResult<()> {
        self.runtime
            .sender
            .delete(self.input.chat_id, message_id)
            .map_err(SessionError::Delivery)
    }

    /// Deliver a page into an existing block: text blocks get a new
    /// message, inline blocks have their message edited.
    fn deliver_into(&self, block_id: BlockId, spec: &PageSpec, op: &str) -> SessionResult<Block> {
        let block = self.session.require_block(block_id)?;
        if spec.message_type != block.message_type {
            return Err(SessionError::precondition(format!(
                "{op} page: message type {} does not match block {} of type {}",
                spec.message_type, block.id, block.message_type
            )));
        }

        let message = self.render(spec)?;
        match block.message_type {
            MessageType::Text => {
                self.send(&message)?;
            }
            MessageType::Inline => {
                self.runtime
                    .sender
                    .update(self.input.chat_id, block.message_id, &message)
                    .map_err(SessionError::Delivery)?;
            }
        }
        Ok(block)
    }

    fn save_spec(&self, block: &Block, spec: PageSpec, page_id: PageId) -> SessionResult<PageId> {
        let handler = spec.handler.unwrap_or_else(|| self.tag.clone());
        let page = self
            .session
            .save_page(block.id, &handler, spec.sub_commands, page_id)?;
        if let Some(state) = &spec.state {
            self.session.merge_local_state(page.id, state)?;
        }
        Ok(page.id)
    }

    /// Every handler a page can route to must accept the page's input type.
    fn validate_page_handler(&self, spec: &PageSpec) -> SessionResult<()> {
        if let Some(handler) = &spec.handler {
            if spec.message_type == MessageType::Text {
                self.check_handler(handler, MessageType::Text)?;
            }
        }

        for sub in spec.sub_commands.iter().flatten() {
            if sub.is_system_command() {
                continue;
            }
            match &sub.handler {
                Some(handler) => self.check_handler(handler, spec.message_type)?,
                None if spec.message_type == MessageType::Inline => {
                    let page_handler = spec.handler.as_ref().unwrap_or(&self.tag);
                    self.check_handler(page_handler, MessageType::Inline)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn check_handler(&self, tag: &HandlerTag, message_type: MessageType) -> SessionResult<()> {
        let registered = self.runtime.commands.require(tag)?;
        if !registered.can_handle(message_type) {
            return Err(SessionError::precondition(format!(
                "command {tag} cannot handle {message_type} input"
            )));
        }
        Ok(())
    }
}
