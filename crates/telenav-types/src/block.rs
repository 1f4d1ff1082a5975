//! Blocks and pages: the per-user navigation tree.
//!
//! A [`Block`] is one chat message the bot keeps alive; the ordered [`Page`]s
//! under it are the screens rendered into that message. The last page is the
//! one the user currently sees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::command::{CommandDef, HandlerTag};
use crate::ids::{BlockId, MessageId, PageId, UserId};
use crate::now_millis;

/// Kind of chat input, and of the message a block is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum MessageType {
    /// Plain text typed by the user (reply keyboard buttons included).
    Text,
    /// Callback query from an inline keyboard button.
    #[strum(serialize = "inline", serialize = "callback")]
    Inline,
}

impl MessageType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Inline => "inline",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity failed its structural checks.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("block for user {user} has no message id")]
    MissingMessage { user: UserId },
    #[error("block for message {message} has no user id")]
    MissingUser { message: MessageId },
    #[error("page {page} is not attached to a block")]
    MissingBlock { page: PageId },
    #[error("page {page} in block {block} has no handler")]
    MissingHandler { page: PageId, block: BlockId },
}

// ============================================================================
// Block
// ============================================================================

/// One live chat message carrying navigation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub message_type: MessageType,
    pub created_at: u64,
}

impl Block {
    /// A block not yet saved (id is `NONE`).
    pub fn new(user_id: UserId, message_id: MessageId, message_type: MessageType) -> Self {
        Self {
            id: BlockId::NONE,
            message_id,
            user_id,
            message_type,
            created_at: now_millis(),
        }
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        if self.message_id.is_none() {
            return Err(EntityError::MissingMessage { user: self.user_id });
        }
        if self.user_id.is_none() {
            return Err(EntityError::MissingUser {
                message: self.message_id,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Page
// ============================================================================

/// One screen under a block, with its button grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub block_id: BlockId,
    pub handler: HandlerTag,
    #[serde(default)]
    pub command_defs: Vec<Vec<CommandDef>>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Page {
    /// A page not yet saved (id is `NONE`, so saving appends).
    pub fn new(block_id: BlockId, handler: HandlerTag, command_defs: Vec<Vec<CommandDef>>) -> Self {
        let now = now_millis();
        Self {
            id: PageId::NONE,
            block_id,
            handler,
            command_defs,
            created_at: now,
            updated_at: now,
        }
    }

    /// Target an existing page id; saving replaces it in place.
    pub fn with_id(mut self, id: PageId) -> Self {
        self.id = id;
        self
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        if !self.block_id.is_assigned() {
            return Err(EntityError::MissingBlock { page: self.id });
        }
        if self.handler.is_blank() {
            return Err(EntityError::MissingHandler {
                page: self.id,
                block: self.block_id,
            });
        }
        Ok(())
    }

    pub fn commands(&self) -> impl Iterator<Item = &CommandDef> {
        self.command_defs.iter().flatten()
    }

    /// Find a button matching a user query.
    ///
    /// Text input matches the displayed title; inline callbacks carry the
    /// title id.
    pub fn find_command(&self, message_type: MessageType, query: &str) -> Option<&CommandDef> {
        match message_type {
            MessageType::Text => self.commands().find(|c| c.title == query),
            MessageType::Inline => self.commands().find(|c| c.title_id == query),
        }
    }
}
