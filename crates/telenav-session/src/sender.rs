//! Outgoing message boundary.
//!
//! The engine never formats wire messages itself. Page operations hand a
//! [`OutgoingMessage`] to a [`MessageSender`], which renders and delivers it
//! and reports the message id the messenger assigned.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use telenav_types::{CommandDef, MessageId, MessageType};

/// One keyboard button as the sender should render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    /// Text shown on the button.
    pub title: String,
    /// Callback data for inline buttons (the title id).
    pub data: String,
}

impl From<&CommandDef> for Button {
    fn from(def: &CommandDef) -> Self {
        Self {
            title: def.title.clone(),
            data: def.title_id.clone(),
        }
    }
}

/// A message body plus its keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub message_type: MessageType,
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn new(message_type: MessageType, text: impl Into<String>) -> Self {
        Self {
            message_type,
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    /// Keyboard from persisted button rows; empty rows are dropped.
    pub fn with_keyboard(mut self, rows: &[Vec<CommandDef>]) -> Self {
        self.keyboard = rows
            .iter()
            .map(|row| row.iter().map(Button::from).collect::<Vec<_>>())
            .filter(|row| !row.is_empty())
            .collect();
        self
    }
}

/// Delivers messages to a chat.
pub trait MessageSender: Send + Sync {
    /// Send a new message; returns its id.
    fn send(&self, chat_id: i64, message: &OutgoingMessage) -> anyhow::Result<MessageId>;

    /// Replace the content of an existing message.
    fn update(&self, chat_id: i64, message_id: MessageId, message: &OutgoingMessage) -> anyhow::Result<()>;

    fn delete(&self, chat_id: i64, message_id: MessageId) -> anyhow::Result<()>;
}

/// What a [`MemorySender`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEvent {
    Sent { chat_id: i64, message_id: MessageId, message: OutgoingMessage },
    Updated { chat_id: i64, message_id: MessageId, message: OutgoingMessage },
    Deleted { chat_id: i64, message_id: MessageId },
}

/// Sender that records every request and hands out sequential message ids.
#[derive(Debug)]
pub struct MemorySender {
    next_id: AtomicI64,
    events: Mutex<Vec<SentEvent>>,
}

impl Default for MemorySender {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySender {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// First message id to assign.
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            next_id: AtomicI64::new(first_id),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SentEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<SentEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Most recent message that was sent or updated.
    pub fn last_message(&self) -> Option<(MessageId, OutgoingMessage)> {
        self.events.lock().iter().rev().find_map(|e| match e {
            SentEvent::Sent { message_id, message, .. }
            | SentEvent::Updated { message_id, message, .. } => Some((*message_id, message.clone())),
            SentEvent::Deleted { .. } => None,
        })
    }
}

impl MessageSender for MemorySender {
    fn send(&self, chat_id: i64, message: &OutgoingMessage) -> anyhow::Result<MessageId> {
        let message_id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().push(SentEvent::Sent {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(message_id)
    }

    fn update(&self, chat_id: i64, message_id: MessageId, message: &OutgoingMessage) -> anyhow::Result<()> {
        self.events.lock().push(SentEvent::Updated {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(())
    }

    fn delete(&self, chat_id: i64, message_id: MessageId) -> anyhow::Result<()> {
        self.events.lock().push(SentEvent::Deleted { chat_id, message_id });
        Ok(())
    }
}
