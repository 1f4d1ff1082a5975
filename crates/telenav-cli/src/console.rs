//! Sender that renders messages to stdout.

use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use telenav_session::{MessageSender, OutgoingMessage};
use telenav_types::MessageId;

/// Prints every send/update/delete and hands out sequential message ids.
#[derive(Debug)]
pub struct ConsoleSender {
    next_id: AtomicI64,
    out: Mutex<std::io::Stdout>,
}

impl ConsoleSender {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            out: Mutex::new(std::io::stdout()),
        }
    }

    fn print(&self, header: &str, message: Option<&OutgoingMessage>) -> anyhow::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{header}")?;
        if let Some(message) = message {
            for line in message.text.lines() {
                writeln!(out, "  | {line}")?;
            }
            for row in &message.keyboard {
                let buttons: Vec<String> = row
                    .iter()
                    .map(|b| format!("[{} <{}>]", b.title, b.data))
                    .collect();
                writeln!(out, "  {}", buttons.join(" "))?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

impl MessageSender for ConsoleSender {
    fn send(&self, chat_id: i64, message: &OutgoingMessage) -> anyhow::Result<MessageId> {
        let message_id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.print(
            &format!("→ send #{message_id} to chat {chat_id} ({})", message.message_type),
            Some(message),
        )?;
        Ok(message_id)
    }

    fn update(&self, chat_id: i64, message_id: MessageId, message: &OutgoingMessage) -> anyhow::Result<()> {
        self.print(&format!("→ edit #{message_id} in chat {chat_id}"), Some(message))
    }

    fn delete(&self, chat_id: i64, message_id: MessageId) -> anyhow::Result<()> {
        self.print(&format!("→ delete #{message_id} in chat {chat_id}"), None)
    }
}
