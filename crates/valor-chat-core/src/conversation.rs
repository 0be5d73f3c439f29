//! Conversation state.
//!
//! An ordered, append-only list of messages. The only in-place mutation is
//! growing the content of an existing message while its response streams in,
//! plus a wholesale replacement used to report a failed turn.

use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing.
    User,
    /// The model.
    Assistant,
}

impl Role {
    /// Wire and display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Name and MIME type of a file sent with a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl AttachmentMeta {
    /// Whether the attachment is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identity assigned at creation.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Text content; grows by append while streaming.
    pub content: String,
    /// Files sent with the message.
    pub attachments: Vec<AttachmentMeta>,
}

/// One prior turn as transmitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author.
    pub role: Role,
    /// Text content.
    pub content: String,
}

/// The ordered message list for one chat session.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    open: Option<MessageId>,
}

impl ConversationState {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new message at the end and return its identity.
    ///
    /// An assistant message becomes the one open for streaming appends.
    pub fn append_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        attachments: Vec<AttachmentMeta>,
    ) -> MessageId {
        let id = MessageId::generate();
        self.messages.push(Message {
            id,
            role,
            content: content.into(),
            attachments,
        });
        if role == Role::Assistant {
            self.open = Some(id);
        }
        id
    }

    /// Concatenate `delta` onto a message's content, byte for byte.
    ///
    /// Unknown ids are ignored.
    pub fn append_to_message(&mut self, id: MessageId, delta: &str) {
        match self.find_mut(id) {
            Some(message) => message.content.push_str(delta),
            None => tracing::warn!(message_id = %id, "append to unknown message ignored"),
        }
    }

    /// Overwrite a message's content. Unknown ids are ignored.
    pub fn replace_message_content(&mut self, id: MessageId, content: impl Into<String>) {
        match self.find_mut(id) {
            Some(message) => message.content = content.into(),
            None => tracing::warn!(message_id = %id, "replace on unknown message ignored"),
        }
    }

    /// Stop treating the open assistant message as pending.
    pub fn close_open_message(&mut self) {
        self.open = None;
    }

    /// The assistant message currently open for appends, if any.
    #[must_use]
    pub fn open_message(&self) -> Option<MessageId> {
        self.open
    }

    /// Prior turns as `{role, content}` pairs for the backend.
    ///
    /// Attachments are dropped, as is the assistant message still open for
    /// appends. Settled messages are kept even when their content is empty.
    #[must_use]
    pub fn snapshot_history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter(|m| Some(m.id) != self.open)
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Look up a message by identity.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    /// All messages in render order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // The streaming target is almost always the last message.
    fn find_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }
}
