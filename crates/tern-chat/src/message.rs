//! Timeline entries

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tern_wire::AttachmentRef;
use uuid::Uuid;

use crate::{attachment::AttachmentId, preview::PreviewHandle};

/// Identifies one message in the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Groups a user message with the assistant output it produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a message is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Sent by the user
    User,
    /// Assistant answer text
    Assistant,
    /// Assistant is working (tool use, status) but has produced no text yet
    Thinking,
    /// The turn failed, was stopped, or was interrupted
    Error,
    /// Waiting for the first record
    Loading,
}

/// An attachment that has been sent with a message. Read-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentAttachment {
    pub id: AttachmentId,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
    /// Local preview, owned by the message once sent
    #[serde(skip)]
    pub preview: Option<Arc<PreviewHandle>>,
}

impl SentAttachment {
    /// Reference sent to the backend
    pub fn to_ref(&self) -> AttachmentRef {
        AttachmentRef {
            url: self.url.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

/// One entry in the chat timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub turn_id: TurnId,
    pub kind: MessageKind,
    pub content: String,
    /// Latest progress text reported for this message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SentAttachment>,
    pub is_error: bool,
    pub is_retryable: bool,
    /// Why the message ended in error ("interrupted", "stopped", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Still receiving stream data
    pub is_streaming: bool,
    pub timestamp: i64,
}

impl Message {
    fn base(turn_id: TurnId, kind: MessageKind) -> Self {
        Self {
            id: MessageId::new(),
            turn_id,
            kind,
            content: String::new(),
            meta_message: None,
            attachments: vec![],
            is_error: false,
            is_retryable: false,
            error: None,
            is_streaming: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// A finished user message
    pub fn user(
        turn_id: TurnId,
        content: impl Into<String>,
        attachments: Vec<SentAttachment>,
    ) -> Self {
        Self {
            content: content.into(),
            attachments,
            ..Self::base(turn_id, MessageKind::User)
        }
    }

    /// The in-progress assistant message of a new stream
    pub fn pending(turn_id: TurnId) -> Self {
        Self {
            is_streaming: true,
            ..Self::base(turn_id, MessageKind::Loading)
        }
    }

    /// No further mutation will happen
    pub fn is_terminal(&self) -> bool {
        !self.is_streaming
    }

    pub(crate) fn append_content(&mut self, text: &str) {
        self.content.push_str(text);
        self.kind = MessageKind::Assistant;
    }

    pub(crate) fn set_meta(&mut self, text: String) {
        self.meta_message = Some(text);
        if self.content.is_empty() {
            self.kind = MessageKind::Thinking;
        }
    }

    /// Finish successfully. Returns false if nothing was received.
    pub(crate) fn complete(&mut self) -> bool {
        self.is_streaming = false;
        if self.content.is_empty() {
            return false;
        }
        self.kind = MessageKind::Assistant;
        true
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>, retryable: bool) {
        self.is_streaming = false;
        self.kind = MessageKind::Error;
        self.is_error = true;
        self.is_retryable = retryable;
        self.error = Some(reason.into());
    }
}
