//! Wire types shared by the decoder, the HTTP client and the session layer

use serde::{Deserialize, Serialize};

/// One self-contained record reconstructed from the response stream.
///
/// The backend sends loosely-shaped JSON objects; every field is optional
/// and unknown fields are ignored. Use [`Record::kind`] to classify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Record {
    /// Assistant text to append to the in-progress message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Explicit marker for progress/thinking records
    #[serde(alias = "is_meta")]
    pub is_meta: bool,
    /// Human-readable progress description
    #[serde(alias = "meta_message", skip_serializing_if = "Option::is_none")]
    pub meta_message: Option<String>,
    /// Literal status text that preempts status cycling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Tool/function currently being invoked
    #[serde(
        alias = "tool_name",
        alias = "functionName",
        alias = "function_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_name: Option<String>,
    /// Error flag or error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorField>,
    /// Whether the failure may succeed when re-sent
    #[serde(alias = "is_retryable", skip_serializing_if = "Option::is_none")]
    pub is_retryable: Option<bool>,
}

/// The `error` field is either a boolean flag or a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Flag(bool),
    Message(String),
}

/// Classified view of a [`Record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind<'a> {
    /// Text to append to the assistant message
    Content(&'a str),
    /// Progress information (thinking, tool use, status)
    Meta {
        text: Option<&'a str>,
        status: Option<&'a str>,
        tool_name: Option<&'a str>,
    },
    /// The backend reported a failure for this turn
    Error { message: String, retryable: bool },
    /// Keep-alives and records with nothing we understand
    Ignored,
}

impl Record {
    /// Create a content record
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// Create a meta record
    pub fn meta(text: impl Into<String>) -> Self {
        Self {
            is_meta: true,
            meta_message: Some(text.into()),
            ..Default::default()
        }
    }

    /// Create an error record
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(ErrorField::Message(message.into())),
            ..Default::default()
        }
    }

    /// Classify this record.
    ///
    /// Precedence is error, then meta, then content. A record carrying
    /// content is only treated as meta when it is explicitly flagged.
    pub fn kind(&self) -> RecordKind<'_> {
        let error = match &self.error {
            Some(ErrorField::Flag(true)) => Some(
                self.content
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "The assistant reported an error".to_string()),
            ),
            Some(ErrorField::Message(m)) if !m.is_empty() => Some(m.clone()),
            _ => None,
        };
        if let Some(message) = error {
            return RecordKind::Error {
                message,
                retryable: self.is_retryable.unwrap_or(true),
            };
        }

        let has_meta_fields =
            self.meta_message.is_some() || self.status.is_some() || self.tool_name.is_some();
        if self.is_meta || (self.content.is_none() && has_meta_fields) {
            return RecordKind::Meta {
                text: self
                    .meta_message
                    .as_deref()
                    .or(if self.is_meta { self.content.as_deref() } else { None }),
                status: self.status.as_deref(),
                tool_name: self.tool_name.as_deref(),
            };
        }

        match self.content.as_deref() {
            Some(text) => RecordKind::Content(text),
            None => RecordKind::Ignored,
        }
    }
}

/// Reference to an already-uploaded attachment, as sent with a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

/// Upload endpoint response
pub type UploadedFile = AttachmentRef;

/// Everything needed to open one response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub agent_id: String,
    pub chat_id: String,
    pub text: String,
    pub attachments: Vec<AttachmentRef>,
    pub model_id: Option<String>,
}

/// JSON body of a message request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageBody<'a> {
    pub message: &'a str,
    pub attachments: &'a [AttachmentRef],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<&'a str>,
}
