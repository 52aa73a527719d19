//! Session event types

use serde::{Deserialize, Serialize};

use crate::{
    attachment::{AttachmentId, AttachmentView},
    message::{Message, TurnId},
};

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Body ended normally
    Completed,
    /// Transport failure or an error record
    Failed { error: String },
    /// Stopped by the user
    Stopped,
    /// Superseded by a newer send
    Interrupted,
}

/// Events emitted by a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was added to the end of the timeline
    MessageAppended { message: Message },

    /// The in-progress message changed (content, meta, or terminal state)
    MessageUpdated { message: Message },

    /// A stream was opened for a turn
    StreamStarted { turn_id: TurnId },

    /// A stream ended
    StreamFinished {
        turn_id: TurnId,
        outcome: StreamOutcome,
    },

    /// Progress text to show while waiting; `None` clears it
    Status { text: Option<String> },

    /// An attachment was added or its status changed
    AttachmentUpdated { attachment: AttachmentView },

    /// An attachment left the composer (removed, failed, or sent)
    AttachmentRemoved { id: AttachmentId },

    /// Something the user should be told about
    Notice { message: String },

    /// The conversation was reset
    TimelineCleared,
}
