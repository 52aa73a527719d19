//! tern-chat: Streaming chat session engine
//!
//! This crate owns the message timeline of a conversation, the lifecycle
//! of the assistant's response stream, the composer's attachments, rotating
//! progress text, and viewport auto-scroll decisions.

pub mod attachment;
pub mod error;
pub mod events;
pub mod message;
pub mod preview;
pub mod scroll;
pub mod session;
pub mod status;
pub mod transport;

pub use attachment::{
    AddFilesReport, AttachmentId, AttachmentLimits, AttachmentPipeline, AttachmentStatus,
    AttachmentView, FileHandle, FileSource,
};
pub use error::{Error, Result};
pub use events::{ChatEvent, StreamOutcome};
pub use message::{Message, MessageId, MessageKind, SentAttachment, TurnId};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use scroll::{ScrollConfig, ScrollContainer, ScrollEngine, ScrollGeometry, ScrollOrigin};
pub use session::{ChatSession, Phase, SessionConfig};
pub use status::{CyclerConfig, StatusCycler, StatusDisplay};
pub use transport::{AttachmentTransport, HttpTransport, MessageTransport, RetryConfig};
