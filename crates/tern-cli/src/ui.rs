//! Line-mode rendering of session events

use std::{
    collections::{HashMap, HashSet},
    io::{self, Write},
    path::Path,
};

use tern_chat::{
    AddFilesReport, AttachmentStatus, AttachmentView, ChatEvent, ChatSession, FileHandle, Message,
    MessageId, MessageKind,
};
use tokio::sync::broadcast::{self, error::RecvError};

const CLEAR_LINE: &str = "\r\x1b[2K";

/// Turns session events into terminal output.
///
/// Assistant content is written as deltas; status text lives on a single
/// line that is cleared before anything else is printed.
#[derive(Default)]
pub struct Printer {
    printed: HashMap<MessageId, usize>,
    finished: HashSet<MessageId>,
    status_shown: bool,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the rendering of one event to stdout
    pub fn handle(&mut self, event: &ChatEvent) {
        if let Some(text) = self.render(event) {
            let mut out = io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    /// Text to write for an event, if any
    pub fn render(&mut self, event: &ChatEvent) -> Option<String> {
        match event {
            ChatEvent::Status { text: Some(text) } => {
                self.status_shown = true;
                Some(format!("{}{}", CLEAR_LINE, text))
            }
            ChatEvent::Status { text: None } => self.clear_status().map(str::to_string),
            ChatEvent::MessageUpdated { message } => self.render_message(message),
            ChatEvent::AttachmentUpdated { attachment } => match attachment.status {
                AttachmentStatus::Uploading => self.line(format!("[uploading {}...]", attachment.name)),
                AttachmentStatus::Completed => self.line(format!(
                    "[attached {} as {}]",
                    attachment.name,
                    short_id(attachment)
                )),
                _ => None,
            },
            ChatEvent::Notice { message } => self.line(format!("[{}]", message)),
            ChatEvent::TimelineCleared => {
                self.printed.clear();
                self.finished.clear();
                self.line("[new conversation]".to_string())
            }
            _ => None,
        }
    }

    fn render_message(&mut self, message: &Message) -> Option<String> {
        if message.kind == MessageKind::User || self.finished.contains(&message.id) {
            return None;
        }

        let mut text = String::new();
        let printed = self.printed.entry(message.id).or_insert(0);
        if let Some(delta) = message.content.get(*printed..).filter(|d| !d.is_empty()) {
            text.push_str(delta);
            *printed = message.content.len();
        }

        if message.is_terminal() {
            self.finished.insert(message.id);
            let started = *printed > 0;
            if message.kind == MessageKind::Error {
                let reason = message.error.as_deref().unwrap_or("error");
                if started {
                    text.push('\n');
                }
                text.push_str(&format!("[{}]", reason));
                if message.is_retryable {
                    text.push_str(" (/retry to try again)");
                }
            }
            text.push('\n');
        }

        if text.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.clear_status().unwrap_or(""), text))
    }

    fn line(&mut self, text: String) -> Option<String> {
        Some(format!("{}{}\n", self.clear_status().unwrap_or(""), text))
    }

    fn clear_status(&mut self) -> Option<&'static str> {
        if self.status_shown {
            self.status_shown = false;
            Some(CLEAR_LINE)
        } else {
            None
        }
    }
}

/// Print events until the channel closes
pub async fn print_events(mut events: broadcast::Receiver<ChatEvent>) {
    let mut printer = Printer::new();
    loop {
        match events.recv().await {
            Ok(event) => printer.handle(&event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Output fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Read a local file and hand it to the session's attachment pipeline
pub async fn attach(session: &ChatSession, path: &str) -> io::Result<AddFilesReport> {
    let file = FileHandle::from_path(Path::new(path)).await?;
    Ok(session.attachments().add_files(vec![file]))
}

/// Find a pending attachment by file name, short id or id prefix
pub fn find_attachment<'a>(views: &'a [AttachmentView], key: &str) -> Option<&'a AttachmentView> {
    views
        .iter()
        .find(|v| v.name == key || short_id(v) == key)
        .or_else(|| views.iter().find(|v| v.id.as_str().starts_with(key)))
}

pub fn format_attachments(views: &[AttachmentView]) -> String {
    if views.is_empty() {
        return "No pending attachments.".to_string();
    }
    views
        .iter()
        .map(|v| {
            format!(
                "  {}  {} ({}, {})  {:?}",
                short_id(v),
                v.name,
                v.mime_type,
                format_size(v.size),
                v.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn short_id(view: &AttachmentView) -> &str {
    // The id ends with an 8 character random suffix
    let id = view.id.as_str();
    id.rsplit('-').next().unwrap_or(id)
}

pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
