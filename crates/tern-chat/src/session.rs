//! The chat session state machine.
//!
//! A [`ChatSession`] owns the message timeline and at most one active
//! response stream. Sending while a stream is active interrupts it: the
//! old stream's in-progress message becomes a terminal error labeled
//! "interrupted" and its records are discarded from then on.
//!
//! Every background stream task checks that it still owns the timeline
//! (same stream id, token not cancelled) under the state lock before each
//! mutation, so a superseded or stopped stream can never write again.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tern_wire::{Framing, Record, RecordKind, StreamRequest, decode_records};
use tokio::{
    sync::{Notify, broadcast},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    attachment::{AttachmentLimits, AttachmentPipeline, UploadScope},
    error::{Error, Result},
    events::{ChatEvent, StreamOutcome},
    message::{Message, MessageId, MessageKind, SentAttachment, TurnId},
    scroll::{ScrollConfig, ScrollEngine, ScrollOrigin},
    status::{CyclerConfig, StatusCycler, StatusDisplay, message_pool},
    transport::{AttachmentTransport, MessageTransport},
};

const EVENT_CAPACITY: usize = 256;

const INTERRUPTED: &str = "interrupted";
const STOPPED: &str = "stopped";
const EMPTY_RESPONSE: &str = "The assistant returned an empty response";

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub agent_id: String,
    pub chat_id: String,
    pub model_id: Option<String>,
    pub framing: Framing,
    pub attachments: AttachmentLimits,
    pub status: CyclerConfig,
    pub scroll: ScrollConfig,
}

impl SessionConfig {
    pub fn new(agent_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            chat_id: chat_id.into(),
            model_id: None,
            framing: Framing::default(),
            attachments: AttachmentLimits::default(),
            status: CyclerConfig::default(),
            scroll: ScrollConfig::default(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    /// The last stream failed, was stopped, or returned nothing
    Error,
}

struct ActiveStream {
    id: u64,
    turn_id: TurnId,
    message_id: MessageId,
    cancel: CancellationToken,
    started_at: Instant,
}

#[derive(Default)]
struct SessionState {
    timeline: Vec<Message>,
    phase: Phase,
    active: Option<ActiveStream>,
}

impl SessionState {
    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.timeline.iter_mut().rev().find(|m| m.id == id)
    }
}

enum Finish {
    Completed,
    Failed { error: String, retryable: bool },
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn MessageTransport>,
    // Lock order: state, then status
    state: Mutex<SessionState>,
    status: Mutex<StatusCycler>,
    scroll: ScrollEngine,
    attachments: AttachmentPipeline,
    event_tx: broadcast::Sender<ChatEvent>,
    idle_notify: Notify,
    next_stream_id: AtomicU64,
}

/// One chat conversation.
///
/// Cloning is cheap; clones share state. Sending, retrying and adding
/// attachments spawn tasks and must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn MessageTransport>,
        uploads: Arc<dyn AttachmentTransport>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let status_tx = event_tx.clone();
        let display: StatusDisplay = Arc::new(move |text: Option<&str>| {
            let _ = status_tx.send(ChatEvent::Status {
                text: text.map(str::to_string),
            });
        });

        let attachments = AttachmentPipeline::new(config.attachments, uploads, event_tx.clone());
        attachments.set_scope(UploadScope {
            agent_id: Some(config.agent_id.clone()),
            chat_id: Some(config.chat_id.clone()),
        });

        Self {
            inner: Arc::new(SessionInner {
                status: Mutex::new(StatusCycler::new(config.status, display)),
                scroll: ScrollEngine::new(config.scroll),
                attachments,
                transport,
                state: Mutex::new(SessionState::default()),
                event_tx,
                idle_notify: Notify::new(),
                next_stream_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Snapshot of the timeline
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().timeline.clone()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.inner.state.lock().timeline.last().cloned()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// The composer's pending attachments
    pub fn attachments(&self) -> &AttachmentPipeline {
        &self.inner.attachments
    }

    pub fn scroll(&self) -> &ScrollEngine {
        &self.inner.scroll
    }

    /// Send a user message and stream the answer.
    ///
    /// Appends the user message at once. An active stream is interrupted
    /// first. Fails with [`Error::EmptyMessage`] if there is neither text
    /// nor an attachment.
    pub fn send_message(&self, text: &str, attachments: Vec<SentAttachment>) -> Result<TurnId> {
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let turn_id = TurnId::new();
        let request = self.request(text, &attachments);
        let user = Message::user(turn_id, text, attachments);
        let (stream_id, cancel) = {
            let mut state = self.inner.state.lock();
            self.begin(&mut state, turn_id, Some(user))
        };
        tracing::debug!("Sending message for turn {}", turn_id);

        self.spawn_stream(stream_id, request, cancel);
        self.inner.scroll.force_scroll(ScrollOrigin::User);
        Ok(turn_id)
    }

    /// Send the composer: `text` plus every completed attachment.
    ///
    /// Fails with [`Error::UploadsPending`] while uploads are running.
    pub fn submit(&self, text: &str) -> Result<TurnId> {
        let attachments = &self.inner.attachments;
        if attachments.is_uploading() {
            return Err(Error::UploadsPending);
        }
        if text.trim().is_empty() && attachments.completed_count() == 0 {
            return Err(Error::EmptyMessage);
        }
        let sent = attachments.take_for_send()?;
        self.send_message(text, sent)
    }

    /// Cancel the active stream. Returns false if nothing was streaming.
    ///
    /// The in-progress message keeps any partial content and becomes a
    /// retryable error.
    pub fn stop_streaming(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(active) = state.active.take() else {
            return false;
        };
        active.cancel.cancel();
        if let Some(message) = state.message_mut(active.message_id) {
            message.fail(STOPPED, true);
            let message = message.clone();
            self.inner.emit(ChatEvent::MessageUpdated { message });
        }
        state.phase = Phase::Error;
        tracing::debug!("Stopped stream {} for turn {}", active.id, active.turn_id);
        self.inner.emit(ChatEvent::StreamFinished {
            turn_id: active.turn_id,
            outcome: StreamOutcome::Stopped,
        });
        self.inner.status.lock().stop();
        drop(state);

        self.inner.idle_notify.notify_waiters();
        true
    }

    /// Re-send the user message of the last turn.
    ///
    /// Only valid when the last message is a retryable terminal error.
    /// The user message is not duplicated; a new assistant message is
    /// appended to the same turn.
    pub fn retry_last_message(&self) -> Result<TurnId> {
        let (turn_id, stream_id, request, cancel) = {
            let mut state = self.inner.state.lock();
            let turn_id = state
                .timeline
                .last()
                .filter(|m| m.kind == MessageKind::Error && m.is_terminal() && m.is_retryable)
                .map(|m| m.turn_id)
                .ok_or(Error::NothingToRetry)?;
            let user = state
                .timeline
                .iter()
                .rev()
                .find(|m| m.turn_id == turn_id && m.kind == MessageKind::User)
                .ok_or(Error::NothingToRetry)?;
            let request = self.request(&user.content, &user.attachments);
            let (stream_id, cancel) = self.begin(&mut state, turn_id, None);
            (turn_id, stream_id, request, cancel)
        };
        tracing::debug!("Retrying turn {}", turn_id);

        self.spawn_stream(stream_id, request, cancel);
        self.inner.scroll.force_scroll(ScrollOrigin::User);
        Ok(turn_id)
    }

    /// Start over: cancel any stream, drop the timeline and attachments
    pub fn new_conversation(&self) {
        {
            let mut state = self.inner.state.lock();
            if let Some(active) = state.active.take() {
                active.cancel.cancel();
                self.inner.emit(ChatEvent::StreamFinished {
                    turn_id: active.turn_id,
                    outcome: StreamOutcome::Stopped,
                });
            }
            state.timeline.clear();
            state.phase = Phase::Idle;
            self.inner.status.lock().stop();
            self.inner.emit(ChatEvent::TimelineCleared);
        }
        self.inner.idle_notify.notify_waiters();

        self.inner.attachments.clear();
        self.inner.scroll.reset();
        self.inner.scroll.force_scroll(ScrollOrigin::System);
    }

    /// Wait until no stream is active
    pub async fn wait_for_idle(&self) {
        let notified = self.inner.idle_notify.notified();
        if !self.is_streaming() {
            return;
        }
        notified.await;
    }

    fn request(&self, text: &str, attachments: &[SentAttachment]) -> StreamRequest {
        let config = &self.inner.config;
        StreamRequest {
            agent_id: config.agent_id.clone(),
            chat_id: config.chat_id.clone(),
            text: text.to_string(),
            attachments: attachments.iter().map(SentAttachment::to_ref).collect(),
            model_id: config.model_id.clone(),
        }
    }

    /// Make a new stream the active one, interrupting the previous one
    fn begin(
        &self,
        state: &mut SessionState,
        turn_id: TurnId,
        user: Option<Message>,
    ) -> (u64, CancellationToken) {
        let inner = &self.inner;

        if let Some(previous) = state.active.take() {
            previous.cancel.cancel();
            if let Some(message) = state.message_mut(previous.message_id) {
                message.fail(INTERRUPTED, true);
                let message = message.clone();
                inner.emit(ChatEvent::MessageUpdated { message });
            }
            tracing::debug!(
                "Interrupted stream {} for turn {}",
                previous.id,
                previous.turn_id
            );
            inner.emit(ChatEvent::StreamFinished {
                turn_id: previous.turn_id,
                outcome: StreamOutcome::Interrupted,
            });
        }

        if let Some(user) = user {
            state.timeline.push(user.clone());
            inner.emit(ChatEvent::MessageAppended { message: user });
        }
        let pending = Message::pending(turn_id);
        let message_id = pending.id;
        state.timeline.push(pending.clone());
        inner.emit(ChatEvent::MessageAppended { message: pending });

        let id = inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        state.active = Some(ActiveStream {
            id,
            turn_id,
            message_id,
            cancel: cancel.clone(),
            started_at: Instant::now(),
        });
        state.phase = Phase::Streaming;
        inner.emit(ChatEvent::StreamStarted { turn_id });
        inner.status.lock().start(None, None);

        (id, cancel)
    }

    fn spawn_stream(&self, stream_id: u64, request: StreamRequest, cancel: CancellationToken) {
        tokio::spawn(run_stream(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.transport),
            self.inner.config.framing,
            stream_id,
            request,
            cancel,
        ));
    }
}

async fn run_stream(
    session: Weak<SessionInner>,
    transport: Arc<dyn MessageTransport>,
    framing: Framing,
    stream_id: u64,
    request: StreamRequest,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = transport.open_stream(request, cancel.clone()) => opened,
    };
    let source = match opened {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("Failed to open stream {}: {}", stream_id, e);
            if let Some(inner) = session.upgrade() {
                inner.finish(
                    stream_id,
                    Finish::Failed {
                        error: e.to_string(),
                        retryable: true,
                    },
                );
            }
            return;
        }
    };

    let mut records = decode_records(source, framing.decoder());
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = records.next() => next,
        };
        let Some(inner) = session.upgrade() else {
            return;
        };
        match next {
            Some(Ok(record)) => {
                if !inner.route(stream_id, &record) {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Stream {} failed: {}", stream_id, e);
                inner.finish(
                    stream_id,
                    Finish::Failed {
                        error: e.to_string(),
                        retryable: true,
                    },
                );
                return;
            }
            None => {
                inner.finish(stream_id, Finish::Completed);
                return;
            }
        }
    }
}

impl SessionInner {
    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Apply one record. Returns false once the stream should stop reading.
    fn route(&self, stream_id: u64, record: &Record) -> bool {
        let mut state = self.state.lock();
        let message_id = match state.active.as_ref() {
            Some(active) if active.id == stream_id && !active.cancel.is_cancelled() => {
                active.message_id
            }
            _ => {
                tracing::trace!("Dropping record of superseded stream {}", stream_id);
                return false;
            }
        };

        match record.kind() {
            RecordKind::Content(text) => {
                if text.is_empty() {
                    return true;
                }
                let Some(message) = state.message_mut(message_id) else {
                    return false;
                };
                message.append_content(text);
                let message = message.clone();
                self.status.lock().stop();
                self.emit(ChatEvent::MessageUpdated { message });
            }
            RecordKind::Meta {
                text,
                status,
                tool_name,
            } => {
                let shown = text
                    .or(status)
                    .map(str::to_string)
                    .or_else(|| tool_name.map(|t| message_pool(Some(t)).swap_remove(0)));
                if let (Some(shown), Some(message)) = (shown, state.message_mut(message_id)) {
                    message.set_meta(shown);
                    let message = message.clone();
                    self.emit(ChatEvent::MessageUpdated { message });
                }
                let mut cycler = self.status.lock();
                // A bare meta text keeps the current rotation going
                if status.is_some() || tool_name.is_some() || !cycler.is_showing() {
                    cycler.start(status, tool_name);
                }
            }
            RecordKind::Error { message, retryable } => {
                drop(state);
                self.finish(
                    stream_id,
                    Finish::Failed {
                        error: message,
                        retryable,
                    },
                );
                return false;
            }
            RecordKind::Ignored => {
                tracing::trace!("Ignoring record without content on stream {}", stream_id);
                return true;
            }
        }
        drop(state);

        self.scroll.smart_scroll();
        true
    }

    /// End a stream that still owns the timeline
    fn finish(&self, stream_id: u64, finish: Finish) {
        let mut state = self.state.lock();
        let active = match state.active.take() {
            Some(active) if active.id == stream_id && !active.cancel.is_cancelled() => active,
            other => {
                state.active = other;
                return;
            }
        };

        let mut outcome = StreamOutcome::Completed;
        if let Some(message) = state.message_mut(active.message_id) {
            match finish {
                Finish::Completed => {
                    if !message.complete() {
                        message.fail(EMPTY_RESPONSE, true);
                        outcome = StreamOutcome::Failed {
                            error: EMPTY_RESPONSE.to_string(),
                        };
                    }
                }
                Finish::Failed { error, retryable } => {
                    message.fail(error.clone(), retryable);
                    outcome = StreamOutcome::Failed { error };
                }
            }
            let message = message.clone();
            self.emit(ChatEvent::MessageUpdated { message });
        }

        state.phase = match outcome {
            StreamOutcome::Completed => Phase::Idle,
            _ => Phase::Error,
        };
        tracing::debug!(
            "Stream {} for turn {} finished after {:?}: {:?}",
            active.id,
            active.turn_id,
            active.started_at.elapsed(),
            outcome
        );
        self.emit(ChatEvent::StreamFinished {
            turn_id: active.turn_id,
            outcome,
        });
        self.status.lock().stop();
        drop(state);

        self.idle_notify.notify_waiters();
        self.scroll.smart_scroll();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.take() {
            active.cancel.cancel();
        }
    }
}
