//! Transport abstraction between the session and the backend

use std::time::Duration;

use async_trait::async_trait;
use tern_wire::{AttachmentRef, ByteStream, ChatClient, Error, FileUpload, Result, StreamRequest};
use tokio_util::sync::CancellationToken;

use crate::attachment::FileHandle;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Opens the response stream for a user message
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Post the message and return the raw response body.
    ///
    /// Cancelling `cancel` must abort the request and end the body.
    async fn open_stream(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream>;
}

/// Uploads one attachment
#[async_trait]
pub trait AttachmentTransport: Send + Sync {
    async fn upload(
        &self,
        file: &FileHandle,
        agent_id: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<AttachmentRef>;
}

/// HTTP transport backed by [`ChatClient`]
pub struct HttpTransport {
    client: ChatClient,
    retry_config: RetryConfig,
}

impl HttpTransport {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn open_stream(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        let mut attempt = 0u32;
        loop {
            match self.client.open_stream(&request, cancel.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < self.retry_config.max_retries && e.is_retryable() => {
                    let delay = self.retry_config.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.retry_config.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Aborted),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl AttachmentTransport for HttpTransport {
    async fn upload(
        &self,
        file: &FileHandle,
        agent_id: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<AttachmentRef> {
        let bytes = file.read().await?;
        tracing::debug!("Uploading {} ({} bytes)", file.name, bytes.len());
        self.client
            .upload(
                FileUpload {
                    name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    bytes,
                },
                agent_id,
                chat_id,
            )
            .await
    }
}
