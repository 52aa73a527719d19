//! HTTP client for the chat backend

use async_stream::stream;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    stream::ByteStream,
    types::{MessageBody, StreamRequest, UploadedFile},
};

/// A local file ready to be sent to the upload endpoint
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Backend API client
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ChatClient {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: None,
        })
    }

    /// Send a bearer token with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint that streams the assistant's answer to a message
    pub fn messages_url(&self, agent_id: &str, chat_id: &str) -> String {
        format!(
            "{}/agents/{}/chats/{}/messages",
            self.base_url,
            urlencoding::encode(agent_id),
            urlencoding::encode(chat_id)
        )
    }

    /// Endpoint that accepts attachment uploads
    pub fn uploads_url(&self) -> String {
        format!("{}/attachments", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Post a message and return its response body as a byte stream.
    ///
    /// Cancelling `cancel` aborts the request, or ends the body stream with
    /// [`Error::Aborted`] once it is open.
    pub async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream> {
        let url = self.messages_url(&request.agent_id, &request.chat_id);
        tracing::debug!("Opening message stream: {}", url);

        let body = MessageBody {
            message: &request.text,
            attachments: &request.attachments,
            model_id: request.model_id.as_deref(),
        };
        let builder = self.authorize(self.http.post(&url).json(&body));

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Aborted),
            response = builder.send() => response?,
        };
        let response = check_status(response).await?;

        let mut body = response.bytes_stream();
        Ok(Box::pin(stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                };
                match next {
                    None => {
                        yield Err(Error::Aborted);
                        return;
                    }
                    Some(Some(Ok(bytes))) => yield Ok(bytes.to_vec()),
                    Some(Some(Err(e))) => {
                        yield Err(Error::Http(e));
                        return;
                    }
                    Some(None) => return,
                }
            }
        }))
    }

    /// Upload one file and return its remote reference
    pub async fn upload(
        &self,
        file: FileUpload,
        agent_id: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<UploadedFile> {
        let url = self.uploads_url();
        tracing::debug!("Uploading {} ({} bytes) to {}", file.name, file.bytes.len(), url);

        let part = Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(agent_id) = agent_id {
            form = form.text("agentId", agent_id.to_string());
        }
        if let Some(chat_id) = chat_id {
            form = form.text("chatId", chat_id.to_string());
        }

        let response = self
            .authorize(self.http.post(&url).multipart(form))
            .send()
            .await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::UnexpectedResponse(format!("upload response: {}", e)))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .ok()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(Error::api(status.as_u16(), message))
}
