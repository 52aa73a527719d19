//! Attachment validation, previews and concurrent uploads

use std::{fmt, path::PathBuf, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tern_wire::AttachmentRef;
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{
    error::Error,
    events::ChatEvent,
    message::SentAttachment,
    preview::{PreviewHandle, PreviewRegistry},
    transport::AttachmentTransport,
};

/// Identifies one attachment.
///
/// Built from name, size, timestamp and a random suffix so selecting the
/// same file twice yields two distinct attachments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn generate(name: &str, size: u64) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}-{}",
            name,
            size,
            chrono::Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the file's bytes live
#[derive(Clone)]
pub enum FileSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            FileSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// A user-selected file
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: FileSource,
}

impl FileHandle {
    /// Describe a file on disk
    pub async fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            mime_type: guess_mime_type(&name).to_string(),
            name,
            size: metadata.len(),
            source: FileSource::Path(path),
        })
    }

    /// Wrap in-memory bytes
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name).to_string(),
            size: bytes.len() as u64,
            source: FileSource::Bytes(bytes.into()),
            name,
        }
    }

    /// Load the file contents
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Guess a MIME type from the file extension
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "csv" => "text/csv",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "txt" | "log" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Upload progress. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl AttachmentStatus {
    pub fn can_advance_to(self, next: AttachmentStatus) -> bool {
        use AttachmentStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading | Completed | Error) | (Uploading, Completed | Error)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, AttachmentStatus::Completed | AttachmentStatus::Error)
    }
}

/// Size and count ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentLimits {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// Agent/chat the uploads belong to
#[derive(Debug, Clone, Default)]
pub struct UploadScope {
    pub agent_id: Option<String>,
    pub chat_id: Option<String>,
}

struct Attachment {
    id: AttachmentId,
    file: FileHandle,
    status: AttachmentStatus,
    remote: Option<AttachmentRef>,
    preview: Option<PreviewHandle>,
}

impl Attachment {
    fn advance(&mut self, next: AttachmentStatus) -> bool {
        if !self.status.can_advance_to(next) {
            tracing::warn!(
                "Ignoring attachment status change {:?} -> {:?} for {}",
                self.status,
                next,
                self.id
            );
            return false;
        }
        self.status = next;
        true
    }

    fn view(&self) -> AttachmentView {
        AttachmentView {
            id: self.id.clone(),
            name: self.file.name.clone(),
            mime_type: self.file.mime_type.clone(),
            size: self.file.size,
            status: self.status,
            url: self.remote.as_ref().map(|r| r.url.clone()),
            preview_uri: self.preview.as_ref().map(|p| p.uri().to_string()),
        }
    }
}

/// Snapshot of an attachment for rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub id: AttachmentId,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub status: AttachmentStatus,
    pub url: Option<String>,
    pub preview_uri: Option<String>,
}

/// A file turned away by validation
#[derive(Debug)]
pub struct Rejected {
    pub name: String,
    pub error: Error,
}

/// Result of [`AttachmentPipeline::add_files`]
#[derive(Debug, Default)]
pub struct AddFilesReport {
    pub accepted: Vec<AttachmentId>,
    pub rejected: Vec<Rejected>,
}

#[derive(Default)]
struct PipelineState {
    attachments: Vec<Attachment>,
    last_error: Option<String>,
}

struct PipelineInner {
    limits: AttachmentLimits,
    transport: Arc<dyn AttachmentTransport>,
    previews: PreviewRegistry,
    scope: Mutex<UploadScope>,
    state: Mutex<PipelineState>,
    uploads: Mutex<Vec<(AttachmentId, JoinHandle<()>)>>,
    event_tx: broadcast::Sender<ChatEvent>,
}

/// Pending attachments of the composer.
///
/// Cloning is cheap; clones share state. Methods that start uploads must
/// be called from within a Tokio runtime.
#[derive(Clone)]
pub struct AttachmentPipeline {
    inner: Arc<PipelineInner>,
}

impl AttachmentPipeline {
    pub fn new(
        limits: AttachmentLimits,
        transport: Arc<dyn AttachmentTransport>,
        event_tx: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                limits,
                transport,
                previews: PreviewRegistry::new(),
                scope: Mutex::new(UploadScope::default()),
                state: Mutex::new(PipelineState::default()),
                uploads: Mutex::new(Vec::new()),
                event_tx,
            }),
        }
    }

    /// Set the agent/chat sent along with uploads
    pub fn set_scope(&self, scope: UploadScope) {
        *self.inner.scope.lock() = scope;
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.inner.previews
    }

    /// Validate files and start uploading the accepted ones.
    ///
    /// Oversized files are rejected one by one; files beyond the free slots
    /// are rejected with a capacity error. Valid siblings are never blocked.
    pub fn add_files(&self, files: Vec<FileHandle>) -> AddFilesReport {
        let limits = self.inner.limits;
        let mut report = AddFilesReport::default();
        let mut to_upload = Vec::new();

        {
            let mut state = self.inner.state.lock();
            let remaining = limits.max_files.saturating_sub(state.attachments.len());

            for file in files {
                if file.size > limits.max_file_size {
                    report.rejected.push(Rejected {
                        error: Error::FileTooLarge {
                            name: file.name.clone(),
                            size: file.size,
                            limit: limits.max_file_size,
                        },
                        name: file.name,
                    });
                    continue;
                }
                if to_upload.len() >= remaining {
                    report.rejected.push(Rejected {
                        name: file.name,
                        error: Error::CapacityExceeded {
                            max: limits.max_files,
                        },
                    });
                    continue;
                }

                let mut attachment = Attachment {
                    id: AttachmentId::generate(&file.name, file.size),
                    preview: self.inner.previews.create(&file),
                    file: file.clone(),
                    status: AttachmentStatus::Pending,
                    remote: None,
                };
                attachment.advance(AttachmentStatus::Uploading);
                let _ = self.inner.event_tx.send(ChatEvent::AttachmentUpdated {
                    attachment: attachment.view(),
                });
                report.accepted.push(attachment.id.clone());
                to_upload.push((attachment.id.clone(), file));
                state.attachments.push(attachment);
            }

            let notice = report
                .rejected
                .iter()
                .find(|r| matches!(r.error, Error::CapacityExceeded { .. }))
                .or(report.rejected.last())
                .map(|r| r.error.to_string());
            if let Some(notice) = notice {
                tracing::debug!("Rejected {} attachment(s): {}", report.rejected.len(), notice);
                state.last_error = Some(notice.clone());
                let _ = self
                    .inner
                    .event_tx
                    .send(ChatEvent::Notice { message: notice });
            }
        }

        for (id, file) in to_upload {
            let inner = Arc::clone(&self.inner);
            let task_id = id.clone();
            let handle = tokio::spawn(async move {
                let scope = inner.scope.lock().clone();
                let result = inner
                    .transport
                    .upload(&file, scope.agent_id.as_deref(), scope.chat_id.as_deref())
                    .await;
                inner.finish_upload(&task_id, &file.name, result);
            });
            self.inner.uploads.lock().push((id, handle));
        }

        report
    }

    /// Remove one attachment, releasing its preview. Returns false if unknown.
    pub fn remove(&self, id: &AttachmentId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            let Some(pos) = state.attachments.iter().position(|a| &a.id == id) else {
                return false;
            };
            state.attachments.remove(pos)
        };
        self.abort_upload(id);
        if let Some(preview) = removed.preview {
            preview.release();
        }
        let _ = self
            .inner
            .event_tx
            .send(ChatEvent::AttachmentRemoved { id: id.clone() });
        true
    }

    /// Drop every attachment and release all previews
    pub fn clear(&self) {
        let removed = std::mem::take(&mut self.inner.state.lock().attachments);
        for (_, handle) in self.inner.uploads.lock().drain(..) {
            handle.abort();
        }
        for attachment in removed {
            if let Some(preview) = attachment.preview {
                preview.release();
            }
            let _ = self
                .inner
                .event_tx
                .send(ChatEvent::AttachmentRemoved { id: attachment.id });
        }
    }

    /// Empty the pipeline, handing completed attachments and their previews
    /// to the caller. Fails while any upload is still running.
    pub fn take_for_send(&self) -> crate::error::Result<Vec<SentAttachment>> {
        let taken = {
            let mut state = self.inner.state.lock();
            if state.attachments.iter().any(|a| !a.status.is_finished()) {
                return Err(Error::UploadsPending);
            }
            std::mem::take(&mut state.attachments)
        };
        self.inner.uploads.lock().clear();

        let mut sent = Vec::with_capacity(taken.len());
        for attachment in taken {
            let _ = self.inner.event_tx.send(ChatEvent::AttachmentRemoved {
                id: attachment.id.clone(),
            });
            let Some(remote) = attachment.remote else {
                continue;
            };
            sent.push(SentAttachment {
                id: attachment.id,
                name: attachment.file.name,
                mime_type: attachment.file.mime_type,
                size: attachment.file.size,
                url: remote.url,
                preview: attachment.preview.map(Arc::new),
            });
        }
        Ok(sent)
    }

    /// Wait for every upload started so far
    pub async fn wait_for_uploads(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .uploads
            .lock()
            .drain(..)
            .map(|(_, handle)| handle)
            .collect();
        futures::future::join_all(handles).await;
    }

    pub fn attachments(&self) -> Vec<AttachmentView> {
        self.inner
            .state
            .lock()
            .attachments
            .iter()
            .map(Attachment::view)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_uploading(&self) -> bool {
        self.inner
            .state
            .lock()
            .attachments
            .iter()
            .any(|a| !a.status.is_finished())
    }

    /// Attachments ready to be sent
    pub fn completed_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .attachments
            .iter()
            .filter(|a| a.status == AttachmentStatus::Completed)
            .count()
    }

    /// Most recent user-visible error
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.state.lock().last_error = None;
    }

    fn abort_upload(&self, id: &AttachmentId) {
        let mut uploads = self.inner.uploads.lock();
        if let Some(pos) = uploads.iter().position(|(upload_id, _)| upload_id == id) {
            let (_, handle) = uploads.remove(pos);
            handle.abort();
        }
    }
}

impl PipelineInner {
    fn finish_upload(
        &self,
        id: &AttachmentId,
        name: &str,
        result: tern_wire::Result<AttachmentRef>,
    ) {
        let mut state = self.state.lock();
        let Some(pos) = state.attachments.iter().position(|a| &a.id == id) else {
            tracing::debug!("Upload finished for removed attachment {}", id);
            return;
        };

        match result {
            Ok(remote) => {
                let attachment = &mut state.attachments[pos];
                if attachment.advance(AttachmentStatus::Completed) {
                    attachment.remote = Some(remote);
                    let _ = self.event_tx.send(ChatEvent::AttachmentUpdated {
                        attachment: attachment.view(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", name, e);
                let mut attachment = state.attachments.remove(pos);
                attachment.advance(AttachmentStatus::Error);
                if let Some(preview) = attachment.preview.take() {
                    preview.release();
                }
                let message = Error::Upload {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
                .to_string();
                state.last_error = Some(message.clone());
                let _ = self.event_tx.send(ChatEvent::AttachmentRemoved {
                    id: attachment.id,
                });
                let _ = self.event_tx.send(ChatEvent::Notice { message });
            }
        }
    }
}

impl Drop for PipelineInner {
    fn drop(&mut self) {
        for (_, handle) in self.uploads.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Uploader that fails for names in `failing` and succeeds otherwise.
    struct FakeUploader {
        failing: HashSet<String>,
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl FakeUploader {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                delay: Duration::from_millis(5),
                calls: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl AttachmentTransport for FakeUploader {
        async fn upload(
            &self,
            file: &FileHandle,
            _agent_id: Option<&str>,
            _chat_id: Option<&str>,
        ) -> tern_wire::Result<AttachmentRef> {
            self.calls.lock().push(file.name.clone());
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&file.name) {
                return Err(tern_wire::Error::api(500, "storage unavailable"));
            }
            Ok(AttachmentRef {
                url: format!("https://files.test/{}", file.name),
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size: file.size,
            })
        }
    }

    fn pipeline(limits: AttachmentLimits, uploader: Arc<FakeUploader>) -> AttachmentPipeline {
        let (tx, _) = broadcast::channel(64);
        AttachmentPipeline::new(limits, uploader, tx)
    }

    fn files(names: &[&str]) -> Vec<FileHandle> {
        names
            .iter()
            .map(|n| FileHandle::from_bytes(*n, vec![0u8; 4]))
            .collect()
    }

    #[test]
    fn test_status_only_moves_forward() {
        use AttachmentStatus::*;
        assert!(Pending.can_advance_to(Uploading));
        assert!(Uploading.can_advance_to(Completed));
        assert!(Uploading.can_advance_to(Error));
        assert!(!Completed.can_advance_to(Pending));
        assert!(!Error.can_advance_to(Uploading));
        assert!(!Completed.can_advance_to(Error));
        assert!(!Uploading.can_advance_to(Pending));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_mime_type("report.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("Makefile"), "application/octet-stream");
    }

    #[test]
    fn test_ids_unique_for_identical_files() {
        let a = AttachmentId::generate("a.png", 10);
        let b = AttachmentId::generate("a.png", 10);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("a.png-10-"));
    }

    #[tokio::test]
    async fn test_capacity_accepts_only_free_slots() {
        let limits = AttachmentLimits {
            max_files: 3,
            ..Default::default()
        };
        let p = pipeline(limits, FakeUploader::new(&[]));
        assert_eq!(p.add_files(files(&["a.txt", "b.txt"])).accepted.len(), 2);

        let report = p.add_files(files(&["c.txt", "d.txt", "e.txt"]));
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(
            report
                .rejected
                .iter()
                .all(|r| matches!(r.error, Error::CapacityExceeded { max: 3 }))
        );
        assert_eq!(p.len(), 3);
        assert_eq!(
            p.last_error().as_deref(),
            Some("You can attach at most 3 files")
        );
    }

    #[tokio::test]
    async fn test_oversized_file_does_not_block_siblings() {
        let limits = AttachmentLimits {
            max_files: 10,
            max_file_size: 8,
        };
        let uploader = FakeUploader::new(&[]);
        let p = pipeline(limits, uploader.clone());
        let mut batch = files(&["small.txt"]);
        batch.push(FileHandle::from_bytes("big.bin", vec![0u8; 100]));
        batch.extend(files(&["other.txt"]));

        let report = p.add_files(batch);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].name, "big.bin");
        assert!(matches!(report.rejected[0].error, Error::FileTooLarge { .. }));

        p.wait_for_uploads().await;
        let calls = uploader.calls.lock().clone();
        assert!(!calls.contains(&"big.bin".to_string()));
        assert_eq!(p.completed_count(), 2);
    }

    #[tokio::test]
    async fn test_uploads_run_concurrently() {
        let uploader = Arc::new(FakeUploader {
            failing: HashSet::new(),
            delay: Duration::from_millis(200),
            calls: Mutex::new(vec![]),
        });
        let p = pipeline(AttachmentLimits::default(), uploader);
        p.add_files(files(&["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]));

        let started = std::time::Instant::now();
        p.wait_for_uploads().await;
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(p.completed_count(), 5);
    }

    #[tokio::test]
    async fn test_accepted_file_is_uploading_with_preview() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&[]));
        p.add_files(files(&["pic.png", "doc.txt"]));
        let views = p.attachments();
        assert!(views.iter().all(|v| v.status == AttachmentStatus::Uploading));
        assert!(views[0].preview_uri.is_some());
        assert!(views[1].preview_uri.is_none());
        assert_eq!(p.previews().live_count(), 1);

        p.wait_for_uploads().await;
        let views = p.attachments();
        assert!(views.iter().all(|v| v.status == AttachmentStatus::Completed));
        assert_eq!(views[0].url.as_deref(), Some("https://files.test/pic.png"));
    }

    #[tokio::test]
    async fn test_failed_upload_is_removed_and_reported() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&["bad.png"]));
        p.add_files(files(&["good.png", "bad.png"]));
        assert_eq!(p.previews().live_count(), 2);

        p.wait_for_uploads().await;
        let views = p.attachments();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "good.png");
        assert_eq!(views[0].status, AttachmentStatus::Completed);
        assert_eq!(p.previews().live_count(), 1);
        let err = p.last_error().unwrap();
        assert!(err.contains("bad.png"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_latest_failure_message_wins() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&["x.txt", "y.txt"]));
        p.add_files(files(&["x.txt"]));
        p.wait_for_uploads().await;
        p.add_files(files(&["y.txt"]));
        p.wait_for_uploads().await;
        assert!(p.last_error().unwrap().contains("y.txt"));
        assert!(p.is_empty());

        p.dismiss_error();
        assert_eq!(p.last_error(), None);
    }

    #[tokio::test]
    async fn test_remove_releases_preview() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&[]));
        let report = p.add_files(files(&["a.png", "b.png"]));
        assert!(p.remove(&report.accepted[0]));
        assert!(!p.remove(&report.accepted[0]));
        assert_eq!(p.len(), 1);
        assert_eq!(p.previews().live_count(), 1);
        p.wait_for_uploads().await;
        assert_eq!(p.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_releases_everything() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&[]));
        p.add_files(files(&["a.png", "b.png", "c.txt"]));
        p.clear();
        assert!(p.is_empty());
        assert_eq!(p.previews().live_count(), 0);
        p.wait_for_uploads().await;
        assert!(p.is_empty());
    }

    #[tokio::test]
    async fn test_take_for_send_transfers_previews() {
        let p = pipeline(AttachmentLimits::default(), FakeUploader::new(&[]));
        p.add_files(files(&["a.png", "b.txt"]));
        assert!(matches!(p.take_for_send(), Err(Error::UploadsPending)));

        p.wait_for_uploads().await;
        let sent = p.take_for_send().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(p.is_empty());
        assert_eq!(p.previews().live_count(), 1);
        assert!(sent[0].preview.is_some());
        assert_eq!(sent[1].url, "https://files.test/b.txt");

        drop(sent);
        assert_eq!(p.previews().live_count(), 0);
    }
}
