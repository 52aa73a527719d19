//! Local previews for image attachments

use std::{collections::HashSet, fmt, sync::Arc};

use base64::Engine;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::attachment::{FileHandle, FileSource};

/// Tracks every live preview so leaks are observable.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preview for a file, if its type has one.
    pub fn create(&self, file: &FileHandle) -> Option<PreviewHandle> {
        if !is_previewable(&file.mime_type) {
            return None;
        }
        let uri = match &file.source {
            FileSource::Bytes(bytes) => format!(
                "data:{};base64,{}",
                file.mime_type,
                base64::engine::general_purpose::STANDARD.encode(bytes.as_ref())
            ),
            FileSource::Path(path) => format!("file://{}", path.display()),
        };
        let id = Uuid::new_v4();
        self.live.lock().insert(id);
        Some(PreviewHandle {
            id,
            uri,
            live: Arc::clone(&self.live),
        })
    }

    /// Number of previews not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

/// Exclusive owner of one preview.
///
/// Not `Clone`: releasing consumes the handle, and dropping it releases
/// too, so a preview can never be released twice.
pub struct PreviewHandle {
    id: Uuid,
    uri: String,
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl PreviewHandle {
    /// URI a renderer can display
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if self.live.lock().remove(&self.id) {
            tracing::trace!("Released preview {}", self.id);
        }
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("uri_len", &self.uri.len())
            .finish()
    }
}

/// Whether files of this type get a local preview
pub fn is_previewable(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_bytes_get_data_uri() {
        let registry = PreviewRegistry::new();
        let file = FileHandle::from_bytes("dot.png", vec![1, 2, 3]);
        let preview = registry.create(&file).unwrap();
        assert_eq!(preview.uri(), "data:image/png;base64,AQID");
        assert_eq!(registry.live_count(), 1);
        preview.release();
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_non_image_has_no_preview() {
        let registry = PreviewRegistry::new();
        let file = FileHandle::from_bytes("notes.txt", b"hello".to_vec());
        assert!(registry.create(&file).is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let registry = PreviewRegistry::new();
        {
            let _a = registry.create(&FileHandle::from_bytes("a.jpg", vec![0]));
            let _b = registry.create(&FileHandle::from_bytes("b.gif", vec![0]));
            assert_eq!(registry.live_count(), 2);
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_shared_preview_released_once_when_last_owner_drops() {
        let registry = PreviewRegistry::new();
        let preview = Arc::new(registry.create(&FileHandle::from_bytes("a.png", vec![0])).unwrap());
        let copy = Arc::clone(&preview);
        drop(preview);
        assert_eq!(registry.live_count(), 1);
        drop(copy);
        assert_eq!(registry.live_count(), 0);
    }
}
