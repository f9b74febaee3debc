//! Locally renderable previews of the selected image.
//!
//! A preview is backed by a resource the host does not reclaim on its own
//! (a file on disk, an in-memory buffer registered with a renderer). The
//! [`PreviewHandle`] guard ties that resource to ownership: dropping the
//! handle revokes it exactly once.

use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use shared::domain::PreviewId;
use tracing::{debug, warn};

use crate::{error::PreviewError, selection::CandidateFile};

/// Opaque reference a rendering layer can use to display the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRef {
    pub id: PreviewId,
    pub location: String,
}

pub trait PreviewStore: Send + Sync {
    fn create(&self, file: &CandidateFile) -> Result<PreviewRef, PreviewError>;
    fn revoke(&self, preview: &PreviewRef);
}

pub struct PreviewHandle {
    preview: PreviewRef,
    store: Arc<dyn PreviewStore>,
}

impl PreviewHandle {
    pub fn acquire(store: Arc<dyn PreviewStore>, file: &CandidateFile) -> Result<Self, PreviewError> {
        let preview = store.create(file)?;
        debug!(preview_id = preview.id.0, location = %preview.location, "preview: acquired");
        Ok(Self { preview, store })
    }

    pub fn preview(&self) -> &PreviewRef {
        &self.preview
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("preview", &self.preview)
            .finish_non_exhaustive()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        debug!(preview_id = self.preview.id.0, "preview: revoked");
        self.store.revoke(&self.preview);
    }
}

#[derive(Default)]
struct MemoryPreviewState {
    next_id: u64,
    live: HashMap<PreviewId, Vec<u8>>,
    revoked: Vec<PreviewId>,
}

/// Keeps preview bytes in memory, addressed by `preview://memory/<id>`.
///
/// Also records every revocation, which makes it the store of choice for
/// checking handle lifetimes.
#[derive(Default)]
pub struct MemoryPreviewStore {
    state: Mutex<MemoryPreviewState>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> Vec<PreviewId> {
        let state = self.lock();
        let mut ids: Vec<_> = state.live.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn revoked(&self) -> Vec<PreviewId> {
        self.lock().revoked.clone()
    }

    pub fn bytes(&self, id: PreviewId) -> Option<Vec<u8>> {
        self.lock().live.get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryPreviewState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn create(&self, file: &CandidateFile) -> Result<PreviewRef, PreviewError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = PreviewId(state.next_id);
        state.live.insert(id, file.bytes.clone());
        Ok(PreviewRef {
            id,
            location: format!("preview://memory/{}", id.0),
        })
    }

    fn revoke(&self, preview: &PreviewRef) {
        let mut state = self.lock();
        if state.live.remove(&preview.id).is_none() {
            warn!(preview_id = preview.id.0, "preview: revoke of unknown preview");
        }
        state.revoked.push(preview.id);
    }
}

/// Writes each preview to its own file under a directory and deletes the
/// file on revocation. The location is a `file://` URL.
pub struct TempDirPreviewStore {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl TempDirPreviewStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PreviewError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PreviewError::Directory {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: PreviewId, media_type: Option<&str>) -> PathBuf {
        let extension = media_type
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        self.dir
            .join(format!("preview-{}-{}.{extension}", std::process::id(), id.0))
    }
}

impl PreviewStore for TempDirPreviewStore {
    fn create(&self, file: &CandidateFile) -> Result<PreviewRef, PreviewError> {
        let id = PreviewId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let path = self.path_for(id, file.media_type.as_deref());
        fs::write(&path, &file.bytes).map_err(|source| PreviewError::Write {
            path: path.display().to_string(),
            source,
        })?;
        let location = url::Url::from_file_path(&path)
            .map(|url| url.to_string())
            .unwrap_or_else(|()| path.display().to_string());
        Ok(PreviewRef { id, location })
    }

    fn revoke(&self, preview: &PreviewRef) {
        let path = url::Url::parse(&preview.location)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(&preview.location));
        if let Err(err) = fs::remove_file(&path) {
            warn!(
                preview_id = preview.id.0,
                path = %path.display(),
                "preview: failed to remove preview file: {err}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> CandidateFile {
        CandidateFile::new(name, Some("image/png".to_string()), b"\x89PNG fake".to_vec())
    }

    #[test]
    fn dropping_handle_revokes_once() {
        let store = Arc::new(MemoryPreviewStore::new());
        let handle = PreviewHandle::acquire(store.clone(), &png("a.png")).expect("acquire");
        let id = handle.preview().id;
        assert_eq!(store.live(), vec![id]);

        drop(handle);
        assert!(store.live().is_empty());
        assert_eq!(store.revoked(), vec![id]);
    }

    #[test]
    fn temp_dir_store_removes_file_on_revoke() {
        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("visual_search_preview_test_{suffix}"));
        let store = Arc::new(TempDirPreviewStore::new(&dir).expect("store"));

        let handle = PreviewHandle::acquire(store.clone(), &png("a.png")).expect("acquire");
        let location = handle.preview().location.clone();
        assert!(location.starts_with("file://"), "unexpected location {location}");
        assert!(location.ends_with(".png"), "unexpected location {location}");
        let path = url::Url::parse(&location)
            .expect("url")
            .to_file_path()
            .expect("path");
        assert_eq!(fs::read(&path).expect("preview file"), b"\x89PNG fake");

        drop(handle);
        assert!(!path.exists());

        fs::remove_dir_all(dir).expect("cleanup");
    }
}
