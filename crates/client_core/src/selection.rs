use std::{fs, io, path::Path, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::SelectionError,
    preview::{PreviewHandle, PreviewRef, PreviewStore},
};

/// A candidate image handed over by the UI, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    /// Reads a file from disk, declaring the media type guessed from its
    /// extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = mime_guess::from_path(path).first_raw().map(str::to_string);
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Picker,
    Drop,
}

/// Which sources run [`validate_before_accept`] and the optional size cap.
///
/// The default trusts the picker (its own filter already restricts it to
/// images) and validates drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub validate_picker: bool,
    pub validate_drop: bool,
    pub max_upload_bytes: Option<u64>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            validate_picker: false,
            validate_drop: true,
            max_upload_bytes: None,
        }
    }
}

impl SelectionPolicy {
    pub fn validates(&self, source: SelectionSource) -> bool {
        match source {
            SelectionSource::Picker => self.validate_picker,
            SelectionSource::Drop => self.validate_drop,
        }
    }
}

pub fn validate_before_accept(file: &CandidateFile) -> Result<(), SelectionError> {
    let is_image = file
        .media_type
        .as_deref()
        .is_some_and(|media_type| media_type.to_ascii_lowercase().starts_with("image/"));
    if is_image {
        Ok(())
    } else {
        Err(SelectionError::InvalidFileType {
            media_type: file.media_type.clone(),
        })
    }
}

#[derive(Debug)]
pub struct SelectionResult {
    pub file_name: String,
    pub media_type: Option<String>,
    pub raw_payload: Vec<u8>,
    pub source: SelectionSource,
    preview: PreviewHandle,
}

impl SelectionResult {
    pub fn preview(&self) -> &PreviewRef {
        self.preview.preview()
    }
}

/// Owns the current selection and the single live preview backing it.
pub struct SelectionManager {
    store: Arc<dyn PreviewStore>,
    policy: SelectionPolicy,
    current: Option<SelectionResult>,
    drag_active: bool,
}

impl SelectionManager {
    pub fn new(store: Arc<dyn PreviewStore>, policy: SelectionPolicy) -> Self {
        Self {
            store,
            policy,
            current: None,
            drag_active: false,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn current(&self) -> Option<&SelectionResult> {
        self.current.as_ref()
    }

    pub fn select_from_picker(
        &mut self,
        file: CandidateFile,
    ) -> Result<&SelectionResult, SelectionError> {
        self.accept(SelectionSource::Picker, file)
    }

    /// Only the first dropped item is considered; an empty drop is treated
    /// as an unsupported file.
    pub fn select_from_drop(
        &mut self,
        files: Vec<CandidateFile>,
    ) -> Result<&SelectionResult, SelectionError> {
        self.drag_active = false;
        let Some(file) = files.into_iter().next() else {
            return Err(SelectionError::InvalidFileType { media_type: None });
        };
        self.accept(SelectionSource::Drop, file)
    }

    fn accept(
        &mut self,
        source: SelectionSource,
        file: CandidateFile,
    ) -> Result<&SelectionResult, SelectionError> {
        if self.policy.validates(source) {
            if let Err(err) = validate_before_accept(&file) {
                info!(?source, name = %file.name, "selection: rejected: {err}");
                return Err(err);
            }
        }
        if let Some(limit) = self.policy.max_upload_bytes {
            if file.size() > limit {
                return Err(SelectionError::TooLarge {
                    size: file.size(),
                    limit,
                });
            }
        }

        // Acquire before releasing: a failed allocation must leave the
        // existing selection intact.
        let preview = PreviewHandle::acquire(Arc::clone(&self.store), &file)?;
        drop(self.current.take());

        debug!(
            ?source,
            name = %file.name,
            size = file.bytes.len(),
            preview_id = preview.preview().id.0,
            "selection: accepted"
        );
        Ok(self.current.insert(SelectionResult {
            file_name: file.name,
            media_type: file.media_type,
            raw_payload: file.bytes,
            source,
            preview,
        }))
    }

    /// Drops the current selection, revoking its preview.
    pub fn release(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!(preview_id = previous.preview().id.0, "selection: released");
        }
    }

    pub fn drag_enter(&mut self) {
        self.drag_active = true;
    }

    pub fn drag_leave(&mut self) {
        self.drag_active = false;
    }

    pub fn is_drag_active(&self) -> bool {
        self.drag_active
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
