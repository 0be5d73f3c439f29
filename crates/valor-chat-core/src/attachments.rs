//! Attachment staging.
//!
//! Files the user picked, pasted or dropped are held here until the next turn
//! is sent. Only images and PDFs are accepted; everything else is dropped
//! without an error. Each staged file can be given an ephemeral preview handle
//! for display, released exactly once when the staging list changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::conversation::AttachmentMeta;

/// Returns true if a MIME type passes the image/PDF allow-list.
///
/// Matching is a case-insensitive substring test for `image` or `pdf`.
#[must_use]
pub fn is_accepted_mime(mime_type: &str) -> bool {
    let lower = mime_type.to_ascii_lowercase();
    lower.contains("image") || lower.contains("pdf")
}

// =============================================================================
// Candidate Files
// =============================================================================

/// Opaque source of a file's bytes.
#[derive(Debug, Clone)]
pub enum FileHandle {
    /// A file on disk, read when the turn is sent.
    Path(PathBuf),
    /// Bytes already in memory (clipboard data, tests).
    Memory(Arc<[u8]>),
}

impl FileHandle {
    /// Load the full contents.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a path-backed file cannot be read.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Path(path) => tokio::fs::read(path).await,
            Self::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// A file offered for staging by a pick, paste or drop.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Display name.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Where the bytes come from.
    pub source: FileHandle,
}

impl CandidateFile {
    /// Describe a file on disk, guessing its MIME type from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mime_type = guess_mime(&path);
        Self {
            name,
            mime_type,
            source: FileHandle::Path(path),
        }
    }

    /// Describe an in-memory file.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: FileHandle::Memory(bytes.into()),
        }
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// A file accepted into staging.
#[derive(Debug, Clone)]
pub struct StagedAttachment {
    /// Where the bytes come from.
    pub source: FileHandle,
    /// Display name.
    pub name: String,
    /// MIME type as declared by the candidate.
    pub mime_type: String,
}

impl StagedAttachment {
    /// Whether the attachment is an image (MIME prefix `image/`).
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// The immutable metadata recorded on the sent message.
    #[must_use]
    pub fn to_meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl From<CandidateFile> for StagedAttachment {
    fn from(candidate: CandidateFile) -> Self {
        Self {
            source: candidate.source,
            name: candidate.name,
            mime_type: candidate.mime_type,
        }
    }
}

// =============================================================================
// Preview Handles
// =============================================================================

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    live: HashSet<u64>,
}

/// Allocator for preview handles.
///
/// Tracks which handles are still live so leaks are observable.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    inner: Mutex<RegistryInner>,
}

impl PreviewRegistry {
    /// Create a new shared registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn allocate(self: &Arc<Self>) -> PreviewHandle {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.live.insert(id);
        tracing::trace!(handle = id, "preview handle allocated");
        PreviewHandle {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Release a handle id. Returns false if it was not live.
    fn release(&self, id: u64) -> bool {
        let released = self.inner.lock().live.remove(&id);
        tracing::trace!(handle = id, released, "preview handle released");
        released
    }

    /// Number of handles currently allocated.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    /// Whether a handle id is still allocated.
    #[must_use]
    pub fn is_live(&self, id: u64) -> bool {
        self.inner.lock().live.contains(&id)
    }
}

/// An ephemeral display handle for one staged file.
///
/// Dropping the handle releases it.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    /// Registry-unique id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

/// Display data for one staged file.
#[derive(Debug)]
pub struct Preview {
    /// Revocable display handle.
    pub handle: PreviewHandle,
    /// File name.
    pub name: String,
    /// Whether the file is an image.
    pub is_image: bool,
    /// Position in the staging list.
    pub index: usize,
}

// =============================================================================
// Staging List
// =============================================================================

/// Ordered list of files waiting to be sent with the next turn.
#[derive(Debug)]
pub struct AttachmentStaging {
    items: Vec<StagedAttachment>,
    registry: Arc<PreviewRegistry>,
    previews: Option<Vec<Preview>>,
}

impl Default for AttachmentStaging {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentStaging {
    /// Create an empty staging list with its own preview registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(PreviewRegistry::new())
    }

    /// Create an empty staging list sharing a preview registry.
    #[must_use]
    pub fn with_registry(registry: Arc<PreviewRegistry>) -> Self {
        Self {
            items: Vec::new(),
            registry,
            previews: None,
        }
    }

    /// Stage every candidate whose MIME type is an image or PDF.
    ///
    /// Rejected candidates are dropped silently. Order is preserved and
    /// duplicates are kept. Returns the number of accepted files.
    pub fn add(&mut self, candidates: impl IntoIterator<Item = CandidateFile>) -> usize {
        let before = self.items.len();
        for candidate in candidates {
            if is_accepted_mime(&candidate.mime_type) {
                self.items.push(candidate.into());
            } else {
                tracing::debug!(
                    name = %candidate.name,
                    mime_type = %candidate.mime_type,
                    "ignoring file outside image/pdf allow-list"
                );
            }
        }
        let accepted = self.items.len() - before;
        if accepted > 0 {
            self.invalidate_previews();
        }
        accepted
    }

    /// Remove the staged file at `index`. Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<StagedAttachment> {
        if index >= self.items.len() {
            return None;
        }
        self.invalidate_previews();
        Some(self.items.remove(index))
    }

    /// Empty the list, releasing all preview handles.
    pub fn clear(&mut self) {
        self.items.clear();
        self.invalidate_previews();
    }

    /// Move every staged file out, leaving the list empty.
    pub fn take(&mut self) -> Vec<StagedAttachment> {
        self.invalidate_previews();
        std::mem::take(&mut self.items)
    }

    /// Previews for the current list, derived on first use after a change.
    ///
    /// The staging list itself is never modified.
    pub fn derive_previews(&mut self) -> &[Preview] {
        let items = &self.items;
        let registry = &self.registry;
        self.previews.get_or_insert_with(|| {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| Preview {
                    handle: registry.allocate(),
                    name: item.name.clone(),
                    is_image: item.is_image(),
                    index,
                })
                .collect()
        })
    }

    /// Previews derived so far, empty if staging changed since.
    #[must_use]
    pub fn previews(&self) -> &[Preview] {
        self.previews.as_deref().unwrap_or_default()
    }

    /// Staged files in submission order.
    #[must_use]
    pub fn items(&self) -> &[StagedAttachment] {
        &self.items
    }

    /// Number of staged files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The registry previews are allocated from.
    #[must_use]
    pub fn registry(&self) -> &Arc<PreviewRegistry> {
        &self.registry
    }

    fn invalidate_previews(&mut self) {
        self.previews = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str) -> CandidateFile {
        CandidateFile::from_bytes(name, mime, b"bytes".to_vec())
    }

    #[test]
    fn allow_list_matches_images_and_pdf() {
        assert!(is_accepted_mime("image/png"));
        assert!(is_accepted_mime("IMAGE/JPEG"));
        assert!(is_accepted_mime("application/pdf"));
        assert!(!is_accepted_mime("text/plain"));
        assert!(!is_accepted_mime("application/octet-stream"));
        assert!(!is_accepted_mime(""));
    }

    #[test]
    fn text_file_is_silently_dropped() {
        let mut staging = AttachmentStaging::new();
        assert_eq!(staging.add([file("notes.txt", "text/plain")]), 0);
        assert!(staging.is_empty());
    }

    #[test]
    fn png_and_pdf_are_staged_in_order() {
        let mut staging = AttachmentStaging::new();
        let accepted = staging.add([
            file("a.png", "image/png"),
            file("b.txt", "text/plain"),
            file("c.pdf", "application/pdf"),
        ]);
        assert_eq!(accepted, 2);
        let names: Vec<_> = staging.items().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a.png", "c.pdf"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut staging = AttachmentStaging::new();
        let f = file("a.png", "image/png");
        staging.add([f.clone(), f]);
        assert_eq!(staging.len(), 2);
    }

    #[test]
    fn remove_shifts_and_ignores_out_of_range() {
        let mut staging = AttachmentStaging::new();
        staging.add([
            file("a.png", "image/png"),
            file("b.png", "image/png"),
            file("c.png", "image/png"),
        ]);

        assert!(staging.remove(7).is_none());
        assert_eq!(staging.len(), 3);

        let removed = staging.remove(0).unwrap();
        assert_eq!(removed.name, "a.png");
        assert_eq!(staging.items()[0].name, "b.png");
        assert_eq!(staging.items()[1].name, "c.png");
    }

    #[test]
    fn from_path_guesses_mime() {
        assert_eq!(CandidateFile::from_path("/tmp/photo.JPG").mime_type, "image/jpeg");
        assert_eq!(CandidateFile::from_path("doc.pdf").mime_type, "application/pdf");
        assert_eq!(
            CandidateFile::from_path("blob").mime_type,
            "application/octet-stream"
        );
        assert_eq!(CandidateFile::from_path("/a/b/doc.pdf").name, "doc.pdf");
    }

    #[test]
    fn previews_flag_images_and_carry_index() {
        let mut staging = AttachmentStaging::new();
        staging.add([file("a.png", "image/png"), file("b.pdf", "application/pdf")]);

        let previews = staging.derive_previews();
        assert_eq!(previews.len(), 2);
        assert!(previews[0].is_image);
        assert!(!previews[1].is_image);
        assert_eq!(previews[1].index, 1);
        assert_eq!(previews[1].name, "b.pdf");
        assert_eq!(staging.len(), 2);
    }

    #[test]
    fn previews_are_cached_until_staging_changes() {
        let mut staging = AttachmentStaging::new();
        staging.add([file("a.png", "image/png")]);

        let first = staging.derive_previews()[0].handle.id();
        let again = staging.derive_previews()[0].handle.id();
        assert_eq!(first, again);
        assert_eq!(staging.registry().live_count(), 1);

        staging.add([file("b.png", "image/png")]);
        assert!(!staging.registry().is_live(first));
        assert!(staging.previews().is_empty());

        staging.derive_previews();
        assert_eq!(staging.registry().live_count(), 2);
    }

    #[test]
    fn clear_and_remove_release_handles() {
        let mut staging = AttachmentStaging::new();
        staging.add([file("a.png", "image/png"), file("b.png", "image/png")]);
        staging.derive_previews();
        assert_eq!(staging.registry().live_count(), 2);

        staging.remove(0);
        assert_eq!(staging.registry().live_count(), 0);

        staging.derive_previews();
        staging.clear();
        assert_eq!(staging.registry().live_count(), 0);
        assert!(staging.is_empty());
    }

    #[test]
    fn rejected_add_keeps_previews() {
        let mut staging = AttachmentStaging::new();
        staging.add([file("a.png", "image/png")]);
        let id = staging.derive_previews()[0].handle.id();

        staging.add([file("x.txt", "text/plain")]);
        assert!(staging.registry().is_live(id));
        assert_eq!(staging.previews().len(), 1);
    }

    #[test]
    fn handles_are_released_across_many_turns() {
        let registry = PreviewRegistry::new();
        let mut staging = AttachmentStaging::with_registry(Arc::clone(&registry));
        for _ in 0..50 {
            staging.add([file("a.png", "image/png"), file("b.pdf", "application/pdf")]);
            staging.derive_previews();
            let taken = staging.take();
            assert_eq!(taken.len(), 2);
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn memory_handle_reads_back() {
        let handle = FileHandle::Memory(Arc::from(&b"%PDF-1.7"[..]));
        assert_eq!(handle.read().await.unwrap(), b"%PDF-1.7");
    }
}
