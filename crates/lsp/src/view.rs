//! The seam between this crate and the host's text buffers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ropey::Rope;
use tether_text::{Change, ChangeSet};

/// Identifies one editor view attached to a document. Attachment refcounts
/// are per view, so the same buffer shown twice counts twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

/// Read/write access to one open document, implemented by the host.
///
/// `synced_doc` and `unsynced_changes` must be taken from the same state:
/// the snapshot last pushed to servers and the local edits made since.
pub trait DocumentView: Send + Sync {
	/// Char length of the live buffer.
	fn len_chars(&self) -> usize;

	/// Version number last pushed to servers.
	fn version(&self) -> i32;

	/// Snapshot of the buffer as the servers last saw it.
	fn synced_doc(&self) -> Rope;

	/// Local edits applied since the synced snapshot.
	fn unsynced_changes(&self) -> ChangeSet;

	/// Flushes pending edits to servers, bumping the version.
	fn sync_now(&self);

	/// Applies a batch of edits to the live buffer as one atomic mutation.
	/// Returns false when the host rejected the batch.
	fn apply(&self, changes: Vec<Change>) -> bool;
}

/// What the pool needs to know about a document to match servers to it.
#[derive(Clone)]
pub struct DocumentMetadata {
	pub uri: String,
	/// Explicit protocol language id, when the host knows it.
	pub language_id: Option<String>,
	/// Human-readable language name, used as fallback (lowercased).
	pub language_name: Option<String>,
	/// Explicit workspace root, bypassing resolvers when set.
	pub root: Option<String>,
	pub view: Arc<dyn DocumentView>,
	pub view_id: ViewId,
}

impl DocumentMetadata {
	/// The language used for server matching: explicit id, else the
	/// lowercased name, else empty (matches nothing).
	pub fn effective_language(&self) -> String {
		self.language_id
			.clone()
			.or_else(|| self.language_name.as_ref().map(|name| name.to_lowercase()))
			.unwrap_or_default()
	}
}

impl std::fmt::Debug for DocumentMetadata {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentMetadata")
			.field("uri", &self.uri)
			.field("language_id", &self.language_id)
			.field("language_name", &self.language_name)
			.field("root", &self.root)
			.field("view_id", &self.view_id)
			.finish()
	}
}

/// Live views by URI, shared with the notification router so diagnostics
/// can be converted against the owning document.
pub(crate) type ViewMap = RwLock<HashMap<String, Arc<dyn DocumentView>>>;
