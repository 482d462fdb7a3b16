//! Version-gated diagnostic storage.
//!
//! Diagnostics arrive in protocol coordinates against the document version
//! the server analyzed. The store converts them to char offsets against the
//! synced snapshot, carries them over the view's pending local edits, and
//! keeps them as plain offsets. Queries remap on the fly through whatever
//! has changed since; nothing a query computes is ever written back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};
use parking_lot::RwLock;
use tether_text::{Bias, ChangeSet};

use crate::position::{lsp_range_to_char_range, OffsetEncoding};
use crate::view::DocumentView;

/// Diagnostic severity, ordered most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Error,
	Warning,
	Info,
	Hint,
}

impl Severity {
	/// Protocol severity mapping. An absent severity is a hint; an
	/// unknown value is informational.
	fn from_lsp(severity: Option<DiagnosticSeverity>) -> Self {
		match severity {
			Some(DiagnosticSeverity::ERROR) => Self::Error,
			Some(DiagnosticSeverity::WARNING) => Self::Warning,
			Some(DiagnosticSeverity::INFORMATION) => Self::Info,
			Some(DiagnosticSeverity::HINT) | None => Self::Hint,
			Some(_) => Self::Info,
		}
	}
}

/// One diagnostic held by the store, in char offsets relative to the
/// buffer state at ingest time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDiagnostic {
	pub from: usize,
	pub to: usize,
	pub severity: Severity,
	pub message: String,
	/// Combined `source-code` tag, when the server provided either.
	pub source: Option<String>,
}

#[derive(Debug, Default)]
struct DocumentEntry {
	/// Version of the last accepted notification, when it carried one.
	version: Option<i32>,
	items: Vec<StoredDiagnostic>,
}

/// Diagnostics for all open documents, replaced wholesale per accepted
/// publish notification.
#[derive(Debug, Default)]
pub struct DiagnosticStore {
	entries: RwLock<HashMap<String, DocumentEntry>>,
	revision: AtomicU64,
}

impl DiagnosticStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Accepts or rejects one publish notification for `uri`.
	///
	/// Rejected (returning false, store untouched) when the notification
	/// carries a version that differs from the view's current version or
	/// is older than the last accepted one. Accepted notifications replace
	/// the stored set wholesale; entries whose mapped end would land past
	/// the live buffer are skipped.
	pub fn ingest(
		&self,
		uri: &str,
		version: Option<i32>,
		diagnostics: &[Diagnostic],
		view: &dyn DocumentView,
		encoding: OffsetEncoding,
	) -> bool {
		if let Some(version) = version {
			if version != view.version() {
				return false;
			}
			let entries = self.entries.read();
			if let Some(entry) = entries.get(uri)
				&& entry.version.is_some_and(|last| version < last)
			{
				return false;
			}
		}

		let synced = view.synced_doc();
		let pending = view.unsynced_changes();
		let live_len = view.len_chars();

		let mut items = Vec::with_capacity(diagnostics.len());
		for diagnostic in diagnostics {
			let Some((from_base, to_base)) = lsp_range_to_char_range(&synced, diagnostic.range, encoding)
			else {
				continue;
			};
			let from = pending.map_pos(from_base, Bias::Left);
			let to = pending.map_pos(to_base, Bias::Left);
			if to > live_len || from > to {
				continue;
			}
			items.push(StoredDiagnostic {
				from,
				to,
				severity: Severity::from_lsp(diagnostic.severity),
				message: diagnostic.message.clone(),
				source: source_tag(diagnostic),
			});
		}

		self.entries
			.write()
			.insert(uri.to_string(), DocumentEntry { version, items });
		self.revision.fetch_add(1, Ordering::Relaxed);
		true
	}

	/// Stored diagnostics for `uri`, remapped through the edits made since
	/// ingest. A diagnostic whose interior was deleted, or whose mapped end
	/// falls past `buffer_len`, is omitted. Pure read; the remap is never
	/// persisted.
	pub fn query(&self, uri: &str, changes: &ChangeSet, buffer_len: usize) -> Vec<StoredDiagnostic> {
		let entries = self.entries.read();
		let Some(entry) = entries.get(uri) else {
			return Vec::new();
		};
		entry
			.items
			.iter()
			.filter_map(|item| {
				let from = changes.try_map_pos(item.from, Bias::Right)?;
				let to = changes.try_map_pos(item.to, Bias::Left)?;
				if to > buffer_len || from > to {
					return None;
				}
				Some(StoredDiagnostic {
					from,
					to,
					..item.clone()
				})
			})
			.collect()
	}

	/// Clears stored diagnostics for `uri`, keeping the version gate.
	pub fn clear(&self, uri: &str) {
		let mut entries = self.entries.write();
		if let Some(entry) = entries.get_mut(uri) {
			if entry.items.is_empty() {
				return;
			}
			entry.items.clear();
			self.revision.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Forgets `uri` entirely, version gate included.
	pub fn remove(&self, uri: &str) {
		if self.entries.write().remove(uri).is_some() {
			self.revision.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn error_count(&self, uri: &str) -> usize {
		self.count_severity(uri, Severity::Error)
	}

	pub fn warning_count(&self, uri: &str) -> usize {
		self.count_severity(uri, Severity::Warning)
	}

	fn count_severity(&self, uri: &str, severity: Severity) -> usize {
		self.entries
			.read()
			.get(uri)
			.map_or(0, |entry| {
				entry.items.iter().filter(|item| item.severity == severity).count()
			})
	}

	/// Monotonic counter bumped on every store mutation. A renderer can
	/// poll this to detect change cheaply.
	pub fn revision(&self) -> u64 {
		self.revision.load(Ordering::Relaxed)
	}
}

fn source_tag(diagnostic: &Diagnostic) -> Option<String> {
	let code = diagnostic.code.as_ref().map(|code| match code {
		NumberOrString::Number(n) => n.to_string(),
		NumberOrString::String(s) => s.clone(),
	});
	match (&diagnostic.source, code) {
		(Some(source), Some(code)) => Some(format!("{source}-{code}")),
		(Some(source), None) => Some(source.clone()),
		(None, Some(code)) => Some(code),
		(None, None) => None,
	}
}
