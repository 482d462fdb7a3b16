//! Applies server-computed text edits to a live buffer.
//!
//! Edits arrive in protocol coordinates against the synced snapshot; the
//! buffer may have moved on since the request was issued. Each edit is
//! converted against the snapshot and remapped through the pending local
//! changes, dropping edits whose anchors no longer exist.

use lsp_types::TextEdit;
use ropey::Rope;
use tether_text::{Bias, Change, ChangeSet};

use crate::position::{lsp_position_to_char, OffsetEncoding};
use crate::view::DocumentView;

/// Converts an edit batch into live-buffer changes.
///
/// Start offsets are remapped with `Bias::Right` and ends with
/// `Bias::Left`, so an edit shrinks toward its surviving interior when its
/// boundary sat on local edits. Edits are dropped when an endpoint was
/// deleted locally, converts out of bounds, or overlaps an earlier kept
/// edit; the rest apply. Line endings are normalized to `\n`.
pub fn reconcile(
	synced: &Rope,
	pending: &ChangeSet,
	encoding: OffsetEncoding,
	edits: &[TextEdit],
) -> Vec<Change> {
	let mut changes = Vec::with_capacity(edits.len());
	for edit in edits {
		let Some(from_base) = lsp_position_to_char(synced, edit.range.start, encoding) else {
			continue;
		};
		let Some(to_base) = lsp_position_to_char(synced, edit.range.end, encoding) else {
			continue;
		};
		let Some(from) = pending.try_map_pos(from_base, Bias::Right) else {
			continue;
		};
		let Some(to) = pending.try_map_pos(to_base, Bias::Left) else {
			continue;
		};
		if from > to {
			continue;
		}
		changes.push(Change {
			start: from,
			end: to,
			replacement: Some(edit.new_text.replace("\r\n", "\n")),
		});
	}

	changes.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
	let mut kept: Vec<Change> = Vec::with_capacity(changes.len());
	for change in changes {
		if kept.last().is_some_and(|prev| change.start < prev.end) {
			continue;
		}
		kept.push(change);
	}
	kept
}

/// Reconciles and applies a batch as one atomic mutation. Returns whether
/// anything was applied.
pub fn apply_edit_batch(view: &dyn DocumentView, edits: &[TextEdit], encoding: OffsetEncoding) -> bool {
	let synced = view.synced_doc();
	let pending = view.unsynced_changes();
	let changes = reconcile(&synced, &pending, encoding, edits);
	if changes.is_empty() {
		return false;
	}
	view.apply(changes)
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use lsp_types::{Position, Range};
	use tether_text::ChangeSet;

	use super::*;

	fn edit(line: u32, from: u32, to: u32, text: &str) -> TextEdit {
		TextEdit {
			range: Range {
				start: Position { line, character: from },
				end: Position { line, character: to },
			},
			new_text: text.to_string(),
		}
	}

	/// View whose live buffer is the synced snapshot plus pending edits;
	/// `apply` mutates the live buffer through a change set.
	struct EditableView {
		synced: Rope,
		live: Mutex<Rope>,
		pending: ChangeSet,
	}

	impl EditableView {
		fn new(text: &str) -> Self {
			let synced = Rope::from_str(text);
			let pending = ChangeSet::identity(synced.len_chars());
			Self {
				live: Mutex::new(synced.clone()),
				synced,
				pending,
			}
		}

		fn with_pending(text: &str, edits: &[Change]) -> Self {
			let synced = Rope::from_str(text);
			let pending = ChangeSet::from_edits(synced.len_chars(), edits);
			let mut live = synced.clone();
			pending.apply(&mut live);
			Self {
				live: Mutex::new(live),
				synced,
				pending,
			}
		}

		fn live_text(&self) -> String {
			self.live.lock().unwrap().to_string()
		}
	}

	impl DocumentView for EditableView {
		fn len_chars(&self) -> usize {
			self.live.lock().unwrap().len_chars()
		}

		fn version(&self) -> i32 {
			1
		}

		fn synced_doc(&self) -> Rope {
			self.synced.clone()
		}

		fn unsynced_changes(&self) -> ChangeSet {
			self.pending.clone()
		}

		fn sync_now(&self) {}

		fn apply(&self, changes: Vec<Change>) -> bool {
			let mut live = self.live.lock().unwrap();
			let set = ChangeSet::from_edits(live.len_chars(), &changes);
			set.apply(&mut live);
			true
		}
	}

	#[test]
	fn clean_buffer_applies_all_edits() {
		let view = EditableView::new("fn main( ) {}\n");
		let applied = apply_edit_batch(
			&view,
			&[edit(0, 8, 9, ""), edit(0, 13, 13, " // entry")],
			OffsetEncoding::Utf16,
		);
		assert!(applied);
		assert_eq!(view.live_text(), "fn main() {} // entry\n");
	}

	#[test]
	fn edits_remap_over_pending_local_changes() {
		// Server formatted "a  =1"; meanwhile "let " was typed up front.
		let view = EditableView::with_pending("a  =1\n", &[Change::insert(0, "let ")]);
		assert_eq!(view.live_text(), "let a  =1\n");

		let applied = apply_edit_batch(
			&view,
			&[edit(0, 1, 3, " "), edit(0, 4, 4, " ")],
			OffsetEncoding::Utf16,
		);
		assert!(applied);
		assert_eq!(view.live_text(), "let a = 1\n");
	}

	#[test]
	fn edit_with_deleted_anchor_is_dropped_alone() {
		// The local deletion swallows the second edit's anchors.
		let view = EditableView::with_pending("aa bb cc\n", &[Change::delete(2, 6)]);
		assert_eq!(view.live_text(), "aacc\n");

		let applied = apply_edit_batch(
			&view,
			&[edit(0, 0, 2, "AA"), edit(0, 3, 5, "BB")],
			OffsetEncoding::Utf16,
		);
		assert!(applied);
		// First edit landed, second silently vanished.
		assert_eq!(view.live_text(), "AAcc\n");
	}

	#[test]
	fn overlapping_edits_keep_the_first() {
		let view = EditableView::new("abcdef\n");
		let applied = apply_edit_batch(
			&view,
			&[edit(0, 0, 4, "X"), edit(0, 2, 6, "Y")],
			OffsetEncoding::Utf16,
		);
		assert!(applied);
		assert_eq!(view.live_text(), "Xef\n");
	}

	#[test]
	fn crlf_replacement_text_is_normalized() {
		let view = EditableView::new("one two\n");
		apply_edit_batch(&view, &[edit(0, 3, 4, "\r\n")], OffsetEncoding::Utf16);
		assert_eq!(view.live_text(), "one\ntwo\n");
	}

	#[test]
	fn empty_and_fully_dropped_batches_report_nothing_applied() {
		let view = EditableView::with_pending("abcdef\n", &[Change::delete(1, 5)]);
		assert!(!apply_edit_batch(&view, &[], OffsetEncoding::Utf16));
		assert!(!apply_edit_batch(
			&view,
			&[edit(0, 2, 4, "zz")],
			OffsetEncoding::Utf16
		));
		assert_eq!(view.live_text(), "af\n");
	}

	#[test]
	fn out_of_bounds_edit_is_skipped() {
		let view = EditableView::new("short\n");
		let applied = apply_edit_batch(
			&view,
			&[edit(9, 0, 1, "nope"), edit(0, 0, 5, "long")],
			OffsetEncoding::Utf16,
		);
		assert!(applied);
		assert_eq!(view.live_text(), "long\n");
	}
}
