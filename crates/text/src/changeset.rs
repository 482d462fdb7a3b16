use ropey::Rope;

use crate::types::{Bias, Change, Insertion, Operation};

/// An ordered run of operations transforming a source document of `len`
/// chars into a target document of `len_after` chars.
///
/// Operations are kept canonical: adjacent runs of the same kind are
/// merged, and an insertion adjacent to a deletion is ordered before it,
/// so a replacement always reads `Insert` then `Delete`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
	changes: Vec<Operation>,
	/// Char length of the source document.
	len: usize,
	/// Char length of the target document.
	len_after: usize,
}

impl ChangeSet {
	/// The identity change set over a document of `len` chars.
	pub fn identity(len: usize) -> Self {
		let mut set = Self::default();
		set.retain(len);
		set
	}

	/// Builds a change set from a batch of edits in source coordinates.
	///
	/// Edits must be sorted ascending by start and non-overlapping; an
	/// edit violating that (or reaching past `len`) is clamped or skipped.
	/// The result always covers the whole source document.
	pub fn from_edits(len: usize, edits: &[Change]) -> Self {
		let mut set = Self::default();
		let mut pos = 0;
		for edit in edits {
			let start = edit.start.min(len);
			let end = edit.end.clamp(start, len);
			if start < pos {
				continue;
			}
			set.retain(start - pos);
			if let Some(text) = &edit.replacement {
				set.insert(text.clone());
			}
			set.delete(end - start);
			pos = end;
		}
		set.retain(len - pos);
		set
	}

	pub fn retain(&mut self, n: usize) {
		if n == 0 {
			return;
		}
		self.len += n;
		self.len_after += n;
		if let Some(Operation::Retain(count)) = self.changes.last_mut() {
			*count += n;
		} else {
			self.changes.push(Operation::Retain(n));
		}
	}

	pub fn delete(&mut self, n: usize) {
		if n == 0 {
			return;
		}
		self.len += n;
		if let Some(Operation::Delete(count)) = self.changes.last_mut() {
			*count += n;
		} else {
			self.changes.push(Operation::Delete(n));
		}
	}

	pub fn insert(&mut self, text: String) {
		let insertion = Insertion::new(text);
		if insertion.is_empty() {
			return;
		}
		self.len_after += insertion.char_len();
		match self.changes.as_mut_slice() {
			[.., Operation::Insert(prior)] => prior.push(&insertion),
			// Keep a replacement canonical: insert before the delete.
			[.., Operation::Insert(prior), Operation::Delete(_)] => prior.push(&insertion),
			[.., last @ Operation::Delete(_)] => {
				let delete = std::mem::replace(last, Operation::Insert(insertion));
				self.changes.push(delete);
			}
			_ => self.changes.push(Operation::Insert(insertion)),
		}
	}

	/// Applies the change set to `doc`, whose length must equal [`Self::len`].
	pub fn apply(&self, doc: &mut Rope) {
		debug_assert_eq!(doc.len_chars(), self.len, "applying to a document of the wrong length");
		let mut pos = 0;
		for op in &self.changes {
			match op {
				Operation::Retain(n) => pos += n,
				Operation::Delete(n) => {
					doc.remove(pos..pos + n);
				}
				Operation::Insert(ins) => {
					doc.insert(pos, ins.text());
					pos += ins.char_len();
				}
			}
		}
	}

	/// Composes two consecutive change sets into one.
	///
	/// `other` must start from this set's target document
	/// (`self.len_after == other.len`).
	pub fn compose(self, other: ChangeSet) -> ChangeSet {
		debug_assert_eq!(self.len_after, other.len, "composing change sets over different documents");
		use Operation::*;
		let mut out = ChangeSet::default();
		let mut ops_a = self.changes.into_iter();
		let mut ops_b = other.changes.into_iter();
		let mut head_a = ops_a.next();
		let mut head_b = ops_b.next();
		loop {
			match (head_a.take(), head_b.take()) {
				(None, None) => break,
				// Text deleted by the first set never reaches the second.
				(Some(Delete(n)), b) => {
					out.delete(n);
					head_a = ops_a.next();
					head_b = b;
				}
				// Text inserted by the second set is independent of the first.
				(a, Some(Insert(ins))) => {
					out.insert(ins.into_text());
					head_a = a;
					head_b = ops_b.next();
				}
				(None, Some(_)) | (Some(_), None) => {
					unreachable!("composing change sets over different documents")
				}
				(Some(Retain(a_n)), Some(Retain(b_n))) => {
					let n = a_n.min(b_n);
					out.retain(n);
					head_a = (a_n > n).then_some(Retain(a_n - n)).or_else(|| ops_a.next());
					head_b = (b_n > n).then_some(Retain(b_n - n)).or_else(|| ops_b.next());
				}
				(Some(Retain(a_n)), Some(Delete(b_n))) => {
					let n = a_n.min(b_n);
					out.delete(n);
					head_a = (a_n > n).then_some(Retain(a_n - n)).or_else(|| ops_a.next());
					head_b = (b_n > n).then_some(Delete(b_n - n)).or_else(|| ops_b.next());
				}
				(Some(Insert(mut ins)), Some(Delete(b_n))) => {
					let a_n = ins.char_len();
					let n = a_n.min(b_n);
					// The second set deletes (part of) the first's insertion.
					let _ = ins.take_prefix(n);
					head_a = if ins.is_empty() {
						ops_a.next()
					} else {
						Some(Insert(ins))
					};
					head_b = (b_n > n).then_some(Delete(b_n - n)).or_else(|| ops_b.next());
				}
				(Some(Insert(mut ins)), Some(Retain(b_n))) => {
					let a_n = ins.char_len();
					let n = a_n.min(b_n);
					out.insert(ins.take_prefix(n).into_text());
					head_a = if ins.is_empty() {
						ops_a.next()
					} else {
						Some(Insert(ins))
					};
					head_b = (b_n > n).then_some(Retain(b_n - n)).or_else(|| ops_b.next());
				}
			}
		}
		out
	}

	/// Maps a source-document offset into the target document.
	///
	/// An offset inside deleted text clamps to the deletion point. `bias`
	/// decides which side of an insertion at the offset the result lands on.
	pub fn map_pos(&self, pos: usize, bias: Bias) -> usize {
		match self.map_pos_inner(pos, bias, false) {
			Some(mapped) => mapped,
			None => unreachable!("plain mapping never drops"),
		}
	}

	/// Maps a source-document offset, reporting deletion.
	///
	/// Returns `None` when a deletion strictly spans `pos`; an offset
	/// exactly on a deletion boundary survives. Otherwise behaves like
	/// [`Self::map_pos`].
	pub fn try_map_pos(&self, pos: usize, bias: Bias) -> Option<usize> {
		self.map_pos_inner(pos, bias, true)
	}

	fn map_pos_inner(&self, pos: usize, bias: Bias, track_deletions: bool) -> Option<usize> {
		let mut old_pos = 0;
		let mut new_pos = 0;
		for op in &self.changes {
			match op {
				Operation::Retain(n) => {
					if pos < old_pos + n {
						return Some(new_pos + (pos - old_pos));
					}
					old_pos += n;
					new_pos += n;
				}
				Operation::Delete(n) => {
					if pos == old_pos {
						return Some(new_pos);
					}
					if pos < old_pos + n {
						return (!track_deletions).then_some(new_pos);
					}
					old_pos += n;
				}
				Operation::Insert(ins) => {
					if pos == old_pos && bias == Bias::Left {
						return Some(new_pos);
					}
					new_pos += ins.char_len();
				}
			}
		}
		Some(new_pos + (pos - old_pos))
	}

	/// Char length of the source document.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Char length of the target document.
	pub fn len_after(&self) -> usize {
		self.len_after
	}

	/// Whether the set changes nothing (retains only).
	pub fn is_identity(&self) -> bool {
		self.changes
			.iter()
			.all(|op| matches!(op, Operation::Retain(_)))
	}

	pub fn changes(&self) -> &[Operation] {
		&self.changes
	}
}
