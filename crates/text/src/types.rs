/// Direction an offset leans when it lands exactly on an edit boundary.
///
/// Mapping an offset through an insertion at that offset: `Left` keeps the
/// offset before the inserted text, `Right` moves it after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
	Left,
	Right,
}

/// A single edit in source-document coordinates.
///
/// Replaces the char range `start..end` with `replacement`; `None` is a
/// pure deletion, `start == end` with `Some` is a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
	pub start: usize,
	pub end: usize,
	pub replacement: Option<String>,
}

impl Change {
	pub fn delete(start: usize, end: usize) -> Self {
		Self {
			start,
			end,
			replacement: None,
		}
	}

	pub fn insert(at: usize, text: impl Into<String>) -> Self {
		Self {
			start: at,
			end: at,
			replacement: Some(text.into()),
		}
	}

	pub fn replace(start: usize, end: usize, text: impl Into<String>) -> Self {
		Self {
			start,
			end,
			replacement: Some(text.into()),
		}
	}
}

/// Inserted text with its char length cached.
///
/// Operations are measured in chars; recounting a `String` on every walk
/// would make mapping quadratic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
	text: String,
	char_len: usize,
}

impl Insertion {
	pub fn new(text: String) -> Self {
		let char_len = text.chars().count();
		Self { text, char_len }
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn char_len(&self) -> usize {
		self.char_len
	}

	pub fn is_empty(&self) -> bool {
		self.char_len == 0
	}

	pub fn into_text(self) -> String {
		self.text
	}

	/// Appends another insertion, keeping the cached length consistent.
	pub fn push(&mut self, other: &Insertion) {
		self.text.push_str(&other.text);
		self.char_len += other.char_len;
	}

	/// Splits off and returns the first `char_count` chars.
	pub fn take_prefix(&mut self, char_count: usize) -> Insertion {
		debug_assert!(char_count <= self.char_len);
		let byte_idx = self
			.text
			.char_indices()
			.nth(char_count)
			.map_or(self.text.len(), |(idx, _)| idx);
		let rest = self.text.split_off(byte_idx);
		let prefix = Insertion {
			text: std::mem::replace(&mut self.text, rest),
			char_len: char_count,
		};
		self.char_len -= char_count;
		prefix
	}
}

impl From<String> for Insertion {
	fn from(text: String) -> Self {
		Self::new(text)
	}
}

impl From<&str> for Insertion {
	fn from(text: &str) -> Self {
		Self::new(text.to_string())
	}
}

/// One run in a change set. Lengths are in chars of the source document
/// (`Retain`, `Delete`) or of the inserted text (`Insert`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
	Retain(usize),
	Delete(usize),
	Insert(Insertion),
}
