//! Protocol position conversion against a document snapshot.
//!
//! Conversions are always performed against the synced snapshot the server
//! saw; remapping into the live buffer is the change set's job.

use lsp_types::{Position, Range};
use ropey::{Rope, RopeSlice};

/// How the server counts the `character` field of a position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OffsetEncoding {
	/// UTF-8 byte offsets.
	Utf8,
	/// UTF-16 code unit offsets. The protocol default.
	#[default]
	Utf16,
	/// Unicode scalar value offsets.
	Utf32,
}

impl OffsetEncoding {
	/// Parses the `positionEncoding` negotiated in server capabilities.
	pub fn from_lsp(encoding: &str) -> Option<Self> {
		match encoding {
			"utf-8" => Some(Self::Utf8),
			"utf-16" => Some(Self::Utf16),
			"utf-32" => Some(Self::Utf32),
			_ => None,
		}
	}
}

/// Chars on the line excluding its trailing line break.
fn line_content_len(line: &RopeSlice<'_>) -> usize {
	let mut len = line.len_chars();
	let mut chars = line.chars_at(len);
	while let Some(ch) = chars.prev() {
		if ch == '\n' || ch == '\r' {
			len -= 1;
		} else {
			break;
		}
	}
	len
}

/// Converts a protocol position to a char offset in `text`.
///
/// Columns past the end of the line clamp to the line-content end; a line
/// past the end of the document yields `None`.
pub fn lsp_position_to_char(text: &Rope, pos: Position, encoding: OffsetEncoding) -> Option<usize> {
	let line_idx = pos.line as usize;
	if line_idx >= text.len_lines() {
		return None;
	}
	let line_start = text.line_to_char(line_idx);
	let line = text.line(line_idx);
	let content_len = line_content_len(&line);
	let target = pos.character as usize;

	let col = match encoding {
		OffsetEncoding::Utf32 => target.min(content_len),
		OffsetEncoding::Utf8 => count_units(&line, content_len, target, |ch| ch.len_utf8()),
		OffsetEncoding::Utf16 => count_units(&line, content_len, target, |ch| ch.len_utf16()),
	};
	Some(line_start + col)
}

/// Walks the line until `target` units are consumed, returning the char
/// column reached. A target past the content clamps to the content end.
fn count_units(
	line: &RopeSlice<'_>,
	content_len: usize,
	target: usize,
	unit_len: impl Fn(char) -> usize,
) -> usize {
	let mut units = 0;
	let mut col = 0;
	for ch in line.chars().take(content_len) {
		if units >= target {
			break;
		}
		units += unit_len(ch);
		col += 1;
	}
	col
}

/// Converts a char offset in `text` to a protocol position.
///
/// Offsets past the end of the document yield `None`.
pub fn char_to_lsp_position(text: &Rope, char_idx: usize, encoding: OffsetEncoding) -> Option<Position> {
	if char_idx > text.len_chars() {
		return None;
	}
	let line_idx = text.char_to_line(char_idx);
	let line_start = text.line_to_char(line_idx);
	let prefix = text.slice(line_start..char_idx);

	let character = match encoding {
		OffsetEncoding::Utf32 => prefix.len_chars(),
		OffsetEncoding::Utf8 => prefix.chars().map(|ch| ch.len_utf8()).sum(),
		OffsetEncoding::Utf16 => prefix.chars().map(|ch| ch.len_utf16()).sum(),
	};
	Some(Position {
		line: line_idx as u32,
		character: character as u32,
	})
}

/// Converts a protocol range to a `(from, to)` char range. `None` when
/// either endpoint is out of bounds or the range is inverted.
pub fn lsp_range_to_char_range(text: &Rope, range: Range, encoding: OffsetEncoding) -> Option<(usize, usize)> {
	let from = lsp_position_to_char(text, range.start, encoding)?;
	let to = lsp_position_to_char(text, range.end, encoding)?;
	(from <= to).then_some((from, to))
}

/// Converts a `(from, to)` char range to a protocol range.
pub fn char_range_to_lsp_range(text: &Rope, from: usize, to: usize, encoding: OffsetEncoding) -> Option<Range> {
	let start = char_to_lsp_position(text, from, encoding)?;
	let end = char_to_lsp_position(text, to, encoding)?;
	Some(Range { start, end })
}
