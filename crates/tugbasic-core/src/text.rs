//! Text utilities: legacy code page decoding, line-ending preserving line
//! splitting, and char-offset helpers.
//!
//! ## Coordinate Conventions
//!
//! - Line numbers are **1-indexed** (matching editor conventions and the
//!   physical line numbers recorded in the symbol model)
//! - Char offsets within a line are **0-indexed** and count Unicode scalar
//!   values, not bytes
//!
//! ## Legacy Code Page
//!
//! Source files are stored in an 8-bit code page. Every byte is decoded to the
//! char with the same scalar value (ISO-8859-1 mapping), so decoding and
//! re-encoding an untouched file reproduces it byte for byte, and one char
//! always corresponds to one byte on disk.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Legacy Code Page
// ============================================================================

/// Decode raw file bytes from the legacy 8-bit code page.
pub fn decode_legacy(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode text back into the legacy 8-bit code page.
///
/// Chars outside the 8-bit range cannot be represented and are written as `?`.
pub fn encode_legacy(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

// ============================================================================
// Case-insensitive identifiers
// ============================================================================

/// Lookup key for a case-insensitive identifier.
pub fn caseless_key(name: &str) -> String {
    name.to_lowercase()
}

/// Compare two identifiers ignoring case.
pub fn caseless_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

// ============================================================================
// Line Endings
// ============================================================================

/// Terminator that followed a physical line in the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    /// `\r\n`
    CrLf,
    /// `\n`
    Lf,
    /// `\r`
    Cr,
    /// Last line without a terminator.
    None,
}

impl LineEnding {
    /// The literal terminator text.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::None => "",
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEnding::CrLf => "crlf",
            LineEnding::Lf => "lf",
            LineEnding::Cr => "cr",
            LineEnding::None => "none",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Source Text
// ============================================================================

/// A file split into physical lines, remembering each line's terminator so the
/// file can be reassembled exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    lines: Vec<String>,
    endings: Vec<LineEnding>,
}

impl SourceText {
    /// Split text into physical lines, recording every terminator.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                        endings.push(LineEnding::CrLf);
                    } else {
                        endings.push(LineEnding::Cr);
                    }
                    lines.push(std::mem::take(&mut current));
                }
                '\n' => {
                    endings.push(LineEnding::Lf);
                    lines.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }

        if !current.is_empty() {
            lines.push(current);
            endings.push(LineEnding::None);
        }

        SourceText { lines, endings }
    }

    /// Decode raw bytes in the legacy code page and split them into lines.
    pub fn from_legacy_bytes(bytes: &[u8]) -> Self {
        SourceText::parse(&decode_legacy(bytes))
    }

    /// Number of physical lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// All physical lines, without terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Get a physical line by 1-indexed line number.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        self.lines.get(idx).map(String::as_str)
    }

    /// Replace the content of a physical line (terminator is kept).
    ///
    /// Returns `false` if the line does not exist.
    pub fn set_line(&mut self, line: u32, content: String) -> bool {
        match (line as usize)
            .checked_sub(1)
            .and_then(|idx| self.lines.get_mut(idx))
        {
            Some(slot) => {
                *slot = content;
                true
            }
            None => false,
        }
    }

    /// The dominant line ending (the first one seen), `Lf` for empty files.
    pub fn dominant_ending(&self) -> LineEnding {
        self.endings
            .iter()
            .copied()
            .find(|e| *e != LineEnding::None)
            .unwrap_or(LineEnding::Lf)
    }

    /// Reassemble the text with the original terminators.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (line, ending) in self.lines.iter().zip(&self.endings) {
            out.push_str(line);
            out.push_str(ending.as_str());
        }
        out
    }

    /// Reassemble and encode in the legacy code page.
    pub fn to_legacy_bytes(&self) -> Vec<u8> {
        encode_legacy(&self.render())
    }
}

// ============================================================================
// Char-offset helpers
// ============================================================================

/// Number of chars in a line.
pub fn char_len(line: &str) -> usize {
    line.chars().count()
}

/// Convert a char offset into a byte offset, clamping to the end of the line.
pub fn char_to_byte(line: &str, char_idx: usize) -> usize {
    line.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(line.len())
}

/// Slice a line by char offsets `[start, end)`.
///
/// Returns `None` if the range is inverted or extends past the end of the line.
pub fn char_slice(line: &str, start: usize, end: usize) -> Option<&str> {
    if start > end || end > char_len(line) {
        return None;
    }
    let b_start = char_to_byte(line, start);
    let b_end = char_to_byte(line, end);
    line.get(b_start..b_end)
}

/// Replace chars `[start, end)` of a line with new text.
///
/// Returns `None` if the range is not valid for this line.
pub fn replace_chars(line: &str, start: usize, end: usize, new_text: &str) -> Option<String> {
    if start > end || end > char_len(line) {
        return None;
    }
    let b_start = char_to_byte(line, start);
    let b_end = char_to_byte(line, end);
    let mut out = String::with_capacity(line.len() + new_text.len());
    out.push_str(&line[..b_start]);
    out.push_str(new_text);
    out.push_str(&line[b_end..]);
    Some(out)
}

// ============================================================================
// Tests
// ============================================================================
