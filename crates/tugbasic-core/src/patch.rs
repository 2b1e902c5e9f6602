//! Patch IR: line-addressed edits and per-file patches.
//!
//! This module implements the edit infrastructure for tugbasic:
//! - [`Edit`]: one atomic replace at `(line, [start, end))` with the text it
//!   expects to find there
//! - [`FilePatch`]: every edit for one file, normalized into the apply order
//! - Conflict detection (duplicate and overlapping spans)
//! - Validated apply: each edit re-checks the live text before mutating
//!
//! # Ordering Contract
//!
//! A normalized patch is sorted descending by `(line, start)`. Applying edits
//! bottom-to-top and right-to-left means no edit ever shifts the char offsets
//! of an edit that is still pending.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text::{caseless_eq, char_slice, replace_chars, SourceText};

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Core Types
// ============================================================================

/// Char offsets into one physical line.
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start char offset (inclusive).
    pub start: usize,
    /// End char offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// Length of the span in chars.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Why an edit exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditCategory {
    /// The symbol's own declaration.
    Declaration,
    /// A use of the symbol elsewhere.
    Reference,
    /// A bare use rewritten to a qualified `Owner.Name` form.
    Qualification,
    /// A source-level attribute or name directive echoing the symbol name.
    Directive,
    /// A UI-control block-opening line.
    Control,
    /// A project manifest entry.
    Manifest,
}

impl fmt::Display for EditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditCategory::Declaration => "declaration",
            EditCategory::Reference => "reference",
            EditCategory::Qualification => "qualification",
            EditCategory::Directive => "directive",
            EditCategory::Control => "control",
            EditCategory::Manifest => "manifest",
        };
        write!(f, "{}", name)
    }
}

/// A single atomic text replacement on one physical line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// 1-indexed physical line.
    pub line: u32,
    /// Char span within the line.
    pub span: Span,
    /// Text expected at `span` (compared case-insensitively at apply time).
    pub old_text: String,
    /// Replacement text.
    pub new_text: String,
    /// Why the edit exists.
    pub category: EditCategory,
    /// Label of the symbol this edit renames (for audit output).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub symbol: String,
}

impl Edit {
    /// Create a replace edit.
    pub fn replace(
        line: u32,
        span: Span,
        old_text: impl Into<String>,
        new_text: impl Into<String>,
        category: EditCategory,
    ) -> Self {
        Edit {
            line,
            span,
            old_text: old_text.into(),
            new_text: new_text.into(),
            category,
            symbol: String::new(),
        }
    }

    /// Attach a symbol label.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Sort key for the apply order: later lines first, then later columns.
    fn apply_order_key(&self) -> (std::cmp::Reverse<u32>, std::cmp::Reverse<usize>) {
        (
            std::cmp::Reverse(self.line),
            std::cmp::Reverse(self.span.start),
        )
    }
}

// ============================================================================
// Conflicts
// ============================================================================

/// A problem that prevented one edit from being planned or applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// Two edits target overlapping spans of the same line.
    OverlappingSpans { line: u32, kept: Span, dropped: Span },
    /// The live text at the span no longer matches the expected text.
    StaleText {
        line: u32,
        span: Span,
        expected: String,
        actual: String,
    },
    /// The line does not exist in the live file.
    LineOutOfRange { line: u32, line_count: usize },
    /// The span extends past the end of the live line.
    SpanOutOfBounds { line: u32, span: Span, line_len: usize },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::OverlappingSpans {
                line,
                kept,
                dropped,
            } => write!(
                f,
                "line {}: edit at {} overlaps edit at {}, dropped",
                line, dropped, kept
            ),
            Conflict::StaleText {
                line,
                span,
                expected,
                actual,
            } => write!(
                f,
                "line {}: expected '{}' at {}, found '{}'",
                line, expected, span, actual
            ),
            Conflict::LineOutOfRange { line, line_count } => {
                write!(f, "line {} is past end of file ({} lines)", line, line_count)
            }
            Conflict::SpanOutOfBounds {
                line,
                span,
                line_len,
            } => write!(
                f,
                "line {}: span {} is past end of line ({} chars)",
                line, span, line_len
            ),
        }
    }
}

// ============================================================================
// FilePatch
// ============================================================================

/// Every edit for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    /// Project-relative path of the file (for display).
    pub file: String,
    /// Edits, in apply order once [`FilePatch::normalize`] has run.
    pub edits: Vec<Edit>,
}

/// Result of applying a patch to live text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Number of edits that were applied.
    pub applied: usize,
    /// Edits that were skipped, with the reason.
    pub skipped: Vec<(Edit, Conflict)>,
}

impl FilePatch {
    /// Create an empty patch for a file.
    pub fn new(file: impl Into<String>) -> Self {
        FilePatch {
            file: file.into(),
            edits: Vec::new(),
        }
    }

    /// Add an edit.
    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    /// Check if this patch contains any edits.
    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Sort edits descending by `(line, start)`.
    ///
    /// The sort is stable, so edits with identical keys keep insertion order.
    pub fn sort_edits(&mut self) {
        self.edits.sort_by_key(Edit::apply_order_key);
    }

    /// Sort, drop exact duplicates, and drop edits overlapping an earlier-kept
    /// edit on the same line.
    ///
    /// Returns the overlaps that were dropped. When two edits cover the same
    /// span with the same replacement, the second is a silent duplicate.
    pub fn normalize(&mut self) -> Vec<Conflict> {
        self.sort_edits();

        let mut conflicts = Vec::new();
        let mut kept: Vec<Edit> = Vec::with_capacity(self.edits.len());

        for edit in self.edits.drain(..) {
            let clash = kept
                .iter()
                .rev()
                .take_while(|k| k.line == edit.line)
                .find(|k| k.span.overlaps(&edit.span) || k.span == edit.span);

            match clash {
                Some(k) if k.span == edit.span && k.new_text == edit.new_text => {}
                Some(k) => conflicts.push(Conflict::OverlappingSpans {
                    line: edit.line,
                    kept: k.span,
                    dropped: edit.span,
                }),
                None => kept.push(edit),
            }
        }

        self.edits = kept;
        conflicts
    }

    /// Group edits by line, preserving apply order within each line.
    pub fn edits_by_line(&self) -> BTreeMap<u32, Vec<&Edit>> {
        let mut grouped: BTreeMap<u32, Vec<&Edit>> = BTreeMap::new();
        for edit in &self.edits {
            grouped.entry(edit.line).or_default().push(edit);
        }
        for edits in grouped.values_mut() {
            edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        }
        grouped
    }

    /// Apply the edits to live text.
    ///
    /// Lines are processed bottom-to-top and edits within a line
    /// right-to-left. Every edit re-verifies that the live text at its span
    /// still equals the expected old text (case-insensitive); a mismatch skips
    /// that single edit and the rest still apply.
    pub fn apply_to(&self, source: &mut SourceText) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let line_count = source.line_count();

        for (line_no, edits) in self.edits_by_line().into_iter().rev() {
            let Some(original) = source.line(line_no) else {
                for edit in edits {
                    outcome.skipped.push((
                        edit.clone(),
                        Conflict::LineOutOfRange {
                            line: line_no,
                            line_count,
                        },
                    ));
                }
                continue;
            };

            let mut current = original.to_string();
            for edit in edits {
                match check_edit(&current, edit) {
                    Ok(()) => {
                        if let Some(next) = replace_chars(
                            &current,
                            edit.span.start,
                            edit.span.end,
                            &edit.new_text,
                        ) {
                            current = next;
                            outcome.applied += 1;
                        }
                    }
                    Err(conflict) => outcome.skipped.push((edit.clone(), conflict)),
                }
            }
            source.set_line(line_no, current);
        }

        outcome
    }
}

/// Verify that `edit` still matches the live line.
fn check_edit(line: &str, edit: &Edit) -> Result<(), Conflict> {
    let line_len = line.chars().count();
    let Some(actual) = char_slice(line, edit.span.start, edit.span.end) else {
        return Err(Conflict::SpanOutOfBounds {
            line: edit.line,
            span: edit.span,
            line_len,
        });
    };
    if caseless_eq(actual, &edit.old_text) {
        Ok(())
    } else {
        Err(Conflict::StaleText {
            line: edit.line,
            span: edit.span,
            expected: edit.old_text.clone(),
            actual: actual.to_string(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(line: u32, start: usize, end: usize, old: &str, new: &str) -> Edit {
        Edit::replace(line, Span::new(start, end), old, new, EditCategory::Reference)
    }

    mod span_tests {
        use super::*;

        #[test]
        fn span_overlap_detection() {
            let a = Span::new(10, 20);
            assert!(a.overlaps(&Span::new(15, 25)));
            assert!(!a.overlaps(&Span::new(20, 30)));
            assert!(a.overlaps(&Span::new(5, 15)));
            assert_eq!(a.len(), 10);
        }

        #[test]
        #[should_panic(expected = "must be <= end")]
        fn inverted_span_panics() {
            let _ = Span::new(5, 4);
        }
    }

    mod normalize_tests {
        use super::*;

        #[test]
        fn sorts_descending_by_line_then_start() {
            let mut patch = FilePatch::new("a.bas");
            patch.push(edit(1, 0, 1, "a", "b"));
            patch.push(edit(3, 2, 3, "a", "b"));
            patch.push(edit(3, 8, 9, "a", "b"));
            patch.push(edit(2, 4, 5, "a", "b"));
            patch.normalize();

            let keys: Vec<(u32, usize)> =
                patch.edits.iter().map(|e| (e.line, e.span.start)).collect();
            assert_eq!(keys, vec![(3, 8), (3, 2), (2, 4), (1, 0)]);
        }

        #[test]
        fn exact_duplicates_collapse_silently() {
            let mut patch = FilePatch::new("a.bas");
            patch.push(edit(1, 4, 7, "foo", "Foo"));
            patch.push(edit(1, 4, 7, "foo", "Foo"));
            let conflicts = patch.normalize();
            assert!(conflicts.is_empty());
            assert_eq!(patch.edits.len(), 1);
        }

        #[test]
        fn overlapping_edit_is_dropped_and_reported() {
            let mut patch = FilePatch::new("a.bas");
            patch.push(edit(1, 4, 7, "foo", "Foo"));
            patch.push(edit(1, 4, 7, "foo", "Bar.Foo"));
            let conflicts = patch.normalize();
            assert_eq!(conflicts.len(), 1);
            assert_eq!(patch.edits.len(), 1);
            assert_eq!(patch.edits[0].new_text, "Foo");
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn applies_right_to_left_within_line() {
            let mut source = SourceText::parse("x = a_b + a_b\r\n");
            let mut patch = FilePatch::new("m.bas");
            patch.push(edit(1, 4, 7, "a_b", "longerName"));
            patch.push(edit(1, 10, 13, "a_b", "longerName"));
            patch.normalize();

            let outcome = patch.apply_to(&mut source);
            assert_eq!(outcome.applied, 2);
            assert!(outcome.skipped.is_empty());
            assert_eq!(source.render(), "x = longerName + longerName\r\n");
        }

        #[test]
        fn stale_edit_is_skipped_others_apply() {
            let mut source = SourceText::parse("Dim foo\nDim bar\n");
            let mut patch = FilePatch::new("m.bas");
            patch.push(edit(1, 4, 7, "foo", "Foo"));
            patch.push(edit(2, 4, 7, "baz", "Baz"));
            patch.normalize();

            let outcome = patch.apply_to(&mut source);
            assert_eq!(outcome.applied, 1);
            assert_eq!(outcome.skipped.len(), 1);
            assert!(matches!(
                outcome.skipped[0].1,
                Conflict::StaleText { line: 2, .. }
            ));
            assert_eq!(source.render(), "Dim Foo\nDim bar\n");
        }

        #[test]
        fn expected_text_is_case_insensitive() {
            let mut source = SourceText::parse("Call DOTHING\n");
            let mut patch = FilePatch::new("m.bas");
            patch.push(edit(1, 5, 12, "DoThing", "DoThing"));
            let outcome = patch.apply_to(&mut source);
            assert_eq!(outcome.applied, 1);
            assert_eq!(source.render(), "Call DoThing\n");
        }

        #[test]
        fn line_out_of_range_is_reported() {
            let mut source = SourceText::parse("a\n");
            let mut patch = FilePatch::new("m.bas");
            patch.push(edit(5, 0, 1, "a", "b"));
            let outcome = patch.apply_to(&mut source);
            assert_eq!(outcome.applied, 0);
            assert!(matches!(
                outcome.skipped[0].1,
                Conflict::LineOutOfRange { line: 5, .. }
            ));
        }

        #[test]
        fn span_past_end_of_line_is_reported() {
            let mut source = SourceText::parse("ab\n");
            let mut patch = FilePatch::new("m.bas");
            patch.push(edit(1, 1, 9, "b", "c"));
            let outcome = patch.apply_to(&mut source);
            assert!(matches!(
                outcome.skipped[0].1,
                Conflict::SpanOutOfBounds { line: 1, .. }
            ));
        }

        /// Descending in-place application must equal splicing every edit
        /// against an untouched copy of the line.
        #[test]
        fn right_to_left_matches_independent_splices() {
            let line = "Set objFoo = New clsBar: objFoo.doThing objFoo.count_";
            let targets: Vec<(usize, usize, &str)> = vec![
                (4, 10, "objectFoo"),
                (17, 23, "ClsBar"),
                (25, 31, "objectFoo"),
                (32, 39, "DoThing"),
                (40, 46, "objectFoo"),
                (47, 53, "Count"),
            ];

            let mut source = SourceText::parse(line);
            let mut patch = FilePatch::new("m.bas");
            for (start, end, new) in &targets {
                let old = char_slice(line, *start, *end).unwrap();
                patch.push(edit(1, *start, *end, old, new));
            }
            patch.normalize();
            let outcome = patch.apply_to(&mut source);
            assert_eq!(outcome.applied, targets.len());

            // Independent splicing: walk the original left to right.
            let mut expected = String::new();
            let mut cursor = 0;
            for (start, end, new) in &targets {
                expected.push_str(char_slice(line, cursor, *start).unwrap());
                expected.push_str(new);
                cursor = *end;
            }
            expected.push_str(char_slice(line, cursor, line.chars().count()).unwrap());

            assert_eq!(source.line(1), Some(expected.as_str()));
        }
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        let hash = ContentHash::compute(b"hello");
        assert_eq!(hash.0.len(), 64);
        assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
