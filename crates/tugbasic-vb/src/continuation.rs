//! Line continuation normalizer.
//!
//! Joins physical lines ending in the ` _` continuation marker into logical
//! lines. Each logical line keeps a segment table so any column of the joined
//! text can be mapped back to the physical line and column it came from.
//!
//! Logical lines are only used to discover declarations. Edits are always
//! addressed against physical lines.

use crate::lexer::code_end;

/// One physical piece of a logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// 1-indexed physical line.
    pub physical_line: u32,
    /// Char offset in the logical text where this piece starts.
    pub logical_start: usize,
    /// Char offset in the physical line that corresponds to `logical_start`.
    pub physical_start: usize,
}

/// A statement joined across continuation markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Joined text.
    pub text: String,
    /// Physical pieces, in order. Never empty.
    pub segments: Vec<Segment>,
}

impl LogicalLine {
    /// First physical line.
    pub fn start_line(&self) -> u32 {
        self.segments.first().map(|s| s.physical_line).unwrap_or(0)
    }

    /// Last physical line.
    pub fn end_line(&self) -> u32 {
        self.segments.last().map(|s| s.physical_line).unwrap_or(0)
    }

    /// Map a char column of the logical text to `(physical line, column)`.
    pub fn physical_at(&self, column: usize) -> (u32, usize) {
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|s| s.logical_start <= column)
            .or_else(|| self.segments.first());
        match segment {
            Some(s) => (
                s.physical_line,
                s.physical_start + column.saturating_sub(s.logical_start),
            ),
            None => (0, column),
        }
    }
}

/// Whether a physical line ends in the continuation marker.
///
/// The marker is an underscore preceded by whitespace (or alone on the line),
/// in the code portion of the line.
pub fn is_continued(line: &str) -> bool {
    let code: String = line.chars().take(code_end(line)).collect();
    let trimmed = code.trim_end();
    match trimmed.strip_suffix('_') {
        Some(head) => head.is_empty() || head.ends_with(char::is_whitespace),
        None => false,
    }
}

/// Join physical lines into logical lines.
pub fn normalize_lines(lines: &[String]) -> Vec<LogicalLine> {
    let mut result = Vec::new();
    let mut current: Option<LogicalLine> = None;

    for (idx, raw) in lines.iter().enumerate() {
        let physical_line = idx as u32 + 1;
        let continued = is_continued(raw);

        match current.as_mut() {
            None => {
                current = Some(LogicalLine {
                    text: raw.clone(),
                    segments: vec![Segment {
                        physical_line,
                        logical_start: 0,
                        physical_start: 0,
                    }],
                });
            }
            Some(logical) => {
                let trimmed = raw.trim_start();
                let skipped = raw.chars().count() - trimmed.chars().count();
                logical.text.push(' ');
                let logical_start = logical.text.chars().count();
                logical.segments.push(Segment {
                    physical_line,
                    logical_start,
                    physical_start: skipped,
                });
                logical.text.push_str(trimmed);
            }
        }

        if continued {
            if let Some(logical) = current.as_mut() {
                strip_marker(&mut logical.text);
            }
        } else if let Some(done) = current.take() {
            result.push(done);
        }
    }

    if let Some(done) = current.take() {
        result.push(done);
    }
    result
}

/// Remove the trailing marker and the whitespace before it.
fn strip_marker(text: &mut String) {
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    if text.ends_with('_') {
        text.pop();
    }
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn marker_detection() {
        assert!(is_continued("Public Function Foo( _"));
        assert!(is_continued("  _"));
        assert!(!is_continued("x = my_"));
        assert!(!is_continued("' comment _"));
        assert!(!is_continued("s = \"a _\""));
    }

    #[test]
    fn joins_with_single_space() {
        let src = lines("Public Function Foo( _\n      ByVal a As Long, _\n   b As String) As Long\nEnd Function");
        let logical = normalize_lines(&src);
        assert_eq!(logical.len(), 2);
        assert_eq!(
            logical[0].text,
            "Public Function Foo( ByVal a As Long, b As String) As Long"
        );
        assert_eq!(logical[0].start_line(), 1);
        assert_eq!(logical[0].end_line(), 3);
        assert_eq!(logical[1].start_line(), 4);
    }

    #[test]
    fn maps_columns_back_to_physical_lines() {
        let src = lines("Dim a _\n    As Long, b");
        let logical = normalize_lines(&src);
        assert_eq!(logical[0].text, "Dim a As Long, b");
        // "a" at col 4 is on line 1
        assert_eq!(logical[0].physical_at(4), (1, 4));
        // "As" at col 6 is at col 4 of line 2
        assert_eq!(logical[0].physical_at(6), (2, 4));
        // "b" at col 15 is at col 13 of line 2
        assert_eq!(logical[0].physical_at(15), (2, 13));
    }

    #[test]
    fn trailing_continuation_at_eof_is_kept() {
        let src = lines("x = 1 _");
        let logical = normalize_lines(&src);
        assert_eq!(logical.len(), 1);
        assert_eq!(logical[0].text, "x = 1");
    }
}
