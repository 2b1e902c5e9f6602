//! Physical-line lexer.
//!
//! Splits one physical line into code tokens with char offsets. Text inside
//! string literals and comments never produces identifier tokens, which is
//! what lets the rewrite engine target "the n-th code occurrence of a name on
//! a line" without ever touching strings or comments.
//!
//! ## Identifier rules
//!
//! - An identifier starts with a letter and continues with letters, digits
//!   and underscores.
//! - A trailing type-suffix character (`$ % & ! # @`) is not part of the name.
//! - `[Bracketed]` names are identifiers; the token covers the inner text.
//! - A lone `_` is the continuation marker, not an identifier.

use std::collections::HashSet;
use std::sync::LazyLock;

use tugbasic_core::text::caseless_eq;

/// Type-suffix characters that may trail an identifier.
pub const TYPE_SUFFIXES: &[char] = &['$', '%', '&', '!', '#', '@'];

/// Kind of a code token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident,
    /// Numeric literal (including `&H` / `&O` literals).
    Number,
    /// String literal, quotes included.
    Str,
    /// Named-argument operator `:=`.
    ColonEq,
    /// Any other single character.
    Punct(char),
}

/// A code token on one physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text (for identifiers: the bare name).
    pub text: String,
    /// Start char offset.
    pub start: usize,
    /// End char offset (exclusive).
    pub end: usize,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    /// Identifier whose text equals `word`, ignoring case.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && caseless_eq(&self.text, word)
    }
}

// ============================================================================
// Comments and strings
// ============================================================================

/// Char offset where the comment on this line starts, or the line length.
///
/// A comment starts at a `'` outside a string literal, or at a `Rem` word in
/// statement position (line start or after `:`).
pub fn code_end(line: &str) -> usize {
    let chars: Vec<char> = line.chars().collect();
    let mut in_string = false;
    let mut statement_start = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                statement_start = false;
            }
            '\'' => return i,
            ':' => statement_start = true,
            c if c.is_whitespace() => {}
            'R' | 'r' if statement_start && is_rem_at(&chars, i) => return i,
            _ => statement_start = false,
        }
        i += 1;
    }
    chars.len()
}

fn is_rem_at(chars: &[char], i: usize) -> bool {
    let word: String = chars.iter().skip(i).take(3).collect();
    if !word.eq_ignore_ascii_case("rem") {
        return false;
    }
    match chars.get(i + 3) {
        None => true,
        Some(c) => c.is_whitespace(),
    }
}

/// Char ranges `[start, end)` of string literals in the code portion, quotes
/// included.
pub fn string_ranges(line: &str) -> Vec<(usize, usize)> {
    tokenize(line)
        .into_iter()
        .filter(|t| t.kind == TokenKind::Str)
        .map(|t| (t.start, t.end))
        .collect()
}

// ============================================================================
// Tokenizer
// ============================================================================

/// Tokenize the code portion of one physical line.
pub fn tokenize(line: &str) -> Vec<Token> {
    let chars: Vec<char> = line.chars().collect();
    let end = code_end(line);
    let mut tokens = Vec::new();
    let mut i = 0;

    let slice = |from: usize, to: usize| -> String { chars[from..to].iter().collect() };

    while i < end {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '"' {
            let mut j = i + 1;
            while j < end {
                if chars[j] == '"' {
                    if j + 1 < end && chars[j + 1] == '"' {
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                j += 1;
            }
            let j = j.min(end);
            tokens.push(Token {
                kind: TokenKind::Str,
                text: slice(i, j),
                start: i,
                end: j,
            });
            i = j;
            continue;
        }

        if c == '[' {
            if let Some(close) = (i + 1..end).find(|&k| chars[k] == ']') {
                if close > i + 1 {
                    tokens.push(Token {
                        kind: TokenKind::Ident,
                        text: slice(i + 1, close),
                        start: i + 1,
                        end: close,
                    });
                    i = close + 1;
                    continue;
                }
            }
        }

        if c.is_alphabetic() {
            let mut j = i;
            while j < end && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: slice(i, j),
                start: i,
                end: j,
            });
            if j < end && TYPE_SUFFIXES.contains(&chars[j]) {
                let glued = chars
                    .get(j + 1)
                    .is_some_and(|n| n.is_alphanumeric() || *n == '_');
                if !glued {
                    j += 1;
                }
            }
            i = j;
            continue;
        }

        if c.is_ascii_digit() || (c == '&' && is_radix_literal(&chars, i, end)) {
            let mut j = i + 1;
            if c == '&' {
                j += 1;
            }
            while j < end && (chars[j].is_alphanumeric() || chars[j] == '.') {
                j += 1;
            }
            if j < end && TYPE_SUFFIXES.contains(&chars[j]) {
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: slice(i, j),
                start: i,
                end: j,
            });
            i = j;
            continue;
        }

        if c == ':' && i + 1 < end && chars[i + 1] == '=' {
            tokens.push(Token {
                kind: TokenKind::ColonEq,
                text: ":=".to_string(),
                start: i,
                end: i + 2,
            });
            i += 2;
            continue;
        }

        tokens.push(Token {
            kind: TokenKind::Punct(c),
            text: c.to_string(),
            start: i,
            end: i + 1,
        });
        i += 1;
    }

    tokens
}

fn is_radix_literal(chars: &[char], i: usize, end: usize) -> bool {
    i + 2 < end
        && matches!(chars.get(i + 1), Some('H' | 'h' | 'O' | 'o'))
        && chars.get(i + 2).is_some_and(|c| c.is_ascii_hexdigit())
}

// ============================================================================
// Occurrence helpers
// ============================================================================

/// Occurrence index of the identifier at `idx`: how many earlier identifier
/// tokens on the same line share its spelling (case-insensitive).
pub fn occurrence_index(tokens: &[Token], idx: usize) -> usize {
    let Some(target) = tokens.get(idx) else {
        return 0;
    };
    tokens[..idx]
        .iter()
        .filter(|t| t.is_ident() && caseless_eq(&t.text, &target.text))
        .count()
}

/// Every identifier token spelled `name`, paired with its occurrence index.
pub fn ident_occurrences<'a>(tokens: &'a [Token], name: &str) -> Vec<(usize, &'a Token)> {
    tokens
        .iter()
        .filter(|t| t.is_ident() && caseless_eq(&t.text, name))
        .enumerate()
        .collect()
}

/// Index (into `tokens`) of the identifier starting at char `column`.
pub fn token_at(tokens: &[Token], column: usize) -> Option<usize> {
    tokens
        .iter()
        .position(|t| t.is_ident() && t.start == column)
}

// ============================================================================
// Keywords
// ============================================================================

static KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "addressof", "alias", "and", "as", "attribute", "boolean", "byref", "byte", "byval",
        "call", "case", "const", "currency", "date", "declare", "dim", "do", "double", "each",
        "else", "elseif", "empty", "end", "enum", "eqv", "erase", "error", "event", "exit",
        "false", "for", "friend", "function", "global", "gosub", "goto", "if", "imp",
        "implements", "in", "integer", "is", "let", "lib", "like", "long", "loop", "lset",
        "me", "mod", "new", "next", "not", "nothing", "null", "object", "on", "option",
        "optional", "or", "paramarray", "preserve", "private", "property", "public",
        "raiseevent", "redim", "rem", "resume", "return", "rset", "select", "set", "single",
        "static", "step", "stop", "string", "sub", "then", "to", "true", "type", "typeof",
        "until", "variant", "wend", "while", "with", "withevents", "xor",
    ]
    .into_iter()
    .collect()
});

/// Whether a word is a reserved language keyword.
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word.to_ascii_lowercase().as_str())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(line: &str) -> Vec<String> {
        tokenize(line)
            .into_iter()
            .filter(|t| t.is_ident())
            .map(|t| t.text)
            .collect()
    }

    mod comment_tests {
        use super::*;

        #[test]
        fn apostrophe_outside_string() {
            assert_eq!(code_end("x = 1 ' note"), 6);
            assert_eq!(code_end("s = \"it's\" ' c"), 11);
            assert_eq!(code_end("no comment"), 10);
        }

        #[test]
        fn rem_only_in_statement_position() {
            assert_eq!(code_end("Rem whole line"), 0);
            assert_eq!(code_end("x = 1: Rem tail"), 7);
            assert_eq!(code_end("Remark = 1"), 10);
            assert_eq!(code_end("x = Rem"), 7);
        }
    }

    mod token_tests {
        use super::*;

        #[test]
        fn strings_and_comments_hide_identifiers() {
            assert_eq!(
                idents("MsgBox \"Foo bar\" & foo ' foo again"),
                vec!["MsgBox", "foo"]
            );
        }

        #[test]
        fn doubled_quotes_stay_in_string() {
            let toks = tokenize("s = \"a \"\"b\"\" c\" & d");
            assert_eq!(toks[2].kind, TokenKind::Str);
            assert_eq!(toks[2].text, "\"a \"\"b\"\" c\"");
            assert_eq!(idents("s = \"a \"\"b\"\" c\" & d"), vec!["s", "d"]);
        }

        #[test]
        fn type_suffix_is_not_part_of_name() {
            let toks = tokenize("n& = Left$(s$, 2)");
            assert_eq!(toks[0].text, "n");
            assert_eq!(toks[0].end, 1);
            assert_eq!(idents("n& = Left$(s$, 2)"), vec!["n", "Left", "s"]);
        }

        #[test]
        fn bang_access_is_not_a_suffix() {
            assert_eq!(idents("x = rs!Total"), vec!["x", "rs", "Total"]);
        }

        #[test]
        fn bracketed_names() {
            let toks = tokenize("[Select] = 1");
            assert_eq!(toks[0].text, "Select");
            assert_eq!((toks[0].start, toks[0].end), (1, 7));
        }

        #[test]
        fn named_argument_operator() {
            let toks = tokenize("Foo a:=1, b:=2");
            assert_eq!(toks[2].kind, TokenKind::ColonEq);
            assert!(toks.iter().all(|t| !t.is_punct(':')));
        }

        #[test]
        fn hex_literals_are_numbers() {
            let toks = tokenize("x = &HFF + &O17");
            assert_eq!(toks[2].kind, TokenKind::Number);
            assert_eq!(toks[2].text, "&HFF");
            assert_eq!(toks[4].kind, TokenKind::Number);
        }

        #[test]
        fn continuation_marker_is_punct() {
            let toks = tokenize("Call Foo(a, _");
            assert!(toks.last().unwrap().is_punct('_'));
        }

        #[test]
        fn offsets_are_chars() {
            let toks = tokenize("caf\u{e9} = b");
            assert_eq!(toks[0].text, "caf\u{e9}");
            assert_eq!(toks[2].start, 7);
        }
    }

    mod occurrence_tests {
        use super::*;

        #[test]
        fn counts_same_spelling_case_insensitively() {
            let toks = tokenize("Sub F(a As Foo, b As FOO)");
            let foo_positions: Vec<usize> = toks
                .iter()
                .enumerate()
                .filter(|(_, t)| t.is_word("foo"))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(occurrence_index(&toks, foo_positions[0]), 0);
            assert_eq!(occurrence_index(&toks, foo_positions[1]), 1);

            let occ = ident_occurrences(&toks, "Foo");
            assert_eq!(occ.len(), 2);
            assert_eq!(occ[1].0, 1);
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(is_keyword("End"));
        assert!(is_keyword("WITHEVENTS"));
        assert!(!is_keyword("Text"));
        assert!(!is_keyword("DoThing"));
    }
}
