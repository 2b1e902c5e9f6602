//! Declaration recognizer.
//!
//! A fixed set of line shapes applied to logical lines (continuations already
//! joined), driven by a small state machine:
//! - inside a user-type block (`Type ... End Type`)
//! - inside an enumeration (`Enum ... End Enum`)
//! - inside a procedure body
//! - inside the form designer section (`Begin`/`End`, `BeginProperty`/`EndProperty`)
//!
//! Each line yields zero or one [`Declaration`]. Every name carries the char
//! column where it appears in the logical line so the parser can map it back
//! to a physical position.
//!
//! Procedure ends are recognized by the terminator of the open procedure's
//! own family: `End If` or `End With` never close a function, and an
//! `End Sub` inside a function is ignored.

use crate::lexer::{code_end, TYPE_SUFFIXES};
use crate::model::{Passing, ProcFamily, ProcedureKind, Visibility};

/// Regex patterns for line shapes (compiled once)
mod patterns {
    use std::sync::LazyLock;

    pub static NAME_DIRECTIVE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r#"(?i)^\s*Attribute\s+VB_Name\s*=\s*"([^"]*)""#).unwrap()
    });

    pub static MEMBER_ATTRIBUTE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*Attribute\s+(\p{L}[\p{L}\p{N}_]*)\.(VB_\w+)").unwrap()
    });

    pub static ATTRIBUTE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*Attribute\s").unwrap());

    pub static VERSION: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*VERSION\s").unwrap());

    pub static BEGIN_BLOCK: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r"(?i)^\s*Begin\s+(\p{L}[\p{L}\p{N}_]*(?:\.\p{L}[\p{L}\p{N}_]*)?)\s+(\p{L}[\p{L}\p{N}_]*)",
        )
        .unwrap()
    });

    pub static BARE_BEGIN: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*Begin\s*$").unwrap());

    pub static BARE_END: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*End\s*$").unwrap());

    pub static BEGIN_PROPERTY: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*BeginProperty\b").unwrap());

    pub static END_PROPERTY: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*EndProperty\b").unwrap());

    pub static CONTROL_INDEX: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*Index\s*=\s*(-?\d+)").unwrap());

    pub static PROC_HEADER: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r"(?i)^\s*(?:(Public|Private|Friend|Global)\s+)?(?:(Static)\s+)?(Sub|Function|Property\s+Get|Property\s+Let|Property\s+Set)\s+(\p{L}[\p{L}\p{N}_]*)",
        )
        .unwrap()
    });

    pub static DECLARE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r#"(?i)^\s*(?:(Public|Private)\s+)?Declare\s+(?:PtrSafe\s+)?(Sub|Function)\s+(\p{L}[\p{L}\p{N}_]*)[$%&!#@]?\s+Lib\s+"([^"]*)"(?:\s+Alias\s+"[^"]*")?"#,
        )
        .unwrap()
    });

    pub static PROC_END: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*End\s+(Sub|Function|Property)\b").unwrap());

    pub static TYPE_START: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(?:(Public|Private)\s+)?Type\s+(\p{L}[\p{L}\p{N}_]*)\s*$")
            .unwrap()
    });

    pub static TYPE_END: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*End\s+Type\b").unwrap());

    pub static ENUM_START: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(?:(Public|Private)\s+)?Enum\s+(\p{L}[\p{L}\p{N}_]*)\s*$")
            .unwrap()
    });

    pub static ENUM_END: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*End\s+Enum\b").unwrap());

    pub static ENUM_VALUE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(?:\[([^\]]+)\]|(\p{L}[\p{L}\p{N}_]*))\s*(?:=\s*(.*?))?\s*$")
            .unwrap()
    });

    pub static EVENT: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(?:(Public)\s+)?Event\s+(\p{L}[\p{L}\p{N}_]*)").unwrap()
    });

    pub static IMPLEMENTS: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r"(?i)^\s*Implements\s+(?:\p{L}[\p{L}\p{N}_]*\.)?(\p{L}[\p{L}\p{N}_]*)\s*$",
        )
        .unwrap()
    });

    pub static CONST: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(?:(Public|Private|Global)\s+)?Const\s+").unwrap()
    });

    pub static MODULE_VARS: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*(Public|Private|Global|Dim|Static)\s+").unwrap()
    });

    pub static LOCAL_VARS: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*(Dim|Static)\s+").unwrap());

    pub static LOCAL_CONST: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)^\s*Const\s+").unwrap());
}

// ============================================================================
// Declarations
// ============================================================================

/// A declared name and its char column in the logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub text: String,
    pub column: usize,
}

/// A type reference after `As` or `New`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Full text, possibly dotted (`ADODB.Recordset`).
    pub text: String,
    /// Column of the last segment.
    pub column: usize,
}

/// One variable or field in a declaration list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: Name,
    pub type_ref: Option<TypeRef>,
    pub is_array: bool,
    pub with_events: bool,
    pub as_new: bool,
}

/// One parameter in a parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: Name,
    pub type_ref: Option<TypeRef>,
    pub passing: Passing,
    pub optional: bool,
    pub param_array: bool,
    pub is_array: bool,
    pub default_value: Option<String>,
}

/// One constant in a `Const` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstDecl {
    pub name: Name,
    pub type_ref: Option<TypeRef>,
    pub value: String,
}

/// A procedure, property or `Declare` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcHeader {
    pub name: Name,
    pub kind: ProcedureKind,
    pub visibility: Visibility,
    pub is_static: bool,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeRef>,
    pub library: Option<String>,
}

/// What a logical line declares or which state it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// `Attribute VB_Name = "..."`; the column is that of the quoted text.
    ModuleName(Name),
    /// Top-level designer block of a form.
    FormBegin { type_name: String, name: Name },
    /// Nested designer block of a control.
    ControlBegin { type_name: String, name: Name },
    /// `Index = n` directly inside a control block.
    ControlIndex(i64),
    /// `End` closing a designer block.
    BlockEnd,
    ProcedureStart(ProcHeader),
    ProcedureEnd(ProcFamily),
    External(ProcHeader),
    TypeStart { name: Name, visibility: Visibility },
    TypeEnd,
    Field(VarDecl),
    EnumStart { name: Name, visibility: Visibility },
    EnumEnd,
    EnumValue { name: Name, value: Option<String> },
    Event { name: Name, visibility: Visibility, params: Vec<ParamDecl> },
    Implements(Name),
    Variables { visibility: Visibility, is_static: bool, vars: Vec<VarDecl> },
    Constants { visibility: Visibility, consts: Vec<ConstDecl> },
    /// `Attribute Name.VB_* = ...`.
    MemberAttribute { target: Name, attribute: String },
}

// ============================================================================
// Recognizer
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Block {
    #[default]
    None,
    Type,
    Enum,
}

/// Line-shape recognizer with block state.
#[derive(Debug, Default)]
pub struct Recognizer {
    block: Block,
    procedure: Option<ProcFamily>,
    designer_depth: usize,
    property_depth: usize,
    /// Set when the designer block just opened was a control.
    in_control: Vec<bool>,
}

impl Recognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Family of the open procedure, if any.
    pub fn open_procedure(&self) -> Option<ProcFamily> {
        self.procedure
    }

    /// Recognize one logical line.
    pub fn recognize(&mut self, line: &str) -> Option<Declaration> {
        let code_chars = code_end(line);
        let code: String = line.chars().take(code_chars).collect();
        let code = code.as_str();
        if code.trim().is_empty() {
            return None;
        }

        if self.designer_depth > 0 {
            return self.recognize_designer(code);
        }

        if patterns::VERSION.is_match(code) {
            return None;
        }
        if patterns::BARE_BEGIN.is_match(code) {
            self.designer_depth = 1;
            self.in_control.push(false);
            return None;
        }
        if let Some(caps) = patterns::BEGIN_BLOCK.captures(code) {
            self.designer_depth = 1;
            self.in_control.push(false);
            return Some(Declaration::FormBegin {
                type_name: caps[1].to_string(),
                name: capture_name(code, &caps, 2)?,
            });
        }

        if let Some(caps) = patterns::NAME_DIRECTIVE.captures(code) {
            return Some(Declaration::ModuleName(capture_name(code, &caps, 1)?));
        }
        if let Some(caps) = patterns::MEMBER_ATTRIBUTE.captures(code) {
            return Some(Declaration::MemberAttribute {
                target: capture_name(code, &caps, 1)?,
                attribute: caps[2].to_string(),
            });
        }
        if patterns::ATTRIBUTE.is_match(code) {
            return None;
        }

        match self.block {
            Block::Type => return self.recognize_type_body(code),
            Block::Enum => return self.recognize_enum_body(code),
            Block::None => {}
        }

        if let Some(caps) = patterns::PROC_END.captures(code) {
            let family = ProcFamily::parse(&caps[1])?;
            if self.procedure == Some(family) {
                self.procedure = None;
                return Some(Declaration::ProcedureEnd(family));
            }
            return None;
        }

        if let Some(header) = parse_proc_header(code) {
            self.procedure = header.kind.family();
            return Some(Declaration::ProcedureStart(header));
        }
        if let Some(header) = parse_declare(code) {
            return Some(Declaration::External(header));
        }

        if self.procedure.is_some() {
            return recognize_local(code);
        }
        self.recognize_module_level(code)
    }

    fn recognize_designer(&mut self, code: &str) -> Option<Declaration> {
        if patterns::BEGIN_PROPERTY.is_match(code) {
            self.property_depth += 1;
            return None;
        }
        if patterns::END_PROPERTY.is_match(code) {
            self.property_depth = self.property_depth.saturating_sub(1);
            return None;
        }
        if self.property_depth > 0 {
            return None;
        }
        if patterns::BARE_BEGIN.is_match(code) {
            self.designer_depth += 1;
            self.in_control.push(false);
            return None;
        }
        if let Some(caps) = patterns::BEGIN_BLOCK.captures(code) {
            self.designer_depth += 1;
            self.in_control.push(true);
            return Some(Declaration::ControlBegin {
                type_name: caps[1].to_string(),
                name: capture_name(code, &caps, 2)?,
            });
        }
        if patterns::BARE_END.is_match(code) {
            self.designer_depth -= 1;
            let was_control = self.in_control.pop().unwrap_or(false);
            return was_control.then_some(Declaration::BlockEnd);
        }
        if self.in_control.last().copied().unwrap_or(false) {
            if let Some(caps) = patterns::CONTROL_INDEX.captures(code) {
                let index = caps[1].parse().ok()?;
                return Some(Declaration::ControlIndex(index));
            }
        }
        None
    }

    fn recognize_type_body(&mut self, code: &str) -> Option<Declaration> {
        if patterns::TYPE_END.is_match(code) {
            self.block = Block::None;
            return Some(Declaration::TypeEnd);
        }
        let chars: Vec<char> = code.chars().collect();
        let mut cursor = Cursor::new(&chars, 0, chars.len());
        parse_var(&mut cursor).map(Declaration::Field)
    }

    fn recognize_enum_body(&mut self, code: &str) -> Option<Declaration> {
        if patterns::ENUM_END.is_match(code) {
            self.block = Block::None;
            return Some(Declaration::EnumEnd);
        }
        let caps = patterns::ENUM_VALUE.captures(code)?;
        let group = if caps.get(1).is_some() { 1 } else { 2 };
        Some(Declaration::EnumValue {
            name: capture_name(code, &caps, group)?,
            value: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    fn recognize_module_level(&mut self, code: &str) -> Option<Declaration> {
        if let Some(caps) = patterns::TYPE_START.captures(code) {
            self.block = Block::Type;
            return Some(Declaration::TypeStart {
                name: capture_name(code, &caps, 2)?,
                visibility: visibility_or(&caps, 1, Visibility::Public),
            });
        }
        if let Some(caps) = patterns::ENUM_START.captures(code) {
            self.block = Block::Enum;
            return Some(Declaration::EnumStart {
                name: capture_name(code, &caps, 2)?,
                visibility: visibility_or(&caps, 1, Visibility::Public),
            });
        }
        if let Some(caps) = patterns::EVENT.captures(code) {
            let name = capture_name(code, &caps, 2)?;
            let chars: Vec<char> = code.chars().collect();
            let after = name.column + name.text.chars().count();
            return Some(Declaration::Event {
                params: parse_param_list_at(&chars, after).0,
                name,
                visibility: Visibility::Public,
            });
        }
        if let Some(caps) = patterns::IMPLEMENTS.captures(code) {
            return Some(Declaration::Implements(capture_name(code, &caps, 1)?));
        }
        if let Some(caps) = patterns::CONST.captures(code) {
            let visibility = visibility_or(&caps, 1, Visibility::Private);
            let start = char_column(code, caps.get(0)?.end());
            return Some(Declaration::Constants {
                visibility,
                consts: parse_const_list(code, start),
            });
        }
        if let Some(caps) = patterns::MODULE_VARS.captures(code) {
            let keyword = &caps[1];
            let is_static = keyword.eq_ignore_ascii_case("static");
            let visibility = Visibility::parse(keyword).unwrap_or(Visibility::Private);
            let start = char_column(code, caps.get(0)?.end());
            let vars = parse_var_list(code, start);
            if vars.is_empty() {
                return None;
            }
            return Some(Declaration::Variables {
                visibility,
                is_static,
                vars,
            });
        }
        None
    }
}

fn recognize_local(code: &str) -> Option<Declaration> {
    if let Some(caps) = patterns::LOCAL_VARS.captures(code) {
        let is_static = caps[1].eq_ignore_ascii_case("static");
        let start = char_column(code, caps.get(0)?.end());
        let vars = parse_var_list(code, start);
        if vars.is_empty() {
            return None;
        }
        return Some(Declaration::Variables {
            visibility: Visibility::Private,
            is_static,
            vars,
        });
    }
    if let Some(caps) = patterns::LOCAL_CONST.captures(code) {
        let start = char_column(code, caps.get(0)?.end());
        return Some(Declaration::Constants {
            visibility: Visibility::Private,
            consts: parse_const_list(code, start),
        });
    }
    None
}

// ============================================================================
// Headers
// ============================================================================

fn parse_proc_header(code: &str) -> Option<ProcHeader> {
    let caps = patterns::PROC_HEADER.captures(code)?;
    let kind_word: String = caps[3]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let kind = match kind_word.as_str() {
        "sub" => ProcedureKind::Sub,
        "function" => ProcedureKind::Function,
        "property get" => ProcedureKind::PropertyGet,
        "property let" => ProcedureKind::PropertyLet,
        "property set" => ProcedureKind::PropertySet,
        _ => return None,
    };
    let name = capture_name(code, &caps, 4)?;
    let chars: Vec<char> = code.chars().collect();
    let after = name.column + name.text.chars().count();
    let (params, return_type) = parse_param_list_at(&chars, after);

    Some(ProcHeader {
        name,
        kind,
        visibility: visibility_or(&caps, 1, Visibility::Public),
        is_static: caps.get(2).is_some(),
        params,
        return_type,
        library: None,
    })
}

fn parse_declare(code: &str) -> Option<ProcHeader> {
    let caps = patterns::DECLARE.captures(code)?;
    let kind = if caps[2].eq_ignore_ascii_case("function") {
        ProcedureKind::DeclareFunction
    } else {
        ProcedureKind::DeclareSub
    };
    let chars: Vec<char> = code.chars().collect();
    let after = char_column(code, caps.get(0)?.end());
    let (params, return_type) = parse_param_list_at(&chars, after);

    Some(ProcHeader {
        name: capture_name(code, &caps, 3)?,
        kind,
        visibility: visibility_or(&caps, 1, Visibility::Public),
        is_static: false,
        params,
        return_type,
        library: Some(caps[4].to_string()),
    })
}

/// Parse `[suffix] [( params )] [As Type]` starting at `from`.
fn parse_param_list_at(chars: &[char], from: usize) -> (Vec<ParamDecl>, Option<TypeRef>) {
    let mut cursor = Cursor::new(chars, from, chars.len());
    cursor.skip_suffix();
    let mut params = Vec::new();

    cursor.skip_ws();
    if cursor.peek() == Some('(') {
        let open = cursor.pos;
        if let Some(close) = matching_paren(chars, open, chars.len()) {
            for (start, end) in split_top_level(chars, open + 1, close) {
                let mut piece = Cursor::new(chars, start, end);
                if let Some(param) = parse_param(&mut piece) {
                    params.push(param);
                }
            }
            cursor.pos = close + 1;
        } else {
            cursor.pos = chars.len();
        }
    }

    let return_type = if cursor.eat_word("As") {
        cursor.type_ref()
    } else {
        None
    };
    (params, return_type)
}

// ============================================================================
// Lists
// ============================================================================

fn parse_var_list(code: &str, start: usize) -> Vec<VarDecl> {
    let chars: Vec<char> = code.chars().collect();
    split_top_level(&chars, start, chars.len())
        .into_iter()
        .filter_map(|(s, e)| parse_var(&mut Cursor::new(&chars, s, e)))
        .collect()
}

fn parse_const_list(code: &str, start: usize) -> Vec<ConstDecl> {
    let chars: Vec<char> = code.chars().collect();
    split_top_level(&chars, start, chars.len())
        .into_iter()
        .filter_map(|(s, e)| parse_const(&mut Cursor::new(&chars, s, e)))
        .collect()
}

fn parse_var(cursor: &mut Cursor<'_>) -> Option<VarDecl> {
    let with_events = cursor.eat_word("WithEvents");
    let name = cursor.ident()?;
    let is_array = cursor.skip_parens();
    let mut as_new = false;
    let mut type_ref = None;
    if cursor.eat_word("As") {
        as_new = cursor.eat_word("New");
        type_ref = cursor.type_ref();
    }
    Some(VarDecl {
        name,
        type_ref,
        is_array,
        with_events,
        as_new,
    })
}

fn parse_param(cursor: &mut Cursor<'_>) -> Option<ParamDecl> {
    let mut passing = Passing::Default;
    let mut optional = false;
    let mut param_array = false;
    loop {
        if cursor.eat_word("Optional") {
            optional = true;
        } else if cursor.eat_word("ByVal") {
            passing = Passing::ByVal;
        } else if cursor.eat_word("ByRef") {
            passing = Passing::ByRef;
        } else if cursor.eat_word("ParamArray") {
            param_array = true;
        } else {
            break;
        }
    }
    let name = cursor.ident()?;
    let is_array = cursor.skip_parens();
    let type_ref = if cursor.eat_word("As") {
        cursor.type_ref()
    } else {
        None
    };
    let default_value = if cursor.eat_char('=') {
        Some(cursor.rest())
    } else {
        None
    };
    Some(ParamDecl {
        name,
        type_ref,
        passing,
        optional,
        param_array,
        is_array,
        default_value,
    })
}

fn parse_const(cursor: &mut Cursor<'_>) -> Option<ConstDecl> {
    let name = cursor.ident()?;
    let type_ref = if cursor.eat_word("As") {
        cursor.type_ref()
    } else {
        None
    };
    let value = if cursor.eat_char('=') {
        cursor.rest()
    } else {
        String::new()
    };
    Some(ConstDecl {
        name,
        type_ref,
        value,
    })
}

/// Split `[start, end)` on commas outside parentheses and string literals.
fn split_top_level(chars: &[char], start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut piece_start = start;
    for i in start..end.min(chars.len()) {
        match chars[i] {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                pieces.push((piece_start, i));
                piece_start = i + 1;
            }
            _ => {}
        }
    }
    if piece_start < end || !pieces.is_empty() {
        pieces.push((piece_start, end));
    }
    pieces
}

/// Index of the `)` matching the `(` at `open`.
fn matching_paren(chars: &[char], open: usize, end: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, &c) in chars.iter().enumerate().take(end).skip(open) {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Helpers
// ============================================================================

fn char_column(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn capture_name(code: &str, caps: &regex::Captures<'_>, group: usize) -> Option<Name> {
    let m = caps.get(group)?;
    Some(Name {
        text: m.as_str().to_string(),
        column: char_column(code, m.start()),
    })
}

fn visibility_or(caps: &regex::Captures<'_>, group: usize, default: Visibility) -> Visibility {
    caps.get(group)
        .and_then(|m| Visibility::parse(m.as_str()))
        .unwrap_or(default)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Char cursor over a slice of a logical line. Positions are absolute.
struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn new(chars: &'a [char], start: usize, end: usize) -> Self {
        Cursor {
            chars,
            pos: start,
            end: end.min(chars.len()),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.end && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        (self.pos < self.end).then(|| self.chars[self.pos])
    }

    fn skip_suffix(&mut self) {
        if self.peek().is_some_and(|c| TYPE_SUFFIXES.contains(&c)) {
            self.pos += 1;
        }
    }

    fn eat_char(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_ws();
        let len = word.chars().count();
        if self.pos + len > self.end {
            return false;
        }
        let candidate: String = self.chars[self.pos..self.pos + len].iter().collect();
        if !candidate.eq_ignore_ascii_case(word) {
            return false;
        }
        if self.pos + len < self.end && is_ident_char(self.chars[self.pos + len]) {
            return false;
        }
        self.pos += len;
        true
    }

    fn ident(&mut self) -> Option<Name> {
        self.skip_ws();
        let c = self.peek()?;
        if c == '[' {
            let close = (self.pos + 1..self.end).find(|&k| self.chars[k] == ']')?;
            let name = Name {
                text: self.chars[self.pos + 1..close].iter().collect(),
                column: self.pos + 1,
            };
            self.pos = close + 1;
            return Some(name);
        }
        if !c.is_alphabetic() {
            return None;
        }
        let start = self.pos;
        while self.pos < self.end && is_ident_char(self.chars[self.pos]) {
            self.pos += 1;
        }
        let name = Name {
            text: self.chars[start..self.pos].iter().collect(),
            column: start,
        };
        self.skip_suffix();
        Some(name)
    }

    /// Skip a parenthesized group if one follows.
    fn skip_parens(&mut self) -> bool {
        self.skip_ws();
        if self.peek() != Some('(') {
            return false;
        }
        match matching_paren(self.chars, self.pos, self.end) {
            Some(close) => self.pos = close + 1,
            None => self.pos = self.end,
        }
        true
    }

    /// Dotted type name; trailing `()` or `* n` are consumed.
    fn type_ref(&mut self) -> Option<TypeRef> {
        let first = self.ident()?;
        let mut text = first.text;
        let mut column = first.column;
        while self.peek() == Some('.') {
            self.pos += 1;
            match self.ident() {
                Some(next) => {
                    text.push('.');
                    text.push_str(&next.text);
                    column = next.column;
                }
                None => break,
            }
        }
        self.skip_parens();
        if self.eat_char('*') {
            self.skip_ws();
            while self.peek().is_some_and(is_ident_char) {
                self.pos += 1;
            }
        }
        Some(TypeRef { text, column })
    }

    fn rest(&mut self) -> String {
        let text: String = self.chars[self.pos.min(self.end)..self.end].iter().collect();
        self.pos = self.end;
        text.trim().to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn recognize_all(lines: &[&str]) -> Vec<Option<Declaration>> {
        let mut r = Recognizer::new();
        lines.iter().map(|l| r.recognize(l)).collect()
    }

    mod header_tests {
        use super::*;

        #[test]
        fn function_with_params_and_return() {
            let header = parse_proc_header(
                "Private Function Calc(ByVal a As Long, Optional b As String = \"x, y\", c() As Byte) As Double",
            )
            .unwrap();
            assert_eq!(header.name.text, "Calc");
            assert_eq!(header.name.column, 17);
            assert_eq!(header.kind, ProcedureKind::Function);
            assert_eq!(header.visibility, Visibility::Private);
            let names: Vec<_> = header.params.iter().map(|p| p.name.text.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert_eq!(header.params[0].passing, Passing::ByVal);
            assert!(header.params[1].optional);
            assert_eq!(header.params[1].default_value.as_deref(), Some("\"x, y\""));
            assert!(header.params[2].is_array);
            assert_eq!(header.return_type.unwrap().text, "Double");
        }

        #[test]
        fn property_kinds_and_static() {
            let h = parse_proc_header("Public Static Property Let Value(ByVal v As Long)").unwrap();
            assert_eq!(h.kind, ProcedureKind::PropertyLet);
            assert!(h.is_static);
            let h = parse_proc_header("Property  Get Value() As Long").unwrap();
            assert_eq!(h.kind, ProcedureKind::PropertyGet);
            assert_eq!(h.visibility, Visibility::Public);
        }

        #[test]
        fn declare_external() {
            let h = parse_declare(
                "Private Declare Function GetTickCount Lib \"kernel32\" Alias \"GetTickCount\" () As Long",
            )
            .unwrap();
            assert_eq!(h.kind, ProcedureKind::DeclareFunction);
            assert_eq!(h.library.as_deref(), Some("kernel32"));
            assert!(h.params.is_empty());
            assert_eq!(h.return_type.unwrap().text, "Long");
        }

        #[test]
        fn dotted_return_type_column_is_last_segment() {
            let h = parse_proc_header("Function Open() As ADODB.Recordset").unwrap();
            let rt = h.return_type.unwrap();
            assert_eq!(rt.text, "ADODB.Recordset");
            assert_eq!(rt.column, 25);
        }
    }

    mod terminator_tests {
        use super::*;

        #[test]
        fn end_if_never_closes_a_function() {
            let out = recognize_all(&[
                "Function F() As Long",
                "  If x Then",
                "  End If",
                "  End Sub",
                "End Function",
            ]);
            assert!(matches!(out[0], Some(Declaration::ProcedureStart(_))));
            assert_eq!(out[2], None);
            assert_eq!(out[3], None);
            assert_eq!(out[4], Some(Declaration::ProcedureEnd(ProcFamily::Function)));
        }

        #[test]
        fn locals_only_inside_procedures() {
            let out = recognize_all(&["Dim g As Long", "Sub S()", "  Dim a, b As Long", "End Sub"]);
            match &out[0] {
                Some(Declaration::Variables { visibility, vars, .. }) => {
                    assert_eq!(*visibility, Visibility::Private);
                    assert_eq!(vars.len(), 1);
                }
                other => panic!("unexpected {:?}", other),
            }
            match &out[2] {
                Some(Declaration::Variables { vars, .. }) => {
                    assert_eq!(vars.len(), 2);
                    assert!(vars[0].type_ref.is_none());
                    assert_eq!(vars[1].type_ref.as_ref().unwrap().text, "Long");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    mod block_tests {
        use super::*;

        #[test]
        fn type_and_enum_blocks() {
            let out = recognize_all(&[
                "Private Type Point",
                "  X As Long",
                "  Name As String * 20",
                "End Type",
                "Public Enum Color",
                "  Red = 1",
                "  [Dark Blue]",
                "End Enum",
            ]);
            assert!(matches!(
                out[0],
                Some(Declaration::TypeStart { visibility: Visibility::Private, .. })
            ));
            match &out[2] {
                Some(Declaration::Field(f)) => {
                    assert_eq!(f.name.text, "Name");
                    assert_eq!(f.type_ref.as_ref().unwrap().text, "String");
                }
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(out[3], Some(Declaration::TypeEnd));
            match &out[5] {
                Some(Declaration::EnumValue { name, value }) => {
                    assert_eq!(name.text, "Red");
                    assert_eq!(value.as_deref(), Some("1"));
                }
                other => panic!("unexpected {:?}", other),
            }
            match &out[6] {
                Some(Declaration::EnumValue { name, .. }) => {
                    assert_eq!(name.text, "Dark Blue");
                    assert_eq!(name.column, 3);
                }
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(out[7], Some(Declaration::EnumEnd));
        }

        #[test]
        fn designer_blocks() {
            let out = recognize_all(&[
                "VERSION 5.00",
                "Begin VB.Form frmMain",
                "   Caption = \"Main\"",
                "   Begin VB.CommandButton cmdGo",
                "      Index = 2",
                "      BeginProperty Font",
                "         Name = \"Arial\"",
                "      EndProperty",
                "   End",
                "End",
                "Attribute VB_Name = \"frmMain\"",
                "Dim x As Long",
            ]);
            assert!(matches!(&out[1], Some(Declaration::FormBegin { name, .. }) if name.text == "frmMain"));
            assert!(matches!(&out[3], Some(Declaration::ControlBegin { name, type_name }) if name.text == "cmdGo" && type_name == "VB.CommandButton"));
            assert_eq!(out[4], Some(Declaration::ControlIndex(2)));
            assert_eq!(out[6], None);
            assert_eq!(out[8], Some(Declaration::BlockEnd));
            assert_eq!(out[9], None);
            assert!(matches!(&out[10], Some(Declaration::ModuleName(n)) if n.text == "frmMain" && n.column == 21));
            assert!(matches!(out[11], Some(Declaration::Variables { .. })));
        }

        #[test]
        fn class_header_block() {
            let out = recognize_all(&[
                "VERSION 1.0 CLASS",
                "BEGIN",
                "  MultiUse = -1  'True",
                "END",
                "Attribute VB_Name = \"ClsBar\"",
            ]);
            assert_eq!(out[1], None);
            assert_eq!(out[3], None);
            assert!(matches!(&out[4], Some(Declaration::ModuleName(n)) if n.text == "ClsBar"));
        }
    }

    mod module_level_tests {
        use super::*;

        #[test]
        fn with_events_and_as_new() {
            let out = recognize_all(&["Private WithEvents mTimer As CTimer, mList As New Collection"]);
            match &out[0] {
                Some(Declaration::Variables { vars, .. }) => {
                    assert!(vars[0].with_events);
                    assert_eq!(vars[0].name.text, "mTimer");
                    assert!(vars[1].as_new);
                    assert_eq!(vars[1].type_ref.as_ref().unwrap().text, "Collection");
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[test]
        fn constants_and_events() {
            let out = recognize_all(&[
                "Public Const MAX_ITEMS As Long = 10, MIN_ITEMS = 1 ' bounds",
                "Public Event Changed(ByVal OldValue As Long)",
                "Implements IFoo",
                "Attribute Value.VB_UserMemId = 0",
            ]);
            match &out[0] {
                Some(Declaration::Constants { visibility, consts }) => {
                    assert_eq!(*visibility, Visibility::Public);
                    assert_eq!(consts.len(), 2);
                    assert_eq!(consts[0].value, "10");
                    assert_eq!(consts[1].value, "1");
                }
                other => panic!("unexpected {:?}", other),
            }
            match &out[1] {
                Some(Declaration::Event { name, params, .. }) => {
                    assert_eq!(name.text, "Changed");
                    assert_eq!(params[0].name.text, "OldValue");
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(matches!(&out[2], Some(Declaration::Implements(n)) if n.text == "IFoo"));
            assert!(matches!(&out[3], Some(Declaration::MemberAttribute { target, .. }) if target.text == "Value"));
        }
    }
}
