//! Token and source-location types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A region of source text with line/column information.
///
/// Lines are 1-based, columns 0-based, matching what editors expect from
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line of the first character
    pub start_line: u32,
    /// 0-based column of the first character
    pub start_column: u32,
    /// 1-based line one past the last character
    pub end_line: u32,
    /// 0-based column one past the last character
    pub end_column: u32,
}

impl Span {
    /// A zero-width span at the origin, for synthesized nodes.
    pub fn dummy() -> Span {
        Span {
            start: 0,
            end: 0,
            start_line: 1,
            start_column: 0,
            end_line: 1,
            end_column: 0,
        }
    }

    /// Smallest span covering both inputs.
    pub fn merge(&self, other: &Span) -> Span {
        let (start, start_line, start_column) = if self.start <= other.start {
            (self.start, self.start_line, self.start_column)
        } else {
            (other.start, other.start_line, other.start_column)
        };
        let (end, end_line, end_column) = if self.end >= other.end {
            (self.end, self.end_line, self.end_column)
        } else {
            (other.end, other.end_line, other.end_column)
        };
        Span {
            start,
            end,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Whether the span covers the given line.
    pub fn covers_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

/// A lexed token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token payload
    pub kind: TokenKind,
    /// Source location
    pub span: Span,
}

/// Token payloads for the Lua dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    /// `and`
    And,
    /// `break`
    Break,
    /// `do`
    Do,
    /// `else`
    Else,
    /// `elseif`
    Elseif,
    /// `end`
    End,
    /// `false`
    False,
    /// `for`
    For,
    /// `function`
    Function,
    /// `goto`
    Goto,
    /// `if`
    If,
    /// `in`
    In,
    /// `local`
    Local,
    /// `nil`
    Nil,
    /// `not`
    Not,
    /// `or`
    Or,
    /// `repeat`
    Repeat,
    /// `return`
    Return,
    /// `then`
    Then,
    /// `true`
    True,
    /// `until`
    Until,
    /// `while`
    While,

    // Literals and names
    /// Identifier
    Name(String),
    /// Numeric literal
    Number(f64),
    /// String literal (unquoted content)
    Str(String),

    // Symbols
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `^`
    Caret,
    /// `#`
    Hash,
    /// `==`
    EqEq,
    /// `~=`
    NotEq,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `=`
    Assign,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semi,
    /// `:`
    Colon,
    /// `::` (goto labels)
    DoubleColon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `..`
    Concat,
    /// `...`
    Ellipsis,
}

impl TokenKind {
    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(n) => format!("name `{}`", n),
            TokenKind::Number(_) => "number".to_string(),
            TokenKind::Str(_) => "string".to_string(),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

/// A comment with its source span, kept out of the token stream but
/// collected for doc annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// Comment text without the leading `--`
    pub text: String,
    /// Raw comment text including the leading `--`
    pub raw: String,
    /// Source location
    pub span: Span,
}
