//! Lexer for the Lua dialect.
//!
//! Built on logos. Comments are not discarded: doc annotations live in
//! them, so the lexer returns the token stream and the comment list side
//! by side.

use crate::token::{Comment, Span, Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexing failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    /// A character that starts no token
    #[error("unexpected character at offset {0}")]
    UnexpectedChar(usize),
    /// A string or long comment that never terminates
    #[error("unterminated string starting at offset {0}")]
    Unterminated(usize),
}

/// Logos token set. Converted to [`TokenKind`] after lexing.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    #[regex(r"0[xX][0-9a-fA-F]+")]
    Number,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    Str,

    // `--...` line comment or `--[[...]]` long comment; the callback
    // consumes the body.
    #[token("--", lex_comment)]
    Comment,

    #[token("[[", lex_long_string)]
    LongStr,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    EqEq,
    #[token("~=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token("::")]
    DoubleColon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("...")]
    Ellipsis,
    #[token("..")]
    Concat,
    #[token(".")]
    Dot,
}

/// Consume a comment body after `--`. Long comments (`--[[ ... ]]`) span
/// lines; line comments run to the newline.
fn lex_comment(lex: &mut logos::Lexer<'_, RawToken>) {
    let rest = lex.remainder();
    if let Some(stripped) = rest.strip_prefix("[[") {
        match stripped.find("]]") {
            Some(pos) => lex.bump(2 + pos + 2),
            None => lex.bump(rest.len()),
        }
    } else {
        let len = rest.find('\n').unwrap_or(rest.len());
        lex.bump(len);
    }
}

/// Consume a long string body after `[[`.
fn lex_long_string(lex: &mut logos::Lexer<'_, RawToken>) -> bool {
    let rest = lex.remainder();
    match rest.find("]]") {
        Some(pos) => {
            lex.bump(pos + 2);
            true
        }
        None => false,
    }
}

/// Precomputed newline offsets for byte-offset → line/column mapping.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> LineIndex {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { line_starts }
    }

    /// 1-based line, 0-based column.
    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line as u32 + 1, (offset - self.line_starts[line]) as u32)
    }

    fn span(&self, range: std::ops::Range<usize>) -> Span {
        let (start_line, start_column) = self.position(range.start);
        let (end_line, end_column) = self.position(range.end);
        Span {
            start: range.start,
            end: range.end,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

/// Lexer output: tokens plus the comments the parser skipped over.
pub struct Lexer;

impl Lexer {
    /// Tokenize a source string.
    pub fn tokenize(source: &str) -> Result<(Vec<Token>, Vec<Comment>), LexError> {
        let index = LineIndex::new(source);
        let mut tokens = Vec::new();
        let mut comments = Vec::new();

        let mut lex = RawToken::lexer(source);
        while let Some(item) = lex.next() {
            let range = lex.span();
            let span = index.span(range.clone());
            let raw = match item {
                Ok(raw) => raw,
                Err(()) => return Err(LexError::UnexpectedChar(range.start)),
            };

            let kind = match raw {
                RawToken::Comment => {
                    let raw_text = lex.slice().to_string();
                    let text = raw_text
                        .trim_start_matches('-')
                        .trim_start_matches("[[")
                        .trim_end_matches("]]")
                        .trim()
                        .to_string();
                    comments.push(Comment {
                        text,
                        raw: raw_text,
                        span,
                    });
                    continue;
                }
                RawToken::And => TokenKind::And,
                RawToken::Break => TokenKind::Break,
                RawToken::Do => TokenKind::Do,
                RawToken::Else => TokenKind::Else,
                RawToken::Elseif => TokenKind::Elseif,
                RawToken::End => TokenKind::End,
                RawToken::False => TokenKind::False,
                RawToken::For => TokenKind::For,
                RawToken::Function => TokenKind::Function,
                RawToken::Goto => TokenKind::Goto,
                RawToken::If => TokenKind::If,
                RawToken::In => TokenKind::In,
                RawToken::Local => TokenKind::Local,
                RawToken::Nil => TokenKind::Nil,
                RawToken::Not => TokenKind::Not,
                RawToken::Or => TokenKind::Or,
                RawToken::Repeat => TokenKind::Repeat,
                RawToken::Return => TokenKind::Return,
                RawToken::Then => TokenKind::Then,
                RawToken::True => TokenKind::True,
                RawToken::Until => TokenKind::Until,
                RawToken::While => TokenKind::While,
                RawToken::Name => TokenKind::Name(lex.slice().to_string()),
                RawToken::Number => {
                    let slice = lex.slice();
                    let value = if let Some(hex) =
                        slice.strip_prefix("0x").or_else(|| slice.strip_prefix("0X"))
                    {
                        i64::from_str_radix(hex, 16).unwrap_or(0) as f64
                    } else {
                        slice.parse().unwrap_or(0.0)
                    };
                    TokenKind::Number(value)
                }
                RawToken::Str => {
                    let slice = lex.slice();
                    TokenKind::Str(unescape(&slice[1..slice.len() - 1]))
                }
                RawToken::LongStr => {
                    let slice = lex.slice();
                    TokenKind::Str(slice[2..slice.len() - 2].to_string())
                }
                RawToken::Plus => TokenKind::Plus,
                RawToken::Minus => TokenKind::Minus,
                RawToken::Star => TokenKind::Star,
                RawToken::Slash => TokenKind::Slash,
                RawToken::Percent => TokenKind::Percent,
                RawToken::Caret => TokenKind::Caret,
                RawToken::Hash => TokenKind::Hash,
                RawToken::EqEq => TokenKind::EqEq,
                RawToken::NotEq => TokenKind::NotEq,
                RawToken::LessEq => TokenKind::LessEq,
                RawToken::GreaterEq => TokenKind::GreaterEq,
                RawToken::Less => TokenKind::Less,
                RawToken::Greater => TokenKind::Greater,
                RawToken::Assign => TokenKind::Assign,
                RawToken::LParen => TokenKind::LParen,
                RawToken::RParen => TokenKind::RParen,
                RawToken::LBrace => TokenKind::LBrace,
                RawToken::RBrace => TokenKind::RBrace,
                RawToken::LBracket => TokenKind::LBracket,
                RawToken::RBracket => TokenKind::RBracket,
                RawToken::Semi => TokenKind::Semi,
                RawToken::Colon => TokenKind::Colon,
                RawToken::DoubleColon => TokenKind::DoubleColon,
                RawToken::Comma => TokenKind::Comma,
                RawToken::Dot => TokenKind::Dot,
                RawToken::Concat => TokenKind::Concat,
                RawToken::Ellipsis => TokenKind::Ellipsis,
            };
            tokens.push(Token { kind, span });
        }

        Ok((tokens, comments))
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_locals() {
        let (tokens, comments) = Lexer::tokenize("local x = 42").unwrap();
        assert!(comments.is_empty());
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].kind, TokenKind::Local);
        assert_eq!(tokens[1].kind, TokenKind::Name("x".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::Assign);
        assert_eq!(tokens[3].kind, TokenKind::Number(42.0));
    }

    #[test]
    fn test_comment_collection() {
        let src = "local x = 1 -- @x number\nlocal y = 2";
        let (tokens, comments) = Lexer::tokenize(src).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "@x number");
        assert_eq!(comments[0].span.start_line, 1);
        assert_eq!(tokens.len(), 8);
    }

    #[test]
    fn test_long_comment() {
        let src = "--[[ spans\nlines ]]\nlocal x = 1";
        let (tokens, comments) = Lexer::tokenize(src).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].span.start_line, 3);
    }

    #[test]
    fn test_strings() {
        let (tokens, _) = Lexer::tokenize(r#"local s = "a\nb" .. 'c'"#).unwrap();
        assert_eq!(tokens[3].kind, TokenKind::Str("a\nb".to_string()));
        assert_eq!(tokens[5].kind, TokenKind::Str("c".to_string()));
    }

    #[test]
    fn test_dots() {
        let (tokens, _) = Lexer::tokenize("a.b .. c ...").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert!(kinds.contains(&TokenKind::Dot));
        assert!(kinds.contains(&TokenKind::Concat));
        assert!(kinds.contains(&TokenKind::Ellipsis));
    }

    #[test]
    fn test_line_positions() {
        let (tokens, _) = Lexer::tokenize("local a\nlocal b").unwrap();
        assert_eq!(tokens[0].span.start_line, 1);
        assert_eq!(tokens[2].span.start_line, 2);
        assert_eq!(tokens[3].span.start_column, 6);
    }

    #[test]
    fn test_unexpected_char() {
        assert!(matches!(
            Lexer::tokenize("local x = @"),
            Err(LexError::UnexpectedChar(_))
        ));
    }
}
