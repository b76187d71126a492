//! Recursive-descent parser for the Lua dialect.

use crate::ast::*;
use crate::lexer::{LexError, Lexer};
use crate::token::{Comment, Span, Token, TokenKind};
use thiserror::Error;

/// Parse failure. The analyzer treats a chunk that fails to parse as
/// absent rather than aborting a session, so this error surfaces only at
/// host-facing seams.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Lexer failure
    #[error(transparent)]
    Lex(#[from] LexError),
    /// Wrong token
    #[error("unexpected {found} at {line}:{column}, expected {expected}")]
    UnexpectedToken {
        /// Description of the found token
        found: String,
        /// What the parser wanted
        expected: String,
        /// 1-based line
        line: u32,
        /// 0-based column
        column: u32,
    },
    /// Source ended mid-construct
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof {
        /// What the parser wanted
        expected: String,
    },
}

/// Parse a source string into a [`Chunk`].
pub fn parse(source: &str) -> Result<Chunk, ParseError> {
    let (tokens, comments) = Lexer::tokenize(source)?;
    Parser::new(tokens, comments).chunk()
}

/// Token-stream parser. Create via [`parse`] unless token-level control
/// is needed.
pub struct Parser {
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    pos: usize,
    next_id: u32,
}

impl Parser {
    /// Wrap a pre-lexed token stream.
    pub fn new(tokens: Vec<Token>, comments: Vec<Comment>) -> Parser {
        Parser {
            tokens,
            comments,
            pos: 0,
            next_id: 0,
        }
    }

    /// Parse the whole stream as a chunk.
    pub fn chunk(mut self) -> Result<Chunk, ParseError> {
        let body = self.block(&[])?;
        if let Some(tok) = self.peek() {
            return Err(self.unexpected(tok.clone(), "end of input"));
        }
        Ok(Chunk {
            body,
            comments: std::mem::take(&mut self.comments),
        })
    }

    fn id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Span, ParseError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                let span = tok.span;
                self.pos += 1;
                Ok(span)
            }
            Some(tok) => Err(self.unexpected(tok.clone(), what)),
            None => Err(ParseError::UnexpectedEof {
                expected: what.to_string(),
            }),
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Name(n),
                span,
            }) => {
                self.pos += 1;
                Ok((n, span))
            }
            Some(tok) => Err(self.unexpected(tok, what)),
            None => Err(ParseError::UnexpectedEof {
                expected: what.to_string(),
            }),
        }
    }

    fn unexpected(&self, tok: Token, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            found: tok.kind.describe(),
            expected: expected.to_string(),
            line: tok.span.start_line,
            column: tok.span.start_column,
        }
    }

    /// Parse statements until one of `until_kinds` (or end of input).
    fn block(&mut self, until_kinds: &[TokenKind]) -> Result<Block, ParseError> {
        let mut stats = Vec::new();
        loop {
            match self.peek_kind() {
                None => break,
                Some(k) if until_kinds.contains(k) => break,
                Some(TokenKind::Semi) => {
                    self.pos += 1;
                }
                _ => stats.push(self.statement()?),
            }
        }
        Ok(Block { stats })
    }

    fn statement(&mut self) -> Result<Stat, ParseError> {
        let tok = self.peek().cloned().ok_or(ParseError::UnexpectedEof {
            expected: "statement".to_string(),
        })?;
        let span = tok.span;
        match tok.kind {
            TokenKind::Local => self.local_stat(),
            TokenKind::Function => self.function_stat(span, false),
            TokenKind::Return => self.return_stat(span),
            TokenKind::If => self.if_stat(span),
            TokenKind::While => self.while_stat(span),
            TokenKind::Repeat => self.repeat_stat(span),
            TokenKind::For => self.for_stat(span),
            TokenKind::Do => {
                self.pos += 1;
                let body = self.block(&[TokenKind::End])?;
                let end = self.expect(TokenKind::End, "`end`")?;
                Ok(self.stat(span.merge(&end), StatKind::Do(body)))
            }
            TokenKind::Break => {
                self.pos += 1;
                Ok(self.stat(span, StatKind::Break))
            }
            TokenKind::Goto => {
                self.pos += 1;
                let (label, end) = self.expect_name("label")?;
                Ok(self.stat(span.merge(&end), StatKind::Goto(label)))
            }
            TokenKind::DoubleColon => {
                self.pos += 1;
                let (label, _) = self.expect_name("label")?;
                let end = self.expect(TokenKind::DoubleColon, "`::`")?;
                Ok(self.stat(span.merge(&end), StatKind::Label(label)))
            }
            _ => self.expr_or_assign_stat(span),
        }
    }

    fn stat(&mut self, span: Span, kind: StatKind) -> Stat {
        Stat {
            id: self.id(),
            span,
            kind,
        }
    }

    fn local_stat(&mut self) -> Result<Stat, ParseError> {
        let span = self.expect(TokenKind::Local, "`local`")?;

        if self.eat(&TokenKind::Function) {
            let (name, _) = self.expect_name("function name")?;
            let func = self.function_body(span)?;
            let end = func.span;
            return Ok(self.stat(
                span.merge(&end),
                StatKind::FunctionDecl {
                    name: FuncName {
                        path: vec![name],
                        method: None,
                    },
                    func,
                    local: true,
                },
            ));
        }

        let mut names = Vec::new();
        let (first, mut end) = self.expect_name("name")?;
        names.push(first);
        while self.eat(&TokenKind::Comma) {
            let (n, s) = self.expect_name("name")?;
            end = s;
            names.push(n);
        }

        let mut exprs = Vec::new();
        if self.eat(&TokenKind::Assign) {
            exprs = self.expr_list()?;
            if let Some(e) = exprs.last() {
                end = e.span;
            }
        }
        Ok(self.stat(span.merge(&end), StatKind::Local { names, exprs }))
    }

    fn function_stat(&mut self, span: Span, _local: bool) -> Result<Stat, ParseError> {
        self.expect(TokenKind::Function, "`function`")?;
        let (first, _) = self.expect_name("function name")?;
        let mut path = vec![first];
        let mut method = None;
        while self.eat(&TokenKind::Dot) {
            let (n, _) = self.expect_name("name")?;
            path.push(n);
        }
        if self.eat(&TokenKind::Colon) {
            let (n, _) = self.expect_name("method name")?;
            method = Some(n);
        }
        let func = self.function_body(span)?;
        let end = func.span;
        Ok(self.stat(
            span.merge(&end),
            StatKind::FunctionDecl {
                name: FuncName { path, method },
                func,
                local: false,
            },
        ))
    }

    /// `( params ) block end` after the name (or after `function` for a
    /// literal).
    fn function_body(&mut self, start: Span) -> Result<FunctionDecl, ParseError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                match self.peek().cloned() {
                    Some(Token {
                        kind: TokenKind::Name(n),
                        ..
                    }) => {
                        self.pos += 1;
                        params.push(n);
                    }
                    Some(Token {
                        kind: TokenKind::Ellipsis,
                        ..
                    }) => {
                        self.pos += 1;
                        params.push("...".to_string());
                        break;
                    }
                    Some(tok) => return Err(self.unexpected(tok, "parameter")),
                    None => {
                        return Err(ParseError::UnexpectedEof {
                            expected: "parameter".to_string(),
                        })
                    }
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        let body = self.block(&[TokenKind::End])?;
        let end = self.expect(TokenKind::End, "`end`")?;
        Ok(FunctionDecl {
            params,
            body,
            span: start.merge(&end),
        })
    }

    fn return_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.expect(TokenKind::Return, "`return`")?;
        let mut exprs = Vec::new();
        let stops = [
            TokenKind::End,
            TokenKind::Else,
            TokenKind::Elseif,
            TokenKind::Until,
            TokenKind::Semi,
        ];
        if let Some(k) = self.peek_kind() {
            if !stops.contains(k) {
                exprs = self.expr_list()?;
            }
        }
        let end = exprs.last().map(|e| e.span).unwrap_or(span);
        Ok(self.stat(span.merge(&end), StatKind::Return(exprs)))
    }

    fn if_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.expect(TokenKind::If, "`if`")?;
        let mut arms = Vec::new();
        let cond = self.expression()?;
        self.expect(TokenKind::Then, "`then`")?;
        let body = self.block(&[TokenKind::Elseif, TokenKind::Else, TokenKind::End])?;
        arms.push((cond, body));

        let mut orelse = None;
        loop {
            if self.eat(&TokenKind::Elseif) {
                let cond = self.expression()?;
                self.expect(TokenKind::Then, "`then`")?;
                let body = self.block(&[TokenKind::Elseif, TokenKind::Else, TokenKind::End])?;
                arms.push((cond, body));
            } else if self.eat(&TokenKind::Else) {
                orelse = Some(self.block(&[TokenKind::End])?);
            } else {
                break;
            }
        }
        let end = self.expect(TokenKind::End, "`end`")?;
        Ok(self.stat(span.merge(&end), StatKind::If { arms, orelse }))
    }

    fn while_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.expect(TokenKind::While, "`while`")?;
        let cond = self.expression()?;
        self.expect(TokenKind::Do, "`do`")?;
        let body = self.block(&[TokenKind::End])?;
        let end = self.expect(TokenKind::End, "`end`")?;
        Ok(self.stat(span.merge(&end), StatKind::While { cond, body }))
    }

    fn repeat_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.expect(TokenKind::Repeat, "`repeat`")?;
        let body = self.block(&[TokenKind::Until])?;
        self.expect(TokenKind::Until, "`until`")?;
        let cond = self.expression()?;
        let end = cond.span;
        Ok(self.stat(span.merge(&end), StatKind::Repeat { body, cond }))
    }

    fn for_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.expect(TokenKind::For, "`for`")?;
        let (first, _) = self.expect_name("loop variable")?;

        if self.eat(&TokenKind::Assign) {
            let start = self.expression()?;
            self.expect(TokenKind::Comma, "`,`")?;
            let limit = self.expression()?;
            let step = if self.eat(&TokenKind::Comma) {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(TokenKind::Do, "`do`")?;
            let body = self.block(&[TokenKind::End])?;
            let end = self.expect(TokenKind::End, "`end`")?;
            return Ok(self.stat(
                span.merge(&end),
                StatKind::NumericFor {
                    var: first,
                    start,
                    limit,
                    step,
                    body,
                },
            ));
        }

        let mut names = vec![first];
        while self.eat(&TokenKind::Comma) {
            let (n, _) = self.expect_name("loop variable")?;
            names.push(n);
        }
        self.expect(TokenKind::In, "`in`")?;
        let exprs = self.expr_list()?;
        self.expect(TokenKind::Do, "`do`")?;
        let body = self.block(&[TokenKind::End])?;
        let end = self.expect(TokenKind::End, "`end`")?;
        Ok(self.stat(span.merge(&end), StatKind::GenericFor { names, exprs, body }))
    }

    fn expr_or_assign_stat(&mut self, span: Span) -> Result<Stat, ParseError> {
        let first = self.suffixed_expr()?;

        if self.at(&TokenKind::Assign) || self.at(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.eat(&TokenKind::Comma) {
                targets.push(self.suffixed_expr()?);
            }
            self.expect(TokenKind::Assign, "`=`")?;
            let exprs = self.expr_list()?;
            let end = exprs.last().map(|e| e.span).unwrap_or(span);
            return Ok(self.stat(span.merge(&end), StatKind::Assign { targets, exprs }));
        }

        // Only calls are valid expression statements.
        if !matches!(first.kind, ExprKind::Call { .. }) {
            return Err(ParseError::UnexpectedToken {
                found: "expression".to_string(),
                expected: "statement".to_string(),
                line: span.start_line,
                column: span.start_column,
            });
        }
        let end = first.span;
        Ok(self.stat(span.merge(&end), StatKind::ExprStat(first)))
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.expression()?];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    /// Entry point for expression parsing.
    pub fn expression(&mut self) -> Result<Expr, ParseError> {
        self.binary_expr(0)
    }

    fn binary_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        while let Some(op) = self.peek_kind().and_then(bin_op) {
            let (prec, right_assoc) = bin_prec(op);
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.binary_expr(next_min)?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr {
                id: self.id(),
                span,
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Not) => Some(UnOp::Not),
            Some(TokenKind::Hash) => Some(UnOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            let span = match self.advance() {
                Some(tok) => tok.span,
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "expression".to_string(),
                    })
                }
            };
            let expr = self.unary_expr()?;
            let full = span.merge(&expr.span);
            return Ok(Expr {
                id: self.id(),
                span: full,
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }
        self.pow_expr()
    }

    /// `^` binds tighter than unary and is right-associative.
    fn pow_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.suffixed_expr()?;
        if self.eat(&TokenKind::Caret) {
            let rhs = self.unary_expr()?;
            let span = base.span.merge(&rhs.span);
            return Ok(Expr {
                id: self.id(),
                span,
                kind: ExprKind::Binary {
                    op: BinOp::Pow,
                    lhs: Box::new(base),
                    rhs: Box::new(rhs),
                },
            });
        }
        Ok(base)
    }

    /// A primary expression followed by any chain of `.name`, `[expr]`,
    /// `(args)`, `:method(args)`, string-call or table-call suffixes.
    fn suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let (name, end) = self.expect_name("field name")?;
                    let span = expr.span.merge(&end);
                    expr = Expr {
                        id: self.id(),
                        span,
                        kind: ExprKind::Member {
                            base: Box::new(expr),
                            name,
                        },
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    let end = self.expect(TokenKind::RBracket, "`]`")?;
                    let span = expr.span.merge(&end);
                    expr = Expr {
                        id: self.id(),
                        span,
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                    };
                }
                Some(TokenKind::Colon) => {
                    self.pos += 1;
                    let (method, _) = self.expect_name("method name")?;
                    let args = self.call_args()?;
                    let end = args.last().map(|a| a.span).unwrap_or(expr.span);
                    let span = expr.span.merge(&end);
                    expr = Expr {
                        id: self.id(),
                        span,
                        kind: ExprKind::Call {
                            base: Box::new(expr),
                            method: Some(method),
                            args,
                        },
                    };
                }
                Some(TokenKind::LParen) | Some(TokenKind::Str(_)) | Some(TokenKind::LBrace) => {
                    let args = self.call_args()?;
                    let end = args.last().map(|a| a.span).unwrap_or(expr.span);
                    let span = expr.span.merge(&end);
                    expr = Expr {
                        id: self.id(),
                        span,
                        kind: ExprKind::Call {
                            base: Box::new(expr),
                            method: None,
                            args,
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                self.pos += 1;
                let mut args = Vec::new();
                if !self.at(&TokenKind::RParen) {
                    args = self.expr_list()?;
                }
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(args)
            }
            Some(Token {
                kind: TokenKind::Str(s),
                span,
            }) => {
                self.pos += 1;
                Ok(vec![Expr {
                    id: self.id(),
                    span,
                    kind: ExprKind::Str(s),
                }])
            }
            Some(Token {
                kind: TokenKind::LBrace,
                ..
            }) => Ok(vec![self.table_expr()?]),
            Some(tok) => Err(self.unexpected(tok, "call arguments")),
            None => Err(ParseError::UnexpectedEof {
                expected: "call arguments".to_string(),
            }),
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().cloned().ok_or(ParseError::UnexpectedEof {
            expected: "expression".to_string(),
        })?;
        let span = tok.span;
        let expr = match tok.kind {
            TokenKind::Nil => self.simple(span, ExprKind::Nil),
            TokenKind::True => self.simple(span, ExprKind::True),
            TokenKind::False => self.simple(span, ExprKind::False),
            TokenKind::Number(n) => self.simple(span, ExprKind::Number(n)),
            TokenKind::Str(s) => self.simple(span, ExprKind::Str(s)),
            TokenKind::Ellipsis => self.simple(span, ExprKind::Vararg),
            TokenKind::Name(n) => self.simple(span, ExprKind::Name(n)),
            TokenKind::Function => {
                self.pos += 1;
                let func = self.function_body(span)?;
                let full = func.span;
                Expr {
                    id: self.id(),
                    span: full,
                    kind: ExprKind::Function(func),
                }
            }
            TokenKind::LBrace => self.table_expr()?,
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expression()?;
                let end = self.expect(TokenKind::RParen, "`)`")?;
                Expr {
                    id: self.id(),
                    span: span.merge(&end),
                    kind: ExprKind::Paren(Box::new(inner)),
                }
            }
            _ => return Err(self.unexpected(tok, "expression")),
        };
        Ok(expr)
    }

    fn simple(&mut self, span: Span, kind: ExprKind) -> Expr {
        self.pos += 1;
        Expr {
            id: self.id(),
            span,
            kind,
        }
    }

    fn table_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.expect(TokenKind::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            match (self.peek_kind().cloned(), self.tokens.get(self.pos + 1)) {
                (
                    Some(TokenKind::Name(n)),
                    Some(Token {
                        kind: TokenKind::Assign,
                        ..
                    }),
                ) => {
                    self.pos += 2;
                    fields.push(TableField::Named(n, self.expression()?));
                }
                (Some(TokenKind::LBracket), _) => {
                    self.pos += 1;
                    let key = self.expression()?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    self.expect(TokenKind::Assign, "`=`")?;
                    fields.push(TableField::Keyed(key, self.expression()?));
                }
                _ => fields.push(TableField::Item(self.expression()?)),
            }
            if !self.eat(&TokenKind::Comma) && !self.eat(&TokenKind::Semi) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Expr {
            id: self.id(),
            span: span.merge(&end),
            kind: ExprKind::Table(fields),
        })
    }
}

fn bin_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Or => BinOp::Or,
        TokenKind::And => BinOp::And,
        TokenKind::Less => BinOp::Lt,
        TokenKind::Greater => BinOp::Gt,
        TokenKind::LessEq => BinOp::Le,
        TokenKind::GreaterEq => BinOp::Ge,
        TokenKind::NotEq => BinOp::Ne,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::Concat => BinOp::Concat,
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        _ => return None,
    })
}

/// `(precedence, right-associative)`; `^` is handled in `pow_expr`.
fn bin_prec(op: BinOp) -> (u8, bool) {
    match op {
        BinOp::Or => (1, false),
        BinOp::And => (2, false),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Ne | BinOp::Eq => (3, false),
        BinOp::Concat => (4, true),
        BinOp::Add | BinOp::Sub => (5, false),
        BinOp::Mul | BinOp::Div | BinOp::Mod => (6, false),
        BinOp::Pow => (8, true),
    }
}
