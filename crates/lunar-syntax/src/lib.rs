//! Lunar Dialect Parser
//!
//! Lexer and parser for the Lua dialect the analyzer understands: Lua 5.1
//! statements and expressions, an OpenResty-style `require` module
//! convention, and doc-comment type annotations (`-- @name type`,
//! inline `--> type` markers).
//!
//! Every AST node carries a [`token::Span`] with line/column information
//! and a stable [`ast::NodeId`], which the analyzer uses to report each
//! lint at most once per node.

#![warn(missing_docs)]

pub mod ast;
pub mod comments;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    BinOp, Block, Chunk, Expr, ExprKind, FuncName, FunctionDecl, NodeId, Stat, StatKind,
    TableField, UnOp,
};
pub use comments::{Annotation, CommentMap};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, Parser};
pub use token::{Comment, Span, Token};
