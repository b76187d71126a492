//! AST for the Lua dialect.
//!
//! Nodes are wrapper structs (`id` + `span` + kind enum) so every node
//! that can carry a diagnostic has a stable identity. NodeIds are
//! assigned by the parser in visit order and are unique within a chunk.

use crate::token::{Comment, Span};
use std::fmt;

/// Stable identity of an AST node within one parsed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A parsed source file: top-level statements plus every comment, in
/// source order.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Top-level statements
    pub body: Block,
    /// All comments, for doc-annotation collection
    pub comments: Vec<Comment>,
}

/// A statement sequence.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Statements in source order
    pub stats: Vec<Stat>,
}

/// A statement node.
#[derive(Debug, Clone)]
pub struct Stat {
    /// Node identity
    pub id: NodeId,
    /// Source location
    pub span: Span,
    /// Statement payload
    pub kind: StatKind,
}

/// Statement payloads.
#[derive(Debug, Clone)]
pub enum StatKind {
    /// `local a, b = e1, e2`
    Local {
        /// Declared names
        names: Vec<String>,
        /// Initializer expressions (possibly fewer than names)
        exprs: Vec<Expr>,
    },
    /// `a.b, c = e1, e2`
    Assign {
        /// Assignment targets (names, members, indexes)
        targets: Vec<Expr>,
        /// Right-hand expressions
        exprs: Vec<Expr>,
    },
    /// An expression evaluated for effect (a call)
    ExprStat(Expr),
    /// `function name(...) ... end` / `local function name(...) ... end`
    FunctionDecl {
        /// Dotted/colon path of the declared name
        name: FuncName,
        /// The function itself
        func: FunctionDecl,
        /// Whether declared `local`
        local: bool,
    },
    /// `return e1, e2`
    Return(Vec<Expr>),
    /// `if c then ... elseif c2 then ... else ... end`
    If {
        /// `(condition, body)` pairs: the `if` arm then each `elseif`
        arms: Vec<(Expr, Block)>,
        /// `else` body
        orelse: Option<Block>,
    },
    /// `while c do ... end`
    While {
        /// Loop condition
        cond: Expr,
        /// Loop body
        body: Block,
    },
    /// `repeat ... until c`
    Repeat {
        /// Loop body
        body: Block,
        /// Exit condition
        cond: Expr,
    },
    /// `for i = a, b[, c] do ... end`
    NumericFor {
        /// Loop variable
        var: String,
        /// Start expression
        start: Expr,
        /// Limit expression
        limit: Expr,
        /// Step expression
        step: Option<Expr>,
        /// Loop body
        body: Block,
    },
    /// `for k, v in e do ... end`
    GenericFor {
        /// Loop variables
        names: Vec<String>,
        /// Iterator expressions
        exprs: Vec<Expr>,
        /// Loop body
        body: Block,
    },
    /// `do ... end`
    Do(Block),
    /// `break`
    Break,
    /// `goto label` / `::label::` (parsed, otherwise ignored)
    Goto(String),
    /// `::label::`
    Label(String),
}

/// The name path of a function declaration: `a.b.c` or `a.b:c`.
#[derive(Debug, Clone)]
pub struct FuncName {
    /// Dotted path segments
    pub path: Vec<String>,
    /// Method name after `:`, if any
    pub method: Option<String>,
}

/// A function literal or declaration body.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// Parameter names; `...` appears as a literal `"..."` entry
    pub params: Vec<String>,
    /// Function body
    pub body: Block,
    /// Span of the whole `function ... end`
    pub span: Span,
}

impl FunctionDecl {
    /// Whether the function declares no parameters at all.
    pub fn is_nullary(&self) -> bool {
        self.params.is_empty()
    }
}

/// An expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    /// Node identity
    pub id: NodeId,
    /// Source location
    pub span: Span,
    /// Expression payload
    pub kind: ExprKind,
}

/// Expression payloads.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Numeric literal
    Number(f64),
    /// String literal
    Str(String),
    /// `...`
    Vararg,
    /// Identifier reference
    Name(String),
    /// `base.name`
    Member {
        /// Accessed value
        base: Box<Expr>,
        /// Field name
        name: String,
    },
    /// `base[index]`
    Index {
        /// Accessed value
        base: Box<Expr>,
        /// Key expression
        index: Box<Expr>,
    },
    /// `base(args)` or `base:method(args)`
    Call {
        /// Called value
        base: Box<Expr>,
        /// Method name for `:` calls
        method: Option<String>,
        /// Argument expressions
        args: Vec<Expr>,
    },
    /// Function literal
    Function(FunctionDecl),
    /// Table constructor
    Table(Vec<TableField>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnOp,
        /// Operand
        expr: Box<Expr>,
    },
    /// Parenthesized expression (kept for single-value truncation)
    Paren(Box<Expr>),
}

/// One entry of a table constructor.
#[derive(Debug, Clone)]
pub enum TableField {
    /// `name = expr`
    Named(String, Expr),
    /// `[key] = expr`
    Keyed(Expr, Expr),
    /// positional `expr`
    Item(Expr),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `..`
    Concat,
    /// `==`
    Eq,
    /// `~=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinOp {
    /// Whether the operator always yields a number.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow
        )
    }

    /// Whether the operator always yields a boolean.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `-`
    Neg,
    /// `not`
    Not,
    /// `#`
    Len,
}
