//! The program representation produced by the parser.
//!
//! A [`Program`] is the root of the representation: the declarations of its
//! `constants`, `configuration`, and `data` sections plus the functions and
//! `at`-blocks of its `program` section. Statements and expressions carry
//! the byte range of the source they were parsed from, which diagnostics
//! use to point back at the offending code.

use std::collections::HashMap;

use indexmap::IndexMap;
use logos::Span;

/// A parsed Piccolo program.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Program {
    /// The functions of the `program` section, in source order.
    pub functions: Vec<Function>,
    /// The `at`-blocks of the `program` section, in source order.
    pub at_blocks: Vec<AtBlock>,
    /// Compile-time constants.
    pub consts: HashMap<String, i32>,
    /// Configuration word values, in declaration order.
    ///
    /// Declaration order is semantic: the i-th entry is assigned the i-th
    /// configuration word slot of the device.
    pub configuration: IndexMap<String, u16>,
    /// Special function registers with named bit fields.
    pub sfrs: HashMap<String, Sfr>,
    /// Declared variables.
    pub variables: HashMap<String, Variable>,
}

/// A function definition: a name and a statement body.
#[derive(Debug, PartialEq, Eq)]
pub struct Function {
    /// The function's name, which doubles as its label.
    pub name: String,
    /// The statements of the body, in source order.
    pub body: Vec<Stmt>,
    /// The source range of the whole definition.
    pub span: Span,
}

/// A block of code pinned at an absolute program-memory address,
/// used for reset and interrupt vectors.
#[derive(Debug, PartialEq, Eq)]
pub struct AtBlock {
    /// The program word address the block starts at.
    pub address: u16,
    /// The statements of the body, in source order.
    pub body: Vec<Stmt>,
    /// The source range of the whole block.
    pub span: Span,
}

/// A special function register: a data-memory address with named bits.
#[derive(Debug, PartialEq, Eq)]
pub struct Sfr {
    /// The register's data-memory address.
    pub address: u16,
    /// Named bits of the register, each an index in `0..8`.
    pub bits: HashMap<String, u8>,
}

/// A declared variable.
#[derive(Debug, PartialEq, Eq)]
pub struct Variable {
    /// The variable's type.
    pub ty: Ty,
    /// Which allocation pool the variable draws from: the banked region
    /// (`0x20..`) or the common region (`0x70..0x7F`).
    pub banked: bool,
}

/// A variable type. Presently just the 8-bit byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    /// An 8-bit byte.
    I8,
}

/// A statement, with the source range it was parsed from.
#[derive(Debug, PartialEq, Eq)]
pub struct Stmt {
    /// What the statement is.
    pub kind: StmtKind,
    /// The source range of the statement.
    pub span: Span,
}

/// The kinds of statement.
#[derive(Debug, PartialEq, Eq)]
pub enum StmtKind {
    /// An assignment `lhs op rhs`.
    Assign {
        /// The target: an identifier or an indexed bit reference.
        lhs: Expr,
        /// The assignment operator.
        op: AssignOp,
        /// The value expression.
        rhs: Expr,
    },
    /// A conditional `if cond then stmt`.
    If {
        /// The condition.
        cond: Expr,
        /// The statement executed when the condition holds.
        then: Box<Stmt>,
    },
    /// A `return` from the current function.
    Return,
    /// A call `name()`.
    Call(String),
    /// A local label `name:`.
    Label(String),
}

/// An expression, with the source range it was parsed from.
#[derive(Debug, PartialEq, Eq)]
pub struct Expr {
    /// What the expression is.
    pub kind: ExprKind,
    /// The source range of the expression.
    pub span: Span,
}

/// The kinds of expression.
#[derive(Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// A name.
    Ident(String),
    /// A numeric literal.
    Num(i32),
    /// An indexed bit reference `name[bit]`.
    Index(String, Box<Expr>),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// A binary operation.
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// A postfix operation.
    Postfix(Box<Expr>, PostfixOp),
}

impl Expr {
    /// Returns the identifier name if this expression is a plain name.
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the literal value if this expression is a numeric literal.
    pub fn as_num(&self) -> Option<i32> {
        match self.kind {
            ExprKind::Num(n) => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Ident(name)          => f.write_str(name),
            ExprKind::Num(n)               => write!(f, "{n}"),
            ExprKind::Index(name, idx)     => write!(f, "{name}[{idx}]"),
            ExprKind::Unary(op, e)         => write!(f, "{op} {e}"),
            ExprKind::Binary(lhs, op, rhs) => write!(f, "{lhs} {op} {rhs}"),
            ExprKind::Postfix(e, op)       => write!(f, "{e}{op}"),
        }
    }
}

/// An assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `&=`
    And,
    /// `|=`
    Or,
    /// `^=`
    Xor,
}
impl std::fmt::Display for AssignOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignOp::Assign => f.write_str("="),
            AssignOp::Add    => f.write_str("+="),
            AssignOp::Sub    => f.write_str("-="),
            AssignOp::And    => f.write_str("&="),
            AssignOp::Or     => f.write_str("|="),
            AssignOp::Xor    => f.write_str("^="),
        }
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
}
impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("not"),
        }
    }
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `!=`
    Neq,
}
impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Neq => f.write_str("!="),
        }
    }
}

/// A postfix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    /// `++`
    Inc,
    /// `--`
    Dec,
}
impl std::fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostfixOp::Inc => f.write_str("++"),
            PostfixOp::Dec => f.write_str("--"),
        }
    }
}
