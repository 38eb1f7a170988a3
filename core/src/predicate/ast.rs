//! Syntax tree of a predicate body

use regex::Regex;

#[derive(Debug, Clone)]
pub struct Program {
    /// Name the row is bound to (`row` unless a wrapper function renamed it)
    pub param: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Declare { name: String, init: Option<Expr> },
    Return(Option<Expr>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
    Empty,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone)]
pub struct RegexLiteral {
    pub regex: Regex,
    pub global: bool,
}

#[derive(Debug, Clone)]
pub enum Property {
    Named(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Regex(RegexLiteral),
    Array(Vec<Expr>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: Property,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        class: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// Inline callback, only valid as the argument of an array method
    Arrow { params: Vec<String>, body: Vec<Stmt> },
}
