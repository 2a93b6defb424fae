//! Abstract Syntax Tree for Knot
//!
//! Sub-expressions are reference counted so suspended computations (thunks)
//! can point at a piece of the tree without copying it.

use crate::intern::Symbol;
use crate::number::Number;
use crate::source::Span;
use std::sync::Arc;

pub type ExprRef = Arc<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    ArrayConcat,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Concat => "++",
            BinOp::ArrayConcat => "@",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// A contract annotation (`| Number`, `| Array String`)
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub kind: ContractKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractKind {
    Number,
    String,
    Bool,
    Dyn,
    Array(Box<Contract>),
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::Number => f.write_str("Number"),
            ContractKind::String => f.write_str("String"),
            ContractKind::Bool => f.write_str("Bool"),
            ContractKind::Dyn => f.write_str("Dyn"),
            ContractKind::Array(elem) => match elem.kind {
                ContractKind::Array(_) => write!(f, "Array ({})", elem.kind),
                _ => write!(f, "Array {}", elem.kind),
            },
        }
    }
}

/// One `name | metadata = value` entry of a record literal
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub name_span: Span,
    pub contracts: Vec<Contract>,
    /// Omitted by exporting evaluation
    pub not_exported: bool,
    pub doc: Option<String>,
    /// `None` for a field declared without a definition
    pub value: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    EnumTag(Symbol),
    EnumVariant {
        tag: Symbol,
        payload: ExprRef,
    },
    Var(String),
    Record(Vec<FieldDef>),
    Array(Vec<ExprRef>),
    Let {
        recursive: bool,
        name: String,
        value: ExprRef,
        body: ExprRef,
    },
    Fun {
        param: String,
        body: ExprRef,
    },
    App {
        func: ExprRef,
        arg: ExprRef,
    },
    If {
        cond: ExprRef,
        then_branch: ExprRef,
        else_branch: ExprRef,
    },
    Field {
        target: ExprRef,
        name: String,
        name_span: Span,
    },
    Binary {
        op: BinOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Unary {
        op: UnOp,
        operand: ExprRef,
    },
    Annotated {
        expr: ExprRef,
        contracts: Vec<Contract>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> ExprRef {
        Arc::new(Expr { kind, span })
    }

    /// Literals that need no evaluation step
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Null
                | ExprKind::Bool(_)
                | ExprKind::Number(_)
                | ExprKind::Str(_)
                | ExprKind::EnumTag(_)
        )
    }
}
