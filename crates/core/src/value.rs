//! Lazy values
//!
//! - `Thunk`: shared, memoizing cell for a suspended computation
//! - `Whnf`: a value whose outermost constructor is known
//! - `Env`: persistent variable scope captured by closures and thunks
//!
//! Sub-values of a `Whnf` (record fields, array elements, variant payloads)
//! are themselves thunks, so a value can be resolved one layer at a time.

use crate::ast::{Contract, ExprRef};
use crate::diagnostic::Diagnostic;
use crate::intern::Symbol;
use crate::number::Number;
use crate::source::{SourceFile, Span};
use crate::stdlib::Builtin;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Suspended work held by an unforced thunk
#[derive(Clone)]
pub(crate) enum Pending {
    /// Evaluate an expression in a scope
    Expr { expr: ExprRef, env: Env },
    /// Force `inner`, then check it against `contract`
    Checked {
        inner: Thunk,
        contract: Contract,
        blame: Arc<Blame>,
    },
    /// Apply a function to an argument (used by `std.array.map`)
    Apply { func: Thunk, arg: Thunk, span: Span },
    /// A record field that was declared but never given a value
    Missing { name: String, span: Span, source: Arc<SourceFile> },
}

/// Who is at fault when a contract check fails
#[derive(Debug)]
pub(crate) struct Blame {
    pub field: Option<String>,
    pub source: Arc<SourceFile>,
    pub value_span: Span,
}

pub(crate) enum ThunkState {
    /// Allocated for a recursive binding, not yet filled in
    Empty,
    Suspended(Pending),
    /// Being evaluated; reaching it again means the value depends on itself
    Forcing,
    Done(Whnf),
    Failed(Diagnostic),
}

/// A lazily evaluated value, shared by every binding that refers to it
#[derive(Clone)]
pub struct Thunk(Arc<Mutex<ThunkState>>);

impl Thunk {
    pub(crate) fn suspended(pending: Pending) -> Thunk {
        Thunk(Arc::new(Mutex::new(ThunkState::Suspended(pending))))
    }

    pub(crate) fn expr(expr: ExprRef, env: Env) -> Thunk {
        Thunk::suspended(Pending::Expr { expr, env })
    }

    /// A thunk that is already in weak head normal form
    pub fn ready(value: Whnf) -> Thunk {
        Thunk(Arc::new(Mutex::new(ThunkState::Done(value))))
    }

    pub(crate) fn placeholder() -> Thunk {
        Thunk(Arc::new(Mutex::new(ThunkState::Empty)))
    }

    pub(crate) fn fill(&self, pending: Pending) {
        *self.lock() = ThunkState::Suspended(pending);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ThunkState> {
        // A panic while holding the lock leaves the state intact; keep going.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_forced(&self) -> bool {
        matches!(*self.lock(), ThunkState::Done(_))
    }

    /// The value without forcing: the memoized result, or a literal
    /// constant that needs no evaluation
    pub fn peek(&self) -> Option<Whnf> {
        match &*self.lock() {
            ThunkState::Done(value) => Some(value.clone()),
            ThunkState::Suspended(Pending::Expr { expr, .. }) => Whnf::from_constant(expr),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Thunk) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.lock() {
            ThunkState::Empty => f.write_str("Thunk(<empty>)"),
            ThunkState::Suspended(_) => f.write_str("Thunk(<suspended>)"),
            ThunkState::Forcing => f.write_str("Thunk(<forcing>)"),
            ThunkState::Done(value) => write!(f, "Thunk({:?})", value),
            ThunkState::Failed(diag) => write!(f, "Thunk(<failed: {}>)", diag.message),
        }
    }
}

/// One record field: `None` when the field was declared without a value
#[derive(Debug, Clone)]
pub struct Field {
    pub value: Option<Thunk>,
    pub not_exported: bool,
    pub doc: Option<String>,
}

/// Record contents in source order
#[derive(Debug, Clone, Default)]
pub struct RecordData {
    pub fields: IndexMap<String, Field>,
}

impl RecordData {
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone)]
pub enum Function {
    Closure {
        param: String,
        body: ExprRef,
        env: Env,
    },
    /// A standard library primitive with the arguments supplied so far
    Builtin { builtin: Builtin, args: Vec<Thunk> },
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Closure { param, .. } => write!(f, "<fun {}>", param),
            Function::Builtin { builtin, args } => {
                write!(f, "<builtin {} ({} args)>", builtin.name(), args.len())
            }
        }
    }
}

/// Weak head normal form: the outermost constructor is evaluated
#[derive(Debug, Clone)]
pub enum Whnf {
    Null,
    Bool(bool),
    Number(Number),
    Str(Arc<str>),
    EnumTag(Symbol),
    EnumVariant(Symbol, Thunk),
    Record(Arc<RecordData>),
    Array(Arc<Vec<Thunk>>),
    Function(Function),
}

impl Whnf {
    pub fn type_name(&self) -> &'static str {
        match self {
            Whnf::Null => "Null",
            Whnf::Bool(_) => "Bool",
            Whnf::Number(_) => "Number",
            Whnf::Str(_) => "String",
            Whnf::EnumTag(_) => "EnumTag",
            Whnf::EnumVariant(..) => "EnumVariant",
            Whnf::Record(_) => "Record",
            Whnf::Array(_) => "Array",
            Whnf::Function(_) => "Function",
        }
    }

    pub fn string(s: impl Into<Arc<str>>) -> Whnf {
        Whnf::Str(s.into())
    }

    pub(crate) fn from_constant(expr: &ExprRef) -> Option<Whnf> {
        use crate::ast::ExprKind;
        Some(match &expr.kind {
            ExprKind::Null => Whnf::Null,
            ExprKind::Bool(b) => Whnf::Bool(*b),
            ExprKind::Number(n) => Whnf::Number(n.clone()),
            ExprKind::Str(s) => Whnf::string(s.as_str()),
            ExprKind::EnumTag(tag) => Whnf::EnumTag(*tag),
            _ => return None,
        })
    }
}

struct Binding {
    name: String,
    value: Thunk,
    next: Option<Arc<Binding>>,
}

/// Persistent scope: extending it never disturbs closures that captured
/// an older version
#[derive(Clone)]
pub struct Env {
    source: Arc<SourceFile>,
    vars: Option<Arc<Binding>>,
}

impl Env {
    pub fn new(source: Arc<SourceFile>) -> Env {
        Env { source, vars: None }
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    pub fn bind(&self, name: impl Into<String>, value: Thunk) -> Env {
        Env {
            source: Arc::clone(&self.source),
            vars: Some(Arc::new(Binding {
                name: name.into(),
                value,
                next: self.vars.clone(),
            })),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Thunk> {
        let mut cursor = self.vars.as_deref();
        while let Some(binding) = cursor {
            if binding.name == name {
                return Some(&binding.value);
            }
            cursor = binding.next.as_deref();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_shadowing() {
        let env = Env::new(SourceFile::new("t", ""));
        let outer = env.bind("x", Thunk::ready(Whnf::Bool(true)));
        let inner = outer.bind("x", Thunk::ready(Whnf::Null));
        assert!(matches!(inner.lookup("x").unwrap().peek(), Some(Whnf::Null)));
        assert!(matches!(
            outer.lookup("x").unwrap().peek(),
            Some(Whnf::Bool(true))
        ));
        assert!(env.lookup("x").is_none());
    }

    #[test]
    fn test_peek_constant_without_forcing() {
        let src = SourceFile::new("t", "42");
        let expr = crate::parser::parse(&src).unwrap();
        let thunk = Thunk::expr(expr, Env::new(src));
        assert!(!thunk.is_forced());
        match thunk.peek() {
            Some(Whnf::Number(n)) => assert_eq!(n.to_i64(), Some(42)),
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_has_no_value() {
        let thunk = Thunk::placeholder();
        assert!(thunk.peek().is_none());
        assert!(thunk.ptr_eq(&thunk.clone()));
    }
}
