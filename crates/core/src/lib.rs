//! Knot Core: the evaluator behind the Knot embedding boundary
//!
//! This crate parses Knot source and evaluates it lazily. It knows nothing
//! about handles or C callers; `knot-runtime` builds the boundary on top.
//!
//! Key design principles:
//! - Thunk: a shared, memoizing cell; forcing one twice runs it once
//! - Whnf: a value whose outermost constructor is known, with lazy children
//! - Diagnostic: the structured payload of every failure
//!
//! # Modules
//!
//! - `source`: source files, spans, line/column lookup
//! - `lexer` / `parser` / `ast`: Knot syntax
//! - `number`: exact rational numbers
//! - `intern`: process-wide enum tag table
//! - `value`: thunks, weak head normal forms, scopes
//! - `eval`: the evaluator, contracts, recursion limits
//! - `stdlib`: the `std` record
//! - `diagnostic`: structured failures
//! - `sink`: byte sinks with partial-write retry

pub mod ast;
pub mod diagnostic;
pub mod eval;
pub mod intern;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod sink;
pub mod source;
pub mod stdlib;
pub mod value;

pub use diagnostic::{Diagnostic, DiagnosticKind, Frame, Label};
pub use eval::{DEFAULT_MAX_DEPTH, EvalResult, Evaluator};
pub use intern::Symbol;
pub use number::Number;
pub use sink::{IoSink, SinkError, WriteSink, write_all, write_message};
pub use source::{Location, SourceFile, Span};
pub use value::{Field, Function, RecordData, Thunk, Whnf};
