//! Knot Runtime: the embedding boundary
//!
//! Host programs evaluate Knot source through a `Context` and inspect the
//! results as `Expr` handles. The same surface is exported to C as the
//! `knot_*` functions declared in `include/knot.h`.
//!
//! Key design principles:
//! - Expr: an owned handle; shallow results keep unevaluated children lazy
//! - Views: record, array and number accessors borrow from their handle
//! - Error: a structured diagnostic renderable as text, ANSI, JSON, YAML, TOML
//!
//! # Modules
//!
//! - `context`: evaluation entry points and configuration
//! - `expr`: handles, values and borrowed views
//! - `export`: JSON/YAML/TOML serialization
//! - `error` / `render`: error handles and diagnostic rendering
//! - `buffer`: growable byte strings for C callers
//! - `views`: live-view registry for the C boundary
//! - `ffi`: the C ABI

pub mod buffer;
pub mod context;
pub mod error;
pub mod export;
pub mod expr;
pub mod ffi;
pub mod render;
pub mod views;

pub use buffer::StringBuffer;
pub use context::{Context, ContextConfig, DEFAULT_SOURCE_NAME};
pub use error::{Error, ErrorFormat, ErrorSlot};
pub use export::{ExportFormat, Exportable};
pub use expr::{ArrayView, Expr, NotExportedScope, NumberView, RecordEntries, RecordView, Value};
pub use views::ViewKind;

// Core types that appear in this crate's public signatures
pub use knot_core::{Diagnostic, DiagnosticKind, Frame, IoSink, Label, Number, WriteSink};
