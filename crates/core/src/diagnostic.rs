//! Structured diagnostics
//!
//! A `Diagnostic` is the payload of every evaluator failure: a message, zero
//! or more labelled source spans, free-form notes, and the call trace that was
//! active when the failure happened. Rendering lives in the runtime crate.

use crate::source::{SourceFile, Span};
use std::fmt;
use std::sync::Arc;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Lexing or parsing failed
    Parse,
    /// A contract annotation was violated
    Contract,
    /// Runtime failure in the evaluated program
    Eval,
    /// A record field was declared without a definition and then required
    MissingDefinition,
    /// Serialization to JSON/YAML/TOML failed
    Export,
    /// The boundary was asked to do something the value can't support
    Usage,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Parse => "parse-error",
            DiagnosticKind::Contract => "contract-violation",
            DiagnosticKind::Eval => "evaluation-error",
            DiagnosticKind::MissingDefinition => "missing-definition",
            DiagnosticKind::Export => "export-error",
            DiagnosticKind::Usage => "usage-error",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message attached to a span of source text
#[derive(Debug, Clone)]
pub struct Label {
    pub source: Arc<SourceFile>,
    pub span: Span,
    pub message: String,
    /// The primary label marks where the failure happened; secondary labels
    /// give context (e.g. the contract that was broken)
    pub primary: bool,
}

/// One entry of the call trace, innermost last
#[derive(Debug, Clone)]
pub struct Frame {
    /// Name of the called function, when it was bound to an identifier
    pub name: Option<String>,
    pub source: Arc<SourceFile>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub call_trace: Vec<Frame>,
    /// The failure depends on how deep the evaluator was when it happened,
    /// not on the value itself; thunks do not memoize it
    pub transient: bool,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            call_trace: Vec::new(),
            transient: false,
        }
    }

    pub fn with_primary(
        mut self,
        source: &Arc<SourceFile>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        self.labels.push(Label {
            source: Arc::clone(source),
            span,
            message: message.into(),
            primary: true,
        });
        self
    }

    pub fn with_secondary(
        mut self,
        source: &Arc<SourceFile>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        self.labels.push(Label {
            source: Arc::clone(source),
            span,
            message: message.into(),
            primary: false,
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_call_trace(mut self, frames: Vec<Frame>) -> Self {
        self.call_trace = frames;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn primary_label(&self) -> Option<&Label> {
        self.labels.iter().find(|l| l.primary)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let src = SourceFile::new("t", "1 + \"a\"");
        let diag = Diagnostic::new(DiagnosticKind::Eval, "bad operand")
            .with_primary(&src, Span::new(4, 7), "this is a string")
            .with_secondary(&src, Span::new(2, 3), "in this addition")
            .with_note("expected Number");
        assert_eq!(diag.to_string(), "bad operand");
        assert_eq!(diag.labels.len(), 2);
        assert_eq!(diag.primary_label().unwrap().message, "this is a string");
        assert_eq!(diag.kind.as_str(), "evaluation-error");
    }
}
