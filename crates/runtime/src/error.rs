//! Boundary errors
//!
//! An `Error` is only ever produced by a failing operation; it wraps the
//! evaluator's `Diagnostic` and can be rendered any number of times in any
//! format without changing. `ErrorSlot` is the reusable cell handed across
//! the C boundary: each failure overwrites its previous contents.

use crate::buffer::StringBuffer;
use crate::render;
use knot_core::{Diagnostic, DiagnosticKind, WriteSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an error is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorFormat {
    #[default]
    Text,
    AnsiText,
    Json,
    Yaml,
    Toml,
}

impl FromStr for ErrorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ErrorFormat::Text),
            "ansi" | "ansi-text" => Ok(ErrorFormat::AnsiText),
            "json" => Ok(ErrorFormat::Json),
            "yaml" => Ok(ErrorFormat::Yaml),
            "toml" => Ok(ErrorFormat::Toml),
            other => Err(format!(
                "unknown error format '{}' (expected text, ansi, json, yaml or toml)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    diagnostic: Diagnostic,
}

impl Error {
    pub fn kind(&self) -> DiagnosticKind {
        self.diagnostic.kind
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    pub(crate) fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Error {
            diagnostic: Diagnostic::new(kind, message),
        }
    }

    /// Render into freshly allocated bytes
    pub fn render(&self, format: ErrorFormat) -> Result<Vec<u8>, Error> {
        render::render(&self.diagnostic, format)
    }

    /// Render into a reusable buffer, replacing its contents
    pub fn render_into(&self, format: ErrorFormat, out: &mut StringBuffer) -> Result<(), Error> {
        let bytes = self.render(format)?;
        out.set(bytes);
        Ok(())
    }

    /// Render and push the bytes through a sink, then flush it
    pub fn display(&self, format: ErrorFormat, sink: &mut dyn WriteSink) -> Result<(), Error> {
        let bytes = self.render(format)?;
        knot_core::write_message(sink, &bytes)
            .map_err(|e| Error::new(DiagnosticKind::Usage, e.to_string()))
    }
}

impl From<Diagnostic> for Error {
    fn from(diagnostic: Diagnostic) -> Self {
        Error { diagnostic }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.diagnostic.kind, self.diagnostic.message)
    }
}

impl std::error::Error for Error {}

/// A reusable error cell
#[derive(Debug, Default)]
pub struct ErrorSlot {
    error: Option<Error>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        ErrorSlot::default()
    }

    pub fn set(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub fn get(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn take(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn is_set(&self) -> bool {
        self.error.is_some()
    }

    pub fn clear(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<ErrorFormat>(), Ok(ErrorFormat::Json));
        assert_eq!("ANSI".parse::<ErrorFormat>(), Ok(ErrorFormat::AnsiText));
        assert!("xml".parse::<ErrorFormat>().is_err());
    }

    #[test]
    fn test_slot_overwrites() {
        let mut slot = ErrorSlot::new();
        slot.set(Error::new(DiagnosticKind::Eval, "first"));
        slot.set(Error::new(DiagnosticKind::Parse, "second"));
        assert_eq!(slot.get().unwrap().message(), "second");
        assert_eq!(slot.take().unwrap().kind(), DiagnosticKind::Parse);
        assert!(!slot.is_set());
    }

    #[test]
    fn test_display_includes_kind() {
        let err = Error::new(DiagnosticKind::Export, "cannot export");
        assert_eq!(err.to_string(), "export-error: cannot export");
    }
}
