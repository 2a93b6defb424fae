//! Diagnostic rendering
//!
//! Text output follows the familiar compiler layout:
//!
//! ```text
//! error: contract broken by the value of `port`
//!  --> config.knot:1:19
//!   |
//! 1 | { port | Number = "80" }
//!   |                   ^^^^ applied to this expression
//!   = note: expected Number, got String
//! ```
//!
//! Structured formats (JSON, YAML, TOML) serialize the same information as
//! a `Report`. Every renderer is a pure function of the diagnostic.

use crate::error::{Error, ErrorFormat};
use knot_core::{Diagnostic, DiagnosticKind, Frame, Label};
use serde::Serialize;
use std::fmt::Write;

const RED_BOLD: &str = "\x1b[1;31m";
const BLUE_BOLD: &str = "\x1b[1;34m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn render(diag: &Diagnostic, format: ErrorFormat) -> Result<Vec<u8>, Error> {
    match format {
        ErrorFormat::Text => Ok(render_text(diag, false).into_bytes()),
        ErrorFormat::AnsiText => Ok(render_text(diag, true).into_bytes()),
        ErrorFormat::Json => {
            let mut out = serde_json::to_string_pretty(&Report::from(diag)).map_err(export_err)?;
            out.push('\n');
            Ok(out.into_bytes())
        }
        ErrorFormat::Yaml => serde_yaml::to_string(&Report::from(diag))
            .map(String::into_bytes)
            .map_err(export_err),
        ErrorFormat::Toml => toml::to_string_pretty(&Report::from(diag))
            .map(String::into_bytes)
            .map_err(export_err),
    }
}

fn export_err(e: impl std::fmt::Display) -> Error {
    Error::new(
        DiagnosticKind::Export,
        format!("failed to render diagnostic: {}", e),
    )
}

struct Style {
    color: bool,
}

impl Style {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }
}

fn render_text(diag: &Diagnostic, color: bool) -> String {
    let style = Style { color };
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}{}",
        style.paint(RED_BOLD, "error"),
        style.paint(BOLD, &format!(": {}", diag.message))
    );

    let gutter_width = diag
        .labels
        .iter()
        .map(|l| l.source.location(l.span.start).line.to_string().len())
        .max()
        .unwrap_or(0);
    let pad = " ".repeat(gutter_width);

    for label in &diag.labels {
        render_label(&mut out, &style, label, &pad);
    }
    for note in &diag.notes {
        let _ = writeln!(out, "{} {} {}", pad, style.paint(BLUE_BOLD, "="), note_line("note", note, &style));
    }
    for frame in diag.call_trace.iter().rev() {
        let _ = writeln!(
            out,
            "{} {} {}",
            pad,
            style.paint(BLUE_BOLD, "="),
            note_line("trace", &describe_frame(frame), &style)
        );
    }
    out
}

fn note_line(kind: &str, text: &str, style: &Style) -> String {
    format!("{}: {}", style.paint(CYAN, kind), text)
}

fn describe_frame(frame: &Frame) -> String {
    let loc = frame.source.location(frame.span.start);
    match &frame.name {
        Some(name) => format!("{} at {}:{}", name, frame.source.name(), loc),
        None => format!("<anonymous function> at {}:{}", frame.source.name(), loc),
    }
}

fn render_label(out: &mut String, style: &Style, label: &Label, pad: &str) {
    let source = &label.source;
    let start = source.location(label.span.start);
    let end = source.location(label.span.end);
    let line_text = source.line_text(start.line);

    let bar = style.paint(BLUE_BOLD, "|");
    let _ = writeln!(
        out,
        "{}{} {}:{}",
        pad,
        style.paint(BLUE_BOLD, "-->"),
        source.name(),
        start
    );
    let _ = writeln!(out, "{} {}", pad, bar);
    let _ = writeln!(
        out,
        "{} {} {}",
        style.paint(BLUE_BOLD, &format!("{:>w$}", start.line, w = pad.len())),
        bar,
        line_text
    );

    // Spans running past this line are underlined to its end.
    let end_column = if end.line == start.line {
        end.column
    } else {
        line_text.chars().count() + 1
    };
    let width = end_column.saturating_sub(start.column).max(1);
    let (mark, code) = if label.primary {
        ("^", RED_BOLD)
    } else {
        ("-", BLUE_BOLD)
    };
    let underline = format!("{} {}", mark.repeat(width), label.message);
    let _ = writeln!(
        out,
        "{} {} {}{}",
        pad,
        bar,
        " ".repeat(start.column - 1),
        style.paint(code, underline.trim_end())
    );
}

/// Structured form of a diagnostic
#[derive(Debug, Serialize)]
struct Report<'a> {
    kind: &'static str,
    message: &'a str,
    labels: Vec<LabelReport<'a>>,
    notes: &'a [String],
    call_trace: Vec<FrameReport<'a>>,
}

#[derive(Debug, Serialize)]
struct LabelReport<'a> {
    file: &'a str,
    line: usize,
    column: usize,
    end_line: usize,
    end_column: usize,
    message: &'a str,
    primary: bool,
    snippet: &'a str,
}

#[derive(Debug, Serialize)]
struct FrameReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    file: &'a str,
    line: usize,
    column: usize,
}

impl<'a> From<&'a Diagnostic> for Report<'a> {
    fn from(diag: &'a Diagnostic) -> Self {
        Report {
            kind: diag.kind.as_str(),
            message: &diag.message,
            labels: diag
                .labels
                .iter()
                .map(|label| {
                    let start = label.source.location(label.span.start);
                    let end = label.source.location(label.span.end);
                    LabelReport {
                        file: label.source.name(),
                        line: start.line,
                        column: start.column,
                        end_line: end.line,
                        end_column: end.column,
                        message: &label.message,
                        primary: label.primary,
                        snippet: label.source.slice(label.span),
                    }
                })
                .collect(),
            notes: &diag.notes,
            call_trace: diag
                .call_trace
                .iter()
                .map(|frame| {
                    let loc = frame.source.location(frame.span.start);
                    FrameReport {
                        name: frame.name.as_deref(),
                        file: frame.source.name(),
                        line: loc.line,
                        column: loc.column,
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knot_core::{SourceFile, Span};

    fn sample() -> Diagnostic {
        let src = SourceFile::new("config.knot", "{ port | Number = \"80\" }");
        Diagnostic::new(
            DiagnosticKind::Contract,
            "contract broken by the value of `port`",
        )
        .with_primary(&src, Span::new(18, 22), "applied to this expression")
        .with_secondary(&src, Span::new(9, 15), "expected type")
        .with_note("expected Number, got String")
    }

    #[test]
    fn test_text_layout() {
        let text = String::from_utf8(render(&sample(), ErrorFormat::Text).unwrap()).unwrap();
        let expected = "\
error: contract broken by the value of `port`
 --> config.knot:1:19
  |
1 | { port | Number = \"80\" }
  |                   ^^^^ applied to this expression
 --> config.knot:1:10
  |
1 | { port | Number = \"80\" }
  |          ------ expected type
  = note: expected Number, got String
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_ansi_has_escapes_and_same_words() {
        let ansi = String::from_utf8(render(&sample(), ErrorFormat::AnsiText).unwrap()).unwrap();
        assert!(ansi.contains(RED_BOLD));
        assert!(ansi.contains("expected Number, got String"));
    }

    #[test]
    fn test_json_fields() {
        let bytes = render(&sample(), ErrorFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "contract-violation");
        assert_eq!(json["labels"][0]["line"], 1);
        assert_eq!(json["labels"][0]["column"], 19);
        assert_eq!(json["labels"][0]["snippet"], "\"80\"");
        assert_eq!(json["notes"][0], "expected Number, got String");
    }

    #[test]
    fn test_yaml_and_toml_render() {
        let yaml = String::from_utf8(render(&sample(), ErrorFormat::Yaml).unwrap()).unwrap();
        assert!(yaml.contains("kind: contract-violation"));
        let toml_text = String::from_utf8(render(&sample(), ErrorFormat::Toml).unwrap()).unwrap();
        let parsed: toml::Value = toml::from_str(&toml_text).unwrap();
        assert_eq!(parsed["message"].as_str(), Some("contract broken by the value of `port`"));
    }

    #[test]
    fn test_no_labels() {
        let diag = Diagnostic::new(DiagnosticKind::Usage, "bad call");
        let text = String::from_utf8(render(&diag, ErrorFormat::Text).unwrap()).unwrap();
        assert_eq!(text, "error: bad call\n");
    }
}
