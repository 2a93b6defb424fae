//! Knot CLI library
//!
//! The pieces of the `knot` binary that do not touch the process: config
//! loading, field-path walking and output formatting. Kept separate from
//! `main.rs` so they can be tested directly.

use knot::{Context, ContextConfig, ExportFormat, Expr, Value};
use std::fmt;
use std::path::Path;

/// How much of the program to evaluate before printing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Force everything and serialize
    #[default]
    Deep,
    /// Force everything except `not_exported` fields and serialize
    Export,
    /// Force only the outermost constructor and describe it
    Shallow,
}

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub mode: Mode,
    pub format: Option<ExportFormat>,
    /// Dotted path of record fields to select, e.g. `server.port`
    pub field: Option<String>,
}

#[derive(Debug)]
pub enum CliError {
    /// Evaluation or export failed; carries the full diagnostic
    Knot(knot::Error),
    /// A `--field` segment could not be followed
    Field(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Knot(e) => write!(f, "{}", e),
            CliError::Field(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<knot::Error> for CliError {
    fn from(e: knot::Error) -> Self {
        CliError::Knot(e)
    }
}

/// Load the context config, falling back to defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<ContextConfig, String> {
    match path {
        Some(path) => ContextConfig::load(path),
        None => Ok(ContextConfig::default()),
    }
}

/// Evaluate `src` and produce the text to print on stdout
pub fn evaluate(ctx: &mut Context, src: &str, options: &EvalOptions) -> Result<String, CliError> {
    let format = options.format.unwrap_or(ExportFormat::Json);

    let Some(path) = options.field.as_deref() else {
        return Ok(match options.mode {
            Mode::Deep => {
                let expr = ctx.eval_deep(src)?;
                ctx.export(&expr, format)?
            }
            Mode::Export => {
                let expr = ctx.eval_deep_for_export(src)?;
                ctx.export(&expr, format)?
            }
            Mode::Shallow => describe(&ctx.eval_shallow(src)?),
        });
    };

    let root = ctx.eval_shallow(src)?;
    let selected = select_field(ctx, root, path)?;
    Ok(match options.mode {
        Mode::Shallow => describe(&selected),
        Mode::Deep | Mode::Export => {
            let expr = ctx.force_deep(&selected)?;
            ctx.export(&expr, format)?
        }
    })
}

/// Follow a dotted field path, forcing one step per segment
pub fn select_field(ctx: &mut Context, root: Expr, path: &str) -> Result<Expr, CliError> {
    let mut current = root;
    let mut walked = String::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(CliError::Field(format!("invalid field path `{}`", path)));
        }
        let at = if walked.is_empty() {
            "the top level".to_string()
        } else {
            format!("`{}`", walked)
        };
        let next = {
            let Some(record) = current.as_record() else {
                return Err(CliError::Field(format!(
                    "cannot select `{}`: the value at {} is not a record",
                    segment, at
                )));
            };
            if !record.contains_key(segment) {
                return Err(CliError::Field(format!("no field `{}` at {}", segment, at)));
            }
            match record.get(segment) {
                Some(value) => value.clone(),
                None => {
                    return Err(CliError::Field(format!(
                        "field `{}` at {} has no value",
                        segment, at
                    )));
                }
            }
        };
        current = next;
        ctx.force_shallow(&mut current)?;
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
    }
    Ok(current)
}

fn is_plain_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn write_tag(out: &mut String, tag: &str) {
    out.push('\'');
    if is_plain_tag(tag) {
        out.push_str(tag);
    } else {
        out.push_str(&quote(tag));
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

fn write_value(out: &mut String, expr: &Expr) {
    match expr.value() {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Str(s) => out.push_str(&quote(s)),
        Value::EnumTag(tag) => write_tag(out, tag.as_str()),
        Value::EnumVariant(tag, payload) => {
            write_tag(out, tag.as_str());
            out.push(' ');
            write_value(out, payload);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Record(entries) if entries.is_empty() => out.push_str("{}"),
        Value::Record(entries) => {
            out.push_str("{ ");
            for (i, (name, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if is_plain_tag(name) {
                    out.push_str(name);
                } else {
                    out.push_str(&quote(name));
                }
                if let Some(value) = value {
                    out.push_str(" = ");
                    write_value(out, value);
                }
            }
            out.push_str(" }");
        }
        Value::Unevaluated(_) => out.push_str("<unevaluated>"),
    }
}

/// Knot-like rendering of a possibly partial value
pub fn describe(expr: &Expr) -> String {
    let mut out = String::new();
    write_value(&mut out, expr);
    out
}
