//! Serialization of fully evaluated expressions
//!
//! Integers that fit `i64` become integers, every other number becomes the
//! nearest `f64`, enum tags become strings. Enum variants have no canonical
//! mapping and are rejected, as are unforced sub-expressions, fields
//! without a value and numbers beyond the `f64` range. The tree is validated
//! before serializing so the error can name the offending path.

use crate::expr::{Expr, Value};
use knot_core::{Diagnostic, DiagnosticKind};
use serde::de::DeserializeOwned;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Yaml,
    Toml,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Yaml => "YAML",
            ExportFormat::Toml => "TOML",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "toml" => Ok(ExportFormat::Toml),
            other => Err(format!(
                "unknown export format '{}' (expected json, yaml or toml)",
                other
            )),
        }
    }
}

/// `Serialize` adapter over a validated expression
pub struct Exportable<'a>(pub &'a Expr);

impl Serialize for Exportable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.value() {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match n.to_i64() {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(n.to_f64()),
            },
            Value::Str(s) => serializer.serialize_str(s),
            Value::EnumTag(tag) => serializer.serialize_str(tag.as_str()),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Exportable(item))?;
                }
                seq.end()
            }
            Value::Record(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    match value {
                        Some(value) => map.serialize_entry(key, &Exportable(value))?,
                        None => {
                            return Err(S::Error::custom(format!(
                                "field `{}` has no value",
                                key
                            )));
                        }
                    }
                }
                map.end()
            }
            Value::EnumVariant(tag, _) => Err(S::Error::custom(format!(
                "enum variant '{} has no canonical representation",
                tag
            ))),
            Value::Unevaluated(_) => Err(S::Error::custom("unevaluated sub-expression")),
        }
    }
}

fn describe_path(path: &[String]) -> String {
    if path.is_empty() {
        "at the top level".to_string()
    } else {
        format!("at `{}`", path.concat())
    }
}

fn validate(expr: &Expr, path: &mut Vec<String>, depth: usize) -> Result<(), Diagnostic> {
    if depth == 0 {
        return Err(Diagnostic::new(
            DiagnosticKind::Export,
            format!("cannot export a value nested this deeply {}", describe_path(path)),
        )
        .with_note("the nesting exceeds the context's max_depth"));
    }
    match expr.value() {
        Value::Number(n) if n.to_i64().is_none() && !n.to_f64().is_finite() => {
            Err(Diagnostic::new(
                DiagnosticKind::Export,
                format!(
                    "cannot export a number outside the 64-bit float range {}",
                    describe_path(path)
                ),
            )
            .with_note("JSON, YAML and TOML numbers are exported as 64-bit floats"))
        }
        Value::EnumVariant(tag, _) => Err(Diagnostic::new(
            DiagnosticKind::Export,
            format!(
                "cannot export enum variant `'{}` {}",
                tag,
                describe_path(path)
            ),
        )
        .with_note("enum variants have no canonical JSON, YAML or TOML representation")),
        Value::Unevaluated(_) => Err(Diagnostic::new(
            DiagnosticKind::Export,
            format!("cannot export an unevaluated value {}", describe_path(path)),
        )
        .with_note("evaluate the expression deeply before exporting it")),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(format!("[{}]", i));
                validate(item, path, depth - 1)?;
                path.pop();
            }
            Ok(())
        }
        Value::Record(entries) => {
            for (key, value) in entries {
                path.push(if path.is_empty() {
                    key.clone()
                } else {
                    format!(".{}", key)
                });
                match value {
                    Some(value) => validate(value, path, depth - 1)?,
                    None => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::Export,
                            format!("cannot export a field without a value {}", describe_path(path)),
                        ));
                    }
                }
                path.pop();
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn serializer_error(format: ExportFormat, e: impl fmt::Display) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::Export,
        format!("{} cannot represent this value: {}", format, e),
    )
}

/// Serialize an expression nested at most `max_depth` levels deep
pub fn export(expr: &Expr, format: ExportFormat, max_depth: usize) -> Result<String, Diagnostic> {
    validate(expr, &mut Vec::new(), max_depth)?;
    let doc = Exportable(expr);
    match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(&doc).map_err(|e| serializer_error(format, e))
        }
        ExportFormat::Yaml => serde_yaml::to_string(&doc).map_err(|e| serializer_error(format, e)),
        ExportFormat::Toml => {
            toml::to_string_pretty(&doc).map_err(|e| serializer_error(format, e))
        }
    }
}

/// Convert an expression into any type deserializable from its JSON form
pub fn convert<T: DeserializeOwned>(expr: &Expr, max_depth: usize) -> Result<T, Diagnostic> {
    validate(expr, &mut Vec::new(), max_depth)?;
    let json = serde_json::to_value(Exportable(expr))
        .map_err(|e| serializer_error(ExportFormat::Json, e))?;
    serde_json::from_value(json).map_err(|e| {
        Diagnostic::new(
            DiagnosticKind::Export,
            format!(
                "cannot convert the value into `{}`: {}",
                std::any::type_name::<T>(),
                e
            ),
        )
    })
}
