//! The `std` record
//!
//! Builtins are curried like ordinary functions: applying one to fewer
//! arguments than its arity yields a partial application.

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::eval::{EvalResult, Evaluator};
use crate::number::Number;
use crate::source::{SourceFile, Span};
use crate::value::{Field, Function, Pending, RecordData, Thunk, Whnf};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Trace,
    Seq,
    DeepSeq,
    FailWith,
    ToString,
    ArrayLength,
    ArrayMap,
    StringLength,
    RecordFields,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Trace => "std.trace",
            Builtin::Seq => "std.seq",
            Builtin::DeepSeq => "std.deep_seq",
            Builtin::FailWith => "std.fail_with",
            Builtin::ToString => "std.to_string",
            Builtin::ArrayLength => "std.array.length",
            Builtin::ArrayMap => "std.array.map",
            Builtin::StringLength => "std.string.length",
            Builtin::RecordFields => "std.record.fields",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Trace | Builtin::Seq | Builtin::DeepSeq | Builtin::ArrayMap => 2,
            Builtin::FailWith
            | Builtin::ToString
            | Builtin::ArrayLength
            | Builtin::StringLength
            | Builtin::RecordFields => 1,
        }
    }
}

fn builtin(b: Builtin) -> Thunk {
    Thunk::ready(Whnf::Function(Function::Builtin {
        builtin: b,
        args: Vec::new(),
    }))
}

fn record(entries: Vec<(&str, Thunk)>) -> Whnf {
    let fields: IndexMap<String, Field> = entries
        .into_iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Field {
                    value: Some(value),
                    not_exported: false,
                    doc: None,
                },
            )
        })
        .collect();
    Whnf::Record(Arc::new(RecordData { fields }))
}

/// The value bound to `std` in every program
pub fn std_record() -> Whnf {
    record(vec![
        ("trace", builtin(Builtin::Trace)),
        ("seq", builtin(Builtin::Seq)),
        ("deep_seq", builtin(Builtin::DeepSeq)),
        ("fail_with", builtin(Builtin::FailWith)),
        ("to_string", builtin(Builtin::ToString)),
        (
            "array",
            Thunk::ready(record(vec![
                ("length", builtin(Builtin::ArrayLength)),
                ("map", builtin(Builtin::ArrayMap)),
            ])),
        ),
        (
            "string",
            Thunk::ready(record(vec![("length", builtin(Builtin::StringLength))])),
        ),
        (
            "record",
            Thunk::ready(record(vec![("fields", builtin(Builtin::RecordFields))])),
        ),
    ])
}

fn arg_error(
    builtin: Builtin,
    expected: &str,
    got: &Whnf,
    span: Span,
    source: Option<&Arc<SourceFile>>,
) -> Diagnostic {
    let diag = Diagnostic::new(
        DiagnosticKind::Eval,
        format!(
            "{} expects a {} argument, got {}",
            builtin.name(),
            expected,
            got.type_name()
        ),
    );
    match source {
        Some(source) => diag.with_primary(source, span, "in this call"),
        None => diag,
    }
}

pub(crate) fn call(
    ev: &mut Evaluator,
    builtin: Builtin,
    args: &[Thunk],
    span: Span,
    source: Option<&Arc<SourceFile>>,
) -> EvalResult<Whnf> {
    match builtin {
        Builtin::Trace => {
            let message = match ev.force(&args[0])? {
                Whnf::Str(s) => s,
                other => return Err(arg_error(builtin, "String", &other, span, source)),
            };
            ev.emit_trace(&message);
            ev.force(&args[1])
        }
        Builtin::Seq => {
            ev.force(&args[0])?;
            ev.force(&args[1])
        }
        Builtin::DeepSeq => {
            ev.deep_force(&args[0])?;
            ev.force(&args[1])
        }
        Builtin::FailWith => {
            let message = match ev.force(&args[0])? {
                Whnf::Str(s) => s.to_string(),
                other => return Err(arg_error(builtin, "String", &other, span, source)),
            };
            let diag = Diagnostic::new(DiagnosticKind::Eval, message);
            Err(match source {
                Some(source) => diag.with_primary(source, span, "failed here"),
                None => diag,
            })
        }
        Builtin::ToString => {
            let value = ev.force(&args[0])?;
            let text = match &value {
                Whnf::Null => "null".to_string(),
                Whnf::Bool(b) => b.to_string(),
                Whnf::Number(n) => n.to_string(),
                Whnf::Str(s) => s.to_string(),
                Whnf::EnumTag(tag) => tag.as_str().to_string(),
                other => {
                    return Err(arg_error(builtin, "primitive", other, span, source));
                }
            };
            Ok(Whnf::string(text))
        }
        Builtin::ArrayLength => match ev.force(&args[0])? {
            Whnf::Array(items) => Ok(Whnf::Number(Number::from_i64(items.len() as i64))),
            other => Err(arg_error(builtin, "Array", &other, span, source)),
        },
        Builtin::ArrayMap => match ev.force(&args[1])? {
            Whnf::Array(items) => {
                let mapped = items
                    .iter()
                    .map(|item| {
                        Thunk::suspended(Pending::Apply {
                            func: args[0].clone(),
                            arg: item.clone(),
                            span,
                        })
                    })
                    .collect();
                Ok(Whnf::Array(Arc::new(mapped)))
            }
            other => Err(arg_error(builtin, "Array", &other, span, source)),
        },
        Builtin::StringLength => match ev.force(&args[0])? {
            Whnf::Str(s) => Ok(Whnf::Number(Number::from_i64(s.chars().count() as i64))),
            other => Err(arg_error(builtin, "String", &other, span, source)),
        },
        Builtin::RecordFields => match ev.force(&args[0])? {
            Whnf::Record(record) => Ok(Whnf::Array(Arc::new(
                record
                    .fields
                    .keys()
                    .map(|name| Thunk::ready(Whnf::string(name.as_str())))
                    .collect(),
            ))),
            other => Err(arg_error(builtin, "Record", &other, span, source)),
        },
    }
}
