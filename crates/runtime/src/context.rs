//! Evaluation context
//!
//! A `Context` owns the evaluator, its trace sink and the configuration for
//! diagnostics and export filtering. Every entry point comes in two forms:
//! one returning a fresh `Expr`/`String`, and an `_into` form that
//! overwrites a caller-owned handle or buffer.
//!
//! A context is single-threaded: it may be moved between threads but must
//! not be driven from two at once. Distinct contexts are independent.

use crate::buffer::StringBuffer;
use crate::error::Error;
use crate::export::{self, ExportFormat};
use crate::expr::{self, DeepMode, Expr, NotExportedScope, Value};
use knot_core::{DEFAULT_MAX_DEPTH, Evaluator, SourceFile, Thunk, WriteSink};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_SOURCE_NAME: &str = "<input>";

/// Context settings, loadable from TOML:
///
/// ```toml
/// source_name = "service.knot"
/// not_exported_scope = "record-nesting"
/// max_depth = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Label for the program in diagnostics
    pub source_name: Option<String>,
    pub not_exported_scope: NotExportedScope,
    /// Nested forces and calls allowed before evaluation fails
    pub max_depth: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            source_name: None,
            not_exported_scope: NotExportedScope::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ContextConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| format!("Failed to parse context config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        if self.source_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("source_name must not be empty".to_string());
        }
        Ok(())
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_not_exported_scope(mut self, scope: NotExportedScope) -> Self {
        self.not_exported_scope = scope;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

pub struct Context {
    evaluator: Evaluator,
    config: ContextConfig,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    /// No trace sink, no source name
    pub fn new() -> Self {
        Context::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Context {
            evaluator: Evaluator::new().with_max_depth(config.max_depth),
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Route `std.trace` output to `sink`, replacing any previous sink
    pub fn set_trace_sink(&mut self, sink: impl WriteSink + Send + 'static) {
        self.evaluator.set_trace_sink(Some(Box::new(sink)));
    }

    /// Discard trace output from now on
    pub fn clear_trace_sink(&mut self) {
        self.evaluator.set_trace_sink(None);
    }

    pub fn set_source_name(&mut self, name: &str) {
        self.config.source_name = Some(name.to_string());
    }

    pub fn set_not_exported_scope(&mut self, scope: NotExportedScope) {
        self.config.not_exported_scope = scope;
    }

    /// Suspended computations run so far by this context
    pub fn forced_count(&self) -> u64 {
        self.evaluator.forced_count()
    }

    fn source(&self, src: &str) -> Arc<SourceFile> {
        let name = self
            .config
            .source_name
            .as_deref()
            .unwrap_or(DEFAULT_SOURCE_NAME);
        SourceFile::new(name, src)
    }

    fn load(&mut self, src: &str) -> Result<Thunk, Error> {
        let source = self.source(src);
        self.evaluator.eval_source(&source).map_err(Error::from)
    }

    fn finish<T>(&self, op: &'static str, result: Result<T, Error>) -> Result<T, Error> {
        match &result {
            Ok(_) => tracing::debug!(op, "ok"),
            Err(e) => tracing::debug!(op, kind = %e.kind(), message = e.message(), "failed"),
        }
        result
    }

    /// Evaluate completely: every field, element and payload is forced
    pub fn eval_deep(&mut self, src: &str) -> Result<Expr, Error> {
        let mut out = Expr::new();
        self.eval_deep_into(src, &mut out)?;
        Ok(out)
    }

    pub fn eval_deep_into(&mut self, src: &str, out: &mut Expr) -> Result<(), Error> {
        self.eval_deep_with(src, out, DeepMode::All, "eval_deep")
    }

    /// Like `eval_deep`, without the fields marked `not_exported`
    pub fn eval_deep_for_export(&mut self, src: &str) -> Result<Expr, Error> {
        let mut out = Expr::new();
        self.eval_deep_for_export_into(src, &mut out)?;
        Ok(out)
    }

    pub fn eval_deep_for_export_into(&mut self, src: &str, out: &mut Expr) -> Result<(), Error> {
        let mode = DeepMode::Export(self.config.not_exported_scope);
        self.eval_deep_with(src, out, mode, "eval_deep_for_export")
    }

    fn eval_deep_with(
        &mut self,
        src: &str,
        out: &mut Expr,
        mode: DeepMode,
        op: &'static str,
    ) -> Result<(), Error> {
        let _span = tracing::debug_span!("knot", op).entered();
        let result = self.load(src).and_then(|thunk| {
            expr::deep_value(&mut self.evaluator, &thunk, mode).map_err(Error::from)
        });
        let value = self.finish(op, result)?;
        out.set(value);
        Ok(())
    }

    /// Evaluate to weak head normal form; children stay lazy
    pub fn eval_shallow(&mut self, src: &str) -> Result<Expr, Error> {
        let mut out = Expr::new();
        self.eval_shallow_into(src, &mut out)?;
        Ok(out)
    }

    pub fn eval_shallow_into(&mut self, src: &str, out: &mut Expr) -> Result<(), Error> {
        let _span = tracing::debug_span!("knot", op = "eval_shallow").entered();
        let result = self.load(src).and_then(|thunk| self.whnf_value(&thunk));
        let value = self.finish("eval_shallow", result)?;
        out.set(value);
        Ok(())
    }

    fn whnf_value(&mut self, thunk: &Thunk) -> Result<Value, Error> {
        let whnf = self.evaluator.force(thunk)?;
        Ok(expr::shallow_value(whnf)?)
    }

    /// Force an unevaluated handle one step, in place
    ///
    /// A handle that is already a value is left untouched and the evaluator
    /// is not consulted.
    pub fn force_shallow(&mut self, expr: &mut Expr) -> Result<(), Error> {
        let Value::Unevaluated(thunk) = expr.value() else {
            return Ok(());
        };
        let thunk = thunk.clone();
        let _span = tracing::debug_span!("knot", op = "force_shallow").entered();
        let result = self.whnf_value(&thunk);
        let value = self.finish("force_shallow", result)?;
        expr.set(value);
        Ok(())
    }

    /// Force `expr` one step, writing the result to `out`
    pub fn force_shallow_into(&mut self, expr: &Expr, out: &mut Expr) -> Result<(), Error> {
        let value = match expr.value() {
            Value::Unevaluated(thunk) => {
                let thunk = thunk.clone();
                let _span = tracing::debug_span!("knot", op = "force_shallow").entered();
                let result = self.whnf_value(&thunk);
                self.finish("force_shallow", result)?
            }
            value => value.clone(),
        };
        out.set(value);
        Ok(())
    }

    /// Evaluate the rest of a handle obtained through shallow evaluation
    pub fn force_deep(&mut self, expr: &Expr) -> Result<Expr, Error> {
        let _span = tracing::debug_span!("knot", op = "force_deep").entered();
        let result =
            expr::complete_value(&mut self.evaluator, expr.value()).map_err(Error::from);
        let value = self.finish("force_deep", result)?;
        Ok(Expr::from_value(value))
    }

    pub fn export(&self, expr: &Expr, format: ExportFormat) -> Result<String, Error> {
        let result = export::export(expr, format, self.config.max_depth).map_err(Error::from);
        self.finish("export", result)
    }

    pub fn to_json(&self, expr: &Expr) -> Result<String, Error> {
        self.export(expr, ExportFormat::Json)
    }

    pub fn to_yaml(&self, expr: &Expr) -> Result<String, Error> {
        self.export(expr, ExportFormat::Yaml)
    }

    pub fn to_toml(&self, expr: &Expr) -> Result<String, Error> {
        self.export(expr, ExportFormat::Toml)
    }

    /// Serialize into a reusable buffer, replacing its contents
    pub fn export_into(
        &self,
        expr: &Expr,
        format: ExportFormat,
        out: &mut StringBuffer,
    ) -> Result<(), Error> {
        let text = self.export(expr, format)?;
        out.set(text);
        Ok(())
    }

    /// Convert a deeply evaluated expression into a Rust value
    ///
    /// The value goes through the same mapping as JSON export, so any
    /// `Deserialize` type accepting that JSON works.
    pub fn convert_to<T: DeserializeOwned>(&self, expr: &Expr) -> Result<T, Error> {
        let result = export::convert(expr, self.config.max_depth).map_err(Error::from);
        self.finish("convert_to", result)
    }
}
