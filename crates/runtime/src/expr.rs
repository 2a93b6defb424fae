//! Expression handles and borrowed views
//!
//! An `Expr` is a reusable cell holding one `Value`. Evaluation entry points
//! overwrite it in place; every overwrite bumps its generation, which is how
//! the C boundary notices stale views. In Rust the borrow checker does the
//! same job: `RecordView`, `ArrayView` and `NumberView` borrow the `Expr`
//! they came from and cannot outlive an overwrite.

use crate::buffer::StringBuffer;
use indexmap::IndexMap;
use knot_core::{Diagnostic, DiagnosticKind, Evaluator, Number, Symbol, Thunk, Whnf};

/// How not-exported fields are filtered by exporting evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotExportedScope {
    /// Every record in the result is filtered
    #[default]
    Everywhere,
    /// Only records reached through record fields are filtered; records
    /// inside arrays or enum payloads keep their not-exported fields
    RecordNesting,
}

/// Record entries in enumeration order; `None` marks a field without a value
pub type RecordEntries = IndexMap<String, Option<Expr>>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    EnumTag(Symbol),
    EnumVariant(Symbol, Box<Expr>),
    Record(RecordEntries),
    Array(Vec<Expr>),
    /// Not yet forced; see `Context::force_shallow`
    Unevaluated(Thunk),
}

#[derive(Debug, Clone, Default)]
pub struct Expr {
    value: Value,
    generation: u64,
}

impl Expr {
    pub fn new() -> Self {
        Expr::default()
    }

    pub fn from_value(value: Value) -> Self {
        Expr {
            value,
            generation: 0,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Replace the contents, invalidating every view of the old contents
    pub fn set(&mut self, value: Value) {
        self.value = value;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Bumped on every `set`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.value, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value, Value::Number(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self.value, Value::Str(_))
    }

    pub fn is_enum_tag(&self) -> bool {
        matches!(self.value, Value::EnumTag(_))
    }

    pub fn is_enum_variant(&self) -> bool {
        matches!(self.value, Value::EnumVariant(..))
    }

    pub fn is_record(&self) -> bool {
        matches!(self.value, Value::Record(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.value, Value::Array(_))
    }

    /// Whether the outermost constructor is known
    pub fn is_value(&self) -> bool {
        !matches!(self.value, Value::Unevaluated(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interned; the returned string lives until process exit
    pub fn as_enum_tag(&self) -> Option<&'static str> {
        match self.value {
            Value::EnumTag(tag) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn as_enum_variant(&self) -> Option<(&'static str, &Expr)> {
        match &self.value {
            Value::EnumVariant(tag, payload) => Some((tag.as_str(), payload)),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<NumberView<'_>> {
        match &self.value {
            Value::Number(n) => Some(NumberView { number: n }),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<RecordView<'_>> {
        match &self.value {
            Value::Record(entries) => Some(RecordView { entries }),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayView<'_>> {
        match &self.value {
            Value::Array(items) => Some(ArrayView { items }),
            _ => None,
        }
    }

    /// Whether any sub-expression is still unforced
    pub fn has_unevaluated(&self) -> bool {
        match &self.value {
            Value::Unevaluated(_) => true,
            Value::EnumVariant(_, payload) => payload.has_unevaluated(),
            Value::Record(entries) => entries
                .values()
                .any(|v| v.as_ref().is_some_and(Expr::has_unevaluated)),
            Value::Array(items) => items.iter().any(Expr::has_unevaluated),
            _ => false,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::from_value(value)
    }
}

/// Read-only view of a number inside an `Expr`
#[derive(Debug, Clone, Copy)]
pub struct NumberView<'a> {
    number: &'a Number,
}

impl<'a> NumberView<'a> {
    pub(crate) fn new(number: &'a Number) -> Self {
        NumberView { number }
    }

    /// Integer representable as `i64`
    pub fn is_i64(&self) -> bool {
        self.number.to_i64().is_some()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.number.to_i64()
    }

    /// Nearest `f64`
    pub fn as_f64(&self) -> f64 {
        self.number.to_f64()
    }

    pub fn numerator(&self) -> String {
        self.number.numerator()
    }

    pub fn denominator(&self) -> String {
        self.number.denominator()
    }

    /// Write the exact value as base-10 numerator and denominator
    pub fn write_rational(&self, numerator: &mut StringBuffer, denominator: &mut StringBuffer) {
        numerator.set(self.number.numerator());
        denominator.set(self.number.denominator());
    }

    pub fn number(&self) -> &'a Number {
        self.number
    }
}

/// Read-only view of a record inside an `Expr`
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    entries: &'a RecordEntries,
}

impl<'a> RecordView<'a> {
    pub(crate) fn new(entries: &'a RecordEntries) -> Self {
        RecordView { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key and (possibly absent) value at `index`
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn entry(&self, index: usize) -> (&'a str, Option<&'a Expr>) {
        match self.entries.get_index(index) {
            Some((key, value)) => (key.as_str(), value.as_ref()),
            None => panic!(
                "record index {} out of bounds (record has {} fields)",
                index,
                self.entries.len()
            ),
        }
    }

    /// The value of a field, if the field exists and has one
    pub fn get(&self, name: &str) -> Option<&'a Expr> {
        self.entries.get(name).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a Expr>)> + 'a {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

/// Read-only view of an array inside an `Expr`
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a> {
    items: &'a [Expr],
}

impl<'a> ArrayView<'a> {
    pub(crate) fn new(items: &'a [Expr]) -> Self {
        ArrayView { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> &'a Expr {
        match self.items.get(index) {
            Some(item) => item,
            None => panic!(
                "array index {} out of bounds (array has {} elements)",
                index,
                self.items.len()
            ),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Expr> {
        self.items.iter()
    }
}

fn function_error() -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Eval, "functions cannot be exposed")
        .with_note("apply the function inside the program and expose its result")
}

/// A forced child is exposed as a value only when it is a scalar
fn shallow_child(thunk: &Thunk) -> Expr {
    let value = match thunk.peek() {
        Some(Whnf::Null) => Value::Null,
        Some(Whnf::Bool(b)) => Value::Bool(b),
        Some(Whnf::Number(n)) => Value::Number(n),
        Some(Whnf::Str(s)) => Value::Str(s.to_string()),
        Some(Whnf::EnumTag(tag)) => Value::EnumTag(tag),
        _ => Value::Unevaluated(thunk.clone()),
    };
    Expr::from_value(value)
}

/// Convert a value in weak head normal form, leaving children lazy
pub(crate) fn shallow_value(whnf: Whnf) -> Result<Value, Diagnostic> {
    Ok(match whnf {
        Whnf::Null => Value::Null,
        Whnf::Bool(b) => Value::Bool(b),
        Whnf::Number(n) => Value::Number(n),
        Whnf::Str(s) => Value::Str(s.to_string()),
        Whnf::EnumTag(tag) => Value::EnumTag(tag),
        Whnf::EnumVariant(tag, payload) => {
            Value::EnumVariant(tag, Box::new(shallow_child(&payload)))
        }
        Whnf::Record(record) => Value::Record(
            record
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), field.value.as_ref().map(shallow_child)))
                .collect(),
        ),
        Whnf::Array(items) => Value::Array(items.iter().map(shallow_child).collect()),
        Whnf::Function(_) => return Err(function_error()),
    })
}

/// How deep conversion treats not-exported fields
#[derive(Debug, Clone, Copy)]
pub(crate) enum DeepMode {
    /// Keep everything, including fields without a value
    All,
    /// Drop not-exported fields and require every remaining field to have
    /// a value
    Export(NotExportedScope),
}

/// Force a thunk completely and convert the result
pub(crate) fn deep_value(
    ev: &mut Evaluator,
    thunk: &Thunk,
    mode: DeepMode,
) -> Result<Value, Diagnostic> {
    deep_value_at(ev, thunk, mode, true)
}

fn deep_value_at(
    ev: &mut Evaluator,
    thunk: &Thunk,
    mode: DeepMode,
    filter: bool,
) -> Result<Value, Diagnostic> {
    // Children that are not record fields stop filtering under
    // `RecordNesting`.
    let nested_filter = match mode {
        DeepMode::Export(NotExportedScope::Everywhere) => filter,
        _ => false,
    };

    let whnf = ev.force(thunk)?;
    ev.enter(|ev| deep_children(ev, whnf, mode, filter, nested_filter))
}

fn deep_children(
    ev: &mut Evaluator,
    whnf: Whnf,
    mode: DeepMode,
    filter: bool,
    nested_filter: bool,
) -> Result<Value, Diagnostic> {
    Ok(match whnf {
        Whnf::Null => Value::Null,
        Whnf::Bool(b) => Value::Bool(b),
        Whnf::Number(n) => Value::Number(n),
        Whnf::Str(s) => Value::Str(s.to_string()),
        Whnf::EnumTag(tag) => Value::EnumTag(tag),
        Whnf::EnumVariant(tag, payload) => Value::EnumVariant(
            tag,
            Box::new(Expr::from_value(deep_value_at(
                ev,
                &payload,
                mode,
                nested_filter,
            )?)),
        ),
        Whnf::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| deep_value_at(ev, item, mode, nested_filter).map(Expr::from_value))
                .collect::<Result<_, _>>()?,
        ),
        Whnf::Record(record) => {
            let exporting = matches!(mode, DeepMode::Export(_));
            let mut entries = RecordEntries::with_capacity(record.len());
            for (name, field) in &record.fields {
                if exporting && filter && field.not_exported {
                    continue;
                }
                let value = match &field.value {
                    Some(thunk) => Some(Expr::from_value(deep_value_at(ev, thunk, mode, filter)?)),
                    None if exporting => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::MissingDefinition,
                            format!("missing definition for `{}`", name),
                        )
                        .with_note("exported fields must have a value"));
                    }
                    None => None,
                };
                entries.insert(name.clone(), value);
            }
            Value::Record(entries)
        }
        Whnf::Function(_) => return Err(function_error()),
    })
}

/// Finish a partially evaluated handle: every unevaluated child is forced
/// completely, already evaluated parts are copied
pub(crate) fn complete_value(ev: &mut Evaluator, value: &Value) -> Result<Value, Diagnostic> {
    match value {
        Value::Unevaluated(thunk) => deep_value(ev, thunk, DeepMode::All),
        _ => ev.enter(|ev| complete_children(ev, value)),
    }
}

fn complete_children(ev: &mut Evaluator, value: &Value) -> Result<Value, Diagnostic> {
    Ok(match value {
        Value::Unevaluated(thunk) => deep_value(ev, thunk, DeepMode::All)?,
        Value::EnumVariant(tag, payload) => Value::EnumVariant(
            *tag,
            Box::new(Expr::from_value(complete_value(ev, payload.value())?)),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| complete_value(ev, item.value()).map(Expr::from_value))
                .collect::<Result<_, _>>()?,
        ),
        Value::Record(entries) => {
            let mut out = RecordEntries::with_capacity(entries.len());
            for (name, field) in entries {
                let field = match field {
                    Some(expr) => Some(Expr::from_value(complete_value(ev, expr.value())?)),
                    None => None,
                };
                out.insert(name.clone(), field);
            }
            Value::Record(out)
        }
        scalar => scalar.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(n: i64) -> Expr {
        Expr::from_value(Value::Number(Number::from_i64(n)))
    }

    #[test]
    fn test_default_is_null() {
        let expr = Expr::new();
        assert!(expr.is_null());
        assert!(expr.is_value());
        assert_eq!(expr.generation(), 0);
    }

    #[test]
    fn test_set_bumps_generation() {
        let mut expr = Expr::new();
        expr.set(Value::Bool(true));
        expr.set(Value::Str("x".into()));
        assert_eq!(expr.generation(), 2);
        assert_eq!(expr.as_str(), Some("x"));
        assert_eq!(expr.as_bool(), None);
    }

    #[test]
    fn test_record_view() {
        let mut entries = RecordEntries::new();
        entries.insert("b".into(), Some(number(1)));
        entries.insert("a".into(), None);
        let expr = Expr::from_value(Value::Record(entries));
        let rec = expr.as_record().unwrap();
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.entry(0).0, "b");
        assert!(rec.entry(1).1.is_none());
        assert!(rec.get("a").is_none());
        assert!(rec.contains_key("a"));
        assert_eq!(rec.get("b").unwrap().as_number().unwrap().as_i64(), Some(1));
    }

    #[test]
    #[should_panic(expected = "array index 3 out of bounds")]
    fn test_array_index_out_of_bounds() {
        let expr = Expr::from_value(Value::Array(vec![number(1)]));
        expr.as_array().unwrap().get(3);
    }

    #[test]
    fn test_number_view_rational() {
        let third = Number::from_i64(1)
            .checked_div(&Number::from_i64(3))
            .unwrap();
        let expr = Expr::from_value(Value::Number(third));
        let view = expr.as_number().unwrap();
        let mut num = StringBuffer::new();
        let mut den = StringBuffer::new();
        view.write_rational(&mut num, &mut den);
        assert_eq!(num.as_str(), "1");
        assert_eq!(den.as_str(), "3");
        assert!(!view.is_i64());
        assert_eq!(view.as_f64(), 1.0 / 3.0);
    }

    #[test]
    fn test_has_unevaluated() {
        let lazy = Expr::from_value(Value::Unevaluated(Thunk::ready(Whnf::Null)));
        let arr = Expr::from_value(Value::Array(vec![number(1), lazy]));
        assert!(arr.has_unevaluated());
        assert!(!number(1).has_unevaluated());
    }
}
