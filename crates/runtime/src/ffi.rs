//! C ABI
//!
//! Every handle is an opaque heap pointer created by a `*_alloc` function
//! and released by the matching `*_free`. Fallible functions return
//! `KNOT_RESULT_OK`/`KNOT_RESULT_ERR` and, on failure, overwrite the error
//! handle when one is supplied. Output handles are only written on success.
//!
//! Caller contract violations (tag-mismatched accessors, out-of-bounds
//! indices, NULL where a handle is required, stale views) panic. A panic
//! cannot unwind out of an `extern "C"` function, so the process aborts.

#![allow(non_camel_case_types)]

use crate::buffer::StringBuffer;
use crate::context::Context;
use crate::error::{Error, ErrorFormat, ErrorSlot};
use crate::export::ExportFormat;
use crate::expr::{ArrayView, Expr, NumberView, RecordEntries, RecordView, Value};
use crate::views::{self, ViewKind};
use knot_core::{DiagnosticKind, Number, WriteSink};
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;

pub type knot_context = Context;
pub type knot_expr = Expr;
pub type knot_record = RecordEntries;
pub type knot_array = Vec<Expr>;
pub type knot_number = Number;
pub type knot_string = StringBuffer;
pub type knot_error = ErrorSlot;

/// Consumes a prefix of `buf` and returns how many bytes it took
pub type knot_write_callback =
    Option<unsafe extern "C" fn(user_data: *mut c_void, buf: *const u8, len: usize) -> usize>;

/// Marks the end of a message delivered through a write callback
pub type knot_flush_callback = Option<unsafe extern "C" fn(user_data: *const c_void)>;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum knot_result {
    KNOT_RESULT_OK = 0,
    KNOT_RESULT_ERR = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum knot_error_format {
    KNOT_ERROR_FORMAT_TEXT = 0,
    KNOT_ERROR_FORMAT_ANSI_TEXT = 1,
    KNOT_ERROR_FORMAT_JSON = 2,
    KNOT_ERROR_FORMAT_YAML = 3,
    KNOT_ERROR_FORMAT_TOML = 4,
}

impl From<knot_error_format> for ErrorFormat {
    fn from(format: knot_error_format) -> Self {
        match format {
            knot_error_format::KNOT_ERROR_FORMAT_TEXT => ErrorFormat::Text,
            knot_error_format::KNOT_ERROR_FORMAT_ANSI_TEXT => ErrorFormat::AnsiText,
            knot_error_format::KNOT_ERROR_FORMAT_JSON => ErrorFormat::Json,
            knot_error_format::KNOT_ERROR_FORMAT_YAML => ErrorFormat::Yaml,
            knot_error_format::KNOT_ERROR_FORMAT_TOML => ErrorFormat::Toml,
        }
    }
}

/// A write/flush callback pair driven through `WriteSink`
struct CallbackSink {
    write: unsafe extern "C" fn(*mut c_void, *const u8, usize) -> usize,
    flush: knot_flush_callback,
    user_data: *mut c_void,
}

// The callbacks are only ever invoked from the thread driving the context
// that owns this sink.
unsafe impl Send for CallbackSink {}

impl WriteSink for CallbackSink {
    fn write(&mut self, buf: &[u8]) -> usize {
        unsafe { (self.write)(self.user_data, buf.as_ptr(), buf.len()) }
    }

    fn flush(&mut self) {
        if let Some(flush) = self.flush {
            unsafe { flush(self.user_data) }
        }
    }
}

unsafe fn deref<'a, T>(ptr: *const T, what: &str) -> &'a T {
    match unsafe { ptr.as_ref() } {
        Some(r) => r,
        None => panic!("{}: unexpected NULL pointer", what),
    }
}

unsafe fn deref_mut<'a, T>(ptr: *mut T, what: &str) -> &'a mut T {
    match unsafe { ptr.as_mut() } {
        Some(r) => r,
        None => panic!("{}: unexpected NULL pointer", what),
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, Error> {
    if ptr.is_null() {
        panic!("{}: unexpected NULL string", what);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| Error::new(DiagnosticKind::Usage, format!("{}: input is not UTF-8: {}", what, e)))
}

/// Store the error (if the caller asked for it) and translate to a code
unsafe fn finish(result: Result<(), Error>, out_err: *mut knot_error) -> knot_result {
    match result {
        Ok(()) => knot_result::KNOT_RESULT_OK,
        Err(e) => {
            if let Some(slot) = unsafe { out_err.as_mut() } {
                slot.set(e);
            }
            knot_result::KNOT_RESULT_ERR
        }
    }
}

/// Write a value into a caller-owned handle, dropping its old views
fn overwrite(out: &mut Expr, value: Value) {
    views::invalidate_owner(out as *mut Expr as usize);
    out.set(value);
}

fn as_bool_flag(b: bool) -> c_int {
    c_int::from(b)
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Allocate a context with no trace callback and no source name
#[unsafe(no_mangle)]
pub extern "C" fn knot_context_alloc() -> *mut knot_context {
    Box::into_raw(Box::new(Context::new()))
}

/// # Safety
/// `ctx` must come from `knot_context_alloc` and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_free(ctx: *mut knot_context) {
    if !ctx.is_null() {
        unsafe { drop(Box::from_raw(ctx)) };
    }
}

/// Install the callbacks receiving `std.trace` output
///
/// A NULL `write` removes the current callback.
///
/// # Safety
/// `ctx` must be a live context; `user_data` must stay valid for as long as
/// the callback is installed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_set_trace_callback(
    ctx: *mut knot_context,
    write: knot_write_callback,
    flush: knot_flush_callback,
    user_data: *mut c_void,
) {
    unsafe {
        let ctx = deref_mut(ctx, "knot_context_set_trace_callback");
        match write {
            Some(write) => ctx.set_trace_sink(CallbackSink {
                write,
                flush,
                user_data,
            }),
            None => ctx.clear_trace_sink(),
        }
    }
}

/// Name the program in later diagnostics; `name` is copied
///
/// A name that is not UTF-8 is ignored and the previous name stays.
///
/// # Safety
/// `ctx` must be a live context and `name` a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_set_source_name(ctx: *mut knot_context, name: *const c_char) {
    unsafe {
        let what = "knot_context_set_source_name";
        let ctx = deref_mut(ctx, what);
        match c_str(name, what) {
            Ok(name) => ctx.set_source_name(name),
            Err(e) => tracing::warn!(error = %e, "source name not changed"),
        }
    }
}

unsafe fn eval_with(
    ctx: *mut knot_context,
    src: *const c_char,
    out_expr: *mut knot_expr,
    out_err: *mut knot_error,
    what: &str,
    eval: impl FnOnce(&mut Context, &str, &mut Expr) -> Result<(), Error>,
) -> knot_result {
    unsafe {
        let ctx = deref_mut(ctx, what);
        let result = c_str(src, what).and_then(|src| {
            let mut result = Expr::new();
            eval(ctx, src, &mut result)?;
            if let Some(out) = out_expr.as_mut() {
                overwrite(out, result.into_value());
            }
            Ok(())
        });
        finish(result, out_err)
    }
}

/// Evaluate `src` completely
///
/// # Safety
/// `ctx` must be live, `src` NUL-terminated UTF-8, `out_expr` NULL or from
/// `knot_expr_alloc`, `out_err` NULL or from `knot_error_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_eval_deep(
    ctx: *mut knot_context,
    src: *const c_char,
    out_expr: *mut knot_expr,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        eval_with(ctx, src, out_expr, out_err, "knot_context_eval_deep", |c, s, e| {
            c.eval_deep_into(s, e)
        })
    }
}

/// Evaluate `src` completely, omitting `not_exported` fields
///
/// # Safety
/// Same as `knot_context_eval_deep`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_eval_deep_for_export(
    ctx: *mut knot_context,
    src: *const c_char,
    out_expr: *mut knot_expr,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        eval_with(
            ctx,
            src,
            out_expr,
            out_err,
            "knot_context_eval_deep_for_export",
            |c, s, e| c.eval_deep_for_export_into(s, e),
        )
    }
}

/// Evaluate `src` to weak head normal form
///
/// # Safety
/// Same as `knot_context_eval_deep`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_eval_shallow(
    ctx: *mut knot_context,
    src: *const c_char,
    out_expr: *mut knot_expr,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        eval_with(ctx, src, out_expr, out_err, "knot_context_eval_shallow", |c, s, e| {
            c.eval_shallow_into(s, e)
        })
    }
}

/// Force `expr` one step and write the result to `out_expr`
///
/// `expr` and `out_expr` may be the same handle. Already evaluated
/// expressions are copied (or, in place, left alone) without evaluating.
///
/// # Safety
/// `ctx` must be live; `expr` and `out_expr` must come from
/// `knot_expr_alloc`; `out_err` NULL or from `knot_error_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_eval_expr_shallow(
    ctx: *mut knot_context,
    expr: *const knot_expr,
    out_expr: *mut knot_expr,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        let what = "knot_context_eval_expr_shallow";
        let ctx = deref_mut(ctx, what);
        let out = deref_mut(out_expr, what);
        let result = if ptr::eq(expr, out_expr) {
            if out.is_value() {
                Ok(())
            } else {
                let mut forced = out.clone();
                ctx.force_shallow(&mut forced)
                    .map(|()| overwrite(out, forced.into_value()))
            }
        } else {
            let expr = deref(expr, what);
            let mut forced = Expr::new();
            ctx.force_shallow_into(expr, &mut forced)
                .map(|()| overwrite(out, forced.into_value()))
        };
        finish(result, out_err)
    }
}

unsafe fn export_with(
    ctx: *mut knot_context,
    expr: *const knot_expr,
    out_string: *mut knot_string,
    out_err: *mut knot_error,
    format: ExportFormat,
    what: &str,
) -> knot_result {
    unsafe {
        let ctx = deref(ctx, what);
        let expr = deref(expr, what);
        let out = deref_mut(out_string, what);
        finish(ctx.export_into(expr, format, out), out_err)
    }
}

/// Serialize a fully evaluated expression as JSON
///
/// # Safety
/// All handles must be live; `out_err` may be NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_expr_to_json(
    ctx: *mut knot_context,
    expr: *const knot_expr,
    out_string: *mut knot_string,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        export_with(ctx, expr, out_string, out_err, ExportFormat::Json, "knot_context_expr_to_json")
    }
}

/// Serialize a fully evaluated expression as YAML
///
/// # Safety
/// All handles must be live; `out_err` may be NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_expr_to_yaml(
    ctx: *mut knot_context,
    expr: *const knot_expr,
    out_string: *mut knot_string,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        export_with(ctx, expr, out_string, out_err, ExportFormat::Yaml, "knot_context_expr_to_yaml")
    }
}

/// Serialize a fully evaluated expression as TOML
///
/// # Safety
/// All handles must be live; `out_err` may be NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_context_expr_to_toml(
    ctx: *mut knot_context,
    expr: *const knot_expr,
    out_string: *mut knot_string,
    out_err: *mut knot_error,
) -> knot_result {
    unsafe {
        export_with(ctx, expr, out_string, out_err, ExportFormat::Toml, "knot_context_expr_to_toml")
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Allocate an expression handle holding `null`
#[unsafe(no_mangle)]
pub extern "C" fn knot_expr_alloc() -> *mut knot_expr {
    Box::into_raw(Box::new(Expr::new()))
}

/// Free an expression handle, invalidating every view taken from it
///
/// # Safety
/// `expr` must come from `knot_expr_alloc` and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_free(expr: *mut knot_expr) {
    if !expr.is_null() {
        views::invalidate_owner(expr as usize);
        unsafe { drop(Box::from_raw(expr)) };
    }
}

macro_rules! expr_predicate {
    ($name:ident, $method:ident) => {
        /// # Safety
        /// `expr` must be a live expression handle.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(expr: *const knot_expr) -> c_int {
            unsafe { as_bool_flag(deref(expr, stringify!($name)).$method()) }
        }
    };
}

expr_predicate!(knot_expr_is_null, is_null);
expr_predicate!(knot_expr_is_bool, is_bool);
expr_predicate!(knot_expr_is_number, is_number);
expr_predicate!(knot_expr_is_str, is_str);
expr_predicate!(knot_expr_is_enum_tag, is_enum_tag);
expr_predicate!(knot_expr_is_enum_variant, is_enum_variant);
expr_predicate!(knot_expr_is_record, is_record);
expr_predicate!(knot_expr_is_array, is_array);
expr_predicate!(knot_expr_is_value, is_value);

fn tag_mismatch(what: &str, expected: &str, expr: &Expr) -> ! {
    panic!("{}: expected {}, got {:?}", what, expected, expr.value())
}

/// # Safety
/// `expr` must be a live expression handle holding a bool.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_bool(expr: *const knot_expr) -> c_int {
    unsafe {
        let expr = deref(expr, "knot_expr_as_bool");
        match expr.as_bool() {
            Some(b) => as_bool_flag(b),
            None => tag_mismatch("knot_expr_as_bool", "a bool", expr),
        }
    }
}

/// Pointer to the (not NUL-terminated) UTF-8 contents; returns the length
///
/// The data is invalidated when `expr` is overwritten or freed.
///
/// # Safety
/// `expr` must be a live expression handle holding a string; `out_str`
/// must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_str(
    expr: *const knot_expr,
    out_str: *mut *const c_char,
) -> usize {
    unsafe {
        let expr = deref(expr, "knot_expr_as_str");
        let Some(s) = expr.as_str() else {
            tag_mismatch("knot_expr_as_str", "a string", expr);
        };
        *deref_mut(out_str, "knot_expr_as_str") = s.as_ptr().cast();
        s.len()
    }
}

/// Pointer to the interned tag name; valid for the life of the process
///
/// # Safety
/// `expr` must be a live expression handle holding an enum tag; `out_str`
/// must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_enum_tag(
    expr: *const knot_expr,
    out_str: *mut *const c_char,
) -> usize {
    unsafe {
        let expr = deref(expr, "knot_expr_as_enum_tag");
        let Some(tag) = expr.as_enum_tag() else {
            tag_mismatch("knot_expr_as_enum_tag", "an enum tag", expr);
        };
        *deref_mut(out_str, "knot_expr_as_enum_tag") = tag.as_ptr().cast();
        tag.len()
    }
}

/// Interned tag name (returned length, pointer in `out_str`) and a copy of
/// the payload written to `out_expr` when it is not NULL
///
/// # Safety
/// `expr` must be a live expression handle holding an enum variant;
/// `out_str` must be writable; `out_expr` NULL or a live handle distinct
/// from `expr`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_enum_variant(
    expr: *const knot_expr,
    out_str: *mut *const c_char,
    out_expr: *mut knot_expr,
) -> usize {
    unsafe {
        let what = "knot_expr_as_enum_variant";
        let expr = deref(expr, what);
        let Some((tag, payload)) = expr.as_enum_variant() else {
            tag_mismatch(what, "an enum variant", expr);
        };
        *deref_mut(out_str, what) = tag.as_ptr().cast();
        if let Some(out) = out_expr.as_mut() {
            let payload = payload.value().clone();
            overwrite(out, payload);
        }
        tag.len()
    }
}

/// Borrowed number view, invalidated when `expr` is overwritten or freed
///
/// # Safety
/// `expr` must be a live expression handle holding a number.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_number(expr: *const knot_expr) -> *const knot_number {
    unsafe {
        let expr_ref = deref(expr, "knot_expr_as_number");
        let Value::Number(n) = expr_ref.value() else {
            tag_mismatch("knot_expr_as_number", "a number", expr_ref);
        };
        let view: *const knot_number = n;
        views::register(view as usize, ViewKind::Number, expr as usize);
        view
    }
}

/// Borrowed record view, invalidated when `expr` is overwritten or freed
///
/// # Safety
/// `expr` must be a live expression handle holding a record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_record(expr: *const knot_expr) -> *const knot_record {
    unsafe {
        let expr_ref = deref(expr, "knot_expr_as_record");
        let Value::Record(entries) = expr_ref.value() else {
            tag_mismatch("knot_expr_as_record", "a record", expr_ref);
        };
        let view: *const knot_record = entries;
        views::register(view as usize, ViewKind::Record, expr as usize);
        view
    }
}

/// Borrowed array view, invalidated when `expr` is overwritten or freed
///
/// # Safety
/// `expr` must be a live expression handle holding an array.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_expr_as_array(expr: *const knot_expr) -> *const knot_array {
    unsafe {
        let expr_ref = deref(expr, "knot_expr_as_array");
        let Value::Array(items) = expr_ref.value() else {
            tag_mismatch("knot_expr_as_array", "an array", expr_ref);
        };
        let view: *const knot_array = items;
        views::register(view as usize, ViewKind::Array, expr as usize);
        view
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

unsafe fn number_view<'a>(num: *const knot_number, what: &str) -> NumberView<'a> {
    views::ensure_live(num as usize, ViewKind::Number);
    NumberView::new(unsafe { deref(num, what) })
}

unsafe fn record_view<'a>(rec: *const knot_record, what: &str) -> RecordView<'a> {
    views::ensure_live(rec as usize, ViewKind::Record);
    RecordView::new(unsafe { deref(rec, what) })
}

unsafe fn array_view<'a>(arr: *const knot_array, what: &str) -> ArrayView<'a> {
    views::ensure_live(arr as usize, ViewKind::Array);
    ArrayView::new(unsafe { deref::<knot_array>(arr, what) })
}

/// # Safety
/// `num` must be a live number view.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_number_is_i64(num: *const knot_number) -> c_int {
    unsafe { as_bool_flag(number_view(num, "knot_number_is_i64").is_i64()) }
}

/// # Safety
/// `num` must be a live number view holding an integer in `int64_t` range
/// (check with `knot_number_is_i64`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_number_as_i64(num: *const knot_number) -> i64 {
    unsafe {
        let view = number_view(num, "knot_number_as_i64");
        match view.as_i64() {
            Some(i) => i,
            None => panic!("knot_number_as_i64: {} is not an int64", view.number()),
        }
    }
}

/// # Safety
/// `num` must be a live number view.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_number_as_f64(num: *const knot_number) -> f64 {
    unsafe { number_view(num, "knot_number_as_f64").as_f64() }
}

/// Exact value as base-10 numerator and denominator strings
///
/// # Safety
/// `num` must be a live number view; both outputs must come from
/// `knot_string_alloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_number_as_rational(
    num: *const knot_number,
    out_numerator: *mut knot_string,
    out_denominator: *mut knot_string,
) {
    unsafe {
        let what = "knot_number_as_rational";
        number_view(num, what)
            .write_rational(deref_mut(out_numerator, what), deref_mut(out_denominator, what));
    }
}

/// # Safety
/// `arr` must be a live array view.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_array_len(arr: *const knot_array) -> usize {
    unsafe { array_view(arr, "knot_array_len").len() }
}

/// Copy the element at `idx` into `out_expr`
///
/// # Safety
/// `arr` must be a live array view, `idx` in bounds, `out_expr` a live
/// expression handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_array_get(arr: *const knot_array, idx: usize, out_expr: *mut knot_expr) {
    unsafe {
        let what = "knot_array_get";
        let item = array_view(arr, what).get(idx).value().clone();
        overwrite(deref_mut(out_expr, what), item);
    }
}

/// # Safety
/// `rec` must be a live record view.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_record_len(rec: *const knot_record) -> usize {
    unsafe { record_view(rec, "knot_record_len").len() }
}

/// Key at `idx` (not NUL-terminated) and, when it has one, a copy of its
/// value in `out_expr`
///
/// Returns 1 if the field has a value, 0 otherwise.
///
/// # Safety
/// `rec` must be a live record view and `idx` in bounds; `out_key` and
/// `out_key_len` must be writable; `out_expr` NULL or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_record_key_value_by_index(
    rec: *const knot_record,
    idx: usize,
    out_key: *mut *const c_char,
    out_key_len: *mut usize,
    out_expr: *mut knot_expr,
) -> c_int {
    unsafe {
        let what = "knot_record_key_value_by_index";
        let (key, value) = record_view(rec, what).entry(idx);
        *deref_mut(out_key, what) = key.as_ptr().cast();
        *deref_mut(out_key_len, what) = key.len();
        match value {
            Some(value) => {
                if let Some(out) = out_expr.as_mut() {
                    overwrite(out, value.value().clone());
                }
                1
            }
            None => 0,
        }
    }
}

/// Look up a field; returns 1 and copies the value into `out_expr` when the
/// field exists and has a value, 0 otherwise
///
/// # Safety
/// `rec` must be a live record view, `key` NUL-terminated; `out_expr` NULL
/// or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_record_value_by_name(
    rec: *const knot_record,
    key: *const c_char,
    out_expr: *mut knot_expr,
) -> c_int {
    unsafe {
        let what = "knot_record_value_by_name";
        let view = record_view(rec, what);
        // Field names are UTF-8, so no other key can match
        let Ok(key) = c_str(key, what) else {
            return 0;
        };
        match view.get(key) {
            Some(value) => {
                if let Some(out) = out_expr.as_mut() {
                    overwrite(out, value.value().clone());
                }
                1
            }
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn knot_string_alloc() -> *mut knot_string {
    Box::into_raw(Box::new(StringBuffer::new()))
}

/// # Safety
/// `s` must come from `knot_string_alloc` and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_string_free(s: *mut knot_string) {
    if !s.is_null() {
        unsafe { drop(Box::from_raw(s)) };
    }
}

/// Contents (not NUL-terminated), valid until `s` is overwritten or freed
///
/// # Safety
/// `s` must be a live string; `data` and `len` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_string_data(
    s: *const knot_string,
    data: *mut *const c_char,
    len: *mut usize,
) {
    unsafe {
        let what = "knot_string_data";
        let bytes = deref(s, what).as_bytes();
        *deref_mut(data, what) = bytes.as_ptr().cast();
        *deref_mut(len, what) = bytes.len();
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn knot_error_alloc() -> *mut knot_error {
    Box::into_raw(Box::new(ErrorSlot::new()))
}

/// # Safety
/// `err` must come from `knot_error_alloc` and not have been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_error_free(err: *mut knot_error) {
    if !err.is_null() {
        unsafe { drop(Box::from_raw(err)) };
    }
}

/// Render the stored error through a write callback
///
/// Fails if no error is stored, the callback stops consuming bytes, or the
/// diagnostic cannot be rendered in `format`.
///
/// # Safety
/// `err` must be a live error handle; `write` must be callable with
/// `write_payload`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_error_display(
    err: *const knot_error,
    write: knot_write_callback,
    write_payload: *mut c_void,
    format: knot_error_format,
) -> knot_result {
    unsafe {
        let slot = deref(err, "knot_error_display");
        let (Some(error), Some(write)) = (slot.get(), write) else {
            return knot_result::KNOT_RESULT_ERR;
        };
        let mut sink = CallbackSink {
            write,
            flush: None,
            user_data: write_payload,
        };
        match error.display(format.into(), &mut sink) {
            Ok(()) => knot_result::KNOT_RESULT_OK,
            Err(e) => {
                tracing::debug!(error = %e, "knot_error_display failed");
                knot_result::KNOT_RESULT_ERR
            }
        }
    }
}

/// Render the stored error into a string
///
/// # Safety
/// `err` must be a live error handle and `out_string` a live string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_error_format_as_string(
    err: *const knot_error,
    out_string: *mut knot_string,
    format: knot_error_format,
) -> knot_result {
    unsafe {
        let what = "knot_error_format_as_string";
        let Some(error) = deref(err, what).get() else {
            return knot_result::KNOT_RESULT_ERR;
        };
        match error.render_into(format.into(), deref_mut(out_string, what)) {
            Ok(()) => knot_result::KNOT_RESULT_OK,
            Err(e) => {
                tracing::debug!(error = %e, "knot_error_format_as_string failed");
                knot_result::KNOT_RESULT_ERR
            }
        }
    }
}
