//! Tests for the C ABI
//!
//! These drive the `knot_*` functions the way a C host would, through raw
//! handles, to catch regressions at the FFI boundary.

use knot::ffi::*;
use knot::views::{self, ViewKind};
use serial_test::serial;
use std::ffi::{CString, c_char, c_void};
use std::process::{Command, Output};
use std::ptr;

struct Capture {
    bytes: Vec<u8>,
    flushes: usize,
}

/// Takes at most half of each buffer (rounded up) to exercise retries
unsafe extern "C" fn half_write(user_data: *mut c_void, buf: *const u8, len: usize) -> usize {
    unsafe {
        let capture = &mut *(user_data as *mut Capture);
        let take = len.div_ceil(2);
        capture
            .bytes
            .extend_from_slice(std::slice::from_raw_parts(buf, take));
        take
    }
}

unsafe extern "C" fn count_flush(user_data: *const c_void) {
    unsafe {
        let capture = &mut *(user_data as *mut Capture);
        capture.flushes += 1;
    }
}

unsafe extern "C" fn closed_write(_user_data: *mut c_void, _buf: *const u8, _len: usize) -> usize {
    0
}

fn src(text: &str) -> CString {
    CString::new(text).unwrap()
}

unsafe fn string_contents(s: *const knot_string) -> String {
    unsafe {
        let mut data: *const c_char = ptr::null();
        let mut len = 0usize;
        knot_string_data(s, &mut data, &mut len);
        String::from_utf8(std::slice::from_raw_parts(data.cast::<u8>(), len).to_vec()).unwrap()
    }
}

unsafe fn as_i64(expr: *const knot_expr) -> i64 {
    unsafe {
        assert_eq!(knot_expr_is_number(expr), 1);
        let num = knot_expr_as_number(expr);
        assert_eq!(knot_number_is_i64(num), 1);
        knot_number_as_i64(num)
    }
}

#[test]
#[serial]
fn test_record_by_index_and_name() {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let field = knot_expr_alloc();

        let program = src("{ foo = 1, bar = \"two\", baz | Number }");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), expr, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(knot_expr_is_record(expr), 1);
        let rec = knot_expr_as_record(expr);
        assert_eq!(knot_record_len(rec), 3);

        let mut key: *const c_char = ptr::null();
        let mut key_len = 0usize;
        assert_eq!(knot_record_key_value_by_index(rec, 1, &mut key, &mut key_len, field), 1);
        assert_eq!(std::slice::from_raw_parts(key.cast::<u8>(), key_len), b"bar");
        let mut s: *const c_char = ptr::null();
        let len = knot_expr_as_str(field, &mut s);
        assert_eq!(std::slice::from_raw_parts(s.cast::<u8>(), len), b"two");

        // Declared without a value
        assert_eq!(knot_record_key_value_by_index(rec, 2, &mut key, &mut key_len, field), 0);

        let name = src("foo");
        assert_eq!(knot_record_value_by_name(rec, name.as_ptr(), field), 1);
        assert_eq!(as_i64(field), 1);
        let missing = src("nope");
        assert_eq!(knot_record_value_by_name(rec, missing.as_ptr(), field), 0);

        knot_expr_free(field);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_lazy_array_and_in_place_forcing() {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let elt = knot_expr_alloc();

        let program = src("[1, 2 + 3, 'Pair [4, 5]]");
        assert_eq!(
            knot_context_eval_shallow(ctx, program.as_ptr(), expr, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        let arr = knot_expr_as_array(expr);
        assert_eq!(knot_array_len(arr), 3);

        knot_array_get(arr, 0, elt);
        assert_eq!(as_i64(elt), 1);

        knot_array_get(arr, 1, elt);
        assert_eq!(knot_expr_is_value(elt), 0);
        assert_eq!(
            knot_context_eval_expr_shallow(ctx, elt, elt, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(as_i64(elt), 5);

        knot_array_get(arr, 2, elt);
        assert_eq!(
            knot_context_eval_expr_shallow(ctx, elt, elt, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(knot_expr_is_enum_variant(elt), 1);
        let payload = knot_expr_alloc();
        let mut tag: *const c_char = ptr::null();
        let len = knot_expr_as_enum_variant(elt, &mut tag, payload);
        assert_eq!(std::slice::from_raw_parts(tag.cast::<u8>(), len), b"Pair");
        assert_eq!(knot_expr_is_value(payload), 0);

        knot_expr_free(payload);
        knot_expr_free(elt);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_rational_strings() {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let program = src("-2 / 6");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), expr, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        let num = knot_expr_as_number(expr);
        assert_eq!(knot_number_is_i64(num), 0);
        let numerator = knot_string_alloc();
        let denominator = knot_string_alloc();
        knot_number_as_rational(num, numerator, denominator);
        assert_eq!(string_contents(numerator), "-1");
        assert_eq!(string_contents(denominator), "3");
        assert!((knot_number_as_f64(num) + 1.0 / 3.0).abs() < f64::EPSILON);

        knot_string_free(numerator);
        knot_string_free(denominator);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_trace_through_half_consuming_callback() {
    unsafe {
        let ctx = knot_context_alloc();
        let mut capture = Capture {
            bytes: Vec::new(),
            flushes: 0,
        };
        knot_context_set_trace_callback(
            ctx,
            Some(half_write),
            Some(count_flush),
            &mut capture as *mut Capture as *mut c_void,
        );
        let program = src("std.trace \"hi\" { bye = std.trace \"bye\" 1 }");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), ptr::null_mut(), ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(capture.bytes, b"std.trace: hi\nstd.trace: bye\n");
        assert_eq!(capture.flushes, 2);

        knot_context_set_trace_callback(ctx, None, None, ptr::null_mut());
        let program = src("std.trace \"dropped\" 1");
        knot_context_eval_deep(ctx, program.as_ptr(), ptr::null_mut(), ptr::null_mut());
        assert_eq!(capture.flushes, 2);

        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_closed_trace_callback_does_not_hang() {
    unsafe {
        let ctx = knot_context_alloc();
        knot_context_set_trace_callback(ctx, Some(closed_write), None, ptr::null_mut());
        let expr = knot_expr_alloc();
        let program = src("std.trace \"lost\" 7");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), expr, ptr::null_mut()),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(as_i64(expr), 7);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_error_display_and_format() {
    unsafe {
        let ctx = knot_context_alloc();
        let name = src("main.knot");
        knot_context_set_source_name(ctx, name.as_ptr());
        let expr = knot_expr_alloc();
        let err = knot_error_alloc();

        let ok = src("true");
        knot_context_eval_deep(ctx, ok.as_ptr(), expr, err);
        assert_eq!(knot_expr_as_bool(expr), 1);

        let program = src("{ foo | String = 1 }");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), expr, err),
            knot_result::KNOT_RESULT_ERR
        );
        // The output handle is untouched on failure.
        assert_eq!(knot_expr_as_bool(expr), 1);

        let text = knot_string_alloc();
        assert_eq!(
            knot_error_format_as_string(err, text, knot_error_format::KNOT_ERROR_FORMAT_TEXT),
            knot_result::KNOT_RESULT_OK
        );
        let rendered = string_contents(text);
        assert!(rendered.starts_with("error: contract broken by the value of `foo`\n"));
        assert!(rendered.contains(" --> main.knot:1:"));

        let mut capture = Capture {
            bytes: Vec::new(),
            flushes: 0,
        };
        assert_eq!(
            knot_error_display(
                err,
                Some(half_write),
                &mut capture as *mut Capture as *mut c_void,
                knot_error_format::KNOT_ERROR_FORMAT_TEXT,
            ),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(String::from_utf8(capture.bytes).unwrap(), rendered);

        assert_eq!(
            knot_error_display(
                err,
                Some(closed_write),
                ptr::null_mut(),
                knot_error_format::KNOT_ERROR_FORMAT_JSON,
            ),
            knot_result::KNOT_RESULT_ERR
        );

        assert_eq!(
            knot_error_format_as_string(err, text, knot_error_format::KNOT_ERROR_FORMAT_JSON),
            knot_result::KNOT_RESULT_OK
        );
        let json: serde_json::Value = serde_json::from_str(&string_contents(text)).unwrap();
        assert_eq!(json["kind"], "contract-violation");

        knot_string_free(text);
        knot_error_free(err);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_empty_error_slot() {
    unsafe {
        let err = knot_error_alloc();
        let out = knot_string_alloc();
        assert_eq!(
            knot_error_format_as_string(err, out, knot_error_format::KNOT_ERROR_FORMAT_TEXT),
            knot_result::KNOT_RESULT_ERR
        );
        knot_string_free(out);
        knot_error_free(err);
    }
}

#[test]
#[serial]
fn test_null_error_pointer_is_allowed() {
    unsafe {
        let ctx = knot_context_alloc();
        let program = src("1 +");
        assert_eq!(
            knot_context_eval_deep(ctx, program.as_ptr(), ptr::null_mut(), ptr::null_mut()),
            knot_result::KNOT_RESULT_ERR
        );
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_export_formats() {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let out = knot_string_alloc();
        let err = knot_error_alloc();

        let program = src("{ name = \"svc\", port = 8080, secret | not_exported = \"x\" }");
        assert_eq!(
            knot_context_eval_deep_for_export(ctx, program.as_ptr(), expr, err),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(
            knot_context_expr_to_json(ctx, expr, out, err),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(
            string_contents(out),
            "{\n  \"name\": \"svc\",\n  \"port\": 8080\n}"
        );
        assert_eq!(
            knot_context_expr_to_yaml(ctx, expr, out, err),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(string_contents(out), "name: svc\nport: 8080\n");
        assert_eq!(
            knot_context_expr_to_toml(ctx, expr, out, err),
            knot_result::KNOT_RESULT_OK
        );
        assert_eq!(string_contents(out), "name = \"svc\"\nport = 8080\n");

        let scalar = src("null");
        knot_context_eval_deep(ctx, scalar.as_ptr(), expr, err);
        assert_eq!(
            knot_context_expr_to_toml(ctx, expr, out, err),
            knot_result::KNOT_RESULT_ERR
        );

        knot_error_free(err);
        knot_string_free(out);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

#[cfg(feature = "checked-views")]
#[test]
#[serial]
fn test_views_die_with_their_expression() {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let program = src("{ a = [1, 2] }");
        knot_context_eval_deep(ctx, program.as_ptr(), expr, ptr::null_mut());

        let rec = knot_expr_as_record(expr);
        assert!(views::is_live(rec as usize, ViewKind::Record));

        let field = knot_expr_alloc();
        let name = src("a");
        knot_record_value_by_name(rec, name.as_ptr(), field);
        let arr = knot_expr_as_array(field);
        assert!(views::is_live(arr as usize, ViewKind::Array));

        // Overwriting the owner drops its views, not those of other handles.
        let other = src("3");
        knot_context_eval_deep(ctx, other.as_ptr(), expr, ptr::null_mut());
        assert!(!views::is_live(rec as usize, ViewKind::Record));
        assert!(views::is_live(arr as usize, ViewKind::Array));

        let num = knot_expr_as_number(expr);
        assert!(views::is_live(num as usize, ViewKind::Number));
        knot_expr_free(expr);
        assert!(!views::is_live(num as usize, ViewKind::Number));

        knot_expr_free(field);
        assert!(!views::is_live(arr as usize, ViewKind::Array));
        knot_context_free(ctx);
    }
}

#[test]
#[serial]
fn test_non_utf8_names() {
    unsafe {
        let ctx = knot_context_alloc();
        let good = src("good.knot");
        knot_context_set_source_name(ctx, good.as_ptr());
        let bad = CString::new(vec![b'x', 0xff, 0xfe]).unwrap();
        knot_context_set_source_name(ctx, bad.as_ptr());

        let expr = knot_expr_alloc();
        let err = knot_error_alloc();
        let program = src("{ a = 1 }");
        knot_context_eval_deep(ctx, program.as_ptr(), expr, err);
        let rec = knot_expr_as_record(expr);
        assert_eq!(knot_record_value_by_name(rec, bad.as_ptr(), ptr::null_mut()), 0);

        let broken = src("1 + \"a\"");
        assert_eq!(
            knot_context_eval_deep(ctx, broken.as_ptr(), expr, err),
            knot_result::KNOT_RESULT_ERR
        );
        let text = knot_string_alloc();
        knot_error_format_as_string(err, text, knot_error_format::KNOT_ERROR_FORMAT_TEXT);
        assert!(string_contents(text).contains(" --> good.knot:1:"));

        knot_string_free(text);
        knot_error_free(err);
        knot_expr_free(expr);
        knot_context_free(ctx);
    }
}

/// Selects the misuse `test_misuse_aborts_the_process` commits when it runs
/// as a child process
const MISUSE_CASE: &str = "KNOT_FFI_MISUSE_CASE";

unsafe fn commit_misuse(case: &str) {
    unsafe {
        let ctx = knot_context_alloc();
        let expr = knot_expr_alloc();
        let record = src("{ a = 1 }");
        let number = src("2");
        match case {
            "stale-record" => {
                knot_context_eval_deep(ctx, record.as_ptr(), expr, ptr::null_mut());
                let rec = knot_expr_as_record(expr);
                knot_context_eval_deep(ctx, number.as_ptr(), expr, ptr::null_mut());
                knot_record_len(rec);
            }
            "freed-number" => {
                knot_context_eval_deep(ctx, number.as_ptr(), expr, ptr::null_mut());
                let num = knot_expr_as_number(expr);
                knot_expr_free(expr);
                knot_number_as_f64(num);
            }
            "null-source-name" => knot_context_set_source_name(ctx, ptr::null()),
            "null-field-name" => {
                knot_context_eval_deep(ctx, record.as_ptr(), expr, ptr::null_mut());
                let rec = knot_expr_as_record(expr);
                knot_record_value_by_name(rec, ptr::null(), ptr::null_mut());
            }
            "tag-mismatch" => {
                knot_context_eval_deep(ctx, number.as_ptr(), expr, ptr::null_mut());
                knot_expr_as_record(expr);
            }
            other => panic!("unknown misuse case {}", other),
        }
    }
}

fn assert_aborted(case: &str, output: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "{} did not fail:\n{}", case, stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // SIGABRT
        assert_eq!(output.status.signal(), Some(6), "{}: {:?}", case, output.status);
    }
    assert!(stderr.contains(message), "{}:\n{}", case, stderr);
}

#[test]
fn test_misuse_aborts_the_process() {
    if let Ok(case) = std::env::var(MISUSE_CASE) {
        unsafe { commit_misuse(&case) };
        return;
    }

    let mut cases = vec![
        (
            "null-source-name",
            "knot_context_set_source_name: unexpected NULL string",
        ),
        (
            "null-field-name",
            "knot_record_value_by_name: unexpected NULL string",
        ),
        ("tag-mismatch", "knot_expr_as_record: expected a record"),
    ];
    // Without the registry a stale view is undefined behaviour, not an abort
    if cfg!(feature = "checked-views") {
        cases.push(("stale-record", "use of an invalidated Record view"));
        cases.push(("freed-number", "use of an invalidated Number view"));
    }

    let exe = std::env::current_exe().unwrap();
    for (case, message) in cases {
        let output = Command::new(&exe)
            .args([
                "test_misuse_aborts_the_process",
                "--exact",
                "--nocapture",
                "--test-threads=1",
            ])
            .env(MISUSE_CASE, case)
            .output()
            .unwrap();
        assert_aborted(case, &output, message);
    }
}
