//! Whole-program tests for the evaluator
//!
//! Small configuration-style programs exercising laziness, recursion,
//! contracts and diagnostics together through the public API.

use knot_core::{DiagnosticKind, Evaluator, SourceFile, Thunk, Whnf};

fn run(text: &str) -> Result<(Evaluator, Thunk, Whnf), knot_core::Diagnostic> {
    let mut ev = Evaluator::new();
    let thunk = ev.eval_source(&SourceFile::new("program.knot", text))?;
    let value = ev.deep_force(&thunk)?;
    Ok((ev, thunk, value))
}

fn field(value: &Whnf, name: &str) -> Whnf {
    match value {
        Whnf::Record(record) => {
            let thunk = record.get(name).and_then(|f| f.value.clone());
            thunk
                .and_then(|t| t.peek())
                .unwrap_or_else(|| panic!("field `{}` missing or not forced", name))
        }
        other => panic!("expected a record, got {:?}", other),
    }
}

fn as_i64(value: &Whnf) -> i64 {
    match value {
        Whnf::Number(n) => n.to_i64().unwrap(),
        other => panic!("expected a number, got {:?}", other),
    }
}

#[test]
fn test_service_config() {
    let src = r#"
        # ports derive from a base
        let base = 8000 in
        let mk = fun n off => { name = n, port = base + off } in
        let services = [mk "api" 1, mk "web" 2] in
        {
          count = std.array.length services,
          names = std.array.map (fun s => s.name) services,
          api = mk "api" 1,
        }
    "#;
    let (_, _, value) = run(src).unwrap();
    assert_eq!(as_i64(&field(&value, "count")), 2);
    let api = field(&value, "api");
    assert_eq!(as_i64(&field(&api, "port")), 8001);
    let Whnf::Array(names) = field(&value, "names") else {
        panic!("expected an array of names");
    };
    let names: Vec<String> = names
        .iter()
        .map(|t| match t.peek() {
            Some(Whnf::Str(s)) => s.to_string(),
            other => panic!("expected a string, got {:?}", other),
        })
        .collect();
    assert_eq!(names, ["api", "web"]);
}

#[test]
fn test_mutually_recursive_fields() {
    let (_, _, value) = run("{ a = b + 1, b = c * 2, c = 10 }").unwrap();
    assert_eq!(as_i64(&field(&value, "a")), 21);
}

#[test]
fn test_recursive_function() {
    let (_, _, value) =
        run("let rec fact n = if n <= 1 then 1 else n * fact (n - 1) in fact 20").unwrap();
    assert_eq!(as_i64(&value), 2_432_902_008_176_640_000);
}

#[test]
fn test_unused_failure_is_never_evaluated() {
    let mut ev = Evaluator::new();
    let thunk = ev
        .eval_source(&SourceFile::new("lazy.knot", "{ ok = 1, bad = std.fail_with \"boom\" }"))
        .unwrap();
    let Whnf::Record(record) = ev.force(&thunk).unwrap() else {
        panic!("expected a record");
    };
    let ok = record.get("ok").and_then(|f| f.value.clone()).unwrap();
    assert!(matches!(ev.force(&ok).unwrap(), Whnf::Number(_)));

    let bad = record.get("bad").and_then(|f| f.value.clone()).unwrap();
    let err = ev.force(&bad).unwrap_err();
    assert_eq!(err.message, "boom");
    // Failures are memoized like values.
    assert_eq!(ev.force(&bad).unwrap_err().message, "boom");
}

#[test]
fn test_contract_on_array_elements_is_lazy() {
    let mut ev = Evaluator::new();
    let thunk = ev
        .eval_source(&SourceFile::new("c.knot", "{ xs | Array Number = [1, \"two\", 3] }"))
        .unwrap();
    let Whnf::Record(record) = ev.force(&thunk).unwrap() else {
        panic!("expected a record");
    };
    let xs = record.get("xs").and_then(|f| f.value.clone()).unwrap();
    let Whnf::Array(items) = ev.force(&xs).unwrap() else {
        panic!("expected an array");
    };
    assert!(ev.force(&items[0]).is_ok());
    let err = ev.force(&items[1]).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Contract);
    assert_eq!(err.message, "contract broken by the value of `xs`");
    assert!(ev.force(&items[2]).is_ok());
}

#[test]
fn test_diagnostic_points_into_source() {
    let err = run("{\n  port = \"80\" + 1,\n}").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Eval);
    let label = err.primary_label().unwrap();
    assert_eq!(label.source.name(), "program.knot");
    let start = label.source.location(label.span.start);
    assert_eq!(start.line, 2);
    assert_eq!(label.source.slice(label.span), "\"80\"");
}

#[test]
fn test_evaluator_moves_between_threads() {
    let mut ev = Evaluator::new();
    let thunk = ev
        .eval_source(&SourceFile::new("t.knot", "{ a = 6 * 7 }"))
        .unwrap();
    let value = std::thread::spawn(move || {
        let value = ev.deep_force(&thunk).unwrap();
        as_i64(&field(&value, "a"))
    })
    .join()
    .unwrap();
    assert_eq!(value, 42);
}
