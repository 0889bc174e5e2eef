use std::thread;

use pot_compile::{compile, CompileError, CompileErrorKind};
use serde_json::json;

/// Evaluation workers run with the default 2 MiB thread stack.
const WORKER_STACK: usize = 2 << 20;

fn compile_on_worker(expr: String) -> Result<(), CompileError> {
    thread::Builder::new()
        .stack_size(WORKER_STACK)
        .spawn(move || {
            let doc = json!({
                "variables": [{"name": "p", "sort": "BoolSort"}, {"name": "n", "sort": "IntSort"}],
                "knowledge_base": [expr]
            });
            compile(&pot_schema::validate(&doc).unwrap()).map(|_| ())
        })
        .unwrap()
        .join()
        .unwrap()
}

fn assert_too_deep(expr: String) {
    let err = compile_on_worker(expr).unwrap_err();
    assert_eq!(err.path, "knowledge_base[0]");
    assert!(
        matches!(&err.kind, CompileErrorKind::Syntax { message } if message.contains("nests deeper")),
        "{:?}",
        err.kind
    );
}

#[test]
fn long_conjunction_is_a_compile_error() {
    assert_too_deep(vec!["p"; 300].join(" and "));
    assert_too_deep(vec!["p"; 2000].join(" and "));
}

#[test]
fn long_disjunction_is_a_compile_error() {
    assert_too_deep(vec!["p"; 2000].join(" or "));
}

#[test]
fn repeated_negation_is_a_compile_error() {
    assert_too_deep(format!("{}p", "not ".repeat(2000)));
}

#[test]
fn repeated_unary_minus_is_a_compile_error() {
    assert_too_deep(format!("{}1 = n", "- ".repeat(2000)));
}

#[test]
fn long_sum_is_a_compile_error() {
    assert_too_deep(format!("{} = n", vec!["1"; 2000].join(" + ")));
}

#[test]
fn expressions_within_the_limit_compile_on_a_worker_stack() {
    compile_on_worker(vec!["p"; 100].join(" and ")).unwrap();
    compile_on_worker(format!("{}p", "not ".repeat(100))).unwrap();
    compile_on_worker(format!("{} = n", vec!["1"; 100].join(" + "))).unwrap();
}
