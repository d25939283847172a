use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::runtime::errors::{ErrorKind, RuntimeError};
use crate::runtime::{Value, Vm};
use crate::InterpretError;

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.borrow();
        String::from_utf8(bytes.clone()).expect("utf8 output")
            .lines().map(String::from).collect()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_vm() -> (Vm, SharedSink) {
    let sink = SharedSink::default();
    let vm = Vm::with_debug_sink(Box::new(sink.clone()));
    (vm, sink)
}

fn run(source: &str) -> (Result<(), InterpretError>, Vec<String>) {
    let (mut vm, sink) = capture_vm();
    let result = vm.interpret(source);
    (result, sink.lines())
}

fn debug_lines(source: &str) -> Vec<String> {
    let (result, lines) = run(source);
    result.expect("interpret failed");
    lines
}

fn runtime_error(source: &str) -> (RuntimeError, Vec<String>) {
    let (result, lines) = run(source);
    match result.expect_err("interpret succeeded") {
        InterpretError::Runtime(error) => (error, lines),
        other => panic!("expected runtime error, got {:?}", other),
    }
}

// Value semantics

#[test]
fn truthiness() {
    assert!(!Value::Nil.truth_value());
    assert!(!Value::False.truth_value());
    assert!(Value::True.truth_value());
    assert!(Value::Number(0.0).truth_value());
}

#[test]
fn value_equality() {
    assert_eq!(Value::Nil, Value::Nil);
    assert_eq!(Value::Number(2.0), Value::Number(2.0));
    assert_ne!(Value::Number(2.0), Value::Number(3.0));
    assert_ne!(Value::True, Value::Number(1.0));
    assert_ne!(Value::Nil, Value::False);
}

// End-to-end behavior

#[test]
fn arithmetic_and_variables() {
    assert_eq!(debug_lines("let a = 1\nlet b = 2\ndebug a + b"), vec!["DEBUG: 3"]);
}

#[test]
fn number_formatting_is_compact() {
    assert_eq!(
        debug_lines("debug 4\ndebug 7 / 2\ndebug 0 - 1"),
        vec!["DEBUG: 4", "DEBUG: 3.5", "DEBUG: -1"],
    );
}

#[test]
fn boolean_and_comparison_output() {
    assert_eq!(
        debug_lines("debug 1 < 2\ndebug 2 <= 1\ndebug !true"),
        vec!["DEBUG: true", "DEBUG: false", "DEBUG: false"],
    );
}

#[test]
fn string_concatenation() {
    assert_eq!(debug_lines("debug \"foo\" + \"bar\""), vec!["DEBUG: foobar"]);
}

#[test]
fn strings_are_interned_by_content() {
    assert_eq!(debug_lines("debug \"ab\" == \"ab\""), vec!["DEBUG: true"]);

    let (mut vm, _) = capture_vm();
    vm.interpret("let a = \"xy\" + \"z\"").expect("interpret failed");
    // the concatenation result shares the symbol of the literal content
    let built = vm.strings().get("xyz");
    assert!(built.is_some());
}

#[test]
fn closure_over_argument() {
    let source = "fn make x { fn get { x } get }\nlet g = make(42)\ndebug g()";
    assert_eq!(debug_lines(source), vec!["DEBUG: 42"]);
}

#[test]
fn two_closures_share_one_captured_local() {
    let source = "\
fn make {
  let count = 0
  fn tick {
    count = count + 1
    count
  }
  fn read { count }
  fn select i
  | 0 = tick
  | 1 = read
  ;
  select
}
let c = make()
let tick = c(0)
let read = c(1)
tick()
tick()
debug read()
";
    assert_eq!(debug_lines(source), vec!["DEBUG: 2"]);
}

#[test]
fn scope_discipline() {
    let source = "\
let x = \"global\"
{
  let x = \"inner\"
  debug x
}
debug x
";
    assert_eq!(debug_lines(source), vec!["DEBUG: inner", "DEBUG: global"]);
}

#[test]
fn assignment_is_an_expression() {
    let source = "let x = 1\ndebug x = 2\ndebug x";
    assert_eq!(debug_lines(source), vec!["DEBUG: 2", "DEBUG: 2"]);
}

#[test]
fn if_else_branches() {
    let source = "\
if 1 < 2 {
  debug \"then\"
} else {
  debug \"else\"
}
if 2 < 1 {
  debug \"then\"
} else if true {
  debug \"chained\"
}
";
    assert_eq!(debug_lines(source), vec!["DEBUG: then", "DEBUG: chained"]);
}

#[test]
fn match_expression_selects_arm() {
    let source = "let x = 2\ndebug match x\n| 1 = \"one\"\n| 2 = \"two\"\n;";
    assert_eq!(debug_lines(source), vec!["DEBUG: two"]);
}

#[test]
fn match_arm_arrow_variant() {
    let source = "debug match 3\n| 3 => \"three\"\n;";
    assert_eq!(debug_lines(source), vec!["DEBUG: three"]);
}

#[test]
fn function_display_form() {
    let source = "fn f { }\ndebug f";
    assert_eq!(debug_lines(source), vec!["DEBUG: <fn f>"]);
}

#[test]
fn nil_from_empty_function() {
    assert_eq!(debug_lines("fn f { }\ndebug f()"), vec!["DEBUG: nil"]);
}

// Runtime errors

#[test]
fn add_number_and_bool_fails() {
    let (error, lines) = runtime_error("debug 1 + true");
    assert!(matches!(error.kind(), ErrorKind::InvalidBinaryOperands));
    assert!(lines.is_empty());
}

#[test]
fn compare_strings_fails() {
    let (error, _) = runtime_error("debug \"a\" < \"b\"");
    assert!(matches!(error.kind(), ErrorKind::InvalidCompareOperands));
}

#[test]
fn not_requires_boolean() {
    let (error, _) = runtime_error("debug !1");
    assert!(matches!(error.kind(), ErrorKind::ExpectedBoolValue));
}

#[test]
fn condition_requires_boolean() {
    let (error, _) = runtime_error("if 1 {\ndebug \"no\"\n}");
    assert!(matches!(error.kind(), ErrorKind::ExpectedBoolCondition));
}

#[test]
fn undefined_global() {
    let (error, _) = runtime_error("debug missing");
    assert!(matches!(error.kind(), ErrorKind::UndefinedVariable(name) if name == "missing"));
}

#[test]
fn assignment_to_undefined_global() {
    let (error, _) = runtime_error("missing = 1");
    assert!(matches!(error.kind(), ErrorKind::UndefinedVariable(_)));
}

#[test]
fn arity_mismatch() {
    let (error, _) = runtime_error("fn f x { x }\nf(1 2)");
    assert!(matches!(error.kind(), ErrorKind::ArityMismatch { expected: 1, got: 2 }));
}

#[test]
fn calling_a_number_fails() {
    let (error, _) = runtime_error("let x = 3\nx()");
    assert!(matches!(error.kind(), ErrorKind::NotCallable));
}

#[test]
fn exhausted_match_is_a_runtime_error() {
    let (error, _) = runtime_error("match 9\n| 1 = \"one\"\n;");
    assert!(matches!(error.kind(), ErrorKind::NoPatternMatched));
}

#[test]
fn runaway_recursion_overflows() {
    let (error, _) = runtime_error("fn forever { forever() }\nforever()");
    assert!(matches!(error.kind(), ErrorKind::StackOverflow | ErrorKind::FrameOverflow));
}

#[test]
fn vm_stays_usable_after_runtime_error() {
    let (mut vm, sink) = capture_vm();

    let error = vm.interpret("let kept = 7\ndebug 1 + true").expect_err("no error");
    assert!(matches!(error, InterpretError::Runtime(_)));

    // globals defined before the error survive
    vm.interpret("debug kept + 1").expect("second interpret failed");
    assert_eq!(sink.lines(), vec!["DEBUG: 8"]);
}

#[test]
fn compile_error_prevents_execution() {
    let (mut vm, sink) = capture_vm();

    let error = vm.interpret("debug 1\nlet = oops").expect_err("no error");
    assert!(matches!(error, InterpretError::Compile(_)));
    assert!(sink.lines().is_empty());
}

#[test]
fn runtime_error_carries_a_line() {
    let (mut vm, _) = capture_vm();
    let error = vm.interpret("let a = 1\ndebug 1 + true").expect_err("no error");
    match error {
        InterpretError::Runtime(error) => assert_eq!(error.line(), Some(2)),
        other => panic!("expected runtime error, got {:?}", other),
    }
}
