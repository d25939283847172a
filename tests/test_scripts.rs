use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use oba::runtime::errors::ErrorKind;
use oba::{InterpretError, Vm};

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_test_script(path: &Path) -> (Result<(), InterpretError>, Vec<String>) {
    let source = fs::read_to_string(path)
        .unwrap_or_else(|error| panic!("failed to read {}: {}", path.display(), error));

    let sink = SharedSink::default();
    let mut vm = Vm::with_debug_sink(Box::new(sink.clone()));
    let result = vm.interpret(&source);

    let output = String::from_utf8(sink.0.borrow().clone()).expect("utf8 output");
    (result, output.lines().map(String::from).collect())
}

macro_rules! test_script {
    ( $name:tt, $path:expr, expect: [ $( $line:expr ),* $(,)? ] ) => {
        #[test]
        fn $name() {
            let (result, output) = run_test_script(Path::new($path));
            if let Err(error) = result {
                panic!("{:?}", error);
            }
            let expected: Vec<String> = vec![ $( format!("DEBUG: {}", $line) ),* ];
            assert_eq!(output, expected);
        }
    };
    ( $name:tt, $path:expr, error: $error:pat ) => {
        #[test]
        fn $name() {
            let (result, _) = run_test_script(Path::new($path));
            let error = result.expect_err("script succeeded");
            match &error {
                InterpretError::Runtime(error) if matches!(error.kind(), $error) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
    };
    ( $name:tt, $path:expr, compile_error ) => {
        #[test]
        fn $name() {
            let (result, output) = run_test_script(Path::new($path));
            assert!(matches!(result, Err(InterpretError::Compile(_))), "expected compile error");
            assert!(output.is_empty(), "compile errors must not execute");
        }
    };
}

test_script!(arithmetic, "tests/scripts/arithmetic.oba",
    expect: ["3", "7", "11", "3.5"]);

test_script!(strings, "tests/scripts/strings.oba",
    expect: ["foobar", "true", "false"]);

test_script!(scope, "tests/scripts/scope.oba",
    expect: ["inner", "global", "second", "third"]);

test_script!(if_else, "tests/scripts/if_else.oba",
    expect: ["big", "five"]);

mod closure_tests {
    use super::*;

    test_script!(closure_over_argument, "tests/scripts/closure.oba",
        expect: ["42"]);

    test_script!(recursive_upvalue, "tests/scripts/recursive_upvalue.oba",
        expect: ["arg", "outer", "middle"]);

    test_script!(closure_vector, "tests/scripts/closure_vector.oba",
        expect: ["1", "2", "3", "4", "4", "6"]);

    test_script!(counter, "tests/scripts/counter.oba",
        expect: ["1", "2", "2"]);
}

mod match_tests {
    use super::*;

    test_script!(match_expression, "tests/scripts/match.oba",
        expect: ["two", "zero", "other"]);

    test_script!(recursion, "tests/scripts/recursion.oba",
        expect: ["55", "720"]);

    test_script!(match_fail, "tests/scripts/match_fail.oba",
        error: ErrorKind::NoPatternMatched);
}

mod error_tests {
    use super::*;

    test_script!(add_mixed_types, "tests/scripts/runtime_error.oba",
        error: ErrorKind::InvalidBinaryOperands);

    test_script!(stack_overflow, "tests/scripts/stack_overflow.oba",
        error: ErrorKind::StackOverflow | ErrorKind::FrameOverflow);

    test_script!(bad_syntax, "tests/scripts/bad_syntax.oba", compile_error);
}
