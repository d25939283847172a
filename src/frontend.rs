//! output/error reporting and formatting

use std::fmt::Display;

use crate::codegen::CompileError;
use crate::runtime::errors::RuntimeError;

pub fn print_compile_errors(errors: &[CompileError]) {
    for error in errors {
        eprintln!("{}", render_error(error.line(), error));
    }
}

pub fn print_runtime_error(error: &RuntimeError) {
    eprintln!("{}", render_error(error.line(), error));
}

fn render_error(line: Option<u32>, message: impl Display) -> String {
    match line {
        Some(line) => format!("Error: [line {}] {}", line, message),
        None => format!("Error: {}", message),
    }
}
