//! An interpreter for the Oba programming language: a single-pass compiler
//! that lowers source text straight to bytecode, and a stack VM that runs
//! it. The only embedding surface is [`Vm`]: create one, feed it source
//! with [`Vm::interpret`], drop it to release everything it owns.

use std::error::Error;
use std::fmt;

pub mod lexer;

pub mod codegen;
pub mod runtime;

pub mod frontend;

use codegen::CompileError;
use runtime::errors::RuntimeError;

pub use runtime::Vm;

/// Why an `interpret` call failed; the two phases are never merged.
#[derive(Debug)]
pub enum InterpretError {
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

impl Error for InterpretError {}

impl fmt::Display for InterpretError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(errors) => {
                write!(fmt, "compile failed with {} error(s)", errors.len())
            }
            Self::Runtime(error) => write!(fmt, "{}", error),
        }
    }
}
