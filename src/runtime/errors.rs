use std::error::Error;
use std::fmt;

pub type ExecResult<T> = Result<T, RuntimeError>;

#[derive(Debug)]
pub enum ErrorKind {
    InvalidBinaryOperands,
    InvalidCompareOperands,
    ExpectedBoolValue,
    ExpectedBoolCondition,
    UndefinedVariable(String),
    ArityMismatch { expected: u8, got: u8 },
    NotCallable,
    NoPatternMatched,
    StackOverflow,
    FrameOverflow,
}

#[derive(Debug)]
pub struct RuntimeError {
    kind: ErrorKind,
    line: Option<u32>,
}

impl RuntimeError {
    pub fn with_line(mut self, line: u32) -> Self {
        self.line.get_or_insert(line);
        self
    }

    pub fn kind(&self) -> &ErrorKind { &self.kind }

    pub fn line(&self) -> Option<u32> { self.line }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, line: None }
    }
}

impl Error for RuntimeError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ErrorKind::InvalidBinaryOperands => {
                fmt.write_str("Expected numeric or string operands")
            }
            ErrorKind::InvalidCompareOperands => fmt.write_str("Expected numeric operands"),
            ErrorKind::ExpectedBoolValue => fmt.write_str("Expected boolean value"),
            ErrorKind::ExpectedBoolCondition => fmt.write_str("Expected a boolean expression"),
            ErrorKind::UndefinedVariable(name) => {
                write!(fmt, "Undefined variable: {}", name)
            }
            ErrorKind::ArityMismatch { expected, got } => {
                write!(fmt, "Expected {} arguments but got {}", expected, got)
            }
            ErrorKind::NotCallable => fmt.write_str("Can only call functions"),
            ErrorKind::NoPatternMatched => fmt.write_str("No pattern matched the value"),
            ErrorKind::StackOverflow => fmt.write_str("Value stack overflow"),
            ErrorKind::FrameOverflow => fmt.write_str("Too many nested function calls"),
        }
    }
}
