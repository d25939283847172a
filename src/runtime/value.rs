use std::fmt;
use std::rc::Rc;

use crate::runtime::function::{Closure, Function};
use crate::runtime::strings::{StringSymbol, StringTable};

// Fundamental data value type
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    True,
    False,
    Number(f64),
    String(StringSymbol),
    Function(Rc<Function>),
    Closure(Rc<Closure>),
}

impl Value {
    // Only "nil" and "false" have a truth value of false.
    pub fn truth_value(&self) -> bool {
        !matches!(self, Self::Nil | Self::False)
    }

    /// Boolean payload, or `None` for non-boolean values.
    /// Logical operators and conditional jumps are strict and reject
    /// anything that isn't `true` or `false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<StringSymbol> {
        match self {
            Self::String(symbol) => Some(*symbol),
            _ => None,
        }
    }

    /// Render this value against the string table that owns its symbols.
    pub fn display<'a>(&'a self, strings: &'a StringTable) -> impl fmt::Display + 'a {
        DisplayValue { value: self, strings }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self { Self::Number(value) }
}

// Equality is same-tag, same-payload. Strings compare by symbol, which the
// interning invariant makes equivalent to content comparison. Functions and
// closures compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::True, Self::True) => true,
            (Self::False, Self::False) => true,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

struct DisplayValue<'a> {
    value: &'a Value,
    strings: &'a StringTable,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Nil => fmt.write_str("nil"),
            Value::True => fmt.write_str("true"),
            Value::False => fmt.write_str("false"),
            Value::Number(value) => fmt_number(fmt, *value),
            Value::String(symbol) => fmt.write_str(self.strings.resolve(*symbol)),
            Value::Function(fun) => fmt_function_name(fmt, fun.name(), self.strings),
            Value::Closure(closure) => {
                fmt_function_name(fmt, closure.function().name(), self.strings)
            }
        }
    }
}

// Compact decimal form: integral values print without a fractional tail.
fn fmt_number(fmt: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_finite() && value == value.trunc() {
        write!(fmt, "{}", value as i64)
    } else {
        write!(fmt, "{}", value)
    }
}

fn fmt_function_name(
    fmt: &mut fmt::Formatter<'_>,
    name: Option<StringSymbol>,
    strings: &StringTable,
) -> fmt::Result {
    match name {
        Some(symbol) => write!(fmt, "<fn {}>", strings.resolve(symbol)),
        None => fmt.write_str("<script>"),
    }
}
