//! Stack-based virtual machine.

use std::io::{self, Write};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::codegen::{self, OpCode};
use crate::frontend;
use crate::runtime::errors::{ErrorKind, ExecResult, RuntimeError};
use crate::runtime::function::{Closure, Function, Upvalue, UpvalueState};
use crate::runtime::strings::{StringSymbol, StringTable};
use crate::runtime::{DefaultBuildHasher, Value};
use crate::InterpretError;

// The maximum depth of the value stack and of the call frame stack.
// Exceeding either is a runtime error, not a panic.
pub const STACK_MAX: usize = 256;
pub const FRAMES_MAX: usize = 256;

/// A call in progress: which closure is running, where its instruction
/// pointer is, and where its slot window starts in the value stack.
/// Slot 0 is the callee itself; arguments fill slots 1..=arity.
#[derive(Debug)]
struct CallFrame {
    closure: Rc<Closure>,
    ip: usize,
    slot_base: usize,
}

enum Control {
    Next,
    Exit,
}

pub struct Vm {
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: FxHashMap<StringSymbol, Value>,
    strings: StringTable,
    // open upvalues, sorted by descending stack index
    open_upvalues: Vec<Rc<Upvalue>>,
    debug_sink: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self { Self::new() }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_debug_sink(Box::new(io::stdout()))
    }

    /// A VM whose `debug` statements write to `sink` instead of stdout.
    pub fn with_debug_sink(sink: Box<dyn Write>) -> Self {
        Self {
            frames: Vec::new(),
            stack: Vec::new(),
            globals: FxHashMap::with_hasher(DefaultBuildHasher::default()),
            strings: StringTable::new(),
            open_upvalues: Vec::new(),
            debug_sink: sink,
        }
    }

    pub fn strings(&self) -> &StringTable { &self.strings }

    /// Compiles and runs `source`. Errors are reported to stderr and also
    /// returned. After a runtime error the stack and frames are reset, so
    /// the VM stays usable; globals and interned strings survive.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = match codegen::compile(source, &mut self.strings) {
            Ok(function) => function,
            Err(errors) => {
                frontend::print_compile_errors(&errors);
                return Err(InterpretError::Compile(errors));
            }
        };

        self.reset();
        if let Err(error) = self.execute(function) {
            frontend::print_runtime_error(&error);
            self.reset();
            return Err(InterpretError::Runtime(error));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn execute(&mut self, function: Rc<Function>) -> ExecResult<()> {
        let closure = Rc::new(Closure::new(function, Vec::new()));
        self.push(Value::Closure(Rc::clone(&closure)))?;
        self.call_closure(closure, 0)?;
        self.run()
    }

    fn run(&mut self) -> ExecResult<()> {
        loop {
            let offset = self.frame().ip;
            match self.exec_next() {
                Ok(Control::Next) => {}
                Ok(Control::Exit) => return Ok(()),
                Err(error) => {
                    let line = self.frame().closure.function().chunk().line_for(offset);
                    return Err(match line {
                        Some(line) => error.with_line(line),
                        None => error,
                    });
                }
            }

            // returning from the top frame halts
            if self.frames.is_empty() {
                return Ok(());
            }
        }
    }

    // Stack and Frames

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no call frame")
    }

    fn push(&mut self, value: Value) -> ExecResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(ErrorKind::StackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, lookbehind: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - lookbehind]
    }

    // Instruction Decoding

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.closure.function().chunk().code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let const_id = self.read_byte();
        self.frame().closure.function().chunk().lookup_const(const_id).clone()
    }

    fn read_string_constant(&mut self) -> StringSymbol {
        self.read_constant().as_string().expect("name constant")
    }

    // Calls

    fn call_value(&mut self, callee: Value, argc: u8) -> ExecResult<()> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            _ => Err(ErrorKind::NotCallable.into()),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: u8) -> ExecResult<()> {
        let arity = closure.function().arity();
        if arity != argc {
            return Err(ErrorKind::ArityMismatch { expected: arity, got: argc }.into());
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(ErrorKind::FrameOverflow.into());
        }

        let slot_base = self.stack.len() - usize::from(argc) - 1;
        log::trace!("call frame {} at slot base {}", self.frames.len(), slot_base);
        self.frames.push(CallFrame { closure, ip: 0, slot_base });
        Ok(())
    }

    // Upvalues

    /// Returns the open upvalue for `stack_index`, creating it if no
    /// closure has captured that slot yet. The open list stays sorted by
    /// descending stack index.
    fn capture_upvalue(&mut self, stack_index: usize) -> Rc<Upvalue> {
        let mut insert_at = self.open_upvalues.len();
        for (pos, upvalue) in self.open_upvalues.iter().enumerate() {
            let open_index = upvalue.open_index().expect("open upvalue");
            if open_index == stack_index {
                return Rc::clone(upvalue);
            }
            if open_index < stack_index {
                insert_at = pos;
                break;
            }
        }

        let upvalue = Rc::new(Upvalue::open(stack_index));
        self.open_upvalues.insert(insert_at, Rc::clone(&upvalue));
        upvalue
    }

    /// Closes every open upvalue pointing at `from_index` or above, moving
    /// the captured stack values into the upvalue cells.
    fn close_upvalues(&mut self, from_index: usize) {
        while !self.open_upvalues.is_empty() {
            let index = self.open_upvalues[0].open_index().expect("open upvalue");
            if index < from_index {
                break;
            }
            let upvalue = self.open_upvalues.remove(0);
            upvalue.close(self.stack[index].clone());
        }
    }

    fn read_upvalue(&self, upvalue: &Upvalue) -> Value {
        match &*upvalue.state() {
            UpvalueState::Open(index) => self.stack[*index].clone(),
            UpvalueState::Closed(value) => value.clone(),
        }
    }

    // Dispatch

    fn exec_next(&mut self) -> ExecResult<Control> {
        let offset = self.frame().ip;
        let op_byte = self.read_byte();
        let opcode = OpCode::from_byte(op_byte)
            .unwrap_or_else(|| panic!("invalid instruction: {:x}", op_byte));

        log::trace!("{:04} {}", offset, opcode);

        match opcode {
            OpCode::Exit => return Ok(Control::Exit),

            OpCode::Return => {
                let result = self.pop();
                let frame = self.frames.pop().expect("no call frame");
                self.close_upvalues(frame.slot_base);
                self.stack.truncate(frame.slot_base);
                self.push(result)?;
            }

            OpCode::Pop => {
                self.pop();
            }

            OpCode::Constant => {
                let value = self.read_constant();
                self.push(value)?;
            }

            OpCode::Nil => self.push(Value::Nil)?,
            OpCode::True => self.push(Value::True)?,
            OpCode::False => self.push(Value::False)?,

            OpCode::Not => {
                let value = self.pop();
                let value = value.as_bool().ok_or(ErrorKind::ExpectedBoolValue)?;
                self.push(Value::from(!value))?;
            }

            OpCode::Add => {
                let rhs = self.pop();
                let lhs = self.pop();
                match (&lhs, &rhs) {
                    (Value::Number(a), Value::Number(b)) => {
                        self.push(Value::Number(a + b))?;
                    }
                    (Value::String(a), Value::String(b)) => {
                        let result = [self.strings.resolve(*a), self.strings.resolve(*b)].concat();
                        let symbol = self.strings.intern(&result);
                        self.push(Value::String(symbol))?;
                    }
                    _ => return Err(ErrorKind::InvalidBinaryOperands.into()),
                }
            }
            OpCode::Sub => self.binary_arith(|a, b| a - b)?,
            OpCode::Mul => self.binary_arith(|a, b| a * b)?,
            OpCode::Div => self.binary_arith(|a, b| a / b)?,

            OpCode::Eq => {
                let rhs = self.pop();
                let lhs = self.pop();
                self.push(Value::from(lhs == rhs))?;
            }
            OpCode::NotEq => {
                let rhs = self.pop();
                let lhs = self.pop();
                self.push(Value::from(lhs != rhs))?;
            }

            OpCode::Lt => self.binary_cmp(|a, b| a < b)?,
            OpCode::Gt => self.binary_cmp(|a, b| a > b)?,
            OpCode::LtEq => self.binary_cmp(|a, b| a <= b)?,
            OpCode::GtEq => self.binary_cmp(|a, b| a >= b)?,

            OpCode::DefineGlobal => {
                let name = self.read_string_constant();
                let value = self.peek(0).clone();
                self.globals.insert(name, value);
                self.pop();
            }
            OpCode::GetGlobal => {
                let name = self.read_string_constant();
                let value = match self.globals.get(&name) {
                    Some(value) => value.clone(),
                    None => return Err(self.undefined_variable(name)),
                };
                self.push(value)?;
            }
            OpCode::SetGlobal => {
                let name = self.read_string_constant();
                if !self.globals.contains_key(&name) {
                    return Err(self.undefined_variable(name));
                }
                let value = self.peek(0).clone();
                self.globals.insert(name, value);
            }

            OpCode::GetLocal => {
                let slot = usize::from(self.read_byte());
                let value = self.stack[self.frame().slot_base + slot].clone();
                self.push(value)?;
            }
            OpCode::SetLocal => {
                let slot = usize::from(self.read_byte());
                let index = self.frame().slot_base + slot;
                self.stack[index] = self.peek(0).clone();
            }

            OpCode::GetUpvalue => {
                let index = self.read_byte();
                let upvalue = Rc::clone(self.frame().closure.upvalue(index));
                let value = self.read_upvalue(&upvalue);
                self.push(value)?;
            }
            OpCode::SetUpvalue => {
                let index = self.read_byte();
                let upvalue = Rc::clone(self.frame().closure.upvalue(index));
                let value = self.peek(0).clone();
                match upvalue.open_index() {
                    Some(stack_index) => self.stack[stack_index] = value,
                    None => upvalue.set_closed(value),
                }
            }

            OpCode::Jump => {
                let offset = usize::from(self.read_u16());
                self.frame_mut().ip += offset;
            }
            OpCode::JumpIfFalse => {
                let offset = usize::from(self.read_u16());
                let cond = self.peek(0).as_bool().ok_or(ErrorKind::ExpectedBoolCondition)?;
                if !cond {
                    self.frame_mut().ip += offset;
                }
            }
            OpCode::JumpIfTrue => {
                let offset = usize::from(self.read_u16());
                let cond = self.peek(0).as_bool().ok_or(ErrorKind::ExpectedBoolCondition)?;
                if cond {
                    self.frame_mut().ip += offset;
                }
            }
            OpCode::JumpIfNotMatch => {
                let offset = usize::from(self.read_u16());
                let pattern = self.pop();
                if *self.peek(0) != pattern {
                    self.frame_mut().ip += offset;
                }
            }
            OpCode::Loop => {
                let offset = usize::from(self.read_u16());
                self.frame_mut().ip = offset;
            }
            OpCode::MatchFail => {
                self.pop(); // the unmatched scrutinee
                return Err(ErrorKind::NoPatternMatched.into());
            }

            OpCode::Call => {
                let argc = self.read_byte();
                let callee = self.peek(usize::from(argc)).clone();
                self.call_value(callee, argc)?;
            }

            OpCode::Closure => {
                let function = match self.read_constant() {
                    Value::Function(function) => function,
                    _ => panic!("invalid closure constant"),
                };

                let mut upvalues = Vec::with_capacity(usize::from(function.upvalue_count()));
                for _ in 0..function.upvalue_count() {
                    let is_local = self.read_byte() != 0;
                    let index = self.read_byte();
                    let upvalue = if is_local {
                        let stack_index = self.frame().slot_base + usize::from(index);
                        self.capture_upvalue(stack_index)
                    } else {
                        Rc::clone(self.frame().closure.upvalue(index))
                    };
                    upvalues.push(upvalue);
                }

                let closure = Closure::new(function, upvalues);
                self.push(Value::Closure(Rc::new(closure)))?;
            }

            OpCode::CloseUpvalue => {
                let top = self.stack.len() - 1;
                self.close_upvalues(top);
                self.pop();
            }

            OpCode::Debug => {
                let value = self.pop();
                let result = writeln!(self.debug_sink, "DEBUG: {}", value.display(&self.strings));
                if let Err(error) = result {
                    log::warn!("debug sink write failed: {}", error);
                }
            }
        }

        Ok(Control::Next)
    }

    fn binary_arith(&mut self, op: fn(f64, f64) -> f64) -> ExecResult<()> {
        let rhs = self.pop();
        let lhs = self.pop();
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => self.push(Value::Number(op(a, b))),
            _ => Err(ErrorKind::InvalidBinaryOperands.into()),
        }
    }

    fn binary_cmp(&mut self, op: fn(f64, f64) -> bool) -> ExecResult<()> {
        let rhs = self.pop();
        let lhs = self.pop();
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => self.push(Value::from(op(a, b))),
            _ => Err(ErrorKind::InvalidCompareOperands.into()),
        }
    }

    fn undefined_variable(&self, name: StringSymbol) -> RuntimeError {
        ErrorKind::UndefinedVariable(self.strings.resolve(name).to_string()).into()
    }
}
