use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::codegen::Chunk;
use crate::runtime::strings::StringSymbol;
use crate::runtime::Value;

// Compiled Functions

/// A compiled unit: parameter count, owned bytecode, and the number of
/// upvalue descriptors trailing each `OP_CLOSURE` that references it.
#[derive(Debug)]
pub struct Function {
    arity: u8,
    upvalue_count: u8,
    name: Option<StringSymbol>,
    chunk: Chunk,
}

impl Function {
    pub fn new(arity: u8, upvalue_count: u8, name: Option<StringSymbol>, chunk: Chunk) -> Self {
        Self { arity, upvalue_count, name, chunk }
    }

    pub fn arity(&self) -> u8 { self.arity }

    pub fn upvalue_count(&self) -> u8 { self.upvalue_count }

    pub fn name(&self) -> Option<StringSymbol> { self.name }

    pub fn chunk(&self) -> &Chunk { &self.chunk }
}

// Closures

/// Runtime pairing of a function with the upvalues captured at the site
/// where `OP_CLOSURE` executed.
#[derive(Debug)]
pub struct Closure {
    function: Rc<Function>,
    upvalues: Box<[Rc<Upvalue>]>,
}

impl Closure {
    pub fn new(function: Rc<Function>, upvalues: Vec<Rc<Upvalue>>) -> Self {
        debug_assert_eq!(usize::from(function.upvalue_count()), upvalues.len());
        Self {
            function,
            upvalues: upvalues.into_boxed_slice(),
        }
    }

    pub fn function(&self) -> &Rc<Function> { &self.function }

    pub fn upvalue(&self, index: u8) -> &Rc<Upvalue> {
        &self.upvalues[usize::from(index)]
    }
}

// Upvalues

/// Open upvalues refer to a live stack slot; closing one moves the value out
/// of the stack into the cell itself. All closures that captured the same
/// slot share one cell, so they observe each other's writes.
#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct Upvalue {
    state: RefCell<UpvalueState>,
}

impl Upvalue {
    pub fn open(stack_index: usize) -> Self {
        Self {
            state: RefCell::new(UpvalueState::Open(stack_index)),
        }
    }

    pub fn state(&self) -> Ref<'_, UpvalueState> {
        self.state.borrow()
    }

    /// Stack slot this upvalue points at, if still open.
    pub fn open_index(&self) -> Option<usize> {
        match *self.state.borrow() {
            UpvalueState::Open(index) => Some(index),
            UpvalueState::Closed(_) => None,
        }
    }

    pub fn close(&self, value: Value) {
        *self.state.borrow_mut() = UpvalueState::Closed(value);
    }

    /// Store through a closed upvalue. Writes to open upvalues go directly
    /// to the stack slot and are the VM's concern.
    pub fn set_closed(&self, value: Value) {
        debug_assert!(self.open_index().is_none(), "set_closed on open upvalue");
        *self.state.borrow_mut() = UpvalueState::Closed(value);
    }
}
