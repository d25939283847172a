// Opcodes

// Rust enums are not like C enums, so to convert between opcodes and the
// raw bytes in a chunk we explicitly define each value as a const.

// 0x00         Control

const OP_RETURN:        u8 = 0x00;  // [ result ] => []; unwind current frame
const OP_EXIT:          u8 = 0x01;  // halt normally

// 0x10-0x30    Immediate Values

const OP_POP:           u8 = 0x10;  // [ _ ] => []

const OP_CONSTANT:      u8 = 0x20;  // (u8); _ => [ value ]
// const OP_CONSTANT_16: u8 = 0x21;  // reserved for 16-bit constant indices

const OP_NIL:           u8 = 0x30;  // _ => [ nil ]
const OP_FALSE:         u8 = 0x31;  // _ => [ false ]
const OP_TRUE:          u8 = 0x32;  // _ => [ true ]

// 0x40         Unary Operations

const OP_NOT:           u8 = 0x40;  // [ bool ] => [ bool ]

// 0x50         Binary Operations

const OP_ADD:           u8 = 0x50;  // [ lhs rhs ] => [ result ]
const OP_SUB:           u8 = 0x51;
const OP_MUL:           u8 = 0x52;
const OP_DIV:           u8 = 0x53;

const OP_EQ:            u8 = 0x58;
const OP_NEQ:           u8 = 0x59;
const OP_LT:            u8 = 0x5A;
const OP_GT:            u8 = 0x5B;
const OP_LTE:           u8 = 0x5C;
const OP_GTE:           u8 = 0x5D;

// 0x60         Variable Access

const OP_DEFINE_GLOBAL: u8 = 0x60;  // (u8 name); [ value ] => []
const OP_GET_GLOBAL:    u8 = 0x61;  // (u8 name); _ => [ value ]
const OP_SET_GLOBAL:    u8 = 0x62;  // (u8 name); [ value ] => [ value ]
const OP_GET_LOCAL:     u8 = 0x63;  // (u8 slot); _ => [ value ]
const OP_SET_LOCAL:     u8 = 0x64;  // (u8 slot); [ value ] => [ value ]
const OP_GET_UPVALUE:   u8 = 0x65;  // (u8 idx); _ => [ value ]
const OP_SET_UPVALUE:   u8 = 0x66;  // (u8 idx); [ value ] => [ value ]

// 0x70         Jumps

const OP_JUMP:              u8 = 0x70;  // (u16 BE); relative forward
const OP_JUMP_IF_FALSE:     u8 = 0x71;  // (u16 BE); peek, requires bool
const OP_JUMP_IF_TRUE:      u8 = 0x72;  // (u16 BE); peek, requires bool
const OP_JUMP_IF_NOT_MATCH: u8 = 0x73;  // (u16 BE); [ scrut pat ] => [ scrut ]
const OP_LOOP:              u8 = 0x74;  // (u16 BE); absolute from chunk start
const OP_MATCH_FAIL:        u8 = 0x75;  // [ scrut ] => runtime error

// 0x80         Functions

const OP_CALL:          u8 = 0x80;  // (u8 argc); [ callee args... ] => frame
const OP_CLOSURE:       u8 = 0x81;  // (u8 const + 2 bytes per upvalue); _ => [ closure ]
const OP_CLOSE_UPVALUE: u8 = 0x82;  // [ value ] => []; close upvalue at top

// 0xF0         Debugging

const OP_DEBUG:         u8 = 0xF0;  // [ value ] => []; print it


#[repr(u8)]
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum OpCode {
    Return = OP_RETURN,
    Exit = OP_EXIT,

    Pop = OP_POP,
    Constant = OP_CONSTANT,

    Nil = OP_NIL,
    False = OP_FALSE,
    True = OP_TRUE,

    Not = OP_NOT,

    Add = OP_ADD,
    Sub = OP_SUB,
    Mul = OP_MUL,
    Div = OP_DIV,
    Eq = OP_EQ,
    NotEq = OP_NEQ,
    Lt = OP_LT,
    Gt = OP_GT,
    LtEq = OP_LTE,
    GtEq = OP_GTE,

    DefineGlobal = OP_DEFINE_GLOBAL,
    GetGlobal = OP_GET_GLOBAL,
    SetGlobal = OP_SET_GLOBAL,
    GetLocal = OP_GET_LOCAL,
    SetLocal = OP_SET_LOCAL,
    GetUpvalue = OP_GET_UPVALUE,
    SetUpvalue = OP_SET_UPVALUE,

    Jump = OP_JUMP,
    JumpIfFalse = OP_JUMP_IF_FALSE,
    JumpIfTrue = OP_JUMP_IF_TRUE,
    JumpIfNotMatch = OP_JUMP_IF_NOT_MATCH,
    Loop = OP_LOOP,
    MatchFail = OP_MATCH_FAIL,

    Call = OP_CALL,
    Closure = OP_CLOSURE,
    CloseUpvalue = OP_CLOSE_UPVALUE,

    Debug = OP_DEBUG,
}

impl OpCode {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        let opcode = match byte {
            OP_RETURN => Self::Return,
            OP_EXIT => Self::Exit,

            OP_POP => Self::Pop,
            OP_CONSTANT => Self::Constant,

            OP_NIL => Self::Nil,
            OP_FALSE => Self::False,
            OP_TRUE => Self::True,

            OP_NOT => Self::Not,

            OP_ADD => Self::Add,
            OP_SUB => Self::Sub,
            OP_MUL => Self::Mul,
            OP_DIV => Self::Div,
            OP_EQ => Self::Eq,
            OP_NEQ => Self::NotEq,
            OP_LT => Self::Lt,
            OP_GT => Self::Gt,
            OP_LTE => Self::LtEq,
            OP_GTE => Self::GtEq,

            OP_DEFINE_GLOBAL => Self::DefineGlobal,
            OP_GET_GLOBAL => Self::GetGlobal,
            OP_SET_GLOBAL => Self::SetGlobal,
            OP_GET_LOCAL => Self::GetLocal,
            OP_SET_LOCAL => Self::SetLocal,
            OP_GET_UPVALUE => Self::GetUpvalue,
            OP_SET_UPVALUE => Self::SetUpvalue,

            OP_JUMP => Self::Jump,
            OP_JUMP_IF_FALSE => Self::JumpIfFalse,
            OP_JUMP_IF_TRUE => Self::JumpIfTrue,
            OP_JUMP_IF_NOT_MATCH => Self::JumpIfNotMatch,
            OP_LOOP => Self::Loop,
            OP_MATCH_FAIL => Self::MatchFail,

            OP_CALL => Self::Call,
            OP_CLOSURE => Self::Closure,
            OP_CLOSE_UPVALUE => Self::CloseUpvalue,

            OP_DEBUG => Self::Debug,

            _ => return None,
        };
        Some(opcode)
    }

    /// Instruction length in bytes, including the opcode itself.
    /// `Closure` additionally trails two bytes per upvalue, which the VM
    /// consumes while building the closure.
    #[inline]
    pub fn instr_len(&self) -> usize {
        match self {
            Self::Constant
            | Self::DefineGlobal | Self::GetGlobal | Self::SetGlobal
            | Self::GetLocal | Self::SetLocal
            | Self::GetUpvalue | Self::SetUpvalue
            | Self::Call | Self::Closure => 2,

            Self::Jump
            | Self::JumpIfFalse | Self::JumpIfTrue | Self::JumpIfNotMatch
            | Self::Loop => 3,

            _ => 1,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> Self { opcode as u8 }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;
    fn try_from(byte: u8) -> Result<Self, u8> {
        Self::from_byte(byte).ok_or(byte)
    }
}

impl PartialEq<u8> for OpCode {
    fn eq(&self, other: &u8) -> bool { *other == (*self).into() }
}

// For disassembly/debugging
impl std::fmt::Display for OpCode {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = match *self {
            Self::Return => "OP_RETURN",
            Self::Exit => "OP_EXIT",

            Self::Pop => "OP_POP",
            Self::Constant => "OP_CONSTANT",

            Self::Nil => "OP_NIL",
            Self::False => "OP_FALSE",
            Self::True => "OP_TRUE",

            Self::Not => "OP_NOT",

            Self::Add => "OP_ADD",
            Self::Sub => "OP_SUB",
            Self::Mul => "OP_MUL",
            Self::Div => "OP_DIV",
            Self::Eq => "OP_EQ",
            Self::NotEq => "OP_NEQ",
            Self::Lt => "OP_LT",
            Self::Gt => "OP_GT",
            Self::LtEq => "OP_LTE",
            Self::GtEq => "OP_GTE",

            Self::DefineGlobal => "OP_DEFINE_GLOBAL",
            Self::GetGlobal => "OP_GET_GLOBAL",
            Self::SetGlobal => "OP_SET_GLOBAL",
            Self::GetLocal => "OP_GET_LOCAL",
            Self::SetLocal => "OP_SET_LOCAL",
            Self::GetUpvalue => "OP_GET_UPVALUE",
            Self::SetUpvalue => "OP_SET_UPVALUE",

            Self::Jump => "OP_JUMP",
            Self::JumpIfFalse => "OP_JUMP_IF_FALSE",
            Self::JumpIfTrue => "OP_JUMP_IF_TRUE",
            Self::JumpIfNotMatch => "OP_JUMP_IF_NOT_MATCH",
            Self::Loop => "OP_LOOP",
            Self::MatchFail => "OP_MATCH_FAIL",

            Self::Call => "OP_CALL",
            Self::Closure => "OP_CLOSURE",
            Self::CloseUpvalue => "OP_CLOSE_UPVALUE",

            Self::Debug => "OP_DEBUG",
        };

        if let Some(width) = fmt.width() {
            write!(fmt, "{:1$}", mnemonic, width)
        } else {
            fmt.write_str(mnemonic)
        }
    }
}
