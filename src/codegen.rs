//! Single-pass compiler: source text goes in, a compiled top-level
//! `Function` comes out. There is no AST; the Pratt parser emits bytecode
//! as it consumes tokens.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::lexer::{LexError, Lexer, Token, TokenData};
use crate::runtime::function::Function;
use crate::runtime::strings::{StringSymbol, StringTable};
use crate::runtime::Value;

pub mod chunk;
pub mod errors;
pub mod opcodes;
pub mod scope;


pub use chunk::{Chunk, ConstID, MAX_CONSTANTS};
pub use errors::{CompileError, CompileResult, ErrorKind};
pub use opcodes::OpCode;
pub use scope::{LocalIndex, UpvalueIndex, UpvalueTarget};

use scope::{Scope, ScopeTracker};

pub const MAX_ARITY: usize = 255;

/// Compiles `source` into the top-level function. Every string the program
/// mentions is interned into `strings`, which the VM owns.
pub fn compile(source: &str, strings: &mut StringTable) -> Result<Rc<Function>, Vec<CompileError>> {
    Compiler::new(source, strings).compile_script()
}

// Parse precedence table, low to high. Binary operators recurse at their
// own level, making them right-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Lowest,
    Cond,    // == != < > <= >=
    Sum,     // + -
    Product, // * /
    Call,    // ()
}

type PrefixFn<'s, 'm> = fn(&mut Compiler<'s, 'm>, bool) -> CompileResult<()>;
type InfixFn<'s, 'm> = fn(&mut Compiler<'s, 'm>) -> CompileResult<()>;

struct GrammarRule<'s, 'm> {
    prefix: Option<PrefixFn<'s, 'm>>,
    infix: Option<InfixFn<'s, 'm>>,
    precedence: Precedence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtKind {
    Expression, // left a value on the stack; the caller decides its fate
    Other,
}

// Key for constant deduplication. Functions are never deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Number([u8; 8]),
    String(StringSymbol),
}

/// Compilation state for one function; frames nest as `fn` declarations do.
struct FunctionFrame {
    chunk: Chunk,
    dedup: FxHashMap<ConstKey, ConstID>,
}

impl FunctionFrame {
    fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            dedup: FxHashMap::default(),
        }
    }
}

struct Compiler<'s, 'm> {
    lexer: Lexer<'s>,
    current: TokenData<'s>,
    previous: TokenData<'s>,
    strings: &'m mut StringTable,
    scopes: ScopeTracker,
    frames: Vec<FunctionFrame>,
    errors: Vec<CompileError>,
}

impl<'s, 'm> Compiler<'s, 'm> {
    fn new(source: &'s str, strings: &'m mut StringTable) -> Self {
        let placeholder = TokenData { token: Token::Eof, lexeme: "", line: 1 };

        Self {
            lexer: Lexer::new(source),
            current: placeholder,
            previous: placeholder,
            strings,
            scopes: ScopeTracker::new(),
            frames: vec![FunctionFrame::new()],
            errors: Vec::new(),
        }
    }

    fn compile_script(mut self) -> Result<Rc<Function>, Vec<CompileError>> {
        self.advance();
        self.ignore_newlines();

        while !self.check(&Token::Eof) {
            match self.declaration() {
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
                Ok(kind) => {
                    if kind == StmtKind::Expression {
                        self.emit_op(OpCode::Pop);
                    }
                    // without a newline, the file must end on this line
                    if !self.matches_line() && !self.check(&Token::Eof) {
                        let error = self.error_at_current("Expected end of line");
                        self.report(error);
                        self.synchronize();
                    }
                }
            }
        }

        self.emit_op(OpCode::Exit);

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        let frame = self.frames.pop().expect("script frame");
        log::debug!("compiled script: {} bytes of code", frame.chunk.len());

        Ok(Rc::new(Function::new(0, 0, None, frame.chunk)))
    }

    // Token Handling

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            match self.current.token {
                Token::Error(LexError::InvalidChar) => {
                    let kind = ErrorKind::InvalidCharacter(self.current.lexeme.to_string());
                    let error = CompileError::from(kind).with_line(self.current.line);
                    self.report(error);
                }
                Token::Error(LexError::UnterminatedString) => {
                    let error = CompileError::from(ErrorKind::UnterminatedString)
                        .with_line(self.current.line);
                    self.report(error);
                }
                _ => break,
            }
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.current.token.same_kind(token)
    }

    fn matches(&mut self, token: &Token) -> bool {
        if !self.check(token) {
            return false;
        }
        self.advance();
        true
    }

    fn matches_line(&mut self) -> bool {
        if !self.matches(&Token::Newline) {
            return false;
        }
        while self.matches(&Token::Newline) {}
        true
    }

    fn ignore_newlines(&mut self) {
        self.matches_line();
    }

    fn consume(&mut self, token: &Token, message: &str) -> CompileResult<()> {
        if self.matches(token) {
            return Ok(());
        }
        Err(self.error_at_current(message))
    }

    fn consume_ident(&mut self, message: &str) -> CompileResult<&'s str> {
        if matches!(self.current.token, Token::Ident(_)) {
            self.advance();
            return Ok(self.previous.lexeme);
        }
        Err(self.error_at_current(message))
    }

    // Error Handling

    fn error_at_current(&self, message: &str) -> CompileError {
        CompileError::from(ErrorKind::UnexpectedToken(message.to_string()))
            .with_line(self.current.line)
    }

    fn report(&mut self, error: CompileError) {
        let error = error.with_line(self.current.line);
        self.errors.push(error);
    }

    /// Skip to the start of the next statement so that one mistake does not
    /// drown the rest of the compile in follow-on errors.
    fn synchronize(&mut self) {
        loop {
            match self.current.token {
                Token::Eof => return,
                Token::Newline => {
                    self.advance();
                    self.ignore_newlines();
                    return;
                }
                _ => self.advance(),
            }
        }
    }

    // Bytecode

    fn chunk(&self) -> &Chunk {
        &self.frames.last().expect("current frame").chunk
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.frames.last_mut().expect("current frame").chunk
    }

    fn emit_op(&mut self, opcode: OpCode) {
        let line = self.previous.line;
        self.chunk_mut().write_instr(opcode, line);
    }

    fn emit_op_byte(&mut self, opcode: OpCode, byte: u8) {
        let line = self.previous.line;
        let chunk = self.chunk_mut();
        chunk.write_instr(opcode, line);
        chunk.write(byte, line);
    }

    fn add_constant(&mut self, value: Value) -> CompileResult<ConstID> {
        let line = self.previous.line;
        let key = match &value {
            Value::Number(n) => Some(ConstKey::Number(n.to_le_bytes())),
            Value::String(symbol) => Some(ConstKey::String(*symbol)),
            _ => None,
        };

        let frame = self.frames.last_mut().expect("current frame");
        if let Some(key) = key {
            if let Some(const_id) = frame.dedup.get(&key) {
                return Ok(*const_id);
            }
            let const_id = frame.chunk.add_constant(value).map_err(|e| e.with_line(line))?;
            frame.dedup.insert(key, const_id);
            return Ok(const_id);
        }

        frame.chunk.add_constant(value).map_err(|e| e.with_line(line))
    }

    fn emit_constant(&mut self, value: Value) -> CompileResult<()> {
        let const_id = self.add_constant(value)?;
        self.emit_op_byte(OpCode::Constant, const_id);
        Ok(())
    }

    fn name_constant(&mut self, name: StringSymbol) -> CompileResult<ConstID> {
        self.add_constant(Value::String(name))
    }

    /// Emits a jump with a placeholder offset; returns the offset of the
    /// operand for later backpatching.
    fn emit_jump(&mut self, opcode: OpCode) -> usize {
        let line = self.previous.line;
        let chunk = self.chunk_mut();
        chunk.write_instr(opcode, line);
        let operand = chunk.len();
        chunk.write(0xFFu8, line);
        chunk.write(0xFFu8, line);
        operand
    }

    fn patch_jump(&mut self, operand: usize) -> CompileResult<()> {
        // the offset is relative to the instruction after the operand
        let jump = self.chunk().len() - operand - 2;
        let offset = u16::try_from(jump)
            .map_err(|_| CompileError::from(ErrorKind::JumpOffsetLimit)
                .with_line(self.previous.line))?;
        self.chunk_mut().patch_bytes(operand, &offset.to_be_bytes());
        Ok(())
    }

    // Declarations and Statements

    fn declaration(&mut self) -> CompileResult<StmtKind> {
        if self.matches(&Token::Let) {
            self.let_decl()?;
            return Ok(StmtKind::Other);
        }
        if self.matches(&Token::Fn) {
            self.fn_decl()?;
            return Ok(StmtKind::Other);
        }
        self.statement()
    }

    fn statement(&mut self) -> CompileResult<StmtKind> {
        if self.matches(&Token::Debug) {
            self.expression()?;
            self.emit_op(OpCode::Debug);
            return Ok(StmtKind::Other);
        }
        if self.matches(&Token::If) {
            self.if_stmt()?;
            return Ok(StmtKind::Other);
        }
        if self.matches(&Token::LBrace) {
            self.block()?;
            return Ok(StmtKind::Other);
        }

        self.expression()?;
        Ok(StmtKind::Expression)
    }

    fn let_decl(&mut self) -> CompileResult<()> {
        let text = self.consume_ident("Expected an identifier")?;
        let name = self.strings.intern(text);

        // The variable is not in scope in its own initializer.
        self.consume(&Token::Assign, "Expected '='")?;
        self.expression()?;

        self.define_variable(name, text)
    }

    /// Binds `name` to the value on top of the stack: a global definition at
    /// the top level, otherwise a fresh local slot (the value already sits
    /// exactly where the slot lives).
    fn define_variable(&mut self, name: StringSymbol, text: &str) -> CompileResult<()> {
        if self.scopes.is_global_scope() {
            let const_id = self.name_constant(name)?;
            self.emit_op_byte(OpCode::DefineGlobal, const_id);
            return Ok(());
        }

        let line = self.previous.line;
        self.scopes.declare_local(name, text)
            .map(|_| ())
            .map_err(|e| e.with_line(line))
    }

    fn fn_decl(&mut self) -> CompileResult<()> {
        let text = self.consume_ident("Expected a function name")?;
        let name = self.strings.intern(text);

        self.function(name)?;
        self.define_variable(name, text)
    }

    /// Compiles a function in a fresh frame and emits the `CLOSURE`
    /// instruction (plus upvalue descriptors) at the definition site.
    fn function(&mut self, name: StringSymbol) -> CompileResult<()> {
        self.scopes.push_frame(Some(name));
        self.frames.push(FunctionFrame::new());

        let result = self.function_inner();

        // rebalance even on a parse error
        let scope_frame = self.scopes.pop_frame();
        let frame = self.frames.pop().expect("function frame");
        let arity = result?;

        let upvalues = scope_frame.upvalues();
        let upvalue_count = u8::try_from(upvalues.len()).expect("upvalue limit");
        let function = Function::new(arity, upvalue_count, Some(name), frame.chunk);

        log::debug!(
            "compiled function '{}': arity {}, {} upvalues",
            self.strings.resolve(name), arity, upvalue_count,
        );

        let const_id = self.add_constant(Value::Function(Rc::new(function)))?;
        self.emit_op_byte(OpCode::Closure, const_id);
        for upvalue in upvalues {
            let (is_local, index) = match upvalue.target() {
                UpvalueTarget::Local(index) => (1u8, index),
                UpvalueTarget::Upvalue(index) => (0u8, index),
            };
            let line = self.previous.line;
            self.chunk_mut().write(is_local, line);
            self.chunk_mut().write(index, line);
        }

        Ok(())
    }

    fn function_inner(&mut self) -> CompileResult<u8> {
        // parameters are bare identifiers between the name and the body
        let mut arity: usize = 0;
        while matches!(self.current.token, Token::Ident(_)) {
            self.advance();
            let text = self.previous.lexeme;
            let name = self.strings.intern(text);
            let line = self.previous.line;
            self.scopes.declare_local(name, text).map_err(|e| e.with_line(line))?;

            arity += 1;
            if arity > MAX_ARITY {
                return Err(CompileError::from(ErrorKind::ParamCountLimit).with_line(line));
            }
        }
        let arity = arity as u8;

        // the body may start on the following line
        self.ignore_newlines();

        if self.matches(&Token::LBrace) {
            // the last bare expression of the body is the return value
            let has_value = self.block_body(true)?;
            if !has_value {
                self.emit_op(OpCode::Nil);
            }
        } else if self.check(&Token::Pipe) {
            // match-chain body over the first parameter
            if arity == 0 {
                return Err(CompileError::from(ErrorKind::MatchBodyWithoutParams)
                    .with_line(self.current.line));
            }
            self.emit_op_byte(OpCode::GetLocal, 1);
            self.match_arms()?;
        } else {
            return Err(self.error_at_current("Expected '{' or '|' before function body"));
        }

        self.emit_op(OpCode::Return);
        Ok(arity)
    }

    fn block(&mut self) -> CompileResult<()> {
        self.scopes.push_scope();
        let result = self.block_body(false);

        // rebalance even on a parse error
        let scope = self.scopes.pop_scope();
        result?;

        self.emit_scope_drop(&scope);
        Ok(())
    }

    /// Compiles statements up to the closing `}`. With `keep_value`, a
    /// trailing bare expression is left on the stack and `true` is returned.
    fn block_body(&mut self, keep_value: bool) -> CompileResult<bool> {
        self.ignore_newlines();

        let mut has_value = false;
        while !self.check(&Token::RBrace) && !self.check(&Token::Eof) {
            let kind = self.declaration()?;
            self.ignore_newlines();

            if kind == StmtKind::Expression {
                if keep_value && self.check(&Token::RBrace) {
                    has_value = true;
                } else {
                    self.emit_op(OpCode::Pop);
                }
            }
        }

        self.consume(&Token::RBrace, "Expected '}' at the end of block")?;
        Ok(has_value)
    }

    /// Pops block locals; captured ones are closed instead so that any
    /// closures holding them keep a live cell.
    fn emit_scope_drop(&mut self, scope: &Scope) {
        for local in scope.locals().iter().rev() {
            if local.captured() {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
        }
    }

    fn if_stmt(&mut self) -> CompileResult<()> {
        self.expression()?;

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);

        self.consume(&Token::LBrace, "Expected '{' after if condition")?;
        self.block()?;

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump)?;
        self.emit_op(OpCode::Pop);

        if self.matches(&Token::Else) {
            if self.matches(&Token::If) {
                self.if_stmt()?;
            } else {
                self.consume(&Token::LBrace, "Expected '{' after else")?;
                self.block()?;
            }
        }

        self.patch_jump(else_jump)
    }

    // Expressions

    fn expression(&mut self) -> CompileResult<()> {
        self.parse_precedence(Precedence::Lowest)
    }

    fn parse_precedence(&mut self, min_prec: Precedence) -> CompileResult<()> {
        self.advance();

        let prefix = Self::rule(&self.previous.token).prefix.ok_or_else(|| {
            CompileError::from(ErrorKind::ExpectedExpression).with_line(self.previous.line)
        })?;

        let can_assign = min_prec <= Precedence::Lowest;
        prefix(self, can_assign)?;

        while min_prec < Self::rule(&self.current.token).precedence {
            self.advance();
            let infix = Self::rule(&self.previous.token).infix.expect("infix rule");
            infix(self)?;
        }

        if can_assign && self.check(&Token::Assign) {
            return Err(CompileError::from(ErrorKind::InvalidAssignTarget)
                .with_line(self.current.line));
        }

        Ok(())
    }

    // Oba grammar rules.
    //
    // The prefix and infix handlers for the same token live on one rule, in
    // the style described in the Pratt parser tutorial at stuffwithstuff.
    // Handlers read the just-consumed token from `self.previous`.
    fn rule(token: &Token) -> GrammarRule<'s, 'm> {
        macro_rules! unused {
            () => { GrammarRule { prefix: None, infix: None, precedence: Precedence::None } };
        }
        macro_rules! prefix {
            ( $fn:expr ) => {
                GrammarRule { prefix: Some($fn), infix: None, precedence: Precedence::None }
            };
        }
        macro_rules! infix_operator {
            ( $prec:ident ) => {
                GrammarRule {
                    prefix: None,
                    infix: Some(Self::binary_op),
                    precedence: Precedence::$prec,
                }
            };
        }

        match token {
            Token::LParen => GrammarRule {
                prefix: Some(Self::grouping),
                infix: Some(Self::call),
                precedence: Precedence::Call,
            },

            Token::Not => prefix!(Self::unary_op),

            Token::Eq | Token::NotEq
            | Token::Lt | Token::Gt
            | Token::LtEq | Token::GtEq => infix_operator!(Cond),

            Token::Plus | Token::Minus => infix_operator!(Sum),
            Token::Star | Token::Slash => infix_operator!(Product),

            Token::Ident(_) => prefix!(Self::identifier),
            Token::Number(_) | Token::True | Token::False => prefix!(Self::literal),
            Token::StringLit(_) => prefix!(Self::string),
            Token::Match => prefix!(Self::match_expr),

            _ => unused!(),
        }
    }

    // A parenthesized expression.
    fn grouping(&mut self, _can_assign: bool) -> CompileResult<()> {
        self.ignore_newlines();
        self.expression()?;
        self.ignore_newlines();
        self.consume(&Token::RParen, "Expected ')' after expression")
    }

    fn literal(&mut self, _can_assign: bool) -> CompileResult<()> {
        match self.previous.token {
            Token::True => self.emit_op(OpCode::True),
            Token::False => self.emit_op(OpCode::False),
            Token::Number(value) => self.emit_constant(Value::Number(value))?,
            _ => unreachable!("literal rule"),
        }
        Ok(())
    }

    fn string(&mut self, _can_assign: bool) -> CompileResult<()> {
        match self.previous.token {
            Token::StringLit(content) => {
                let symbol = self.strings.intern(content);
                self.emit_constant(Value::String(symbol))
            }
            _ => unreachable!("string rule"),
        }
    }

    /// Variable reference or, at assignment precedence, a store.
    /// Resolution order: local slot, then upvalue capture, then global.
    fn identifier(&mut self, can_assign: bool) -> CompileResult<()> {
        let text = self.previous.lexeme;
        let line = self.previous.line;
        let name = self.strings.intern(text);

        let (get_op, set_op, arg) = if let Some(slot) = self.scopes.resolve_local(name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(index) = self.scopes.resolve_or_create_upval(name)
            .map_err(|e| e.with_line(line))?
        {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
        } else {
            let const_id = self.name_constant(name)?;
            (OpCode::GetGlobal, OpCode::SetGlobal, const_id)
        };

        if can_assign && self.matches(&Token::Assign) {
            self.ignore_newlines();
            self.expression()?;
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }

        Ok(())
    }

    fn unary_op(&mut self, _can_assign: bool) -> CompileResult<()> {
        let op = self.previous.token;
        let precedence = Self::rule(&op).precedence;

        self.ignore_newlines();

        // Compile the operand (right-associative).
        self.parse_precedence(precedence)?;

        match op {
            Token::Not => self.emit_op(OpCode::Not),
            _ => unreachable!("unary rule"),
        }
        Ok(())
    }

    fn binary_op(&mut self) -> CompileResult<()> {
        let op = self.previous.token;
        let precedence = Self::rule(&op).precedence;

        self.ignore_newlines();

        // Compile the right hand side (right-associative).
        self.parse_precedence(precedence)?;

        let opcode = match op {
            Token::Plus => OpCode::Add,
            Token::Minus => OpCode::Sub,
            Token::Star => OpCode::Mul,
            Token::Slash => OpCode::Div,
            Token::Eq => OpCode::Eq,
            Token::NotEq => OpCode::NotEq,
            Token::Lt => OpCode::Lt,
            Token::Gt => OpCode::Gt,
            Token::LtEq => OpCode::LtEq,
            Token::GtEq => OpCode::GtEq,
            _ => unreachable!("binary rule"),
        };
        self.emit_op(opcode);
        Ok(())
    }

    // A call expression; '(' in infix position.
    fn call(&mut self) -> CompileResult<()> {
        let mut argc: usize = 0;

        self.ignore_newlines();
        if !self.check(&Token::RParen) {
            loop {
                self.expression()?;
                argc += 1;
                if argc > MAX_ARITY {
                    return Err(CompileError::from(ErrorKind::ArgCountLimit)
                        .with_line(self.previous.line));
                }
                self.ignore_newlines();
                if self.check(&Token::RParen) {
                    break;
                }
            }
        }
        self.consume(&Token::RParen, "Expected ')' after arguments")?;

        self.emit_op_byte(OpCode::Call, argc as u8);
        Ok(())
    }

    /// `match EXPR | PAT = BODY ... ;` — the scrutinee stays on the stack
    /// while arms test against it; the matching arm pops it and leaves the
    /// body's value. Falling off the end is a runtime error.
    fn match_expr(&mut self, _can_assign: bool) -> CompileResult<()> {
        self.expression()?;
        self.match_arms()
    }

    fn match_arms(&mut self) -> CompileResult<()> {
        self.ignore_newlines();
        self.consume(&Token::Pipe, "Expected '|' to begin match arms")?;

        let mut end_jumps = Vec::new();
        loop {
            // patterns are value expressions, compared by equality;
            // parsing above assignment keeps the arm's '=' out of them
            self.parse_precedence(Precedence::Cond)?;

            if !self.matches(&Token::Assign) && !self.matches(&Token::EqArrow) {
                return Err(self.error_at_current("Expected '=' after match pattern"));
            }

            let next_arm = self.emit_jump(OpCode::JumpIfNotMatch);
            self.emit_op(OpCode::Pop); // the matched scrutinee
            self.expression()?;
            end_jumps.push(self.emit_jump(OpCode::Jump));
            self.patch_jump(next_arm)?;

            self.ignore_newlines();
            if self.matches(&Token::Pipe) {
                continue;
            }
            self.consume(&Token::Semicolon, "Expected ';' to close match")?;
            break;
        }

        self.emit_op(OpCode::MatchFail);
        for jump in end_jumps {
            self.patch_jump(jump)?;
        }
        Ok(())
    }
}
