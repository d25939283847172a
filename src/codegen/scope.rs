// Scope Tracking

use crate::codegen::errors::{CompileResult, ErrorKind};
use crate::runtime::strings::StringSymbol;

pub type LocalIndex = u8;
pub type UpvalueIndex = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueTarget {
    /// Captures a local slot of the immediately enclosing function.
    Local(LocalIndex),
    /// Chains through an upvalue of the immediately enclosing function.
    Upvalue(UpvalueIndex),
}

#[derive(Debug, Clone)]
pub struct Local {
    name: Option<StringSymbol>, // None only for the reserved callee slot
    index: LocalIndex,
    captured: bool, // tracks whether the local is being referenced by an upvalue
}

impl Local {
    pub fn index(&self) -> LocalIndex { self.index }
    pub fn captured(&self) -> bool { self.captured }
}

#[derive(Debug)]
pub struct Scope {
    prev_index: Option<LocalIndex>,
    locals: Vec<Local>,
}

impl Scope {
    pub fn locals(&self) -> &[Local] {
        self.locals.as_slice()
    }

    fn last_index(&self) -> Option<LocalIndex> {
        self.locals.last().map_or(self.prev_index, |local| Some(local.index))
    }

    fn find_local(&self, name: StringSymbol) -> Option<&Local> {
        self.locals.iter().find(|local| local.name == Some(name))
    }

    fn find_local_mut(&mut self, name: StringSymbol) -> Option<&mut Local> {
        self.locals.iter_mut().find(|local| local.name == Some(name))
    }

    fn push_local(&mut self, name: Option<StringSymbol>) -> CompileResult<LocalIndex> {
        let index = match self.last_index() {
            None => 0,
            Some(index) => index.checked_add(1).ok_or(ErrorKind::LocalVariableLimit)?,
        };

        self.locals.push(Local { name, index, captured: false });
        Ok(index)
    }
}

#[derive(Debug, Clone)]
pub struct Upvalue {
    name: StringSymbol,
    index: UpvalueIndex,
    target: UpvalueTarget,
}

impl Upvalue {
    pub fn index(&self) -> UpvalueIndex { self.index }
    pub fn target(&self) -> UpvalueTarget { self.target }
}

/// Per-function name resolution state: the nested lexical scopes and the
/// upvalues this function captures from enclosing functions.
#[derive(Debug)]
pub struct ScopeFrame {
    scopes: Vec<Scope>,
    upvalues: Vec<Upvalue>,
}

impl ScopeFrame {
    fn new(name: Option<StringSymbol>) -> Self {
        // Slot 0 is reserved for the callee. Giving it the function's own
        // name lets recursive references resolve without a global lookup.
        let mut scope = Scope { prev_index: None, locals: Vec::new() };
        scope.push_local(name).expect("slot 0");

        Self {
            scopes: vec![scope],
            upvalues: Vec::new(),
        }
    }

    pub fn upvalues(&self) -> &[Upvalue] {
        self.upvalues.as_slice()
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("empty scope frame")
    }

    fn find_upval(&self, name: StringSymbol) -> Option<&Upvalue> {
        self.upvalues.iter().find(|upval| upval.name == name)
    }

    fn create_upval(&mut self, name: StringSymbol, target: UpvalueTarget) -> CompileResult<UpvalueIndex> {
        let index = UpvalueIndex::try_from(self.upvalues.len())
            .map_err(|_| ErrorKind::UpvalueLimit)?;

        self.upvalues.push(Upvalue { name, index, target });
        Ok(index)
    }
}

#[derive(Debug)]
pub struct ScopeTracker {
    frames: Vec<ScopeFrame>,
}

impl ScopeTracker {
    /// Starts out inside the top-level frame.
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::new(None)],
        }
    }

    /// `let` at the top level, outside any block, defines a global.
    pub fn is_global_scope(&self) -> bool {
        self.frames.len() == 1 && self.frames[0].scopes.len() == 1
    }

    pub fn push_frame(&mut self, name: Option<StringSymbol>) {
        self.frames.push(ScopeFrame::new(name));
    }

    pub fn pop_frame(&mut self) -> ScopeFrame {
        debug_assert!(self.frames.len() > 1, "pop top-level frame");
        self.frames.pop().expect("pop empty frames")
    }

    fn current_frame(&self) -> &ScopeFrame {
        self.frames.last().expect("no current frame")
    }

    fn current_frame_mut(&mut self) -> &mut ScopeFrame {
        self.frames.last_mut().expect("no current frame")
    }

    pub fn push_scope(&mut self) {
        let frame = self.current_frame_mut();
        let prev_index = frame.scopes.last().and_then(|scope| scope.last_index());
        frame.scopes.push(Scope { prev_index, locals: Vec::new() });
    }

    pub fn pop_scope(&mut self) -> Scope {
        let frame = self.current_frame_mut();
        debug_assert!(frame.scopes.len() > 1, "pop base scope");
        frame.scopes.pop().expect("pop empty scope")
    }

    /// Declares a local in the current scope. Redeclaring a name already
    /// bound in the same scope is an error; shadowing an outer scope is not.
    pub fn declare_local(&mut self, name: StringSymbol, text: &str) -> CompileResult<LocalIndex> {
        let scope = self.current_frame_mut().current_scope_mut();
        if scope.find_local(name).is_some() {
            return Err(ErrorKind::DuplicateLocal(text.to_string()).into());
        }
        scope.push_local(Some(name))
    }

    /// Searches the current function's scopes, innermost first.
    pub fn resolve_local(&self, name: StringSymbol) -> Option<LocalIndex> {
        self.current_frame().scopes.iter().rev()
            .find_map(|scope| scope.find_local(name))
            .map(|local| local.index)
    }

    /// Walks outward through enclosing functions, creating (deduplicated)
    /// upvalue entries at every intermediate function. The source local is
    /// marked captured so scope exit closes it instead of popping it.
    pub fn resolve_or_create_upval(&mut self, name: StringSymbol) -> CompileResult<Option<UpvalueIndex>> {
        if self.frames.len() <= 1 {
            return Ok(None);
        }
        self.resolve_upval_helper(name, self.frames.len() - 1)
    }

    // recursive helper, frame_idx >= 1
    fn resolve_upval_helper(&mut self, name: StringSymbol, frame_idx: usize) -> CompileResult<Option<UpvalueIndex>> {
        {
            let (current, enclosing) = Self::get_frames_mut(&mut self.frames, frame_idx);

            // check if the upvalue already exists in the current frame
            if let Some(upval) = current.find_upval(name) {
                return Ok(Some(upval.index));
            }

            // check if the name is a local of the enclosing function
            let local = enclosing.scopes.iter_mut().rev()
                .find_map(|scope| scope.find_local_mut(name));
            if let Some(local) = local {
                local.captured = true;
                let index = local.index;
                return Ok(Some(current.create_upval(name, UpvalueTarget::Local(index))?));
            }
        }

        // check if an upvalue can be created in the enclosing frame to a
        // local further out
        if frame_idx > 1 {
            if let Some(upval_idx) = self.resolve_upval_helper(name, frame_idx - 1)? {
                let (current, _) = Self::get_frames_mut(&mut self.frames, frame_idx);
                return Ok(Some(current.create_upval(name, UpvalueTarget::Upvalue(upval_idx))?));
            }
        }

        Ok(None)
    }

    // helper to get a frame by index together with its enclosing frame
    fn get_frames_mut(frames: &mut [ScopeFrame], frame_idx: usize) -> (&mut ScopeFrame, &mut ScopeFrame) {
        let (head, tail) = frames.split_at_mut(frame_idx);
        (&mut tail[0], head.last_mut().expect("enclosing frame"))
    }
}
