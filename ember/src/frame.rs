//! Call Frames and the Variable Store
//!
//! A [`CallStack`] owns every frame in an arena keyed by [`FrameId`], plus the ordered
//! stack of frames that are currently active.  The global frame is created with the
//! stack and lives as long as it does.
//!
//! # Variable frames and tracking frames
//!
//! Only frames with [`FrameFlags::VARIABLES`] take part in variable lookup.  Tracking
//! frames, pushed by `eval`, `expr`, `subst`, `catch` and friends, exist so that the
//! evaluator can attribute errors to the construct that was running; they are
//! transparent to variable access.  The *variable frame* is the topmost frame with
//! `VARIABLES`.  Some variable frames borrow another frame's store (`uplevel`,
//! `namespace eval`, `scope open`); [`CallStack::store_of`] finds the owner.
//!
//! # Slots
//!
//! A store maps names to slots.  A slot holds a scalar, an array, or a link to a slot in
//! another frame.  Links are followed transitively, up to a configurable bound; a slot may
//! also carry a [`VarTrace`] guard that can veto or transform accesses.

use crate::error::Access;
use crate::error::EmberError;
use crate::types::*;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use tracing::warn;

/// The default bound on link redirections.
pub const DEFAULT_REDIRECT_LIMIT: usize = 64;

/// An opaque frame identifier.  Identifiers are never reused, so a link into a frame
/// that has been popped can never resolve to some newer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Frame kinds and attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        const GLOBAL = 1 << 0;
        const PROCEDURE = 1 << 1;
        const NAMESPACE = 1 << 2;
        const SCOPE = 1 << 3;
        const UPLEVEL = 1 << 4;
        /// Pushed by the evaluator for a nested construct.
        const TRACKING = 1 << 5;
        /// Pushed and popped by the engine rather than by script code.
        const AUTOMATIC = 1 << 6;
        /// Hidden from `info frames`.
        const INVISIBLE = 1 << 7;
        /// Takes part in variable lookup.
        const VARIABLES = 1 << 8;
        /// Outlives its time on the stack (namespace and scope storage).
        const PERSISTENT = 1 << 9;

        const EVAL = 1 << 16;
        const EXPR = 1 << 17;
        const SUBST = 1 << 18;
        const CATCH = 1 << 19;
        const SOURCE = 1 << 20;
    }
}

/// A guard attached to a variable slot.  Each hook may veto the access by returning
/// an error message, or transform the value.
pub trait VarTrace {
    fn on_read(&self, _name: &str, value: &Value) -> Result<Value, String> {
        Ok(value.clone())
    }

    fn on_write(&self, _name: &str, value: &Value) -> Result<Value, String> {
        Ok(value.clone())
    }

    fn on_unset(&self, _name: &str) -> Result<(), String> {
        Ok(())
    }
}

/// A guard that rejects writes and unsets.
///
/// ```
/// use ember::*;
/// use std::rc::Rc;
///
/// let mut stack = CallStack::new();
/// let global = stack.global_id();
/// stack.set(global, "pi", Value::from("3.14159")).unwrap();
/// stack.set_trace(global, "pi", Rc::new(ReadOnly)).unwrap();
/// assert!(stack.set(global, "pi", Value::from(3)).is_err());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl VarTrace for ReadOnly {
    fn on_write(&self, _name: &str, _value: &Value) -> Result<Value, String> {
        Err("variable is read-only".into())
    }

    fn on_unset(&self, _name: &str) -> Result<(), String> {
        Err("variable is read-only".into())
    }
}

/// How `link` treats an existing variable with the local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Fail with `AlreadyExists` if the name holds a value.
    #[default]
    Create,
    /// Discard the existing value.
    Replace,
}

/// What `unset` does when the name is a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsetLinkPolicy {
    /// Remove only the alias; the target is untouched.
    #[default]
    AliasOnly,
    /// Unset the target variable too.
    Target,
}

/// A frame level: `N` callers up from the current variable frame, or `#N`, the
/// absolute level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSpec {
    Relative(usize),
    Absolute(usize),
}

impl LevelSpec {
    /// Parses a level spec.
    ///
    /// ```
    /// use ember::LevelSpec;
    /// assert_eq!(LevelSpec::parse("2"), Ok(LevelSpec::Relative(2)));
    /// assert_eq!(LevelSpec::parse("#0"), Ok(LevelSpec::Absolute(0)));
    /// assert!(LevelSpec::parse("-1").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<LevelSpec, EmberError> {
        let parsed = match text.strip_prefix('#') {
            Some(abs) => abs.parse::<usize>().map(LevelSpec::Absolute),
            None => text.parse::<usize>().map(LevelSpec::Relative),
        };

        parsed.map_err(|_| EmberError::InvalidLevel(text.into()))
    }

    /// Whether an optional leading argument should be taken as a level.
    pub fn looks_like_level(text: &str) -> bool {
        text.starts_with('#') || text.starts_with(|ch: char| ch.is_ascii_digit())
    }
}

impl fmt::Display for LevelSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LevelSpec::Relative(level) => write!(f, "{}", level),
            LevelSpec::Absolute(level) => write!(f, "#{}", level),
        }
    }
}

type ArrayMap = IndexMap<String, Value, EmberHasher>;

#[derive(Clone)]
enum Var {
    Scalar(Value),
    Array(ArrayMap),
    Link { frame: FrameId, name: String },
}

#[derive(Clone)]
struct Slot {
    var: Var,
    trace: Option<Rc<dyn VarTrace>>,
}

impl Slot {
    fn new(var: Var) -> Self {
        Self { var, trace: None }
    }

    fn check_write(&self, access_name: &str, value: Value) -> Result<Value, EmberError> {
        match &self.trace {
            Some(trace) => trace
                .on_write(access_name, &value)
                .map_err(|reason| vetoed(Access::Set, access_name, reason)),
            None => Ok(value),
        }
    }

    fn check_read(&self, access_name: &str, value: &Value) -> Result<Value, EmberError> {
        match &self.trace {
            Some(trace) => trace
                .on_read(access_name, value)
                .map_err(|reason| vetoed(Access::Read, access_name, reason)),
            None => Ok(value.clone()),
        }
    }

    fn check_unset(&self, access_name: &str) -> Result<(), EmberError> {
        match &self.trace {
            Some(trace) => trace
                .on_unset(access_name)
                .map_err(|reason| vetoed(Access::Unset, access_name, reason)),
            None => Ok(()),
        }
    }
}

fn vetoed(access: Access, name: &str, reason: String) -> EmberError {
    EmberError::TraceVetoed {
        access,
        name: name.into(),
        reason,
    }
}

fn undefined(access: Access, name: &str) -> EmberError {
    EmberError::Undefined {
        access,
        name: name.into(),
    }
}

fn elem_name(name: &str, index: &str) -> String {
    format!("{}({})", name, index)
}

type VarStore = IndexMap<String, Slot, EmberHasher>;

/// A call frame: a scope holding named variables.
pub struct Frame {
    id: FrameId,
    name: String,
    flags: FrameFlags,
    level: usize,
    caller: Option<FrameId>,
    vars_of: Option<FrameId>,
    args: EmberList,
    store: VarStore,
}

impl Frame {
    fn new(id: FrameId, name: &str, flags: FrameFlags, level: usize) -> Self {
        Self {
            id,
            name: name.into(),
            flags,
            level,
            caller: None,
            vars_of: None,
            args: Vec::new(),
            store: VarStore::default(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The frame's name: the procedure name, the construct name for tracking frames,
    /// or the namespace or scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// The frame's ordinal level.  The global frame is level 0.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The variable frame that was current when this one was pushed.
    pub fn caller(&self) -> Option<FrameId> {
        self.caller
    }

    /// The command words that created the frame; empty except for procedure frames.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn has_variables(&self) -> bool {
        self.flags.contains(FrameFlags::VARIABLES)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("level", &self.level)
            .field("vars", &self.store.len())
            .finish()
    }
}

/// The frame arena and the stack of active frames.
pub struct CallStack {
    frames: IndexMap<FrameId, Frame, EmberHasher>,
    stack: Vec<FrameId>,
    next_id: usize,
    global: FrameId,
    namespaces: IndexMap<String, FrameId, EmberHasher>,
    scopes: IndexMap<String, FrameId, EmberHasher>,
    max_redirects: usize,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    /// Creates a stack holding only the global frame.
    pub fn new() -> Self {
        let global = FrameId(0);
        let flags = FrameFlags::GLOBAL
            | FrameFlags::NAMESPACE
            | FrameFlags::VARIABLES
            | FrameFlags::PERSISTENT;

        let mut frames = IndexMap::default();
        frames.insert(global, Frame::new(global, "::", flags, 0));

        let mut namespaces = IndexMap::default();
        namespaces.insert("::".to_string(), global);

        Self {
            frames,
            stack: vec![global],
            next_id: 1,
            global,
            namespaces,
            scopes: IndexMap::default(),
            max_redirects: DEFAULT_REDIRECT_LIMIT,
        }
    }

    fn alloc_id(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        id
    }

    //--------------------------------------------------------------------------------------------
    // Frame construction

    /// Creates a procedure frame one level below the current variable frame.
    pub fn new_procedure_frame(&mut self, name: &str, args: &[Value]) -> Frame {
        let caller = self.variable_frame();
        let level = self.level() + 1;
        let mut frame = Frame::new(
            self.alloc_id(),
            name,
            FrameFlags::PROCEDURE | FrameFlags::VARIABLES,
            level,
        );
        frame.caller = Some(caller);
        frame.args = args.to_vec();
        frame
    }

    /// Creates a tracking frame for the named construct.  `purpose` is one of the
    /// tracking purpose flags (`EVAL`, `EXPR`, ...), possibly with `INVISIBLE`.
    pub fn new_tracking_frame(&mut self, name: &str, purpose: FrameFlags) -> Frame {
        let level = self.level();
        Frame::new(
            self.alloc_id(),
            name,
            FrameFlags::TRACKING | FrameFlags::AUTOMATIC | purpose,
            level,
        )
    }

    /// Creates a frame that evaluates in the context of `target`: same store, same
    /// level, same caller.
    pub fn new_uplevel_frame(&mut self, name: &str, target: FrameId) -> Frame {
        let (level, caller) = self
            .frames
            .get(&target)
            .map(|frame| (frame.level, frame.caller))
            .unwrap_or((0, None));
        let store = self.store_of(target);

        let mut frame = Frame::new(
            self.alloc_id(),
            name,
            FrameFlags::UPLEVEL | FrameFlags::VARIABLES | FrameFlags::AUTOMATIC,
            level,
        );
        frame.caller = caller;
        frame.vars_of = Some(store);
        frame
    }

    /// Creates a frame for `namespace eval`, borrowing the namespace's store one level
    /// below the current variable frame.
    pub fn new_namespace_eval_frame(&mut self, path: &str, namespace: FrameId) -> Frame {
        let caller = self.variable_frame();
        let level = self.level() + 1;

        let mut frame = Frame::new(
            self.alloc_id(),
            path,
            FrameFlags::NAMESPACE | FrameFlags::VARIABLES | FrameFlags::AUTOMATIC,
            level,
        );
        frame.caller = Some(caller);
        frame.vars_of = Some(namespace);
        frame
    }

    /// Creates a frame for `scope open`, borrowing the named scope's store at the
    /// current level.
    pub fn new_scope_frame(&mut self, name: &str, scope: FrameId) -> Frame {
        let current = self.variable_frame();
        let (level, caller) = self
            .frames
            .get(&current)
            .map(|frame| (frame.level, frame.caller))
            .unwrap_or((0, None));

        let mut frame = Frame::new(
            self.alloc_id(),
            name,
            FrameFlags::SCOPE | FrameFlags::VARIABLES,
            level,
        );
        frame.caller = caller;
        frame.vars_of = Some(scope);
        frame
    }

    //--------------------------------------------------------------------------------------------
    // The stack

    /// Pushes a frame, returning its id.
    pub fn push(&mut self, frame: Frame) -> FrameId {
        let id = frame.id;
        debug!(frame = %id, name = %frame.name, flags = ?frame.flags, level = frame.level, "push frame");
        self.frames.insert(id, frame);
        self.stack.push(id);
        id
    }

    /// Pops the top frame.  The global frame is never popped.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.stack.len() <= 1 {
            return None;
        }

        let id = self.stack.pop()?;
        debug!(frame = %id, "pop frame");
        self.frames.shift_remove(&id)
    }

    /// Removes a frame from the stack wherever it is, leaving the frames above it in
    /// place.  The global frame can't be removed.
    pub fn remove(&mut self, id: FrameId) -> Option<Frame> {
        let index = self.stack.iter().rposition(|frame| *frame == id)?;
        if index == 0 {
            return None;
        }

        self.stack.remove(index);
        debug!(frame = %id, "remove frame");
        self.frames.shift_remove(&id)
    }

    /// Pops every frame left above `pushed` by a nested evaluation, then `pushed`
    /// itself, restoring the depth from before `pushed` was pushed.
    pub fn pop_scope_frames_and_one_more(&mut self, pushed: FrameId) -> Option<Frame> {
        if !self.stack.contains(&pushed) {
            warn!(frame = %pushed, "frame to pop is not on the stack");
            return None;
        }

        while self.stack.last() != Some(&pushed) {
            if let Some(leaked) = self.pop() {
                warn!(frame = %leaked.id, name = %leaked.name, "recovered leaked frame");
            }
        }

        self.pop()
    }

    /// The number of frames on the stack, including the global frame.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current_id(&self) -> FrameId {
        self.stack.last().copied().unwrap_or(self.global)
    }

    pub fn current_frame(&self) -> &Frame {
        self.frame(self.current_id()).unwrap_or_else(|| self.global_frame())
    }

    pub fn global_id(&self) -> FrameId {
        self.global
    }

    pub fn global_frame(&self) -> &Frame {
        &self.frames[&self.global]
    }

    /// Looks up a live frame.
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    /// The active frames, bottom to top.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.stack.iter().filter_map(move |id| self.frames.get(id))
    }

    /// The topmost frame that takes part in variable lookup.
    pub fn variable_frame(&self) -> FrameId {
        self.stack
            .iter()
            .rev()
            .find(|id| {
                self.frames
                    .get(*id)
                    .map(|frame| frame.has_variables())
                    .unwrap_or(false)
            })
            .copied()
            .unwrap_or(self.global)
    }

    /// The frame that owns the store used by `frame`.
    pub fn store_of(&self, frame: FrameId) -> FrameId {
        self.frames
            .get(&frame)
            .and_then(|frame| frame.vars_of)
            .unwrap_or(frame)
    }

    /// The level of the current variable frame.
    pub fn level(&self) -> usize {
        self.frames
            .get(&self.variable_frame())
            .map(|frame| frame.level)
            .unwrap_or(0)
    }

    /// Resolves a level spec to a variable frame.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut stack = CallStack::new();
    /// let frame = stack.new_procedure_frame("p", &[]);
    /// let proc_id = stack.push(frame);
    ///
    /// assert_eq!(stack.resolve_frame_for_level(&LevelSpec::Relative(0)), Ok(proc_id));
    /// assert_eq!(stack.resolve_frame_for_level(&LevelSpec::Relative(1)), Ok(stack.global_id()));
    /// assert!(stack.resolve_frame_for_level(&LevelSpec::Relative(2)).is_err());
    /// assert!(stack.resolve_frame_for_level(&LevelSpec::Absolute(5)).is_err());
    /// ```
    pub fn resolve_frame_for_level(&self, spec: &LevelSpec) -> Result<FrameId, EmberError> {
        let invalid = || EmberError::InvalidLevel(spec.to_string());
        let mut current = self.variable_frame();

        match *spec {
            LevelSpec::Relative(count) => {
                for _ in 0..count {
                    current = self.frames.get(&current).and_then(|f| f.caller).ok_or_else(invalid)?;
                }
                Ok(current)
            }
            LevelSpec::Absolute(level) => loop {
                let frame = self.frames.get(&current).ok_or_else(invalid)?;

                if frame.level == level {
                    return Ok(current);
                }

                if frame.level < level {
                    return Err(invalid());
                }

                current = frame.caller.ok_or_else(invalid)?;
            },
        }
    }

    //--------------------------------------------------------------------------------------------
    // Configuration

    /// The bound on link redirections followed by a single access.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn set_max_redirects(&mut self, limit: usize) {
        self.max_redirects = limit;
    }

    //--------------------------------------------------------------------------------------------
    // Slot resolution

    fn store(&self, frame: FrameId) -> Option<&VarStore> {
        self.frames.get(&frame).map(|frame| &frame.store)
    }

    fn store_mut(&mut self, frame: FrameId) -> Option<&mut VarStore> {
        self.frames.get_mut(&frame).map(|frame| &mut frame.store)
    }

    /// Follows links from `name` in `frame`'s store, returning the store frame and name
    /// of the slot that holds (or would hold) the value.
    fn resolve_link(
        &self,
        frame: FrameId,
        name: &str,
        access: Access,
    ) -> Result<(FrameId, String), EmberError> {
        let mut frame = self.store_of(frame);
        let mut target = name.to_string();

        for _ in 0..=self.max_redirects {
            let store = self.store(frame).ok_or_else(|| undefined(access, name))?;

            match store.get(&target) {
                Some(Slot {
                    var: Var::Link {
                        frame: next_frame,
                        name: next_name,
                    },
                    ..
                }) => {
                    frame = *next_frame;
                    target = next_name.clone();
                }
                _ => return Ok((frame, target)),
            }
        }

        Err(EmberError::TooManyRedirects {
            access,
            name: name.into(),
        })
    }

    fn slot(&self, frame: FrameId, name: &str) -> Option<&Slot> {
        self.store(frame).and_then(|store| store.get(name))
    }

    //--------------------------------------------------------------------------------------------
    // Scalar variables

    /// Reads a scalar variable, following links.
    pub fn get(&self, frame: FrameId, name: &str) -> Result<Value, EmberError> {
        let (target, target_name) = self.resolve_link(frame, name, Access::Read)?;

        match self.slot(target, &target_name) {
            Some(slot) => match &slot.var {
                Var::Scalar(value) => slot.check_read(name, value),
                Var::Array(_) => Err(EmberError::IsArray {
                    access: Access::Read,
                    name: name.into(),
                }),
                Var::Link { .. } => Err(undefined(Access::Read, name)),
            },
            None => Err(undefined(Access::Read, name)),
        }
    }

    /// Sets a scalar variable, creating it if need be and writing through links.
    /// Returns the stored value, which a trace may have transformed.
    pub fn set(&mut self, frame: FrameId, name: &str, value: Value) -> Result<Value, EmberError> {
        let (target, target_name) = self.resolve_link(frame, name, Access::Set)?;
        let store = self
            .store_mut(target)
            .ok_or_else(|| undefined(Access::Set, name))?;

        match store.get_mut(&target_name) {
            Some(slot) => {
                if matches!(slot.var, Var::Array(_)) {
                    return Err(EmberError::IsArray {
                        access: Access::Set,
                        name: name.into(),
                    });
                }

                let value = slot.check_write(name, value)?;
                slot.var = Var::Scalar(value.clone());
                Ok(value)
            }
            None => {
                store.insert(target_name, Slot::new(Var::Scalar(value.clone())));
                Ok(value)
            }
        }
    }

    /// Unsets a variable.  If the name is a link, the alias is removed; `policy` decides
    /// whether the target goes too.
    pub fn unset(
        &mut self,
        frame: FrameId,
        name: &str,
        flags: VarFlags,
        policy: UnsetLinkPolicy,
    ) -> Result<(), EmberError> {
        let store_frame = self.store_of(frame);

        let link_target = match self.slot(store_frame, name) {
            None if flags.contains(VarFlags::NO_COMPLAIN) => return Ok(()),
            None => return Err(undefined(Access::Unset, name)),
            Some(slot) => match &slot.var {
                Var::Link { .. } => Some(self.resolve_link(store_frame, name, Access::Unset)?),
                _ => None,
            },
        };

        if let Some((target, target_name)) = link_target {
            if policy == UnsetLinkPolicy::Target {
                self.remove_slot(target, &target_name, name, flags)?;
            }

            if let Some(store) = self.store_mut(store_frame) {
                store.shift_remove(name);
            }
            debug!(name, policy = ?policy, "unset link");
            return Ok(());
        }

        self.remove_slot(store_frame, name, name, flags)
    }

    fn remove_slot(
        &mut self,
        frame: FrameId,
        slot_name: &str,
        access_name: &str,
        flags: VarFlags,
    ) -> Result<(), EmberError> {
        let slot = match self.slot(frame, slot_name) {
            Some(slot) => slot,
            None => return Ok(()),
        };

        if !flags.contains(VarFlags::NO_TRACE) {
            slot.check_unset(access_name)?;
        }

        if let Some(store) = self.store_mut(frame) {
            store.shift_remove(slot_name);
        }
        Ok(())
    }

    /// Whether the name refers to a variable with a value (scalar or array).
    pub fn exists(&self, frame: FrameId, name: &str) -> bool {
        match self.resolve_link(frame, name, Access::Read) {
            Ok((target, target_name)) => matches!(
                self.slot(target, &target_name).map(|slot| &slot.var),
                Some(Var::Scalar(_)) | Some(Var::Array(_))
            ),
            Err(_) => false,
        }
    }

    /// Whether the name in `frame`'s own store is a link.
    pub fn is_link(&self, frame: FrameId, name: &str) -> bool {
        matches!(
            self.slot(self.store_of(frame), name).map(|slot| &slot.var),
            Some(Var::Link { .. })
        )
    }

    /// Attaches a trace guard to an existing variable's slot.
    pub fn set_trace(
        &mut self,
        frame: FrameId,
        name: &str,
        trace: Rc<dyn VarTrace>,
    ) -> Result<(), EmberError> {
        let (target, target_name) = self.resolve_link(frame, name, Access::Set)?;

        match self
            .store_mut(target)
            .and_then(|store| store.get_mut(&target_name))
        {
            Some(slot) => {
                slot.trace = Some(trace);
                Ok(())
            }
            None => Err(undefined(Access::Set, name)),
        }
    }

    //--------------------------------------------------------------------------------------------
    // Links

    /// Makes `local_name` in `local` an alias for `target_name` in `target`.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut stack = CallStack::new();
    /// let global = stack.global_id();
    /// let frame = stack.new_procedure_frame("p", &[]);
    /// let local = stack.push(frame);
    ///
    /// stack.link(local, "x", global, "x", LinkMode::Create).unwrap();
    /// stack.set(local, "x", Value::from(9)).unwrap();
    /// stack.pop();
    /// assert_eq!(stack.get(global, "x").unwrap().as_str(), "9");
    /// ```
    pub fn link(
        &mut self,
        local: FrameId,
        local_name: &str,
        target: FrameId,
        target_name: &str,
        mode: LinkMode,
    ) -> Result<(), EmberError> {
        let local = self.store_of(local);
        let target = self.store_of(target);

        if self.store(target).is_none() || self.store(local).is_none() {
            return Err(undefined(Access::Link, target_name));
        }

        // Walk the chain from the target; reaching the local slot means a cycle.
        let mut frame = target;
        let mut name = target_name.to_string();
        let mut steps = 1;

        loop {
            if frame == local && name == local_name {
                return Err(EmberError::CycleDetected(local_name.into()));
            }

            match self.slot(frame, &name).map(|slot| &slot.var) {
                Some(Var::Link {
                    frame: next_frame,
                    name: next_name,
                }) => {
                    steps += 1;
                    if steps > self.max_redirects {
                        return Err(EmberError::TooManyRedirects {
                            access: Access::Link,
                            name: local_name.into(),
                        });
                    }
                    frame = *next_frame;
                    name = next_name.clone();
                }
                _ => break,
            }
        }

        let existing = self.slot(local, local_name).map(|slot| &slot.var);
        if matches!(existing, Some(Var::Scalar(_)) | Some(Var::Array(_)))
            && mode == LinkMode::Create
        {
            return Err(EmberError::AlreadyExists(local_name.into()));
        }

        let slot = Slot::new(Var::Link {
            frame: target,
            name: target_name.into(),
        });

        if let Some(store) = self.store_mut(local) {
            store.insert(local_name.into(), slot);
        }

        debug!(local = %local, local_name, target = %target, target_name, "link variable");
        Ok(())
    }

    //--------------------------------------------------------------------------------------------
    // Array variables

    /// Reads an array element.
    pub fn get_elem(&self, frame: FrameId, name: &str, index: &str) -> Result<Value, EmberError> {
        let full = elem_name(name, index);
        let (target, target_name) = self.resolve_link(frame, name, Access::Read)?;

        match self.slot(target, &target_name) {
            Some(slot) => match &slot.var {
                Var::Array(map) => match map.get(index) {
                    Some(value) => slot.check_read(&full, value),
                    None => Err(undefined(Access::Read, &full)),
                },
                Var::Scalar(_) => Err(EmberError::NotArray {
                    access: Access::Read,
                    name: full,
                }),
                Var::Link { .. } => Err(undefined(Access::Read, &full)),
            },
            None => Err(undefined(Access::Read, &full)),
        }
    }

    /// Sets an array element, creating the array if need be.
    pub fn set_elem(
        &mut self,
        frame: FrameId,
        name: &str,
        index: &str,
        value: Value,
    ) -> Result<Value, EmberError> {
        let full = elem_name(name, index);
        let (target, target_name) = self.resolve_link(frame, name, Access::Set)?;
        let store = self
            .store_mut(target)
            .ok_or_else(|| undefined(Access::Set, &full))?;

        match store.get_mut(&target_name) {
            Some(slot) => {
                let value = slot.check_write(&full, value)?;
                match &mut slot.var {
                    Var::Array(map) => {
                        map.insert(index.into(), value.clone());
                        Ok(value)
                    }
                    _ => Err(EmberError::NotArray {
                        access: Access::Set,
                        name: full,
                    }),
                }
            }
            None => {
                let mut map = ArrayMap::default();
                map.insert(index.into(), value.clone());
                store.insert(target_name, Slot::new(Var::Array(map)));
                Ok(value)
            }
        }
    }

    /// Unsets an array element.
    pub fn unset_elem(
        &mut self,
        frame: FrameId,
        name: &str,
        index: &str,
        flags: VarFlags,
    ) -> Result<(), EmberError> {
        let full = elem_name(name, index);
        let (target, target_name) = self.resolve_link(frame, name, Access::Unset)?;

        let slot = match self
            .store_mut(target)
            .and_then(|store| store.get_mut(&target_name))
        {
            Some(slot) => slot,
            None if flags.contains(VarFlags::NO_COMPLAIN) => return Ok(()),
            None => return Err(undefined(Access::Unset, &full)),
        };

        if !flags.contains(VarFlags::NO_TRACE) {
            slot.check_unset(&full)?;
        }

        match &mut slot.var {
            Var::Array(map) => {
                if map.shift_remove(index).is_none() && !flags.contains(VarFlags::NO_COMPLAIN) {
                    return Err(undefined(Access::Unset, &full));
                }
                Ok(())
            }
            _ if flags.contains(VarFlags::NO_COMPLAIN) => Ok(()),
            _ => Err(EmberError::NotArray {
                access: Access::Unset,
                name: full,
            }),
        }
    }

    fn array(&self, frame: FrameId, name: &str) -> Option<&ArrayMap> {
        let (target, target_name) = self.resolve_link(frame, name, Access::Read).ok()?;
        match self.slot(target, &target_name).map(|slot| &slot.var) {
            Some(Var::Array(map)) => Some(map),
            _ => None,
        }
    }

    pub fn array_exists(&self, frame: FrameId, name: &str) -> bool {
        self.array(frame, name).is_some()
    }

    /// Whether the named array has the element.
    pub fn elem_exists(&self, frame: FrameId, name: &str, index: &str) -> bool {
        self.array(frame, name)
            .map(|map| map.contains_key(index))
            .unwrap_or(false)
    }

    /// The array's contents as a flat key/value list; empty if it isn't an array.
    pub fn array_get(&self, frame: FrameId, name: &str) -> EmberList {
        self.array(frame, name)
            .map(|map| {
                map.iter()
                    .flat_map(|(key, value)| [Value::from(key), value.clone()])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merges a flat key/value list into an array.
    pub fn array_set(
        &mut self,
        frame: FrameId,
        name: &str,
        kvlist: &[Value],
    ) -> Result<(), EmberError> {
        for pair in kvlist.chunks(2) {
            if let [key, value] = pair {
                self.set_elem(frame, name, key.as_str(), value.clone())?;
            }
        }

        if kvlist.is_empty() && !self.array_exists(frame, name) {
            let (target, target_name) = self.resolve_link(frame, name, Access::Set)?;
            if let Some(store) = self.store_mut(target) {
                if store.contains_key(&target_name) {
                    return Err(EmberError::NotArray {
                        access: Access::Set,
                        name: name.into(),
                    });
                }
                store.insert(target_name, Slot::new(Var::Array(ArrayMap::default())));
            }
        }

        Ok(())
    }

    pub fn array_names(&self, frame: FrameId, name: &str) -> EmberList {
        self.array(frame, name)
            .map(|map| map.keys().map(Value::from).collect())
            .unwrap_or_default()
    }

    pub fn array_size(&self, frame: FrameId, name: &str) -> usize {
        self.array(frame, name).map(|map| map.len()).unwrap_or(0)
    }

    //--------------------------------------------------------------------------------------------
    // Introspection

    /// The names in the frame's store, including links.
    pub fn var_names(&self, frame: FrameId) -> EmberList {
        self.store(self.store_of(frame))
            .map(|store| store.keys().map(Value::from).collect())
            .unwrap_or_default()
    }

    /// The names of the frame's own variables, excluding links.
    pub fn local_names(&self, frame: FrameId) -> EmberList {
        self.store(self.store_of(frame))
            .map(|store| {
                store
                    .iter()
                    .filter(|(_, slot)| !matches!(slot.var, Var::Link { .. }))
                    .map(|(name, _)| Value::from(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    //--------------------------------------------------------------------------------------------
    // Namespaces

    /// Looks up a namespace by absolute path.
    pub fn namespace_frame(&self, path: &str) -> Option<FrameId> {
        self.namespaces.get(path).copied()
    }

    pub fn namespace_exists(&self, path: &str) -> bool {
        self.namespaces.contains_key(path)
    }

    /// Creates the namespace and any missing parents, returning its frame.
    pub fn create_namespace(&mut self, path: &str) -> FrameId {
        if let Some(id) = self.namespace_frame(path) {
            return id;
        }

        if let Some((parent, _)) = path.rsplit_once("::") {
            if !parent.is_empty() {
                self.create_namespace(parent);
            }
        }

        let id = self.alloc_id();
        let flags = FrameFlags::NAMESPACE | FrameFlags::VARIABLES | FrameFlags::PERSISTENT;
        self.frames.insert(id, Frame::new(id, path, flags, 0));
        self.namespaces.insert(path.into(), id);
        debug!(path, frame = %id, "create namespace");
        id
    }

    /// Deletes a namespace and its children.  The global namespace can't be deleted.
    pub fn delete_namespace(&mut self, path: &str) -> bool {
        if path == "::" || !self.namespaces.contains_key(path) {
            return false;
        }

        let prefix = format!("{}::", path);
        let doomed: Vec<String> = self
            .namespaces
            .keys()
            .filter(|name| *name == path || name.starts_with(&prefix))
            .cloned()
            .collect();

        for name in doomed {
            if let Some(id) = self.namespaces.shift_remove(&name) {
                self.frames.shift_remove(&id);
                debug!(path = %name, frame = %id, "delete namespace");
            }
        }

        true
    }

    /// The absolute paths of all namespaces.
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    /// The namespace of the current variable frame; procedures run in `::`.
    pub fn current_namespace(&self) -> String {
        let store = self.store_of(self.variable_frame());

        self.namespaces
            .iter()
            .find(|(_, id)| **id == store)
            .map(|(path, _)| path.clone())
            .unwrap_or_else(|| "::".into())
    }

    //--------------------------------------------------------------------------------------------
    // Named scopes

    pub fn scope_frame(&self, name: &str) -> Option<FrameId> {
        self.scopes.get(name).copied()
    }

    pub fn scope_exists(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Creates a named scope's persistent store.
    pub fn create_scope(&mut self, name: &str) -> FrameId {
        if let Some(id) = self.scope_frame(name) {
            return id;
        }

        let id = self.alloc_id();
        let flags = FrameFlags::SCOPE | FrameFlags::VARIABLES | FrameFlags::PERSISTENT;
        self.frames.insert(id, Frame::new(id, name, flags, 0));
        self.scopes.insert(name.into(), id);
        debug!(name, frame = %id, "create scope");
        id
    }

    /// Whether a frame on the stack is using the named scope's store.
    pub fn scope_is_open(&self, name: &str) -> bool {
        match self.scope_frame(name) {
            Some(scope) => self.frames().any(|frame| frame.vars_of == Some(scope)),
            None => false,
        }
    }

    /// Destroys a named scope and its variables.
    pub fn delete_scope(&mut self, name: &str) -> bool {
        match self.scopes.shift_remove(name) {
            Some(id) => {
                self.frames.shift_remove(&id);
                debug!(name, frame = %id, "delete scope");
                true
            }
            None => false,
        }
    }

    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    /// The name of the scope the current variable frame is using, if any.
    pub fn current_scope(&self) -> Option<String> {
        let current = self.frame(self.variable_frame())?;

        if !current.flags.contains(FrameFlags::SCOPE) {
            return None;
        }

        let store = self.store_of(current.id);
        self.scopes
            .iter()
            .find(|(_, id)| **id == store)
            .map(|(name, _)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn push_proc(stack: &mut CallStack, name: &str) -> FrameId {
        let frame = stack.new_procedure_frame(name, &[Value::from(name)]);
        stack.push(frame)
    }

    #[test]
    fn test_new_stack() {
        let stack = CallStack::new();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.level(), 0);
        assert_eq!(stack.current_id(), stack.global_id());
        assert!(stack.global_frame().flags().contains(FrameFlags::GLOBAL));
    }

    #[test]
    fn test_global_frame_never_pops() {
        let mut stack = CallStack::new();
        assert!(stack.pop().is_none());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_get_set_unset() {
        let mut stack = CallStack::new();
        let global = stack.global_id();

        assert_eq!(
            stack.get(global, "a"),
            Err(EmberError::Undefined {
                access: Access::Read,
                name: "a".into()
            })
        );

        stack.set(global, "a", Value::from("1")).expect("set");
        assert_eq!(stack.get(global, "a").expect("get").as_str(), "1");
        assert!(stack.exists(global, "a"));

        stack
            .unset(global, "a", VarFlags::empty(), UnsetLinkPolicy::AliasOnly)
            .expect("unset");
        assert!(!stack.exists(global, "a"));
        assert!(stack
            .unset(global, "a", VarFlags::empty(), UnsetLinkPolicy::AliasOnly)
            .is_err());
        assert!(stack
            .unset(global, "a", VarFlags::NO_COMPLAIN, UnsetLinkPolicy::AliasOnly)
            .is_ok());
    }

    #[test]
    fn test_unset_link_removes_alias_only() {
        let mut stack = CallStack::new();
        let b = push_proc(&mut stack, "b");
        let a = push_proc(&mut stack, "a");

        stack.link(a, "x", b, "y", LinkMode::Create).expect("link");
        stack.set(b, "y", Value::from(5)).expect("set");
        assert_eq!(stack.get(a, "x").expect("get").as_str(), "5");

        stack
            .unset(a, "x", VarFlags::empty(), UnsetLinkPolicy::AliasOnly)
            .expect("unset");

        assert!(matches!(
            stack.get(a, "x"),
            Err(EmberError::Undefined { .. })
        ));
        assert_eq!(stack.get(b, "y").expect("get").as_str(), "5");
    }

    #[test]
    fn test_unset_link_target_policy() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        let local = push_proc(&mut stack, "p");

        stack.set(global, "g", Value::from(1)).expect("set");
        stack.link(local, "g", global, "g", LinkMode::Create).expect("link");
        stack
            .unset(local, "g", VarFlags::empty(), UnsetLinkPolicy::Target)
            .expect("unset");

        assert!(!stack.exists(global, "g"));
        assert!(!stack.is_link(local, "g"));
    }

    #[test]
    fn test_link_chain_bound() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        stack.set_max_redirects(3);

        // v3 -> v2 -> v1 -> v0: three redirects.
        stack.set(global, "v0", Value::from("end")).expect("set");
        for i in 1..=3 {
            stack
                .link(global, &format!("v{}", i), global, &format!("v{}", i - 1), LinkMode::Create)
                .expect("link");
        }
        assert_eq!(stack.get(global, "v3").expect("get").as_str(), "end");

        // A fourth exceeds the bound.
        let err = stack.link(global, "v4", global, "v3", LinkMode::Create);
        assert!(matches!(err, Err(EmberError::TooManyRedirects { .. })));

        stack.set_max_redirects(10);
        stack.link(global, "v4", global, "v3", LinkMode::Create).expect("link");
        stack.set_max_redirects(3);
        assert!(matches!(
            stack.get(global, "v4"),
            Err(EmberError::TooManyRedirects { .. })
        ));
    }

    #[test]
    fn test_link_cycle_detected() {
        let mut stack = CallStack::new();
        let global = stack.global_id();

        assert_eq!(
            stack.link(global, "a", global, "a", LinkMode::Create),
            Err(EmberError::CycleDetected("a".into()))
        );

        stack.link(global, "a", global, "b", LinkMode::Create).expect("link");
        stack.link(global, "b", global, "c", LinkMode::Create).expect("link");
        assert_eq!(
            stack.link(global, "c", global, "a", LinkMode::Create),
            Err(EmberError::CycleDetected("c".into()))
        );
    }

    #[test]
    fn test_link_over_value() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        let local = push_proc(&mut stack, "p");

        stack.set(local, "x", Value::from(1)).expect("set");
        assert_eq!(
            stack.link(local, "x", global, "x", LinkMode::Create),
            Err(EmberError::AlreadyExists("x".into()))
        );

        stack.link(local, "x", global, "x", LinkMode::Replace).expect("link");
        assert!(stack.is_link(local, "x"));
    }

    #[test]
    fn test_link_into_popped_frame() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        let doomed = push_proc(&mut stack, "p");
        stack.set(doomed, "y", Value::from(1)).expect("set");
        stack.link(global, "x", doomed, "y", LinkMode::Create).expect("link");

        stack.pop();
        assert!(matches!(
            stack.get(global, "x"),
            Err(EmberError::Undefined { .. })
        ));
    }

    #[test]
    fn test_levels() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        let p1 = push_proc(&mut stack, "p1");
        let tracking = stack.new_tracking_frame("eval", FrameFlags::EVAL);
        stack.push(tracking);
        let p2 = push_proc(&mut stack, "p2");

        assert_eq!(stack.level(), 2);
        assert_eq!(stack.resolve_frame_for_level(&LevelSpec::Relative(0)), Ok(p2));
        assert_eq!(stack.resolve_frame_for_level(&LevelSpec::Relative(1)), Ok(p1));
        assert_eq!(
            stack.resolve_frame_for_level(&LevelSpec::Relative(2)),
            Ok(global)
        );
        assert_eq!(stack.resolve_frame_for_level(&LevelSpec::Absolute(1)), Ok(p1));
        assert_eq!(
            stack.resolve_frame_for_level(&LevelSpec::Absolute(3)),
            Err(EmberError::InvalidLevel("#3".into()))
        );
        assert_eq!(
            stack.resolve_frame_for_level(&LevelSpec::Relative(3)),
            Err(EmberError::InvalidLevel("3".into()))
        );
    }

    #[test]
    fn test_uplevel_frame_borrows_store() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        push_proc(&mut stack, "p");

        let frame = stack.new_uplevel_frame("uplevel", global);
        let up = stack.push(frame);
        assert_eq!(stack.level(), 0);
        stack.set(up, "z", Value::from(3)).expect("set");
        stack.pop();

        assert_eq!(stack.get(global, "z").expect("get").as_str(), "3");
    }

    #[test]
    fn test_pop_scope_frames_and_one_more() {
        let mut stack = CallStack::new();
        let before = stack.depth();

        let tracking = stack.new_tracking_frame("eval", FrameFlags::EVAL);
        let pushed = stack.push(tracking);

        // A nested evaluation leaves two frames behind.
        push_proc(&mut stack, "leak1");
        let scope = stack.create_scope("s");
        let frame = stack.new_scope_frame("s", scope);
        stack.push(frame);

        let popped = stack.pop_scope_frames_and_one_more(pushed).expect("popped");
        assert_eq!(popped.id(), pushed);
        assert_eq!(stack.depth(), before);

        // The scope's store survives.
        assert!(stack.scope_exists("s"));
        assert!(!stack.scope_is_open("s"));
    }

    #[test]
    fn test_remove_below_tracking_frame() {
        let mut stack = CallStack::new();
        let global = stack.global_id();

        let scope = stack.create_scope("s");
        let frame = stack.new_scope_frame("s", scope);
        let opened = stack.push(frame);
        let tracking = stack.new_tracking_frame("catch", FrameFlags::CATCH);
        let pushed = stack.push(tracking);

        assert_eq!(stack.variable_frame(), opened);
        assert_eq!(stack.remove(opened).map(|frame| frame.id()), Some(opened));
        assert_eq!(stack.variable_frame(), global);
        assert_eq!(stack.current_id(), pushed);
        assert!(stack.remove(global).is_none());

        assert!(stack.pop_scope_frames_and_one_more(pushed).is_some());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_arrays() {
        let mut stack = CallStack::new();
        let global = stack.global_id();

        stack.set_elem(global, "a", "x", Value::from(1)).expect("set");
        stack.set_elem(global, "a", "y", Value::from(2)).expect("set");
        assert_eq!(stack.get_elem(global, "a", "y").expect("get").as_str(), "2");
        assert_eq!(stack.array_size(global, "a"), 2);
        assert_eq!(Value::from(stack.array_get(global, "a")).as_str(), "x 1 y 2");

        assert!(matches!(
            stack.get(global, "a"),
            Err(EmberError::IsArray { .. })
        ));

        stack.set(global, "s", Value::from(1)).expect("set");
        assert!(matches!(
            stack.set_elem(global, "s", "i", Value::from(1)),
            Err(EmberError::NotArray { .. })
        ));

        stack
            .unset_elem(global, "a", "x", VarFlags::empty())
            .expect("unset");
        assert_eq!(Value::from(stack.array_names(global, "a")).as_str(), "y");
    }

    #[test]
    fn test_read_only_trace() {
        let mut stack = CallStack::new();
        let global = stack.global_id();
        stack.set(global, "v", Value::from("1.0")).expect("set");
        stack.set_trace(global, "v", Rc::new(ReadOnly)).expect("trace");

        let err = stack.set(global, "v", Value::from(2)).unwrap_err();
        assert_eq!(err.to_string(), "can't set \"v\": variable is read-only");

        assert!(stack
            .unset(global, "v", VarFlags::empty(), UnsetLinkPolicy::AliasOnly)
            .is_err());
        assert!(stack
            .unset(global, "v", VarFlags::NO_TRACE, UnsetLinkPolicy::AliasOnly)
            .is_ok());
    }

    #[test]
    fn test_namespaces() {
        let mut stack = CallStack::new();
        let ns = stack.create_namespace("::a::b");
        assert!(stack.namespace_exists("::a"));
        assert_eq!(stack.namespace_frame("::a::b"), Some(ns));

        let frame = stack.new_namespace_eval_frame("::a::b", ns);
        stack.push(frame);
        assert_eq!(stack.current_namespace(), "::a::b");
        stack.pop();
        assert_eq!(stack.current_namespace(), "::");

        assert!(stack.delete_namespace("::a"));
        assert!(!stack.namespace_exists("::a::b"));
        assert!(!stack.delete_namespace("::"));
    }
}
