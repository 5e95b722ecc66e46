//! The Ember Interpreter
//!
//! The [`Interp`] struct is the primary API for embedding Ember into a Rust application.
//! Given an `Interp`, the application may:
//!
//! * Evaluate scripts and expressions
//! * Check scripts for completeness
//! * Extend the language by defining new Ember commands in Rust
//! * Set and get Ember variables in command bodies
//! * Push, pop, and inspect call frames
//! * Plug in variable resolvers
//! * Configure the recursion limit, iteration limit, and link policies
//! * Cancel a running evaluation from another thread via a [`HaltHandle`]
//!
//! # Creating an Interpreter
//!
//! There are two ways to create an interpreter.  The usual way is to call
//! [`Interp::new`](struct.Interp.html#method.new), which creates an interpreter and
//! installs the standard command set.  [`Interp::new_safe`](struct.Interp.html#method.new_safe)
//! installs only the commands that don't touch the host.  Alternatively,
//! [`Interp::empty`](struct.Interp.html#method.empty) creates an interpreter with no
//! commands at all, for command languages built from scratch.
//!
//! # Evaluating Scripts
//!
//! There are a number of ways to evaluate Ember scripts.  The simplest is to pass the
//! script as a string to `Interp::eval`.  The interpreter evaluates the string as an Ember
//! script, and returns either a normal [`Value`] containing the result, or an
//! [`Exception`] carrying the error message and the accumulated stack trace.
//!
//! ```
//! use ember::Interp;
//! use ember::types::*;
//!
//! # fn dummy() -> EmberResult {
//! let mut interp = Interp::new();
//! let four = interp.eval("expr {2 + 2}", &mut ())?;
//! assert_eq!(four, Value::from(4));
//! # ember::ember_ok!()
//! # }
//! ```
//!
//! Commands that evaluate nested scripts on behalf of a construct (an `eval` or `catch`
//! body, an expression) use [`Interp::evaluate_script`] and
//! [`Interp::evaluate_expression`].  These push a tracking frame for the construct, pop
//! it (and anything the nested script left open) afterwards, and label any error with
//! the construct's name and the failing line.  Loop bodies and `if` branches run in the
//! caller's frame, and only get the error label.
//!
//! # Control-Flow Signals
//!
//! Every evaluation produces either `Ok(value)` or an [`Exception`] whose
//! [`ResultCode`] is the signal: `Error`, `Return`, `Break`, `Continue`, or a custom
//! code.  Code that isn't defined to intercept a signal hands it upward unchanged: loops
//! intercept `Break` and `Continue`, procedures intercept `Return`, and `catch`
//! intercepts everything.  At the top level, `Break` and `Continue` become errors and
//! custom codes are returned to the host untouched.
//!
//! # Defining New Commands
//!
//! A command is a Rust function with this signature:
//!
//! ```
//! # use ember::types::*;
//! # use ember::Interp;
//! fn my_command(interp: &mut Interp, argv: &[Value], ctx: &mut ()) -> EmberOptResult {
//!     // ...
//!     Ok(None)
//! }
//! ```
//!
//! `argv` holds the command's name and arguments; `ctx` is the application context passed
//! to `eval`.  Check the argument count with [`check_args`](../fn.check_args.html):
//!
//! ```
//! use ember::*;
//!
//! fn cmd_square(_: &mut Interp, argv: &[Value], _: &mut ()) -> EmberOptResult {
//!     check_args(1, argv, 2, 2, "x")?;
//!     let x = argv[1].as_int()?;
//!     ember_opt_ok!(x * x)
//! }
//!
//! let mut interp = Interp::new();
//! interp.add_command("square", cmd_square);
//! assert_eq!(interp.eval("square 5", &mut ()).unwrap().as_str(), "25");
//! ```
//!
//! # Accessing Variables
//!
//! Command bodies read and write variables through [`Interp::get`], [`Interp::set`],
//! [`Interp::unset`] and [`Interp::link`], or the `Value`-based [`Interp::var`] and
//! [`Interp::set_var`], which cache the parsed variable name.  Names are offered to the
//! registered resolvers first, so qualified names like `::cfg::debug` reach the right
//! namespace; everything else is looked up in the current variable frame.

use crate::check_args;
use crate::commands;
use crate::ember_err;
use crate::ember_ok;
use crate::error::EmberError;
#[cfg(feature = "expr")]
use crate::expr;
use crate::frame::CallStack;
use crate::frame::Frame;
use crate::frame::FrameFlags;
use crate::frame::FrameId;
use crate::frame::LevelSpec;
use crate::frame::LinkMode;
use crate::frame::ReadOnly;
use crate::frame::UnsetLinkPolicy;
use crate::frame::VarTrace;
use crate::halt::HaltHandle;
use crate::parser;
use crate::parser::Script;
use crate::parser::Word;
use crate::parser::WordVec;
use crate::resolver::NamespaceResolver;
use crate::resolver::Resolution;
use crate::resolver::Resolver;
use crate::types::*;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::trace;
use tracing::warn;

/// The longest command text quoted in an error's stack trace.
const MAX_CONTEXT_CHARS: usize = 150;

/// The Ember Interpreter.
///
/// The `Interp` struct is the primary API for embedding Ember into a Rust application.
/// The application creates an instance of `Interp`, configures it with the required
/// set of application-specific and standard commands, and then uses it to evaluate
/// scripts and expressions.  See the [module level documentation](index.html) for an
/// overview.
///
/// An `Interp` is not `Sync`: every mutating operation takes `&mut self`, so the
/// borrow checker provides the interpreter-wide exclusion that frame linkage needs.
/// Only the [`HaltHandle`] crosses threads.
///
/// # Example
///
/// ```
/// use ember::types::*;
/// use ember::Interp;
/// use ember::ember_ok;
/// # fn dummy() -> EmberResult {
/// let mut interp = Interp::new();
/// let four = interp.eval("expr {2 + 2}", &mut ())?;
/// assert_eq!(four, Value::from(4));
/// # ember_ok!()
/// # }
/// ```
pub struct Interp<Ctx = ()> {
    // Command Table
    commands: IndexMap<String, CommandEntry<Ctx>, EmberHasher>,

    // Call frames and variables
    frames: CallStack,

    // Resolvers, in ascending priority order.
    resolvers: Vec<(i32, Rc<dyn Resolver>)>,

    // Defines the recursion limit for Interp::eval().
    recursion_limit: usize,

    // Current number of eval levels.
    num_levels: usize,

    // Loop iteration ceiling; None is unlimited.
    iteration_limit: Option<usize>,

    unset_link_policy: UnsetLinkPolicy,

    // Suppresses engine-generated error context until reset.
    error_logged: bool,

    // Line of the most recent failing command, within its script.
    error_line: usize,

    halt: HaltHandle,
}

/// A command defined in the interpreter.
enum Command<Ctx> {
    /// A binary command implemented as a Rust CommandFunc.
    Native(CommandFunc<Ctx>),

    #[cfg(feature = "closure-commands")]
    Closure(CommandClosure<Ctx>),

    /// An Ember procedure
    Proc(Procedure),
}

impl<Ctx> Command<Ctx> {
    /// Execute the command according to its kind.
    fn execute(&self, interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberResult {
        match self {
            Command::Native(func) => Ok(func(interp, argv, ctx)?.unwrap_or_default()),
            #[cfg(feature = "closure-commands")]
            Command::Closure(func) => Ok(func(interp, argv, ctx)?.unwrap_or_default()),
            Command::Proc(proc) => proc.execute(interp, argv, ctx),
        }
    }

    /// Returns a value naming the command type.
    fn cmdtype(&self) -> Value {
        match self {
            Command::Native(_) => Value::from("native"),
            #[cfg(feature = "closure-commands")]
            Command::Closure(_) => Value::from("closure"),
            Command::Proc(_) => Value::from("proc"),
        }
    }

    /// Returns true if the command is a proc, and false otherwise.
    fn is_proc(&self) -> bool {
        matches!(self, Command::Proc(_))
    }
}

/// A command table entry: the command and its static metadata.
struct CommandEntry<Ctx> {
    command: Rc<Command<Ctx>>,
    flags: CommandFlags,
}

impl<Ctx> Clone for CommandEntry<Ctx> {
    fn clone(&self) -> Self {
        Self {
            command: Rc::clone(&self.command),
            flags: self.flags,
        }
    }
}

impl<Ctx> Default for Interp<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

// NOTE: The order of methods in the generated RustDoc depends on the order in this block.
// Consequently, methods are ordered pedagogically.
impl<Ctx> Interp<Ctx> {
    //--------------------------------------------------------------------------------------------
    // Constructors

    /// Creates a new Ember interpreter with no commands defined.  Use this when crafting
    /// command languages that shouldn't include the normal commands, or as a base
    /// to which specific command sets can be added.
    ///
    /// # Example
    ///
    /// ```
    /// # use ember::interp::Interp;
    /// let interp = Interp::<()>::empty();
    /// assert!(interp.command_names().is_empty());
    /// ```
    pub fn empty() -> Self {
        let mut interp = Self {
            commands: IndexMap::default(),
            frames: CallStack::new(),
            resolvers: Vec::new(),
            recursion_limit: 1000,
            num_levels: 0,
            iteration_limit: None,
            unset_link_policy: UnsetLinkPolicy::default(),
            error_logged: false,
            error_line: 0,
            halt: HaltHandle::new(),
        };

        interp.add_resolver(0, Rc::new(NamespaceResolver));

        let global = interp.frames.global_id();
        for name in ["errorInfo", "errorCode"] {
            if let Err(err) = interp.frames.set(global, name, Value::empty()) {
                warn!(%err, "can't initialize {}", name);
            }
        }

        interp
    }

    /// Creates a new Ember interpreter that is pre-populated with the standard commands.
    /// Use [`command_names`](#method.command_names) (or the `info commands` command)
    /// to retrieve the full list, and the [`add_command`](#method.add_command) family of
    /// methods to extend the interpreter with new commands.
    ///
    /// ```
    /// # use ember::types::*;
    /// # use ember::Interp;
    /// let mut interp = Interp::new();
    /// let val = interp.eval("set a 1; incr a 5", &mut ()).unwrap();
    /// assert_eq!(val.as_str(), "6");
    /// ```
    pub fn new() -> Self {
        Self::with_commands(|_| true)
    }

    /// Creates an interpreter with only the commands that are safe to expose to
    /// untrusted scripts: nothing that reads files, writes the console, or exits.
    ///
    /// ```
    /// # use ember::Interp;
    /// let interp = Interp::<()>::new_safe();
    /// assert!(interp.has_command("set"));
    /// assert!(!interp.has_command("source"));
    /// ```
    pub fn new_safe() -> Self {
        Self::with_commands(|flags| flags.contains(CommandFlags::SAFE))
    }

    fn with_commands(filter: impl Fn(CommandFlags) -> bool) -> Self {
        let mut interp = Interp::empty();

        for (name, flags, func) in commands::standard_commands::<Ctx>() {
            if filter(flags) {
                interp.add_command_with_flags(name, flags, func);
            }
        }

        interp.publish_version();
        interp
    }

    /// Publishes the read-only `ember_version` global.
    fn publish_version(&mut self) {
        let global = self.frames.global_id();
        let version = Value::from(env!("CARGO_PKG_VERSION"));

        let result = self
            .frames
            .set(global, "ember_version", version)
            .and_then(|_| self.frames.set_trace(global, "ember_version", Rc::new(ReadOnly)));

        if let Err(err) = result {
            warn!(%err, "can't publish ember_version");
        }
    }

    //--------------------------------------------------------------------------------------------
    // Script and Expression Evaluation

    /// Evaluates a script one command at a time.  Returns the [`Value`] of the last
    /// command in the script, or the value of any explicit `return` call in the script,
    /// or any error thrown by the script.  `break` and `continue` outside of a loop are
    /// converted to errors; custom result codes are returned as-is.
    ///
    /// Use this method (or [`eval_value`](#method.eval_value)) to evaluate arbitrary scripts.
    /// Prefer `eval_value` if the script is already stored in a `Value`, as it will be more
    /// efficient if the script is evaluated multiple times.
    ///
    /// # Example
    ///
    /// The following code shows how to evaluate a script and handle the result, whether
    /// it's a computed `Value` or an error message (which is also a `Value`).
    ///
    /// ```
    /// # use ember::types::*;
    /// # use ember::Interp;
    /// let mut interp = Interp::new();
    ///
    /// match interp.eval("set a 1", &mut ()) {
    ///    Ok(val) => {
    ///        println!("Value: {}", val);
    ///    }
    ///    Err(exception) => {
    ///        if exception.is_error() {
    ///            println!("Error: {}", exception.value());
    ///            println!("{}", exception.error_info());
    ///        } else {
    ///            println!("Code {}: {}", exception.code(), exception.value());
    ///        }
    ///    }
    /// }
    /// ```
    pub fn eval(&mut self, script: &str, ctx: &mut Ctx) -> EmberResult {
        let value = Value::from(script);
        self.eval_value(&value, ctx)
    }

    /// Evaluates the string value of a [`Value`] as a script.  This method is equivalent
    /// to [`eval`](#method.eval), but works on a `Value` rather than on a string slice,
    /// and so reuses the value's cached parse.
    ///
    /// A top-level call (one not made from within a command) resets the error context
    /// before it begins, translates the result as described for `eval`, and stores the
    /// `errorInfo` and `errorCode` globals when the result is an error.
    pub fn eval_value(&mut self, value: &Value, ctx: &mut Ctx) -> EmberResult {
        if self.num_levels == 0 {
            self.reset_error_context();
        }

        // FIRST, check the number of nesting levels
        self.num_levels += 1;

        if self.num_levels > self.recursion_limit {
            self.num_levels -= 1;
            return Err(EmberError::RecursionLimit.into());
        }

        // NEXT, evaluate the script.
        let mut result = match value.as_script() {
            Ok(script) => self.eval_script(&script, ctx),
            Err(exception) => Err(exception),
        };

        self.num_levels -= 1;

        // NEXT, translate the result at the top level.
        if self.num_levels == 0 {
            if let Err(mut exception) = result {
                // FIRST, handle the return -code, -level protocol
                if exception.code() == ResultCode::Return {
                    exception.decrement_level();
                }

                result = match exception.code() {
                    ResultCode::Okay => Ok(exception.value()),
                    ResultCode::Error => Err(exception),
                    ResultCode::Return => Err(exception), // -level > 0
                    ResultCode::Break => ember_err!("invoked \"break\" outside of a loop"),
                    ResultCode::Continue => ember_err!("invoked \"continue\" outside of a loop"),
                    ResultCode::Other(_) => Err(exception),
                };

                if result.is_err() && self.halt.is_requested() {
                    self.halt.reset();
                }
            }
        }

        if let Err(exception) = &result {
            if exception.is_error() {
                self.set_global_error_data(exception.error_data())?;
            }
        }

        result
    }

    /// Saves the error exception data in the `errorInfo` and `errorCode` globals.
    fn set_global_error_data(&mut self, error_data: Option<&ErrorData>) -> Result<(), Exception> {
        if let Some(data) = error_data {
            let global = self.frames.global_id();
            self.frames.set(global, "errorInfo", data.error_info())?;
            self.frames.set(global, "errorCode", data.error_code())?;
        }

        Ok(())
    }

    /// Evaluates a parsed Script, producing a normal EmberResult.  Polls the halt flag
    /// before each command, and adds each failing command to the error's stack trace.
    pub(crate) fn eval_script(&mut self, script: &Script, ctx: &mut Ctx) -> EmberResult {
        let mut result_value = None;

        for word_vec in script.commands() {
            if let Err(exception) = self.poll_halt() {
                return Err(self.annotate(exception, word_vec));
            }

            let words = match self.eval_word_vec(word_vec.words(), ctx) {
                Ok(words) => words,
                Err(exception) => return Err(self.annotate(exception, word_vec)),
            };

            if words.is_empty() {
                continue;
            }

            let name = words[0].as_str();

            let cmd = match self.commands.get(name) {
                Some(entry) => Rc::clone(&entry.command),
                None => {
                    let exception = Exception::ember_err(Value::from(format!(
                        "invalid command name \"{}\"",
                        name
                    )));
                    return Err(self.annotate(exception, word_vec));
                }
            };

            trace!(command = name, argc = words.len(), "dispatch");

            match cmd.execute(self, words.as_slice(), ctx) {
                Ok(value) => result_value = Some(value),
                Err(exception) => return Err(self.annotate(exception, word_vec)),
            }
        }

        Ok(result_value.unwrap_or_default())
    }

    /// Adds a failing command to an error's stack trace and records its line.
    fn annotate(&mut self, mut exception: Exception, word_vec: &WordVec) -> Exception {
        if !exception.is_error() {
            return exception;
        }

        self.error_line = word_vec.line();

        if !self.error_logged {
            if exception.is_new_error() {
                exception.add_error_info("    while executing");
            } else {
                exception.add_error_info("    invoked from within");
            }
            exception.add_error_info(&quote_command(word_vec.text()));
        }

        exception
    }

    /// Evaluates a WordVec, producing a list of Values.  The expansion operator is handled
    /// as a special case.
    fn eval_word_vec(&mut self, words: &[Word], ctx: &mut Ctx) -> Result<EmberList, Exception> {
        let mut list: EmberList = Vec::new();

        for word in words {
            if let Word::Expand(word_to_expand) = word {
                let value = self.eval_word(word_to_expand, ctx)?;
                for val in &*value.as_list()? {
                    list.push(val.clone());
                }
            } else {
                list.push(self.eval_word(word, ctx)?);
            }
        }

        Ok(list)
    }

    /// Evaluates a single word, producing a value.  This is also used by expr.rs.
    pub(crate) fn eval_word(&mut self, word: &Word, ctx: &mut Ctx) -> EmberResult {
        match word {
            Word::Value(val) => Ok(val.clone()),
            Word::VarRef(name) => self.get(name, VarFlags::empty()),
            Word::ArrayRef(name, index_word) => {
                let index = self.eval_word(index_word, ctx)?;
                self.element(name, index.as_str())
            }
            Word::Script(script) => self.eval_script(script, ctx),
            Word::Tokens(tokens) => {
                let mut string = String::new();
                for token in tokens {
                    string.push_str(self.eval_word(token, ctx)?.as_str());
                }
                Ok(Value::from(string))
            }
            Word::Expand(inner) => self.eval_word(inner, ctx),
        }
    }

    /// Evaluates a script on behalf of the named construct.  The script is `argv[start]`
    /// if that is the only remaining argument (keeping its cached parse), or the
    /// concatenation of `argv[start..]`.
    ///
    /// The script runs inside a fresh tracking frame, which is popped afterwards along
    /// with any frames the script left open.  On error, the construct's name and the
    /// failing line are added to the stack trace unless the error is already logged.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut interp = Interp::new();
    /// let depth = interp.call_stack().depth();
    /// let argv = [Value::from("mycmd"), Value::from("set x 1\nerror oops")];
    ///
    /// let err = interp.evaluate_script("mycmd", &argv, 1, &mut ()).unwrap_err();
    /// assert!(err.error_info().as_str().ends_with("(\"mycmd\" body line 2)"));
    /// assert_eq!(interp.call_stack().depth(), depth);
    /// ```
    pub fn evaluate_script(
        &mut self,
        construct: &str,
        argv: &[Value],
        start: usize,
        ctx: &mut Ctx,
    ) -> EmberResult {
        let script = concat_args(argv, start);
        self.eval_tracked(construct, FrameFlags::EVAL, &script, ctx)
    }

    /// Evaluates a script in a tracking frame for the named construct; see
    /// [`evaluate_script`](#method.evaluate_script).
    pub(crate) fn eval_tracked(
        &mut self,
        construct: &str,
        purpose: FrameFlags,
        script: &Value,
        ctx: &mut Ctx,
    ) -> EmberResult {
        let frame = self.frames.new_tracking_frame(construct, purpose);
        let result = self.with_frame(frame, |interp| interp.eval_value(script, ctx));

        result.map_err(|mut exception| {
            let context = format!("    (\"{}\" body line {})", construct, self.error_line);
            self.append_error_context(&mut exception, &context);
            exception
        })
    }

    /// Evaluates the body of a control construct (`if`, `while`, ...) in the caller's
    /// frame, so that a scope opened or closed by the body stays that way.  Errors are
    /// labelled as for [`evaluate_script`](#method.evaluate_script).
    pub(crate) fn eval_body(
        &mut self,
        construct: &str,
        script: &Value,
        ctx: &mut Ctx,
    ) -> EmberResult {
        self.eval_value(script, ctx).map_err(|mut exception| {
            let context = format!("    (\"{}\" body line {})", construct, self.error_line);
            self.append_error_context(&mut exception, &context);
            exception
        })
    }

    /// Evaluates a construct's clause in the caller's frame, labelling errors with
    /// `("construct" what)`, e.g. `("for" initial command)`.
    pub(crate) fn eval_labeled(
        &mut self,
        construct: &str,
        what: &str,
        script: &Value,
        ctx: &mut Ctx,
    ) -> EmberResult {
        self.eval_value(script, ctx).map_err(|mut exception| {
            let context = format!("    (\"{}\" {})", construct, what);
            self.append_error_context(&mut exception, &context);
            exception
        })
    }

    /// Evaluates an expression on behalf of the named construct, in a tracking frame.
    /// The expression is assembled from `argv[start..]` as for
    /// [`evaluate_script`](#method.evaluate_script).
    pub fn evaluate_expression(
        &mut self,
        construct: &str,
        argv: &[Value],
        start: usize,
        ctx: &mut Ctx,
    ) -> EmberResult {
        let expr = concat_args(argv, start);
        self.expr_tracked(construct, "expression", &expr, ctx)
    }

    /// Evaluates an expression in a tracking frame, labelling errors with
    /// `("construct" what)`.
    pub(crate) fn expr_tracked(
        &mut self,
        construct: &str,
        what: &str,
        expr: &Value,
        ctx: &mut Ctx,
    ) -> EmberResult {
        let frame = self.frames.new_tracking_frame(construct, FrameFlags::EXPR);
        let result = self.with_frame(frame, |interp| interp.eval_expr(expr, ctx));

        result.map_err(|mut exception| {
            let context = format!("    (\"{}\" {})", construct, what);
            self.append_error_context(&mut exception, &context);
            exception
        })
    }

    /// Evaluates a boolean expression in a tracking frame.
    pub(crate) fn expr_bool_tracked(
        &mut self,
        construct: &str,
        what: &str,
        expr: &Value,
        ctx: &mut Ctx,
    ) -> Result<bool, Exception> {
        self.expr_tracked(construct, what, expr, ctx)?.as_bool()
    }

    fn eval_expr(&mut self, expr: &Value, ctx: &mut Ctx) -> EmberResult {
        cfg_if::cfg_if! {
            if #[cfg(feature = "expr")] {
                expr::expr(self, expr, ctx)
            } else {
                self.eval_value(expr, ctx)
            }
        }
    }

    /// Performs backslash, command, and variable substitution on the text, as selected
    /// by `flags`.  A `break` in a command substitution ends the substitution, keeping
    /// what was built so far; a `continue` substitutes the empty string.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut interp = Interp::new();
    /// interp.set_scalar("x", Value::from(5)).unwrap();
    ///
    /// let text = Value::from("x=$x [list a b]\\t");
    /// let all = interp.substitute(&text, SubstFlags::ALL, &mut ()).unwrap();
    /// assert_eq!(all.as_str(), "x=5 a b\t");
    ///
    /// let vars = interp.substitute(&text, SubstFlags::VARIABLES, &mut ()).unwrap();
    /// assert_eq!(vars.as_str(), "x=5 [list a b]\\t");
    /// ```
    pub fn substitute(&mut self, text: &Value, flags: SubstFlags, ctx: &mut Ctx) -> EmberResult {
        let pieces = parser::parse_subst(text.as_str(), flags)?;
        let frame = self.frames.new_tracking_frame("subst", FrameFlags::SUBST);

        self.with_frame(frame, |interp| {
            let mut out = String::new();

            for piece in &pieces {
                match interp.eval_word(piece, ctx) {
                    Ok(value) => out.push_str(value.as_str()),
                    Err(exception) if exception.code() == ResultCode::Break => break,
                    Err(exception) if exception.code() == ResultCode::Continue => continue,
                    Err(exception) => return Err(exception),
                }
            }

            Ok(Value::from(out))
        })
    }

    /// Returns the `return` options for the given result as a flat list of option names
    /// and values.  Used by the `catch` command.
    pub(crate) fn return_options(&self, result: &EmberResult) -> Value {
        let mut opts: EmberList = Vec::new();
        let mut push = |name: &str, value: Value| {
            opts.push(Value::from(name));
            opts.push(value);
        };

        match result {
            Ok(_) => {
                push("-code", Value::from(0));
                push("-level", Value::from(0));
            }
            Err(exception) => {
                // FIRST, set the -code
                match exception.code() {
                    ResultCode::Return => push("-code", Value::from(exception.next_code().as_int())),
                    code => push("-code", Value::from(code.as_int())),
                }

                // NEXT, set the -level
                push("-level", Value::from(exception.level()));

                if let Some(data) = exception.error_data() {
                    push("-errorcode", data.error_code());
                    push("-errorinfo", data.error_info());
                    push("-errorline", Value::from(self.error_line));
                }
            }
        }

        Value::from(opts)
    }

    /// Determines whether or not the script is syntactically complete,
    /// e.g., has no unmatched quotes, brackets, or braces.
    ///
    /// REPLs use this to determine whether or not to ask for another line of
    /// input.
    ///
    /// # Example
    ///
    /// ```
    /// # use ember::types::*;
    /// # use ember::interp::Interp;
    /// let mut interp = Interp::<()>::new();
    /// assert!(interp.complete("set a [expr {1+1}]"));
    /// assert!(!interp.complete("set a [expr {1+1"));
    /// ```
    pub fn complete(&mut self, script: &str) -> bool {
        parser::parse(script).is_ok()
    }

    /// Evaluates an expression and returns its value.
    ///
    /// # Example
    /// ```
    /// use ember::Interp;
    /// use ember::types::*;
    /// # fn dummy() -> Result<String,Exception> {
    /// let mut interp = Interp::new();
    /// let expr = Value::from("2 + 2");
    /// let sum = interp.expr(&expr, &mut ())?.as_int()?;
    ///
    /// assert_eq!(sum, 4);
    /// # Ok("dummy".to_string())
    /// # }
    /// ```
    #[cfg(feature = "expr")]
    pub fn expr(&mut self, expr: &Value, ctx: &mut Ctx) -> EmberResult {
        let result = expr::expr(self, expr, ctx);

        if self.num_levels == 0 {
            if let Err(exception) = &result {
                self.set_global_error_data(exception.error_data())?;
            }
        }

        result
    }

    /// Evaluates a boolean expression and returns its value, or an error if it couldn't
    /// be interpreted as a boolean.
    ///
    /// ```
    /// use ember::Interp;
    /// use ember::types::*;
    /// # fn dummy() -> Result<String,Exception> {
    /// let mut interp = Interp::new();
    ///
    /// let expr = Value::from("1 < 2");
    /// let flag: bool = interp.expr_bool(&expr, &mut ())?;
    ///
    /// assert!(flag);
    /// # Ok("dummy".to_string())
    /// # }
    /// ```
    pub fn expr_bool(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<bool, Exception> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "expr")] {
                self.expr(expr, ctx)?.as_bool()
            } else {
                self.eval_value(expr, ctx)?.as_bool()
            }
        }
    }

    /// Evaluates an expression and returns its value as an integer.
    #[cfg(feature = "expr")]
    pub fn expr_int(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<EmberInt, Exception> {
        self.expr(expr, ctx)?.as_int()
    }

    /// Evaluates an expression and returns its value as a float.
    #[cfg(feature = "expr")]
    pub fn expr_float(&mut self, expr: &Value, ctx: &mut Ctx) -> Result<EmberFloat, Exception> {
        self.expr(expr, ctx)?.as_float()
    }

    //--------------------------------------------------------------------------------------------
    // Error Context

    /// Appends a line of context to an error's stack trace, unless the error has been
    /// marked as already logged.  Does nothing for exceptions that aren't errors.
    pub fn append_error_context(&self, exception: &mut Exception, text: &str) {
        if exception.is_error() && !self.error_logged {
            exception.add_error_info(text);
        }
    }

    /// Marks the current error as logged (or not).  While it's marked, the engine adds
    /// no further context to the error's stack trace.  The mark is cleared when a
    /// top-level evaluation begins and when `catch` intercepts an error.
    pub fn mark_error_already_logged(&mut self, logged: bool) {
        self.error_logged = logged;
    }

    pub fn error_already_logged(&self) -> bool {
        self.error_logged
    }

    /// The line of the most recently failing command, within the script it was part of.
    pub fn current_error_line(&self) -> usize {
        self.error_line
    }

    /// Clears the logged mark and the error line.
    pub(crate) fn reset_error_context(&mut self) {
        self.error_logged = false;
        self.error_line = 0;
    }

    //--------------------------------------------------------------------------------------------
    // Loop support and cancellation

    /// Counts one completed loop iteration, failing if the halt flag is set or the
    /// iteration limit is exceeded.  Loop commands call this after each pass through
    /// the body.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut interp = Interp::new();
    /// interp.set_iteration_limit(Some(10));
    /// let err = interp.eval("while 1 {}", &mut ()).unwrap_err();
    /// assert_eq!(err.value().as_str(), "iteration limit 10 exceeded");
    /// ```
    pub fn loop_tick(&mut self, count: &mut usize) -> Result<(), Exception> {
        self.poll_halt()?;
        *count += 1;

        match self.iteration_limit {
            Some(limit) if *count > limit => Err(EmberError::IterationLimitExceeded(limit).into()),
            _ => Ok(()),
        }
    }

    /// Fails with `eval canceled` if a halt has been requested.
    pub fn poll_halt(&self) -> Result<(), Exception> {
        if self.halt.is_requested() {
            warn!("evaluation canceled");
            Err(EmberError::Canceled.into())
        } else {
            Ok(())
        }
    }

    /// Returns a handle on the interpreter's halt flag, which may be sent to another
    /// thread.
    pub fn halt_handle(&self) -> HaltHandle {
        self.halt.clone()
    }

    pub fn halt_requested(&self) -> bool {
        self.halt.is_requested()
    }

    //--------------------------------------------------------------------------------------------
    // Variable Handling

    /// Resolves a variable name to the frame and local name to use, consulting the
    /// resolvers in priority order and falling back to the current variable frame (or
    /// the global frame for `GLOBAL_ONLY`).
    pub fn resolve_var(&self, name: &str, flags: VarFlags) -> Result<(FrameId, String), Exception> {
        if name.is_empty() {
            return Err(EmberError::InvalidName(name.into()).into());
        }

        for (_, resolver) in &self.resolvers {
            match resolver.resolve_variable_frame(&self.frames, name, flags)? {
                Resolution::Resolved { frame, name } => return Ok((frame, name)),
                Resolution::Deferred => (),
            }
        }

        let frame = if flags.contains(VarFlags::GLOBAL_ONLY) {
            self.frames.global_id()
        } else {
            self.frames.variable_frame()
        };

        Ok((frame, name.into()))
    }

    /// Retrieves the value of the named variable, which may be a scalar or an array
    /// element written as `name(index)`.
    ///
    /// ```
    /// use ember::*;
    /// # fn dummy() -> EmberResult {
    /// let mut interp = Interp::new();
    /// interp.eval("set a(x) 1; set b 2", &mut ())?;
    /// assert_eq!(interp.get("a(x)", VarFlags::empty())?.as_str(), "1");
    /// assert_eq!(interp.get("b", VarFlags::empty())?.as_str(), "2");
    /// # ember_ok!()
    /// # }
    /// ```
    pub fn get(&self, name: &str, flags: VarFlags) -> EmberResult {
        self.get_var_name(&VarName::parse(name), flags)
    }

    fn get_var_name(&self, var_name: &VarName, flags: VarFlags) -> EmberResult {
        let (frame, local) = self.resolve_var(var_name.name(), flags)?;

        let value = match var_name.index() {
            Some(index) => self.frames.get_elem(frame, &local, index)?,
            None => self.frames.get(frame, &local)?,
        };

        Ok(value)
    }

    /// Sets the named variable, scalar or array element, creating it if need be.
    /// Returns the stored value.
    pub fn set(&mut self, name: &str, value: Value, flags: VarFlags) -> EmberResult {
        self.set_var_name(&VarName::parse(name), value, flags)
    }

    fn set_var_name(&mut self, var_name: &VarName, value: Value, flags: VarFlags) -> EmberResult {
        let (frame, local) = self.resolve_var(var_name.name(), flags)?;

        let value = match var_name.index() {
            Some(index) => self.frames.set_elem(frame, &local, index, value)?,
            None => self.frames.set(frame, &local, value)?,
        };

        Ok(value)
    }

    /// Unsets the named variable or array element.  Unsetting a link follows the
    /// interpreter's [`UnsetLinkPolicy`].
    pub fn unset(&mut self, name: &str, flags: VarFlags) -> Result<(), Exception> {
        let var_name = VarName::parse(name);
        let (frame, local) = self.resolve_var(var_name.name(), flags)?;

        match var_name.index() {
            Some(index) => self.frames.unset_elem(frame, &local, index, flags)?,
            None => self
                .frames
                .unset(frame, &local, flags, self.unset_link_policy)?,
        }

        Ok(())
    }

    /// Whether the named variable or element exists.
    pub fn exists(&self, name: &str) -> bool {
        let var_name = VarName::parse(name);

        match self.resolve_var(var_name.name(), VarFlags::empty()) {
            Ok((frame, local)) => match var_name.index() {
                Some(index) => self.frames.elem_exists(frame, &local, index),
                None => self.frames.exists(frame, &local),
            },
            Err(_) => false,
        }
    }

    /// Retrieves the value of the named variable, using the value's cached parse of
    /// the variable name.
    ///
    /// ```
    /// use ember::*;
    /// # fn dummy() -> EmberResult {
    /// let mut interp = Interp::<()>::new();
    /// let name = Value::from("total");
    /// interp.set_var(&name, Value::from(10))?;
    /// assert_eq!(interp.var(&name)?.as_int()?, 10);
    /// # ember_ok!()
    /// # }
    /// ```
    pub fn var(&self, var_name: &Value) -> EmberResult {
        self.get_var_name(&var_name.as_var_name(), VarFlags::empty())
    }

    /// Returns true if the named variable exists.
    pub fn var_exists(&self, var_name: &Value) -> bool {
        self.exists(var_name.as_str())
    }

    /// Sets the value of the named variable.
    pub fn set_var(&mut self, var_name: &Value, value: Value) -> Result<(), Exception> {
        self.set_var_name(&var_name.as_var_name(), value, VarFlags::empty())?;
        Ok(())
    }

    /// Sets the value of the named variable and returns the stored value.  This is the
    /// usual way for a command to finish after setting a variable.
    pub fn set_var_return(&mut self, var_name: &Value, value: Value) -> EmberResult {
        self.set_var_name(&var_name.as_var_name(), value, VarFlags::empty())
    }

    /// Unsets the named variable, reporting no error if it doesn't exist.
    pub fn unset_var(&mut self, var_name: &Value) {
        if let Err(exception) = self.unset(var_name.as_str(), VarFlags::NO_COMPLAIN) {
            warn!(name = %var_name, error = %exception, "unset failed");
        }
    }

    /// Retrieves the value of a scalar variable.
    pub fn scalar(&self, name: &str) -> EmberResult {
        let (frame, local) = self.resolve_var(name, VarFlags::empty())?;
        Ok(self.frames.get(frame, &local)?)
    }

    /// Sets a scalar variable.
    pub fn set_scalar(&mut self, name: &str, value: Value) -> Result<(), Exception> {
        let (frame, local) = self.resolve_var(name, VarFlags::empty())?;
        self.frames.set(frame, &local, value)?;
        Ok(())
    }

    /// Retrieves an array element.
    pub fn element(&self, name: &str, index: &str) -> EmberResult {
        let (frame, local) = self.resolve_var(name, VarFlags::empty())?;
        Ok(self.frames.get_elem(frame, &local, index)?)
    }

    /// Sets an array element.
    pub fn set_element(&mut self, name: &str, index: &str, value: Value) -> Result<(), Exception> {
        let (frame, local) = self.resolve_var(name, VarFlags::empty())?;
        self.frames.set_elem(frame, &local, index, value)?;
        Ok(())
    }

    /// Retrieves a variable as an integer.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut interp = Interp::<()>::new();
    /// interp.set_scalar("n", Value::from("12")).unwrap();
    /// interp.set_scalar("s", Value::from("twelve")).unwrap();
    /// assert_eq!(interp.get_int("n").unwrap(), 12);
    /// assert_eq!(
    ///     interp.get_int("s").unwrap_err().value().as_str(),
    ///     "expected integer but got \"twelve\""
    /// );
    /// ```
    pub fn get_int(&self, name: &str) -> Result<EmberInt, Exception> {
        self.get(name, VarFlags::empty())?.as_int()
    }

    pub fn get_float(&self, name: &str) -> Result<EmberFloat, Exception> {
        self.get(name, VarFlags::empty())?.as_float()
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, Exception> {
        self.get(name, VarFlags::empty())?.as_bool()
    }

    pub fn get_list(&self, name: &str) -> Result<Rc<EmberList>, Exception> {
        self.get(name, VarFlags::empty())?.as_list()
    }

    /// Stores a list in a variable.  The value keeps the list form, so a later
    /// `get_list` doesn't reparse it.
    pub fn set_list(&mut self, name: &str, list: EmberList) -> EmberResult {
        self.set(name, Value::from(list), VarFlags::empty())
    }

    pub fn set_int(&mut self, name: &str, value: EmberInt) -> EmberResult {
        self.set(name, Value::from(value), VarFlags::empty())
    }

    /// Links `local_name` in the current variable frame to `target_name` in
    /// `target_frame`.  A qualified target name is resolved through the resolvers
    /// instead.  Neither name may be an array element.
    pub fn link(
        &mut self,
        local_name: &str,
        target_frame: FrameId,
        target_name: &str,
        mode: LinkMode,
    ) -> Result<(), Exception> {
        for name in [local_name, target_name] {
            if VarName::parse(name).index().is_some() || name.is_empty() {
                return Err(EmberError::InvalidName(name.into()).into());
            }
        }

        let (target_frame, target_name) = if target_name.contains("::") {
            self.resolve_var(target_name, VarFlags::empty())?
        } else {
            (target_frame, target_name.to_string())
        };

        let local = self.frames.variable_frame();
        self.frames
            .link(local, local_name, target_frame, &target_name, mode)?;
        Ok(())
    }

    /// Links `local_name` in the current variable frame to `target_name` in the frame
    /// named by the level spec, as `upvar` does.
    pub fn upvar(
        &mut self,
        level: &LevelSpec,
        target_name: &str,
        local_name: &str,
    ) -> Result<(), Exception> {
        let target = self.frames.resolve_frame_for_level(level)?;
        self.link(local_name, target, target_name, LinkMode::Create)
    }

    /// Links the global variable to a local of the same name, as `global` does.  At the
    /// global level this does nothing.  A qualified name links its tail.
    pub fn global(&mut self, name: &str) -> Result<(), Exception> {
        if self.frames.variable_frame() == self.frames.global_id() {
            return Ok(());
        }

        let local = name.rsplit("::").next().unwrap_or(name);
        let global = self.frames.global_id();
        self.link(local, global, name, LinkMode::Create)
    }

    /// Attaches a trace guard to the named variable.
    pub fn set_trace(&mut self, name: &str, trace: Rc<dyn VarTrace>) -> Result<(), Exception> {
        let (frame, local) = self.resolve_var(name, VarFlags::empty())?;
        self.frames.set_trace(frame, &local, trace)?;
        Ok(())
    }

    /// Gets a list of the names of the variables that are visible in the current scope,
    /// including links.
    pub fn vars_in_scope(&self) -> EmberList {
        self.frames.var_names(self.frames.variable_frame())
    }

    /// Gets a list of the names of the variables defined in the global scope.
    pub fn vars_in_global_scope(&self) -> EmberList {
        self.frames.var_names(self.frames.global_id())
    }

    /// Gets a list of the names of the current scope's own variables.  At the global
    /// level this is empty, as in standard TCL.
    pub fn vars_in_local_scope(&self) -> EmberList {
        let frame = self.frames.variable_frame();

        if frame == self.frames.global_id() {
            Vec::new()
        } else {
            self.frames.local_names(frame)
        }
    }

    pub fn array_exists(&self, array_name: &str) -> bool {
        self.resolve_var(array_name, VarFlags::empty())
            .map(|(frame, local)| self.frames.array_exists(frame, &local))
            .unwrap_or(false)
    }

    /// Gets a flat list of the keys and values of the named array.
    pub fn array_get(&self, array_name: &str) -> EmberList {
        self.resolve_var(array_name, VarFlags::empty())
            .map(|(frame, local)| self.frames.array_get(frame, &local))
            .unwrap_or_default()
    }

    /// Merges a flat list of keys and values into the named array.
    pub fn array_set(&mut self, array_name: &str, kvlist: &[Value]) -> Result<(), Exception> {
        if kvlist.len() % 2 != 0 {
            return ember_err!("list must have an even number of elements");
        }

        let (frame, local) = self.resolve_var(array_name, VarFlags::empty())?;
        self.frames.array_set(frame, &local, kvlist)?;
        Ok(())
    }

    pub fn array_names(&self, array_name: &str) -> EmberList {
        self.resolve_var(array_name, VarFlags::empty())
            .map(|(frame, local)| self.frames.array_names(frame, &local))
            .unwrap_or_default()
    }

    pub fn array_size(&self, array_name: &str) -> usize {
        self.resolve_var(array_name, VarFlags::empty())
            .map(|(frame, local)| self.frames.array_size(frame, &local))
            .unwrap_or(0)
    }

    /// Unsets the named array, if it is one.
    pub fn array_unset(&mut self, array_name: &str) -> Result<(), Exception> {
        if self.array_exists(array_name) {
            self.unset(array_name, VarFlags::NO_COMPLAIN)?;
        }
        Ok(())
    }

    //--------------------------------------------------------------------------------------------
    // Call Frames

    /// The call stack, for inspection.
    pub fn call_stack(&self) -> &CallStack {
        &self.frames
    }

    /// The call stack, for frame manipulation by commands.
    pub fn call_stack_mut(&mut self) -> &mut CallStack {
        &mut self.frames
    }

    /// Creates a tracking frame tagged with a construct name and purpose.
    pub fn new_tracking_frame(&mut self, name: &str, purpose: FrameFlags) -> Frame {
        self.frames.new_tracking_frame(name, purpose)
    }

    pub fn push_frame(&mut self, frame: Frame) -> FrameId {
        self.frames.push(frame)
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.current_frame()
    }

    /// Resolves a level spec to a variable frame.
    pub fn resolve_frame_for_level(&self, level: &LevelSpec) -> Result<FrameId, Exception> {
        Ok(self.frames.resolve_frame_for_level(level)?)
    }

    /// Runs `f` with `frame` pushed, then pops it along with any frames `f` left open.
    /// The stack depth afterwards is what it was before, whatever `f` returns.
    ///
    /// ```
    /// use ember::*;
    ///
    /// let mut interp = Interp::new();
    /// let depth = interp.call_stack().depth();
    ///
    /// let frame = interp.new_tracking_frame("demo", FrameFlags::EVAL);
    /// let result = interp.with_frame(frame, |interp| {
    ///     interp.eval("scope create s; scope open s; error x", &mut ())
    /// });
    ///
    /// assert!(result.is_err());
    /// assert_eq!(interp.call_stack().depth(), depth);
    /// ```
    pub fn with_frame<R>(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> R) -> R {
        let id = self.frames.push(frame);
        let result = f(self);
        self.frames.pop_scope_frames_and_one_more(id);
        result
    }

    /// The level of the current variable frame; the global level is 0.
    pub fn scope_level(&self) -> usize {
        self.frames.level()
    }

    //--------------------------------------------------------------------------------------------
    // Resolvers

    /// Adds a resolver.  Resolvers are consulted in ascending priority order; resolvers
    /// with equal priority in the order they were added.  The namespace resolver is
    /// installed at priority 0.
    pub fn add_resolver(&mut self, priority: i32, resolver: Rc<dyn Resolver>) {
        let at = self
            .resolvers
            .iter()
            .position(|(p, _)| *p > priority)
            .unwrap_or(self.resolvers.len());
        self.resolvers.insert(at, (priority, resolver));
    }

    /// Removes the named resolver, returning true if there was one.
    pub fn remove_resolver(&mut self, name: &str) -> bool {
        let before = self.resolvers.len();
        self.resolvers.retain(|(_, resolver)| resolver.name() != name);
        self.resolvers.len() != before
    }

    pub fn resolver_names(&self) -> Vec<String> {
        self.resolvers
            .iter()
            .map(|(_, resolver)| resolver.name().to_string())
            .collect()
    }

    //--------------------------------------------------------------------------------------------
    // Command Definition and Handling

    /// Adds a closure as a command.
    #[cfg(feature = "closure-commands")]
    pub fn add_command_closure(
        &mut self,
        name: &str,
        func: impl (Fn(&mut Self, &[Value], &mut Ctx) -> EmberOptResult) + 'static,
    ) {
        self.insert_command(name, CommandFlags::empty(), Command::Closure(Box::new(func)));
    }

    /// Adds a binary command to the interpreter.  This is the normal way to add most
    /// commands.  See the [module level documentation](index.html) for an overview and
    /// examples.
    pub fn add_command(&mut self, name: &str, func: CommandFunc<Ctx>) {
        self.add_command_with_flags(name, CommandFlags::empty(), func);
    }

    /// Adds a binary command with static metadata flags.
    pub fn add_command_with_flags(&mut self, name: &str, flags: CommandFlags, func: CommandFunc<Ctx>) {
        self.insert_command(name, flags, Command::Native(func));
    }

    fn insert_command(&mut self, name: &str, flags: CommandFlags, command: Command<Ctx>) {
        let entry = CommandEntry {
            command: Rc::new(command),
            flags,
        };
        self.commands.insert(name.into(), entry);
    }

    /// Adds a procedure to the interpreter.  The arguments are the same as for the
    /// `proc` command, which validates the parameter list.
    pub(crate) fn add_proc(&mut self, name: &str, parms: &[Value], body: &Value) {
        let proc = Procedure {
            parms: parms.to_owned(),
            body: body.clone(),
        };

        let flags = merge_command_flags(CommandFlags::PROCEDURE, CommandFlags::SAFE);
        self.insert_command(name, flags, Command::Proc(proc));
    }

    /// Determines whether or not the interpreter contains a command with the given
    /// name.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Returns the metadata flags of the named command.
    pub fn command_flags(&self, name: &str) -> Option<CommandFlags> {
        self.commands.get(name).map(|entry| entry.flags)
    }

    /// Renames the command.
    ///
    /// **Note:** This does not update procedures that reference the command under the old
    /// name.  It is a common TCL programming technique to wrap an existing command by
    /// renaming it and defining a new command with the old name that calls the original
    /// command at its new name.
    ///
    /// # Example
    ///
    /// ```
    /// use ember::Interp;
    /// use ember::types::*;
    /// use ember::ember_ok;
    /// # fn dummy() -> EmberResult {
    /// let mut interp = Interp::new();
    ///
    /// interp.rename_command("expr", "=");
    ///
    /// let sum = interp.eval("= {1 + 1}", &mut ())?.as_int()?;
    ///
    /// assert_eq!(sum, 2);
    /// # ember_ok!()
    /// # }
    /// ```
    pub fn rename_command(&mut self, old_name: &str, new_name: &str) {
        if let Some(entry) = self.commands.shift_remove(old_name) {
            self.commands.insert(new_name.into(), entry);
        }
    }

    /// Removes the command with the given name.
    pub fn remove_command(&mut self, name: &str) {
        self.commands.shift_remove(name);
    }

    /// Gets a vector of the names of the existing commands.
    pub fn command_names(&self) -> EmberList {
        self.commands.keys().map(Value::from).collect()
    }

    /// Returns the type of the named command: `native`, `closure`, or `proc`.
    pub fn command_type(&self, command: &str) -> EmberResult {
        match self.commands.get(command) {
            Some(entry) => ember_ok!(entry.command.cmdtype()),
            None => ember_err!("\"{}\" isn't a command", command),
        }
    }

    /// Gets a vector of the names of the existing procedures.
    pub fn proc_names(&self) -> EmberList {
        self.commands
            .iter()
            .filter(|(_, entry)| entry.command.is_proc())
            .map(|(name, _)| Value::from(name))
            .collect()
    }

    fn procedure(&self, procname: &str) -> Result<&Procedure, Exception> {
        if let Some(entry) = self.commands.get(procname) {
            if let Command::Proc(proc) = &*entry.command {
                return Ok(proc);
            }
        }

        ember_err!("\"{}\" isn't a procedure", procname)
    }

    /// Returns the body of the named procedure, or an error if the name doesn't
    /// name a procedure.
    pub fn proc_body(&self, procname: &str) -> EmberResult {
        Ok(self.procedure(procname)?.body.clone())
    }

    /// Returns a list of the names of the arguments of the named procedure.
    pub fn proc_args(&self, procname: &str) -> EmberResult {
        let proc = self.procedure(procname)?;
        let mut names = Vec::new();

        for spec in &proc.parms {
            names.push(spec.as_list()?.first().cloned().unwrap_or_default());
        }

        Ok(Value::from(names))
    }

    /// Returns the default value of the named argument of the named procedure, if it has
    /// one.
    pub fn proc_default(&self, procname: &str, arg: &str) -> Result<Option<Value>, Exception> {
        let proc = self.procedure(procname)?;

        for spec in &proc.parms {
            let spec = spec.as_list()?;
            if spec.first().map(|name| name.as_str()) == Some(arg) {
                return Ok(spec.get(1).cloned());
            }
        }

        ember_err!(
            "procedure \"{}\" doesn't have an argument \"{}\"",
            procname,
            arg
        )
    }

    /// Calls a subcommand of the current command, looking up its name in an array of
    /// `Subcommand` tuples.  `subc` is the index of the subcommand's name in `argv`.
    ///
    /// If the subcommand name is found in the array, the matching `CommandFunc` is called
    /// with the same `argv`; otherwise the error message lists the valid subcommands.
    pub fn call_subcommand(
        &mut self,
        argv: &[Value],
        subc: usize,
        subcommands: &[Subcommand<Ctx>],
        ctx: &mut Ctx,
    ) -> EmberOptResult {
        check_args(subc, argv, subc + 1, 0, "subcommand ?arg ...?")?;
        let rec = Subcommand::find(subcommands, argv[subc].as_str())?;
        (rec.1)(self, argv, ctx)
    }

    //--------------------------------------------------------------------------------------------
    // Interpreter Configuration

    /// Gets the interpreter's recursion limit: how deep the stack of script evaluations may be.
    ///
    /// A script stack level is added by each nested script evaluation (i.e., by each call)
    /// to [`eval`](#method.eval) or [`eval_value`](#method.eval_value).
    ///
    /// # Example
    /// ```
    /// # use ember::interp::Interp;
    /// let mut interp = Interp::<()>::new();
    /// assert_eq!(interp.recursion_limit(), 1000);
    /// ```
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Sets the interpreter's recursion limit.  The default is 1000.
    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Gets the loop iteration ceiling.  `None`, the default, is unlimited.
    pub fn iteration_limit(&self) -> Option<usize> {
        self.iteration_limit
    }

    pub fn set_iteration_limit(&mut self, limit: Option<usize>) {
        self.iteration_limit = limit;
    }

    /// Gets the bound on link redirections a single variable access may follow.
    pub fn link_redirect_limit(&self) -> usize {
        self.frames.max_redirects()
    }

    /// Sets the link redirection bound.  The default is 64.
    pub fn set_link_redirect_limit(&mut self, limit: usize) {
        self.frames.set_max_redirects(limit);
    }

    /// Gets what `unset` does to the target of a link.
    pub fn unset_link_policy(&self) -> UnsetLinkPolicy {
        self.unset_link_policy
    }

    pub fn set_unset_link_policy(&mut self, policy: UnsetLinkPolicy) {
        self.unset_link_policy = policy;
    }
}

/// Builds the script or expression for a construct from `argv[start..]`.
pub(crate) fn concat_args(argv: &[Value], start: usize) -> Value {
    match argv.get(start..) {
        Some([single]) => single.clone(),
        Some(rest) if !rest.is_empty() => {
            let parts: Vec<&str> = rest
                .iter()
                .map(|arg| arg.as_str().trim())
                .filter(|arg| !arg.is_empty())
                .collect();
            Value::from(parts.join(" "))
        }
        _ => Value::empty(),
    }
}

/// Quotes a command's text for a stack trace, eliding long commands.
fn quote_command(text: &str) -> String {
    if text.chars().count() > MAX_CONTEXT_CHARS {
        let head: String = text.chars().take(MAX_CONTEXT_CHARS).collect();
        format!("\"{}...\"", head)
    } else {
        format!("\"{}\"", text)
    }
}

/// How a procedure is defined: as an argument list and a body script.
/// The argument list is a list of Values, and the body is a Value; each will
/// retain its parsed form.
///
/// NOTE: We do not save the procedure's name; the name exists only in the
/// commands table, and can be changed there freely.
struct Procedure {
    /// The procedure's parameter list.  Each item in the list is a name or a
    /// name/default value pair.  (This is verified by the `proc` command.)
    parms: EmberList,

    /// The procedure's body string, as a Value.
    body: Value,
}

impl Procedure {
    fn execute<Ctx>(&self, interp: &mut Interp<Ctx>, argv: &[Value], ctx: &mut Ctx) -> EmberResult {
        let name = argv[0].as_str();

        // FIRST, push the proc's frame onto the stack and bind the arguments.
        let frame = interp.frames.new_procedure_frame(name, argv);
        let id = interp.frames.push(frame);

        if let Err(exception) = self.bind_args(interp, id, argv) {
            interp.frames.pop_scope_frames_and_one_more(id);
            return Err(exception);
        }

        // NEXT, evaluate the proc's body, then pop its frame and anything the body
        // left open.
        let result = interp.eval_value(&self.body, ctx);
        interp.frames.pop_scope_frames_and_one_more(id);

        match result {
            Ok(value) => Ok(value),
            Err(mut exception) => {
                // FIRST, a bare break or continue can't escape the body.
                match exception.code() {
                    ResultCode::Break => return ember_err!("invoked \"break\" outside of a loop"),
                    ResultCode::Continue => {
                        return ember_err!("invoked \"continue\" outside of a loop")
                    }
                    ResultCode::Return => exception.decrement_level(),
                    _ => {}
                }

                // NEXT, a return whose -level is used up takes effect as its -code.
                match exception.code() {
                    ResultCode::Okay => Ok(exception.value()),
                    ResultCode::Error => {
                        let context =
                            format!("    (procedure \"{}\" line {})", name, interp.error_line);
                        interp.append_error_context(&mut exception, &context);
                        Err(exception)
                    }
                    _ => Err(exception),
                }
            }
        }
    }

    fn bind_args<Ctx>(
        &self,
        interp: &mut Interp<Ctx>,
        frame: FrameId,
        argv: &[Value],
    ) -> Result<(), Exception> {
        let mut argi = 1; // Skip the proc's name

        for (speci, spec) in self.parms.iter().enumerate() {
            let vec = spec.as_list()?;
            let parm = vec.first().map(|v| v.as_str()).unwrap_or_default();

            // "args" has special meaning only if it's the final parameter.
            if parm == "args" && speci == self.parms.len() - 1 {
                let rest = argv.get(argi..).unwrap_or_default();
                interp.frames.set(frame, "args", Value::from(rest))?;
                argi = argv.len();
                break;
            }

            if argi < argv.len() {
                interp.frames.set(frame, parm, argv[argi].clone())?;
                argi += 1;
                continue;
            }

            match vec.get(1) {
                Some(default) => {
                    interp.frames.set(frame, parm, default.clone())?;
                }
                None => return self.wrong_num_args(&argv[0]),
            }
        }

        if argi != argv.len() {
            return self.wrong_num_args(&argv[0]);
        }

        Ok(())
    }

    // Outputs the wrong # args message for the proc.  The name is passed in
    // because it can be changed via the `rename` command.
    fn wrong_num_args(&self, name: &Value) -> Result<(), Exception> {
        let mut msg = String::new();
        msg.push_str("wrong # args: should be \"");
        msg.push_str(name.as_str());

        for (i, arg) in self.parms.iter().enumerate() {
            msg.push(' ');

            // "args" has special meaning only in the last place.
            if arg.as_str() == "args" && i == self.parms.len() - 1 {
                msg.push_str("?arg ...?");
                break;
            }

            let vec = arg.as_list().unwrap_or_default();
            match vec.as_slice() {
                [parm] => msg.push_str(parm.as_str()),
                [parm, _] => {
                    msg.push('?');
                    msg.push_str(parm.as_str());
                    msg.push('?');
                }
                _ => msg.push_str(arg.as_str()),
            }
        }
        msg.push('\"');

        ember_err!(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty() {
        let interp = Interp::<()>::empty();
        assert!(interp.command_names().is_empty());
    }

    #[test]
    fn test_new() {
        let interp = Interp::<()>::new();
        assert!(!interp.command_names().is_empty());
        assert!(interp.has_command("uplevel"));
    }

    #[test]
    fn test_new_safe() {
        let interp = Interp::<()>::new_safe();
        assert!(interp.has_command("catch"));
        assert!(!interp.has_command("puts"));
        assert!(!interp.has_command("exit"));
        assert!(interp
            .command_flags("set")
            .map(|flags| flags.contains(CommandFlags::SAFE))
            .unwrap_or(false));
    }

    #[test]
    fn test_eval() {
        let mut interp = Interp::new();

        assert_eq!(interp.eval("set a 1", &mut ()), Ok(Value::from("1")));
        assert!(ex_match(
            &interp.eval("error 2", &mut ()),
            Exception::ember_err(Value::from("2"))
        ));
        assert_eq!(interp.eval("return 3", &mut ()), Ok(Value::from("3")));
        assert!(ex_match(
            &interp.eval("break", &mut ()),
            Exception::ember_err(Value::from("invoked \"break\" outside of a loop"))
        ));
        assert!(ex_match(
            &interp.eval("continue", &mut ()),
            Exception::ember_err(Value::from("invoked \"continue\" outside of a loop"))
        ));
    }

    // Shows that the result matches the given exception.  Ignores the exception's
    // ErrorData, if any.
    fn ex_match(r: &EmberResult, expected: Exception) -> bool {
        if let Err(e) = r {
            e.code() == expected.code() && e.value() == expected.value()
        } else {
            false
        }
    }

    #[test]
    fn test_eval_value() {
        let mut interp = Interp::new();

        assert_eq!(
            interp.eval_value(&Value::from("set a 1"), &mut ()),
            Ok(Value::from("1"))
        );
        assert!(ex_match(
            &interp.eval_value(&Value::from("error 2"), &mut ()),
            Exception::ember_err(Value::from("2"))
        ));
        assert!(ex_match(
            &interp.eval_value(&Value::from("set a {"), &mut ()),
            Exception::ember_err(Value::from("missing close-brace"))
        ));

        // A parse error doesn't leave the nesting count behind.
        assert_eq!(interp.eval("set b 2", &mut ()), Ok(Value::from("2")));
    }

    #[test]
    fn test_custom_codes_pass_through() {
        let mut interp = Interp::new();

        let err = interp.eval("return -code 42 hello", &mut ()).unwrap_err();
        assert_eq!(err.code(), ResultCode::Other(42));
        assert_eq!(err.value().as_str(), "hello");

        let script = "proc p {} { while 1 { return -code 7 -level 0 inner } }; p";
        let err = interp.eval(script, &mut ()).unwrap_err();
        assert_eq!(err.code(), ResultCode::Other(7));
        assert_eq!(err.value().as_str(), "inner");
    }

    #[test]
    fn test_error_info_accumulates() {
        let mut interp = Interp::new();
        let script = "proc p {} {\n    set x 1\n    error boom\n}\np";

        let err = interp.eval(script, &mut ()).unwrap_err();
        assert_eq!(
            err.error_info().as_str(),
            "boom\n    while executing\n\"error boom\"\n    (procedure \"p\" line 3)\n    invoked from within\n\"p\""
        );
        assert_eq!(interp.current_error_line(), 5);
        assert_eq!(
            interp.scalar("errorInfo").expect("errorInfo"),
            err.error_info()
        );
    }

    #[test]
    fn test_error_already_logged() {
        let mut interp = Interp::new();

        let err = interp
            .eval("proc p {} {error boom {custom info}}\np", &mut ())
            .unwrap_err();
        assert_eq!(err.error_info().as_str(), "custom info");
        assert!(interp.error_already_logged());

        // The next top-level evaluation starts clean.
        let err = interp.eval("error again", &mut ()).unwrap_err();
        assert_eq!(
            err.error_info().as_str(),
            "again\n    while executing\n\"error again\""
        );
    }

    #[test]
    fn test_evaluate_script_pops_leaked_frames() {
        let mut interp = Interp::new();
        let depth = interp.call_stack().depth();
        let argv = [
            Value::from("test"),
            Value::from("scope create s1"),
            Value::from("; scope open s1; error fail"),
        ];

        let err = interp.evaluate_script("test", &argv, 1, &mut ()).unwrap_err();
        assert_eq!(err.value().as_str(), "fail");
        assert!(err.error_info().as_str().ends_with("(\"test\" body line 1)"));
        assert_eq!(interp.call_stack().depth(), depth);
    }

    #[test]
    fn test_evaluate_expression() {
        let mut interp = Interp::new();
        let argv = [Value::from("calc"), Value::from("2 *"), Value::from("21")];
        assert_eq!(
            interp.evaluate_expression("calc", &argv, 1, &mut ()),
            Ok(Value::from(42))
        );
    }

    #[test]
    fn test_substitute() {
        let mut interp = Interp::new();
        interp.set_scalar("a", Value::from("A")).expect("set");

        let text = Value::from("$a-[set a]-\\n");
        assert_eq!(
            interp
                .substitute(&text, SubstFlags::ALL, &mut ())
                .expect("subst")
                .as_str(),
            "A-A-\n"
        );
        assert_eq!(
            interp
                .substitute(&text, SubstFlags::COMMANDS, &mut ())
                .expect("subst")
                .as_str(),
            "$a-A-\\n"
        );

        let text = Value::from("x[break]y");
        assert_eq!(
            interp
                .substitute(&text, SubstFlags::ALL, &mut ())
                .expect("subst")
                .as_str(),
            "x"
        );

        let text = Value::from("x[continue]y");
        assert_eq!(
            interp
                .substitute(&text, SubstFlags::ALL, &mut ())
                .expect("subst")
                .as_str(),
            "xy"
        );
    }

    #[test]
    fn test_iteration_limit() {
        let mut interp = Interp::new();
        interp.set_iteration_limit(Some(5));
        assert_eq!(interp.iteration_limit(), Some(5));

        interp.set_scalar("tests", Value::from(0)).expect("set");
        let err = interp
            .eval("while {[incr tests] > 0} {}", &mut ())
            .unwrap_err();
        assert_eq!(err.value().as_str(), "iteration limit 5 exceeded");
        assert_eq!(interp.get_int("tests").expect("tests"), 6);

        // A loop that finishes within the limit is fine.
        assert!(interp.eval("for {set i 0} {$i < 5} {incr i} {}", &mut ()).is_ok());
    }

    #[test]
    fn test_halt() {
        let mut interp = Interp::new();
        let handle = interp.halt_handle();
        interp.add_command("halt", |interp, _, _| {
            interp.halt_handle().request();
            Ok(None)
        });

        let err = interp
            .eval("set n 0; while 1 { incr n; if {$n == 3} halt }", &mut ())
            .unwrap_err();
        assert_eq!(err.value().as_str(), "eval canceled");
        assert_eq!(interp.get_int("n").expect("n"), 3);
        assert!(!handle.is_requested());

        // catch can't swallow a cancellation.
        let err = interp.eval("catch { halt; set x 1 }", &mut ()).unwrap_err();
        assert_eq!(err.value().as_str(), "eval canceled");
        assert!(!interp.exists("x"));
        assert!(!handle.is_requested());
    }

    #[test]
    fn test_resolver_order() {
        struct Fixed(&'static str, Option<FrameId>);

        impl Resolver for Fixed {
            fn name(&self) -> &str {
                self.0
            }

            fn resolve_variable_frame(
                &self,
                _: &CallStack,
                name: &str,
                _: VarFlags,
            ) -> Result<Resolution, EmberError> {
                match self.1 {
                    Some(frame) if name.starts_with("g_") => Ok(Resolution::Resolved {
                        frame,
                        name: name.into(),
                    }),
                    _ => Ok(Resolution::Deferred),
                }
            }
        }

        let mut interp = Interp::new();
        let global = interp.call_stack().global_id();
        interp.add_resolver(10, Rc::new(Fixed("globals", Some(global))));
        interp.add_resolver(5, Rc::new(Fixed("deferring", None)));
        assert_eq!(
            interp.resolver_names(),
            vec!["namespace", "deferring", "globals"]
        );

        interp
            .eval("proc p {} { set g_x 1; set local 2 }; p", &mut ())
            .expect("eval");
        assert_eq!(interp.scalar("g_x").expect("g_x").as_str(), "1");
        assert!(!interp.exists("local"));

        assert!(interp.remove_resolver("globals"));
        assert!(!interp.remove_resolver("globals"));
    }

    #[test]
    fn test_link_policy() {
        let mut interp = Interp::new();
        assert_eq!(interp.unset_link_policy(), UnsetLinkPolicy::AliasOnly);
        interp.eval("set g 1; proc p {} { global g; unset g }; p", &mut ()).expect("eval");
        assert!(interp.exists("g"));

        interp.set_unset_link_policy(UnsetLinkPolicy::Target);
        interp.eval("p", &mut ()).expect("eval");
        assert!(!interp.exists("g"));
    }

    #[test]
    fn test_version_is_read_only() {
        let mut interp = Interp::new();
        assert_eq!(
            interp.scalar("ember_version").expect("version").as_str(),
            env!("CARGO_PKG_VERSION")
        );
        assert!(interp.eval("set ember_version 0", &mut ()).is_err());
    }

    #[test]
    fn test_complete() {
        let mut interp = Interp::<()>::new();

        assert!(interp.complete("abc"));
        assert!(interp.complete("a {bc} [def] \"ghi\" xyz"));

        assert!(!interp.complete("a {bc"));
        assert!(!interp.complete("a [bc"));
        assert!(!interp.complete("a \"bc"));
    }

    #[test]
    fn test_expr() {
        let mut interp = Interp::new();
        assert_eq!(interp.expr(&Value::from("1 + 2"), &mut ()), Ok(Value::from(3)));
        assert!(ex_match(
            &interp.expr(&Value::from("a + b"), &mut ()),
            Exception::ember_err(Value::from("invalid bareword \"a\""))
        ));
    }

    #[test]
    fn test_expr_bool() {
        let mut interp = Interp::new();
        assert_eq!(interp.expr_bool(&Value::from("1"), &mut ()), Ok(true));
        assert_eq!(interp.expr_bool(&Value::from("0"), &mut ()), Ok(false));
        assert!(interp.expr_bool(&Value::from("a"), &mut ()).is_err());
    }

    #[test]
    fn test_expr_int_and_float() {
        let mut interp = Interp::new();
        assert_eq!(interp.expr_int(&Value::from("1 + 2"), &mut ()), Ok(3));

        let val = interp
            .expr_float(&Value::from("1.1 + 2.2"), &mut ())
            .expect("floating point value");
        assert!((val - 3.3).abs() < 0.001);
    }

    #[test]
    fn test_recursion_limit() {
        let mut interp = Interp::new();

        assert_eq!(interp.recursion_limit(), 1000);
        interp.set_recursion_limit(100);
        assert_eq!(interp.recursion_limit(), 100);

        assert!(interp.eval("proc myproc {} { myproc }", &mut ()).is_ok());
        assert!(ex_match(
            &interp.eval("myproc", &mut ()),
            Exception::ember_err(Value::from(
                "too many nested calls to Interp::eval (infinite loop?)"
            ))
        ));
        assert_eq!(interp.call_stack().depth(), 1);
    }
}
