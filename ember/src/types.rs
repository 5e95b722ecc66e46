//! Public Type Declarations
//!
//! This module defines a number of types used throughout Ember's public API.
//!
//! The most important types are [`Value`], the type of data values in the Ember
//! language, and [`EmberResult`], Ember's standard `Result<T,E>` type.  `EmberResult`
//! is an alias for `Result<Value,Exception>`, where [`Exception`] contains the data
//! relating to an exceptional return from a script.  The heart of `Exception` is the
//! [`ResultCode`], which represents the control-flow signal of the evaluation:
//! `Error`, `Return`, `Break`, `Continue`, or a custom code.
//!
//! [`Value`]: ../value/index.html

use crate::interp::Interp;
pub use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// The standard integer type for Ember code.
pub type EmberInt = i64;

/// The standard floating point type for Ember code.
pub type EmberFloat = f64;

/// The standard list type for Ember code.
pub type EmberList = Vec<Value>;

/// The hasher used by the interpreter's tables.
pub type EmberHasher = fnv::FnvBuildHasher;

/// The standard result type for Ember code.  A successful evaluation produces a
/// [`Value`]; every other outcome is carried by an [`Exception`].
pub type EmberResult = Result<Value, Exception>;

/// The result type of command functions.  `Ok(None)` is shorthand for the
/// empty result.
pub type EmberOptResult = Result<Option<Value>, Exception>;

/// A function used to implement a binary Ember command.
///
/// The command may retrieve its arguments from `argv`, and may access the interpreter
/// and the application context as needed.
pub type CommandFunc<Ctx> = fn(&mut Interp<Ctx>, &[Value], &mut Ctx) -> EmberOptResult;

/// A closure used to implement a binary Ember command.
#[cfg(feature = "closure-commands")]
pub type CommandClosure<Ctx> =
    Box<dyn Fn(&mut Interp<Ctx>, &[Value], &mut Ctx) -> EmberOptResult>;

/// A return code: the control-flow signal that accompanies every evaluation.
///
/// `Okay` means "continue following the local logic".  Everything else stops the
/// local logic and travels upward until something intercepts it: loops intercept
/// `Break` and `Continue`, procedures and the top-level evaluation intercept
/// `Return`, and `catch` intercepts everything.  `Other` codes are opaque and pass
/// through unchanged.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResultCode {
    Okay,
    Error,
    Return,
    Break,
    Continue,
    Other(EmberInt),
}

impl ResultCode {
    /// Converts a value to a result code.  The value may be one of the symbolic names
    /// `ok`, `error`, `return`, `break`, or `continue`, or any integer.
    ///
    /// ```
    /// use ember::*;
    ///
    /// assert_eq!(ResultCode::from_value(&"break".into()), Ok(ResultCode::Break));
    /// assert_eq!(ResultCode::from_value(&"7".into()), Ok(ResultCode::Other(7)));
    /// ```
    pub fn from_value(value: &Value) -> Result<Self, Exception> {
        match value.as_str() {
            "ok" => Ok(ResultCode::Okay),
            "error" => Ok(ResultCode::Error),
            "return" => Ok(ResultCode::Return),
            "break" => Ok(ResultCode::Break),
            "continue" => Ok(ResultCode::Continue),
            _ => match value.as_int() {
                Ok(num) => Ok(ResultCode::from_int(num)),
                Err(_) => crate::ember_err!(
                    "invalid result code, expected one of ok, error, return, break, continue, or an integer but got \"{}\"",
                    value
                ),
            },
        }
    }

    /// Converts an integer to a result code.
    pub fn from_int(num: EmberInt) -> Self {
        match num {
            0 => ResultCode::Okay,
            1 => ResultCode::Error,
            2 => ResultCode::Return,
            3 => ResultCode::Break,
            4 => ResultCode::Continue,
            _ => ResultCode::Other(num),
        }
    }

    /// Returns the integer form of the result code.
    pub fn as_int(&self) -> EmberInt {
        match self {
            ResultCode::Okay => 0,
            ResultCode::Error => 1,
            ResultCode::Return => 2,
            ResultCode::Break => 3,
            ResultCode::Continue => 4,
            ResultCode::Other(num) => *num,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultCode::Okay => write!(f, "ok"),
            ResultCode::Error => write!(f, "error"),
            ResultCode::Return => write!(f, "return"),
            ResultCode::Break => write!(f, "break"),
            ResultCode::Continue => write!(f, "continue"),
            ResultCode::Other(num) => write!(f, "{}", num),
        }
    }
}

/// Error information accumulated as an error unwinds: the machine-readable error
/// code (`errorCode`), the human-readable stack trace (`errorInfo`), and an optional
/// nested cause.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorData {
    /// The error code.  Defaults to `NONE`.
    error_code: Value,

    /// The stack trace, one context frame per line.
    stack_trace: Vec<String>,

    /// Whether no context has been added yet.
    is_new: bool,

    /// The error that caused this one, if any.
    cause: Option<Box<Exception>>,
}

impl ErrorData {
    /// Creates a new ErrorData given the error code and error info.
    fn new(error_code: Value, error_info: &str) -> Self {
        Self {
            error_code,
            stack_trace: vec![error_info.into()],
            is_new: true,
            cause: None,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> Value {
        self.error_code.clone()
    }

    /// Returns whether the error has no context attached yet.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Returns the accumulated error info as a value.
    pub fn error_info(&self) -> Value {
        Value::from(self.stack_trace.join("\n"))
    }

    /// Returns the nested cause, if any.
    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_deref()
    }

    fn add_info(&mut self, info: &str) {
        self.stack_trace.push(info.into());
        self.is_new = false;
    }
}

/// This struct represents the exceptional results of evaluating an Ember script: the
/// control-flow signal plus its result value, and for errors the accumulated
/// [`ErrorData`].
///
/// The `-level` and next code fields implement `return -code`/`-level`: a `return`
/// with level greater than zero unwinds that many procedure boundaries, then becomes
/// the next code.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    /// The kind of exception
    code: ResultCode,

    /// The result value
    value: Value,

    /// The return -level value.  Should be non-zero only for `Return`.
    level: usize,

    /// The return -code value.  Should be different from `Okay` only for `Return`.
    next_code: ResultCode,

    /// The error info, if any.
    error_data: Option<ErrorData>,
}

impl Exception {
    /// Returns true if the exception is an error exception, and false otherwise.
    pub fn is_error(&self) -> bool {
        self.code == ResultCode::Error
    }

    /// Returns the exception's error data, or None if it's not an error.
    pub fn error_data(&self) -> Option<&ErrorData> {
        self.error_data.as_ref()
    }

    /// Returns the exception's result code.
    pub fn code(&self) -> ResultCode {
        self.code
    }

    /// Returns the exception's value, e.g., the error message for errors or the
    /// return value for returns.
    pub fn value(&self) -> Value {
        self.value.clone()
    }

    /// Returns the exception's error code, or the empty value if it isn't an error.
    pub fn error_code(&self) -> Value {
        self.error_data
            .as_ref()
            .map(|data| data.error_code())
            .unwrap_or_default()
    }

    /// Returns the exception's error info, or the empty value if it isn't an error.
    pub fn error_info(&self) -> Value {
        self.error_data
            .as_ref()
            .map(|data| data.error_info())
            .unwrap_or_default()
    }

    /// Returns the error that caused this one, if any.
    pub fn cause(&self) -> Option<&Exception> {
        self.error_data.as_ref().and_then(|data| data.cause())
    }

    /// Returns the exception's `-level`.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Returns the exception's next code, the code that a `Return` becomes once its
    /// level reaches zero.
    pub fn next_code(&self) -> ResultCode {
        self.next_code
    }

    /// Decrements the level of a `Return` exception, converting it to its next code
    /// once the level reaches zero.  This is done at each procedure boundary and at
    /// the top-level evaluation.
    pub fn decrement_level(&mut self) {
        debug_assert!(self.code == ResultCode::Return && self.level > 0);
        self.level = self.level.saturating_sub(1);

        if self.level == 0 {
            self.code = self.next_code;
            self.next_code = ResultCode::Okay;
        }
    }

    /// Returns true if no stack trace has been added to the error yet.
    pub fn is_new_error(&self) -> bool {
        self.error_data
            .as_ref()
            .map(|data| data.is_new())
            .unwrap_or(false)
    }

    /// Appends one line of context to an error's stack trace.  Does nothing for
    /// exceptions that aren't errors.
    pub fn add_error_info(&mut self, line: &str) {
        if let Some(data) = &mut self.error_data {
            data.add_info(line);
        }
    }

    /// Creates an `Error` exception with the given message and the default error code.
    ///
    /// # Example
    ///
    /// ```
    /// use ember::*;
    ///
    /// let exception = Exception::ember_err("some error".into());
    /// assert!(exception.is_error());
    /// assert_eq!(exception.value(), "some error".into());
    /// assert_eq!(exception.error_code(), "NONE".into());
    /// ```
    pub fn ember_err(msg: Value) -> Self {
        let data = ErrorData::new(Value::from("NONE"), msg.as_str());

        Self {
            code: ResultCode::Error,
            value: msg,
            level: 0,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// Creates an `Error` exception with the given error code and message.  This is
    /// the structured payload built by the `throw` command.
    pub fn throw(error_code: Value, msg: Value) -> Self {
        let data = ErrorData::new(error_code, msg.as_str());

        Self {
            code: ResultCode::Error,
            value: msg,
            level: 0,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// Creates an `Error` exception whose stack trace starts from the given error info
    /// rather than from the message.  Used by the `error` command.
    pub fn ember_err_with_info(msg: Value, error_info: &Value, error_code: Value) -> Self {
        let data = ErrorData::new(error_code, error_info.as_str());

        Self {
            code: ResultCode::Error,
            value: msg,
            level: 0,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// Attaches a nested cause to an error exception.
    ///
    /// ```
    /// use ember::*;
    /// use std::error::Error;
    ///
    /// let inner = Exception::ember_err("disk full".into());
    /// let outer = Exception::ember_err("can't save".into()).with_cause(inner);
    /// assert_eq!(outer.cause().unwrap().value(), "disk full".into());
    /// assert!(outer.source().is_some());
    /// ```
    pub fn with_cause(mut self, cause: Exception) -> Self {
        if let Some(data) = &mut self.error_data {
            data.cause = Some(Box::new(cause));
        }
        self
    }

    /// Creates a `Return` exception with the given return value.
    pub fn ember_return(value: Value) -> Self {
        Self {
            code: ResultCode::Return,
            value,
            level: 1,
            next_code: ResultCode::Okay,
            error_data: None,
        }
    }

    /// Creates an extended `Return` exception with the given return value, `-level`,
    /// and `-code`.  A level of zero produces the next code immediately.
    pub fn ember_return_ext(value: Value, level: usize, next_code: ResultCode) -> Self {
        let mut exception = Self {
            code: ResultCode::Return,
            value,
            level,
            next_code,
            error_data: None,
        };

        if level == 0 {
            if next_code == ResultCode::Return {
                return Self::ember_return(exception.value);
            }
            exception.code = next_code;
            exception.next_code = ResultCode::Okay;
        }

        exception
    }

    /// Creates an extended `Return` exception that becomes an error, with the given
    /// error code and optional error info.
    pub fn ember_return_err(
        msg: Value,
        level: usize,
        error_code: Option<Value>,
        error_info: Option<Value>,
    ) -> Self {
        let error_code = error_code.unwrap_or_else(|| Value::from("NONE"));
        let error_info = error_info.unwrap_or_else(Value::empty);
        let mut data = ErrorData::new(error_code, error_info.as_str());

        if error_info.as_str().is_empty() {
            data.stack_trace = vec![msg.as_str().into()];
        }

        let code = if level == 0 {
            ResultCode::Error
        } else {
            ResultCode::Return
        };

        Self {
            code,
            value: msg,
            level,
            next_code: ResultCode::Error,
            error_data: Some(data),
        }
    }

    /// Creates a `Break` exception.
    pub fn ember_break() -> Self {
        Self {
            code: ResultCode::Break,
            value: Value::empty(),
            level: 0,
            next_code: ResultCode::Break,
            error_data: None,
        }
    }

    /// Creates a `Continue` exception.
    pub fn ember_continue() -> Self {
        Self {
            code: ResultCode::Continue,
            value: Value::empty(),
            level: 0,
            next_code: ResultCode::Continue,
            error_data: None,
        }
    }

    /// Creates an exception with an arbitrary custom code.
    pub fn with_code(code: ResultCode, value: Value) -> Self {
        match code {
            ResultCode::Error => Self::ember_err(value),
            ResultCode::Return => Self::ember_return(value),
            _ => Self {
                code,
                value,
                level: 0,
                next_code: code,
                error_data: None,
            },
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// A record that defines an ensemble subcommand: its name and the function that
/// implements it.
pub struct Subcommand<Ctx>(pub &'static str, pub CommandFunc<Ctx>);

impl<Ctx> Subcommand<Ctx> {
    /// Looks up a subcommand of an ensemble command by name in a table,
    /// returning its record or a Tcl-formatted error message.
    pub fn find<'a>(
        ensemble: &'a [Subcommand<Ctx>],
        sub_name: &str,
    ) -> Result<&'a Subcommand<Ctx>, Exception> {
        for subcmd in ensemble {
            if subcmd.0 == sub_name {
                return Ok(subcmd);
            }
        }

        let mut names = String::new();
        names.push_str(ensemble[0].0);
        let last = ensemble.len() - 1;

        if ensemble.len() > 1 {
            names.push_str(", ");
        }

        if ensemble.len() > 2 {
            let vec: Vec<&str> = ensemble[1..last].iter().map(|x| x.0).collect();
            names.push_str(&vec.join(", "));
        }

        if ensemble.len() > 2 {
            names.push_str(", or ");
        } else if ensemble.len() == 2 {
            names.push_str("or ");
        }

        if ensemble.len() > 1 {
            names.push_str(ensemble[last].0);
        }

        crate::ember_err!(
            "unknown or ambiguous subcommand \"{}\": must be {}",
            sub_name,
            &names
        )
    }
}

/// A parsed variable name: either a scalar name, or an array name and an index.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VarName {
    name: String,
    index: Option<String>,
}

impl VarName {
    /// Creates a scalar variable name.
    pub fn scalar(name: String) -> Self {
        Self { name, index: None }
    }

    /// Creates an array element name.
    pub fn array(name: String, index: String) -> Self {
        Self {
            name,
            index: Some(index),
        }
    }

    /// Returns the variable (or array) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the array index, if any.
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Splits a reference like `a(b)` into array name and index; anything else is a
    /// scalar name.
    pub fn parse(text: &str) -> Self {
        if let Some(stripped) = text.strip_suffix(')') {
            if let Some(open) = stripped.find('(') {
                return VarName::array(stripped[..open].into(), stripped[open + 1..].into());
            }
        }

        VarName::scalar(text.into())
    }
}

impl FromStr for VarName {
    type Err = std::convert::Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(VarName::parse(text))
    }
}

bitflags::bitflags! {
    /// Flags that qualify a variable access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VarFlags: u32 {
        /// Resolve unqualified names in the global frame.
        const GLOBAL_ONLY = 1 << 0;
        /// Skip trace guards.
        const NO_TRACE = 1 << 1;
        /// Don't report missing variables on unset.
        const NO_COMPLAIN = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Which substitutions `Interp::substitute` performs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubstFlags: u32 {
        const BACKSLASHES = 1 << 0;
        const COMMANDS = 1 << 1;
        const VARIABLES = 1 << 2;
        const ALL = Self::BACKSLASHES.bits() | Self::COMMANDS.bits() | Self::VARIABLES.bits();
    }
}

impl Default for VarFlags {
    fn default() -> Self {
        VarFlags::empty()
    }
}

impl Default for SubstFlags {
    fn default() -> Self {
        SubstFlags::ALL
    }
}

bitflags::bitflags! {
    /// Static metadata attached to each registered command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u32 {
        /// Part of the standard command set.
        const STANDARD = 1 << 0;
        /// Provided by the core crate.
        const CORE = 1 << 1;
        /// Safe to expose to untrusted scripts.
        const SAFE = 1 << 2;
        /// Touches the host: files, the console, or the process.
        const UNSAFE = 1 << 3;
        /// Defined by a script with `proc`.
        const PROCEDURE = 1 << 4;
    }
}

/// Merges per-command flags into a base set.  `UNSAFE` always wins over `SAFE`.
///
/// ```
/// use ember::*;
///
/// let flags = merge_command_flags(CommandFlags::SAFE, CommandFlags::UNSAFE);
/// assert!(flags.contains(CommandFlags::UNSAFE));
/// assert!(!flags.contains(CommandFlags::SAFE));
/// ```
pub fn merge_command_flags(base: CommandFlags, extra: CommandFlags) -> CommandFlags {
    let mut flags = base | extra;

    if flags.contains(CommandFlags::UNSAFE) {
        flags.remove(CommandFlags::SAFE);
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_from_value() {
        assert_eq!(ResultCode::from_value(&"ok".into()), Ok(ResultCode::Okay));
        assert_eq!(ResultCode::from_value(&"error".into()), Ok(ResultCode::Error));
        assert_eq!(
            ResultCode::from_value(&"return".into()),
            Ok(ResultCode::Return)
        );
        assert_eq!(ResultCode::from_value(&"break".into()), Ok(ResultCode::Break));
        assert_eq!(
            ResultCode::from_value(&"continue".into()),
            Ok(ResultCode::Continue)
        );
        assert_eq!(ResultCode::from_value(&"3".into()), Ok(ResultCode::Break));
        assert_eq!(ResultCode::from_value(&"42".into()), Ok(ResultCode::Other(42)));
        assert!(ResultCode::from_value(&"nonesuch".into()).is_err());
    }

    #[test]
    fn test_result_code_as_int() {
        assert_eq!(ResultCode::Okay.as_int(), 0);
        assert_eq!(ResultCode::Error.as_int(), 1);
        assert_eq!(ResultCode::Return.as_int(), 2);
        assert_eq!(ResultCode::Break.as_int(), 3);
        assert_eq!(ResultCode::Continue.as_int(), 4);
        assert_eq!(ResultCode::Other(5).as_int(), 5);
    }

    #[test]
    fn test_exception_return_levels() {
        let mut exception = Exception::ember_return_ext("x".into(), 2, ResultCode::Break);
        assert_eq!(exception.code(), ResultCode::Return);

        exception.decrement_level();
        assert_eq!(exception.code(), ResultCode::Return);
        assert_eq!(exception.level(), 1);

        exception.decrement_level();
        assert_eq!(exception.code(), ResultCode::Break);
        assert_eq!(exception.value(), "x".into());

        let exception = Exception::ember_return_ext("y".into(), 0, ResultCode::Other(9));
        assert_eq!(exception.code(), ResultCode::Other(9));
    }

    #[test]
    fn test_error_info_accumulates() {
        let mut exception = Exception::ember_err("boom".into());
        assert!(exception.is_new_error());

        exception.add_error_info("    while executing");
        exception.add_error_info("\"error boom\"");

        assert!(!exception.is_new_error());
        assert_eq!(
            exception.error_info().as_str(),
            "boom\n    while executing\n\"error boom\""
        );
    }

    #[test]
    fn test_var_name_parse() {
        assert_eq!(VarName::parse("a"), VarName::scalar("a".into()));
        assert_eq!(
            VarName::parse("a(b)"),
            VarName::array("a".into(), "b".into())
        );
        assert_eq!(
            VarName::parse("a(b(c))"),
            VarName::array("a".into(), "b(c)".into())
        );
        assert_eq!(VarName::parse("a(b"), VarName::scalar("a(b".into()));
    }

    #[test]
    fn test_subcommand_find() {
        fn dummy(_: &mut Interp, _: &[Value], _: &mut ()) -> EmberOptResult {
            Ok(None)
        }

        let table: [Subcommand<()>; 3] = [
            Subcommand("exists", dummy),
            Subcommand("get", dummy),
            Subcommand("set", dummy),
        ];

        assert!(Subcommand::find(&table, "get").is_ok());
        let err = Subcommand::find(&table, "nonesuch").err().unwrap();
        assert_eq!(
            err.value().as_str(),
            "unknown or ambiguous subcommand \"nonesuch\": must be exists, get, or set"
        );
    }
}
