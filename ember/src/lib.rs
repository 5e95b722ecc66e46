//! # Ember Tcl Interpreter Core
//!
//! Ember is an embeddable interpreter for a Tcl-style command language.  This crate
//! contains the runtime that every command depends on:
//!
//! * [`Value`], the string-canonical value type with cached list and number forms.
//! * The call-frame stack and variable store ([`CallStack`]), including `upvar`-style
//!   links, named scopes, namespaces and trace guards.
//! * Pluggable variable [`Resolver`]s.
//! * The evaluator ([`Interp`]), which runs scripts and expressions and propagates
//!   the control-flow signals (`ok`, `error`, `return`, `break`, `continue`, and custom
//!   codes) carried by [`Exception`].
//!
//! A small standard command set is registered by [`Interp::new`]; applications add
//! their own commands with [`Interp::add_command`].
//!
//! ```
//! use ember::Interp;
//!
//! let mut ctx = ();
//! let mut interp = Interp::new();
//! let val = interp.eval("set a 1; incr a 5", &mut ctx).unwrap();
//! assert_eq!(val.as_str(), "6");
//! ```

pub use crate::error::Access;
pub use crate::error::EmberError;
pub use crate::frame::CallStack;
pub use crate::frame::Frame;
pub use crate::frame::FrameFlags;
pub use crate::frame::FrameId;
pub use crate::frame::LevelSpec;
pub use crate::frame::LinkMode;
pub use crate::frame::ReadOnly;
pub use crate::frame::UnsetLinkPolicy;
pub use crate::frame::VarTrace;
pub use crate::halt::HaltHandle;
pub use crate::interp::Interp;
pub use crate::resolver::NamespaceResolver;
pub use crate::resolver::Resolution;
pub use crate::resolver::Resolver;
pub use crate::types::*;
pub use crate::value::TextBuilder;
pub use crate::value::Value;

mod commands;
pub mod error;
#[cfg(feature = "expr")]
mod expr;
pub mod frame;
mod halt;
pub mod interp;
pub mod list;
mod macros;
pub mod parser;
pub mod resolver;
pub mod types;
pub mod value;

/// This function is used in command functions to check whether the command's argument
/// list is of a proper size for the given command.  If it is, `check_args` returns
/// the empty result; if not, it returns a Tcl-style error, "wrong # args: should be ...".
///
/// The `namec` argument is the number of `argv` elements that name the command, usually
/// 1 (or 2 for ensemble subcommands).  `min` and `max` are the minimum and maximum
/// lengths of `argv`; a `max` of 0 means "no maximum".  `argsig` is the argument
/// signature that follows the command name in the error message.
///
/// ```
/// use ember::check_args;
/// use ember::Value;
///
/// let argv = vec![Value::from("incr")];
/// let result = check_args(1, &argv, 2, 3, "varName ?increment?");
/// assert_eq!(
///     result.unwrap_err().value().as_str(),
///     "wrong # args: should be \"incr varName ?increment?\""
/// );
/// ```
pub fn check_args(
    namec: usize,
    argv: &[Value],
    min: usize,
    max: usize,
    argsig: &str,
) -> Result<(), Exception> {
    assert!(namec >= 1);
    assert!(min >= 1);
    assert!(!argv.is_empty());

    if argv.len() < min || (max > 0 && argv.len() > max) {
        let cmd_tokens = Value::from(&argv[0..namec]);
        let sig = if argsig.is_empty() {
            cmd_tokens.to_string()
        } else {
            format!("{} {}", cmd_tokens, argsig)
        };
        crate::ember_err!("wrong # args: should be \"{}\"", sig)
    } else {
        Ok(())
    }
}
