//! Typed runtime errors.
//!
//! The frame stack, variable store and resolvers report failures as [`EmberError`]
//! values.  Each variant knows its Tcl-style `errorCode` list, and converts into an
//! error [`Exception`] so that command code can use `?` freely; the message becomes
//! the exception's result value.

use crate::types::Exception;
use crate::value::Value;
use std::fmt;

/// The kind of variable access that failed, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Set,
    Unset,
    Link,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let verb = match self {
            Access::Read => "read",
            Access::Set => "set",
            Access::Unset => "unset",
            Access::Link => "upvar",
        };
        write!(f, "{}", verb)
    }
}

/// The error taxonomy of the interpreter core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmberError {
    #[error("can't {access} \"{name}\": no such variable")]
    Undefined { access: Access, name: String },

    #[error("can't {access} \"{name}\": too many link redirections")]
    TooManyRedirects { access: Access, name: String },

    #[error("bad level \"{0}\"")]
    InvalidLevel(String),

    #[error("expected {expected} but got \"{got}\"")]
    TypeConversion { expected: &'static str, got: String },

    #[error("iteration limit {0} exceeded")]
    IterationLimitExceeded(usize),

    #[error("can't resolve \"{name}\": {reason}")]
    NameResolutionFailed { name: String, reason: String },

    #[error("variable \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("can't upvar \"{0}\": link would create a cycle")]
    CycleDetected(String),

    #[error("bad variable name \"{0}\"")]
    InvalidName(String),

    #[error("can't {access} \"{name}\": variable is array")]
    IsArray { access: Access, name: String },

    #[error("can't {access} \"{name}\": variable isn't array")]
    NotArray { access: Access, name: String },

    #[error("can't {access} \"{name}\": {reason}")]
    TraceVetoed {
        access: Access,
        name: String,
        reason: String,
    },

    #[error("eval canceled")]
    Canceled,

    #[error("too many nested calls to Interp::eval (infinite loop?)")]
    RecursionLimit,
}

impl EmberError {
    /// Returns the `errorCode` list for the error.
    ///
    /// ```
    /// use ember::{Access, EmberError};
    ///
    /// let err = EmberError::Undefined { access: Access::Read, name: "x".into() };
    /// assert_eq!(err.error_code().as_str(), "EMBER LOOKUP VARNAME x");
    /// ```
    pub fn error_code(&self) -> Value {
        let words: Vec<Value> = match self {
            EmberError::Undefined { name, .. } => code(&["EMBER", "LOOKUP", "VARNAME"], name),
            EmberError::TooManyRedirects { name, .. } => {
                code(&["EMBER", "LOOKUP", "REDIRECT"], name)
            }
            EmberError::InvalidLevel(level) => code(&["EMBER", "VALUE", "LEVEL"], level),
            EmberError::TypeConversion { expected, got } => {
                code(&["EMBER", "VALUE", "CONVERT", *expected], got)
            }
            EmberError::IterationLimitExceeded(limit) => {
                code(&["EMBER", "LIMIT", "ITERATION"], &limit.to_string())
            }
            EmberError::NameResolutionFailed { name, .. } => {
                code(&["EMBER", "LOOKUP", "NAMESPACE"], name)
            }
            EmberError::AlreadyExists(name) => code(&["EMBER", "UPVAR", "EXISTS"], name),
            EmberError::CycleDetected(name) => code(&["EMBER", "UPVAR", "CYCLE"], name),
            EmberError::InvalidName(name) => code(&["EMBER", "VALUE", "VARNAME"], name),
            EmberError::IsArray { name, .. } => code(&["EMBER", "WRITE", "ARRAY"], name),
            EmberError::NotArray { name, .. } => code(&["EMBER", "LOOKUP", "ARRAY"], name),
            EmberError::TraceVetoed { name, .. } => code(&["EMBER", "TRACE", "VETO"], name),
            EmberError::Canceled => code(&["EMBER", "CANCEL"], "EVAL"),
            EmberError::RecursionLimit => code(&["EMBER", "LIMIT"], "STACK"),
        };

        Value::from(words)
    }
}

fn code(prefix: &[&str], last: &str) -> Vec<Value> {
    prefix
        .iter()
        .map(|word| Value::from(*word))
        .chain(std::iter::once(Value::from(last)))
        .collect()
}

impl From<EmberError> for Exception {
    fn from(err: EmberError) -> Self {
        Exception::throw(err.error_code(), Value::from(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EmberError::Undefined {
            access: Access::Unset,
            name: "x".into(),
        };
        assert_eq!(err.to_string(), "can't unset \"x\": no such variable");

        let err = EmberError::TypeConversion {
            expected: "integer",
            got: "abc".into(),
        };
        assert_eq!(err.to_string(), "expected integer but got \"abc\"");

        assert_eq!(
            EmberError::IterationLimitExceeded(10).to_string(),
            "iteration limit 10 exceeded"
        );
        assert_eq!(
            EmberError::InvalidLevel("#9".into()).to_string(),
            "bad level \"#9\""
        );
    }

    #[test]
    fn test_into_exception() {
        let exception: Exception = EmberError::TooManyRedirects {
            access: Access::Read,
            name: "a".into(),
        }
        .into();

        assert!(exception.is_error());
        assert_eq!(
            exception.value().as_str(),
            "can't read \"a\": too many link redirections"
        );
        assert_eq!(
            exception.error_code().as_str(),
            "EMBER LOOKUP REDIRECT a"
        );
    }

    #[test]
    fn test_error_code_quotes_words() {
        let err = EmberError::InvalidName("a b".into());
        assert_eq!(err.error_code().as_str(), "EMBER VALUE VARNAME {a b}");
    }
}
