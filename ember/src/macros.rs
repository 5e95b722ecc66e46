//! Convenience Macros
//!
//! This module contains macros for use by command authors.

/// Returns an `Ok` `EmberResult`.
///
/// If called with no arguments, returns an empty value as the `Ok` result.
/// If called with one argument, returns the argument as the `Ok` result, converting it
/// to a value automatically.
/// If called with two or more arguments, computes the `Ok` result using
/// `format!()`; the first argument is naturally the format string.
///
/// # Examples
///
/// ```
/// use ember::*;
///
/// // Return the empty result
/// fn func1() -> EmberResult {
///     // ...
///     ember_ok!()
/// }
///
/// assert_eq!(func1(), Ok(Value::empty()));
///
/// // Return an arbitrary value
/// fn func2() -> EmberResult {
///     // ...
///     ember_ok!(17)
/// }
///
/// assert_eq!(func2(), Ok(17.into()));
///
/// // Return a formatted value
/// fn func3() -> EmberResult {
///     // ...
///     ember_ok!("The answer is {}.", 17)
/// }
///
/// assert_eq!(func3(), Ok("The answer is 17.".into()));
/// ```
#[macro_export]
macro_rules! ember_ok {
    () => (
        Ok($crate::Value::empty())
    );
    ($arg:expr) => (
        Ok($crate::Value::from($arg))
    );
    ($($arg:tt)*) => (
        Ok($crate::Value::from(format!($($arg)*)))
    )
}

/// Returns an `Ok` `EmberOptResult`, the return type of command functions.
///
/// With no arguments the command returns `None`, which the interpreter turns into
/// the empty value.  Otherwise it behaves like [`ember_ok!`].
#[macro_export]
macro_rules! ember_opt_ok {
    () => (
        Ok(None)
    );
    ($arg:expr) => (
        Ok(Some($crate::Value::from($arg)))
    );
    ($($arg:tt)*) => (
        Ok(Some($crate::Value::from(format!($($arg)*))))
    )
}

/// Returns an `Error` exception containing an error message.
///
/// If called with one argument, the single argument is used as the error message.
/// If called with more than one argument, the first is a `format!()` format string,
/// and the remainder are the values to format.
///
/// This macro wraps the [`Exception::ember_err`](types/struct.Exception.html#method.ember_err)
/// method.
///
/// # Examples
///
/// ```
/// use ember::*;
///
/// // Return a simple error message
/// fn err1() -> EmberResult {
///     // ...
///     ember_err!("error message")
/// }
///
/// let result = err1();
/// assert!(result.is_err());
///
/// let exception = result.err().unwrap();
/// assert!(exception.is_error());
/// assert_eq!(exception.value(), "error message".into());
///
/// // Return a formatted error
/// fn err2() -> EmberResult {
///    // ...
///    ember_err!("invalid value: {}", 17)
/// }
///
/// let result = err2();
/// assert!(result.is_err());
///
/// let exception = result.err().unwrap();
/// assert!(exception.is_error());
/// assert_eq!(exception.value(), "invalid value: 17".into());
/// ```
#[macro_export]
macro_rules! ember_err {
    ($arg:expr) => (
        Err($crate::Exception::ember_err($crate::Value::from($arg)))
    );
    ($($arg:tt)*) => (
        Err($crate::Exception::ember_err($crate::Value::from(format!($($arg)*))))
    )
}

/// Returns an `Error` exception with the given error code and message.  An
/// error code is a Tcl list whose first element names the error domain; callers
/// inspect it via `catch`'s options or the `errorCode` variable.
///
/// If called with two arguments, the first is the error code and the second is the
/// error message.  With more, the second is a `format!()` format string.
///
/// This macro wraps the [`Exception::throw`](types/struct.Exception.html#method.throw)
/// method.
///
/// # Examples
///
/// ```
/// use ember::*;
///
/// fn throw1() -> EmberResult {
///     ember_throw!("MYCODE", "error message")
/// }
///
/// let exception = throw1().err().unwrap();
/// assert!(exception.is_error());
/// assert_eq!(exception.value(), "error message".into());
/// assert_eq!(exception.error_code(), "MYCODE".into());
/// ```
#[macro_export]
macro_rules! ember_throw {
    ($code:expr, $msg:expr) => (
        Err($crate::Exception::throw($crate::Value::from($code), $crate::Value::from($msg)))
    );
    ($code:expr, $($arg:tt)*) => (
        Err($crate::Exception::throw($crate::Value::from($code), $crate::Value::from(format!($($arg)*))))
    )
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_ember_ok() {
        let result: EmberResult = ember_ok!();
        assert_eq!(Ok(Value::empty()), result);

        let result: EmberResult = ember_ok!(5);
        assert_eq!(Ok(Value::from(5)), result);

        let result: EmberResult = ember_ok!("Five");
        assert_eq!(Ok(Value::from("Five")), result);

        let result: EmberResult = ember_ok!("The answer is {}", 5);
        assert_eq!(Ok(Value::from("The answer is 5")), result);
    }

    #[test]
    fn test_ember_opt_ok() {
        let result: EmberOptResult = ember_opt_ok!();
        assert_eq!(Ok(None), result);

        let result: EmberOptResult = ember_opt_ok!("x={}", 1);
        assert_eq!(Ok(Some(Value::from("x=1"))), result);
    }

    #[test]
    fn test_ember_err() {
        assert!(check_err(ember_err!("error message"), "error message"));
        assert!(check_err(ember_err!("error {}", 5), "error 5"));
    }

    #[test]
    fn test_ember_throw() {
        assert!(check_throw(
            ember_throw!("MYERR", "error message"),
            "MYERR",
            "error message",
        ));
        assert!(check_throw(
            ember_throw!("MYERR", "error {}", 5),
            "MYERR",
            "error 5"
        ));
    }

    fn check_err(result: EmberResult, msg: &str) -> bool {
        match result {
            Err(exception) => exception.is_error() && exception.value() == msg.into(),
            _ => false,
        }
    }

    fn check_throw(result: EmberResult, code: &str, msg: &str) -> bool {
        match result {
            Err(exception) => {
                exception.is_error()
                    && exception.value() == msg.into()
                    && exception.error_code() == code.into()
            }
            _ => false,
        }
    }
}
