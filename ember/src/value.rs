//! The Value Type
//!
//! The [`Value`] struct is the standard representation of a data value in the Ember
//! language.  It represents a single immutable data value; the data is reference-counted,
//! so instances can be cloned efficiently.
//!
//! # Canonical string and data representations
//!
//! Every value has a canonical string representation, which is what equality and
//! hashing use.  A value may also cache a *data representation*: a parsed list, an
//! integer, a float, a parsed script, or a parsed variable name.  The data
//! representation is computed on demand and cached, so that a list built with
//! [`Value::from`] is never reparsed, and a list parsed from a string is parsed
//! only once.
//!
//! Values created from data representations compute their string representation
//! lazily, the first time it's needed.
//!
//! # The builder view
//!
//! [`Value::builder`] hands out a [`TextBuilder`] for editing the text in place.  When
//! the builder is dropped, the handle it came from is replaced by a brand new value:
//! any cached data representation is gone, and other clones of the old value keep
//! the old text.
//!
//! ```
//! use ember::Value;
//!
//! let mut val = Value::from("a b");
//! assert_eq!(val.as_list().unwrap().len(), 2);
//!
//! val.builder().push_str(" c");
//! assert_eq!(val.as_list().unwrap().len(), 3);
//! ```

use crate::error::EmberError;
use crate::list::list_to_string;
use crate::list::parse_list;
use crate::parser;
use crate::parser::Script;
use crate::types::*;
use std::cell::OnceCell;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::ops::Deref;
use std::ops::DerefMut;
use std::rc::Rc;

/// The `Value` type. See [the module level documentation](index.html) for more.
#[derive(Clone, Default)]
pub struct Value {
    inner: Rc<InnerValue>,
}

#[derive(Default)]
struct InnerValue {
    string_rep: OnceCell<String>,
    data_rep: RefCell<DataRep>,
}

/// The cached internal form of a value.
#[derive(Clone, Default)]
enum DataRep {
    #[default]
    None,
    Int(EmberInt),
    Flt(EmberFloat),
    List(Rc<EmberList>),
    Script(Rc<Script>),
    VarName(Rc<VarName>),
}

impl Value {
    /// Returns the empty value.
    ///
    /// ```
    /// use ember::Value;
    /// assert_eq!(Value::empty().as_str(), "");
    /// ```
    pub fn empty() -> Value {
        Value::from_string(String::new())
    }

    fn from_string(text: String) -> Value {
        let inner = InnerValue {
            string_rep: OnceCell::from(text),
            data_rep: RefCell::new(DataRep::None),
        };

        Value {
            inner: Rc::new(inner),
        }
    }

    fn from_data(data_rep: DataRep) -> Value {
        let inner = InnerValue {
            string_rep: OnceCell::new(),
            data_rep: RefCell::new(data_rep),
        };

        Value {
            inner: Rc::new(inner),
        }
    }

    /// Returns the value's canonical string representation, computing it from the data
    /// representation if necessary.
    ///
    /// ```
    /// use ember::Value;
    /// let list = Value::from(vec![Value::from("a b"), Value::from("c")]);
    /// assert_eq!(list.as_str(), "{a b} c");
    /// ```
    pub fn as_str(&self) -> &str {
        self.inner.string_rep.get_or_init(|| {
            let data_rep = self.inner.data_rep.borrow();
            match &*data_rep {
                DataRep::None => String::new(),
                DataRep::Int(int) => int.to_string(),
                DataRep::Flt(flt) => Value::fmt_float(*flt),
                DataRep::List(list) => list_to_string(list),
                // Scripts and variable names are only ever parsed from strings.
                DataRep::Script(_) | DataRep::VarName(_) => String::new(),
            }
        })
    }

    /// Returns true if the canonical string is empty.
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Tries to return the value as a list, parsing the canonical string and caching
    /// the result if necessary.  A value built from a list returns the list as-is.
    ///
    /// ```
    /// use ember::*;
    /// # fn dummy() -> Result<(), Exception> {
    /// let value = Value::from("1 {2 3} 4");
    /// let list = value.as_list()?;
    /// assert_eq!(list.len(), 3);
    /// assert_eq!(list[1].as_str(), "2 3");
    /// # Ok(())
    /// # }
    /// ```
    pub fn as_list(&self) -> Result<Rc<EmberList>, Exception> {
        if let DataRep::List(list) = &*self.inner.data_rep.borrow() {
            return Ok(Rc::clone(list));
        }

        let list = Rc::new(parse_list(self.as_str())?);
        self.set_data_rep(DataRep::List(Rc::clone(&list)));
        Ok(list)
    }

    /// Returns the value as a list, or an empty list if it cannot be parsed.
    pub fn to_list(&self) -> EmberList {
        self.as_list()
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Tries to return the value as an integer.  Accepts an optional sign, leading and
    /// trailing whitespace, and the `0x`, `0o`, and `0b` radix prefixes.
    ///
    /// ```
    /// use ember::*;
    /// assert_eq!(Value::from(" 0x1F ").as_int(), Ok(31));
    /// assert!(Value::from("abc").as_int().is_err());
    /// ```
    pub fn as_int(&self) -> Result<EmberInt, Exception> {
        if let DataRep::Int(int) = *self.inner.data_rep.borrow() {
            return Ok(int);
        }

        let int = Value::get_int(self.as_str())?;
        self.set_data_rep(DataRep::Int(int));
        Ok(int)
    }

    /// Tries to return the value as a float.  Integers are accepted.
    ///
    /// ```
    /// use ember::*;
    /// assert_eq!(Value::from("1.5").as_float(), Ok(1.5));
    /// assert_eq!(Value::from(2).as_float(), Ok(2.0));
    /// ```
    pub fn as_float(&self) -> Result<EmberFloat, Exception> {
        match *self.inner.data_rep.borrow() {
            DataRep::Flt(flt) => return Ok(flt),
            DataRep::Int(int) => return Ok(int as EmberFloat),
            _ => (),
        }

        let flt = Value::get_float(self.as_str())?;
        self.set_data_rep(DataRep::Flt(flt));
        Ok(flt)
    }

    /// Tries to return the value as a boolean.  Numbers are true if non-zero; the
    /// strings `true`, `yes`, `on` and `false`, `no`, `off` are accepted in any case.
    ///
    /// ```
    /// use ember::*;
    /// assert_eq!(Value::from("yes").as_bool(), Ok(true));
    /// assert_eq!(Value::from("0").as_bool(), Ok(false));
    /// assert!(Value::from("maybe").as_bool().is_err());
    /// ```
    pub fn as_bool(&self) -> Result<bool, Exception> {
        match *self.inner.data_rep.borrow() {
            DataRep::Int(int) => return Ok(int != 0),
            DataRep::Flt(flt) => return Ok(flt != 0.0),
            _ => (),
        }

        Value::get_bool(self.as_str())
    }

    /// Returns the value parsed as a script, caching the parse.
    pub fn as_script(&self) -> Result<Rc<Script>, Exception> {
        if let DataRep::Script(script) = &*self.inner.data_rep.borrow() {
            return Ok(Rc::clone(script));
        }

        let script = Rc::new(parser::parse(self.as_str())?);
        self.set_data_rep(DataRep::Script(Rc::clone(&script)));
        Ok(script)
    }

    /// Returns the value parsed as a variable name, caching the parse.
    pub fn as_var_name(&self) -> Rc<VarName> {
        if let DataRep::VarName(var_name) = &*self.inner.data_rep.borrow() {
            return Rc::clone(var_name);
        }

        let var_name = Rc::new(VarName::parse(self.as_str()));
        self.set_data_rep(DataRep::VarName(Rc::clone(&var_name)));
        var_name
    }

    /// Returns a builder view of the value's text.  See the
    /// [module level documentation](index.html).
    pub fn builder(&mut self) -> TextBuilder<'_> {
        let buffer = self.as_str().to_string();
        TextBuilder {
            target: self,
            buffer,
        }
    }

    /// Replaces the cached data representation.  The string representation must exist
    /// first, since it is the source of truth.
    fn set_data_rep(&self, data_rep: DataRep) {
        let _ = self.as_str();
        *self.inner.data_rep.borrow_mut() = data_rep;
    }

    /// Parses a Tcl integer.
    pub fn get_int(text: &str) -> Result<EmberInt, Exception> {
        let trimmed = text.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (radix, body) = if let Some(hex) = strip_radix(digits, "0x") {
            (16, hex)
        } else if let Some(oct) = strip_radix(digits, "0o") {
            (8, oct)
        } else if let Some(bin) = strip_radix(digits, "0b") {
            (2, bin)
        } else {
            (10, digits)
        };

        // The sign may only precede the radix prefix.
        if !body.starts_with(|c: char| c.is_digit(radix)) {
            return Err(conversion_error("integer", text));
        }

        let int = u64::from_str_radix(body, radix).ok().and_then(|magnitude| {
            if negative {
                (0 as EmberInt).checked_sub_unsigned(magnitude)
            } else {
                EmberInt::try_from(magnitude).ok()
            }
        });

        int.ok_or_else(|| conversion_error("integer", text))
    }

    /// Parses a Tcl floating-point number.
    pub fn get_float(text: &str) -> Result<EmberFloat, Exception> {
        let trimmed = text.trim();

        if let Ok(int) = Value::get_int(trimmed) {
            return Ok(int as EmberFloat);
        }

        match trimmed {
            "inf" | "Inf" | "+inf" => return Ok(EmberFloat::INFINITY),
            "-inf" | "-Inf" => return Ok(EmberFloat::NEG_INFINITY),
            "NaN" | "nan" => return Ok(EmberFloat::NAN),
            _ => (),
        }

        let looks_numeric = trimmed
            .trim_start_matches(['+', '-'])
            .starts_with(|c: char| c.is_ascii_digit() || c == '.');

        match trimmed.parse::<EmberFloat>() {
            Ok(flt) if looks_numeric => Ok(flt),
            _ => Err(conversion_error("floating-point number", text)),
        }
    }

    /// Parses a Tcl boolean.
    pub fn get_bool(text: &str) -> Result<bool, Exception> {
        let trimmed = text.trim();

        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => return Ok(true),
            "false" | "no" | "off" => return Ok(false),
            _ => (),
        }

        if let Ok(int) = Value::get_int(trimmed) {
            return Ok(int != 0);
        }

        match Value::get_float(trimmed) {
            Ok(flt) => Ok(flt != 0.0),
            Err(_) => Err(conversion_error("boolean value", text)),
        }
    }

    /// Formats a float the way Tcl does: integral values keep a trailing `.0`.
    pub fn fmt_float(flt: EmberFloat) -> String {
        if flt.is_nan() {
            "NaN".into()
        } else if flt.is_infinite() {
            if flt > 0.0 {
                "Inf".into()
            } else {
                "-Inf".into()
            }
        } else if flt.fract() == 0.0 && flt.abs() < 1e16 {
            format!("{:.1}", flt)
        } else {
            format!("{}", flt)
        }
    }
}

fn strip_radix<'a>(digits: &'a str, prefix: &str) -> Option<&'a str> {
    if digits.len() > prefix.len() && digits[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&digits[prefix.len()..])
    } else {
        None
    }
}

fn conversion_error(expected: &'static str, got: &str) -> Exception {
    EmberError::TypeConversion {
        expected,
        got: got.into(),
    }
    .into()
}

/// A read-write view of a value's text.  See [`Value::builder`].
pub struct TextBuilder<'a> {
    target: &'a mut Value,
    buffer: String,
}

impl TextBuilder<'_> {
    /// Finishes the write.  Equivalent to dropping the builder.
    pub fn done(self) {}
}

impl Deref for TextBuilder<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buffer
    }
}

impl DerefMut for TextBuilder<'_> {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buffer
    }
}

impl Drop for TextBuilder<'_> {
    fn drop(&mut self) {
        *self.target = Value::from_string(std::mem::take(&mut self.buffer));
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Value[{}]", self.as_str())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) || self.as_str() == other.as_str()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::from_string(text)
    }
}

impl From<&String> for Value {
    fn from(text: &String) -> Self {
        Value::from_string(text.clone())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::from_string(text.to_string())
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::from_data(DataRep::Int(if flag { 1 } else { 0 }))
    }
}

impl From<EmberInt> for Value {
    fn from(int: EmberInt) -> Self {
        Value::from_data(DataRep::Int(int))
    }
}

impl From<i32> for Value {
    fn from(int: i32) -> Self {
        Value::from_data(DataRep::Int(int as EmberInt))
    }
}

impl From<usize> for Value {
    fn from(int: usize) -> Self {
        Value::from_data(DataRep::Int(int as EmberInt))
    }
}

impl From<EmberFloat> for Value {
    fn from(flt: EmberFloat) -> Self {
        Value::from_data(DataRep::Flt(flt))
    }
}

impl From<EmberList> for Value {
    fn from(list: EmberList) -> Self {
        Value::from_data(DataRep::List(Rc::new(list)))
    }
}

impl From<&[Value]> for Value {
    fn from(list: &[Value]) -> Self {
        Value::from_data(DataRep::List(Rc::new(list.to_vec())))
    }
}

impl From<&[String]> for Value {
    fn from(list: &[String]) -> Self {
        let list: EmberList = list.iter().map(Value::from).collect();
        Value::from(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        for text in ["", "abc", "a b c", "{x", "  spaced  "] {
            assert_eq!(Value::from(text).as_str(), text);
        }
    }

    #[test]
    fn test_list_built_value_skips_parse() {
        let list = vec![Value::from("a b"), Value::from("c")];
        let value = Value::from(list.clone());

        let cached = value.as_list().expect("list");
        assert_eq!(*cached, list);

        // The second call hands back the same cached list.
        let again = value.as_list().expect("list");
        assert!(Rc::ptr_eq(&cached, &again));
        assert_eq!(value.as_str(), "{a b} c");
    }

    #[test]
    fn test_list_parse_is_cached() {
        let value = Value::from("x y z");
        let first = value.as_list().expect("list");
        let second = value.as_list().expect("list");
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_builder_invalidates_list() {
        let mut value = Value::from("a b");
        let other = value.clone();
        assert_eq!(value.as_list().expect("list").len(), 2);

        {
            let mut builder = value.builder();
            builder.push_str(" c d");
        }

        assert_eq!(value.as_str(), "a b c d");
        assert_eq!(value.as_list().expect("list").len(), 4);

        // Clones of the old value are untouched.
        assert_eq!(other.as_str(), "a b");
        assert_eq!(other.as_list().expect("list").len(), 2);
    }

    #[test]
    fn test_builder_done() {
        let mut value = Value::from(vec![Value::from("x")]);
        let mut builder = value.builder();
        builder.insert(0, '{');
        builder.done();

        assert_eq!(value.as_str(), "{x");
        assert!(value.as_list().is_err());
    }

    #[test]
    fn test_as_int() {
        assert_eq!(Value::from("123").as_int(), Ok(123));
        assert_eq!(Value::from("-5").as_int(), Ok(-5));
        assert_eq!(Value::from("+5").as_int(), Ok(5));
        assert_eq!(Value::from(" 7 ").as_int(), Ok(7));
        assert_eq!(Value::from("0x10").as_int(), Ok(16));
        assert_eq!(Value::from("0o17").as_int(), Ok(15));
        assert_eq!(Value::from("0b101").as_int(), Ok(5));
        assert_eq!(Value::from(42).as_int(), Ok(42));

        let err = Value::from("1.5").as_int().unwrap_err();
        assert_eq!(err.value().as_str(), "expected integer but got \"1.5\"");
        assert!(Value::from("").as_int().is_err());
        assert!(Value::from("-").as_int().is_err());
    }

    #[test]
    fn test_int_limits_and_signs() {
        assert_eq!(Value::get_int("-9223372036854775808"), Ok(EmberInt::MIN));
        assert_eq!(Value::get_int("9223372036854775807"), Ok(EmberInt::MAX));
        assert_eq!(Value::get_int("-0x10"), Ok(-16));
        assert!(Value::get_int("9223372036854775808").is_err());
        assert!(Value::get_int("-9223372036854775809").is_err());
        assert!(Value::get_int("0x-5").is_err());
        assert!(Value::get_int("0x+5").is_err());
        assert!(Value::get_int("--5").is_err());
    }

    #[test]
    fn test_as_float() {
        assert_eq!(Value::from("1.5").as_float(), Ok(1.5));
        assert_eq!(Value::from("1e3").as_float(), Ok(1000.0));
        assert_eq!(Value::from(".5").as_float(), Ok(0.5));
        assert_eq!(Value::from("7").as_float(), Ok(7.0));
        assert!(Value::from("abc").as_float().is_err());
        assert!(Value::from("infinity").as_float().is_err());
    }

    #[test]
    fn test_as_bool() {
        assert_eq!(Value::from("true").as_bool(), Ok(true));
        assert_eq!(Value::from("Off").as_bool(), Ok(false));
        assert_eq!(Value::from("2").as_bool(), Ok(true));
        assert_eq!(Value::from("0.0").as_bool(), Ok(false));
        assert_eq!(Value::from(true).as_str(), "1");
        assert!(Value::from("nope").as_bool().is_err());
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(Value::from(4.0).as_str(), "4.0");
        assert_eq!(Value::from(1.5).as_str(), "1.5");
        assert_eq!(Value::from(-0.25).as_str(), "-0.25");
        assert_eq!(Value::from(EmberFloat::INFINITY).as_str(), "Inf");
    }

    #[test]
    fn test_equality_uses_text() {
        assert_eq!(Value::from(5), Value::from("5"));
        assert_ne!(Value::from("5"), Value::from("05"));
        assert_eq!(
            Value::from(vec![Value::from("a"), Value::from("b")]),
            Value::from("a b")
        );
    }

    #[test]
    fn test_var_name_cache() {
        let value = Value::from("arr(idx)");
        let var_name = value.as_var_name();
        assert_eq!(var_name.name(), "arr");
        assert_eq!(var_name.index(), Some("idx"));
    }
}
