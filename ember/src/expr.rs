//! The Expression Engine
//!
//! `expr` expressions are parsed into a small tree and then evaluated, so that `&&`,
//! `||` and `?:` evaluate only the operands they need.  Operands are numbers,
//! `$variables`, `[commands]`, `"quoted"` and `{braced}` strings, boolean words, and
//! function calls.  Integer arithmetic is checked; overflow is an error.

use crate::ember_err;
use crate::interp::Interp;
use crate::parser;
use crate::parser::Cursor;
use crate::parser::Word;
use crate::types::*;
use crate::value::Value;

/// Evaluates an expression.
pub(crate) fn expr<Ctx>(interp: &mut Interp<Ctx>, expr: &Value, ctx: &mut Ctx) -> EmberResult {
    let tree = parse(expr.as_str())?;
    Ok(eval(interp, &tree, ctx)?.into_value())
}

//------------------------------------------------------------------------------------------------
// Operands

/// An intermediate value: an integer, a float, or a string that is neither.
#[derive(Debug, Clone)]
enum Datum {
    Int(EmberInt),
    Flt(EmberFloat),
    Str(Value),
}

impl Datum {
    fn from_value(value: Value) -> Self {
        if let Ok(int) = value.as_int() {
            Datum::Int(int)
        } else if let Ok(flt) = value.as_float() {
            Datum::Flt(flt)
        } else {
            Datum::Str(value)
        }
    }

    fn into_value(self) -> Value {
        match self {
            Datum::Int(int) => Value::from(int),
            Datum::Flt(flt) => Value::from(flt),
            Datum::Str(value) => value,
        }
    }

    fn to_value(&self) -> Value {
        self.clone().into_value()
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Datum::Str(_))
    }

    fn as_bool(&self) -> Result<bool, Exception> {
        match self {
            Datum::Int(int) => Ok(*int != 0),
            Datum::Flt(flt) => Ok(*flt != 0.0),
            Datum::Str(value) => value.as_bool(),
        }
    }

    fn as_float(&self) -> EmberFloat {
        match self {
            Datum::Int(int) => *int as EmberFloat,
            Datum::Flt(flt) => *flt,
            Datum::Str(_) => EmberFloat::NAN,
        }
    }
}

//------------------------------------------------------------------------------------------------
// Syntax tree

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrEq,
    StrNe,
    In,
    Ni,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

// Longest symbols first, so that `**` isn't read as `*`.
const SYMBOLS: &[(&str, BinaryOp)] = &[
    ("**", BinaryOp::Pow),
    ("<<", BinaryOp::Shl),
    (">>", BinaryOp::Shr),
    ("<=", BinaryOp::Le),
    (">=", BinaryOp::Ge),
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::Ne),
    ("&&", BinaryOp::And),
    ("||", BinaryOp::Or),
    ("*", BinaryOp::Mul),
    ("/", BinaryOp::Div),
    ("%", BinaryOp::Mod),
    ("+", BinaryOp::Add),
    ("-", BinaryOp::Sub),
    ("<", BinaryOp::Lt),
    (">", BinaryOp::Gt),
    ("&", BinaryOp::BitAnd),
    ("^", BinaryOp::BitXor),
    ("|", BinaryOp::BitOr),
];

const WORD_OPS: &[(&str, BinaryOp)] = &[
    ("eq", BinaryOp::StrEq),
    ("ne", BinaryOp::StrNe),
    ("in", BinaryOp::In),
    ("ni", BinaryOp::Ni),
];

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Pow => 13,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 12,
            BinaryOp::Add | BinaryOp::Sub => 11,
            BinaryOp::Shl | BinaryOp::Shr => 10,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 9,
            BinaryOp::Eq | BinaryOp::Ne => 8,
            BinaryOp::StrEq | BinaryOp::StrNe => 7,
            BinaryOp::In | BinaryOp::Ni => 6,
            BinaryOp::BitAnd => 5,
            BinaryOp::BitXor => 4,
            BinaryOp::BitOr => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }

    fn is_right_assoc(self) -> bool {
        self == BinaryOp::Pow
    }

    fn symbol(self) -> &'static str {
        SYMBOLS
            .iter()
            .chain(WORD_OPS)
            .find(|(_, op)| *op == self)
            .map(|(sym, _)| *sym)
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Word(Word),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

//------------------------------------------------------------------------------------------------
// Parsing

fn parse(text: &str) -> Result<Expr, Exception> {
    let mut parser = ExprParser {
        cur: Cursor::new(text),
    };

    parser.skip_ws();
    if parser.cur.at_end() {
        return ember_err!("empty expression");
    }

    let tree = parser.ternary()?;

    parser.skip_ws();
    if !parser.cur.at_end() {
        return ember_err!("syntax error in expression \"{}\"", text);
    }

    Ok(tree)
}

struct ExprParser {
    cur: Cursor,
}

impl ExprParser {
    fn skip_ws(&mut self) {
        self.cur.skip_while(char::is_whitespace);
    }

    fn ternary(&mut self) -> Result<Expr, Exception> {
        let cond = self.binary(1)?;

        self.skip_ws();
        if self.cur.peek() != Some('?') {
            return Ok(cond);
        }
        self.cur.advance();

        let then = self.ternary()?;
        self.skip_ws();
        if self.cur.peek() != Some(':') {
            return ember_err!("missing \":\" in ternary conditional");
        }
        self.cur.advance();
        let otherwise = self.ternary()?;

        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, Exception> {
        let mut lhs = self.unary()?;

        loop {
            self.skip_ws();

            let (op, len) = match self.peek_binary_op() {
                Some(found) => found,
                None => break,
            };

            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.cur.skip(len);

            let next_min = if op.is_right_assoc() { prec } else { prec + 1 };
            let rhs = self.binary(next_min)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, usize)> {
        for (sym, op) in SYMBOLS {
            if self.cur.starts_with(sym) {
                return Some((*op, sym.len()));
            }
        }

        for (word, op) in WORD_OPS {
            let follows = self.cur.peek_at(word.len());
            if self.cur.starts_with(word) && !follows.map_or(false, is_name_char) {
                return Some((*op, word.len()));
            }
        }

        None
    }

    fn unary(&mut self) -> Result<Expr, Exception> {
        self.skip_ws();

        let op = match self.cur.peek() {
            Some('-') => UnaryOp::Neg,
            Some('+') => UnaryOp::Plus,
            Some('!') => UnaryOp::Not,
            Some('~') => UnaryOp::BitNot,
            _ => return self.primary(),
        };

        self.cur.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expr, Exception> {
        self.skip_ws();

        match self.cur.peek() {
            None => ember_err!("missing operand"),
            Some('(') => {
                self.cur.advance();
                let inner = self.ternary()?;
                self.skip_ws();
                if self.cur.peek() != Some(')') {
                    return ember_err!("unbalanced parentheses in expression");
                }
                self.cur.advance();
                Ok(inner)
            }
            Some('$') => Ok(Expr::Word(parser::parse_dollar(
                &mut self.cur,
                SubstFlags::ALL,
            )?)),
            Some('[') => Ok(Expr::Word(parser::parse_bracket(&mut self.cur)?)),
            Some('"') => Ok(Expr::Word(parser::parse_quoted(&mut self.cur)?)),
            Some('{') => Ok(Expr::Literal(Value::from(parser::parse_braced(
                &mut self.cur,
            )?))),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.number(),
            Some(ch) if ch.is_alphabetic() => self.name(),
            Some(ch) => ember_err!("invalid character \"{}\" in expression", ch),
        }
    }

    fn number(&mut self) -> Result<Expr, Exception> {
        let start = self.cur.pos();

        if self.cur.peek() == Some('0')
            && matches!(self.cur.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        {
            self.cur.skip(2);
            self.cur.skip_while(|ch| ch.is_ascii_alphanumeric());
        } else {
            self.cur.skip_while(|ch| ch.is_ascii_digit());
            if self.cur.peek() == Some('.') {
                self.cur.advance();
                self.cur.skip_while(|ch| ch.is_ascii_digit());
            }
            if matches!(self.cur.peek(), Some('e' | 'E')) {
                self.cur.advance();
                if matches!(self.cur.peek(), Some('+' | '-')) {
                    self.cur.advance();
                }
                self.cur.skip_while(|ch| ch.is_ascii_digit());
            }
        }

        let text = self.cur.text(start, self.cur.pos());

        match Value::get_int(&text) {
            Ok(int) => Ok(Expr::Literal(Value::from(int))),
            Err(_) => Ok(Expr::Literal(Value::from(Value::get_float(&text)?))),
        }
    }

    fn name(&mut self) -> Result<Expr, Exception> {
        let start = self.cur.pos();
        self.cur.skip_while(is_name_char);
        let name = self.cur.text(start, self.cur.pos());

        self.skip_ws();
        if self.cur.peek() == Some('(') {
            self.cur.advance();
            let args = self.call_args()?;
            return Ok(Expr::Call(name, args));
        }

        if Value::get_bool(&name).is_ok() {
            return Ok(Expr::Literal(Value::from(name)));
        }

        match name.as_str() {
            "Inf" | "inf" | "NaN" | "nan" => {
                Ok(Expr::Literal(Value::from(Value::get_float(&name)?)))
            }
            _ => ember_err!("invalid bareword \"{}\"", name),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, Exception> {
        let mut args = Vec::new();

        self.skip_ws();
        if self.cur.peek() == Some(')') {
            self.cur.advance();
            return Ok(args);
        }

        loop {
            args.push(self.ternary()?);
            self.skip_ws();

            match self.cur.peek() {
                Some(',') => self.cur.advance(),
                Some(')') => {
                    self.cur.advance();
                    return Ok(args);
                }
                _ => return ember_err!("missing close parenthesis in function call"),
            }
        }
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

//------------------------------------------------------------------------------------------------
// Evaluation

fn eval<Ctx>(interp: &mut Interp<Ctx>, expr: &Expr, ctx: &mut Ctx) -> Result<Datum, Exception> {
    match expr {
        Expr::Literal(value) => Ok(Datum::from_value(value.clone())),
        Expr::Word(word) => Ok(Datum::from_value(interp.eval_word(word, ctx)?)),
        Expr::Unary(op, operand) => {
            let operand = eval(interp, operand, ctx)?;
            unary(*op, operand)
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let result =
                eval(interp, lhs, ctx)?.as_bool()? && eval(interp, rhs, ctx)?.as_bool()?;
            Ok(Datum::Int(result as EmberInt))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let result =
                eval(interp, lhs, ctx)?.as_bool()? || eval(interp, rhs, ctx)?.as_bool()?;
            Ok(Datum::Int(result as EmberInt))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(interp, lhs, ctx)?;
            let rhs = eval(interp, rhs, ctx)?;
            binary(*op, lhs, rhs)
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval(interp, cond, ctx)?.as_bool()? {
                eval(interp, then, ctx)
            } else {
                eval(interp, otherwise, ctx)
            }
        }
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(interp, arg, ctx)?);
            }
            call(name, &values)
        }
    }
}

fn overflow<T>() -> Result<T, Exception> {
    ember_err!("integer value too large to represent")
}

fn non_numeric<T>(symbol: &str) -> Result<T, Exception> {
    ember_err!("can't use non-numeric string as operand of \"{}\"", symbol)
}

fn floating<T>(symbol: &str) -> Result<T, Exception> {
    ember_err!("can't use floating-point value as operand of \"{}\"", symbol)
}

fn unary(op: UnaryOp, operand: Datum) -> Result<Datum, Exception> {
    match (op, operand) {
        (UnaryOp::Not, datum) => match datum {
            Datum::Str(ref value) if value.as_bool().is_err() => non_numeric(op.symbol()),
            datum => Ok(Datum::Int(!datum.as_bool()? as EmberInt)),
        },
        (_, Datum::Str(_)) => non_numeric(op.symbol()),
        (UnaryOp::Neg, Datum::Int(int)) => {
            int.checked_neg().map(Datum::Int).map_or_else(overflow, Ok)
        }
        (UnaryOp::Neg, Datum::Flt(flt)) => Ok(Datum::Flt(-flt)),
        (UnaryOp::Plus, datum) => Ok(datum),
        (UnaryOp::BitNot, Datum::Int(int)) => Ok(Datum::Int(!int)),
        (UnaryOp::BitNot, Datum::Flt(_)) => floating(op.symbol()),
    }
}

fn binary(op: BinaryOp, lhs: Datum, rhs: Datum) -> Result<Datum, Exception> {
    match op {
        BinaryOp::StrEq => Ok(bool_datum(lhs.to_value() == rhs.to_value())),
        BinaryOp::StrNe => Ok(bool_datum(lhs.to_value() != rhs.to_value())),
        BinaryOp::In | BinaryOp::Ni => {
            let needle = lhs.to_value();
            let found = rhs.to_value().as_list()?.iter().any(|item| *item == needle);
            Ok(bool_datum(found == (op == BinaryOp::In)))
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
            compare(op, &lhs, &rhs)
        }
        _ => arithmetic(op, lhs, rhs),
    }
}

fn bool_datum(flag: bool) -> Datum {
    Datum::Int(flag as EmberInt)
}

fn compare(op: BinaryOp, lhs: &Datum, rhs: &Datum) -> Result<Datum, Exception> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Datum::Int(a), Datum::Int(b)) => Some(a.cmp(b)),
        _ if lhs.is_numeric() && rhs.is_numeric() => lhs.as_float().partial_cmp(&rhs.as_float()),
        _ => Some(lhs.to_value().as_str().cmp(rhs.to_value().as_str())),
    };

    let result = match ordering {
        // NaN compares unequal to everything.
        None => op == BinaryOp::Ne,
        Some(ord) => match op {
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Ge => ord != Ordering::Less,
            BinaryOp::Eq => ord == Ordering::Equal,
            _ => ord != Ordering::Equal,
        },
    };

    Ok(bool_datum(result))
}

fn arithmetic(op: BinaryOp, lhs: Datum, rhs: Datum) -> Result<Datum, Exception> {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return non_numeric(op.symbol());
    }

    match (lhs, rhs) {
        (Datum::Int(a), Datum::Int(b)) => int_arithmetic(op, a, b),
        (lhs, rhs) => {
            let (a, b) = (lhs.as_float(), rhs.as_float());
            let flt = match op {
                BinaryOp::Pow => a.powf(b),
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => return floating(op.symbol()),
            };
            Ok(Datum::Flt(flt))
        }
    }
}

fn int_arithmetic(op: BinaryOp, a: EmberInt, b: EmberInt) -> Result<Datum, Exception> {
    let result = match op {
        BinaryOp::Pow => return int_pow(a, b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => return ember_err!("divide by zero"),
        BinaryOp::Div => a.checked_div(b).map(|quot| {
            // Round toward negative infinity.
            if a % b != 0 && ((a < 0) != (b < 0)) {
                quot - 1
            } else {
                quot
            }
        }),
        BinaryOp::Mod => a.checked_rem(b).map(|rem| {
            // The remainder takes the divisor's sign.
            if rem != 0 && ((rem < 0) != (b < 0)) {
                rem + b
            } else {
                rem
            }
        }),
        BinaryOp::Shl | BinaryOp::Shr if b < 0 => return ember_err!("negative shift argument"),
        BinaryOp::Shl => {
            if a == 0 {
                Some(0)
            } else if b >= 63 {
                None
            } else {
                let shifted = a << b;
                (shifted >> b == a).then_some(shifted)
            }
        }
        BinaryOp::Shr => Some(if b >= 64 { a >> 63 } else { a >> b }),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::BitOr => Some(a | b),
        _ => None,
    };

    result.map(Datum::Int).map_or_else(overflow, Ok)
}

fn int_pow(base: EmberInt, exp: EmberInt) -> Result<Datum, Exception> {
    if exp < 0 {
        return match base {
            0 => ember_err!("exponentiation of zero by negative power"),
            1 => Ok(Datum::Int(1)),
            -1 => Ok(Datum::Int(if exp % 2 == 0 { 1 } else { -1 })),
            _ => Ok(Datum::Int(0)),
        };
    }

    match base {
        0 | 1 => return Ok(Datum::Int(if exp == 0 { 1 } else { base })),
        -1 => return Ok(Datum::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => (),
    }

    u32::try_from(exp)
        .ok()
        .and_then(|exp| base.checked_pow(exp))
        .map(Datum::Int)
        .map_or_else(overflow, Ok)
}

//------------------------------------------------------------------------------------------------
// Functions

fn call(name: &str, args: &[Datum]) -> Result<Datum, Exception> {
    let (min, max) = match name {
        "abs" | "int" | "double" | "round" | "sqrt" => (1, Some(1)),
        "pow" => (2, Some(2)),
        "min" | "max" => (1, None),
        _ => return ember_err!("unknown math function \"{}\"", name),
    };

    if args.len() < min {
        return ember_err!("too few arguments for math function \"{}\"", name);
    }
    if max.map_or(false, |max| args.len() > max) {
        return ember_err!("too many arguments for math function \"{}\"", name);
    }
    if let Some(Datum::Str(value)) = args.iter().find(|arg| !arg.is_numeric()) {
        return ember_err!("expected number but got \"{}\"", value);
    }

    match name {
        "abs" => match args[0] {
            Datum::Int(int) => int.checked_abs().map(Datum::Int).map_or_else(overflow, Ok),
            _ => Ok(Datum::Flt(args[0].as_float().abs())),
        },
        "int" => match args[0] {
            Datum::Int(int) => Ok(Datum::Int(int)),
            _ => float_to_int(args[0].as_float().trunc()),
        },
        "round" => match args[0] {
            Datum::Int(int) => Ok(Datum::Int(int)),
            _ => float_to_int(args[0].as_float().round()),
        },
        "double" => Ok(Datum::Flt(args[0].as_float())),
        "sqrt" => {
            let flt = args[0].as_float();
            if flt < 0.0 {
                ember_err!("domain error: argument not in valid range")
            } else {
                Ok(Datum::Flt(flt.sqrt()))
            }
        }
        "pow" => Ok(Datum::Flt(args[0].as_float().powf(args[1].as_float()))),
        _ => {
            let want_min = name == "min";
            let mut best = &args[0];

            for arg in &args[1..] {
                let better = match (arg, best) {
                    (Datum::Int(a), Datum::Int(b)) => {
                        if want_min {
                            a < b
                        } else {
                            a > b
                        }
                    }
                    _ => {
                        let (a, b) = (arg.as_float(), best.as_float());
                        if want_min {
                            a < b
                        } else {
                            a > b
                        }
                    }
                };
                if better {
                    best = arg;
                }
            }

            Ok(best.clone())
        }
    }
}

fn float_to_int(flt: EmberFloat) -> Result<Datum, Exception> {
    if flt.is_nan() || flt < EmberInt::MIN as EmberFloat || flt >= EmberInt::MAX as EmberFloat {
        overflow()
    } else {
        Ok(Datum::Int(flt as EmberInt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn veq(interp: &mut Interp, expr: &str) -> String {
        match interp.expr(&Value::from(expr), &mut ()) {
            Ok(value) => value.to_string(),
            Err(exception) => format!("error: {}", exception.value()),
        }
    }

    #[test]
    fn test_arithmetic() {
        let mut interp = Interp::new();

        assert_eq!(veq(&mut interp, "1 + 2 * 3"), "7");
        assert_eq!(veq(&mut interp, "(1 + 2) * 3"), "9");
        assert_eq!(veq(&mut interp, "2 ** 3 ** 2"), "512");
        assert_eq!(veq(&mut interp, "-2 ** 2"), "4");
        assert_eq!(veq(&mut interp, "7 / 2"), "3");
        assert_eq!(veq(&mut interp, "-7 / 2"), "-4");
        assert_eq!(veq(&mut interp, "-7 % 2"), "1");
        assert_eq!(veq(&mut interp, "7 % -2"), "-1");
        assert_eq!(veq(&mut interp, "7.0 / 2"), "3.5");
        assert_eq!(veq(&mut interp, "1.5 + 1.5"), "3.0");
        assert_eq!(veq(&mut interp, "0x10 + 0b11"), "19");
        assert_eq!(veq(&mut interp, "1 << 4 | 1"), "17");
        assert_eq!(veq(&mut interp, "~0"), "-1");
    }

    #[test]
    fn test_errors() {
        let mut interp = Interp::new();

        assert_eq!(veq(&mut interp, "1 / 0"), "error: divide by zero");
        assert_eq!(veq(&mut interp, "1 % 0"), "error: divide by zero");
        assert_eq!(
            veq(&mut interp, "9223372036854775807 + 1"),
            "error: integer value too large to represent"
        );
        assert_eq!(
            veq(&mut interp, "{abc} + 1"),
            "error: can't use non-numeric string as operand of \"+\""
        );
        assert_eq!(
            veq(&mut interp, "1.5 % 1"),
            "error: can't use floating-point value as operand of \"%\""
        );
        assert_eq!(veq(&mut interp, "foo(1)"), "error: unknown math function \"foo\"");
        assert_eq!(veq(&mut interp, "abc"), "error: invalid bareword \"abc\"");
        assert_eq!(veq(&mut interp, ""), "error: empty expression");
        assert_eq!(veq(&mut interp, "1 +"), "error: missing operand");
        assert_eq!(
            veq(&mut interp, "(1 + 2"),
            "error: unbalanced parentheses in expression"
        );
        assert_eq!(
            veq(&mut interp, "1 2"),
            "error: syntax error in expression \"1 2\""
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        let mut interp = Interp::new();

        assert_eq!(veq(&mut interp, "1 < 2"), "1");
        assert_eq!(veq(&mut interp, "2.5 >= 3"), "0");
        assert_eq!(veq(&mut interp, "10 == 10.0"), "1");
        assert_eq!(veq(&mut interp, "\"abc\" < \"abd\""), "1");
        assert_eq!(veq(&mut interp, "{a} eq {a}"), "1");
        assert_eq!(veq(&mut interp, "1 ne 1.0"), "1");
        assert_eq!(veq(&mut interp, "{b} in {a b c}"), "1");
        assert_eq!(veq(&mut interp, "{d} ni {a b c}"), "1");
        assert_eq!(veq(&mut interp, "true && !false"), "1");
        assert_eq!(veq(&mut interp, "0 || 0"), "0");
        assert_eq!(veq(&mut interp, "1 ? {yes} : {no}"), "yes");
        assert_eq!(veq(&mut interp, "0 ? 1 : 0 ? 2 : 3"), "3");
    }

    #[test]
    fn test_short_circuit() {
        let mut interp = Interp::new();
        interp.eval("set n 0", &mut ()).expect("set");

        assert_eq!(veq(&mut interp, "0 && [incr n]"), "0");
        assert_eq!(veq(&mut interp, "1 || [incr n]"), "1");
        assert_eq!(veq(&mut interp, "1 ? 5 : [incr n]"), "5");
        assert_eq!(interp.get_int("n").expect("n"), 0);
    }

    #[test]
    fn test_operands() {
        let mut interp = Interp::new();
        interp.eval("set x 4; set a(k) 6", &mut ()).expect("set");

        assert_eq!(veq(&mut interp, "$x * 2"), "8");
        assert_eq!(veq(&mut interp, "$a(k) + [set x]"), "10");
        assert_eq!(veq(&mut interp, "\"$x$x\" + 1"), "45");
        assert_eq!(veq(&mut interp, "$nope"), "error: can't read \"nope\": no such variable");
    }

    #[test]
    fn test_functions() {
        let mut interp = Interp::new();

        assert_eq!(veq(&mut interp, "abs(-3)"), "3");
        assert_eq!(veq(&mut interp, "abs(-2.5)"), "2.5");
        assert_eq!(veq(&mut interp, "int(3.9)"), "3");
        assert_eq!(veq(&mut interp, "round(2.5)"), "3");
        assert_eq!(veq(&mut interp, "double(2)"), "2.0");
        assert_eq!(veq(&mut interp, "min(3, 1, 2)"), "1");
        assert_eq!(veq(&mut interp, "max(3, 1.5)"), "3");
        assert_eq!(veq(&mut interp, "sqrt(16)"), "4.0");
        assert_eq!(veq(&mut interp, "pow(2, 10)"), "1024.0");
        assert_eq!(
            veq(&mut interp, "abs(1, 2)"),
            "error: too many arguments for math function \"abs\""
        );
        assert_eq!(
            veq(&mut interp, "max()"),
            "error: too few arguments for math function \"max\""
        );
    }
}
