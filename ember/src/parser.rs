//! The Ember Parser
//!
//! The parser turns script text into a [`Script`]: a sequence of commands, each a list
//! of [`Word`]s awaiting substitution.  Every command records its 1-based line number and
//! its source text, which the evaluator uses when it builds an error's stack trace.
//!
//! Parsed scripts are cached by [`Value::as_script`](../value/struct.Value.html), so a loop
//! body or procedure body is parsed once no matter how often it runs.

use crate::ember_err;
use crate::types::*;

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    commands: Vec<WordVec>,
}

impl Script {
    /// The script's commands, in order.
    pub fn commands(&self) -> &[WordVec] {
        &self.commands
    }
}

/// A single parsed command: its words, the line it starts on, and its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct WordVec {
    words: Vec<Word>,
    line: usize,
    text: String,
}

impl WordVec {
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// The 1-based line within the script on which the command starts.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The command's source text, before substitution.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A word in a command, prior to substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// A literal: a bare word with nothing to substitute, or a braced word.
    Value(Value),
    /// `$name` or `${name}`
    VarRef(String),
    /// `$name(index)`; the index is itself a word.
    ArrayRef(String, Box<Word>),
    /// `[script]`
    Script(Script),
    /// A word built by concatenating several pieces.
    Tokens(Vec<Word>),
    /// `{*}word`: the word's list elements become separate arguments.
    Expand(Box<Word>),
}

/// Parses a script.
///
/// ```
/// use ember::parser::parse;
///
/// let script = parse("set a 1\nputs $a").unwrap();
/// assert_eq!(script.commands().len(), 2);
/// assert_eq!(script.commands()[1].line(), 2);
/// assert_eq!(script.commands()[1].text(), "puts $a");
/// ```
pub fn parse(input: &str) -> Result<Script, Exception> {
    let mut cursor = Cursor::new(input);
    parse_script(&mut cursor, false)
}

/// Parses text for substitution only, as done by `subst`: there are no words or
/// commands, just literal runs and the substitutions enabled by `flags`.  Each piece is
/// returned separately so that the caller can stop part way through.
pub fn parse_subst(input: &str, flags: SubstFlags) -> Result<Vec<Word>, Exception> {
    let mut cursor = Cursor::new(input);
    let tokens = parse_tokens(&mut cursor, Stop::End, flags)?;
    Ok(tokens.into_pieces())
}

/// Performs backslash substitution on a string.
///
/// ```
/// use ember::parser::backslash_subst;
/// assert_eq!(backslash_subst("a\\tb\\x41\\u00e9\\101"), "a\tbAéA");
/// ```
pub fn backslash_subst(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut out = String::with_capacity(text.len());

    while pos < chars.len() {
        if chars[pos] == '\\' {
            out.push_str(&backslash(&chars, &mut pos));
        } else {
            out.push(chars[pos]);
            pos += 1;
        }
    }

    out
}

/// Interprets the backslash sequence at `chars[*pos]`, advancing past it.
pub(crate) fn backslash(chars: &[char], pos: &mut usize) -> String {
    *pos += 1;

    let ch = match chars.get(*pos) {
        Some(ch) => *ch,
        None => return "\\".into(),
    };
    *pos += 1;

    match ch {
        'a' => "\x07".into(),
        'b' => "\x08".into(),
        'f' => "\x0c".into(),
        'n' => "\n".into(),
        'r' => "\r".into(),
        't' => "\t".into(),
        'v' => "\x0b".into(),
        '\n' => {
            while matches!(chars.get(*pos), Some(' ') | Some('\t')) {
                *pos += 1;
            }
            " ".into()
        }
        'x' => radix_escape(chars, pos, 16, 2).unwrap_or_else(|| "x".into()),
        'u' => radix_escape(chars, pos, 16, 4).unwrap_or_else(|| "u".into()),
        'U' => radix_escape(chars, pos, 16, 8).unwrap_or_else(|| "U".into()),
        '0'..='7' => {
            *pos -= 1;
            radix_escape(chars, pos, 8, 3).unwrap_or_default()
        }
        _ => ch.to_string(),
    }
}

fn radix_escape(chars: &[char], pos: &mut usize, radix: u32, max: usize) -> Option<String> {
    let mut code: u32 = 0;
    let mut count = 0;

    while count < max {
        match chars.get(*pos).and_then(|ch| ch.to_digit(radix)) {
            Some(digit) => {
                code = code * radix + digit;
                *pos += 1;
                count += 1;
            }
            None => break,
        }
    }

    if count == 0 {
        return None;
    }

    Some(
        char::from_u32(code)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
    )
}

/// A position in the text being parsed.
pub(crate) struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_pos: usize,
}

impl Cursor {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            line_pos: 0,
        }
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub(crate) fn advance(&mut self) {
        self.pos += 1;
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn starts_with(&self, prefix: &str) -> bool {
        let mut offset = 0;
        for ch in prefix.chars() {
            if self.peek_at(offset) != Some(ch) {
                return false;
            }
            offset += 1;
        }
        true
    }

    pub(crate) fn skip(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.chars.len());
    }

    pub(crate) fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.pos += 1;
        }
    }

    /// The line number at the current position.  Positions only move forward, so the
    /// newlines are counted incrementally.
    pub(crate) fn line(&mut self) -> usize {
        let end = self.pos.min(self.chars.len());
        if end > self.line_pos {
            self.line += self.chars[self.line_pos..end]
                .iter()
                .filter(|ch| **ch == '\n')
                .count();
            self.line_pos = end;
        }
        self.line
    }

    pub(crate) fn text(&self, start: usize, end: usize) -> String {
        self.chars[start..end.min(self.chars.len())].iter().collect()
    }

    pub(crate) fn backslash(&mut self) -> String {
        backslash(&self.chars, &mut self.pos)
    }
}

/// What ends a run of tokens.
#[derive(Clone, Copy)]
enum Stop {
    /// Whitespace or `;`, or `]` inside a command substitution.
    Word(bool),
    Quote,
    Paren,
    End,
}

/// Accumulates the pieces of a word.
#[derive(Default)]
struct Tokens {
    list: Vec<Word>,
    text: String,
}

impl Tokens {
    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
    }

    fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn push_word(&mut self, word: Word) {
        self.flush();
        self.list.push(word);
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.list.push(Word::Value(Value::from(text)));
        }
    }

    fn into_word(mut self) -> Word {
        self.flush();
        match self.list.len() {
            0 => Word::Value(Value::empty()),
            1 => self.list.remove(0),
            _ => Word::Tokens(self.list),
        }
    }

    fn into_pieces(mut self) -> Vec<Word> {
        self.flush();
        self.list
    }
}

fn parse_script(cur: &mut Cursor, in_bracket: bool) -> Result<Script, Exception> {
    let mut commands = Vec::new();

    loop {
        cur.skip_while(|ch| ch.is_whitespace() || ch == ';');

        match cur.peek() {
            None if in_bracket => return ember_err!("missing close-bracket"),
            None => return Ok(Script { commands }),
            Some(']') if in_bracket => {
                cur.advance();
                return Ok(Script { commands });
            }
            Some('#') => skip_comment(cur),
            Some(_) => {
                if let Some(command) = parse_command(cur, in_bracket)? {
                    commands.push(command);
                }
            }
        }
    }
}

fn skip_comment(cur: &mut Cursor) {
    while let Some(ch) = cur.peek() {
        cur.advance();
        match ch {
            '\\' => cur.advance(),
            '\n' => break,
            _ => (),
        }
    }
}

fn parse_command(cur: &mut Cursor, in_bracket: bool) -> Result<Option<WordVec>, Exception> {
    let line = cur.line();
    let start = cur.pos();
    let mut words = Vec::new();

    loop {
        skip_blanks(cur);

        match cur.peek() {
            None | Some('\n') | Some(';') => break,
            Some(']') if in_bracket => break,
            _ => words.push(parse_word(cur, in_bracket)?),
        }
    }

    if words.is_empty() {
        return Ok(None);
    }

    let text = cur.text(start, cur.pos()).trim().to_string();
    Ok(Some(WordVec { words, line, text }))
}

/// Skips spaces, tabs, and backslash-newlines; they separate words.
fn skip_blanks(cur: &mut Cursor) {
    loop {
        match cur.peek() {
            Some(ch) if ch.is_whitespace() && ch != '\n' => cur.advance(),
            Some('\\') if cur.peek_at(1) == Some('\n') => {
                cur.skip(2);
                cur.skip_while(|ch| ch == ' ' || ch == '\t');
            }
            _ => return,
        }
    }
}

fn at_word_end(cur: &Cursor, in_bracket: bool) -> bool {
    match cur.peek() {
        None => true,
        Some(ch) => ch.is_whitespace() || ch == ';' || (in_bracket && ch == ']'),
    }
}

fn parse_word(cur: &mut Cursor, in_bracket: bool) -> Result<Word, Exception> {
    if cur.starts_with("{*}") {
        cur.skip(3);
        if at_word_end(cur, in_bracket) {
            return Ok(Word::Value(Value::from("*")));
        }
        let word = parse_word(cur, in_bracket)?;
        return Ok(Word::Expand(Box::new(word)));
    }

    match cur.peek() {
        Some('{') => {
            let text = parse_braced(cur)?;
            if !at_word_end(cur, in_bracket) {
                return ember_err!("extra characters after close-brace");
            }
            Ok(Word::Value(Value::from(text)))
        }
        Some('"') => {
            let word = parse_quoted(cur)?;
            if !at_word_end(cur, in_bracket) {
                return ember_err!("extra characters after close-quote");
            }
            Ok(word)
        }
        _ => Ok(parse_tokens(cur, Stop::Word(in_bracket), SubstFlags::ALL)?.into_word()),
    }
}

/// Parses a braced word starting at `{`, returning its contents.  Backslash-newline
/// sequences become a single space; everything else is literal.
pub(crate) fn parse_braced(cur: &mut Cursor) -> Result<String, Exception> {
    cur.advance();
    let mut depth = 1;
    let mut text = String::new();

    while let Some(ch) = cur.peek() {
        match ch {
            '\\' if cur.peek_at(1) == Some('\n') => {
                text.push_str(&cur.backslash());
                continue;
            }
            '\\' => {
                text.push(ch);
                cur.advance();
                if let Some(next) = cur.peek() {
                    text.push(next);
                    cur.advance();
                }
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    cur.advance();
                    return Ok(text);
                }
            }
            _ => (),
        }

        text.push(ch);
        cur.advance();
    }

    ember_err!("missing close-brace")
}

/// Parses a quoted word starting at `"`.
pub(crate) fn parse_quoted(cur: &mut Cursor) -> Result<Word, Exception> {
    cur.advance();
    let tokens = parse_tokens(cur, Stop::Quote, SubstFlags::ALL)?;

    if cur.peek() != Some('"') {
        return ember_err!("missing \"");
    }
    cur.advance();

    Ok(tokens.into_word())
}

/// Parses a command substitution starting at `[`.
pub(crate) fn parse_bracket(cur: &mut Cursor) -> Result<Word, Exception> {
    cur.advance();
    Ok(Word::Script(parse_script(cur, true)?))
}

/// Parses a variable reference starting at `$`.  A `$` that isn't followed by a
/// variable name is literal.
pub(crate) fn parse_dollar(cur: &mut Cursor, flags: SubstFlags) -> Result<Word, Exception> {
    cur.advance();

    if cur.peek() == Some('{') {
        cur.advance();
        let start = cur.pos();
        cur.skip_while(|ch| ch != '}');

        if cur.at_end() {
            return ember_err!("missing close-brace for variable name");
        }

        let name = cur.text(start, cur.pos());
        cur.advance();
        return Ok(Word::VarRef(name));
    }

    let name = parse_var_name(cur);

    if name.is_empty() {
        return Ok(Word::Value(Value::from("$")));
    }

    if cur.peek() == Some('(') {
        cur.advance();
        let index = parse_tokens(cur, Stop::Paren, flags)?;

        if cur.peek() != Some(')') {
            return ember_err!("missing )");
        }
        cur.advance();

        return Ok(Word::ArrayRef(name, Box::new(index.into_word())));
    }

    Ok(Word::VarRef(name))
}

fn parse_var_name(cur: &mut Cursor) -> String {
    let mut name = String::new();

    loop {
        match cur.peek() {
            Some(ch) if ch.is_alphanumeric() || ch == '_' => {
                name.push(ch);
                cur.advance();
            }
            Some(':') if cur.peek_at(1) == Some(':') => {
                name.push_str("::");
                cur.skip(2);
                cur.skip_while(|ch| ch == ':');
            }
            _ => return name,
        }
    }
}

fn parse_tokens(cur: &mut Cursor, stop: Stop, flags: SubstFlags) -> Result<Tokens, Exception> {
    let mut tokens = Tokens::default();

    while let Some(ch) = cur.peek() {
        let done = match stop {
            Stop::Word(in_bracket) => {
                ch.is_whitespace()
                    || ch == ';'
                    || (in_bracket && ch == ']')
                    || (ch == '\\' && cur.peek_at(1) == Some('\n'))
            }
            Stop::Quote => ch == '"',
            Stop::Paren => ch == ')',
            Stop::End => false,
        };

        if done {
            break;
        }

        match ch {
            '\\' if flags.contains(SubstFlags::BACKSLASHES) => tokens.push_str(&cur.backslash()),
            '[' if flags.contains(SubstFlags::COMMANDS) => tokens.push_word(parse_bracket(cur)?),
            '$' if flags.contains(SubstFlags::VARIABLES) => match parse_dollar(cur, flags)? {
                Word::Value(literal) => tokens.push_str(literal.as_str()),
                word => tokens.push_word(word),
            },
            _ => {
                tokens.push_char(ch);
                cur.advance();
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(text: &str) -> Word {
        Word::Value(Value::from(text))
    }

    fn words(script: &Script, index: usize) -> Vec<Word> {
        script.commands()[index].words().to_vec()
    }

    #[test]
    fn test_simple_commands() {
        let script = parse("set a 1; set b 2\n\n  puts hi").expect("parse");
        assert_eq!(script.commands().len(), 3);
        assert_eq!(words(&script, 0), vec![lit("set"), lit("a"), lit("1")]);
        assert_eq!(script.commands()[1].text(), "set b 2");
        assert_eq!(script.commands()[2].line(), 3);
    }

    #[test]
    fn test_comments() {
        let script = parse("# a comment\\\n still comment\nset x 1").expect("parse");
        assert_eq!(script.commands().len(), 1);
        assert_eq!(script.commands()[0].line(), 3);
    }

    #[test]
    fn test_braces_and_quotes() {
        let script = parse("list {a {b} $c} \"x $y\"").expect("parse");
        assert_eq!(
            words(&script, 0),
            vec![
                lit("list"),
                lit("a {b} $c"),
                Word::Tokens(vec![lit("x "), Word::VarRef("y".into())]),
            ]
        );
    }

    #[test]
    fn test_variables() {
        let script = parse("puts $a ${b c} $arr(x$i) $::g $").expect("parse");
        assert_eq!(
            words(&script, 0),
            vec![
                lit("puts"),
                Word::VarRef("a".into()),
                Word::VarRef("b c".into()),
                Word::ArrayRef(
                    "arr".into(),
                    Box::new(Word::Tokens(vec![lit("x"), Word::VarRef("i".into())]))
                ),
                Word::VarRef("::g".into()),
                lit("$"),
            ]
        );
    }

    #[test]
    fn test_command_substitution() {
        let script = parse("set a [list b [c]]x").expect("parse");
        let parsed = words(&script, 0);
        match &parsed[2] {
            Word::Tokens(pieces) => {
                assert_eq!(pieces.len(), 2);
                assert!(matches!(pieces[0], Word::Script(_)));
                assert_eq!(pieces[1], lit("x"));
            }
            other => panic!("unexpected word {:?}", other),
        }
    }

    #[test]
    fn test_expand() {
        let script = parse("list {*}$a {*} b").expect("parse");
        assert_eq!(
            words(&script, 0),
            vec![
                lit("list"),
                Word::Expand(Box::new(Word::VarRef("a".into()))),
                lit("*"),
                lit("b"),
            ]
        );
    }

    #[test]
    fn test_backslash_newline_separates_words() {
        let script = parse("set a \\\n    1").expect("parse");
        assert_eq!(words(&script, 0), vec![lit("set"), lit("a"), lit("1")]);
    }

    #[test]
    fn test_errors() {
        let msg = |text: &str| parse(text).unwrap_err().value().as_str().to_string();
        assert_eq!(msg("set a {b"), "missing close-brace");
        assert_eq!(msg("set a \"b"), "missing \"");
        assert_eq!(msg("set a [b"), "missing close-bracket");
        assert_eq!(msg("set a {b}c"), "extra characters after close-brace");
        assert_eq!(msg("set a \"b\"c"), "extra characters after close-quote");
        assert_eq!(msg("puts ${a"), "missing close-brace for variable name");
        assert_eq!(msg("puts $a(b"), "missing )");
    }

    #[test]
    fn test_parse_subst() {
        let pieces = parse_subst("a $b [c] \\n", SubstFlags::ALL).expect("parse");
        assert_eq!(pieces.len(), 5);
        assert_eq!(pieces[0], lit("a "));
        assert_eq!(pieces[1], Word::VarRef("b".into()));
        assert_eq!(pieces[4], lit(" \n"));

        let pieces = parse_subst("a $b [c] \\n", SubstFlags::BACKSLASHES).expect("parse");
        assert_eq!(pieces, vec![lit("a $b [c] \n")]);
    }

    #[test]
    fn test_backslash_subst() {
        assert_eq!(backslash_subst("\\\\"), "\\");
        assert_eq!(backslash_subst("\\q"), "q");
        assert_eq!(backslash_subst("\\xZ"), "xZ");
        assert_eq!(backslash_subst("a\\\n   b"), "a b");
        assert_eq!(backslash_subst("trailing\\"), "trailing\\");
    }
}
