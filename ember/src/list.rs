//! List parsing and formatting.
//!
//! A list's canonical string form is its elements joined by single spaces, each element
//! quoted with braces or backslashes only when needed so that [`parse_list`] gives back
//! exactly the same elements.

use crate::ember_err;
use crate::parser::backslash;
use crate::types::*;

/// Parses a list-formatted string into a vector of values.
///
/// ```
/// use ember::list::parse_list;
/// let list = parse_list("a {b c} \"d e\" f\\ g").unwrap();
/// let items: Vec<&str> = list.iter().map(|v| v.as_str()).collect();
/// assert_eq!(items, vec!["a", "b c", "d e", "f g"]);
/// ```
pub fn parse_list(text: &str) -> Result<EmberList, Exception> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut items = Vec::new();

    loop {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }

        if pos == chars.len() {
            return Ok(items);
        }

        let item = match chars[pos] {
            '{' => parse_braced_item(&chars, &mut pos)?,
            '"' => parse_quoted_item(&chars, &mut pos)?,
            _ => parse_bare_item(&chars, &mut pos),
        };

        items.push(Value::from(item));
    }
}

fn parse_braced_item(chars: &[char], pos: &mut usize) -> Result<String, Exception> {
    *pos += 1;
    let start = *pos;
    let mut depth = 1;

    while *pos < chars.len() {
        match chars[*pos] {
            '\\' => *pos += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let item: String = chars[start..*pos].iter().collect();
                    *pos += 1;
                    check_separator(chars, *pos, "braces")?;
                    return Ok(item);
                }
            }
            _ => (),
        }
        *pos += 1;
    }

    ember_err!("unmatched open brace in list")
}

fn parse_quoted_item(chars: &[char], pos: &mut usize) -> Result<String, Exception> {
    *pos += 1;
    let mut item = String::new();

    while *pos < chars.len() {
        match chars[*pos] {
            '"' => {
                *pos += 1;
                check_separator(chars, *pos, "quotes")?;
                return Ok(item);
            }
            '\\' => item.push_str(&backslash(chars, pos)),
            ch => {
                item.push(ch);
                *pos += 1;
            }
        }
    }

    ember_err!("unmatched open quote in list")
}

fn parse_bare_item(chars: &[char], pos: &mut usize) -> String {
    let mut item = String::new();

    while *pos < chars.len() && !chars[*pos].is_whitespace() {
        if chars[*pos] == '\\' {
            item.push_str(&backslash(chars, pos));
        } else {
            item.push(chars[*pos]);
            *pos += 1;
        }
    }

    item
}

fn check_separator(chars: &[char], pos: usize, what: &str) -> Result<(), Exception> {
    match chars.get(pos) {
        Some(ch) if !ch.is_whitespace() => ember_err!(
            "list element in {} followed by \"{}\" instead of space",
            what,
            ch
        ),
        _ => Ok(()),
    }
}

/// Formats a slice of values as a canonical list string.
///
/// ```
/// use ember::list::list_to_string;
/// use ember::Value;
/// let list = vec![Value::from("a"), Value::from("b c"), Value::empty()];
/// assert_eq!(list_to_string(&list), "a {b c} {}");
/// ```
pub fn list_to_string(list: &[Value]) -> String {
    let items: Vec<String> = list.iter().map(|item| quote_item(item.as_str())).collect();
    items.join(" ")
}

/// Quotes one element so that it survives a round trip through `parse_list`.
fn quote_item(item: &str) -> String {
    if item.is_empty() {
        return "{}".into();
    }

    if !needs_quoting(item) {
        return item.into();
    }

    if can_brace(item) {
        return format!("{{{}}}", item);
    }

    let mut out = String::with_capacity(item.len() + 8);
    for ch in item.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ' ' | '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }

    if out.starts_with('#') {
        out.insert(0, '\\');
    }

    out
}

fn needs_quoting(item: &str) -> bool {
    item.starts_with('#')
        || item.chars().any(|ch| {
            ch.is_whitespace() || matches!(ch, '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';')
        })
}

/// An element can be braced if its braces balance and it doesn't end in a backslash.
fn can_brace(item: &str) -> bool {
    let mut depth = 0;
    let mut escaped = false;

    for ch in item.chars() {
        if escaped {
            escaped = false;
            continue;
        }

        match ch {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            _ => (),
        }
    }

    depth == 0 && !escaped
}

/// Parses a list index: an integer, `end`, or `end-N`/`end+N`, relative to a list of
/// length `len`.  The result may be out of range; callers decide what that means.
///
/// ```
/// use ember::list::parse_index;
/// assert_eq!(parse_index("end", 5).unwrap(), 4);
/// assert_eq!(parse_index("end-1", 5).unwrap(), 3);
/// assert_eq!(parse_index("7", 5).unwrap(), 7);
/// assert!(parse_index("last", 5).is_err());
/// ```
pub fn parse_index(text: &str, len: usize) -> Result<EmberInt, Exception> {
    let trimmed = text.trim();
    let last = len as EmberInt - 1;

    if let Some(rest) = trimmed.strip_prefix("end") {
        if rest.is_empty() {
            return Ok(last);
        }

        let index = if let Some(offset) = rest.strip_prefix('-') {
            Value::get_int(offset)
                .ok()
                .and_then(|offset| last.checked_sub(offset))
        } else if let Some(offset) = rest.strip_prefix('+') {
            Value::get_int(offset)
                .ok()
                .and_then(|offset| last.checked_add(offset))
        } else {
            None
        };

        if let Some(index) = index {
            return Ok(index);
        }
    } else if let Ok(index) = Value::get_int(trimmed) {
        return Ok(index);
    }

    ember_err!(
        "bad index \"{}\": must be integer?[+-]integer? or end?[+-]integer?",
        text
    )
}

/// Returns the element at the index, or None if it's out of range.
pub fn get_index(list: &[Value], index: &Value) -> Result<Option<Value>, Exception> {
    let index = parse_index(index.as_str(), list.len())?;

    if index < 0 || index as usize >= list.len() {
        Ok(None)
    } else {
        Ok(Some(list[index as usize].clone()))
    }
}

/// Removes the element addressed by a nested index path and returns the rebuilt list.
/// Each enclosing list along the path is copied; the input is untouched.  An index that
/// is out of range at any depth leaves the list unchanged.
///
/// ```
/// use ember::list::remove_path;
/// use ember::Value;
///
/// let list = Value::from("a {b c d} e");
/// let path = vec![Value::from("1"), Value::from("end")];
/// let result = remove_path(&list, &path).unwrap();
/// assert_eq!(result.as_str(), "a {b c} e");
/// assert_eq!(list.as_str(), "a {b c d} e");
/// ```
pub fn remove_path(list: &Value, path: &[Value]) -> EmberResult {
    let (first, rest) = match path.split_first() {
        Some(split) => split,
        None => return Ok(list.clone()),
    };

    let items = list.as_list()?;
    let index = parse_index(first.as_str(), items.len())?;

    if index < 0 || index as usize >= items.len() {
        return Ok(list.clone());
    }

    let index = index as usize;
    let mut copy: EmberList = items.to_vec();

    if rest.is_empty() {
        copy.remove(index);
    } else {
        copy[index] = remove_path(&items[index], rest)?;
    }

    Ok(Value::from(copy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strs(list: &[Value]) -> Vec<&str> {
        list.iter().map(|v| v.as_str()).collect()
    }

    #[test]
    fn test_parse_list() {
        assert!(parse_list("").expect("list").is_empty());
        assert!(parse_list("   \n ").expect("list").is_empty());
        assert_eq!(strs(&parse_list("a b  c").expect("list")), vec!["a", "b", "c"]);
        assert_eq!(
            strs(&parse_list("{a {b}} c").expect("list")),
            vec!["a {b}", "c"]
        );
        assert_eq!(strs(&parse_list("\"x\\ty\"").expect("list")), vec!["x\ty"]);
        assert_eq!(strs(&parse_list("{}").expect("list")), vec![""]);
    }

    #[test]
    fn test_parse_list_errors() {
        assert_eq!(
            parse_list("{a").unwrap_err().value().as_str(),
            "unmatched open brace in list"
        );
        assert_eq!(
            parse_list("\"a").unwrap_err().value().as_str(),
            "unmatched open quote in list"
        );
        assert_eq!(
            parse_list("{a}b").unwrap_err().value().as_str(),
            "list element in braces followed by \"b\" instead of space"
        );
    }

    #[test]
    fn test_list_to_string() {
        let list: EmberList = ["a", "b c", "", "{x", "$y", "#z", "tail\\"]
            .iter()
            .map(|s| Value::from(*s))
            .collect();

        let text = list_to_string(&list);
        assert_eq!(text, "a {b c} {} \\{x {$y} {#z} tail\\\\");
    }

    #[test]
    fn test_round_trip_law() {
        let items = [
            "plain", "two words", "", "{", "}", "a}b{", "[cmd]", "x\\", "q\"uote", "\n", "#c",
        ];
        let list: EmberList = items.iter().map(|s| Value::from(*s)).collect();

        let text = list_to_string(&list);
        let parsed = parse_list(&text).expect("round trip");
        assert_eq!(strs(&parsed), items.to_vec());
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("0", 3).expect("index"), 0);
        assert_eq!(parse_index("end", 3).expect("index"), 2);
        assert_eq!(parse_index("end-2", 3).expect("index"), 0);
        assert_eq!(parse_index("end+1", 3).expect("index"), 3);
        assert_eq!(parse_index("-1", 3).expect("index"), -1);
        assert!(parse_index("end-x", 3).is_err());
    }

    #[test]
    fn test_parse_index_overflow() {
        assert_eq!(
            parse_index("end-9223372036854775807", 2).expect("index"),
            -9223372036854775806
        );
        assert!(parse_index("end+9223372036854775807", 2).is_err());
        assert!(parse_index("end--9223372036854775807", 2).is_err());

        let err = parse_index("end+9223372036854775807", 2).unwrap_err();
        assert_eq!(
            err.value().as_str(),
            "bad index \"end+9223372036854775807\": must be integer?[+-]integer? or end?[+-]integer?"
        );
    }

    #[test]
    fn test_get_index() {
        let list = parse_list("a b c").expect("list");
        assert_eq!(
            get_index(&list, &Value::from("1")).expect("index"),
            Some(Value::from("b"))
        );
        assert_eq!(get_index(&list, &Value::from("5")).expect("index"), None);
        assert_eq!(get_index(&list, &Value::from("-1")).expect("index"), None);
    }

    #[test]
    fn test_remove_path() {
        let list = Value::from("a {b {c d} e} f");

        let result = remove_path(&list, &[Value::from("0")]).expect("remove");
        assert_eq!(result.as_str(), "{b {c d} e} f");

        let result =
            remove_path(&list, &[Value::from("1"), Value::from("1"), Value::from("0")])
                .expect("remove");
        assert_eq!(result.as_str(), "a {b d e} f");

        let result = remove_path(&list, &[Value::from("9")]).expect("remove");
        assert_eq!(result.as_str(), list.as_str());

        let result = remove_path(&list, &[]).expect("remove");
        assert_eq!(result.as_str(), list.as_str());
    }
}
