//! RFC-6901 JSON Pointer resolution.
//!
//! Shared by patch application and write-dependency extraction. Tokens are
//! unescaped (`~1` is `/`, `~0` is `~`); array references accept canonical
//! indices plus `-` for append.

use serde_json::Value;
use smallvec::SmallVec;

use crate::error::PatchError;

/// Parsed pointer tokens. Pointers in patch payloads are short, so tokens
/// stay inline.
pub(crate) type Tokens = SmallVec<[String; 8]>;

/// Parse a pointer into unescaped tokens. The empty pointer addresses the
/// whole document and yields no tokens.
pub(crate) fn parse(pointer: &str) -> Result<Tokens, PatchError> {
    if pointer.is_empty() {
        return Ok(Tokens::new());
    }
    let rest = pointer.strip_prefix('/').ok_or_else(|| {
        PatchError::InvalidSyntax(format!("pointer `{pointer}` must start with `/`"))
    })?;
    Ok(rest.split('/').map(unescape).collect())
}

fn unescape(token: &str) -> String {
    // ~1 before ~0, per RFC 6901
    token.replace("~1", "/").replace("~0", "~")
}

/// Parse an array index token: canonical decimal, no leading zeros.
pub(crate) fn array_index(token: &str) -> Option<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

/// Resolve a token path to a value, if present.
pub(crate) fn get<'a>(doc: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(array_index(token)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a token path to a mutable value, if present.
pub(crate) fn get_mut<'a>(doc: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token)?,
            Value::Array(items) => {
                let index = array_index(token)?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_unescape() {
        let tokens = parse("/variables/odd~1name/~0flag").unwrap();
        assert_eq!(tokens.as_slice(), ["variables", "odd/name", "~flag"]);
        assert!(parse("").unwrap().is_empty());
        assert!(parse("variables").is_err());
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-"), None);
        assert_eq!(array_index("x"), None);
    }

    #[test]
    fn test_get_descends_objects_and_arrays() {
        let doc = json!({"variables": {"tags": ["a", "b"]}});
        let tokens = parse("/variables/tags/1").unwrap();
        assert_eq!(get(&doc, &tokens), Some(&json!("b")));

        let missing = parse("/variables/tags/7").unwrap();
        assert_eq!(get(&doc, &missing), None);
    }
}
