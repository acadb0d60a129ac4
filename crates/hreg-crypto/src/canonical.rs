//! Canonical JSON serialization in the style of RFC 8785.
//!
//! The same logical value always produces the same byte sequence, regardless
//! of the key order or whitespace of the input:
//!
//! - No whitespace between tokens.
//! - Object members sorted by the UTF-16 code units of their keys, at every
//!   nesting level.
//! - Arrays keep their element order.
//! - Integral floats below 1e21 are written without a fraction.
//! - Strings escape only `"`, `\` and control characters.

use std::fmt::Write as _;

use serde_json::Value;

/// Produce the canonical string form of a JSON value.
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_value(value, &mut buf);
    buf
}

/// Canonical form as bytes, ready for hashing or signing.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    canonicalize_json(value).into_bytes()
}

fn write_value(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Number(n) => write_number(n, buf),
        Value::String(s) => write_string(s, buf),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_value(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

            buf.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_string(key, buf);
                buf.push(':');
                write_value(val, buf);
            }
            buf.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, buf: &mut String) {
    if n.is_i64() || n.is_u64() {
        buf.push_str(&n.to_string());
        return;
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => buf.push('0'),
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => {
            let _ = write!(buf, "{f:.0}");
        }
        _ => buf.push_str(&n.to_string()),
    }
}

fn write_string(s: &str, buf: &mut String) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0C}' => buf.push_str("\\f"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                let _ = write!(buf, "\\u{:04x}", u32::from(c));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(canonicalize_json(&json!(null)), "null");
        assert_eq!(canonicalize_json(&json!(true)), "true");
        assert_eq!(canonicalize_json(&json!(42)), "42");
        assert_eq!(canonicalize_json(&json!(-7)), "-7");
        assert_eq!(canonicalize_json(&json!("hi")), "\"hi\"");
    }

    #[test]
    fn integral_floats_drop_fraction() {
        assert_eq!(canonicalize_json(&json!(1.0)), "1");
        assert_eq!(canonicalize_json(&json!(-0.0)), "0");
        assert_eq!(canonicalize_json(&json!(2.5)), "2.5");
    }

    #[test]
    fn nested_keys_sorted_without_whitespace() {
        let val = json!({"z": 1, "a": {"c": [3, {"y": 1, "x": 2}], "b": 2}});
        assert_eq!(
            canonicalize_json(&val),
            r#"{"a":{"b":2,"c":[3,{"x":2,"y":1}]},"z":1}"#
        );
    }

    #[test]
    fn keys_sort_by_utf16_units() {
        // U+FB01 sorts after U+1F600 in UTF-8 byte order but before it in UTF-16.
        let val = json!({"\u{1F600}": 1, "\u{FB01}": 2});
        let out = canonicalize_json(&val);
        let emoji_pos = out.find('\u{1F600}').unwrap();
        let lig_pos = out.find('\u{FB01}').unwrap();
        assert!(emoji_pos < lig_pos);
    }

    #[test]
    fn control_characters_escaped() {
        let val = json!("a\u{01}b\n\"c\"\\");
        assert_eq!(canonicalize_json(&val), r#""a\u0001b\n\"c\"\\""#);
    }

    #[test]
    fn non_ascii_passes_through() {
        assert_eq!(canonicalize_json(&json!("日本/é")), "\"日本/é\"");
    }

    #[test]
    fn whitespace_in_source_does_not_matter() {
        let a: Value = serde_json::from_str("{ \"b\" : 1 ,\n \"a\" : [ 1 , 2 ] }").unwrap();
        let b: Value = serde_json::from_str(r#"{"a":[1,2],"b":1}"#).unwrap();
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    proptest! {
        #[test]
        fn canonical_form_is_a_fixed_point(
            entries in proptest::collection::btree_map("[a-zA-Z0-9_]{0,8}", any::<i64>(), 0..12)
        ) {
            let value = serde_json::to_value(&entries).unwrap();
            let first = canonicalize_json(&value);
            let reparsed: Value = serde_json::from_str(&first).unwrap();
            prop_assert_eq!(first, canonicalize_json(&reparsed));
        }
    }
}
