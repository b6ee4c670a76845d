//! Encoders for tagged column values.
//!
//! `json` values are stored as JSON text, `serialized` values in the PHP
//! `serialize()` wire format that fixture databases commonly hold.

use serde_json::Value as JsonValue;

pub fn encode_json(value: &JsonValue) -> String {
    value.to_string()
}

pub fn encode_serialized(value: &JsonValue) -> String {
    let mut out = String::new();
    write_serialized(&mut out, value);
    out
}

fn write_serialized(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Null => out.push_str("N;"),
        JsonValue::Bool(b) => {
            out.push_str(if *b { "b:1;" } else { "b:0;" });
        }
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => out.push_str(&format!("i:{};", i)),
            None => out.push_str(&format!("d:{};", n.as_f64().unwrap_or(0.0))),
        },
        JsonValue::String(s) => write_string(out, s),
        JsonValue::Array(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (idx, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{};", idx));
                write_serialized(out, item);
            }
            out.push('}');
        }
        JsonValue::Object(map) => {
            out.push_str(&format!("a:{}:{{", map.len()));
            for (key, item) in map {
                match key.parse::<i64>() {
                    Ok(idx) => out.push_str(&format!("i:{};", idx)),
                    Err(_) => write_string(out, key),
                }
                write_serialized(out, item);
            }
            out.push('}');
        }
    }
}

// length is in bytes, not characters
fn write_string(out: &mut String, s: &str) {
    out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
}
