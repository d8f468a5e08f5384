//! Value document in the declarative engine's literal syntax.

use crate::case::to_snake_case;
use serde_yaml::{Mapping, Value};
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unsupported value type for key '{key}': {found}")]
    UnsupportedValueType { key: String, found: &'static str },
    #[error("value document must be rooted at an object")]
    NotAnObject,
    #[error("keys '{first}' and '{second}' both become '{key}'")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },
}

/// Render a projected tree as tfvars. Mapping keys are converted to
/// snake_case and emitted in sorted order.
pub fn render(tree: &Value) -> Result<String, CompileError> {
    let map = tree.as_mapping().ok_or(CompileError::NotAnObject)?;
    let mut out = String::new();
    write_entries(&mut out, map, 0, "")?;
    Ok(out)
}

fn write_entries(
    out: &mut String,
    map: &Mapping,
    depth: usize,
    parent: &str,
) -> Result<(), CompileError> {
    let indent = "  ".repeat(depth);
    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        let Some(key) = key.as_str() else {
            return Err(CompileError::UnsupportedValueType {
                key: join(parent, &format!("{key:?}")),
                found: "non-string mapping key",
            });
        };
        entries.push((to_snake_case(key), key, value));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(CompileError::KeyCollision {
            key: join(parent, &pair[0].0),
            first: pair[0].1.to_owned(),
            second: pair[1].1.to_owned(),
        });
    }

    for (name, _, value) in entries {
        let path = join(parent, &name);
        let rendered_key = if is_identifier(&name) {
            name
        } else {
            quote(&name)
        };
        match value {
            Value::Mapping(inner) => {
                let _ = writeln!(out, "{indent}{rendered_key} = {{");
                write_entries(out, inner, depth + 1, &path)?;
                let _ = writeln!(out, "{indent}}}");
            }
            Value::Sequence(items) => {
                let _ = writeln!(out, "{indent}{rendered_key} = [");
                write_items(out, items, depth + 1, &path)?;
                let _ = writeln!(out, "{indent}]");
            }
            scalar => {
                let literal = scalar_literal(scalar, &path)?;
                let _ = writeln!(out, "{indent}{rendered_key} = {literal}");
            }
        }
    }
    Ok(())
}

fn write_items(
    out: &mut String,
    items: &[Value],
    depth: usize,
    parent: &str,
) -> Result<(), CompileError> {
    let indent = "  ".repeat(depth);
    for (i, item) in items.iter().enumerate() {
        let path = format!("{parent}[{i}]");
        match item {
            Value::Mapping(inner) => {
                let _ = writeln!(out, "{indent}{{");
                write_entries(out, inner, depth + 1, &path)?;
                let _ = writeln!(out, "{indent}}},");
            }
            Value::Sequence(inner) => {
                let _ = writeln!(out, "{indent}[");
                write_items(out, inner, depth + 1, &path)?;
                let _ = writeln!(out, "{indent}],");
            }
            scalar => {
                let literal = scalar_literal(scalar, &path)?;
                let _ = writeln!(out, "{indent}{literal},");
            }
        }
    }
    Ok(())
}

fn scalar_literal(value: &Value, path: &str) -> Result<String, CompileError> {
    match value {
        Value::Null => Ok("null".to_owned()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::String(s) => Ok(quote(s)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Ok(f.to_string()),
                    _ => Err(CompileError::UnsupportedValueType {
                        key: path.to_owned(),
                        found: "non-finite number",
                    }),
                }
            }
        }
        Value::Tagged(_) => Err(CompileError::UnsupportedValueType {
            key: path.to_owned(),
            found: "tagged value",
        }),
        Value::Mapping(_) | Value::Sequence(_) => Err(CompileError::UnsupportedValueType {
            key: path.to_owned(),
            found: "container in scalar position",
        }),
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Quote a string as an HCL template literal. Interpolation and directive
/// openers are escaped so values are taken verbatim.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
