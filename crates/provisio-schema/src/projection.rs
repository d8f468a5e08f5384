//! Schema-guided projection of a manifest into the tree handed to engines.
//!
//! The projection drops `apiVersion`, `kind` and `status` at the top level
//! and `version` inside metadata messages, and sorts every mapping by key so
//! the same manifest always yields the same bytes downstream.

use crate::case::to_snake_case;
use crate::catalog::ResourceKind;
use crate::descriptor::{
    is_metadata_message, is_opaque_message, EnumDescriptor, FieldKind, SchemaSet,
};
use crate::manifest::Manifest;
use crate::reflect::SKIPPED_TOP_LEVEL;
use serde_yaml::{Mapping, Value};

pub fn project(manifest: &Manifest, kind: &ResourceKind, schema: &SchemaSet) -> Value {
    let mut out = Mapping::new();
    if let Some(map) = manifest.value().as_mapping() {
        for (key, value) in sorted_entries(map) {
            if key
                .as_str()
                .is_some_and(|k| SKIPPED_TOP_LEVEL.contains(&to_snake_case(k).as_str()))
            {
                continue;
            }
            out.insert(
                key.clone(),
                project_field(value, key, Some(kind.message_name()), schema),
            );
        }
    }
    Value::Mapping(out)
}

/// Project the value stored under `key` of message `owner`.
fn project_field(value: &Value, key: &Value, owner: Option<&str>, schema: &SchemaSet) -> Value {
    let field = owner
        .and_then(|o| schema.message(o).ok())
        .zip(key.as_str())
        .and_then(|(message, k)| message.field_for_key(k));
    let Some(field) = field else {
        return sorted(value);
    };
    let child = match (field.element_kind(), field.type_name.as_deref()) {
        (FieldKind::Message, Some(name)) if !is_opaque_message(name) => Some(name),
        _ => None,
    };
    let enumeration = match (field.element_kind(), field.type_name.as_deref()) {
        (FieldKind::Enum, Some(name)) => schema.enumeration(name).ok(),
        _ => None,
    };
    let element = |v: &Value| match (enumeration, v) {
        (Some(descriptor), Value::Number(n)) => enum_name(descriptor, n, v),
        _ => project_message(v, child, schema),
    };
    match value {
        Value::Sequence(items) if field.repeated => {
            Value::Sequence(items.iter().map(element).collect())
        }
        Value::Mapping(entries) if field.kind == FieldKind::Map => Value::Mapping(
            sorted_entries(entries)
                .into_iter()
                .map(|(k, v)| (k.clone(), element(v)))
                .collect(),
        ),
        value => element(value),
    }
}

/// Enum numbers are emitted as their value names, the form engines expect.
fn enum_name(descriptor: &EnumDescriptor, number: &serde_yaml::Number, raw: &Value) -> Value {
    number
        .as_i64()
        .and_then(|n| descriptor.name_of(n))
        .map_or_else(|| raw.clone(), Value::from)
}

fn project_message(value: &Value, message: Option<&str>, schema: &SchemaSet) -> Value {
    let (Some(message), Some(map)) = (message, value.as_mapping()) else {
        return sorted(value);
    };
    let hide_version = is_metadata_message(message);
    let mut out = Mapping::new();
    for (key, value) in sorted_entries(map) {
        if hide_version && key.as_str().is_some_and(|k| k == "version") {
            continue;
        }
        out.insert(key.clone(), project_field(value, key, Some(message), schema));
    }
    Value::Mapping(out)
}

/// Deep copy with every mapping sorted by key.
pub fn sorted(value: &Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            sorted_entries(map)
                .into_iter()
                .map(|(k, v)| (k.clone(), sorted(v)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sorted_entries(map: &Mapping) -> Vec<(&Value, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| sort_key(a).cmp(&sort_key(b)));
    entries
}

fn sort_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}
