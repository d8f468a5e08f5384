//! Schema-declared defaults for unset scalar fields.
//!
//! Only messages already present in the manifest are visited; a default
//! never materializes a message the operator left out.

use crate::catalog::ResourceKind;
use crate::descriptor::{is_opaque_message, FieldKind, SchemaSet};
use crate::manifest::Manifest;
use crate::overrides::{coerce_scalar, CoerceError};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid default for {message}.{field}: {source}")]
pub struct DefaultError {
    pub message: String,
    pub field: String,
    pub source: CoerceError,
}

/// Fill unset fields of `manifest` with their declared defaults. Returns the
/// number of fields filled.
pub fn apply_defaults(
    manifest: &mut Manifest,
    kind: &ResourceKind,
    schema: &SchemaSet,
) -> Result<usize, DefaultError> {
    let mut filled = 0;
    visit(
        manifest.value_mut(),
        kind.message_name(),
        schema,
        &mut filled,
    )?;
    if filled > 0 {
        tracing::debug!("applied {filled} schema default(s) to {}", kind.kind);
    }
    Ok(filled)
}

fn visit(
    value: &mut Value,
    message: &str,
    schema: &SchemaSet,
    filled: &mut usize,
) -> Result<(), DefaultError> {
    let Ok(descriptor) = schema.message(message) else {
        return Ok(());
    };
    let Some(map) = value.as_mapping_mut() else {
        return Ok(());
    };
    for field in &descriptor.fields {
        let present_key = present_key(map, &field.name, &field.json_name());
        if let Some(default) = &field.default {
            if present_key.is_none() && !field.repeated && field.kind != FieldKind::Map {
                let coerced =
                    coerce_scalar(default, field, schema).map_err(|source| DefaultError {
                        message: message.to_owned(),
                        field: field.name.clone(),
                        source,
                    })?;
                map.insert(Value::String(field.json_name()), coerced);
                *filled += 1;
                continue;
            }
        }

        if field.element_kind() != FieldKind::Message {
            continue;
        }
        let (Some(key), Some(type_name)) = (present_key, field.type_name.as_deref()) else {
            continue;
        };
        if is_opaque_message(type_name) {
            continue;
        }
        let Some(child) = map.get_mut(key.as_str()) else {
            continue;
        };
        match child {
            Value::Sequence(items) if field.repeated => {
                for item in items {
                    visit(item, type_name, schema, filled)?;
                }
            }
            Value::Mapping(entries) if field.kind == FieldKind::Map => {
                for (_, entry) in entries.iter_mut() {
                    visit(entry, type_name, schema, filled)?;
                }
            }
            child => visit(child, type_name, schema, filled)?,
        }
    }
    Ok(())
}

/// Key under which a field is set, treating null as unset.
fn present_key(map: &Mapping, snake: &str, camel: &str) -> Option<String> {
    [snake, camel]
        .into_iter()
        .find(|k| map.get(*k).is_some_and(|v| !v.is_null()))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KindCatalog;

    fn redis(spec: &str) -> (Manifest, KindCatalog) {
        let catalog = KindCatalog::builtin().unwrap();
        let m = Manifest::parse(&format!(
            "apiVersion: kubernetes.provisio.dev/v1\nkind: KubernetesRedis\nmetadata:\n  name: r\nspec:\n{spec}"
        ))
        .unwrap();
        (m, catalog)
    }

    #[test]
    fn fills_unset_fields() {
        let (mut m, catalog) = redis("  container:\n    isPersistenceEnabled: true\n");
        let kind = catalog.get("KubernetesRedis").unwrap().clone();
        let filled = apply_defaults(&mut m, &kind, catalog.schema()).unwrap();
        let spec = &m.value()["spec"];
        assert_eq!(spec["namespace"], Value::from("redis"));
        assert_eq!(spec["container"]["replicas"], Value::from(1));
        assert_eq!(spec["container"]["diskSize"], Value::from("1Gi"));
        assert_eq!(filled, 3);
    }

    #[test]
    fn keeps_existing_values() {
        let (mut m, catalog) = redis("  namespace: cache\n  container:\n    replicas: 5\n");
        let kind = catalog.get("KubernetesRedis").unwrap().clone();
        apply_defaults(&mut m, &kind, catalog.schema()).unwrap();
        let spec = &m.value()["spec"];
        assert_eq!(spec["namespace"], Value::from("cache"));
        assert_eq!(spec["container"]["replicas"], Value::from(5));
    }

    #[test]
    fn absent_messages_stay_absent() {
        let (mut m, catalog) = redis("  namespace: cache\n");
        let kind = catalog.get("KubernetesRedis").unwrap().clone();
        apply_defaults(&mut m, &kind, catalog.schema()).unwrap();
        assert!(m.value()["spec"].get("container").is_none());
    }

    #[test]
    fn idempotent() {
        let (mut m, catalog) = redis("  container: {}\n");
        let kind = catalog.get("KubernetesRedis").unwrap().clone();
        apply_defaults(&mut m, &kind, catalog.schema()).unwrap();
        let once = m.clone();
        assert_eq!(apply_defaults(&mut m, &kind, catalog.schema()).unwrap(), 0);
        assert_eq!(m, once);
    }

    #[test]
    fn repeated_message_elements_get_defaults() {
        let catalog = KindCatalog::builtin().unwrap();
        let mut m = Manifest::parse(
            "kind: GcpGkeCluster\nspec:\n  nodePools:\n    - name: a\n    - name: b\n      machineType: n2\n",
        )
        .unwrap();
        let kind = catalog.get("GcpGkeCluster").unwrap().clone();
        apply_defaults(&mut m, &kind, catalog.schema()).unwrap();
        let pools = &m.value()["spec"]["nodePools"];
        assert_eq!(pools[0]["machineType"], Value::from("e2-medium"));
        assert_eq!(pools[1]["machineType"], Value::from("n2"));
        assert_eq!(m.value()["spec"]["releaseChannel"], Value::from("regular"));
    }
}
