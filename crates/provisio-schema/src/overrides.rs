//! `path=value` mutations applied to a manifest before it is validated.
//!
//! Paths are resolved against the kind's schema, so every override lands on
//! a typed leaf and its raw string is coerced to that leaf's type. The
//! original manifest file is never written; a mutated copy goes to a temp
//! file that is removed when the returned [`ManifestFile`] is dropped.

use crate::catalog::KindCatalog;
use crate::descriptor::{is_opaque_message, FieldDescriptor, FieldKind, SchemaSet};
use crate::manifest::{Manifest, ManifestError};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("invalid override '{0}', expected <dotted.path>=<value>")]
    Syntax(String),
    #[error("override {path}: {reason}")]
    Path { path: String, reason: String },
    #[error("override {path}={raw}: {source}")]
    Coercion {
        path: String,
        raw: String,
        source: CoerceError,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("failed to write overridden manifest to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize overridden manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("expected a boolean (true or false)")]
    Bool,
    #[error("expected a base-10 integer")]
    Integer,
    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
    #[error("expected a finite number")]
    Float,
    #[error("'{value}' is not a value of enum {enum_name}")]
    EnumValue { enum_name: String, value: String },
    #[error("enum {0} is not defined in the schema")]
    UnknownEnum(String),
    #[error("{0} fields cannot be set from a string")]
    NotScalar(&'static str),
}

/// One `dotted.path=value` pair as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub path: String,
    pub raw: String,
}

impl FromStr for Override {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((path, raw)) if !path.trim().is_empty() => Ok(Self {
                path: path.trim().to_owned(),
                raw: raw.to_owned(),
            }),
            _ => Err(OverrideError::Syntax(s.to_owned())),
        }
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.path, self.raw)
    }
}

/// A manifest on disk, possibly a temp copy owned by this value.
#[derive(Debug)]
pub struct ManifestFile {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl ManifestFile {
    pub fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            temp: None,
        }
    }

    /// Take ownership of a temp file produced elsewhere, e.g. a built overlay.
    pub fn temporary(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temp(&self) -> bool {
        self.temp.is_some()
    }

    /// Keep a temp copy on disk past drop.
    pub fn retain(mut self) -> Result<PathBuf, std::io::Error> {
        if let Some(temp) = self.temp.take() {
            temp.keep().map_err(|e| e.error)?;
        }
        Ok(self.path.clone())
    }
}

/// Apply `overrides` to the manifest at `manifest_path`.
///
/// With no overrides the original path comes back untouched. Otherwise the
/// result is a temp file under `temp_dir`.
pub fn apply(
    manifest_path: &Path,
    overrides: &[Override],
    catalog: &KindCatalog,
    temp_dir: &Path,
) -> Result<ManifestFile, OverrideError> {
    if overrides.is_empty() {
        return Ok(ManifestFile::original(manifest_path));
    }
    let mut manifest = Manifest::from_file(manifest_path)?;
    apply_to(&mut manifest, overrides, catalog)?;
    let rendered = serde_yaml::to_string(manifest.value())?;

    let io_err = |source| OverrideError::Io {
        path: temp_dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(temp_dir).map_err(io_err)?;
    let mut file = tempfile::Builder::new()
        .prefix("manifest-")
        .suffix(".yaml")
        .tempfile_in(temp_dir)
        .map_err(io_err)?;
    file.write_all(rendered.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    tracing::debug!(
        "applied {} override(s) to {} -> {}",
        overrides.len(),
        manifest_path.display(),
        file.path().display()
    );
    Ok(ManifestFile::temporary(file.into_temp_path()))
}

/// Apply `overrides` in order to an in-memory manifest.
pub fn apply_to(
    manifest: &mut Manifest,
    overrides: &[Override],
    catalog: &KindCatalog,
) -> Result<(), OverrideError> {
    let message = manifest.resource_kind(catalog)?.message_name().to_owned();
    for ov in overrides {
        let segments: Vec<&str> = ov.path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(OverrideError::Path {
                path: ov.path.clone(),
                reason: "empty path segment".to_owned(),
            });
        }
        assign(
            manifest.value_mut(),
            catalog.schema(),
            &message,
            &segments,
            &ov.raw,
        )
        .map_err(|failure| match failure {
            Failure::Path(reason) => OverrideError::Path {
                path: ov.path.clone(),
                reason,
            },
            Failure::Coerce(source) => OverrideError::Coercion {
                path: ov.path.clone(),
                raw: ov.raw.clone(),
                source,
            },
        })?;
    }
    Ok(())
}

enum Failure {
    Path(String),
    Coerce(CoerceError),
}

impl From<CoerceError> for Failure {
    fn from(e: CoerceError) -> Self {
        Self::Coerce(e)
    }
}

fn assign(
    target: &mut Value,
    schema: &SchemaSet,
    message: &str,
    segments: &[&str],
    raw: &str,
) -> Result<(), Failure> {
    let descriptor = schema
        .message(message)
        .map_err(|e| Failure::Path(e.to_string()))?;
    let Some((segment, rest)) = segments.split_first() else {
        return Err(Failure::Path(format!("path ends at message '{message}'")));
    };
    let field = descriptor
        .field_for_key(segment)
        .ok_or_else(|| Failure::Path(format!("no field '{segment}' in message '{message}'")))?;
    let slot = field_slot(as_mapping(target, segment)?, field);

    if field.kind == FieldKind::Map {
        let Some((key, rest)) = rest.split_first() else {
            return Err(Failure::Path(format!(
                "map field '{}' needs a key, e.g. {}.<key>",
                field.name, field.name
            )));
        };
        let entries = as_mapping(slot, &field.name)?;
        let entry = entries
            .entry(Value::String((*key).to_owned()))
            .or_insert(Value::Null);
        return assign_element(entry, schema, field, message, rest, raw);
    }

    if field.repeated {
        let Some((index, rest)) = rest.split_first() else {
            return Err(Failure::Path(format!(
                "repeated field '{}' needs an element index",
                field.name
            )));
        };
        let index: usize = index.parse().map_err(|_| {
            Failure::Path(format!(
                "'{index}' is not an element index for repeated field '{}'",
                field.name
            ))
        })?;
        let items = slot.as_sequence_mut().ok_or_else(|| {
            Failure::Path(format!("repeated field '{}' has no elements", field.name))
        })?;
        let len = items.len();
        let item = items.get_mut(index).ok_or_else(|| {
            Failure::Path(format!(
                "index {index} out of range for '{}' ({len} elements)",
                field.name
            ))
        })?;
        return assign_element(item, schema, field, message, rest, raw);
    }

    assign_element(slot, schema, field, message, rest, raw)
}

fn assign_element(
    slot: &mut Value,
    schema: &SchemaSet,
    field: &FieldDescriptor,
    message: &str,
    rest: &[&str],
    raw: &str,
) -> Result<(), Failure> {
    if field.element_kind() == FieldKind::Message {
        let type_name = field
            .require_type_name(message)
            .map_err(|e| Failure::Path(e.to_string()))?;
        if is_opaque_message(type_name) {
            return Err(Failure::Path(format!(
                "'{}' holds free-form data and cannot be overridden by path",
                field.name
            )));
        }
        if rest.is_empty() {
            return Err(Failure::Path(format!(
                "'{}' is a message; extend the path to one of its fields",
                field.name
            )));
        }
        return assign(slot, schema, type_name, rest, raw);
    }
    if !rest.is_empty() {
        return Err(Failure::Path(format!(
            "'{}' is a {} field and has no sub-fields",
            field.name,
            field.element_kind().as_str()
        )));
    }
    *slot = coerce_scalar(raw, field, schema)?;
    Ok(())
}

/// Slot for `field`, reusing whichever spelling of the key is present and
/// inserting the lowerCamel name otherwise.
fn field_slot<'a>(map: &'a mut Mapping, field: &FieldDescriptor) -> &'a mut Value {
    let key = if map.contains_key(field.name.as_str()) {
        field.name.clone()
    } else {
        field.json_name()
    };
    map.entry(Value::String(key)).or_insert(Value::Null)
}

fn as_mapping<'a>(value: &'a mut Value, at: &str) -> Result<&'a mut Mapping, Failure> {
    if value.is_null() {
        *value = Value::Mapping(Mapping::new());
    }
    value
        .as_mapping_mut()
        .ok_or_else(|| Failure::Path(format!("expected a mapping at '{at}'")))
}

/// Coerce `raw` to the element type of `field`.
pub fn coerce_scalar(
    raw: &str,
    field: &FieldDescriptor,
    schema: &SchemaSet,
) -> Result<Value, CoerceError> {
    let kind = field.element_kind();
    match kind {
        FieldKind::String | FieldKind::Bytes => Ok(Value::String(raw.to_owned())),
        FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(CoerceError::Bool),
        },
        FieldKind::Int32 => {
            let n: i64 = raw.parse().map_err(|_| integer_error(raw, "int32"))?;
            i32::try_from(n).map_err(|_| CoerceError::OutOfRange("int32"))?;
            Ok(Value::Number(n.into()))
        }
        FieldKind::Int64 => {
            let n: i64 = raw.parse().map_err(|_| integer_error(raw, "int64"))?;
            Ok(Value::Number(n.into()))
        }
        FieldKind::Uint32 => {
            let n: u64 = raw.parse().map_err(|_| integer_error(raw, "uint32"))?;
            u32::try_from(n).map_err(|_| CoerceError::OutOfRange("uint32"))?;
            Ok(Value::Number(n.into()))
        }
        FieldKind::Uint64 => {
            let n: u64 = raw.parse().map_err(|_| integer_error(raw, "uint64"))?;
            Ok(Value::Number(n.into()))
        }
        FieldKind::Float | FieldKind::Double => {
            let f: f64 = raw.parse().map_err(|_| CoerceError::Float)?;
            if !f.is_finite() {
                return Err(CoerceError::Float);
            }
            Ok(Value::Number(f.into()))
        }
        FieldKind::Enum => {
            let enum_name = field.type_name.clone().unwrap_or_default();
            let descriptor = schema
                .enumeration(&enum_name)
                .map_err(|_| CoerceError::UnknownEnum(enum_name.clone()))?;
            if descriptor.contains(raw) {
                Ok(Value::String(raw.to_owned()))
            } else {
                Err(CoerceError::EnumValue {
                    enum_name,
                    value: raw.to_owned(),
                })
            }
        }
        FieldKind::Message | FieldKind::Map | FieldKind::Group => {
            Err(CoerceError::NotScalar(kind.as_str()))
        }
    }
}

/// Distinguish a well-formed integer that does not fit from garbage.
fn integer_error(raw: &str, kind: &'static str) -> CoerceError {
    if raw.parse::<i128>().is_ok() {
        CoerceError::OutOfRange(kind)
    } else {
        CoerceError::Integer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    const CATALOG: &str = r"
kinds:
  - { kind: DemoService, provider: aws, api_version: demo.provisio.dev/v1, spec: demo.Spec }
messages:
  demo.Spec:
    fields:
      - { name: name, type: string }
      - { name: region, type: string }
      - { name: enabled, type: bool }
      - { name: replicas, type: int32 }
      - { name: max_bytes, type: uint64 }
      - { name: ratio, type: double }
      - { name: tier, type: enum, type_name: demo.Tier }
      - { name: health_check, type: message, type_name: demo.HealthCheck }
      - { name: ports, type: message, type_name: demo.Port, repeated: true }
      - { name: env, type: map, value: string }
      - { name: extra, type: message, type_name: google.protobuf.Struct }
  demo.HealthCheck:
    fields:
      - { name: port, type: int32 }
      - { name: path, type: string }
  demo.Port:
    fields:
      - { name: number, type: int32 }
enums:
  demo.Tier:
    values: [tier_unspecified, standard, premium]
";

    const MANIFEST: &str = r"
apiVersion: demo.provisio.dev/v1
kind: DemoService
metadata:
  name: demo
spec:
  name: foo
  region: us-east
  ports:
    - number: 80
";

    fn catalog() -> KindCatalog {
        KindCatalog::from_yaml_str(CATALOG, "test").unwrap()
    }

    fn ov(s: &str) -> Override {
        s.parse().unwrap()
    }

    fn apply_str(overrides: &[&str]) -> Result<Manifest, OverrideError> {
        let mut m = Manifest::parse(MANIFEST).unwrap();
        let overrides: Vec<_> = overrides.iter().map(|s| ov(s)).collect();
        apply_to(&mut m, &overrides, &catalog())?;
        Ok(m)
    }

    fn spec(m: &Manifest) -> &Value {
        &m.value()["spec"]
    }

    #[test]
    fn no_overrides_returns_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        let out = apply(&path, &[], &catalog(), dir.path()).unwrap();
        assert_eq!(out.path(), path);
        assert!(!out.is_temp());
    }

    #[test]
    fn overrides_write_a_temp_copy_and_leave_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        let tmp_dir = dir.path().join("tmp");

        let out = apply(&path, &[ov("spec.region=us-west")], &catalog(), &tmp_dir).unwrap();
        assert!(out.is_temp());
        assert_ne!(out.path(), path);
        let written = Manifest::from_file(out.path()).unwrap();
        assert_eq!(spec(&written)["region"], Value::from("us-west"));
        assert_eq!(spec(&written)["name"], Value::from("foo"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MANIFEST);

        let temp_path = out.path().to_path_buf();
        drop(out);
        assert!(!temp_path.exists());
    }

    #[test]
    fn retained_temp_survives_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        let out = apply(&path, &[ov("spec.region=x")], &catalog(), dir.path()).unwrap();
        let kept = out.retain().unwrap();
        assert!(kept.exists());
    }

    #[test]
    fn bool_coercion_is_case_insensitive() {
        for (raw, expected) in [("true", true), ("TRUE", true), ("False", false)] {
            let m = apply_str(&[&format!("spec.enabled={raw}")]).unwrap();
            assert_eq!(spec(&m)["enabled"], Value::Bool(expected));
        }
    }

    #[test]
    fn unparsable_bool_is_path_scoped() {
        let err = apply_str(&["spec.enabled=yes"]).unwrap_err();
        match err {
            OverrideError::Coercion { path, raw, source } => {
                assert_eq!(path, "spec.enabled");
                assert_eq!(raw, "yes");
                assert_eq!(source, CoerceError::Bool);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn integer_coercion_and_range() {
        let m = apply_str(&["spec.replicas=3"]).unwrap();
        assert_eq!(spec(&m)["replicas"], Value::from(3));

        let err = apply_str(&["spec.replicas=three"]).unwrap_err();
        assert!(err.to_string().contains("spec.replicas=three"));
        assert!(matches!(
            apply_str(&["spec.replicas=3000000000"]),
            Err(OverrideError::Coercion { source: CoerceError::OutOfRange("int32"), .. })
        ));
        assert!(matches!(
            apply_str(&["spec.max_bytes=-1"]),
            Err(OverrideError::Coercion { source: CoerceError::OutOfRange("uint64"), .. })
        ));
    }

    #[test]
    fn float_and_enum_coercion() {
        let m = apply_str(&["spec.ratio=0.25", "spec.tier=premium"]).unwrap();
        assert_eq!(spec(&m)["ratio"], Value::from(0.25));
        assert_eq!(spec(&m)["tier"], Value::from("premium"));

        let err = apply_str(&["spec.tier=gold"]).unwrap_err();
        assert!(err.to_string().contains("not a value of enum demo.Tier"));
    }

    #[test]
    fn nested_messages_are_created_with_camel_keys() {
        let m = apply_str(&["spec.health_check.port=8080"]).unwrap();
        assert_eq!(spec(&m)["healthCheck"]["port"], Value::from(8080));
        let m = apply_str(&["spec.healthCheck.path=/ready"]).unwrap();
        assert_eq!(spec(&m)["healthCheck"]["path"], Value::from("/ready"));
    }

    #[test]
    fn map_keys_and_list_indices() {
        let m = apply_str(&["spec.env.LOG_LEVEL=debug", "spec.ports.0.number=443"]).unwrap();
        assert_eq!(spec(&m)["env"]["LOG_LEVEL"], Value::from("debug"));
        assert_eq!(spec(&m)["ports"][0]["number"], Value::from(443));

        let err = apply_str(&["spec.ports.5.number=1"]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn bad_paths_are_reported() {
        for path in [
            "spec.nope=1",
            "spec.region.sub=1",
            "spec.health_check=1",
            "spec.env=1",
            "spec.extra.key=1",
            "spec..region=1",
        ] {
            let err = apply_str(&[path]).unwrap_err();
            assert!(matches!(err, OverrideError::Path { .. }), "{path}: {err}");
        }
    }

    #[test]
    fn later_overrides_win() {
        let m = apply_str(&["spec.region=a", "spec.region=b"]).unwrap();
        assert_eq!(spec(&m)["region"], Value::from("b"));
    }

    #[test]
    fn override_syntax() {
        assert_eq!(ov("a.b=c=d").raw, "c=d");
        assert_eq!(ov("a.b=").raw, "");
        assert!("novalue".parse::<Override>().is_err());
        assert!("=x".parse::<Override>().is_err());
    }
}
