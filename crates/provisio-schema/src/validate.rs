//! Strict schema validation of a manifest instance.
//!
//! Every violation carries the snake_case path of the offending field and
//! the identifier of the constraint it broke (`int32.gt`, `required`,
//! `string.min_len`, ...). Constraints other than `required` only apply to
//! values that are present.

use crate::catalog::ResourceKind;
use crate::descriptor::{is_opaque_message, FieldDescriptor, FieldKind, FieldRules, SchemaSet};
use crate::manifest::Manifest;
use serde_yaml::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub constraint: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.path, self.message, self.constraint)
    }
}

#[derive(Debug, Error)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manifest validation failed:")?;
        for v in &self.violations {
            write!(f, "\n  - {v}")?;
        }
        Ok(())
    }
}

pub fn validate(
    manifest: &Manifest,
    kind: &ResourceKind,
    schema: &SchemaSet,
) -> Result<(), ValidationError> {
    let mut checker = Checker {
        schema,
        violations: Vec::new(),
    };
    checker.message(manifest.value(), kind.message_name(), "");
    if checker.violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            violations: checker.violations,
        })
    }
}

struct Checker<'a> {
    schema: &'a SchemaSet,
    violations: Vec<Violation>,
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

impl Checker<'_> {
    fn report(&mut self, path: &str, constraint: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.to_owned(),
            constraint: constraint.into(),
            message: message.into(),
        });
    }

    fn message(&mut self, value: &Value, message: &str, path: &str) {
        let Ok(descriptor) = self.schema.message(message) else {
            self.report(path, "type", format!("message '{message}' is not defined"));
            return;
        };
        let Some(map) = value.as_mapping() else {
            self.report(path, "type", "expected an object");
            return;
        };

        for key in map.keys() {
            let Some(key) = key.as_str() else {
                self.report(path, "type", "object keys must be strings");
                continue;
            };
            if descriptor.field_for_key(key).is_none() {
                self.report(&join(path, key), "unknown_field", "unknown field");
            }
        }

        for field in &descriptor.fields {
            let field_path = join(path, &field.name);
            let snake = map.get(field.name.as_str());
            let camel = map.get(field.json_name().as_str());
            if snake.is_some() && camel.is_some() && field.name != field.json_name() {
                self.report(&field_path, "duplicate", "field is set under both spellings");
            }
            match snake.or(camel).filter(|v| !v.is_null()) {
                Some(value) => self.field(value, field, message, &field_path),
                None if field.rules.required => {
                    self.report(&field_path, "required", "value is required");
                }
                None => {}
            }
        }
    }

    fn field(&mut self, value: &Value, field: &FieldDescriptor, message: &str, path: &str) {
        let rules = &field.rules;
        if field.kind == FieldKind::Map {
            let Some(entries) = value.as_mapping() else {
                self.report(path, "type", "expected an object");
                return;
            };
            self.count(entries.len(), rules, "map", path);
            for (key, entry) in entries {
                let Some(key) = key.as_str() else {
                    self.report(path, "type", "map keys must be strings");
                    continue;
                };
                self.element(entry, field, message, &join(path, key));
            }
            return;
        }
        if field.repeated {
            let Some(items) = value.as_sequence() else {
                self.report(path, "type", "expected a list");
                return;
            };
            self.count(items.len(), rules, "repeated", path);
            for (i, item) in items.iter().enumerate() {
                self.element(item, field, message, &format!("{path}[{i}]"));
            }
            return;
        }
        self.element(value, field, message, path);
    }

    fn count(&mut self, len: usize, rules: &FieldRules, prefix: &str, path: &str) {
        let unit = if prefix == "map" { "pairs" } else { "items" };
        if rules.required && len == 0 {
            self.report(path, "required", "value is required");
        }
        if let Some(min) = rules.min_items {
            if len < min {
                self.report(
                    path,
                    format!("{prefix}.min_{unit}"),
                    format!("value must contain at least {min} {unit}"),
                );
            }
        }
        if let Some(max) = rules.max_items {
            if len > max {
                self.report(
                    path,
                    format!("{prefix}.max_{unit}"),
                    format!("value must contain at most {max} {unit}"),
                );
            }
        }
    }

    fn element(&mut self, value: &Value, field: &FieldDescriptor, message: &str, path: &str) {
        let kind = field.element_kind();
        let rules = &field.rules;
        // Element-level `required` is meaningless for list items and map values.
        let required = rules.required && !field.repeated && field.kind != FieldKind::Map;
        match kind {
            FieldKind::Message => {
                let Some(type_name) = field.type_name.as_deref() else {
                    self.report(path, "type", format!("field has no message type in '{message}'"));
                    return;
                };
                match type_name {
                    "google.protobuf.Struct" if !value.is_mapping() => {
                        self.report(path, "type", "expected an object");
                    }
                    "google.protobuf.ListValue" if !value.is_sequence() => {
                        self.report(path, "type", "expected a list");
                    }
                    name if is_opaque_message(name) => {}
                    name => self.message(value, name, path),
                }
            }
            FieldKind::Enum => self.enumeration(value, field, path),
            FieldKind::String | FieldKind::Bytes => {
                let Some(s) = value.as_str() else {
                    self.report(path, "type", "expected a string");
                    return;
                };
                self.string(s, rules, required, path);
            }
            FieldKind::Bool => match value.as_bool() {
                Some(b) => {
                    if required && !b {
                        self.report(path, "required", "value is required");
                    }
                }
                None => self.report(path, "type", "expected a boolean"),
            },
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Uint32 | FieldKind::Uint64 => {
                match integer(value, kind) {
                    Ok(n) => self.number(n, kind, rules, required, path),
                    Err(reason) => self.report(path, "type", reason),
                }
            }
            FieldKind::Float | FieldKind::Double => match float(value) {
                Some(n) => self.number(n, kind, rules, required, path),
                None => self.report(path, "type", "expected a number"),
            },
            FieldKind::Map | FieldKind::Group => {
                self.report(
                    path,
                    "type",
                    format!("unsupported field kind '{}'", kind.as_str()),
                );
            }
        }
    }

    fn enumeration(&mut self, value: &Value, field: &FieldDescriptor, path: &str) {
        let enum_name = field.type_name.as_deref().unwrap_or_default();
        let Ok(descriptor) = self.schema.enumeration(enum_name) else {
            self.report(path, "type", format!("enum '{enum_name}' is not defined"));
            return;
        };
        let name = match value {
            Value::String(s) if descriptor.contains(s) => Some(s.as_str()),
            Value::String(s) => {
                self.report(
                    path,
                    "type",
                    format!("'{s}' is not a value of enum {enum_name}"),
                );
                return;
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => descriptor.name_of(i),
                None => {
                    self.report(path, "type", "expected an enum value name or number");
                    return;
                }
            },
            _ => {
                self.report(path, "type", "expected an enum value name or number");
                return;
            }
        };
        match name {
            None if field.rules.defined_only => self.report(
                path,
                "enum.defined_only",
                "value must be one of the defined enum values",
            ),
            Some(n) if field.rules.required && !field.repeated && descriptor.name_of(0) == Some(n) => {
                self.report(path, "required", "value is required");
            }
            _ => {}
        }
    }

    fn string(&mut self, s: &str, rules: &FieldRules, required: bool, path: &str) {
        if required && s.is_empty() {
            self.report(path, "required", "value is required");
        }
        let len = s.chars().count();
        if let Some(min) = rules.min_len {
            if len < min {
                self.report(
                    path,
                    "string.min_len",
                    format!("value length must be at least {min} characters"),
                );
            }
        }
        if let Some(max) = rules.max_len {
            if len > max {
                self.report(
                    path,
                    "string.max_len",
                    format!("value length must be at most {max} characters"),
                );
            }
        }
        if let Some(prefix) = &rules.prefix {
            if !s.starts_with(prefix.as_str()) {
                self.report(
                    path,
                    "string.prefix",
                    format!("value does not have prefix `{prefix}`"),
                );
            }
        }
        if !rules.one_of.is_empty() && !rules.one_of.iter().any(|v| v == s) {
            self.report(
                path,
                "string.in",
                format!("value must be in list [{}]", rules.one_of.join(", ")),
            );
        }
    }

    #[allow(clippy::float_cmp)]
    fn number(&mut self, n: f64, kind: FieldKind, rules: &FieldRules, required: bool, path: &str) {
        let kind = kind.as_str();
        if required && n == 0.0 {
            self.report(path, "required", "value is required");
        }
        let checks = [
            (rules.gt, "gt", "greater than", n > rules.gt.unwrap_or_default()),
            (rules.gte, "gte", "greater than or equal to", n >= rules.gte.unwrap_or_default()),
            (rules.lt, "lt", "less than", n < rules.lt.unwrap_or_default()),
            (rules.lte, "lte", "less than or equal to", n <= rules.lte.unwrap_or_default()),
        ];
        for (bound, id, text, ok) in checks {
            if let Some(bound) = bound {
                if !ok {
                    self.report(
                        path,
                        format!("{kind}.{id}"),
                        format!("value must be {text} {bound}"),
                    );
                }
            }
        }
    }
}

/// Integers may be written as YAML numbers or as decimal strings.
#[allow(clippy::float_cmp)]
fn integer(value: &Value, kind: FieldKind) -> Result<f64, String> {
    let parsed: Option<i128> = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 1e19)
                    .map(|f| f as i128)
            }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    let Some(n) = parsed else {
        return Err("expected an integer".to_owned());
    };
    let in_range = match kind {
        FieldKind::Int32 => i32::try_from(n).is_ok(),
        FieldKind::Int64 => i64::try_from(n).is_ok(),
        FieldKind::Uint32 => u32::try_from(n).is_ok(),
        _ => u64::try_from(n).is_ok(),
    };
    if in_range {
        Ok(n as f64)
    } else {
        Err(format!("value out of range for {}", kind.as_str()))
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KindCatalog;

    fn check(yaml: &str) -> Result<(), ValidationError> {
        let catalog = KindCatalog::builtin().unwrap();
        let manifest = Manifest::parse(yaml).unwrap();
        let kind = manifest.resource_kind(&catalog).unwrap();
        validate(&manifest, kind, catalog.schema())
    }

    fn violations(yaml: &str) -> Vec<Violation> {
        check(yaml).unwrap_err().violations
    }

    const ECS: &str = r"
apiVersion: aws.provisio.dev/v1
kind: AwsEcsService
metadata:
  name: web
spec:
  clusterArn: arn:aws:ecs:us-east-1:123:cluster/main
  container:
    image: nginx:1.27
    port: 80
";

    #[test]
    fn valid_manifest_passes() {
        check(ECS).unwrap();
    }

    #[test]
    fn zero_port_fails_naming_health_check_port() {
        let yaml = format!("{ECS}  healthCheck:\n    port: 0\n");
        let v = violations(&yaml);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].path, "spec.health_check.port");
        assert_eq!(v[0].constraint, "int32.gt");
        let err = check(&yaml).unwrap_err().to_string();
        assert!(err.contains("health_check.port"));
        assert!(err.contains("greater than 0"));
    }

    #[test]
    fn missing_required_field() {
        let v = violations(
            "apiVersion: aws.provisio.dev/v1\nkind: AwsEcsService\nmetadata: {name: web}\nspec:\n  container: {image: x}\n",
        );
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].path, "spec.cluster_arn");
        assert_eq!(v[0].constraint, "required");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = format!("{ECS}  colour: blue\n");
        let v = violations(&yaml);
        assert_eq!(v[0].path, "spec.colour");
        assert_eq!(v[0].constraint, "unknown_field");
    }

    #[test]
    fn type_mismatches() {
        let yaml = format!("{ECS}  desiredCount: lots\n  subnets: subnet-a\n");
        let v = violations(&yaml);
        let paths: Vec<_> = v.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"spec.desired_count"));
        assert!(paths.contains(&"spec.subnets"));
        assert!(v.iter().all(|v| v.constraint == "type"));
    }

    #[test]
    fn wrong_api_version() {
        let yaml = ECS.replace("aws.provisio.dev/v1", "aws.provisio.dev/v2");
        let v = violations(&yaml);
        assert_eq!(v[0].path, "api_version");
        assert_eq!(v[0].constraint, "string.in");
    }

    #[test]
    fn string_prefix_and_lengths() {
        let yaml = ECS.replace("arn:aws:ecs", "aws:ecs");
        assert_eq!(violations(&yaml)[0].constraint, "string.prefix");

        let long = "x".repeat(64);
        let yaml = ECS.replace("name: web", &format!("name: {long}"));
        let v = violations(&yaml);
        assert_eq!(v[0].path, "metadata.name");
        assert_eq!(v[0].constraint, "string.max_len");
    }

    #[test]
    fn repeated_min_items_and_element_paths() {
        let v = violations(
            "apiVersion: aws.provisio.dev/v1\nkind: AwsVpc\nmetadata: {name: v}\nspec:\n  vpcCidr: 10.0.0.0/16\n  availabilityZones: []\n  subnetsPerAvailabilityZone: 20\n",
        );
        let ids: Vec<_> = v.iter().map(|v| v.constraint.as_str()).collect();
        assert_eq!(ids, ["repeated.min_items", "int32.lte"]);

        let v = violations(
            "apiVersion: aws.provisio.dev/v1\nkind: AwsVpc\nmetadata: {name: v}\nspec:\n  vpcCidr: 10.0.0.0/16\n  availabilityZones: [a, 3]\n",
        );
        assert_eq!(v[0].path, "spec.availability_zones[1]");
    }

    #[test]
    fn enums_by_name_and_number() {
        let base = "apiVersion: gcp.provisio.dev/v1\nkind: GcpGkeCluster\nmetadata: {name: g}\nspec:\n  clusterProjectId: p\n  region: r\n";
        check(&format!("{base}  releaseChannel: stable\n")).unwrap();
        check(&format!("{base}  releaseChannel: 2\n")).unwrap();
        let v = violations(&format!("{base}  releaseChannel: 9\n"));
        assert_eq!(v[0].constraint, "enum.defined_only");
        let v = violations(&format!("{base}  releaseChannel: nightly\n"));
        assert_eq!(v[0].constraint, "type");
    }

    #[test]
    fn integer_strings_and_ranges() {
        let base = "apiVersion: gcp.provisio.dev/v1\nkind: GcpGkeCluster\nmetadata: {name: g}\nspec:\n  clusterProjectId: p\n  region: r\n";
        check(&format!("{base}  autoscaling: {{cpuMaxCores: \"64\"}}\n")).unwrap();
        let v = violations(&format!("{base}  nodePools: [{{name: a, minNodeCount: -1}}]\n"));
        assert_eq!(v[0].path, "spec.node_pools[0].min_node_count");
        assert!(v[0].message.contains("out of range for uint32"));
    }

    #[test]
    fn all_violations_are_collected() {
        let v = violations(
            "apiVersion: aws.provisio.dev/v1\nkind: AwsEcsService\nmetadata: {name: ''}\nspec:\n  container: {port: 0}\n",
        );
        let paths: Vec<_> = v.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"metadata.name"));
        assert!(paths.contains(&"spec.cluster_arn"));
        assert!(paths.contains(&"spec.container.image"));
        assert!(paths.contains(&"spec.container.port"));
    }

    #[test]
    fn map_values_are_type_checked() {
        let yaml = format!("{ECS}  env:\n    LOG_LEVEL: debug\n    NESTED: {{a: b}}\n");
        let v = violations(&yaml);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].path, "spec.env.NESTED");
    }

    #[test]
    fn status_outputs_accept_free_form_objects() {
        let yaml = format!("{ECS}status:\n  outputs:\n    url: https://x\n    nested: {{a: [1, 2]}}\n");
        check(&yaml).unwrap();
    }
}
