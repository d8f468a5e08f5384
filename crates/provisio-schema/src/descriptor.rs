//! Typed resource schemas.
//!
//! A [`SchemaSet`] holds message and enum descriptors keyed by their fully
//! qualified names. Message fields reference other messages by name, so a
//! schema may be self-referential; consumers that walk it must track the
//! messages they are expanding.

use crate::case::to_lower_camel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Well-known dynamically typed containers. Their contents are open JSON,
/// so they are treated as opaque leaves and never expanded.
pub const OPAQUE_MESSAGES: &[&str] = &[
    "google.protobuf.Struct",
    "google.protobuf.Value",
    "google.protobuf.ListValue",
];

pub fn is_opaque_message(name: &str) -> bool {
    OPAQUE_MESSAGES.contains(&name)
}

/// Messages whose name ends with `metadata` hide their `version` field
/// from engine input.
pub fn is_metadata_message(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("metadata")
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported field kind '{kind}' for field '{field}' in message '{message}'")]
    UnsupportedFieldKind {
        message: String,
        field: String,
        kind: String,
    },
    #[error("message '{0}' is not defined in the schema")]
    UnknownMessage(String),
    #[error("enum '{0}' is not defined in the schema")]
    UnknownEnum(String),
    #[error("field '{field}' in message '{message}' is missing its type name")]
    MissingTypeName { message: String, field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bytes,
    Enum,
    Message,
    Map,
    Group,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
            Self::Message => "message",
            Self::Map => "map",
            Self::Group => "group",
        }
    }
}

/// Declarative constraints attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRules {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub gt: Option<f64>,
    #[serde(default)]
    pub gte: Option<f64>,
    #[serde(default)]
    pub lt: Option<f64>,
    #[serde(default)]
    pub lte: Option<f64>,
    #[serde(default)]
    pub min_len: Option<usize>,
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default, rename = "in")]
    pub one_of: Vec<String>,
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub defined_only: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Message or enum name for `message`/`enum` fields, and for `map`
    /// fields whose values are messages or enums.
    #[serde(default)]
    pub type_name: Option<String>,
    /// Value kind of a `map` field. Keys are always strings.
    #[serde(default)]
    pub value: Option<FieldKind>,
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Default applied to an unset scalar, in override syntax.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub rules: FieldRules,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: None,
            value: None,
            repeated: false,
            description: None,
            default: None,
            rules: FieldRules::default(),
        }
    }

    pub fn message(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldKind::Message);
        field.type_name = Some(type_name.into());
        field
    }

    pub fn json_name(&self) -> String {
        to_lower_camel(&self.name)
    }

    /// Whether a manifest key refers to this field.
    pub fn matches_key(&self, key: &str) -> bool {
        key == self.name || key == self.json_name()
    }

    /// The kind of a single element: the map value kind for maps, the field
    /// kind otherwise.
    pub fn element_kind(&self) -> FieldKind {
        match self.kind {
            FieldKind::Map => self.value.unwrap_or(FieldKind::String),
            kind => kind,
        }
    }

    /// Type name required by `message`/`enum` elements.
    pub fn require_type_name(&self, message: &str) -> Result<&str, SchemaError> {
        self.type_name
            .as_deref()
            .ok_or_else(|| SchemaError::MissingTypeName {
                message: message.to_owned(),
                field: self.name.clone(),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDescriptor {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn field_for_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.matches_key(key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDescriptor {
    pub values: Vec<String>,
}

impl EnumDescriptor {
    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|v| v == name)
    }

    /// Value name for an enum number; numbers follow declaration order.
    pub fn name_of(&self, number: i64) -> Option<&str> {
        usize::try_from(number)
            .ok()
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSet {
    #[serde(default)]
    pub messages: BTreeMap<String, MessageDescriptor>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDescriptor>,
}

impl SchemaSet {
    pub fn message(&self, name: &str) -> Result<&MessageDescriptor, SchemaError> {
        self.messages
            .get(name)
            .ok_or_else(|| SchemaError::UnknownMessage(name.to_owned()))
    }

    pub fn enumeration(&self, name: &str) -> Result<&EnumDescriptor, SchemaError> {
        self.enums
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEnum(name.to_owned()))
    }

    /// Merge another set into this one. Later definitions win.
    pub fn extend(&mut self, other: SchemaSet) {
        self.messages.extend(other.messages);
        self.enums.extend(other.enums);
    }

    /// Check that every referenced message and enum is defined.
    pub fn check_references(&self) -> Result<(), SchemaError> {
        for (message_name, message) in &self.messages {
            for field in &message.fields {
                match field.element_kind() {
                    FieldKind::Message => {
                        let name = field.require_type_name(message_name)?;
                        if !is_opaque_message(name) {
                            self.message(name)?;
                        }
                    }
                    FieldKind::Enum => {
                        self.enumeration(field.require_type_name(message_name)?)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r"
messages:
  demo.HealthCheck:
    fields:
      - name: port
        type: int32
        rules: { gt: 0 }
      - name: path
        type: string
  demo.Spec:
    fields:
      - name: health_check
        type: message
        type_name: demo.HealthCheck
      - name: tier
        type: enum
        type_name: demo.Tier
      - name: tags
        type: map
        value: string
enums:
  demo.Tier:
    values: [tier_unspecified, standard, premium]
";

    #[test]
    fn parse_schema_yaml() {
        let set: SchemaSet = serde_yaml::from_str(SCHEMA).unwrap();
        set.check_references().unwrap();
        let spec = set.message("demo.Spec").unwrap();
        let hc = spec.field_for_key("healthCheck").unwrap();
        assert_eq!(hc.name, "health_check");
        assert_eq!(hc.kind, FieldKind::Message);
        let port = &set.message("demo.HealthCheck").unwrap().fields[0];
        assert_eq!(port.rules.gt, Some(0.0));
    }

    #[test]
    fn dangling_reference_is_reported() {
        let mut set: SchemaSet = serde_yaml::from_str(SCHEMA).unwrap();
        set.messages.remove("demo.HealthCheck");
        assert!(matches!(
            set.check_references(),
            Err(SchemaError::UnknownMessage(name)) if name == "demo.HealthCheck"
        ));
    }

    #[test]
    fn opaque_references_need_no_definition() {
        let mut set = SchemaSet::default();
        set.messages.insert(
            "demo.Outputs".into(),
            MessageDescriptor {
                description: None,
                fields: vec![FieldDescriptor::message("values", "google.protobuf.Struct")],
            },
        );
        set.check_references().unwrap();
    }

    #[test]
    fn unknown_field_attribute_is_rejected() {
        let yaml = "messages:\n  m:\n    fields:\n      - name: a\n        type: string\n        colour: red\n";
        assert!(serde_yaml::from_str::<SchemaSet>(yaml).is_err());
    }

    #[test]
    fn metadata_message_detection() {
        assert!(is_metadata_message("shared.CloudResourceMetadata"));
        assert!(is_metadata_message("demo.METADATA"));
        assert!(!is_metadata_message("demo.MetadataSpec"));
    }

    #[test]
    fn enum_lookup_by_number() {
        let e = EnumDescriptor {
            values: vec!["unspecified".into(), "standard".into()],
        };
        assert_eq!(e.name_of(1), Some("standard"));
        assert_eq!(e.name_of(2), None);
        assert_eq!(e.name_of(-1), None);
    }
}
