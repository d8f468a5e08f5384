//! Registry of resource kinds and their schemas.
//!
//! A [`KindCatalog`] is built explicitly and handed to whoever needs kind
//! lookups. The embedded built-in catalog covers a handful of kinds; more
//! can be merged in from YAML catalog files.

use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, SchemaError, SchemaSet,
};
use crate::types::KindName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const METADATA_MESSAGE: &str = "shared.CloudResourceMetadata";
pub const STATUS_MESSAGE: &str = "shared.CloudResourceStatus";

const SHARED_MESSAGES: &str = include_str!("../catalog/shared.yaml");
const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog {origin}: {source}")]
    Parse {
        origin: String,
        source: serde_yaml::Error,
    },
    #[error("kind '{0}' is declared more than once")]
    DuplicateKind(String),
    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Atlas,
    Auth0,
    Aws,
    Azure,
    Cloudflare,
    Confluent,
    Gcp,
    Kubernetes,
    Snowflake,
}

impl Provider {
    pub const ALL: [Provider; 9] = [
        Self::Atlas,
        Self::Auth0,
        Self::Aws,
        Self::Azure,
        Self::Cloudflare,
        Self::Confluent,
        Self::Gcp,
        Self::Kubernetes,
        Self::Snowflake,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atlas => "atlas",
            Self::Auth0 => "auth0",
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Cloudflare => "cloudflare",
            Self::Confluent => "confluent",
            Self::Gcp => "gcp",
            Self::Kubernetes => "kubernetes",
            Self::Snowflake => "snowflake",
        }
    }

    /// Top-level Stack Input key carrying this provider's credentials.
    pub fn credential_key(self) -> String {
        format!("{}ProviderConfig", self.as_str())
    }

    /// File name looked up inside an input directory.
    pub fn credential_file_name(self) -> String {
        format!("{}-provider-config.yaml", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceKind {
    pub kind: KindName,
    pub provider: Provider,
    pub api_version: String,
    /// Name of the kind's spec message.
    pub spec: String,
    /// Name of the full resource message; derived from `kind` when omitted.
    #[serde(default)]
    pub message: Option<String>,
}

impl ResourceKind {
    pub fn message_name(&self) -> &str {
        self.message.as_deref().unwrap_or(self.kind.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    #[serde(default)]
    kinds: Vec<ResourceKind>,
    #[serde(default)]
    messages: BTreeMap<String, MessageDescriptor>,
    #[serde(default)]
    enums: BTreeMap<String, EnumDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct KindCatalog {
    kinds: BTreeMap<KindName, ResourceKind>,
    schema: SchemaSet,
}

impl KindCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG, "<builtin>")
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    pub fn from_yaml_str(input: &str, origin: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_yaml::from_str(input).map_err(|source| CatalogError::Parse {
                origin: origin.to_owned(),
                source,
            })?;
        let mut schema: SchemaSet =
            serde_yaml::from_str(SHARED_MESSAGES).map_err(|source| CatalogError::Parse {
                origin: "<shared>".to_owned(),
                source,
            })?;
        schema.extend(SchemaSet {
            messages: doc.messages,
            enums: doc.enums,
        });
        let mut catalog = Self {
            kinds: BTreeMap::new(),
            schema,
        };
        for kind in doc.kinds {
            if catalog.kinds.contains_key(&kind.kind) {
                return Err(CatalogError::DuplicateKind(kind.kind.into_inner()));
            }
            catalog.insert(kind);
        }
        catalog.schema.check_references()?;
        Ok(catalog)
    }

    /// Merge another catalog into this one; its kinds and messages replace
    /// same-named entries.
    pub fn merge(&mut self, other: KindCatalog) -> Result<(), CatalogError> {
        self.schema.extend(other.schema);
        for (_, kind) in other.kinds {
            self.insert(kind);
        }
        self.schema.check_references()?;
        Ok(())
    }

    fn insert(&mut self, kind: ResourceKind) {
        let name = kind.message_name().to_owned();
        if !self.schema.messages.contains_key(&name) {
            self.schema
                .messages
                .insert(name, resource_message(&kind));
        }
        self.kinds.insert(kind.kind.clone(), kind);
    }

    pub fn lookup(&self, kind: &str) -> Option<&ResourceKind> {
        self.kinds.get(&KindName::from(kind))
    }

    pub fn get(&self, kind: &str) -> Result<&ResourceKind, CatalogError> {
        self.lookup(kind)
            .ok_or_else(|| CatalogError::UnknownKind(kind.to_owned()))
    }

    pub fn provider_of(&self, kind: &str) -> Option<Provider> {
        self.lookup(kind).map(|k| k.provider)
    }

    pub fn schema(&self) -> &SchemaSet {
        &self.schema
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// `{api_version, kind, metadata, spec, status}` wrapper for a kind.
fn resource_message(kind: &ResourceKind) -> MessageDescriptor {
    let mut api_version = FieldDescriptor::new("api_version", FieldKind::String);
    api_version.rules.one_of = vec![kind.api_version.clone()];
    let mut kind_field = FieldDescriptor::new("kind", FieldKind::String);
    kind_field.rules.one_of = vec![kind.kind.to_string()];
    let metadata = FieldDescriptor::message("metadata", METADATA_MESSAGE);
    let mut spec = FieldDescriptor::message("spec", kind.spec.clone());
    spec.rules.required = true;
    MessageDescriptor {
        description: None,
        fields: vec![
            api_version,
            kind_field,
            metadata,
            spec,
            FieldDescriptor::message("status", STATUS_MESSAGE),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = KindCatalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        let vpc = catalog.get("AwsVpc").unwrap();
        assert_eq!(vpc.provider, Provider::Aws);
        let message = catalog.schema().message(vpc.message_name()).unwrap();
        let names: Vec<_> = message.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["api_version", "kind", "metadata", "spec", "status"]);
    }

    #[test]
    fn every_builtin_kind_has_a_spec() {
        let catalog = KindCatalog::builtin().unwrap();
        for kind in catalog.kinds() {
            catalog.schema().message(&kind.spec).unwrap();
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let catalog = KindCatalog::builtin().unwrap();
        assert!(matches!(
            catalog.get("NoSuchKind"),
            Err(CatalogError::UnknownKind(k)) if k == "NoSuchKind"
        ));
        assert!(catalog.provider_of("NoSuchKind").is_none());
    }

    #[test]
    fn duplicate_kinds_rejected() {
        let yaml = r"
kinds:
  - { kind: A, provider: aws, api_version: x/v1, spec: S }
  - { kind: A, provider: gcp, api_version: x/v1, spec: S }
messages:
  S: { fields: [] }
";
        assert!(matches!(
            KindCatalog::from_yaml_str(yaml, "test"),
            Err(CatalogError::DuplicateKind(_))
        ));
    }

    #[test]
    fn merge_replaces_kinds() {
        let mut catalog = KindCatalog::builtin().unwrap();
        let extra = KindCatalog::from_yaml_str(
            r"
kinds:
  - { kind: AwsVpc, provider: gcp, api_version: custom/v1, spec: custom.Spec }
messages:
  custom.Spec: { fields: [ { name: region, type: string } ] }
",
            "extra",
        )
        .unwrap();
        catalog.merge(extra).unwrap();
        assert_eq!(catalog.provider_of("AwsVpc"), Some(Provider::Gcp));
    }

    #[test]
    fn provider_names_and_keys() {
        assert_eq!("AWS".parse::<Provider>().unwrap(), Provider::Aws);
        assert!("nope".parse::<Provider>().is_err());
        assert_eq!(Provider::Gcp.credential_key(), "gcpProviderConfig");
        assert_eq!(
            Provider::Kubernetes.credential_file_name(),
            "kubernetes-provider-config.yaml"
        );
    }
}
