use crate::case::to_lower_camel;
use crate::catalog::{KindCatalog, ResourceKind};
use crate::types::KindName;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("manifest must be a YAML mapping")]
    NotAMapping,
    #[error("manifest has no 'kind'")]
    MissingKind,
    #[error("unsupported resource kind '{0}'")]
    UnsupportedKind(String),
}

/// A resource manifest as loaded from YAML, before any schema is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    value: Value,
}

impl Manifest {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(input)?;
        Self::from_value(value)
    }

    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        if !value.is_mapping() {
            return Err(ManifestError::NotAMapping);
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn kind(&self) -> Result<KindName, ManifestError> {
        self.top_level_str("kind")
            .map(KindName::from)
            .ok_or(ManifestError::MissingKind)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.top_level_str("api_version")
    }

    /// Look the manifest's kind up in `catalog`.
    pub fn resource_kind<'c>(
        &self,
        catalog: &'c KindCatalog,
    ) -> Result<&'c ResourceKind, ManifestError> {
        let kind = self.kind()?;
        catalog
            .lookup(&kind)
            .ok_or_else(|| ManifestError::UnsupportedKind(kind.into_inner()))
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| entry(m, "name"))
            .and_then(Value::as_str)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        let Some(labels) = self
            .metadata()
            .and_then(|m| entry(m, "labels"))
            .and_then(Value::as_mapping)
        else {
            return BTreeMap::new();
        };
        labels
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), scalar_string(v)?)))
            .collect()
    }

    pub fn label(&self, key: &str) -> Option<String> {
        self.labels().remove(key)
    }

    fn metadata(&self) -> Option<&Mapping> {
        self.value
            .as_mapping()
            .and_then(|m| entry(m, "metadata"))
            .and_then(Value::as_mapping)
    }

    fn top_level_str(&self, field: &str) -> Option<&str> {
        self.value
            .as_mapping()
            .and_then(|m| entry(m, field))
            .and_then(Value::as_str)
    }
}

/// Value stored under a snake_case field name or its lowerCamel spelling.
pub(crate) fn entry<'a>(map: &'a Mapping, field: &str) -> Option<&'a Value> {
    map.get(field).or_else(|| map.get(to_lower_camel(field)))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIS: &str = r"
apiVersion: kubernetes.provisio.dev/v1
kind: KubernetesRedis
metadata:
  name: red-one
  labels:
    env: production
    replicas: 3
spec:
  container:
    replicas: 1
";

    #[test]
    fn kind_and_name() {
        let m = Manifest::parse(REDIS).unwrap();
        assert_eq!(m.kind().unwrap().as_str(), "KubernetesRedis");
        assert_eq!(m.api_version(), Some("kubernetes.provisio.dev/v1"));
        assert_eq!(m.name(), Some("red-one"));
    }

    #[test]
    fn labels_are_stringified() {
        let m = Manifest::parse(REDIS).unwrap();
        let labels = m.labels();
        assert_eq!(labels["env"], "production");
        assert_eq!(labels["replicas"], "3");
        assert_eq!(m.label("missing"), None);
    }

    #[test]
    fn snake_case_top_level_keys_are_accepted() {
        let m = Manifest::parse("api_version: x/v1\nkind: AwsVpc\n").unwrap();
        assert_eq!(m.api_version(), Some("x/v1"));
    }

    #[test]
    fn missing_kind() {
        let m = Manifest::parse("metadata: {name: a}\n").unwrap();
        assert!(matches!(m.kind(), Err(ManifestError::MissingKind)));
    }

    #[test]
    fn scalar_document_rejected() {
        assert!(matches!(
            Manifest::parse("just a string"),
            Err(ManifestError::NotAMapping)
        ));
    }

    #[test]
    fn unsupported_kind_named() {
        let catalog = KindCatalog::builtin().unwrap();
        let m = Manifest::parse("kind: Teapot\n").unwrap();
        assert!(matches!(
            m.resource_kind(&catalog),
            Err(ManifestError::UnsupportedKind(k)) if k == "Teapot"
        ));
    }

    #[test]
    fn file_errors_name_the_path() {
        let err = Manifest::from_file(Path::new("/nonexistent/manifest.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/manifest.yaml"));
    }
}
