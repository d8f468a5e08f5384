//! Run settings carried as `metadata.labels` on a manifest.

use provisio_runtime::ProvisionerKind;
use provisio_schema::StackFqdn;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PROVISIONER_LABEL: &str = "project-planton.org/provisioner";
pub const STACK_FQDN_LABEL: &str = "pulumi.project-planton.org/stack.fqdn";
pub const STACK_ORG_LABEL: &str = "pulumi.project-planton.org/organization";
pub const STACK_PROJECT_LABEL: &str = "pulumi.project-planton.org/project";
pub const STACK_NAME_LABEL: &str = "pulumi.project-planton.org/stack.name";
pub const BACKEND_TYPE_LABEL: &str = "terraform.project-planton.org/backend.type";
pub const BACKEND_OBJECT_LABEL: &str = "terraform.project-planton.org/backend.object";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label {PROVISIONER_LABEL}: {0}")]
    Provisioner(String),
    #[error("label {STACK_FQDN_LABEL}: invalid stack fqdn '{0}', expected <organization>/<project>/<stack>")]
    StackFqdn(String),
    #[error("Pulumi stack labels are incomplete: {organization}, {project} and {stack} must all be set and non-empty")]
    StackParts {
        organization: &'static str,
        project: &'static str,
        stack: &'static str,
    },
    #[error("both {BACKEND_TYPE_LABEL} and {BACKEND_OBJECT_LABEL} must be set")]
    BackendIncomplete,
    #[error("label {BACKEND_TYPE_LABEL}: unsupported backend type '{0}'")]
    BackendType(String),
}

pub type Labels = BTreeMap<String, String>;

pub fn provisioner(labels: &Labels) -> Result<Option<ProvisionerKind>, LabelError> {
    labels
        .get(PROVISIONER_LABEL)
        .map(|v| v.parse().map_err(LabelError::Provisioner))
        .transpose()
}

/// Stack FQDN from `stack.fqdn`, or from the organization/project/stack.name
/// trio. `None` when no stack label is present at all.
pub fn stack_fqdn(labels: &Labels) -> Result<Option<StackFqdn>, LabelError> {
    if let Some(fqdn) = labels.get(STACK_FQDN_LABEL) {
        let fqdn = StackFqdn::new(fqdn.trim());
        if fqdn.parts().is_none() {
            return Err(LabelError::StackFqdn(fqdn.into_inner()));
        }
        return Ok(Some(fqdn));
    }

    let trio = [STACK_ORG_LABEL, STACK_PROJECT_LABEL, STACK_NAME_LABEL].map(|k| labels.get(k));
    if trio.iter().all(Option::is_none) {
        return Ok(None);
    }
    match trio {
        [Some(org), Some(project), Some(stack)]
            if ![org, project, stack].iter().any(|s| s.trim().is_empty()) =>
        {
            Ok(Some(StackFqdn::new(format!(
                "{}/{}/{}",
                org.trim(),
                project.trim(),
                stack.trim()
            ))))
        }
        _ => Err(LabelError::StackParts {
            organization: STACK_ORG_LABEL,
            project: STACK_PROJECT_LABEL,
            stack: STACK_NAME_LABEL,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    S3,
    Gcs,
    Azurerm,
}

impl FromStr for BackendType {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "gcs" => Ok(Self::Gcs),
            "azurerm" => Ok(Self::Azurerm),
            other => Err(LabelError::BackendType(other.to_owned())),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Azurerm => "azurerm",
        })
    }
}

/// State backend for the declarative engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend_type: BackendType,
    /// `<bucket-or-container>/<path within it>`.
    pub object: String,
}

impl BackendConfig {
    /// `key=value` pairs for `init -backend-config`.
    pub fn init_args(&self) -> Vec<String> {
        let (first_key, rest_key) = match self.backend_type {
            BackendType::Local => return Vec::new(),
            BackendType::S3 => ("bucket", "key"),
            BackendType::Gcs => ("bucket", "prefix"),
            BackendType::Azurerm => ("container_name", "key"),
        };
        let mut parts = self.object.splitn(2, '/');
        let mut args = Vec::new();
        if let Some(first) = parts.next().filter(|s| !s.is_empty()) {
            args.push(format!("{first_key}={first}"));
        }
        if let Some(rest) = parts.next().filter(|s| !s.is_empty()) {
            args.push(format!("{rest_key}={rest}"));
        }
        args
    }
}

pub fn backend(labels: &Labels) -> Result<Option<BackendConfig>, LabelError> {
    match (labels.get(BACKEND_TYPE_LABEL), labels.get(BACKEND_OBJECT_LABEL)) {
        (None, None) => Ok(None),
        (Some(kind), Some(object)) if !kind.trim().is_empty() && !object.trim().is_empty() => {
            Ok(Some(BackendConfig {
                backend_type: kind.parse()?,
                object: object.trim().to_owned(),
            }))
        }
        _ => Err(LabelError::BackendIncomplete),
    }
}
