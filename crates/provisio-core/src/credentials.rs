//! Provider credential files: loading, merging into the stack input, and
//! translation to the environment the declarative engine's providers read.

use crate::stackinput::StackInput;
use base64::Engine as _;
use provisio_schema::case::to_snake_case;
use provisio_schema::Provider;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the kubeconfig written into a run's workspace.
pub const KUBECONFIG_FILE: &str = "kubeconfig";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse credentials {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("credentials {} must be a YAML mapping", .path.display())]
    NotAMapping { path: PathBuf },
    #[error("{provider} credentials: field {field}: {reason}")]
    Decode {
        provider: Provider,
        field: &'static str,
        reason: String,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Credential file per provider, as given by flags or found in an input
/// directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPaths(BTreeMap<Provider, PathBuf>);

impl CredentialPaths {
    pub fn insert(&mut self, provider: Provider, path: impl Into<PathBuf>) {
        self.0.insert(provider, path.into());
    }

    pub fn get(&self, provider: Provider) -> Option<&Path> {
        self.0.get(&provider).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Provider, &Path)> {
        self.0.iter().map(|(p, path)| (*p, path.as_path()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill in `<dir>/<provider>-provider-config.yaml` for every provider not
    /// already set.
    pub fn discover(&mut self, input_dir: &Path) {
        for provider in Provider::ALL {
            if self.0.contains_key(&provider) {
                continue;
            }
            let candidate = input_dir.join(provider.credential_file_name());
            if candidate.is_file() {
                tracing::debug!("found {provider} credentials at {}", candidate.display());
                self.0.insert(provider, candidate);
            }
        }
    }
}

/// Parsed credential blobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderCredentials(BTreeMap<Provider, Value>);

/// Read and parse every file. The first failure aborts the whole load.
pub fn load(paths: &CredentialPaths) -> Result<ProviderCredentials, CredentialError> {
    let mut loaded = BTreeMap::new();
    for (provider, path) in paths.iter() {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let blob: Value = serde_yaml::from_str(&content).map_err(|source| CredentialError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !blob.is_mapping() {
            return Err(CredentialError::NotAMapping {
                path: path.to_path_buf(),
            });
        }
        loaded.insert(provider, blob);
    }
    Ok(ProviderCredentials(loaded))
}

/// Merge every credential file into `base`. Nothing is merged unless all
/// files load.
pub fn compose(base: StackInput, paths: &CredentialPaths) -> Result<StackInput, CredentialError> {
    let credentials = load(paths)?;
    Ok(merge(base, credentials))
}

pub fn merge(mut base: StackInput, credentials: ProviderCredentials) -> StackInput {
    for (provider, blob) in credentials.0 {
        base.insert_credentials(provider, blob);
    }
    base
}

/// Environment variables for the declarative engine's providers.
///
/// A kubeconfig is written to `workspace` and referenced by path.
pub fn engine_env(
    credentials: &ProviderCredentials,
    workspace: &Path,
) -> Result<Vec<(String, String)>, CredentialError> {
    let mut env = Vec::new();
    for (provider, blob) in &credentials.0 {
        let Some(map) = blob.as_mapping() else {
            continue;
        };
        let mut set = |var: &str, field: &str| {
            if let Some(value) = field_str(map, field) {
                env.push((var.to_owned(), value));
            }
        };
        match provider {
            Provider::Aws => {
                set("AWS_ACCESS_KEY_ID", "accessKeyId");
                set("AWS_SECRET_ACCESS_KEY", "secretAccessKey");
                set("AWS_SESSION_TOKEN", "sessionToken");
                set("AWS_REGION", "region");
                set("AWS_DEFAULT_REGION", "region");
            }
            Provider::Azure => {
                set("ARM_CLIENT_ID", "clientId");
                set("ARM_CLIENT_SECRET", "clientSecret");
                set("ARM_TENANT_ID", "tenantId");
                set("ARM_SUBSCRIPTION_ID", "subscriptionId");
            }
            Provider::Atlas => {
                set("MONGODB_ATLAS_PUBLIC_KEY", "publicKey");
                set("MONGODB_ATLAS_PRIVATE_KEY", "privateKey");
            }
            Provider::Auth0 => {
                set("AUTH0_DOMAIN", "domain");
                set("AUTH0_CLIENT_ID", "clientId");
                set("AUTH0_CLIENT_SECRET", "clientSecret");
            }
            Provider::Cloudflare => {
                set("CLOUDFLARE_API_TOKEN", "apiToken");
                set("CLOUDFLARE_API_KEY", "apiKey");
                set("CLOUDFLARE_EMAIL", "email");
            }
            Provider::Confluent => {
                set("CONFLUENT_CLOUD_API_KEY", "apiKey");
                set("CONFLUENT_CLOUD_API_SECRET", "apiSecret");
            }
            Provider::Snowflake => {
                set("SNOWFLAKE_ACCOUNT", "account");
                set("SNOWFLAKE_REGION", "region");
                set("SNOWFLAKE_USER", "username");
                set("SNOWFLAKE_PASSWORD", "password");
            }
            Provider::Gcp => {
                if let Some(encoded) = field_str(map, "serviceAccountKeyBase64") {
                    env.push(("GOOGLE_CREDENTIALS".to_owned(), decode_gcp_key(&encoded)?));
                }
            }
            Provider::Kubernetes => {
                env.extend(kubernetes_env(map, workspace)?);
            }
        }
    }
    Ok(env)
}

fn decode_gcp_key(encoded: &str) -> Result<String, CredentialError> {
    let decode_err = |reason: String| CredentialError::Decode {
        provider: Provider::Gcp,
        field: "serviceAccountKeyBase64",
        reason,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| decode_err(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| decode_err(e.to_string()))
}

fn kubernetes_env(map: &Mapping, workspace: &Path) -> Result<Vec<(String, String)>, CredentialError> {
    let kubeconfig = field_str(map, "kubeConfig").or_else(|| {
        field(map, "digitalOceanDoks")
            .and_then(Value::as_mapping)
            .and_then(|doks| field_str(doks, "kubeConfig"))
    });
    let Some(kubeconfig) = kubeconfig else {
        if field(map, "gcpGke").is_some() {
            tracing::warn!(
                "kubernetes credentials for a GKE cluster are passed to Pulumi only; \
                 the declarative engine needs a kubeConfig"
            );
        }
        return Ok(Vec::new());
    };

    let path = workspace.join(KUBECONFIG_FILE);
    provisio_store::write_private(&path, kubeconfig.as_bytes()).map_err(|source| {
        CredentialError::Write {
            path: path.clone(),
            source,
        }
    })?;
    let path = path.display().to_string();
    Ok(vec![
        ("KUBECONFIG".to_owned(), path.clone()),
        ("KUBE_CONFIG_PATH".to_owned(), path),
    ])
}

/// Field under its lowerCamel name or the snake_case spelling.
fn field<'a>(map: &'a Mapping, camel: &str) -> Option<&'a Value> {
    map.get(camel).or_else(|| map.get(to_snake_case(camel)))
}

fn field_str(map: &Mapping, camel: &str) -> Option<String> {
    match field(map, camel)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
