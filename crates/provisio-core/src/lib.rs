//! The provisioning pipeline for provisio.
//!
//! This crate ties the schema, store and runtime crates together into the
//! [`Engine`]: it materializes a manifest from its source, applies overrides
//! and defaults, validates it, composes credentials into the engine input,
//! resolves the engine module (local directory or cached clone), and drives
//! the engine process inside a per-invocation workspace. Manifest labels,
//! user configuration and interrupt handling live here as well.

pub mod concurrency;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod labels;
pub mod resolver;
pub mod source;
pub mod stackinput;

pub use concurrency::{install_signal_handler, shutdown_requested};
pub use config::{default_config_path, Binaries, ConfigError, ProvisioConfig};
pub use credentials::{CredentialError, CredentialPaths, ProviderCredentials};
pub use engine::{load_catalog, Engine, ManifestRequest, PreparedManifest, RunOutcome, RunSpec};
pub use labels::{BackendConfig, BackendType, LabelError};
pub use resolver::{GitCli, ModuleLocation, ModuleResolver, ResolveError, SourceFetcher};
pub use source::{ManifestSource, SourceError};
pub use stackinput::StackInput;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("catalog error: {0}")]
    Catalog(#[from] provisio_schema::CatalogError),
    #[error("manifest error: {0}")]
    Manifest(#[from] provisio_schema::ManifestError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Override(#[from] provisio_schema::OverrideError),
    #[error("{0}")]
    Default(#[from] provisio_schema::DefaultError),
    #[error("{0}")]
    Validation(#[from] provisio_schema::ValidationError),
    #[error("schema error: {0}")]
    Schema(#[from] provisio_schema::SchemaError),
    #[error("compile error: {0}")]
    Compile(#[from] provisio_schema::CompileError),
    #[error("{0}")]
    Label(#[from] LabelError),
    #[error("{0}")]
    Credential(#[from] CredentialError),
    #[error("module resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("store error: {0}")]
    Store(#[from] provisio_store::StoreError),
    #[error("{0}")]
    Runtime(#[from] provisio_runtime::RuntimeError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("interrupted before the engine started")]
    Interrupted,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// Coarse failure class, one per CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad manifest, override, credentials or labels.
    Input,
    /// Module could not be located or fetched.
    Resolution,
    /// The engine ran and failed.
    Engine,
    Other,
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Manifest(_)
            | CoreError::Source(_)
            | CoreError::Override(_)
            | CoreError::Default(_)
            | CoreError::Validation(_)
            | CoreError::Compile(_)
            | CoreError::Label(_)
            | CoreError::Credential(_) => ErrorCategory::Input,
            CoreError::Resolve(_) => ErrorCategory::Resolution,
            CoreError::Runtime(
                provisio_runtime::RuntimeError::EngineFailed { .. }
                | provisio_runtime::RuntimeError::Spawn { .. },
            ) => ErrorCategory::Engine,
            CoreError::Runtime(
                provisio_runtime::RuntimeError::MissingStack
                | provisio_runtime::RuntimeError::InvalidStack(_),
            ) => ErrorCategory::Input,
            _ => ErrorCategory::Other,
        }
    }
}
