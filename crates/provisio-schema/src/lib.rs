//! Resource schemas and manifest compilation for provisio.
//!
//! This crate owns everything that happens to a manifest before an engine
//! sees it: the kind catalog (`KindCatalog`), typed schema descriptors,
//! `path=value` overrides, schema defaults, strict validation, and the two
//! compiled forms handed to engines: the variable-declaration document
//! (`variables_document`) and the tfvars value document (`tfvars::render`)
//! over a sorted, skip-listed projection (`project`).

pub mod case;
pub mod catalog;
pub mod defaults;
pub mod descriptor;
pub mod manifest;
pub mod overrides;
pub mod projection;
pub mod reflect;
pub mod tfvars;
pub mod types;
pub mod validate;

pub use catalog::{CatalogError, KindCatalog, Provider, ResourceKind};
pub use defaults::{apply_defaults, DefaultError};
pub use descriptor::{FieldDescriptor, FieldKind, MessageDescriptor, SchemaError, SchemaSet};
pub use manifest::{Manifest, ManifestError};
pub use overrides::{CoerceError, ManifestFile, Override, OverrideError};
pub use projection::project;
pub use reflect::variables_document;
pub use tfvars::CompileError;
pub use types::{KindName, ScopeKey, StackFqdn};
pub use validate::{validate, ValidationError, Violation};
