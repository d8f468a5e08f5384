//! On-disk state for provisio: the home directory layout, per-invocation
//! workspaces and the module clone cache.
//!
//! `WorkspaceLayout` computes every path under the provisio home and mints
//! unique workspace directories; `Workspace` removes its directory on drop
//! unless retained; `CacheLock` serializes fetches of one clone cache entry
//! across processes.

pub mod layout;
pub mod lock;
pub mod workspace;

pub use layout::{ref_key, sanitize, WorkspaceLayout, LAYOUT_FORMAT_VERSION};
pub use lock::CacheLock;
pub use workspace::{write_private, Workspace};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("layout version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
