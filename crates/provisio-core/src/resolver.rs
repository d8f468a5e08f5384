//! Locating the engine module for a resource kind.
//!
//! A module is either a local directory given by the operator or a
//! subdirectory of a clone of the module repository. Clones live in the
//! scope's cache, keyed by repository and ref, and are fetched at most once
//! per key; concurrent fetches of the same key serialize on a file lock.

use provisio_runtime::Provisioner;
use provisio_schema::{KindCatalog, KindName, Provider, ScopeKey};
use provisio_store::{CacheLock, StoreError, WorkspaceLayout};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot determine the provider for kind '{0}'")]
    ProviderUnresolved(String),
    #[error("no module repository configured; set module_repo in the config file or pass --module-dir")]
    NoRepository,
    #[error("failed to fetch {repo}: {reason}")]
    Fetch { repo: String, reason: String },
    #[error("module for kind {kind} not found at {}", .path.display())]
    ModulePathMissing { kind: String, path: PathBuf },
    #[error("{} is not a {engine} module directory", .path.display())]
    NotAModule { engine: String, path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches module repository contents. Shells out to `git` in production;
/// tests substitute a fake.
pub trait SourceFetcher {
    /// Clone `repo` into `dest`, which does not exist yet.
    fn clone_repo(&self, repo: &str, dest: &Path) -> Result<(), ResolveError>;

    /// Check out `git_ref` in an existing clone.
    fn checkout(&self, dir: &Path, git_ref: &str) -> Result<(), ResolveError>;
}

pub struct GitCli {
    binary: PathBuf,
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, repo: &str, mut cmd: Command) -> Result<(), ResolveError> {
        let fetch_err = |reason: String| ResolveError::Fetch {
            repo: repo.to_owned(),
            reason,
        };
        tracing::debug!("running {cmd:?}");
        let output = cmd
            .output()
            .map_err(|e| fetch_err(format!("cannot run {}: {e}", self.binary.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fetch_err(stderr.trim().to_owned()));
        }
        Ok(())
    }
}

impl SourceFetcher for GitCli {
    fn clone_repo(&self, repo: &str, dest: &Path) -> Result<(), ResolveError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["clone", "--quiet", repo]).arg(dest);
        self.run(repo, cmd)
    }

    fn checkout(&self, dir: &Path, git_ref: &str) -> Result<(), ResolveError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-C")
            .arg(dir)
            .args(["checkout", "--quiet", git_ref]);
        self.run(&dir.display().to_string(), cmd)
    }
}

#[derive(Debug, Clone)]
pub struct ModuleRequest<'a> {
    pub module_dir_hint: Option<&'a Path>,
    pub scope: &'a ScopeKey,
    pub kind: &'a KindName,
    pub version_ref: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub path: PathBuf,
    /// The operator's own directory rather than a cached clone.
    pub local: bool,
}

pub struct ModuleResolver<'a> {
    catalog: &'a KindCatalog,
    layout: &'a WorkspaceLayout,
    fetcher: &'a dyn SourceFetcher,
    repo_url: Option<&'a str>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(
        catalog: &'a KindCatalog,
        layout: &'a WorkspaceLayout,
        fetcher: &'a dyn SourceFetcher,
        repo_url: Option<&'a str>,
    ) -> Self {
        Self {
            catalog,
            layout,
            fetcher,
            repo_url,
        }
    }

    pub fn resolve(
        &self,
        provisioner: &dyn Provisioner,
        request: &ModuleRequest<'_>,
    ) -> Result<ModuleLocation, ResolveError> {
        if let Some(hint) = request.module_dir_hint {
            if provisioner.is_module_dir(hint) {
                return Ok(ModuleLocation {
                    path: hint.to_path_buf(),
                    local: true,
                });
            }
        }

        let provider = self
            .catalog
            .provider_of(request.kind)
            .ok_or_else(|| ResolveError::ProviderUnresolved(request.kind.to_string()))?;
        let subpath = module_subpath(provider, request.kind, provisioner.engine_subdir());

        if let Some(hint) = request.module_dir_hint {
            let nested = hint.join(&subpath);
            if provisioner.is_module_dir(&nested) {
                return Ok(ModuleLocation {
                    path: nested,
                    local: true,
                });
            }
            return Err(ResolveError::NotAModule {
                engine: provisioner.name().to_owned(),
                path: hint.to_path_buf(),
            });
        }

        let repo = self.repo_url.ok_or(ResolveError::NoRepository)?;
        let clone = self.ensure_clone(provisioner, request, repo)?;
        let path = clone.join(&subpath);
        if !path.is_dir() {
            return Err(ResolveError::ModulePathMissing {
                kind: request.kind.to_string(),
                path,
            });
        }
        Ok(ModuleLocation { path, local: false })
    }

    fn ensure_clone(
        &self,
        provisioner: &dyn Provisioner,
        request: &ModuleRequest<'_>,
        repo: &str,
    ) -> Result<PathBuf, ResolveError> {
        let engine = provisioner.kind().home_namespace();
        let scope = request.scope.as_str();
        let cache_dir =
            self.layout
                .module_cache_dir(engine, scope, repo, request.version_ref);
        let modules_dir = self.layout.modules_dir(engine, scope);
        std::fs::create_dir_all(&modules_dir)?;

        let _lock = CacheLock::acquire(&self.layout.module_lock_file(&cache_dir))?;
        if cache_dir.is_dir() {
            tracing::debug!("reusing module clone {}", cache_dir.display());
            return Ok(cache_dir);
        }

        tracing::info!("fetching {repo}");
        let staging = tempfile::tempdir_in(&modules_dir)?;
        let checkout = staging.path().join("checkout");
        self.fetcher.clone_repo(repo, &checkout)?;
        if let Some(git_ref) = request.version_ref {
            self.fetcher.checkout(&checkout, git_ref)?;
        }
        std::fs::rename(&checkout, &cache_dir)?;
        tracing::debug!("cached module clone at {}", cache_dir.display());
        Ok(cache_dir)
    }
}

/// `<provider>/<lowercase kind>/<engine subdir>`.
pub fn module_subpath(provider: Provider, kind: &KindName, engine_subdir: &str) -> PathBuf {
    PathBuf::from(provider.as_str())
        .join(kind.module_dir_name())
        .join(engine_subdir)
}
