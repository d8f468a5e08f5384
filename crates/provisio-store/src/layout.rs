use crate::workspace::Workspace;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk layout version. Incremented on incompatible changes.
pub const LAYOUT_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";
const MODULES_DIR: &str = "modules";
const DEFAULT_REF: &str = "default";

/// Directory layout under the provisio home (`~/.provisio` by default).
///
/// ```text
/// <root>/version
/// <root>/tmp/                                  temp manifests
/// <root>/<engine>/<scope>/<uuid>/              per-invocation workspaces
/// <root>/<engine>/<scope>/modules/<repo>-<url hash>@<ref>   module clone cache
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutVersion {
    format_version: u32,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    #[inline]
    pub fn engine_dir(&self, engine: &str) -> PathBuf {
        self.root.join(engine)
    }

    #[inline]
    pub fn scope_dir(&self, engine: &str, scope: &str) -> PathBuf {
        self.engine_dir(engine).join(sanitize(scope))
    }

    #[inline]
    pub fn modules_dir(&self, engine: &str, scope: &str) -> PathBuf {
        self.scope_dir(engine, scope).join(MODULES_DIR)
    }

    /// Clone cache entry for one repository URL at one ref.
    pub fn module_cache_dir(
        &self,
        engine: &str,
        scope: &str,
        repo_url: &str,
        git_ref: Option<&str>,
    ) -> PathBuf {
        self.modules_dir(engine, scope)
            .join(format!("{}@{}", repo_key(repo_url), ref_key(git_ref)))
    }

    /// Lock file guarding a clone cache entry.
    pub fn module_lock_file(&self, cache_dir: &Path) -> PathBuf {
        let mut name = cache_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        cache_dir.with_file_name(name)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.tmp_dir())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            return self.verify_version();
        }
        let content = serde_json::to_string_pretty(&LayoutVersion {
            format_version: LAYOUT_FORMAT_VERSION,
        })?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&version_path)
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let content = fs::read_to_string(self.root.join(VERSION_FILE))?;
        let ver: LayoutVersion = serde_json::from_str(&content)?;
        if ver.format_version != LAYOUT_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: LAYOUT_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }

    /// Mint a fresh workspace directory for `scope`.
    ///
    /// Suffixes are UUIDv7, so every call yields a distinct directory and
    /// siblings sort in creation order.
    pub fn workspace_dir(&self, engine: &str, scope: &str) -> Result<Workspace, StoreError> {
        let parent = self.scope_dir(engine, scope);
        fs::create_dir_all(&parent)?;
        loop {
            let dir = parent.join(uuid::Uuid::now_v7().to_string());
            match fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::debug!("created workspace {}", dir.display());
                    return Ok(Workspace::new(dir));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Path-component form of a scope or repository name.
pub fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_whitespace() || c.is_control() => '-',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

/// Last path segment of a repository URL without `.git`.
fn repo_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last)
}

/// Cache key component for a repository: its name for readability plus a
/// hash of the full URL, so forks sharing a name never share a clone.
fn repo_key(url: &str) -> String {
    let hash = blake3::hash(url.as_bytes()).to_hex();
    format!("{}-{}", sanitize(repo_name(url)), &hash[..12])
}

/// Cache key component for a ref: `default` when none was requested.
pub fn ref_key(git_ref: Option<&str>) -> String {
    match git_ref {
        None => DEFAULT_REF.to_owned(),
        Some(r) => blake3::hash(r.as_bytes()).to_hex()[..12].to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = WorkspaceLayout::new("/home/u/.provisio");
        assert_eq!(
            layout.scope_dir("pulumi", "acme/net/prod"),
            PathBuf::from("/home/u/.provisio/pulumi/acme-net-prod")
        );
        let cache = layout.module_cache_dir("tofu", "s", "https://git.example.com/modules.git", None);
        assert_eq!(cache.parent().unwrap(), Path::new("/home/u/.provisio/tofu/s/modules"));
        let name = cache.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("modules-"), "{name}");
        assert!(name.ends_with("@default"), "{name}");
    }

    #[test]
    fn forks_with_one_name_get_separate_caches() {
        let layout = WorkspaceLayout::new("/r");
        let upstream = layout.module_cache_dir("tofu", "s", "https://github.com/acme/iac.git", None);
        let fork = layout.module_cache_dir("tofu", "s", "https://github.com/fork/iac.git", None);
        assert_ne!(upstream, fork);
        assert_eq!(
            upstream,
            layout.module_cache_dir("tofu", "s", "https://github.com/acme/iac.git", None)
        );
    }

    #[test]
    fn repo_names() {
        assert_eq!(repo_name("https://git.example.com/infra/modules.git"), "modules");
        assert_eq!(repo_name("git@github.com:acme/iac.git"), "iac");
        assert_eq!(repo_name("https://example.com/acme/iac/"), "iac");
        assert_eq!(repo_name("local-mirror"), "local-mirror");
    }

    #[test]
    fn cache_dirs_are_keyed_by_ref() {
        let layout = WorkspaceLayout::new("/r");
        let a = layout.module_cache_dir("tofu", "s", "repo", Some("v1.0.0"));
        let b = layout.module_cache_dir("tofu", "s", "repo", Some("v2.0.0"));
        let c = layout.module_cache_dir("tofu", "s", "repo", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, layout.module_cache_dir("tofu", "s", "repo", Some("v1.0.0")));
    }

    #[test]
    fn lock_file_sits_next_to_cache_dir() {
        let layout = WorkspaceLayout::new("/r");
        let cache = layout.module_cache_dir("pulumi", "s", "repo", None);
        let lock = layout.module_lock_file(&cache);
        assert_eq!(lock.parent(), cache.parent());
        assert_eq!(
            lock.file_name().unwrap().to_str().unwrap(),
            format!("{}@default.lock", repo_key("repo"))
        );
    }

    #[test]
    fn sanitize_never_escapes_parent() {
        assert_eq!(sanitize(".."), "_..");
        assert_eq!(sanitize("a/../b"), "a-..-b");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn initialize_writes_and_verifies_version() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        layout.initialize().unwrap();
        assert!(dir.path().join("version").exists());
        assert!(layout.tmp_dir().is_dir());
        layout.initialize().unwrap();
    }

    #[test]
    fn version_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("version"), r#"{"format_version": 99}"#).unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        assert!(matches!(
            layout.initialize(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn two_workspaces_for_one_scope_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let a = layout.workspace_dir("pulumi", "stack-a").unwrap();
        let b = layout.workspace_dir("pulumi", "stack-a").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_eq!(a.path().parent(), b.path().parent());
        assert!(a.path() < b.path());
    }
}
