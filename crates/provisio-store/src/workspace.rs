use std::io::Write;
use std::path::{Path, PathBuf};

/// A per-invocation working directory.
///
/// The directory is removed when the handle is dropped unless
/// [`Workspace::retain`] was called.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    retained: bool,
}

impl Workspace {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            retained: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    /// Keep the directory on disk after this handle goes away.
    pub fn retain(&mut self) -> &Path {
        self.retained = true;
        &self.path
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.retained {
            tracing::info!("keeping workspace {}", self.path.display());
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove workspace {}: {e}", self.path.display());
            }
        }
    }
}

/// Write a file readable by the owner only. On unix the mode is set when
/// the file is created, so the contents are never exposed under a wider one.
pub fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // An existing file keeps its old mode through open; narrow it as well.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::write_private;
    use crate::WorkspaceLayout;

    #[test]
    fn removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let ws = layout.workspace_dir("tofu", "AwsVpc-main").unwrap();
        std::fs::write(ws.join("kubeconfig"), "x").unwrap();
        let path = ws.path().to_path_buf();
        drop(ws);
        assert!(!path.exists());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn retained_workspace_survives() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let mut ws = layout.workspace_dir("tofu", "s").unwrap();
        let path = ws.retain().to_path_buf();
        assert!(ws.is_retained());
        drop(ws);
        assert!(path.is_dir());
    }

    #[test]
    fn already_removed_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        let ws = layout.workspace_dir("pulumi", "s").unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        drop(ws);
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig");
        write_private(&path, b"secret").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "secret");
    }

    #[cfg(unix)]
    #[test]
    fn rewriting_narrows_an_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack-input.yaml");
        std::fs::write(&path, "old contents that are longer").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        write_private(&path, b"new").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
